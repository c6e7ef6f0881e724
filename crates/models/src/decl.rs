use super::annotations::{Annotations, Description};
use super::itemtype::ItemTag;
use super::names;

// Declaration types mirror the model document: they are what the XML reader
// produces and what resolution consumes. They hold names, never resolved
// entities, and preserve declaration order throughout.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelDecl {
    pub project: String,
    pub schema_ver: String,
    pub metadata_collection: Option<names::Collection>,
    pub annotations: Annotations,
    pub collections: Vec<CollectionDecl>,
    // Terms of the null-value CV.
    pub null_values: Vec<TermDecl>,
    pub patterns: Vec<PatternDecl>,
    // Simple and meta CVs, in declaration order. A CV may reference
    // only CVs declared before it.
    pub cvs: Vec<CvDecl>,
    pub compound_types: Vec<CompoundTypeDecl>,
    pub concept_types: Vec<ConceptTypeDecl>,
    pub domains: Vec<ConceptDomainDecl>,
    pub file_patterns: Vec<FilePatternDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDecl {
    pub name: names::Collection,
    // Path of this collection within the target backend.
    pub path: String,
    pub indices: Vec<IndexDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDecl {
    pub unique: bool,
    // (column, direction) pairs; direction is +1 or -1.
    pub keys: Vec<(names::Column, i32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternDecl {
    pub name: names::Pattern,
    pub regex: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CvDecl {
    pub id: Option<names::Cv>,
    pub name: Option<String>,
    pub description: Description,
    pub annotations: Annotations,
    pub source: CvSourceDecl,
}

/// Where a CV's terms come from.
#[derive(Debug, Clone, PartialEq)]
pub enum CvSourceDecl {
    /// Terms declared inline as child elements.
    Inline { terms: Vec<TermDecl> },
    /// Terms held in an external file, relative to the CV directory.
    File { path: String },
    /// One or more reference URIs; content is not fetched at load.
    Uris { uris: Vec<url::Url> },
    /// A meta-CV: the ordered union of earlier-declared CVs.
    Union { members: Vec<names::Cv> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermDecl {
    pub key: String,
    pub alt_keys: Vec<String>,
    pub name: String,
    // For alias terms, parents is reinterpreted as the union-of key list.
    pub parents: Vec<String>,
    pub alias: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundTypeDecl {
    pub name: names::CompoundType,
    pub columns: Vec<ColumnDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConceptTypeDecl {
    // Anonymous (abstract mixin) concept-types carry no name and are
    // not installed in the name registry.
    pub name: Option<names::ConceptType>,
    pub parent: Option<ConceptTypeParentDecl>,
    pub collection: Option<names::Collection>,
    pub columns: Vec<ColumnDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConceptTypeParentDecl {
    /// Reference to a previously declared, named concept-type.
    Named(names::ConceptType),
    /// An anonymous parent nested directly inside its child declaration.
    Anonymous(Box<ConceptTypeDecl>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConceptDomainDecl {
    pub name: names::ConceptDomain,
    pub full_name: String,
    pub is_abstract: bool,
    pub description: Description,
    pub annotations: Annotations,
    pub concepts: Vec<ConceptDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConceptDecl {
    pub name: names::Concept,
    pub full_name: String,
    pub description: Description,
    pub annotations: Annotations,
    // Concept-types this concept is based on, merged in declaration order.
    pub based_on: Vec<names::ConceptType>,
    // Classical in-domain inheritance.
    pub extends: Option<names::Concept>,
    // Weak-entity identification within the same domain.
    pub identified_by: Option<names::Concept>,
    // Prefix applied to imported identifier columns of identified_by.
    pub id_prefix: Option<names::Prefix>,
    pub collection: Option<names::Collection>,
    pub columns: Vec<ColumnDecl>,
    pub related: Vec<RelatedDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelatedDecl {
    // None means the current domain.
    pub domain: Option<names::ConceptDomain>,
    pub concept: names::Concept,
    pub key_prefix: names::Prefix,
    pub arity: Arity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    One,
    ZeroOrOne,
    OneToMany,
    ZeroToMany,
}

impl Arity {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Arity::One => "1",
            Arity::ZeroOrOne => "0..1",
            Arity::OneToMany => "1..N",
            Arity::ZeroToMany => "0..N",
        }
    }
}

impl std::str::FromStr for Arity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(Arity::One),
            "0..1" => Ok(Arity::ZeroOrOne),
            "1..N" => Ok(Arity::OneToMany),
            "0..N" => Ok(Arity::ZeroToMany),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDecl {
    pub name: names::Column,
    pub description: Description,
    pub annotations: Annotations,
    pub column_type: ColumnType,
}

/// The type of a column. ColumnType is shared between declarations and the
/// resolved model: resolution checks that its references exist but does not
/// change its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnType {
    pub tag: ItemTag,
    pub usage: Usage,
    pub default: Option<DefaultValue>,
    pub restriction: Option<Restriction>,
    // Array-separator ladder; empty means scalar.
    pub array_seps: ArraySeps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    IdRef,
    Required,
    Desirable,
    Optional,
}

impl Usage {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Usage::IdRef => "idref",
            Usage::Required => "required",
            Usage::Desirable => "desirable",
            Usage::Optional => "optional",
        }
    }

    /// True if a same-name override from |self| to |other| is a
    /// permitted widening: required → desirable → optional only.
    pub fn widens_to(&self, other: Usage) -> bool {
        use Usage::*;
        match (*self, other) {
            (a, b) if a == b => true,
            (Required, Desirable) | (Required, Optional) | (Desirable, Optional) => true,
            _ => false,
        }
    }
}

impl std::str::FromStr for Usage {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idref" => Ok(Usage::IdRef),
            "required" => Ok(Usage::Required),
            "desirable" => Ok(Usage::Desirable),
            "optional" => Ok(Usage::Optional),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(String),
    /// Defaults to the value of a sibling column.
    Column(names::Column),
}

/// At most one restriction applies to a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Restriction {
    Cv(names::Cv),
    Pattern(names::Pattern),
    Compound(names::CompoundType),
}

/// A ladder of single-character separators distinguishing array dimensions.
/// "," is a one-dimensional array split on commas; ";," is a two-dimensional
/// array of comma-separated runs joined by semicolons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArraySeps(String);

impl ArraySeps {
    pub fn new(seps: impl Into<String>) -> Self {
        Self(seps.into())
    }

    pub fn depth(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The separator of dimension |level|, outermost first.
    pub fn sep(&self, level: usize) -> Option<char> {
        self.0.chars().nth(level)
    }

    /// Split |value| into its innermost scalar cells.
    pub fn cells<'v>(&self, value: &'v str) -> Vec<&'v str> {
        let mut cells = vec![value];
        for sep in self.0.chars() {
            cells = cells
                .into_iter()
                .flat_map(|c| c.split(sep))
                .collect();
        }
        cells
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilePatternDecl {
    pub name: names::FilePattern,
    pub domain: names::ConceptDomain,
    pub concept: names::Concept,
    pub parts: Vec<FilePatternPart>,
}

/// One fragment of a filename pattern: a literal run, or a typed capture
/// bound to a column of the target concept.
#[derive(Debug, Clone, PartialEq)]
pub enum FilePatternPart {
    Literal(String),
    Capture {
        name: String,
        tag: ItemTag,
        column: names::Column,
    },
}

#[cfg(test)]
mod test {
    use super::{ArraySeps, Usage};

    #[test]
    fn test_usage_widening() {
        assert!(Usage::Required.widens_to(Usage::Optional));
        assert!(Usage::Required.widens_to(Usage::Desirable));
        assert!(Usage::Desirable.widens_to(Usage::Optional));
        assert!(Usage::Desirable.widens_to(Usage::Desirable));
        assert!(!Usage::Optional.widens_to(Usage::Required));
        assert!(!Usage::IdRef.widens_to(Usage::Required));
        assert!(!Usage::Required.widens_to(Usage::IdRef));
    }

    #[test]
    fn test_array_cells() {
        let seps = ArraySeps::new(";,");
        assert_eq!(seps.depth(), 2);
        assert_eq!(seps.cells("a,b;c,d"), vec!["a", "b", "c", "d"]);

        let scalar = ArraySeps::default();
        assert_eq!(scalar.cells("a,b"), vec!["a,b"]);
    }
}
