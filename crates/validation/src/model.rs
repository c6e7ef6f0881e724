use crate::cv::Cv;
use crate::errors::Error;
use crate::fpattern::FilePattern;
use crate::registry::registries;
use indexmap::IndexMap;
use models::{names, Annotations, Arity, ColumnType, Description, ModelDecl, Usage};
use serde::Serialize;

registries!(
    registry Collections ( name names::Collection, entry Collection, kind "collection" )
    registry Patterns ( name names::Pattern, entry Pattern, kind "pattern" )
    registry Cvs ( name names::Cv, entry Cv, kind "controlled vocabulary" )
    registry CompoundTypes ( name names::CompoundType, entry CompoundType, kind "compound type" )
    registry ConceptTypes ( name names::ConceptType, entry ConceptType, kind "concept type" )
    registry ConceptDomains ( name names::ConceptDomain, entry ConceptDomain, kind "concept domain" )
    registry Concepts ( name names::Concept, entry Concept, kind "concept" )
    registry FilePatterns ( name names::FilePattern, entry FilePattern, kind "filename pattern" )
);

/// The fully resolved, invariant-checked model. A Model exclusively owns
/// every registry; it is constructed by `resolve` and frozen thereafter.
#[derive(Debug)]
pub struct Model {
    pub project: String,
    pub schema_ver: String,
    pub metadata_collection: Option<names::Collection>,
    pub annotations: Annotations,
    pub collections: Collections,
    pub patterns: Patterns,
    /// The CV of valid null sentinels, bound to its own slot.
    pub null_cv: Cv,
    pub cvs: Cvs,
    pub compound_types: CompoundTypes,
    pub concept_types: ConceptTypes,
    pub domains: ConceptDomains,
    pub file_patterns: FilePatterns,
    /// Content digests of the load (§ signatures manifest).
    pub digests: Digests,
    /// Raw bytes of the meta-schema used to validate this model.
    /// Re-packed verbatim when the model is emitted as an archive.
    pub schema_bytes: bytes::Bytes,
    /// Modification time of the source model document, if known.
    pub source_mtime: Option<std::time::SystemTime>,
    /// The declaration this model was resolved from, retained for
    /// re-serialization when emitting a packaged archive.
    pub decl: ModelDecl,
}

// Model equality is structural over the resolved registries and ignores
// provenance (digests, mtime, retained declaration): a model loaded back
// from an emitted archive compares equal to the model that emitted it.
impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.project == other.project
            && self.schema_ver == other.schema_ver
            && self.metadata_collection == other.metadata_collection
            && self.annotations == other.annotations
            && self.collections == other.collections
            && self.patterns == other.patterns
            && self.null_cv == other.null_cv
            && self.cvs == other.cvs
            && self.compound_types == other.compound_types
            && self.concept_types == other.concept_types
            && self.domains == other.domains
            && self.file_patterns == other.file_patterns
    }
}

impl Model {
    /// True iff |value| is one of the null-sentinel term keys.
    pub fn is_valid_null(&self, value: &str) -> bool {
        matches!(self.null_cv.contains(value, &self.cvs), Ok(true))
    }
}

/// Lowercase hex SHA-1 digests computed during a load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Digests {
    pub schema_sha1: String,
    pub model_sha1: String,
    pub cv_sha1: String,
    pub full_model_sha1: String,
}

/// A named destination within the target backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub name: names::Collection,
    pub path: String,
    pub indices: Vec<Index>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub unique: bool,
    /// (column, direction) pairs; direction is +1 or -1.
    pub keys: Vec<(names::Column, i32)>,
}

/// A named, compiled validation pattern.
#[derive(Debug)]
pub struct Pattern {
    pub name: names::Pattern,
    pub regex: regex::Regex,
}

impl Pattern {
    pub fn compile(name: names::Pattern, source: &str) -> Result<Self, Error> {
        let regex = regex::Regex::new(source).map_err(|source| Error::PatternInvalid {
            name: name.to_string(),
            source,
        })?;
        Ok(Self { name, regex })
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.regex.as_str() == other.regex.as_str()
    }
}

/// A named, reusable column-set usable as a column's type.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundType {
    pub name: names::CompoundType,
    pub columns: ColumnSet,
}

/// A reusable, possibly abstract template of columns. Anonymous
/// concept-types exist only as parents nested within a named declaration
/// and are never installed in the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptType {
    pub name: Option<names::ConceptType>,
    pub parent: Option<ConceptTypeParent>,
    pub collection: Option<names::Collection>,
    pub columns: ColumnSet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConceptTypeParent {
    Named(names::ConceptType),
    Anonymous(Box<ConceptType>),
}

/// A named grouping of concepts sharing a subject area.
#[derive(Debug, PartialEq)]
pub struct ConceptDomain {
    pub name: names::ConceptDomain,
    pub full_name: String,
    pub is_abstract: bool,
    pub description: Description,
    pub annotations: Annotations,
    pub concepts: Concepts,
}

/// An entity type with a column set.
#[derive(Debug, Clone, PartialEq)]
pub struct Concept {
    pub name: names::Concept,
    pub full_name: String,
    pub description: Description,
    pub annotations: Annotations,
    /// The domain which owns this concept.
    pub domain: names::ConceptDomain,
    pub based_on: Vec<names::ConceptType>,
    pub extends: Option<names::Concept>,
    pub identified_by: Option<names::Concept>,
    pub id_prefix: Option<names::Prefix>,
    pub collection: Option<names::Collection>,
    pub columns: ColumnSet,
    pub related: Vec<RelatedConcept>,
}

impl Concept {
    /// The dotted identifier of this concept, unique across the model.
    pub fn qualified_id(&self) -> String {
        [self.domain.as_str(), ".", self.name.as_str()].concat()
    }
}

/// A directed reference from one concept to another. Resolution injects
/// foreign-key columns on the source and records them here.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedConcept {
    /// None means the owning concept's domain.
    pub domain: Option<names::ConceptDomain>,
    pub concept: names::Concept,
    pub key_prefix: names::Prefix,
    pub arity: Arity,
    pub resolved: Option<ResolvedRelation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRelation {
    pub domain: names::ConceptDomain,
    pub concept: names::Concept,
    /// Names of the foreign-key columns injected on the source concept.
    pub columns: Vec<names::Column>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: names::Column,
    pub description: Description,
    pub annotations: Annotations,
    pub column_type: ColumnType,
    /// The concept and column this column was derived from, populated by
    /// weak-entity identification and foreign-key propagation.
    pub reference: Option<ColumnRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub domain: names::ConceptDomain,
    pub concept: names::Concept,
    pub column: names::Column,
}

/// An insertion-ordered mapping from column name to column, which also
/// tracks the subset of columns acting as identifiers.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    columns: IndexMap<names::Column, Column>,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&names::Column, &Column)> {
        self.columns.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &names::Column> {
        self.columns.keys()
    }

    /// The identifier columns, in insertion order.
    pub fn id_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .values()
            .filter(|c| c.column_type.usage == Usage::IdRef)
    }

    /// Insert a column which must not already be present.
    /// |owner| names the owning concept or type for error reporting.
    pub fn insert_new(&mut self, owner: &str, column: Column) -> Result<(), Error> {
        match self.columns.entry(column.name.clone()) {
            indexmap::map::Entry::Occupied(occupied) => Err(Error::ColumnConflict {
                concept: owner.to_string(),
                column: occupied.key().to_string(),
                detail: "a column of that name is already present".to_string(),
            }),
            indexmap::map::Entry::Vacant(vacant) => {
                vacant.insert(column);
                Ok(())
            }
        }
    }

    /// Merge |column| over this set. An absent name is appended. A present
    /// name is overridden in place when the override is type-compatible:
    /// same primitive tag, and a usage widening of required → desirable →
    /// optional only. Anything else is a conflict.
    pub fn merge_over(&mut self, owner: &str, column: Column) -> Result<(), Error> {
        match self.columns.entry(column.name.clone()) {
            indexmap::map::Entry::Occupied(mut occupied) => {
                let existing = occupied.get();
                if existing.column_type.tag != column.column_type.tag {
                    return Err(Error::ColumnConflict {
                        concept: owner.to_string(),
                        column: occupied.key().to_string(),
                        detail: format!(
                            "override changes primitive type {} to {}",
                            existing.column_type.tag, column.column_type.tag
                        ),
                    });
                }
                if !existing.column_type.usage.widens_to(column.column_type.usage) {
                    return Err(Error::ColumnConflict {
                        concept: owner.to_string(),
                        column: occupied.key().to_string(),
                        detail: format!(
                            "override narrows usage {} to {}",
                            existing.column_type.usage.as_str(),
                            column.column_type.usage.as_str()
                        ),
                    });
                }
                // Type-compatible override: the later column wins,
                // keeping the earlier position.
                occupied.insert(column);
                Ok(())
            }
            indexmap::map::Entry::Vacant(vacant) => {
                vacant.insert(column);
                Ok(())
            }
        }
    }

    /// Merge every column of |other| over this set, in order.
    pub fn merge_all(&mut self, owner: &str, other: &ColumnSet) -> Result<(), Error> {
        for column in other.columns.values() {
            self.merge_over(owner, column.clone())?;
        }
        Ok(())
    }
}

// Order-aware equality, as for registries.
impl PartialEq for ColumnSet {
    fn eq(&self, other: &Self) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(l, r)| l == r)
    }
}
