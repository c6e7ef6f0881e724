use crate::errors::Error;
use crate::model::Cvs;
use indexmap::IndexMap;
use models::{names, Annotations, CvDecl, CvSourceDecl, Description, TermDecl};
use std::collections::HashMap;

/// A resolved controlled vocabulary: an enumerated set of terms with
/// optional parent/ancestor relations, or an unresolved URI reference,
/// or a union (meta-CV) over earlier vocabularies.
#[derive(Debug)]
pub struct Cv {
    pub id: Option<names::Cv>,
    pub name: Option<String>,
    pub description: Description,
    pub annotations: Annotations,
    /// The external file this CV's terms were read from, if any.
    /// Rewritten to a flat `cv/` member name when the model is packaged.
    pub file: Option<String>,
    pub state: CvState,
}

#[derive(Debug)]
pub enum CvState {
    /// Terms are known, keyed by primary key in declaration order.
    /// |lookup| maps every primary and alternate key to its primary key.
    Resolved {
        terms: IndexMap<String, Term>,
        lookup: HashMap<String, String>,
    },
    /// Terms live behind reference URIs and were not fetched at load.
    /// Term-level validation against this CV is a distinguished error.
    Unresolved { uris: Vec<url::Url> },
    /// A meta-CV: the ordered union of the enclosed CVs' terms.
    Union { members: Vec<names::Cv> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub key: String,
    pub alt_keys: Vec<String>,
    pub name: String,
    /// For alias terms, the union-of key list; otherwise parent keys.
    pub parents: Vec<String>,
    /// Reflexive-free transitive closure of parents, as primary keys.
    /// Always empty for alias terms.
    pub ancestors: Vec<String>,
    pub alias: bool,
}

impl Cv {
    /// The identifier used in error messages and the serialized form.
    pub fn label(&self) -> &str {
        match (&self.id, &self.name) {
            (Some(id), _) => id.as_str(),
            (None, Some(name)) => name.as_str(),
            (None, None) => "(anonymous)",
        }
    }

    /// True iff |key| is a primary or alternate key of a term of this CV
    /// or of any enclosed CV. Matching is case-sensitive. Validation
    /// against an unresolved CV is an error, never a silent pass.
    pub fn contains(&self, key: &str, cvs: &Cvs) -> Result<bool, Error> {
        match &self.state {
            CvState::Resolved { lookup, .. } => Ok(lookup.contains_key(key)),
            CvState::Unresolved { .. } => Err(Error::CvUnresolved {
                cv: self.label().to_string(),
            }),
            CvState::Union { members } => {
                for member in members {
                    if cvs.must_get(member)?.contains(key, cvs)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// The terms of this CV in declaration order. A union yields members'
    /// terms in member order. Unresolved CVs have no observable terms.
    pub fn terms<'m>(&'m self, cvs: &'m Cvs) -> Vec<&'m Term> {
        match &self.state {
            CvState::Resolved { terms, .. } => terms.values().collect(),
            CvState::Unresolved { .. } => Vec::new(),
            CvState::Union { members } => members
                .iter()
                .filter_map(|m| cvs.get(m))
                .flat_map(|cv| cv.terms(cvs))
                .collect(),
        }
    }
}

// Order-aware equality over terms; the lookup index is derived state.
impl PartialEq for Cv {
    fn eq(&self, other: &Self) -> bool {
        let state = match (&self.state, &other.state) {
            (
                CvState::Resolved { terms: l, .. },
                CvState::Resolved { terms: r, .. },
            ) => l.len() == r.len() && l.iter().zip(r.iter()).all(|(l, r)| l == r),
            (CvState::Unresolved { uris: l }, CvState::Unresolved { uris: r }) => l == r,
            (CvState::Union { members: l }, CvState::Union { members: r }) => l == r,
            _ => false,
        };
        state
            && self.id == other.id
            && self.name == other.name
            && self.description == other.description
            && self.annotations == other.annotations
    }
}

/// Resolve one CV declaration. |fetch| supplies the terms of external-file
/// CVs; when it is None (skip-CV-parse mode) such CVs stay unresolved.
pub fn resolve_cv(
    decl: &CvDecl,
    fetch: &mut dyn FnMut(&str) -> Option<anyhow::Result<Vec<TermDecl>>>,
    cvs: &Cvs,
) -> Result<Cv, Error> {
    let label = decl
        .id
        .as_ref()
        .map(|id| id.to_string())
        .or_else(|| decl.name.clone())
        .unwrap_or_else(|| "(anonymous)".to_string());

    let (state, file) = match &decl.source {
        CvSourceDecl::Inline { terms } => (build_terms(&label, terms)?, None),
        CvSourceDecl::File { path } => match fetch(path) {
            Some(terms) => {
                let terms = terms.map_err(|source| Error::CvFetch {
                    cv: label.clone(),
                    source,
                })?;
                (build_terms(&label, &terms)?, Some(path.clone()))
            }
            // skip-CV-parse mode: structurally present, terms unknown.
            None => (CvState::Unresolved { uris: Vec::new() }, Some(path.clone())),
        },
        CvSourceDecl::Uris { uris } => (CvState::Unresolved { uris: uris.clone() }, None),
        CvSourceDecl::Union { members } => {
            // Members must be declared before their union.
            for member in members {
                cvs.must_get(member)?;
            }
            (CvState::Union { members: members.clone() }, None)
        }
    };

    Ok(Cv {
        id: decl.id.clone(),
        name: decl.name.clone(),
        description: decl.description.clone(),
        annotations: decl.annotations.clone(),
        file,
        state,
    })
}

/// Build the resolved term map of a simple CV: verify key uniqueness
/// across primary and alternate keys taken together, resolve parent and
/// union-of keys, and compute the ancestor closure of each non-alias term.
pub fn build_terms(cv: &str, decls: &[TermDecl]) -> Result<CvState, Error> {
    let mut terms = IndexMap::new();
    let mut lookup = HashMap::new();

    for decl in decls {
        for key in std::iter::once(&decl.key).chain(decl.alt_keys.iter()) {
            if lookup
                .insert(key.clone(), decl.key.clone())
                .is_some()
            {
                return Err(Error::DuplicateName {
                    kind: "term key",
                    name: key.clone(),
                });
            }
        }
        terms.insert(
            decl.key.clone(),
            Term {
                key: decl.key.clone(),
                alt_keys: decl.alt_keys.clone(),
                name: decl.name.clone(),
                parents: decl.parents.clone(),
                ancestors: Vec::new(),
                alias: decl.alias,
            },
        );
    }

    // Every parent (or union-of) key must resolve within this CV.
    for term in terms.values() {
        for parent in &term.parents {
            if !lookup.contains_key(parent.as_str()) {
                return Err(Error::CvTermNotFound {
                    cv: cv.to_string(),
                    term: parent.clone(),
                });
            }
        }
    }

    // Ancestor closure of non-alias terms, memoized term by term.
    // Alias terms reinterpret parents as union-of and get no closure.
    let mut closed: HashMap<String, Vec<String>> = HashMap::new();
    let keys: Vec<String> = terms.keys().cloned().collect();
    for key in &keys {
        if terms[key.as_str()].alias {
            continue;
        }
        let mut visiting = Vec::new();
        let ancestors = close_over(cv, key, &terms, &lookup, &mut closed, &mut visiting)?;
        terms[key.as_str()].ancestors = ancestors;
    }

    Ok(CvState::Resolved { terms, lookup })
}

// Depth-first closure over parents, restricted to this CV. |visiting|
// carries the active path for cycle detection.
fn close_over(
    cv: &str,
    key: &str,
    terms: &IndexMap<String, Term>,
    lookup: &HashMap<String, String>,
    closed: &mut HashMap<String, Vec<String>>,
    visiting: &mut Vec<String>,
) -> Result<Vec<String>, Error> {
    if let Some(done) = closed.get(key) {
        return Ok(done.clone());
    }
    if visiting.iter().any(|k| k == key) {
        return Err(Error::CvCycle {
            cv: cv.to_string(),
            term: key.to_string(),
        });
    }
    visiting.push(key.to_string());

    let mut ancestors = Vec::new();
    let parents = terms[key].parents.clone();
    for parent in &parents {
        // Parents may be written as alternate keys; close over primaries.
        let parent = lookup[parent.as_str()].clone();
        if !ancestors.contains(&parent) {
            ancestors.push(parent.clone());
        }
        for above in close_over(cv, &parent, terms, lookup, closed, visiting)? {
            if above != *key && !ancestors.contains(&above) {
                ancestors.push(above);
            }
        }
    }

    visiting.pop();
    closed.insert(key.to_string(), ancestors.clone());
    Ok(ancestors)
}
