use crate::columns::{self, Restrictions};
use crate::concept_type::resolve_concept_type;
use crate::cv::{build_terms, resolve_cv, Cv};
use crate::errors::Error;
use crate::model::{
    Collection, Collections, CompoundType, CompoundTypes, ConceptDomains, ConceptTypes, Cvs,
    Digests, FilePatterns, Index, Model, Pattern, Patterns,
};
use crate::{domain, fpattern, relations};
use models::{ModelDecl, TermDecl};

/// Supplies the terms of external-file CVs, by path relative to the CV
/// directory. Implementations feed every byte they read into the running
/// CV digest as a side effect.
pub trait TermSource {
    fn terms(&mut self, path: &str) -> anyhow::Result<Vec<TermDecl>>;
}

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Leave external-file CVs unresolved instead of parsing them.
    pub skip_cv_parse: bool,
}

/// Resolve a model declaration into a frozen Model. Resolution is atomic:
/// it either returns a fully linked, invariant-checked model, or the
/// first error encountered. Declaration order is preserved throughout.
pub fn resolve(
    decl: ModelDecl,
    source: &mut dyn TermSource,
    options: &ResolveOptions,
) -> Result<Model, Error> {
    // Collections and named patterns preload; everything else may
    // reference them.
    let mut collections = Collections::new();
    for collection in &decl.collections {
        collections.insert(
            collection.name.clone(),
            Collection {
                name: collection.name.clone(),
                path: collection.path.clone(),
                indices: collection
                    .indices
                    .iter()
                    .map(|index| Index {
                        unique: index.unique,
                        keys: index.keys.clone(),
                    })
                    .collect(),
            },
        )?;
    }
    if let Some(metadata) = &decl.metadata_collection {
        collections.must_get(metadata)?;
    }

    let mut patterns = Patterns::new();
    for pattern in &decl.patterns {
        patterns.insert(
            pattern.name.clone(),
            Pattern::compile(pattern.name.clone(), &pattern.regex)?,
        )?;
    }

    // The null-value CV is a normal CV bound to a dedicated slot.
    let null_cv = Cv {
        id: None,
        name: Some("nullValues".to_string()),
        description: Default::default(),
        annotations: Default::default(),
        file: None,
        state: build_terms("nullValues", &decl.null_values)?,
    };

    // CVs resolve in declaration order; a CV may reference only CVs
    // declared before it.
    let mut cvs = Cvs::new();
    for cv_decl in &decl.cvs {
        let mut fetch = |path: &str| {
            if options.skip_cv_parse {
                None
            } else {
                Some(source.terms(path))
            }
        };
        let cv = resolve_cv(cv_decl, &mut fetch, &cvs)?;
        let Some(id) = &cv_decl.id else {
            return Err(Error::UnknownReference {
                kind: "controlled vocabulary id",
                name: cv_decl.name.clone().unwrap_or_default(),
            });
        };
        cvs.insert(id.clone(), cv)?;
    }

    // Compound types are order-sensitive: referenced compound types must
    // already be registered.
    let mut compound_types = CompoundTypes::new();
    for compound in &decl.compound_types {
        let columns = columns::build_set(
            compound.name.as_str(),
            &compound.columns,
            &Restrictions {
                patterns: &patterns,
                cvs: &cvs,
                compound_types: &compound_types,
            },
        )?;
        compound_types.insert(
            compound.name.clone(),
            CompoundType {
                name: compound.name.clone(),
                columns,
            },
        )?;
    }

    // Concept types, likewise in declaration order. Anonymous members
    // exist only nested inside named declarations.
    let mut concept_types = ConceptTypes::new();
    for concept_type in &decl.concept_types {
        let resolved = resolve_concept_type(
            concept_type,
            &concept_types,
            &Restrictions {
                patterns: &patterns,
                cvs: &cvs,
                compound_types: &compound_types,
            },
        )?;
        if let Some(collection) = &resolved.collection {
            collections.must_get(collection)?;
        }
        if let Some(name) = &concept_type.name {
            concept_types.insert(name.clone(), resolved)?;
        }
    }

    // Concept domains.
    let mut domains = ConceptDomains::new();
    for domain_decl in &decl.domains {
        let resolved = domain::resolve_domain(
            domain_decl,
            &concept_types,
            &Restrictions {
                patterns: &patterns,
                cvs: &cvs,
                compound_types: &compound_types,
            },
        )?;
        for (_, concept) in resolved.concepts.iter() {
            if let Some(collection) = &concept.collection {
                collections.must_get(collection)?;
            }
        }
        domains.insert(domain_decl.name.clone(), resolved)?;
    }

    // Second pass: related-concept resolution and foreign-key injection.
    relations::propagate(&mut domains)?;
    domain::check_idref_ladders(&domains)?;
    check_indices(&collections, &domains)?;

    // Filename patterns come last; they reference resolved concepts.
    let mut file_patterns = FilePatterns::new();
    for fp in &decl.file_patterns {
        file_patterns.insert(fp.name.clone(), fpattern::compile(fp, &domains)?)?;
    }

    tracing::info!(
        project = %decl.project,
        domains = domains.len(),
        cvs = cvs.len(),
        collections = collections.len(),
        "resolved model"
    );

    Ok(Model {
        project: decl.project.clone(),
        schema_ver: decl.schema_ver.clone(),
        metadata_collection: decl.metadata_collection.clone(),
        annotations: decl.annotations.clone(),
        collections,
        patterns,
        null_cv,
        cvs,
        compound_types,
        concept_types,
        domains,
        file_patterns,
        digests: Digests::default(),
        schema_bytes: bytes::Bytes::new(),
        source_mtime: None,
        decl,
    })
}

// Every column referenced by an index must exist on a concept assigned
// to the index's collection. A collection no concept maps to has nothing
// to check against.
fn check_indices(collections: &Collections, domains: &ConceptDomains) -> Result<(), Error> {
    for (collection_name, collection) in collections.iter() {
        let assigned: Vec<_> = domains
            .values()
            .flat_map(|d| d.concepts.values())
            .filter(|c| c.collection.as_ref() == Some(collection_name))
            .collect();
        if assigned.is_empty() {
            continue;
        }

        for index in &collection.indices {
            for (column, _) in &index.keys {
                if !assigned.iter().any(|c| c.columns.get(column).is_some()) {
                    return Err(Error::UnknownReference {
                        kind: "index column",
                        name: column.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}
