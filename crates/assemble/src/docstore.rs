use crate::fragment::{cv_documents, ProjectOptions};
use crate::serialize::{serialize, Entity};
use indexmap::IndexMap;
use models::{item_type, ItemTag};
use serde_json::Value;
use validation::{Model, RecordFault};

/// The document-store backend surface consumed by projection and bulk
/// ingest. Client libraries are external; implementations adapt one to
/// this trait.
pub trait DocumentStore {
    fn create_collection(&mut self, name: &str, path: &str) -> anyhow::Result<()>;
    fn ensure_index(&mut self, collection: &str, index: &IndexSpec) -> anyhow::Result<()>;
    fn insert(&mut self, collection: &str, documents: &[Value]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub unique: bool,
    pub keys: Vec<(String, i32)>,
}

impl IndexSpec {
    fn field(name: &str) -> Self {
        Self {
            unique: false,
            keys: vec![(name.to_string(), 1)],
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("backend error on collection {collection:?}")]
    BackendError {
        collection: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Model(#[from] validation::Error),
}

fn backend<T>(collection: &str, result: anyhow::Result<T>) -> Result<T, ProjectError> {
    result.map_err(|source| ProjectError::BackendError {
        collection: collection.to_string(),
        source,
    })
}

/// Project the resolved model into a document store: create every
/// declared collection and its indices, then insert the serialized model
/// into the configured metadata collection as a sequence of documents
/// with its three standing auxiliary indices.
pub fn project_document_store(
    model: &Model,
    store: &mut dyn DocumentStore,
    options: &ProjectOptions,
) -> Result<(), ProjectError> {
    for (name, collection) in model.collections.iter() {
        backend(name, store.create_collection(name, &collection.path))?;
        for index in &collection.indices {
            let spec = IndexSpec {
                unique: index.unique,
                keys: index
                    .keys
                    .iter()
                    .map(|(column, direction)| (column.to_string(), *direction))
                    .collect(),
            };
            backend(name, store.ensure_index(name, &spec))?;
        }
        tracing::debug!(collection = %name, indices = collection.indices.len(), "ensured collection");
    }

    let Some(metadata) = &model.metadata_collection else {
        return Ok(());
    };
    let metadata = metadata.as_str();

    let mut documents = vec![serialize(model, Entity::Model(model))];
    for (_, domain) in model.domains.iter() {
        documents.push(serialize(model, Entity::ConceptDomain(domain)));
        for (_, concept) in domain.concepts.iter() {
            documents.push(serialize(model, Entity::Concept(concept)));
        }
    }
    documents.extend(cv_documents(model, &model.null_cv, options));
    for (_, cv) in model.cvs.iter() {
        documents.extend(cv_documents(model, cv, options));
    }
    backend(metadata, store.insert(metadata, &documents))?;

    for field in ["term", "parents", "ancestors"] {
        backend(metadata, store.ensure_index(metadata, &IndexSpec::field(field)))?;
    }

    tracing::info!(
        collection = %metadata,
        documents = documents.len(),
        "projected model metadata"
    );
    Ok(())
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Records per committed batch.
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self { batch_size: 20_000 }
    }
}

/// Per-ingest accounting: what was inserted, and every per-record fault.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub inserted: usize,
    pub rejected: usize,
    /// (record ordinal, faults) for each rejected record.
    pub faults: Vec<(usize, Vec<RecordFault>)>,
}

/// Validate and bulk-load tabular records of one concept into its
/// collection, batch by batch. Faulted records are reported and skipped;
/// the batch as a whole still commits.
pub fn bulk_load(
    model: &Model,
    store: &mut dyn DocumentStore,
    domain: &str,
    concept: &str,
    records: &[IndexMap<String, String>],
    options: &IngestOptions,
) -> Result<IngestReport, ProjectError> {
    let resolved = model.domains.must_get(domain)?.concepts.must_get(concept)?;
    let collection = resolved
        .collection
        .as_ref()
        .ok_or_else(|| validation::Error::UnknownReference {
            kind: "collection",
            name: resolved.qualified_id(),
        })?
        .to_string();

    let mut report = IngestReport::default();
    let mut batch = Vec::new();

    for (ordinal, record) in records.iter().enumerate() {
        let faults = model.validate_record(domain, concept, record)?;
        if !faults.is_empty() {
            report.rejected += 1;
            report.faults.push((ordinal, faults));
            continue;
        }
        batch.push(record_document(model, resolved, record));

        if batch.len() >= options.batch_size {
            backend(&collection, store.insert(&collection, &batch))?;
            report.inserted += batch.len();
            batch.clear();
        }
    }
    if !batch.is_empty() {
        backend(&collection, store.insert(&collection, &batch))?;
        report.inserted += batch.len();
    }

    tracing::info!(
        concept = %resolved.qualified_id(),
        inserted = report.inserted,
        rejected = report.rejected,
        "bulk load finished"
    );
    Ok(report)
}

// Convert a validated record into its typed document form: integers and
// decimals become numbers, arrays split on their separator ladder, and
// null sentinels and absent optionals are omitted.
fn record_document(
    model: &Model,
    concept: &validation::Concept,
    record: &IndexMap<String, String>,
) -> Value {
    let mut doc = serde_json::Map::new();
    for (name, column) in concept.columns.iter() {
        let Some(raw) = record.get(name.as_str()).filter(|v| !v.is_empty()) else {
            continue;
        };
        if model.is_valid_null(raw) {
            continue;
        }
        doc.insert(name.to_string(), cell_value(column.column_type.tag, column, raw));
    }
    Value::Object(doc)
}

fn cell_value(tag: ItemTag, column: &validation::Column, raw: &str) -> Value {
    if column.column_type.array_seps.is_empty() {
        return scalar_value(tag, raw);
    }
    Value::Array(
        column
            .column_type
            .array_seps
            .cells(raw)
            .into_iter()
            .map(|cell| scalar_value(tag, cell))
            .collect(),
    )
}

fn scalar_value(tag: ItemTag, raw: &str) -> Value {
    if tag == ItemTag::Compound {
        return serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    }
    item_type(tag)
        .parse(raw)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}
