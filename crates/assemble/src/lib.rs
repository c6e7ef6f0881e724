mod docstore;
mod fragment;
mod search;
mod serialize;

pub use docstore::{
    bulk_load, project_document_store, DocumentStore, IndexSpec, IngestOptions, IngestReport,
    ProjectError,
};
pub use fragment::{cv_documents, ProjectOptions, MAX_SEGMENT_TERMS};
pub use search::search_mappings;
pub use serialize::{serialize, Entity};
