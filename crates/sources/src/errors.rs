/// Errors raised while opening, validating, or re-packaging a model
/// document. Loading is atomic: the first error aborts the load.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("meta-schema violation at {scope}: {detail}")]
    SchemaViolation { scope: String, detail: String },
    #[error("corrupt archive: {detail}")]
    CorruptArchive { detail: String },
    #[error("failed to parse model XML")]
    Xml(#[from] roxmltree::Error),
    #[error("failed to read or write archive member")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to serialize model XML")]
    Emit(#[source] anyhow::Error),
    #[error(transparent)]
    Resolve(#[from] validation::Error),
    #[error("I/O failure")]
    IOError(#[from] std::io::Error),
}

impl LoadError {
    pub(crate) fn violation(scope: impl std::fmt::Display, detail: impl Into<String>) -> Self {
        LoadError::SchemaViolation {
            scope: scope.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn corrupt(detail: impl Into<String>) -> Self {
        LoadError::CorruptArchive {
            detail: detail.into(),
        }
    }
}
