/// Errors raised while resolving a model declaration. Any one of these is
/// fatal to the load: a partially resolved Model is never returned.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{kind} {name:?} is referenced but not defined")]
    UnknownReference { kind: &'static str, name: String },
    #[error("duplicate {kind} name {name:?}")]
    DuplicateName { kind: &'static str, name: String },
    #[error("column {column:?} of concept {concept:?} conflicts: {detail}")]
    ColumnConflict {
        concept: String,
        column: String,
        detail: String,
    },
    #[error("controlled vocabulary {cv:?} has a parent cycle through term {term:?}")]
    CvCycle { cv: String, term: String },
    #[error("term {term:?} does not resolve within controlled vocabulary {cv:?}")]
    CvTermNotFound { cv: String, term: String },
    #[error("controlled vocabulary {cv:?} is unresolved; its terms are URI-referenced and were not fetched")]
    CvUnresolved { cv: String },
    #[error("pattern {name:?} failed to compile")]
    PatternInvalid {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("failed reading terms of controlled vocabulary {cv:?}")]
    CvFetch {
        cv: String,
        #[source]
        source: anyhow::Error,
    },
}
