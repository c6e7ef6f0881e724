mod columns;
mod concept_type;
mod cv;
mod domain;
mod errors;
mod fpattern;
mod model;
mod record;
mod registry;
mod relations;
mod resolve;

pub use cv::{Cv, CvState, Term};
pub use errors::Error;
pub use fpattern::{CaptureSpec, FileMatch, FilePattern};
pub use model::{
    Collection, Collections, Column, ColumnRef, ColumnSet, CompoundType, CompoundTypes, Concept,
    ConceptDomain, ConceptDomains, ConceptType, ConceptTypeParent, ConceptTypes, Concepts, Cvs,
    Digests, FilePatterns, Index, Model, Pattern, Patterns, RelatedConcept, ResolvedRelation,
};
pub use record::{FaultKind, RecordFault};
pub use resolve::{resolve, ResolveOptions, TermSource};
