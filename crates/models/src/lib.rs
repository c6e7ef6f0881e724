mod annotations;
mod decl;
mod itemtype;
pub mod names;

pub use annotations::{AnnotationValue, Annotations, Description, Fragment, FragmentKind};
pub use decl::{
    Arity, ArraySeps, CollectionDecl, ColumnDecl, ColumnType, CompoundTypeDecl, ConceptDecl,
    ConceptDomainDecl, ConceptTypeDecl, ConceptTypeParentDecl, CvDecl, CvSourceDecl, DefaultValue,
    FilePatternDecl, FilePatternPart, IndexDecl, ModelDecl, PatternDecl, RelatedDecl, Restriction,
    TermDecl, Usage,
};
pub use itemtype::{item_type, ItemTag, ItemType};
