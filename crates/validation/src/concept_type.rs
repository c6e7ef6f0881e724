use crate::columns::{self, Restrictions};
use crate::errors::Error;
use crate::model::{ColumnSet, ConceptType, ConceptTypeParent, ConceptTypes};
use models::{ConceptTypeDecl, ConceptTypeParentDecl};

/// Resolve a concept-type declaration, recursing into any anonymous
/// parent. Named parents must already be registered, which enforces
/// declaration order.
pub fn resolve_concept_type(
    decl: &ConceptTypeDecl,
    registry: &ConceptTypes,
    refs: &Restrictions,
) -> Result<ConceptType, Error> {
    let parent = match &decl.parent {
        Some(ConceptTypeParentDecl::Named(name)) => {
            registry.must_get(name)?;
            Some(ConceptTypeParent::Named(name.clone()))
        }
        Some(ConceptTypeParentDecl::Anonymous(inner)) => Some(ConceptTypeParent::Anonymous(
            Box::new(resolve_concept_type(inner, registry, refs)?),
        )),
        None => None,
    };

    let owner = decl
        .name
        .as_ref()
        .map(|n| n.as_str())
        .unwrap_or("(anonymous concept type)");
    let columns = columns::build_set(owner, &decl.columns, refs)?;

    Ok(ConceptType {
        name: decl.name.clone(),
        parent,
        collection: decl.collection.clone(),
        columns,
    })
}

impl ConceptType {
    /// The root→leaf lineage of this concept-type, including anonymous
    /// abstract members.
    pub fn chain<'m>(&'m self, registry: &'m ConceptTypes) -> Result<Vec<&'m ConceptType>, Error> {
        let mut chain = vec![self];
        let mut cursor = self;
        while let Some(parent) = &cursor.parent {
            cursor = match parent {
                ConceptTypeParent::Named(name) => registry.must_get(name)?,
                ConceptTypeParent::Anonymous(inner) => inner.as_ref(),
            };
            chain.push(cursor);
        }
        chain.reverse();
        Ok(chain)
    }

    /// The column-set of the whole lineage: parent columns first, with
    /// same-name child overrides applied under the widening rule.
    pub fn merged_columns(&self, registry: &ConceptTypes) -> Result<ColumnSet, Error> {
        let owner = self
            .name
            .as_ref()
            .map(|n| n.as_str())
            .unwrap_or("(anonymous concept type)");

        let mut merged = ColumnSet::new();
        for member in self.chain(registry)? {
            merged.merge_all(owner, &member.columns)?;
        }
        Ok(merged)
    }

    /// The collection link of this lineage: the leaf-most member that
    /// declares one wins.
    pub fn chain_collection<'m>(
        &'m self,
        registry: &'m ConceptTypes,
    ) -> Result<Option<&'m models::names::Collection>, Error> {
        Ok(self
            .chain(registry)?
            .iter()
            .rev()
            .find_map(|member| member.collection.as_ref()))
    }
}
