use crate::columns::{self, Restrictions};
use crate::errors::Error;
use crate::model::{
    Column, ColumnRef, ColumnSet, Concept, ConceptDomain, ConceptTypes, Concepts, RelatedConcept,
};
use models::{names, ConceptDecl, ConceptDomainDecl, Usage};

/// Resolve one concept-domain: its concepts in declaration order.
/// Concepts may extend or be identified by concepts declared earlier in
/// the same domain.
pub fn resolve_domain(
    decl: &ConceptDomainDecl,
    concept_types: &ConceptTypes,
    refs: &Restrictions,
) -> Result<ConceptDomain, Error> {
    let mut concepts = Concepts::new();
    for concept in &decl.concepts {
        let resolved = resolve_concept(&decl.name, concept, &concepts, concept_types, refs)?;
        concepts.insert(concept.name.clone(), resolved)?;
    }

    Ok(ConceptDomain {
        name: decl.name.clone(),
        full_name: decl.full_name.clone(),
        is_abstract: decl.is_abstract,
        description: decl.description.clone(),
        annotations: decl.annotations.clone(),
        concepts,
    })
}

/// Resolve one concept. The column-set merge order is deterministic:
///
///   1. concept-type column-sets, in declaration order;
///   2. the `extends` parent's fully merged column-set;
///   3. the `identifiedBy` concept's identifier columns, prefixed;
///   4. locally declared columns.
fn resolve_concept(
    domain: &names::ConceptDomain,
    decl: &ConceptDecl,
    siblings: &Concepts,
    concept_types: &ConceptTypes,
    refs: &Restrictions,
) -> Result<Concept, Error> {
    let owner = decl.name.as_str();
    let mut columns = ColumnSet::new();
    let mut collection = decl.collection.clone();

    // 1. Concept-types this concept is based on.
    for type_name in &decl.based_on {
        let concept_type = concept_types.must_get(type_name)?;
        columns.merge_all(owner, &concept_type.merged_columns(concept_types)?)?;
        if collection.is_none() {
            collection = concept_type.chain_collection(concept_types)?.cloned();
        }
    }

    // 2. Classical inheritance from an earlier concept of this domain.
    if let Some(parent_name) = &decl.extends {
        let parent = siblings.must_get(parent_name)?;
        columns.merge_all(owner, &parent.columns)?;
        if collection.is_none() {
            collection = parent.collection.clone();
        }
    }

    // 3. Weak-entity identification: import the id-concept's identifier
    // columns under the declared prefix. The imported columns keep their
    // idref usage (they are part of this concept's composite identity)
    // and record where they came from. Collisions are hard errors.
    if let Some(id_name) = &decl.identified_by {
        let id_concept = siblings.must_get(id_name)?;
        let prefix = decl.id_prefix.as_ref().ok_or_else(|| Error::UnknownReference {
            kind: "identification prefix",
            name: decl.name.to_string(),
        })?;

        for id_column in id_concept.columns.id_columns() {
            let mut imported = id_column.clone();
            imported.name = id_column.name.prefixed(prefix);
            imported.reference = Some(ColumnRef {
                domain: domain.clone(),
                concept: id_name.clone(),
                column: id_column.name.clone(),
            });
            columns.insert_new(owner, imported)?;
        }
    }

    // 4. Locally declared columns, which may override inherited ones
    // under the widening rule.
    for column_decl in &decl.columns {
        columns.merge_over(owner, columns::build_column(column_decl, refs)?)?;
    }

    columns::check_defaults(&columns)?;

    let related = decl
        .related
        .iter()
        .map(|r| RelatedConcept {
            domain: r.domain.clone(),
            concept: r.concept.clone(),
            key_prefix: r.key_prefix.clone(),
            arity: r.arity,
            resolved: None,
        })
        .collect();

    Ok(Concept {
        name: decl.name.clone(),
        full_name: decl.full_name.clone(),
        description: decl.description.clone(),
        annotations: decl.annotations.clone(),
        domain: domain.clone(),
        based_on: decl.based_on.clone(),
        extends: decl.extends.clone(),
        identified_by: decl.identified_by.clone(),
        id_prefix: decl.id_prefix.clone(),
        collection,
        columns,
        related,
    })
}

/// Check that an imported idref column's array ladder agrees with the
/// column it refers to. Runs once the whole domain set is resolved.
pub fn check_idref_ladders(domains: &crate::model::ConceptDomains) -> Result<(), Error> {
    for (_, domain) in domains.iter() {
        for (_, concept) in domain.concepts.iter() {
            for (name, column) in concept.columns.iter() {
                let (Usage::IdRef, Some(reference)) =
                    (column.column_type.usage, &column.reference)
                else {
                    continue;
                };
                if column.column_type.array_seps.depth() == 0 {
                    continue;
                }
                let referred = domains
                    .must_get(&reference.domain)?
                    .concepts
                    .must_get(&reference.concept)?
                    .columns
                    .get(&reference.column)
                    .ok_or_else(|| Error::UnknownReference {
                        kind: "column",
                        name: reference.column.to_string(),
                    })?;
                if referred.column_type.array_seps.depth() < column.column_type.array_seps.depth() {
                    return Err(Error::ColumnConflict {
                        concept: concept.name.to_string(),
                        column: name.to_string(),
                        detail: "an idref column carries an array ladder its referred column lacks"
                            .to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::resolve_domain;
    use crate::columns::Restrictions;
    use crate::model::{CompoundTypes, ConceptTypes, Cvs, Patterns};
    use models::{
        names, Annotations, ArraySeps, ColumnDecl, ColumnType, ConceptDecl, ConceptDomainDecl,
        Description, ItemTag, Usage,
    };

    fn column(name: &str, usage: Usage) -> ColumnDecl {
        ColumnDecl {
            name: names::Column::new(name),
            description: Description::new(),
            annotations: Annotations::new(),
            column_type: ColumnType {
                tag: ItemTag::String,
                usage,
                default: None,
                restriction: None,
                array_seps: ArraySeps::default(),
            },
        }
    }

    fn concept(name: &str, cols: Vec<ColumnDecl>) -> ConceptDecl {
        ConceptDecl {
            name: names::Concept::new(name),
            full_name: name.to_uppercase(),
            description: Description::new(),
            annotations: Annotations::new(),
            based_on: Vec::new(),
            extends: None,
            identified_by: None,
            id_prefix: None,
            collection: None,
            columns: cols,
            related: Vec::new(),
        }
    }

    fn domain(concepts: Vec<ConceptDecl>) -> ConceptDomainDecl {
        ConceptDomainDecl {
            name: names::ConceptDomain::new("s"),
            full_name: "Samples".to_string(),
            is_abstract: false,
            description: Description::new(),
            annotations: Annotations::new(),
            concepts,
        }
    }

    fn refs<'m>(
        patterns: &'m Patterns,
        cvs: &'m Cvs,
        compound_types: &'m CompoundTypes,
    ) -> Restrictions<'m> {
        Restrictions {
            patterns,
            cvs,
            compound_types,
        }
    }

    #[test]
    fn test_weak_entity_identification() {
        let (patterns, cvs, compound_types) = (Patterns::new(), Cvs::new(), CompoundTypes::new());
        let concept_types = ConceptTypes::new();

        let mut sample = concept(
            "sample",
            vec![column("id", Usage::IdRef), column("tissue", Usage::Required)],
        );
        sample.identified_by = Some(names::Concept::new("donor"));
        sample.id_prefix = Some(names::Prefix::new("donor_"));

        let decl = domain(vec![
            concept(
                "donor",
                vec![column("id", Usage::IdRef), column("sex", Usage::Required)],
            ),
            sample,
        ]);

        let resolved = resolve_domain(
            &decl,
            &concept_types,
            &refs(&patterns, &cvs, &compound_types),
        )
        .unwrap();

        let sample = resolved.concepts.get("sample").unwrap();
        let keys: Vec<_> = sample.columns.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["donor_id", "id", "tissue"]);

        let imported = sample.columns.get("donor_id").unwrap();
        assert_eq!(imported.column_type.usage, Usage::IdRef);
        let reference = imported.reference.as_ref().unwrap();
        assert_eq!(reference.concept.as_str(), "donor");
        assert_eq!(reference.column.as_str(), "id");

        // The originals remain on the id-concept.
        let donor = resolved.concepts.get("donor").unwrap();
        assert!(donor.columns.get("id").is_some());
    }

    #[test]
    fn test_extends_prepends_parent_columns() {
        let (patterns, cvs, compound_types) = (Patterns::new(), Cvs::new(), CompoundTypes::new());
        let concept_types = ConceptTypes::new();

        let mut child = concept("child", vec![column("extra", Usage::Optional)]);
        child.extends = Some(names::Concept::new("base"));

        let decl = domain(vec![
            concept("base", vec![column("id", Usage::IdRef)]),
            child,
        ]);
        let resolved = resolve_domain(
            &decl,
            &concept_types,
            &refs(&patterns, &cvs, &compound_types),
        )
        .unwrap();

        let child = resolved.concepts.get("child").unwrap();
        let keys: Vec<_> = child.columns.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["id", "extra"]);
    }

    #[test]
    fn test_extends_must_be_declared_earlier() {
        let (patterns, cvs, compound_types) = (Patterns::new(), Cvs::new(), CompoundTypes::new());
        let concept_types = ConceptTypes::new();

        let mut child = concept("child", vec![]);
        child.extends = Some(names::Concept::new("late"));

        let decl = domain(vec![child, concept("late", vec![])]);
        resolve_domain(
            &decl,
            &concept_types,
            &refs(&patterns, &cvs, &compound_types),
        )
        .unwrap_err();
    }
}
