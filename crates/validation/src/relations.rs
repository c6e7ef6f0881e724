use crate::errors::Error;
use crate::model::{Column, ColumnRef, ConceptDomains, ResolvedRelation};
use models::{names, Usage};

/// The related-concept / foreign-key propagation pass. Runs once every
/// domain is resolved: for each concept's related-concepts, it resolves
/// the target, injects the target's identifier columns under the
/// relation's key prefix, and records the resolution on the relation.
///
/// The pass is idempotent: a second run over the same graph finds every
/// foreign-key column already present with a matching back-reference and
/// adds nothing.
pub fn propagate(domains: &mut ConceptDomains) -> Result<(), Error> {
    // First gather the injection plan with only shared borrows, then
    // apply it. Related-concepts may form cycles, so the plan snapshots
    // target identifier columns before any concept is touched.
    struct Injection {
        domain: names::ConceptDomain,
        concept: names::Concept,
        relation: usize,
        target_domain: names::ConceptDomain,
        target_concept: names::Concept,
        id_columns: Vec<Column>,
    }

    let mut plan = Vec::new();
    for (domain_name, domain) in domains.iter() {
        for (concept_name, concept) in domain.concepts.iter() {
            for (index, relation) in concept.related.iter().enumerate() {
                let target_domain = relation
                    .domain
                    .clone()
                    .unwrap_or_else(|| domain_name.clone());
                let target = domains
                    .must_get(&target_domain)?
                    .concepts
                    .must_get(&relation.concept)?;

                plan.push(Injection {
                    domain: domain_name.clone(),
                    concept: concept_name.clone(),
                    relation: index,
                    target_domain,
                    target_concept: relation.concept.clone(),
                    id_columns: target.columns.id_columns().cloned().collect(),
                });
            }
        }
    }

    let total = plan.len();
    let mut injected = 0usize;

    for step in plan {
        let domain = domains
            .get_mut(&step.domain)
            .expect("planned domain exists");
        let concept = domain
            .concepts
            .get_mut(&step.concept)
            .expect("planned concept exists");

        let mut fk_columns = Vec::new();
        for id_column in &step.id_columns {
            let fk_name = id_column.name.prefixed(&concept.related[step.relation].key_prefix);
            let reference = ColumnRef {
                domain: step.target_domain.clone(),
                concept: step.target_concept.clone(),
                column: id_column.name.clone(),
            };

            match concept.columns.get(&fk_name) {
                // Already injected by an earlier run of this pass.
                Some(existing) if existing.reference.as_ref() == Some(&reference) => {}
                Some(_) => {
                    return Err(Error::ColumnConflict {
                        concept: concept.name.to_string(),
                        column: fk_name.to_string(),
                        detail: "collides with a foreign-key column of a related concept"
                            .to_string(),
                    });
                }
                None => {
                    let mut fk = id_column.clone();
                    fk.name = fk_name.clone();
                    // Foreign keys are required on the source, not part
                    // of its identity.
                    fk.column_type.usage = Usage::Required;
                    fk.reference = Some(reference);
                    concept.columns.insert_new(step.concept.as_str(), fk)?;
                    injected += 1;
                }
            }
            fk_columns.push(fk_name);
        }

        concept.related[step.relation].resolved = Some(ResolvedRelation {
            domain: step.target_domain,
            concept: step.target_concept,
            columns: fk_columns,
        });
    }

    tracing::debug!(relations = total, columns = injected, "propagated related concepts");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::propagate;
    use crate::model::{
        Column, ColumnSet, Concept, ConceptDomain, ConceptDomains, Concepts, RelatedConcept,
    };
    use models::{names, Annotations, Arity, ArraySeps, ColumnType, Description, ItemTag, Usage};

    fn column(name: &str, usage: Usage) -> Column {
        Column {
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
            reference: None,
        }
    }

    fn concept(domain: &str, name: &str, columns: Vec<Column>, related: Vec<RelatedConcept>) -> Concept {
        let mut set = ColumnSet::new();
        for c in columns {
            set.insert_new(name, c).unwrap();
        }
        Concept {
            name: names::Concept::new(name),
            full_name: name.to_uppercase(),
            description: Description::new(),
            annotations: Annotations::new(),
            domain: names::ConceptDomain::new(domain),
            based_on: Vec::new(),
            extends: None,
            identified_by: None,
            id_prefix: None,
            collection: None,
            columns: set,
            related,
        }
    }

    fn domain(name: &str, concepts: Vec<Concept>) -> ConceptDomain {
        let mut registry = Concepts::new();
        for c in concepts {
            registry.insert(c.name.clone(), c).unwrap();
        }
        ConceptDomain {
            name: names::ConceptDomain::new(name),
            full_name: name.to_uppercase(),
            is_abstract: false,
            description: Description::new(),
            annotations: Annotations::new(),
            concepts: registry,
        }
    }

    fn cross_domain_fixture() -> ConceptDomains {
        let y = concept("x", "y", vec![column("id", Usage::IdRef)], vec![]);
        let b = concept(
            "a",
            "b",
            vec![column("id", Usage::IdRef)],
            vec![RelatedConcept {
                domain: Some(names::ConceptDomain::new("x")),
                concept: names::Concept::new("y"),
                key_prefix: names::Prefix::new("y_"),
                arity: Arity::ZeroToMany,
                resolved: None,
            }],
        );

        let mut domains = ConceptDomains::new();
        domains
            .insert(names::ConceptDomain::new("x"), domain("x", vec![y]))
            .unwrap();
        domains
            .insert(names::ConceptDomain::new("a"), domain("a", vec![b]))
            .unwrap();
        domains
    }

    #[test]
    fn test_cross_domain_foreign_key() {
        let mut domains = cross_domain_fixture();
        propagate(&mut domains).unwrap();

        let b = domains.get("a").unwrap().concepts.get("b").unwrap();
        let keys: Vec<_> = b.columns.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["id", "y_id"]);

        let fk = b.columns.get("y_id").unwrap();
        assert_eq!(fk.column_type.usage, Usage::Required);
        let reference = fk.reference.as_ref().unwrap();
        assert_eq!(reference.domain.as_str(), "x");
        assert_eq!(reference.concept.as_str(), "y");
        assert_eq!(reference.column.as_str(), "id");

        let resolved = b.related[0].resolved.as_ref().unwrap();
        assert_eq!(resolved.columns, vec![names::Column::new("y_id")]);
    }

    #[test]
    fn test_propagation_is_idempotent() {
        let mut domains = cross_domain_fixture();
        propagate(&mut domains).unwrap();

        let before = domains
            .get("a")
            .unwrap()
            .concepts
            .get("b")
            .unwrap()
            .clone();

        propagate(&mut domains).unwrap();
        let after = domains.get("a").unwrap().concepts.get("b").unwrap();
        assert_eq!(&before, after);
    }

    #[test]
    fn test_unknown_target_concept() {
        let b = concept(
            "a",
            "b",
            vec![column("id", Usage::IdRef)],
            vec![RelatedConcept {
                domain: None,
                concept: names::Concept::new("ghost"),
                key_prefix: names::Prefix::new("g_"),
                arity: Arity::One,
                resolved: None,
            }],
        );
        let mut domains = ConceptDomains::new();
        domains
            .insert(names::ConceptDomain::new("a"), domain("a", vec![b]))
            .unwrap();

        propagate(&mut domains).unwrap_err();
    }

    #[test]
    fn test_self_referential_cycle_is_traversable() {
        // A concept relating to itself: the plan snapshots id columns
        // before injection, so the pass terminates and injects once.
        let node = concept(
            "g",
            "node",
            vec![column("id", Usage::IdRef)],
            vec![RelatedConcept {
                domain: None,
                concept: names::Concept::new("node"),
                key_prefix: names::Prefix::new("parent_"),
                arity: Arity::ZeroOrOne,
                resolved: None,
            }],
        );
        let mut domains = ConceptDomains::new();
        domains
            .insert(names::ConceptDomain::new("g"), domain("g", vec![node]))
            .unwrap();

        propagate(&mut domains).unwrap();
        let node = domains.get("g").unwrap().concepts.get("node").unwrap();
        let keys: Vec<_> = node.columns.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["id", "parent_id"]);
    }
}
