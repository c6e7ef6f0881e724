use models::{Annotations, ColumnType, DefaultValue, Description, Restriction};
use serde_json::{json, Map, Value};
use validation::{Collection, Column, Concept, ConceptDomain, Cv, Index, Model, Term};

/// The fixed set of serializable entities. One serializer dispatches on
/// this tagged variant; the per-entity shapes live here, next to it,
/// rather than on the entities themselves.
pub enum Entity<'m> {
    Model(&'m Model),
    Collection(&'m Collection),
    Index(&'m Index),
    ConceptDomain(&'m ConceptDomain),
    Concept(&'m Concept),
    Column(&'m Column),
    ColumnType(&'m ColumnType),
    Cv(&'m Cv),
    CvTerm(&'m Term),
    AnnotationSet(&'m Annotations),
    DescriptionSet(&'m Description),
}

/// Serialize |entity| into its backend-neutral document form.
pub fn serialize(model: &Model, entity: Entity) -> Value {
    match entity {
        Entity::Model(m) => model_doc(model, m),
        Entity::Collection(collection) => collection_doc(model, collection),
        Entity::Index(index) => index_doc(index),
        Entity::ConceptDomain(domain) => domain_doc(model, domain),
        Entity::Concept(concept) => concept_doc(model, concept),
        Entity::Column(column) => column_doc(model, column),
        Entity::ColumnType(column_type) => column_type_doc(model, column_type),
        Entity::Cv(cv) => cv_doc(model, cv),
        Entity::CvTerm(term) => term_doc(term),
        Entity::AnnotationSet(annotations) => {
            serde_json::to_value(annotations).unwrap_or_else(|_| json!({}))
        }
        Entity::DescriptionSet(description) => json!(description.to_text()),
    }
}

fn model_doc(model: &Model, m: &Model) -> Value {
    let mut collections = Map::new();
    for (_, collection) in m.collections.iter() {
        collections.insert(
            collection.path.clone(),
            serialize(model, Entity::Collection(collection)),
        );
    }
    let mut domains = Map::new();
    for (name, domain) in m.domains.iter() {
        domains.insert(name.to_string(), serialize(model, Entity::ConceptDomain(domain)));
    }
    json!({
        "project": m.project,
        "schemaVer": m.schema_ver,
        "annotations": serialize(model, Entity::AnnotationSet(&m.annotations)),
        "collections": collections,
        "domains": domains,
    })
}

fn collection_doc(model: &Model, collection: &Collection) -> Value {
    json!({
        "name": collection.name.as_str(),
        "path": collection.path,
        "indices": collection
            .indices
            .iter()
            .map(|index| serialize(model, Entity::Index(index)))
            .collect::<Vec<_>>(),
    })
}

fn index_doc(index: &Index) -> Value {
    let mut keys = Map::new();
    for (column, direction) in &index.keys {
        keys.insert(column.to_string(), json!(direction));
    }
    json!({ "unique": index.unique, "keys": keys })
}

fn domain_doc(model: &Model, domain: &ConceptDomain) -> Value {
    let mut doc = json!({
        "_id": domain.name.as_str(),
        "name": domain.name.as_str(),
        "fullname": domain.full_name,
        "description": serialize(model, Entity::DescriptionSet(&domain.description)),
        "annotations": serialize(model, Entity::AnnotationSet(&domain.annotations)),
        "concepts": domain
            .concepts
            .values()
            .map(|c| Value::from(c.qualified_id()))
            .collect::<Vec<_>>(),
    });
    if domain.is_abstract {
        doc["abstract"] = json!(true);
    }
    doc
}

fn concept_doc(model: &Model, concept: &Concept) -> Value {
    let mut columns = Map::new();
    for (name, column) in concept.columns.iter() {
        columns.insert(name.to_string(), serialize(model, Entity::Column(column)));
    }

    let mut doc = json!({
        "_id": concept.qualified_id(),
        "name": concept.name.as_str(),
        "fullname": concept.full_name,
        "description": serialize(model, Entity::DescriptionSet(&concept.description)),
        "annotations": serialize(model, Entity::AnnotationSet(&concept.annotations)),
        "columns": columns,
    });

    if let Some(extends) = &concept.extends {
        doc["extends"] = json!([concept.domain.as_str(), ".", extends.as_str()].concat());
    }
    if let Some(identified_by) = &concept.identified_by {
        doc["identifiedBy"] = json!([concept.domain.as_str(), ".", identified_by.as_str()].concat());
    }

    // Deduplicated related-concept targets, in declaration order.
    let mut related_to: Vec<String> = Vec::new();
    for relation in &concept.related {
        if let Some(resolved) = &relation.resolved {
            let id = [resolved.domain.as_str(), ".", resolved.concept.as_str()].concat();
            if !related_to.contains(&id) {
                related_to.push(id);
            }
        }
    }
    if !related_to.is_empty() {
        doc["relatedTo"] = json!(related_to);
    }
    doc
}

// A column document is its column-type's document plus the column's own
// documentation and back-reference.
fn column_doc(model: &Model, column: &Column) -> Value {
    let mut doc = serialize(model, Entity::ColumnType(&column.column_type));

    if !column.description.is_empty() {
        doc["description"] = serialize(model, Entity::DescriptionSet(&column.description));
    }
    if !column.annotations.is_empty() {
        doc["annotations"] = serialize(model, Entity::AnnotationSet(&column.annotations));
    }
    if let Some(reference) = &column.reference {
        doc["refConcept"] =
            json!([reference.domain.as_str(), ".", reference.concept.as_str()].concat());
        doc["refColumn"] = json!(reference.column.as_str());
    }
    doc
}

fn column_type_doc(model: &Model, column_type: &ColumnType) -> Value {
    let mut doc = json!({
        "type": column_type.tag.as_str(),
        "use": column_type.usage.as_str(),
        "isArray": !column_type.array_seps.is_empty(),
    });

    match &column_type.default {
        None => {}
        Some(DefaultValue::Literal(literal)) => doc["default"] = json!(literal),
        Some(DefaultValue::Column(sibling)) => doc["defaultCol"] = json!(sibling.as_str()),
    }

    // At most one of cv, columns (compound), or pattern.
    match &column_type.restriction {
        None => {}
        Some(Restriction::Cv(cv)) => doc["cv"] = json!(cv.as_str()),
        Some(Restriction::Pattern(name)) => {
            if let Some(pattern) = model.patterns.get(name) {
                doc["pattern"] = json!(pattern.regex.as_str());
            }
        }
        Some(Restriction::Compound(name)) => {
            if let Some(compound) = model.compound_types.get(name) {
                let mut members = Map::new();
                for (member_name, member) in compound.columns.iter() {
                    members.insert(
                        member_name.to_string(),
                        serialize(model, Entity::Column(member)),
                    );
                }
                doc["columns"] = Value::Object(members);
            }
        }
    }
    doc
}

pub(crate) fn cv_doc(model: &Model, cv: &Cv) -> Value {
    json!({
        "_id": cv.label(),
        "name": cv.name.as_deref().unwrap_or(cv.label()),
        "description": serialize(model, Entity::DescriptionSet(&cv.description)),
        "annotations": serialize(model, Entity::AnnotationSet(&cv.annotations)),
        "terms": cv
            .terms(&model.cvs)
            .into_iter()
            .map(|term| serialize(model, Entity::CvTerm(term)))
            .collect::<Vec<_>>(),
    })
}

fn term_doc(term: &Term) -> Value {
    let mut doc = json!({
        "_id": term.key,
        "term": term.key,
        "name": term.name,
    });
    if !term.alt_keys.is_empty() {
        doc["alt-id"] = json!(term.alt_keys);
    }
    if term.alias {
        doc["alias"] = json!(true);
        doc["union-of"] = json!(term.parents);
    } else {
        if !term.parents.is_empty() {
            doc["parents"] = json!(term.parents);
        }
        if !term.ancestors.is_empty() {
            doc["ancestors"] = json!(term.ancestors);
        }
    }
    doc
}

#[cfg(test)]
mod test {
    use super::{serialize, Entity};
    use validation::{resolve, ResolveOptions, TermSource};

    struct NoFiles;
    impl TermSource for NoFiles {
        fn terms(&mut self, path: &str) -> anyhow::Result<Vec<models::TermDecl>> {
            anyhow::bail!("no external CV files in this fixture: {path}")
        }
    }

    fn fixture() -> validation::Model {
        let decl = models::ModelDecl {
            project: "proj".to_string(),
            schema_ver: "1.0".to_string(),
            null_values: vec![models::TermDecl {
                key: "NA".to_string(),
                name: "not available".to_string(),
                ..Default::default()
            }],
            domains: vec![models::ConceptDomainDecl {
                name: models::names::ConceptDomain::new("s"),
                full_name: "Samples".to_string(),
                is_abstract: false,
                description: Default::default(),
                annotations: Default::default(),
                concepts: vec![
                    concept("donor", vec![column("id", models::Usage::IdRef)]),
                    {
                        let mut c = concept(
                            "sample",
                            vec![
                                column("id", models::Usage::IdRef),
                                column("tissue", models::Usage::Required),
                            ],
                        );
                        c.identified_by = Some(models::names::Concept::new("donor"));
                        c.id_prefix = Some(models::names::Prefix::new("donor_"));
                        c
                    },
                ],
            }],
            ..Default::default()
        };
        resolve(decl, &mut NoFiles, &ResolveOptions::default()).unwrap()
    }

    fn concept(name: &str, columns: Vec<models::ColumnDecl>) -> models::ConceptDecl {
        models::ConceptDecl {
            name: models::names::Concept::new(name),
            full_name: name.to_uppercase(),
            description: Default::default(),
            annotations: Default::default(),
            based_on: vec![],
            extends: None,
            identified_by: None,
            id_prefix: None,
            collection: None,
            columns,
            related: vec![],
        }
    }

    fn column(name: &str, usage: models::Usage) -> models::ColumnDecl {
        models::ColumnDecl {
            name: models::names::Column::new(name),
            description: Default::default(),
            annotations: Default::default(),
            column_type: models::ColumnType {
                tag: models::ItemTag::String,
                usage,
                default: None,
                restriction: None,
                array_seps: models::ArraySeps::default(),
            },
        }
    }

    #[test]
    fn test_concept_doc_shape() {
        let model = fixture();
        let concept = model.domains.get("s").unwrap().concepts.get("sample").unwrap();
        let doc = serialize(&model, Entity::Concept(concept));

        assert_eq!(doc["_id"], "s.sample");
        assert_eq!(doc["identifiedBy"], "s.donor");
        let columns = doc["columns"].as_object().unwrap();
        let keys: Vec<_> = columns.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["donor_id", "id", "tissue"]);
        assert_eq!(columns["donor_id"]["refConcept"], "s.donor");
        assert_eq!(columns["donor_id"]["refColumn"], "id");
        assert_eq!(columns["tissue"]["use"], "required");
        assert_eq!(columns["tissue"]["isArray"], false);
    }

    #[test]
    fn test_column_type_doc_stands_alone() {
        let model = fixture();
        let concept = model.domains.get("s").unwrap().concepts.get("sample").unwrap();
        let column = concept.columns.get("tissue").unwrap();

        // The column-type variant yields the bare type shape; the column
        // variant layers documentation and references over it.
        let type_doc = serialize(&model, Entity::ColumnType(&column.column_type));
        assert_eq!(type_doc["type"], "string");
        assert_eq!(type_doc["use"], "required");
        assert!(type_doc.get("refConcept").is_none());
    }

    #[test]
    fn test_annotation_and_description_sets() {
        let model = fixture();

        let mut annotations = models::Annotations::new();
        annotations.insert(
            "owner",
            models::AnnotationValue::Text("data-office".to_string()),
        );
        let doc = serialize(&model, Entity::AnnotationSet(&annotations));
        assert_eq!(doc["owner"], "data-office");

        let mut description = models::Description::new();
        description.push(models::AnnotationValue::Text("primary".to_string()));
        description.push(models::AnnotationValue::Text("tissue".to_string()));
        let doc = serialize(&model, Entity::DescriptionSet(&description));
        assert_eq!(doc, "primary tissue");
    }

    #[test]
    fn test_model_doc_shape() {
        let model = fixture();
        let doc = serialize(&model, Entity::Model(&model));
        assert_eq!(doc["project"], "proj");
        assert_eq!(doc["schemaVer"], "1.0");
        assert_eq!(doc["domains"]["s"]["concepts"][0], "s.donor");
    }
}
