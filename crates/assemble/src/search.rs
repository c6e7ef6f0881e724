use indexmap::IndexMap;
use models::{DefaultValue, ItemTag, Restriction};
use serde_json::{json, Map, Value};
use validation::{Column, Model};

// Fixed primitive-to-field-type mapping of the search backend.
fn field_type(tag: ItemTag) -> &'static str {
    match tag {
        ItemTag::String => "keyword",
        ItemTag::Text => "text",
        ItemTag::Integer => "long",
        ItemTag::Decimal => "double",
        ItemTag::Boolean => "boolean",
        ItemTag::Timestamp => "date",
        ItemTag::Duration => "keyword",
        ItemTag::Compound => "nested",
    }
}

/// Derive the typed field mappings of the search-index projection: one
/// index per collection, one mapping per concept assigned to it, fields
/// from the concept's resolved column-set. Compound columns become
/// nested sub-documents; literal defaults become null-value defaults.
pub fn search_mappings(model: &Model) -> IndexMap<String, Value> {
    let mut indices = IndexMap::new();

    for (collection_name, _) in model.collections.iter() {
        let mut mappings = Map::new();
        for domain in model.domains.values() {
            for concept in domain.concepts.values() {
                if concept.collection.as_ref() != Some(collection_name) {
                    continue;
                }
                let mut properties = Map::new();
                for (column_name, column) in concept.columns.iter() {
                    properties.insert(column_name.to_string(), field_mapping(model, column));
                }
                mappings.insert(
                    concept.name.to_string(),
                    json!({ "properties": properties }),
                );
            }
        }
        if !mappings.is_empty() {
            indices.insert(
                collection_name.to_string(),
                json!({ "mappings": mappings }),
            );
        }
    }

    tracing::debug!(indices = indices.len(), "derived search mappings");
    indices
}

fn field_mapping(model: &Model, column: &Column) -> Value {
    let tag = column.column_type.tag;

    if tag == ItemTag::Compound {
        let mut properties = Map::new();
        if let Some(Restriction::Compound(name)) = &column.column_type.restriction {
            if let Some(compound) = model.compound_types.get(name) {
                for (member_name, member) in compound.columns.iter() {
                    properties.insert(member_name.to_string(), field_mapping(model, member));
                }
            }
        }
        return json!({ "type": "nested", "properties": properties });
    }

    let mut mapping = json!({ "type": field_type(tag) });
    if let Some(DefaultValue::Literal(literal)) = &column.column_type.default {
        mapping["null_value"] = match tag {
            ItemTag::Integer => literal
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| json!(literal)),
            ItemTag::Decimal => literal
                .parse::<f64>()
                .map(Value::from)
                .unwrap_or_else(|_| json!(literal)),
            ItemTag::Boolean => json!(literal == "true" || literal == "1"),
            _ => json!(literal),
        };
    }
    mapping
}
