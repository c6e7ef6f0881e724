use crate::errors::LoadError;
use crate::scope::Scope;

/// The bundled meta-schema. Its raw bytes are the schemaSHA1 input for
/// plain loads and are packed verbatim into emitted archives.
pub static BUNDLED_SCHEMA: &[u8] = include_bytes!("../assets/bp-schema.xsd");

// The structural grammar enforced over a parsed model document. One rule
// per element: required and optional attributes, permitted children with
// cardinality bounds, and whether non-whitespace text is permitted.
// This table mirrors assets/bp-schema.xsd.
struct Rule {
    name: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
    children: &'static [(&'static str, u32, u32)],
    text: bool,
}

const MANY: u32 = u32::MAX;

static RULES: &[Rule] = &[
    Rule {
        name: "bp-model",
        required: &["project", "schemaVer"],
        optional: &["metadataCollection"],
        children: &[
            ("annotations", 0, 1),
            ("collections", 0, 1),
            ("null-values", 1, 1),
            ("patterns", 0, 1),
            ("cvs", 0, 1),
            ("compound-types", 0, 1),
            ("concept-types", 0, 1),
            ("concept-domains", 0, 1),
            ("filename-patterns", 0, 1),
        ],
        text: false,
    },
    Rule {
        name: "annotations",
        required: &[],
        optional: &[],
        children: &[("annot", 0, MANY)],
        text: false,
    },
    Rule {
        name: "annot",
        required: &["name"],
        optional: &[],
        children: &[("frag", 0, MANY)],
        text: true,
    },
    Rule {
        name: "frag",
        required: &[],
        optional: &["kind"],
        children: &[],
        text: true,
    },
    Rule {
        name: "description",
        required: &[],
        optional: &[],
        children: &[("frag", 0, MANY)],
        text: true,
    },
    Rule {
        name: "collections",
        required: &[],
        optional: &[],
        children: &[("collection", 0, MANY)],
        text: false,
    },
    Rule {
        name: "collection",
        required: &["name", "path"],
        optional: &[],
        children: &[("index", 0, MANY)],
        text: false,
    },
    Rule {
        name: "index",
        required: &[],
        optional: &["unique"],
        children: &[("attr", 1, MANY)],
        text: false,
    },
    Rule {
        name: "attr",
        required: &["name"],
        optional: &["ord"],
        children: &[],
        text: false,
    },
    Rule {
        name: "null-values",
        required: &[],
        optional: &[],
        children: &[("term", 1, MANY)],
        text: false,
    },
    Rule {
        name: "patterns",
        required: &[],
        optional: &[],
        children: &[("pattern", 0, MANY)],
        text: false,
    },
    Rule {
        name: "pattern",
        required: &["name"],
        optional: &[],
        children: &[],
        text: true,
    },
    Rule {
        name: "cvs",
        required: &[],
        optional: &[],
        children: &[("cv", 0, MANY), ("meta-cv", 0, MANY)],
        text: false,
    },
    Rule {
        name: "cv",
        required: &["id"],
        optional: &["name"],
        children: &[
            ("description", 0, 1),
            ("annotations", 0, 1),
            ("term", 0, MANY),
            ("file", 0, 1),
            ("uri", 0, MANY),
        ],
        text: false,
    },
    Rule {
        name: "term",
        required: &["key"],
        optional: &["name", "altKeys", "parents", "alias"],
        children: &[],
        text: false,
    },
    Rule {
        name: "file",
        required: &["path"],
        optional: &[],
        children: &[],
        text: false,
    },
    Rule {
        name: "uri",
        required: &[],
        optional: &[],
        children: &[],
        text: true,
    },
    Rule {
        name: "meta-cv",
        required: &["id"],
        optional: &["name"],
        children: &[
            ("description", 0, 1),
            ("annotations", 0, 1),
            ("cv-ref", 1, MANY),
        ],
        text: false,
    },
    Rule {
        name: "cv-ref",
        required: &["id"],
        optional: &[],
        children: &[],
        text: false,
    },
    Rule {
        name: "compound-types",
        required: &[],
        optional: &[],
        children: &[("compound-type", 0, MANY)],
        text: false,
    },
    Rule {
        name: "compound-type",
        required: &["name"],
        optional: &[],
        children: &[("column", 1, MANY)],
        text: false,
    },
    Rule {
        name: "concept-types",
        required: &[],
        optional: &[],
        children: &[("concept-type", 0, MANY)],
        text: false,
    },
    Rule {
        name: "concept-type",
        required: &[],
        optional: &["name", "extends", "collection"],
        children: &[("concept-type", 0, 1), ("column", 0, MANY)],
        text: false,
    },
    Rule {
        name: "concept-domains",
        required: &[],
        optional: &[],
        children: &[("concept-domain", 0, MANY)],
        text: false,
    },
    Rule {
        name: "concept-domain",
        required: &["name"],
        optional: &["fullname", "abstract"],
        children: &[
            ("description", 0, 1),
            ("annotations", 0, 1),
            ("concept", 0, MANY),
        ],
        text: false,
    },
    Rule {
        name: "concept",
        required: &["name"],
        optional: &[
            "fullname",
            "basedOn",
            "extends",
            "identifiedBy",
            "idPrefix",
            "collection",
        ],
        children: &[
            ("description", 0, 1),
            ("annotations", 0, 1),
            ("column", 0, MANY),
            ("related-concept", 0, MANY),
        ],
        text: false,
    },
    Rule {
        name: "column",
        required: &["name"],
        optional: &[],
        children: &[
            ("description", 0, 1),
            ("annotations", 0, 1),
            ("column-type", 1, 1),
        ],
        text: false,
    },
    Rule {
        name: "column-type",
        required: &["type"],
        optional: &[
            "use",
            "cv",
            "pattern",
            "compound",
            "default",
            "defaultCol",
            "arraySeps",
        ],
        children: &[],
        text: false,
    },
    Rule {
        name: "related-concept",
        required: &["concept", "keyPrefix", "arity"],
        optional: &["domain"],
        children: &[],
        text: false,
    },
    Rule {
        name: "filename-patterns",
        required: &[],
        optional: &[],
        children: &[("filename-pattern", 0, MANY)],
        text: false,
    },
    Rule {
        name: "filename-pattern",
        required: &["name", "domain", "concept"],
        optional: &[],
        children: &[("literal", 0, MANY), ("capture", 0, MANY)],
        text: false,
    },
    Rule {
        name: "literal",
        required: &[],
        optional: &[],
        children: &[],
        text: true,
    },
    Rule {
        name: "capture",
        required: &["name", "type", "column"],
        optional: &[],
        children: &[],
        text: false,
    },
];

fn rule(name: &str) -> Option<&'static Rule> {
    RULES.iter().find(|r| r.name == name)
}

/// Validate |doc| against the bundled meta-schema. Success means the
/// document is structurally well formed; semantic correctness (that
/// references resolve, that merges don't conflict) is resolution's job.
pub fn validate(doc: &roxmltree::Document) -> Result<(), LoadError> {
    let root = doc.root_element();
    if root.tag_name().name() != "bp-model" {
        return Err(violation(
            doc,
            &root,
            &Scope::root(),
            format!("expected root element bp-model, found {}", root.tag_name().name()),
        ));
    }
    check(doc, &root, &Scope::root())
}

fn check(
    doc: &roxmltree::Document,
    node: &roxmltree::Node,
    parent: &Scope,
) -> Result<(), LoadError> {
    let name = node.tag_name().name();
    let scope = parent.push(name);
    let rule = rule(name)
        .ok_or_else(|| violation(doc, node, &scope, format!("unknown element {name}")))?;

    for attr in node.attributes() {
        let attr_name = attr.name();
        if !rule.required.contains(&attr_name) && !rule.optional.contains(&attr_name) {
            return Err(violation(
                doc,
                node,
                &scope,
                format!("unknown attribute {attr_name}"),
            ));
        }
    }
    for required in rule.required {
        if node.attribute(*required).is_none() {
            return Err(violation(
                doc,
                node,
                &scope,
                format!("missing required attribute {required}"),
            ));
        }
    }

    if !rule.text {
        let stray = node
            .children()
            .filter(|c| c.is_text())
            .any(|c| !c.text().unwrap_or("").trim().is_empty());
        if stray {
            return Err(violation(doc, node, &scope, "unexpected text content"));
        }
    }

    for (child_name, min, max) in rule.children {
        let count = node
            .children()
            .filter(|c| c.is_element() && c.tag_name().name() == *child_name)
            .count() as u32;
        if count < *min || count > *max {
            return Err(violation(
                doc,
                node,
                &scope,
                format!("element {child_name} occurs {count} times (expected {min}..{max})"),
            ));
        }
    }

    for child in node.children().filter(|c| c.is_element()) {
        let child_name = child.tag_name().name();
        if !rule.children.iter().any(|(n, _, _)| *n == child_name) {
            return Err(violation(
                doc,
                &child,
                &scope,
                format!("element {child_name} is not permitted here"),
            ));
        }
        check(doc, &child, &scope)?;
    }

    Ok(())
}

fn violation(
    doc: &roxmltree::Document,
    node: &roxmltree::Node,
    scope: &Scope,
    detail: impl Into<String>,
) -> LoadError {
    let pos = doc.text_pos_at(node.range().start);
    LoadError::violation(
        scope,
        format!("{} (line {}, column {})", detail.into(), pos.row, pos.col),
    )
}

#[cfg(test)]
mod test {
    use super::validate;

    fn doc(xml: &str) -> roxmltree::Document {
        roxmltree::Document::parse(xml).unwrap()
    }

    #[test]
    fn test_minimal_document_passes() {
        let xml = r#"
            <bp-model project="p" schemaVer="1.0">
              <null-values><term key="NA"/></null-values>
            </bp-model>"#;
        validate(&doc(xml)).unwrap();
    }

    #[test]
    fn test_missing_null_values_fails() {
        let xml = r#"<bp-model project="p" schemaVer="1.0"/>"#;
        validate(&doc(xml)).unwrap_err();
    }

    #[test]
    fn test_unknown_attribute_fails() {
        let xml = r#"
            <bp-model project="p" schemaVer="1.0" bogus="x">
              <null-values><term key="NA"/></null-values>
            </bp-model>"#;
        let err = validate(&doc(xml)).unwrap_err().to_string();
        assert!(err.contains("unknown attribute bogus"), "{err}");
    }

    #[test]
    fn test_misplaced_element_fails() {
        let xml = r#"
            <bp-model project="p" schemaVer="1.0">
              <null-values><term key="NA"/></null-values>
              <collections><term key="nope"/></collections>
            </bp-model>"#;
        let err = validate(&doc(xml)).unwrap_err().to_string();
        assert!(err.contains("not permitted"), "{err}");
    }
}
