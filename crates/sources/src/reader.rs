use crate::errors::LoadError;
use crate::schema;
use crate::scope::Scope;
use models::{
    names, AnnotationValue, Annotations, Arity, ArraySeps, CollectionDecl, ColumnDecl, ColumnType,
    CompoundTypeDecl, ConceptDecl, ConceptDomainDecl, ConceptTypeDecl, ConceptTypeParentDecl,
    CvDecl, CvSourceDecl, DefaultValue, Description, FilePatternDecl, FilePatternPart, Fragment,
    FragmentKind, IndexDecl, ItemTag, ModelDecl, PatternDecl, RelatedDecl, Restriction, TermDecl,
    Usage,
};
use validator::Validate;

type Node<'a, 'd> = roxmltree::Node<'a, 'd>;

/// Parse and meta-schema-validate a model document into its declaration.
pub fn read(bytes: &[u8]) -> Result<ModelDecl, LoadError> {
    let text = std::str::from_utf8(bytes).map_err(|err| {
        LoadError::violation(Scope::root(), format!("model document is not UTF-8: {err}"))
    })?;
    let doc = roxmltree::Document::parse(text)?;
    schema::validate(&doc)?;
    read_model(doc.root_element())
}

fn read_model(root: Node) -> Result<ModelDecl, LoadError> {
    let outer = Scope::root();
    let scope = outer.push("bp-model");

    let mut decl = ModelDecl {
        project: required(&scope, &root, "project")?.to_string(),
        schema_ver: required(&scope, &root, "schemaVer")?.to_string(),
        ..ModelDecl::default()
    };
    if let Some(metadata) = root.attribute("metadataCollection") {
        decl.metadata_collection =
            Some(checked(&scope, "collection name", metadata, |s: &str| names::Collection::new(s) )?);
    }

    for section in elements(&root) {
        let name = section.tag_name().name();
        match name {
            "annotations" => decl.annotations = read_annotations(&scope, &section)?,
            "collections" => {
                for node in elements(&section) {
                    decl.collections.push(read_collection(&scope, &node)?);
                }
            }
            "null-values" => {
                let scope = scope.push("null-values");
                for node in elements(&section) {
                    decl.null_values.push(read_term(&scope, &node)?);
                }
            }
            "patterns" => {
                let scope = scope.push("patterns");
                for node in elements(&section) {
                    let name = checked(
                        &scope,
                        "pattern name",
                        required(&scope, &node, "name")?,
                        |s: &str| names::Pattern::new(s) ,
                    )?;
                    decl.patterns.push(PatternDecl {
                        regex: text_of(&node),
                        name,
                    });
                }
            }
            "cvs" => {
                let scope = scope.push("cvs");
                for node in elements(&section) {
                    decl.cvs.push(read_cv(&scope, &node)?);
                }
            }
            "compound-types" => {
                let scope = scope.push("compound-types");
                for node in elements(&section) {
                    let name_text = required(&scope, &node, "name")?;
                    let name =
                        checked(&scope, "compound type name", name_text, |s: &str| names::CompoundType::new(s) )?;
                    let inner = scope.push_named("compound-type", name_text);
                    let mut columns = Vec::new();
                    for column in elements(&node).filter(|n| n.tag_name().name() == "column") {
                        columns.push(read_column(&inner, &column)?);
                    }
                    decl.compound_types.push(CompoundTypeDecl { name, columns });
                }
            }
            "concept-types" => {
                let scope = scope.push("concept-types");
                for node in elements(&section) {
                    let concept_type = read_concept_type(&scope, &node)?;
                    if concept_type.name.is_none() {
                        return Err(LoadError::violation(
                            scope,
                            "a top-level concept-type requires a name",
                        ));
                    }
                    decl.concept_types.push(concept_type);
                }
            }
            "concept-domains" => {
                let scope = scope.push("concept-domains");
                for node in elements(&section) {
                    decl.domains.push(read_domain(&scope, &node)?);
                }
            }
            "filename-patterns" => {
                let scope = scope.push("filename-patterns");
                for node in elements(&section) {
                    decl.file_patterns.push(read_file_pattern(&scope, &node)?);
                }
            }
            _ => {}
        }
    }
    Ok(decl)
}

fn read_collection<'a, 'd>(parent: &Scope, node: &Node<'a, 'd>) -> Result<CollectionDecl, LoadError> {
    let name_text = required(parent, node, "name")?;
    let name = checked(parent, "collection name", name_text, |s: &str| names::Collection::new(s) )?;
    let scope = parent.push_named("collection", name_text);

    let mut indices = Vec::new();
    for index in elements(node) {
        let unique = bool_attr(&scope, &index, "unique")?.unwrap_or(false);
        let mut keys = Vec::new();
        for attr in elements(&index) {
            let column = checked(
                &scope,
                "column name",
                required(&scope, &attr, "name")?,
                |s: &str| names::Column::new(s) ,
            )?;
            let direction = match attr.attribute("ord") {
                None | Some("1") => 1,
                Some("-1") => -1,
                Some(other) => {
                    return Err(LoadError::violation(
                        scope,
                        format!("index direction must be 1 or -1, not {other:?}"),
                    ));
                }
            };
            keys.push((column, direction));
        }
        indices.push(IndexDecl { unique, keys });
    }

    Ok(CollectionDecl {
        name,
        path: required(&scope, node, "path")?.to_string(),
        indices,
    })
}

fn read_cv(parent: &Scope, node: &Node) -> Result<CvDecl, LoadError> {
    let element = node.tag_name().name();
    let id_text = required(parent, node, "id")?;
    let id = checked(parent, "controlled vocabulary id", id_text, |s: &str| names::Cv::new(s) )?;
    let scope = parent.push_named(element, id_text);

    let mut decl = CvDecl {
        id: Some(id),
        name: node.attribute("name").map(str::to_string),
        description: Description::new(),
        annotations: Annotations::new(),
        source: CvSourceDecl::Inline { terms: Vec::new() },
    };

    let mut terms = Vec::new();
    let mut members = Vec::new();
    let mut uris = Vec::new();
    let mut file = None;

    for child in elements(node) {
        match child.tag_name().name() {
            "description" => decl.description = read_description(&child),
            "annotations" => decl.annotations = read_annotations(&scope, &child)?,
            "term" => terms.push(read_term(&scope, &child)?),
            "file" => file = Some(required(&scope, &child, "path")?.to_string()),
            "uri" => {
                let text = text_of(&child);
                let uri = url::Url::parse(text.trim()).map_err(|err| {
                    LoadError::violation(scope, format!("invalid CV uri {text:?}: {err}"))
                })?;
                uris.push(uri);
            }
            "cv-ref" => members.push(checked(
                &scope,
                "controlled vocabulary id",
                required(&scope, &child, "id")?,
                |s: &str| names::Cv::new(s) ,
            )?),
            _ => {}
        }
    }

    decl.source = if element == "meta-cv" {
        CvSourceDecl::Union { members }
    } else {
        match (terms.is_empty(), file, uris.is_empty()) {
            (_, Some(path), _) if terms.is_empty() && uris.is_empty() => {
                CvSourceDecl::File { path }
            }
            (true, None, false) => CvSourceDecl::Uris { uris },
            (_, None, true) => CvSourceDecl::Inline { terms },
            _ => {
                return Err(LoadError::violation(
                    scope,
                    "a CV mixes inline terms, an external file, or URIs",
                ));
            }
        }
    };
    Ok(decl)
}

fn read_term(scope: &Scope, node: &Node) -> Result<TermDecl, LoadError> {
    let key = required(scope, node, "key")?.to_string();
    Ok(TermDecl {
        name: node.attribute("name").unwrap_or(&key).to_string(),
        alt_keys: csv(node.attribute("altKeys")),
        parents: csv(node.attribute("parents")),
        alias: bool_attr(scope, node, "alias")?.unwrap_or(false),
        key,
    })
}

fn read_concept_type(parent: &Scope, node: &Node) -> Result<ConceptTypeDecl, LoadError> {
    let name = match node.attribute("name") {
        Some(name) => Some(checked(parent, "concept type name", name, |s: &str| names::ConceptType::new(s) )?),
        None => None,
    };
    let label = node.attribute("name").unwrap_or("anonymous");
    let scope = parent.push_named("concept-type", label);

    let nested = elements(node).find(|n| n.tag_name().name() == "concept-type");
    let parent_decl = match (node.attribute("extends"), nested) {
        (Some(_), Some(_)) => {
            return Err(LoadError::violation(
                scope,
                "a concept-type cannot both extend by name and nest an anonymous parent",
            ));
        }
        (Some(extends), None) => Some(ConceptTypeParentDecl::Named(checked(
            &scope,
            "concept type name",
            extends,
            |s: &str| names::ConceptType::new(s) ,
        )?)),
        (None, Some(nested)) => Some(ConceptTypeParentDecl::Anonymous(Box::new(
            read_concept_type(&scope, &nested)?,
        ))),
        (None, None) => None,
    };

    let collection = match node.attribute("collection") {
        Some(collection) => Some(checked(&scope, "collection name", collection, |s: &str| names::Collection::new(s) )?),
        None => None,
    };

    let mut columns = Vec::new();
    for column in elements(node).filter(|n| n.tag_name().name() == "column") {
        columns.push(read_column(&scope, &column)?);
    }

    Ok(ConceptTypeDecl {
        name,
        parent: parent_decl,
        collection,
        columns,
    })
}

fn read_domain(parent: &Scope, node: &Node) -> Result<ConceptDomainDecl, LoadError> {
    let name_text = required(parent, node, "name")?;
    let name = checked(parent, "concept domain name", name_text, |s: &str| names::ConceptDomain::new(s) )?;
    let scope = parent.push_named("concept-domain", name_text);

    let mut decl = ConceptDomainDecl {
        full_name: node.attribute("fullname").unwrap_or(name.as_str()).to_string(),
        is_abstract: bool_attr(&scope, node, "abstract")?.unwrap_or(false),
        description: Description::new(),
        annotations: Annotations::new(),
        concepts: Vec::new(),
        name,
    };

    for child in elements(node) {
        match child.tag_name().name() {
            "description" => decl.description = read_description(&child),
            "annotations" => decl.annotations = read_annotations(&scope, &child)?,
            "concept" => decl.concepts.push(read_concept(&scope, &child)?),
            _ => {}
        }
    }
    Ok(decl)
}

fn read_concept(parent: &Scope, node: &Node) -> Result<ConceptDecl, LoadError> {
    let name_text = required(parent, node, "name")?;
    let name = checked(parent, "concept name", name_text, |s: &str| names::Concept::new(s) )?;
    let scope = parent.push_named("concept", name_text);

    let mut based_on = Vec::new();
    for part in csv(node.attribute("basedOn")) {
        based_on.push(checked(&scope, "concept type name", &part, |s: &str| names::ConceptType::new(s) )?);
    }

    let extends = match node.attribute("extends") {
        Some(extends) => Some(checked(&scope, "concept name", extends, |s: &str| names::Concept::new(s) )?),
        None => None,
    };
    let identified_by = match node.attribute("identifiedBy") {
        Some(id) => Some(checked(&scope, "concept name", id, |s: &str| names::Concept::new(s) )?),
        None => None,
    };
    let id_prefix = match node.attribute("idPrefix") {
        Some(prefix) => Some(checked(&scope, "identification prefix", prefix, |s: &str| names::Prefix::new(s) )?),
        None => None,
    };
    if identified_by.is_some() && id_prefix.is_none() {
        return Err(LoadError::violation(
            scope,
            "identifiedBy requires an idPrefix",
        ));
    }
    let collection = match node.attribute("collection") {
        Some(collection) => Some(checked(&scope, "collection name", collection, |s: &str| names::Collection::new(s) )?),
        None => None,
    };

    let mut decl = ConceptDecl {
        full_name: node.attribute("fullname").unwrap_or(name.as_str()).to_string(),
        description: Description::new(),
        annotations: Annotations::new(),
        based_on,
        extends,
        identified_by,
        id_prefix,
        collection,
        columns: Vec::new(),
        related: Vec::new(),
        name,
    };

    for child in elements(node) {
        match child.tag_name().name() {
            "description" => decl.description = read_description(&child),
            "annotations" => decl.annotations = read_annotations(&scope, &child)?,
            "column" => decl.columns.push(read_column(&scope, &child)?),
            "related-concept" => {
                let inner = scope.push_item("related-concept", decl.related.len());
                let domain = match child.attribute("domain") {
                    Some(domain) => {
                        Some(checked(&inner, "concept domain name", domain, |s: &str| names::ConceptDomain::new(s) )?)
                    }
                    None => None,
                };
                let arity_text = required(&inner, &child, "arity")?;
                let arity: Arity = arity_text.parse().map_err(|()| {
                    LoadError::violation(
                        inner,
                        format!("arity must be one of 1, 0..1, 1..N, 0..N, not {arity_text:?}"),
                    )
                })?;
                decl.related.push(RelatedDecl {
                    domain,
                    concept: checked(
                        &inner,
                        "concept name",
                        required(&inner, &child, "concept")?,
                        |s: &str| names::Concept::new(s) ,
                    )?,
                    key_prefix: checked(
                        &inner,
                        "key prefix",
                        required(&inner, &child, "keyPrefix")?,
                        |s: &str| names::Prefix::new(s) ,
                    )?,
                    arity,
                });
            }
            _ => {}
        }
    }
    Ok(decl)
}

fn read_column(parent: &Scope, node: &Node) -> Result<ColumnDecl, LoadError> {
    let name_text = required(parent, node, "name")?;
    let name = checked(parent, "column name", name_text, |s: &str| names::Column::new(s) )?;
    let scope = parent.push_named("column", name_text);

    let mut description = Description::new();
    let mut annotations = Annotations::new();
    let mut column_type = None;

    for child in elements(node) {
        match child.tag_name().name() {
            "description" => description = read_description(&child),
            "annotations" => annotations = read_annotations(&scope, &child)?,
            "column-type" => column_type = Some(read_column_type(&scope, &child)?),
            _ => {}
        }
    }

    Ok(ColumnDecl {
        name,
        description,
        annotations,
        column_type: column_type
            .ok_or_else(|| LoadError::violation(scope, "column is missing its column-type"))?,
    })
}

fn read_column_type(scope: &Scope, node: &Node) -> Result<ColumnType, LoadError> {
    let tag_text = required(scope, node, "type")?;
    let tag: ItemTag = tag_text.parse().map_err(|()| {
        LoadError::violation(scope, format!("unknown primitive type {tag_text:?}"))
    })?;

    let usage = match node.attribute("use") {
        None => Usage::Optional,
        Some(text) => text.parse().map_err(|()| {
            LoadError::violation(scope, format!("unknown column use {text:?}"))
        })?,
    };

    let restriction = match (
        node.attribute("cv"),
        node.attribute("pattern"),
        node.attribute("compound"),
    ) {
        (None, None, None) => None,
        (Some(cv), None, None) => Some(Restriction::Cv(checked(
            scope,
            "controlled vocabulary id",
            cv,
            |s: &str| names::Cv::new(s) ,
        )?)),
        (None, Some(pattern), None) => Some(Restriction::Pattern(checked(
            scope,
            "pattern name",
            pattern,
            |s: &str| names::Pattern::new(s) ,
        )?)),
        (None, None, Some(compound)) => Some(Restriction::Compound(checked(
            scope,
            "compound type name",
            compound,
            |s: &str| names::CompoundType::new(s) ,
        )?)),
        _ => {
            return Err(LoadError::violation(
                *scope,
                "a column carries at most one of cv, pattern, or compound",
            ));
        }
    };
    match (&restriction, tag) {
        (Some(Restriction::Compound(_)), ItemTag::Compound) => {}
        (Some(Restriction::Compound(_)), _) => {
            return Err(LoadError::violation(
                *scope,
                "a compound restriction requires type=\"compound\"",
            ));
        }
        (_, ItemTag::Compound) => {
            return Err(LoadError::violation(
                *scope,
                "type=\"compound\" requires a compound restriction",
            ));
        }
        _ => {}
    }

    let default = match (node.attribute("default"), node.attribute("defaultCol")) {
        (None, None) => None,
        (Some(literal), None) => Some(DefaultValue::Literal(literal.to_string())),
        (None, Some(column)) => Some(DefaultValue::Column(checked(
            scope,
            "column name",
            column,
            |s: &str| names::Column::new(s) ,
        )?)),
        (Some(_), Some(_)) => {
            return Err(LoadError::violation(
                *scope,
                "a column defaults to a literal or a sibling column, not both",
            ));
        }
    };

    Ok(ColumnType {
        tag,
        usage,
        default,
        restriction,
        array_seps: ArraySeps::new(node.attribute("arraySeps").unwrap_or("")),
    })
}

fn read_file_pattern(parent: &Scope, node: &Node) -> Result<FilePatternDecl, LoadError> {
    let name_text = required(parent, node, "name")?;
    let name = checked(parent, "filename pattern name", name_text, |s: &str| names::FilePattern::new(s) )?;
    let scope = parent.push_named("filename-pattern", name_text);

    let mut parts = Vec::new();
    for child in elements(node) {
        match child.tag_name().name() {
            "literal" => parts.push(FilePatternPart::Literal(text_of(&child))),
            "capture" => {
                let tag_text = required(&scope, &child, "type")?;
                let tag: ItemTag = tag_text.parse().map_err(|()| {
                    LoadError::violation(scope, format!("unknown primitive type {tag_text:?}"))
                })?;
                parts.push(FilePatternPart::Capture {
                    name: required(&scope, &child, "name")?.to_string(),
                    tag,
                    column: checked(
                        &scope,
                        "column name",
                        required(&scope, &child, "column")?,
                        |s: &str| names::Column::new(s) ,
                    )?,
                });
            }
            _ => {}
        }
    }

    Ok(FilePatternDecl {
        name,
        domain: checked(
            &scope,
            "concept domain name",
            required(&scope, node, "domain")?,
            |s: &str| names::ConceptDomain::new(s) ,
        )?,
        concept: checked(
            &scope,
            "concept name",
            required(&scope, node, "concept")?,
            |s: &str| names::Concept::new(s) ,
        )?,
        parts,
    })
}

fn read_annotations(scope: &Scope, node: &Node) -> Result<Annotations, LoadError> {
    let mut annotations = Annotations::new();
    for annot in elements(node) {
        let name = required(scope, &annot, "name")?;
        annotations.insert(name, read_value(&annot));
    }
    Ok(annotations)
}

fn read_description(node: &Node) -> Description {
    let mut description = Description::new();
    match read_value(node) {
        AnnotationValue::Text(text) if text.is_empty() => {}
        value => description.push(value),
    }
    description
}

// A mixed-content value: plain text when there are no frag children,
// otherwise the ordered sequence of text chunks and frags.
fn read_value(node: &Node) -> AnnotationValue {
    let has_frags = elements(node).any(|n| n.tag_name().name() == "frag");
    if !has_frags {
        return AnnotationValue::Text(text_of(node));
    }

    let mut fragments = Vec::new();
    for child in node.children() {
        if child.is_text() {
            let text = child.text().unwrap_or("").trim();
            if !text.is_empty() {
                fragments.push(Fragment {
                    kind: FragmentKind::Text,
                    text: text.to_string(),
                });
            }
        } else if child.is_element() && child.tag_name().name() == "frag" {
            let kind = match child.attribute("kind") {
                Some("markup") => FragmentKind::Markup,
                _ => FragmentKind::Text,
            };
            fragments.push(Fragment {
                kind,
                text: text_of(&child),
            });
        }
    }
    AnnotationValue::Fragments(fragments)
}

// -- small helpers --

fn elements<'a, 'd>(node: &Node<'a, 'd>) -> impl Iterator<Item = Node<'a, 'd>> {
    node.children().filter(|n| n.is_element())
}

fn text_of(node: &Node) -> String {
    node.children()
        .filter_map(|n| if n.is_text() { n.text() } else { None })
        .collect::<String>()
        .trim()
        .to_string()
}

fn required<'a>(scope: &Scope, node: &Node<'a, '_>, attr: &str) -> Result<&'a str, LoadError> {
    node.attribute(attr)
        .ok_or_else(|| LoadError::violation(scope, format!("missing required attribute {attr}")))
}

fn bool_attr(scope: &Scope, node: &Node, attr: &str) -> Result<Option<bool>, LoadError> {
    match node.attribute(attr) {
        None => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(other) => Err(LoadError::violation(
            scope,
            format!("attribute {attr} must be true or false, not {other:?}"),
        )),
    }
}

fn csv(attr: Option<&str>) -> Vec<String> {
    attr.map(|text| {
        text.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn checked<N: Validate>(
    scope: &Scope,
    what: &str,
    value: &str,
    make: impl Fn(&str) -> N,
) -> Result<N, LoadError> {
    let name = make(value);
    name.validate()
        .map_err(|_| LoadError::violation(scope, format!("invalid {what} {value:?}")))?;
    Ok(name)
}
