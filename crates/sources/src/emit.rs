use models::{
    AnnotationValue, Annotations, ColumnDecl, ColumnType, ConceptTypeDecl, ConceptTypeParentDecl,
    CvSourceDecl, DefaultValue, Description, FilePatternPart, FragmentKind, ModelDecl, Restriction,
    TermDecl,
};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

type W = Writer<Vec<u8>>;

/// Serialize a model declaration back into its XML document form.
/// Reading the result yields an equal declaration.
pub fn model_xml(decl: &ModelDecl) -> anyhow::Result<Vec<u8>> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("bp-model");
    root.push_attribute(("project", decl.project.as_str()));
    root.push_attribute(("schemaVer", decl.schema_ver.as_str()));
    if let Some(metadata) = &decl.metadata_collection {
        root.push_attribute(("metadataCollection", metadata.as_str()));
    }
    w.write_event(Event::Start(root))?;

    write_annotations(&mut w, &decl.annotations)?;

    if !decl.collections.is_empty() {
        w.write_event(Event::Start(BytesStart::new("collections")))?;
        for collection in &decl.collections {
            let mut elem = BytesStart::new("collection");
            elem.push_attribute(("name", collection.name.as_str()));
            elem.push_attribute(("path", collection.path.as_str()));
            if collection.indices.is_empty() {
                w.write_event(Event::Empty(elem))?;
                continue;
            }
            w.write_event(Event::Start(elem))?;
            for index in &collection.indices {
                let mut elem = BytesStart::new("index");
                if index.unique {
                    elem.push_attribute(("unique", "true"));
                }
                w.write_event(Event::Start(elem))?;
                for (column, direction) in &index.keys {
                    let mut attr = BytesStart::new("attr");
                    attr.push_attribute(("name", column.as_str()));
                    if *direction < 0 {
                        attr.push_attribute(("ord", "-1"));
                    }
                    w.write_event(Event::Empty(attr))?;
                }
                w.write_event(Event::End(BytesEnd::new("index")))?;
            }
            w.write_event(Event::End(BytesEnd::new("collection")))?;
        }
        w.write_event(Event::End(BytesEnd::new("collections")))?;
    }

    w.write_event(Event::Start(BytesStart::new("null-values")))?;
    for term in &decl.null_values {
        write_term(&mut w, term)?;
    }
    w.write_event(Event::End(BytesEnd::new("null-values")))?;

    if !decl.patterns.is_empty() {
        w.write_event(Event::Start(BytesStart::new("patterns")))?;
        for pattern in &decl.patterns {
            let mut elem = BytesStart::new("pattern");
            elem.push_attribute(("name", pattern.name.as_str()));
            w.write_event(Event::Start(elem))?;
            w.write_event(Event::Text(BytesText::new(&pattern.regex)))?;
            w.write_event(Event::End(BytesEnd::new("pattern")))?;
        }
        w.write_event(Event::End(BytesEnd::new("patterns")))?;
    }

    if !decl.cvs.is_empty() {
        w.write_event(Event::Start(BytesStart::new("cvs")))?;
        for cv in &decl.cvs {
            let element = match cv.source {
                CvSourceDecl::Union { .. } => "meta-cv",
                _ => "cv",
            };
            let mut elem = BytesStart::new(element);
            if let Some(id) = &cv.id {
                elem.push_attribute(("id", id.as_str()));
            }
            if let Some(name) = &cv.name {
                elem.push_attribute(("name", name.as_str()));
            }
            w.write_event(Event::Start(elem))?;
            write_description(&mut w, &cv.description)?;
            write_annotations(&mut w, &cv.annotations)?;
            match &cv.source {
                CvSourceDecl::Inline { terms } => {
                    for term in terms {
                        write_term(&mut w, term)?;
                    }
                }
                CvSourceDecl::File { path } => {
                    let mut file = BytesStart::new("file");
                    file.push_attribute(("path", path.as_str()));
                    w.write_event(Event::Empty(file))?;
                }
                CvSourceDecl::Uris { uris } => {
                    for uri in uris {
                        w.write_event(Event::Start(BytesStart::new("uri")))?;
                        w.write_event(Event::Text(BytesText::new(uri.as_str())))?;
                        w.write_event(Event::End(BytesEnd::new("uri")))?;
                    }
                }
                CvSourceDecl::Union { members } => {
                    for member in members {
                        let mut cv_ref = BytesStart::new("cv-ref");
                        cv_ref.push_attribute(("id", member.as_str()));
                        w.write_event(Event::Empty(cv_ref))?;
                    }
                }
            }
            w.write_event(Event::End(BytesEnd::new(element)))?;
        }
        w.write_event(Event::End(BytesEnd::new("cvs")))?;
    }

    if !decl.compound_types.is_empty() {
        w.write_event(Event::Start(BytesStart::new("compound-types")))?;
        for compound in &decl.compound_types {
            let mut elem = BytesStart::new("compound-type");
            elem.push_attribute(("name", compound.name.as_str()));
            w.write_event(Event::Start(elem))?;
            for column in &compound.columns {
                write_column(&mut w, column)?;
            }
            w.write_event(Event::End(BytesEnd::new("compound-type")))?;
        }
        w.write_event(Event::End(BytesEnd::new("compound-types")))?;
    }

    if !decl.concept_types.is_empty() {
        w.write_event(Event::Start(BytesStart::new("concept-types")))?;
        for concept_type in &decl.concept_types {
            write_concept_type(&mut w, concept_type)?;
        }
        w.write_event(Event::End(BytesEnd::new("concept-types")))?;
    }

    if !decl.domains.is_empty() {
        w.write_event(Event::Start(BytesStart::new("concept-domains")))?;
        for domain in &decl.domains {
            let mut elem = BytesStart::new("concept-domain");
            elem.push_attribute(("name", domain.name.as_str()));
            if domain.full_name != domain.name.as_str() {
                elem.push_attribute(("fullname", domain.full_name.as_str()));
            }
            if domain.is_abstract {
                elem.push_attribute(("abstract", "true"));
            }
            w.write_event(Event::Start(elem))?;
            write_description(&mut w, &domain.description)?;
            write_annotations(&mut w, &domain.annotations)?;

            for concept in &domain.concepts {
                let mut elem = BytesStart::new("concept");
                elem.push_attribute(("name", concept.name.as_str()));
                if concept.full_name != concept.name.as_str() {
                    elem.push_attribute(("fullname", concept.full_name.as_str()));
                }
                if !concept.based_on.is_empty() {
                    let based_on = concept
                        .based_on
                        .iter()
                        .map(|b| b.as_str())
                        .collect::<Vec<_>>()
                        .join(",");
                    elem.push_attribute(("basedOn", based_on.as_str()));
                }
                if let Some(extends) = &concept.extends {
                    elem.push_attribute(("extends", extends.as_str()));
                }
                if let Some(identified_by) = &concept.identified_by {
                    elem.push_attribute(("identifiedBy", identified_by.as_str()));
                }
                if let Some(prefix) = &concept.id_prefix {
                    elem.push_attribute(("idPrefix", prefix.as_str()));
                }
                if let Some(collection) = &concept.collection {
                    elem.push_attribute(("collection", collection.as_str()));
                }
                w.write_event(Event::Start(elem))?;
                write_description(&mut w, &concept.description)?;
                write_annotations(&mut w, &concept.annotations)?;
                for column in &concept.columns {
                    write_column(&mut w, column)?;
                }
                for related in &concept.related {
                    let mut elem = BytesStart::new("related-concept");
                    if let Some(domain) = &related.domain {
                        elem.push_attribute(("domain", domain.as_str()));
                    }
                    elem.push_attribute(("concept", related.concept.as_str()));
                    elem.push_attribute(("keyPrefix", related.key_prefix.as_str()));
                    elem.push_attribute(("arity", related.arity.as_str()));
                    w.write_event(Event::Empty(elem))?;
                }
                w.write_event(Event::End(BytesEnd::new("concept")))?;
            }
            w.write_event(Event::End(BytesEnd::new("concept-domain")))?;
        }
        w.write_event(Event::End(BytesEnd::new("concept-domains")))?;
    }

    if !decl.file_patterns.is_empty() {
        w.write_event(Event::Start(BytesStart::new("filename-patterns")))?;
        for pattern in &decl.file_patterns {
            let mut elem = BytesStart::new("filename-pattern");
            elem.push_attribute(("name", pattern.name.as_str()));
            elem.push_attribute(("domain", pattern.domain.as_str()));
            elem.push_attribute(("concept", pattern.concept.as_str()));
            w.write_event(Event::Start(elem))?;
            for part in &pattern.parts {
                match part {
                    FilePatternPart::Literal(text) => {
                        w.write_event(Event::Start(BytesStart::new("literal")))?;
                        w.write_event(Event::Text(BytesText::new(text)))?;
                        w.write_event(Event::End(BytesEnd::new("literal")))?;
                    }
                    FilePatternPart::Capture { name, tag, column } => {
                        let mut elem = BytesStart::new("capture");
                        elem.push_attribute(("name", name.as_str()));
                        elem.push_attribute(("type", tag.as_str()));
                        elem.push_attribute(("column", column.as_str()));
                        w.write_event(Event::Empty(elem))?;
                    }
                }
            }
            w.write_event(Event::End(BytesEnd::new("filename-pattern")))?;
        }
        w.write_event(Event::End(BytesEnd::new("filename-patterns")))?;
    }

    w.write_event(Event::End(BytesEnd::new("bp-model")))?;
    Ok(w.into_inner())
}

fn write_term(w: &mut W, term: &TermDecl) -> anyhow::Result<()> {
    let mut elem = BytesStart::new("term");
    elem.push_attribute(("key", term.key.as_str()));
    if term.name != term.key {
        elem.push_attribute(("name", term.name.as_str()));
    }
    if !term.alt_keys.is_empty() {
        elem.push_attribute(("altKeys", term.alt_keys.join(",").as_str()));
    }
    if !term.parents.is_empty() {
        elem.push_attribute(("parents", term.parents.join(",").as_str()));
    }
    if term.alias {
        elem.push_attribute(("alias", "true"));
    }
    w.write_event(Event::Empty(elem))?;
    Ok(())
}

fn write_column(w: &mut W, column: &ColumnDecl) -> anyhow::Result<()> {
    let mut elem = BytesStart::new("column");
    elem.push_attribute(("name", column.name.as_str()));
    w.write_event(Event::Start(elem))?;
    write_description(w, &column.description)?;
    write_annotations(w, &column.annotations)?;
    write_column_type(w, &column.column_type)?;
    w.write_event(Event::End(BytesEnd::new("column")))?;
    Ok(())
}

fn write_column_type(w: &mut W, column_type: &ColumnType) -> anyhow::Result<()> {
    let mut elem = BytesStart::new("column-type");
    elem.push_attribute(("type", column_type.tag.as_str()));
    elem.push_attribute(("use", column_type.usage.as_str()));
    match &column_type.restriction {
        None => {}
        Some(Restriction::Cv(cv)) => elem.push_attribute(("cv", cv.as_str())),
        Some(Restriction::Pattern(pattern)) => elem.push_attribute(("pattern", pattern.as_str())),
        Some(Restriction::Compound(compound)) => {
            elem.push_attribute(("compound", compound.as_str()))
        }
    }
    match &column_type.default {
        None => {}
        Some(DefaultValue::Literal(literal)) => elem.push_attribute(("default", literal.as_str())),
        Some(DefaultValue::Column(column)) => elem.push_attribute(("defaultCol", column.as_str())),
    }
    if !column_type.array_seps.is_empty() {
        elem.push_attribute(("arraySeps", column_type.array_seps.as_str()));
    }
    w.write_event(Event::Empty(elem))?;
    Ok(())
}

fn write_concept_type(w: &mut W, concept_type: &ConceptTypeDecl) -> anyhow::Result<()> {
    let mut elem = BytesStart::new("concept-type");
    if let Some(name) = &concept_type.name {
        elem.push_attribute(("name", name.as_str()));
    }
    if let Some(ConceptTypeParentDecl::Named(extends)) = &concept_type.parent {
        elem.push_attribute(("extends", extends.as_str()));
    }
    if let Some(collection) = &concept_type.collection {
        elem.push_attribute(("collection", collection.as_str()));
    }
    w.write_event(Event::Start(elem))?;
    if let Some(ConceptTypeParentDecl::Anonymous(parent)) = &concept_type.parent {
        write_concept_type(w, parent)?;
    }
    for column in &concept_type.columns {
        write_column(w, column)?;
    }
    w.write_event(Event::End(BytesEnd::new("concept-type")))?;
    Ok(())
}

fn write_annotations(w: &mut W, annotations: &Annotations) -> anyhow::Result<()> {
    if annotations.is_empty() {
        return Ok(());
    }
    w.write_event(Event::Start(BytesStart::new("annotations")))?;
    for (name, value) in annotations.iter() {
        let mut elem = BytesStart::new("annot");
        elem.push_attribute(("name", name.as_str()));
        w.write_event(Event::Start(elem))?;
        write_value(w, value)?;
        w.write_event(Event::End(BytesEnd::new("annot")))?;
    }
    w.write_event(Event::End(BytesEnd::new("annotations")))?;
    Ok(())
}

fn write_description(w: &mut W, description: &Description) -> anyhow::Result<()> {
    if description.is_empty() || description.iter().all(value_is_empty) {
        return Ok(());
    }
    w.write_event(Event::Start(BytesStart::new("description")))?;
    for value in description.iter() {
        write_value(w, value)?;
    }
    w.write_event(Event::End(BytesEnd::new("description")))?;
    Ok(())
}

fn value_is_empty(value: &AnnotationValue) -> bool {
    match value {
        AnnotationValue::Text(text) => text.is_empty(),
        AnnotationValue::Fragments(frags) => frags.is_empty(),
    }
}

fn write_value(w: &mut W, value: &AnnotationValue) -> anyhow::Result<()> {
    match value {
        AnnotationValue::Text(text) => {
            w.write_event(Event::Text(BytesText::new(text)))?;
        }
        AnnotationValue::Fragments(fragments) => {
            for fragment in fragments {
                let mut elem = BytesStart::new("frag");
                if fragment.kind == FragmentKind::Markup {
                    elem.push_attribute(("kind", "markup"));
                }
                w.write_event(Event::Start(elem))?;
                w.write_event(Event::Text(BytesText::new(&fragment.text)))?;
                w.write_event(Event::End(BytesEnd::new("frag")))?;
            }
        }
    }
    Ok(())
}
