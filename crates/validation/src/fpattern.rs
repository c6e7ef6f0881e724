use crate::errors::Error;
use crate::model::{ConceptDomains, Model};
use indexmap::IndexMap;
use models::{item_type, names, FilePatternDecl, FilePatternPart, ItemTag};

/// A compiled filename pattern: a regex with embedded typed capture
/// groups, mapping matching file basenames onto a target concept and a
/// set of extracted column values.
#[derive(Debug)]
pub struct FilePattern {
    pub name: names::FilePattern,
    pub domain: names::ConceptDomain,
    pub concept: names::Concept,
    pub regex: regex::Regex,
    /// Capture-group name → its typed target.
    pub captures: IndexMap<String, CaptureSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSpec {
    pub tag: ItemTag,
    pub column: names::Column,
}

impl PartialEq for FilePattern {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.domain == other.domain
            && self.concept == other.concept
            && self.regex.as_str() == other.regex.as_str()
            && self.captures.len() == other.captures.len()
            && self
                .captures
                .iter()
                .zip(other.captures.iter())
                .all(|(l, r)| l == r)
    }
}

// Unanchored match fragments per primitive type, embedded into the
// compiled pattern. String-like captures are non-greedy so surrounding
// literals keep their say.
fn capture_fragment(tag: ItemTag) -> &'static str {
    match tag {
        ItemTag::Integer => r"[+-]?[0-9]+",
        ItemTag::Decimal => r"[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?",
        ItemTag::Boolean => r"(?:true|false|1|0)",
        ItemTag::Timestamp => r"[0-9]{4}-[0-9]{2}-[0-9]{2}(?:T[0-9:.+\-Z]+)?",
        ItemTag::Duration => r"-?P[0-9YMDTHS.]+",
        _ => r".+?",
    }
}

/// Compile a filename-pattern declaration against the resolved domains.
pub fn compile(decl: &FilePatternDecl, domains: &ConceptDomains) -> Result<FilePattern, Error> {
    let concept = domains
        .must_get(&decl.domain)?
        .concepts
        .must_get(&decl.concept)?;

    let mut source = String::from("^");
    let mut captures = IndexMap::new();

    for part in &decl.parts {
        match part {
            FilePatternPart::Literal(text) => source.push_str(&regex::escape(text)),
            FilePatternPart::Capture { name, tag, column } => {
                if concept.columns.get(column).is_none() {
                    return Err(Error::UnknownReference {
                        kind: "column",
                        name: column.to_string(),
                    });
                }
                if captures
                    .insert(
                        name.clone(),
                        CaptureSpec {
                            tag: *tag,
                            column: column.clone(),
                        },
                    )
                    .is_some()
                {
                    return Err(Error::DuplicateName {
                        kind: "capture",
                        name: name.clone(),
                    });
                }
                source.push_str("(?P<");
                source.push_str(name);
                source.push('>');
                source.push_str(capture_fragment(*tag));
                source.push(')');
            }
        }
    }
    source.push('$');

    let regex = regex::Regex::new(&source).map_err(|err| Error::PatternInvalid {
        name: decl.name.to_string(),
        source: err,
    })?;

    Ok(FilePattern {
        name: decl.name.clone(),
        domain: decl.domain.clone(),
        concept: decl.concept.clone(),
        regex,
        captures,
    })
}

/// A single pattern match of a file basename.
#[derive(Debug, PartialEq)]
pub struct FileMatch<'m> {
    pub pattern: &'m names::FilePattern,
    pub domain: &'m names::ConceptDomain,
    pub concept: &'m names::Concept,
    /// Target-column name → parsed, type-checked value.
    pub mapped: IndexMap<names::Column, serde_json::Value>,
    /// Capture-group name → raw matched string.
    pub extracted: IndexMap<String, String>,
}

impl Model {
    /// Match |filename|'s basename against every registered filename
    /// pattern. Multiple patterns may match; all matches are returned in
    /// pattern declaration order, and disambiguation is the caller's.
    pub fn match_concept(&self, filename: &str) -> Vec<FileMatch<'_>> {
        let basename = std::path::Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(filename);

        let mut matches = Vec::new();
        'pattern: for (_, pattern) in self.file_patterns.iter() {
            let Some(found) = pattern.regex.captures(basename) else {
                continue;
            };

            let mut mapped = IndexMap::new();
            let mut extracted = IndexMap::new();
            for (group, spec) in pattern.captures.iter() {
                let raw = match found.name(group) {
                    Some(m) => m.as_str(),
                    None => continue 'pattern,
                };
                let Some(value) = item_type(spec.tag).parse(raw) else {
                    // Lexically matched but not parseable (e.g. integer
                    // overflow): treat as a non-match of this pattern.
                    continue 'pattern;
                };
                mapped.insert(spec.column.clone(), value);
                extracted.insert(group.clone(), raw.to_string());
            }

            matches.push(FileMatch {
                pattern: &pattern.name,
                domain: &pattern.domain,
                concept: &pattern.concept,
                mapped,
                extracted,
            });
        }
        matches
    }
}
