use indexmap::IndexMap;
use serde::Serialize;

/// An ordered mapping from annotation name to value. Annotations attach
/// free-form documentation to the model, domains, concepts, columns and CVs,
/// and are carried verbatim into the serialized model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Annotations(IndexMap<String, AnnotationValue>);

impl Annotations {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Set |name| to |value|. A repeated name overwrites the earlier value
    /// while keeping its original position.
    pub fn insert(&mut self, name: impl Into<String>, value: AnnotationValue) {
        self.0.insert(name.into(), value);
    }
}

impl std::ops::Deref for Annotations {
    type Target = IndexMap<String, AnnotationValue>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// An annotation value: plain text, or a sequence of text/markup fragments.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Text(String),
    Fragments(Vec<Fragment>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Text,
    Markup,
}

/// An ordered sequence of annotation-like description values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Description(Vec<AnnotationValue>);

impl Description {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, value: AnnotationValue) {
        self.0.push(value);
    }

    /// The description flattened to plain text, fragments joined by a space.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for value in &self.0 {
            match value {
                AnnotationValue::Text(t) => {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(t);
                }
                AnnotationValue::Fragments(frags) => {
                    for f in frags {
                        if !out.is_empty() {
                            out.push(' ');
                        }
                        out.push_str(&f.text);
                    }
                }
            }
        }
        out
    }
}

impl std::ops::Deref for Description {
    type Target = Vec<AnnotationValue>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::{AnnotationValue, Annotations, Description};

    #[test]
    fn test_annotation_order_and_overwrite() {
        let mut a = Annotations::new();
        a.insert("zed", AnnotationValue::Text("1".to_string()));
        a.insert("alpha", AnnotationValue::Text("2".to_string()));
        a.insert("zed", AnnotationValue::Text("3".to_string()));

        let keys: Vec<_> = a.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zed", "alpha"]);
        assert_eq!(a.get("zed"), Some(&AnnotationValue::Text("3".to_string())));
    }

    #[test]
    fn test_description_to_text() {
        let mut d = Description::new();
        d.push(AnnotationValue::Text("primary".to_string()));
        d.push(AnnotationValue::Text("tissue".to_string()));
        assert_eq!(d.to_text(), "primary tissue");
    }
}
