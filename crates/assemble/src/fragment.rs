use crate::serialize::cv_doc;
use serde_json::{json, Value};
use validation::{Cv, Model};

/// Sizing knobs for the document-store projection.
#[derive(Debug, Clone)]
pub struct ProjectOptions {
    /// Per-document size limit of the target store.
    pub max_document_bytes: usize,
    /// Safety margin subtracted from the limit before packing terms.
    pub fragment_margin: usize,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            max_document_bytes: 16 * 1024 * 1024,
            fragment_margin: 64 * 1024,
        }
    }
}

/// Terms per segment are bounded regardless of byte size.
pub const MAX_SEGMENT_TERMS: usize = 256;

/// Serialize |cv| for a document store, splitting it into segments when
/// it exceeds the term bound or the per-document byte budget. The first
/// segment keeps `_id`, `description` and `annotations` and carries
/// `num-segments`; later segments carry only the shared `name` and the
/// correlation key.
pub fn cv_documents(model: &Model, cv: &Cv, options: &ProjectOptions) -> Vec<Value> {
    let whole = cv_doc(model, cv);
    let budget = options.max_document_bytes.saturating_sub(options.fragment_margin);

    let terms = match whole.get("terms").and_then(Value::as_array) {
        Some(terms) => terms,
        None => return vec![whole],
    };
    let total_bytes = estimate(&whole);
    if terms.len() <= MAX_SEGMENT_TERMS && total_bytes <= budget {
        return vec![whole];
    }

    // Pack terms into segments, greedily bounded by count and bytes.
    // The header overhead is small relative to the margin.
    let mut segments: Vec<Vec<Value>> = vec![Vec::new()];
    let mut segment_bytes = 0usize;
    for term in terms {
        let term_bytes = estimate(term) + 1;
        let current = segments.last_mut().expect("segments is non-empty");
        if !current.is_empty()
            && (current.len() >= MAX_SEGMENT_TERMS || segment_bytes + term_bytes > budget)
        {
            segments.push(Vec::new());
            segment_bytes = 0;
        }
        segments.last_mut().expect("segments is non-empty").push(term.clone());
        segment_bytes += term_bytes;
    }

    let correlation = whole["_id"].clone();
    let name = whole["name"].clone();
    let num_segments = segments.len();

    segments
        .into_iter()
        .enumerate()
        .map(|(index, terms)| {
            if index == 0 {
                json!({
                    "_id": correlation,
                    "name": name,
                    "description": whole["description"],
                    "annotations": whole["annotations"],
                    "cv-key": correlation,
                    "segment": 0,
                    "num-segments": num_segments,
                    "terms": terms,
                })
            } else {
                json!({
                    "name": name,
                    "cv-key": correlation,
                    "segment": index,
                    "terms": terms,
                })
            }
        })
        .collect()
}

fn estimate(value: &Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::{cv_documents, ProjectOptions};
    use validation::{resolve, ResolveOptions, TermSource};

    struct NoFiles;
    impl TermSource for NoFiles {
        fn terms(&mut self, _: &str) -> anyhow::Result<Vec<models::TermDecl>> {
            anyhow::bail!("unused")
        }
    }

    fn model_with_terms(count: usize) -> validation::Model {
        let terms = (0..count)
            .map(|i| models::TermDecl {
                key: format!("term-{i:04}"),
                name: format!("Term {i}"),
                ..Default::default()
            })
            .collect();
        let decl = models::ModelDecl {
            project: "p".to_string(),
            schema_ver: "1".to_string(),
            null_values: vec![models::TermDecl {
                key: "NA".to_string(),
                name: "NA".to_string(),
                ..Default::default()
            }],
            cvs: vec![models::CvDecl {
                id: Some(models::names::Cv::new("big")),
                name: Some("Big vocabulary".to_string()),
                description: Default::default(),
                annotations: Default::default(),
                source: models::CvSourceDecl::Inline { terms },
            }],
            ..Default::default()
        };
        resolve(decl, &mut NoFiles, &ResolveOptions::default()).unwrap()
    }

    #[test]
    fn test_small_cv_is_one_document() {
        let model = model_with_terms(10);
        let docs = cv_documents(
            &model,
            model.cvs.get("big").unwrap(),
            &ProjectOptions::default(),
        );
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["_id"], "big");
        assert!(docs[0].get("num-segments").is_none());
    }

    #[test]
    fn test_oversize_cv_fragments() {
        let model = model_with_terms(700);
        let docs = cv_documents(
            &model,
            model.cvs.get("big").unwrap(),
            &ProjectOptions::default(),
        );

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0]["num-segments"], 3);
        assert_eq!(docs[0]["_id"], "big");
        assert_eq!(docs[0]["description"], "");

        let mut total = 0;
        for (index, doc) in docs.iter().enumerate() {
            let terms = doc["terms"].as_array().unwrap();
            assert!(terms.len() <= super::MAX_SEGMENT_TERMS);
            total += terms.len();

            assert_eq!(doc["name"], "Big vocabulary");
            assert_eq!(doc["cv-key"], "big");
            assert_eq!(doc["segment"], index);
            if index > 0 {
                assert!(doc.get("_id").is_none());
                assert!(doc.get("description").is_none());
                assert!(doc.get("annotations").is_none());
                assert!(doc.get("num-segments").is_none());
            }
        }
        assert_eq!(total, 700);
    }

    #[test]
    fn test_byte_budget_forces_segments() {
        let model = model_with_terms(100);
        let docs = cv_documents(
            &model,
            model.cvs.get("big").unwrap(),
            &ProjectOptions {
                max_document_bytes: 3000,
                fragment_margin: 500,
            },
        );
        assert!(docs.len() > 1, "expected byte-bounded fragmentation");
        let total: usize = docs
            .iter()
            .map(|d| d["terms"].as_array().unwrap().len())
            .sum();
        assert_eq!(total, 100);
    }
}
