use crate::errors::Error;
use crate::model::{Column, Model};
use indexmap::IndexMap;
use models::{item_type, names, ItemTag, Restriction, Usage};

/// One defect of one record field, reported without aborting the batch.
/// The ingest driver decides whether to continue.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFault {
    pub column: names::Column,
    pub value: Option<String>,
    pub kind: FaultKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A required or identifier column is absent from the record.
    MissingRequired,
    /// A required or identifier column holds a null sentinel.
    NullInRequired,
    /// A null sentinel which is also a term of the column's CV.
    AmbiguousNull,
    /// The value is not a lexically valid rendering of its primitive.
    BadPrimitive,
    /// The value does not match the column's pattern restriction.
    PatternMismatch,
    /// The value is not a term of the column's CV restriction.
    NotInCv,
    /// The column's CV restriction is unresolved (URI-referenced).
    CvUnresolved,
    /// The value is not a well-formed compound rendering.
    BadCompound,
}

impl std::fmt::Display for RecordFault {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let kind = match self.kind {
            FaultKind::MissingRequired => "required column is missing",
            FaultKind::NullInRequired => "required column holds a null sentinel",
            FaultKind::AmbiguousNull => "null sentinel collides with a CV term",
            FaultKind::BadPrimitive => "value is not valid for the column's primitive type",
            FaultKind::PatternMismatch => "value does not match the column's pattern",
            FaultKind::NotInCv => "value is not a term of the column's CV",
            FaultKind::CvUnresolved => "column's CV is unresolved",
            FaultKind::BadCompound => "value is not a well-formed compound",
        };
        match &self.value {
            Some(value) => write!(f, "{}: {} ({:?})", self.column, kind, value),
            None => write!(f, "{}: {}", self.column, kind),
        }
    }
}

impl Model {
    /// Validate one tabular record against a concept's resolved
    /// column-set. Faults are accumulated per column rather than
    /// aborting: the caller sees everything wrong with the record.
    pub fn validate_record(
        &self,
        domain: &str,
        concept: &str,
        record: &IndexMap<String, String>,
    ) -> Result<Vec<RecordFault>, Error> {
        let concept = self.domains.must_get(domain)?.concepts.must_get(concept)?;

        let mut faults = Vec::new();
        for (name, column) in concept.columns.iter() {
            let required = matches!(
                column.column_type.usage,
                Usage::IdRef | Usage::Required
            );

            // An absent column and an empty rendering are the same thing.
            let Some(raw) = record.get(name.as_str()).filter(|v| !v.is_empty()) else {
                if required {
                    faults.push(RecordFault {
                        column: name.clone(),
                        value: None,
                        kind: FaultKind::MissingRequired,
                    });
                }
                continue;
            };

            if self.is_valid_null(raw) {
                if required {
                    faults.push(RecordFault {
                        column: name.clone(),
                        value: Some(raw.clone()),
                        kind: FaultKind::NullInRequired,
                    });
                }
                // The null-CV must not collide with the column's own CV;
                // enforced lazily, here.
                if let Some(Restriction::Cv(cv)) = &column.column_type.restriction {
                    if let Ok(cv) = self.cvs.must_get(cv) {
                        if matches!(cv.contains(raw, &self.cvs), Ok(true)) {
                            faults.push(RecordFault {
                                column: name.clone(),
                                value: Some(raw.clone()),
                                kind: FaultKind::AmbiguousNull,
                            });
                        }
                    }
                }
                continue;
            }

            for cell in column.column_type.array_seps.cells(raw) {
                self.check_cell(column, cell, &mut faults);
            }
        }
        Ok(faults)
    }

    fn check_cell(&self, column: &Column, cell: &str, faults: &mut Vec<RecordFault>) {
        let fault = |kind| RecordFault {
            column: column.name.clone(),
            value: Some(cell.to_string()),
            kind,
        };

        if column.column_type.tag == ItemTag::Compound {
            if !self.check_compound(column, cell) {
                faults.push(fault(FaultKind::BadCompound));
            }
            return;
        }

        if !item_type(column.column_type.tag).is_valid(cell) {
            faults.push(fault(FaultKind::BadPrimitive));
            return;
        }

        match &column.column_type.restriction {
            None => {}
            Some(Restriction::Pattern(name)) => {
                if let Some(pattern) = self.patterns.get(name) {
                    if !pattern.regex.is_match(cell) {
                        faults.push(fault(FaultKind::PatternMismatch));
                    }
                }
            }
            Some(Restriction::Cv(name)) => {
                if let Some(cv) = self.cvs.get(name) {
                    match cv.contains(cell, &self.cvs) {
                        Ok(true) => {}
                        Ok(false) => faults.push(fault(FaultKind::NotInCv)),
                        Err(_) => faults.push(fault(FaultKind::CvUnresolved)),
                    }
                }
            }
            Some(Restriction::Compound(_)) => {
                if !self.check_compound(column, cell) {
                    faults.push(fault(FaultKind::BadCompound));
                }
            }
        }
    }

    // A compound cell renders as a JSON object whose scalar members must
    // satisfy the compound type's column primitives.
    fn check_compound(&self, column: &Column, cell: &str) -> bool {
        let Some(Restriction::Compound(name)) = &column.column_type.restriction else {
            return false;
        };
        let Some(compound) = self.compound_types.get(name) else {
            return false;
        };
        let Ok(serde_json::Value::Object(object)) = serde_json::from_str(cell) else {
            return false;
        };

        for (member_name, member) in compound.columns.iter() {
            match object.get(member_name.as_str()) {
                Some(serde_json::Value::String(s)) => {
                    if !item_type(member.column_type.tag).is_valid(s) {
                        return false;
                    }
                }
                Some(_) => {}
                None => {
                    if matches!(member.column_type.usage, Usage::IdRef | Usage::Required) {
                        return false;
                    }
                }
            }
        }
        true
    }
}
