use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError, ValidationErrors};

// Names by which model entities refer to one another. Each registry gets
// its own newtype over String so a lookup cannot cross registries by
// accident: handing a pattern name to the CV registry is a type error.

lazy_static! {
    // A name is one token of Unicode letters or numbers plus '-', '_'
    // and '.'. Nothing else: names end up inside key prefixes, archive
    // member paths and serialized ids, so separators and whitespace are
    // rejected at the door.
    pub static ref TOKEN_RE: Regex = Regex::new(r"[\p{Letter}\p{Number}\-_\.]+").unwrap();
}

macro_rules! string_name_types {
    (
        $(#[$outer:meta])*
        $vis:vis struct $Wrapper:ident(pattern = $Regex:ident);

        $($rest:tt)*
    ) => {

        $(#[$outer])*
        #[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $Wrapper(String);

        impl $Wrapper {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
            pub fn pattern() -> &'static Regex {
                &$Regex
            }
        }

        impl std::ops::Deref for $Wrapper {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $Wrapper {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $Wrapper {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl Into<String> for $Wrapper {
            fn into(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $Wrapper {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_ref())
            }
        }

        impl Validate for $Wrapper {
            fn validate(&self) -> Result<(), ValidationErrors> {
                let value = self.0.as_str();

                // The pattern must cover the whole string, not merely
                // occur somewhere inside it.
                let covers_whole = $Regex
                    .find(value)
                    .map_or(false, |found| found.range() == (0..value.len()));
                if covers_whole {
                    return Ok(());
                }

                let mut error = ValidationError::new("invalid_name");
                error.message = Some(
                    format!(
                        "{value:?} is not a single token matching {}",
                        $Regex.as_str()
                    )
                    .into(),
                );
                let mut errors = ValidationErrors::new();
                errors.add("", error);
                Err(errors)
            }
        }

        string_name_types! {
            $($rest)*
        }
    };

    () => {};
}

string_name_types! {
    /// Collection names are Unicode letters, numbers, '-', '_', or '.'.
    /// A collection is a named destination within the target backend.
    pub struct Collection(pattern = TOKEN_RE);

    /// Controlled-vocabulary identifiers are Unicode letters, numbers, '-', '_', or '.'.
    pub struct Cv(pattern = TOKEN_RE);

    /// Names of registered validation patterns.
    pub struct Pattern(pattern = TOKEN_RE);

    /// Compound-type names.
    pub struct CompoundType(pattern = TOKEN_RE);

    /// Concept-type names. Anonymous concept-types exist but carry no name at all,
    /// so every ConceptType name that *does* exist obeys the token production.
    pub struct ConceptType(pattern = TOKEN_RE);

    /// Concept-domain names.
    pub struct ConceptDomain(pattern = TOKEN_RE);

    /// Concept names, unique within their owning concept-domain.
    pub struct Concept(pattern = TOKEN_RE);

    /// Column names, unique within their owning column-set.
    pub struct Column(pattern = TOKEN_RE);

    /// Filename-pattern names.
    pub struct FilePattern(pattern = TOKEN_RE);

    /// Key prefixes applied to imported identifier columns,
    /// e.g. "donor_" re-labels an imported "id" as "donor_id".
    pub struct Prefix(pattern = TOKEN_RE);
}

impl Column {
    /// The column name produced by re-labelling this column under |prefix|.
    pub fn prefixed(&self, prefix: &Prefix) -> Column {
        Column::new([prefix.as_str(), self.as_str()].concat())
    }
}
