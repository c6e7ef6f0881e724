use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// ItemTag enumerates the built-in primitive column types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemTag {
    String,
    Text,
    Integer,
    Decimal,
    Boolean,
    Timestamp,
    Duration,
    Compound,
}

impl ItemTag {
    pub fn as_str(&self) -> &'static str {
        // These strings match what's used by serde, and also match the
        // type attribute values of the model document.
        match *self {
            ItemTag::String => "string",
            ItemTag::Text => "text",
            ItemTag::Integer => "integer",
            ItemTag::Decimal => "decimal",
            ItemTag::Boolean => "boolean",
            ItemTag::Timestamp => "timestamp",
            ItemTag::Duration => "duration",
            ItemTag::Compound => "compound",
        }
    }
}

impl std::str::FromStr for ItemTag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(ItemTag::String),
            "text" => Ok(ItemTag::Text),
            "integer" => Ok(ItemTag::Integer),
            "decimal" => Ok(ItemTag::Decimal),
            "boolean" => Ok(ItemTag::Boolean),
            "timestamp" => Ok(ItemTag::Timestamp),
            "duration" => Ok(ItemTag::Duration),
            "compound" => Ok(ItemTag::Compound),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ItemTag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ItemType is a built-in primitive type together with its
/// validation predicate. Types without a pattern accept any value.
pub struct ItemType {
    pub tag: ItemTag,
    pattern: Option<Regex>,
}

impl ItemType {
    /// True if |value| is a lexically valid rendering of this type.
    pub fn is_valid(&self, value: &str) -> bool {
        match &self.pattern {
            Some(re) => re.is_match(value),
            None => true,
        }
    }

    /// Parse |value| into its JSON rendering, or None if it's not valid.
    /// Integers and decimals become numbers, booleans become booleans,
    /// and everything else is carried as a string.
    pub fn parse(&self, value: &str) -> Option<serde_json::Value> {
        if !self.is_valid(value) {
            return None;
        }
        match self.tag {
            ItemTag::Integer => value.parse::<i64>().ok().map(Into::into),
            ItemTag::Decimal => value.parse::<f64>().ok().map(Into::into),
            ItemTag::Boolean => match value {
                "true" | "1" => Some(true.into()),
                "false" | "0" => Some(false.into()),
                _ => None,
            },
            _ => Some(value.into()),
        }
    }
}

lazy_static! {
    // The process-wide item-type table, constructed once and shared by
    // read-only reference. Patterns are lexical: a timestamp predicate
    // accepts ISO-8601 renderings without checking calendar validity.
    static ref ITEM_TYPES: Vec<ItemType> = vec![
        ItemType { tag: ItemTag::String, pattern: None },
        ItemType { tag: ItemTag::Text, pattern: None },
        ItemType {
            tag: ItemTag::Integer,
            pattern: Some(Regex::new(r"^[+-]?[0-9]+$").unwrap()),
        },
        ItemType {
            tag: ItemTag::Decimal,
            pattern: Some(Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?$").unwrap()),
        },
        ItemType {
            tag: ItemTag::Boolean,
            pattern: Some(Regex::new(r"^(true|false|1|0)$").unwrap()),
        },
        ItemType {
            tag: ItemTag::Timestamp,
            pattern: Some(Regex::new(
                r"^[0-9]{4}-[0-9]{2}-[0-9]{2}(T[0-9]{2}:[0-9]{2}(:[0-9]{2}(\.[0-9]+)?)?(Z|[+-][0-9]{2}:?[0-9]{2})?)?$",
            ).unwrap()),
        },
        ItemType {
            tag: ItemTag::Duration,
            pattern: Some(Regex::new(
                r"^-?P([0-9]+Y)?([0-9]+M)?([0-9]+D)?(T([0-9]+H)?([0-9]+M)?([0-9]+(\.[0-9]+)?S)?)?$",
            ).unwrap()),
        },
        ItemType { tag: ItemTag::Compound, pattern: None },
    ];
}

/// Look up the ItemType of |tag| within the shared table.
pub fn item_type(tag: ItemTag) -> &'static ItemType {
    ITEM_TYPES.iter().find(|it| it.tag == tag).unwrap()
}
