use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size<T> {
    pub width: T,
    pub height: T,
}

/// The four bubble columns that together identify a student.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentifierField {
    /// Grade or form, digits 1-7.
    Level,
    /// Class letter.
    Letter,
    /// Ten's digit of the roll number.
    Ten,
    /// Unit's digit of the roll number.
    Unit,
}

impl IdentifierField {
    /// The order in which fields are concatenated into a student label.
    pub const ALL: [IdentifierField; 4] = [
        IdentifierField::Level,
        IdentifierField::Letter,
        IdentifierField::Ten,
        IdentifierField::Unit,
    ];

    /// Suffix used when building region ids, e.g. `p0_id_level`.
    pub fn id_suffix(&self) -> &'static str {
        match self {
            IdentifierField::Level => "level",
            IdentifierField::Letter => "letter",
            IdentifierField::Ten => "n1",
            IdentifierField::Unit => "n2",
        }
    }

    pub fn caption(&self) -> &'static str {
        match self {
            IdentifierField::Level => "Form",
            IdentifierField::Letter => "Cls",
            IdentifierField::Ten => "Ten",
            IdentifierField::Unit => "Unit",
        }
    }
}

impl TryFrom<&str> for IdentifierField {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "level" => Ok(IdentifierField::Level),
            "letter" => Ok(IdentifierField::Letter),
            "ten" | "n1" => Ok(IdentifierField::Ten),
            "unit" | "n2" => Ok(IdentifierField::Unit),
            _ => Err(format!("Invalid identifier field: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for IdentifierField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        IdentifierField::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}

impl Serialize for IdentifierField {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            IdentifierField::Level => serializer.serialize_str("level"),
            IdentifierField::Letter => serializer.serialize_str("letter"),
            IdentifierField::Ten => serializer.serialize_str("ten"),
            IdentifierField::Unit => serializer.serialize_str("unit"),
        }
    }
}

/// The outcome of classifying one answer row or identifier column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Symbol {
    /// A single option was marked clearly enough to be read.
    #[serde(rename = "resolved")]
    Resolved { label: String, index: usize },

    /// Nothing was marked.
    #[serde(rename = "blank")]
    Blank,

    /// More than one option was marked with indistinguishable darkness.
    #[serde(rename = "multiple")]
    Multiple,
}

impl Symbol {
    pub fn label(&self) -> Option<&str> {
        match self {
            Symbol::Resolved { label, .. } => Some(label),
            Symbol::Blank | Symbol::Multiple => None,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Symbol::Resolved { index, .. } => Some(*index),
            Symbol::Blank | Symbol::Multiple => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Symbol::Blank)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbol::Resolved { label, .. } => write!(f, "{}", label),
            Symbol::Blank => write!(f, "BLANK"),
            Symbol::Multiple => write!(f, "MULT"),
        }
    }
}

/// A classified answer row or identifier column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    /// Question number; only set for answer rows.
    pub question: Option<u32>,
    /// Visual row within the region. For answer rows this counts gap rows,
    /// for identifier columns it is the selected row.
    pub row: Option<usize>,
    pub symbol: Symbol,
    /// The strongest fill ratio seen while classifying.
    pub confidence: f32,
}

impl Detection {
    pub fn selected_index(&self) -> Option<usize> {
        self.symbol.index()
    }
}

// Defines a new type that wraps a String for use as an ID.
macro_rules! idtype {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

idtype!(RegionId);
idtype!(PageId);

impl PageId {
    pub fn for_index(index: usize) -> Self {
        Self::new(format!("p{}", index))
    }
}
