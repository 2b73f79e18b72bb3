//! Structured bucket keys.
//!
//! A bucket key is the pair `(IndexKind, value)` rather than a concatenated
//! string, so values from different strategies can never collide. The string
//! form (`soundex_J500`, `email_jdoe`, `dept_cse`) is for display and logs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One inverted index per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Soundex,
    Metaphone,
    DoubleMetaphone,
    FullName,
    Email,
    EmailPrefix,
    Phone,
    CardId,
    StudentId,
    StudentIdPrefix,
    EmployeeId,
    Device,
    Department,
    Face,
    FaceLsh,
}

impl IndexKind {
    /// Number of kinds.
    pub const COUNT: usize = 15;

    /// Every kind in slot order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Soundex,
        Self::Metaphone,
        Self::DoubleMetaphone,
        Self::FullName,
        Self::Email,
        Self::EmailPrefix,
        Self::Phone,
        Self::CardId,
        Self::StudentId,
        Self::StudentIdPrefix,
        Self::EmployeeId,
        Self::Device,
        Self::Department,
        Self::Face,
        Self::FaceLsh,
    ];

    /// Dense position of this kind in [`IndexKind::ALL`].
    #[must_use]
    pub const fn slot(self) -> usize {
        self as usize
    }

    /// Short tag used in the display form of keys.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Soundex => "soundex",
            Self::Metaphone => "metaphone",
            Self::DoubleMetaphone => "dmetaphone",
            Self::FullName => "name",
            Self::Email => "email",
            Self::EmailPrefix => "email3",
            Self::Phone => "phone",
            Self::CardId => "card",
            Self::StudentId => "student",
            Self::StudentIdPrefix => "student4",
            Self::EmployeeId => "employee",
            Self::Device => "device",
            Self::Department => "dept",
            Self::Face => "face",
            Self::FaceLsh => "facelsh",
        }
    }

    /// Strategy that consults this kind.
    #[must_use]
    pub const fn strategy(self) -> BlockingStrategy {
        match self {
            Self::Soundex | Self::Metaphone | Self::DoubleMetaphone | Self::FullName => {
                BlockingStrategy::Phonetic
            }
            Self::Department => BlockingStrategy::Department,
            Self::Email
            | Self::EmailPrefix
            | Self::Phone
            | Self::CardId
            | Self::StudentId
            | Self::StudentIdPrefix
            | Self::EmployeeId
            | Self::Device
            | Self::Face
            | Self::FaceLsh => BlockingStrategy::Identifier,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Strategy-qualified bucket key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockKey {
    pub kind: IndexKind,
    pub value: String,
}

impl BlockKey {
    #[must_use]
    pub fn new(kind: IndexKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.tag(), self.value)
    }
}

/// Candidate-generation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingStrategy {
    /// Name encodings and full-name equality.
    Phonetic,
    /// Email, phone, ids, devices and face buckets.
    Identifier,
    /// Same department.
    Department,
    /// Union of the three strategies above.
    #[default]
    MultiPass,
}

impl BlockingStrategy {
    /// Returns true if keys of `kind` take part in this strategy.
    #[must_use]
    pub fn includes(self, kind: IndexKind) -> bool {
        match self {
            Self::MultiPass => true,
            other => kind.strategy() == other,
        }
    }
}

impl fmt::Display for BlockingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phonetic => write!(f, "phonetic"),
            Self::Identifier => write!(f, "identifier"),
            Self::Department => write!(f, "department"),
            Self::MultiPass => write!(f, "multi_pass"),
        }
    }
}

impl FromStr for BlockingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phonetic" => Ok(Self::Phonetic),
            "identifier" => Ok(Self::Identifier),
            "department" => Ok(Self::Department),
            "multi_pass" | "multipass" | "multi-pass" => Ok(Self::MultiPass),
            other => Err(format!(
                "unknown blocking strategy: {other}. Expected phonetic, identifier, department or multi_pass"
            )),
        }
    }
}
