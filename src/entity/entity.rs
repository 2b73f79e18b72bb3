//! Canonical person records.
//!
//! An [`Entity`] is produced by the resolution workflow from badge swipes,
//! camera frames and network associations. The matching engine only reads
//! entities; every optional field has a defined default-on-absence accessor
//! so callers never probe nested options ad hoc.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a canonical entity.
///
/// Ids are opaque strings (store-assigned). Ordering is lexicographic, which
/// is what order-independent pair keys rely on.
///
/// # Examples
///
/// ```
/// use identilink::EntityId;
///
/// let id = EntityId::from("E100001");
/// assert_eq!(id.as_str(), "E100001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Campus role of a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntityType {
    /// Enrolled student
    Student,
    /// Teaching staff
    Faculty,
    /// Non-teaching staff
    Staff,
}

impl TryFrom<String> for EntityType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("student") {
            Ok(Self::Student)
        } else if value.eq_ignore_ascii_case("faculty") {
            Ok(Self::Faculty)
        } else if value.eq_ignore_ascii_case("staff") {
            Ok(Self::Staff)
        } else {
            Err(format!(
                "unknown entity type: {value}. Expected one of student, faculty, staff"
            ))
        }
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Faculty => write!(f, "faculty"),
            Self::Staff => write!(f, "staff"),
        }
    }
}

/// Lifecycle status assigned by the resolution workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// Live record.
    #[default]
    Active,
    /// Dormant record (no recent sightings).
    Inactive,
    /// Folded into another canonical record.
    Merged,
}

/// Descriptive profile fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Full display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Department name as captured (e.g. "CSE").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    /// Campus role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
}

/// Identifying fields observed across sensors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,

    /// Hashed MAC addresses seen on campus Wi-Fi.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub device_hashes: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_embedding: Option<Vec<f32>>,
}

/// Resolution bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    #[serde(default)]
    pub status: EntityStatus,

    /// Confidence that this record is a single real person.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Canonical identity record.
///
/// # Examples
///
/// ```
/// use identilink::{Entity, EntityType};
///
/// let entity = Entity::new("E1")
///     .with_name("John Doe")
///     .with_email("jdoe@x.edu")
///     .with_entity_type(EntityType::Student);
/// assert_eq!(entity.email_local_part(), Some("jdoe".to_string()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,

    #[serde(default)]
    pub profile: Profile,

    #[serde(default)]
    pub identifiers: Identifiers,

    #[serde(default)]
    pub metadata: EntityMetadata,
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl Entity {
    /// Creates an empty record with the given id.
    #[must_use]
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.profile.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.profile.department = Some(department.into());
        self
    }

    #[must_use]
    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.profile.entity_type = Some(entity_type);
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.identifiers.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.identifiers.phone = Some(phone.into());
        self
    }

    #[must_use]
    pub fn with_card_id(mut self, card_id: impl Into<String>) -> Self {
        self.identifiers.card_id = Some(card_id.into());
        self
    }

    #[must_use]
    pub fn with_student_id(mut self, student_id: impl Into<String>) -> Self {
        self.identifiers.student_id = Some(student_id.into());
        self
    }

    #[must_use]
    pub fn with_employee_id(mut self, employee_id: impl Into<String>) -> Self {
        self.identifiers.employee_id = Some(employee_id.into());
        self
    }

    #[must_use]
    pub fn with_device_hash(mut self, hash: impl Into<String>) -> Self {
        self.identifiers.device_hashes.insert(hash.into());
        self
    }

    #[must_use]
    pub fn with_face_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.identifiers.face_embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.metadata.confidence = Some(confidence);
        self
    }

    /// Trimmed name, `None` when absent or blank.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        non_blank(self.profile.name.as_ref())
    }

    /// Trimmed department, `None` when absent or blank.
    #[must_use]
    pub fn department(&self) -> Option<&str> {
        non_blank(self.profile.department.as_ref())
    }

    #[must_use]
    pub const fn entity_type(&self) -> Option<EntityType> {
        self.profile.entity_type
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        non_blank(self.identifiers.email.as_ref())
    }

    #[must_use]
    pub fn phone(&self) -> Option<&str> {
        non_blank(self.identifiers.phone.as_ref())
    }

    #[must_use]
    pub fn card_id(&self) -> Option<&str> {
        non_blank(self.identifiers.card_id.as_ref())
    }

    #[must_use]
    pub fn student_id(&self) -> Option<&str> {
        non_blank(self.identifiers.student_id.as_ref())
    }

    #[must_use]
    pub fn employee_id(&self) -> Option<&str> {
        non_blank(self.identifiers.employee_id.as_ref())
    }

    /// Non-blank device hashes.
    pub fn device_hashes(&self) -> impl Iterator<Item = &str> {
        self.identifiers
            .device_hashes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Face embedding, `None` when absent or empty.
    #[must_use]
    pub fn face_embedding(&self) -> Option<&[f32]> {
        self.identifiers
            .face_embedding
            .as_deref()
            .filter(|e| !e.is_empty())
    }

    /// Stored confidence clamped to [0, 1]; 1.0 when absent or not finite.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        match self.metadata.confidence {
            Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
            _ => 1.0,
        }
    }

    /// Lowercased part of the email before `@` (whole address if no `@`).
    #[must_use]
    pub fn email_local_part(&self) -> Option<String> {
        let email = self.email()?;
        let local = email.split('@').next().unwrap_or(email).trim();
        if local.is_empty() {
            None
        } else {
            Some(local.to_lowercase())
        }
    }

    /// Digits of the phone number with every other character stripped.
    #[must_use]
    pub fn phone_digits(&self) -> Option<String> {
        let digits: String = self.phone()?.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            None
        } else {
            Some(digits)
        }
    }

    /// Lowercased whitespace-separated name tokens.
    #[must_use]
    pub fn name_tokens(&self) -> BTreeSet<String> {
        self.name()
            .map(|n| n.split_whitespace().map(str::to_lowercase).collect())
            .unwrap_or_default()
    }

    /// Number of populated scalar identifiers plus device hashes.
    ///
    /// The face embedding is a biometric signal, not an identifier, and is
    /// not counted.
    #[must_use]
    pub fn populated_identifier_count(&self) -> usize {
        let scalars = [
            self.email(),
            self.phone(),
            self.card_id(),
            self.student_id(),
            self.employee_id(),
        ]
        .into_iter()
        .flatten()
        .count();
        scalars + self.device_hashes().count()
    }
}
