//! Pair features consumed by the match model and the fallback rule.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entity::Entity;
use crate::error::ValidationError;

/// Constant temporal proximity until sighting timestamps are wired in.
pub const TEMPORAL_PROXIMITY_PLACEHOLDER: f64 = 0.5;
/// Spatial proximity when both entities share a department.
pub const SPATIAL_SAME_DEPARTMENT: f64 = 0.8;
/// Spatial proximity otherwise.
pub const SPATIAL_OTHER: f64 = 0.2;

/// Field-level similarities computed upstream. Absent scores count as 0 in
/// the feature vector and are ignored by the fallback average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityScores {
    pub name: Option<f64>,
    pub email: Option<f64>,
    pub phone: Option<f64>,
    pub face: Option<f64>,
}

impl SimilarityScores {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            name: None,
            email: None,
            phone: None,
            face: None,
        }
    }

    #[must_use]
    pub const fn with_name(mut self, v: f64) -> Self {
        self.name = Some(v);
        self
    }

    #[must_use]
    pub const fn with_email(mut self, v: f64) -> Self {
        self.email = Some(v);
        self
    }

    #[must_use]
    pub const fn with_phone(mut self, v: f64) -> Self {
        self.phone = Some(v);
        self
    }

    #[must_use]
    pub const fn with_face(mut self, v: f64) -> Self {
        self.face = Some(v);
        self
    }

    fn fields(&self) -> [(&'static str, Option<f64>); 4] {
        [
            ("name", self.name),
            ("email", self.email),
            ("phone", self.phone),
            ("face", self.face),
        ]
    }

    /// Mean of the supplied finite scores; 0 when none were supplied.
    #[must_use]
    pub fn average(&self) -> f64 {
        let supplied: Vec<f64> = self
            .fields()
            .iter()
            .filter_map(|(_, v)| *v)
            .filter(|v| v.is_finite())
            .collect();
        if supplied.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = supplied.len() as f64;
        supplied.iter().sum::<f64>() / n
    }

    /// Rejects any supplied non-finite score.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in self.fields() {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(ValidationError::NonFiniteScore {
                        field: field.to_string(),
                        value: v,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every feature the model is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    NameSimilarity,
    EmailSimilarity,
    PhoneSimilarity,
    FaceSimilarity,
    TemporalProximity,
    SpatialProximity,
    CommonIdentifiers,
    IdentifierOverlap,
    NameTokenOverlap,
    DepartmentMatch,
    EntityTypeMatch,
    ConfidenceProduct,
}

impl Feature {
    pub const ALL: [Self; 12] = [
        Self::NameSimilarity,
        Self::EmailSimilarity,
        Self::PhoneSimilarity,
        Self::FaceSimilarity,
        Self::TemporalProximity,
        Self::SpatialProximity,
        Self::CommonIdentifiers,
        Self::IdentifierOverlap,
        Self::NameTokenOverlap,
        Self::DepartmentMatch,
        Self::EntityTypeMatch,
        Self::ConfidenceProduct,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NameSimilarity => "name_similarity",
            Self::EmailSimilarity => "email_similarity",
            Self::PhoneSimilarity => "phone_similarity",
            Self::FaceSimilarity => "face_similarity",
            Self::TemporalProximity => "temporal_proximity",
            Self::SpatialProximity => "spatial_proximity",
            Self::CommonIdentifiers => "common_identifiers",
            Self::IdentifierOverlap => "identifier_overlap",
            Self::NameTokenOverlap => "name_token_overlap",
            Self::DepartmentMatch => "department_match",
            Self::EntityTypeMatch => "entity_type_match",
            Self::ConfidenceProduct => "confidence_product",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Complete feature map; every [`Feature`] is always present and in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    values: BTreeMap<Feature, f64>,
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl FeatureVector {
    /// All features at 0.
    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            values: Feature::ALL.iter().map(|f| (*f, 0.0)).collect(),
        }
    }

    /// Set a feature, clamping into [0, 1] (non-finite becomes 0).
    pub fn set(&mut self, feature: Feature, value: f64) {
        self.values.insert(feature, unit(value));
    }

    #[must_use]
    pub fn get(&self, feature: Feature) -> f64 {
        self.values.get(&feature).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Output of feature extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFeatures {
    pub vector: FeatureVector,
    /// Unnormalized count of shared identifiers (the vector holds it clamped).
    pub common_identifiers: usize,
}

impl ExtractedFeatures {
    fn zeroed() -> Self {
        Self {
            vector: FeatureVector::zeroed(),
            common_identifiers: 0,
        }
    }
}

fn eq_ignore_case(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

fn eq_exact(a: Option<&str>, b: Option<&str>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

/// Shared identifiers between two entities: one per equal scalar identifier
/// plus the size of the device-hash intersection.
#[must_use]
pub fn common_identifiers(e1: &Entity, e2: &Entity) -> usize {
    let mut n = 0;
    if eq_ignore_case(e1.email(), e2.email()) {
        n += 1;
    }
    if matches!((e1.phone_digits(), e2.phone_digits()), (Some(a), Some(b)) if a == b) {
        n += 1;
    }
    for (a, b) in [
        (e1.card_id(), e2.card_id()),
        (e1.student_id(), e2.student_id()),
        (e1.employee_id(), e2.employee_id()),
    ] {
        if eq_exact(a, b) {
            n += 1;
        }
    }
    let d1: BTreeSet<&str> = e1.device_hashes().collect();
    n + e2.device_hashes().filter(|d| d1.contains(d)).count()
}

#[allow(clippy::cast_precision_loss)]
fn ratio(shared: usize, a: usize, b: usize) -> f64 {
    if a == 0 || b == 0 {
        return 0.0;
    }
    shared as f64 / a.max(b) as f64
}

fn try_extract(
    e1: &Entity,
    e2: &Entity,
    scores: &SimilarityScores,
) -> Result<ExtractedFeatures, ValidationError> {
    scores.validate()?;

    let mut v = FeatureVector::zeroed();
    v.set(Feature::NameSimilarity, scores.name.unwrap_or(0.0));
    v.set(Feature::EmailSimilarity, scores.email.unwrap_or(0.0));
    v.set(Feature::PhoneSimilarity, scores.phone.unwrap_or(0.0));
    v.set(Feature::FaceSimilarity, scores.face.unwrap_or(0.0));
    v.set(Feature::TemporalProximity, TEMPORAL_PROXIMITY_PLACEHOLDER);

    let same_department = eq_ignore_case(e1.department(), e2.department());
    v.set(
        Feature::SpatialProximity,
        if same_department {
            SPATIAL_SAME_DEPARTMENT
        } else {
            SPATIAL_OTHER
        },
    );
    v.set(Feature::DepartmentMatch, f64::from(u8::from(same_department)));

    let type_match = matches!((e1.entity_type(), e2.entity_type()), (Some(a), Some(b)) if a == b);
    v.set(Feature::EntityTypeMatch, f64::from(u8::from(type_match)));

    let common = common_identifiers(e1, e2);
    #[allow(clippy::cast_precision_loss)]
    let common_f = common as f64;
    v.set(Feature::CommonIdentifiers, common_f);
    v.set(
        Feature::IdentifierOverlap,
        ratio(
            common,
            e1.populated_identifier_count(),
            e2.populated_identifier_count(),
        ),
    );

    let t1 = e1.name_tokens();
    let t2 = e2.name_tokens();
    v.set(
        Feature::NameTokenOverlap,
        ratio(t1.intersection(&t2).count(), t1.len(), t2.len()),
    );

    v.set(Feature::ConfidenceProduct, e1.confidence() * e2.confidence());

    Ok(ExtractedFeatures {
        vector: v,
        common_identifiers: common,
    })
}

/// Build the feature vector for a pair. Malformed input yields the all-zero
/// vector instead of an error.
#[must_use]
pub fn extract_features(e1: &Entity, e2: &Entity, scores: &SimilarityScores) -> ExtractedFeatures {
    match try_extract(e1, e2, scores) {
        Ok(f) => f,
        Err(e) => {
            warn!(
                entity1 = %e1.id,
                entity2 = %e2.id,
                error = %e,
                "feature extraction failed; using zero vector"
            );
            ExtractedFeatures::zeroed()
        }
    }
}
