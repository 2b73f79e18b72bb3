//! Entity → bucket key derivation.

use std::collections::BTreeSet;

use crate::config::BlockingConfig;
use crate::entity::Entity;
use crate::error::ValidationError;

use super::face::{face_keys, is_valid_embedding};
use super::key::{BlockKey, BlockingStrategy, IndexKind};
use super::phonetic::PhoneticEncoder;

const EMAIL_PREFIX_LEN: usize = 3;
const STUDENT_PREFIX_LEN: usize = 4;
const PHONE_SUFFIX_LEN: usize = 4;

/// Derives the full key set for an entity.
#[derive(Debug, Default)]
pub struct KeyGenerator {
    phonetic: PhoneticEncoder,
    cfg: BlockingConfig,
}

impl KeyGenerator {
    #[must_use]
    pub fn new(cfg: BlockingConfig) -> Self {
        Self {
            phonetic: PhoneticEncoder::new(),
            cfg,
        }
    }

    /// Every key the entity produces, deduplicated and sorted.
    ///
    /// Fails only when the entity has no usable id; malformed optional fields
    /// (e.g. a non-finite face embedding) are skipped.
    pub fn keys_for(&self, entity: &Entity) -> Result<BTreeSet<BlockKey>, ValidationError> {
        if entity.id.is_empty() {
            return Err(ValidationError::EmptyEntityId);
        }

        let mut keys = BTreeSet::new();
        self.name_keys(entity, &mut keys);
        Self::identifier_keys(entity, &mut keys);
        self.face_keys(entity, &mut keys);
        if let Some(dept) = entity.department() {
            keys.insert(BlockKey::new(IndexKind::Department, dept.to_lowercase()));
        }
        Ok(keys)
    }

    /// Keys consulted by `strategy` when `entity` is the query.
    pub fn query_keys(
        &self,
        entity: &Entity,
        strategy: BlockingStrategy,
    ) -> Result<BTreeSet<BlockKey>, ValidationError> {
        let mut keys = self.keys_for(entity)?;
        keys.retain(|k| strategy.includes(k.kind));
        Ok(keys)
    }

    fn name_keys(&self, entity: &Entity, keys: &mut BTreeSet<BlockKey>) {
        let Some(name) = entity.name() else {
            return;
        };

        for token in name.split_whitespace().filter(|t| t.chars().count() > 1) {
            keys.extend(self.phonetic.keys(token));
        }

        let full = name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        keys.insert(BlockKey::new(IndexKind::FullName, full));
    }

    fn identifier_keys(entity: &Entity, keys: &mut BTreeSet<BlockKey>) {
        if let Some(local) = entity.email_local_part() {
            let prefix: String = local.chars().take(EMAIL_PREFIX_LEN).collect();
            keys.insert(BlockKey::new(IndexKind::EmailPrefix, prefix));
            keys.insert(BlockKey::new(IndexKind::Email, local));
        }

        if let Some(digits) = entity.phone_digits() {
            if digits.len() >= PHONE_SUFFIX_LEN {
                let suffix = &digits[digits.len() - PHONE_SUFFIX_LEN..];
                keys.insert(BlockKey::new(IndexKind::Phone, suffix));
            }
        }

        if let Some(card) = entity.card_id() {
            keys.insert(BlockKey::new(IndexKind::CardId, card));
        }

        if let Some(student) = entity.student_id() {
            keys.insert(BlockKey::new(IndexKind::StudentId, student));
            if student.chars().count() >= STUDENT_PREFIX_LEN {
                let prefix: String = student.chars().take(STUDENT_PREFIX_LEN).collect();
                keys.insert(BlockKey::new(IndexKind::StudentIdPrefix, prefix));
            }
        }

        if let Some(employee) = entity.employee_id() {
            keys.insert(BlockKey::new(IndexKind::EmployeeId, employee));
        }

        for device in entity.device_hashes() {
            keys.insert(BlockKey::new(IndexKind::Device, device));
        }
    }

    fn face_keys(&self, entity: &Entity, keys: &mut BTreeSet<BlockKey>) {
        let Some(embedding) = entity.face_embedding() else {
            return;
        };
        if !is_valid_embedding(embedding) {
            tracing::warn!(entity_id = %entity.id, "skipping face embedding with non-finite values");
            return;
        }
        keys.extend(face_keys(&self.cfg.face_lsh, embedding));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(keys: &BTreeSet<BlockKey>, kind: IndexKind) -> Vec<String> {
        keys.iter()
            .filter(|k| k.kind == kind)
            .map(|k| k.value.clone())
            .collect()
    }

    #[test]
    fn name_tokens_and_full_name() {
        let gen = KeyGenerator::default();
        let e = Entity::new("E1").with_name("John  A Doe");
        let keys = gen.keys_for(&e).unwrap();

        assert_eq!(kinds(&keys, IndexKind::FullName), vec!["john a doe".to_string()]);
        let soundex = kinds(&keys, IndexKind::Soundex);
        assert!(soundex.contains(&"J500".to_string()));
        assert!(soundex.contains(&"D000".to_string()));
        // Single-character tokens are not encoded.
        assert_eq!(soundex.len(), 2);
    }

    #[test]
    fn email_phone_and_ids() {
        let gen = KeyGenerator::default();
        let e = Entity::new("E1")
            .with_email("JDoe@x.edu")
            .with_phone("+91 98765-43210")
            .with_card_id("C1488")
            .with_student_id("S14165")
            .with_employee_id("EMP7")
            .with_device_hash("aa:bb")
            .with_department(" CSE ");
        let keys = gen.keys_for(&e).unwrap();

        assert_eq!(kinds(&keys, IndexKind::Email), vec!["jdoe"]);
        assert_eq!(kinds(&keys, IndexKind::EmailPrefix), vec!["jdo"]);
        assert_eq!(kinds(&keys, IndexKind::Phone), vec!["3210"]);
        assert_eq!(kinds(&keys, IndexKind::CardId), vec!["C1488"]);
        assert_eq!(kinds(&keys, IndexKind::StudentId), vec!["S14165"]);
        assert_eq!(kinds(&keys, IndexKind::StudentIdPrefix), vec!["S141"]);
        assert_eq!(kinds(&keys, IndexKind::EmployeeId), vec!["EMP7"]);
        assert_eq!(kinds(&keys, IndexKind::Device), vec!["aa:bb"]);
        assert_eq!(kinds(&keys, IndexKind::Department), vec!["cse"]);
    }

    #[test]
    fn short_values_skip_derived_buckets() {
        let gen = KeyGenerator::default();
        let e = Entity::new("E1")
            .with_phone("12-3")
            .with_student_id("S12")
            .with_email("jd@x.edu");
        let keys = gen.keys_for(&e).unwrap();
        assert!(kinds(&keys, IndexKind::Phone).is_empty());
        assert!(kinds(&keys, IndexKind::StudentIdPrefix).is_empty());
        assert_eq!(kinds(&keys, IndexKind::StudentId), vec!["S12"]);
        assert_eq!(kinds(&keys, IndexKind::EmailPrefix), vec!["jd"]);
    }

    #[test]
    fn empty_id_is_rejected() {
        let gen = KeyGenerator::default();
        let err = gen.keys_for(&Entity::new("  ").with_name("John")).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyEntityId));
    }

    #[test]
    fn bad_face_embedding_is_skipped_not_fatal() {
        let gen = KeyGenerator::default();
        let e = Entity::new("E1")
            .with_name("Jon")
            .with_face_embedding(vec![f32::NAN, 0.2]);
        let keys = gen.keys_for(&e).unwrap();
        assert!(kinds(&keys, IndexKind::Face).is_empty());
        assert!(!kinds(&keys, IndexKind::Soundex).is_empty());
    }

    #[test]
    fn query_keys_filter_by_strategy() {
        let gen = KeyGenerator::default();
        let e = Entity::new("E1")
            .with_name("Jon")
            .with_email("jon@x.edu")
            .with_department("cse");
        let phonetic = gen.query_keys(&e, BlockingStrategy::Phonetic).unwrap();
        assert!(phonetic.iter().all(|k| k.kind.strategy() == BlockingStrategy::Phonetic));
        let dept = gen.query_keys(&e, BlockingStrategy::Department).unwrap();
        assert_eq!(dept.len(), 1);
        let all = gen.query_keys(&e, BlockingStrategy::MultiPass).unwrap();
        assert_eq!(all, gen.keys_for(&e).unwrap());
    }
}
