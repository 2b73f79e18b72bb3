//! Phonetic encodings for name tokens.
//!
//! Each token yields a consonant-skeleton code (Soundex), a Metaphone code
//! and zero, one or two Double Metaphone codes, so spelling variants such as
//! "John" and "Jon" land in shared buckets.

use std::sync::OnceLock;

use regex::Regex;
use rphonetic::{DoubleMetaphone, Encoder, Metaphone, Soundex};

use super::key::{BlockKey, IndexKind};

fn non_letters() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z]").expect("static regex is valid"))
}

/// Lowercase a token and strip everything that is not an ASCII letter.
#[must_use]
pub fn normalize_token(token: &str) -> String {
    non_letters()
        .replace_all(&token.to_lowercase(), "")
        .into_owned()
}

/// Bundles the three encoders.
#[derive(Debug)]
pub struct PhoneticEncoder {
    soundex: Soundex,
    metaphone: Metaphone,
    double_metaphone: DoubleMetaphone,
}

impl Default for PhoneticEncoder {
    fn default() -> Self {
        Self {
            soundex: Soundex::default(),
            metaphone: Metaphone::default(),
            double_metaphone: DoubleMetaphone::default(),
        }
    }
}

impl PhoneticEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Soundex code, `None` if the token has no letters.
    #[must_use]
    pub fn soundex(&self, token: &str) -> Option<String> {
        let t = normalize_token(token);
        if t.is_empty() {
            return None;
        }
        Some(self.soundex.encode(&t)).filter(|c| !c.is_empty())
    }

    /// Metaphone code, `None` if the encoding is empty.
    #[must_use]
    pub fn metaphone(&self, token: &str) -> Option<String> {
        let t = normalize_token(token);
        if t.is_empty() {
            return None;
        }
        Some(self.metaphone.encode(&t)).filter(|c| !c.is_empty())
    }

    /// Distinct non-empty Double Metaphone codes (primary, then alternate).
    #[must_use]
    pub fn double_metaphone(&self, token: &str) -> Vec<String> {
        let t = normalize_token(token);
        if t.is_empty() {
            return Vec::new();
        }
        let primary = self.double_metaphone.encode(&t);
        let alternate = self.double_metaphone.encode_alternate(&t);

        let mut out = Vec::with_capacity(2);
        if !primary.is_empty() {
            out.push(primary);
        }
        if !alternate.is_empty() && !out.contains(&alternate) {
            out.push(alternate);
        }
        out
    }

    /// Every phonetic bucket key for one token.
    #[must_use]
    pub fn keys(&self, token: &str) -> Vec<BlockKey> {
        let mut out = Vec::with_capacity(4);
        if let Some(code) = self.soundex(token) {
            out.push(BlockKey::new(IndexKind::Soundex, code));
        }
        if let Some(code) = self.metaphone(token) {
            out.push(BlockKey::new(IndexKind::Metaphone, code));
        }
        out.extend(
            self.double_metaphone(token)
                .into_iter()
                .map(|code| BlockKey::new(IndexKind::DoubleMetaphone, code)),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize_token("O'Brien"), "obrien");
        assert_eq!(normalize_token("Anne-Marie"), "annemarie");
        assert_eq!(normalize_token("42"), "");
    }

    #[test]
    fn soundex_groups_spelling_variants() {
        let enc = PhoneticEncoder::new();
        assert_eq!(enc.soundex("John").as_deref(), Some("J500"));
        assert_eq!(enc.soundex("Jon"), enc.soundex("John"));
        assert_eq!(enc.soundex("Robert"), enc.soundex("Rupert"));
        assert_eq!(enc.soundex("1234"), None);
    }

    #[test]
    fn metaphone_groups_spelling_variants() {
        let enc = PhoneticEncoder::new();
        assert_eq!(enc.metaphone("Smith"), enc.metaphone("Smyth"));
    }

    #[test]
    fn double_metaphone_codes_are_distinct_and_non_empty() {
        let enc = PhoneticEncoder::new();
        let codes = enc.double_metaphone("Schmidt");
        assert!(!codes.is_empty() && codes.len() <= 2);
        assert!(codes.iter().all(|c| !c.is_empty()));
        if codes.len() == 2 {
            assert_ne!(codes[0], codes[1]);
        }
        assert!(enc.double_metaphone("").is_empty());
    }

    #[test]
    fn keys_cover_all_three_encodings() {
        let enc = PhoneticEncoder::new();
        let keys = enc.keys("John");
        assert!(keys.iter().any(|k| k.kind == IndexKind::Soundex));
        assert!(keys.iter().any(|k| k.kind == IndexKind::Metaphone));
        assert!(keys.iter().any(|k| k.kind == IndexKind::DoubleMetaphone));
        assert!(enc.keys("--").is_empty());
    }
}
