//! Face-embedding bucketing.
//!
//! Two schemes feed the identifier strategy:
//! - an exact bucket keyed by a stable hash of the values rounded to three
//!   decimals (bit-identical captures collide), and
//! - sign-random-projection LSH bands, so near-duplicate embeddings collide
//!   in at least one band with high probability.
//!
//! Hyperplanes are derived from blake3 output, so every process builds the
//! same buckets for the same embedding.

use crate::config::FaceLshConfig;

use super::key::{BlockKey, IndexKind};

const PLANE_DOMAIN: &[u8] = b"identilink.face-lsh.v1";

fn round3(v: f32) -> f64 {
    let r = (f64::from(v) * 1000.0).round() / 1000.0;
    // Fold -0.0 into 0.0 so both spellings hash alike.
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

/// Returns true if every component is finite and the vector is non-empty.
#[must_use]
pub fn is_valid_embedding(embedding: &[f32]) -> bool {
    !embedding.is_empty() && embedding.iter().all(|v| v.is_finite())
}

/// Exact-match bucket value: blake3 over the rounded components.
#[must_use]
pub fn exact_hash(embedding: &[f32]) -> String {
    let mut hasher = blake3::Hasher::new();
    for v in embedding {
        hasher.update(format!("{:.3},", round3(*v)).as_bytes());
    }
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..16].to_string()
}

/// Deterministic hyperplane component in [-1, 1].
fn plane_component(reader: &mut blake3::OutputReader) -> f64 {
    let mut buf = [0u8; 4];
    reader.fill(&mut buf);
    let raw = u32::from_le_bytes(buf);
    f64::from(raw) / f64::from(u32::MAX) * 2.0 - 1.0
}

/// LSH band signatures for `embedding`.
#[must_use]
pub fn lsh_signatures(cfg: &FaceLshConfig, embedding: &[f32]) -> Vec<String> {
    let dim = embedding.len();
    let bits = cfg.bits_per_band.clamp(1, 64);
    let mut out = Vec::with_capacity(cfg.bands);

    for band in 0..cfg.bands {
        let mut signature: u64 = 0;
        for bit in 0..bits {
            let mut hasher = blake3::Hasher::new();
            hasher.update(PLANE_DOMAIN);
            hasher.update(&(dim as u64).to_le_bytes());
            hasher.update(&(band as u64).to_le_bytes());
            hasher.update(&(bit as u64).to_le_bytes());
            let mut reader = hasher.finalize_xof();

            let dot: f64 = embedding
                .iter()
                .map(|&x| f64::from(x) * plane_component(&mut reader))
                .sum();
            if dot >= 0.0 {
                signature |= 1 << bit;
            }
        }
        out.push(format!("d{dim}b{band}_{signature:x}"));
    }
    out
}

/// Every face bucket key for `embedding`; empty when the vector is invalid.
#[must_use]
pub fn face_keys(cfg: &FaceLshConfig, embedding: &[f32]) -> Vec<BlockKey> {
    if !is_valid_embedding(embedding) {
        return Vec::new();
    }
    let mut keys = vec![BlockKey::new(IndexKind::Face, exact_hash(embedding))];
    if cfg.enabled {
        keys.extend(
            lsh_signatures(cfg, embedding)
                .into_iter()
                .map(|s| BlockKey::new(IndexKind::FaceLsh, s)),
        );
    }
    keys
}
