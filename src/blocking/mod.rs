//! Blocking: propose small candidate sets instead of comparing every pair.
//!
//! An entity is indexed under many overlapping keys (phonetic name codes,
//! identifier values and prefixes, department, face buckets). A candidate
//! query unions the buckets the query entity would be indexed under,
//! restricted to the kinds its [`BlockingStrategy`] consults.

pub mod engine;
pub mod face;
pub mod index;
pub mod key;
pub mod keygen;
pub mod phonetic;

pub use engine::{BlockingEngine, BuildReport, CandidateSet};
pub use index::{IndexStats, IndexStore, KindStats};
pub use key::{BlockKey, BlockingStrategy, IndexKind};
pub use keygen::KeyGenerator;
pub use phonetic::PhoneticEncoder;
