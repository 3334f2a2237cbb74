//! The deduplication engine.
//!
//! - [`canonical`] turns article links into comparison keys
//! - [`similarity`] scores how alike two titles are
//! - [`cache`] remembers recently seen articles in a fixed-size FIFO
//! - [`classifier`] combines the three to judge a new article
//!
//! Everything here is synchronous and free of I/O. The scheduler owns the
//! cache and lends it to the classifier and the warm-up routine.

pub mod cache;
pub mod canonical;
pub mod classifier;
pub mod similarity;

pub use cache::{LearnedRecord, RecencyCache};
pub use canonical::canonicalize;
pub use classifier::{Classifier, DuplicateReason, ExemptReason, Verdict};
pub use similarity::{score, SimilarityMethod};
