//! Marks near-duplicate articles in a Tiny Tiny RSS or Miniflux instance.
//!
//! Read history seeds a bounded cache of recently seen articles. New unread
//! articles are compared against it by canonical link and fuzzy title
//! similarity, and duplicates are starred and marked read.

pub mod backend;
pub mod config;
pub mod dedup;
pub mod learn;
pub mod logging;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod tools;
