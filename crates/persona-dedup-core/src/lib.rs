//! # persona-dedup core
//!
//! Runtime-free logic for persona-dedup: the name-pair data model, the
//! retry policy, free-text verdict parsing, citation deduplication, the
//! per-batch result state, and the [`classifier::Classifier`] trait.
//!
//! This crate contains no tokio, reqwest, or filesystem I/O. Timing is
//! expressed as [`std::time::Duration`] values; sleeping and network calls
//! belong to the `persona-dedup` app crate.

pub mod batch;
pub mod classifier;
pub mod models;
pub mod policy;
pub mod verdict;
