//! # Perceptor Timeline
//!
//! Turns a user's stored event history into a single bounded text corpus
//! that fits one LLM request. The curator reads, the store writes; nothing
//! here mutates events.
//!
//! Two corpus shapes:
//!
//! - **Full**: three recency tiers (Recent, Medium, Background), each with
//!   its own window, character budget, and rendering density.
//! - **Incremental**: only events ingested since the last synthesis,
//!   rendered in full detail.

pub mod curator;
pub mod sample;

pub use curator::{Corpus, TierStats, TimelineCurator};
pub use sample::{dedup_by_prefix, sample_by_source, PREFIX_DEDUP_CHARS};
