//! # Perceptor Synthesis
//!
//! The perception orchestrator: turns a curated activity corpus into a
//! structured profile through one LLM call. A run picks full or incremental
//! mode, assembles the matching prompt, parses the model's JSON answer
//! through a two-stage chain, and appends the result to the profile
//! history.
//!
//! Gateway-style in-band results do not exist here; every failure in a
//! run (store, provider, parse, empty corpus) raises a
//! [`perceptor_core::error::SynthesisError`].

pub mod orchestrator;
pub mod parse;
pub mod prompts;

pub use orchestrator::{SynthesisOptions, SynthesisRequest, Synthesizer};
pub use parse::{parse_profile, ProfileDraft};
pub use prompts::SynthesisPrompt;
