//! # Perceptor Core
//!
//! Domain types, traits, and error definitions for the Perceptor activity
//! timeline and profile synthesis pipeline. This crate has **zero framework
//! dependencies** — it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! The two external collaborators — the event/profile store and the LLM
//! backend — are defined as traits here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod llm;
pub mod profile;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, LlmError, Result, StoreError, SynthesisError};
pub use event::{ActivityEvent, EventQuery, InsertOutcome, NewEvent};
pub use llm::{ChatMessage, Completion, CompletionRequest, LlmClient, ReasoningConfig, Role};
pub use profile::{ActiveThread, Profile, ThreadIntensity, VoicePattern};
pub use store::EventStore;
