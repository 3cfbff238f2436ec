//! # Perceptor Providers
//!
//! The LLM invocation layer: an Anthropic Messages API client with
//! retry/backoff, a streaming transport for reasoning calls, typed
//! response-block parsing, and per-call cost accounting.
//!
//! All clients implement `perceptor_core::LlmClient`; the rest of the
//! system only sees that trait.

pub mod anthropic;
pub mod meter;
pub mod pricing;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use meter::{UsageMeter, UsageTotals};
pub use pricing::{ModelPricing, PricingTable};
pub use retry::{with_retry, RetryPolicy, RetryStep};
