//! Running usage totals across provider calls.

use perceptor_core::llm::Completion;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Accumulated token and cost totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cost_usd: f64,
}

/// Caller-owned accumulator for one invocation-layer instance.
///
/// Construct one, hand a clone of the handle to the client, and read the
/// totals whenever needed. Nothing else holds usage state.
#[derive(Debug, Default)]
pub struct UsageMeter {
    totals: RwLock<UsageTotals>,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one completed call into the totals.
    pub fn record(&self, completion: &Completion) {
        let mut totals = self.totals.write().unwrap();
        totals.calls += 1;
        totals.input_tokens += u64::from(completion.input_tokens);
        totals.output_tokens += u64::from(completion.output_tokens);
        totals.reasoning_tokens += u64::from(completion.reasoning_tokens);
        totals.cost_usd += completion.cost_usd;
    }

    /// Snapshot of the current totals.
    pub fn totals(&self) -> UsageTotals {
        *self.totals.read().unwrap()
    }
}
