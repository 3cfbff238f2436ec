//! The synthesis orchestrator.
//!
//! One `Synthesizer` owns the store and LLM handles and turns a user's
//! timeline into a new profile version: corpus in, one completion call,
//! parsed draft out, accounting attached, optionally persisted.

use std::sync::Arc;

use chrono::Utc;
use perceptor_core::error::SynthesisError;
use perceptor_core::llm::{ChatMessage, CompletionRequest, LlmClient, ReasoningConfig};
use perceptor_core::profile::Profile;
use perceptor_core::store::EventStore;
use perceptor_timeline::TimelineCurator;
use serde::Deserialize;
use tracing::{info, warn};

use crate::parse::parse_profile;
use crate::prompts;

/// Tunables for synthesis runs, fixed at construction.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Extended-reasoning budget; `None` disables reasoning entirely
    pub reasoning_budget: Option<u32>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".into(),
            max_tokens: 8192,
            temperature: 1.0,
            reasoning_budget: Some(16_000),
        }
    }
}

/// What kind of run the caller wants.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SynthesisRequest {
    /// Force a from-scratch run even when a profile already exists
    #[serde(default)]
    pub full: bool,

    /// Append the result to the profile history
    #[serde(default = "default_persist")]
    pub persist: bool,
}

fn default_persist() -> bool {
    true
}

impl Default for SynthesisRequest {
    fn default() -> Self {
        Self {
            full: false,
            persist: true,
        }
    }
}

/// Orchestrates one synthesis pass over a user's timeline.
pub struct Synthesizer {
    store: Arc<dyn EventStore>,
    llm: Arc<dyn LlmClient>,
    curator: TimelineCurator,
    options: SynthesisOptions,
}

impl Synthesizer {
    pub fn new(
        store: Arc<dyn EventStore>,
        llm: Arc<dyn LlmClient>,
        options: SynthesisOptions,
    ) -> Self {
        let curator = TimelineCurator::new(store.clone());
        Self {
            store,
            llm,
            curator,
            options,
        }
    }

    /// Run one synthesis pass and return the new profile.
    ///
    /// 1. Picks the mode: full when requested or when no profile exists yet
    /// 2. Assembles the corpus (whole tiered timeline, or the ingestion delta
    ///    since the previous profile)
    /// 3. Calls the model once; transport-level retries live below this seam
    /// 4. Parses the JSON draft and attaches sources, counts, and cost
    /// 5. Optionally appends the result to the profile history
    pub async fn synthesize(
        &self,
        user_id: &str,
        request: SynthesisRequest,
    ) -> Result<Profile, SynthesisError> {
        let previous = if request.full {
            None
        } else {
            self.store.latest_profile(user_id).await?
        };

        // ── Corpus assembly ──
        let (mode, corpus) = match &previous {
            Some(prior) => (
                "incremental",
                self.curator
                    .incremental_corpus(user_id, prior.created_at)
                    .await?,
            ),
            None => ("full", self.curator.corpus(user_id).await?),
        };

        if corpus.is_empty() {
            info!(user_id, mode, "Nothing to synthesize");
            return Err(SynthesisError::EmptyCorpus(user_id.to_string()));
        }

        let sources = self.store.sources(user_id).await?;
        let total_events = self.store.count_events(user_id).await?;

        let prompt = match &previous {
            Some(prior) => {
                prompts::incremental(prior, &corpus.text, corpus.event_count, total_events)
            }
            None => prompts::full(&sources, total_events, &corpus.text),
        };

        info!(
            user_id,
            mode,
            events = corpus.event_count,
            prompt_chars = prompt.user.len(),
            "Starting profile synthesis"
        );

        // ── Invocation ──
        let completion = self
            .llm
            .complete(CompletionRequest {
                model: self.options.model.clone(),
                messages: vec![ChatMessage::user(prompt.user)],
                system: Some(prompt.system),
                max_tokens: self.options.max_tokens,
                temperature: self.options.temperature,
                reasoning: self
                    .options
                    .reasoning_budget
                    .map(|budget_tokens| ReasoningConfig { budget_tokens }),
            })
            .await?;

        // A malformed draft is fatal for this run: the same prompt would buy
        // the same malformed answer, so the output is discarded, not retried.
        let draft = match parse_profile(&completion.text) {
            Ok(draft) => draft,
            Err(e) => {
                warn!(user_id, model = %completion.model, error = %e, "Profile parse failed");
                return Err(e);
            }
        };

        let profile = Profile {
            user_id: user_id.to_string(),
            identity_anchor: draft.identity_anchor,
            active_threads: draft.active_threads,
            recent_details: draft.recent_details,
            background_context: draft.background_context,
            world_state: draft.world_state,
            voice_pattern: draft.voice_pattern,
            sources,
            event_count: total_events,
            model: completion.model.clone(),
            reasoning_tokens: completion.reasoning_tokens,
            cost_usd: completion.cost_usd,
            created_at: Utc::now(),
        };

        if request.persist {
            self.store.save_profile(&profile).await?;
        }

        info!(
            user_id,
            mode,
            threads = profile.active_threads.len(),
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            cost_usd = completion.cost_usd,
            persisted = request.persist,
            "Synthesis complete"
        );

        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perceptor_core::error::LlmError;
    use perceptor_core::event::NewEvent;
    use perceptor_core::llm::Completion;
    use perceptor_core::profile::{ActiveThread, ThreadIntensity};
    use perceptor_store::MemoryStore;
    use std::sync::Mutex;

    const PROFILE_JSON: &str = r#"{
        "identity_anchor": "Builder who narrates everything in commit messages",
        "active_threads": [
            {"name": "perception pipeline", "description": "wiring the event store",
             "intensity": "high", "platforms": ["github"],
             "recent_signals": ["six commits in two days"]}
        ],
        "recent_details": "Heads-down on storage",
        "background_context": "Came from data engineering",
        "world_state": "Quiet month otherwise",
        "voice_pattern": null
    }"#;

    /// Returns a fixed completion and records what it was asked.
    struct CannedLlm {
        text: String,
        calls: Mutex<usize>,
        last_request: Mutex<Option<CompletionRequest>>,
    }

    impl CannedLlm {
        fn returning(text: &str) -> Arc<Self> {
            Arc::new(Self {
                text: text.into(),
                calls: Mutex::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        fn last_request(&self) -> CompletionRequest {
            self.last_request.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for CannedLlm {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
            *self.calls.lock().unwrap() += 1;
            *self.last_request.lock().unwrap() = Some(request);
            Ok(Completion {
                text: self.text.clone(),
                reasoning: "weighed the activity".into(),
                input_tokens: 1200,
                output_tokens: 400,
                reasoning_tokens: 120,
                model: "claude-sonnet-4-20250514".into(),
                cost_usd: 0.0096,
            })
        }
    }

    struct FailingLlm;

    #[async_trait::async_trait]
    impl LlmClient for FailingLlm {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<Completion, LlmError> {
            Err(LlmError::Api {
                status_code: 500,
                message: "Internal server error".into(),
            })
        }
    }

    async fn seed_events(store: &MemoryStore, count: u32) {
        for n in 0..count {
            store
                .insert_event(NewEvent {
                    user_id: "ada".into(),
                    source: "github".into(),
                    event_type: "commit".into(),
                    title: format!("commit {n}"),
                    content: format!("commit {n}: adjust compaction thresholds"),
                    metadata: None,
                    occurred_at: Utc::now() - chrono::Duration::hours(i64::from(n) + 1),
                    external_id: None,
                })
                .await
                .unwrap();
        }
    }

    async fn seed_prior_profile(store: &MemoryStore) {
        store
            .save_profile(&Profile {
                user_id: "ada".into(),
                identity_anchor: "Early-morning refactorer".into(),
                active_threads: vec![ActiveThread {
                    name: "storage engine".into(),
                    description: "compactor rework".into(),
                    intensity: ThreadIntensity::High,
                    platforms: vec!["github".into()],
                    recent_signals: vec![],
                }],
                recent_details: String::new(),
                background_context: String::new(),
                world_state: String::new(),
                voice_pattern: None,
                sources: vec!["github".into()],
                event_count: 10,
                model: "claude-sonnet-4-20250514".into(),
                reasoning_tokens: 0,
                cost_usd: 0.0,
                created_at: Utc::now() - chrono::Duration::hours(1),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_run_synthesizes_from_the_full_timeline() {
        let store = Arc::new(MemoryStore::new());
        seed_events(&store, 3).await;
        let llm = CannedLlm::returning(PROFILE_JSON);

        let synth = Synthesizer::new(store.clone(), llm.clone(), SynthesisOptions::default());
        let profile = synth
            .synthesize("ada", SynthesisRequest::default())
            .await
            .unwrap();

        assert_eq!(
            profile.identity_anchor,
            "Builder who narrates everything in commit messages"
        );

        let request = llm.last_request();
        assert!(request.messages[0].content.contains("[Recent Activity"));
        assert!(request.system.as_deref().unwrap().contains("identity_anchor"));

        // Default request persists
        let saved = store.latest_profile("ada").await.unwrap().unwrap();
        assert_eq!(saved.identity_anchor, profile.identity_anchor);
    }

    #[tokio::test]
    async fn later_runs_go_incremental() {
        let store = Arc::new(MemoryStore::new());
        seed_prior_profile(&store).await;
        seed_events(&store, 2).await;
        let llm = CannedLlm::returning(PROFILE_JSON);

        let synth = Synthesizer::new(store.clone(), llm.clone(), SynthesisOptions::default());
        synth
            .synthesize("ada", SynthesisRequest::default())
            .await
            .unwrap();

        let user_prompt = llm.last_request().messages[0].content.clone();
        assert!(user_prompt.contains("previously built"));
        assert!(user_prompt.contains("Early-morning refactorer"));
        assert!(user_prompt.contains("[New Activity"));
    }

    #[tokio::test]
    async fn full_flag_forces_a_from_scratch_run() {
        let store = Arc::new(MemoryStore::new());
        seed_prior_profile(&store).await;
        seed_events(&store, 2).await;
        let llm = CannedLlm::returning(PROFILE_JSON);

        let synth = Synthesizer::new(store.clone(), llm.clone(), SynthesisOptions::default());
        synth
            .synthesize(
                "ada",
                SynthesisRequest {
                    full: true,
                    persist: false,
                },
            )
            .await
            .unwrap();

        let user_prompt = llm.last_request().messages[0].content.clone();
        assert!(!user_prompt.contains("previously built"));
        assert!(user_prompt.contains("[Recent Activity"));
    }

    #[tokio::test]
    async fn empty_store_refuses_to_synthesize() {
        let store = Arc::new(MemoryStore::new());
        let llm = CannedLlm::returning(PROFILE_JSON);

        let synth = Synthesizer::new(store, llm.clone(), SynthesisOptions::default());
        let err = synth
            .synthesize("ada", SynthesisRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SynthesisError::EmptyCorpus(_)));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn no_new_activity_is_nothing_to_do() {
        let store = Arc::new(MemoryStore::new());
        seed_prior_profile(&store).await;
        let llm = CannedLlm::returning(PROFILE_JSON);

        let synth = Synthesizer::new(store, llm.clone(), SynthesisOptions::default());
        let err = synth
            .synthesize("ada", SynthesisRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SynthesisError::EmptyCorpus(_)));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn dry_run_skips_the_profile_history() {
        let store = Arc::new(MemoryStore::new());
        seed_events(&store, 3).await;
        let llm = CannedLlm::returning(PROFILE_JSON);

        let synth = Synthesizer::new(store.clone(), llm, SynthesisOptions::default());
        let profile = synth
            .synthesize(
                "ada",
                SynthesisRequest {
                    full: false,
                    persist: false,
                },
            )
            .await
            .unwrap();

        assert!(!profile.identity_anchor.is_empty());
        assert!(store.latest_profile("ada").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn accounting_lands_on_the_profile() {
        let store = Arc::new(MemoryStore::new());
        seed_events(&store, 5).await;
        let llm = CannedLlm::returning(PROFILE_JSON);

        let synth = Synthesizer::new(store, llm, SynthesisOptions::default());
        let profile = synth
            .synthesize("ada", SynthesisRequest::default())
            .await
            .unwrap();

        assert_eq!(profile.reasoning_tokens, 120);
        assert!((profile.cost_usd - 0.0096).abs() < 1e-9);
        assert_eq!(profile.model, "claude-sonnet-4-20250514");
        assert_eq!(profile.event_count, 5);
        assert_eq!(profile.sources, vec!["github".to_string()]);
    }

    #[tokio::test]
    async fn reasoning_budget_reaches_the_request() {
        let store = Arc::new(MemoryStore::new());
        seed_events(&store, 1).await;
        let llm = CannedLlm::returning(PROFILE_JSON);

        let options = SynthesisOptions {
            reasoning_budget: Some(9_000),
            ..SynthesisOptions::default()
        };
        let synth = Synthesizer::new(store.clone(), llm.clone(), options);
        synth
            .synthesize("ada", SynthesisRequest::default())
            .await
            .unwrap();
        assert_eq!(llm.last_request().reasoning.unwrap().budget_tokens, 9_000);

        let llm = CannedLlm::returning(PROFILE_JSON);
        let options = SynthesisOptions {
            reasoning_budget: None,
            max_tokens: 2_048,
            ..SynthesisOptions::default()
        };
        let synth = Synthesizer::new(store, llm.clone(), options);
        synth
            .synthesize("ada", SynthesisRequest::default())
            .await
            .unwrap();
        let request = llm.last_request();
        assert!(request.reasoning.is_none());
        assert_eq!(request.max_tokens, 2_048);
    }

    #[tokio::test]
    async fn model_chatter_is_a_parse_failure() {
        let store = Arc::new(MemoryStore::new());
        seed_events(&store, 2).await;
        let llm = CannedLlm::returning("I had trouble reading this activity log.");

        let synth = Synthesizer::new(store.clone(), llm.clone(), SynthesisOptions::default());
        let err = synth
            .synthesize("ada", SynthesisRequest::default())
            .await
            .unwrap_err();

        match err {
            SynthesisError::ParseFailed { excerpt, .. } => {
                assert!(excerpt.contains("I had trouble"));
            }
            other => panic!("expected ParseFailed, got {other}"),
        }
        assert_eq!(llm.calls(), 1);
        assert!(store.latest_profile("ada").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn provider_errors_pass_through() {
        let store = Arc::new(MemoryStore::new());
        seed_events(&store, 2).await;

        let synth = Synthesizer::new(
            store.clone(),
            Arc::new(FailingLlm),
            SynthesisOptions::default(),
        );
        let err = synth
            .synthesize("ada", SynthesisRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SynthesisError::Llm(LlmError::Api { .. })));
        assert!(store.latest_profile("ada").await.unwrap().is_none());
    }
}
