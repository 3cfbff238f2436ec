//! `perceptor corpus` — Print the prompt corpus the curator would assemble.
//!
//! Assembly counters go to stderr so the corpus itself can be piped.

use perceptor_config::AppConfig;
use perceptor_timeline::TimelineCurator;

pub async fn run(incremental: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = super::open_store(&config).await?;
    let curator = TimelineCurator::new(store.clone());

    // Incremental needs a prior synthesis to measure from; without one the
    // full three-tier corpus is the answer either way.
    let corpus = match (
        incremental,
        store.latest_profile_created_at(&config.user_id).await?,
    ) {
        (true, Some(since)) => {
            curator
                .incremental_corpus(&config.user_id, since)
                .await?
        }
        _ => curator.corpus(&config.user_id).await?,
    };

    if corpus.is_empty() {
        println!("Timeline is empty — nothing to assemble.");
        return Ok(());
    }

    eprintln!(
        "🧾 Corpus: {} events, {} chars",
        corpus.event_count,
        corpus.text.len()
    );
    for tier in &corpus.tiers {
        eprintln!(
            "   {:<12} fetched {:>4}, rendered {:>4}, {:>6} chars",
            tier.name, tier.fetched, tier.rendered, tier.chars
        );
    }
    eprintln!();

    println!("{}", corpus.text);

    Ok(())
}
