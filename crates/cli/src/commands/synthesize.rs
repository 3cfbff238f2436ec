//! `perceptor synthesize` — Run profile synthesis.

use perceptor_config::AppConfig;
use perceptor_synthesis::{SynthesisRequest, Synthesizer};

pub async fn run(full: bool, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early — give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export ANTHROPIC_API_KEY='sk-ant-...'");
        eprintln!("    export PERCEPTOR_API_KEY='sk-ant-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let store = super::open_store(&config).await?;
    let (llm, meter) = super::build_llm(&config);
    let synthesizer = Synthesizer::new(store, llm, super::synthesis_options(&config));

    let request = SynthesisRequest {
        full,
        persist: !dry_run,
    };

    eprint!("  Synthesizing...");
    let result = synthesizer.synthesize(&config.user_id, request).await;
    eprint!("\r               \r");

    let profile = result.map_err(|e| format!("Synthesis failed: {e}"))?;

    println!("🧠 Profile for {}", profile.user_id);
    println!("═══════════════════════════════════");
    println!();
    println!("  {}", profile.identity_anchor);

    if !profile.active_threads.is_empty() {
        println!();
        println!("  Active threads:");
        for thread in &profile.active_threads {
            println!(
                "    [{}] {} — {}",
                thread.intensity, thread.name, thread.description
            );
        }
    }

    if !profile.recent_details.is_empty() {
        println!();
        println!("  Recent details:");
        println!("    {}", profile.recent_details);
    }

    if !profile.world_state.is_empty() {
        println!();
        println!("  World state:");
        println!("    {}", profile.world_state);
    }

    if let Some(voice) = &profile.voice_pattern {
        println!();
        println!("  Voice: {} — {}", voice.tone, voice.style);
    }

    let totals = meter.totals();
    println!();
    println!("  Model:            {}", profile.model);
    println!("  Events:           {}", profile.event_count);
    println!("  Sources:          {}", profile.sources.join(", "));
    println!("  Reasoning tokens: {}", profile.reasoning_tokens);
    println!(
        "  Session usage:    {} calls, {} in / {} out tokens",
        totals.calls, totals.input_tokens, totals.output_tokens
    );
    println!("  Cost:             ${:.4}", profile.cost_usd);

    if dry_run {
        println!();
        println!("  🏷️  DRY RUN — profile not persisted.");
    }

    Ok(())
}
