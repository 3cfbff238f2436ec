//! `perceptor status` — Show system status.

use perceptor_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("👁  Perceptor Status");
    println!("==================");
    println!("  Config dir:  {}", AppConfig::config_dir().display());
    println!("  User:        {}", config.user_id);
    println!("  Model:       {}", config.model);
    if config.store.backend == "memory" {
        println!("  Store:       memory (ephemeral)");
    } else {
        println!("  Store:       sqlite at {}", config.store_path().display());
    }
    println!("  API:         {}:{}", config.api.host, config.api.port);
    if config.synthesis.reasoning {
        println!(
            "  Reasoning:   enabled ({} token budget)",
            config.synthesis.reasoning_budget
        );
    } else {
        println!("  Reasoning:   disabled");
    }
    println!(
        "  API key:     {}",
        if config.has_api_key() { "configured" } else { "missing" }
    );

    let store = super::open_store(&config).await?;
    let event_count = store.count_events(&config.user_id).await?;
    let sources = store.sources(&config.user_id).await?;
    let latest_profile = store.latest_profile(&config.user_id).await?;

    println!();
    println!("  Timeline:");
    println!("    Events:   {event_count}");
    println!(
        "    Sources:  {}",
        if sources.is_empty() {
            "(none)".to_string()
        } else {
            sources.join(", ")
        }
    );
    match latest_profile {
        Some(profile) => {
            println!(
                "    Profile:  synthesized {} ({} events, ${:.4})",
                profile.created_at.to_rfc3339(),
                profile.event_count,
                profile.cost_usd
            );
        }
        None => println!("    Profile:  never synthesized"),
    }

    // Check config file existence
    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `perceptor init` first");
    }

    Ok(())
}
