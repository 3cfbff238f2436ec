//! `perceptor init` — First-time setup.

use perceptor_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("👁  Perceptor setup");
    println!("──────────────────\n");

    if config_dir.exists() {
        println!("  Config directory already present: {}", config_dir.display());
    } else {
        std::fs::create_dir_all(&config_dir)
            .map_err(|e| format!("Failed to create {}: {e}", config_dir.display()))?;
        println!("  ✅ Config directory created: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("  ⚠️  Keeping existing {}", config_path.display());
        println!("     Delete it and re-run init to start over.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())
        .map_err(|e| format!("Failed to write {}: {e}", config_path.display()))?;
    println!("  ✅ Wrote default config: {}", config_path.display());

    println!("\n📝 Next steps:");
    println!("   1. Edit {} and set user_id", config_path.display());
    println!("   2. Export ANTHROPIC_API_KEY (or PERCEPTOR_API_KEY)");
    println!("   3. Push some activity: perceptor push --source github --type commit --content '...'");
    println!("   4. Build your profile: perceptor synthesize\n");

    Ok(())
}
