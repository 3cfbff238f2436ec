//! `perceptor batch` — Submit a JSON array of events from a file or stdin.

use perceptor_config::AppConfig;
use perceptor_ingest::IngestGateway;

pub async fn run(file: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let raw = if file == "-" {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("Failed to read stdin: {e}"))?;
        buf
    } else {
        std::fs::read_to_string(&file).map_err(|e| format!("Failed to read {file}: {e}"))?
    };

    let entries: Vec<serde_json::Value> =
        serde_json::from_str(&raw).map_err(|e| format!("Batch input must be a JSON array: {e}"))?;

    let store = super::open_store(&config).await?;
    let gateway = IngestGateway::new(store, &config.user_id);

    let report = gateway.submit_batch(entries).await;

    println!("📦 Batch Report");
    println!("─────────────────────");
    println!("  Total:      {}", report.total);
    println!("  Inserted:   {}", report.inserted);
    println!("  Duplicates: {}", report.duplicates);
    println!("  Filtered:   {}", report.filtered);

    if !report.errors.is_empty() {
        println!();
        println!("  Errors:");
        for err in &report.errors {
            println!("    [{}] {}", err.index, err.error);
        }
    }

    Ok(())
}
