//! Perceptor CLI — the main entry point.
//!
//! Commands:
//! - `init`       — Initialize config directory & default config
//! - `push`       — Submit one activity event
//! - `batch`      — Submit a JSON array of events from a file or stdin
//! - `corpus`     — Print the prompt corpus the curator would assemble
//! - `synthesize` — Run profile synthesis
//! - `status`     — Show system status
//! - `serve`      — Start the HTTP API server

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "perceptor",
    about = "Perceptor — digital activity aggregation and profile synthesis",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration directory and default config file
    Init,

    /// Submit one activity event to the timeline
    Push {
        /// Collector name, e.g. github or browser
        #[arg(short, long)]
        source: String,

        /// Kind of activity, e.g. commit or page_visit
        #[arg(short = 't', long = "type")]
        event_type: String,

        /// Short headline for the event
        #[arg(long, default_value = "")]
        title: String,

        /// Event body text
        #[arg(short, long)]
        content: String,

        /// Extra attributes as a JSON object
        #[arg(short, long)]
        metadata: Option<String>,

        /// ISO 8601 timestamp; omitted means now
        #[arg(long)]
        timestamp: Option<String>,

        /// Collector-supplied identifier for dedup
        #[arg(long)]
        external_id: Option<String>,
    },

    /// Submit a JSON array of events from a file, or `-` for stdin
    Batch {
        /// Path to a JSON file, or `-` to read stdin
        file: String,
    },

    /// Print the prompt corpus the curator would assemble
    Corpus {
        /// Only events ingested since the last synthesis
        #[arg(short, long)]
        incremental: bool,
    },

    /// Synthesize a profile from the stored timeline
    Synthesize {
        /// Rebuild from scratch even when a prior profile exists
        #[arg(short, long)]
        full: bool,

        /// Run the synthesis but skip persisting the result
        #[arg(long)]
        dry_run: bool,
    },

    /// Show system status
    Status,

    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Push {
            source,
            event_type,
            title,
            content,
            metadata,
            timestamp,
            external_id,
        } => {
            commands::push::run(
                source,
                event_type,
                title,
                content,
                metadata,
                timestamp,
                external_id,
            )
            .await?
        }
        Commands::Batch { file } => commands::batch::run(file).await?,
        Commands::Corpus { incremental } => commands::corpus::run(incremental).await?,
        Commands::Synthesize { full, dry_run } => commands::synthesize::run(full, dry_run).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
    }

    Ok(())
}
