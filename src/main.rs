//! scripture-insights CLI and HTTP server.
//!
//! Usage:
//!   scripture-insights serve
//!   scripture-insights normalize "jn3.16"
//!   scripture-insights normalize "1 cor 13.4-7" --local
//!   scripture-insights insight --kind topic "grace" --translation ESV

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use scripture_insights::config::Config;
use scripture_insights::http::start_http_server;
use scripture_insights::{InferenceGateway, InsightAggregator, InsightKind, ReferenceNormalizer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scripture-insights", version)]
#[command(about = "Contextual Bible-study insights from a local model", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file (overrides INSIGHTS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve,
    /// Normalize a scripture reference and print the canonical form
    Normalize {
        reference: String,
        /// Skip the model and use only the local parser
        #[arg(long)]
        local: bool,
    },
    /// Generate insights once and print the JSON result
    Insight {
        #[arg(long, value_enum, default_value_t = KindArg::Verse)]
        kind: KindArg,
        input: String,
        #[arg(long)]
        translation: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Verse,
    Topic,
    TextSnippet,
}

impl From<KindArg> for InsightKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Verse => InsightKind::Verse,
            KindArg::Topic => InsightKind::Topic,
            KindArg::TextSnippet => InsightKind::TextSnippet,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.runtime.log_level)
                .unwrap_or_else(|_| EnvFilter::new("scripture_insights=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve => {
            tracing::info!("Starting scripture-insights {}", env!("CARGO_PKG_VERSION"));
            let aggregator = Arc::new(InsightAggregator::from_config(&config)?);
            start_http_server(&config, aggregator).await
        }
        Commands::Normalize { reference, local } => {
            let normalized = if local {
                ReferenceNormalizer::local_only().normalize(&reference).await?
            } else {
                let gateway = Arc::new(InferenceGateway::from_config(&config)?);
                ReferenceNormalizer::with_model(gateway, config.llm.normalize_max_tokens)
                    .normalize(&reference)
                    .await?
            };
            println!("{}", normalized.reference);
            Ok(())
        }
        Commands::Insight {
            kind,
            input,
            translation,
        } => {
            let aggregator = InsightAggregator::from_config(&config)?;
            let (prepared, outcome) = aggregator
                .insights_for(kind.into(), &input, translation.as_deref())
                .await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "input": prepared.request,
                    "insights": outcome,
                }))?
            );
            Ok(())
        }
    }
}
