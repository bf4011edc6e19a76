//! # Trendwatch CLI (`tw`)
//!
//! The `tw` binary is the primary interface for Trendwatch. It provides
//! commands for database initialization, running ingestion cycles, querying
//! the corpus, exporting, and inspecting state.
//!
//! ## Usage
//!
//! ```bash
//! tw --config ./config/tw.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tw init` | Create the SQLite database and run schema migrations |
//! | `tw sources` | List configured source adapters |
//! | `tw sync` | Run one ingestion cycle (fetch → score → persist → index) |
//! | `tw query "<question>"` | Retrieve the top-k context snippets for a question |
//! | `tw ask "<question>"` | Retrieve context and generate an answer |
//! | `tw export json` | Dump the current window as JSON |
//! | `tw export context` | Write the AI-context Markdown file |
//! | `tw archive <YYYY-MM>` | Show one monthly archive bucket |
//! | `tw stats` | Corpus overview |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use trendwatch::adapter::AdapterRegistry;
use trendwatch::config::{load_config, Config};
use trendwatch::generate::GenerationMode;
use trendwatch::models::CycleSummary;
use trendwatch::{db, export, migrate, pipeline, query, stats, store};

/// Trendwatch CLI — a local-first AI-ecosystem signal tracker.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tw.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tw",
    about = "Trendwatch — ingest, score, and query AI-ecosystem signals",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tw.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// List configured source adapters.
    Sources,

    /// Run one ingestion cycle: fetch all sources concurrently, dedupe,
    /// classify, score, persist, and index. Always prints a cycle summary,
    /// even when individual sources fail.
    Sync {
        /// Re-admit already-seen records through the full pipeline
        /// (explicit recompute policy).
        #[arg(long)]
        force_update: bool,
    },

    /// Retrieve the top-k context snippets for a question, ranked by
    /// similarity (ties broken by recency).
    Query {
        question: String,

        /// Number of snippets to retrieve.
        #[arg(long, short = 'k')]
        k: Option<usize>,
    },

    /// Retrieve context and generate an answer.
    Ask {
        question: String,

        /// Prompt template variant: `standard` or `deep`.
        #[arg(long, default_value = "standard")]
        mode: String,
    },

    /// Export the current window.
    Export {
        #[command(subcommand)]
        format: ExportFormat,
    },

    /// Show one monthly archive bucket.
    Archive {
        /// Bucket key, e.g. `2025-03`.
        bucket: String,
    },

    /// Corpus statistics and health overview.
    Stats,
}

#[derive(Subcommand)]
enum ExportFormat {
    /// Dump the window as JSON, to a file or stdout.
    Json {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write the AI-context Markdown file.
    Context,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("initialized {}", config.db.path.display());
        }
        Commands::Sources => {
            list_sources(&config);
        }
        Commands::Sync { force_update } => {
            let mut config = config;
            if force_update {
                config.ingest.force_update = true;
            }
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;

            let cycle_start = chrono::Utc::now();
            let summary = pipeline::run_cycle(&config, &pool, cycle_start).await?;
            print_summary(&summary);

            pool.close().await;
        }
        Commands::Query { question, k } => {
            let pool = db::connect(&config).await?;
            let k = k.unwrap_or(config.generation.top_k);
            let snippets = query::retrieve(&pool, &config, &question, k).await?;

            for (i, snippet) in snippets.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} / {}",
                    i + 1,
                    snippet.similarity,
                    snippet.source_name,
                    snippet.title
                );
                println!("    date: {}", snippet.published_at.format("%Y-%m-%d"));
                println!("    url: {}", snippet.url);
                println!(
                    "    excerpt: \"{}\"",
                    snippet.body_excerpt.replace('\n', " ").trim()
                );
                println!();
            }
            pool.close().await;
        }
        Commands::Ask { question, mode } => {
            let mode: GenerationMode = mode.parse().map_err(anyhow::Error::msg)?;
            let pool = db::connect(&config).await?;
            let answer = query::answer(&pool, &config, &question, mode).await?;

            println!("{}", answer.text);
            println!();
            println!("Grounded in:");
            for (i, snippet) in answer.context.iter().enumerate() {
                println!(
                    "  [{}] {} ({:.3})",
                    i + 1,
                    snippet.title,
                    snippet.similarity
                );
            }
            pool.close().await;
        }
        Commands::Export { format } => {
            let pool = db::connect(&config).await?;
            match format {
                ExportFormat::Json { output } => {
                    export::run_export_json(&pool, output.as_deref()).await?;
                }
                ExportFormat::Context => {
                    export::run_export_context(&pool, &config.export.context_path).await?;
                    println!("wrote {}", config.export.context_path.display());
                }
            }
            pool.close().await;
        }
        Commands::Archive { bucket } => {
            let pool = db::connect(&config).await?;
            let records = store::archive_bucket(&pool, &bucket).await?;
            println!("archive {} — {} records", bucket, records.len());
            for record in &records {
                println!(
                    "  [{:>5.1}] {} ({})",
                    record.score,
                    record.title,
                    record.published_at.format("%Y-%m-%d")
                );
            }
            pool.close().await;
        }
        Commands::Stats => {
            let pool = db::connect(&config).await?;
            stats::run_stats(&config, &pool).await?;
            pool.close().await;
        }
    }

    Ok(())
}

fn list_sources(config: &Config) {
    let registry = AdapterRegistry::from_config(config);
    println!("{:<12} {:<10} STATUS", "ADAPTER", "TYPE");
    for adapter in registry.adapters() {
        println!(
            "{:<12} {:<10} enabled",
            adapter.name(),
            adapter.source_type()
        );
    }
    for name in ["github", "rss", "hn", "arxiv"] {
        if registry.find(name).is_none() {
            println!("{:<12} {:<10} not configured", name, "-");
        }
    }
}

fn print_summary(summary: &CycleSummary) {
    println!("sync");
    for source in &summary.sources {
        match &source.failure {
            Some(failure) => println!(
                "  [{}] fetched {} (FAILED: {})",
                source.adapter, source.fetched, failure
            ),
            None => println!("  [{}] fetched {}", source.adapter, source.fetched),
        }
    }
    println!("  fetched: {} candidates", summary.fetched);
    println!("  duplicates dropped: {}", summary.deduplicated);
    println!("  rejected by gates: {}", summary.rejected);
    println!("  admitted: {}", summary.admitted);
    println!("  archived only: {}", summary.archived_only);
    println!("  indexed: {} (pending: {})", summary.indexed, summary.index_pending);
    if summary.breaking_changes > 0 {
        println!("  breaking changes: {}", summary.breaking_changes);
    }
    println!("ok");
}
