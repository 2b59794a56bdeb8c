//! # Policy Assistant CLI (`policy-chat`)
//!
//! ## Usage
//!
//! ```bash
//! policy-chat --config ./config/policy.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `policy-chat init` | Create the SQLite index and run schema migrations |
//! | `policy-chat sources` | List configured policy files and whether they exist |
//! | `policy-chat ingest` | Chunk and index every policy file |
//! | `policy-chat classify "<question>"` | Show the HR/IT classification of a question |
//! | `policy-chat search "<query>"` | Show raw nearest-neighbor hits |
//! | `policy-chat ask "<question>"` | Answer one question and print the JSON response |
//! | `policy-chat serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! policy-chat init
//! policy-chat ingest --prune
//! policy-chat search "carry over vacation days" --domain HR
//! policy-chat ask "How do I reset my VPN password?"
//! POLICY_TOKEN_SECRET=... policy-chat serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use policy_assistant::config;
use policy_assistant::embedding::create_embedder;
use policy_assistant::identity::CallerIdentity;
use policy_assistant::models::Domain;
use policy_assistant::pipeline::RequestContext;
use policy_assistant::{db, ingest, logging, migrate, server, services, sources};

/// Grounded HR and IT policy question answering.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/policy.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "policy-chat",
    about = "Answer HR and IT policy questions from indexed policy documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/policy.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index schema. Safe to run repeatedly.
    Init,

    /// List configured policy sources.
    Sources,

    /// Chunk every configured policy file and upsert it into the index.
    ///
    /// Unchanged sections keep their ids, so re-running is idempotent.
    Ingest {
        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Delete indexed chunks of each source that this run no longer produces.
        #[arg(long)]
        prune: bool,
    },

    /// Classify a question as HR or IT.
    Classify {
        question: String,
    },

    /// Nearest-neighbor search over the index.
    Search {
        query: String,

        /// Restrict results to one domain (HR or IT).
        #[arg(long)]
        domain: Option<Domain>,

        /// Number of results.
        #[arg(long, default_value = "6")]
        k: usize,
    },

    /// Run the full pipeline for one question.
    Ask {
        question: String,
    },

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Index initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Ingest { dry_run, prune } => {
            ingest::run_ingest(&cfg, dry_run, prune).await?;
        }
        Commands::Classify { question } => {
            let embedder = create_embedder(&cfg.embedding)?;
            let classifier = services::build_classifier(&cfg, embedder).await?;
            let result = classifier.classify(&question).await?;
            println!("domain: {}", result.domain);
            println!("confidence: {:.3}", result.confidence);
            println!("method: {}", result.method);
        }
        Commands::Search { query, domain, k } => {
            let index = services::open_index(&cfg).await?;
            let hits = index.search(&query, k, domain).await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.4}] {} / {} ({})",
                    i + 1,
                    hit.score,
                    hit.metadata.source,
                    if hit.metadata.heading.is_empty() {
                        "-"
                    } else {
                        hit.metadata.heading.as_str()
                    },
                    hit.metadata.domain
                );
                let preview: String = hit.content.chars().take(160).collect();
                println!("   {}", preview.replace('\n', " "));
            }
        }
        Commands::Ask { question } => {
            let pipeline = services::build_pipeline(&cfg).await?;
            let ctx = RequestContext::new(CallerIdentity::new("cli"));
            let answer = pipeline.answer(&ctx, &question).await?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
