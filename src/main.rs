//! # Main — Operator CLI Entry Point
//!
//! Routes subcommands to the execution functions in `cli.rs`. Every command
//! except `config` needs a database.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL connection URL.
//! - `--config` / `VERSECRAFT_CONFIG`: TOML generation/storage settings.
//!
//! Logging goes to stderr (`LOG_FORMAT=json` for structured output,
//! `RUST_LOG` to filter); command results are JSON on stdout.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "versecraft",
    about = "Illustrate songs verse by verse",
    version
)]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Path to a TOML configuration file
    #[arg(long, env = "VERSECRAFT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Draft a new unpublished song and queue one generation job per verse
    Draft {
        /// Song title (the slug is derived from it)
        #[arg(long)]
        title: String,
        /// Language code, e.g. en or pt-br
        #[arg(long, default_value = "en")]
        language: String,
        /// Tag, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Lyrics file; verses are separated by blank lines ("-" for stdin)
        #[arg(long)]
        lyrics: PathBuf,
    },
    /// Replace a song's lyrics, keeping illustrations of verses that survive
    EditLyrics {
        /// Song slug
        slug: String,
        /// Lyrics file ("-" for stdin)
        #[arg(long)]
        lyrics: PathBuf,
    },
    /// Publish a song
    Publish {
        /// Song slug
        slug: String,
    },
    /// Unpublish a song
    Unpublish {
        /// Song slug
        slug: String,
    },
    /// List songs, newest first
    Songs {
        /// Only published songs
        #[arg(long)]
        published: bool,
        /// Max songs to list
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show a song with its verses and artifacts
    Show {
        /// Song slug
        slug: String,
    },
    /// Claim and run pending generation jobs
    Work {
        /// Max jobs to process in this run
        #[arg(long, default_value_t = 1)]
        limit: u32,
    },
    /// List generation jobs, newest first
    Jobs {
        /// Max jobs to list (clamped to 500)
        #[arg(long, default_value_t = 100)]
        limit: i64,
        /// Hide jobs of published songs
        #[arg(long)]
        exclude_published: bool,
        /// Case-insensitive match on song title, slug, or verse text
        #[arg(long)]
        search: Option<String>,
    },
    /// Count generation jobs by status
    JobStats,
    /// Send a job back to pending and discard its illustration
    ResetJob {
        /// Generation job ID
        job_id: Uuid,
        /// Replace the job's additional prompt direction
        #[arg(long, conflicts_with = "clear_direction")]
        direction: Option<String>,
        /// Remove the job's additional prompt direction
        #[arg(long)]
        clear_direction: bool,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log shippers, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Config => cli::run_config(&cli),
        Commands::Draft {
            title,
            language,
            tags,
            lyrics,
        } => cli::run_draft(&cli, title, language, tags, lyrics),
        Commands::EditLyrics { slug, lyrics } => cli::run_edit_lyrics(&cli, slug, lyrics),
        Commands::Publish { slug } => cli::run_set_published(&cli, slug, true),
        Commands::Unpublish { slug } => cli::run_set_published(&cli, slug, false),
        Commands::Songs { published, limit } => cli::run_songs(&cli, *published, *limit),
        Commands::Show { slug } => cli::run_show(&cli, slug),
        Commands::Work { limit } => cli::run_work(&cli, *limit),
        Commands::Jobs {
            limit,
            exclude_published,
            search,
        } => cli::run_jobs(&cli, *limit, *exclude_published, search.as_deref()),
        Commands::JobStats => cli::run_job_stats(&cli),
        Commands::ResetJob {
            job_id,
            direction,
            clear_direction,
        } => cli::run_reset_job(&cli, *job_id, direction.as_deref(), *clear_direction),
    }
}
