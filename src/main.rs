//! # Main — CLI Entry Point
//!
//! Routes CLI subcommands to the gateway server and the offline tools.
//! Handles shared concerns: `.env` loading, structured logging and the
//! ledger connection.
//!
//! ## Subcommands
//!
//! - `serve`: run the REST + push gateway.
//! - `catalog`: validate an economy file and print the effective catalog.
//! - `play`: drive a client projection against a running gateway.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL ledger. In-memory when unset.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use orbit_tap::economy::{BoostKind, GeneratorKind, UpgradeKind};
use orbit_tap::projection::play::PlayPlan;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "orbit-tap", about = "Tap-to-earn idle game economy server")]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var). Uses an in-memory ledger when unset.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API and push channel
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 5000)]
        port: u16,
        /// Economy catalog TOML (built-in defaults when omitted)
        #[arg(long, env = "ECONOMY_FILE")]
        economy: Option<PathBuf>,
        /// Allowed CORS origin (any origin when omitted)
        #[arg(long, env = "CORS_ORIGIN")]
        cors_origin: Option<String>,
        /// Seconds between housekeeping sweeps
        #[arg(long, default_value_t = 60)]
        housekeeping_secs: u64,
        /// Days an expired daily task is kept before the sweep deletes it
        #[arg(long, default_value_t = 7)]
        task_retention_days: u32,
    },
    /// Validate an economy catalog and print it as TOML
    Catalog {
        /// Economy catalog TOML (built-in defaults when omitted)
        #[arg(long)]
        economy: Option<PathBuf>,
    },
    /// Sign in to a running gateway, play a scripted session, and report the reconciled state
    Play {
        /// Gateway base URL
        #[arg(long, default_value = "http://localhost:5000")]
        server: String,
        /// Telegram user id to sign in as
        #[arg(long)]
        telegram_id: i64,
        /// First name sent with the sign-in
        #[arg(long, default_value = "Player")]
        first_name: String,
        /// Number of taps to send
        #[arg(long, default_value_t = 10)]
        taps: u32,
        /// Seconds to keep ticking after the taps
        #[arg(long, default_value_t = 12)]
        seconds: u64,
        /// Referral code to sign up with
        #[arg(long)]
        referral_code: Option<String>,
        /// Generator tier to unlock (repeatable)
        #[arg(long = "unlock", value_name = "KIND")]
        unlock: Vec<GeneratorKind>,
        /// Boost to buy (repeatable)
        #[arg(long = "boost", value_name = "KIND")]
        boosts: Vec<BoostKind>,
        /// Upgrade to buy (repeatable)
        #[arg(long = "upgrade", value_name = "KIND")]
        upgrades: Vec<UpgradeKind>,
        /// Social task to complete, by catalog name (repeatable)
        #[arg(long = "social-task", value_name = "NAME")]
        social_tasks: Vec<String>,
        /// Progress to report on an open task (repeatable)
        #[arg(long = "task-progress", value_name = "NAME=DELTA", value_parser = parse_task_progress)]
        task_progress: Vec<(String, f64)>,
        /// Wallet address to link
        #[arg(long)]
        wallet: Option<String>,
    },
}

fn parse_task_progress(raw: &str) -> Result<(String, f64), String> {
    let (name, delta) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=DELTA, got '{raw}'"))?;
    let delta: f64 = delta
        .trim()
        .parse()
        .map_err(|e| format!("bad delta in '{raw}': {e}"))?;
    if name.trim().is_empty() || !delta.is_finite() {
        return Err(format!("expected NAME=DELTA, got '{raw}'"));
    }
    Ok((name.trim().to_string(), delta))
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize structured logging: LOG_FORMAT=json for K8s, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
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
        Commands::Serve {
            port,
            economy,
            cors_origin,
            housekeeping_secs,
            task_retention_days,
        } => {
            let config = orbit_tap::config::ServerConfig {
                port: *port,
                cors_origin: cors_origin.clone(),
                housekeeping_interval: std::time::Duration::from_secs((*housekeeping_secs).max(1)),
                task_retention: chrono::Duration::days(i64::from(*task_retention_days)),
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::run_serve(
                cli.database_url.as_deref(),
                &config,
                economy.as_deref(),
            ))
        }
        Commands::Catalog { economy } => cli::run_catalog(economy.as_deref()),
        Commands::Play {
            server,
            telegram_id,
            first_name,
            taps,
            seconds,
            referral_code,
            unlock,
            boosts,
            upgrades,
            social_tasks,
            task_progress,
            wallet,
        } => {
            let plan = PlayPlan {
                referral_code: referral_code.clone(),
                taps: *taps,
                idle: std::time::Duration::from_secs(*seconds),
                unlock: unlock.clone(),
                boosts: boosts.clone(),
                upgrades: upgrades.clone(),
                social_tasks: social_tasks.clone(),
                task_progress: task_progress.clone(),
                wallet: wallet.clone(),
                ..PlayPlan::new(*telegram_id, first_name.clone())
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::run_play(server, &plan))
        }
    }
}
