//! # Database — Ledger Store
//!
//! Keyed storage for the five ledger collections: accounts, generators,
//! active boosts, tasks and stats. Two backends sit behind one `Database`
//! handle:
//!
//! - **Memory** ([`memory`]): process-local tables, the default when no
//!   `DATABASE_URL` is configured. Also what the test suites run against.
//! - **PostgreSQL**: durable storage via `sqlx::PgPool`; schema in
//!   `migrations/001_create_ledger.sql`, applied by [`Database::migrate`].
//!
//! ## Module Structure
//!
//! - [`accounts`] — account lookup by id / telegram id / referral code,
//!   creation with the starter kit, aggregate snapshot
//! - [`generators`] — generator rows per account
//! - [`boosts`] — active boosts and expiry pruning
//! - [`tasks`] — task rows per account
//! - [`stats`] — per-account running counters
//! - [`commit`] — atomic write of one economic event's changes
//!
//! ## Write model
//!
//! Handlers load the entities an event touches, let the economy engine mutate
//! them in memory, then persist every changed row in one [`Changeset`]. The
//! PostgreSQL backend wraps the changeset in a transaction and the memory
//! backend applies it under a single table lock, so an event's points
//! deduction never lands without its generator/boost/task row.

mod accounts;
mod boosts;
mod commit;
mod generators;
pub mod memory;
mod stats;
mod tasks;

pub use commit::{Changeset, Committed, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::sync::Arc;

use crate::economy::{BoostKind, GeneratorKind, TaskKind};

// ── Account types ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub telegram_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub points: f64,
    pub energy: i32,
    pub max_energy: i32,
    pub level: i32,
    /// Flat bonus added to the base tap yield by `multi_tap` upgrades.
    #[serde(default)]
    pub tap_bonus: f64,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub referral_count: i32,
    pub wallet_address: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub telegram_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub points: f64,
    pub energy: i32,
    pub max_energy: i32,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub now: DateTime<Utc>,
}

// ── Generator types ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Generator {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub kind: GeneratorKind,
    pub level: i32,
    pub base_output: f64,
    pub current_output: f64,
    /// Price of the next upgrade (not the price this generator was bought at).
    pub upgrade_cost: f64,
    pub is_unlocked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGenerator {
    pub user_id: i64,
    pub kind: GeneratorKind,
    pub level: i32,
    pub base_output: f64,
    pub current_output: f64,
    pub upgrade_cost: f64,
    pub is_unlocked: bool,
}

// ── Boost types ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBoost {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub kind: BoostKind,
    pub multiplier: f64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ActiveBoost {
    /// Expired boosts are those whose expiry is strictly before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Whole seconds left before expiry, zero once expired.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBoost {
    pub user_id: i64,
    pub kind: BoostKind,
    pub multiplier: f64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ── Task types ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub kind: TaskKind,
    pub name: String,
    pub description: Option<String>,
    pub reward: f64,
    pub progress: f64,
    pub target: f64,
    pub is_completed: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub user_id: i64,
    pub kind: TaskKind,
    pub name: String,
    pub description: Option<String>,
    pub reward: f64,
    pub progress: f64,
    pub target: f64,
    pub is_completed: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ── Stats types ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub id: i64,
    pub user_id: i64,
    pub total_taps: i64,
    pub total_points_earned: f64,
    pub total_points_spent: f64,
}

// ── Aggregate ───────────────────────────────────────────────────

/// An account plus every entity it owns. This is the `user` object of the
/// REST responses and the payload of the push channel's `sync` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountWithRelated {
    #[serde(flatten)]
    pub account: Account,
    pub generators: Vec<Generator>,
    pub active_boosts: Vec<ActiveBoost>,
    pub tasks: Vec<Task>,
    pub stats: Stats,
}

/// Rows seeded into every new account, in the same write as the account.
#[derive(Debug, Clone, Default)]
pub struct StarterKit {
    /// `user_id` is ignored and replaced with the new account's id.
    pub generators: Vec<NewGenerator>,
    /// `user_id` is ignored and replaced with the new account's id.
    pub tasks: Vec<NewTask>,
}

// ── Database struct and connection ──────────────────────────────

#[derive(Clone)]
enum Backend {
    Memory(Arc<memory::MemoryLedger>),
    Postgres(PgPool),
}

#[derive(Clone)]
pub struct Database {
    backend: Backend,
}

const SCHEMA_SQL: &str = include_str!("../../migrations/001_create_ledger.sql");

impl Database {
    /// A fresh process-local ledger.
    pub fn in_memory() -> Self {
        Database {
            backend: Backend::Memory(Arc::new(memory::MemoryLedger::new())),
        }
    }

    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// Manually parses the URL so percent-encoded credentials are decoded
    /// before they reach the connection options.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect_with(opts)
            .await?;
        Ok(Database {
            backend: Backend::Postgres(pool),
        })
    }

    /// Open the ledger named by `database_url`, or an in-memory one when unset.
    pub async fn open(database_url: Option<&str>) -> Result<Self> {
        match database_url {
            Some(url) => {
                let db = Self::connect(url).await?;
                db.migrate().await?;
                Ok(db)
            }
            None => Ok(Self::in_memory()),
        }
    }

    /// Create the ledger tables if they don't exist. No-op for the memory backend.
    pub async fn migrate(&self) -> Result<()> {
        if let Backend::Postgres(pool) = &self.backend {
            sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
        }
        Ok(())
    }

    /// Short backend name for logs.
    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            Backend::Memory(_) => "memory",
            Backend::Postgres(_) => "postgres",
        }
    }

    /// Underlying pool, when backed by PostgreSQL.
    pub fn pool(&self) -> Option<&PgPool> {
        match &self.backend {
            Backend::Postgres(pool) => Some(pool),
            Backend::Memory(_) => None,
        }
    }

    /// `SELECT 1` against PostgreSQL, always ok in memory. Backs `/readyz`.
    pub async fn health_check(&self) -> Result<()> {
        if let Backend::Postgres(pool) = &self.backend {
            sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────
