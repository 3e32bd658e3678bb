//! Active boost rows and expiry pruning.
//!
//! Boosts are never updated; they are inserted on purchase and deleted once
//! `expires_at` is strictly in the past.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};

use super::{ActiveBoost, Backend, Database, NewBoost};

const BOOST_COLUMNS: &str = "id, user_id, kind, multiplier, expires_at, created_at";

impl Database {
    /// Boost rows for an account, expired or not. Callers that need only live
    /// boosts either prune first or filter with [`ActiveBoost::is_expired`].
    pub async fn get_active_boosts(&self, user_id: i64) -> Result<Vec<ActiveBoost>> {
        match &self.backend {
            Backend::Memory(ledger) => Ok(ledger
                .tables()
                .boosts
                .values()
                .filter(|b| b.user_id == user_id)
                .cloned()
                .collect()),
            Backend::Postgres(pool) => {
                let rows = sqlx::query_as::<_, ActiveBoost>(&format!(
                    "SELECT {BOOST_COLUMNS} FROM active_boosts WHERE user_id = $1 ORDER BY id"
                ))
                .bind(user_id)
                .fetch_all(pool)
                .await?;
                Ok(rows)
            }
        }
    }

    /// Delete one account's boosts that expired before `now`. Returns the count removed.
    pub async fn remove_expired_boosts(&self, user_id: i64, now: DateTime<Utc>) -> Result<u64> {
        match &self.backend {
            Backend::Memory(ledger) => Ok(ledger.tables().remove_expired_boosts(Some(user_id), now)),
            Backend::Postgres(pool) => {
                let result =
                    sqlx::query("DELETE FROM active_boosts WHERE user_id = $1 AND expires_at < $2")
                        .bind(user_id)
                        .bind(now)
                        .execute(pool)
                        .await?;
                Ok(result.rows_affected())
            }
        }
    }

    /// Delete every account's expired boosts (housekeeping sweep).
    pub async fn prune_all_expired_boosts(&self, now: DateTime<Utc>) -> Result<u64> {
        match &self.backend {
            Backend::Memory(ledger) => Ok(ledger.tables().remove_expired_boosts(None, now)),
            Backend::Postgres(pool) => {
                let result = sqlx::query("DELETE FROM active_boosts WHERE expires_at < $1")
                    .bind(now)
                    .execute(pool)
                    .await?;
                Ok(result.rows_affected())
            }
        }
    }
}

pub(super) async fn insert_boost_pg(
    tx: &mut Transaction<'_, Postgres>,
    new: &NewBoost,
) -> Result<ActiveBoost> {
    let row = sqlx::query_as::<_, ActiveBoost>(&format!(
        "INSERT INTO active_boosts (user_id, kind, multiplier, expires_at, created_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {BOOST_COLUMNS}"
    ))
    .bind(new.user_id)
    .bind(new.kind.as_str())
    .bind(new.multiplier)
    .bind(new.expires_at)
    .bind(new.created_at)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row)
}
