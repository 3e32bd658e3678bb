//! Per-account running counters.

use anyhow::Result;
use sqlx::{Postgres, Transaction};

use super::{Backend, Database, Stats};

const STATS_COLUMNS: &str = "id, user_id, total_taps, total_points_earned, total_points_spent";

impl Database {
    pub async fn get_stats(&self, user_id: i64) -> Result<Option<Stats>> {
        match &self.backend {
            Backend::Memory(ledger) => Ok(ledger.tables().stats.get(&user_id).cloned()),
            Backend::Postgres(pool) => {
                let row = sqlx::query_as::<_, Stats>(&format!(
                    "SELECT {STATS_COLUMNS} FROM stats WHERE user_id = $1"
                ))
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
                Ok(row)
            }
        }
    }

    /// Fetch the stats row, inserting a zeroed one if the account has none.
    pub async fn get_or_create_stats(&self, user_id: i64) -> Result<Stats> {
        match &self.backend {
            Backend::Memory(ledger) => {
                let mut tables = ledger.tables();
                if let Some(stats) = tables.stats.get(&user_id) {
                    return Ok(stats.clone());
                }
                Ok(tables.insert_stats(user_id))
            }
            Backend::Postgres(pool) => {
                let row = sqlx::query_as::<_, Stats>(&format!(
                    "INSERT INTO stats (user_id) VALUES ($1)
                     ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
                     RETURNING {STATS_COLUMNS}"
                ))
                .bind(user_id)
                .fetch_one(pool)
                .await?;
                Ok(row)
            }
        }
    }
}

pub(super) async fn update_stats_pg(tx: &mut Transaction<'_, Postgres>, stats: &Stats) -> Result<()> {
    sqlx::query(
        "UPDATE stats SET total_taps = $2, total_points_earned = $3, total_points_spent = $4
         WHERE user_id = $1",
    )
    .bind(stats.user_id)
    .bind(stats.total_taps)
    .bind(stats.total_points_earned)
    .bind(stats.total_points_spent)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
