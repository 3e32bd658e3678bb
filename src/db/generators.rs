//! Generator rows.

use anyhow::Result;
use sqlx::{Postgres, Transaction};

use super::{Backend, Database, Generator, NewGenerator};

pub(super) const GENERATOR_COLUMNS: &str =
    "id, user_id, kind, level, base_output, current_output, upgrade_cost, is_unlocked";

impl Database {
    /// All generators owned by an account, oldest first.
    pub async fn get_generators(&self, user_id: i64) -> Result<Vec<Generator>> {
        match &self.backend {
            Backend::Memory(ledger) => Ok(ledger
                .tables()
                .generators
                .values()
                .filter(|g| g.user_id == user_id)
                .cloned()
                .collect()),
            Backend::Postgres(pool) => {
                let rows = sqlx::query_as::<_, Generator>(&format!(
                    "SELECT {GENERATOR_COLUMNS} FROM generators WHERE user_id = $1 ORDER BY id"
                ))
                .bind(user_id)
                .fetch_all(pool)
                .await?;
                Ok(rows)
            }
        }
    }

    pub async fn get_generator(&self, id: i64) -> Result<Option<Generator>> {
        match &self.backend {
            Backend::Memory(ledger) => Ok(ledger.tables().generators.get(&id).cloned()),
            Backend::Postgres(pool) => {
                let row = sqlx::query_as::<_, Generator>(&format!(
                    "SELECT {GENERATOR_COLUMNS} FROM generators WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(pool)
                .await?;
                Ok(row)
            }
        }
    }
}

pub(super) async fn insert_generator_pg(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    new: &NewGenerator,
) -> Result<Generator> {
    let row = sqlx::query_as::<_, Generator>(&format!(
        "INSERT INTO generators (user_id, kind, level, base_output, current_output,
            upgrade_cost, is_unlocked)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {GENERATOR_COLUMNS}"
    ))
    .bind(user_id)
    .bind(new.kind.as_str())
    .bind(new.level)
    .bind(new.base_output)
    .bind(new.current_output)
    .bind(new.upgrade_cost)
    .bind(new.is_unlocked)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row)
}

pub(super) async fn update_generator_pg(
    tx: &mut Transaction<'_, Postgres>,
    generator: &Generator,
) -> Result<Generator> {
    let row = sqlx::query_as::<_, Generator>(&format!(
        "UPDATE generators SET level = $2, base_output = $3, current_output = $4,
            upgrade_cost = $5, is_unlocked = $6
         WHERE id = $1
         RETURNING {GENERATOR_COLUMNS}"
    ))
    .bind(generator.id)
    .bind(generator.level)
    .bind(generator.base_output)
    .bind(generator.current_output)
    .bind(generator.upgrade_cost)
    .bind(generator.is_unlocked)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row)
}
