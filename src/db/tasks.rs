//! Task rows.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};

use super::{Backend, Database, NewTask, Task};
use crate::economy::TaskKind;

const TASK_COLUMNS: &str = "id, user_id, kind, name, description, reward, progress, target,
    is_completed, expires_at, created_at";

impl Database {
    /// All tasks owned by an account, oldest first.
    pub async fn get_tasks(&self, user_id: i64) -> Result<Vec<Task>> {
        match &self.backend {
            Backend::Memory(ledger) => Ok(ledger
                .tables()
                .tasks
                .values()
                .filter(|t| t.user_id == user_id)
                .cloned()
                .collect()),
            Backend::Postgres(pool) => {
                let rows = sqlx::query_as::<_, Task>(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = $1 ORDER BY id"
                ))
                .bind(user_id)
                .fetch_all(pool)
                .await?;
                Ok(rows)
            }
        }
    }

    pub async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        match &self.backend {
            Backend::Memory(ledger) => Ok(ledger.tables().tasks.get(&id).cloned()),
            Backend::Postgres(pool) => {
                let row = sqlx::query_as::<_, Task>(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(pool)
                .await?;
                Ok(row)
            }
        }
    }

    /// Insert standalone task rows (daily rollover). Returns the created rows.
    pub async fn create_tasks(&self, new: Vec<NewTask>) -> Result<Vec<Task>> {
        if new.is_empty() {
            return Ok(Vec::new());
        }
        match &self.backend {
            Backend::Memory(ledger) => {
                let mut tables = ledger.tables();
                Ok(new.into_iter().map(|t| tables.insert_task(t)).collect())
            }
            Backend::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                let mut created = Vec::with_capacity(new.len());
                for task in &new {
                    created.push(insert_task_pg(&mut tx, task.user_id, task).await?);
                }
                tx.commit().await?;
                Ok(created)
            }
        }
    }

    /// Delete daily rows that expired before `cutoff`, across all accounts.
    /// Social rows are completion history and are kept.
    pub async fn prune_expired_daily_tasks(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        match &self.backend {
            Backend::Memory(ledger) => Ok(ledger.tables().remove_expired_daily_tasks(cutoff)),
            Backend::Postgres(pool) => {
                let result = sqlx::query("DELETE FROM tasks WHERE kind = $1 AND expires_at < $2")
                    .bind(TaskKind::Daily.as_str())
                    .bind(cutoff)
                    .execute(pool)
                    .await?;
                Ok(result.rows_affected())
            }
        }
    }
}

pub(super) async fn insert_task_pg(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    new: &NewTask,
) -> Result<Task> {
    let row = sqlx::query_as::<_, Task>(&format!(
        "INSERT INTO tasks (user_id, kind, name, description, reward, progress, target,
            is_completed, expires_at, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING {TASK_COLUMNS}"
    ))
    .bind(user_id)
    .bind(new.kind.as_str())
    .bind(&new.name)
    .bind(&new.description)
    .bind(new.reward)
    .bind(new.progress)
    .bind(new.target)
    .bind(new.is_completed)
    .bind(new.expires_at)
    .bind(new.created_at)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row)
}

pub(super) async fn update_task_pg(tx: &mut Transaction<'_, Postgres>, task: &Task) -> Result<Task> {
    let row = sqlx::query_as::<_, Task>(&format!(
        "UPDATE tasks SET progress = $2, is_completed = $3
         WHERE id = $1
         RETURNING {TASK_COLUMNS}"
    ))
    .bind(task.id)
    .bind(task.progress)
    .bind(task.is_completed)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row)
}
