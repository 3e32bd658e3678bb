//! Atomic persistence of one economic event.
//!
//! An event touches at most one account row, its stats row and one owned
//! entity of each kind. [`Database::commit`] writes all of them or none.

use anyhow::{Context, Result};

use super::{
    boosts, generators, stats, tasks, Account, ActiveBoost, Backend, Database, Generator,
    NewBoost, NewGenerator, NewTask, Stats, Task,
};

/// Insert a new row or overwrite an existing one.
#[derive(Debug, Clone, PartialEq)]
pub enum Write<T, N> {
    Insert(N),
    Update(T),
}

/// Every row changed by one event. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    pub account: Option<Account>,
    pub stats: Option<Stats>,
    pub generator: Option<Write<Generator, NewGenerator>>,
    pub boost: Option<NewBoost>,
    pub task: Option<Write<Task, NewTask>>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(mut self, account: &Account) -> Self {
        self.account = Some(account.clone());
        self
    }

    pub fn stats(mut self, stats: &Stats) -> Self {
        self.stats = Some(stats.clone());
        self
    }

    pub fn generator(mut self, write: Write<Generator, NewGenerator>) -> Self {
        self.generator = Some(write);
        self
    }

    pub fn boost(mut self, boost: NewBoost) -> Self {
        self.boost = Some(boost);
        self
    }

    pub fn task(mut self, write: Write<Task, NewTask>) -> Self {
        self.task = Some(write);
        self
    }
}

/// Rows as stored after the commit (with assigned ids for inserts).
#[derive(Debug, Clone, Default)]
pub struct Committed {
    pub generator: Option<Generator>,
    pub boost: Option<ActiveBoost>,
    pub task: Option<Task>,
}

impl Database {
    /// Persist a changeset atomically.
    pub async fn commit(&self, changes: Changeset) -> Result<Committed> {
        match &self.backend {
            Backend::Memory(ledger) => {
                let mut tables = ledger.tables();
                // Check every update target first so a miss leaves the tables untouched.
                if let Some(account) = &changes.account {
                    if !tables.accounts.contains_key(&account.id) {
                        anyhow::bail!("account {} does not exist", account.id);
                    }
                }
                if let Some(Write::Update(g)) = &changes.generator {
                    if !tables.generators.contains_key(&g.id) {
                        anyhow::bail!("generator {} does not exist", g.id);
                    }
                }
                if let Some(Write::Insert(g)) = &changes.generator {
                    if tables
                        .generators
                        .values()
                        .any(|row| row.user_id == g.user_id && row.kind == g.kind)
                    {
                        anyhow::bail!("account {} already owns a {} generator", g.user_id, g.kind);
                    }
                }
                if let Some(Write::Update(t)) = &changes.task {
                    if !tables.tasks.contains_key(&t.id) {
                        anyhow::bail!("task {} does not exist", t.id);
                    }
                }

                if let Some(account) = changes.account {
                    tables.accounts.insert(account.id, account);
                }
                if let Some(stats) = changes.stats {
                    tables.stats.insert(stats.user_id, stats);
                }
                let generator = changes.generator.map(|write| match write {
                    Write::Insert(new) => tables.insert_generator(new),
                    Write::Update(g) => {
                        tables.generators.insert(g.id, g.clone());
                        g
                    }
                });
                let boost = changes.boost.map(|new| tables.insert_boost(new));
                let task = changes.task.map(|write| match write {
                    Write::Insert(new) => tables.insert_task(new),
                    Write::Update(t) => {
                        tables.tasks.insert(t.id, t.clone());
                        t
                    }
                });
                Ok(Committed {
                    generator,
                    boost,
                    task,
                })
            }
            Backend::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                if let Some(account) = &changes.account {
                    sqlx::query(
                        "UPDATE accounts SET display_name = $2, avatar_url = $3, points = $4,
                            energy = $5, max_energy = $6, level = $7, tap_bonus = $8,
                            referral_count = $9, wallet_address = $10, last_seen = $11
                         WHERE id = $1",
                    )
                    .bind(account.id)
                    .bind(&account.display_name)
                    .bind(&account.avatar_url)
                    .bind(account.points)
                    .bind(account.energy)
                    .bind(account.max_energy)
                    .bind(account.level)
                    .bind(account.tap_bonus)
                    .bind(account.referral_count)
                    .bind(&account.wallet_address)
                    .bind(account.last_seen)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("updating account {}", account.id))?;
                }
                if let Some(s) = &changes.stats {
                    stats::update_stats_pg(&mut tx, s).await?;
                }
                let generator = match &changes.generator {
                    Some(Write::Insert(new)) => {
                        Some(generators::insert_generator_pg(&mut tx, new.user_id, new).await?)
                    }
                    Some(Write::Update(g)) => Some(generators::update_generator_pg(&mut tx, g).await?),
                    None => None,
                };
                let boost = match &changes.boost {
                    Some(new) => Some(boosts::insert_boost_pg(&mut tx, new).await?),
                    None => None,
                };
                let task = match &changes.task {
                    Some(Write::Insert(new)) => {
                        Some(tasks::insert_task_pg(&mut tx, new.user_id, new).await?)
                    }
                    Some(Write::Update(t)) => Some(tasks::update_task_pg(&mut tx, t).await?),
                    None => None,
                };
                tx.commit().await?;
                Ok(Committed {
                    generator,
                    boost,
                    task,
                })
            }
        }
    }
}
