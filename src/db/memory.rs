//! Process-local ledger tables.
//!
//! One mutex guards all five tables so a [`Changeset`](super::Changeset) is
//! applied atomically. Tables are `BTreeMap`s keyed by row id, which keeps
//! per-account listings in insertion order.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    Account, ActiveBoost, Generator, NewAccount, NewBoost, NewGenerator, NewTask, StarterKit,
    Stats, Task,
};
use crate::economy::TaskKind;

#[derive(Default)]
pub(super) struct Tables {
    pub accounts: BTreeMap<i64, Account>,
    pub generators: BTreeMap<i64, Generator>,
    pub boosts: BTreeMap<i64, ActiveBoost>,
    pub tasks: BTreeMap<i64, Task>,
    /// Keyed by owning account id (one row per account).
    pub stats: BTreeMap<i64, Stats>,
    next_account_id: i64,
    next_generator_id: i64,
    next_boost_id: i64,
    next_task_id: i64,
    next_stats_id: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl Tables {
    pub fn insert_account(&mut self, new: NewAccount) -> Account {
        let account = Account {
            id: next(&mut self.next_account_id),
            username: new.username,
            telegram_id: new.telegram_id,
            display_name: new.display_name,
            avatar_url: new.avatar_url,
            points: new.points,
            energy: new.energy,
            max_energy: new.max_energy,
            level: 1,
            tap_bonus: 0.0,
            referral_code: new.referral_code,
            referred_by: new.referred_by,
            referral_count: 0,
            wallet_address: None,
            last_seen: new.now,
            created_at: new.now,
        };
        self.accounts.insert(account.id, account.clone());
        account
    }

    pub fn insert_generator(&mut self, new: NewGenerator) -> Generator {
        let generator = Generator {
            id: next(&mut self.next_generator_id),
            user_id: new.user_id,
            kind: new.kind,
            level: new.level,
            base_output: new.base_output,
            current_output: new.current_output,
            upgrade_cost: new.upgrade_cost,
            is_unlocked: new.is_unlocked,
        };
        self.generators.insert(generator.id, generator.clone());
        generator
    }

    pub fn insert_boost(&mut self, new: NewBoost) -> ActiveBoost {
        let boost = ActiveBoost {
            id: next(&mut self.next_boost_id),
            user_id: new.user_id,
            kind: new.kind,
            multiplier: new.multiplier,
            expires_at: new.expires_at,
            created_at: new.created_at,
        };
        self.boosts.insert(boost.id, boost.clone());
        boost
    }

    pub fn insert_task(&mut self, new: NewTask) -> Task {
        let task = Task {
            id: next(&mut self.next_task_id),
            user_id: new.user_id,
            kind: new.kind,
            name: new.name,
            description: new.description,
            reward: new.reward,
            progress: new.progress,
            target: new.target,
            is_completed: new.is_completed,
            expires_at: new.expires_at,
            created_at: new.created_at,
        };
        self.tasks.insert(task.id, task.clone());
        task
    }

    pub fn insert_stats(&mut self, user_id: i64) -> Stats {
        let stats = Stats {
            id: next(&mut self.next_stats_id),
            user_id,
            total_taps: 0,
            total_points_earned: 0.0,
            total_points_spent: 0.0,
        };
        self.stats.insert(user_id, stats.clone());
        stats
    }

    pub fn remove_expired_boosts(&mut self, user_id: Option<i64>, now: DateTime<Utc>) -> u64 {
        let before = self.boosts.len();
        self.boosts
            .retain(|_, b| !(user_id.map_or(true, |id| b.user_id == id) && b.is_expired(now)));
        (before - self.boosts.len()) as u64
    }

    pub fn remove_expired_daily_tasks(&mut self, cutoff: DateTime<Utc>) -> u64 {
        let before = self.tasks.len();
        self.tasks.retain(|_, t| {
            !(t.kind == TaskKind::Daily && t.expires_at.is_some_and(|at| at < cutoff))
        });
        (before - self.tasks.len()) as u64
    }
}

/// In-memory ledger shared by every clone of a memory-backed `Database`.
#[derive(Default)]
pub struct MemoryLedger {
    tables: Mutex<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the tables, recovering from poisoning.
    pub(super) fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Same uniqueness rules as the `accounts` table constraints.
    pub(super) fn create_account(&self, new: NewAccount, kit: &StarterKit) -> Result<Account> {
        let mut tables = self.tables();
        if let Some(clash) = tables.accounts.values().find(|a| {
            a.telegram_id == new.telegram_id
                || a.username == new.username
                || a.referral_code == new.referral_code
        }) {
            bail!("account {} conflicts with the new account", clash.id);
        }
        let account = tables.insert_account(new);
        tables.insert_stats(account.id);
        for seed in &kit.generators {
            tables.insert_generator(NewGenerator {
                user_id: account.id,
                ..seed.clone()
            });
        }
        for seed in &kit.tasks {
            tables.insert_task(NewTask {
                user_id: account.id,
                ..seed.clone()
            });
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::{BoostKind, GeneratorKind, TaskKind};
    use chrono::Duration;

    fn new_account(telegram_id: &str) -> NewAccount {
        NewAccount {
            username: format!("user_{telegram_id}"),
            telegram_id: telegram_id.to_string(),
            display_name: "Test".into(),
            avatar_url: None,
            points: 0.0,
            energy: 50,
            max_energy: 50,
            referral_code: format!("code{telegram_id}"),
            referred_by: None,
            now: Utc::now(),
        }
    }

    #[test]
    fn create_account_seeds_kit_with_new_id() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        let kit = StarterKit {
            generators: vec![NewGenerator {
                user_id: 0,
                kind: GeneratorKind::Satellite,
                level: 1,
                base_output: 10.0,
                current_output: 10.0,
                upgrade_cost: 1200.0,
                is_unlocked: true,
            }],
            tasks: vec![NewTask {
                user_id: 0,
                kind: TaskKind::Daily,
                name: "Tap 100 times".into(),
                description: None,
                reward: 500.0,
                progress: 0.0,
                target: 100.0,
                is_completed: false,
                expires_at: Some(now + Duration::hours(24)),
                created_at: now,
            }],
        };
        let first = ledger.create_account(new_account("1"), &kit).unwrap();
        let second = ledger.create_account(new_account("2"), &kit).unwrap();
        assert!(ledger.create_account(new_account("2"), &kit).is_err());
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        let tables = ledger.tables();
        assert_eq!(tables.generators.len(), 2);
        assert!(tables.generators.values().any(|g| g.user_id == 2));
        assert_eq!(tables.tasks.values().filter(|t| t.user_id == 1).count(), 1);
        assert_eq!(tables.stats[&2].user_id, 2);
    }

    #[test]
    fn remove_expired_boosts_scopes_to_account() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        let mut tables = ledger.tables();
        for (user_id, offset) in [(1, -10), (1, 10), (2, -10)] {
            tables.insert_boost(NewBoost {
                user_id,
                kind: BoostKind::AutoBoost,
                multiplier: 1.5,
                expires_at: now + Duration::seconds(offset),
                created_at: now - Duration::hours(1),
            });
        }
        assert_eq!(tables.remove_expired_boosts(Some(1), now), 1);
        assert_eq!(tables.boosts.len(), 2);
        assert_eq!(tables.remove_expired_boosts(None, now), 1);
        assert_eq!(tables.boosts.len(), 1);
    }

    #[test]
    fn remove_expired_daily_tasks_keeps_recent_and_social_rows() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        let mut tables = ledger.tables();
        for (kind, expires_in_days) in [
            (TaskKind::Daily, Some(-10)),
            (TaskKind::Daily, Some(-2)),
            (TaskKind::Daily, Some(1)),
            (TaskKind::Social, None),
        ] {
            tables.insert_task(NewTask {
                user_id: 1,
                kind,
                name: "t".into(),
                description: None,
                reward: 10.0,
                progress: 0.0,
                target: 1.0,
                is_completed: false,
                expires_at: expires_in_days.map(|d| now + Duration::days(d)),
                created_at: now - Duration::days(11),
            });
        }
        assert_eq!(tables.remove_expired_daily_tasks(now - Duration::days(7)), 1);
        assert_eq!(tables.tasks.len(), 3);
        assert_eq!(tables.remove_expired_daily_tasks(now), 1);
        assert!(tables.tasks.values().any(|t| t.kind == TaskKind::Social));
    }
}
