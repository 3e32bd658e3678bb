//! Authoritative mutation rules.
//!
//! Every operation takes the loaded entities by `&mut`, checks all of its
//! preconditions, and only then mutates. An `Err` return therefore means no
//! field was touched and the caller has nothing to persist.
//!
//! Ownership of generators and tasks is resolved by the gateway before these
//! rules run.

use chrono::{DateTime, Duration, Utc};

use super::derive;
use super::{BoostKind, EconomyError, GeneratorKind, PointsSource, TaskKind, UpgradeKind};
use crate::db::{Account, Generator, NewBoost, NewGenerator, NewTask, Stats, Task};

type Result<T> = std::result::Result<T, EconomyError>;

fn require_amount(value: f64, what: &str) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(EconomyError::validation(format!(
            "{what} must be a non-negative number"
        )));
    }
    Ok(())
}

fn require_positive(value: f64, what: &str) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EconomyError::validation(format!("{what} must be greater than 0")));
    }
    Ok(())
}

fn require_funds(account: &Account, cost: f64) -> Result<()> {
    if account.points < cost {
        return Err(EconomyError::InsufficientFunds {
            required: cost,
            available: account.points,
        });
    }
    Ok(())
}

/// Raise the persisted level to match the balance. Never lowers it.
/// Returns whether the level changed.
pub fn raise_level(account: &mut Account) -> bool {
    let level = derive::level_for(account.points);
    if level > account.level {
        account.level = level;
        true
    } else {
        false
    }
}

/// Credit points. Taps also bump the tap counter. Returns whether the level rose.
pub fn award_points(
    account: &mut Account,
    stats: &mut Stats,
    amount: f64,
    source: PointsSource,
) -> Result<bool> {
    require_positive(amount, "Points")?;
    account.points += amount;
    stats.total_points_earned += amount;
    if source == PointsSource::Tap {
        stats.total_taps += 1;
    }
    Ok(raise_level(account))
}

/// Debit points. Rejected as a full no-op when the balance is short.
pub fn spend_points(account: &mut Account, stats: &mut Stats, amount: f64) -> Result<()> {
    require_amount(amount, "Cost")?;
    require_funds(account, amount)?;
    account.points -= amount;
    stats.total_points_spent += amount;
    Ok(())
}

/// Remove energy, clamping at zero.
pub fn consume_energy(account: &mut Account, amount: i32) {
    account.energy = account.energy.saturating_sub(amount.max(0)).max(0);
}

/// Overwrite energy with a client-reported value, clamped to `[0, max_energy]`.
pub fn set_energy(account: &mut Account, energy: i32) {
    account.energy = energy.clamp(0, account.max_energy);
}

/// Level a generator up by one, paying its current upgrade cost.
pub fn upgrade_generator(
    account: &mut Account,
    stats: &mut Stats,
    generator: &mut Generator,
) -> Result<()> {
    spend_points(account, stats, generator.upgrade_cost)?;
    generator.level += 1;
    generator.current_output = derive::generator_upgrade_output(generator.base_output, generator.level);
    generator.upgrade_cost = derive::generator_upgrade_cost(generator.upgrade_cost);
    Ok(())
}

/// Buy a generator tier the account does not own yet at `chosen_cost`.
pub fn unlock_generator(
    account: &mut Account,
    stats: &mut Stats,
    owned: &[Generator],
    kind: GeneratorKind,
    base_output: f64,
    chosen_cost: f64,
) -> Result<NewGenerator> {
    require_amount(chosen_cost, "Generator cost")?;
    require_positive(base_output, "Base output")?;
    if owned.iter().any(|g| g.kind == kind) {
        return Err(EconomyError::validation(format!(
            "Generator {kind} is already unlocked"
        )));
    }
    spend_points(account, stats, chosen_cost)?;
    Ok(NewGenerator {
        user_id: account.id,
        kind,
        level: 1,
        base_output,
        current_output: base_output,
        upgrade_cost: derive::initial_unlock_upgrade_cost(chosen_cost),
        is_unlocked: true,
    })
}

/// Buy a boost. An energy refill applies immediately and yields no boost row.
pub fn purchase_boost(
    account: &mut Account,
    stats: &mut Stats,
    kind: BoostKind,
    cost: f64,
    duration_hours: f64,
    multiplier: f64,
    now: DateTime<Utc>,
) -> Result<Option<NewBoost>> {
    if kind == BoostKind::EnergyRefill {
        spend_points(account, stats, cost)?;
        account.energy = account.max_energy;
        return Ok(None);
    }
    require_positive(duration_hours, "Boost duration")?;
    require_positive(multiplier, "Boost multiplier")?;
    let expires_at = boost_expiry(now, duration_hours)
        .ok_or_else(|| EconomyError::validation("Boost duration is too long"))?;
    spend_points(account, stats, cost)?;
    Ok(Some(NewBoost {
        user_id: account.id,
        kind,
        multiplier,
        expires_at,
        created_at: now,
    }))
}

/// `None` when the duration doesn't fit in a timestamp.
fn boost_expiry(now: DateTime<Utc>, duration_hours: f64) -> Option<DateTime<Utc>> {
    let millis = (duration_hours * 3_600_000.0).round();
    if !millis.is_finite() || millis >= i64::MAX as f64 {
        return None;
    }
    now.checked_add_signed(Duration::try_milliseconds(millis as i64)?)
}

/// Buy a permanent upgrade.
pub fn purchase_upgrade(
    account: &mut Account,
    stats: &mut Stats,
    kind: UpgradeKind,
    cost: f64,
    value: f64,
) -> Result<()> {
    require_positive(value, "Upgrade value")?;
    match kind {
        UpgradeKind::EnergyCapacity => {
            if value.fract() != 0.0 || value > f64::from(i32::MAX - account.max_energy) {
                return Err(EconomyError::validation(
                    "Energy capacity upgrade value must be a whole number",
                ));
            }
            spend_points(account, stats, cost)?;
            let extra = value as i32;
            account.max_energy += extra;
            account.energy = (account.energy + extra).min(account.max_energy);
        }
        UpgradeKind::MultiTap => {
            spend_points(account, stats, cost)?;
            account.tap_bonus += value;
        }
    }
    Ok(())
}

fn require_open(task: &Task, now: DateTime<Utc>) -> Result<()> {
    if task.is_expired(now) {
        return Err(EconomyError::validation(format!(
            "Task '{}' has expired",
            task.name
        )));
    }
    Ok(())
}

/// Complete an existing task and award its reward. Returns the amount awarded.
pub fn complete_task(
    account: &mut Account,
    stats: &mut Stats,
    task: &mut Task,
    now: DateTime<Utc>,
) -> Result<f64> {
    if task.is_completed {
        return Err(EconomyError::validation(format!(
            "Task '{}' is already completed",
            task.name
        )));
    }
    require_open(task, now)?;
    if task.reward > 0.0 {
        award_points(account, stats, task.reward, PointsSource::Task)?;
    }
    task.progress = task.target;
    task.is_completed = true;
    Ok(task.reward.max(0.0))
}

/// Create and complete a one-off task that had no row (social tasks are
/// verified externally, so they only exist once completed).
pub fn complete_untracked_task(
    account: &mut Account,
    stats: &mut Stats,
    kind: TaskKind,
    reward: f64,
    now: DateTime<Utc>,
) -> Result<NewTask> {
    require_amount(reward, "Reward")?;
    if reward > 0.0 {
        award_points(account, stats, reward, PointsSource::Task)?;
    }
    let name = match kind {
        TaskKind::Social => "Social Task",
        TaskKind::Daily => "Daily Task",
    };
    Ok(NewTask {
        user_id: account.id,
        kind,
        name: name.to_string(),
        description: None,
        reward,
        progress: 1.0,
        target: 1.0,
        is_completed: true,
        expires_at: None,
        created_at: now,
    })
}

/// Add `delta` progress, clamped to the target. Crossing the target completes
/// the task and awards its reward, once. Returns whether the reward was paid.
pub fn advance_task_progress(
    account: &mut Account,
    stats: &mut Stats,
    task: &mut Task,
    delta: f64,
    now: DateTime<Utc>,
) -> Result<bool> {
    require_amount(delta, "Progress")?;
    require_open(task, now)?;
    let progress = (task.progress + delta).min(task.target);
    let completes = !task.is_completed && progress >= task.target;
    if completes && task.reward > 0.0 {
        award_points(account, stats, task.reward, PointsSource::Task)?;
    }
    task.progress = progress;
    if completes {
        task.is_completed = true;
    }
    Ok(completes && task.reward > 0.0)
}

/// Credit the referrer of a newly created account.
pub fn credit_referral(referrer: &mut Account, stats: &mut Stats, bonus: f64) -> Result<()> {
    award_points(referrer, stats, bonus, PointsSource::Referral)?;
    referrer.referral_count += 1;
    Ok(())
}
