//! Event orchestration: resolve the account, check ownership, run the
//! economy rule, persist the changeset, and shape the response.
//!
//! Every mutating operation runs under the account's lock from
//! [`AccountLocks`](super::locks::AccountLocks), so the load → mutate →
//! commit sequence is never interleaved with another request for the same
//! account.

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use super::error::ApiError;
use super::AppState;
use crate::db::{Account, AccountWithRelated, Changeset, NewAccount, Stats, Write};
use crate::economy::{engine, EconomyError, PointsSource};
use crate::protocol::{
    AwardPointsRequest, BoostRequest, BoostResponse, GeneratorRequest, GeneratorResponse,
    NewUserSummary, PointsResponse, PushMessage, ReferralNotice, TaskCompleteRequest,
    TaskCompleteResponse, TaskProgressRequest, TaskProgressResponse, TelegramAuthRequest,
    UpgradeRequest, UpgradeResponse, WalletRequest, WalletResponse,
};

type Result<T> = std::result::Result<T, ApiError>;

async fn load(state: &AppState, account_id: i64) -> Result<(Account, Stats)> {
    let account = state
        .db
        .get_account(account_id)
        .await?
        .ok_or(EconomyError::NotFound("User"))?;
    let stats = state.db.get_or_create_stats(account_id).await?;
    Ok((account, stats))
}

/// Give the account a fresh row for every daily template without a live one.
async fn roll_daily_tasks(state: &AppState, account_id: i64, now: DateTime<Utc>) -> Result<()> {
    let existing = state.db.get_tasks(account_id).await?;
    let fresh = state.economy.daily_rollover(account_id, &existing, now);
    if !fresh.is_empty() {
        let created = state.db.create_tasks(fresh).await?;
        debug!(account_id, count = created.len(), "rolled daily tasks");
    }
    Ok(())
}

async fn snapshot_locked(state: &AppState, account_id: i64) -> Result<AccountWithRelated> {
    let now = Utc::now();
    let pruned = state.db.remove_expired_boosts(account_id, now).await?;
    if pruned > 0 {
        debug!(account_id, pruned, "pruned expired boosts");
    }
    roll_daily_tasks(state, account_id, now).await?;
    state
        .db
        .get_account_with_related(account_id)
        .await?
        .ok_or_else(|| EconomyError::NotFound("User").into())
}

/// Full account snapshot after pruning expired boosts and rolling daily tasks.
pub async fn snapshot(state: &AppState, account_id: i64) -> Result<AccountWithRelated> {
    let _guard = state.locks.lock(account_id).await;
    if state.db.get_account(account_id).await?.is_none() {
        return Err(EconomyError::NotFound("User").into());
    }
    snapshot_locked(state, account_id).await
}

// ── Authentication ──────────────────────────────────────────────

fn display_name(req: &TelegramAuthRequest) -> String {
    match req.last_name.as_deref().map(str::trim) {
        Some(last) if !last.is_empty() => format!("{} {}", req.first_name.trim(), last),
        _ => req.first_name.trim().to_string(),
    }
}

async fn fresh_referral_code(state: &AppState) -> Result<String> {
    for _ in 0..8 {
        let code = format!("{:08x}", rand::thread_rng().gen::<u32>());
        if state.db.get_account_by_referral_code(&code).await?.is_none() {
            return Ok(code);
        }
    }
    Err(anyhow::anyhow!("could not allocate a unique referral code").into())
}

/// Create the account on first sight, otherwise refresh its profile.
pub async fn authenticate(state: &AppState, req: TelegramAuthRequest) -> Result<AccountWithRelated> {
    state.verifier.verify(&req).map_err(ApiError::bad_request)?;
    let telegram_id = req.id.to_string();
    let now = Utc::now();

    if let Some(existing) = state.db.get_account_by_telegram_id(&telegram_id).await? {
        let _guard = state.locks.lock(existing.id).await;
        let (mut account, _) = load(state, existing.id).await?;
        account.last_seen = now;
        if let Some(photo) = req.photo_url.filter(|p| !p.is_empty()) {
            account.avatar_url = Some(photo);
        }
        state.db.commit(Changeset::new().account(&account)).await?;
        debug!(account_id = account.id, "returning player authenticated");
        return snapshot_locked(state, account.id).await;
    }

    let referred_by = req
        .start_param
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string);
    let player = &state.economy.player;
    let new = NewAccount {
        username: req
            .username
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("user_{telegram_id}")),
        display_name: display_name(&req),
        telegram_id,
        avatar_url: req.photo_url.clone().filter(|p| !p.is_empty()),
        points: player.starting_points,
        energy: player.starting_energy,
        max_energy: player.starting_max_energy,
        referral_code: fresh_referral_code(state).await?,
        referred_by,
        now,
    };
    let account = state
        .db
        .create_account(new, &state.economy.starter_kit(now))
        .await?;
    state.metrics.accounts_created.inc();
    info!(account_id = account.id, referred = account.referred_by.is_some(), "account created");

    credit_referrer(state, &account).await;

    let _guard = state.locks.lock(account.id).await;
    snapshot_locked(state, account.id).await
}

/// Pay the referral bonus to the inviter of a just-created account and tell
/// them over the push channel. Failures are logged, never returned.
async fn credit_referrer(state: &AppState, new_account: &Account) {
    let Some(code) = new_account.referred_by.as_deref() else {
        return;
    };
    let referrer = match state.db.get_account_by_referral_code(code).await {
        Ok(Some(referrer)) if referrer.id != new_account.id => referrer,
        Ok(_) => {
            debug!(code, "referral code matches no other account");
            return;
        }
        Err(e) => {
            warn!(error = %e, code, "referrer lookup failed");
            return;
        }
    };

    let bonus = state.economy.player.referral_bonus;
    let _guard = state.locks.lock(referrer.id).await;
    let credited = async {
        let (mut referrer, mut stats) = load(state, referrer.id).await?;
        engine::credit_referral(&mut referrer, &mut stats, bonus)?;
        state
            .db
            .commit(Changeset::new().account(&referrer).stats(&stats))
            .await?;
        Ok::<_, ApiError>(referrer)
    }
    .await;

    match credited {
        Ok(referrer) => {
            state.metrics.record_award(PointsSource::Referral.as_str(), bonus);
            let notice = PushMessage::ReferralComplete(ReferralNotice {
                referral_bonus: bonus,
                new_user: NewUserSummary {
                    display_name: new_account.display_name.clone(),
                    id: new_account.id,
                },
            });
            let delivered = state.connections.send(referrer.id, notice);
            if delivered {
                state.metrics.push_delivered.inc();
            }
            info!(
                referrer_id = referrer.id,
                new_account_id = new_account.id,
                delivered,
                "referral credited"
            );
        }
        Err(e) => warn!(
            referrer_id = referrer.id,
            error = e.message(),
            "referral credit failed"
        ),
    }
}

// ── Economic events ─────────────────────────────────────────────

pub async fn award_points(
    state: &AppState,
    account_id: i64,
    req: AwardPointsRequest,
) -> Result<PointsResponse> {
    let _guard = state.locks.lock(account_id).await;
    let (mut account, mut stats) = load(state, account_id).await?;
    let source = PointsSource::from_request(&req.source);

    engine::award_points(&mut account, &mut stats, req.points, source)?;
    match req.energy {
        Some(energy) => engine::set_energy(&mut account, energy),
        None if source == PointsSource::Tap => engine::consume_energy(&mut account, 1),
        None => {}
    }
    state
        .db
        .commit(Changeset::new().account(&account).stats(&stats))
        .await?;
    state.metrics.record_award(source.as_str(), req.points);

    Ok(PointsResponse {
        success: true,
        points: account.points,
        energy: account.energy,
        level: account.level,
    })
}

pub async fn generators(
    state: &AppState,
    account_id: i64,
    req: GeneratorRequest,
) -> Result<GeneratorResponse> {
    let _guard = state.locks.lock(account_id).await;
    let (mut account, mut stats) = load(state, account_id).await?;

    let (changes, spent) = match (req.generator_id, req.new_generator) {
        (Some(generator_id), _) => {
            let mut generator = state
                .db
                .get_generator(generator_id)
                .await?
                .filter(|g| g.user_id == account.id)
                .ok_or(EconomyError::NotFound("Generator"))?;
            let cost = generator.upgrade_cost;
            engine::upgrade_generator(&mut account, &mut stats, &mut generator)?;
            (Changeset::new().generator(Write::Update(generator)), cost)
        }
        (None, Some(payload)) => {
            let tier = state.economy.generator_tier(payload.kind);
            let base_output = payload
                .base_output
                .or(tier.map(|t| t.base_output))
                .ok_or_else(|| EconomyError::validation("baseOutput is required"))?;
            let chosen_cost = payload
                .upgrade_cost
                .or(tier.map(|t| t.unlock_cost))
                .ok_or_else(|| EconomyError::validation("upgradeCost is required"))?;
            let owned = state.db.get_generators(account.id).await?;
            let new = engine::unlock_generator(
                &mut account,
                &mut stats,
                &owned,
                payload.kind,
                base_output,
                chosen_cost,
            )?;
            (Changeset::new().generator(Write::Insert(new)), chosen_cost)
        }
        (None, None) => {
            return Err(ApiError::bad_request(
                "Either generatorId or newGenerator is required",
            ))
        }
    };

    let committed = state
        .db
        .commit(changes.account(&account).stats(&stats))
        .await?;
    state.metrics.record_spend("generator", spent);
    let generator = committed
        .generator
        .ok_or_else(|| anyhow::anyhow!("commit returned no generator"))?;
    debug!(account_id, generator_id = generator.id, level = generator.level, "generator purchased");

    Ok(GeneratorResponse {
        success: true,
        generator,
        user_points: account.points,
    })
}

pub async fn purchase_boost(
    state: &AppState,
    account_id: i64,
    req: BoostRequest,
) -> Result<BoostResponse> {
    let _guard = state.locks.lock(account_id).await;
    let (mut account, mut stats) = load(state, account_id).await?;

    let row = engine::purchase_boost(
        &mut account,
        &mut stats,
        req.kind,
        req.cost,
        req.duration,
        req.multiplier,
        Utc::now(),
    )?;
    let refill = row.is_none();
    let mut changes = Changeset::new().account(&account).stats(&stats);
    if let Some(row) = row {
        changes = changes.boost(row);
    }
    let committed = state.db.commit(changes).await?;
    state.metrics.record_spend("boost", req.cost);

    Ok(BoostResponse {
        success: true,
        boost: committed.boost,
        user_points: account.points,
        energy: refill.then_some(account.energy),
    })
}

pub async fn purchase_upgrade(
    state: &AppState,
    account_id: i64,
    req: UpgradeRequest,
) -> Result<UpgradeResponse> {
    let _guard = state.locks.lock(account_id).await;
    let (mut account, mut stats) = load(state, account_id).await?;

    engine::purchase_upgrade(&mut account, &mut stats, req.kind, req.cost, req.value)?;
    state
        .db
        .commit(Changeset::new().account(&account).stats(&stats))
        .await?;
    state.metrics.record_spend("upgrade", req.cost);

    Ok(UpgradeResponse {
        success: true,
        user_points: account.points,
        max_energy: account.max_energy,
        energy: account.energy,
        tap_bonus: account.tap_bonus,
    })
}

pub async fn complete_task(
    state: &AppState,
    account_id: i64,
    req: TaskCompleteRequest,
) -> Result<TaskCompleteResponse> {
    let _guard = state.locks.lock(account_id).await;
    let (mut account, mut stats) = load(state, account_id).await?;
    let now = Utc::now();

    let (write, awarded) = match (req.task_id, req.task_type) {
        (Some(task_id), _) => {
            let mut task = state
                .db
                .get_task(task_id)
                .await?
                .filter(|t| t.user_id == account.id)
                .ok_or(EconomyError::NotFound("Task"))?;
            let awarded = engine::complete_task(&mut account, &mut stats, &mut task, now)?;
            (Write::Update(task), awarded)
        }
        (None, Some(kind)) => {
            let reward = req
                .reward
                .ok_or_else(|| EconomyError::validation("reward is required"))?;
            let task = engine::complete_untracked_task(&mut account, &mut stats, kind, reward, now)?;
            (Write::Insert(task), reward)
        }
        (None, None) => {
            return Err(ApiError::bad_request("Either taskId or taskType is required"))
        }
    };

    let committed = state
        .db
        .commit(Changeset::new().account(&account).stats(&stats).task(write))
        .await?;
    if awarded > 0.0 {
        state.metrics.record_award(PointsSource::Task.as_str(), awarded);
    }
    let task = committed
        .task
        .ok_or_else(|| anyhow::anyhow!("commit returned no task"))?;

    Ok(TaskCompleteResponse {
        success: true,
        task,
        user_points: account.points,
    })
}

pub async fn advance_task(
    state: &AppState,
    account_id: i64,
    req: TaskProgressRequest,
) -> Result<TaskProgressResponse> {
    let _guard = state.locks.lock(account_id).await;
    let (mut account, mut stats) = load(state, account_id).await?;

    let mut task = state
        .db
        .get_task(req.task_id)
        .await?
        .filter(|t| t.user_id == account.id)
        .ok_or(EconomyError::NotFound("Task"))?;
    let rewarded =
        engine::advance_task_progress(&mut account, &mut stats, &mut task, req.progress, Utc::now())?;

    let mut changes = Changeset::new().task(Write::Update(task));
    if rewarded {
        changes = changes.account(&account).stats(&stats);
    }
    let committed = state.db.commit(changes).await?;
    let task = committed
        .task
        .ok_or_else(|| anyhow::anyhow!("commit returned no task"))?;
    if rewarded {
        state.metrics.record_award(PointsSource::Task.as_str(), task.reward);
    }

    Ok(TaskProgressResponse {
        success: true,
        task,
    })
}

pub async fn link_wallet(
    state: &AppState,
    account_id: i64,
    req: WalletRequest,
) -> Result<WalletResponse> {
    let address = req.wallet_address.trim();
    if address.is_empty() {
        return Err(ApiError::bad_request("walletAddress is required"));
    }
    let _guard = state.locks.lock(account_id).await;
    let (mut account, _) = load(state, account_id).await?;
    account.wallet_address = Some(address.to_string());
    state.db.commit(Changeset::new().account(&account)).await?;
    info!(account_id, "wallet linked");

    Ok(WalletResponse {
        success: true,
        wallet_address: address.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(id: i64, last: Option<&str>) -> TelegramAuthRequest {
        TelegramAuthRequest {
            id,
            first_name: "Ada".into(),
            last_name: last.map(str::to_string),
            username: None,
            photo_url: None,
            start_param: None,
        }
    }

    #[test]
    fn display_name_joins_first_and_last() {
        assert_eq!(display_name(&auth(1, Some("Lovelace"))), "Ada Lovelace");
        assert_eq!(display_name(&auth(1, None)), "Ada");
        assert_eq!(display_name(&auth(1, Some("  "))), "Ada");
    }
}
