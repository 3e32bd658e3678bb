//! # Projection — Optimistic Client Mirror
//!
//! Keeps a local copy of the authoritative account and layers unconfirmed
//! work on top of it:
//!
//! - **Pending taps**: each tap adds its yield and removes one energy before
//!   the server has answered. The confirming response overwrites the server
//!   copy's points/energy/level; a failed request simply drops the entry.
//! - **Passive accrual**: every tick adds `pointsPerSecond × tick` to an
//!   unsynced bucket. Every `sync_every` ticks the bucket is moved into a
//!   single pending `passive` award, with at most one such award in flight.
//!
//! Displayed values are always `server copy + pending + unsynced`, so
//! reconciliation replaces the server copy wholesale and never merges
//! deltas into it. The mirror is a plain value: all mutation happens on
//! the [`driver`] task's event loop, fed by REST answers ([`client`]) and
//! the push channel ([`push`]). [`play`] scripts a whole client session.

pub mod client;
pub mod driver;
pub mod play;
pub mod push;

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::db::{AccountWithRelated, Generator, Task};
use crate::economy::{derive, BoostKind};
use crate::protocol::{
    AwardPointsRequest, BoostResponse, GeneratorResponse, PointsResponse, PushMessage,
    ReferralNotice, TaskCompleteResponse, TaskProgressResponse, UpgradeResponse, WalletResponse,
};

/// Display tick length.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Ticks between passive syncs (10 s at the default tick).
pub const SYNC_EVERY_TICKS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    Tap,
    Passive,
}

/// An optimistic change awaiting its server response.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDelta {
    pub id: u64,
    pub kind: DeltaKind,
    pub points: f64,
    /// Energy consumed locally (1 for a tap, 0 for passive).
    pub energy: i32,
}

/// A REST answer that changes the account outside the tap/passive flow.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerUpdate {
    Generator(GeneratorResponse),
    Boost(BoostResponse),
    Upgrade(UpgradeResponse),
    TaskComplete(TaskCompleteResponse),
    TaskProgress(TaskProgressResponse),
    Wallet(WalletResponse),
}

/// A request the caller must send, tagged with the pending entry it settles.
#[derive(Debug, Clone)]
pub struct OutboundAward {
    pub id: u64,
    pub request: AwardPointsRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoostCountdown {
    pub kind: BoostKind,
    pub remaining_secs: i64,
}

/// What a UI renders.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionView {
    pub points: f64,
    pub energy: i32,
    pub max_energy: i32,
    pub level: i32,
    pub points_per_tap: f64,
    pub points_per_second: f64,
    pub pending: usize,
    pub boosts: Vec<BoostCountdown>,
}

pub struct ClientProjection {
    server: AccountWithRelated,
    pending: Vec<PendingDelta>,
    unsynced_passive: f64,
    ticks: u64,
    tick_interval: Duration,
    sync_every: u64,
    base_tap_yield: f64,
    next_id: u64,
}

impl ClientProjection {
    pub fn new(snapshot: AccountWithRelated) -> Self {
        ClientProjection {
            server: snapshot,
            pending: Vec::new(),
            unsynced_passive: 0.0,
            ticks: 0,
            tick_interval: TICK_INTERVAL,
            sync_every: SYNC_EVERY_TICKS,
            base_tap_yield: derive::BASE_TAP_YIELD,
            next_id: 0,
        }
    }

    pub fn with_base_tap_yield(mut self, base: f64) -> Self {
        self.base_tap_yield = base;
        self
    }

    pub fn with_sync_every(mut self, ticks: u64) -> Self {
        self.sync_every = ticks.max(1);
        self
    }

    pub fn account_id(&self) -> i64 {
        self.server.account.id
    }

    /// The last authoritative copy, without local deltas.
    pub fn server_copy(&self) -> &AccountWithRelated {
        &self.server
    }

    pub fn pending(&self) -> &[PendingDelta] {
        &self.pending
    }

    pub fn unsynced_passive(&self) -> f64 {
        self.unsynced_passive
    }

    // ── Derived views ───────────────────────────────────────────

    pub fn points(&self) -> f64 {
        let pending: f64 = self.pending.iter().map(|d| d.points).sum();
        self.server.account.points + pending + self.unsynced_passive
    }

    pub fn energy(&self) -> i32 {
        let used: i32 = self.pending.iter().map(|d| d.energy).sum();
        (self.server.account.energy - used).max(0)
    }

    pub fn level(&self) -> i32 {
        self.server.account.level
    }

    pub fn points_per_tap(&self, now: DateTime<Utc>) -> f64 {
        derive::tap_yield(
            self.base_tap_yield,
            self.server.account.tap_bonus,
            &self.server.active_boosts,
            now,
        )
    }

    pub fn points_per_second(&self, now: DateTime<Utc>) -> f64 {
        derive::passive_yield_per_second(&self.server.generators, &self.server.active_boosts, now)
    }

    /// Seconds left on the longest-lived boost of `kind`, if one is live.
    pub fn boost_remaining(&self, kind: BoostKind, now: DateTime<Utc>) -> Option<i64> {
        self.server
            .active_boosts
            .iter()
            .filter(|b| b.kind == kind && !b.is_expired(now))
            .map(|b| b.remaining_secs(now))
            .max()
    }

    pub fn view(&self, now: DateTime<Utc>) -> ProjectionView {
        let boosts = BoostKind::ALL
            .iter()
            .filter_map(|&kind| {
                self.boost_remaining(kind, now)
                    .map(|remaining_secs| BoostCountdown { kind, remaining_secs })
            })
            .collect();
        ProjectionView {
            points: self.points(),
            energy: self.energy(),
            max_energy: self.server.account.max_energy,
            level: self.level(),
            points_per_tap: self.points_per_tap(now),
            points_per_second: self.points_per_second(now),
            pending: self.pending.len(),
            boosts,
        }
    }

    // ── Optimistic events ───────────────────────────────────────

    fn push_pending(&mut self, kind: DeltaKind, points: f64, energy: i32) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(PendingDelta {
            id,
            kind,
            points,
            energy,
        });
        id
    }

    /// Apply a tap locally and return the award to send, or `None` when
    /// energy is exhausted.
    pub fn begin_tap(&mut self, now: DateTime<Utc>) -> Option<OutboundAward> {
        let energy = self.energy();
        if energy <= 0 {
            return None;
        }
        let points = self.points_per_tap(now);
        let id = self.push_pending(DeltaKind::Tap, points, 1);
        Some(OutboundAward {
            id,
            request: AwardPointsRequest {
                points,
                source: "tap".to_string(),
                energy: Some(energy - 1),
            },
        })
    }

    /// Advance one display tick. Every `sync_every` ticks, returns the
    /// passive award to send when one is due and none is already in flight.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<OutboundAward> {
        self.unsynced_passive += self.points_per_second(now) * self.tick_interval.as_secs_f64();
        self.ticks += 1;
        if self.ticks % self.sync_every != 0 || self.passive_in_flight() {
            return None;
        }
        if self.unsynced_passive <= 0.0 {
            return None;
        }
        let points = std::mem::take(&mut self.unsynced_passive);
        let id = self.push_pending(DeltaKind::Passive, points, 0);
        Some(OutboundAward {
            id,
            request: AwardPointsRequest {
                points,
                source: "passive".to_string(),
                energy: None,
            },
        })
    }

    pub fn passive_in_flight(&self) -> bool {
        self.pending.iter().any(|d| d.kind == DeltaKind::Passive)
    }

    // ── Reconciliation ──────────────────────────────────────────

    /// Settle pending entry `id` with the server's answer. Returns false for
    /// an unknown id (already settled or superseded).
    pub fn confirm(&mut self, id: u64, response: &PointsResponse) -> bool {
        let Some(pos) = self.pending.iter().position(|d| d.id == id) else {
            return false;
        };
        self.pending.remove(pos);
        let account = &mut self.server.account;
        account.points = response.points;
        account.energy = response.energy;
        account.level = response.level;
        true
    }

    /// Drop pending entry `id`, reverting its optimistic delta.
    pub fn fail(&mut self, id: u64) -> Option<PendingDelta> {
        let pos = self.pending.iter().position(|d| d.id == id)?;
        Some(self.pending.remove(pos))
    }

    /// Replace the server copy with a full snapshot.
    pub fn apply_sync(&mut self, snapshot: AccountWithRelated) {
        self.server = snapshot;
    }

    pub fn apply_referral(&mut self, notice: &ReferralNotice) {
        let account = &mut self.server.account;
        account.points += notice.referral_bonus;
        account.referral_count += 1;
        account.level = account.level.max(derive::level_for(account.points));
    }

    pub fn apply_push(&mut self, message: PushMessage) {
        match message {
            PushMessage::Connection { .. } => {}
            PushMessage::Sync(snapshot) => self.apply_sync(*snapshot),
            PushMessage::ReferralComplete(notice) => self.apply_referral(&notice),
        }
    }

    pub fn apply_update(&mut self, update: &ServerUpdate) {
        match update {
            ServerUpdate::Generator(r) => self.apply_generator(r),
            ServerUpdate::Boost(r) => self.apply_boost(r),
            ServerUpdate::Upgrade(r) => self.apply_upgrade(r),
            ServerUpdate::TaskComplete(r) => self.apply_task_complete(r),
            ServerUpdate::TaskProgress(r) => self.apply_task_progress(r),
            ServerUpdate::Wallet(r) => self.apply_wallet(r),
        }
    }

    pub fn apply_generator(&mut self, response: &GeneratorResponse) {
        upsert_generator(&mut self.server.generators, response.generator.clone());
        self.server.account.points = response.user_points;
    }

    pub fn apply_boost(&mut self, response: &BoostResponse) {
        if let Some(boost) = &response.boost {
            self.server.active_boosts.push(boost.clone());
        }
        if let Some(energy) = response.energy {
            self.server.account.energy = energy;
        }
        self.server.account.points = response.user_points;
    }

    pub fn apply_upgrade(&mut self, response: &UpgradeResponse) {
        let account = &mut self.server.account;
        account.points = response.user_points;
        account.max_energy = response.max_energy;
        account.energy = response.energy;
        account.tap_bonus = response.tap_bonus;
    }

    pub fn apply_task_complete(&mut self, response: &TaskCompleteResponse) {
        upsert_task(&mut self.server.tasks, response.task.clone());
        let account = &mut self.server.account;
        account.points = response.user_points;
        account.level = account.level.max(derive::level_for(account.points));
    }

    /// The progress response carries no balance, so a reward earned by
    /// crossing the target is added locally.
    pub fn apply_task_progress(&mut self, response: &TaskProgressResponse) {
        let task = &response.task;
        let was_completed = self
            .server
            .tasks
            .iter()
            .find(|t| t.id == task.id)
            .is_some_and(|t| t.is_completed);
        if task.is_completed && !was_completed && task.reward > 0.0 {
            let account = &mut self.server.account;
            account.points += task.reward;
            account.level = account.level.max(derive::level_for(account.points));
        }
        upsert_task(&mut self.server.tasks, task.clone());
    }

    pub fn apply_wallet(&mut self, response: &WalletResponse) {
        self.server.account.wallet_address = Some(response.wallet_address.clone());
    }

    pub fn prune_expired_boosts(&mut self, now: DateTime<Utc>) {
        self.server.active_boosts.retain(|b| !b.is_expired(now));
    }
}

fn upsert_generator(generators: &mut Vec<Generator>, generator: Generator) {
    match generators.iter_mut().find(|g| g.id == generator.id) {
        Some(slot) => *slot = generator,
        None => generators.push(generator),
    }
}

fn upsert_task(tasks: &mut Vec<Task>, task: Task) {
    match tasks.iter_mut().find(|t| t.id == task.id) {
        Some(slot) => *slot = task,
        None => tasks.push(task),
    }
}
