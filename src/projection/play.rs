//! A scripted client session: sign in, tap, let passive income accrue, buy
//! from the shop, report task progress, then resync over the push channel.
//!
//! Everything the session learns from the server flows through the driver,
//! so the final view is exactly what a UI built on the projection would show.
//! Purchases the server rejects (usually for lack of points) are collected
//! in [`PlayReport::rejected`] and do not abort the session.

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

use super::client::HttpGameClient;
use super::driver::{self, DriverHandle};
use super::push::PushChannel;
use super::{ClientProjection, ProjectionView, ServerUpdate};
use crate::economy::{BoostKind, GeneratorKind, TaskKind, UpgradeKind};
use crate::protocol::{
    BoostRequest, CatalogResponse, GeneratorRequest, NewGeneratorPayload, TaskCompleteRequest,
    TaskProgressRequest, TelegramAuthRequest, UpgradeRequest, WalletRequest,
};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PlayPlan {
    pub telegram_id: i64,
    pub first_name: String,
    /// Referral code to sign up with.
    pub referral_code: Option<String>,
    pub taps: u32,
    pub tap_spacing: Duration,
    /// Time to let passive income accrue after the taps.
    pub idle: Duration,
    pub unlock: Vec<GeneratorKind>,
    pub boosts: Vec<BoostKind>,
    pub upgrades: Vec<UpgradeKind>,
    /// Social tasks by catalog name.
    pub social_tasks: Vec<String>,
    /// `(task name, delta)` for the account's open tasks.
    pub task_progress: Vec<(String, f64)>,
    pub wallet: Option<String>,
}

impl PlayPlan {
    pub fn new(telegram_id: i64, first_name: impl Into<String>) -> Self {
        PlayPlan {
            telegram_id,
            first_name: first_name.into(),
            referral_code: None,
            taps: 0,
            tap_spacing: Duration::from_millis(50),
            idle: Duration::ZERO,
            unlock: Vec::new(),
            boosts: Vec::new(),
            upgrades: Vec::new(),
            social_tasks: Vec::new(),
            task_progress: Vec::new(),
            wallet: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayReport {
    pub account_id: i64,
    pub referral_code: String,
    pub view: ProjectionView,
    pub rejected: Vec<String>,
}

pub async fn play(client: &HttpGameClient, plan: &PlayPlan) -> Result<PlayReport> {
    let catalog = client.catalog().await?;
    let auth = client
        .authenticate(&TelegramAuthRequest {
            id: plan.telegram_id,
            first_name: plan.first_name.clone(),
            last_name: None,
            username: None,
            photo_url: None,
            start_param: plan.referral_code.clone(),
        })
        .await?;
    let account_id = auth.user.account.id;
    let referral_code = auth.user.account.referral_code.clone();
    info!(account_id, points = auth.user.account.points, "signed in");

    let projection = ClientProjection::new(auth.user).with_base_tap_yield(catalog.base_tap_yield);
    let (handle, task) = driver::spawn(client.clone(), projection);
    let mut push = PushChannel::connect(&client.push_url(account_id), handle.clone()).await?;

    for _ in 0..plan.taps {
        handle.tap();
        tokio::time::sleep(plan.tap_spacing).await;
    }
    tokio::time::sleep(plan.idle).await;
    settle(&handle).await;

    let mut shop = Shop {
        client,
        catalog: &catalog,
        handle: &handle,
        account_id,
        rejected: Vec::new(),
    };
    shop.run(plan).await;
    let rejected = shop.rejected;

    if let Err(e) = push.resync(SETTLE_TIMEOUT).await {
        warn!(account_id, error = %e, "final resync failed");
    }
    let view = handle
        .view()
        .await
        .ok_or_else(|| anyhow!("projection driver stopped"))?;

    push.close().await;
    handle.shutdown();
    task.await?;
    Ok(PlayReport {
        account_id,
        referral_code,
        view,
        rejected,
    })
}

/// Wait until no award is in flight, so purchases see every tap.
async fn settle(handle: &DriverHandle) {
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        match handle.view().await {
            Some(view) if view.pending > 0 => tokio::time::sleep(Duration::from_millis(20)).await,
            _ => return,
        }
    }
}

struct Shop<'a> {
    client: &'a HttpGameClient,
    catalog: &'a CatalogResponse,
    handle: &'a DriverHandle,
    account_id: i64,
    rejected: Vec<String>,
}

impl Shop<'_> {
    async fn run(&mut self, plan: &PlayPlan) {
        for &kind in &plan.unlock {
            self.unlock(kind).await;
        }
        for &kind in &plan.boosts {
            self.boost(kind).await;
        }
        for &kind in &plan.upgrades {
            self.upgrade(kind).await;
        }
        for name in &plan.social_tasks {
            self.social_task(name).await;
        }
        for (name, delta) in &plan.task_progress {
            self.progress(name, *delta).await;
        }
        if let Some(address) = &plan.wallet {
            self.wallet(address).await;
        }
    }

    fn record(&mut self, action: String, outcome: Result<ServerUpdate>) {
        match outcome {
            Ok(update) => {
                info!(account_id = self.account_id, %action, "accepted");
                self.handle.apply(update);
            }
            Err(e) => {
                warn!(account_id = self.account_id, %action, error = %e, "rejected");
                self.rejected.push(format!("{action}: {e}"));
            }
        }
    }

    async fn unlock(&mut self, kind: GeneratorKind) {
        let outcome = match self.catalog.generator(kind) {
            Some(tier) => {
                let req = GeneratorRequest {
                    generator_id: None,
                    new_generator: Some(NewGeneratorPayload {
                        kind,
                        base_output: Some(tier.base_output),
                        upgrade_cost: Some(tier.unlock_cost),
                    }),
                };
                self.client
                    .generators(self.account_id, &req)
                    .await
                    .map(ServerUpdate::Generator)
            }
            None => Err(anyhow!("not in the catalog")),
        };
        self.record(format!("unlock {kind}"), outcome);
    }

    async fn boost(&mut self, kind: BoostKind) {
        let outcome = match self.catalog.boost(kind) {
            Some(offer) => {
                let req = BoostRequest {
                    kind,
                    cost: offer.cost,
                    duration: offer.duration,
                    multiplier: offer.multiplier,
                };
                self.client
                    .boosts(self.account_id, &req)
                    .await
                    .map(ServerUpdate::Boost)
            }
            None => Err(anyhow!("not in the catalog")),
        };
        self.record(format!("boost {kind}"), outcome);
    }

    async fn upgrade(&mut self, kind: UpgradeKind) {
        let outcome = match self.catalog.upgrade(kind) {
            Some(offer) => {
                let req = UpgradeRequest {
                    kind,
                    cost: offer.cost,
                    value: offer.value,
                };
                self.client
                    .upgrades(self.account_id, &req)
                    .await
                    .map(ServerUpdate::Upgrade)
            }
            None => Err(anyhow!("not in the catalog")),
        };
        self.record(format!("upgrade {kind}"), outcome);
    }

    async fn social_task(&mut self, name: &str) {
        let outcome = match self.catalog.social_task(name) {
            Some(task) => {
                let req = TaskCompleteRequest {
                    task_id: None,
                    task_type: Some(TaskKind::Social),
                    reward: Some(task.reward),
                };
                self.client
                    .complete_task(self.account_id, &req)
                    .await
                    .map(ServerUpdate::TaskComplete)
            }
            None => Err(anyhow!("not in the catalog")),
        };
        self.record(format!("social task '{name}'"), outcome);
    }

    async fn progress(&mut self, name: &str, delta: f64) {
        let now = Utc::now();
        let open = self.handle.server_copy().await.and_then(|user| {
            user.tasks
                .into_iter()
                .find(|t| t.name.eq_ignore_ascii_case(name) && !t.is_completed && !t.is_expired(now))
        });
        let outcome = match open {
            Some(task) => {
                let req = TaskProgressRequest {
                    task_id: task.id,
                    progress: delta,
                };
                self.client
                    .advance_task(self.account_id, &req)
                    .await
                    .map(ServerUpdate::TaskProgress)
            }
            None => Err(anyhow!("no open task with that name")),
        };
        self.record(format!("progress '{name}' +{delta}"), outcome);
    }

    async fn wallet(&mut self, address: &str) {
        let req = WalletRequest {
            wallet_address: address.to_string(),
        };
        let outcome = self
            .client
            .link_wallet(self.account_id, &req)
            .await
            .map(ServerUpdate::Wallet);
        self.record("link wallet".to_string(), outcome);
    }
}
