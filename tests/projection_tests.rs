//! Client projection driver tests against an in-process fake API.
//!
//! Time is paused (`start_paused = true`), so the 100 ms display tick and the
//! 10 s passive sync run instantly and deterministically.
//!
//! # How to run
//!
//! ```bash
//! cargo test --test projection_tests
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use orbit_tap::db::{Account, AccountWithRelated, Generator, Stats};
use orbit_tap::economy::{derive, GeneratorKind};
use orbit_tap::projection::client::GameApi;
use orbit_tap::projection::{driver, ClientProjection, ServerUpdate};
use orbit_tap::protocol::{
    AwardPointsRequest, PointsResponse, PushMessage, UpgradeResponse, WalletResponse,
};

#[derive(Default)]
struct FakeLedger {
    points: f64,
    energy: i32,
    calls: Vec<AwardPointsRequest>,
    fail: bool,
    hang: bool,
}

#[derive(Clone, Default)]
struct FakeApi {
    ledger: Arc<Mutex<FakeLedger>>,
}

impl FakeApi {
    fn new(energy: i32) -> Self {
        let api = FakeApi::default();
        api.ledger.lock().unwrap().energy = energy;
        api
    }

    fn calls(&self) -> Vec<AwardPointsRequest> {
        self.ledger.lock().unwrap().calls.clone()
    }
}

impl GameApi for FakeApi {
    async fn award_points(&self, _account_id: i64, req: AwardPointsRequest) -> anyhow::Result<PointsResponse> {
        let hang = {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.calls.push(req.clone());
            ledger.hang
        };
        if hang {
            std::future::pending::<()>().await;
        }
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.fail {
            anyhow::bail!("connection refused");
        }
        ledger.points += req.points;
        if let Some(energy) = req.energy {
            ledger.energy = energy;
        }
        Ok(PointsResponse {
            success: true,
            points: ledger.points,
            energy: ledger.energy,
            level: derive::level_for(ledger.points),
        })
    }
}

fn snapshot(with_generator: bool) -> AccountWithRelated {
    let now = Utc::now();
    let generators = if with_generator {
        vec![Generator {
            id: 1,
            user_id: 1,
            kind: GeneratorKind::Satellite,
            level: 1,
            base_output: 10.0,
            current_output: 10.0,
            upgrade_cost: 1200.0,
            is_unlocked: true,
        }]
    } else {
        Vec::new()
    };
    AccountWithRelated {
        account: Account {
            id: 1,
            username: "user_100".into(),
            telegram_id: "100".into(),
            display_name: "Ada".into(),
            avatar_url: None,
            points: 0.0,
            energy: 50,
            max_energy: 50,
            level: 1,
            tap_bonus: 0.0,
            referral_code: "abcd1234".into(),
            referred_by: None,
            referral_count: 0,
            wallet_address: None,
            last_seen: now,
            created_at: now,
        },
        generators,
        active_boosts: Vec::new(),
        tasks: Vec::new(),
        stats: Stats {
            id: 1,
            user_id: 1,
            total_taps: 0,
            total_points_earned: 0.0,
            total_points_spent: 0.0,
        },
    }
}

#[tokio::test(start_paused = true)]
async fn taps_reconcile_with_server_values() {
    let api = FakeApi::new(50);
    let (handle, task) = driver::spawn(api.clone(), ClientProjection::new(snapshot(false)));

    for _ in 0..3 {
        assert!(handle.tap());
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let view = handle.view().await.unwrap();
    assert_eq!(view.points, 30.0);
    assert_eq!(view.energy, 47);
    assert_eq!(view.pending, 0);

    let calls = api.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.source == "tap" && c.points == 10.0));
    let energies: Vec<_> = calls.iter().map(|c| c.energy).collect();
    assert_eq!(energies, vec![Some(49), Some(48), Some(47)]);

    handle.shutdown();
    let projection = task.await.unwrap();
    assert_eq!(projection.server_copy().account.points, 30.0);
}

#[tokio::test(start_paused = true)]
async fn failed_tap_is_reverted() {
    let api = FakeApi::new(50);
    api.ledger.lock().unwrap().fail = true;
    let (handle, _task) = driver::spawn(api.clone(), ClientProjection::new(snapshot(false)));

    handle.tap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let view = handle.view().await.unwrap();
    assert_eq!(view.points, 0.0);
    assert_eq!(view.energy, 50);
    assert_eq!(view.pending, 0);
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn taps_stop_at_zero_energy() {
    let api = FakeApi::new(2);
    let mut snap = snapshot(false);
    snap.account.energy = 2;
    let (handle, _task) = driver::spawn(api.clone(), ClientProjection::new(snap));

    for _ in 0..5 {
        handle.tap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(api.calls().len(), 2);
    let view = handle.view().await.unwrap();
    assert_eq!(view.energy, 0);
    assert_eq!(view.points, 20.0);
}

#[tokio::test(start_paused = true)]
async fn passive_income_syncs_every_ten_seconds() {
    let api = FakeApi::new(50);
    let (handle, _task) = driver::spawn(api.clone(), ClientProjection::new(snapshot(true)));

    tokio::time::sleep(Duration::from_millis(9_950)).await;
    assert!(api.calls().is_empty());
    let view = handle.view().await.unwrap();
    assert!((view.points - 99.0).abs() < 1e-6, "points {}", view.points);
    assert_eq!(view.points_per_second, 10.0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let calls = api.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].source, "passive");
    assert_eq!(calls[0].energy, None);
    assert!((calls[0].points - 100.0).abs() < 1e-6);

    let view = handle.view().await.unwrap();
    assert!((view.points - 100.0).abs() < 1e-6, "points {}", view.points);
    assert_eq!(view.pending, 0);
}

#[tokio::test(start_paused = true)]
async fn at_most_one_passive_sync_in_flight() {
    let api = FakeApi::new(50);
    api.ledger.lock().unwrap().hang = true;
    let (handle, _task) = driver::spawn(api.clone(), ClientProjection::new(snapshot(true)));

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(api.calls().len(), 1);

    // The stuck award still counts toward the display.
    let view = handle.view().await.unwrap();
    assert!(view.points > 340.0, "points {}", view.points);
    assert_eq!(view.pending, 1);
}

#[tokio::test(start_paused = true)]
async fn pushed_snapshot_replaces_server_copy() {
    let api = FakeApi::new(50);
    let (handle, _task) = driver::spawn(api, ClientProjection::new(snapshot(false)));

    let mut fresh = snapshot(false);
    fresh.account.points = 999.0;
    fresh.account.energy = 12;
    assert!(handle.push(PushMessage::Sync(Box::new(fresh))));

    let view = handle.view().await.unwrap();
    assert_eq!(view.points, 999.0);
    assert_eq!(view.energy, 12);
}

#[tokio::test(start_paused = true)]
async fn purchase_responses_reach_the_server_copy() {
    let api = FakeApi::new(50);
    let (handle, _task) = driver::spawn(api, ClientProjection::new(snapshot(false)));

    assert!(handle.apply(ServerUpdate::Upgrade(UpgradeResponse {
        success: true,
        user_points: 700.0,
        max_energy: 60,
        energy: 60,
        tap_bonus: 1.0,
    })));

    let view = handle.view().await.unwrap();
    assert_eq!(view.points, 700.0);
    assert_eq!(view.max_energy, 60);
    assert_eq!(view.points_per_tap, 11.0);

    let server = handle.server_copy().await.unwrap();
    assert_eq!(server.account.tap_bonus, 1.0);
    assert_eq!(server.account.energy, 60);
}

#[tokio::test(start_paused = true)]
async fn handle_reports_stopped_driver() {
    let api = FakeApi::new(50);
    let (handle, task) = driver::spawn(api, ClientProjection::new(snapshot(false)));
    handle.shutdown();
    task.await.unwrap();
    assert!(!handle.tap());
    assert!(handle.view().await.is_none());
    assert!(handle.server_copy().await.is_none());
    assert!(!handle.apply(ServerUpdate::Wallet(WalletResponse {
        success: true,
        wallet_address: "EQ-wallet".into(),
    })));
}
