//! Client library against a live gateway: the REST client, the catalog
//! endpoint and a full scripted play session.
//!
//! # How to run
//!
//! ```bash
//! cargo test --test client_session
//! ```

mod common;

use std::time::Duration;

use orbit_tap::config::EconomyConfig;
use orbit_tap::economy::{BoostKind, GeneratorKind, UpgradeKind};
use orbit_tap::projection::client::HttpGameClient;
use orbit_tap::projection::play::{play, PlayPlan};

fn rich_tap_economy() -> EconomyConfig {
    let mut economy = EconomyConfig::default();
    economy.player.base_tap_yield = 100.0;
    economy
}

#[tokio::test]
async fn catalog_endpoint_reflects_the_served_economy() {
    let (base, _state) = common::spawn_live_server(rich_tap_economy()).await;
    let client = HttpGameClient::new(&base).unwrap();

    let catalog = client.catalog().await.unwrap();
    assert!(catalog.success);
    assert_eq!(catalog.base_tap_yield, 100.0);
    assert_eq!(catalog.referral_bonus, 250.0);
    let satellite = catalog.generator(GeneratorKind::Satellite).unwrap();
    assert!(satellite.starter);
    assert_eq!(satellite.unlock_cost, 1200.0);
    let double_tap = catalog.boost(BoostKind::DoubleTap).unwrap();
    assert_eq!((double_tap.cost, double_tap.duration, double_tap.multiplier), (3500.0, 0.5, 2.0));
    assert_eq!(catalog.upgrade(UpgradeKind::MultiTap).unwrap().cost, 8000.0);
    assert_eq!(catalog.social_task("join telegram channel").unwrap().reward, 1000.0);
}

#[tokio::test]
async fn client_reports_server_failures_with_the_message() {
    let (base, _state) = common::spawn_live_server(EconomyConfig::default()).await;
    let client = HttpGameClient::new(&base).unwrap();

    let err = client.get_user(404).await.unwrap_err().to_string();
    assert!(err.contains("/api/user/404"), "{err}");
    assert!(err.contains("404"), "{err}");
}

#[tokio::test]
async fn play_session_taps_buys_and_resyncs() {
    let (base, _state) = common::spawn_live_server(rich_tap_economy()).await;
    let client = HttpGameClient::new(&base).unwrap();

    let plan = PlayPlan {
        taps: 40,
        tap_spacing: Duration::from_millis(20),
        boosts: vec![BoostKind::DoubleTap, BoostKind::AutoBoost],
        social_tasks: vec!["Join Telegram Channel".to_string()],
        task_progress: vec![("Tap 100 times".to_string(), 5.0)],
        wallet: Some("EQ-test-wallet".to_string()),
        ..PlayPlan::new(901, "Ada")
    };
    let report = play(&client, &plan).await.unwrap();

    // 40 taps at the served yield, minus the double tap, plus the social reward.
    let server = client.get_user(report.account_id).await.unwrap().user;
    assert!(server.account.points >= 1500.0, "points {}", server.account.points);
    assert!(server.account.points < 1700.0, "points {}", server.account.points);
    assert!((10..=15).contains(&server.account.energy), "energy {}", server.account.energy);
    assert_eq!(server.stats.total_taps, 40);
    assert_eq!(server.account.wallet_address.as_deref(), Some("EQ-test-wallet"));

    assert_eq!(server.active_boosts.len(), 1);
    assert_eq!(server.active_boosts[0].kind, BoostKind::DoubleTap);
    assert_eq!(report.rejected.len(), 1, "{:?}", report.rejected);
    assert!(report.rejected[0].starts_with("boost auto_boost"), "{:?}", report.rejected);

    let daily = server.tasks.iter().find(|t| t.name == "Tap 100 times").unwrap();
    assert_eq!(daily.progress, 5.0);
    assert!(server.tasks.iter().any(|t| t.name == "Social Task" && t.is_completed));

    // The resynced projection carries the server's state.
    assert_eq!(report.view.pending, 0);
    assert_eq!(report.view.energy, server.account.energy);
    assert!(report.view.points >= server.account.points - 1.0);
    assert_eq!(report.view.boosts.len(), 1);
}

#[tokio::test]
async fn play_session_records_unknown_tasks_as_rejected() {
    let (base, _state) = common::spawn_live_server(EconomyConfig::default()).await;
    let client = HttpGameClient::new(&base).unwrap();

    let plan = PlayPlan {
        unlock: vec![GeneratorKind::Colony],
        upgrades: vec![UpgradeKind::EnergyCapacity],
        social_tasks: vec!["Follow on Mastodon".to_string()],
        task_progress: vec![("Win the lottery".to_string(), 1.0)],
        ..PlayPlan::new(902, "Grace")
    };
    let report = play(&client, &plan).await.unwrap();

    assert_eq!(report.rejected.len(), 4, "{:?}", report.rejected);
    assert!(report.rejected[0].starts_with("unlock colony"));
    assert!(report.rejected[1].starts_with("upgrade energy_capacity"));
    assert!(report.rejected[2].contains("not in the catalog"));
    assert!(report.rejected[3].contains("no open task"));
    // Only passive income from the free starter generator.
    assert!(report.view.points < 200.0, "points {}", report.view.points);
}
