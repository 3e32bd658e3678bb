//! Property-based tests for the economy rules.
//!
//! These tests use the `proptest` framework to check ledger invariants across
//! thousands of randomly generated event sequences and inputs.
//!
//! # Prerequisites
//!
//! - No database or network access required.
//!
//! # How to run
//!
//! ```bash
//! cargo test --test property_tests
//!
//! # Increase case count for thorough testing (default is 256):
//! PROPTEST_CASES=10000 cargo test --test property_tests
//! ```
//!
//! # Testing strategy
//!
//! - **Balances**: `0 ≤ energy ≤ maxEnergy`, `points ≥ 0` and a never-falling
//!   level after any sequence of events, accepted or rejected.
//! - **Rejections**: a rejected spend is a full no-op.
//! - **Curves**: generator output and cost after N upgrades.
//! - **Boost expiry**: expired boosts never contribute to yields.
//!
//! Each property is named `prop_<function>_<invariant>`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use orbit_tap::db::{Account, ActiveBoost, Generator, Stats};
use orbit_tap::economy::{derive, engine, BoostKind, GeneratorKind, PointsSource, UpgradeKind};

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn account(points: f64, energy: i32, max_energy: i32) -> Account {
    let now = epoch();
    Account {
        id: 1,
        username: "user_1".into(),
        telegram_id: "1".into(),
        display_name: "Ada".into(),
        avatar_url: None,
        points,
        energy,
        max_energy,
        level: derive::level_for(points),
        tap_bonus: 0.0,
        referral_code: "abcd1234".into(),
        referred_by: None,
        referral_count: 0,
        wallet_address: None,
        last_seen: now,
        created_at: now,
    }
}

fn stats() -> Stats {
    Stats {
        id: 1,
        user_id: 1,
        total_taps: 0,
        total_points_earned: 0.0,
        total_points_spent: 0.0,
    }
}

fn generator(base_output: f64, upgrade_cost: f64) -> Generator {
    Generator {
        id: 1,
        user_id: 1,
        kind: GeneratorKind::Satellite,
        level: 1,
        base_output,
        current_output: base_output,
        upgrade_cost,
        is_unlocked: true,
    }
}

#[derive(Debug, Clone)]
enum Event {
    Tap(f64),
    Passive(f64),
    Spend(f64),
    ReportEnergy(i32),
    Consume(i32),
    Refill(f64),
    Capacity(f64, i32),
    UpgradeGenerator,
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (0.1f64..500.0).prop_map(Event::Tap),
        (0.1f64..500.0).prop_map(Event::Passive),
        (0.0f64..3000.0).prop_map(Event::Spend),
        (-100i32..200).prop_map(Event::ReportEnergy),
        (0i32..80).prop_map(Event::Consume),
        (0.0f64..2000.0).prop_map(Event::Refill),
        ((0.0f64..2000.0), 1i32..20).prop_map(|(cost, v)| Event::Capacity(cost, v)),
        Just(Event::UpgradeGenerator),
    ]
}

fn apply(account: &mut Account, stats: &mut Stats, generator: &mut Generator, event: &Event) {
    // Rejections are expected; the invariants must hold either way.
    let _ = match *event {
        Event::Tap(points) => {
            engine::award_points(account, stats, points, PointsSource::Tap).map(|_| ())
        }
        Event::Passive(points) => {
            engine::award_points(account, stats, points, PointsSource::Passive).map(|_| ())
        }
        Event::Spend(cost) => engine::spend_points(account, stats, cost),
        Event::ReportEnergy(energy) => {
            engine::set_energy(account, energy);
            Ok(())
        }
        Event::Consume(amount) => {
            engine::consume_energy(account, amount);
            Ok(())
        }
        Event::Refill(cost) => engine::purchase_boost(
            account,
            stats,
            BoostKind::EnergyRefill,
            cost,
            0.0,
            1.0,
            epoch(),
        )
        .map(|_| ()),
        Event::Capacity(cost, value) => engine::purchase_upgrade(
            account,
            stats,
            UpgradeKind::EnergyCapacity,
            cost,
            f64::from(value),
        ),
        Event::UpgradeGenerator => engine::upgrade_generator(account, stats, generator),
    };
}

// == Balance invariants ========================================================

proptest! {
    /// Energy stays within `[0, maxEnergy]`, points never go negative and the
    /// persisted level never falls, whatever sequence of events is applied.
    #[test]
    fn prop_events_preserve_balance_invariants(
        events in prop::collection::vec(event(), 1..60),
    ) {
        let mut acct = account(0.0, 50, 50);
        let mut st = stats();
        let mut generator_row = generator(10.0, 1200.0);
        let mut level = acct.level;

        for event in &events {
            apply(&mut acct, &mut st, &mut generator_row, event);
            prop_assert!(acct.energy >= 0, "energy {} after {:?}", acct.energy, event);
            prop_assert!(acct.energy <= acct.max_energy, "energy {} > max {}", acct.energy, acct.max_energy);
            prop_assert!(acct.points >= 0.0, "points {} after {:?}", acct.points, event);
            prop_assert!(acct.level >= level, "level fell after {:?}", event);
            level = acct.level;
        }
        let balance = st.total_points_earned - st.total_points_spent;
        prop_assert!((acct.points - balance).abs() < 1e-6 * balance.abs().max(1.0));
    }

    /// Level is non-decreasing in points.
    #[test]
    fn prop_level_for_monotonic(a in 0.0f64..1e9, b in 0.0f64..1e9) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(derive::level_for(lo) <= derive::level_for(hi));
        prop_assert!(derive::level_for(lo) >= 1);
    }

    /// A spend above the balance changes nothing.
    #[test]
    fn prop_spend_points_rejection_is_noop(points in 0.0f64..10_000.0, extra in 0.01f64..10_000.0) {
        let mut acct = account(points, 17, 50);
        let mut st = stats();
        let (before_acct, before_stats) = (acct.clone(), st.clone());
        prop_assert!(engine::spend_points(&mut acct, &mut st, points + extra).is_err());
        prop_assert_eq!(acct, before_acct);
        prop_assert_eq!(st, before_stats);
    }
}

// == Curves ====================================================================

proptest! {
    /// N upgrades from level 1 give `base × 1.5^N` output and `cost × 1.8^N` price.
    #[test]
    fn prop_upgrade_generator_follows_curves(
        base in 1.0f64..200.0,
        cost in 1.0f64..5000.0,
        n in 1u32..12,
    ) {
        let mut acct = account(1e12, 50, 50);
        let mut st = stats();
        let mut generator_row = generator(base, cost);
        for _ in 0..n {
            engine::upgrade_generator(&mut acct, &mut st, &mut generator_row).unwrap();
        }
        let expected_output = base * 1.5f64.powi(n as i32);
        let expected_cost = cost * 1.8f64.powi(n as i32);
        prop_assert_eq!(generator_row.level, 1 + n as i32);
        prop_assert!((generator_row.current_output - expected_output).abs() <= 1e-9 * expected_output);
        prop_assert!((generator_row.upgrade_cost - expected_cost).abs() <= 1e-9 * expected_cost);
    }
}

// == Boost expiry ==============================================================

proptest! {
    /// Boosts that expired before `now` never change yields; live ones multiply them.
    #[test]
    fn prop_expired_boosts_excluded(
        multiplier in 1.1f64..5.0,
        offset_secs in 1i64..100_000,
        output in 1.0f64..1000.0,
    ) {
        let now = epoch();
        let gens = vec![generator(output, 1200.0)];
        let expired = vec![
            ActiveBoost {
                id: 1,
                user_id: 1,
                kind: BoostKind::AutoBoost,
                multiplier,
                expires_at: now - Duration::seconds(offset_secs),
                created_at: now - Duration::seconds(offset_secs + 3600),
            },
            ActiveBoost {
                id: 2,
                user_id: 1,
                kind: BoostKind::DoubleTap,
                multiplier,
                expires_at: now - Duration::seconds(offset_secs),
                created_at: now - Duration::seconds(offset_secs + 3600),
            },
        ];
        prop_assert_eq!(derive::passive_yield_per_second(&gens, &expired, now), output);
        prop_assert_eq!(derive::tap_yield(10.0, 0.0, &expired, now), 10.0);

        let live: Vec<ActiveBoost> = expired
            .iter()
            .cloned()
            .map(|mut b| {
                b.expires_at = now + Duration::seconds(offset_secs);
                b
            })
            .collect();
        let passive = derive::passive_yield_per_second(&gens, &live, now);
        prop_assert!((passive - output * multiplier).abs() < 1e-9 * passive);
        let tap = derive::tap_yield(10.0, 0.0, &live, now);
        prop_assert!((tap - 10.0 * multiplier).abs() < 1e-9 * tap);
    }
}
