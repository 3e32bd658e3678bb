//! Derived quantities. One formula per quantity, shared by the gateway and
//! the client projection.
//!
//! All functions are pure. Boost-dependent functions take `now` explicitly;
//! a boost counts while `expires_at >= now`.

use chrono::{DateTime, Utc};

use super::BoostCategory;
use crate::db::{ActiveBoost, Generator};

/// Points granted per tap before bonuses and multipliers.
pub const BASE_TAP_YIELD: f64 = 10.0;

/// Points scale of the level curve: `level = floor(1 + sqrt(points / 1000))`.
pub const LEVEL_POINTS_DIVISOR: f64 = 1000.0;

/// Per-level growth of a generator's output.
pub const OUTPUT_GROWTH: f64 = 1.5;

/// Per-upgrade growth of a generator's next upgrade cost.
pub const COST_GROWTH: f64 = 1.8;

/// Level implied by a points balance. Negative or NaN balances map to level 1.
pub fn level_for(points: f64) -> i32 {
    if !(points > 0.0) {
        return 1;
    }
    (1.0 + (points / LEVEL_POINTS_DIVISOR).sqrt()).floor() as i32
}

/// Output of a generator at `new_level`: `base × 1.5^(new_level − 1)`.
pub fn generator_upgrade_output(base_output: f64, new_level: i32) -> f64 {
    base_output * OUTPUT_GROWTH.powi(new_level - 1)
}

pub fn generator_upgrade_cost(previous_cost: f64) -> f64 {
    previous_cost * COST_GROWTH
}

/// The upgrade cost stored on a freshly unlocked generator: the price of its
/// first upgrade, not the unlock price.
pub fn initial_unlock_upgrade_cost(chosen_cost: f64) -> f64 {
    chosen_cost * COST_GROWTH
}

/// Product of the multipliers of live boosts in `category` (1 when none).
pub fn category_multiplier(boosts: &[ActiveBoost], category: BoostCategory, now: DateTime<Utc>) -> f64 {
    boosts
        .iter()
        .filter(|b| b.kind.category() == category && !b.is_expired(now))
        .map(|b| b.multiplier)
        .product()
}

/// Points per second from unlocked generators, times live passive boosts.
pub fn passive_yield_per_second(
    generators: &[Generator],
    boosts: &[ActiveBoost],
    now: DateTime<Utc>,
) -> f64 {
    let base: f64 = generators
        .iter()
        .filter(|g| g.is_unlocked)
        .map(|g| g.current_output)
        .sum();
    (base * category_multiplier(boosts, BoostCategory::Passive, now)).max(0.0)
}

/// Points per tap: `(base + tap_bonus) × Π tap multipliers`.
pub fn tap_yield(base: f64, tap_bonus: f64, boosts: &[ActiveBoost], now: DateTime<Utc>) -> f64 {
    (base + tap_bonus) * category_multiplier(boosts, BoostCategory::Tap, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::{BoostKind, GeneratorKind};
    use chrono::Duration;

    fn generator(kind: GeneratorKind, output: f64, unlocked: bool) -> Generator {
        Generator {
            id: 1,
            user_id: 1,
            kind,
            level: 1,
            base_output: output,
            current_output: output,
            upgrade_cost: output * 120.0,
            is_unlocked: unlocked,
        }
    }

    fn boost(kind: BoostKind, multiplier: f64, expires_at: DateTime<Utc>) -> ActiveBoost {
        ActiveBoost {
            id: 1,
            user_id: 1,
            kind,
            multiplier,
            expires_at,
            created_at: expires_at - Duration::hours(1),
        }
    }

    #[test]
    fn level_curve_thresholds() {
        assert_eq!(level_for(0.0), 1);
        assert_eq!(level_for(10.0), 1);
        assert_eq!(level_for(999.0), 1);
        assert_eq!(level_for(1000.0), 2);
        assert_eq!(level_for(1200.0), 2);
        assert_eq!(level_for(4000.0), 3);
        assert_eq!(level_for(-5.0), 1);
        assert_eq!(level_for(f64::NAN), 1);
    }

    #[test]
    fn generator_curves() {
        assert_eq!(generator_upgrade_output(10.0, 1), 10.0);
        assert!((generator_upgrade_output(10.0, 4) - 33.75).abs() < 1e-9);
        assert!((generator_upgrade_cost(1200.0) - 2160.0).abs() < 1e-9);
        assert!((initial_unlock_upgrade_cost(3500.0) - 6300.0).abs() < 1e-9);
    }

    #[test]
    fn passive_yield_counts_only_unlocked_and_live_boosts() {
        let now = Utc::now();
        let gens = vec![
            generator(GeneratorKind::Satellite, 10.0, true),
            generator(GeneratorKind::Station, 25.0, true),
            generator(GeneratorKind::Colony, 100.0, false),
        ];
        assert_eq!(passive_yield_per_second(&gens, &[], now), 35.0);

        let boosts = vec![
            boost(BoostKind::AutoBoost, 1.5, now + Duration::minutes(5)),
            boost(BoostKind::AutoBoost, 2.0, now - Duration::seconds(1)),
            boost(BoostKind::DoubleTap, 2.0, now + Duration::minutes(5)),
        ];
        assert_eq!(passive_yield_per_second(&gens, &boosts, now), 52.5);
    }

    #[test]
    fn tap_multipliers_compose_within_category() {
        let now = Utc::now();
        let boosts = vec![
            boost(BoostKind::DoubleTap, 2.0, now + Duration::minutes(30)),
            boost(BoostKind::DoubleTap, 2.0, now + Duration::minutes(10)),
            boost(BoostKind::AutoBoost, 1.5, now + Duration::minutes(10)),
        ];
        assert_eq!(tap_yield(BASE_TAP_YIELD, 0.0, &[], now), 10.0);
        assert_eq!(tap_yield(BASE_TAP_YIELD, 1.0, &boosts, now), 44.0);
        assert_eq!(category_multiplier(&boosts, BoostCategory::Instant, now), 1.0);
    }

    #[test]
    fn boost_expiring_exactly_now_still_counts() {
        let now = Utc::now();
        let boosts = vec![boost(BoostKind::DoubleTap, 2.0, now)];
        assert_eq!(tap_yield(BASE_TAP_YIELD, 0.0, &boosts, now), 20.0);
    }
}
