//! Server settings and the economy catalog.
//!
//! The catalog is a TOML document with a `[player]` section and one array
//! of tables per shop area (`[[generators]]`, `[[boosts]]`, `[[upgrades]]`,
//! `[[social_tasks]]`, `[[daily_tasks]]`). Every section has built-in
//! defaults, so an empty file is a valid catalog. `orbit-tap catalog`
//! prints the effective catalog.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::db::{NewGenerator, NewTask, StarterKit, Task};
use crate::economy::{derive, BoostKind, GeneratorKind, TaskKind, UpgradeKind};
use crate::protocol::{
    BoostListing, CatalogResponse, GeneratorListing, SocialTaskListing, UpgradeListing,
};

/// Longest boost or daily-task duration a catalog may declare (one leap year).
pub const MAX_DURATION_HOURS: i64 = 24 * 366;

/// Runtime settings for `orbit-tap serve`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Allowed CORS origin; `None` allows any origin.
    pub cors_origin: Option<String>,
    /// Period of the housekeeping sweep.
    pub housekeeping_interval: std::time::Duration,
    /// Daily task rows are deleted this long after they expire.
    pub task_retention: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 5000,
            cors_origin: None,
            housekeeping_interval: std::time::Duration::from_secs(60),
            task_retention: Duration::days(7),
        }
    }
}

// ── Catalog structs ─────────────────────────────────────────────

/// The full economy catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomyConfig {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default = "default_generators")]
    pub generators: Vec<GeneratorTier>,
    #[serde(default = "default_boosts")]
    pub boosts: Vec<BoostOffer>,
    #[serde(default = "default_upgrades")]
    pub upgrades: Vec<UpgradeOffer>,
    #[serde(default = "default_social_tasks")]
    pub social_tasks: Vec<SocialTaskOffer>,
    #[serde(default = "default_daily_tasks")]
    pub daily_tasks: Vec<DailyTaskTemplate>,
}

/// The `[player]` section: new-account balances and fixed yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_base_tap_yield")]
    pub base_tap_yield: f64,
    #[serde(default = "default_starting_energy")]
    pub starting_energy: i32,
    #[serde(default = "default_starting_energy")]
    pub starting_max_energy: i32,
    #[serde(default)]
    pub starting_points: f64,
    #[serde(default = "default_referral_bonus")]
    pub referral_bonus: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            base_tap_yield: default_base_tap_yield(),
            starting_energy: default_starting_energy(),
            starting_max_energy: default_starting_energy(),
            starting_points: 0.0,
            referral_bonus: default_referral_bonus(),
        }
    }
}

fn default_base_tap_yield() -> f64 {
    derive::BASE_TAP_YIELD
}

fn default_starting_energy() -> i32 {
    50
}

fn default_referral_bonus() -> f64 {
    250.0
}

/// One generator tier. A tier with `starter = true` is granted to every new
/// account for free, with `unlock_cost` as its first upgrade price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorTier {
    #[serde(rename = "type")]
    pub kind: GeneratorKind,
    pub name: String,
    pub base_output: f64,
    pub unlock_cost: f64,
    #[serde(default)]
    pub starter: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostOffer {
    #[serde(rename = "type")]
    pub kind: BoostKind,
    pub name: String,
    pub cost: f64,
    /// Hours; ignored for `energy_refill`.
    #[serde(default)]
    pub duration_hours: f64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeOffer {
    #[serde(rename = "type")]
    pub kind: UpgradeKind,
    pub name: String,
    pub cost: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialTaskOffer {
    pub name: String,
    pub reward: f64,
}

/// A recurring task. Each account holds at most one unexpired row per template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTaskTemplate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub reward: f64,
    pub target: f64,
    #[serde(default = "default_daily_hours")]
    pub duration_hours: i64,
}

fn default_daily_hours() -> i64 {
    24
}

fn default_generators() -> Vec<GeneratorTier> {
    vec![
        GeneratorTier {
            kind: GeneratorKind::Satellite,
            name: "Satellite".into(),
            base_output: 10.0,
            unlock_cost: 1200.0,
            starter: true,
        },
        GeneratorTier {
            kind: GeneratorKind::Station,
            name: "Space Station".into(),
            base_output: 25.0,
            unlock_cost: 3500.0,
            starter: false,
        },
        GeneratorTier {
            kind: GeneratorKind::MoonBase,
            name: "Moon Base".into(),
            base_output: 40.0,
            unlock_cost: 7800.0,
            starter: false,
        },
        GeneratorTier {
            kind: GeneratorKind::Colony,
            name: "Space Colony".into(),
            base_output: 100.0,
            unlock_cost: 25000.0,
            starter: false,
        },
    ]
}

fn default_boosts() -> Vec<BoostOffer> {
    vec![
        BoostOffer {
            kind: BoostKind::DoubleTap,
            name: "Double Tap".into(),
            cost: 3500.0,
            duration_hours: 0.5,
            multiplier: 2.0,
        },
        BoostOffer {
            kind: BoostKind::AutoBoost,
            name: "Auto Boost".into(),
            cost: 5000.0,
            duration_hours: 1.0,
            multiplier: 1.5,
        },
        BoostOffer {
            kind: BoostKind::EnergyRefill,
            name: "Energy Refill".into(),
            cost: 2000.0,
            duration_hours: 0.0,
            multiplier: 1.0,
        },
    ]
}

fn default_upgrades() -> Vec<UpgradeOffer> {
    vec![
        UpgradeOffer {
            kind: UpgradeKind::EnergyCapacity,
            name: "Energy Capacity".into(),
            cost: 10000.0,
            value: 10.0,
        },
        UpgradeOffer {
            kind: UpgradeKind::MultiTap,
            name: "Multi Tap".into(),
            cost: 8000.0,
            value: 1.0,
        },
    ]
}

fn default_social_tasks() -> Vec<SocialTaskOffer> {
    vec![
        SocialTaskOffer {
            name: "Join Telegram Channel".into(),
            reward: 1000.0,
        },
        SocialTaskOffer {
            name: "Watch YouTube Video".into(),
            reward: 500.0,
        },
    ]
}

fn default_daily_tasks() -> Vec<DailyTaskTemplate> {
    vec![
        DailyTaskTemplate {
            name: "Tap 100 times".into(),
            description: Some("Tap the planet 100 times today".into()),
            reward: 500.0,
            target: 100.0,
            duration_hours: 24,
        },
        DailyTaskTemplate {
            name: "Earn 5000 points".into(),
            description: Some("Earn 5000 points from any source today".into()),
            reward: 1000.0,
            target: 5000.0,
            duration_hours: 24,
        },
    ]
}

impl Default for EconomyConfig {
    fn default() -> Self {
        EconomyConfig {
            player: PlayerConfig::default(),
            generators: default_generators(),
            boosts: default_boosts(),
            upgrades: default_upgrades(),
            social_tasks: default_social_tasks(),
            daily_tasks: default_daily_tasks(),
        }
    }
}

// ── Parsing ─────────────────────────────────────────────────────

/// Parse and validate a catalog from a TOML string.
pub fn parse_toml(content: &str) -> Result<EconomyConfig> {
    let config: EconomyConfig = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Parse and validate a catalog from a TOML file path.
pub fn parse_toml_file(path: &Path) -> Result<EconomyConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_toml(&content)
}

/// Render a catalog as TOML.
pub fn to_toml(config: &EconomyConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

/// Check a catalog for logical consistency.
pub fn validate_config(config: &EconomyConfig) -> Result<()> {
    let player = &config.player;
    if !(player.base_tap_yield > 0.0) {
        anyhow::bail!("player.base_tap_yield must be greater than 0");
    }
    if player.starting_max_energy <= 0 {
        anyhow::bail!("player.starting_max_energy must be greater than 0");
    }
    if player.starting_energy < 0 || player.starting_energy > player.starting_max_energy {
        anyhow::bail!(
            "player.starting_energy must be within 0..={}",
            player.starting_max_energy
        );
    }
    if !(player.starting_points >= 0.0) || !(player.referral_bonus > 0.0) {
        anyhow::bail!("player.starting_points must be >= 0 and player.referral_bonus > 0");
    }

    for (i, tier) in config.generators.iter().enumerate() {
        if config.generators[..i].iter().any(|t| t.kind == tier.kind) {
            anyhow::bail!("duplicate generator tier '{}'", tier.kind);
        }
        if !(tier.base_output > 0.0) || !(tier.unlock_cost >= 0.0) {
            anyhow::bail!("generator '{}' needs base_output > 0 and unlock_cost >= 0", tier.kind);
        }
    }
    if !config.generators.iter().any(|t| t.starter) {
        anyhow::bail!("at least one generator tier must be marked starter");
    }

    for (i, boost) in config.boosts.iter().enumerate() {
        if config.boosts[..i].iter().any(|b| b.kind == boost.kind) {
            anyhow::bail!("duplicate boost '{}'", boost.kind);
        }
        if !(boost.cost >= 0.0) {
            anyhow::bail!("boost '{}' cost must be >= 0", boost.kind);
        }
        if boost.kind != BoostKind::EnergyRefill
            && (!(boost.duration_hours > 0.0)
                || boost.duration_hours > MAX_DURATION_HOURS as f64
                || !(boost.multiplier > 0.0))
        {
            anyhow::bail!(
                "boost '{}' needs duration_hours within (0, {MAX_DURATION_HOURS}] and multiplier > 0",
                boost.kind
            );
        }
    }

    for upgrade in &config.upgrades {
        if !(upgrade.cost >= 0.0) || !(upgrade.value > 0.0) {
            anyhow::bail!("upgrade '{}' needs cost >= 0 and value > 0", upgrade.kind);
        }
        if upgrade.kind == UpgradeKind::EnergyCapacity && upgrade.value.fract() != 0.0 {
            anyhow::bail!("upgrade 'energy_capacity' value must be a whole number");
        }
    }

    for task in &config.social_tasks {
        if !(task.reward >= 0.0) {
            anyhow::bail!("social task '{}' reward must be >= 0", task.name);
        }
    }
    for task in &config.daily_tasks {
        if !(task.target > 0.0)
            || !(task.reward >= 0.0)
            || !(1..=MAX_DURATION_HOURS).contains(&task.duration_hours)
        {
            anyhow::bail!(
                "daily task '{}' needs target > 0, reward >= 0 and duration_hours within 1..={MAX_DURATION_HOURS}",
                task.name
            );
        }
    }
    Ok(())
}

// ── Catalog lookups ─────────────────────────────────────────────

impl EconomyConfig {
    pub fn generator_tier(&self, kind: GeneratorKind) -> Option<&GeneratorTier> {
        self.generators.iter().find(|t| t.kind == kind)
    }

    /// The client-facing view served at `GET /api/catalog`.
    pub fn listing(&self) -> CatalogResponse {
        CatalogResponse {
            success: true,
            base_tap_yield: self.player.base_tap_yield,
            referral_bonus: self.player.referral_bonus,
            generators: self
                .generators
                .iter()
                .map(|t| GeneratorListing {
                    kind: t.kind,
                    name: t.name.clone(),
                    base_output: t.base_output,
                    unlock_cost: t.unlock_cost,
                    starter: t.starter,
                })
                .collect(),
            boosts: self
                .boosts
                .iter()
                .map(|b| BoostListing {
                    kind: b.kind,
                    name: b.name.clone(),
                    cost: b.cost,
                    duration: b.duration_hours,
                    multiplier: b.multiplier,
                })
                .collect(),
            upgrades: self
                .upgrades
                .iter()
                .map(|u| UpgradeListing {
                    kind: u.kind,
                    name: u.name.clone(),
                    cost: u.cost,
                    value: u.value,
                })
                .collect(),
            social_tasks: self
                .social_tasks
                .iter()
                .map(|t| SocialTaskListing {
                    name: t.name.clone(),
                    reward: t.reward,
                })
                .collect(),
        }
    }

    fn daily_task(template: &DailyTaskTemplate, user_id: i64, now: DateTime<Utc>) -> NewTask {
        NewTask {
            user_id,
            kind: TaskKind::Daily,
            name: template.name.clone(),
            description: template.description.clone(),
            reward: template.reward,
            progress: 0.0,
            target: template.target,
            is_completed: false,
            // Unvalidated catalogs can carry durations past the calendar; such
            // rows never expire.
            expires_at: Duration::try_hours(template.duration_hours)
                .and_then(|d| now.checked_add_signed(d)),
            created_at: now,
        }
    }

    /// Rows seeded into a new account: starter generators and one task per
    /// daily template.
    pub fn starter_kit(&self, now: DateTime<Utc>) -> StarterKit {
        let generators = self
            .generators
            .iter()
            .filter(|t| t.starter)
            .map(|t| NewGenerator {
                user_id: 0,
                kind: t.kind,
                level: 1,
                base_output: t.base_output,
                current_output: t.base_output,
                upgrade_cost: t.unlock_cost,
                is_unlocked: true,
            })
            .collect();
        let tasks = self
            .daily_tasks
            .iter()
            .map(|t| Self::daily_task(t, 0, now))
            .collect();
        StarterKit { generators, tasks }
    }

    /// Fresh daily rows for every template that has no unexpired row among
    /// `existing`.
    pub fn daily_rollover(&self, user_id: i64, existing: &[Task], now: DateTime<Utc>) -> Vec<NewTask> {
        self.daily_tasks
            .iter()
            .filter(|template| {
                !existing.iter().any(|t| {
                    t.kind == TaskKind::Daily && t.name == template.name && !t.is_expired(now)
                })
            })
            .map(|template| Self::daily_task(template, user_id, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        validate_config(&EconomyConfig::default()).unwrap();
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_toml("").unwrap();
        assert_eq!(config, EconomyConfig::default());
        assert_eq!(config.player.referral_bonus, 250.0);
        assert_eq!(config.generator_tier(GeneratorKind::Colony).unwrap().unlock_cost, 25000.0);
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = EconomyConfig::default();
        let text = to_toml(&config).unwrap();
        assert!(text.contains("type = \"moon_base\""));
        assert_eq!(parse_toml(&text).unwrap(), config);
    }

    #[test]
    fn partial_override_keeps_other_sections() {
        let config = parse_toml(
            r#"
            [player]
            referral_bonus = 500

            [[boosts]]
            type = "double_tap"
            name = "Triple Tap"
            cost = 100
            duration_hours = 2
            multiplier = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.player.referral_bonus, 500.0);
        assert_eq!(config.player.starting_energy, 50);
        assert_eq!(config.boosts.len(), 1);
        assert!(!config.boosts.iter().any(|b| b.kind == BoostKind::AutoBoost));
        assert_eq!(config.generators.len(), 4);
    }

    #[test]
    fn rejects_inconsistent_catalogs() {
        assert!(parse_toml("[player]\nstarting_energy = 60").is_err());
        assert!(parse_toml("[player]\nbase_tap_yield = 0").is_err());

        let no_starter = r#"
            [[generators]]
            type = "station"
            name = "Station"
            base_output = 25
            unlock_cost = 3500
        "#;
        let err = parse_toml(no_starter).unwrap_err();
        assert!(err.to_string().contains("starter"));

        let bad_boost = r#"
            [[boosts]]
            type = "auto_boost"
            name = "Broken"
            cost = 10
        "#;
        assert!(parse_toml(bad_boost).is_err());
        assert!(parse_toml("[[generators]]\ntype = \"warp\"\nname = \"x\"\nbase_output = 1\nunlock_cost = 1").is_err());
    }

    #[test]
    fn rejects_durations_past_a_year() {
        let long_daily = r#"
            [[daily_tasks]]
            name = "Forever"
            reward = 1
            target = 1
            duration_hours = 9000000000000000
        "#;
        let err = parse_toml(long_daily).unwrap_err();
        assert!(err.to_string().contains("duration_hours within"));

        let long_boost = r#"
            [[boosts]]
            type = "double_tap"
            name = "Eternal"
            cost = 1
            duration_hours = 1e12
            multiplier = 2
        "#;
        assert!(parse_toml(long_boost).is_err());
    }

    #[test]
    fn unvalidated_long_daily_never_expires() {
        let mut config = EconomyConfig::default();
        config.daily_tasks[0].duration_hours = i64::MAX;
        let kit = config.starter_kit(Utc::now());
        assert_eq!(kit.tasks[0].expires_at, None);
        assert!(kit.tasks[1].expires_at.is_some());
    }

    #[test]
    fn listing_mirrors_catalog() {
        let listing = EconomyConfig::default().listing();
        assert_eq!(listing.base_tap_yield, 10.0);
        assert_eq!(listing.generators.len(), 4);
        assert_eq!(listing.generator(GeneratorKind::Station).unwrap().unlock_cost, 3500.0);
        let double = listing.boost(BoostKind::DoubleTap).unwrap();
        assert_eq!((double.cost, double.duration, double.multiplier), (3500.0, 0.5, 2.0));
        assert_eq!(listing.upgrade(UpgradeKind::MultiTap).unwrap().cost, 8000.0);
        assert_eq!(listing.social_task("join telegram channel").unwrap().reward, 1000.0);
    }

    #[test]
    fn starter_kit_has_satellite_and_dailies() {
        let now = Utc::now();
        let kit = EconomyConfig::default().starter_kit(now);
        assert_eq!(kit.generators.len(), 1);
        let satellite = &kit.generators[0];
        assert_eq!(satellite.kind, GeneratorKind::Satellite);
        assert_eq!((satellite.base_output, satellite.upgrade_cost), (10.0, 1200.0));
        assert_eq!(kit.tasks.len(), 2);
        assert_eq!(kit.tasks[0].expires_at, Some(now + Duration::hours(24)));
    }

    #[test]
    fn rollover_skips_templates_with_live_rows() {
        let config = EconomyConfig::default();
        let now = Utc::now();
        let live = Task {
            id: 1,
            user_id: 4,
            kind: TaskKind::Daily,
            name: "Tap 100 times".into(),
            description: None,
            reward: 500.0,
            progress: 0.0,
            target: 100.0,
            is_completed: true,
            expires_at: Some(now + Duration::hours(1)),
            created_at: now,
        };
        let fresh = config.daily_rollover(4, &[live.clone()], now);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].name, "Earn 5000 points");
        assert_eq!(fresh[0].user_id, 4);

        let expired = Task {
            expires_at: Some(now - Duration::seconds(1)),
            ..live
        };
        assert_eq!(config.daily_rollover(4, &[expired], now).len(), 2);
    }
}
