//! # Economy — Yield Formulas and Ledger Mutation Rules
//!
//! The economy is split into two layers:
//!
//! - [`derive`]: pure functions for every derived quantity (passive yield,
//!   tap yield, level, generator output and cost curves). Server handlers and
//!   the client projection share these so there is exactly one formula per
//!   quantity.
//! - [`engine`]: the authoritative mutation rules applied to an account's
//!   entities on each economic event. Every rule checks its preconditions
//!   before touching any field, so a rejected event is a full no-op.
//!
//! ## Entity kinds
//!
//! | Kind | Variants |
//! |------|----------|
//! | [`GeneratorKind`] | `satellite`, `station`, `moon_base`, `colony` |
//! | [`BoostKind`] | `double_tap` (tap multiplier), `auto_boost` (passive multiplier), `energy_refill` (instant) |
//! | [`TaskKind`] | `social` (one-off), `daily` (progress-tracked) |
//! | [`UpgradeKind`] | `energy_capacity`, `multi_tap` |
//!
//! Kinds are stored as their snake_case names in every backend and on the wire.

pub mod derive;
pub mod engine;
mod error;

pub use error::{EconomyError, UnknownKind};

use serde::{Deserialize, Serialize};

/// Declares a string-backed kind enum with `as_str`, `Display`, `FromStr`
/// and `TryFrom<String>` (the latter is what the sqlx row mapping uses).
macro_rules! kind_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownKind;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownKind {
                        kind: $label,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownKind;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

kind_enum! {
    /// Generator tiers, cheapest first.
    GeneratorKind, "generator" {
        Satellite => "satellite",
        Station => "station",
        MoonBase => "moon_base",
        Colony => "colony",
    }
}

kind_enum! {
    BoostKind, "boost" {
        /// Multiplies tap yield while active.
        DoubleTap => "double_tap",
        /// Multiplies passive yield while active.
        AutoBoost => "auto_boost",
        /// Refills energy on purchase; never stored as an active boost.
        EnergyRefill => "energy_refill",
    }
}

kind_enum! {
    TaskKind, "task" {
        Social => "social",
        Daily => "daily",
    }
}

kind_enum! {
    UpgradeKind, "upgrade" {
        EnergyCapacity => "energy_capacity",
        MultiTap => "multi_tap",
    }
}

/// Which yield a boost multiplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostCategory {
    Tap,
    Passive,
    Instant,
}

impl BoostKind {
    pub fn category(&self) -> BoostCategory {
        match self {
            BoostKind::DoubleTap => BoostCategory::Tap,
            BoostKind::AutoBoost => BoostCategory::Passive,
            BoostKind::EnergyRefill => BoostCategory::Instant,
        }
    }
}

/// Economic cause of a points award. Only `Tap` increments the tap counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointsSource {
    Tap,
    Passive,
    Task,
    Referral,
    Other,
}

impl PointsSource {
    /// Parse the free-form `source` field of a points request.
    pub fn from_request(source: &str) -> Self {
        match source {
            "tap" => PointsSource::Tap,
            "passive" => PointsSource::Passive,
            _ => PointsSource::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PointsSource::Tap => "tap",
            PointsSource::Passive => "passive",
            PointsSource::Task => "task",
            PointsSource::Referral => "referral",
            PointsSource::Other => "other",
        }
    }
}
