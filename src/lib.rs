//! # orbit_tap — Tap-to-Earn Economy Server
//!
//! | Module | Role |
//! |--------|------|
//! | [`db`] | Ledger store: accounts, generators, boosts, tasks, stats (PostgreSQL or in-memory) |
//! | [`economy`] | Yield formulas and the mutation rules applied on every economic event |
//! | [`gateway`] | Axum REST endpoints, push channel, per-account serialization |
//! | [`projection`] | Optimistic client mirror, HTTP client, event-loop driver |
//! | [`protocol`] | Wire types shared by the gateway and the projection |
//! | [`config`] | Economy catalog (TOML) and server settings |
//! | [`metrics`] | Prometheus counters and histograms |

pub mod config;
pub mod db;
pub mod economy;
pub mod gateway;
pub mod metrics;
pub mod projection;
pub mod protocol;
