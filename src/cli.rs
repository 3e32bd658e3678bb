//! Subcommand implementations for the `orbit-tap` binary.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use orbit_tap::config::{self, EconomyConfig, ServerConfig};
use orbit_tap::db::Database;
use orbit_tap::gateway;
use orbit_tap::projection::client::HttpGameClient;
use orbit_tap::projection::play::{play, PlayPlan};

fn load_economy(path: Option<&Path>) -> Result<EconomyConfig> {
    let economy = match path {
        Some(path) => config::parse_toml_file(path)?,
        None => EconomyConfig::default(),
    };
    config::validate_config(&economy)?;
    Ok(economy)
}

pub async fn run_serve(
    database_url: Option<&str>,
    server: &ServerConfig,
    economy_path: Option<&Path>,
) -> Result<()> {
    let economy = load_economy(economy_path)?;
    info!(
        generators = economy.generators.len(),
        daily_tasks = economy.daily_tasks.len(),
        "economy catalog loaded"
    );
    let db = Database::open(database_url).await?;
    gateway::run(server, db, economy).await
}

pub fn run_catalog(economy_path: Option<&Path>) -> Result<()> {
    let economy = load_economy(economy_path)?;
    print!("{}", config::to_toml(&economy)?);
    Ok(())
}

pub async fn run_play(server: &str, plan: &PlayPlan) -> Result<()> {
    let client = HttpGameClient::new(server)?;
    let report = play(&client, plan).await?;
    let view = &report.view;
    println!("Account {} (referral code {})", report.account_id, report.referral_code);
    println!("  points:     {:.1}", view.points);
    println!("  energy:     {}/{}", view.energy, view.max_energy);
    println!("  level:      {}", view.level);
    println!("  per tap:    {:.1}", view.points_per_tap);
    println!("  per second: {:.1}", view.points_per_second);
    for boost in &view.boosts {
        println!("  boost:      {} ({}s left)", boost.kind, boost.remaining_secs);
    }
    for rejected in &report.rejected {
        println!("  rejected:   {rejected}");
    }
    Ok(())
}
