//! A Warfront server with four sample factions.
//!
//! ```text
//! cargo run -p skirmish                  # defaults, in-memory games
//! cargo run -p skirmish -- server.json   # ServerConfig as JSON
//! RUST_LOG=warfront=debug cargo run -p skirmish
//! ```
//!
//! With `"sync": { "journal_dir": "games" }` in the config, games and player
//! identities survive a restart.

use warfront::prelude::*;

const FACTIONS: &str = include_str!("../factions.json");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)?;
            tracing::info!(%path, "loaded config");
            serde_json::from_str(&raw)?
        }
        None => ServerConfig::default(),
    };

    let table = StatTable::from_json(FACTIONS)?;
    let factions: Vec<_> = table.factions.keys().map(|f| f.to_string()).collect();

    let server = WarfrontServer::builder()
        .config(config)
        .stat_table(table)
        .build_with_registry()
        .await?;

    tracing::info!(
        addr = %server.local_addr()?,
        factions = ?factions,
        "skirmish server ready"
    );
    server.run().await?;
    Ok(())
}
