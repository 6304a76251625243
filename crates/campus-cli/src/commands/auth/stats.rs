//! Stats and achievements command implementations.

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct StatsArgs {}

#[derive(Args, Debug)]
pub struct AchievementsArgs {}

pub async fn run_stats(_args: StatsArgs, connection: &ConnectionArgs) -> Result<()> {
    let (client, _identity) = storage::restore_session(connection).await?;
    let stats = client.stats().await.context("Failed to fetch stats")?;
    output::json_pretty(&stats)
}

pub async fn run_achievements(_args: AchievementsArgs, connection: &ConnectionArgs) -> Result<()> {
    let (client, _identity) = storage::restore_session(connection).await?;
    let achievements = client
        .achievements()
        .await
        .context("Failed to fetch achievements")?;
    output::json_pretty(&achievements)
}
