//! Version command handler

use anyhow::{Context, Result};
use colored::*;

use crate::config::Config;

/// Print the versions reported by the service
pub async fn show_versions(config: &Config) -> Result<()> {
    let client = config.client();

    let echidna = client
        .version()
        .await
        .context("Failed to get the Echidna version")?;
    let specberus = client
        .specberus_version()
        .await
        .context("Failed to get the Specberus version")?;

    println!("{}  {}", "Echidna:".bold(), echidna.trim());
    println!("{} {}", "Specberus:".bold(), specberus.trim());
    println!("{}      {}", "CLI:".bold(), env!("CARGO_PKG_VERSION").dimmed());
    Ok(())
}
