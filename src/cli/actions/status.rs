use crate::{
    cli::globals::{self, GlobalArgs},
    portal::Portal,
};
use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
}

/// Execute the status action.
/// # Errors
/// Returns an error if sign-in fails or the report cannot be serialized.
pub async fn execute(args: Args) -> Result<()> {
    let mut portal = args.globals.portal()?;
    globals::sign_in(&mut portal).await?;
    info!(region = %args.globals.config.subdomain, "signed in");

    let report = report(&portal, &args.globals).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize status report")?
    );

    if let Some(failure) = portal.logout().await.failure() {
        warn!("Sign-out failed: {}", failure.message);
    }
    Ok(())
}

/// Every read the portal offers, each in its `{success, info}` envelope.
///
/// # Errors
/// Returns an error if a response cannot be serialized.
pub async fn report(portal: &Portal, globals: &GlobalArgs) -> Result<Value> {
    Ok(json!({
        "session": portal.session_info(),
        "panel": serde_json::to_value(portal.get_panel_status().await)?,
        "sensors": serde_json::to_value(portal.get_sensors_status().await)?,
        "configuredSensors": portal.configured_sensors(&globals.config.sensors),
        "gateway": serde_json::to_value(portal.get_gateway_information().await)?,
        "panelInformation": serde_json::to_value(portal.get_panel_information().await)?,
    }))
}
