//! Command-line argument dispatch.
//!
//! Turns validated CLI matches into an [`Action`] carrying the resolved
//! account configuration.

use crate::cli::{
    actions::{Action, monitor, status},
    commands::{self, account},
    globals::GlobalArgs,
};
use anyhow::{Result, anyhow};
use tokio::time::Duration;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or the configuration is invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let options = account::Options::parse(matches)?;
    let base_url = options.base_url.clone();
    let test_mode = options.test_mode;
    let globals = GlobalArgs::new(options.resolve()?)
        .with_base_url(base_url)
        .with_test_mode(test_mode);

    match matches.subcommand() {
        Some((commands::CMD_STATUS, _)) => Ok(Action::Status(status::Args { globals })),
        Some((commands::CMD_MONITOR, sub)) => {
            let keep_alive = sub
                .get_one::<u64>(commands::ARG_KEEP_ALIVE_SECONDS)
                .copied()
                .unwrap_or(300);
            Ok(Action::Monitor(monitor::Args {
                globals,
                keep_alive: Duration::from_secs(keep_alive),
            }))
        }
        _ => Err(anyhow!("missing subcommand: {} or {}", commands::CMD_STATUS, commands::CMD_MONITOR)),
    }
}
