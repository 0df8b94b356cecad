use crate::cli::actions::{Action, monitor, status};
use anyhow::Result;

/// Execute the provided action.
// Single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Status(args) => status::execute(args).await,
        Action::Monitor(args) => monitor::execute(args).await,
    }
}
