pub mod account;
pub mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const CMD_STATUS: &str = "status";
pub const CMD_MONITOR: &str = "monitor";
pub const ARG_KEEP_ALIVE_SECONDS: &str = "keep-alive-seconds";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("pulse-portal")
        .about("Security portal session client")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new(CMD_STATUS)
                .about("Sign in, print panel, sensor and gateway status as JSON, sign out"),
        )
        .subcommand(
            Command::new(CMD_MONITOR)
                .about("Poll the portal for changes until interrupted")
                .arg(
                    Arg::new(ARG_KEEP_ALIVE_SECONDS)
                        .long(ARG_KEEP_ALIVE_SECONDS)
                        .help("Seconds between keep-alive requests")
                        .env("PULSE_KEEP_ALIVE_SECONDS")
                        .default_value("300")
                        .value_parser(clap::value_parser!(u64).range(30..)),
                ),
        );

    let command = account::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "pulse-portal");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Security portal session client".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_subcommand_required() {
        temp_env::with_vars_unset(["PULSE_USERNAME", "PULSE_CONFIG"], || {
            assert!(new().try_get_matches_from(["pulse-portal"]).is_err());
            assert!(new().try_get_matches_from(["pulse-portal", "status"]).is_ok());
        });
    }

    #[test]
    fn test_global_account_args() {
        temp_env::with_vars_unset(["PULSE_SUBDOMAIN", "PULSE_KEEP_ALIVE_SECONDS"], || {
            let matches = new()
                .try_get_matches_from([
                    "pulse-portal",
                    "monitor",
                    "--subdomain",
                    "portal-ca",
                    "--keep-alive-seconds",
                    "60",
                ])
                .unwrap_or_else(|e| panic!("{e}"));
            assert_eq!(
                matches.get_one::<String>(account::ARG_SUBDOMAIN).map(String::as_str),
                Some("portal-ca")
            );
            let (name, sub) = matches.subcommand().unwrap_or_else(|| panic!("no subcommand"));
            assert_eq!(name, CMD_MONITOR);
            assert_eq!(sub.get_one::<u64>(ARG_KEEP_ALIVE_SECONDS).copied(), Some(60));
        });
    }

    #[test]
    fn test_rejects_unknown_region() {
        assert!(
            new()
                .try_get_matches_from(["pulse-portal", "status", "--subdomain", "portal-eu"])
                .is_err()
        );
    }
}
