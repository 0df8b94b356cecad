use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

use crate::{
    config::Config,
    portal::{Mode, Region},
};

pub const ARG_CONFIG: &str = "config";
pub const ARG_SUBDOMAIN: &str = "subdomain";
pub const ARG_USERNAME: &str = "username";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_FINGERPRINT: &str = "fingerprint";
pub const ARG_BASE_URL: &str = "base-url";
pub const ARG_TEST_MODE: &str = "test-mode";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CONFIG)
                .short('c')
                .long(ARG_CONFIG)
                .help("JSON account configuration; flags below override its fields")
                .env("PULSE_CONFIG")
                .global(true),
        )
        .arg(
            Arg::new(ARG_SUBDOMAIN)
                .long(ARG_SUBDOMAIN)
                .help("Portal region")
                .env("PULSE_SUBDOMAIN")
                .value_parser(["portal", "portal-ca"])
                .global(true),
        )
        .arg(
            Arg::new(ARG_USERNAME)
                .short('u')
                .long(ARG_USERNAME)
                .help("Portal username")
                .env("PULSE_USERNAME")
                .global(true),
        )
        .arg(
            Arg::new(ARG_PASSWORD)
                .long(ARG_PASSWORD)
                .help("Portal password")
                .env("PULSE_PASSWORD")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_FINGERPRINT)
                .long(ARG_FINGERPRINT)
                .help("Device fingerprint produced by the browser setup")
                .env("PULSE_FINGERPRINT")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_BASE_URL)
                .long(ARG_BASE_URL)
                .help("Talk to this URL instead of the region host")
                .env("PULSE_BASE_URL")
                .hide(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_TEST_MODE)
                .long(ARG_TEST_MODE)
                .help("Allow arm/disarm commands on a paused account")
                .env("PULSE_TEST_MODE")
                .action(ArgAction::SetTrue)
                .global(true),
        )
}

#[derive(Debug)]
pub struct Options {
    pub config: Option<String>,
    pub subdomain: Option<Region>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub fingerprint: Option<String>,
    pub base_url: Option<Url>,
    pub test_mode: bool,
}

impl Options {
    /// # Errors
    /// Returns an error if the base URL does not parse.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let base_url = matches
            .get_one::<String>(ARG_BASE_URL)
            .map(|url| Url::parse(url))
            .transpose()
            .context("invalid PULSE_BASE_URL")?;

        Ok(Self {
            config: matches.get_one::<String>(ARG_CONFIG).cloned(),
            subdomain: matches
                .get_one::<String>(ARG_SUBDOMAIN)
                .and_then(|subdomain| Region::from_subdomain(subdomain)),
            username: matches.get_one::<String>(ARG_USERNAME).cloned(),
            password: matches
                .get_one::<String>(ARG_PASSWORD)
                .map(|password| SecretString::from(password.clone())),
            fingerprint: matches.get_one::<String>(ARG_FINGERPRINT).cloned(),
            base_url,
            test_mode: matches.get_flag(ARG_TEST_MODE),
        })
    }

    /// Load the configuration file, if any, and apply the flag overrides.
    ///
    /// # Errors
    /// Returns an error if the file is invalid or a required field is missing.
    pub fn resolve(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Some(Config::from_file(path).with_context(|| format!("Failed to load {path}"))?),
            None => None,
        };

        if let Some(config) = config.as_mut() {
            if let Some(subdomain) = self.subdomain {
                config.subdomain = subdomain;
            }
            if let Some(username) = self.username.clone() {
                config.username = username;
            }
            if let Some(password) = self.password.clone() {
                config.password = password;
            }
            if let Some(fingerprint) = self.fingerprint.clone() {
                config.fingerprint = fingerprint;
            }
        }

        let config = match config {
            Some(config) => config,
            None => Config {
                subdomain: self.subdomain.unwrap_or_default(),
                username: self
                    .username
                    .ok_or_else(|| anyhow!("missing required argument: --{ARG_USERNAME}"))?,
                password: self
                    .password
                    .ok_or_else(|| anyhow!("missing required argument: --{ARG_PASSWORD}"))?,
                fingerprint: self
                    .fingerprint
                    .ok_or_else(|| anyhow!("missing required argument: --{ARG_FINGERPRINT}"))?,
                mode: Mode::Normal,
                speed: 1.0,
                options: Vec::new(),
                sensors: Vec::new(),
            },
        };

        config.validate().context("Invalid account configuration")?;
        Ok(config)
    }
}
