//! Account configuration read from JSON.
//!
//! ```json
//! {
//!   "subdomain": "portal",
//!   "username": "owner@example.com",
//!   "password": "...",
//!   "fingerprint": "...",
//!   "mode": "normal",
//!   "speed": 1.0,
//!   "options": ["disableForceArm"],
//!   "sensors": [{ "name": "Front Door", "adtName": "Front Door", "adtType": "doorWindow", "adtZone": 1 }]
//! }
//! ```

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::HashSet, fmt, fs, path::Path};
use thiserror::Error;

use crate::portal::{
    Credentials, DeviceType, Mode, PortalOptions, Region,
    models::{MAX_CONFIGURED_SENSORS, MAX_ZONE},
};

/// Polling speed multipliers the monitor understands.
pub const SPEEDS: [f64; 3] = [1.0, 0.75, 0.5];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OptionFlag {
    DisableForceArm,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfiguredSensor {
    /// Display name; falls back to the portal name.
    #[serde(default)]
    pub name: Option<String>,
    pub adt_name: String,
    pub adt_type: DeviceType,
    pub adt_zone: u8,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub subdomain: Region,
    pub username: String,
    #[serde(deserialize_with = "secret")]
    pub password: SecretString,
    pub fingerprint: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub options: Vec<OptionFlag>,
    #[serde(default)]
    pub sensors: Vec<ConfiguredSensor>,
}

fn default_speed() -> f64 {
    1.0
}

fn secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("subdomain", &self.subdomain)
            .field("username", &self.username)
            .field("password", &"***")
            .field("fingerprint", &"***")
            .field("mode", &self.mode)
            .field("speed", &self.speed)
            .field("options", &self.options)
            .field("sensors", &self.sensors.len())
            .finish()
    }
}

impl Config {
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// # Errors
    /// Returns an error if the JSON is malformed or fails validation.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::Invalid("username is empty".to_string()));
        }
        if self.fingerprint.trim().is_empty() {
            return Err(ConfigError::Invalid("fingerprint is empty".to_string()));
        }
        if !SPEEDS.iter().any(|speed| (speed - self.speed).abs() < f64::EPSILON) {
            return Err(ConfigError::Invalid(format!(
                "speed {} is not one of 1.0, 0.75, 0.5",
                self.speed
            )));
        }
        if self.sensors.len() > MAX_CONFIGURED_SENSORS {
            return Err(ConfigError::Invalid(format!(
                "{} sensors configured, at most {MAX_CONFIGURED_SENSORS} allowed",
                self.sensors.len()
            )));
        }

        let mut zones = HashSet::new();
        for sensor in &self.sensors {
            if !(1..=MAX_ZONE).contains(&sensor.adt_zone) {
                return Err(ConfigError::Invalid(format!(
                    "sensor {:?} has zone {} outside 1..={MAX_ZONE}",
                    sensor.adt_name, sensor.adt_zone
                )));
            }
            if !zones.insert(sensor.adt_zone) {
                return Err(ConfigError::Invalid(format!(
                    "zone {} is configured twice",
                    sensor.adt_zone
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn force_arm_enabled(&self) -> bool {
        !self.options.contains(&OptionFlag::DisableForceArm)
    }

    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.subdomain,
            self.username.clone(),
            self.password.clone(),
            self.fingerprint.clone(),
        )
    }

    #[must_use]
    pub fn portal_options(&self) -> PortalOptions {
        PortalOptions::default()
            .with_mode(self.mode)
            .with_force_arm(self.force_arm_enabled())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const MINIMAL: &str = r#"{"username": "owner", "password": "hunter2", "fingerprint": "ZnA="}"#;

    #[test]
    fn defaults() {
        let config = Config::from_json(MINIMAL).unwrap();
        assert_eq!(config.subdomain, Region::UnitedStates);
        assert_eq!(config.mode, Mode::Normal);
        assert!((config.speed - 1.0).abs() < f64::EPSILON);
        assert!(config.force_arm_enabled());
        assert_eq!(config.password.expose_secret(), "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn full_record() {
        let config = Config::from_json(
            r#"{
                "subdomain": "portal-ca",
                "username": "owner",
                "password": "hunter2",
                "fingerprint": "ZnA=",
                "mode": "paused",
                "speed": 0.5,
                "options": ["disableForceArm"],
                "sensors": [
                    {"adtName": "Front Door", "adtType": "doorWindow", "adtZone": 1},
                    {"name": "Hall", "adtName": "Hall Motion", "adtType": "motion", "adtZone": 7}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.subdomain, Region::Canada);
        assert_eq!(config.mode, Mode::Paused);
        assert!(!config.force_arm_enabled());
        assert_eq!(config.sensors[1].name.as_deref(), Some("Hall"));
        assert_eq!(config.sensors[1].adt_type, DeviceType::Motion);
        assert_eq!(config.credentials().region, Region::Canada);
    }

    #[test]
    fn rejects_bad_values() {
        let cases = [
            r#"{"username": "", "password": "p", "fingerprint": "f"}"#,
            r#"{"username": "u", "password": "p", "fingerprint": "f", "speed": 2.0}"#,
            r#"{"username": "u", "password": "p", "fingerprint": "f", "sensors": [{"adtName": "x", "adtType": "glass", "adtZone": 0}]}"#,
            r#"{"username": "u", "password": "p", "fingerprint": "f", "sensors": [{"adtName": "x", "adtType": "glass", "adtZone": 4}, {"adtName": "y", "adtType": "glass", "adtZone": 4}]}"#,
        ];
        for raw in cases {
            assert!(matches!(Config::from_json(raw), Err(ConfigError::Invalid(_))), "{raw}");
        }
        assert!(matches!(
            Config::from_json(r#"{"username": "u", "password": "p", "fingerprint": "f", "subdomain": "portal-eu"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn sensor_limit() {
        let sensors: Vec<_> = (0..=MAX_CONFIGURED_SENSORS)
            .map(|i| ConfiguredSensor {
                name: None,
                adt_name: format!("s{i}"),
                adt_type: DeviceType::Motion,
                adt_zone: 1,
            })
            .collect();
        let mut config = Config::from_json(MINIMAL).unwrap();
        config.sensors = sensors;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at most 148"));
    }

    #[test]
    fn from_file_reports_path() {
        let path = std::env::temp_dir().join(format!("pulse-portal-{}.json", ulid::Ulid::new()));
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Read { .. })));

        fs::write(&path, MINIMAL).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.username, "owner");
        let _ = fs::remove_file(&path);
    }
}
