//! Region hosts and the portal build-version allow-list.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use super::error::{Error, Result};

/// Portal builds whose markup the extractor understands.
pub const SUPPORTED_VERSIONS: &[&str] = &[
    "27.0.0-151",
    "27.0.0-140",
    "26.0.0-32",
    "25.0.0-21",
    "24.0.0-117",
];

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Region {
    #[default]
    #[serde(rename = "portal")]
    UnitedStates,
    #[serde(rename = "portal-ca")]
    Canada,
}

impl Region {
    #[must_use]
    pub fn subdomain(self) -> &'static str {
        match self {
            Self::UnitedStates => "portal",
            Self::Canada => "portal-ca",
        }
    }

    #[must_use]
    pub fn from_subdomain(value: &str) -> Option<Self> {
        match value.trim() {
            "portal" => Some(Self::UnitedStates),
            "portal-ca" => Some(Self::Canada),
            _ => None,
        }
    }

    /// # Errors
    /// Returns an error if the host string cannot be parsed as a URL.
    pub fn base_url(self) -> Result<Url> {
        Url::parse(&format!("https://{}.adtpulse.com", self.subdomain()))
            .map_err(|e| Error::InvalidInput(format!("region base URL: {e}")))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subdomain())
    }
}

/// A portal build version taken from the allow-list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortalVersion(&'static str);

impl PortalVersion {
    /// # Errors
    /// Returns [`Error::UnsupportedVersion`] for builds outside [`SUPPORTED_VERSIONS`].
    pub fn parse(value: &str) -> Result<Self> {
        SUPPORTED_VERSIONS
            .iter()
            .find(|supported| **supported == value)
            .map(|supported| Self(*supported))
            .ok_or_else(|| Error::UnsupportedVersion(value.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Prefix a portal-relative path with `/myhome/<version>/`.
    #[must_use]
    pub fn path(&self, relative: &str) -> String {
        format!("/myhome/{}/{}", self.0, relative.trim_start_matches('/'))
    }
}

impl fmt::Display for PortalVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
