use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{
    arm_state::{ArmState, PanelArmState},
    error::{Error, Result},
    region::Region,
};

/// Highest zone number a panel can assign.
pub const MAX_ZONE: u8 = 99;
/// Sensors a configuration may expose; two further slots are reserved by the panel.
pub const MAX_CONFIGURED_SENSORS: usize = 148;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PanelStatus {
    pub state: PanelArmState,
    /// Second orb sentence, e.g. `All Quiet` or `1 Sensor Open`.
    pub status: String,
    pub note: Option<String>,
    pub open_sensors: u32,
}

impl PanelStatus {
    #[must_use]
    pub fn is_alarm_active(&self) -> bool {
        self.state == PanelArmState::DisarmedWithAlarm
            || self.status.to_ascii_lowercase().contains("alarm")
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    DoorWindow,
    Glass,
    Motion,
    Smoke,
    CarbonMonoxide,
    Flood,
    Heat,
    Temperature,
    Unknown,
}

impl DeviceType {
    /// Classify the device-type column of the system page.
    #[must_use]
    pub fn from_portal_text(text: &str) -> Self {
        let text = text.to_ascii_lowercase();
        if text.contains("door") || text.contains("window") {
            Self::DoorWindow
        } else if text.contains("glass") {
            Self::Glass
        } else if text.contains("motion") {
            Self::Motion
        } else if text.contains("carbon monoxide") || text.contains("co detector") {
            Self::CarbonMonoxide
        } else if text.contains("smoke") || text.contains("fire") {
            Self::Smoke
        } else if text.contains("heat") || text.contains("rate-of-rise") {
            Self::Heat
        } else if text.contains("water") || text.contains("flood") {
            Self::Flood
        } else if text.contains("temp") {
            Self::Temperature
        } else {
            Self::Unknown
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Closed,
    Open,
    Motion,
    NoMotion,
    Okay,
    Tripped,
    Tamper,
    Trouble,
    LowBattery,
    Offline,
    Unknown,
}

/// A sensor as enumerated from the system page at sign-in.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SensorInfo {
    pub zone: u8,
    pub name: String,
    pub device_type: DeviceType,
    pub device_type_text: String,
}

/// Live sensor state read from the orb.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Sensor {
    pub zone: u8,
    pub name: String,
    pub device_type: DeviceType,
    pub icon: String,
    pub status_text: String,
    pub status: SensorStatus,
    pub online: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonKind {
    Arm,
    Disarm,
    ForceArm,
    ClearAlarm,
}

/// An arm/disarm button scraped from a page render, with its anti-forgery tokens.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OrbButton {
    pub label: String,
    pub kind: ButtonKind,
    /// Button target relative to `/myhome/<version>/`, entity-decoded.
    pub url: String,
    pub href: String,
    pub armstate: String,
    pub arm: String,
    pub sat: String,
    pub network_id: Option<String>,
    #[serde(skip)]
    pub(crate) region: Region,
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl OrbButton {
    #[must_use]
    pub fn origin(&self) -> Option<PanelArmState> {
        PanelArmState::from_wire(&self.armstate)
    }

    #[must_use]
    pub fn target(&self) -> Option<ArmState> {
        PanelArmState::from_wire(&self.arm).and_then(PanelArmState::settable)
    }

    #[must_use]
    pub fn is_force(&self) -> bool {
        self.kind == ButtonKind::ForceArm
    }

    #[must_use]
    pub fn matches(&self, from: PanelArmState, to: ArmState) -> bool {
        !self.is_force() && self.origin() == Some(from) && self.target() == Some(to)
    }
}

/// Buttons from a single render. They share region and exchange generation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OrbButtons {
    pub buttons: Vec<OrbButton>,
}

impl OrbButtons {
    /// The one button rendering `from -> to`.
    ///
    /// # Errors
    /// [`Error::NoMatchingButton`] when none matches, a format mismatch when several do.
    pub fn select(&self, from: PanelArmState, to: ArmState) -> Result<&OrbButton> {
        let mut matching = self.buttons.iter().filter(|button| button.matches(from, to));
        let first = matching.next().ok_or_else(|| Error::NoMatchingButton {
            from: from.to_string(),
            to: to.to_string(),
        })?;
        if matching.next().is_some() {
            return Err(Error::format(format!(
                "several buttons render the {from} -> {to} transition"
            )));
        }
        Ok(first)
    }

    #[must_use]
    pub fn force_arm(&self) -> Option<&OrbButton> {
        self.buttons.iter().find(|button| button.is_force())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct GatewayInformation {
    pub status: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub hardware_version: Option<String>,
    pub primary_connection_type: Option<String>,
    pub broadband_connection_status: Option<String>,
    pub cellular_connection_status: Option<String>,
    pub cellular_signal_strength: Option<String>,
    pub broadband_lan_ip: Option<String>,
    pub broadband_lan_mac: Option<String>,
    pub device_lan_ip: Option<String>,
    pub device_lan_mac: Option<String>,
    pub router_lan_ip: Option<String>,
    pub router_wan_ip: Option<String>,
    pub last_update: Option<String>,
    pub next_update: Option<String>,
}

impl GatewayInformation {
    pub(crate) fn from_details(details: &[(String, String)]) -> Self {
        let mut info = Self::default();
        for (label, value) in details {
            let value = Some(value.clone());
            match label.as_str() {
                "status" => info.status = value,
                "manufacturer" => info.manufacturer = value,
                "model" => info.model = value,
                "serial number" => info.serial_number = value,
                "firmware version" => info.firmware_version = value,
                "hardware version" => info.hardware_version = value,
                "primary connection type" => info.primary_connection_type = value,
                "broadband connection status" => info.broadband_connection_status = value,
                "cellular connection status" => info.cellular_connection_status = value,
                "cellular signal strength" => info.cellular_signal_strength = value,
                "broadband lan ip address" => info.broadband_lan_ip = value,
                "broadband lan mac" => info.broadband_lan_mac = value,
                "device lan ip address" => info.device_lan_ip = value,
                "device lan mac" => info.device_lan_mac = value,
                "router lan ip address" => info.router_lan_ip = value,
                "router wan ip address" => info.router_wan_ip = value,
                "last update" => info.last_update = value,
                "next update" => info.next_update = value,
                _ => {}
            }
        }
        info
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct PanelInformation {
    pub status: Option<String>,
    pub manufacturer_provider: Option<String>,
    pub type_model: Option<String>,
    pub emergency_keys: Option<String>,
}

impl PanelInformation {
    pub(crate) fn from_details(details: &[(String, String)]) -> Self {
        let mut info = Self::default();
        for (label, value) in details {
            let value = Some(value.clone());
            match label.as_str() {
                "status" => info.status = value,
                "manufacturer/provider" | "manufacturer" => info.manufacturer_provider = value,
                "type/model" | "type" => info.type_model = value,
                "emergency keys" => info.emergency_keys = value,
                _ => {}
            }
        }
        info
    }
}

/// Three-part event counter returned by the sync check endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct SyncCode(pub u64, pub u64, pub u64);

impl FromStr for SyncCode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let mut parts = value.trim().split('-').map(str::parse::<u64>);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(Ok(a)), Some(Ok(b)), Some(Ok(c)), None) => Ok(Self(a, b, c)),
            _ => Err(Error::format(format!("sync code {value:?}"))),
        }
    }
}

impl fmt::Display for SyncCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.0, self.1, self.2)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct SyncCheck {
    pub code: SyncCode,
    /// True when the code differs from the previously observed one.
    pub changed: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ArmOutcome {
    pub from: PanelArmState,
    pub to: ArmState,
    pub already_set: bool,
    pub forced: bool,
    pub alarm_cleared: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SessionInfo {
    pub region: Region,
    pub version: Option<String>,
    pub network_id: Option<String>,
    pub authenticated: bool,
    pub last_activity: Option<DateTime<Utc>>,
}
