//! Translation between canonical arm states and the portal's wire vocabulary.
//!
//! Outbound commands only ever target one of [`ArmState`]. What the portal
//! reports back is wider: a panel can be disarmed while an alarm is still
//! latched, and some builds render states the client does not understand.

use serde::{Deserialize, Serialize};
use std::fmt;

/// States a command can request.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmState {
    Away,
    Night,
    Stay,
    Off,
}

impl ArmState {
    pub const ALL: [Self; 4] = [Self::Away, Self::Night, Self::Stay, Self::Off];

    /// Wire value used in `arm=` / `armstate=` query parameters.
    #[must_use]
    pub fn to_wire(self) -> &'static str {
        match self {
            Self::Away => "away",
            Self::Night => "night+stay",
            Self::Stay => "stay",
            Self::Off => "off",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Away => "away",
            Self::Night => "night",
            Self::Stay => "stay",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States the portal can report.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelArmState {
    Away,
    Night,
    Stay,
    Off,
    DisarmedWithAlarm,
    Unknown,
}

impl PanelArmState {
    /// Parse a wire value. `+` and space are interchangeable since the portal
    /// renders these inside query strings.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(' ', "+");
        match normalized.as_str() {
            "away" => Some(Self::Away),
            "night+stay" | "night" => Some(Self::Night),
            "stay" => Some(Self::Stay),
            "off" | "disarmed" => Some(Self::Off),
            "disarmed+with+alarm" | "disarmed_with_alarm" => Some(Self::DisarmedWithAlarm),
            _ => None,
        }
    }

    /// Interpret the orb summary, e.g. `Armed Away` / `1 Sensor Open`.
    #[must_use]
    pub fn from_orb_text(state: &str, status: &str) -> Self {
        let state = state.trim().to_ascii_lowercase();
        let alarm = status.to_ascii_lowercase().contains("alarm");
        match state.as_str() {
            "armed away" => Self::Away,
            "armed stay" => Self::Stay,
            "armed night" => Self::Night,
            "disarmed" if alarm => Self::DisarmedWithAlarm,
            "disarmed" => Self::Off,
            _ => Self::Unknown,
        }
    }

    /// The settable state this corresponds to, if any.
    #[must_use]
    pub fn settable(self) -> Option<ArmState> {
        match self {
            Self::Away => Some(ArmState::Away),
            Self::Night => Some(ArmState::Night),
            Self::Stay => Some(ArmState::Stay),
            Self::Off => Some(ArmState::Off),
            Self::DisarmedWithAlarm | Self::Unknown => None,
        }
    }

    #[must_use]
    pub fn is_armed(self) -> bool {
        matches!(self, Self::Away | Self::Night | Self::Stay)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Away => "away",
            Self::Night => "night",
            Self::Stay => "stay",
            Self::Off => "off",
            Self::DisarmedWithAlarm => "disarmed_with_alarm",
            Self::Unknown => "unknown",
        }
    }
}

impl From<ArmState> for PanelArmState {
    fn from(state: ArmState) -> Self {
        match state {
            ArmState::Away => Self::Away,
            ArmState::Night => Self::Night,
            ArmState::Stay => Self::Stay,
            ArmState::Off => Self::Off,
        }
    }
}

impl fmt::Display for PanelArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a requested transition needs from the portal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
    /// The panel already holds the requested state.
    NoOp,
    /// A single arm or disarm button.
    Plain,
    /// Armed in another mode: the orb only offers Disarm, then the arm button.
    Rearm,
    /// Disarm (when still armed) followed by the Clear Alarm command.
    CancelAlarm { disarm_first: bool },
}

/// Decide how to move from `current` to `target`.
///
/// `is_alarm_active` cannot override a plain `Off`: the orb renders a latched
/// alarm as its own state.
#[must_use]
pub fn plan(current: PanelArmState, target: ArmState, is_alarm_active: bool) -> Transition {
    let alarm_latched = current == PanelArmState::DisarmedWithAlarm
        || (is_alarm_active && current != PanelArmState::Off);
    if target == ArmState::Off && alarm_latched {
        return Transition::CancelAlarm {
            disarm_first: current.is_armed(),
        };
    }
    if current.settable() == Some(target) {
        Transition::NoOp
    } else if current.is_armed() && target != ArmState::Off {
        Transition::Rearm
    } else {
        Transition::Plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_dirty_clean_is_identity() {
        for state in ArmState::ALL {
            let back = PanelArmState::from_wire(state.to_wire()).and_then(PanelArmState::settable);
            assert_eq!(back, Some(state), "{state} did not survive the wire");
        }
    }

    #[test]
    fn inbound_vocabulary_is_wider() {
        assert_eq!(
            PanelArmState::from_wire("disarmed+with+alarm"),
            Some(PanelArmState::DisarmedWithAlarm)
        );
        assert_eq!(PanelArmState::from_wire("night stay"), Some(PanelArmState::Night));
        assert_eq!(PanelArmState::from_wire("disarmed"), Some(PanelArmState::Off));
        assert_eq!(PanelArmState::from_wire("forcearm"), None);
        assert_eq!(PanelArmState::DisarmedWithAlarm.settable(), None);
    }

    #[test]
    fn orb_text() {
        assert_eq!(
            PanelArmState::from_orb_text("Armed Away", "All Quiet"),
            PanelArmState::Away
        );
        assert_eq!(
            PanelArmState::from_orb_text("Disarmed", "1 Sensor Open"),
            PanelArmState::Off
        );
        assert_eq!(
            PanelArmState::from_orb_text("Disarmed", "Uncleared Alarm"),
            PanelArmState::DisarmedWithAlarm
        );
        assert_eq!(
            PanelArmState::from_orb_text("Status Unavailable", ""),
            PanelArmState::Unknown
        );
    }

    #[test]
    fn planning() {
        assert_eq!(plan(PanelArmState::Away, ArmState::Away, false), Transition::NoOp);
        assert_eq!(plan(PanelArmState::Off, ArmState::Away, false), Transition::Plain);
        assert_eq!(
            plan(PanelArmState::Away, ArmState::Off, true),
            Transition::CancelAlarm { disarm_first: true }
        );
        assert_eq!(
            plan(PanelArmState::DisarmedWithAlarm, ArmState::Off, false),
            Transition::CancelAlarm {
                disarm_first: false
            }
        );
        assert_eq!(plan(PanelArmState::Unknown, ArmState::Stay, false), Transition::Plain);
        assert_eq!(plan(PanelArmState::Away, ArmState::Off, false), Transition::Plain);
    }

    #[test]
    fn stale_alarm_flag_on_a_quiet_panel_is_a_noop() {
        assert_eq!(plan(PanelArmState::Off, ArmState::Off, true), Transition::NoOp);
        assert_eq!(plan(PanelArmState::Off, ArmState::Stay, true), Transition::Plain);
    }

    #[test]
    fn armed_to_other_mode_goes_through_disarm() {
        assert_eq!(plan(PanelArmState::Away, ArmState::Stay, false), Transition::Rearm);
        assert_eq!(plan(PanelArmState::Night, ArmState::Away, false), Transition::Rearm);
        assert_eq!(plan(PanelArmState::Stay, ArmState::Stay, false), Transition::NoOp);
    }
}
