//! Fixed lookup from the orb's (icon, text) pair to a canonical sensor status.

use super::models::{DeviceType, SensorStatus};

/// Icons that describe the device rather than what it senses.
const OFFLINE_ICONS: &[&str] = &["devStatOffline", "devStatUnknown"];

/// `(device type, icon, status text, canonical status)`, compared case-insensitively.
const TABLE: &[(DeviceType, &str, &str, SensorStatus)] = &[
    (DeviceType::DoorWindow, "devStatOK", "closed", SensorStatus::Closed),
    (DeviceType::DoorWindow, "devStatOpen", "open", SensorStatus::Open),
    (DeviceType::DoorWindow, "devStatAlarm", "open", SensorStatus::Open),
    (DeviceType::Glass, "devStatOK", "okay", SensorStatus::Okay),
    (DeviceType::Glass, "devStatOK", "no activity", SensorStatus::Okay),
    (DeviceType::Glass, "devStatTamper", "tripped", SensorStatus::Tripped),
    (DeviceType::Glass, "devStatAlarm", "tripped", SensorStatus::Tripped),
    (DeviceType::Motion, "devStatOK", "no motion", SensorStatus::NoMotion),
    (DeviceType::Motion, "devStatMotion", "motion", SensorStatus::Motion),
    (DeviceType::Motion, "devStatAlarm", "motion", SensorStatus::Motion),
    (DeviceType::Smoke, "devStatOK", "okay", SensorStatus::Okay),
    (DeviceType::Smoke, "devStatAlarm", "tripped", SensorStatus::Tripped),
    (DeviceType::CarbonMonoxide, "devStatOK", "okay", SensorStatus::Okay),
    (DeviceType::CarbonMonoxide, "devStatAlarm", "tripped", SensorStatus::Tripped),
    (DeviceType::Flood, "devStatOK", "okay", SensorStatus::Okay),
    (DeviceType::Flood, "devStatAlarm", "tripped", SensorStatus::Tripped),
    (DeviceType::Heat, "devStatOK", "okay", SensorStatus::Okay),
    (DeviceType::Heat, "devStatAlarm", "tripped", SensorStatus::Tripped),
    (DeviceType::Temperature, "devStatOK", "okay", SensorStatus::Okay),
    (DeviceType::Temperature, "devStatAlarm", "tripped", SensorStatus::Tripped),
];

/// Map what the orb rendered to a status for the given device type.
#[must_use]
pub fn lookup(device_type: DeviceType, icon: &str, text: &str) -> SensorStatus {
    let text = normalize(text);

    if let Some((_, _, _, status)) = TABLE.iter().find(|(kind, table_icon, table_text, _)| {
        *kind == device_type && table_icon.eq_ignore_ascii_case(icon) && *table_text == text
    }) {
        return *status;
    }

    // device-level conditions apply to every type
    match icon {
        "devStatTamper" => SensorStatus::Tamper,
        "devStatLowBatt" => SensorStatus::LowBattery,
        "devStatTrouble" => SensorStatus::Trouble,
        _ if is_offline(icon) => SensorStatus::Offline,
        _ => fallback(&text),
    }
}

#[must_use]
pub fn is_offline(icon: &str) -> bool {
    OFFLINE_ICONS.iter().any(|offline| offline.eq_ignore_ascii_case(icon))
}

// Unknown device type: trust the text alone.
fn fallback(text: &str) -> SensorStatus {
    match text {
        "closed" => SensorStatus::Closed,
        "open" => SensorStatus::Open,
        "no motion" => SensorStatus::NoMotion,
        "motion" => SensorStatus::Motion,
        "okay" | "no activity" => SensorStatus::Okay,
        "tripped" => SensorStatus::Tripped,
        _ => SensorStatus::Unknown,
    }
}

fn normalize(text: &str) -> String {
    let text = text.trim().to_ascii_lowercase();
    // "ALARM, Open" keeps only the condition
    text.rsplit(',').next().unwrap_or_default().trim().to_string()
}
