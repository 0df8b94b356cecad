//! Token and state recovery from portal markup.
//!
//! Every pattern the client relies on lives here, compiled once per
//! [`Extractor`]. Methods never fail: a missing match is `None` or an empty
//! list, and callers decide whether that means the portal changed.

use regex::Regex;
use std::collections::HashSet;

use super::{
    arm_state::PanelArmState,
    auth::MfaDescriptor,
    models::{ButtonKind, DeviceType, MAX_ZONE, OrbButton, PanelStatus, SensorInfo, SyncCode},
    region::Region,
};

/// A sensor row as rendered in the orb, before status mapping.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrbSensorRow {
    pub zone: u8,
    pub name: String,
    pub icon: String,
    pub status_text: String,
}

#[derive(Debug)]
pub struct Extractor {
    version: Regex,
    signin_warning: Regex,
    network_id: Regex,
    mfa_descriptor: Regex,
    input_tag: Regex,
    set_arm_state: Regex,
    value_attr: Regex,
    orb_summary: Regex,
    open_sensors: Regex,
    list_row: Regex,
    cell: Regex,
    icon: Regex,
    device_name: Regex,
    zone: Regex,
    detail_row: Regex,
    tag: Regex,
    whitespace: Regex,
}

impl Extractor {
    /// # Errors
    /// Returns an error if a built-in pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            version: Regex::new(r"/myhome/(?P<version>\d+\.\d+\.\d+-\d+)/")?,
            signin_warning: Regex::new(r#"(?s)class="p_signinWarning"[^>]*>(?P<message>.*?)</div>"#)?,
            network_id: Regex::new(r"networkid=(?P<id>[A-Za-z0-9_-]+)")?,
            mfa_descriptor: Regex::new(r"(?s)var\s+mfaDescriptor\s*=\s*(?P<json>\{.*?\})\s*;")?,
            input_tag: Regex::new(r"(?s)<input\b[^>]*>")?,
            set_arm_state: Regex::new(r#"onclick="setArmState\('(?P<url>[^']+)'"#)?,
            value_attr: Regex::new(r#"\bvalue="(?P<label>[^"]*)""#)?,
            orb_summary: Regex::new(r#"(?s)id="divOrbTextSummary"[^>]*>(?P<body>.*?)</div>"#)?,
            open_sensors: Regex::new(r"(?i)(?P<count>\d+)\s+sensors?\s+open")?,
            list_row: Regex::new(r#"(?s)<tr[^>]*class="p_listRow"[^>]*>(?P<row>.*?)</tr>"#)?,
            cell: Regex::new(r"(?s)<td[^>]*>(?P<cell>.*?)</td>")?,
            icon: Regex::new(r#"icon="(?P<icon>devStat\w+)""#)?,
            device_name: Regex::new(r#"(?s)class="p_deviceNameText"[^>]*>(?P<name>.*?)</a>"#)?,
            zone: Regex::new(r"Zone(?:\s|&nbsp;)*(?P<zone>\d+)")?,
            detail_row: Regex::new(
                r#"(?s)<td[^>]*class="InputFieldDescriptionL"[^>]*>(?P<label>.*?)</td>\s*<td[^>]*>(?P<value>.*?)</td>"#,
            )?,
            tag: Regex::new(r"(?s)<[^>]*>")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    /// Portal build embedded in a URL or path, not yet checked against the allow-list.
    #[must_use]
    pub fn version<'a>(&self, path: &'a str) -> Option<&'a str> {
        self.version
            .captures(path)
            .and_then(|caps| caps.name("version"))
            .map(|version| version.as_str())
    }

    #[must_use]
    pub fn signin_warning(&self, html: &str) -> Option<String> {
        self.signin_warning
            .captures(html)
            .and_then(|caps| caps.name("message"))
            .map(|message| self.text(message.as_str()))
            .filter(|message| !message.is_empty())
    }

    #[must_use]
    pub fn network_id(&self, html: &str) -> Option<String> {
        self.network_id
            .captures(html)
            .and_then(|caps| caps.name("id"))
            .map(|id| id.as_str().to_string())
    }

    #[must_use]
    pub fn mfa_descriptor(&self, html: &str) -> Option<MfaDescriptor> {
        let json = self.mfa_descriptor.captures(html)?.name("json")?.as_str();
        serde_json::from_str(json).ok()
    }

    /// Arm/disarm buttons carrying a complete token group.
    #[must_use]
    pub fn buttons(&self, html: &str, region: Region, generation: u64) -> Vec<OrbButton> {
        self.input_tag
            .find_iter(html)
            .filter_map(|tag| self.button(tag.as_str(), region, generation))
            .collect()
    }

    fn button(&self, tag: &str, region: Region, generation: u64) -> Option<OrbButton> {
        let url = decode_entities(self.set_arm_state.captures(tag)?.name("url")?.as_str());
        let label = self
            .value_attr
            .captures(tag)
            .and_then(|caps| caps.name("label"))
            .map(|label| self.text(label.as_str()))
            .unwrap_or_default();

        let param = |key: &str| query_param(&url, key);
        let href = param("href")?;
        let armstate = param("armstate")?;
        let arm = param("arm")?;
        let sat = param("sat")?;
        let network_id = param("networkid");

        let kind = if href.ends_with("setForceArm") || armstate.eq_ignore_ascii_case("forcearm") {
            ButtonKind::ForceArm
        } else if href.ends_with("setCancelAlarm") {
            ButtonKind::ClearAlarm
        } else if PanelArmState::from_wire(&arm) == Some(PanelArmState::Off) {
            ButtonKind::Disarm
        } else {
            ButtonKind::Arm
        };

        Some(OrbButton {
            label,
            kind,
            url,
            href,
            armstate,
            arm,
            sat,
            network_id,
            region,
            generation,
        })
    }

    /// State, status and note from the orb summary.
    #[must_use]
    pub fn panel_status(&self, html: &str) -> Option<PanelStatus> {
        let body = self.orb_summary.captures(html)?.name("body")?.as_str();
        let text = self.text(body);
        let mut sentences = text
            .split('.')
            .map(str::trim)
            .filter(|sentence| !sentence.is_empty());

        let state_text = sentences.next()?.to_string();
        let status = sentences.next().unwrap_or_default().to_string();
        let note = sentences.collect::<Vec<_>>().join(". ");

        Some(PanelStatus {
            state: PanelArmState::from_orb_text(&state_text, &status),
            open_sensors: self.open_sensor_count(&status),
            status,
            note: (!note.is_empty()).then_some(note),
        })
    }

    #[must_use]
    pub fn open_sensor_count(&self, status: &str) -> u32 {
        self.open_sensors
            .captures(status)
            .and_then(|caps| caps.name("count"))
            .and_then(|count| count.as_str().parse().ok())
            .unwrap_or(0)
    }

    /// Sensor rows rendered by the orb, icon and status text included.
    #[must_use]
    pub fn orb_sensors(&self, html: &str) -> Vec<OrbSensorRow> {
        let section = html
            .find(r#"id="orbSensorsList""#)
            .map_or(html, |start| &html[start..]);

        let mut seen = HashSet::new();
        self.rows(section)
            .filter_map(|row| {
                let zone = self.row_zone(row)?;
                let name = self.row_name(row)?;
                let icon = self.icon.captures(row)?.name("icon")?.as_str().to_string();
                let status_text = self.last_cell(row)?;
                Some(OrbSensorRow {
                    zone,
                    name,
                    icon,
                    status_text,
                })
            })
            .filter(|row| seen.insert(row.zone))
            .collect()
    }

    /// Sensors listed on the system page with their device type.
    #[must_use]
    pub fn system_sensors(&self, html: &str) -> Vec<SensorInfo> {
        let mut seen = HashSet::new();
        self.rows(html)
            .filter_map(|row| {
                let zone = self.row_zone(row)?;
                let name = self.row_name(row)?;
                let device_type_text = self.last_cell(row)?;
                Some(SensorInfo {
                    zone,
                    name,
                    device_type: DeviceType::from_portal_text(&device_type_text),
                    device_type_text,
                })
            })
            .filter(|sensor| seen.insert(sensor.zone))
            .collect()
    }

    /// Label/value pairs from a details table; labels lowercased without the trailing colon.
    #[must_use]
    pub fn details(&self, html: &str) -> Vec<(String, String)> {
        self.detail_row
            .captures_iter(html)
            .filter_map(|caps| {
                let label = self.text(caps.name("label")?.as_str());
                let label = label.trim_end_matches(':').trim().to_ascii_lowercase();
                let value = self.text(caps.name("value")?.as_str());
                (!label.is_empty() && !value.is_empty()).then_some((label, value))
            })
            .collect()
    }

    #[must_use]
    pub fn sync_code(&self, body: &str) -> Option<SyncCode> {
        body.parse().ok()
    }

    /// Visible text of a fragment: tags dropped, entities decoded, whitespace collapsed.
    #[must_use]
    pub fn text(&self, fragment: &str) -> String {
        let stripped = self.tag.replace_all(fragment, " ");
        let decoded = decode_entities(&stripped);
        self.whitespace.replace_all(&decoded, " ").trim().to_string()
    }

    fn rows<'a>(&'a self, html: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.list_row
            .captures_iter(html)
            .filter_map(|caps| caps.name("row").map(|row| row.as_str()))
    }

    fn row_zone(&self, row: &str) -> Option<u8> {
        let zone: u8 = self.zone.captures(row)?.name("zone")?.as_str().parse().ok()?;
        (1..=MAX_ZONE).contains(&zone).then_some(zone)
    }

    fn row_name(&self, row: &str) -> Option<String> {
        let name = self.text(self.device_name.captures(row)?.name("name")?.as_str());
        (!name.is_empty()).then_some(name)
    }

    fn last_cell(&self, row: &str) -> Option<String> {
        self.cell
            .captures_iter(row)
            .filter_map(|caps| caps.name("cell"))
            .last()
            .map(|cell| self.text(cell.as_str()))
            .filter(|text| !text.is_empty())
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

// Values stay exactly as rendered; `+` is part of the wire vocabulary.
fn query_param(url: &str, key: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == key)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::portal::auth::MethodType;

    const ORB: &str = r#"
<div id="divOrb">
  <div id="divOrbTextSummary" class="p_armedHeader"><span class="p_boldNormalTextLarge">Disarmed.&nbsp;</span><span>1 Sensor Open.</span>&nbsp;</div>
  <div id="divOrbSecurityButtons">
    <input type="button" class="p_armDisarmWideButton" onclick="setArmState('quickcontrol/armDisarm.jsp?href=rest/adt/ui/client/security/setArmState&amp;armstate=off&amp;arm=away&amp;sat=5d1f&amp;networkid=NET1','Arming Away')" value="Arm Away" id="security_button_1">
    <input type="button" class="p_armDisarmWideButton" onclick="setArmState('quickcontrol/armDisarm.jsp?href=rest/adt/ui/client/security/setArmState&amp;armstate=off&amp;arm=night+stay&amp;sat=5d1f&amp;networkid=NET1','Arming Night')" value="Arm Night" id="security_button_2">
    <input type="button" class="p_armDisarmWideButton" value="Arming..." disabled>
  </div>
  <table id="orbSensorsList">
    <tr class="p_listRow"><td><canvas class="p_ic_icon_device" icon="devStatOpen"></canvas></td><td><a class="p_deviceNameText" href="javascript:void(0)">Front Door&nbsp;</a></td><td><span class="p_grayNormalText">Zone&nbsp;1</span></td><td>Open&nbsp;</td></tr>
    <tr class="p_listRow"><td><canvas class="p_ic_icon_device" icon="devStatOK"></canvas></td><td><a class="p_deviceNameText" href="javascript:void(0)">Hall Motion</a></td><td><span class="p_grayNormalText">Zone&nbsp;7</span></td><td>No Motion</td></tr>
    <tr class="p_listRow"><td><canvas class="p_ic_icon_device" icon="devStatOK"></canvas></td><td><a class="p_deviceNameText">Keypad</a></td><td></td><td>Okay</td></tr>
  </table>
</div>"#;

    #[test]
    fn version_from_path() {
        let extractor = Extractor::new().unwrap();
        assert_eq!(
            extractor.version("https://portal.adtpulse.com/myhome/27.0.0-140/access/signin.jsp"),
            Some("27.0.0-140")
        );
        assert_eq!(extractor.version("/access/signin.jsp"), None);
    }

    #[test]
    fn buttons_keep_raw_tokens() {
        let extractor = Extractor::new().unwrap();
        let buttons = extractor.buttons(ORB, Region::UnitedStates, 4);
        assert_eq!(buttons.len(), 2);

        let night = &buttons[1];
        assert_eq!(night.label, "Arm Night");
        assert_eq!(night.arm, "night+stay");
        assert_eq!(night.armstate, "off");
        assert_eq!(night.sat, "5d1f");
        assert_eq!(night.network_id.as_deref(), Some("NET1"));
        assert_eq!(night.kind, ButtonKind::Arm);
        assert_eq!(night.generation, 4);
        assert!(night.url.starts_with("quickcontrol/armDisarm.jsp?href="));
        assert!(!night.url.contains("&amp;"));
    }

    #[test]
    fn markup_without_tokens_yields_nothing() {
        let extractor = Extractor::new().unwrap();
        assert!(extractor.buttons("<html><body>maintenance</body></html>", Region::Canada, 0).is_empty());
        assert!(extractor.panel_status("<html></html>").is_none());
        assert!(extractor.orb_sensors("").is_empty());
        assert!(extractor.mfa_descriptor("<script>var other = {};</script>").is_none());
    }

    #[test]
    fn force_arm_and_clear_alarm_kinds() {
        let extractor = Extractor::new().unwrap();
        let html = r#"
<input type="button" onclick="setArmState('quickcontrol/armDisarm.jsp?href=rest/adt/ui/client/security/setForceArm&amp;armstate=forcearm&amp;arm=away&amp;sat=99','Arming')" value="Arm Anyway">
<input type="button" onclick="setArmState('quickcontrol/armDisarm.jsp?href=rest/adt/ui/client/security/setCancelAlarm&amp;armstate=disarmed+with+alarm&amp;arm=off&amp;sat=99','Clearing')" value="Clear Alarm">
<input type="button" onclick="setArmState('quickcontrol/armDisarm.jsp?href=rest/adt/ui/client/security/setArmState&amp;armstate=away&amp;arm=off&amp;sat=99','Disarming')" value="Disarm">"#;
        let kinds: Vec<_> = extractor
            .buttons(html, Region::UnitedStates, 0)
            .iter()
            .map(|button| button.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ButtonKind::ForceArm, ButtonKind::ClearAlarm, ButtonKind::Disarm]
        );
    }

    #[test]
    fn orb_summary_and_sensors() {
        let extractor = Extractor::new().unwrap();
        let status = extractor.panel_status(ORB).unwrap();
        assert_eq!(status.state, PanelArmState::Off);
        assert_eq!(status.status, "1 Sensor Open");
        assert_eq!(status.open_sensors, 1);
        assert_eq!(status.note, None);

        let rows = extractor.orb_sensors(ORB);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].zone, 1);
        assert_eq!(rows[0].name, "Front Door");
        assert_eq!(rows[0].icon, "devStatOpen");
        assert_eq!(rows[0].status_text, "Open");
        assert_eq!(rows[1].status_text, "No Motion");
    }

    #[test]
    fn system_sensors_skip_zoneless_and_duplicate_rows() {
        let extractor = Extractor::new().unwrap();
        let html = r#"
<tr class="p_listRow" onclick="goToUrl('device.jsp?id=1');"><td><a class="p_deviceNameText">Security Panel</a></td><td></td><td>Security Panel</td></tr>
<tr class="p_listRow" onclick="goToUrl('device.jsp?id=2');"><td><a class="p_deviceNameText">Front Door</a></td><td>Zone&nbsp;1</td><td>Door/Window Sensor</td></tr>
<tr class="p_listRow" onclick="goToUrl('device.jsp?id=3');"><td><a class="p_deviceNameText">Copy</a></td><td>Zone&nbsp;1</td><td>Door/Window Sensor</td></tr>
<tr class="p_listRow" onclick="goToUrl('device.jsp?id=4');"><td><a class="p_deviceNameText">Smoke</a></td><td>Zone 12</td><td>Fire (Smoke/Heat) Detector</td></tr>
<tr class="p_listRow" onclick="goToUrl('device.jsp?id=5');"><td><a class="p_deviceNameText">Bogus</a></td><td>Zone 150</td><td>Motion Sensor</td></tr>"#;
        let sensors = extractor.system_sensors(html);
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].name, "Front Door");
        assert_eq!(sensors[0].device_type, DeviceType::DoorWindow);
        assert_eq!(sensors[1].zone, 12);
        assert_eq!(sensors[1].device_type, DeviceType::Smoke);
    }

    #[test]
    fn mfa_descriptor_from_script() {
        let extractor = Extractor::new().unwrap();
        let html = r#"<script>
var mfaDescriptor = {"enabled": true, "methods": [{"id": "sms-1", "type": "SMS", "label": "Phone"}, {"id": "em-1", "type": "EMAIL", "label": "Mail"}]};
</script>"#;
        let descriptor = extractor.mfa_descriptor(html).unwrap();
        assert!(descriptor.enabled);
        assert_eq!(descriptor.methods.len(), 2);
        assert_eq!(descriptor.methods[0].method_type, MethodType::Sms);
        assert_eq!(descriptor.methods[1].label, "Mail");
    }

    #[test]
    fn details_and_misc() {
        let extractor = Extractor::new().unwrap();
        let html = r#"<table>
<tr><td class="InputFieldDescriptionL">Manufacturer:</td><td class="InputFieldValueL">ADT&nbsp;Pulse Gateway</td></tr>
<tr><td class="InputFieldDescriptionL">Model:</td>
    <td class="InputFieldValueL">PGZNG1</td></tr>
<tr><td class="InputFieldDescriptionL">Next Update:</td><td class="InputFieldValueL"></td></tr>
</table>"#;
        assert_eq!(
            extractor.details(html),
            vec![
                ("manufacturer".to_string(), "ADT Pulse Gateway".to_string()),
                ("model".to_string(), "PGZNG1".to_string()),
            ]
        );
        assert_eq!(
            extractor.signin_warning(r#"<div class="p_signinWarning">Invalid&nbsp;username.</div>"#),
            Some("Invalid username.".to_string())
        );
        assert_eq!(
            extractor.network_id("signout.jsp?networkid=AbC_12&partner=adt"),
            Some("AbC_12".to_string())
        );
        assert_eq!(extractor.sync_code(" 3-1-0\n"), Some(SyncCode(3, 1, 0)));
    }
}
