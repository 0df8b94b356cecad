#![allow(dead_code)]

use anyhow::{Result, anyhow};
use pulse_portal::portal::{
    Credentials, Portal, PortalOptions, Region, RejectReason, Response, RetryPolicy,
};
use secrecy::SecretString;
use std::net::TcpListener;
use tokio::time::Duration;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const VERSION: &str = "27.0.0-140";
pub const FINGERPRINT: &str = "eyJicm93c2VyIjoiZmlyZWZveCJ9";

pub const SIGNIN_HTML: &str = r#"<html><body><form id="signin" method="post"><input name="usernameForm"></form></body></html>"#;

pub const SIGNIN_REJECTED_HTML: &str = r#"<html><body>
<div class="p_signinWarning">Sign In unsuccessful. Your username or password is incorrect.</div>
</body></html>"#;

pub const SUMMARY_HTML: &str = r#"<html><body>
<div id="divOrb">loading</div>
<a href="/myhome/27.0.0-140/access/signout.jsp?networkid=NET1&partner=adt" class="p_signoutlink">Sign Out</a>
</body></html>"#;

pub const SYSTEM_HTML: &str = r#"<html><body><table>
<tr class="p_listRow" onclick="goToUrl('device.jsp?id=1');"><td><a class="p_deviceNameText">Security Panel</a></td><td></td><td>Security Panel</td></tr>
<tr class="p_listRow" onclick="goToUrl('device.jsp?id=2');"><td><a class="p_deviceNameText">Front Door</a></td><td>Zone&nbsp;1</td><td>Door/Window Sensor</td></tr>
<tr class="p_listRow" onclick="goToUrl('device.jsp?id=3');"><td><a class="p_deviceNameText">Hall Motion</a></td><td>Zone&nbsp;7</td><td>Motion Sensor</td></tr>
</table></body></html>"#;

pub const MFA_HTML: &str = r#"<html><head><script>
var mfaDescriptor = {"enabled": true, "methods": [{"id": "sms-1", "type": "SMS", "label": "Phone"}]};
</script></head><body>Verify it's you</body></html>"#;

pub const ORB_DISARMED_OPEN: &str = r#"
<div id="divOrb">
  <div id="divOrbTextSummary" class="p_armedHeader"><span class="p_boldNormalTextLarge">Disarmed.&nbsp;</span><span>1 Sensor Open.</span>&nbsp;</div>
  <div id="divOrbSecurityButtons">
    <input type="button" onclick="setArmState('quickcontrol/armDisarm.jsp?href=rest/adt/ui/client/security/setArmState&amp;armstate=off&amp;arm=away&amp;sat=5d1f&amp;networkid=NET1','Arming Away')" value="Arm Away">
    <input type="button" onclick="setArmState('quickcontrol/armDisarm.jsp?href=rest/adt/ui/client/security/setArmState&amp;armstate=off&amp;arm=stay&amp;sat=5d1f&amp;networkid=NET1','Arming Stay')" value="Arm Stay">
    <input type="button" onclick="setArmState('quickcontrol/armDisarm.jsp?href=rest/adt/ui/client/security/setArmState&amp;armstate=off&amp;arm=night+stay&amp;sat=5d1f&amp;networkid=NET1','Arming Night')" value="Arm Night">
  </div>
  <table id="orbSensorsList">
    <tr class="p_listRow"><td><canvas class="p_ic_icon_device" icon="devStatOpen"></canvas></td><td><a class="p_deviceNameText">Front Door</a></td><td><span>Zone&nbsp;1</span></td><td>Open</td></tr>
    <tr class="p_listRow"><td><canvas class="p_ic_icon_device" icon="devStatOK"></canvas></td><td><a class="p_deviceNameText">Hall Motion</a></td><td><span>Zone&nbsp;7</span></td><td>No Motion</td></tr>
  </table>
</div>"#;

pub const ORB_ARMED_AWAY: &str = r#"
<div id="divOrb">
  <div id="divOrbTextSummary"><span>Armed Away.</span> <span>All Quiet.</span></div>
  <div id="divOrbSecurityButtons">
    <input type="button" onclick="setArmState('quickcontrol/armDisarm.jsp?href=rest/adt/ui/client/security/setArmState&amp;armstate=away&amp;arm=off&amp;sat=71aa&amp;networkid=NET1','Disarming')" value="Disarm">
  </div>
</div>"#;

pub const ORB_ALARM: &str = r#"
<div id="divOrb">
  <div id="divOrbTextSummary"><span>Disarmed.</span> <span>Uncleared Alarm.</span></div>
  <div id="divOrbSecurityButtons">
    <input type="button" onclick="setArmState('quickcontrol/armDisarm.jsp?href=rest/adt/ui/client/security/setCancelAlarm&amp;armstate=disarmed+with+alarm&amp;arm=off&amp;sat=0c0c&amp;networkid=NET1','Clearing')" value="Clear Alarm">
  </div>
</div>"#;

pub const ORB_MAINTENANCE: &str = r#"
<div id="divOrb">
  <div id="divOrbTextSummary"><span>Status Unavailable.</span></div>
</div>"#;

/// What the portal renders after refusing a plain arm because a sensor is open.
pub const FORCE_ARM_REPLY: &str = r#"<html><body>
<div id="divOrbTextSummary"><span>Disarmed.</span> <span>1 Sensor Open.</span></div>
<div class="p_armWarning">Some sensors are open. Arm anyway?</div>
<input type="button" onclick="setArmState('quickcontrol/armDisarm.jsp?href=rest/adt/ui/client/security/setForceArm&amp;armstate=forcearm&amp;arm=away&amp;sat=9f2c&amp;networkid=NET1','Arming Away')" value="Arm Anyway">
</body></html>"#;

pub const GATEWAY_HTML: &str = r#"<table>
<tr><td class="InputFieldDescriptionL">Status:</td><td class="InputFieldValueL">Online</td></tr>
<tr><td class="InputFieldDescriptionL">Manufacturer:</td><td class="InputFieldValueL">ADT Pulse Gateway</td></tr>
<tr><td class="InputFieldDescriptionL">Model:</td><td class="InputFieldValueL">PGZNG1</td></tr>
<tr><td class="InputFieldDescriptionL">Serial Number:</td><td class="InputFieldValueL">5U020CN3007E3</td></tr>
<tr><td class="InputFieldDescriptionL">Broadband LAN IP Address:</td><td class="InputFieldValueL">192.168.1.20</td></tr>
</table>"#;

pub const PANEL_HTML: &str = r#"<table>
<tr><td class="InputFieldDescriptionL">Status:</td><td class="InputFieldValueL">Online</td></tr>
<tr><td class="InputFieldDescriptionL">Manufacturer/Provider:</td><td class="InputFieldValueL">ADT</td></tr>
<tr><td class="InputFieldDescriptionL">Type/Model:</td><td class="InputFieldValueL">Security Panel - Safewatch Pro 3000/3000CN</td></tr>
<tr><td class="InputFieldDescriptionL">Emergency Keys:</td><td class="InputFieldValueL">Button: Fire Alarm (Zone 95)</td></tr>
</table>"#;

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// `/myhome/<version>/<relative>`
pub fn versioned(relative: &str) -> String {
    format!("/myhome/{VERSION}/{relative}")
}

pub fn credentials() -> Credentials {
    Credentials::new(
        Region::UnitedStates,
        "owner@example.com".to_string(),
        SecretString::from("correct horse".to_string()),
        FINGERPRINT.to_string(),
    )
}

pub fn options(server: &MockServer) -> Result<PortalOptions> {
    Ok(PortalOptions::default()
        .with_base_url(Url::parse(&server.uri())?)
        .with_retry(RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(10),
        })
        .with_timeout(Duration::from_secs(5)))
}

pub fn portal(server: &MockServer) -> Result<Portal> {
    portal_with(options(server)?)
}

pub fn portal_with(options: PortalOptions) -> Result<Portal> {
    Ok(Portal::new(credentials(), options)?)
}

pub fn reject_reason<T>(response: &Response<T>) -> Option<RejectReason> {
    response
        .failure()
        .and_then(|failure| failure.error.as_ref())
        .and_then(|error| error.reason)
}

pub fn ok<T>(response: Response<T>) -> Result<T> {
    response
        .into_result()
        .map_err(|failure| anyhow!("portal call failed: {}", failure.message))
}

pub fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(body.to_string())
}

pub fn redirect(to: &str) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("Location", to)
}

/// Version redirect plus the sign-in page itself.
pub async fn mount_landing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(redirect(&versioned("access/signin.jsp")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(versioned("access/signin.jsp")))
        .respond_with(html(SIGNIN_HTML))
        .mount(server)
        .await;
}

/// Dashboard and sensor enumeration used to finish a sign-in.
pub async fn mount_dashboard(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(versioned("summary/summary.jsp")))
        .respond_with(html(SUMMARY_HTML))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(versioned("system/system.jsp")))
        .respond_with(html(SYSTEM_HTML))
        .mount(server)
        .await;
}

/// A sign-in that lands straight on the dashboard.
pub async fn mount_sign_in(server: &MockServer) {
    mount_landing(server).await;
    Mock::given(method("POST"))
        .and(path(versioned("access/signin.jsp")))
        .respond_with(redirect(&versioned("summary/summary.jsp")))
        .mount(server)
        .await;
    mount_dashboard(server).await;
}

pub async fn mount_orb(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path(versioned("ajax/orb.jsp")))
        .respond_with(html(body))
        .mount(server)
        .await;
}

/// A portal already signed in against `server`.
pub async fn signed_in(server: &MockServer) -> Result<Portal> {
    signed_in_with(server, options(server)?).await
}

pub async fn signed_in_with(server: &MockServer, options: PortalOptions) -> Result<Portal> {
    mount_sign_in(server).await;
    let mut portal = portal_with(options)?;
    ok(portal.login().await)?;
    Ok(portal)
}
