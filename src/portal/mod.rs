//! Client for the security provider's scraped web portal.
//!
//! [`Portal`] is the operation surface. Every public operation returns a
//! [`Response`] so callers get the same `{success, info}` shape whether a
//! read, a command or a sign-in step failed.

pub mod arm_state;
pub mod auth;
pub mod error;
pub mod extract;
pub mod force_arm;
pub mod models;
pub mod region;
pub mod response;
pub mod sensor_status;
pub mod session;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tokio::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use self::{
    arm_state::{ArmState, PanelArmState, Transition},
    auth::{AuthState, Credentials, MethodType, MfaState, TrustedDevice, VerificationMethod},
    error::{Error, ErrorKind, ErrorObject, RejectReason, Result},
    force_arm::{ForceArm, ForceArmPolicy, ForceArmState},
    models::{
        ArmOutcome, ButtonKind, DeviceType, GatewayInformation, OrbButton, OrbButtons, PanelInformation,
        PanelStatus, Sensor, SensorInfo, SensorStatus, SessionInfo, SyncCheck, SyncCode,
    },
    region::{PortalVersion, Region, SUPPORTED_VERSIONS},
    response::{Failure, Response},
    session::RetryPolicy,
};

use self::{
    auth::{Authenticator, SubmitOutcome},
    extract::Extractor,
    session::{Exchange, SessionClient},
};
use crate::config::ConfiguredSensor;

const ORB_PATH: &str = "ajax/orb.jsp";
const GATEWAY_PATH: &str = "system/gateway.jsp";
const PANEL_PATH: &str = "system/device.jsp?id=1";
const SYNC_CHECK_PATH: &str = "Ajax/SyncCheckServ";
const KEEP_ALIVE_PATH: &str = "KeepAlive";
const FORCE_ARM_PATH: &str = "quickcontrol/serv/RunRRACommand";
const SIGNOUT_PATH: &str = "access/signout.jsp";

/// Whether the account accepts commands.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Paused,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginOutcome {
    Authenticated,
    /// Continue with the verification steps, then [`Portal::complete_sign_in`].
    MfaRequired,
}

/// A configured sensor next to what the portal enumerated for its zone.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ConfiguredSensorMatch {
    pub configured: ConfiguredSensor,
    pub enumerated: Option<SensorInfo>,
}

#[derive(Clone, Debug)]
pub struct PortalOptions {
    base_url: Option<Url>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    test_mode: bool,
    mode: Mode,
    force_arm_policy: Option<ForceArmPolicy>,
    force_arm_enabled: bool,
}

impl Default for PortalOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            retry: RetryPolicy::default(),
            timeout: None,
            test_mode: false,
            mode: Mode::Normal,
            force_arm_policy: None,
            force_arm_enabled: true,
        }
    }
}

impl PortalOptions {
    /// Talk to this URL instead of the region host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Allow arm/disarm even when the account is paused.
    #[must_use]
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_force_arm_policy(mut self, policy: ForceArmPolicy) -> Self {
        self.force_arm_policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_force_arm(mut self, enabled: bool) -> Self {
        self.force_arm_enabled = enabled;
        self
    }
}

#[derive(Debug)]
pub struct Portal {
    client: SessionClient,
    extractor: Extractor,
    auth: Authenticator,
    force_arm_policy: ForceArmPolicy,
    mode: Mode,
    test_mode: bool,
    sensors: Vec<SensorInfo>,
    last_sync: Mutex<Option<SyncCode>>,
}

impl Portal {
    /// # Errors
    /// Returns an error if the HTTP client or the patterns cannot be built.
    pub fn new(credentials: Credentials, options: PortalOptions) -> Result<Self> {
        let region = credentials.region;
        let base_url = match options.base_url {
            Some(url) => url,
            None => region.base_url()?,
        };
        let policy = match options.force_arm_policy {
            Some(policy) => policy,
            None => ForceArmPolicy::standard()?,
        };
        let force_arm_policy = policy.clone().with_enabled(policy.is_enabled() && options.force_arm_enabled);

        Ok(Self {
            client: SessionClient::new(region, base_url, options.retry, options.timeout)?,
            extractor: Extractor::new()?,
            auth: Authenticator::new(credentials),
            force_arm_policy,
            mode: options.mode,
            test_mode: options.test_mode,
            sensors: Vec::new(),
            last_sync: Mutex::new(None),
        })
    }

    /// Sign in, reusing an authenticated session when there is one.
    #[instrument(skip(self), fields(region = %self.client.region()))]
    pub async fn login(&mut self) -> Response<LoginOutcome> {
        self.try_login().await.into()
    }

    async fn try_login(&mut self) -> Result<LoginOutcome> {
        if self.client.is_authenticated() && self.auth.state() == AuthState::Authenticated {
            debug!("already authenticated");
            return Ok(LoginOutcome::Authenticated);
        }

        self.clear_local_state();
        match self.auth.submit(&self.client, &self.extractor).await? {
            SubmitOutcome::SignedIn => {
                self.sensors = self.auth.complete_sign_in(&self.client, &self.extractor).await?;
                Ok(LoginOutcome::Authenticated)
            }
            SubmitOutcome::MfaRequired => {
                info!("verification required to finish signing in");
                Ok(LoginOutcome::MfaRequired)
            }
        }
    }

    /// Sign out. Local state is cleared even when the portal call fails.
    #[instrument(skip(self), fields(region = %self.client.region()))]
    pub async fn logout(&mut self) -> Response<()> {
        let result = self.try_logout().await;
        self.clear_local_state();
        if let Err(e) = &result {
            warn!("Sign-out failed, local session cleared anyway: {}", e);
        }
        result.into()
    }

    async fn try_logout(&self) -> Result<()> {
        if !self.client.is_authenticated() {
            return Ok(());
        }
        let path = format!(
            "{}?networkid={}&partner=adt",
            self.client.versioned(SIGNOUT_PATH)?,
            self.client.network_id().unwrap_or_default()
        );
        let exchange = self.client.get(&path).await?;
        // sign-out lands on the sign-in page
        if exchange.landed_on(SIGNOUT_PATH)
            || exchange.classification == session::Classification::AuthenticationRequired
        {
            return Ok(());
        }
        exchange.success().map(|_| ())
    }

    pub async fn get_verification_methods(&mut self) -> Response<Vec<VerificationMethod>> {
        self.auth
            .get_verification_methods(&self.client, &self.extractor)
            .await
            .into()
    }

    pub async fn request_code(&mut self, method_id: &str) -> Response<()> {
        self.auth.request_code(&self.client, method_id).await.into()
    }

    pub async fn validate_code(&mut self, otp: &str) -> Response<()> {
        self.auth.validate_code(&self.client, otp).await.into()
    }

    pub async fn get_trusted_devices(&mut self) -> Response<Vec<TrustedDevice>> {
        self.auth.get_trusted_devices(&self.client).await.into()
    }

    pub async fn add_trusted_device(&mut self, device_name: &str) -> Response<TrustedDevice> {
        self.auth.add_trusted_device(&self.client, device_name).await.into()
    }

    /// Finish a sign-in that needed verification.
    pub async fn complete_sign_in(&mut self) -> Response<Vec<SensorInfo>> {
        let result = self.auth.complete_sign_in(&self.client, &self.extractor).await;
        if let Ok(sensors) = &result {
            self.sensors.clone_from(sensors);
        }
        result.into()
    }

    #[must_use]
    pub fn get_fingerprint(&self) -> &str {
        self.auth.fingerprint()
    }

    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    #[must_use]
    pub fn mfa_state(&self) -> &MfaState {
        self.auth.mfa()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.client.is_authenticated()
    }

    /// Forget the session locally. No network I/O.
    pub fn reset_session(&mut self) {
        self.clear_local_state();
    }

    #[must_use]
    pub fn session_info(&self) -> SessionInfo {
        self.client.info()
    }

    /// Sensors enumerated at sign-in.
    #[must_use]
    pub fn sensors(&self) -> &[SensorInfo] {
        &self.sensors
    }

    #[must_use]
    pub fn configured_sensors(&self, configured: &[ConfiguredSensor]) -> Vec<ConfiguredSensorMatch> {
        configured
            .iter()
            .map(|sensor| ConfiguredSensorMatch {
                configured: sensor.clone(),
                enumerated: self.sensors.iter().find(|found| found.zone == sensor.adt_zone).cloned(),
            })
            .collect()
    }

    #[instrument(skip(self), fields(region = %self.client.region()))]
    pub async fn get_panel_status(&self) -> Response<PanelStatus> {
        async {
            let exchange = self.fetch(ORB_PATH).await?;
            self.panel_status(&exchange)
        }
        .await
        .into()
    }

    #[instrument(skip(self), fields(region = %self.client.region()))]
    pub async fn get_sensors_status(&self) -> Response<Vec<Sensor>> {
        self.try_sensors_status().await.into()
    }

    async fn try_sensors_status(&self) -> Result<Vec<Sensor>> {
        let exchange = self.fetch(ORB_PATH).await?;
        let rows = self.extractor.orb_sensors(&exchange.body);
        if rows.is_empty() && !self.sensors.is_empty() {
            return Err(Error::format("orb lists no sensors"));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let device_type = self
                    .sensors
                    .iter()
                    .find(|sensor| sensor.zone == row.zone)
                    .map_or(DeviceType::Unknown, |sensor| sensor.device_type);
                Sensor {
                    zone: row.zone,
                    name: row.name,
                    device_type,
                    status: sensor_status::lookup(device_type, &row.icon, &row.status_text),
                    online: !sensor_status::is_offline(&row.icon),
                    icon: row.icon,
                    status_text: row.status_text,
                }
            })
            .collect())
    }

    #[instrument(skip(self), fields(region = %self.client.region()))]
    pub async fn get_gateway_information(&self) -> Response<GatewayInformation> {
        async {
            let details = self.details(GATEWAY_PATH).await?;
            Ok::<_, Error>(GatewayInformation::from_details(&details))
        }
        .await
        .into()
    }

    #[instrument(skip(self), fields(region = %self.client.region()))]
    pub async fn get_panel_information(&self) -> Response<PanelInformation> {
        async {
            let details = self.details(PANEL_PATH).await?;
            Ok::<_, Error>(PanelInformation::from_details(&details))
        }
        .await
        .into()
    }

    /// Arm/disarm buttons from a fresh orb render.
    #[instrument(skip(self), fields(region = %self.client.region()))]
    pub async fn get_orb_security_buttons(&self) -> Response<OrbButtons> {
        async {
            let exchange = self.fetch(ORB_PATH).await?;
            let buttons = self.buttons(&exchange);
            if buttons.buttons.is_empty() {
                return Err(Error::format("orb renders no arm buttons"));
            }
            Ok::<_, Error>(buttons)
        }
        .await
        .into()
    }

    /// Move the panel to `arm_to`. The orb is re-read first, so the live
    /// state decides which button is used.
    #[instrument(skip(self), fields(region = %self.client.region()))]
    pub async fn set_panel_status(
        &mut self,
        arm_from: PanelArmState,
        arm_to: ArmState,
        is_alarm_active: bool,
    ) -> Response<ArmOutcome> {
        self.try_set_panel_status(arm_from, arm_to, is_alarm_active)
            .await
            .into()
    }

    async fn try_set_panel_status(
        &mut self,
        arm_from: PanelArmState,
        arm_to: ArmState,
        is_alarm_active: bool,
    ) -> Result<ArmOutcome> {
        if self.mode == Mode::Paused && !self.test_mode {
            return Err(Error::InvalidInput(
                "account is paused; enable test mode to issue commands".to_string(),
            ));
        }

        let exchange = self.fetch(ORB_PATH).await?;
        let status = self.panel_status(&exchange)?;
        let buttons = self.buttons(&exchange);
        let current = status.state;
        if current != arm_from {
            debug!(expected = %arm_from, %current, "panel state moved since the caller last looked");
        }
        if is_alarm_active && !status.is_alarm_active() {
            debug!(%current, "caller reports an alarm the orb no longer shows");
        }

        let mut outcome = ArmOutcome {
            from: current,
            to: arm_to,
            already_set: false,
            forced: false,
            alarm_cleared: false,
        };

        match arm_state::plan(current, arm_to, is_alarm_active || status.is_alarm_active()) {
            Transition::NoOp => {
                debug!(%current, "panel already in the requested state");
                outcome.already_set = true;
            }
            Transition::Plain => {
                outcome.forced = self.arm(&status, &buttons, current, arm_to).await?;
            }
            Transition::Rearm => {
                self.issue(buttons.select(current, ArmState::Off)?).await?;
                let exchange = self.fetch(ORB_PATH).await?;
                let disarmed = self.panel_status(&exchange)?;
                if disarmed.state != PanelArmState::Off {
                    return Err(Error::format(format!(
                        "panel reports {} after disarming",
                        disarmed.state
                    )));
                }
                let buttons = self.buttons(&exchange);
                outcome.forced = self.arm(&disarmed, &buttons, PanelArmState::Off, arm_to).await?;
            }
            Transition::CancelAlarm { disarm_first } => {
                let buttons = if disarm_first {
                    self.issue(buttons.select(current, ArmState::Off)?).await?;
                    let exchange = self.fetch(ORB_PATH).await?;
                    self.buttons(&exchange)
                } else {
                    buttons
                };
                let clear = buttons
                    .buttons
                    .iter()
                    .find(|button| button.kind == ButtonKind::ClearAlarm)
                    .ok_or_else(|| Error::NoMatchingButton {
                        from: PanelArmState::DisarmedWithAlarm.to_string(),
                        to: ArmState::Off.to_string(),
                    })?;
                self.issue(clear).await?;
                outcome.alarm_cleared = true;
            }
        }

        info!(from = %outcome.from, to = %outcome.to, forced = outcome.forced, "panel status set");
        Ok(outcome)
    }

    // Returns whether the arm had to be forced.
    async fn arm(
        &self,
        status: &PanelStatus,
        buttons: &OrbButtons,
        current: PanelArmState,
        target: ArmState,
    ) -> Result<bool> {
        let reply = self.issue(buttons.select(current, target)?).await?;
        let reply_buttons = self.buttons(&reply);
        let reply_text = self.extractor.text(&reply.body);

        let mut force = ForceArm::default();
        let evidence = [status.status.as_str(), reply_text.as_str()];
        if !force.observe(&self.force_arm_policy, target, &evidence, &reply_buttons) {
            if reply_buttons.force_arm().is_some() {
                return Err(Error::rejected(
                    RejectReason::SensorsOpen,
                    format!("panel refused to arm {target}: {}", status.status),
                ));
            }
            return Ok(false);
        }

        let body = force.escalate(self.client.generation())?;
        warn!(%target, "Plain arm refused, forcing");
        self.client
            .post_raw(&self.client.versioned(FORCE_ARM_PATH)?, body)
            .await?
            .success()?;
        Ok(true)
    }

    /// Lightweight change poll.
    #[instrument(skip(self), fields(region = %self.client.region()))]
    pub async fn perform_sync_check(&self) -> Response<SyncCheck> {
        self.try_sync_check().await.into()
    }

    async fn try_sync_check(&self) -> Result<SyncCheck> {
        self.ensure_authenticated()?;
        let path = format!(
            "{}?t={}",
            self.client.versioned(SYNC_CHECK_PATH)?,
            Utc::now().timestamp_millis()
        );
        let exchange = self.client.poll(&path).await?.success()?;
        let body = exchange.body.trim();
        if body.starts_with('<') {
            // an HTML page instead of a code only happens once the session is gone
            self.client.invalidate();
            return Err(Error::Unauthenticated);
        }

        let code = self
            .extractor
            .sync_code(body)
            .ok_or_else(|| Error::format(format!("sync check answered {body:?}")))?;
        let mut last = self.last_sync.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = *last != Some(code);
        *last = Some(code);
        Ok(SyncCheck { code, changed })
    }

    #[instrument(skip(self), fields(region = %self.client.region()))]
    pub async fn perform_keep_alive(&self) -> Response<()> {
        async {
            self.ensure_authenticated()?;
            self.client
                .poll_post(&self.client.versioned(KEEP_ALIVE_PATH)?)
                .await?
                .success()?;
            Ok::<_, Error>(())
        }
        .await
        .into()
    }

    async fn fetch(&self, relative: &str) -> Result<Exchange> {
        self.ensure_authenticated()?;
        self.client.poll(&self.client.versioned(relative)?).await?.success()
    }

    async fn details(&self, relative: &str) -> Result<Vec<(String, String)>> {
        let exchange = self.fetch(relative).await?;
        let details = self.extractor.details(&exchange.body);
        if details.is_empty() {
            return Err(Error::format(format!("no details table on {}", exchange.path())));
        }
        Ok(details)
    }

    fn panel_status(&self, exchange: &Exchange) -> Result<PanelStatus> {
        self.extractor
            .panel_status(&exchange.body)
            .ok_or_else(|| Error::format("orb summary missing"))
    }

    fn buttons(&self, exchange: &Exchange) -> OrbButtons {
        OrbButtons {
            buttons: self
                .extractor
                .buttons(&exchange.body, self.client.region(), exchange.generation),
        }
    }

    // Tokens are only good for the region that issued them and until the
    // next exchange.
    async fn issue(&self, button: &OrbButton) -> Result<Exchange> {
        if button.region != self.client.region() {
            return Err(Error::StaleTokens("tokens were issued by another region"));
        }
        if button.generation != self.client.generation() {
            return Err(Error::StaleTokens("tokens predate the last exchange"));
        }
        debug!(label = %button.label, kind = ?button.kind, "issuing command");
        self.client.get(&self.client.versioned(&button.url)?).await?.success()
    }

    fn ensure_authenticated(&self) -> Result<()> {
        if self.client.is_authenticated() {
            Ok(())
        } else {
            Err(Error::Unauthenticated)
        }
    }

    fn clear_local_state(&mut self) {
        self.client.reset();
        self.auth.reset();
        self.sensors.clear();
        *self.last_sync.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
