//! Sign-in and multi-factor state machine.
//!
//! Flow Overview:
//! 1) `submit` detects the portal build, then posts the credentials.
//! 2) Landing on the dashboard skips MFA; landing on the challenge page
//!    requires it.
//! 3) With MFA: fetch methods, request a code for one of them, validate it,
//!    and optionally register this device as trusted.
//! 4) `complete_sign_in` confirms the dashboard and enumerates sensors.
//!
//! Every step checks the current state before touching the network, so an
//! out-of-order call fails with [`Error::NotInitialized`] and no I/O.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, instrument, warn};

use super::{
    error::{Error, RejectReason, Result},
    extract::Extractor,
    models::SensorInfo,
    region::{PortalVersion, Region},
    session::{Classification, Exchange, SessionClient},
};

const SIGNIN_PATH: &str = "access/signin.jsp?e=ns&partner=adt";
const SUMMARY_PATH: &str = "summary/summary.jsp";
const SUMMARY_SUFFIX: &str = "/summary/summary.jsp";
const MFA_SEGMENT: &str = "/mfa/";
const MFA_CHALLENGE_PATH: &str = "mfa/mfaSignIn.jsp?workflow=challenge";
const TRUSTED_DEVICES_PATH: &str = "mfa/api/v1/trustedDevices";
const SYSTEM_PATH: &str = "system/system.jsp";
const OTP_LENGTH: usize = 6;
const MAX_DEVICE_NAME_LENGTH: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    CredentialsSubmitted,
    MfaRequired,
    MfaNotRequired,
    MethodSelected,
    CodeRequested,
    CodeValidated,
    DeviceTrustPending,
    DeviceTrusted,
    SignedIn,
    Authenticated,
    Rejected,
}

#[derive(Clone)]
pub struct Credentials {
    pub region: Region,
    pub username: String,
    pub password: SecretString,
    /// Opaque device fingerprint, passed through untouched.
    pub fingerprint: String,
}

impl Credentials {
    #[must_use]
    pub fn new(region: Region, username: String, password: SecretString, fingerprint: String) -> Self {
        Self {
            region,
            username,
            password,
            fingerprint,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("region", &self.region)
            .field("username", &self.username)
            .field("password", &"***")
            .field("fingerprint", &"***")
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MethodType {
    #[serde(rename = "SMS")]
    Sms,
    #[serde(rename = "EMAIL")]
    Email,
}

impl MethodType {
    fn command_segment(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: MethodType,
    pub label: String,
}

/// Challenge descriptor embedded in the MFA page script.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaDescriptor {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub methods: Vec<VerificationMethod>,
    #[serde(default)]
    pub trusted_device_id: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct MfaState {
    pub enabled: bool,
    pub methods: Vec<VerificationMethod>,
    pub selected_method: Option<String>,
    pub trusted_device_id: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TrustedDevice {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TrustedDevices {
    #[serde(default)]
    devices: Vec<TrustedDevice>,
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    reason: Option<String>,
    id: Option<String>,
}

impl CommandReply {
    fn parse(exchange: Exchange, what: &str) -> Result<Self> {
        let exchange = exchange.success()?;
        serde_json::from_str(&exchange.body)
            .map_err(|e| Error::format(format!("{what} reply is not JSON: {e}")))
    }

    fn message_or(&self, fallback: &str) -> String {
        self.message.clone().unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    SignedIn,
    MfaRequired,
}

#[derive(Debug)]
pub struct Authenticator {
    credentials: Credentials,
    state: AuthState,
    mfa: MfaState,
}

impl Authenticator {
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: AuthState::Unauthenticated,
            mfa: MfaState::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state
    }

    #[must_use]
    pub fn mfa(&self) -> &MfaState {
        &self.mfa
    }

    /// The fingerprint exactly as supplied.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.credentials.fingerprint
    }

    pub fn reset(&mut self) {
        self.transition(AuthState::Unauthenticated);
        self.mfa = MfaState::default();
    }

    /// # Errors
    /// Returns the sign-in error; bad credentials leave the machine in `Rejected`.
    #[instrument(skip(self, client, extractor), fields(region = %self.credentials.region))]
    pub async fn submit(&mut self, client: &SessionClient, extractor: &Extractor) -> Result<SubmitOutcome> {
        self.require(&[AuthState::Unauthenticated, AuthState::Rejected], "submit")?;
        self.mfa = MfaState::default();

        let landing = client.get("/").await?;
        if landing.classification == Classification::ServerError {
            return Err(Error::Server {
                status: landing.status.as_u16(),
                path: landing.path().to_string(),
            });
        }
        let version = extractor
            .version(landing.url.path())
            .ok_or_else(|| Error::format(format!("no portal version in {}", landing.url.path())))?;
        let version = PortalVersion::parse(version)?;
        debug!(%version, "portal version detected");
        client.set_version(version.clone());

        let exchange = client
            .post_form(
                &version.path(SIGNIN_PATH),
                &[
                    ("usernameForm", self.credentials.username.as_str()),
                    ("passwordForm", self.credentials.password.expose_secret()),
                    ("networkid", ""),
                    ("fingerprint", self.credentials.fingerprint.as_str()),
                    ("sun", "yes"),
                ],
            )
            .await?;
        self.transition(AuthState::CredentialsSubmitted);

        if exchange.landed_on(SUMMARY_SUFFIX) {
            self.transition(AuthState::MfaNotRequired);
            self.transition(AuthState::SignedIn);
            return Ok(SubmitOutcome::SignedIn);
        }

        if exchange.path().contains(MFA_SEGMENT) && exchange.classification == Classification::Success {
            if let Some(descriptor) = extractor.mfa_descriptor(&exchange.body) {
                self.absorb(descriptor);
            }
            self.transition(AuthState::MfaRequired);
            return Ok(SubmitOutcome::MfaRequired);
        }

        if exchange.classification == Classification::AuthenticationRequired {
            let message = extractor
                .signin_warning(&exchange.body)
                .unwrap_or_else(|| "sign-in was rejected".to_string());
            warn!("Sign-in rejected: {}", message);
            self.transition(AuthState::Rejected);
            return Err(Error::rejected(RejectReason::InvalidCredentials, message));
        }

        self.transition(AuthState::Unauthenticated);
        let exchange = exchange.success()?;
        Err(Error::format(format!("sign-in landed on {}", exchange.path())))
    }

    /// # Errors
    /// Returns [`Error::NotInitialized`] outside `MfaRequired`, or a format
    /// mismatch when the descriptor is missing.
    pub async fn get_verification_methods(
        &mut self,
        client: &SessionClient,
        extractor: &Extractor,
    ) -> Result<Vec<VerificationMethod>> {
        self.require(&[AuthState::MfaRequired], "get_verification_methods")?;

        let exchange = self.checked(client.get(&client.versioned(MFA_CHALLENGE_PATH)?).await?)?;
        let descriptor = extractor
            .mfa_descriptor(&exchange.body)
            .ok_or_else(|| Error::format("MFA descriptor missing from challenge page"))?;
        if descriptor.methods.is_empty() {
            return Err(Error::format("MFA descriptor lists no verification methods"));
        }

        self.absorb(descriptor);
        Ok(self.mfa.methods.clone())
    }

    /// # Errors
    /// Returns [`Error::UnknownVerificationMethod`] for ids not previously returned.
    pub async fn request_code(&mut self, client: &SessionClient, method_id: &str) -> Result<()> {
        self.require(
            &[
                AuthState::MfaRequired,
                AuthState::MethodSelected,
                AuthState::CodeRequested,
            ],
            "request_code",
        )?;
        if self.mfa.methods.is_empty() {
            return Err(Error::NotInitialized("verification methods not fetched"));
        }
        let method = self
            .mfa
            .methods
            .iter()
            .find(|method| method.id == method_id)
            .cloned()
            .ok_or_else(|| Error::UnknownVerificationMethod(method_id.to_string()))?;

        self.mfa.selected_method = Some(method.id.clone());
        self.transition(AuthState::MethodSelected);

        let path = client.versioned(&format!(
            "mfa/api/v1/{}/sendCode",
            method.method_type.command_segment()
        ))?;
        let exchange = self.checked(client.post_form(&path, &[("methodId", method.id.as_str())]).await?)?;
        let reply = CommandReply::parse(exchange, "send code")?;
        if !reply.success {
            return Err(Error::rejected(
                RejectReason::CommandFailed,
                reply.message_or("verification code could not be sent"),
            ));
        }

        info!(method = %method.label, "verification code requested");
        self.transition(AuthState::CodeRequested);
        Ok(())
    }

    /// # Errors
    /// Returns [`Error::InvalidInput`] unless `otp` is six digits; a wrong or
    /// expired code leaves the machine in `Rejected`.
    pub async fn validate_code(&mut self, client: &SessionClient, otp: &str) -> Result<()> {
        self.require(&[AuthState::CodeRequested], "validate_code")?;
        if otp.len() != OTP_LENGTH || !otp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidInput(format!(
                "verification code must be exactly {OTP_LENGTH} digits"
            )));
        }
        let method = self
            .selected()
            .ok_or(Error::NotInitialized("no verification method selected"))?;

        let path = client.versioned(&format!(
            "mfa/api/v1/{}/validateCode",
            method.method_type.command_segment()
        ))?;
        let exchange = self
            .checked(
                client
                    .post_form(&path, &[("methodId", method.id.as_str()), ("otp", otp)])
                    .await?,
            )?;
        let reply = CommandReply::parse(exchange, "validate code")?;

        if !reply.success {
            let reason = match reply.reason.as_deref().map(RejectReason::from_wire) {
                Some(RejectReason::ExpiredCode) => RejectReason::ExpiredCode,
                _ => RejectReason::InvalidCode,
            };
            warn!(?reason, "verification code rejected");
            self.transition(AuthState::Rejected);
            return Err(Error::rejected(
                reason,
                reply.message_or("verification code was not accepted"),
            ));
        }

        self.transition(AuthState::CodeValidated);
        Ok(())
    }

    /// # Errors
    /// Returns [`Error::NotInitialized`] before a code was validated.
    pub async fn get_trusted_devices(&mut self, client: &SessionClient) -> Result<Vec<TrustedDevice>> {
        self.require(
            &[
                AuthState::CodeValidated,
                AuthState::DeviceTrustPending,
                AuthState::DeviceTrusted,
            ],
            "get_trusted_devices",
        )?;

        let exchange = self.checked(client.get(&client.versioned(TRUSTED_DEVICES_PATH)?).await?)?;
        let exchange = exchange.success()?;
        let devices: TrustedDevices = serde_json::from_str(&exchange.body)
            .map_err(|e| Error::format(format!("trusted devices reply is not JSON: {e}")))?;

        if self.state == AuthState::CodeValidated {
            self.transition(AuthState::DeviceTrustPending);
        }
        Ok(devices.devices)
    }

    /// Register this client so later sign-ins skip MFA. The name must be unique.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] for an empty or oversized name.
    pub async fn add_trusted_device(&mut self, client: &SessionClient, device_name: &str) -> Result<TrustedDevice> {
        self.require(
            &[AuthState::CodeValidated, AuthState::DeviceTrustPending],
            "add_trusted_device",
        )?;
        let name = device_name.trim();
        if name.is_empty() || name.chars().count() > MAX_DEVICE_NAME_LENGTH {
            return Err(Error::InvalidInput(format!(
                "device name must be 1 to {MAX_DEVICE_NAME_LENGTH} characters"
            )));
        }

        let path = client.versioned(TRUSTED_DEVICES_PATH)?;
        let exchange = self.checked(client.post_form(&path, &[("deviceName", name)]).await?)?;
        let reply = CommandReply::parse(exchange, "trusted device")?;
        let id = match (reply.success, reply.id.clone()) {
            (true, Some(id)) => id,
            (true, None) => return Err(Error::format("trusted device reply carries no id")),
            (false, _) => {
                return Err(Error::rejected(
                    RejectReason::CommandFailed,
                    reply.message_or("device could not be trusted"),
                ));
            }
        };

        info!(device = name, "device registered as trusted");
        self.mfa.trusted_device_id = Some(id.clone());
        self.transition(AuthState::DeviceTrusted);
        Ok(TrustedDevice {
            id,
            name: name.to_string(),
        })
    }

    /// Confirm the dashboard and enumerate sensors.
    ///
    /// # Errors
    /// Returns [`Error::NotInitialized`] before sign-in or MFA validation completed.
    #[instrument(skip(self, client, extractor), fields(region = %self.credentials.region))]
    pub async fn complete_sign_in(
        &mut self,
        client: &SessionClient,
        extractor: &Extractor,
    ) -> Result<Vec<SensorInfo>> {
        self.require(
            &[
                AuthState::SignedIn,
                AuthState::CodeValidated,
                AuthState::DeviceTrustPending,
                AuthState::DeviceTrusted,
            ],
            "complete_sign_in",
        )?;

        let summary = self.checked(client.get(&client.versioned(SUMMARY_PATH)?).await?)?;
        let summary = summary.success()?;
        if !summary.landed_on(SUMMARY_SUFFIX) {
            return Err(Error::format(format!(
                "expected the dashboard, landed on {}",
                summary.path()
            )));
        }
        client.set_network_id(extractor.network_id(&summary.body));
        self.transition(AuthState::SignedIn);

        let system = self.checked(client.get(&client.versioned(SYSTEM_PATH)?).await?)?;
        let system = system.success()?;
        let sensors = extractor.system_sensors(&system.body);

        client.mark_authenticated();
        self.transition(AuthState::Authenticated);
        info!(sensors = sensors.len(), "signed in");
        Ok(sensors)
    }

    fn selected(&self) -> Option<VerificationMethod> {
        let id = self.mfa.selected_method.as_deref()?;
        self.mfa.methods.iter().find(|method| method.id == id).cloned()
    }

    fn absorb(&mut self, descriptor: MfaDescriptor) {
        self.mfa.enabled = descriptor.enabled || !descriptor.methods.is_empty();
        if !descriptor.methods.is_empty() {
            self.mfa.methods = descriptor.methods;
        }
        if descriptor.trusted_device_id.is_some() {
            self.mfa.trusted_device_id = descriptor.trusted_device_id;
        }
    }

    // A bounce to sign-in mid-flow means the pending session is gone.
    fn checked(&mut self, exchange: Exchange) -> Result<Exchange> {
        if exchange.classification == Classification::AuthenticationRequired {
            self.reset();
            return Err(Error::Unauthenticated);
        }
        Ok(exchange)
    }

    fn require(&self, allowed: &[AuthState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            debug!(state = ?self.state, operation, "out of sequence");
            Err(Error::NotInitialized(operation))
        }
    }

    fn transition(&mut self, next: AuthState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "auth transition");
            self.state = next;
        }
    }
}
