//! Cookie-backed HTTP session against the portal.
//!
//! The client owns the cookie jar and the session record. Every response is
//! classified before anyone looks at the body, and a bounce to the sign-in
//! page marks the session as no longer authenticated.

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{Client, Method, StatusCode, cookie::Jar, header::CONTENT_TYPE};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::{Duration, sleep};
use tracing::{debug, instrument, warn};
use url::Url;

use super::{
    error::{Error, Result},
    models::SessionInfo,
    region::{PortalVersion, Region},
};
use crate::APP_USER_AGENT;

const SIGNIN_PATH_SUFFIX: &str = "/access/signin.jsp";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Bounded retry for idempotent polling requests.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Jittered `base * 2^(attempt-1)` delay after the failed `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = rand::thread_rng().gen_range(80..=120);
        self.base_delay
            .saturating_mul(2u32.pow(exponent))
            .saturating_mul(factor)
            / 100
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Classification {
    Success,
    AuthenticationRequired,
    NotFound,
    ServerError,
    UnexpectedFormat,
}

impl Classification {
    fn of(status: StatusCode, url: &Url) -> Self {
        match status.as_u16() {
            401 | 403 => Self::AuthenticationRequired,
            404 => Self::NotFound,
            500..=599 => Self::ServerError,
            200..=299 if url.path().ends_with(SIGNIN_PATH_SUFFIX) => Self::AuthenticationRequired,
            200..=299 => Self::Success,
            _ => Self::UnexpectedFormat,
        }
    }
}

/// One request/response pair, body already read.
#[derive(Debug)]
pub struct Exchange {
    pub status: StatusCode,
    /// Final URL after redirects.
    pub url: Url,
    pub body: String,
    pub classification: Classification,
    pub generation: u64,
}

impl Exchange {
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    #[must_use]
    pub fn landed_on(&self, suffix: &str) -> bool {
        self.url.path().ends_with(suffix)
    }

    /// Turn anything but a plain success into the matching error.
    ///
    /// # Errors
    /// Returns the error for the exchange's classification.
    pub fn success(self) -> Result<Self> {
        match self.classification {
            Classification::Success => Ok(self),
            Classification::AuthenticationRequired => Err(Error::Unauthenticated),
            Classification::NotFound => Err(Error::NotFound(self.url.path().to_string())),
            Classification::ServerError => Err(Error::Server {
                status: self.status.as_u16(),
                path: self.url.path().to_string(),
            }),
            Classification::UnexpectedFormat => Err(Error::format(format!(
                "unexpected {} from {}",
                self.status,
                self.url.path()
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Body {
    Empty,
    Form(Vec<(String, String)>),
    Raw(String),
}

#[derive(Debug, Default)]
struct Session {
    version: Option<PortalVersion>,
    network_id: Option<String>,
    authenticated: bool,
    last_activity: Option<DateTime<Utc>>,
    generation: u64,
}

#[derive(Debug)]
pub struct SessionClient {
    region: Region,
    base_url: Url,
    timeout: Duration,
    retry: RetryPolicy,
    http: Mutex<Client>,
    session: Mutex<Session>,
}

impl SessionClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(region: Region, base_url: Url, retry: RetryPolicy, timeout: Option<Duration>) -> Result<Self> {
        let timeout = timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS));
        Ok(Self {
            region,
            base_url,
            timeout,
            retry,
            http: Mutex::new(build_http(timeout)?),
            session: Mutex::new(Session::default()),
        })
    }

    #[must_use]
    pub fn region(&self) -> Region {
        self.region
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session().authenticated
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.session().generation
    }

    /// # Errors
    /// Returns [`Error::NotInitialized`] before the portal version is known.
    pub fn version(&self) -> Result<PortalVersion> {
        self.session()
            .version
            .clone()
            .ok_or(Error::NotInitialized("portal version not detected"))
    }

    /// `/myhome/<version>/<relative>`.
    ///
    /// # Errors
    /// Returns [`Error::NotInitialized`] before the portal version is known.
    pub fn versioned(&self, relative: &str) -> Result<String> {
        Ok(self.version()?.path(relative))
    }

    #[must_use]
    pub fn network_id(&self) -> Option<String> {
        self.session().network_id.clone()
    }

    pub(crate) fn set_version(&self, version: PortalVersion) {
        self.session().version = Some(version);
    }

    pub(crate) fn set_network_id(&self, network_id: Option<String>) {
        self.session().network_id = network_id;
    }

    pub(crate) fn mark_authenticated(&self) {
        let mut session = self.session();
        session.authenticated = true;
        session.last_activity = Some(Utc::now());
    }

    /// The portal answered in a way only an expired session produces.
    pub(crate) fn invalidate(&self) {
        let mut session = self.session();
        if session.authenticated {
            warn!("Portal session expired");
            session.authenticated = false;
        }
    }

    /// Drop cookies and session state without any network I/O.
    pub fn reset(&self) {
        match build_http(self.timeout) {
            Ok(client) => *self.http.lock().unwrap_or_else(PoisonError::into_inner) = client,
            Err(e) => warn!("Failed to rebuild HTTP client, keeping cookies: {}", e),
        }
        let generation = self.session().generation;
        *self.session() = Session {
            generation,
            ..Session::default()
        };
        debug!(region = %self.region, "session reset");
    }

    #[must_use]
    pub fn info(&self) -> SessionInfo {
        let session = self.session();
        SessionInfo {
            region: self.region,
            version: session.version.as_ref().map(|v| v.as_str().to_string()),
            network_id: session.network_id.clone(),
            authenticated: session.authenticated,
            last_activity: session.last_activity,
        }
    }

    /// Single GET, no retry.
    ///
    /// # Errors
    /// Returns an error on network failure.
    pub async fn get(&self, path: &str) -> Result<Exchange> {
        self.send(Method::GET, path, Body::Empty).await
    }

    /// Idempotent GET, retried on network failure.
    ///
    /// # Errors
    /// Returns the last error once the retry budget is spent.
    pub async fn poll(&self, path: &str) -> Result<Exchange> {
        self.send_with_retry(Method::GET, path, Body::Empty).await
    }

    /// Idempotent POST without a body (keep-alive style), retried on network failure.
    ///
    /// # Errors
    /// Returns the last error once the retry budget is spent.
    pub async fn poll_post(&self, path: &str) -> Result<Exchange> {
        self.send_with_retry(Method::POST, path, Body::Empty).await
    }

    /// # Errors
    /// Returns an error on network failure.
    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Exchange> {
        let form = form
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        self.send(Method::POST, path, Body::Form(form)).await
    }

    /// POST a pre-encoded form body, sent byte for byte.
    ///
    /// # Errors
    /// Returns an error on network failure.
    pub async fn post_raw(&self, path: &str, body: String) -> Result<Exchange> {
        self.send(Method::POST, path, Body::Raw(body)).await
    }

    #[instrument(skip(self, body), fields(region = %self.region))]
    async fn send_with_retry(&self, method: Method, path: &str, body: Body) -> Result<Exchange> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            if attempt > 1 {
                let backoff = self.retry.backoff(attempt - 1);
                warn!("Backing off for {} ms", backoff.as_millis());
                sleep(backoff).await;
            }

            let result = self.send(method.clone(), path, body.clone()).await;
            let transient = match &result {
                Ok(exchange) => exchange.classification == Classification::ServerError,
                Err(e) => e.is_retryable(),
            };

            if !transient || attempt >= attempts {
                if transient {
                    warn!("Giving up on {} after {} attempts", path, attempts);
                }
                return result;
            }

            warn!("Attempt {} of {} for {} failed", attempt, attempts, path);
            attempt += 1;
        }
    }

    #[instrument(skip(self, body), fields(region = %self.region))]
    async fn send(&self, method: Method, path: &str, body: Body) -> Result<Exchange> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| Error::InvalidInput(format!("request path {path}: {e}")))?;
        let client = self.http.lock().unwrap_or_else(PoisonError::into_inner).clone();

        let request = client.request(method.clone(), url);
        let request = match body {
            Body::Empty => request,
            Body::Form(form) => request.form(&form),
            Body::Raw(raw) => request
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(raw),
        };

        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().clone();
        let body = response.text().await?;
        let classification = Classification::of(status, &final_url);

        let generation = {
            let mut session = self.session();
            session.generation += 1;
            match classification {
                Classification::Success => session.last_activity = Some(Utc::now()),
                Classification::AuthenticationRequired if session.authenticated => {
                    warn!("Portal redirected to sign-in; session is no longer valid");
                    session.authenticated = false;
                }
                _ => {}
            }
            session.generation
        };

        debug!(
            %method,
            status = status.as_u16(),
            final_path = final_url.path(),
            ?classification,
            generation,
            "portal exchange"
        );

        Ok(Exchange {
            status,
            url: final_url,
            body,
            classification,
            generation,
        })
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn build_http(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(APP_USER_AGENT)
        .cookie_provider(Arc::new(Jar::default()))
        .timeout(timeout)
        .build()?)
}
