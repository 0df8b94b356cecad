use anyhow::{Result, anyhow, bail};
use url::Url;

use crate::{
    config::Config,
    portal::{LoginOutcome, Portal, Response},
};

/// Account settings shared by every action.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: Config,
    pub base_url: Option<Url>,
    pub test_mode: bool,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            base_url: None,
            test_mode: false,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<Url>) -> Self {
        self.base_url = base_url;
        self
    }

    #[must_use]
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// # Errors
    /// Returns an error if the portal client cannot be built.
    pub fn portal(&self) -> Result<Portal> {
        let mut options = self.config.portal_options().with_test_mode(self.test_mode);
        if let Some(url) = &self.base_url {
            options = options.with_base_url(url.clone());
        }
        Ok(Portal::new(self.config.credentials(), options)?)
    }
}

/// Sign in, failing when the account still needs interactive verification.
///
/// # Errors
/// Returns an error if the portal refuses the sign-in.
pub async fn sign_in(portal: &mut Portal) -> Result<()> {
    match portal.login().await {
        Response::Success(LoginOutcome::Authenticated) => Ok(()),
        Response::Success(LoginOutcome::MfaRequired) => {
            bail!("account requires verification; register this fingerprint as a trusted device first")
        }
        Response::Failure(failure) => Err(anyhow!("sign-in failed: {}", failure.message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::Region;

    #[test]
    fn test_global_args() {
        let config = Config::from_json(r#"{"subdomain": "portal-ca", "username": "u", "password": "p", "fingerprint": "f"}"#)
            .unwrap_or_else(|e| panic!("{e}"));
        let args = GlobalArgs::new(config).with_test_mode(true);
        assert!(args.test_mode);
        assert!(args.base_url.is_none());

        let portal = args.portal().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(portal.session_info().region, Region::Canada);
        assert!(!portal.is_authenticated());
    }
}
