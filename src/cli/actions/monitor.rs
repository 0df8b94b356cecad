use crate::{
    cli::{
        actions::status,
        globals::{self, GlobalArgs},
    },
    portal::{ErrorKind, LoginOutcome, Mode, Portal, Response},
};
use anyhow::{Context, Result, bail};
use tokio::{
    signal,
    time::{Duration, Instant, MissedTickBehavior, interval, interval_at},
};
use tracing::{debug, info, warn};

const SYNC_CHECK_SECONDS: f64 = 3.0;

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub keep_alive: Duration,
}

/// Sync check period for a configured speed multiplier; slower speeds poll less often.
#[must_use]
pub fn sync_interval(speed: f64) -> Duration {
    let speed = if speed > 0.0 { speed } else { 1.0 };
    Duration::from_secs_f64(SYNC_CHECK_SECONDS / speed)
}

/// What a sign-in attempt after a lost session means for the loop.
#[derive(Debug, Eq, PartialEq)]
pub enum Relogin {
    Done,
    /// Try again on the next tick.
    Retry,
    /// The portal will keep refusing; give up.
    Stop(String),
}

#[must_use]
pub fn relogin_outcome(response: &Response<LoginOutcome>) -> Relogin {
    match response {
        Response::Success(LoginOutcome::Authenticated) => Relogin::Done,
        Response::Success(LoginOutcome::MfaRequired) => Relogin::Stop(
            "account requires verification; register this fingerprint as a trusted device first"
                .to_string(),
        ),
        Response::Failure(failure) if failure.kind() == Some(ErrorKind::ServerRejected) => {
            Relogin::Stop(format!("sign-in refused: {}", failure.message))
        }
        Response::Failure(_) => Relogin::Retry,
    }
}

/// Execute the monitor action.
/// # Errors
/// Returns an error if the initial sign-in fails or the portal refuses a re-login.
pub async fn execute(args: Args) -> Result<()> {
    if args.globals.config.mode == Mode::Paused && !args.globals.test_mode {
        info!("account is paused, nothing to monitor");
        return Ok(());
    }

    let mut portal = args.globals.portal()?;
    globals::sign_in(&mut portal).await?;
    print_report(&portal, &args.globals).await?;

    let mut sync = interval(sync_interval(args.globals.config.speed));
    sync.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut keep_alive = interval_at(Instant::now() + args.keep_alive, args.keep_alive);
    keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut needs_login = false;
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for ctrl-c")?;
                info!("interrupted, signing out");
                break;
            }
            _ = sync.tick() => {
                if needs_login {
                    needs_login = relogin(&mut portal).await?;
                    continue;
                }
                match portal.perform_sync_check().await {
                    Response::Success(check) if check.changed => {
                        info!(code = %check.code, "portal reports a change");
                        print_report(&portal, &args.globals).await?;
                    }
                    Response::Success(check) => debug!(code = %check.code, "no change"),
                    Response::Failure(failure) if failure.kind() == Some(ErrorKind::Unauthenticated) => {
                        warn!("Session lost, signing in again");
                        portal.reset_session();
                        needs_login = relogin(&mut portal).await?;
                    }
                    Response::Failure(failure) => warn!("Sync check failed: {}", failure.message),
                }
            }
            _ = keep_alive.tick(), if !needs_login => {
                if let Some(failure) = portal.perform_keep_alive().await.failure() {
                    // a lost session is picked up by the next sync tick
                    warn!("Keep-alive failed: {}", failure.message);
                }
            }
        }
    }

    if let Some(failure) = portal.logout().await.failure() {
        warn!("Sign-out failed: {}", failure.message);
    }
    Ok(())
}

// Returns whether the session still needs a login.
async fn relogin(portal: &mut Portal) -> Result<bool> {
    let response = portal.login().await;
    match relogin_outcome(&response) {
        Relogin::Done => {
            info!("signed in again");
            Ok(false)
        }
        Relogin::Retry => {
            if let Some(failure) = response.failure() {
                warn!("Re-login failed, retrying on the next tick: {}", failure.message);
            }
            Ok(true)
        }
        Relogin::Stop(reason) => bail!(reason),
    }
}

async fn print_report(portal: &Portal, globals: &GlobalArgs) -> Result<()> {
    let report = status::report(portal, globals).await?;
    println!("{}", serde_json::to_string(&report).context("Failed to serialize status report")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::{Error, RejectReason};

    #[test]
    fn transient_relogin_failures_are_retried() {
        let server: Response<LoginOutcome> = Err(Error::Server {
            status: 503,
            path: "/".into(),
        })
        .into();
        assert_eq!(relogin_outcome(&server), Relogin::Retry);

        let bounced: Response<LoginOutcome> = Err(Error::Unauthenticated).into();
        assert_eq!(relogin_outcome(&bounced), Relogin::Retry);

        let signed_in: Response<LoginOutcome> = Ok(LoginOutcome::Authenticated).into();
        assert_eq!(relogin_outcome(&signed_in), Relogin::Done);
    }

    #[test]
    fn refused_or_verification_relogin_stops() {
        let refused: Response<LoginOutcome> =
            Err(Error::rejected(RejectReason::InvalidCredentials, "bad password")).into();
        assert!(matches!(
            relogin_outcome(&refused),
            Relogin::Stop(reason) if reason.contains("bad password")
        ));

        let mfa: Response<LoginOutcome> = Ok(LoginOutcome::MfaRequired).into();
        assert!(matches!(relogin_outcome(&mfa), Relogin::Stop(_)));
    }

    #[test]
    fn speed_scales_sync_interval() {
        assert_eq!(sync_interval(1.0), Duration::from_secs(3));
        assert_eq!(sync_interval(0.5), Duration::from_secs(6));
        assert_eq!(sync_interval(0.75), Duration::from_secs(4));
        assert_eq!(sync_interval(0.0), Duration::from_secs(3));
    }
}
