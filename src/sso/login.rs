use std::sync::Arc;
use std::time::Duration;

use super::client::SsoClient;
use super::reconcile::IdentityReconciler;
use super::validator::SsoTokenValidator;
use super::{InjastProfile, SsoError};
use crate::clock::Clock;
use crate::limits::{MAX_SESSION_CODE_LEN, MIN_SESSION_CODE_LEN};
use crate::model::UserAccount;
use crate::observability::SSO_LOGINS_TOTAL;

/// Profile fetch retries. Exchange and validation are never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

/// Callback flow: exchange the session code, validate the token, fetch the
/// profile, then reconcile the identity.
pub struct SsoLogin {
    client: Arc<dyn SsoClient>,
    validator: SsoTokenValidator,
    reconciler: IdentityReconciler,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl SsoLogin {
    pub fn new(
        client: Arc<dyn SsoClient>,
        validator: SsoTokenValidator,
        reconciler: IdentityReconciler,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            validator,
            reconciler,
            retry,
            clock,
        }
    }

    pub async fn login(&self, session_code: &str) -> Result<UserAccount, SsoError> {
        let result = self.run(session_code).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        };
        metrics::counter!(SSO_LOGINS_TOTAL, "outcome" => outcome).increment(1);
        if let Err(e) = &result {
            tracing::warn!(stage = e.stage(), error = %e, "SSO login failed");
        }
        result
    }

    async fn run(&self, session_code: &str) -> Result<UserAccount, SsoError> {
        let code = check_session_code(session_code)?;
        let token = self.client.exchange_session_code(code).await?;
        let claims = self.validator.validate(&token).await?;
        let profile = self.profile_with_retry(&token).await;
        if profile.is_none() {
            tracing::warn!("profile unavailable, continuing with token claims");
        }
        self.reconciler
            .reconcile(&claims, profile.as_ref(), &token)
            .await
    }

    async fn profile_with_retry(&self, token: &str) -> Option<InjastProfile> {
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            match self.client.fetch_profile(token).await {
                Ok(profile) => return Some(profile),
                Err(e) if !e.is_transient() => {
                    tracing::warn!(attempt, error = %e, "profile request rejected, not retrying");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %e, "profile fetch failed");
                    if attempt < attempts {
                        self.clock.sleep(self.retry.delay).await;
                    }
                }
            }
        }
        None
    }
}

fn check_session_code(raw: &str) -> Result<&str, SsoError> {
    let code = raw.trim();
    let len = code.chars().count();
    if code.is_empty() {
        return Err(SsoError::InvalidSessionCode("session_code is required".into()));
    }
    if !(MIN_SESSION_CODE_LEN..=MAX_SESSION_CODE_LEN).contains(&len) {
        return Err(SsoError::InvalidSessionCode(format!(
            "session_code must be {MIN_SESSION_CODE_LEN} to {MAX_SESSION_CODE_LEN} characters"
        )));
    }
    Ok(code)
}
