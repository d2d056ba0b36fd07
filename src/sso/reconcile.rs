//! Maps a validated Injast login onto a local account.
//!
//! The national id is the stable key. A first login creates the account and
//! its identity link in one record; later logins refresh the link and copy
//! over any non-empty profile fields.

use std::sync::Arc;

use chrono::DateTime;

use super::cipher::TokenCipher;
use super::{InjastClaims, InjastProfile, SsoError, present};
use crate::engine::{Engine, EngineError, NewAccount};
use crate::limits::MAX_USERNAME_SUFFIX;
use crate::model::{ExternalIdentity, UserAccount};

const DEFAULT_COUNTRY_CODE: &str = "98";

/// Attempts when a concurrent login claims the same username or identity.
const RACE_ATTEMPTS: usize = 3;

pub struct IdentityReconciler {
    engine: Arc<Engine>,
    cipher: Arc<TokenCipher>,
}

/// Normalized view of one login's identity data.
struct Incoming<'a> {
    national_id: &'a str,
    email: Option<&'a str>,
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
    mobile_number: Option<&'a str>,
    mobile_country_code: Option<&'a str>,
}

impl<'a> Incoming<'a> {
    fn from_login(
        claims: &'a InjastClaims,
        profile: Option<&'a InjastProfile>,
    ) -> Result<Self, SsoError> {
        let national_id = present(profile.and_then(|p| p.national_id.as_deref()))
            .or_else(|| present(claims.nid.as_deref()))
            .or_else(|| present(claims.uid.as_deref()))
            .ok_or(SsoError::MissingIdentifier)?;
        Ok(Self {
            national_id,
            email: present(profile.and_then(|p| p.email.as_deref())),
            first_name: present(profile.and_then(|p| p.first_name.as_deref())),
            last_name: present(profile.and_then(|p| p.last_name.as_deref())),
            mobile_number: present(profile.and_then(|p| p.mobile_number.as_deref()))
                .or_else(|| present(claims.mbn.as_deref())),
            mobile_country_code: present(profile.and_then(|p| p.mobile_country_code.as_deref()))
                .or_else(|| present(claims.mbc.as_deref())),
        })
    }

    fn apply_to(&self, user: &UserAccount) -> UserAccount {
        let mut updated = user.clone();
        if let Some(v) = self.email {
            updated.email = v.to_string();
        }
        if let Some(v) = self.first_name {
            updated.first_name = v.to_string();
        }
        if let Some(v) = self.last_name {
            updated.last_name = v.to_string();
        }
        updated
    }
}

impl IdentityReconciler {
    pub fn new(engine: Arc<Engine>, cipher: Arc<TokenCipher>) -> Self {
        Self { engine, cipher }
    }

    /// Find or create the account for this login and store the sealed
    /// provider token on its identity link.
    pub async fn reconcile(
        &self,
        claims: &InjastClaims,
        profile: Option<&InjastProfile>,
        access_token: &str,
    ) -> Result<UserAccount, SsoError> {
        let incoming = Incoming::from_login(claims, profile)?;
        let sealed = self.cipher.seal(access_token)?;
        let token_expires_at = DateTime::from_timestamp(claims.exp, 0);
        let now = self.engine.clock().now();

        for _ in 0..RACE_ATTEMPTS {
            if let Some(existing) = self.engine.identity(incoming.national_id) {
                let user = self
                    .engine
                    .user(&existing.user_id)
                    .ok_or_else(|| EngineError::user_not_found(existing.user_id))?;
                let updated = incoming.apply_to(&user);
                self.engine.update_user(updated.clone()).await?;
                self.engine
                    .sync_identity(ExternalIdentity {
                        sealed_token: Some(sealed.clone()),
                        token_expires_at,
                        mobile_number: incoming
                            .mobile_number
                            .map(str::to_string)
                            .or(existing.mobile_number.clone()),
                        mobile_country_code: incoming
                            .mobile_country_code
                            .map(str::to_string)
                            .or(existing.mobile_country_code.clone()),
                        last_synced_at: now,
                        ..existing
                    })
                    .await?;
                tracing::info!(user = %updated.id, "SSO login for existing account");
                return Ok(updated);
            }

            let username = self.free_username(incoming.national_id)?;
            let identity = ExternalIdentity {
                national_id: incoming.national_id.to_string(),
                user_id: ulid::Ulid::nil(),
                sealed_token: Some(sealed.clone()),
                token_expires_at,
                mobile_number: incoming.mobile_number.map(str::to_string),
                mobile_country_code: Some(
                    incoming
                        .mobile_country_code
                        .unwrap_or(DEFAULT_COUNTRY_CODE)
                        .to_string(),
                ),
                last_synced_at: now,
                created_at: now,
            };
            let account = NewAccount {
                username,
                email: incoming.email.unwrap_or_default().to_string(),
                first_name: incoming.first_name.unwrap_or_default().to_string(),
                last_name: incoming.last_name.unwrap_or_default().to_string(),
                ..NewAccount::default()
            };
            match self.engine.create_account(account, Some(identity)).await {
                Ok(user) => {
                    tracing::info!(user = %user.id, username = %user.username, "SSO account created");
                    return Ok(user);
                }
                // Lost a race on the username or the identity: look again.
                Err(EngineError::AlreadyExists(what)) => {
                    tracing::debug!(%what, "SSO account creation raced, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(SsoError::Engine(EngineError::AlreadyExists(format!(
            "identity {}",
            incoming.national_id
        ))))
    }

    /// `injast_{nid}`, or the first free `injast_{nid}_{n}`.
    fn free_username(&self, national_id: &str) -> Result<String, SsoError> {
        let base = format!("injast_{national_id}");
        if !self.engine.username_taken(&base) {
            return Ok(base);
        }
        (1..=MAX_USERNAME_SUFFIX)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.engine.username_taken(candidate))
            .ok_or_else(|| {
                SsoError::Engine(EngineError::LimitExceeded("no free username for identity"))
            })
    }
}
