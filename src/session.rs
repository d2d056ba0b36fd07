//! Local session tokens and staff passwords.
//!
//! Guests get an HS256 access/refresh pair after SSO login. Staff get a
//! separate admin token signed with its own secret, sent as
//! `Authorization: Admin <jwt>`.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use ulid::Ulid;

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::model::UserAccount;

pub const ADMIN_ISSUER: &str = "innkeep-admin";
pub const ADMIN_AUDIENCE: &str = "admin-panel";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("expected a {expected} token, got {found}")]
    WrongType { expected: &'static str, found: String },

    #[error("could not sign token: {0}")]
    Signing(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
    Admin,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::Admin => "admin",
        }
    }
}

trait Expiring {
    fn exp(&self) -> i64;
    fn token_type(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub username: String,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl SessionClaims {
    pub fn user_id(&self) -> Result<Ulid, SessionError> {
        Ulid::from_string(&self.sub).map_err(|e| SessionError::Invalid(format!("subject: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub username: String,
    pub is_staff: bool,
    pub token_type: String,
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl AdminClaims {
    pub fn user_id(&self) -> Result<Ulid, SessionError> {
        Ulid::from_string(&self.sub).map_err(|e| SessionError::Invalid(format!("subject: {e}")))
    }
}

impl Expiring for SessionClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
    fn token_type(&self) -> &str {
        &self.token_type
    }
}

impl Expiring for AdminClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
    fn token_type(&self) -> &str {
        &self.token_type
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Signs and verifies every locally issued token. Expiry is judged against
/// the injected clock rather than the system time.
pub struct TokenIssuer {
    session_enc: EncodingKey,
    session_dec: DecodingKey,
    admin_enc: EncodingKey,
    admin_dec: DecodingKey,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            session_enc: EncodingKey::from_secret(config.secret.as_bytes()),
            session_dec: DecodingKey::from_secret(config.secret.as_bytes()),
            admin_enc: EncodingKey::from_secret(config.admin_secret.as_bytes()),
            admin_dec: DecodingKey::from_secret(config.admin_secret.as_bytes()),
            config,
            clock,
        }
    }

    fn session_claims(&self, user: &UserAccount, kind: TokenType, ttl: std::time::Duration) -> SessionClaims {
        let iat = self.clock.now().timestamp();
        SessionClaims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            token_type: kind.as_str().into(),
            iat,
            exp: iat.saturating_add(ttl.as_secs() as i64),
            jti: Ulid::new().to_string(),
        }
    }

    pub fn issue_pair(&self, user: &UserAccount) -> Result<TokenPair, SessionError> {
        let access = self.session_claims(user, TokenType::Access, self.config.access_ttl);
        let refresh = self.session_claims(user, TokenType::Refresh, self.config.refresh_ttl);
        Ok(TokenPair {
            access: sign(&access, &self.session_enc)?,
            refresh: sign(&refresh, &self.session_enc)?,
        })
    }

    pub fn issue_admin(&self, user: &UserAccount) -> Result<String, SessionError> {
        let iat = self.clock.now().timestamp();
        let claims = AdminClaims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            is_staff: user.is_staff,
            token_type: TokenType::Admin.as_str().into(),
            scope: "admin".into(),
            iat,
            exp: iat.saturating_add(self.config.admin_ttl.as_secs() as i64),
            iss: ADMIN_ISSUER.into(),
            aud: ADMIN_AUDIENCE.into(),
        };
        sign(&claims, &self.admin_enc)
    }

    pub fn verify_access(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.verify(token, &self.session_dec, session_validation(), TokenType::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.verify(token, &self.session_dec, session_validation(), TokenType::Refresh)
    }

    pub fn verify_admin(&self, token: &str) -> Result<AdminClaims, SessionError> {
        let mut validation = session_validation();
        validation.set_issuer(&[ADMIN_ISSUER]);
        validation.set_audience(&[ADMIN_AUDIENCE]);
        let claims: AdminClaims = self.verify(token, &self.admin_dec, validation, TokenType::Admin)?;
        if !claims.is_staff {
            return Err(SessionError::Invalid("not a staff token".into()));
        }
        Ok(claims)
    }

    fn verify<C: DeserializeOwned + Expiring>(
        &self,
        token: &str,
        key: &DecodingKey,
        validation: Validation,
        expected: TokenType,
    ) -> Result<C, SessionError> {
        let claims = jsonwebtoken::decode::<C>(token, key, &validation)
            .map_err(|e| SessionError::Invalid(e.to_string()))?
            .claims;
        if claims.exp() <= self.clock.now().timestamp() {
            return Err(SessionError::Expired);
        }
        if claims.token_type() != expected.as_str() {
            return Err(SessionError::WrongType {
                expected: expected.as_str(),
                found: claims.token_type().to_string(),
            });
        }
        Ok(claims)
    }
}

fn session_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is checked against the injected clock in `verify`.
    validation.validate_exp = false;
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation
}

fn sign<C: Serialize>(claims: &C, key: &EncodingKey) -> Result<String, SessionError> {
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| SessionError::Signing(e.to_string()))
}

pub fn hash_password(password: &str) -> Result<String, SessionError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| SessionError::Hashing(e.to_string()))
}

/// False for a wrong password and for an unparseable stored hash.
pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        tracing::warn!("stored password hash is unparseable");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn user(is_staff: bool) -> UserAccount {
        UserAccount {
            id: Ulid::new(),
            username: "maryam".into(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_staff,
            is_active: true,
            password_hash: None,
            created_at: chrono::Utc::now(),
        }
    }

    fn issuer() -> (TokenIssuer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::on("2025-05-01".parse().unwrap()));
        let issuer = TokenIssuer::new(SessionConfig::with_secrets("s3cret", "adm1n"), clock.clone());
        (issuer, clock)
    }

    #[test]
    fn access_and_refresh_are_not_interchangeable() {
        let (issuer, _) = issuer();
        let u = user(false);
        let pair = issuer.issue_pair(&u).unwrap();

        let claims = issuer.verify_access(&pair.access).unwrap();
        assert_eq!(claims.user_id().unwrap(), u.id);
        assert!(issuer.verify_refresh(&pair.refresh).is_ok());
        assert!(matches!(
            issuer.verify_access(&pair.refresh),
            Err(SessionError::WrongType { expected: "access", .. })
        ));
        assert!(matches!(
            issuer.verify_refresh(&pair.access),
            Err(SessionError::WrongType { .. })
        ));
    }

    #[test]
    fn access_token_expires_on_the_clock() {
        let (issuer, clock) = issuer();
        let pair = issuer.issue_pair(&user(false)).unwrap();
        clock.advance(Duration::from_secs(3599));
        assert!(issuer.verify_access(&pair.access).is_ok());
        clock.advance(Duration::from_secs(1));
        assert!(matches!(issuer.verify_access(&pair.access), Err(SessionError::Expired)));
        assert!(issuer.verify_refresh(&pair.refresh).is_ok());
    }

    #[test]
    fn admin_tokens_use_their_own_secret() {
        let (issuer, _) = issuer();
        let staff = user(true);
        let admin = issuer.issue_admin(&staff).unwrap();
        let claims = issuer.verify_admin(&admin).unwrap();
        assert_eq!(claims.scope, "admin");
        assert_eq!(claims.aud, ADMIN_AUDIENCE);

        // A session token is signed with the other secret.
        let pair = issuer.issue_pair(&staff).unwrap();
        assert!(matches!(issuer.verify_admin(&pair.access), Err(SessionError::Invalid(_))));
        assert!(matches!(issuer.verify_access(&admin), Err(SessionError::Invalid(_))));
    }

    #[test]
    fn non_staff_admin_token_rejected() {
        let (issuer, _) = issuer();
        let token = issuer.issue_admin(&user(false)).unwrap();
        assert!(issuer.verify_admin(&token).is_err());
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password(&hash, "correct horse"));
        assert!(!verify_password(&hash, "battery staple"));
        assert!(!verify_password("not-a-phc-string", "correct horse"));
    }
}
