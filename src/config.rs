//! Process configuration, read once from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use base64::Engine as _;
use jsonwebtoken::Algorithm;

use crate::limits::{MAX_PROFILE_ATTEMPTS, MAX_SSO_TIMEOUT_SECS, MIN_SSO_TIMEOUT_SECS};

const DEV_SESSION_SECRET: &str = "innkeep-dev-session-secret";
const DEV_ADMIN_SECRET: &str = "innkeep-dev-admin-secret";
const DEFAULT_BACKEND_URL: &str = "https://api.injast.life";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    /// Echo internal error text in 500 responses.
    pub debug: bool,
    pub session: SessionConfig,
    pub admin_bootstrap: Option<AdminBootstrap>,
    pub sso: SsoConfig,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub admin_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub admin_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct SsoConfig {
    pub backend_url: String,
    pub jwks_url: String,
    pub exchange_url: String,
    pub profile_url: String,
    pub audience: String,
    pub algorithm: Algorithm,
    pub jwks_ttl: Duration,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub timeout: Duration,
    pub profile_attempts: u32,
    pub profile_retry_delay: Duration,
    /// AES-256-GCM key for stored SSO tokens. `None` means a random key per process.
    pub token_key: Option<[u8; 32]>,
}

impl SsoConfig {
    pub fn for_backend(backend_url: &str) -> Self {
        let base = backend_url.trim_end_matches('/');
        Self {
            backend_url: base.to_string(),
            jwks_url: format!("{base}/.well-known/jwks.json"),
            exchange_url: format!("{base}/service/user/sso/exchange-session-code"),
            profile_url: format!("{base}/service/user/sso/user-basic"),
            audience: "injast".into(),
            algorithm: Algorithm::EdDSA,
            jwks_ttl: Duration::from_secs(3600),
            api_key: None,
            api_secret: None,
            timeout: Duration::from_secs(MAX_SSO_TIMEOUT_SECS),
            profile_attempts: 3,
            profile_retry_delay: Duration::from_millis(1000),
            token_key: None,
        }
    }
}

impl SessionConfig {
    pub fn with_secrets(secret: &str, admin_secret: &str) -> Self {
        Self {
            secret: secret.into(),
            admin_secret: admin_secret.into(),
            access_ttl: Duration::from_secs(3600),
            refresh_ttl: Duration::from_secs(7 * 24 * 3600),
            admin_ttl: Duration::from_secs(3600),
        }
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.string(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str) -> anyhow::Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("{key}={raw:?}: {e}")),
        }
    }

    fn flag(&self, key: &str) -> bool {
        matches!(
            self.string(key).as_deref(),
            Some("1" | "true" | "yes" | "on")
        )
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let env = Env(lookup);

        let session = SessionConfig {
            secret: env.string("INNKEEP_SESSION_SECRET").unwrap_or_else(|| {
                tracing::warn!("INNKEEP_SESSION_SECRET unset, using the development secret");
                DEV_SESSION_SECRET.into()
            }),
            admin_secret: env.string("INNKEEP_ADMIN_SECRET").unwrap_or_else(|| {
                tracing::warn!("INNKEEP_ADMIN_SECRET unset, using the development secret");
                DEV_ADMIN_SECRET.into()
            }),
            access_ttl: Duration::from_secs(env.parse("INNKEEP_ACCESS_TTL_SECS")?.unwrap_or(3600)),
            refresh_ttl: Duration::from_secs(
                env.parse("INNKEEP_REFRESH_TTL_SECS")?.unwrap_or(7 * 24 * 3600),
            ),
            admin_ttl: Duration::from_secs(env.parse("INNKEEP_ADMIN_TTL_SECS")?.unwrap_or(3600)),
        };
        if session.secret == session.admin_secret {
            bail!("INNKEEP_SESSION_SECRET and INNKEEP_ADMIN_SECRET must differ");
        }

        let admin_bootstrap = match (
            env.string("INNKEEP_ADMIN_USERNAME"),
            env.string("INNKEEP_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(AdminBootstrap { username, password }),
            (None, None) => None,
            _ => bail!("INNKEEP_ADMIN_USERNAME and INNKEEP_ADMIN_PASSWORD must be set together"),
        };

        let backend = env.or("INJAST_BACKEND_URL", DEFAULT_BACKEND_URL);
        let mut sso = SsoConfig::for_backend(&backend);
        if let Some(url) = env.string("INJAST_JWKS_URL") {
            sso.jwks_url = url;
        }
        if let Some(aud) = env.string("INJAST_JWT_AUDIENCE") {
            sso.audience = aud;
        }
        if let Some(alg) = env.string("INJAST_JWT_ALGORITHM") {
            sso.algorithm = Algorithm::from_str(&alg)
                .with_context(|| format!("INJAST_JWT_ALGORITHM={alg:?}"))?;
        }
        if let Some(ttl) = env.parse::<u64>("INJAST_JWKS_CACHE_TTL")? {
            sso.jwks_ttl = Duration::from_secs(ttl);
        }
        sso.api_key = env.string("INJAST_API_KEY");
        sso.api_secret = env.string("INJAST_API_SECRET");
        if let Some(secs) = env.parse::<u64>("INJAST_HTTP_TIMEOUT_SECS")? {
            sso.timeout = Duration::from_secs(secs.clamp(MIN_SSO_TIMEOUT_SECS, MAX_SSO_TIMEOUT_SECS));
        }
        if let Some(n) = env.parse::<u32>("INJAST_PROFILE_RETRIES")? {
            sso.profile_attempts = n.clamp(1, MAX_PROFILE_ATTEMPTS);
        }
        if let Some(ms) = env.parse::<u64>("INJAST_PROFILE_RETRY_DELAY_MS")? {
            sso.profile_retry_delay = Duration::from_millis(ms);
        }
        if let Some(encoded) = env.string("INJAST_TOKEN_KEY") {
            sso.token_key = Some(decode_key(&encoded)?);
        }

        Ok(Self {
            bind: env.or("INNKEEP_BIND", "0.0.0.0"),
            port: env.parse("INNKEEP_PORT")?.unwrap_or(8000),
            data_dir: PathBuf::from(env.or("INNKEEP_DATA_DIR", "./data")),
            compact_threshold: env.parse("INNKEEP_COMPACT_THRESHOLD")?.unwrap_or(1000),
            metrics_port: env.parse("INNKEEP_METRICS_PORT")?,
            debug: env.flag("INNKEEP_DEBUG"),
            session,
            admin_bootstrap,
            sso,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("innkeep.wal")
    }
}

fn decode_key(encoded: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .context("INJAST_TOKEN_KEY is not valid base64")?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| anyhow::anyhow!("INJAST_TOKEN_KEY must decode to 32 bytes, got {}", bytes.len()))
}
