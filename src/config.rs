//! Runtime configuration, read once at startup from DOORMAN_* environment
//! variables with sensible defaults. Values are logged by the caller so a
//! misconfigured deployment is visible in the first lines of output.

use anyhow::{anyhow, Result};

/// Default access-token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 900;
/// Default refresh-token lifetime: 30 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 2_592_000;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC signing secret. Absent is a startup error unless `relaxed` is set,
    /// in which case every request resolves anonymous.
    pub secret: Option<String>,
    /// Signing algorithm name; HMAC family only (HS256/HS384/HS512).
    pub algorithm: String,
    /// Issuer string embedded in and required from every token.
    pub issuer: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    /// Explicitly gated missing-secret mode for non-production environments.
    pub relaxed: bool,
    /// Whether cookies carry the Secure attribute (HTTPS deployments).
    pub secure_cookies: bool,
    /// Distributed session backend URL (redis://...). None selects the
    /// in-process backend outright.
    pub store_url: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            algorithm: "HS256".to_string(),
            issuer: "doorman".to_string(),
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
            relaxed: false,
            secure_cookies: false,
            store_url: None,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes" | "on"))
        .unwrap_or(false)
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name).ok().and_then(|v| v.parse::<i64>().ok()).unwrap_or(default)
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let secret = std::env::var("DOORMAN_AUTH_SECRET").ok().filter(|s| !s.is_empty());
        Self {
            secret,
            algorithm: std::env::var("DOORMAN_AUTH_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
            issuer: std::env::var("DOORMAN_AUTH_ISSUER").unwrap_or_else(|_| "doorman".to_string()),
            access_ttl_secs: env_i64("DOORMAN_ACCESS_TTL_SECS", DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl_secs: env_i64("DOORMAN_REFRESH_TTL_SECS", DEFAULT_REFRESH_TTL_SECS),
            relaxed: env_flag("DOORMAN_AUTH_RELAXED"),
            secure_cookies: env_flag("DOORMAN_COOKIE_SECURE"),
            store_url: std::env::var("DOORMAN_SESSION_REDIS_URL").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Validate the combinations that must fail at startup rather than at the
    /// first request: TTL sanity and the missing-secret gate.
    pub fn validate(&self) -> Result<()> {
        if self.access_ttl_secs <= 0 || self.refresh_ttl_secs <= 0 {
            return Err(anyhow!("token TTLs must be positive"));
        }
        if self.refresh_ttl_secs < self.access_ttl_secs {
            return Err(anyhow!("refresh TTL must not be shorter than access TTL"));
        }
        if self.secret.is_none() && !self.relaxed {
            return Err(anyhow!(
                "DOORMAN_AUTH_SECRET is not set; refusing to start (set DOORMAN_AUTH_RELAXED=1 to run anonymous-only)"
            ));
        }
        Ok(())
    }
}
