//! External credential issuer seam. The real OAuth code exchange lives
//! outside this crate; we only ever consume its output as raw claims. A
//! static issuer is provided for development and tests.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    /// Upstream provider name ("google", "spotify", ...).
    pub provider: String,
    pub code: String,
    pub redirect_uri: Option<String>,
}

/// What an exchange yields; consumed as-is, never re-derived here.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub subject: String,
    pub scopes: Vec<String>,
    /// Unix seconds at which the upstream credential expires.
    pub expiry: i64,
}

#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn exchange(&self, req: &ExchangeRequest) -> Result<IssuedCredential>;
}

/// Fixed code → subject table. Configure via `DOORMAN_DEV_CODES`, a
/// comma-separated list of `code:subject` pairs.
pub struct StaticCredentialIssuer {
    codes: HashMap<String, String>,
}

impl StaticCredentialIssuer {
    pub fn new() -> Self { StaticCredentialIssuer { codes: HashMap::new() } }

    pub fn with_code(mut self, code: &str, subject: &str) -> Self {
        self.codes.insert(code.to_string(), subject.to_string());
        self
    }

    pub fn from_env() -> Self {
        let mut issuer = Self::new();
        if let Ok(raw) = std::env::var("DOORMAN_DEV_CODES") {
            for pair in raw.split(',') {
                if let Some((code, subject)) = pair.split_once(':') {
                    let (code, subject) = (code.trim(), subject.trim());
                    if !code.is_empty() && !subject.is_empty() {
                        issuer.codes.insert(code.to_string(), subject.to_string());
                    }
                }
            }
        }
        issuer
    }
}

impl Default for StaticCredentialIssuer {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl CredentialIssuer for StaticCredentialIssuer {
    async fn exchange(&self, req: &ExchangeRequest) -> Result<IssuedCredential> {
        let Some(subject) = self.codes.get(&req.code) else {
            return Err(anyhow!("invalid_grant"));
        };
        Ok(IssuedCredential {
            subject: subject.clone(),
            scopes: vec!["assistant".to_string()],
            expiry: Utc::now().timestamp() + 3600,
        })
    }
}
