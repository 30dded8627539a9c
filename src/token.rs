//! Signed access/refresh token codec. Pure CPU work, no I/O.
//!
//! Decode distinguishes "expired" from "malformed/forged" so callers can pick
//! different recovery paths: an expired access token may still be refreshed,
//! anything else is rejected outright.

use anyhow::{anyhow, Result};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by every token we issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user id.
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Token family shared with the paired session record; the replay handle.
    pub fam: String,
    pub kind: TokenKind,
    /// Paired session record id. Refresh tokens only, so the record can be
    /// located for the family check without a client-side session-id cookie.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

fn parse_algorithm(name: &str) -> Result<Algorithm> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(anyhow!("unsupported signing algorithm '{}' (HMAC family only)", other)),
    }
}

impl TokenCodec {
    /// Build the codec from configuration. Returns `None` in relaxed mode with
    /// no secret configured: every request then resolves anonymous instead of
    /// erroring. Missing secret without the relaxed flag refuses to start.
    pub fn from_config(cfg: &AuthConfig) -> Result<Option<TokenCodec>> {
        let algorithm = parse_algorithm(&cfg.algorithm)?;
        let Some(secret) = cfg.secret.as_deref() else {
            if cfg.relaxed {
                warn!(target: "auth", "no signing secret configured and relaxed mode is on; all requests will resolve anonymous");
                return Ok(None);
            }
            return Err(anyhow!("no signing secret configured"));
        };
        Ok(Some(TokenCodec {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            issuer: cfg.issuer.clone(),
            access_ttl_secs: cfg.access_ttl_secs,
            refresh_ttl_secs: cfg.refresh_ttl_secs,
        }))
    }

    pub fn access_ttl_secs(&self) -> i64 { self.access_ttl_secs }
    pub fn refresh_ttl_secs(&self) -> i64 { self.refresh_ttl_secs }

    /// Sign arbitrary claims. Issuance paths should prefer the mint helpers.
    pub fn encode(&self, claims: &TokenClaims) -> Result<String> {
        let header = Header::new(self.algorithm);
        jsonwebtoken::encode(&header, claims, &self.encoding).map_err(|e| anyhow!("token encode failed: {}", e))
    }

    /// Short-lived access token for `subject` within `family`.
    pub fn mint_access(&self, subject: &str, family: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        self.encode(&TokenClaims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.access_ttl_secs,
            fam: family.to_string(),
            kind: TokenKind::Access,
            sid: None,
        })
    }

    /// Long-lived refresh token, bound to its session record via `sid`.
    pub fn mint_refresh(&self, subject: &str, family: &str, session_id: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        self.encode(&TokenClaims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.refresh_ttl_secs,
            fam: family.to_string(),
            kind: TokenKind::Refresh,
            sid: Some(session_id.to_string()),
        })
    }

    /// Verify and decode a token of either kind.
    pub fn decode(&self, token: &str) -> AuthResult<TokenClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.leeway = 5;
        match jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => Err(map_decode_error(&e)),
        }
    }

    /// Decode and require an access token.
    pub fn decode_access(&self, token: &str) -> AuthResult<TokenClaims> {
        let claims = self.decode(token)?;
        if claims.kind != TokenKind::Access {
            return Err(AuthError::Malformed);
        }
        Ok(claims)
    }

    /// Decode and require a refresh token carrying its session id.
    pub fn decode_refresh(&self, token: &str) -> AuthResult<TokenClaims> {
        let claims = self.decode(token)?;
        if claims.kind != TokenKind::Refresh || claims.sid.is_none() {
            return Err(AuthError::Malformed);
        }
        Ok(claims)
    }
}

fn map_decode_error(e: &jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::BadSignature,
        ErrorKind::InvalidIssuer => AuthError::WrongIssuer,
        _ => AuthError::Malformed,
    }
}
