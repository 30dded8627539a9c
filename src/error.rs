//! Unified authentication error taxonomy and mapping helpers.
//! Every decode/store failure is resolved to one of these kinds at the lowest
//! layer; backend-specific error types never travel upward. The split between
//! recoverable (`Expired`) and terminal kinds is what the resolver branches on.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthError {
    /// Token signature verified but the expiry has passed. The one kind a
    /// caller may recover from via silent refresh.
    Expired,
    /// Not a parsable token, or a token of the wrong kind for the slot it was
    /// presented in.
    Malformed,
    /// Parsable token whose signature does not verify against our key.
    BadSignature,
    /// Valid signature, but issued by somebody we are not.
    WrongIssuer,
    /// Refresh token family does not match the live session record (or the
    /// record is gone while the refresh token survives). Treated as token
    /// theft/replay; rejected on every transport.
    FamilyMismatch,
    /// The session record store could not be reached. Infrastructure failure,
    /// not an auth failure; surfaced as retry-later.
    StoreUnavailable,
}

impl AuthError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AuthError::Expired => "token_expired",
            AuthError::Malformed => "token_malformed",
            AuthError::BadSignature => "bad_signature",
            AuthError::WrongIssuer => "wrong_issuer",
            AuthError::FamilyMismatch => "family_mismatch",
            AuthError::StoreUnavailable => "store_unavailable",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthError::Expired => "credential has expired",
            AuthError::Malformed => "credential is not a valid token",
            AuthError::BadSignature => "credential signature verification failed",
            AuthError::WrongIssuer => "credential was issued by an unknown issuer",
            AuthError::FamilyMismatch => "refresh token does not match the session family",
            AuthError::StoreUnavailable => "session store is unreachable, retry later",
        }
    }

    /// Whether a caller holding a refresh token may still recover.
    pub fn recoverable(&self) -> bool { matches!(self, AuthError::Expired) }

    /// Map to HTTP status code. Every auth rejection is 401; only the
    /// infrastructure kind differs so clients know to retry instead of
    /// clearing credentials and re-logging-in.
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::Expired
            | AuthError::Malformed
            | AuthError::BadSignature
            | AuthError::WrongIssuer
            | AuthError::FamilyMismatch => 401,
            AuthError::StoreUnavailable => 503,
        }
    }
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AuthError {}

pub type AuthResult<T> = Result<T, AuthError>;
