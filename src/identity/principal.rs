use serde::{Deserialize, Serialize};

/// Where the winning credential came from. Recorded on the principal so
/// boundaries and telemetry can tell header-auth from cookie-auth apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialSource {
    Header,
    Cookie,
    WebsocketQuery,
    None,
}

/// The resolved caller. Recomputed per request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Authenticated user id, or the anonymous pseudo-id used for telemetry
    /// bucketing only.
    pub user_id: String,
    pub authenticated: bool,
    pub source: CredentialSource,
}

impl Principal {
    pub fn authenticated(user_id: impl Into<String>, source: CredentialSource) -> Self {
        Principal { user_id: user_id.into(), authenticated: true, source }
    }

    pub fn anonymous(pseudo_id: impl Into<String>) -> Self {
        Principal { user_id: pseudo_id.into(), authenticated: false, source: CredentialSource::None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_serializes_kebab_case() {
        let s = serde_json::to_string(&CredentialSource::WebsocketQuery).unwrap();
        assert_eq!(s, "\"websocket-query\"");
    }

    #[test]
    fn anonymous_is_never_authenticated() {
        let p = Principal::anonymous("anon-abc123");
        assert!(!p.authenticated);
        assert_eq!(p.source, CredentialSource::None);
    }
}
