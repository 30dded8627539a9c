//! Cookie triad rotation: access, refresh, and the `__session` mirror are
//! written or cleared together, never partially. All three share one
//! attribute block (Path=/, HttpOnly, SameSite=Lax, Priority=High, host-only,
//! Secure iff configured) and differ only in name, value, and Max-Age. A
//! clear is attribute-identical to a set apart from value and Max-Age=0.

use crate::config::AuthConfig;
use crate::identity::{RefreshDecision, ACCESS_COOKIE, MIRROR_COOKIE, REFRESH_COOKIE};

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub secure: bool,
    pub access_max_age_secs: i64,
    pub refresh_max_age_secs: i64,
}

impl CookieSettings {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        CookieSettings {
            secure: cfg.secure_cookies,
            access_max_age_secs: cfg.access_ttl_secs,
            refresh_max_age_secs: cfg.refresh_ttl_secs,
        }
    }
}

/// One Set-Cookie instruction as pure data; boundaries render and attach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: &'static str,
    pub value: String,
    pub max_age_secs: i64,
    pub secure: bool,
}

impl SetCookie {
    /// Render the Set-Cookie header value. No Domain attribute: host-only.
    pub fn header_value(&self) -> String {
        let mut s = format!(
            "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax; Priority=High",
            self.name, self.value, self.max_age_secs
        );
        if self.secure {
            s.push_str("; Secure");
        }
        s
    }
}

/// Full triad for a fresh or refreshed credential pair. The mirror always
/// carries the access token and its Max-Age.
pub fn issue_cookies(access_token: &str, refresh_token: &str, s: &CookieSettings) -> Vec<SetCookie> {
    vec![
        SetCookie {
            name: ACCESS_COOKIE,
            value: access_token.to_string(),
            max_age_secs: s.access_max_age_secs,
            secure: s.secure,
        },
        SetCookie {
            name: REFRESH_COOKIE,
            value: refresh_token.to_string(),
            max_age_secs: s.refresh_max_age_secs,
            secure: s.secure,
        },
        SetCookie {
            name: MIRROR_COOKIE,
            value: access_token.to_string(),
            max_age_secs: s.access_max_age_secs,
            secure: s.secure,
        },
    ]
}

/// Logout: the same three cookies, empty values, Max-Age=0.
pub fn clear_cookies(s: &CookieSettings) -> Vec<SetCookie> {
    [ACCESS_COOKIE, REFRESH_COOKIE, MIRROR_COOKIE]
        .into_iter()
        .map(|name| SetCookie { name, value: String::new(), max_age_secs: 0, secure: s.secure })
        .collect()
}

/// What the boundary attaches after resolution: nothing when no refresh
/// occurred, the full triad when one did.
pub fn rotation_cookies(decision: &RefreshDecision, s: &CookieSettings) -> Vec<SetCookie> {
    match decision {
        RefreshDecision::None => Vec::new(),
        RefreshDecision::Rotated { access_token, refresh_token } => {
            issue_cookies(access_token, refresh_token, s)
        }
    }
}
