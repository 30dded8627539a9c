//! Central identity resolution for the backend: who is behind this request or
//! handshake, and did a silent credential refresh happen on the way.
//! Keep the public surface thin and split implementation across sub-modules.

mod anon;
mod credentials;
mod principal;
mod provider;
mod request_context;
mod resolver;

pub use anon::derive_pseudo_id;
pub use credentials::{
    resolve_credential, RawCredential, RawSource, ACCESS_COOKIE, MIRROR_COOKIE, OVERRIDE_HEADER,
    REFRESH_COOKIE,
};
pub use principal::{CredentialSource, Principal};
pub use provider::{CredentialIssuer, ExchangeRequest, IssuedCredential, StaticCredentialIssuer};
pub use request_context::{RequestContext, Transport};
pub use resolver::{CounterSnapshot, IdentityResolver, RefreshDecision, Resolution};
