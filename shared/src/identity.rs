//! Voter identity resolution.
//!
//! The voting core only ever sees an already-resolved voter id. Where that id
//! comes from is a deployment policy, selected once at startup:
//!
//! - `client-token`: an opaque token the client generates and persists (a UUID
//!   kept in local storage, for example).
//! - `network-origin`: the first `X-Forwarded-For` entry, falling back to the
//!   peer address. Anyone can set that header, and every user behind one NAT
//!   shares a single identity.

use std::fmt;
use std::str::FromStr;

/// Network facts about the request a vote arrived on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOrigin {
    pub forwarded_for: Option<String>,
    pub peer: Option<String>,
}

impl RequestOrigin {
    /// First forwarded-for entry, else the direct peer address.
    pub fn client_address(&self) -> Option<String> {
        self.forwarded_for
            .as_deref()
            .and_then(|header| header.split(',').next())
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .or_else(|| self.peer.clone())
    }
}

pub trait IdentityResolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, supplied: Option<&str>, origin: &RequestOrigin) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct ClientTokenResolver;

impl IdentityResolver for ClientTokenResolver {
    fn name(&self) -> &'static str {
        "client-token"
    }

    fn resolve(&self, supplied: Option<&str>, _origin: &RequestOrigin) -> Option<String> {
        supplied.map(str::to_string)
    }
}

#[derive(Debug, Default)]
pub struct NetworkOriginResolver;

impl IdentityResolver for NetworkOriginResolver {
    fn name(&self) -> &'static str {
        "network-origin"
    }

    fn resolve(&self, _supplied: Option<&str>, origin: &RequestOrigin) -> Option<String> {
        origin.client_address()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentityPolicy {
    #[default]
    ClientToken,
    NetworkOrigin,
}

impl IdentityPolicy {
    pub fn resolver(self) -> Box<dyn IdentityResolver> {
        match self {
            IdentityPolicy::ClientToken => Box::new(ClientTokenResolver),
            IdentityPolicy::NetworkOrigin => Box::new(NetworkOriginResolver),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown voter identity policy: {0} (expected client-token or network-origin)")]
pub struct UnknownPolicy(pub String);

impl FromStr for IdentityPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client-token" | "token" => Ok(IdentityPolicy::ClientToken),
            "network-origin" | "ip" => Ok(IdentityPolicy::NetworkOrigin),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for IdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityPolicy::ClientToken => f.write_str("client-token"),
            IdentityPolicy::NetworkOrigin => f.write_str("network-origin"),
        }
    }
}

// Backend-specific Rocket implementation
#[cfg(feature = "backend")]
mod backend_impl {
    use super::*;
    use rocket::request::{FromRequest, Outcome};
    use rocket::Request;

    #[rocket::async_trait]
    impl<'r> FromRequest<'r> for RequestOrigin {
        type Error = ();

        async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
            let forwarded_for = req.headers()
                .get_one("X-Forwarded-For")
                .map(str::to_string);
            let peer = req.remote().map(|addr| addr.ip().to_string());

            Outcome::Success(RequestOrigin { forwarded_for, peer })
        }
    }
}
