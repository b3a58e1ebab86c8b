//! Proxy records referenced by monitors.

use serde::{Deserialize, Serialize};

/// Credentials for an authenticated proxy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// A proxy through which a monitor's checks are routed.
///
/// Fetched lazily when a due monitor references one; a missing or failed
/// lookup degrades to "no proxy" and is never fatal to the check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub id: String,
    /// Proxy protocol tag (`http`, `socks5`, ...), opaque to the scheduler.
    pub protocol: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub auth: Option<ProxyAuth>,
}
