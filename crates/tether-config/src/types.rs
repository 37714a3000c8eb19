//! Configuration struct definitions.
//!
//! Every section uses `#[serde(default)]` so a partial file only needs to name
//! the keys it changes. The `Default` impls mirror `defaults.toml`.

use std::fmt;
use std::path::PathBuf;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote gateway endpoint and handshake settings.
    pub gateway: GatewaySection,
    /// Proxy selection for sessions.
    pub proxy: ProxySection,
    /// Client identification material.
    pub identity: IdentitySection,
    /// How credentials are shown in logs and output.
    pub display: DisplaySection,
    /// Input and output file locations.
    pub files: FilesSection,
    /// Logging and tracing configuration.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// GatewaySection
// ---------------------------------------------------------------------------

/// Gateway endpoint settings shared by every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// `WebSocket` URL of the gateway (`ws://` or `wss://`).
    pub url: String,
    /// Seconds to wait for the gateway's hello frame after the upgrade.
    pub hello_timeout_secs: u64,
    /// Intents bitmask sent in the identify payload.
    pub intents: u32,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            url: "wss://gateway.example.com/?v=9&encoding=json".to_owned(),
            hello_timeout_secs: 30,
            intents: 513,
        }
    }
}

// ---------------------------------------------------------------------------
// ProxySection
// ---------------------------------------------------------------------------

/// Proxy protocols accepted in `proxy.protocol` after normalization.
pub const SUPPORTED_PROXY_PROTOCOLS: &[&str] = &["http", "socks4", "socks5"];

/// Proxy assignment for sessions.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ProxySection {
    /// A single proxy used by every session when `from_file` is off. Empty
    /// means no proxy.
    pub address: String,
    /// Proxy protocol: `http`, `https`, `socks4` or `socks5`. `https` and
    /// unknown values are normalized to `http` at load time.
    pub protocol: String,
    /// Draw a random proxy per session from the proxies file.
    pub from_file: bool,
    /// Also route the persistent socket through the session's proxy.
    pub gateway_proxy: bool,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            address: String::new(),
            protocol: "http".to_owned(),
            from_file: false,
            gateway_proxy: false,
        }
    }
}

impl fmt::Debug for ProxySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySection")
            .field("address", &redact_userinfo(&self.address))
            .field("protocol", &self.protocol)
            .field("from_file", &self.from_file)
            .field("gateway_proxy", &self.gateway_proxy)
            .finish()
    }
}

impl Serialize for ProxySection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ProxySection", 4)?;
        state.serialize_field("address", &redact_userinfo(&self.address))?;
        state.serialize_field("protocol", &self.protocol)?;
        state.serialize_field("from_file", &self.from_file)?;
        state.serialize_field("gateway_proxy", &self.gateway_proxy)?;
        state.end()
    }
}

/// Replace the `user:password@` part of a proxy address with `***@`.
#[must_use]
pub fn redact_userinfo(address: &str) -> String {
    let (scheme, rest) = match address.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, address),
    };
    let Some((_, host)) = rest.rsplit_once('@') else {
        return address.to_owned();
    };
    match scheme {
        Some(scheme) => format!("{scheme}://***@{host}"),
        None => format!("***@{host}"),
    }
}

// ---------------------------------------------------------------------------
// IdentitySection
// ---------------------------------------------------------------------------

/// Which kind of client the identification material describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// A browser-hosted client.
    #[default]
    Browser,
    /// A native desktop client.
    Native,
}

/// Client identification overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySection {
    /// Client mode used to pick the default user agent.
    pub mode: IdentityMode,
    /// Explicit user agent. When unset, a default for `mode` is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Explicit locale. When unset, one is drawn at random per run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

// ---------------------------------------------------------------------------
// DisplaySection
// ---------------------------------------------------------------------------

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    /// Mask the last third of every credential in logs.
    pub censor_token: bool,
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self { censor_token: true }
    }
}

// ---------------------------------------------------------------------------
// FilesSection
// ---------------------------------------------------------------------------

/// Input and output file locations, relative to the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesSection {
    /// One credential per line (`token` or `email:password:token`).
    pub tokens: PathBuf,
    /// One proxy per line, used when `proxy.from_file` is set.
    pub proxies: PathBuf,
    /// JSON array of messages handed to every session.
    pub messages: PathBuf,
    /// Where the credentials of retired sessions are appended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retired: Option<PathBuf>,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            tokens: PathBuf::from("tokens.txt"),
            proxies: PathBuf::from("proxies.txt"),
            messages: PathBuf::from("messages.json"),
            retired: None,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"` (human-friendly), `"compact"` (one-line),
    /// `"json"` (structured), or `"full"` (verbose).
    pub format: String,
    /// Per-crate tracing directives (e.g. `["tether_gateway=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
