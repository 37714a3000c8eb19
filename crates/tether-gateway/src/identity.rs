//! Client identification material.
//!
//! Chosen once per process run and shared, read-only, by every session. The
//! material names this client honestly; operators can override the user
//! agent and locale through configuration.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use rand::seq::SliceRandom;

/// Locales a run may present, one drawn uniformly at random per run.
pub const LOCALES: &[&str] = &[
    "de-AT", "de-DE", "de-IT", "de-LI", "de-LU", "en-AG", "en-AI", "en-AT", "en-AU", "en-BB",
    "en-CA", "en-BS", "en-CH", "en-DE", "en-FI", "en-GB", "en-HK", "en-IN", "en-MY", "en-SG",
    "en-US", "fr-CA", "fr-FR",
];

/// Client name reported in the identify properties.
const CLIENT_NAME: &str = "tether";

/// Crate version reported in user agents and properties.
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Which kind of client the material describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClientMode {
    /// A browser-hosted client.
    #[default]
    Browser,
    /// A native desktop client.
    Native,
}

impl std::fmt::Display for ClientMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Browser => write!(f, "browser"),
            Self::Native => write!(f, "native"),
        }
    }
}

impl ClientMode {
    /// The user agent sent when no override is configured.
    #[must_use]
    pub fn default_user_agent(self) -> String {
        match self {
            Self::Browser => format!("Mozilla/5.0 (compatible; {CLIENT_NAME}/{CLIENT_VERSION})"),
            Self::Native => {
                format!("{CLIENT_NAME}/{CLIENT_VERSION} ({})", std::env::consts::OS)
            },
        }
    }

    fn browser_field(self) -> String {
        match self {
            Self::Browser => CLIENT_NAME.to_owned(),
            Self::Native => format!("{CLIENT_NAME}-native"),
        }
    }
}

/// Operator overrides applied on top of the randomized selection.
#[derive(Debug, Clone, Default)]
pub struct IdentityOverrides {
    /// Replaces the mode's default user agent.
    pub user_agent: Option<String>,
    /// Replaces the randomly drawn locale.
    pub locale: Option<String>,
}

/// The user agent, locale and encoded client blob shared by all sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMaterial {
    mode: ClientMode,
    locale: String,
    user_agent: String,
    build_number: u32,
    blob: String,
}

impl IdentityMaterial {
    /// Draw the per-run material.
    ///
    /// The locale comes from [`LOCALES`] unless overridden; the build number
    /// is the sum of four draws below 100000, 10000, 1000 and 100.
    pub fn select<R: Rng + ?Sized>(
        mode: ClientMode,
        overrides: &IdentityOverrides,
        rng: &mut R,
    ) -> Self {
        let locale = match &overrides.locale {
            Some(locale) => locale.clone(),
            None => LOCALES.choose(rng).copied().unwrap_or("en-US").to_owned(),
        };
        let build_number = [100_000_u32, 10_000, 1_000, 100]
            .iter()
            .fold(0_u32, |acc, bound| acc.saturating_add(rng.gen_range(0..*bound)));

        let mut material = Self::fixed(mode, &locale, build_number);
        if let Some(user_agent) = &overrides.user_agent {
            material.user_agent.clone_from(user_agent);
            material.blob = encode_blob(&material.properties());
        }
        material
    }

    /// Build material from explicit values, without any randomness.
    #[must_use]
    pub fn fixed(mode: ClientMode, locale: &str, build_number: u32) -> Self {
        let mut material = Self {
            mode,
            locale: locale.to_owned(),
            user_agent: mode.default_user_agent(),
            build_number,
            blob: String::new(),
        };
        material.blob = encode_blob(&material.properties());
        material
    }

    /// The client mode.
    #[must_use]
    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    /// The locale presented by every session of this run.
    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// The `User-Agent` header value.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// The client build number embedded in the blob.
    #[must_use]
    pub fn build_number(&self) -> u32 {
        self.build_number
    }

    /// Base64 (standard alphabet, padded) encoding of [`Self::properties`].
    #[must_use]
    pub fn blob(&self) -> &str {
        &self.blob
    }

    /// The client properties template with this run's values substituted.
    #[must_use]
    pub fn properties(&self) -> serde_json::Value {
        serde_json::json!({
            "os": std::env::consts::OS,
            "browser": self.mode.browser_field(),
            "device": "",
            "system_locale": self.locale,
            "browser_user_agent": self.user_agent,
            "browser_version": CLIENT_VERSION,
            "os_version": "",
            "release_channel": "stable",
            "client_build_number": self.build_number,
            "client_event_source": null,
        })
    }
}

fn encode_blob(properties: &serde_json::Value) -> String {
    STANDARD.encode(properties.to_string())
}
