//! Loading credential, proxy and message files, and turning them into
//! session profiles.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::connection::GatewaySettings;
use crate::credential::Credential;
use crate::identity::IdentityMaterial;
use crate::session::SessionProfile;

/// Errors from loading input files.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// File held nothing usable.
    #[error("no {what} found in {path}")]
    Empty {
        /// What was expected, e.g. "credentials".
        what: &'static str,
        /// Offending file.
        path: PathBuf,
    },

    /// Message file is not a JSON array.
    #[error("failed to parse {path}: {source}")]
    Json {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// No messages to hand out.
    #[error("no messages to assign")]
    NoMessages,

    /// The gateway socket must be proxied but no address can carry it.
    #[error("no proxy address usable for the gateway socket (only http proxies can tunnel it)")]
    NoUsableProxy,
}

fn read_lines(path: &Path) -> Result<Vec<String>, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Read one credential per line, skipping blank lines.
///
/// # Errors
///
/// Fails if the file cannot be read or holds no credentials.
pub fn load_credentials(path: &Path) -> Result<Vec<Credential>, LoadError> {
    let credentials: Vec<Credential> = read_lines(path)?
        .iter()
        .filter_map(|line| Credential::parse_line(line))
        .collect();
    if credentials.is_empty() {
        return Err(LoadError::Empty {
            what: "credentials",
            path: path.to_path_buf(),
        });
    }
    info!(path = %path.display(), count = credentials.len(), "loaded credentials");
    Ok(credentials)
}

/// Read one proxy address per line.
///
/// # Errors
///
/// Fails if the file cannot be read or holds no proxies.
pub fn load_proxies(path: &Path) -> Result<Vec<String>, LoadError> {
    let proxies = read_lines(path)?;
    if proxies.is_empty() {
        return Err(LoadError::Empty {
            what: "proxies",
            path: path.to_path_buf(),
        });
    }
    info!(path = %path.display(), count = proxies.len(), "loaded proxies");
    Ok(proxies)
}

/// Read a JSON array of messages. The values are kept opaque.
///
/// # Errors
///
/// Fails if the file cannot be read, is not a JSON array, or the array is
/// empty.
pub fn load_messages(path: &Path) -> Result<Vec<serde_json::Value>, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let messages: Vec<serde_json::Value> =
        serde_json::from_str(&content).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    if messages.is_empty() {
        return Err(LoadError::Empty {
            what: "messages",
            path: path.to_path_buf(),
        });
    }
    info!(path = %path.display(), count = messages.len(), "loaded messages");
    Ok(messages)
}

// ── Session construction ─────────────────────────────────────

/// Where session proxies come from.
#[derive(Debug, Clone, Default)]
pub enum ProxySource {
    /// No proxy.
    #[default]
    None,
    /// One address for every session.
    Fixed(String),
    /// A random pick from the list, per session.
    FromList(Vec<String>),
}

/// How proxies are assigned to sessions.
#[derive(Debug, Clone)]
pub struct ProxyPlan {
    /// Address source.
    pub source: ProxySource,
    /// Scheme prefixed to addresses that carry none.
    pub protocol: String,
    /// Also route the gateway socket through the proxy.
    pub gateway_proxy: bool,
}

impl Default for ProxyPlan {
    fn default() -> Self {
        Self {
            source: ProxySource::None,
            protocol: "http".to_owned(),
            gateway_proxy: false,
        }
    }
}

impl ProxyPlan {
    /// Every address the plan may hand out, fully qualified.
    ///
    /// When the gateway socket is proxied, addresses that cannot carry an
    /// HTTP `CONNECT` tunnel are dropped with a warning.
    fn candidates(&self) -> Vec<String> {
        let raw: Vec<&str> = match &self.source {
            ProxySource::None => Vec::new(),
            ProxySource::Fixed(address) => vec![address.as_str()],
            ProxySource::FromList(list) => list.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .filter_map(|address| qualify(address, &self.protocol))
            .filter(|address| {
                if !self.gateway_proxy || address.starts_with("http://") {
                    return true;
                }
                warn!(
                    proxy = %address,
                    "skipping proxy that cannot tunnel the gateway socket"
                );
                false
            })
            .collect()
    }
}

/// Give `raw` a scheme. `https` proxies are spoken to in plain http.
fn qualify(raw: &str, protocol: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("https") => {
            Some(format!("http://{rest}"))
        },
        Some((scheme, rest)) => Some(format!("{}://{rest}", scheme.to_ascii_lowercase())),
        None => Some(format!("{protocol}://{raw}")),
    }
}

/// Build one profile per credential.
///
/// Each session draws its proxy uniformly from the plan's addresses. The
/// socket proxy matches the session's proxy only when
/// [`ProxyPlan::gateway_proxy`] is set.
///
/// # Errors
///
/// Returns [`LoadError::NoUsableProxy`] if the plan names proxies and
/// requests a proxied gateway socket, but none of them is an http proxy.
pub fn build_sessions<R: Rng + ?Sized>(
    credentials: Vec<Credential>,
    plan: &ProxyPlan,
    identity: &Arc<IdentityMaterial>,
    settings: &Arc<GatewaySettings>,
    rng: &mut R,
) -> Result<Vec<SessionProfile>, LoadError> {
    let candidates = plan.candidates();
    if plan.gateway_proxy && candidates.is_empty() && has_addresses(&plan.source) {
        return Err(LoadError::NoUsableProxy);
    }

    Ok(credentials
        .into_iter()
        .map(|credential| {
            let proxy = candidates.choose(&mut *rng).cloned();
            let socket_proxy = if plan.gateway_proxy {
                proxy.clone()
            } else {
                None
            };
            let mut profile =
                SessionProfile::new(credential, Arc::clone(identity), Arc::clone(settings));
            profile.proxy = proxy;
            profile.socket_proxy = socket_proxy;
            profile
        })
        .collect())
}

fn has_addresses(source: &ProxySource) -> bool {
    match source {
        ProxySource::None => false,
        ProxySource::Fixed(address) => !address.trim().is_empty(),
        ProxySource::FromList(list) => list.iter().any(|a| !a.trim().is_empty()),
    }
}

/// Give every profile its own copy of `messages`.
///
/// # Errors
///
/// Returns [`LoadError::NoMessages`] if `messages` is empty.
pub fn assign_messages(
    profiles: &mut [SessionProfile],
    messages: &[serde_json::Value],
) -> Result<(), LoadError> {
    if messages.is_empty() {
        return Err(LoadError::NoMessages);
    }
    for profile in profiles.iter_mut() {
        profile.messages = messages.to_vec();
    }
    debug!(
        sessions = profiles.len(),
        messages = messages.len(),
        "assigned messages"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ClientMode;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn shared() -> (Arc<IdentityMaterial>, Arc<GatewaySettings>) {
        (
            Arc::new(IdentityMaterial::fixed(ClientMode::Browser, "en-US", 1)),
            Arc::new(GatewaySettings::new("wss://gateway.invalid")),
        )
    }

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn credentials_skip_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "tokens.txt", "tok1\n\n  \ne@x.com:pw:tok2\n");

        let creds = load_credentials(&path).unwrap();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0].token(), "tok1");
        assert_eq!(creds[1].token(), "tok2");
        assert_eq!(creds[1].email(), Some("e@x.com"));
    }

    #[test]
    fn empty_credentials_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "tokens.txt", "\n\n");
        assert!(matches!(
            load_credentials(&path),
            Err(LoadError::Empty { what: "credentials", .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_proxies(Path::new("/nonexistent/proxies.txt")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
        assert!(err.to_string().contains("proxies.txt"));
    }

    #[test]
    fn proxies_load_and_reject_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "proxies.txt", "1.2.3.4:80\n5.6.7.8:8080\n");
        assert_eq!(load_proxies(&path).unwrap().len(), 2);

        let empty = write(&dir, "empty.txt", "");
        assert!(matches!(load_proxies(&empty), Err(LoadError::Empty { .. })));
    }

    #[test]
    fn messages_load_as_opaque_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "messages.json", r#"[{"content":"hi"},"plain",3]"#);
        let messages = load_messages(&path).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["content"], "hi");
    }

    #[test]
    fn messages_reject_empty_and_non_array() {
        let dir = tempfile::tempdir().unwrap();
        let empty = write(&dir, "empty.json", "[]");
        assert!(matches!(load_messages(&empty), Err(LoadError::Empty { .. })));

        let object = write(&dir, "object.json", r#"{"content":"hi"}"#);
        assert!(matches!(load_messages(&object), Err(LoadError::Json { .. })));
    }

    #[test]
    fn sessions_without_proxy() {
        let (identity, settings) = shared();
        let mut rng = StdRng::seed_from_u64(1);
        let profiles = build_sessions(
            vec![Credential::new("a"), Credential::new("b")],
            &ProxyPlan::default(),
            &identity,
            &settings,
            &mut rng,
        )
        .unwrap();
        assert_eq!(profiles.len(), 2);
        assert!(profiles.iter().all(|p| p.proxy.is_none() && p.socket_proxy.is_none()));
        assert!(Arc::ptr_eq(&profiles[0].identity, &profiles[1].identity));
    }

    #[test]
    fn sessions_draw_from_list_and_qualify_scheme() {
        let (identity, settings) = shared();
        let list = vec!["1.1.1.1:80".to_owned(), "socks5://2.2.2.2:1080".to_owned()];
        let plan = ProxyPlan {
            source: ProxySource::FromList(list),
            protocol: "http".to_owned(),
            gateway_proxy: false,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let creds = (0..20).map(|i| Credential::new(format!("t{i}"))).collect();
        let profiles = build_sessions(creds, &plan, &identity, &settings, &mut rng).unwrap();

        for profile in &profiles {
            let proxy = profile.proxy.as_deref().unwrap();
            assert!(proxy == "http://1.1.1.1:80" || proxy == "socks5://2.2.2.2:1080");
            assert!(profile.socket_proxy.is_none());
        }
    }

    #[test]
    fn gateway_proxy_mirrors_session_proxy() {
        let (identity, settings) = shared();
        let plan = ProxyPlan {
            source: ProxySource::Fixed("user:pw@10.0.0.1:3128".to_owned()),
            protocol: "http".to_owned(),
            gateway_proxy: true,
        };
        let mut rng = StdRng::seed_from_u64(5);
        let profiles = build_sessions(
            vec![Credential::new("a")],
            &plan,
            &identity,
            &settings,
            &mut rng,
        )
        .unwrap();
        assert_eq!(
            profiles[0].proxy.as_deref(),
            Some("http://user:pw@10.0.0.1:3128")
        );
        assert_eq!(profiles[0].socket_proxy, profiles[0].proxy);
    }

    #[test]
    fn blank_fixed_proxy_means_none() {
        let plan = ProxyPlan {
            source: ProxySource::Fixed("  ".to_owned()),
            ..ProxyPlan::default()
        };
        assert!(plan.candidates().is_empty());
    }

    #[test]
    fn https_proxy_is_spoken_to_over_http() {
        let (identity, settings) = shared();
        let plan = ProxyPlan {
            source: ProxySource::Fixed("HTTPS://127.0.0.1:3128".to_owned()),
            protocol: "http".to_owned(),
            gateway_proxy: true,
        };
        let mut rng = StdRng::seed_from_u64(2);
        let profiles = build_sessions(
            vec![Credential::new("a")],
            &plan,
            &identity,
            &settings,
            &mut rng,
        )
        .unwrap();

        let socket_proxy = profiles[0].socket_proxy.as_deref().unwrap();
        assert_eq!(socket_proxy, "http://127.0.0.1:3128");
        let endpoint = crate::proxy::ProxyEndpoint::parse(socket_proxy).unwrap();
        assert_eq!(endpoint.port(), 3128);
    }

    #[test]
    fn gateway_proxy_skips_lines_that_cannot_tunnel() {
        let (identity, settings) = shared();
        let plan = ProxyPlan {
            source: ProxySource::FromList(vec![
                "socks5://2.2.2.2:1080".to_owned(),
                "https://3.3.3.3:443".to_owned(),
                "socks4://4.4.4.4:1080".to_owned(),
            ]),
            protocol: "http".to_owned(),
            gateway_proxy: true,
        };
        let mut rng = StdRng::seed_from_u64(9);
        let creds = (0..10).map(|i| Credential::new(format!("t{i}"))).collect();
        let profiles = build_sessions(creds, &plan, &identity, &settings, &mut rng).unwrap();

        for profile in &profiles {
            assert_eq!(profile.socket_proxy.as_deref(), Some("http://3.3.3.3:443"));
            assert_eq!(profile.proxy, profile.socket_proxy);
        }
    }

    #[test]
    fn gateway_proxy_without_http_candidates_is_error() {
        let (identity, settings) = shared();
        let plan = ProxyPlan {
            source: ProxySource::FromList(vec!["socks5://2.2.2.2:1080".to_owned()]),
            protocol: "http".to_owned(),
            gateway_proxy: true,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let result = build_sessions(
            vec![Credential::new("a")],
            &plan,
            &identity,
            &settings,
            &mut rng,
        );
        assert!(matches!(result, Err(LoadError::NoUsableProxy)));

        let bare = ProxyPlan {
            source: ProxySource::Fixed("5.5.5.5:1080".to_owned()),
            protocol: "socks5".to_owned(),
            gateway_proxy: true,
        };
        let result = build_sessions(
            vec![Credential::new("a")],
            &bare,
            &identity,
            &settings,
            &mut rng,
        );
        assert!(matches!(result, Err(LoadError::NoUsableProxy)));
    }

    #[test]
    fn assign_messages_clones_into_every_profile() {
        let (identity, settings) = shared();
        let mut rng = StdRng::seed_from_u64(1);
        let mut profiles = build_sessions(
            vec![Credential::new("a"), Credential::new("b")],
            &ProxyPlan::default(),
            &identity,
            &settings,
            &mut rng,
        )
        .unwrap();
        let messages = vec![serde_json::json!({"content": "hi"})];

        assign_messages(&mut profiles, &messages).unwrap();
        assert!(profiles.iter().all(|p| p.messages == messages));

        assert!(matches!(
            assign_messages(&mut profiles, &[]),
            Err(LoadError::NoMessages)
        ));
    }
}
