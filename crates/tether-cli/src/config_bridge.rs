//! Bridge from `tether_config::Config` to gateway and telemetry types.
//!
//! The config crate has no dependencies on other internal crates, so every
//! conversion into domain types happens here, once.

use std::time::Duration;

use tether_config::{Config, IdentityMode};
use tether_gateway::{ClientMode, GatewaySettings, IdentityOverrides, ProxyPlan, ProxySource};
use tether_telemetry::{LogConfig, LogFormat};

/// Convert config to [`LogConfig`].
///
/// Unknown formats fall back to compact output.
pub(crate) fn to_log_config(cfg: &Config) -> LogConfig {
    let format = cfg
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or(LogFormat::Compact);

    let mut log_config = LogConfig::new(&cfg.logging.level).with_format(format);

    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }

    log_config
}

/// Convert config to [`GatewaySettings`].
pub(crate) fn to_gateway_settings(cfg: &Config) -> GatewaySettings {
    let mut settings = GatewaySettings::new(cfg.gateway.url.clone());
    settings.hello_timeout = Duration::from_secs(cfg.gateway.hello_timeout_secs);
    settings.intents = cfg.gateway.intents;
    settings.censor_credentials = cfg.display.censor_token;
    settings
}

pub(crate) fn to_client_mode(cfg: &Config) -> ClientMode {
    match cfg.identity.mode {
        IdentityMode::Browser => ClientMode::Browser,
        IdentityMode::Native => ClientMode::Native,
    }
}

pub(crate) fn to_identity_overrides(cfg: &Config) -> IdentityOverrides {
    IdentityOverrides {
        user_agent: cfg.identity.user_agent.clone(),
        locale: cfg.identity.locale.clone(),
    }
}

/// Convert the `[proxy]` section to a [`ProxyPlan`].
///
/// `proxies` is the content of the proxy file, required when
/// `proxy.from_file` is set.
pub(crate) fn to_proxy_plan(cfg: &Config, proxies: Option<Vec<String>>) -> ProxyPlan {
    let source = match proxies {
        Some(list) if cfg.proxy.from_file => ProxySource::FromList(list),
        _ if !cfg.proxy.address.trim().is_empty() => {
            ProxySource::Fixed(cfg.proxy.address.trim().to_owned())
        },
        _ => ProxySource::None,
    };

    ProxyPlan {
        source,
        protocol: cfg.proxy.protocol.clone(),
        gateway_proxy: cfg.proxy.gateway_proxy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_config_uses_format_and_directives() {
        let mut cfg = Config::default();
        cfg.logging.level = "warn".to_owned();
        cfg.logging.format = "json".to_owned();
        cfg.logging.directives = vec!["tether_gateway=trace".to_owned()];

        let lc = to_log_config(&cfg);
        assert_eq!(lc.level, "warn");
        assert_eq!(lc.format, LogFormat::Json);
        assert_eq!(lc.directives, vec!["tether_gateway=trace".to_owned()]);
    }

    #[test]
    fn unknown_log_format_is_compact() {
        let mut cfg = Config::default();
        cfg.logging.format = "fancy".to_owned();
        assert_eq!(to_log_config(&cfg).format, LogFormat::Compact);
    }

    #[test]
    fn gateway_settings_follow_config() {
        let mut cfg = Config::default();
        cfg.gateway.url = "ws://127.0.0.1:9000/".to_owned();
        cfg.gateway.hello_timeout_secs = 7;
        cfg.gateway.intents = 1;
        cfg.display.censor_token = false;

        let settings = to_gateway_settings(&cfg);
        assert_eq!(settings.url, "ws://127.0.0.1:9000/");
        assert_eq!(settings.hello_timeout, Duration::from_secs(7));
        assert_eq!(settings.intents, 1);
        assert!(!settings.censor_credentials);
    }

    #[test]
    fn identity_mode_and_overrides() {
        let mut cfg = Config::default();
        cfg.identity.mode = IdentityMode::Native;
        cfg.identity.locale = Some("fr".to_owned());

        assert_eq!(to_client_mode(&cfg), ClientMode::Native);
        let overrides = to_identity_overrides(&cfg);
        assert_eq!(overrides.locale.as_deref(), Some("fr"));
        assert!(overrides.user_agent.is_none());
    }

    #[test]
    fn proxy_plan_prefers_file_list() {
        let mut cfg = Config::default();
        cfg.proxy.from_file = true;
        cfg.proxy.address = "10.0.0.1:8080".to_owned();

        let plan = to_proxy_plan(&cfg, Some(vec!["a:1".to_owned()]));
        assert!(matches!(plan.source, ProxySource::FromList(ref l) if l.len() == 1));
    }

    #[test]
    fn proxy_plan_fixed_and_none() {
        let mut cfg = Config::default();
        assert!(matches!(to_proxy_plan(&cfg, None).source, ProxySource::None));

        cfg.proxy.address = " 10.0.0.1:8080 ".to_owned();
        cfg.proxy.gateway_proxy = true;
        let plan = to_proxy_plan(&cfg, None);
        assert!(matches!(plan.source, ProxySource::Fixed(ref a) if a == "10.0.0.1:8080"));
        assert!(plan.gateway_proxy);
    }
}
