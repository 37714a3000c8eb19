//! Post-merge normalization and validation.
//!
//! [`normalize`] rewrites tolerated values in place and logs a warning for
//! each rewrite. [`validate`] then rejects anything still out of range.

use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, SUPPORTED_PROXY_PROTOCOLS};

/// Rewrite tolerated configuration values into their canonical form.
///
/// - `proxy.protocol = "https"` becomes `"http"` (the tunnel is always
///   negotiated in plain HTTP).
/// - An unknown proxy protocol becomes `"http"`.
/// - An `https://` prefix on `proxy.address` becomes `http://`.
/// - Empty identity overrides are treated as unset.
pub fn normalize(config: &mut Config) {
    let protocol = config.proxy.protocol.trim().to_ascii_lowercase();
    if protocol == "https" {
        config.proxy.protocol = "http".to_owned();
    } else if SUPPORTED_PROXY_PROTOCOLS.contains(&protocol.as_str()) {
        config.proxy.protocol = protocol;
    } else {
        warn!(
            protocol = %config.proxy.protocol,
            supported = %SUPPORTED_PROXY_PROTOCOLS.join(", "),
            "unsupported proxy protocol, falling back to http"
        );
        config.proxy.protocol = "http".to_owned();
    }

    let address = config.proxy.address.trim();
    if let Some((scheme, rest)) = address.split_once("://")
        && scheme.eq_ignore_ascii_case("https")
    {
        config.proxy.address = format!("http://{rest}");
    }

    if config
        .identity
        .user_agent
        .as_deref()
        .is_some_and(|ua| ua.trim().is_empty())
    {
        config.identity.user_agent = None;
    }
    if config
        .identity
        .locale
        .as_deref()
        .is_some_and(|l| l.trim().is_empty())
    {
        config.identity.locale = None;
    }
}

/// Validate a fully-merged and normalized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_gateway(config)?;
    validate_proxy(config)?;
    validate_logging(config)?;
    Ok(())
}

/// Upper bound on the hello timeout (10 minutes).
const MAX_HELLO_TIMEOUT_SECS: u64 = 600;

fn validate_gateway(config: &Config) -> ConfigResult<()> {
    let g = &config.gateway;

    let url = url::Url::parse(&g.url).map_err(|e| ConfigError::ValidationError {
        field: "gateway.url".to_owned(),
        message: format!("'{}' is not a valid URL: {e}", g.url),
    })?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ConfigError::ValidationError {
            field: "gateway.url".to_owned(),
            message: format!(
                "unsupported scheme '{}'; expected ws or wss",
                url.scheme()
            ),
        });
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::ValidationError {
            field: "gateway.url".to_owned(),
            message: "URL has no host".to_owned(),
        });
    }

    if g.hello_timeout_secs == 0 || g.hello_timeout_secs > MAX_HELLO_TIMEOUT_SECS {
        return Err(ConfigError::ValidationError {
            field: "gateway.hello_timeout_secs".to_owned(),
            message: format!("hello_timeout_secs must be between 1 and {MAX_HELLO_TIMEOUT_SECS}"),
        });
    }

    Ok(())
}

fn validate_proxy(config: &Config) -> ConfigResult<()> {
    let p = &config.proxy;

    if !SUPPORTED_PROXY_PROTOCOLS.contains(&p.protocol.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "proxy.protocol".to_owned(),
            message: format!(
                "unsupported proxy protocol '{}'; expected one of: {}",
                p.protocol,
                SUPPORTED_PROXY_PROTOCOLS.join(", ")
            ),
        });
    }

    // The persistent socket is tunnelled with HTTP CONNECT only.
    if p.gateway_proxy && p.protocol != "http" {
        return Err(ConfigError::ValidationError {
            field: "proxy.gateway_proxy".to_owned(),
            message: format!(
                "the gateway socket can only be proxied over http, not '{}'",
                p.protocol
            ),
        });
    }

    if p.address.chars().any(char::is_whitespace) {
        return Err(ConfigError::ValidationError {
            field: "proxy.address".to_owned(),
            message: "proxy address must not contain whitespace".to_owned(),
        });
    }

    if p.gateway_proxy
        && let Some((scheme, _)) = p.address.split_once("://")
        && !scheme.eq_ignore_ascii_case("http")
    {
        return Err(ConfigError::ValidationError {
            field: "proxy.address".to_owned(),
            message: format!(
                "the gateway socket can only be proxied over http, but the address uses '{scheme}'"
            ),
        });
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.level".to_owned(),
            message: format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        });
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.format".to_owned(),
            message: format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        });
    }

    Ok(())
}
