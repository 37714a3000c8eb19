//! Fleet run command.

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use tether_config::Config;
use tether_gateway::{
    Fleet, GatewayConnector, IdentityMaterial, assign_messages, build_sessions, load_credentials,
    load_messages, load_proxies,
};
use tracing::info;

use crate::config_bridge;

/// Build sessions from the configured files and supervise them until every
/// one is retired or Ctrl+C is pressed.
pub(crate) async fn run_fleet(cfg: &Config) -> Result<()> {
    println!("{}", "Starting tether...".cyan().bold());

    let mut rng = rand::thread_rng();
    let identity = Arc::new(IdentityMaterial::select(
        config_bridge::to_client_mode(cfg),
        &config_bridge::to_identity_overrides(cfg),
        &mut rng,
    ));
    let settings = Arc::new(config_bridge::to_gateway_settings(cfg));
    info!(
        mode = %identity.mode(),
        locale = identity.locale(),
        build = identity.build_number(),
        "selected client identity"
    );

    let credentials = load_credentials(&cfg.files.tokens).context("failed to load credentials")?;
    let proxies = if cfg.proxy.from_file {
        Some(load_proxies(&cfg.files.proxies).context("failed to load proxies")?)
    } else {
        None
    };
    let messages = load_messages(&cfg.files.messages).context("failed to load messages")?;

    let plan = config_bridge::to_proxy_plan(cfg, proxies);
    let mut profiles = build_sessions(credentials, &plan, &identity, &settings, &mut rng)?;
    assign_messages(&mut profiles, &messages)?;

    println!("  Gateway: {}", settings.url.yellow());
    println!(
        "  Sessions: {} ({} messages each)",
        profiles.len().to_string().yellow(),
        messages.len().to_string().yellow()
    );
    println!(
        "  Gateway proxy: {}",
        if plan.gateway_proxy {
            "enabled".green()
        } else {
            "disabled".red()
        }
    );

    let mut fleet = Fleet::start(profiles, Arc::new(GatewayConnector::new())).await;
    if let Some(path) = &cfg.files.retired {
        fleet = fleet.with_retired_file(path);
    }

    println!("\n{}", "Running (Ctrl+C to stop)...".cyan());
    let report = fleet
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    println!("\n{}", "Tether stopped.".yellow());
    println!("  Started: {}", report.started.to_string().green());
    println!(
        "  Failed to start: {}",
        report.failed_to_start.to_string().red()
    );
    println!("  Retired: {}", report.retired.to_string().red());
    println!(
        "  Closed on shutdown: {}",
        report.closed_on_shutdown.to_string().yellow()
    );
    Ok(())
}
