//! Tether Gateway - Per-account persistent gateway sessions.
//!
//! This crate provides:
//! - [`Session`], a supervisor that keeps one account's gateway connection
//!   alive and classifies every termination
//! - [`GatewayConnector`], the `WebSocket` implementation of [`Connector`],
//!   with optional HTTP `CONNECT` proxying
//! - [`Fleet`], the process-level owner of the fatal channel
//! - Loaders for credential, proxy and message files
//!
//! # Architecture
//!
//! ```text
//! Fleet (fatal channel consumer)
//! └── Session (one per credential)
//!     ├── on_terminate: classify -> reconnect | fatal
//!     └── Connection (one live at a time)
//!         ├── read loop
//!         ├── writer task
//!         └── heartbeat task
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tether_gateway::{
//!     ClientMode, Credential, Fleet, GatewayConnector, GatewaySettings, IdentityMaterial,
//!     IdentityOverrides, ProxyPlan, build_sessions,
//! };
//!
//! # async fn example() -> Result<(), tether_gateway::LoadError> {
//! let mut rng = rand::thread_rng();
//! let identity = Arc::new(IdentityMaterial::select(
//!     ClientMode::Browser,
//!     &IdentityOverrides::default(),
//!     &mut rng,
//! ));
//! let settings = Arc::new(GatewaySettings::new("wss://gateway.example.com/?v=9"));
//! let profiles = build_sessions(
//!     vec![Credential::new("token")],
//!     &ProxyPlan::default(),
//!     &identity,
//!     &settings,
//!     &mut rng,
//! )?;
//!
//! let fleet = Fleet::start(profiles, Arc::new(GatewayConnector::new())).await;
//! let report = fleet.run(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await;
//! println!("retired {} sessions", report.retired);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;
pub mod protocol;

mod classify;
mod connection;
mod credential;
mod error;
mod fleet;
mod heartbeat;
mod identity;
mod loader;
mod proxy;
mod session;

pub use classify::{Verdict, classify};
pub use connection::{Connection, Connector, GatewayConnector, GatewaySettings};
pub use credential::{Credential, censor, write_credential};
pub use error::GatewayError;
pub use fleet::{Fleet, FleetReport};
pub use identity::{ClientMode, IdentityMaterial, IdentityOverrides, LOCALES};
pub use loader::{
    LoadError, ProxyPlan, ProxySource, assign_messages, build_sessions, load_credentials,
    load_messages, load_proxies,
};
pub use proxy::{ProxyEndpoint, tunnel};
pub use session::{Activity, FatalSignal, Session, SessionProfile, SessionState, Termination};
