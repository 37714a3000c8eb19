//! Tether Test - Shared test utilities for the tether crates.
//!
//! This crate provides an in-process mock gateway, a forwarding `CONNECT`
//! proxy and file fixtures that can be used across tether crates as a dev-dependency.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! tether-test.workspace = true
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,ignore
//! use tether_test::{MockGateway, Step};
//!
//! #[tokio::test]
//! async fn rejects_credential() {
//!     let gateway = MockGateway::start(vec![vec![
//!         Step::hello(),
//!         Step::AwaitIdentify,
//!         Step::close(4004, "Authentication failed."),
//!     ]])
//!     .await
//!     .unwrap();
//!
//!     // point a session at gateway.url() ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod connect_proxy;
pub mod fixtures;
pub mod mock_gateway;

pub use connect_proxy::*;
pub use fixtures::*;
pub use mock_gateway::*;
