//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tether_gateway::prelude::*;` to import all essential types.

pub use crate::{
    Connector, Credential, Fleet, FleetReport, GatewayConnector, GatewayError, GatewaySettings,
    IdentityMaterial, Session, SessionProfile, SessionState,
};
