//! flow-rules: match-action rule control over a controller's flow REST API
//!
//! This crate provides:
//! - Ternary match field encoding (ports, MAC/IPv4 addresses, protocol numbers)
//! - A static catalog of pipeline tables and their actions
//! - Rule payload building for the controller's `/flows` resource
//! - Install, resolve and delete of rules by match criteria, so callers never
//!   handle controller-assigned flow ids
//!
//! ```no_run
//! use flow_rules::prelude::*;
//!
//! # async fn run() -> flow_rules::Result<()> {
//! let config = ControllerConfig::builder().switch_type("bmv2").build();
//! let session = RuleSession::connect(&config)?;
//!
//! let matches = MatchOptions::new().ingress_port(1);
//! session
//!     .install_rule("forward", &matches, &ActionOptions::output(2), &RuleOptions::permanent(40))
//!     .await?;
//! session.delete_rule("forward", &matches).await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod catalog;
pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod field;
pub mod options;
pub mod resolver;
pub mod session;
pub mod wire;

pub use catalog::{resolve_action, resolve_table, ActionKind, ActionSelection, TableSpec};
pub use client::{Ack, FlowApi, OnosClient};
pub use config::ControllerConfig;
pub use device::DeviceId;
pub use error::{Result, RuleError};
pub use field::{decode, encode, FieldKind, FieldValue, MacAddr, MatchCriterion};
pub use options::{ActionOptions, MatchOptions, RuleIntent, RuleOptions};
pub use resolver::AmbiguityPolicy;
pub use session::RuleSession;
pub use wire::{InstalledRule, RulePayload};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::client::{Ack, FlowApi, OnosClient};
    pub use super::config::ControllerConfig;
    pub use super::device::DeviceId;
    pub use super::options::{ActionOptions, MatchOptions, RuleOptions};
    pub use super::resolver::AmbiguityPolicy;
    pub use super::session::RuleSession;
}
