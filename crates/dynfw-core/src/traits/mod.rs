//! Core traits for dynfw
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpSource`]: Resolve the current public IP
//! - [`FirewallProvider`]: Rewrite a firewall rule's source ranges
//! - [`StateStore`]: Persist the last observed IP and detect changes

pub mod ip_source;
pub mod firewall_provider;
pub mod state_store;

pub use ip_source::IpSource;
pub use firewall_provider::{FirewallProvider, FirewallRuleDefinition, apply_source_range, host_cidr};
pub use state_store::{IpHistoryRecord, StateStore};
