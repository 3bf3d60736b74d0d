// # dynfw-core
//
// Core library for keeping cloud firewall source ranges pinned to the
// operator's current public IP address.
//
// ## Architecture Overview
//
// - **IpSource**: Trait for resolving the current public IP
// - **StateStore**: Trait for persisting the IP history and detecting changes
// - **FirewallProvider**: Trait for rewriting a rule's source ranges
// - **SyncEngine**: Control loop driving resolve → compare → update on a timer
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from provider implementations
// 2. **Sequential**: One cycle at a time, one network call at a time
// 3. **Library-First**: All core functionality can be used as a library
// 4. **Idempotency**: The state store keeps an unchanged IP from reaching the firewall

pub mod traits;
pub mod engine;
pub mod config;
pub mod error;
pub mod state;

// Re-export core types for convenience
pub use traits::{FirewallProvider, IpSource, StateStore};
pub use traits::{FirewallRuleDefinition, IpHistoryRecord};
pub use engine::{CycleOutcome, EngineEvent, SyncEngine};
pub use config::{
    CredentialConfig, EngineConfig, FirewallConfig, IpSourceConfig, StateStoreConfig,
    UpdaterConfig,
};
pub use error::{Error, ErrorKind, Result};
pub use state::{FileStateStore, MemoryStateStore};
