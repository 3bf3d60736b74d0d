// # State Store Trait
//
// Defines the interface for persisting the last observed public IP.
//
// ## Purpose
//
// The state store is what turns a stream of observations into change events:
// - It remembers the IP that was last acted upon (`current_ip`)
// - It remembers the one before it (`previous_ip`)
// - It answers "did it change?" and records the change in one step
//
// This prevents firewall calls on every cycle and survives restarts.
//
// ## Implementations
//
// - File-based: `./ip_addresses.json`
// - In-memory: tests and throwaway runs
//
// ## Usage
//
// ```rust,ignore
// use dynfw_core::StateStore;
// use std::net::IpAddr;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* StateStore implementation */;
//
//     if store.check_and_update(IpAddr::from([1, 2, 3, 4])).await? {
//         // push the new address to the firewall
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// The persisted IP history
///
/// Serialized as exactly two keys, each a string or `null`:
///
/// ```json
/// {
///     "previous_ip": "1.1.1.1",
///     "current_ip": "2.2.2.2"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpHistoryRecord {
    /// Value `current_ip` held before the most recent change
    #[serde(default)]
    pub previous_ip: Option<String>,
    /// Last IP observed and acted upon
    #[serde(default)]
    pub current_ip: Option<String>,
}

impl IpHistoryRecord {
    /// Create a record from explicit values
    pub fn new(previous_ip: Option<String>, current_ip: Option<String>) -> Self {
        Self {
            previous_ip,
            current_ip,
        }
    }

    /// Whether `ip` is the stored current address
    ///
    /// Values that parse as addresses compare as addresses, so a stored
    /// `2001:DB8::1` matches an observed `2001:db8::1`. Anything else compares
    /// as text.
    pub fn is_current(&self, ip: &str) -> bool {
        match self.current_ip.as_deref() {
            Some(current) if current == ip => true,
            Some(current) => matches!(
                (current.trim().parse::<IpAddr>(), ip.parse::<IpAddr>()),
                (Ok(stored), Ok(observed)) if stored == observed
            ),
            None => false,
        }
    }

    /// Shift `current_ip` into `previous_ip` and store `ip` as current
    pub fn advance(&mut self, ip: impl Into<String>) {
        self.previous_ip = self.current_ip.take();
        self.current_ip = Some(ip.into());
    }
}

/// Trait for state store implementations
///
/// Implementations provide raw `load`/`save` of the whole record; the change
/// detection in [`StateStore::check_and_update`] is shared.
///
/// # Concurrency
///
/// `check_and_update` is read-then-write without locking. One running
/// instance per backing store is assumed.
///
/// # Failures
///
/// Read, write and parse faults are reported as
/// [`Error::StateStore`](crate::Error::StateStore). They are never swallowed:
/// the engine logs them and skips the cycle.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the stored record
    ///
    /// A store that has never been written yields a record with both fields
    /// absent. That is not an error.
    async fn load(&self) -> Result<IpHistoryRecord, crate::Error>;

    /// Replace the stored record
    async fn save(&self, record: &IpHistoryRecord) -> Result<(), crate::Error>;

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;

    /// Compare an observed IP against the stored one, recording it if it differs
    ///
    /// # Returns
    ///
    /// - `Ok(false)`: `observed` equals `current_ip`; nothing was written
    /// - `Ok(true)`: the record was advanced and persisted
    /// - `Err(Error)`: storage error
    async fn check_and_update(&self, observed: IpAddr) -> Result<bool, crate::Error> {
        let observed = observed.to_string();
        let mut record = self.load().await?;

        if record.is_current(&observed) {
            tracing::debug!(ip = %observed, "IP address unchanged");
            return Ok(false);
        }

        record.advance(observed);
        self.save(&record).await?;

        tracing::info!(
            previous_ip = ?record.previous_ip,
            current_ip = ?record.current_ip,
            "IP address has changed"
        );

        Ok(true)
    }
}
