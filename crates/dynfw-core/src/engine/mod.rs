//! Control loop
//!
//! The SyncEngine is responsible for:
//! - Resolving the public IP via IpSource on a fixed interval
//! - Detecting changes via StateStore
//! - Rewriting each configured firewall rule via FirewallProvider
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────┐
//!   timer / cancel ─▶│  SyncEngine  │─── EngineEvent ───▶ (embedders, tests)
//!                    └──────────────┘
//!                            │
//!         ┌──────────────────┼──────────────────┐
//!         ▼                  ▼                  ▼
//! ┌─────────────┐   ┌───────────────┐   ┌──────────────────┐
//! │  IpSource   │   │  StateStore   │   │ FirewallProvider │
//! │  (resolve)  │   │ (check/store) │   │ (rewrite rules)  │
//! └─────────────┘   └───────────────┘   └──────────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Resolve the current IP (failure: log, skip the cycle)
//! 2. `check_and_update` against the store (failure: log, skip the cycle)
//! 3. If unchanged, done
//! 4. Otherwise update every rule in configured order; a failing rule is
//!    logged and the next one is still attempted
//!
//! The first cycle runs immediately. After each cycle the engine waits
//! `poll_interval` or until the shutdown token is cancelled.

use crate::config::UpdaterConfig;
use crate::error::{ErrorKind, Result};
use crate::traits::{FirewallProvider, IpSource, StateStore};
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        rules: Vec<String>,
    },

    /// Public IP resolved
    IpObserved {
        ip: IpAddr,
    },

    /// Resolved IP differs from the stored one (already persisted)
    IpChanged {
        ip: IpAddr,
    },

    /// Public IP could not be resolved
    ResolutionFailed {
        error: String,
        kind: ErrorKind,
    },

    /// State store could not be read or written
    StateStoreFailed {
        error: String,
        kind: ErrorKind,
    },

    /// Firewall rule now allows the new IP
    RuleUpdated {
        rule_name: String,
        ip: IpAddr,
    },

    /// Firewall rule update failed
    RuleUpdateFailed {
        rule_name: String,
        ip: IpAddr,
        error: String,
        kind: ErrorKind,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// Result of a single resolve → compare → update pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No IP this cycle
    ResolutionFailed,

    /// IP resolved but the state store failed; no rules touched
    StateStoreFailed {
        ip: IpAddr,
    },

    /// IP matches the stored one; no rules touched
    Unchanged {
        ip: IpAddr,
    },

    /// IP changed and every rule was attempted
    Updated {
        ip: IpAddr,
        /// Rules updated successfully, in order
        succeeded: Vec<String>,
        /// Rules whose update failed, in order
        failed: Vec<String>,
    },
}

/// Control loop
///
/// Owns the three components and drives them sequentially. There is never
/// more than one network call in flight.
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start with [`SyncEngine::run()`], passing a [`CancellationToken`]
/// 3. Cancel the token to stop; the current cycle finishes first
pub struct SyncEngine {
    /// IP source for resolving the public address
    ip_source: Box<dyn IpSource>,

    /// Firewall provider for rewriting rules
    provider: Box<dyn FirewallProvider>,

    /// State store for change detection
    state_store: Box<dyn StateStore>,

    /// Firewall rules to keep updated, in order
    rules: Vec<String>,

    /// Wait between cycles
    poll_interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        ip_source: Box<dyn IpSource>,
        provider: Box<dyn FirewallProvider>,
        state_store: Box<dyn StateStore>,
        config: &UpdaterConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            ip_source,
            provider,
            state_store,
            rules: config.rules.clone(),
            poll_interval: Duration::from_secs(config.engine.poll_interval_secs),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Rules managed by this engine, in update order
    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    /// Wait between cycles
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run until `shutdown` is cancelled
    ///
    /// Cancellation is observed between cycles; a cycle that has started
    /// always completes.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            firewall_rule_names = ?self.rules,
            ip_source = self.ip_source.source_name(),
            provider = self.provider.provider_name(),
            state_store = self.state_store.store_name(),
            poll_interval_secs = self.poll_interval.as_secs(),
            "Starting dynamic IP updater"
        );
        self.emit_event(EngineEvent::Started {
            rules: self.rules.clone(),
        });

        while !shutdown.is_cancelled() {
            let outcome = self.run_cycle().await;
            debug!(?outcome, "Cycle finished");

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {}

                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Shutdown signal received, engine stopped");
        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
    }

    /// Execute one resolve → compare → update pass
    pub async fn run_cycle(&self) -> CycleOutcome {
        let ip = match self.ip_source.resolve().await {
            Ok(ip) => ip,
            Err(e) => {
                error!(
                    ip_source = self.ip_source.source_name(),
                    kind = ?e.kind(),
                    error = %e,
                    "Failed to fetch public IP address"
                );
                self.emit_event(EngineEvent::ResolutionFailed {
                    error: e.to_string(),
                    kind: e.kind(),
                });
                return CycleOutcome::ResolutionFailed;
            }
        };

        info!(ip = %ip, "Observed public IP address");
        self.emit_event(EngineEvent::IpObserved { ip });

        let changed = match self.state_store.check_and_update(ip).await {
            Ok(changed) => changed,
            Err(e) => {
                error!(
                    state_store = self.state_store.store_name(),
                    ip = %ip,
                    kind = ?e.kind(),
                    error = %e,
                    "Failed to check IP history, skipping cycle"
                );
                self.emit_event(EngineEvent::StateStoreFailed {
                    error: e.to_string(),
                    kind: e.kind(),
                });
                return CycleOutcome::StateStoreFailed { ip };
            }
        };

        if !changed {
            return CycleOutcome::Unchanged { ip };
        }

        self.emit_event(EngineEvent::IpChanged { ip });

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        for rule_name in &self.rules {
            match self.provider.update_rule(rule_name, ip).await {
                Ok(response) => {
                    info!(
                        firewall_rule_name = %rule_name,
                        ip = %ip,
                        response = %response,
                        "Firewall rule updated"
                    );
                    self.emit_event(EngineEvent::RuleUpdated {
                        rule_name: rule_name.clone(),
                        ip,
                    });
                    succeeded.push(rule_name.clone());
                }
                Err(e) => {
                    error!(
                        firewall_rule_name = %rule_name,
                        ip = %ip,
                        provider = self.provider.provider_name(),
                        kind = ?e.kind(),
                        error = %e,
                        "Failed to update firewall rule"
                    );
                    self.emit_event(EngineEvent::RuleUpdateFailed {
                        rule_name: rule_name.clone(),
                        ip,
                        error: e.to_string(),
                        kind: e.kind(),
                    });
                    failed.push(rule_name.clone());
                }
            }
        }

        CycleOutcome::Updated {
            ip,
            succeeded,
            failed,
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // A full or closed channel never blocks the loop
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
