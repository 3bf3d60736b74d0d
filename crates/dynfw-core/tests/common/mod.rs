//! Test doubles and common utilities for engine contract tests
//!
//! Minimal stand-ins for the three component traits that record how the
//! engine drives them.

#![allow(dead_code)]

use async_trait::async_trait;
use dynfw_core::config::{StateStoreConfig, UpdaterConfig};
use dynfw_core::error::{Error, Result};
use dynfw_core::traits::{
    FirewallProvider, FirewallRuleDefinition, IpHistoryRecord, IpSource, StateStore,
    apply_source_range,
};
use dynfw_core::{EngineEvent, MemoryStateStore};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// One scripted answer from [`ScriptedIpSource`]
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Ip(IpAddr),
    Unavailable,
    Malformed,
}

/// An IpSource that answers from a script
///
/// Once the script is exhausted the last step repeats.
#[derive(Clone)]
pub struct ScriptedIpSource {
    script: Arc<Mutex<Vec<Step>>>,
    last: Arc<Mutex<Step>>,
    resolve_call_count: Arc<AtomicUsize>,
}

impl ScriptedIpSource {
    pub fn new(script: Vec<Step>) -> Self {
        let last = *script.last().expect("script needs at least one step");
        let mut script = script;
        script.reverse();

        Self {
            script: Arc::new(Mutex::new(script)),
            last: Arc::new(Mutex::new(last)),
            resolve_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answer with the same address
    pub fn fixed(ip: IpAddr) -> Self {
        Self::new(vec![Step::Ip(ip)])
    }

    /// Answer with each address in turn
    pub fn sequence(ips: &[&str]) -> Self {
        Self::new(ips.iter().map(|s| Step::Ip(ip(s))).collect())
    }

    /// Get the number of times resolve() was called
    pub fn resolve_call_count(&self) -> usize {
        self.resolve_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpSource for ScriptedIpSource {
    async fn resolve(&self) -> Result<IpAddr> {
        self.resolve_call_count.fetch_add(1, Ordering::SeqCst);

        let step = match self.script.lock().unwrap().pop() {
            Some(step) => step,
            None => *self.last.lock().unwrap(),
        };

        match step {
            Step::Ip(ip) => Ok(ip),
            Step::Unavailable => Err(Error::provider_unavailable("connection refused")),
            Step::Malformed => Err(Error::malformed_response("missing 'ip' field")),
        }
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// A FirewallProvider backed by an in-memory set of rule definitions
///
/// Unknown rules fail with `RuleNotFound`; rules marked with
/// [`RecordingFirewallProvider::reject`] fail with `UpdateRejected`.
#[derive(Clone, Default)]
pub struct RecordingFirewallProvider {
    rules: Arc<Mutex<HashMap<String, FirewallRuleDefinition>>>,
    rejected: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<(String, IpAddr)>>>,
    submitted: Arc<Mutex<Vec<(String, FirewallRuleDefinition)>>>,
    delay: Option<Duration>,
    completed_count: Arc<AtomicUsize>,
}

impl RecordingFirewallProvider {
    /// Provider knowing the given rules, each with a typical definition
    pub fn with_rules(names: &[&str]) -> Self {
        let provider = Self::default();
        for name in names {
            provider.insert_rule(name, sample_rule(name));
        }
        provider
    }

    /// Make every update take `delay` before completing
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn insert_rule(&self, name: &str, definition: FirewallRuleDefinition) {
        self.rules
            .lock()
            .unwrap()
            .insert(name.to_string(), definition);
    }

    /// Make updates to `name` fail with `UpdateRejected`
    pub fn reject(&self, name: &str) {
        self.rejected.lock().unwrap().insert(name.to_string());
    }

    /// Every update_rule() call, in order
    pub fn calls(&self) -> Vec<(String, IpAddr)> {
        self.calls.lock().unwrap().clone()
    }

    /// Definitions submitted by successful updates, in order
    pub fn submitted(&self) -> Vec<(String, FirewallRuleDefinition)> {
        self.submitted.lock().unwrap().clone()
    }

    /// Current definition of a rule
    pub fn rule(&self, name: &str) -> Option<FirewallRuleDefinition> {
        self.rules.lock().unwrap().get(name).cloned()
    }

    /// Number of update_rule() calls that ran to completion
    pub fn completed_count(&self) -> usize {
        self.completed_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FirewallProvider for RecordingFirewallProvider {
    async fn update_rule(&self, rule_name: &str, new_ip: IpAddr) -> Result<FirewallRuleDefinition> {
        self.calls
            .lock()
            .unwrap()
            .push((rule_name.to_string(), new_ip));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let fetched = self
            .rule(rule_name)
            .ok_or_else(|| Error::rule_not_found(rule_name))?;

        if self.rejected.lock().unwrap().contains(rule_name) {
            return Err(Error::update_rejected(format!("{}: conflict", rule_name)));
        }

        let updated = apply_source_range(fetched, new_ip)?;
        self.insert_rule(rule_name, updated.clone());
        self.submitted
            .lock()
            .unwrap()
            .push((rule_name.to_string(), updated.clone()));
        self.completed_count.fetch_add(1, Ordering::SeqCst);

        Ok(json!({"kind": "compute#operation", "targetLink": rule_name, "status": "DONE"}))
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// A StateStore wrapper that counts calls and can be switched to failing
#[derive(Clone, Default)]
pub struct CountingStateStore {
    inner: MemoryStateStore,
    load_call_count: Arc<AtomicUsize>,
    save_call_count: Arc<AtomicUsize>,
    failing: Arc<Mutex<bool>>,
}

impl CountingStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: IpHistoryRecord) -> Self {
        Self {
            inner: MemoryStateStore::with_record(record),
            ..Self::default()
        }
    }

    /// Make every load/save fail with a storage error
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn load_call_count(&self) -> usize {
        self.load_call_count.load(Ordering::SeqCst)
    }

    pub fn save_call_count(&self) -> usize {
        self.save_call_count.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> Result<()> {
        if *self.failing.lock().unwrap() {
            return Err(Error::state_store("disk unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for CountingStateStore {
    async fn load(&self) -> Result<IpHistoryRecord> {
        self.load_call_count.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        self.inner.load().await
    }

    async fn save(&self, record: &IpHistoryRecord) -> Result<()> {
        self.save_call_count.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        self.inner.save(record).await
    }

    fn store_name(&self) -> &'static str {
        "counting"
    }
}

/// Parse an address literal
pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid IP literal")
}

/// A firewall rule definition shaped like a Compute Engine response
pub fn sample_rule(name: &str) -> FirewallRuleDefinition {
    json!({
        "kind": "compute#firewall",
        "id": "1234567890",
        "name": name,
        "network": "https://www.googleapis.com/compute/v1/projects/demo/global/networks/default",
        "priority": 1000,
        "direction": "INGRESS",
        "allowed": [{"IPProtocol": "tcp", "ports": ["22", "443"]}],
        "sourceRanges": ["198.51.100.1/32"],
        "targetTags": ["home-access"],
        "fingerprint": "kXq2a9fQ1c0="
    })
}

/// Helper to create a minimal config for testing
pub fn minimal_config(rules: &[&str]) -> UpdaterConfig {
    let mut config = UpdaterConfig::new(rules.iter().copied());
    config.state_store = StateStoreConfig::Memory;
    config
}

/// Drain every event currently queued
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
