// # Firewall Provider Trait
//
// Defines the interface for rewriting a cloud firewall rule's allowed source
// ranges.
//
// ## Implementations
//
// - Google Compute Engine: `dynfw-provider-gcp` crate
//
// ## Usage
//
// ```rust,ignore
// use dynfw_core::FirewallProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* FirewallProvider implementation */;
//
//     let response = provider
//         .update_rule("allow-home", std::net::IpAddr::from([203, 0, 113, 7]))
//         .await?;
//     println!("{}", response);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde_json::Value;
use std::net::IpAddr;

use crate::Error;

/// A provider's JSON representation of a firewall rule
///
/// Opaque except for the `sourceRanges` field.
pub type FirewallRuleDefinition = Value;

/// Field overwritten on every update
pub const SOURCE_RANGES_FIELD: &str = "sourceRanges";

/// Trait for firewall provider implementations
///
/// # Contract
///
/// `update_rule` performs exactly one read-modify-write of the named rule:
///
/// 1. Fetch the current definition
/// 2. Replace `sourceRanges` with the single host range for `new_ip`
///    (see [`apply_source_range`])
/// 3. Submit the whole definition back
/// 4. Return the provider's response
///
/// Every other field of the fetched definition is resubmitted unchanged.
///
/// # Failures
///
/// - [`Error::RuleNotFound`]: the rule does not exist
/// - [`Error::PermissionDenied`]: authentication or authorization failed
/// - [`Error::UpdateRejected`]: the submission failed (conflict, quota,
///   transient fault)
///
/// No retries. The engine logs the error and moves on to the next rule.
#[async_trait]
pub trait FirewallProvider: Send + Sync {
    /// Point a rule's source range at `new_ip`
    async fn update_rule(
        &self,
        rule_name: &str,
        new_ip: IpAddr,
    ) -> Result<FirewallRuleDefinition, Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Single-host CIDR for an address (`/32` for IPv4, `/128` for IPv6)
pub fn host_cidr(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}/32", v4),
        IpAddr::V6(v6) => format!("{}/128", v6),
    }
}

/// Overwrite `sourceRanges` on a fetched rule definition
///
/// All other fields are left untouched. Fails if the definition is not a
/// JSON object.
pub fn apply_source_range(
    mut definition: FirewallRuleDefinition,
    ip: IpAddr,
) -> Result<FirewallRuleDefinition, Error> {
    let fields = definition.as_object_mut().ok_or_else(|| {
        Error::update_rejected("Fetched firewall rule definition is not a JSON object")
    })?;

    fields.insert(
        SOURCE_RANGES_FIELD.to_string(),
        Value::Array(vec![Value::String(host_cidr(ip))]),
    );

    Ok(definition)
}
