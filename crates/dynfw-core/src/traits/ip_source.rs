// # IP Source Trait
//
// Defines the interface for resolving the caller's current public IP address.
//
// ## Implementations
//
// - HTTP/JSON echo service: `dynfw-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use dynfw_core::IpSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* IpSource implementation */;
//
//     let ip = source.resolve().await?;
//     println!("public IP: {}", ip);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for IP source implementations
///
/// A source answers one question per call: what is the public address right
/// now. Scheduling, comparison with previous values and persistence belong to
/// the `SyncEngine`.
///
/// # Failures
///
/// - [`Error::ProviderUnavailable`](crate::Error::ProviderUnavailable): the
///   endpoint could not be reached or answered with a non-success status
/// - [`Error::MalformedResponse`](crate::Error::MalformedResponse): the body
///   could not be turned into an address
///
/// Implementations must not retry, sleep, or spawn tasks. A failure is
/// returned and the engine skips the cycle.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Resolve the current public IP address
    async fn resolve(&self) -> Result<IpAddr, crate::Error>;

    /// Short name for logging (e.g. "http")
    fn source_name(&self) -> &'static str;
}
