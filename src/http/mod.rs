//! HTTP transport layer
//!
//! Every probe issued by the scanner goes through a [`Transport`]. The
//! reqwest-backed [`client::HttpClient`] is the production implementation;
//! tamper adapters and test doubles wrap or replace it.

pub mod client;
pub mod request;
pub mod response;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use request::HttpRequest;
use response::HttpResponse;

/// Counters exposed by a transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub total_requests: u64,
}

/// Request executor shared read-only by every scan worker.
///
/// Implementations keep their counters behind atomics or locks; the
/// measured `elapsed` on each response must cover only the network
/// round-trip because the time-based oracle reads nothing else.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, req: HttpRequest) -> anyhow::Result<HttpResponse>;

    fn set_proxy(&self, proxy: &str) -> anyhow::Result<()>;

    fn set_rate_limit(&self, requests_per_second: u32);

    fn stats(&self) -> TransportStats;
}
