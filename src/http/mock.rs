//! Scriptable in-process transport for unit tests

use super::request::HttpRequest;
use super::response::HttpResponse;
use super::{Transport, TransportStats};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

type Handler = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

pub(crate) struct MockTransport {
    handler: Handler,
    total_requests: AtomicU64,
    sent: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            total_requests: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Respond based on the decoded value of one query parameter
    pub fn on_query(
        name: &'static str,
        handler: impl Fn(&str) -> HttpResponse + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |req| handler(&query_value(req, name)))
    }

    /// Same page for every request
    pub fn fixed(body: &'static str) -> Self {
        Self::new(move |_| page(body))
    }

    /// Decoded values of `name` across every request sent so far
    pub fn sent_values(&self, name: &str) -> Vec<String> {
        self.sent.lock().iter().map(|r| query_value(r, name)).collect()
    }

    pub fn count(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }
}

pub(crate) fn query_value(req: &HttpRequest, name: &str) -> String {
    req.url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

pub(crate) fn page(body: impl Into<String>) -> HttpResponse {
    timed(body, Duration::from_millis(20))
}

pub(crate) fn timed(body: impl Into<String>, elapsed: Duration) -> HttpResponse {
    HttpResponse::from_parts(200, body.into().into_bytes(), elapsed)
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, req: HttpRequest) -> anyhow::Result<HttpResponse> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let resp = (self.handler)(&req);
        self.sent.lock().push(req);
        Ok(resp)
    }

    fn set_proxy(&self, _proxy: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_rate_limit(&self, _requests_per_second: u32) {}

    fn stats(&self) -> TransportStats {
        TransportStats {
            total_requests: self.count(),
        }
    }
}
