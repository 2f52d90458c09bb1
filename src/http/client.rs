//! HTTP client with scope enforcement and rate limiting

use crate::core::rate_limit::RateLimiter;
use crate::core::scope::Scope;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::{Transport, TransportStats};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{redirect::Policy, Client, Proxy};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpClient {
    client: RwLock<Client>,
    scope: Scope,
    limiter: RateLimiter,
    timeout: Duration,
    total_requests: AtomicU64,
}

impl HttpClient {
    pub fn new(scope: Scope, limiter: RateLimiter) -> Result<Self> {
        Ok(Self {
            client: RwLock::new(build_client(None, DEFAULT_TIMEOUT)?),
            scope,
            limiter,
            timeout: DEFAULT_TIMEOUT,
            total_requests: AtomicU64::new(0),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.timeout = timeout;
        *self.client.get_mut() = build_client(None, timeout)?;
        Ok(self)
    }
}

fn build_client(proxy: Option<&str>, timeout: Duration) -> Result<Client> {
    let mut builder = Client::builder()
        .danger_accept_invalid_certs(true)
        .redirect(Policy::none())
        .timeout(timeout);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}

#[async_trait]
impl Transport for HttpClient {
    async fn execute(&self, req: HttpRequest) -> Result<HttpResponse> {
        // ---- SCOPE CHECK ----
        if !self.scope.is_in_scope(&req.url) {
            anyhow::bail!("Blocked out-of-scope request: {}", req.url);
        }

        // ---- RATE LIMIT ENFORCEMENT ----
        self.limiter.wait().await;

        let client = self.client.read().clone();
        let mut request = client
            .request(req.method, req.url.clone())
            .headers(req.headers.clone());

        if let Some(body) = req.body {
            request = request.body(body);
        }

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let response = request.send().await?;
        let status = response.status().as_u16();
        let protocol = format!("{:?}", response.version());

        let final_url = response.url().clone();
        if !self.scope.is_in_scope(&final_url) {
            anyhow::bail!("Blocked out-of-scope redirect to {}", final_url);
        }

        let mut headers = HashMap::new();
        for (k, v) in response.headers().iter() {
            headers.insert(k.to_string(), v.to_str().unwrap_or("").to_string());
        }

        let body_bytes = response.bytes().await?;
        let elapsed = start.elapsed();

        let mut resp = HttpResponse::from_parts(status, body_bytes.to_vec(), elapsed);
        resp.headers = headers;
        resp.final_url = final_url.to_string();
        resp.protocol = protocol;

        Ok(resp)
    }

    fn set_proxy(&self, proxy: &str) -> Result<()> {
        let rebuilt = build_client(Some(proxy), self.timeout)?;
        *self.client.write() = rebuilt;
        tracing::info!("Routing requests through proxy {}", proxy);
        Ok(())
    }

    fn set_rate_limit(&self, requests_per_second: u32) {
        self.limiter.set_rate(requests_per_second);
    }

    fn stats(&self) -> TransportStats {
        TransportStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
        }
    }
}
