//! Probe construction and dispatch
//!
//! A probe is the target request with exactly one parameter's value
//! replaced. Method, headers, cookies, content type and every other
//! parameter are carried over untouched.

use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::Transport;
use crate::sqli::core::boundary::Payload;
use crate::sqli::core::enums::Location;
use crate::sqli::core::target::{Parameter, ScanTarget};
use crate::sqli::error::{Result, SqliError};
use anyhow::Context;
use reqwest::Method;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;
use url::Url;

/// Build the request for `target` with `param` set to `value`
pub fn build_probe(
    target: &ScanTarget,
    param: &Parameter,
    value: &str,
) -> anyhow::Result<HttpRequest> {
    assemble(target, Some((param, value)))
}

/// Build the unmodified request for `target`
pub fn build_original(target: &ScanTarget) -> anyhow::Result<HttpRequest> {
    assemble(target, None)
}

fn assemble(target: &ScanTarget, substitution: Option<(&Parameter, &str)>) -> anyhow::Result<HttpRequest> {
    let method = Method::from_bytes(target.method.as_bytes())
        .with_context(|| format!("invalid method {}", target.method))?;
    let mut url = Url::parse(&target.url).with_context(|| format!("invalid url {}", target.url))?;

    let mut headers = target.headers.clone();
    let mut cookies = target.cookies.clone();
    let mut body = target.body.clone();

    if let Some((param, value)) = substitution {
        match param.location {
            Location::Query => replace_query(&mut url, &param.name, value),
            Location::Path => replace_path(&mut url, &param.value, value),
            Location::Header => {
                headers.insert(param.name.clone(), value.to_string());
            }
            Location::Cookie => {
                cookies.insert(param.name.clone(), value.to_string());
            }
            Location::Body => body = replace_form(&body, &param.name, value),
            Location::Json => body = replace_json(&body, &param.name, value, false)?,
            Location::GraphQl => body = replace_json(&body, &param.name, value, true)?,
            Location::Xml => body = replace_xml(&body, &param.name, &param.value, value),
            Location::Multipart => {
                body = replace_multipart(&body, &param.name, &param.value, value)
            }
        }
    }

    let mut req = HttpRequest::new(method, url);

    // Sorted so identical probes produce byte-identical requests
    let mut header_pairs: Vec<_> = headers.iter().collect();
    header_pairs.sort();
    for (name, value) in header_pairs {
        req.set_header(name, value);
    }

    if !cookies.is_empty() {
        let mut pairs: Vec<_> = cookies.iter().collect();
        pairs.sort();
        let cookie = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        req.set_header("Cookie", &cookie);
    }

    if !body.is_empty() {
        if !target.content_type.is_empty() && req.header("content-type").is_none() {
            req.set_header("Content-Type", &target.content_type);
        }
        req.set_body(body);
    }

    Ok(req)
}

fn replace_query(url: &mut Url, name: &str, value: &str) {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if k == name {
                (k.to_string(), value.to_string())
            } else {
                (k.to_string(), v.to_string())
            }
        })
        .collect();

    if !pairs.iter().any(|(k, _)| k == name) {
        pairs.push((name.to_string(), value.to_string()));
    }

    url.query_pairs_mut().clear().extend_pairs(pairs);
}

fn replace_path(url: &mut Url, original: &str, value: &str) {
    let segments: Vec<String> = match url.path_segments() {
        Some(segments) => segments.map(str::to_string).collect(),
        None => return,
    };

    let mut replaced = false;
    let rebuilt: Vec<String> = segments
        .into_iter()
        .map(|segment| {
            if !replaced && segment == original {
                replaced = true;
                value.to_string()
            } else {
                segment
            }
        })
        .collect();

    url.set_path(&format!("/{}", rebuilt.join("/")));
}

fn replace_form(body: &str, name: &str, value: &str) -> String {
    let mut found = false;
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in form_urlencoded::parse(body.as_bytes()) {
        if k == name {
            found = true;
            serializer.append_pair(&k, value);
        } else {
            serializer.append_pair(&k, &v);
        }
    }
    if !found {
        serializer.append_pair(name, value);
    }
    serializer.finish()
}

/// Top-level key for JSON, `variables.<name>` for GraphQL
fn replace_json(body: &str, name: &str, value: &str, graphql: bool) -> anyhow::Result<String> {
    let mut doc: serde_json::Value =
        serde_json::from_str(body).context("request body is not valid JSON")?;

    let object = if graphql {
        doc.get_mut("variables").and_then(|v| v.as_object_mut())
    } else {
        doc.as_object_mut()
    };

    match object {
        Some(map) => {
            map.insert(name.to_string(), serde_json::Value::String(value.to_string()));
        }
        None => anyhow::bail!("no JSON object holds parameter {}", name),
    }

    Ok(serde_json::to_string(&doc)?)
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn replace_xml(body: &str, name: &str, original: &str, value: &str) -> String {
    let from = format!("<{name}>{}</{name}>", xml_escape(original));
    let to = format!("<{name}>{}</{name}>", xml_escape(value));
    body.replacen(&from, &to, 1)
}

fn replace_multipart(body: &str, name: &str, original: &str, value: &str) -> String {
    let from = format!("name=\"{}\"\r\n\r\n{}", name, original);
    let to = format!("name=\"{}\"\r\n\r\n{}", name, value);
    body.replacen(&from, &to, 1)
}

/// Sends probes for one parameter, honouring cancellation and counting requests
pub struct Prober<'a> {
    cancel: &'a CancellationToken,
    transport: &'a dyn Transport,
    target: &'a ScanTarget,
    parameter: &'a Parameter,
    requests: AtomicUsize,
}

impl<'a> Prober<'a> {
    pub fn new(
        cancel: &'a CancellationToken,
        transport: &'a dyn Transport,
        target: &'a ScanTarget,
        parameter: &'a Parameter,
    ) -> Self {
        Self {
            cancel,
            transport,
            target,
            parameter,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn parameter(&self) -> &Parameter {
        self.parameter
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SqliError::Cancelled);
        }
        Ok(())
    }

    /// Send the parameter with a raw value
    pub async fn query_page(&self, value: &str) -> Result<HttpResponse> {
        self.check_cancelled()?;

        let req = build_probe(self.target, self.parameter, value).map_err(SqliError::Transport)?;
        self.requests.fetch_add(1, Ordering::Relaxed);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SqliError::Cancelled),
            resp = self.transport.execute(req) => resp.map_err(SqliError::Transport),
        }
    }

    pub async fn send(&self, payload: &Payload) -> Result<HttpResponse> {
        tracing::trace!(param = %self.parameter.name, payload = %payload, "probe");
        self.query_page(&payload.render()).await
    }

    /// Unmodified request, used for timing baselines
    pub async fn original(&self) -> Result<HttpResponse> {
        self.query_page(&self.parameter.value).await
    }

    /// Requests issued so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ScanTarget {
        let mut target = ScanTarget::new("http://shop.local/item?id=7&cat=books");
        target.headers.insert("X-Api".into(), "k".into());
        target.cookies.insert("session".into(), "abc".into());
        target
    }

    #[test]
    fn test_query_substitution_keeps_others() {
        let target = target();
        let param = Parameter::new("id", "7", Location::Query);
        let req = build_probe(&target, &param, "7' AND '1'='1'-- -").unwrap();

        let pairs: Vec<(String, String)> = req.url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("id".to_string(), "7' AND '1'='1'-- -".to_string()));
        assert_eq!(pairs[1], ("cat".to_string(), "books".to_string()));
        assert_eq!(req.header("x-api"), Some("k"));
        assert_eq!(req.header("cookie"), Some("session=abc"));
        assert_eq!(req.method, Method::GET);
    }

    #[test]
    fn test_form_body_substitution() {
        let target = ScanTarget::new("http://shop.local/login")
            .with_method("post")
            .with_body("user=bob&pass=x", "application/x-www-form-urlencoded");
        let param = Parameter::new("user", "bob", Location::Body);
        let req = build_probe(&target, &param, "bob'").unwrap();

        assert_eq!(req.method, Method::POST);
        assert_eq!(req.body_text(), "user=bob%27&pass=x");
        assert_eq!(
            req.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_json_substitution() {
        let target = ScanTarget::new("http://shop.local/api")
            .with_method("POST")
            .with_body(r#"{"id":7,"q":"x"}"#, "application/json");
        let param = Parameter::new("id", "7", Location::Json);
        let req = build_probe(&target, &param, "7 AND 1=1").unwrap();

        let body: serde_json::Value = serde_json::from_str(&req.body_text()).unwrap();
        assert_eq!(body["id"], "7 AND 1=1");
        assert_eq!(body["q"], "x");
    }

    #[test]
    fn test_cookie_and_header_substitution() {
        let target = target();
        let cookie = Parameter::new("session", "abc", Location::Cookie);
        let req = build_probe(&target, &cookie, "abc'").unwrap();
        assert_eq!(req.header("cookie"), Some("session=abc'"));

        let header = Parameter::new("X-Api", "k", Location::Header);
        let req = build_probe(&target, &header, "k\"").unwrap();
        assert_eq!(req.header("x-api"), Some("k\""));
    }

    #[test]
    fn test_path_substitution() {
        let target = ScanTarget::new("http://shop.local/item/7/view");
        let param = Parameter::new("1", "7", Location::Path);
        let req = build_probe(&target, &param, "7 AND 1=1").unwrap();
        assert_eq!(req.url.path(), "/item/7%20AND%201=1/view");
    }

    #[test]
    fn test_probe_is_replayable() {
        let target = target();
        let param = Parameter::new("id", "7", Location::Query);
        let a = build_probe(&target, &param, "7 AND 1=1-- -").unwrap();
        let b = build_probe(&target, &param, "7 AND 1=1-- -").unwrap();
        assert_eq!(a.url, b.url);
        assert_eq!(a.headers, b.headers);
    }
}
