//! Parameter discovery from the raw request

use super::ParameterParser;
use crate::sqli::core::enums::Location;
use crate::sqli::core::target::Parameter;
use anyhow::{Context, Result};
use url::{form_urlencoded, Url};

/// Query string, form body and top-level JSON object fields
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryStringParser;

fn looks_like_json(body: &str, content_type: &str) -> bool {
    content_type.to_lowercase().contains("json") || body.trim_start().starts_with('{')
}

impl ParameterParser for QueryStringParser {
    fn parse(&self, url: &str, body: &str, content_type: &str) -> Result<Vec<Parameter>> {
        let url = Url::parse(url).with_context(|| format!("invalid target url {}", url))?;

        let mut params: Vec<Parameter> = url
            .query_pairs()
            .map(|(k, v)| Parameter::new(k, v, Location::Query))
            .collect();

        if body.is_empty() {
            return Ok(params);
        }

        if looks_like_json(body, content_type) {
            let doc: serde_json::Value =
                serde_json::from_str(body).context("request body is not valid JSON")?;
            if let Some(object) = doc.as_object() {
                for (key, value) in object {
                    let value = match value {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        _ => continue,
                    };
                    params.push(Parameter::new(key.as_str(), value, Location::Json));
                }
            }
        } else {
            params.extend(
                form_urlencoded::parse(body.as_bytes())
                    .map(|(k, v)| Parameter::new(k, v, Location::Body)),
            );
        }

        Ok(params)
    }
}
