//! Scan target and parameter model

use super::enums::{Location, ParamType};
use serde::Serialize;
use std::collections::HashMap;

/// A single injectable input. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    pub location: Location,
    pub param_type: ParamType,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>, location: Location) -> Self {
        let value = value.into();
        let param_type = ParamType::infer(&value);
        Self {
            name: name.into(),
            value,
            location,
            param_type,
        }
    }
}

/// The request under test.
///
/// Only the scanner mutates it, and only while discovering parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ScanTarget {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub content_type: String,
    pub cookies: HashMap<String, String>,
    pub parameters: Vec<Parameter>,
}

impl ScanTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: String::new(),
            content_type: String::new(),
            cookies: HashMap::new(),
            parameters: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_uppercase();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>, content_type: impl Into<String>) -> Self {
        self.body = body.into();
        self.content_type = content_type.into();
        self
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}
