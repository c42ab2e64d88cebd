//! Declarative configuration for the mock API.
//!
//! A configuration file lists request expectations with their responses and
//! is fed into the registration API at startup.

use crate::method::Method;
use crate::registry::Registry;
use crate::validator::{BodyValidator, JsonValidator, TextValidator};
use anyhow::Context;
use jsonpath_rust::JsonPath;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Main configuration for the mock API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Port to listen on (ephemeral when absent)
    #[serde(default)]
    pub port: Option<u16>,

    /// Address to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Expected requests, in matching order
    #[serde(default)]
    pub requests: Vec<RequestDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            port: None,
            host: default_host(),
            requests: Vec::new(),
            settings: GlobalSettings::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl MockServerConfig {
    /// Load configuration from a YAML or JSON file.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as YAML.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: Self = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, request) in self.requests.iter().enumerate() {
            request
                .validate()
                .map_err(|e| anyhow::anyhow!("Request {}: {}", i, e))?;
        }
        Ok(())
    }

    /// Register every request definition, in order.
    pub fn register(&self, registry: &Registry) -> anyhow::Result<()> {
        for (i, request) in self.requests.iter().enumerate() {
            request
                .register(registry)
                .map_err(|e| anyhow::anyhow!("Request {}: {}", i, e))?;
        }
        Ok(())
    }
}

/// A single expected request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestDefinition {
    /// Path pattern, optionally followed by `?` and a query pattern
    pub path: String,

    /// HTTP method
    #[serde(default)]
    pub method: Method,

    /// Maximum number of times this request can be matched
    #[serde(default)]
    pub limit: Option<u32>,

    /// Body matching
    #[serde(default)]
    pub body: Option<BodyMatcher>,

    /// Response to return
    #[serde(default)]
    pub response: ResponseDefinition,
}

impl RequestDefinition {
    /// Validate the request definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        crate::path::PathPattern::new(self.path.split('?').next().unwrap_or_default())?;
        if let Some(body) = &self.body {
            body.compile()?;
        }
        self.response.validate()?;
        Ok(())
    }

    /// Register this definition as an expectation.
    pub fn register(&self, registry: &Registry) -> anyhow::Result<()> {
        debug!(method = %self.method, path = %self.path, "Setting up mock request");

        let expectation = registry.expect(self.method.as_str(), &self.path)?;
        expectation.status(self.response.status);

        if let Some(limit) = self.limit {
            expectation.limit(limit);
        }
        if let Some(body) = &self.body {
            expectation.validate_shared(body.compile()?);
        }

        if let Some(text) = &self.response.text {
            expectation.text(text.as_str());
        }
        if let Some(json) = &self.response.json {
            expectation.json(json)?;
        }
        if let Some(encoded) = &self.response.base64 {
            use base64::Engine;
            let content = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))?;
            expectation.bytes("application/octet-stream", content);
        }
        if let Some(content_type) = &self.response.content_type {
            let body = expectation.response().body.unwrap_or_default();
            expectation.bytes(content_type, body);
        }

        Ok(())
    }
}

/// Body matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyMatcher {
    /// Exact body match
    Exact { value: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// JSON path matching
    JsonPath {
        /// JSON path expressions and expected values
        expressions: HashMap<String, serde_json::Value>,
    },
    /// Body must contain substring
    Contains { value: String },
    /// Body must be valid JSON (any structure)
    Json,
    /// Body must be empty
    Empty,
}

impl BodyMatcher {
    /// Build the validator for this matcher.
    pub fn compile(&self) -> anyhow::Result<Arc<dyn BodyValidator>> {
        let validator: Arc<dyn BodyValidator> = match self {
            BodyMatcher::Exact { value } => {
                let value = value.clone();
                Arc::new(TextValidator::new(move |body: &str| body == value))
            }
            BodyMatcher::Regex { pattern } => {
                let regex =
                    Regex::new(pattern).map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))?;
                Arc::new(TextValidator::new(move |body: &str| regex.is_match(body)))
            }
            BodyMatcher::JsonPath { expressions } => {
                let compiled = expressions
                    .iter()
                    .map(|(expr, expected)| {
                        JsonPath::<serde_json::Value>::try_from(expr.as_str())
                            .map(|path| (path, expected.clone()))
                            .map_err(|e| anyhow::anyhow!("Invalid JSON path {}: {}", expr, e))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                Arc::new(JsonValidator::new(move |json: &serde_json::Value| {
                    matches_json_paths(json, &compiled)
                }))
            }
            BodyMatcher::Contains { value } => {
                let value = value.clone();
                Arc::new(TextValidator::new(move |body: &str| body.contains(&value)))
            }
            BodyMatcher::Json => Arc::new(JsonValidator::new(|_: &serde_json::Value| true)),
            BodyMatcher::Empty => Arc::new(|body: &[u8]| body.is_empty()),
        };
        Ok(validator)
    }
}

fn matches_json_paths(
    json: &serde_json::Value,
    expressions: &[(JsonPath<serde_json::Value>, serde_json::Value)],
) -> bool {
    expressions.iter().all(|(path, expected)| {
        let results = path.find(json);
        // A null expectation only requires the path to resolve.
        if expected.is_null() {
            !results.is_null()
        } else {
            results == *expected
        }
    })
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Plain text body
    #[serde(default)]
    pub text: Option<String>,

    /// JSON body
    #[serde(default)]
    pub json: Option<serde_json::Value>,

    /// Base64 encoded binary body
    #[serde(default)]
    pub base64: Option<String>,

    /// Content type override
    #[serde(default)]
    pub content_type: Option<String>,
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        Self {
            status: default_status(),
            text: None,
            json: None,
            base64: None,
            content_type: None,
        }
    }
}

fn default_status() -> u16 {
    200
}

impl ResponseDefinition {
    /// Validate the response definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.status < 100 || self.status > 599 {
            anyhow::bail!("Invalid status code: {}", self.status);
        }
        let bodies = [self.text.is_some(), self.json.is_some(), self.base64.is_some()]
            .iter()
            .filter(|set| **set)
            .count();
        if bodies > 1 {
            anyhow::bail!("At most one of text, json and base64 may be set");
        }
        Ok(())
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log all matched requests
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Number of diagnostic output lines kept before the oldest is dropped
    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,

    /// How often the CLI drains diagnostic output, in milliseconds
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            output_capacity: default_output_capacity(),
            drain_interval_ms: default_drain_interval_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_output_capacity() -> usize {
    crate::output::DEFAULT_CAPACITY
}

fn default_drain_interval_ms() -> u64 {
    250
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InboundRequest, UNMATCHED_STATUS};
    use std::io::Write;

    #[test]
    fn test_parse_simple_request() {
        let yaml = r#"
requests:
  - path: /hello
    response:
      text: "Hello, World!"
"#;
        let config: MockServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.requests.len(), 1);
        assert_eq!(config.requests[0].method, Method::Get);
        assert_eq!(config.requests[0].response.status, 200);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.port.is_none());
    }

    #[test]
    fn test_parse_json_response() {
        let yaml = r#"
port: 8080
requests:
  - path: /api/todo/*
    method: post
    limit: 3
    response:
      status: 201
      json:
        message: "created"
        code: 0
"#;
        let config: MockServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, Some(8080));
        let request = &config.requests[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.limit, Some(3));
        assert_eq!(request.response.json.as_ref().unwrap()["message"], "created");
    }

    #[test]
    fn test_parse_invalid_method() {
        let yaml = r#"
requests:
  - path: /hello
    method: FETCH
"#;
        assert!(serde_yaml::from_str::<MockServerConfig>(yaml).is_err());
    }

    #[test]
    fn test_validate_status() {
        let mut config = MockServerConfig::default();
        config.requests.push(RequestDefinition {
            path: "/bad".to_string(),
            method: Method::Get,
            limit: None,
            body: None,
            response: ResponseDefinition {
                status: 42,
                ..Default::default()
            },
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_multiple_bodies() {
        let response = ResponseDefinition {
            text: Some("a".to_string()),
            json: Some(serde_json::json!({"a": 1})),
            ..Default::default()
        };
        assert!(response.validate().is_err());
    }

    #[test]
    fn test_validate_bad_regex() {
        let matcher = BodyMatcher::Regex {
            pattern: "(".to_string(),
        };
        assert!(matcher.compile().is_err());
    }

    #[test]
    fn test_register_into_registry() {
        let yaml = r#"
requests:
  - path: /todo/*
    limit: 1
    response:
      json:
        id: 1
  - path: /upload
    method: PUT
    body:
      type: contains
      value: "hello"
    response:
      status: 204
  - path: /blob
    response:
      base64: "AAEC"
"#;
        let config: MockServerConfig = serde_yaml::from_str(yaml).unwrap();
        let registry = Registry::new();
        config.register(&registry).unwrap();
        assert_eq!(registry.len(), 3);

        let todo = InboundRequest::new("GET", "/todo/1");
        let response = registry.dispatch(&todo);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        assert_eq!(registry.dispatch(&todo).status, UNMATCHED_STATUS);

        let upload = InboundRequest::new("PUT", "/upload").with_body(b"say hello");
        assert_eq!(registry.dispatch(&upload).status, 204);
        let upload = InboundRequest::new("PUT", "/upload").with_body(b"bye");
        assert_eq!(registry.dispatch(&upload).status, UNMATCHED_STATUS);

        let blob = registry.dispatch(&InboundRequest::new("GET", "/blob"));
        assert_eq!(blob.body.as_deref(), Some(&[0u8, 1, 2][..]));
        assert_eq!(blob.content_type.as_deref(), Some("application/octet-stream"));
    }

    #[test]
    fn test_content_type_override() {
        let yaml = r#"
requests:
  - path: /page
    response:
      text: "<h1>hi</h1>"
      content_type: text/html
"#;
        let config: MockServerConfig = serde_yaml::from_str(yaml).unwrap();
        let registry = Registry::new();
        config.register(&registry).unwrap();

        let response = registry.dispatch(&InboundRequest::new("GET", "/page"));
        assert_eq!(response.content_type.as_deref(), Some("text/html"));
        assert_eq!(response.body.as_deref(), Some(&b"<h1>hi</h1>"[..]));
    }

    #[test]
    fn test_body_matchers() {
        let json_path = BodyMatcher::JsonPath {
            expressions: HashMap::from([("$.name".to_string(), serde_json::json!(["John"]))]),
        }
        .compile()
        .unwrap();
        assert!(json_path.validate(br#"{"name": "John"}"#));
        assert!(!json_path.validate(br#"{"name": "Jane"}"#));

        let exact = BodyMatcher::Exact {
            value: "ping".to_string(),
        }
        .compile()
        .unwrap();
        assert!(exact.validate(b"ping"));
        assert!(!exact.validate(b"pong"));

        let json = BodyMatcher::Json.compile().unwrap();
        assert!(json.validate(br#"{"name": "John"}"#));
        assert!(!json.validate(b"not json"));

        let empty = BodyMatcher::Empty.compile().unwrap();
        assert!(empty.validate(b""));
        assert!(!empty.validate(b"x"));
    }

    #[test]
    fn test_from_file_json_and_yaml() {
        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            json,
            r#"{{"port": 9000, "requests": [{{"path": "/a", "method": "DELETE", "response": {{"status": 202}}}}]}}"#
        )
        .unwrap();
        let config = MockServerConfig::from_file(json.path()).unwrap();
        assert_eq!(config.port, Some(9000));
        assert_eq!(config.requests[0].method, Method::Delete);

        let mut yaml = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(yaml, "requests:\n  - path: /b\n    response:\n      status: 700").unwrap();
        assert!(MockServerConfig::from_file(yaml.path()).is_err());
    }
}
