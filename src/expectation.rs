//! Registered request expectations and their canned responses.

use crate::error::MockError;
use crate::method::Method;
use crate::path::PathPattern;
use crate::query;
use crate::validator::{BodyValidator, JsonValidator, TextValidator, TypedValidator};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A response produced for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Type header, if any
    pub content_type: Option<String>,
    /// Response body, if any
    pub body: Option<Bytes>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: None,
            body: None,
        }
    }
}

impl MockResponse {
    /// A `text/plain` response.
    pub fn text(status: u16, content: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/plain".to_string()),
            body: Some(Bytes::from(content.into())),
        }
    }
}

/// Mutable part of an expectation, configured through the builder methods.
#[derive(Default)]
struct Settings {
    response: MockResponse,
    limit: Option<u32>,
    validator: Option<Arc<dyn BodyValidator>>,
}

/// A registered request expectation.
///
/// Created through [`MockApi`](crate::MockApi) registration methods and
/// configured by chaining:
///
/// ```
/// # use http_mock_api::Registry;
/// # fn main() -> Result<(), http_mock_api::MockError> {
/// let registry = Registry::new();
/// registry
///     .get("/todo/*?page=*")?
///     .json(&serde_json::json!({"title": "write docs"}))?
///     .status(200)
///     .limit(1);
/// # Ok(())
/// # }
/// ```
pub struct Expectation {
    path: PathPattern,
    query: Option<String>,
    method: Method,
    count: AtomicU32,
    settings: RwLock<Settings>,
}

impl Expectation {
    /// Create an expectation from a method token and a path.
    ///
    /// Anything after the first `?` in `path` becomes the query pattern.
    pub fn new(path: &str, method: &str) -> Result<Self, MockError> {
        Self::with_method(path, method.parse()?)
    }

    /// Create an expectation for a known method.
    pub fn with_method(path: &str, method: Method) -> Result<Self, MockError> {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (path, None),
        };

        Ok(Self {
            path: PathPattern::new(path)?,
            query,
            method,
            count: AtomicU32::new(0),
            settings: RwLock::new(Settings::default()),
        })
    }

    /// The path pattern (without the query part).
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// The query pattern, if one was given.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The HTTP method this expectation answers.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Number of requests served by this expectation.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Maximum number of requests this expectation may serve.
    pub fn max_matches(&self) -> Option<u32> {
        self.read().limit
    }

    /// Whether the usage limit has been reached.
    pub fn is_exhausted(&self) -> bool {
        match self.max_matches() {
            Some(limit) => self.count() >= limit,
            None => false,
        }
    }

    /// Set the response status code.
    pub fn status(&self, status: u16) -> &Self {
        self.write().response.status = status;
        self
    }

    /// Respond with a `text/plain` body.
    pub fn text(&self, content: impl Into<String>) -> &Self {
        self.set_body("text/plain", Bytes::from(content.into()))
    }

    /// Respond with `value` serialized as `application/json`.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<&Self, MockError> {
        let content = serde_json::to_vec(value)?;
        Ok(self.set_body("application/json", Bytes::from(content)))
    }

    /// Respond with a raw body and the given content type.
    pub fn bytes(&self, content_type: &str, content: impl Into<Bytes>) -> &Self {
        self.set_body(content_type, content.into())
    }

    /// Limit how many requests this expectation may serve.
    pub fn limit(&self, limit: u32) -> &Self {
        self.write().limit = Some(limit);
        self
    }

    /// Require the request body to satisfy a validator.
    pub fn validate_with(&self, validator: impl BodyValidator + 'static) -> &Self {
        self.validate_shared(Arc::new(validator))
    }

    /// Require the request body to satisfy a validator shared with other
    /// expectations.
    pub fn validate_shared(&self, validator: Arc<dyn BodyValidator>) -> &Self {
        self.write().validator = Some(validator);
        self
    }

    /// Require the request body, as text, to satisfy `predicate`.
    ///
    /// A panicking predicate rejects the body, but the panic hook still
    /// reports it on stderr. Return `false` to reject quietly.
    pub fn validate_text<F>(&self, predicate: F) -> &Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.validate_with(TextValidator::new(predicate))
    }

    /// Require the request body to be JSON satisfying `predicate`.
    ///
    /// A panicking predicate rejects the body, but the panic hook still
    /// reports it on stderr. Return `false` to reject quietly.
    pub fn validate_json<F>(&self, predicate: F) -> &Self
    where
        F: Fn(&serde_json::Value) -> bool + Send + Sync + 'static,
    {
        self.validate_with(JsonValidator::new(predicate))
    }

    /// Require the request body to deserialize into `T` and satisfy `predicate`.
    ///
    /// A panicking predicate rejects the body, but the panic hook still
    /// reports it on stderr. Return `false` to reject quietly.
    pub fn validate_typed<T, F>(&self, predicate: F) -> &Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.validate_with(TypedValidator::<T, F>::new(predicate))
    }

    /// Whether this expectation structurally accepts a request.
    ///
    /// The body validator is not consulted here.
    pub fn matches(&self, path: &str, query_string: Option<&str>, method: &str) -> bool {
        self.path.is_match(path)
            && self.method.as_str() == method
            && !self.is_exhausted()
            && self
                .query
                .as_deref()
                .map_or(true, |pattern| query::is_match(pattern, query_string.unwrap_or("")))
    }

    /// Placeholder values captured from a concrete path.
    pub fn path_params(&self, path: &str) -> Option<HashMap<String, String>> {
        self.path.captures(path)
    }

    /// Run the body validator, if any.
    pub fn validate_body(&self, body: &[u8]) -> bool {
        let validator = self.read().validator.clone();
        validator.map_or(true, |v| v.validate(body))
    }

    /// Record a hit unconditionally.
    pub fn increment(&self) -> u32 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record a hit unless the limit has been reached.
    ///
    /// Returns `false` when the expectation is exhausted.
    pub fn try_claim(&self) -> bool {
        let limit = self.max_matches();
        self.count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| match limit {
                Some(limit) if count >= limit => None,
                _ => Some(count + 1),
            })
            .is_ok()
    }

    /// The configured response.
    pub fn response(&self) -> MockResponse {
        self.read().response.clone()
    }

    fn set_body(&self, content_type: &str, content: Bytes) -> &Self {
        let mut settings = self.write();
        settings.response.content_type = Some(content_type.to_string());
        settings.response.body = Some(content);
        drop(settings);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settings = self.read();
        f.debug_struct("Expectation")
            .field("method", &self.method)
            .field("path", &self.path.as_str())
            .field("query", &self.query)
            .field("count", &self.count())
            .field("limit", &settings.limit)
            .field("status", &settings.response.status)
            .field("validator", &settings.validator.is_some())
            .finish()
    }
}
