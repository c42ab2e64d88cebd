//! Expectation registry and request dispatch.
//!
//! The registry keeps expectations in registration order. An inbound request
//! is served by the first expectation whose path, method, limit and query
//! pattern all accept it; overlapping registrations are resolved in favour
//! of the earliest one.

use crate::config::GlobalSettings;
use crate::error::MockError;
use crate::expectation::{Expectation, MockResponse};
use crate::method::Method;
use crate::output::OutputLog;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Status used for every unmatched request.
pub const UNMATCHED_STATUS: u16 = 404;

/// Body sent when no expectation accepts a request.
pub const NO_MATCH_MESSAGE: &str = "No mock could be found to match this request.";

/// Body sent when the selected expectation rejects the request body.
pub const BODY_MISMATCH_MESSAGE: &str = "The request body does not match the mocked request.";

/// An inbound request as seen by the matcher.
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub body: &'a [u8],
}

impl<'a> InboundRequest<'a> {
    pub fn new(method: &'a str, path: &'a str) -> Self {
        Self {
            method,
            path,
            query: None,
            body: &[],
        }
    }

    pub fn with_query(mut self, query: &'a str) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_body(mut self, body: &'a [u8]) -> Self {
        self.body = body;
        self
    }

    fn target(&self) -> String {
        match self.query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.to_string(),
        }
    }
}

/// Ordered collection of expectations plus the dispatcher.
#[derive(Debug)]
pub struct Registry {
    expectations: RwLock<Vec<Arc<Expectation>>>,
    output: Arc<OutputLog>,
    settings: GlobalSettings,
    /// Total requests dispatched.
    requests_total: AtomicU64,
    /// Total requests served by an expectation.
    requests_matched: AtomicU64,
    /// Total requests answered with the unmatched response.
    requests_unmatched: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_settings(GlobalSettings::default())
    }

    pub fn with_settings(settings: GlobalSettings) -> Self {
        Self {
            expectations: RwLock::new(Vec::new()),
            output: Arc::new(OutputLog::with_capacity(settings.output_capacity)),
            settings,
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        }
    }

    pub fn get(&self, path: &str) -> Result<Arc<Expectation>, MockError> {
        Ok(self.register(Expectation::with_method(path, Method::Get)?))
    }

    pub fn post(&self, path: &str) -> Result<Arc<Expectation>, MockError> {
        Ok(self.register(Expectation::with_method(path, Method::Post)?))
    }

    pub fn put(&self, path: &str) -> Result<Arc<Expectation>, MockError> {
        Ok(self.register(Expectation::with_method(path, Method::Put)?))
    }

    pub fn patch(&self, path: &str) -> Result<Arc<Expectation>, MockError> {
        Ok(self.register(Expectation::with_method(path, Method::Patch)?))
    }

    pub fn delete(&self, path: &str) -> Result<Arc<Expectation>, MockError> {
        Ok(self.register(Expectation::with_method(path, Method::Delete)?))
    }

    /// Register an expectation for any supported method token.
    pub fn expect(&self, method: &str, path: &str) -> Result<Arc<Expectation>, MockError> {
        Ok(self.register(Expectation::new(path, method)?))
    }

    /// Register an already constructed expectation.
    pub fn register(&self, expectation: Expectation) -> Arc<Expectation> {
        debug!(
            method = %expectation.method(),
            path = %expectation.path(),
            query = ?expectation.query(),
            "Registering expectation"
        );
        let expectation = Arc::new(expectation);
        self.expectations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&expectation));
        expectation
    }

    /// Remove a registered expectation.
    pub fn remove(&self, expectation: &Arc<Expectation>) -> Result<(), MockError> {
        let mut expectations = self
            .expectations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let index = expectations
            .iter()
            .position(|e| Arc::ptr_eq(e, expectation))
            .ok_or(MockError::NotRegistered)?;
        expectations.remove(index);
        Ok(())
    }

    /// Find the first expectation that accepts a request.
    pub fn find(
        &self,
        path: &str,
        query_string: Option<&str>,
        method: &str,
    ) -> Option<Arc<Expectation>> {
        self.expectations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.matches(path, query_string, method))
            .cloned()
    }

    /// Number of registered expectations.
    pub fn len(&self) -> usize {
        self.expectations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a request to a response.
    pub fn dispatch(&self, request: &InboundRequest<'_>) -> MockResponse {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let target = request.target();

        // A concurrent request may exhaust the found expectation before we claim
        // it; it then drops out of `find` and the next eligible one is tried.
        let expectation = loop {
            let Some(expectation) = self.find(request.path, request.query, request.method)
            else {
                return self.unmatched(request, &target, NO_MATCH_MESSAGE);
            };

            if !expectation.validate_body(request.body) {
                return self.unmatched(request, &target, BODY_MISMATCH_MESSAGE);
            }

            if expectation.try_claim() {
                break expectation;
            }
        };

        self.requests_matched.fetch_add(1, Ordering::Relaxed);
        let response = expectation.response();

        if self.settings.log_matches {
            info!(
                method = %request.method,
                path = %request.path,
                pattern = %expectation.path(),
                status = response.status,
                count = expectation.count(),
                "Request matched expectation"
            );
        }
        self.output.push(format!(
            "{} {} -> {}",
            request.method, target, response.status
        ));

        response
    }

    fn unmatched(&self, request: &InboundRequest<'_>, target: &str, message: &str) -> MockResponse {
        self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
        if self.settings.log_unmatched {
            warn!(
                method = %request.method,
                path = %request.path,
                query = ?request.query,
                "{}", message
            );
        }
        self.output
            .push(format!("{} {} -> {}", request.method, target, message));
        MockResponse::text(UNMATCHED_STATUS, message)
    }

    /// Drain the diagnostic output into `sink`.
    pub fn print_output(&self, sink: impl FnMut(&str)) -> usize {
        self.output.drain(sink)
    }

    /// Shared handle to the diagnostic output.
    pub fn output(&self) -> Arc<OutputLog> {
        Arc::clone(&self.output)
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    /// Get total requests dispatched.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get total requests matched.
    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    /// Get total requests unmatched.
    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }
}
