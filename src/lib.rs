//! HTTP Mock API
//!
//! An embeddable HTTP test double. Register the requests you expect along
//! with canned responses, start the listener, and point the code under test
//! at it. Requests nobody expected get a `404` with a diagnostic body.
//!
//! # Features
//!
//! - **Path Patterns**: Case-insensitive paths with `*` and `{name}` segments
//! - **Query Patterns**: Multi-valued query parameters with `*` wildcards
//! - **Body Validation**: Text, JSON and typed predicates on the request body
//! - **Match Limits**: Limit how many times an expectation can be matched
//! - **Declarative Setup**: Load expectations from YAML or JSON files
//!
//! # Example
//!
//! ```no_run
//! use http_mock_api::MockApi;
//!
//! # async fn run() -> Result<(), http_mock_api::MockError> {
//! let api = MockApi::new()?;
//! api.get("/todo/*")?
//!     .json(&serde_json::json!({"title": "write tests"}))?
//!     .limit(1);
//! api.post("/todo")?
//!     .status(201)
//!     .validate_json(|todo| todo["title"].is_string());
//!
//! api.start().await?;
//! // ... exercise the code under test against api.url() ...
//! api.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```yaml
//! port: 8080
//! requests:
//!   - path: /hello
//!     method: GET
//!     limit: 1
//!     response:
//!       status: 200
//!       json:
//!         message: "Hello, World!"
//! ```

pub mod config;
pub mod error;
pub mod expectation;
pub mod method;
pub mod output;
pub mod path;
pub mod query;
pub mod registry;
pub mod server;
pub mod validator;

pub use config::MockServerConfig;
pub use error::MockError;
pub use expectation::{Expectation, MockResponse};
pub use method::Method;
pub use registry::{InboundRequest, Registry};
pub use server::MockApi;
pub use validator::BodyValidator;
