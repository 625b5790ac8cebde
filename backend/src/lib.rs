//! Account and email-identity hub.
//!
//! The crate keeps user accounts and the email addresses that identify them
//! consistent over a key-partitioned entity store, and serves account
//! actions over a realtime channel and an HTTP endpoint.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod settings;
#[doc(hidden)]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
pub use middleware::Trace;
