//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: entity tables in memory or in PostgreSQL via Diesel,
//!   plus the retrying decorator and the PostgreSQL notification queue
//! - **blob**: blob storage in memory or in a local directory
//! - **queue**: in-memory notification queue
//! - **token**: signed bearer and verification tokens
//!
//! Adapters are thin translators between domain types and infrastructure
//! representations. They contain no business logic.

pub mod blob;
pub mod persistence;
pub mod queue;
pub mod token;
