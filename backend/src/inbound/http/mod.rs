//! HTTP inbound adapter: health probes and the API-mode action endpoint.

pub mod actions;
pub mod error;
pub mod health;
pub mod state;
