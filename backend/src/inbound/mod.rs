//! Inbound adapters that translate external requests into domain service
//! calls while keeping framework details at the edge.
//!
//! The realtime channel lives under [`ws`]; health probes and the API-mode
//! action endpoint live under [`http`].

pub mod http;
pub mod ws;
