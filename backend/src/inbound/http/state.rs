//! Shared HTTP adapter state.
//!
//! Handlers accept this state via `actix_web::web::Data` so they only
//! depend on domain ports and remain testable without I/O.

use std::sync::Arc;

use crate::domain::ports::HubService;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub hub: Arc<dyn HubService>,
}

impl HttpState {
    pub fn new(hub: Arc<dyn HubService>) -> Self {
        Self { hub }
    }
}
