//! Driving port for the realtime hub methods.
//!
//! The WebSocket adapter owns framing, heartbeats, and the per-connection
//! credential; everything it answers comes from this port. Each method
//! returns a complete envelope, so failures never cross the port as `Err`.

use async_trait::async_trait;

use super::TokenClaims;
use crate::domain::{ActionRequest, ApiResponse, Credentials, SignupRequest};

/// Outcome of a hub method.
#[derive(Debug, Clone, PartialEq)]
pub struct HubReply {
    pub response: ApiResponse,
    /// Fresh bearer credential for the client to keep.
    pub token: Option<String>,
    /// Identity the connection holds from now on.
    pub claims: Option<TokenClaims>,
}

impl HubReply {
    /// Reply that leaves the connection's identity untouched.
    pub const fn response(response: ApiResponse) -> Self {
        Self {
            response,
            token: None,
            claims: None,
        }
    }
}

/// Hub use-cases. `claims` is `None` for connections that have not signed
/// in; methods needing an identity then answer `InvalidCredentials`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HubService: Send + Sync {
    /// Public metadata catalog.
    async fn config(&self) -> ApiResponse;

    /// Register and sign in.
    async fn signup(&self, request: SignupRequest) -> HubReply;

    /// Check credentials and sign in.
    async fn signin(&self, credentials: Credentials, user_agent: String) -> HubReply;

    /// Accept the string from an email verification link.
    async fn verify_email(&self, code: String) -> ApiResponse;

    /// Bind an existing bearer credential to the connection.
    async fn authenticate(&self, token: String) -> HubReply;

    /// Reload the signed-in account.
    async fn check(&self, claims: Option<TokenClaims>) -> HubReply;

    /// Start acting as the account owning `email`. Admins only.
    async fn on_behalf_of(&self, claims: Option<TokenClaims>, email: String) -> HubReply;

    /// Stop acting on behalf of another account.
    async fn revert_on_behalf_of(&self, claims: Option<TokenClaims>) -> HubReply;

    /// Run a generic action in cookie mode.
    async fn request(&self, claims: Option<TokenClaims>, request: ActionRequest) -> ApiResponse;

    /// Run a generic action presented with an API bearer credential.
    async fn api_request(&self, token: String, request: ActionRequest) -> ApiResponse;
}
