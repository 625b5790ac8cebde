//! Port for signed bearer credentials and email verification strings.
//!
//! Signing is CPU-bound, so the trait is synchronous.
use crate::domain::Identifier;

use super::define_port_error;

define_port_error! {
    /// Errors raised while issuing or validating credentials.
    pub enum CredentialError {
        /// Token is malformed, expired, or carries a bad signature.
        Invalid { message: String } => "credential rejected: {message}",
        /// Token could not be produced.
        Signing { message: String } => "credential signing failed: {message}",
    }
}

/// Identity bound into a bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenClaims {
    /// Authenticated account.
    pub user_id: Identifier,
    /// Account being impersonated, when on-behalf-of is active.
    pub acting_as: Option<Identifier>,
}

impl TokenClaims {
    /// Claims for a caller acting as themselves.
    pub const fn for_user(user_id: Identifier) -> Self {
        Self {
            user_id,
            acting_as: None,
        }
    }
}

/// Decoded verification link payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationTicket {
    /// Account whose contact method is being verified.
    pub user_id: Identifier,
    /// Code issued with the pending verification.
    pub code: String,
}

#[cfg_attr(test, mockall::automock)]
pub trait CredentialService: Send + Sync {
    /// Produce a bearer credential with the configured expiry.
    fn issue(&self, claims: &TokenClaims) -> Result<String, CredentialError>;

    /// Check signature and expiry and return the bound identity.
    fn validate(&self, token: &str) -> Result<TokenClaims, CredentialError>;

    /// Produce the opaque string embedded in verification links.
    fn issue_verification(&self, ticket: &VerificationTicket) -> Result<String, CredentialError>;

    /// Parse a verification string produced by [`Self::issue_verification`].
    fn parse_verification(&self, token: &str) -> Result<VerificationTicket, CredentialError>;
}
