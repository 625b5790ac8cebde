//! Domain-level error type.
//!
//! Errors are transport agnostic: they carry a [`ResponseCode`], a
//! diagnostic message meant for logs, and optional structured details.
//! Client-facing text never comes from `message`; inbound adapters look the
//! code up in the metadata catalog instead.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::ResponseCode;
use crate::domain::ports::StoreError;

/// Domain error payload.
///
/// # Examples
/// ```
/// use sitehub::domain::{Error, ResponseCode};
///
/// let err = Error::invalid_parameter("Email");
/// assert_eq!(err.code(), ResponseCode::InvalidParameter);
/// assert_eq!(err.field(), Some("Email"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    code: ResponseCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl Error {
    /// Create an error. A blank message falls back to the code name.
    pub fn new(code: ResponseCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            code.name().to_owned()
        } else {
            message
        };
        Self {
            code,
            message,
            details: None,
        }
    }

    /// Stable outcome code.
    pub fn code(&self) -> ResponseCode {
        self.code
    }

    /// Diagnostic message for logs.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Supplementary details for adapters.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Name of the offending field for [`ResponseCode::InvalidParameter`].
    pub fn field(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|details| details.get("field"))
            .and_then(Value::as_str)
    }

    /// Attach structured details to the error.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// A required input is missing or malformed.
    pub fn invalid_parameter(field: &str) -> Self {
        Self::new(ResponseCode::InvalidParameter, format!("invalid parameter: {field}"))
            .with_details(json!({ "field": field }))
    }

    /// Record or route missing.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::NotFound, message)
    }

    /// Email already claimed.
    pub fn email_unavailable() -> Self {
        Self::new(ResponseCode::EmailUnavailable, "email address is already claimed")
    }

    /// Address is syntactically unusable.
    pub fn invalid_email_address() -> Self {
        Self::new(ResponseCode::InvalidEmailAddress, "email address is malformed")
    }

    /// Caller lacks the account type the operation needs.
    pub fn insufficient_permission(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::InsufficientPermissionMember, message)
    }

    /// Sign-in or password check failed.
    pub fn invalid_credentials() -> Self {
        Self::new(ResponseCode::InvalidCredentials, "invalid credentials")
    }

    /// Submitted code does not match the pending verification.
    pub fn invalid_verification_code() -> Self {
        Self::new(
            ResponseCode::InvalidEmailVerificationCode,
            "verification code does not match",
        )
    }

    /// Pending verification has expired or the link cannot be parsed.
    pub fn verification_expired() -> Self {
        Self::new(
            ResponseCode::EmailVerificationCodeExpired,
            "verification code has expired",
        )
    }

    /// System data is still loading.
    pub fn loading() -> Self {
        Self::new(ResponseCode::Loading, "system data is loading")
    }

    /// Storage failed after retries or with a non-retryable fault.
    pub fn internal_database(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::InternalDatabaseError, message)
    }

    /// Unexpected failure inside the domain.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::InternalUnhandledError, message)
    }

    /// Recognised action with no implementation.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::NotImplemented, message)
    }

    /// Outbound provider (queue, blob store, token signer) failed.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::ProviderError, message)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.name(), self.message)
    }
}

impl std::error::Error for Error {}

impl From<StoreError> for Error {
    fn from(value: StoreError) -> Self {
        let code = match &value {
            StoreError::NotFound { .. } => ResponseCode::NotFound,
            StoreError::Duplicate { .. } => ResponseCode::Duplicate,
            StoreError::PreconditionFailed { .. } => ResponseCode::StoragePreconditionFailed,
            StoreError::Transient { .. } | StoreError::Fatal { .. } => {
                ResponseCode::InternalDatabaseError
            }
        };
        Self::new(code, value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn blank_message_falls_back_to_code_name() {
        let err = Error::new(ResponseCode::Duplicate, "   ");
        assert_eq!(err.message(), "Duplicate");
    }

    #[rstest]
    #[case(StoreError::not_found("x"), ResponseCode::NotFound)]
    #[case(StoreError::duplicate("x"), ResponseCode::Duplicate)]
    #[case(StoreError::precondition_failed("x"), ResponseCode::StoragePreconditionFailed)]
    #[case(StoreError::transient("x"), ResponseCode::InternalDatabaseError)]
    #[case(StoreError::fatal("x"), ResponseCode::InternalDatabaseError)]
    fn store_errors_map_to_response_codes(
        #[case] store_error: StoreError,
        #[case] expected: ResponseCode,
    ) {
        assert_eq!(Error::from(store_error).code(), expected);
    }

    #[test]
    fn invalid_parameter_carries_field_name() {
        let err = Error::invalid_parameter("Password Strength");
        assert_eq!(err.field(), Some("Password Strength"));
    }
}
