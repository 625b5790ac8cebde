//! Wire-level frames for the realtime channel.
//!
//! Clients send `{"method": ..., "messageId": ..., ...}` text frames. Each
//! reply echoes the method and message identifier alongside the response
//! envelope and, when the call changed the bound identity, a fresh token.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ActionRequest, ApiResponse, Credentials, SignupRequest};

/// Inbound frame as sent by the client.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubFrame {
    pub method: String,
    /// Opaque correlation value echoed on the reply.
    #[serde(default)]
    pub message_id: Option<Value>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// A decoded hub call.
#[derive(Debug)]
pub enum HubCall {
    Config,
    Signup(SignupRequest),
    Signin(Credentials),
    VerifyEmail { code: String },
    Authenticate { token: String },
    Check,
    OnBehalfOf { email: String },
    RevertOnBehalfOf,
    /// `None` when the payload is empty, which signs the connection off.
    Request(Option<ActionRequest>),
}

/// Reasons a frame cannot be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    UnknownMethod(String),
    InvalidPayload(&'static str),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownMethod(method) => write!(f, "unknown hub method {method:?}"),
            Self::InvalidPayload(method) => write!(f, "invalid payload for {method}"),
        }
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

fn decode<T: for<'de> Deserialize<'de>>(
    method: &'static str,
    payload: Option<Value>,
) -> Result<T, FrameError> {
    serde_json::from_value(payload.unwrap_or(Value::Null))
        .map_err(|_| FrameError::InvalidPayload(method))
}

impl HubFrame {
    /// Decode the method-specific fields into a [`HubCall`].
    pub fn into_call(self) -> Result<HubCall, FrameError> {
        Ok(match self.method.as_str() {
            "config" => HubCall::Config,
            "signup" => HubCall::Signup(decode("signup", self.payload)?),
            "signin" => HubCall::Signin(decode("signin", self.payload)?),
            "verify-email" => HubCall::VerifyEmail {
                code: self.code.unwrap_or_default(),
            },
            "authenticate" => HubCall::Authenticate {
                token: self.token.unwrap_or_default(),
            },
            "check" => HubCall::Check,
            "obo" => HubCall::OnBehalfOf {
                email: self.email.unwrap_or_default(),
            },
            "revert-obo" => HubCall::RevertOnBehalfOf,
            "request" if is_empty(self.payload.as_ref()) => HubCall::Request(None),
            "request" => HubCall::Request(Some(decode("request", self.payload)?)),
            _ => return Err(FrameError::UnknownMethod(self.method)),
        })
    }
}

/// Outbound frame.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubReplyFrame {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ApiResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl HubReplyFrame {
    /// Frame carrying only a method name, such as `connected`.
    pub fn notice(method: &str) -> Self {
        Self {
            method: method.to_owned(),
            message_id: None,
            response: None,
            token: None,
        }
    }

    pub fn reply(
        method: String,
        message_id: Option<Value>,
        response: ApiResponse,
        token: Option<String>,
    ) -> Self {
        Self {
            method,
            message_id,
            response: Some(response),
            token,
        }
    }
}
