//! The uniform response envelope `{codeText, code, message, data}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::error;
use utoipa::ToSchema;

use crate::domain::{AccountType, Error, Identifier, Language, ResponseCode, UserAccount, UserStatus};

/// Keys of the `data` map.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum ResponseType {
    Raw,
    Error,
    Metadata,
    SiteInfo,
    Strings,
    User,
}

/// Payloads keyed by kind.
pub type ResponseData = BTreeMap<ResponseType, Value>;

/// Response to every action and hub method.
///
/// # Examples
/// ```
/// use sitehub::domain::{ApiResponse, Error, ResponseCode};
///
/// let mut response = ApiResponse::from_error(&Error::email_unavailable());
/// response.set_message("That email is taken");
/// assert_eq!(response.code(), ResponseCode::EmailUnavailable);
/// assert_eq!(response.message(), "That email is taken");
///
/// let mut ok = ApiResponse::success();
/// ok.set_message("ignored");
/// assert_eq!(ok.message(), "");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ApiResponse {
    #[serde(rename = "codeText")]
    code_text: ResponseCode,
    /// Numeric form of `codeText`.
    code: i64,
    /// Localised text for failures; empty on success.
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    data: Option<ResponseData>,
}

impl ApiResponse {
    /// Bare response carrying `code`.
    pub fn new(code: ResponseCode) -> Self {
        Self {
            code_text: code,
            code: code.value(),
            message: String::new(),
            data: None,
        }
    }

    /// `Ok` with no data.
    pub fn success() -> Self {
        Self::new(ResponseCode::Ok)
    }

    /// Response for a failed operation. `InvalidParameter` carries the field
    /// name in `data.Error.field`.
    pub fn from_error(err: &Error) -> Self {
        let response = Self::new(err.code());
        match err.field() {
            Some(field) if err.code() == ResponseCode::InvalidParameter => {
                response.with(ResponseType::Error, &json!({ "field": field }))
            }
            _ => response,
        }
    }

    /// Attach a payload under `kind`.
    #[must_use]
    pub fn with<T: Serialize + ?Sized>(mut self, kind: ResponseType, payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => {
                self.data.get_or_insert_with(BTreeMap::new).insert(kind, value);
                self
            }
            Err(err) => {
                error!(kind = ?kind, error = %err, "failed to encode response payload");
                Self::new(ResponseCode::InternalUnhandledError)
            }
        }
    }

    /// Set the message, but only on failures.
    pub fn set_message(&mut self, message: impl Into<String>) {
        if !self.code_text.is_ok() {
            self.message = message.into();
        }
    }

    pub fn code(&self) -> ResponseCode {
        self.code_text
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Payload stored under `kind`.
    pub fn data(&self, kind: ResponseType) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(&kind))
    }
}

/// Client view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[schema(value_type = String)]
    pub user_id: Identifier,
    pub display_name: String,
    pub language: Language,
    pub email: String,
    pub email_verified: bool,
    pub status: UserStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}

impl From<&UserAccount> for UserView {
    fn from(account: &UserAccount) -> Self {
        Self {
            user_id: account.id,
            display_name: account.display_name.clone(),
            language: account.language,
            email: account.email.clone(),
            email_verified: account.email_verification.is_none(),
            status: account.status,
            is_admin: (account.account_type == AccountType::Admin).then_some(true),
        }
    }
}

/// Client view of an account's site settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SiteInfoView {
    pub settings: BTreeMap<String, String>,
}

/// `Ok` with `data.User` and, when any are set, `data.SiteInfo`.
pub fn account_response(account: &UserAccount) -> ApiResponse {
    let response = ApiResponse::success().with(ResponseType::User, &UserView::from(account));
    if account.site_settings.is_empty() {
        response
    } else {
        response.with(
            ResponseType::SiteInfo,
            &SiteInfoView {
                settings: account.site_settings.clone(),
            },
        )
    }
}
