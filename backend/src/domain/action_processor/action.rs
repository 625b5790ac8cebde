//! Action tags and their typed payloads.

use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use crate::domain::password::MASKED;
use crate::domain::{Error, Language};

macro_rules! action_types {
    ($($variant:ident),* $(,)?) => {
        /// Every action a client can name, in wire order.
        ///
        /// The order matters: everything after [`ActionType::UserCancel`] is
        /// outside the user boundary.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ToSchema)]
        pub enum ActionType {
            $($variant,)*
        }

        impl ActionType {
            /// Every tag, in wire order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),*];

            /// Wire name.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)*
                }
            }
        }
    };
}

action_types! {
    Status,
    UserSignup,
    UserUpdateDisplayName,
    UserUpdatePassword,
    UserVerifyEmail,
    UserResetPassword,
    UserSiteInfo,
    UserChangeEmail,
    UserCancel,
    InternalMarkContactMethodInvalid,
    InternalSendEmailVerification,
    InternalSendEmailChangeToOldEmail,
    AdminDeleteUser,
    AdminReload,
    AdminMarkUserVerified,
}

impl ActionType {
    /// Last action a cookie-authenticated user may invoke.
    pub const USER_BOUNDARY: Self = Self::UserCancel;

    /// Tag at `ordinal`, as older clients send it.
    pub fn from_ordinal(ordinal: u64) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    /// Tag by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|tag| tag.name() == name)
    }

    /// Within the user boundary.
    pub fn is_user(self) -> bool {
        self <= Self::USER_BOUNDARY
    }

    /// `Internal*` actions, reserved for elevated API callers.
    pub fn is_internal(self) -> bool {
        self > Self::USER_BOUNDARY && self < Self::AdminDeleteUser
    }
}

impl<'de> Deserialize<'de> for ActionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Tag {
            Ordinal(u64),
            Name(String),
        }

        match Tag::deserialize(deserializer)? {
            Tag::Ordinal(ordinal) => Self::from_ordinal(ordinal)
                .ok_or_else(|| de::Error::custom(format!("unknown action ordinal {ordinal}"))),
            Tag::Name(name) => Self::from_name(&name)
                .ok_or_else(|| de::Error::custom(format!("unknown action {name:?}"))),
        }
    }
}

/// Generic request `{action, request, obo?}`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: ActionType,
    /// Action payload; shape depends on `action`.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub request: Option<Value>,
    /// Email of the account an admin wants to act as.
    #[serde(default)]
    pub obo: Option<String>,
}

/// `UserSignup` payload.
#[derive(Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SignupRequest {
    pub email: String,
    #[schema(value_type = String)]
    pub password: Zeroizing<String>,
    pub display_name: String,
    pub language: Option<Language>,
    pub mobile: Option<String>,
    pub agree: bool,
    pub subscribe: bool,
}

impl std::fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupRequest")
            .field("email", &self.email)
            .field("password", &MASKED)
            .field("display_name", &self.display_name)
            .field("language", &self.language)
            .field("mobile", &self.mobile)
            .field("agree", &self.agree)
            .field("subscribe", &self.subscribe)
            .finish()
    }
}

/// Sign-in credentials.
#[derive(Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Credentials {
    pub username: String,
    #[schema(value_type = String)]
    pub password: Zeroizing<String>,
    pub language: Option<Language>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &MASKED)
            .field("language", &self.language)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayNameRequest {
    pub display_name: String,
}

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdatePasswordRequest {
    pub old_password: Zeroizing<String>,
    pub new_password: Zeroizing<String>,
}

impl std::fmt::Debug for UpdatePasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatePasswordRequest")
            .field("old_password", &MASKED)
            .field("new_password", &MASKED)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyEmailRequest {
    pub code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteInfoRequest {
    pub settings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeEmailRequest {
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// Payload of the `Internal*` actions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetRequest {
    /// Encoded identifier of the target account; the caller's identity when
    /// absent.
    pub user_id: Option<String>,
}

/// A parsed action with its payload.
#[derive(Debug, Clone)]
pub enum Action {
    Status,
    Signup(SignupRequest),
    UpdateDisplayName(DisplayNameRequest),
    UpdatePassword(UpdatePasswordRequest),
    VerifyEmail(VerifyEmailRequest),
    ResetPassword,
    SiteInfo(SiteInfoRequest),
    ChangeEmail(ChangeEmailRequest),
    Cancel(CancelRequest),
    MarkContactMethodInvalid(TargetRequest),
    SendEmailVerification(TargetRequest),
    SendEmailChangeToOldEmail(TargetRequest),
    AdminDeleteUser,
    AdminReload,
    AdminMarkUserVerified,
}

fn payload<T: for<'de> Deserialize<'de>>(request: Option<Value>) -> Result<T, Error> {
    let value = match request {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(value) => value,
    };
    serde_json::from_value(value).map_err(|_| Error::invalid_parameter("Request"))
}

impl Action {
    /// Decode the payload for `action`.
    ///
    /// A missing payload decodes as an empty object. A payload of the wrong
    /// shape is an `InvalidParameter` on `Request`.
    pub fn parse(action: ActionType, request: Option<Value>) -> Result<Self, Error> {
        Ok(match action {
            ActionType::Status => Self::Status,
            ActionType::UserSignup => Self::Signup(payload(request)?),
            ActionType::UserUpdateDisplayName => Self::UpdateDisplayName(payload(request)?),
            ActionType::UserUpdatePassword => Self::UpdatePassword(payload(request)?),
            ActionType::UserVerifyEmail => Self::VerifyEmail(payload(request)?),
            ActionType::UserResetPassword => Self::ResetPassword,
            ActionType::UserSiteInfo => Self::SiteInfo(payload(request)?),
            ActionType::UserChangeEmail => Self::ChangeEmail(payload(request)?),
            ActionType::UserCancel => Self::Cancel(payload(request)?),
            ActionType::InternalMarkContactMethodInvalid => {
                Self::MarkContactMethodInvalid(payload(request)?)
            }
            ActionType::InternalSendEmailVerification => {
                Self::SendEmailVerification(payload(request)?)
            }
            ActionType::InternalSendEmailChangeToOldEmail => {
                Self::SendEmailChangeToOldEmail(payload(request)?)
            }
            ActionType::AdminDeleteUser => Self::AdminDeleteUser,
            ActionType::AdminReload => Self::AdminReload,
            ActionType::AdminMarkUserVerified => Self::AdminMarkUserVerified,
        })
    }

    /// Tag of this action.
    pub const fn action_type(&self) -> ActionType {
        match self {
            Self::Status => ActionType::Status,
            Self::Signup(_) => ActionType::UserSignup,
            Self::UpdateDisplayName(_) => ActionType::UserUpdateDisplayName,
            Self::UpdatePassword(_) => ActionType::UserUpdatePassword,
            Self::VerifyEmail(_) => ActionType::UserVerifyEmail,
            Self::ResetPassword => ActionType::UserResetPassword,
            Self::SiteInfo(_) => ActionType::UserSiteInfo,
            Self::ChangeEmail(_) => ActionType::UserChangeEmail,
            Self::Cancel(_) => ActionType::UserCancel,
            Self::MarkContactMethodInvalid(_) => ActionType::InternalMarkContactMethodInvalid,
            Self::SendEmailVerification(_) => ActionType::InternalSendEmailVerification,
            Self::SendEmailChangeToOldEmail(_) => ActionType::InternalSendEmailChangeToOldEmail,
            Self::AdminDeleteUser => ActionType::AdminDeleteUser,
            Self::AdminReload => ActionType::AdminReload,
            Self::AdminMarkUserVerified => ActionType::AdminMarkUserVerified,
        }
    }
}
