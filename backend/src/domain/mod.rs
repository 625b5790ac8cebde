//! Domain primitives, aggregates, and use-cases.
//!
//! Public surface:
//! - `Identifier`, `ResponseCode`, `Error`: identity codec, the numeric
//!   outcome taxonomy, and the error value every operation returns.
//! - `UserAccount`, `EmailIdentity`: the two records whose consistency the
//!   `AccountDirectory` sagas maintain.
//! - `Authenticator`: sign-in with lockout and audit.
//! - `ActionProcessor`, `ApiResponse`: typed dispatch and the envelope.
//! - `SystemState`: the loaded gate over metadata and templates.
//! - `SiteHub`: the realtime hub use-cases.

mod account;
pub mod account_directory;
mod action_processor;
mod activity_log;
mod error;
mod identifier;
mod metadata;
pub mod notifications;
pub mod password;
pub mod ports;
mod response_code;
pub mod side_effects;
mod sign_in;
mod site_hub;
mod system_state;
pub mod templates;
mod trace_id;

pub use self::account::{
    AccountType, ContactMethod, ContactVerification, EmailIdentity, Language, NewAccount,
    PasswordRecord, UserAccount, UserPatch, UserStatus, normalize_email,
};
pub use self::account_directory::{AccountDirectory, Registration};
pub use self::action_processor::{
    Action, ActionProcessor, ActionRequest, ActionType, ApiResponse, AuthenticationMode,
    CancelRequest, ChangeEmailRequest, Credentials, DisplayNameRequest, RequestIdentity,
    ResponseData, ResponseType, SignupRequest, SiteInfoRequest, SiteInfoView, TargetRequest,
    UpdatePasswordRequest, UserView, VerifyEmailRequest, account_response,
};
pub use self::activity_log::{ActivityLog, ErrorLogEntry, LogKind, SigninLogEntry};
pub use self::error::Error;
pub use self::identifier::Identifier;
pub use self::metadata::{EnumText, LocalizedText, Metadata, ResponseCodeText, UserStatusText};
pub use self::password::{HashCost, PasswordHasher};
pub use self::response_code::ResponseCode;
pub use self::sign_in::Authenticator;
pub use self::site_hub::SiteHub;
pub use self::system_state::{
    EMAIL_TEMPLATES_BLOB, METADATA_BLOB, SMS_TEMPLATES_BLOB, SystemLoader, SystemSnapshot,
    SystemState,
};
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};
