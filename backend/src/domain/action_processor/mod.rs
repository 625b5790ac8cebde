//! Action Processor: typed dispatch from client actions to account
//! operations, answering with the uniform envelope.
//!
//! Two rules apply to every generic request before dispatch:
//!
//! - The capability fence. Cookie-authenticated users may only reach actions
//!   up to [`ActionType::USER_BOUNDARY`]; `Internal*` actions need an admin
//!   API caller. Anything else answers `NotFound`, as if the action did not
//!   exist.
//! - Server-side identity. Operations act on the identity resolved from the
//!   credential, never on an id in the payload. An admin may substitute
//!   another account with `obo`, which then holds for the whole request.

mod action;
mod envelope;
mod identity;


use std::sync::Arc;

use tracing::{debug, error, info};

pub use action::{
    Action, ActionRequest, ActionType, CancelRequest, ChangeEmailRequest, Credentials,
    DisplayNameRequest, SignupRequest, SiteInfoRequest, TargetRequest, UpdatePasswordRequest,
    VerifyEmailRequest,
};
pub use envelope::{ApiResponse, ResponseData, ResponseType, SiteInfoView, UserView, account_response};
pub use identity::{AuthenticationMode, RequestIdentity};

use crate::domain::ports::TokenClaims;
use crate::domain::side_effects::SharedSideEffects;
use crate::domain::{
    AccountDirectory, AccountType, ActivityLog, ContactMethod, Error, Identifier, Language,
    Registration, SystemState, UserAccount, normalize_email, password,
};

/// Reject blank and obviously malformed addresses. Expects a normalised
/// address.
fn validate_email(email: &str) -> Result<(), Error> {
    if email.is_empty() {
        return Err(Error::invalid_parameter("Email"));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(Error::invalid_email_address());
    };
    let well_formed = !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace);
    if well_formed {
        Ok(())
    } else {
        Err(Error::invalid_email_address())
    }
}

/// Routes actions to the directory and builds envelopes.
pub struct ActionProcessor {
    directory: Arc<AccountDirectory>,
    system: SystemState,
    activity: ActivityLog,
    side_effects: SharedSideEffects,
}

impl ActionProcessor {
    pub fn new(
        directory: Arc<AccountDirectory>,
        system: SystemState,
        activity: ActivityLog,
        side_effects: SharedSideEffects,
    ) -> Self {
        Self {
            directory,
            system,
            activity,
            side_effects,
        }
    }

    pub fn system(&self) -> &SystemState {
        &self.system
    }

    pub fn directory(&self) -> &Arc<AccountDirectory> {
        &self.directory
    }

    /// Validate signup input and create the account.
    pub async fn signup(&self, request: SignupRequest) -> Result<UserAccount, Error> {
        let email = normalize_email(&request.email);
        validate_email(&email)?;
        if request.password.trim().is_empty() {
            return Err(Error::invalid_parameter("Password"));
        }
        if !password::score(&request.password).good {
            return Err(Error::invalid_parameter("Password Strength"));
        }
        self.directory
            .create_account(Registration {
                email,
                password: request.password,
                display_name: request.display_name,
                language: request.language.unwrap_or_default(),
                account_type: AccountType::Standard,
            })
            .await
    }

    /// Accept an email verification code for `user_id`.
    pub async fn verify_email(&self, user_id: Identifier, code: &str) -> Result<UserAccount, Error> {
        self.directory
            .verify_contact(user_id, ContactMethod::Email, code)
            .await
    }

    /// Resolve credential claims into accounts.
    ///
    /// An impersonation claim is honoured only for admins.
    pub async fn identify(
        &self,
        mode: AuthenticationMode,
        claims: &TokenClaims,
    ) -> Result<RequestIdentity, Error> {
        let site_user = self
            .directory
            .find_account(claims.user_id)
            .await?
            .ok_or_else(Error::invalid_credentials)?;
        let identity = RequestIdentity::new(mode, site_user);
        match claims.acting_as {
            None => Ok(identity),
            Some(_) if !identity.is_admin() => Err(Error::insufficient_permission(
                "only admins may act on behalf of another account",
            )),
            Some(other) => {
                let acting_as = self.directory.require_account(other).await?;
                Ok(identity.acting_as(acting_as))
            }
        }
    }

    /// Substitute the account owning `email` for an admin caller.
    pub async fn impersonate(
        &self,
        identity: RequestIdentity,
        email: &str,
    ) -> Result<RequestIdentity, Error> {
        if !identity.is_admin() {
            return Err(Error::insufficient_permission(
                "only admins may act on behalf of another account",
            ));
        }
        let target = self
            .directory
            .find_account_by_email(email)
            .await?
            .ok_or_else(|| Error::not_found("no account owns that email"))?;
        info!(
            admin_id = %identity.site_user.id,
            user_id = %target.id,
            "acting on behalf of another account"
        );
        Ok(identity.acting_as(target))
    }

    /// Run one generic request and answer with a localised envelope.
    pub async fn process(&self, identity: &RequestIdentity, request: ActionRequest) -> ApiResponse {
        let action = request.action;
        let result = self.run(identity, request).await;
        self.respond(
            action.name(),
            identity.site_user.language,
            Some(identity.effective_id()),
            result,
        )
    }

    /// Turn an outcome into an envelope with the message in `language`.
    ///
    /// Internal failures are logged and written to the error activity log;
    /// their diagnostic text never reaches the envelope.
    pub fn respond(
        &self,
        operation: &'static str,
        language: Language,
        user_id: Option<Identifier>,
        result: Result<ApiResponse, Error>,
    ) -> ApiResponse {
        let err = match result {
            Ok(response) => return response,
            Err(err) => err,
        };
        if err.code().is_internal() {
            error!(operation, error = %err, "action failed");
            let activity = self.activity.clone();
            let message = err.message().to_owned();
            self.side_effects.detach(
                "record-error",
                Box::pin(async move { activity.record_error(operation, &message, user_id).await }),
            );
        } else {
            debug!(operation, code = err.code().name(), "action refused");
        }
        let mut response = ApiResponse::from_error(&err);
        response.set_message(self.system.text_for(err.code(), language));
        response
    }

    async fn run(
        &self,
        identity: &RequestIdentity,
        request: ActionRequest,
    ) -> Result<ApiResponse, Error> {
        self.system.require_loaded()?;
        fence(identity, request.action)?;
        let action = Action::parse(request.action, request.request)?;
        match request.obo.as_deref() {
            Some(email) => {
                let impersonated = self.impersonate(identity.clone(), email).await?;
                self.execute(&impersonated, action).await
            }
            None => self.execute(identity, action).await,
        }
    }

    async fn execute(
        &self,
        identity: &RequestIdentity,
        action: Action,
    ) -> Result<ApiResponse, Error> {
        let user_id = identity.effective_id();
        match action {
            Action::Status
            | Action::ResetPassword
            | Action::AdminDeleteUser
            | Action::AdminReload
            | Action::AdminMarkUserVerified => Err(Error::not_implemented(format!(
                "{} is not implemented",
                action.action_type().name()
            ))),
            Action::Signup(request) => {
                let account = self.signup(request).await?;
                Ok(account_response(&account))
            }
            Action::UpdateDisplayName(request) => {
                self.directory
                    .update_display_name(user_id, &request.display_name)
                    .await?;
                Ok(ApiResponse::success())
            }
            Action::UpdatePassword(request) => {
                self.directory
                    .update_password(user_id, &request.old_password, &request.new_password)
                    .await?;
                Ok(ApiResponse::success())
            }
            Action::VerifyEmail(request) => {
                let account = self.verify_email(user_id, &request.code).await?;
                Ok(account_response(&account))
            }
            Action::SiteInfo(request) => {
                let settings = self
                    .directory
                    .update_site_settings(user_id, request.settings)
                    .await?;
                Ok(ApiResponse::success().with(ResponseType::SiteInfo, &SiteInfoView { settings }))
            }
            Action::ChangeEmail(request) => {
                let email = normalize_email(&request.email);
                validate_email(&email)?;
                let account = self.directory.change_email(user_id, &email).await?;
                Ok(account_response(&account))
            }
            Action::Cancel(request) => {
                info!(user_id = %user_id, reason = ?request.reason, "account cancelled");
                self.directory.delete_account(user_id).await?;
                Ok(ApiResponse::success())
            }
            Action::MarkContactMethodInvalid(target) => {
                let target = resolve_target(identity, &target)?;
                self.directory.mark_contact_invalid(target).await?;
                Ok(ApiResponse::success())
            }
            Action::SendEmailVerification(target) => {
                let target = resolve_target(identity, &target)?;
                self.directory.send_email_verification(target).await?;
                Ok(ApiResponse::success())
            }
            Action::SendEmailChangeToOldEmail(target) => {
                let target = resolve_target(identity, &target)?;
                self.directory.send_email_change_notice(target).await?;
                Ok(ApiResponse::success())
            }
        }
    }
}

/// Apply the capability fence for `identity`'s authentication mode.
fn fence(identity: &RequestIdentity, action: ActionType) -> Result<(), Error> {
    let allowed = match identity.mode {
        AuthenticationMode::UserCookie => action.is_user(),
        AuthenticationMode::Api => !action.is_internal() || identity.is_admin(),
    };
    if allowed {
        Ok(())
    } else {
        Err(Error::not_found(format!(
            "action {} is not available to this caller",
            action.name()
        )))
    }
}

/// Target of an `Internal*` action: the payload's `userId` when given,
/// otherwise the caller.
fn resolve_target(identity: &RequestIdentity, target: &TargetRequest) -> Result<Identifier, Error> {
    match target.user_id.as_deref() {
        None => Ok(identity.effective_id()),
        Some(raw) => Identifier::parse(raw).ok_or_else(|| Error::invalid_parameter("UserId")),
    }
}
