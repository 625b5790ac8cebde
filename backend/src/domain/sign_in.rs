//! Sign-in Authenticator.
//!
//! Every failure the caller can see is `InvalidCredentials`: unknown
//! address, unclaimed address, locked account, and wrong password all look
//! the same. Lockout counters are persisted by detached writes so a slow
//! store never delays the answer, and every attempt leaves exactly one
//! sign-in audit entry.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::side_effects::SharedSideEffects;
use crate::domain::{AccountDirectory, ActivityLog, Error, ResponseCode, UserAccount};

/// Verifies credentials and applies the lockout policy.
#[derive(Clone)]
pub struct Authenticator {
    directory: Arc<AccountDirectory>,
    activity: ActivityLog,
    side_effects: SharedSideEffects,
}

impl Authenticator {
    pub fn new(
        directory: Arc<AccountDirectory>,
        activity: ActivityLog,
        side_effects: SharedSideEffects,
    ) -> Self {
        Self {
            directory,
            activity,
            side_effects,
        }
    }

    /// Check `password` for the account that owns `email`.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        user_agent: &str,
    ) -> Result<UserAccount, Error> {
        let outcome = self.check(email, password).await;
        let code = match &outcome {
            Ok(_) => ResponseCode::Ok,
            Err(err) => err.code(),
        };
        self.detach_audit(email, user_agent, code);
        outcome
    }

    async fn check(&self, email: &str, password: &str) -> Result<UserAccount, Error> {
        let Some(mut account) = self.directory.find_account_by_email(email).await? else {
            return Err(Error::invalid_credentials());
        };
        if account.password.locked {
            info!(user_id = %account.id, "sign-in refused for locked account");
            return Err(Error::invalid_credentials());
        }

        let verified = self
            .directory
            .hasher()
            .verify(password, &account.password.hash)
            .await;
        if !verified {
            account.password.record_failure();
            if account.password.locked {
                warn!(user_id = %account.id, strikes = account.password.strikes, "account locked");
            }
            self.detach_password_write(&account);
            return Err(Error::invalid_credentials());
        }

        if account.password.needs_reset() {
            account.password.reset();
            self.detach_password_write(&account);
        }
        Ok(account)
    }

    fn detach_password_write(&self, account: &UserAccount) {
        let directory = Arc::clone(&self.directory);
        let id = account.id;
        let password = account.password.clone();
        let etag = account.etag.clone();
        self.side_effects.detach(
            "persist-password-strikes",
            Box::pin(async move {
                directory
                    .persist_password(id, &password, etag)
                    .await
                    .map(|_| ())
            }),
        );
    }

    fn detach_audit(&self, email: &str, user_agent: &str, code: ResponseCode) {
        let activity = self.activity.clone();
        let email = crate::domain::normalize_email(email);
        let user_agent = user_agent.to_owned();
        self.side_effects.detach(
            "signin-audit",
            Box::pin(async move { activity.record_signin(&email, &user_agent, code).await }),
        );
    }
}
