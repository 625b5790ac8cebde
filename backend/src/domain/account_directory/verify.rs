//! VerifyContact.

use tracing::info;

use super::AccountDirectory;
use crate::domain::notifications::AccountEvent;
use crate::domain::ports::Table;
use crate::domain::{ContactMethod, Error, Identifier, UserAccount};

impl AccountDirectory {
    /// Accept a submitted verification code.
    ///
    /// Nothing pending counts as already verified. Expiry is checked before
    /// the code itself. A missing account answers `InvalidCredentials`, the
    /// same as sign-in, so verification links cannot probe for accounts.
    pub async fn verify_contact(
        &self,
        user_id: Identifier,
        method: ContactMethod,
        submitted: &str,
    ) -> Result<UserAccount, Error> {
        if method == ContactMethod::Mobile {
            return Err(Error::not_implemented("mobile verification"));
        }
        let Some(mut account) = self.find_account(user_id).await? else {
            return Err(Error::invalid_credentials());
        };
        let Some(pending) = &account.email_verification else {
            return Ok(account);
        };
        if pending.is_expired(self.now()) {
            return Err(Error::verification_expired());
        }
        if !pending.matches(submitted) {
            return Err(Error::invalid_verification_code());
        }

        account.mark_verified(method);
        let etag = self.store.replace(Table::User, account.to_record()?).await?;
        account.etag = Some(etag);
        info!(user_id = %user_id, "email verified");
        self.detach_event(AccountEvent::EmailVerified { user_id });
        Ok(account)
    }
}
