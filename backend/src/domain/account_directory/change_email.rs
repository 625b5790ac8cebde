//! ChangeEmail saga.
//!
//! 1. Load the account, its current identity, and the target identity.
//! 2. Refuse a target claimed by anyone (including this account).
//! 3. Release the current identity. A release that errors but landed is
//!    undone before returning.
//! 4. Claim the target identity.
//! 5. On failure of 4, re-claim the current identity, unless reading the
//!    target back shows the claim committed after all.
//! 6. Merge the new address and a fresh verification into the account. On
//!    failure, release the target and re-claim the current identity, unless
//!    reading the account back shows the write committed.
//!
//! Once the account write commits, the verification email, the notice to
//! the old address, and the `user-email-changed` event are detached.

use tracing::{error, info, warn};

use super::{AccountDirectory, log_compensation};
use crate::domain::notifications::AccountEvent;
use crate::domain::ports::ETag;
use crate::domain::{
    ContactMethod, ContactVerification, Error, Identifier, UserAccount, UserPatch,
    normalize_email,
};

/// The current identity after step 3.
#[derive(Debug, Clone)]
struct Released {
    email: String,
    etag: ETag,
}

/// Writes committed so far.
#[derive(Debug)]
enum ChangeEmailStep {
    /// Step 3 ran; `None` when there was no identity owned by the account.
    OldReleased(Option<Released>),
    /// Step 4 ran as well.
    NewClaimed {
        old: Option<Released>,
        email: String,
        etag: ETag,
    },
}

impl AccountDirectory {
    async fn compensate_change_email(&self, user_id: Identifier, step: ChangeEmailStep) {
        let old = match step {
            ChangeEmailStep::OldReleased(old) => old,
            ChangeEmailStep::NewClaimed { old, email, etag } => {
                let result = self.release_email(&email, etag).await;
                log_compensation("ChangeEmail", "release new email", result);
                old
            }
        };
        if let Some(Released { email, etag }) = old {
            let result = self.reclaim_email(&email, user_id, etag).await;
            log_compensation("ChangeEmail", "reclaim old email", result);
        }
    }

    /// Re-claim `email` if a release reported as failed actually landed.
    async fn undo_unacknowledged_release(&self, user_id: Identifier, email: &str) {
        let Ok(Some(identity)) = self.find_email(email).await else {
            return;
        };
        if !identity.is_claimed() {
            let etag = identity.etag.unwrap_or_else(ETag::any);
            let result = self.reclaim_email(email, user_id, etag).await;
            log_compensation("ChangeEmail", "reclaim old email", result);
        }
    }

    /// Move `user_id` to `new_email`.
    pub async fn change_email(
        &self,
        user_id: Identifier,
        new_email: &str,
    ) -> Result<UserAccount, Error> {
        let new_email = normalize_email(new_email);
        let mut account = self.require_account(user_id).await?;
        if account.email == new_email {
            return Err(Error::email_unavailable());
        }
        let old_identity = self.find_email(&account.email).await?;
        let new_identity = self.find_email(&new_email).await?;

        if new_identity.as_ref().is_some_and(|identity| identity.is_claimed()) {
            return Err(Error::email_unavailable());
        }

        let verification = ContactVerification::issue(ContactMethod::Email, self.now());
        let email_old = account.email.clone();
        let patch = UserPatch::new(user_id).email_change(&new_email, &email_old, &verification)?;

        let released = match old_identity {
            Some(identity) if identity.owner_id == user_id => {
                let etag = identity.etag.clone().unwrap_or_else(ETag::any);
                match self.release_email(&identity.email, etag).await {
                    Ok(etag) => Some(Released {
                        email: identity.email,
                        etag,
                    }),
                    Err(err) => {
                        if err.code().is_internal() {
                            self.undo_unacknowledged_release(user_id, &identity.email)
                                .await;
                        }
                        return Err(err);
                    }
                }
            }
            _ => None,
        };

        let claim_etag = match self.claim_email(&new_email, user_id, new_identity).await {
            Ok(etag) => etag,
            Err(err) => {
                let landed = if err.code().is_internal() {
                    self.owned_identity(&new_email, user_id)
                        .await
                        .ok()
                        .flatten()
                } else {
                    None
                };
                match landed {
                    Some(etag) => {
                        warn!(user_id = %user_id, error = %err, "email claim reported failure but committed");
                        etag
                    }
                    None => {
                        self.compensate_change_email(
                            user_id,
                            ChangeEmailStep::OldReleased(released),
                        )
                        .await;
                        return Err(err);
                    }
                }
            }
        };
        let step = ChangeEmailStep::NewClaimed {
            old: released,
            email: new_email.clone(),
            etag: claim_etag,
        };

        match self.merge_account(patch, account.etag.clone()).await {
            Ok(etag) => account.etag = Some(etag),
            Err(err) => match self.find_account(user_id).await {
                Ok(Some(stored))
                    if stored.email == new_email
                        && stored.email_verification.as_ref() == Some(&verification) =>
                {
                    warn!(user_id = %user_id, error = %err, "account email write reported failure but committed");
                    account.etag = stored.etag;
                }
                Ok(_) => {
                    self.compensate_change_email(user_id, step).await;
                    return Err(err);
                }
                Err(lookup) => {
                    error!(
                        user_id = %user_id,
                        error = %err,
                        lookup = %lookup,
                        "account email write outcome unknown; email claims left in place"
                    );
                    return Err(err);
                }
            },
        }

        account.email_old = email_old;
        account.email = new_email;
        account.email_invalid = false;
        account.email_verification = Some(verification);
        info!(user_id = %user_id, "account email changed");

        self.detach_verification_email(&account);
        let notifications = std::sync::Arc::clone(&self.notifications);
        let notice_account = account.clone();
        self.side_effects.detach(
            "InternalSendEmailChangeToOldEmail",
            Box::pin(async move {
                let old = notice_account.email_old.clone();
                notifications
                    .send_email_change_notice(&notice_account, &old)
                    .await
            }),
        );
        self.detach_event(AccountEvent::EmailChanged {
            user_id,
            email: account.email.clone(),
            email_old: account.email_old.clone(),
        });
        Ok(account)
    }
}
