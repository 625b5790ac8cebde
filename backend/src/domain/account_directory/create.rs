//! CreateAccount saga.
//!
//! 1. Claim the email identity for a fresh account id (insert pre-claimed,
//!    or merge into an unclaimed identity).
//! 2. Insert the `Registered` account.
//!
//! If step 2 fails, the claim is released. A step that fails with an internal
//! error is read back first: a claim that landed is released, and an account
//! row that landed counts as created. Verification email and the
//! `user-created` event are detached after step 2 commits.

use tracing::{error, info, warn};
use zeroize::Zeroizing;

use super::{AccountDirectory, log_compensation};
use crate::domain::password::MASKED;
use crate::domain::notifications::AccountEvent;
use crate::domain::ports::{ETag, Table};
use crate::domain::{
    AccountType, Error, Identifier, Language, NewAccount, UserAccount, normalize_email,
};

/// Validated signup input.
#[derive(Clone)]
pub struct Registration {
    pub email: String,
    pub password: Zeroizing<String>,
    pub display_name: String,
    pub language: Language,
    pub account_type: AccountType,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &MASKED)
            .field("display_name", &self.display_name)
            .field("language", &self.language)
            .field("account_type", &self.account_type)
            .finish()
    }
}

/// Writes committed so far.
#[derive(Debug)]
enum CreateStep {
    /// The identity now names the new account; `etag` is from our write.
    EmailClaimed { email: String, etag: ETag },
}

impl AccountDirectory {
    async fn compensate_create(&self, step: CreateStep) {
        match step {
            CreateStep::EmailClaimed { email, etag } => {
                let result = self.release_email(&email, etag).await;
                log_compensation("CreateAccount", "release email claim", result);
            }
        }
    }

    /// Register a new account.
    ///
    /// Fails with `EmailUnavailable` while any account owns the address,
    /// whether or not that account's own creation has finished.
    pub async fn create_account(&self, registration: Registration) -> Result<UserAccount, Error> {
        let email = normalize_email(&registration.email);
        let password_hash = self.hasher().hash(&registration.password).await?;
        let id = Identifier::generate();
        let mut account = UserAccount::register(
            id,
            NewAccount {
                email: email.clone(),
                password_hash,
                display_name: registration.display_name,
                language: registration.language,
                account_type: registration.account_type,
            },
            self.now(),
        );

        let record = account.to_record()?;
        let existing = self.find_email(&email).await?;
        let etag = match self.claim_email(&email, id, existing).await {
            Ok(etag) => etag,
            Err(err) if err.code().is_internal() => {
                if let Ok(Some(etag)) = self.owned_identity(&email, id).await {
                    self.compensate_create(CreateStep::EmailClaimed { email, etag })
                        .await;
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        let step = CreateStep::EmailClaimed { email, etag };

        match self.store.insert(Table::User, record).await {
            Ok(etag) => account.etag = Some(etag),
            Err(err) => match self.find_account(id).await {
                Ok(Some(stored)) => {
                    warn!(user_id = %id, error = %err, "account insert reported failure but committed");
                    account.etag = stored.etag;
                }
                Ok(None) => {
                    self.compensate_create(step).await;
                    return Err(err.into());
                }
                Err(lookup) => {
                    error!(
                        user_id = %id,
                        error = %err,
                        lookup = %lookup,
                        "account insert outcome unknown; email claim left in place"
                    );
                    return Err(err.into());
                }
            },
        }

        info!(user_id = %account.id, "account created");
        self.detach_verification_email(&account);
        self.detach_event(AccountEvent::Created {
            user_id: account.id,
            email: account.email.clone(),
            name: account.display_name.clone(),
        });
        Ok(account)
    }
}
