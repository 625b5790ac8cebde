//! Account Directory: the only writer of email identities and user accounts.
//!
//! Email uniqueness rests on two record kinds in different partitions, so
//! there is no transaction spanning them. Each multi-record operation is a
//! saga: a fixed sequence of conditional writes, with the writes committed
//! so far tracked in a step enum. When a later write fails, the step enum is
//! handed to a compensate function that undoes what it names. Compensation
//! is best effort: its own failures are logged and the original error is
//! returned, which can leave an address claimed by an account that does not
//! hold it until someone reconciles it by hand.
//!
//! A store fault does not prove a write was lost. Before compensating an
//! internal failure, a saga reads the record back and treats a write it finds
//! there as committed.
//!
//! Notifications and events are detached only after the primary effect has
//! committed.

mod change_email;
mod create;
mod delete;
mod profile;
mod verify;


use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::{error, warn};

use crate::domain::notifications::{AccountEvent, NotificationDispatch};
use crate::domain::ports::{ETag, StoreError, Table, TableStore};
use crate::domain::side_effects::SharedSideEffects;
use crate::domain::{
    EmailIdentity, Error, Identifier, PasswordHasher, PasswordRecord, UserAccount, UserPatch,
};

pub use create::Registration;

/// Collaborators of the directory.
pub struct AccountDirectoryPorts {
    pub store: Arc<dyn TableStore>,
    pub clock: Arc<dyn Clock>,
    pub notifications: Arc<NotificationDispatch>,
    pub side_effects: SharedSideEffects,
}

/// Owner of the email-identity/user-account invariant.
pub struct AccountDirectory {
    store: Arc<dyn TableStore>,
    clock: Arc<dyn Clock>,
    notifications: Arc<NotificationDispatch>,
    side_effects: SharedSideEffects,
    hasher: PasswordHasher,
}

impl AccountDirectory {
    pub fn new(ports: AccountDirectoryPorts, hasher: PasswordHasher) -> Self {
        Self {
            store: ports.store,
            clock: ports.clock,
            notifications: ports.notifications,
            side_effects: ports.side_effects,
            hasher,
        }
    }

    pub(crate) fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    /// Email identity for an already normalised address.
    pub async fn find_email(&self, email: &str) -> Result<Option<EmailIdentity>, Error> {
        self.store
            .query_by_key(Table::Email, &EmailIdentity::key_for(email))
            .await?
            .map(EmailIdentity::from_record)
            .transpose()
    }

    /// Account by identifier. The sentinel never resolves.
    pub async fn find_account(&self, id: Identifier) -> Result<Option<UserAccount>, Error> {
        if id.is_sentinel() {
            return Ok(None);
        }
        self.store
            .query_by_key(Table::User, &UserAccount::key_for(id))
            .await?
            .map(UserAccount::from_record)
            .transpose()
    }

    /// Account by identifier, or `NotFound`.
    pub async fn require_account(&self, id: Identifier) -> Result<UserAccount, Error> {
        self.find_account(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("account {id} does not exist")))
    }

    /// Resolve an address to its owning account through the email identity.
    pub async fn find_account_by_email(&self, email: &str) -> Result<Option<UserAccount>, Error> {
        let email = crate::domain::normalize_email(email);
        let Some(identity) = self.find_email(&email).await? else {
            return Ok(None);
        };
        if !identity.is_claimed() {
            return Ok(None);
        }
        self.find_account(identity.owner_id).await
    }

    /// Point `email` at `owner`.
    ///
    /// Inserts a pre-claimed identity when none exists, merges into an
    /// unclaimed one under its concurrency token, and refuses claimed ones.
    /// Losing an insert race also answers `EmailUnavailable`, since every
    /// insert writes a claimed identity.
    async fn claim_email(
        &self,
        email: &str,
        owner: Identifier,
        existing: Option<EmailIdentity>,
    ) -> Result<ETag, Error> {
        match existing {
            None => {
                let record = EmailIdentity::new(email, owner, self.now()).to_record()?;
                match self.store.insert(Table::Email, record).await {
                    Ok(etag) => Ok(etag),
                    Err(StoreError::Duplicate { .. }) => Err(Error::email_unavailable()),
                    Err(err) => Err(err.into()),
                }
            }
            Some(identity) if identity.is_claimed() => Err(Error::email_unavailable()),
            Some(identity) => {
                let etag = identity.etag.clone().unwrap_or_else(ETag::any);
                let patch = EmailIdentity::owner_patch(email, owner)?;
                Ok(self.store.merge(Table::Email, patch, etag).await?)
            }
        }
    }

    /// Token of `email`'s identity when it currently names `owner`.
    ///
    /// Used after a claim whose outcome is unknown: a store fault can hide a
    /// write that committed.
    async fn owned_identity(&self, email: &str, owner: Identifier) -> Result<Option<ETag>, Error> {
        Ok(self
            .find_email(email)
            .await?
            .filter(|identity| identity.owner_id == owner)
            .and_then(|identity| identity.etag))
    }

    /// Set `email`'s owner to the sentinel under `etag`.
    async fn release_email(&self, email: &str, etag: ETag) -> Result<ETag, Error> {
        let patch = EmailIdentity::owner_patch(email, Identifier::SENTINEL)?;
        Ok(self.store.merge(Table::Email, patch, etag).await?)
    }

    /// Re-point `email` at `owner` under `etag`.
    async fn reclaim_email(&self, email: &str, owner: Identifier, etag: ETag) -> Result<ETag, Error> {
        let patch = EmailIdentity::owner_patch(email, owner)?;
        Ok(self.store.merge(Table::Email, patch, etag).await?)
    }

    /// Apply a partial account update under `etag`.
    pub(crate) async fn merge_account(
        &self,
        patch: UserPatch,
        etag: Option<ETag>,
    ) -> Result<ETag, Error> {
        let etag = etag.unwrap_or_else(ETag::any);
        Ok(self
            .store
            .merge(Table::User, patch.into_record(), etag)
            .await?)
    }

    /// Persist lockout counters. Used by the sign-in path as a detached
    /// write; a lost race is reported like any other store failure.
    pub async fn persist_password(
        &self,
        id: Identifier,
        password: &PasswordRecord,
        etag: Option<ETag>,
    ) -> Result<ETag, Error> {
        let patch = UserPatch::new(id).password(password)?;
        self.merge_account(patch, etag).await
    }

    fn detach_event(&self, event: AccountEvent) {
        let notifications = Arc::clone(&self.notifications);
        self.side_effects.detach(
            event.name(),
            Box::pin(async move { notifications.publish(&event).await }),
        );
    }

    fn detach_verification_email(&self, account: &UserAccount) {
        let notifications = Arc::clone(&self.notifications);
        let account = account.clone();
        self.side_effects.detach(
            "InternalSendEmailVerification",
            Box::pin(async move { notifications.send_email_verification(&account).await }),
        );
    }

    /// Queue the verification email for `id` now. Succeeds without sending
    /// when nothing is pending.
    pub async fn send_email_verification(&self, id: Identifier) -> Result<(), Error> {
        let account = self.require_account(id).await?;
        self.notifications.send_email_verification(&account).await
    }

    /// Queue the "your address changed" notice to the previous address.
    pub async fn send_email_change_notice(&self, id: Identifier) -> Result<(), Error> {
        let account = self.require_account(id).await?;
        if account.email_old.is_empty() {
            return Ok(());
        }
        let old = account.email_old.clone();
        self.notifications
            .send_email_change_notice(&account, &old)
            .await
    }
}

fn log_compensation(operation: &'static str, step: &str, result: Result<ETag, Error>) {
    match result {
        Ok(_) => warn!(operation, step, "compensation applied"),
        Err(err) => error!(
            operation,
            step,
            error = %err,
            "compensation failed; email ownership needs manual reconciliation"
        ),
    }
}
