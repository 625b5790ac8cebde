//! DeleteAccount.
//!
//! 1. Delete the account's partition.
//! 2. Release the account's email identity.
//!
//! Step 2 is best effort. When it fails the address stays claimed by an id
//! that no longer exists, and is logged for reconciliation.

use tracing::{error, info};

use super::AccountDirectory;
use crate::domain::notifications::AccountEvent;
use crate::domain::ports::{ETag, Table};
use crate::domain::{Error, Identifier};

impl AccountDirectory {
    async fn release_owned_email(&self, email: &str, owner: Identifier) -> Result<(), Error> {
        let Some(identity) = self.find_email(email).await? else {
            return Ok(());
        };
        if identity.owner_id != owner {
            return Ok(());
        }
        let etag = identity.etag.unwrap_or_else(ETag::any);
        self.release_email(email, etag).await.map(|_| ())
    }

    /// Remove every record under the account and free its address.
    pub async fn delete_account(&self, user_id: Identifier) -> Result<(), Error> {
        let account = self.require_account(user_id).await?;
        let removed = self
            .store
            .delete_partition(Table::User, &user_id.encode())
            .await?;
        info!(user_id = %user_id, removed, "account partition deleted");

        if let Err(err) = self.release_owned_email(&account.email, user_id).await {
            error!(
                user_id = %user_id,
                email = %account.email,
                error = %err,
                "failed to release email of deleted account; needs manual reconciliation"
            );
        }
        self.detach_event(AccountEvent::Cancelled { user_id });
        Ok(())
    }
}
