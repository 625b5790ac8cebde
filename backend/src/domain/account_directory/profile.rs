//! Single-record account updates, each a conditional merge under the
//! concurrency token from the preceding read.

use std::collections::BTreeMap;

use tracing::info;

use super::AccountDirectory;
use crate::domain::notifications::AccountEvent;
use crate::domain::{Error, Identifier, PasswordRecord, UserAccount, UserPatch, password};

impl AccountDirectory {
    /// Replace the password after checking the current one.
    ///
    /// The new hash starts with cleared lockout counters.
    pub async fn update_password(
        &self,
        user_id: Identifier,
        current: &str,
        replacement: &str,
    ) -> Result<(), Error> {
        if current.is_empty() || replacement.is_empty() {
            return Err(Error::invalid_parameter("Password"));
        }
        if !password::score(replacement).good {
            return Err(Error::invalid_parameter("Password Strength"));
        }
        let account = self.require_account(user_id).await?;
        if !self.hasher().verify(current, &account.password.hash).await {
            return Err(Error::invalid_credentials());
        }
        let hash = self.hasher().hash(replacement).await?;
        let patch = UserPatch::new(user_id).password(&PasswordRecord::new(hash))?;
        self.merge_account(patch, account.etag).await?;
        info!(user_id = %user_id, "password updated");
        self.detach_event(AccountEvent::PasswordUpdated { user_id });
        Ok(())
    }

    /// Set a trimmed, non-empty display name.
    pub async fn update_display_name(
        &self,
        user_id: Identifier,
        display_name: &str,
    ) -> Result<UserAccount, Error> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(Error::invalid_parameter("DisplayName"));
        }
        let mut account = self.require_account(user_id).await?;
        let patch = UserPatch::new(user_id).display_name(display_name)?;
        account.etag = Some(self.merge_account(patch, account.etag.clone()).await?);
        account.display_name = display_name.to_owned();
        Ok(account)
    }

    /// Upsert each entry into the account's site settings and return the
    /// merged map.
    pub async fn update_site_settings(
        &self,
        user_id: Identifier,
        settings: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, Error> {
        let account = self.require_account(user_id).await?;
        let mut merged = account.site_settings;
        merged.extend(settings);
        let patch = UserPatch::new(user_id).site_settings(&merged)?;
        self.merge_account(patch, account.etag).await?;
        Ok(merged)
    }

    /// Flag the current address as undeliverable.
    pub async fn mark_contact_invalid(&self, user_id: Identifier) -> Result<(), Error> {
        let account = self.require_account(user_id).await?;
        let patch = UserPatch::new(user_id).email_invalid(true)?;
        self.merge_account(patch, account.etag).await?;
        info!(user_id = %user_id, "email marked invalid");
        Ok(())
    }
}
