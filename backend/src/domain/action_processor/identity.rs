//! The caller behind a request, resolved once from the transport credential.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{AccountType, Identifier, UserAccount};

/// How the caller authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum AuthenticationMode {
    /// Bearer credential on the HTTP action endpoint.
    Api,
    /// Signed-in user on the realtime channel.
    UserCookie,
}

/// Signed-in account plus an optional impersonated one.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestIdentity {
    pub mode: AuthenticationMode,
    pub site_user: UserAccount,
    /// Account an admin is acting as.
    pub acting_as: Option<UserAccount>,
}

impl RequestIdentity {
    pub fn new(mode: AuthenticationMode, site_user: UserAccount) -> Self {
        Self {
            mode,
            site_user,
            acting_as: None,
        }
    }

    /// Substitute `account` for the rest of the request.
    #[must_use]
    pub fn acting_as(mut self, account: UserAccount) -> Self {
        self.acting_as = Some(account);
        self
    }

    /// Account operations apply to.
    pub fn effective(&self) -> &UserAccount {
        self.acting_as.as_ref().unwrap_or(&self.site_user)
    }

    pub fn effective_id(&self) -> Identifier {
        self.effective().id
    }

    /// The signed-in account, not the impersonated one, is an admin.
    pub fn is_admin(&self) -> bool {
        self.site_user.account_type == AccountType::Admin
    }
}
