//! Stable numeric outcome codes carried by every response envelope.
//!
//! The serialised name (`codeText` on the wire) is the variant name, with
//! the internal and permission families keeping their underscore-separated
//! spelling so existing clients and metadata catalogs stay compatible.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! response_codes {
    ($( $(#[$meta:meta])* $variant:ident = $value:literal => $name:literal ),* $(,)?) => {
        /// Outcome taxonomy shared by the domain and every inbound adapter.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        pub enum ResponseCode {
            $(
                $(#[$meta])*
                #[serde(rename = $name)]
                $variant,
            )*
        }

        impl ResponseCode {
            /// Every code, in numeric order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),*];

            /// Numeric wire value.
            #[must_use]
            pub const fn value(self) -> i64 {
                match self {
                    $(Self::$variant => $value,)*
                }
            }

            /// Wire name, as carried in `codeText`.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            /// Look up a code by its numeric value.
            #[must_use]
            pub const fn from_value(value: i64) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

response_codes! {
    /// Success.
    Ok = 0 => "Ok",
    SiteDown = 1 => "SiteDown",
    /// The requested record does not exist.
    NoData = 2 => "NoData",
    NotFound = 3 => "NotFound",
    /// A required field is missing or invalid; the field name travels in `data.Error`.
    InvalidParameter = 4 => "InvalidParameter",
    /// System data has not finished loading.
    Loading = 5 => "Loading",
    NotLoaded = 6 => "NotLoaded",
    InvalidVersion = 7 => "InvalidVersion",
    Maintenance = 8 => "Maintenance",
    Duplicate = 9 => "Duplicate",
    /// The address is already claimed by another account.
    EmailUnavailable = 102 => "EmailUnavailable",
    /// Unknown email, wrong password, and locked accounts all answer this.
    InvalidCredentials = 107 => "InvalidCredentials",
    InvalidEmailAddress = 108 => "InvalidEmailAddress",
    InvalidEmailVerificationCode = 109 => "InvalidEmailVerificationCode",
    EmailVerificationCodeExpired = 110 => "EmailVerificationCodeExpired",
    /// A conditional write lost an optimistic-concurrency race.
    StoragePreconditionFailed = 412 => "StoragePreconditionFailed",
    InsufficientPermissionMember = 10000 => "InsufficientPermission_Member",
    InternalDatabaseDown = 100_000 => "Internal_DatabaseDown",
    InternalDatabaseError = 100_001 => "Internal_DatabaseError",
    InternalUnhandledError = 100_002 => "Internal_UnhandledError",
    ProviderDown = 100_003 => "Provider_Down",
    ProviderError = 100_004 => "Provider_Error",
    NotImplemented = 100_005 => "NotImplemented",
}

impl ResponseCode {
    /// True for the success code.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// True for codes whose detail must not reach clients.
    #[must_use]
    pub const fn is_internal(self) -> bool {
        self.value() >= 100_000
    }
}
