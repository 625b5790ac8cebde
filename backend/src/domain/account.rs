//! Account entities and their table mapping.
//!
//! Two record types cooperate to keep email addresses unique:
//!
//! - [`EmailIdentity`] lives in the `email` table, keyed by the normalised
//!   address. Its `owner_id` is the sentinel when the address is free.
//! - [`UserAccount`] lives in the `user` table, keyed by the encoded account
//!   identifier. Everything belonging to an account shares its partition, so
//!   deleting the partition deletes the account.
//!
//! Only [`crate::domain::AccountDirectory`] writes these records.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::domain::ports::{ETag, EntityKey, EntityRecord};
use crate::domain::{Error, Identifier, password};

/// Row discriminator for email identities.
pub const EMAIL_ROW: &str = "email";
/// Row discriminator for user accounts.
pub const USER_ROW: &str = "user";

/// Lowercase and trim an address for use as a key.
///
/// # Examples
/// ```
/// use sitehub::domain::normalize_email;
///
/// assert_eq!(normalize_email("  New@Example.COM "), "new@example.com");
/// ```
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Account lifecycle. `Active` and `Suspended` are reserved.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, ToSchema,
)]
pub enum UserStatus {
    #[default]
    None,
    Registered,
    Verified,
    Active,
    Suspended,
    Closed,
}

/// Account privilege level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum AccountType {
    #[default]
    Standard,
    Admin,
}

/// Supported interface languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

impl Language {
    /// Wire code (`en`, `es`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }
}

/// Contact channels that can be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactMethod {
    Email,
    Mobile,
}

/// Pending verification of a contact method.
///
/// Presence means the contact method is unverified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactVerification {
    /// Single-use code.
    pub code: String,
    /// Codes are rejected at or after this instant.
    pub expires_at: DateTime<Utc>,
}

impl ContactVerification {
    /// Lifetime of a freshly issued code.
    pub const LIFETIME_HOURS: i64 = 1;

    /// Issue a new code for `method`, expiring one hour after `now`.
    pub fn issue(method: ContactMethod, now: DateTime<Utc>) -> Self {
        let code = match method {
            ContactMethod::Email => Identifier::generate().encode(),
            ContactMethod::Mobile => password::generate_mobile_code(),
        };
        Self {
            code,
            expires_at: now + Duration::hours(Self::LIFETIME_HOURS),
        }
    }

    /// True once `now` has reached the expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Exact, constant-time code comparison.
    pub fn matches(&self, submitted: &str) -> bool {
        self.code.as_bytes().ct_eq(submitted.as_bytes()).into()
    }
}

/// Stored credential plus lockout counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRecord {
    /// PHC-format one-way hash.
    pub hash: String,
    /// Consecutive failed attempts.
    pub strikes: u32,
    /// Set once `strikes` reaches [`Self::LOCKOUT_THRESHOLD`].
    pub locked: bool,
}

impl PasswordRecord {
    /// Failed attempts that lock the account.
    pub const LOCKOUT_THRESHOLD: u32 = 5;

    /// Fresh record for a new hash.
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            strikes: 0,
            locked: false,
        }
    }

    /// Count one failed attempt, locking at the threshold.
    pub fn record_failure(&mut self) {
        self.strikes = self.strikes.saturating_add(1);
        if self.strikes >= Self::LOCKOUT_THRESHOLD {
            self.locked = true;
        }
    }

    /// True when a successful verification must clear the counters.
    pub fn needs_reset(&self) -> bool {
        self.strikes > 0 || self.locked
    }

    /// Clear the counters.
    pub fn reset(&mut self) {
        self.strikes = 0;
        self.locked = false;
    }
}

/// Ownership record for one normalised email address.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailIdentity {
    /// Normalised address; the partition key.
    pub email: String,
    /// First time the address was referenced.
    pub created: DateTime<Utc>,
    /// Owning account, or the sentinel when free.
    pub owner_id: Identifier,
    /// Token from the last read.
    pub etag: Option<ETag>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailIdentityProperties {
    created: DateTime<Utc>,
    owner_id: Identifier,
}

impl EmailIdentity {
    /// Identity for `email`, owned by `owner_id` (which may be the sentinel).
    pub fn new(email: impl Into<String>, owner_id: Identifier, now: DateTime<Utc>) -> Self {
        Self {
            email: email.into(),
            created: now,
            owner_id,
            etag: None,
        }
    }

    /// Table key for a normalised address.
    pub fn key_for(email: &str) -> EntityKey {
        EntityKey::new(email, EMAIL_ROW)
    }

    /// True when an account owns the address.
    pub fn is_claimed(&self) -> bool {
        !self.owner_id.is_sentinel()
    }

    /// Full record for inserts.
    pub fn to_record(&self) -> Result<EntityRecord, Error> {
        let properties = to_properties(&EmailIdentityProperties {
            created: self.created,
            owner_id: self.owner_id,
        })?;
        Ok(EntityRecord {
            key: Self::key_for(&self.email),
            properties,
            etag: self.etag.clone(),
        })
    }

    /// Rebuild from a stored record.
    pub fn from_record(record: EntityRecord) -> Result<Self, Error> {
        let props: EmailIdentityProperties = from_properties(record.properties)?;
        Ok(Self {
            email: record.key.partition,
            created: props.created,
            owner_id: props.owner_id,
            etag: record.etag,
        })
    }

    /// Partial record that only sets the owner.
    pub fn owner_patch(email: &str, owner_id: Identifier) -> Result<EntityRecord, Error> {
        let mut properties = Map::new();
        properties.insert("ownerId".to_owned(), to_value(&owner_id)?);
        Ok(EntityRecord::new(Self::key_for(email), properties))
    }
}

/// Primary record for a registered user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccount {
    /// Account identifier; encodes to the partition key.
    pub id: Identifier,
    pub created: DateTime<Utc>,
    pub display_name: String,
    pub account_type: AccountType,
    pub status: UserStatus,
    pub language: Language,
    /// Current normalised address.
    pub email: String,
    /// Previous address, kept for audit.
    pub email_old: String,
    /// Set when delivery to `email` bounced.
    pub email_invalid: bool,
    pub email_verification: Option<ContactVerification>,
    pub password: PasswordRecord,
    /// Opaque client preferences.
    pub site_settings: BTreeMap<String, String>,
    /// Token from the last read.
    pub etag: Option<ETag>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserAccountProperties {
    created: DateTime<Utc>,
    display_name: String,
    account_type: AccountType,
    status: UserStatus,
    language: Language,
    email: String,
    #[serde(default)]
    email_old: String,
    #[serde(default)]
    email_invalid: bool,
    #[serde(default)]
    email_verification: Option<ContactVerification>,
    password: PasswordRecord,
    #[serde(default)]
    site_settings: BTreeMap<String, String>,
}

/// Inputs for a new account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Address as supplied; normalised on registration.
    pub email: String,
    /// Hash produced by [`crate::domain::PasswordHasher`].
    pub password_hash: String,
    pub display_name: String,
    pub language: Language,
    pub account_type: AccountType,
}

impl UserAccount {
    /// A `Registered` account with a pending email verification.
    pub fn register(id: Identifier, request: NewAccount, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created: now,
            display_name: request.display_name.trim().to_owned(),
            account_type: request.account_type,
            status: UserStatus::Registered,
            language: request.language,
            email: normalize_email(&request.email),
            email_old: String::new(),
            email_invalid: false,
            email_verification: Some(ContactVerification::issue(ContactMethod::Email, now)),
            password: PasswordRecord::new(request.password_hash),
            site_settings: BTreeMap::new(),
            etag: None,
        }
    }

    /// Table key for an account.
    pub fn key_for(id: Identifier) -> EntityKey {
        EntityKey::new(id.encode(), USER_ROW)
    }

    /// Display name, or the email when no name was given.
    pub fn display_name_or_email(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.email
        } else {
            &self.display_name
        }
    }

    /// Clear the pending verification for `method`, advancing
    /// `Registered` accounts to `Verified`.
    pub fn mark_verified(&mut self, method: ContactMethod) {
        if method == ContactMethod::Email {
            self.email_verification = None;
            if self.status == UserStatus::Registered {
                self.status = UserStatus::Verified;
            }
        }
    }

    /// Full record for inserts and replaces.
    pub fn to_record(&self) -> Result<EntityRecord, Error> {
        let properties = to_properties(&UserAccountProperties {
            created: self.created,
            display_name: self.display_name.clone(),
            account_type: self.account_type,
            status: self.status,
            language: self.language,
            email: self.email.clone(),
            email_old: self.email_old.clone(),
            email_invalid: self.email_invalid,
            email_verification: self.email_verification.clone(),
            password: self.password.clone(),
            site_settings: self.site_settings.clone(),
        })?;
        Ok(EntityRecord {
            key: Self::key_for(self.id),
            properties,
            etag: self.etag.clone(),
        })
    }

    /// Rebuild from a stored record.
    pub fn from_record(record: EntityRecord) -> Result<Self, Error> {
        let id = Identifier::parse(&record.key.partition).ok_or_else(|| {
            Error::internal(format!(
                "user record has malformed key {:?}",
                record.key.partition
            ))
        })?;
        let props: UserAccountProperties = from_properties(record.properties)?;
        Ok(Self {
            id,
            created: props.created,
            display_name: props.display_name,
            account_type: props.account_type,
            status: props.status,
            language: props.language,
            email: props.email,
            email_old: props.email_old,
            email_invalid: props.email_invalid,
            email_verification: props.email_verification,
            password: props.password,
            site_settings: props.site_settings,
            etag: record.etag,
        })
    }
}

/// Partial update of a user account, applied with a conditional merge.
#[derive(Debug, Clone)]
pub struct UserPatch {
    id: Identifier,
    properties: Map<String, Value>,
}

impl UserPatch {
    /// Empty patch for `id`.
    pub fn new(id: Identifier) -> Self {
        Self {
            id,
            properties: Map::new(),
        }
    }

    fn set<T: Serialize>(mut self, name: &str, value: &T) -> Result<Self, Error> {
        self.properties.insert(name.to_owned(), to_value(value)?);
        Ok(self)
    }

    pub fn password(self, password: &PasswordRecord) -> Result<Self, Error> {
        self.set("password", password)
    }

    pub fn display_name(self, name: &str) -> Result<Self, Error> {
        self.set("displayName", &name)
    }

    pub fn site_settings(self, settings: &BTreeMap<String, String>) -> Result<Self, Error> {
        self.set("siteSettings", settings)
    }

    pub fn email_invalid(self, invalid: bool) -> Result<Self, Error> {
        self.set("emailInvalid", &invalid)
    }

    /// Sets `email`, `emailOld`, clears `emailInvalid`, and stores the new
    /// pending verification.
    pub fn email_change(
        self,
        email: &str,
        email_old: &str,
        verification: &ContactVerification,
    ) -> Result<Self, Error> {
        self.set("email", &email)?
            .set("emailOld", &email_old)?
            .set("emailInvalid", &false)?
            .set("emailVerification", &Some(verification))
    }

    /// Partial record ready for the store.
    pub fn into_record(self) -> EntityRecord {
        EntityRecord::new(UserAccount::key_for(self.id), self.properties)
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value)
        .map_err(|err| Error::internal(format!("failed to serialise entity property: {err}")))
}

fn to_properties<T: Serialize>(value: &T) -> Result<Map<String, Value>, Error> {
    match to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::internal(format!(
            "entity properties must serialise to an object, got {other}"
        ))),
    }
}

fn from_properties<T: DeserializeOwned>(properties: Map<String, Value>) -> Result<T, Error> {
    serde_json::from_value(Value::Object(properties))
        .map_err(|err| Error::internal(format!("failed to decode entity properties: {err}")))
}

#[cfg(test)]
mod tests {
    //! Entity mapping and counter behaviour.
    use super::*;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid fixture timestamp")
    }

    fn new_account() -> NewAccount {
        NewAccount {
            email: "New@Example.com".to_owned(),
            password_hash: "$argon2id$fake".to_owned(),
            display_name: " Jane ".to_owned(),
            language: Language::En,
            account_type: AccountType::Standard,
        }
    }

    #[rstest]
    fn registration_normalises_and_issues_verification(now: DateTime<Utc>) {
        let account = UserAccount::register(Identifier::generate(), new_account(), now);
        assert_eq!(account.email, "new@example.com");
        assert_eq!(account.display_name, "Jane");
        assert_eq!(account.status, UserStatus::Registered);
        let verification = account.email_verification.expect("pending verification");
        assert_eq!(verification.expires_at, now + Duration::hours(1));
        assert_eq!(verification.code.len(), 32);
    }

    #[rstest]
    fn user_record_round_trips(now: DateTime<Utc>) {
        let mut account = UserAccount::register(Identifier::generate(), new_account(), now);
        account.site_settings.insert("theme".to_owned(), "dark".to_owned());
        let mut record = account.to_record().expect("record");
        assert_eq!(record.key.row, USER_ROW);
        record.etag = Some(ETag::new("1"));
        let back = UserAccount::from_record(record).expect("decode");
        assert_eq!(back.etag, Some(ETag::new("1")));
        assert_eq!(
            UserAccount {
                etag: None,
                ..back
            },
            account
        );
    }

    #[rstest]
    fn email_record_round_trips(now: DateTime<Utc>) {
        let owner = Identifier::generate();
        let identity = EmailIdentity::new("a@b.c", owner, now);
        let record = identity.to_record().expect("record");
        assert_eq!(record.key, EntityKey::new("a@b.c", EMAIL_ROW));
        let back = EmailIdentity::from_record(record).expect("decode");
        assert_eq!(back, identity);
        assert!(back.is_claimed());
    }

    #[test]
    fn sentinel_owner_is_stored_as_empty_string() {
        let patch = EmailIdentity::owner_patch("a@b.c", Identifier::SENTINEL).expect("patch");
        assert_eq!(patch.properties.get("ownerId"), Some(&Value::from("")));
    }

    #[test]
    fn malformed_user_key_is_rejected() {
        let record = EntityRecord::new(EntityKey::new("bogus", USER_ROW), Map::new());
        assert!(UserAccount::from_record(record).is_err());
    }

    #[rstest]
    #[case(4, false)]
    #[case(5, true)]
    fn fifth_failure_locks(#[case] failures: u32, #[case] locked: bool) {
        let mut password = PasswordRecord::new("h");
        for _ in 0..failures {
            password.record_failure();
        }
        assert_eq!(password.strikes, failures);
        assert_eq!(password.locked, locked);
        password.reset();
        assert!(!password.needs_reset());
    }

    #[rstest]
    fn verification_expiry_is_inclusive(now: DateTime<Utc>) {
        let verification = ContactVerification::issue(ContactMethod::Email, now);
        assert!(!verification.is_expired(now));
        assert!(verification.is_expired(verification.expires_at));
        assert!(verification.matches(&verification.code.clone()));
        assert!(!verification.matches("nope"));
    }

    #[rstest]
    fn mark_verified_only_advances_registered(now: DateTime<Utc>) {
        let mut account = UserAccount::register(Identifier::generate(), new_account(), now);
        account.mark_verified(ContactMethod::Email);
        assert_eq!(account.status, UserStatus::Verified);
        assert!(account.email_verification.is_none());

        account.status = UserStatus::Active;
        account.mark_verified(ContactMethod::Email);
        assert_eq!(account.status, UserStatus::Active);
    }

    #[rstest]
    fn email_change_patch_sets_all_fields(now: DateTime<Utc>) {
        let verification = ContactVerification::issue(ContactMethod::Email, now);
        let record = UserPatch::new(Identifier::generate())
            .email_change("new@x.y", "old@x.y", &verification)
            .expect("patch")
            .into_record();
        let mut keys: Vec<&str> = record.properties.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["email", "emailInvalid", "emailOld", "emailVerification"]
        );
    }
}
