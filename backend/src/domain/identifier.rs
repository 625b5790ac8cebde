//! Compact, reversible string form for 128-bit identifiers.
//!
//! Every entity key in the account tables is an [`Identifier`] rendered as
//! 32 lowercase hex digits with no separators. The all-zero value is the
//! "unset" sentinel and encodes to the empty string.
//!
//! Decoding is total: malformed input yields the sentinel rather than an
//! error, so callers must check [`Identifier::is_sentinel`] before treating a
//! decoded value as a key.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Length of a non-sentinel encoded identifier.
pub const ENCODED_LEN: usize = 32;

/// 128-bit identifier with a compact hex encoding.
///
/// # Examples
/// ```
/// use sitehub::domain::Identifier;
///
/// let id = Identifier::generate();
/// assert_eq!(Identifier::decode(&id.encode()), id);
/// assert_eq!(Identifier::SENTINEL.encode(), "");
/// assert!(Identifier::decode("not-an-id").is_sentinel());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Identifier(Uuid);

impl Identifier {
    /// The "unset" value.
    pub const SENTINEL: Self = Self(Uuid::nil());

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Access the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// True for the all-zero sentinel.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.0.is_nil()
    }

    /// Render as 32 lowercase hex digits, or `""` for the sentinel.
    #[must_use]
    pub fn encode(&self) -> String {
        if self.is_sentinel() {
            String::new()
        } else {
            hex::encode(self.0.as_bytes())
        }
    }

    /// Parse the compact form. Anything other than exactly 32 hex digits
    /// decodes to the sentinel.
    #[must_use]
    pub fn decode(value: &str) -> Self {
        if value.len() != ENCODED_LEN {
            return Self::SENTINEL;
        }

        let mut bytes = [0_u8; 16];
        match hex::decode_to_slice(value, &mut bytes) {
            Ok(()) => Self(Uuid::from_bytes(bytes)),
            Err(_) => Self::SENTINEL,
        }
    }

    /// Decode and reject the sentinel in one step.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let id = Self::decode(value);
        (!id.is_sentinel()).then_some(id)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<Uuid> for Identifier {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::decode(&raw))
    }
}
