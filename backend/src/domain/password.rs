//! Password strength scoring, hashing, and generated secrets.
//!
//! Scoring is a pure function. Hashing uses Argon2id with a random salt per
//! call and runs on the blocking pool so request tasks are never stalled by
//! the deliberately slow key derivation.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::Rng;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::warn;

use crate::domain::Error;

/// Shortest acceptable password, in characters.
pub const MIN_LENGTH: usize = 8;
/// Longest acceptable password, in characters.
pub const MAX_LENGTH: usize = 32;
/// Printed in place of passwords in `Debug` output.
pub(crate) const MASKED: &str = "***";

/// Coarse strength bands derived from [`PasswordStrength::score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PasswordRank {
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

impl PasswordRank {
    const fn from_score(score: i32) -> Self {
        if score < 3 {
            Self::Weak
        } else if score < 4 {
            Self::Medium
        } else if score < 6 {
            Self::Strong
        } else {
            Self::VeryStrong
        }
    }
}

/// Result of [`score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordStrength {
    pub has_upper: bool,
    pub has_lower: bool,
    pub has_digit: bool,
    /// Length lies within `MIN_LENGTH..=MAX_LENGTH`.
    pub length_ok: bool,
    pub rank: PasswordRank,
    pub score: i32,
    /// Upper, lower, and digit present with at least a medium rank.
    pub good: bool,
}

/// Score a candidate password.
///
/// One point per ASCII class present (upper, lower, digit), minus one when
/// only one or two classes appear, and zero outright when the length falls
/// outside `8..=32`.
///
/// # Examples
/// ```
/// use sitehub::domain::password::score;
///
/// assert!(score("Abcdefg1").good);
/// assert!(!score("abcdefgh").good);
/// ```
pub fn score(plaintext: &str) -> PasswordStrength {
    let has_upper = plaintext.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = plaintext.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = plaintext.chars().any(|c| c.is_ascii_digit());
    let length = plaintext.chars().count();
    let length_ok = (MIN_LENGTH..=MAX_LENGTH).contains(&length);

    let mut points = [has_upper, has_lower, has_digit]
        .into_iter()
        .map(i32::from)
        .sum::<i32>();
    if points > 0 && points < 3 {
        points -= 1;
    }
    if !length_ok {
        points = 0;
    }

    let rank = PasswordRank::from_score(points);
    PasswordStrength {
        has_upper,
        has_lower,
        has_digit,
        length_ok,
        rank,
        score: points,
        good: has_upper && has_lower && has_digit && rank >= PasswordRank::Medium,
    }
}

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"~!@#$%^&*+:?";

fn pick(rng: &mut impl Rng, pool: &[u8]) -> char {
    pool.choose(rng).map_or('x', |byte| char::from(*byte))
}

/// Eight characters with three upper, three lower, one digit, and one
/// symbol. Suitable as a reset placeholder, not as a security boundary.
pub fn generate_random_password() -> String {
    let mut rng = rand::thread_rng();
    let pools = [UPPER, LOWER, DIGITS, LOWER, UPPER, UPPER, LOWER, SYMBOLS];
    pools.iter().map(|pool| pick(&mut rng, pool)).collect()
}

/// Six random digits for SMS verification.
pub fn generate_mobile_code() -> String {
    let mut rng = rand::thread_rng();
    (0..6).map(|_| pick(&mut rng, DIGITS)).collect()
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Iterations.
    pub iterations: u32,
    /// Lanes.
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashCost {
    /// Minimal cost for unit tests.
    pub const fn fast() -> Self {
        Self {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// One-way salted password hashing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordHasher {
    cost: HashCost,
}

impl PasswordHasher {
    /// Hasher with explicit cost parameters.
    pub const fn new(cost: HashCost) -> Self {
        Self { cost }
    }

    fn argon2(cost: HashCost) -> Result<Argon2<'static>, Error> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|err| Error::internal(format!("invalid argon2 parameters: {err}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash on the calling thread. Prefer [`Self::hash`] from async code.
    pub fn hash_blocking(&self, plaintext: &str) -> Result<String, Error> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Self::argon2(self.cost)?
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| Error::internal(format!("password hashing failed: {err}")))?;
        Ok(hash.to_string())
    }

    /// Verify on the calling thread. Malformed hashes verify as false.
    pub fn verify_blocking(plaintext: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            warn!("stored password hash is not a valid PHC string");
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Hash on the blocking pool.
    pub async fn hash(&self, plaintext: &str) -> Result<String, Error> {
        let hasher = *self;
        let plaintext = zeroize::Zeroizing::new(plaintext.to_owned());
        tokio::task::spawn_blocking(move || hasher.hash_blocking(&plaintext))
            .await
            .map_err(|err| Error::internal(format!("password hashing task failed: {err}")))?
    }

    /// Verify on the blocking pool.
    pub async fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let plaintext = zeroize::Zeroizing::new(plaintext.to_owned());
        let hash = hash.to_owned();
        match tokio::task::spawn_blocking(move || Self::verify_blocking(&plaintext, &hash)).await {
            Ok(verified) => verified,
            Err(err) => {
                warn!(error = %err, "password verification task failed");
                false
            }
        }
    }
}
