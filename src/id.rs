//! Public identifiers for uploaded receipt files.
//!
//! A public id combines the backend's auto-increment counter with a random
//! 10-digit salt, `receipt_<counter>_<salt>`, so that files in the object store
//! can be traced back to their receipt by eye. Uniqueness is not checked.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const SALT_MIN: u64 = 1_000_000_000;
pub const SALT_MAX: u64 = 9_999_999_999;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicId {
    auto_increment: u64,
    salt: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a receipt public id: {0:?}")]
pub struct ParsePublicIdError(String);

fn public_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^receipt_(\d+)_(\d{10})$").expect("valid public id pattern"))
}

impl PublicId {
    pub fn new(auto_increment: u64, salt: u64) -> Self {
        Self { auto_increment, salt }
    }

    pub fn auto_increment(&self) -> u64 {
        self.auto_increment
    }

    pub fn salt(&self) -> u64 {
        self.salt
    }
}

impl fmt::Display for PublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receipt_{}_{}", self.auto_increment, self.salt)
    }
}

impl FromStr for PublicId {
    type Err = ParsePublicIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = public_id_pattern()
            .captures(s)
            .ok_or_else(|| ParsePublicIdError(s.to_string()))?;

        let auto_increment = caps[1].parse().map_err(|_| ParsePublicIdError(s.to_string()))?;
        let salt: u64 = caps[2].parse().map_err(|_| ParsePublicIdError(s.to_string()))?;
        if !(SALT_MIN..=SALT_MAX).contains(&salt) {
            return Err(ParsePublicIdError(s.to_string()));
        }

        Ok(Self { auto_increment, salt })
    }
}

impl TryFrom<String> for PublicId {
    type Error = ParsePublicIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PublicId> for String {
    fn from(id: PublicId) -> Self {
        id.to_string()
    }
}

/// Issues public ids from a counter value and a random salt.
pub struct IdGenerator<R: Rng> {
    rng: R,
}

impl IdGenerator<StdRng> {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for IdGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> IdGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Uniform 10-digit salt in `[1_000_000_000, 9_999_999_999]`.
    pub fn salt(&mut self) -> u64 {
        self.rng.gen_range(SALT_MIN..=SALT_MAX)
    }

    pub fn next_id(&mut self, auto_increment: u64) -> PublicId {
        let salt = self.salt();
        PublicId::new(auto_increment, salt)
    }
}
