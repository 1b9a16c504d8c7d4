//! # Personal Number Validation
//!
//! Validates Swedish personal numbers (personnummer) returned by the identity
//! provider and reduces them to an irreversible digest.
//!
//! Accepted shapes after stripping every non-digit character:
//! - `YYYYMMDDNNNN` (12 digits)
//! - `YYMMDDNNNN` (10 digits)
//!
//! The check digit is verified with the Luhn variant used by the Swedish Tax
//! Agency, always over the last 10 digits.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Raw personal number as received from a client or the identity provider.
///
/// Never persisted and never logged: `Debug` and `Display` are redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonalNumber(String);

impl PersonalNumber {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Access the raw value. Only the provider adapter and the validator
    /// should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PersonalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PersonalNumber(<redacted>)")
    }
}

impl fmt::Display for PersonalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Lowercase hex SHA-256 digest of a normalized personal number.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashedPersonalNumber(String);

impl HashedPersonalNumber {
    /// Length of the hex digest in characters.
    pub const HEX_LEN: usize = 64;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashedPersonalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reasons a personal number is rejected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PersonalNumberError {
    /// Not 10 or 12 digits after normalization
    #[error("Invalid Swedish personal number format")]
    Format,

    /// Check digit does not match
    #[error("Personal number checksum validation failed")]
    Checksum,
}

/// Validate a personal number and return its digest.
///
/// Separators (`-`, `+`, spaces) are ignored; the digest is taken over the
/// digits only, so `19760302-1234` and `197603021234` hash identically.
pub fn validate_and_hash(raw: &str) -> Result<HashedPersonalNumber, PersonalNumberError> {
    let digits = normalize(raw);

    if digits.len() != 10 && digits.len() != 12 {
        return Err(PersonalNumberError::Format);
    }

    if !has_valid_check_digit(&digits) {
        return Err(PersonalNumberError::Checksum);
    }

    Ok(hash_personal_number(&digits))
}

/// SHA-256 digest of an already-normalized personal number.
pub fn hash_personal_number(digits: &str) -> HashedPersonalNumber {
    let digest = Sha256::digest(digits.as_bytes());
    HashedPersonalNumber(hex::encode(digest))
}

fn normalize(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Luhn variant over the last 10 digits.
///
/// Walks from the second-to-last digit backward with multipliers 2, 1, 2, ...
/// Products above 9 are reduced by 9.
fn has_valid_check_digit(digits: &str) -> bool {
    let bytes = digits.as_bytes();
    if bytes.len() < 10 {
        return false;
    }
    let tail = &bytes[bytes.len() - 10..];

    let mut sum = 0u32;
    let mut multiplier = 2u32;
    for &b in tail[..9].iter().rev() {
        let mut product = u32::from(b - b'0') * multiplier;
        if product > 9 {
            product -= 9;
        }
        sum += product;
        multiplier = if multiplier == 2 { 1 } else { 2 };
    }

    let check_digit = (10 - (sum % 10)) % 10;
    check_digit == u32::from(tail[9] - b'0')
}
