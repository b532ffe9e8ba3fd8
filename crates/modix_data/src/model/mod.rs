//! Domain records, creation payloads and read projections.
//!
//! # Responsibility
//! - Define the stored shape of moderation and promotion records.
//! - Own the text representation of every stored enumeration.
//! - Provide pure projections from loaded entities to summary views.
//!
//! # Invariants
//! - Enumerations cross the storage boundary as text only, and parsing that
//!   text never falls back to a default member.
//! - Snowflake ids are `u64` in the domain and bit-reinterpreted `i64` in the
//!   store.

use thiserror::Error;

pub mod guild;
pub mod moderation;
pub mod promotions;

/// Raised when stored text does not name any member of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {enumeration} text `{value}`")]
pub struct UnknownEnumerationText {
    /// Rust name of the enumeration being parsed.
    pub enumeration: &'static str,
    /// Offending stored value.
    pub value: String,
}

impl UnknownEnumerationText {
    pub(crate) fn new(enumeration: &'static str, value: &str) -> Self {
        Self {
            enumeration,
            value: value.to_string(),
        }
    }
}

/// Reinterprets a snowflake id as the signed integer SQLite stores.
pub fn snowflake_to_db(id: u64) -> i64 {
    id as i64
}

/// Reverses [`snowflake_to_db`].
pub fn snowflake_from_db(value: i64) -> u64 {
    value as u64
}
