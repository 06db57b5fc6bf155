//! Content-derived event identity.
//!
//! # Invariants
//! - Identity is a pure function of `(title, start, end)`.
//! - Identical triples always map to the same identity, across runs.
//! - Identities are 64 lowercase hex characters.

use crate::model::event::format_event_time;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter};

/// Field delimiter for the digest input. The line normalizer strips it from
/// every parsed field.
const FIELD_DELIMITER: &str = "\0";
const IDENTITY_HEX_LEN: usize = 64;

/// Opaque deterministic key for one logical event occurrence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventIdentity(String);

impl EventIdentity {
    /// Derives the identity of an occurrence. Missing bounds hash as empty.
    pub fn derive(
        title: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Self {
        let start = start.map(format_event_time).unwrap_or_default();
        let end = end.map(format_event_time).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(FIELD_DELIMITER.as_bytes());
        hasher.update(start.as_bytes());
        hasher.update(FIELD_DELIMITER.as_bytes());
        hasher.update(end.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps a stored identity, rejecting values that were not produced by
    /// [`EventIdentity::derive`].
    pub fn from_stored(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let well_formed = value.len() == IDENTITY_HEX_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then_some(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EventIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
