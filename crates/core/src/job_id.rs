//! Client-side job identifiers.
//!
//! A [`JobId`] is generated by the client before a generation request is
//! submitted, so that progress can be polled (and later restored) under
//! an id the client already knows.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Characters used for the random part of generated ids.
const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Number of random groups in a generated id.
const GROUPS: usize = 3;

/// Length of each random group.
const GROUP_LEN: usize = 7;

/// Opaque identifier of one generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh id of the form `task(<21 base-36 chars>)`.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut body = String::with_capacity(GROUPS * GROUP_LEN);
        for _ in 0..GROUPS {
            for _ in 0..GROUP_LEN {
                let idx = rng.random_range(0..ALPHABET.len());
                body.push(ALPHABET[idx] as char);
            }
        }
        Self(format!("task({body})"))
    }

    /// Wrap an existing id, rejecting empty or whitespace-only input.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation("job id must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}
