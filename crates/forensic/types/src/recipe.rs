use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::score::Bps;

/// Ledger-assigned recipe identifier.
///
/// Index-keyed ledgers hand out a dense integer frontier (`nextId`);
/// key-addressed ledgers use string keys such as `A-GENESIS-07`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecipeId {
    Index(u64),
    Key(String),
}

impl RecipeId {
    pub fn as_index(&self) -> Option<u64> {
        match self {
            RecipeId::Index(i) => Some(*i),
            RecipeId::Key(_) => None,
        }
    }
}

impl fmt::Display for RecipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeId::Index(i) => write!(f, "{}", i),
            RecipeId::Key(k) => write!(f, "{}", k),
        }
    }
}

impl FromStr for RecipeId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.parse::<u64>() {
            Ok(i) => RecipeId::Index(i),
            Err(_) => RecipeId::Key(trimmed.to_string()),
        })
    }
}

impl From<u64> for RecipeId {
    fn from(value: u64) -> Self {
        RecipeId::Index(value)
    }
}

/// One recipe as currently stored on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: RecipeId,
    pub outcome: String,
    pub content_pointer: String,
    pub score: Bps,
    pub strikes: u32,
    /// Terminal immutability ("golden").
    pub locked: bool,
    pub last_audit_at: Option<DateTime<Utc>>,
}

impl LedgerRecord {
    /// Blank slots on some ledgers come back with an empty outcome.
    pub fn is_vacant(&self) -> bool {
        self.outcome.trim().is_empty() && self.content_pointer.trim().is_empty()
    }
}
