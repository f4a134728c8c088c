//! Card routing records as read from the card state store.
//!
//! The router never writes these. A record is a snapshot taken at request
//! time; whatever the owning system stored is interpreted leniently so that
//! nothing it writes can turn a redirect into an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a card.
///
/// Only the exact strings `active` and `blocked` are recognised. Anything
/// else (missing, empty, null, differently cased, padded) reads as
/// [`CardStatus::Pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", rename_all = "lowercase")]
pub enum CardStatus {
    #[default]
    Pending,
    Active,
    Blocked,
}

impl CardStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "active" => CardStatus::Active,
            "blocked" => CardStatus::Blocked,
            _ => CardStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Pending => "pending",
            CardStatus::Active => "active",
            CardStatus::Blocked => "blocked",
        }
    }
}

impl From<Option<String>> for CardStatus {
    fn from(raw: Option<String>) -> Self {
        raw.as_deref().map(CardStatus::parse).unwrap_or_default()
    }
}

/// The stored value under `card:{identifier}`.
///
/// ```json
/// {"status": "active", "vanity": "joao", "updated_at": "2025-06-01T12:00:00Z"}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    #[serde(default)]
    pub status: CardStatus,

    /// Human-chosen alias; overrides the identifier in profile links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vanity: Option<String>,

    /// Audit timestamp owned by the card system, never used for routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<Value>,
}

impl CardRecord {
    pub fn new(status: CardStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_vanity(mut self, vanity: impl Into<String>) -> Self {
        self.vanity = Some(vanity.into());
        self
    }

    /// Parse a stored value.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Vanity alias, if present and non-empty.
    pub fn vanity(&self) -> Option<&str> {
        self.vanity.as_deref().filter(|v| !v.is_empty())
    }

    /// Collapse the record into the state the routing policy consumes.
    pub fn state(&self) -> CardState {
        let vanity = self.vanity().map(str::to_string);
        match self.status {
            CardStatus::Pending => CardState::Pending { vanity },
            CardStatus::Blocked => CardState::Blocked { vanity },
            CardStatus::Active => CardState::Active { vanity },
        }
    }
}

/// Everything the routing policy distinguishes.
///
/// Decode errors and store failures have already been folded into
/// `Pending` and `Absent` by the time a value of this type exists. Every
/// state backed by a record keeps its vanity so taps can report it, even
/// where the destination ignores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardState {
    Absent,
    Pending { vanity: Option<String> },
    Active { vanity: Option<String> },
    Blocked { vanity: Option<String> },
}

impl CardState {
    /// State for a record that exists but could not be read.
    pub fn undecodable() -> Self {
        CardState::Pending { vanity: None }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CardState::Absent => "absent",
            CardState::Pending { .. } => "pending",
            CardState::Active { .. } => "active",
            CardState::Blocked { .. } => "blocked",
        }
    }

    pub fn vanity(&self) -> Option<&str> {
        match self {
            CardState::Absent => None,
            CardState::Pending { vanity }
            | CardState::Active { vanity }
            | CardState::Blocked { vanity } => vanity.as_deref().filter(|v| !v.is_empty()),
        }
    }
}
