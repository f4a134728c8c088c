//! Routing policy: where a card sends its visitor.
//!
//! ```text
//! CardState              | Destination
//! -----------------------|------------------------------
//! Absent                 | {base}/onboard/{identifier}
//! Pending                | {base}/onboard/{identifier}
//! Blocked                | {base}/blocked
//! Active (vanity "v")    | {base}/v
//! Active (no vanity)     | {base}/{identifier}
//! ```
//!
//! Decode errors and unrecognised statuses arrive here as `Pending`, so a
//! card is only ever sent to a profile when its status is explicitly active.

use crate::card::CardState;

/// Path segment of the onboarding page.
pub const ONBOARD_SEGMENT: &str = "onboard";

/// Path of the blocked-card page.
pub const BLOCKED_SEGMENT: &str = "blocked";

/// A routing decision, before it is turned into a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Onboarding { identifier: String },
    Blocked,
    Profile { slug: String },
}

impl Destination {
    pub fn kind(&self) -> &'static str {
        match self {
            Destination::Onboarding { .. } => "onboarding",
            Destination::Blocked => "blocked",
            Destination::Profile { .. } => "profile",
        }
    }
}

/// Decide where `identifier` should go given its current state.
pub fn decide(identifier: &str, state: &CardState) -> Destination {
    match state {
        CardState::Absent | CardState::Pending { .. } => Destination::Onboarding {
            identifier: identifier.to_string(),
        },
        CardState::Blocked { .. } => Destination::Blocked,
        CardState::Active { vanity: Some(vanity) } if !vanity.is_empty() => Destination::Profile {
            slug: vanity.clone(),
        },
        CardState::Active { .. } => Destination::Profile {
            slug: identifier.to_string(),
        },
    }
}

/// The slug recorded on tap events: the record's vanity whenever one is
/// stored, whatever the status, else the raw identifier.
pub fn resolved_slug(identifier: &str, state: &CardState) -> String {
    state.vanity().unwrap_or(identifier).to_string()
}

/// Builds absolute destination URLs under a configured origin.
#[derive(Debug, Clone)]
pub struct Destinations {
    base: String,
}

impl Destinations {
    /// Trailing slashes on `base` are stripped once, here.
    pub fn new(base: impl AsRef<str>) -> Self {
        Self {
            base: base.as_ref().trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Absolute URL for a decision. Identifier and slug segments are
    /// percent-encoded so stored values cannot add path or query syntax.
    pub fn url_for(&self, destination: &Destination) -> String {
        match destination {
            Destination::Onboarding { identifier } => format!(
                "{}/{}/{}",
                self.base,
                ONBOARD_SEGMENT,
                urlencoding::encode(identifier)
            ),
            Destination::Blocked => format!("{}/{}", self.base, BLOCKED_SEGMENT),
            Destination::Profile { slug } => {
                format!("{}/{}", self.base, urlencoding::encode(slug))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://cards.example.com";

    fn active(vanity: Option<&str>) -> CardState {
        CardState::Active {
            vanity: vanity.map(str::to_string),
        }
    }

    fn pending(vanity: Option<&str>) -> CardState {
        CardState::Pending {
            vanity: vanity.map(str::to_string),
        }
    }

    fn blocked(vanity: Option<&str>) -> CardState {
        CardState::Blocked {
            vanity: vanity.map(str::to_string),
        }
    }

    fn url(state: CardState) -> String {
        let destinations = Destinations::new(BASE);
        destinations.url_for(&decide("abc123", &state))
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(url(CardState::Absent), format!("{BASE}/onboard/abc123"));
        assert_eq!(url(pending(None)), format!("{BASE}/onboard/abc123"));
        assert_eq!(url(pending(Some("joao"))), format!("{BASE}/onboard/abc123"));
        assert_eq!(url(blocked(None)), format!("{BASE}/blocked"));
        assert_eq!(url(blocked(Some("joao"))), format!("{BASE}/blocked"));
        assert_eq!(url(active(Some("joao"))), format!("{BASE}/joao"));
        assert_eq!(url(active(None)), format!("{BASE}/abc123"));
        assert_eq!(url(active(Some(""))), format!("{BASE}/abc123"));
    }

    #[test]
    fn test_resolved_slug() {
        assert_eq!(resolved_slug("abc123", &active(Some("joao"))), "joao");
        assert_eq!(resolved_slug("abc123", &active(None)), "abc123");
        assert_eq!(resolved_slug("abc123", &CardState::Absent), "abc123");
        assert_eq!(resolved_slug("abc123", &active(Some(""))), "abc123");
        assert_eq!(resolved_slug("abc123", &pending(None)), "abc123");
        assert_eq!(resolved_slug("abc123", &pending(Some("joao"))), "joao");
        assert_eq!(resolved_slug("abc123", &blocked(None)), "abc123");
        assert_eq!(resolved_slug("abc123", &blocked(Some("joao"))), "joao");
    }

    #[test]
    fn test_trailing_slashes_stripped() {
        let destinations = Destinations::new("https://cards.example.com///");
        assert_eq!(destinations.base(), BASE);
        assert_eq!(
            destinations.url_for(&Destination::Blocked),
            format!("{BASE}/blocked")
        );
    }

    #[test]
    fn test_segments_are_encoded() {
        let destinations = Destinations::new(BASE);
        let url = destinations.url_for(&Destination::Profile {
            slug: "../admin?x=1".to_string(),
        });
        assert_eq!(url, format!("{BASE}/..%2Fadmin%3Fx%3D1"));

        let url = destinations.url_for(&Destination::Onboarding {
            identifier: "café".to_string(),
        });
        assert_eq!(url, format!("{BASE}/onboard/caf%C3%A9"));
    }
}
