//! Redirect Router - the hot path of cardlink.
//!
//! The [`RedirectRouter`] turns a request path into a redirect:
//!
//! ```text
//! GET /r/abc123
//!     │
//!     ▼
//! ┌──────────────────────────────────────────────┐
//! │              REDIRECT ROUTER                 │
//! │                                              │
//! │  1. Dispatch: "/r/abc123" -> "abc123"        │  no match -> 404
//! │  2. Lookup:   card:abc123 (bounded)          │  timeout/error -> absent
//! │  3. Decide:   state -> destination           │  bad location -> 404
//! │  4. Record:   tap event (never waits)        │
//! │  5. Respond:  302 Location: {base}/...       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The router is stateless between requests. The store and the tap
//! recorder are long-lived handles shared by every request task.

use crate::card::CardState;
use crate::dispatch::PathDispatcher;
use crate::emitter::TapRecorder;
use crate::policy::{decide, resolved_slug, Destination, Destinations};
use crate::store::{lookup_state, CardStore, DEFAULT_LOOKUP_TIMEOUT};
use crate::tap::{RequestMeta, TapEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What the HTTP layer should send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Temporary redirect to `location`
    Redirect {
        location: String,
        destination: Destination,
        state: CardState,
    },

    /// The path is not a short link
    NotFound,
}

pub struct RedirectRouter {
    dispatcher: PathDispatcher,
    store: Arc<dyn CardStore>,
    taps: Arc<dyn TapRecorder>,
    destinations: Destinations,
    lookup_timeout: Duration,
}

impl RedirectRouter {
    pub fn new(
        store: Arc<dyn CardStore>,
        taps: Arc<dyn TapRecorder>,
        destinations: Destinations,
    ) -> Self {
        Self {
            dispatcher: PathDispatcher::default(),
            store,
            taps,
            destinations,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_route_tag(mut self, tag: impl Into<String>) -> Self {
        self.dispatcher = PathDispatcher::new(tag);
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn store(&self) -> &dyn CardStore {
        self.store.as_ref()
    }

    /// Resolve a request path.
    ///
    /// Paths that are not short links return [`Outcome::NotFound`] without
    /// touching the store or recording a tap. Every other request records
    /// exactly one tap and redirects; store failures only change where.
    /// A location that cannot be sent as a `Location` header is refused
    /// before the tap is recorded.
    pub async fn route(&self, path: &str, meta: RequestMeta) -> Outcome {
        let Some(identifier) = self.dispatcher.identify(path) else {
            debug!(path = %path, "Not a short link");
            return Outcome::NotFound;
        };

        let state = lookup_state(self.store.as_ref(), &identifier, self.lookup_timeout).await;
        let destination = decide(&identifier, &state);
        let location = self.destinations.url_for(&destination);
        if !is_header_safe(&location) {
            warn!(
                identifier = %identifier,
                location = %location,
                "Destination is not a valid Location header"
            );
            return Outcome::NotFound;
        }

        let slug = resolved_slug(&identifier, &state);
        self.taps.record(TapEvent::capture(identifier.as_str(), slug, meta));

        debug!(
            identifier = %identifier,
            state = state.label(),
            destination = destination.kind(),
            location = %location,
            "Routing card"
        );

        Outcome::Redirect {
            location,
            destination,
            state,
        }
    }
}

/// Visible ASCII only; identifier and slug segments are already encoded, so
/// this only fails on a bad base origin.
fn is_header_safe(location: &str) -> bool {
    !location.is_empty() && location.bytes().all(|b| b.is_ascii_graphic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CardRecord, CardStatus};
    use crate::emitter::MemoryRecorder;
    use crate::store::{MemoryCardStore, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps a memory store and counts reads.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryCardStore,
        fetches: AtomicUsize,
    }

    impl CountingStore {
        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CardStore for CountingStore {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch(&self, identifier: &str) -> Result<Option<String>, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(identifier).await
        }
    }

    const BASE: &str = "https://cards.example.com";

    fn router() -> (RedirectRouter, Arc<MemoryCardStore>, Arc<MemoryRecorder>) {
        let store = Arc::new(MemoryCardStore::new());
        let taps = Arc::new(MemoryRecorder::new());
        let router = RedirectRouter::new(store.clone(), taps.clone(), Destinations::new(BASE));
        (router, store, taps)
    }

    fn location(outcome: &Outcome) -> &str {
        match outcome {
            Outcome::Redirect { location, .. } => location,
            Outcome::NotFound => panic!("expected redirect"),
        }
    }

    #[tokio::test]
    async fn test_unknown_card_goes_to_onboarding() {
        let (router, _, taps) = router();

        let outcome = router.route("/r/abc123", RequestMeta::default()).await;
        assert_eq!(location(&outcome), format!("{BASE}/onboard/abc123"));

        let events = taps.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].uid, "abc123");
        assert_eq!(events[0].slug, "abc123");
    }

    #[tokio::test]
    async fn test_active_with_vanity() {
        let (router, store, taps) = router();
        store.insert("abc123", &CardRecord::new(CardStatus::Active).with_vanity("joao"));

        let outcome = router.route("/r/abc123", RequestMeta::default()).await;
        assert_eq!(location(&outcome), format!("{BASE}/joao"));

        let events = taps.events();
        assert_eq!(events[0].uid, "abc123");
        assert_eq!(events[0].slug, "joao");
    }

    #[tokio::test]
    async fn test_active_without_vanity() {
        let (router, store, _) = router();
        store.insert("abc123", &CardRecord::new(CardStatus::Active));

        let outcome = router.route("/r/abc123", RequestMeta::default()).await;
        assert_eq!(location(&outcome), format!("{BASE}/abc123"));
    }

    #[tokio::test]
    async fn test_blocked_ignores_vanity() {
        let (router, store, taps) = router();
        store.insert("abc123", &CardRecord::new(CardStatus::Blocked).with_vanity("joao"));

        let outcome = router.route("/r/abc123", RequestMeta::default()).await;
        assert_eq!(location(&outcome), format!("{BASE}/blocked"));

        let events = taps.events();
        assert_eq!(events[0].uid, "abc123");
        assert_eq!(events[0].slug, "joao");
    }

    #[tokio::test]
    async fn test_pending_with_vanity_records_vanity() {
        let (router, store, taps) = router();
        store.insert("abc123", &CardRecord::new(CardStatus::Pending).with_vanity("joao"));

        let outcome = router.route("/r/abc123", RequestMeta::default()).await;
        assert_eq!(location(&outcome), format!("{BASE}/onboard/abc123"));
        assert_eq!(taps.events()[0].slug, "joao");
    }

    #[tokio::test]
    async fn test_status_is_case_sensitive() {
        let (router, store, taps) = router();
        for raw in [
            r#"{"status":"ACTIVE","vanity":"joao"}"#,
            r#"{"status":" active ","vanity":"joao"}"#,
            r#"{"status":"Active"}"#,
            r#"{"status":"Blocked"}"#,
        ] {
            store.insert_raw("abc123", raw);
            let outcome = router.route("/r/abc123", RequestMeta::default()).await;
            assert_eq!(location(&outcome), format!("{BASE}/onboard/abc123"), "value {raw}");
        }
        assert_eq!(taps.len(), 4);
    }

    #[tokio::test]
    async fn test_pending_and_unrecognised_status() {
        let (router, store, _) = router();
        for raw in [
            r#"{"status":"pending"}"#,
            r#"{"status":""}"#,
            r#"{"vanity":"joao"}"#,
            r#"{"status":"suspended","vanity":"joao"}"#,
            "garbage",
        ] {
            store.insert_raw("abc123", raw);
            let outcome = router.route("/r/abc123", RequestMeta::default()).await;
            assert_eq!(location(&outcome), format!("{BASE}/onboard/abc123"), "value {raw}");
        }
    }

    #[tokio::test]
    async fn test_malformed_paths_have_no_side_effects() {
        let (router, _, taps) = router();

        for path in ["/r", "/r/", "/foo/bar", "/", "/r/abc/def"] {
            assert_eq!(
                router.route(path, RequestMeta::default()).await,
                Outcome::NotFound,
                "path {path}"
            );
        }
        assert!(taps.is_empty());
    }

    #[tokio::test]
    async fn test_store_only_read_for_short_links() {
        let store = Arc::new(CountingStore::default());
        let taps = Arc::new(MemoryRecorder::new());
        let router = RedirectRouter::new(store.clone(), taps.clone(), Destinations::new(BASE));

        for path in ["/r", "/r/", "/foo/bar", "/r/a/b", "/"] {
            assert_eq!(
                router.route(path, RequestMeta::default()).await,
                Outcome::NotFound,
                "path {path}"
            );
        }
        assert_eq!(store.fetches(), 0);
        assert!(taps.is_empty());

        router.route("/r/abc", RequestMeta::default()).await;
        assert_eq!(store.fetches(), 1);
        assert_eq!(taps.len(), 1);
    }

    #[tokio::test]
    async fn test_unsendable_location_records_nothing() {
        let store = Arc::new(MemoryCardStore::new());
        let taps = Arc::new(MemoryRecorder::new());
        let router = RedirectRouter::new(
            store,
            taps.clone(),
            Destinations::new("https://cards.example.com/\nSet-Cookie: x"),
        );

        let outcome = router.route("/r/abc123", RequestMeta::default()).await;
        assert_eq!(outcome, Outcome::NotFound);
        assert!(taps.is_empty());
    }

    #[test]
    fn test_header_safe_locations() {
        assert!(is_header_safe("https://cards.example.com/onboard/caf%C3%A9"));
        assert!(!is_header_safe("https://cards.example.com/a b"));
        assert!(!is_header_safe("https://cárds.example.com/x"));
        assert!(!is_header_safe("https://cards.example.com/\r\nx"));
        assert!(!is_header_safe(""));
    }

    #[tokio::test]
    async fn test_metadata_copied_to_tap() {
        let (router, _, taps) = router();
        let meta = RequestMeta {
            client_ip: Some("203.0.113.7".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            referrer: None,
        };

        router.route("/r//abc123/", meta).await;

        let event = &taps.events()[0];
        assert_eq!(event.uid, "abc123");
        assert_eq!(event.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(event.ua.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(event.referrer, None);
        assert!(event.ts > 0);
    }

    #[tokio::test]
    async fn test_custom_route_tag() {
        let (router, _, _) = router();
        let router = router.with_route_tag("c");

        assert_eq!(router.route("/r/abc123", RequestMeta::default()).await, Outcome::NotFound);
        let outcome = router.route("/c/abc123", RequestMeta::default()).await;
        assert_eq!(location(&outcome), format!("{BASE}/onboard/abc123"));
    }
}
