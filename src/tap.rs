//! Tap events: one record per resolved short-link visit.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "uid": "abc123",
//!   "slug": "joao",
//!   "ts": 1733911200000,
//!   "ip": "203.0.113.7",
//!   "ua": "Mozilla/5.0 ...",
//!   "referrer": "https://instagram.com/"
//! }
//! ```
//!
//! Missing request metadata is omitted from the payload, never filled in.

use serde::{Deserialize, Serialize};

/// Request metadata copied onto tap events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

/// A single tap, as handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapEvent {
    /// Identifier as received in the request path
    pub uid: String,

    /// Vanity if the card is active and has one, else the identifier
    pub slug: String,

    /// Capture time at the router, milliseconds since the Unix epoch
    pub ts: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ua: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

impl TapEvent {
    /// Build an event stamped with the current time.
    pub fn capture(uid: impl Into<String>, slug: impl Into<String>, meta: RequestMeta) -> Self {
        Self::at(uid, slug, chrono::Utc::now().timestamp_millis(), meta)
    }

    pub fn at(uid: impl Into<String>, slug: impl Into<String>, ts: i64, meta: RequestMeta) -> Self {
        Self {
            uid: uid.into(),
            slug: slug.into(),
            ts,
            ip: meta.client_ip,
            ua: meta.user_agent,
            referrer: meta.referrer,
        }
    }

    /// Field/value pairs for stream-style sinks. Absent fields are skipped.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("uid", self.uid.clone()),
            ("slug", self.slug.clone()),
            ("ts", self.ts.to_string()),
        ];
        if let Some(ip) = &self.ip {
            fields.push(("ip", ip.clone()));
        }
        if let Some(ua) = &self.ua {
            fields.push(("ua", ua.clone()));
        }
        if let Some(referrer) = &self.referrer {
            fields.push(("referrer", referrer.clone()));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_omits_missing_metadata() {
        let event = TapEvent::at("abc123", "abc123", 1_733_911_200_000, RequestMeta::default());
        let json = serde_json::to_string(&event).unwrap();

        assert_eq!(json, r#"{"uid":"abc123","slug":"abc123","ts":1733911200000}"#);
    }

    #[test]
    fn test_serialize_with_metadata() {
        let meta = RequestMeta {
            client_ip: Some("203.0.113.7".to_string()),
            user_agent: Some("curl/8.0".to_string()),
            referrer: None,
        };
        let event = TapEvent::at("abc123", "joao", 1, meta);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["uid"], "abc123");
        assert_eq!(value["slug"], "joao");
        assert_eq!(value["ip"], "203.0.113.7");
        assert_eq!(value["ua"], "curl/8.0");
        assert!(value.get("referrer").is_none());
    }

    #[test]
    fn test_capture_uses_current_time() {
        let before = chrono::Utc::now().timestamp_millis();
        let event = TapEvent::capture("abc123", "abc123", RequestMeta::default());
        let after = chrono::Utc::now().timestamp_millis();

        assert!(event.ts >= before && event.ts <= after);
    }

    #[test]
    fn test_fields_skip_absent() {
        let meta = RequestMeta {
            referrer: Some("https://example.com/".to_string()),
            ..Default::default()
        };
        let event = TapEvent::at("abc123", "abc123", 42, meta);
        let names: Vec<_> = event.fields().into_iter().map(|(k, _)| k).collect();

        assert_eq!(names, vec!["uid", "slug", "ts", "referrer"]);
    }
}
