//! Path dispatch for short links.
//!
//! Exactly one route shape is recognised: `/{tag}/{identifier}`. Empty
//! segments produced by leading, trailing or repeated slashes are discarded
//! before matching, so the following all resolve to `abc`:
//!
//! ```text
//! Path          | Result
//! --------------|-------------------
//! /r/abc        | Some("abc")
//! /r/abc/       | Some("abc")
//! /r//abc       | Some("abc")
//! //r/abc       | Some("abc")
//! /r            | None (one segment)
//! /r/abc/extra  | None (three segments)
//! /foo/bar      | None (wrong tag)
//! ```

/// Default route tag, the first path segment of every short link.
pub const DEFAULT_ROUTE_TAG: &str = "r";

/// Recognises short-link paths and extracts the card identifier.
#[derive(Debug, Clone)]
pub struct PathDispatcher {
    tag: String,
}

impl PathDispatcher {
    /// Create a dispatcher for paths of the form `/{tag}/{identifier}`.
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Match a raw request path and return the decoded identifier.
    ///
    /// Returns `None` for any path that is not exactly two non-empty
    /// segments with the configured tag first, and for identifiers whose
    /// percent-encoding does not decode to UTF-8.
    pub fn identify(&self, path: &str) -> Option<String> {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        let mut segments = path.split('/').filter(|s| !s.is_empty());

        let tag = segments.next()?;
        let raw = segments.next()?;
        if segments.next().is_some() || tag != self.tag {
            return None;
        }

        let decoded = urlencoding::decode(raw).ok()?.into_owned();

        // "%20" and friends decode to something, but never to a usable key
        if decoded.trim().is_empty() {
            return None;
        }

        Some(decoded)
    }
}

impl Default for PathDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_ROUTE_TAG)
    }
}
