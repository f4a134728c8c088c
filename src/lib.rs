//! # cardlink
//!
//! Short-link redirect router for NFC cards.
//!
//! ## Architecture
//!
//! ```text
//! Client -> GET /r/{id} -> Router -> Card Store (read)
//!                            │
//!                            ├──> 302 Location
//!                            └──> Tap Emitter -> Sink (background)
//! ```
//!
//! ## Modules
//!
//! - [`dispatch`]: short-link path recognition
//! - [`card`]: card routing records and states
//! - [`store`]: card state store clients
//! - [`policy`]: routing decisions and destination URLs
//! - [`tap`]: tap event type
//! - [`sinks`]: tap event destinations
//! - [`emitter`]: fire-and-forget tap emission
//! - [`router`]: the redirect router
//! - [`http`]: axum application

pub mod card;
pub mod config;
pub mod dispatch;
pub mod emitter;
pub mod http;
pub mod policy;
pub mod router;
pub mod shutdown;
pub mod sinks;
pub mod store;
pub mod tap;

// Re-export commonly used types at crate root
pub use card::{CardRecord, CardState, CardStatus};
pub use emitter::{TapEmitter, TapRecorder};
pub use router::{Outcome, RedirectRouter};
pub use tap::TapEvent;

/// Redis stream name for tap events
pub use sinks::redis_stream::TAP_STREAM_NAME;
