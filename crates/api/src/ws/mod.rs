//! Result-page WebSocket push.
//!
//! - [`intent_feed`] -- per-intent snapshot stream over a WebSocket.

pub mod intent_feed;

pub use intent_feed::intent_feed_handler;
