//! Event bus and operator notification infrastructure.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the domain event envelope.
//! - [`EventPersistence`]: background service that writes every event to
//!   the `events` table.
//! - [`delivery`]: webhook delivery and the operator alert dispatcher.

pub mod bus;
pub mod delivery;
pub mod persistence;

pub use bus::{EventBus, PlatformEvent};
pub use delivery::alerts::AlertDispatcher;
pub use delivery::webhook::WebhookDelivery;
pub use persistence::EventPersistence;
