//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`PlatformEvent`]s.
//! It is shared via `Arc<EventBus>` across the application. Result-page
//! WebSocket sessions, event persistence and the alert dispatcher are all
//! subscribers.

use chrono::{DateTime, Utc};
use raffle_core::types::{DbId, IntentId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Dot-separated event names.
pub mod names {
    pub const INTENT_CREATED: &str = "intent.created";
    pub const INTENT_RESOLVED: &str = "intent.resolved";
    pub const INTENT_UNALLOCATED: &str = "intent.unallocated";
    pub const ASSIGNMENT_CREATED: &str = "assignment.created";
    pub const PRIZES_TAGGED: &str = "assignment.prizes_tagged";
    pub const POOL_RESIZED: &str = "pool.resized";
    pub const RAFFLE_STATUS_CHANGED: &str = "raffle.status_changed";
    /// Prefix shared by every operator alert event.
    pub const ALERT_PREFIX: &str = "alert.";
}

/// Source entity kind used for every intent-scoped event.
pub const ENTITY_PAYMENT_INTENT: &str = "payment_intent";

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// A domain event that occurred on the platform.
///
/// Constructed via [`PlatformEvent::new`] and enriched with the builder
/// methods [`with_source`](PlatformEvent::with_source),
/// [`for_intent`](PlatformEvent::for_intent),
/// [`with_actor`](PlatformEvent::with_actor), and
/// [`with_payload`](PlatformEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"intent.resolved"`.
    pub event_type: String,

    /// Optional source entity kind (e.g. `"payment_intent"`, `"pool"`).
    pub source_entity_type: Option<String>,

    /// Optional source entity id. Text because intent ids are UUIDs.
    pub source_entity_id: Option<String>,

    /// Optional id of the operator that triggered the event.
    pub actor_user_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    /// Create a new event with only the required `event_type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source_entity_type: None,
            source_entity_id: None,
            actor_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach a source entity to the event.
    pub fn with_source(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl std::fmt::Display,
    ) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id.to_string());
        self
    }

    /// Attach a payment intent as the source entity.
    pub fn for_intent(self, intent_id: IntentId) -> Self {
        self.with_source(ENTITY_PAYMENT_INTENT, intent_id)
    }

    /// Attach the acting operator to the event.
    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Whether this event concerns the given intent.
    pub fn concerns_intent(&self, intent_id: IntentId) -> bool {
        self.source_entity_type.as_deref() == Some(ENTITY_PAYMENT_INTENT)
            && self.source_entity_id.as_deref() == Some(intent_id.to_string().as_str())
    }

    pub fn is_alert(&self) -> bool {
        self.event_type.starts_with(names::ALERT_PREFIX)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use raffle_events::bus::{EventBus, PlatformEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(PlatformEvent::new("intent.created"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no active subscribers the event is dropped.
    pub fn publish(&self, event: PlatformEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
