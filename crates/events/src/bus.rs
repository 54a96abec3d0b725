//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`HealthEvent`]s. Record
//! mutations publish here explicitly; the alert router subscribes. It is
//! meant to be shared via `Arc<EventBus>`.

use carelink_core::staff::StaffUser;
use carelink_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// HealthEvent
// ---------------------------------------------------------------------------

/// A record mutation that may warrant notifying peers.
///
/// Constructed via [`HealthEvent::new`] and enriched with
/// [`with_source`](HealthEvent::with_source) and
/// [`with_payload`](HealthEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEvent {
    /// Dot-separated event name, see [`carelink_core::event_types`].
    pub event_type: String,

    /// The staff member whose action produced the event.
    pub actor: StaffUser,

    /// Optional source entity kind (e.g. `"prenatal_checkup"`).
    #[serde(default)]
    pub source_entity_type: Option<String>,

    /// Optional source entity id.
    #[serde(default)]
    pub source_entity_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    #[serde(default = "Utc::now")]
    pub timestamp: Timestamp,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl HealthEvent {
    pub fn new(event_type: impl Into<String>, actor: StaffUser) -> Self {
        Self {
            event_type: event_type.into(),
            actor,
            source_entity_type: None,
            source_entity_id: None,
            payload: empty_payload(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a source entity to the event.
    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub(crate) fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    pub(crate) fn payload_i64(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(|v| v.as_i64())
    }

    /// Read a payload field that should hold a whole number fitting `i32`.
    ///
    /// Integral floats such as `185.0` are accepted. `null` counts as missing.
    pub(crate) fn payload_i32(&self, key: &str) -> PayloadInt {
        match self.payload.get(key) {
            None | Some(serde_json::Value::Null) => PayloadInt::Missing,
            Some(raw) => match whole_i32(raw) {
                Some(v) => PayloadInt::Value(v),
                None => PayloadInt::Unusable(raw.clone()),
            },
        }
    }
}

/// A numeric payload field as found on an event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PayloadInt {
    Missing,
    Value(i32),
    /// Present, but not a whole number in `i32` range.
    Unusable(serde_json::Value),
}

fn whole_i32(raw: &serde_json::Value) -> Option<i32> {
    if let Some(n) = raw.as_i64() {
        return i32::try_from(n).ok();
    }
    let f = raw.as_f64()?;
    if f.fract() != 0.0 || f < f64::from(i32::MIN) || f > f64::from(i32::MAX) {
        return None;
    }
    Some(f as i32)
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use carelink_core::roles::Role;
/// use carelink_core::staff::StaffUser;
/// use carelink_events::bus::{EventBus, HealthEvent};
///
/// let bus = EventBus::default();
/// let _rx = bus.subscribe();
///
/// let actor = StaffUser::new(1, "Rosa Dizon", Role::HealthWorker);
/// bus.publish(HealthEvent::new("child.registered", actor));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<HealthEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is dropped.
    pub fn publish(&self, event: HealthEvent) {
        // SendError only means there are zero receivers.
        if self.sender.send(event).is_err() {
            tracing::debug!("Health event published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
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
