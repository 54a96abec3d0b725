//! Role-aware notification payload construction.
//!
//! Pure logic: given the actor, one recipient and the notice the actor wants
//! to broadcast, build the payload that recipient should see. Delivery and
//! cache invalidation are handled by `carelink-events`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::roles::Role;
use crate::staff::StaffUser;
use crate::types::{DbId, Timestamp};

/// Title prefix for notifications a midwife must act on.
pub const ALERT_MARKER: &str = "🔔 ";

/// Title prefix for informational updates sent to health workers.
pub const UPDATE_MARKER: &str = "📋 ";

/// Sentence appended to review requests from health workers.
pub const REVIEW_SUFFIX: &str = "Please review.";

/// Cache key holding a user's unread notification count.
pub fn unread_count_cache_key(user_id: DbId) -> String {
    format!("unread_notifications_count_{user_id}")
}

/// Cache key holding a user's recent notification list.
pub fn recent_list_cache_key(user_id: DbId) -> String {
    format!("recent_notifications_{user_id}")
}

/// Both cache keys a delivery to `user_id` invalidates.
pub fn cache_keys_for(user_id: DbId) -> [String; 2] {
    [unread_count_cache_key(user_id), recent_list_cache_key(user_id)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// Role relationship between sender and recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationCategory {
    /// Health worker to midwife.
    SecondaryToPrimary,
    /// Midwife to health worker.
    PrimaryToSecondary,
    /// No cross-role rewrite: same clinical role, or a non-clinical actor.
    SameRole,
}

impl NotificationCategory {
    pub fn between(actor: Role, recipient: Role) -> Self {
        match (actor, recipient) {
            (Role::HealthWorker, Role::Midwife) => NotificationCategory::SecondaryToPrimary,
            (Role::Midwife, Role::HealthWorker) => NotificationCategory::PrimaryToSecondary,
            _ => NotificationCategory::SameRole,
        }
    }

    pub fn is_cross_role(self) -> bool {
        self != NotificationCategory::SameRole
    }
}

/// What an actor wants to tell their peers, before per-recipient rewriting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerNotice {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl PeerNotice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            priority: Priority::Normal,
            link: None,
            metadata: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The notification one recipient receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub metadata: Map<String, Value>,
    pub category: NotificationCategory,
    pub requires_attention: bool,
}

/// Build the payload `recipient` receives when `actor` broadcasts `notice`.
pub fn build_peer_payload(
    actor: &StaffUser,
    recipient: &StaffUser,
    notice: &PeerNotice,
    now: Timestamp,
) -> NotificationPayload {
    let category = NotificationCategory::between(actor.role, recipient.role);

    let (title, body, priority, requires_attention) = match category {
        NotificationCategory::SecondaryToPrimary => (
            format!("{ALERT_MARKER}{}", notice.title),
            attributed_body(&actor.name, &notice.message),
            Priority::High,
            true,
        ),
        NotificationCategory::PrimaryToSecondary => (
            format!("{UPDATE_MARKER}{}", notice.title),
            attributed_body(&actor.name, &notice.message),
            Priority::Normal,
            false,
        ),
        NotificationCategory::SameRole => (
            notice.title.clone(),
            notice.message.clone(),
            notice.priority,
            false,
        ),
    };

    NotificationPayload {
        title,
        body,
        priority,
        link: notice.link.clone(),
        metadata: enriched_metadata(actor, recipient, category, &notice.metadata, now),
        category,
        requires_attention,
    }
}

/// Build a midwife-facing review request for an action taken by a health
/// worker. Always high priority.
pub fn build_review_request(
    actor: &StaffUser,
    recipient: &StaffUser,
    notice: &PeerNotice,
    now: Timestamp,
) -> NotificationPayload {
    let category = NotificationCategory::between(actor.role, recipient.role);
    let mut metadata = enriched_metadata(actor, recipient, category, &notice.metadata, now);
    metadata.insert("bhw_name".into(), Value::String(actor.name.clone()));

    let body = attributed_body(&actor.name, &notice.message);

    NotificationPayload {
        title: format!("{ALERT_MARKER}{}", notice.title),
        body: format!("{} {REVIEW_SUFFIX}", terminate_sentence(&body)),
        priority: Priority::High,
        link: notice.link.clone(),
        metadata,
        category,
        requires_attention: true,
    }
}

fn enriched_metadata(
    actor: &StaffUser,
    recipient: &StaffUser,
    category: NotificationCategory,
    base: &Map<String, Value>,
    now: Timestamp,
) -> Map<String, Value> {
    let mut metadata = base.clone();
    metadata.insert("actor_name".into(), Value::String(actor.name.clone()));
    metadata.insert("actor_role".into(), Value::String(actor.role.as_str().into()));
    metadata.insert(
        "recipient_role".into(),
        Value::String(recipient.role.as_str().into()),
    );
    metadata.insert("is_cross_role".into(), Value::Bool(category.is_cross_role()));
    metadata.insert(
        "action_source".into(),
        Value::String(format!("{} Action", actor.role.label())),
    );
    metadata.insert("timestamp".into(), Value::String(now.to_rfc3339()));
    metadata
}

/// `"<actor> " + message with its first letter lowercased`.
fn attributed_body(actor_name: &str, message: &str) -> String {
    format!("{actor_name} {}", lowercase_first(message))
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn terminate_sentence(s: &str) -> String {
    let trimmed = s.trim_end();
    if trimmed.ends_with(['.', '!', '?']) {
        trimmed.to_string()
    } else {
        format!("{trimmed}.")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
