//! Collaborator interfaces the fan-out calls into.
//!
//! Persistence, push delivery and caching live outside this crate; they are
//! reached only through these traits. In-memory implementations are in
//! [`crate::memory`].

use async_trait::async_trait;
use carelink_core::notification::NotificationPayload;
use carelink_core::roles::Role;
use carelink_core::staff::StaffUser;
use carelink_core::types::DbId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("User directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The store refused this particular notification.
    #[error("Notification for user {user_id} rejected: {reason}")]
    Rejected { user_id: DbId, reason: String },

    /// The store could not be reached at all.
    #[error("Notification store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Resolves staff users by role.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_users_by_roles(&self, roles: &[Role]) -> Result<Vec<StaffUser>, DirectoryError>;
}

/// Persists or pushes a notification to one recipient.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn deliver(
        &self,
        recipient: &StaffUser,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError>;
}

/// Key-value cache holding per-user notification summaries.
#[async_trait]
pub trait NotificationCache: Send + Sync {
    /// Remove `key`. Removing a missing key is not an error.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;
}
