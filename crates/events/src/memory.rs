//! In-memory collaborator implementations.
//!
//! Thread-safe via interior `RwLock`s and meant to be wrapped in `Arc`. Used
//! by the notifier binary and by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use carelink_core::notification::NotificationPayload;
use carelink_core::roles::Role;
use carelink_core::staff::StaffUser;
use carelink_core::types::DbId;
use tokio::sync::RwLock;

use crate::ports::{
    CacheError, DeliveryError, DirectoryError, NotificationCache, NotificationStore,
    UserDirectory,
};

// ---------------------------------------------------------------------------
// InMemoryDirectory
// ---------------------------------------------------------------------------

/// A fixed staff roster.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<Vec<StaffUser>>,
}

impl InMemoryDirectory {
    pub fn new(users: Vec<StaffUser>) -> Self {
        Self {
            users: RwLock::new(users),
        }
    }

    /// Add a user, replacing any existing entry with the same id.
    pub async fn upsert(&self, user: StaffUser) {
        let mut users = self.users.write().await;
        users.retain(|u| u.id != user.id);
        users.push(user);
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn list_users_by_roles(&self, roles: &[Role]) -> Result<Vec<StaffUser>, DirectoryError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .filter(|u| roles.contains(&u.role))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// InMemoryNotificationStore
// ---------------------------------------------------------------------------

/// A notification as stored for one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNotification {
    pub recipient_id: DbId,
    pub payload: NotificationPayload,
}

/// Append-only notification inbox.
#[derive(Default)]
pub struct InMemoryNotificationStore {
    notifications: RwLock<Vec<StoredNotification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored notifications in delivery order.
    pub async fn all(&self) -> Vec<StoredNotification> {
        self.notifications.read().await.clone()
    }

    /// Notifications delivered to one user, in delivery order.
    pub async fn for_user(&self, user_id: DbId) -> Vec<NotificationPayload> {
        self.notifications
            .read()
            .await
            .iter()
            .filter(|n| n.recipient_id == user_id)
            .map(|n| n.payload.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn deliver(
        &self,
        recipient: &StaffUser,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        self.notifications.write().await.push(StoredNotification {
            recipient_id: recipient.id,
            payload: payload.clone(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryCache
// ---------------------------------------------------------------------------

/// String-keyed JSON cache.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: impl Into<String>, value: serde_json::Value) {
        self.entries.write().await.insert(key.into(), value);
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.read().await.get(key).cloned()
    }
}

#[async_trait]
impl NotificationCache for InMemoryCache {
    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
