//! Role-aware notification fan-out.
//!
//! [`AlertFanOut`] resolves every peer clinician, builds a per-recipient
//! payload with [`carelink_core::notification`], hands it to the
//! [`NotificationStore`], and then invalidates that recipient's two cache
//! entries. Recipients are processed sequentially within one call.

use std::str::FromStr;
use std::sync::Arc;

use carelink_core::notification::{
    build_peer_payload, build_review_request, cache_keys_for, NotificationPayload, PeerNotice,
};
use carelink_core::roles::{Role, CLINICAL_ROLES};
use carelink_core::staff::StaffUser;
use carelink_core::types::{DbId, Timestamp};
use chrono::Utc;

use crate::config::{parse_env_or, ConfigError};
use crate::ports::{DeliveryError, DirectoryError, NotificationCache, NotificationStore, UserDirectory};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// What to do when the store fails for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log, record the recipient as failed, and continue with the rest.
    #[default]
    BestEffort,
    /// Stop at the first failure and return it to the caller.
    AbortOnError,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best_effort" => Ok(FailurePolicy::BestEffort),
            "abort_on_error" => Ok(FailurePolicy::AbortOnError),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FanOutConfig {
    pub failure_policy: FailurePolicy,
}

impl FanOutConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                 | Default       |
    /// |-------------------------|---------------|
    /// | `FANOUT_FAILURE_POLICY` | `best_effort` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            failure_policy: parse_env_or("FANOUT_FAILURE_POLICY", FailurePolicy::BestEffort)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Report / Error
// ---------------------------------------------------------------------------

/// Outcome of one fan-out call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Recipients whose delivery succeeded, in processing order.
    pub delivered: Vec<DbId>,
    /// Recipients whose delivery failed under [`FailurePolicy::BestEffort`].
    pub failed: Vec<DbId>,
}

impl FanOutReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FanOutError {
    #[error("Failed to resolve recipients: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Delivery to user {recipient_id} failed: {source}")]
    Delivery {
        recipient_id: DbId,
        #[source]
        source: DeliveryError,
    },
}

// ---------------------------------------------------------------------------
// AlertFanOut
// ---------------------------------------------------------------------------

pub struct AlertFanOut {
    directory: Arc<dyn UserDirectory>,
    store: Arc<dyn NotificationStore>,
    cache: Arc<dyn NotificationCache>,
    config: FanOutConfig,
}

impl AlertFanOut {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        store: Arc<dyn NotificationStore>,
        cache: Arc<dyn NotificationCache>,
    ) -> Self {
        Self {
            directory,
            store,
            cache,
            config: FanOutConfig::default(),
        }
    }

    pub fn with_config(mut self, config: FanOutConfig) -> Self {
        self.config = config;
        self
    }

    /// Notify every midwife and health worker except `actor`, rewriting the
    /// notice per (actor role, recipient role).
    pub async fn notify_peers(
        &self,
        actor: &StaffUser,
        notice: &PeerNotice,
    ) -> Result<FanOutReport, FanOutError> {
        let recipients = self.recipients(actor, &CLINICAL_ROLES).await?;
        let now = Utc::now();

        tracing::debug!(
            actor_id = actor.id,
            actor_role = %actor.role,
            recipients = recipients.len(),
            title = %notice.title,
            "Fanning out peer notification"
        );

        self.dispatch(&recipients, |recipient| {
            build_peer_payload(actor, recipient, notice, now)
        })
        .await
    }

    /// Ask every midwife to review an action taken by a health worker.
    ///
    /// Does nothing unless `actor` is a health worker.
    pub async fn notify_midwives_of_health_worker_action(
        &self,
        actor: &StaffUser,
        notice: &PeerNotice,
    ) -> Result<FanOutReport, FanOutError> {
        if actor.role != Role::HealthWorker {
            tracing::debug!(
                actor_id = actor.id,
                actor_role = %actor.role,
                "Review request skipped, actor is not a health worker"
            );
            return Ok(FanOutReport::default());
        }

        let recipients = self.recipients(actor, &[Role::Midwife]).await?;
        let now: Timestamp = Utc::now();

        tracing::debug!(
            actor_id = actor.id,
            recipients = recipients.len(),
            title = %notice.title,
            "Requesting midwife review"
        );

        self.dispatch(&recipients, |recipient| {
            build_review_request(actor, recipient, notice, now)
        })
        .await
    }

    async fn recipients(
        &self,
        actor: &StaffUser,
        roles: &[Role],
    ) -> Result<Vec<StaffUser>, FanOutError> {
        let mut users = self.directory.list_users_by_roles(roles).await?;
        users.retain(|u| u.id != actor.id);
        Ok(users)
    }

    async fn dispatch<F>(
        &self,
        recipients: &[StaffUser],
        build: F,
    ) -> Result<FanOutReport, FanOutError>
    where
        F: Fn(&StaffUser) -> NotificationPayload,
    {
        let mut report = FanOutReport::default();

        for recipient in recipients {
            let payload = build(recipient);
            let result = self.store.deliver(recipient, &payload).await;

            // Invalidate whatever the delivery outcome was.
            self.invalidate_caches(recipient.id).await;

            match result {
                Ok(()) => {
                    tracing::debug!(
                        recipient_id = recipient.id,
                        category = ?payload.category,
                        priority = ?payload.priority,
                        "Notification delivered"
                    );
                    report.delivered.push(recipient.id);
                }
                Err(e) => match self.config.failure_policy {
                    FailurePolicy::BestEffort => {
                        tracing::warn!(
                            recipient_id = recipient.id,
                            error = %e,
                            "Notification delivery failed, continuing"
                        );
                        report.failed.push(recipient.id);
                    }
                    FailurePolicy::AbortOnError => {
                        tracing::error!(
                            recipient_id = recipient.id,
                            error = %e,
                            "Notification delivery failed, aborting fan-out"
                        );
                        return Err(FanOutError::Delivery {
                            recipient_id: recipient.id,
                            source: e,
                        });
                    }
                },
            }
        }

        if !report.delivered.is_empty() || !report.failed.is_empty() {
            tracing::info!(
                delivered = report.delivered.len(),
                failed = report.failed.len(),
                "Fan-out complete"
            );
        }

        Ok(report)
    }

    async fn invalidate_caches(&self, recipient_id: DbId) {
        for key in cache_keys_for(recipient_id) {
            if let Err(e) = self.cache.invalidate(&key).await {
                tracing::warn!(key = %key, error = %e, "Failed to invalidate notification cache");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
