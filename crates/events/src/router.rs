//! Event-to-alert routing.
//!
//! [`AlertRouter`] subscribes to the [`EventBus`](crate::bus::EventBus) and
//! turns each [`HealthEvent`] into a peer notice, then hands it to the
//! [`AlertFanOut`]. Prenatal checkups are classified on the way through;
//! a dangerous reading recorded by a health worker goes to midwives as a
//! review request instead of a plain peer update.

use std::sync::Arc;

use carelink_core::blood_pressure::{classify, BloodPressure, BpSeverity};
use carelink_core::event_types::{
    CHILD_REGISTERED, IMMUNIZATION_RECORDED, PRENATAL_CHECKUP_RECORDED, VACCINE_STOCK_LOW,
};
use carelink_core::notification::{PeerNotice, Priority};
use carelink_core::roles::Role;
use carelink_core::validation::validate_blood_pressure;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::bus::{HealthEvent, PayloadInt};
use crate::fanout::{AlertFanOut, FanOutError, FanOutReport};

/// Which fan-out entry point a routed notice goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// All peer clinicians via [`AlertFanOut::notify_peers`].
    Peers,
    /// Midwives only via
    /// [`AlertFanOut::notify_midwives_of_health_worker_action`].
    MidwifeReview,
}

/// A notice derived from an event, plus where it should go.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedNotice {
    pub notice: PeerNotice,
    pub audience: Audience,
}

pub struct AlertRouter {
    fanout: Arc<AlertFanOut>,
}

impl AlertRouter {
    pub fn new(fanout: Arc<AlertFanOut>) -> Self {
        Self { fanout }
    }

    /// Run the routing loop until the bus closes or `cancel` fires.
    ///
    /// Events already buffered when the bus closes are still routed. The bus
    /// drops the oldest events once a slow router falls a full buffer behind;
    /// feed bulk input through [`run_queue`](Self::run_queue) instead.
    pub async fn run(self, mut receiver: broadcast::Receiver<HealthEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Alert router cancelled");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) => self.route_logged(&event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::error!(dropped = n, "Alert router lagged, health events lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, alert router shutting down");
                        break;
                    }
                },
            }
        }
    }

    /// Route events from a bounded queue until every sender is dropped.
    ///
    /// Senders wait for free capacity, so no queued event is ever dropped.
    /// Everything sent before the last sender closes is routed.
    pub async fn run_queue(self, mut receiver: mpsc::Receiver<HealthEvent>) {
        while let Some(event) = receiver.recv().await {
            self.route_logged(&event).await;
        }
        tracing::info!("Event queue closed, alert router shutting down");
    }

    async fn route_logged(&self, event: &HealthEvent) {
        if let Err(e) = self.route_event(event).await {
            tracing::error!(
                error = %e,
                event_type = %event.event_type,
                "Failed to route health event"
            );
        }
    }

    /// Route one event. Returns `None` when the event type is not one the
    /// router handles.
    pub async fn route_event(
        &self,
        event: &HealthEvent,
    ) -> Result<Option<FanOutReport>, FanOutError> {
        let Some(routed) = notice_for(event) else {
            tracing::warn!(event_type = %event.event_type, "Unknown health event type, skipping");
            return Ok(None);
        };

        let report = match routed.audience {
            Audience::Peers => self.fanout.notify_peers(&event.actor, &routed.notice).await?,
            Audience::MidwifeReview => {
                self.fanout
                    .notify_midwives_of_health_worker_action(&event.actor, &routed.notice)
                    .await?
            }
        };
        Ok(Some(report))
    }
}

/// Build the notice for an event, or `None` for unhandled event types.
pub fn notice_for(event: &HealthEvent) -> Option<RoutedNotice> {
    match event.event_type.as_str() {
        PRENATAL_CHECKUP_RECORDED => Some(prenatal_checkup_notice(event)),
        CHILD_REGISTERED => {
            let child = event.payload_str("child_name").unwrap_or("a child");
            let mut notice = PeerNotice::new("New child registered", format!("Registered {child}."));
            if let Some(id) = event.payload_i64("child_id").or(event.source_entity_id) {
                notice = notice.with_link(format!("/children/{id}")).with_metadata("child_id", id);
            }
            Some(peers(notice))
        }
        IMMUNIZATION_RECORDED => {
            let child = event.payload_str("child_name").unwrap_or("a child");
            let vaccine = event.payload_str("vaccine_name").unwrap_or("a vaccine");
            let message = match event.payload_i64("dose_number") {
                Some(dose) => format!("Gave {vaccine} dose {dose} to {child}."),
                None => format!("Gave {vaccine} to {child}."),
            };
            Some(peers(PeerNotice::new("Immunization recorded", message)))
        }
        VACCINE_STOCK_LOW => {
            let vaccine = event.payload_str("vaccine_name").unwrap_or("a vaccine");
            let message = match event.payload_i64("quantity") {
                Some(qty) => format!("Reported low stock of {vaccine} ({qty} doses left)."),
                None => format!("Reported low stock of {vaccine}."),
            };
            let notice = PeerNotice::new("Low vaccine stock", message)
                .with_priority(Priority::High)
                .with_link("/vaccines");
            let audience = if event.actor.role == Role::HealthWorker {
                Audience::MidwifeReview
            } else {
                Audience::Peers
            };
            Some(RoutedNotice { notice, audience })
        }
        _ => None,
    }
}

fn peers(notice: PeerNotice) -> RoutedNotice {
    RoutedNotice {
        notice,
        audience: Audience::Peers,
    }
}

fn prenatal_checkup_notice(event: &HealthEvent) -> RoutedNotice {
    let patient = event.payload_str("patient_name").unwrap_or("a patient");
    let mut unusable = Vec::new();
    let reading = BloodPressure {
        systolic: reading_field(event, "systolic", &mut unusable),
        diastolic: reading_field(event, "diastolic", &mut unusable),
    };

    let mut notice = PeerNotice::new(
        "New prenatal checkup",
        format!("Recorded a prenatal checkup for {patient} (BP {reading})."),
    );
    if let Some(id) = event.payload_i64("checkup_id").or(event.source_entity_id) {
        notice = notice
            .with_link(format!("/prenatal-checkups/{id}"))
            .with_metadata("checkup_id", id);
    }

    let mut violations = unusable;
    violations.extend(
        validate_blood_pressure(reading.systolic, reading.diastolic)
            .into_iter()
            .map(|v| v.message),
    );
    if !violations.is_empty() {
        tracing::warn!(
            patient = patient,
            reading = %reading,
            violations = violations.len(),
            "Prenatal checkup reading failed validation, not classified"
        );
        let messages: Vec<serde_json::Value> =
            violations.into_iter().map(serde_json::Value::String).collect();
        return peers(notice.with_metadata("bp_violations", messages));
    }

    let Some(classification) = classify(reading.systolic, reading.diastolic) else {
        return peers(notice);
    };

    notice = notice
        .with_metadata("bp_status", serde_json::to_value(classification.status).unwrap_or_default())
        .with_metadata(
            "bp_severity",
            serde_json::to_value(classification.severity).unwrap_or_default(),
        );

    if !classification.severity.is_alarming() {
        return peers(notice);
    }

    notice.title = "Blood pressure alert".to_string();
    notice.message = format!("{} {}", notice.message, classification.message);
    notice.priority = Priority::High;

    let audience = if classification.severity == BpSeverity::Danger
        && event.actor.role == Role::HealthWorker
    {
        Audience::MidwifeReview
    } else {
        Audience::Peers
    };

    RoutedNotice { notice, audience }
}

/// A present reading that is not a usable whole number is recorded in
/// `unusable` and treated as absent for classification.
fn reading_field(event: &HealthEvent, field: &str, unusable: &mut Vec<String>) -> Option<i32> {
    match event.payload_i32(field) {
        PayloadInt::Missing => None,
        PayloadInt::Value(v) => Some(v),
        PayloadInt::Unusable(raw) => {
            unusable.push(format!("{field} must be a whole number, got {raw}"));
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use carelink_core::staff::StaffUser;
    use serde_json::json;

    use super::*;
    use crate::bus::EventBus;
    use crate::memory::{InMemoryCache, InMemoryDirectory, InMemoryNotificationStore};

    fn bhw() -> StaffUser {
        StaffUser::new(1, "Rosa Dizon", Role::HealthWorker)
    }

    fn midwife() -> StaffUser {
        StaffUser::new(2, "Lorna Santos", Role::Midwife)
    }

    fn checkup(actor: StaffUser, systolic: i64, diastolic: i64) -> HealthEvent {
        HealthEvent::new(PRENATAL_CHECKUP_RECORDED, actor)
            .with_source("prenatal_checkup", 9)
            .with_payload(json!({
                "patient_name": "Maria Cruz",
                "systolic": systolic,
                "diastolic": diastolic,
            }))
    }

    #[test]
    fn normal_checkup_goes_to_peers_at_normal_priority() {
        let routed = notice_for(&checkup(bhw(), 118, 76)).unwrap();
        assert_eq!(routed.audience, Audience::Peers);
        assert_eq!(routed.notice.priority, Priority::Normal);
        assert_eq!(routed.notice.title, "New prenatal checkup");
        assert_eq!(
            routed.notice.message,
            "Recorded a prenatal checkup for Maria Cruz (BP 118/76)."
        );
        assert_eq!(routed.notice.metadata["bp_severity"], "success");
        assert_eq!(routed.notice.link.as_deref(), Some("/prenatal-checkups/9"));
    }

    #[test]
    fn high_reading_by_midwife_is_high_priority_peer_alert() {
        let routed = notice_for(&checkup(midwife(), 145, 92)).unwrap();
        assert_eq!(routed.audience, Audience::Peers);
        assert_eq!(routed.notice.priority, Priority::High);
        assert_eq!(routed.notice.title, "Blood pressure alert");
        assert_eq!(routed.notice.metadata["bp_status"], "high");
    }

    #[test]
    fn danger_reading_by_health_worker_requests_review() {
        let routed = notice_for(&checkup(bhw(), 185, 100)).unwrap();
        assert_eq!(routed.audience, Audience::MidwifeReview);
        assert!(routed.notice.message.contains("emergency"));
    }

    #[test]
    fn invalid_reading_is_reported_not_classified() {
        let routed = notice_for(&checkup(bhw(), 100, 110)).unwrap();
        assert_eq!(routed.audience, Audience::Peers);
        assert!(routed.notice.metadata.get("bp_status").is_none());
        assert_eq!(routed.notice.metadata["bp_violations"].as_array().unwrap().len(), 1);
    }

    fn checkup_with(actor: StaffUser, reading: serde_json::Value) -> HealthEvent {
        let mut payload = json!({"patient_name": "Maria Cruz"});
        if let (Some(target), Some(fields)) = (payload.as_object_mut(), reading.as_object()) {
            target.extend(fields.clone());
        }
        HealthEvent::new(PRENATAL_CHECKUP_RECORDED, actor)
            .with_source("prenatal_checkup", 9)
            .with_payload(payload)
    }

    #[test]
    fn integral_float_reading_is_classified() {
        let routed =
            notice_for(&checkup_with(midwife(), json!({"systolic": 185.0, "diastolic": 125.0})))
                .unwrap();
        assert_eq!(routed.audience, Audience::Peers);
        assert_eq!(routed.notice.priority, Priority::High);
        assert_eq!(routed.notice.title, "Blood pressure alert");
        assert_eq!(routed.notice.metadata["bp_severity"], "danger");
        assert!(routed.notice.message.contains("(BP 185/125)"));
    }

    #[test]
    fn string_reading_is_reported_not_dropped() {
        let routed =
            notice_for(&checkup_with(midwife(), json!({"systolic": "185", "diastolic": 125})))
                .unwrap();
        assert!(routed.notice.metadata.get("bp_status").is_none());
        let violations = routed.notice.metadata["bp_violations"].as_array().unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0], "systolic must be a whole number, got \"185\"");
    }

    #[test]
    fn fractional_and_out_of_range_readings_are_reported() {
        let routed = notice_for(&checkup_with(
            bhw(),
            json!({"systolic": 150.5, "diastolic": 5_000_000_000i64}),
        ))
        .unwrap();
        assert_eq!(routed.notice.priority, Priority::Normal);
        let violations = routed.notice.metadata["bp_violations"].as_array().unwrap();
        assert_eq!(violations.len(), 2);
        assert!(violations[0].as_str().unwrap().starts_with("systolic"));
        assert!(violations[1].as_str().unwrap().starts_with("diastolic"));
    }

    #[test]
    fn missing_reading_is_passed_through() {
        let event = HealthEvent::new(PRENATAL_CHECKUP_RECORDED, bhw())
            .with_payload(json!({"patient_name": "Maria Cruz"}));
        let routed = notice_for(&event).unwrap();
        assert_eq!(routed.notice.priority, Priority::Normal);
        assert!(routed.notice.message.contains("BP -/-"));
        assert!(routed.notice.link.is_none());
    }

    #[test]
    fn immunization_message_includes_dose() {
        let event = HealthEvent::new(IMMUNIZATION_RECORDED, midwife()).with_payload(json!({
            "child_name": "Juan Cruz",
            "vaccine_name": "BCG",
            "dose_number": 1,
        }));
        let routed = notice_for(&event).unwrap();
        assert_eq!(routed.notice.message, "Gave BCG dose 1 to Juan Cruz.");
    }

    #[test]
    fn low_stock_from_health_worker_requests_review() {
        let event = HealthEvent::new(VACCINE_STOCK_LOW, bhw())
            .with_payload(json!({"vaccine_name": "Pentavalent", "quantity": 3}));
        let routed = notice_for(&event).unwrap();
        assert_eq!(routed.audience, Audience::MidwifeReview);
        assert_eq!(
            routed.notice.message,
            "Reported low stock of Pentavalent (3 doses left)."
        );
    }

    #[test]
    fn child_registration_links_to_child() {
        let event = HealthEvent::new(CHILD_REGISTERED, bhw())
            .with_payload(json!({"child_name": "Juan Cruz", "child_id": 12}));
        let routed = notice_for(&event).unwrap();
        assert_eq!(routed.notice.link.as_deref(), Some("/children/12"));
    }

    #[test]
    fn unknown_event_type_is_not_routed() {
        assert!(notice_for(&HealthEvent::new("user.logged_in", bhw())).is_none());
    }

    fn router_with(
        users: Vec<StaffUser>,
    ) -> (AlertRouter, Arc<InMemoryNotificationStore>) {
        let store = Arc::new(InMemoryNotificationStore::new());
        let fanout = AlertFanOut::new(
            Arc::new(InMemoryDirectory::new(users)),
            store.clone(),
            Arc::new(InMemoryCache::new()),
        );
        (AlertRouter::new(Arc::new(fanout)), store)
    }

    #[tokio::test]
    async fn run_drains_buffered_events_after_bus_closes() {
        let (router, store) = router_with(vec![bhw(), midwife()]);
        let bus = EventBus::default();
        let rx = bus.subscribe();

        bus.publish(checkup(bhw(), 120, 80));
        bus.publish(HealthEvent::new("user.logged_in", bhw()));
        drop(bus);

        router.run(rx, CancellationToken::new()).await;

        let delivered = store.all().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].recipient_id, 2);
    }

    #[tokio::test]
    async fn run_queue_routes_every_event_past_capacity() {
        let (router, store) = router_with(vec![bhw(), midwife()]);
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(router.run_queue(rx));

        for id in 0..1500 {
            let event = HealthEvent::new(CHILD_REGISTERED, bhw())
                .with_payload(json!({"child_name": "Juan Cruz", "child_id": id}));
            tx.send(event).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(store.for_user(2).await.len(), 1500);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (router, _store) = router_with(vec![]);
        let bus = EventBus::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        router.run(bus.subscribe(), cancel).await;
    }

    #[tokio::test]
    async fn route_event_reports_unknown_as_none() {
        let (router, _store) = router_with(vec![bhw(), midwife()]);
        let result = router
            .route_event(&HealthEvent::new("user.logged_in", bhw()))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
