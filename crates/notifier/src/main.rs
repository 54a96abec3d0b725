//! `carelink-notifier`: reads newline-delimited JSON health events from
//! stdin, routes them through the alert fan-out, and writes every resulting
//! notification to stdout as one JSON object per line. Logs go to stderr.

use std::sync::Arc;

use anyhow::Context;
use carelink_events::ports::NotificationStore;
use carelink_events::{
    AlertFanOut, AlertRouter, HealthEvent, HttpSmsGateway, InMemoryCache, InMemoryDirectory,
    InMemoryNotificationStore, SmsNotificationStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod roster;

use config::NotifierConfig;
use roster::Roster;

/// Events read from stdin but not yet routed. The reader waits when full.
const EVENT_QUEUE_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carelink_notifier=debug,carelink_events=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = NotifierConfig::from_env()?;

    let roster = Roster::new(config::load_roster(&config.staff_roster_path)?);
    tracing::info!(staff = roster.users().len(), "Staff roster loaded");

    let inbox = Arc::new(InMemoryNotificationStore::new());
    let store: Arc<dyn NotificationStore> = match config.sms.clone() {
        Some(sms) => {
            let gateway = HttpSmsGateway::new(sms).context("Failed to build SMS gateway")?;
            tracing::info!("SMS delivery enabled");
            Arc::new(SmsNotificationStore::new(inbox.clone(), Arc::new(gateway)))
        }
        None => {
            tracing::info!("SMS_API_URL not set, SMS delivery disabled");
            inbox.clone()
        }
    };

    let fanout = AlertFanOut::new(
        Arc::new(InMemoryDirectory::new(roster.users().to_vec())),
        store,
        Arc::new(InMemoryCache::new()),
    )
    .with_config(config.fanout.clone());

    let (queue, events) = mpsc::channel::<HealthEvent>(EVENT_QUEUE_CAPACITY);
    let router = tokio::spawn(AlertRouter::new(Arc::new(fanout)).run_queue(events));

    // Interrupt stops reading only; whatever is queued still gets routed.
    let stop_reading = CancellationToken::new();
    let interrupt = stop_reading.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, routing queued events before exit");
            interrupt.cancel();
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut published = 0usize;
    let mut rejected = 0usize;

    loop {
        tokio::select! {
            _ = stop_reading.cancelled() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let event = match serde_json::from_str::<HealthEvent>(line) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping malformed event line");
                        rejected += 1;
                        continue;
                    }
                };
                let event = match roster.resolve(event) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping event");
                        rejected += 1;
                        continue;
                    }
                };
                if queue.send(event).await.is_err() {
                    anyhow::bail!("Alert router stopped before input was consumed");
                }
                published += 1;
            }
        }
    }

    // Closing the queue lets the router finish what is buffered and exit.
    drop(queue);
    router.await.context("Alert router task failed")?;

    for stored in inbox.all().await {
        let line = serde_json::json!({
            "recipient_id": stored.recipient_id,
            "notification": stored.payload,
        });
        println!("{line}");
    }

    tracing::info!(published, rejected, "Notifier finished");
    Ok(())
}
