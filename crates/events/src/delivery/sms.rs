//! SMS delivery for high-priority notifications.
//!
//! [`SmsNotificationStore`] decorates another [`NotificationStore`]: once the
//! inner store accepts a notification, high-priority payloads are also texted
//! to the recipient through an [`SmsGateway`]. SMS problems are logged and
//! never fail the delivery. [`HttpSmsGateway`] posts to a JSON SMS API
//! configured by [`SmsConfig::from_env`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carelink_core::notification::{NotificationPayload, Priority, ALERT_MARKER, UPDATE_MARKER};
use carelink_core::staff::StaffUser;
use serde::{Deserialize, Serialize};

use crate::config::{parse_env_or, ConfigError};
use crate::ports::{DeliveryError, NotificationStore};

/// Longest text sent, in characters (two concatenated GSM segments).
const MAX_SMS_CHARS: usize = 306;

// ---------------------------------------------------------------------------
// Error / result
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("SMS request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The gateway returned a non-2xx status code.
    #[error("SMS gateway returned HTTP {0}")]
    HttpStatus(u16),
}

/// What the gateway reported for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsResult {
    pub success: bool,
    pub message: String,
}

/// Sends one text message.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, phone_number: &str, body: &str) -> Result<SmsResult, SmsError>;
}

// ---------------------------------------------------------------------------
// SmsConfig
// ---------------------------------------------------------------------------

/// Default sender name shown on the handset.
const DEFAULT_SENDER_NAME: &str = "CARELINK";

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub sender_name: String,
    pub timeout: Duration,
}

impl SmsConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` if `SMS_API_URL` is not set, meaning SMS delivery
    /// is disabled.
    ///
    /// | Variable           | Required | Default    |
    /// |--------------------|----------|------------|
    /// | `SMS_API_URL`      | yes      | -          |
    /// | `SMS_API_KEY`      | no       | -          |
    /// | `SMS_SENDER_NAME`  | no       | `CARELINK` |
    /// | `SMS_TIMEOUT_SECS` | no       | `10`       |
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(api_url) = std::env::var("SMS_API_URL") else {
            return Ok(None);
        };
        Ok(Some(Self {
            api_url,
            api_key: std::env::var("SMS_API_KEY").ok(),
            sender_name: std::env::var("SMS_SENDER_NAME")
                .unwrap_or_else(|_| DEFAULT_SENDER_NAME.to_string()),
            timeout: Duration::from_secs(parse_env_or("SMS_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?),
        }))
    }
}

// ---------------------------------------------------------------------------
// HttpSmsGateway
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    apikey: Option<&'a str>,
    number: &'a str,
    message: &'a str,
    sendername: &'a str,
}

/// Posts messages to an HTTP SMS API as JSON.
pub struct HttpSmsGateway {
    client: reqwest::Client,
    config: SmsConfig,
}

impl HttpSmsGateway {
    pub fn new(config: SmsConfig) -> Result<Self, SmsError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send(&self, phone_number: &str, body: &str) -> Result<SmsResult, SmsError> {
        let request = SendRequest {
            apikey: self.config.api_key.as_deref(),
            number: phone_number,
            message: body,
            sendername: &self.config.sender_name,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SmsError::HttpStatus(status.as_u16()));
        }

        let text = response.text().await?;
        Ok(interpret_response(phone_number, &text))
    }
}

/// Per-message statuses a provider uses for messages it will not send.
const FAILED_STATUSES: [&str; 3] = ["failed", "refunded", "rejected"];

/// Turn a 2xx response body into an [`SmsResult`].
///
/// - empty or non-JSON body: accepted as sent.
/// - array of `{ "status": .. }` acknowledgements: sent unless any status is
///   one of [`FAILED_STATUSES`].
/// - object with a boolean `success` or a string `status`: taken as given.
/// - any other object (e.g. a field-error map): rejected.
fn interpret_response(phone_number: &str, text: &str) -> SmsResult {
    let text = text.trim();
    let sent = |message: String| SmsResult {
        success: true,
        message,
    };
    if text.is_empty() {
        return sent(format!("Sent to {phone_number}"));
    }
    let Ok(body) = serde_json::from_str::<serde_json::Value>(text) else {
        return sent(text.to_string());
    };

    match &body {
        serde_json::Value::Array(acks) => {
            let statuses: Vec<&str> = acks
                .iter()
                .filter_map(|ack| ack.get("status").and_then(|s| s.as_str()))
                .collect();
            SmsResult {
                success: !statuses.iter().any(|s| is_failed_status(s)),
                message: if statuses.is_empty() {
                    text.to_string()
                } else {
                    statuses.join(", ")
                },
            }
        }
        serde_json::Value::Object(fields) => {
            let message = fields
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or(text)
                .to_string();
            if let Some(success) = fields.get("success").and_then(|v| v.as_bool()) {
                SmsResult { success, message }
            } else if let Some(status) = fields.get("status").and_then(|v| v.as_str()) {
                SmsResult {
                    success: !is_failed_status(status),
                    message: status.to_string(),
                }
            } else {
                SmsResult {
                    success: false,
                    message: text.to_string(),
                }
            }
        }
        _ => sent(text.to_string()),
    }
}

fn is_failed_status(status: &str) -> bool {
    FAILED_STATUSES
        .iter()
        .any(|failed| status.eq_ignore_ascii_case(failed))
}

// ---------------------------------------------------------------------------
// SmsNotificationStore
// ---------------------------------------------------------------------------

pub struct SmsNotificationStore {
    inner: Arc<dyn NotificationStore>,
    gateway: Arc<dyn SmsGateway>,
}

impl SmsNotificationStore {
    pub fn new(inner: Arc<dyn NotificationStore>, gateway: Arc<dyn SmsGateway>) -> Self {
        Self { inner, gateway }
    }

    async fn text(&self, recipient: &StaffUser, payload: &NotificationPayload) {
        let Some(raw) = recipient.phone.as_deref() else {
            tracing::debug!(recipient_id = recipient.id, "No phone number on file, SMS skipped");
            return;
        };
        let Some(number) = normalize_phone_number(raw) else {
            tracing::warn!(recipient_id = recipient.id, phone = raw, "Unusable phone number, SMS skipped");
            return;
        };

        match self.gateway.send(&number, &sms_text(payload)).await {
            Ok(result) if result.success => {
                tracing::info!(recipient_id = recipient.id, "SMS alert sent");
            }
            Ok(result) => {
                tracing::warn!(
                    recipient_id = recipient.id,
                    gateway_message = %result.message,
                    "SMS gateway rejected alert"
                );
            }
            Err(e) => {
                tracing::error!(recipient_id = recipient.id, error = %e, "SMS delivery failed");
            }
        }
    }
}

#[async_trait]
impl NotificationStore for SmsNotificationStore {
    async fn deliver(
        &self,
        recipient: &StaffUser,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        self.inner.deliver(recipient, payload).await?;
        if payload.priority == Priority::High {
            self.text(recipient, payload).await;
        }
        Ok(())
    }
}

/// Plain-text SMS body: title and body without the emoji markers, capped at
/// [`MAX_SMS_CHARS`].
pub fn sms_text(payload: &NotificationPayload) -> String {
    let title = payload
        .title
        .trim_start_matches(ALERT_MARKER)
        .trim_start_matches(UPDATE_MARKER);
    let full = format!("{title}: {}", payload.body);
    if full.chars().count() <= MAX_SMS_CHARS {
        return full;
    }
    let mut cut: String = full.chars().take(MAX_SMS_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

/// Normalize a Philippine mobile number to `63XXXXXXXXXX`.
///
/// Accepts `09XXXXXXXXX`, `9XXXXXXXXX`, `639XXXXXXXXX` and `+639XXXXXXXXX`,
/// ignoring spaces and dashes.
pub fn normalize_phone_number(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = digits.strip_prefix('+').unwrap_or(&digits);
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let national = if let Some(rest) = digits.strip_prefix("63") {
        rest
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest
    } else {
        digits
    };

    (national.len() == 10 && national.starts_with('9')).then(|| format!("63{national}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use carelink_core::notification::NotificationCategory;
    use carelink_core::roles::Role;
    use serde_json::Map;
    use tokio::sync::Mutex;

    use super::*;
    use crate::memory::InMemoryNotificationStore;

    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SmsGateway for RecordingGateway {
        async fn send(&self, phone_number: &str, body: &str) -> Result<SmsResult, SmsError> {
            self.sent
                .lock()
                .await
                .push((phone_number.to_string(), body.to_string()));
            Ok(SmsResult {
                success: true,
                message: "queued".into(),
            })
        }
    }

    struct FailingGateway;

    #[async_trait]
    impl SmsGateway for FailingGateway {
        async fn send(&self, _phone: &str, _body: &str) -> Result<SmsResult, SmsError> {
            Err(SmsError::HttpStatus(503))
        }
    }

    fn payload(priority: Priority) -> NotificationPayload {
        NotificationPayload {
            title: format!("{ALERT_MARKER}Blood pressure alert"),
            body: "Rosa Dizon recorded a prenatal checkup.".into(),
            priority,
            link: None,
            metadata: Map::new(),
            category: NotificationCategory::SecondaryToPrimary,
            requires_attention: true,
        }
    }

    fn midwife() -> StaffUser {
        StaffUser::new(2, "Lorna Santos", Role::Midwife).with_phone("0917-123-4567")
    }

    #[tokio::test]
    async fn high_priority_is_texted_after_inner_delivery() {
        let inner = Arc::new(InMemoryNotificationStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let store = SmsNotificationStore::new(inner.clone(), gateway.clone());

        store.deliver(&midwife(), &payload(Priority::High)).await.unwrap();

        assert_eq!(inner.for_user(2).await.len(), 1);
        let sent = gateway.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "639171234567");
        assert_eq!(
            sent[0].1,
            "Blood pressure alert: Rosa Dizon recorded a prenatal checkup."
        );
    }

    #[tokio::test]
    async fn normal_priority_is_not_texted() {
        let inner = Arc::new(InMemoryNotificationStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let store = SmsNotificationStore::new(inner.clone(), gateway.clone());

        store.deliver(&midwife(), &payload(Priority::Normal)).await.unwrap();

        assert_eq!(inner.for_user(2).await.len(), 1);
        assert!(gateway.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn missing_phone_skips_sms() {
        let gateway = Arc::new(RecordingGateway::default());
        let store = SmsNotificationStore::new(
            Arc::new(InMemoryNotificationStore::new()),
            gateway.clone(),
        );
        let no_phone = StaffUser::new(2, "Lorna Santos", Role::Midwife);

        store.deliver(&no_phone, &payload(Priority::High)).await.unwrap();
        assert!(gateway.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_does_not_fail_delivery() {
        let inner = Arc::new(InMemoryNotificationStore::new());
        let store = SmsNotificationStore::new(inner.clone(), Arc::new(FailingGateway));

        assert!(store.deliver(&midwife(), &payload(Priority::High)).await.is_ok());
        assert_eq!(inner.for_user(2).await.len(), 1);
    }

    #[test]
    fn normalizes_local_formats() {
        assert_eq!(normalize_phone_number("09171234567").as_deref(), Some("639171234567"));
        assert_eq!(normalize_phone_number("+63 917 123 4567").as_deref(), Some("639171234567"));
        assert_eq!(normalize_phone_number("9171234567").as_deref(), Some("639171234567"));
        assert_eq!(normalize_phone_number("639171234567").as_deref(), Some("639171234567"));
    }

    #[test]
    fn rejects_unusable_numbers() {
        assert!(normalize_phone_number("12345").is_none());
        assert!(normalize_phone_number("0817123456x").is_none());
        assert!(normalize_phone_number("08171234567").is_none());
    }

    #[test]
    fn long_text_is_truncated() {
        let mut p = payload(Priority::High);
        p.body = "x".repeat(400);
        let text = sms_text(&p);
        assert_eq!(text.chars().count(), MAX_SMS_CHARS);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn from_env_returns_none_without_api_url() {
        std::env::remove_var("SMS_API_URL");
        assert!(SmsConfig::from_env().unwrap().is_none());
    }

    #[test]
    fn sms_error_display_http_status() {
        assert_eq!(SmsError::HttpStatus(502).to_string(), "SMS gateway returned HTTP 502");
    }

    #[test]
    fn request_omits_missing_api_key() {
        let without_key = SendRequest {
            apikey: None,
            number: "639171234567",
            message: "hello",
            sendername: "CARELINK",
        };
        assert_eq!(
            serde_json::to_value(&without_key).unwrap(),
            serde_json::json!({
                "number": "639171234567",
                "message": "hello",
                "sendername": "CARELINK",
            })
        );

        let with_key = SendRequest {
            apikey: Some("secret"),
            ..without_key
        };
        assert_eq!(serde_json::to_value(&with_key).unwrap()["apikey"], "secret");
    }

    #[test]
    fn response_statuses_decide_success() {
        assert!(interpret_response("639171234567", "").success);
        assert!(interpret_response("639171234567", "OK").success);
        assert_eq!(
            interpret_response("639171234567", r#"[{"message_id": 1, "status": "Pending"}]"#),
            SmsResult {
                success: true,
                message: "Pending".into(),
            }
        );
        assert!(!interpret_response("639171234567", r#"[{"status": "Failed"}]"#).success);
        assert!(!interpret_response("639171234567", r#"{"success": false, "message": "No credits"}"#).success);
        assert!(!interpret_response("639171234567", r#"{"number": ["The number format is invalid."]}"#).success);
    }

    /// Serves one canned HTTP response and hands back the request body.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<serde_json::Value>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/messages", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            let body_start = loop {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "client closed before sending headers");
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let headers = String::from_utf8_lossy(&raw[..body_start]).to_lowercase();
            let length: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);
            while raw.len() < body_start + length {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "client closed before sending body");
                raw.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            serde_json::from_slice(&raw[body_start..body_start + length]).unwrap()
        });

        (url, handle)
    }

    fn config_for(api_url: String, api_key: Option<&str>) -> SmsConfig {
        SmsConfig {
            api_url,
            api_key: api_key.map(str::to_string),
            sender_name: "CARELINK".into(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn http_gateway_posts_json_and_reads_status() {
        let (url, request) =
            serve_once("HTTP/1.1 200 OK", r#"[{"message_id": 9, "status": "Queued"}]"#).await;
        let gateway = HttpSmsGateway::new(config_for(url, Some("secret"))).unwrap();

        let result = gateway.send("639171234567", "BP alert").await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Queued");

        assert_eq!(
            request.await.unwrap(),
            serde_json::json!({
                "apikey": "secret",
                "number": "639171234567",
                "message": "BP alert",
                "sendername": "CARELINK",
            })
        );
    }

    #[tokio::test]
    async fn http_gateway_maps_error_status() {
        let (url, request) = serve_once("HTTP/1.1 503 Service Unavailable", "{}").await;
        let gateway = HttpSmsGateway::new(config_for(url, None)).unwrap();

        let err = gateway.send("639171234567", "BP alert").await.unwrap_err();
        assert!(matches!(err, SmsError::HttpStatus(503)));
        assert!(request.await.unwrap().get("apikey").is_none());
    }
}
