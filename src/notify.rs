// Best-effort booking notifications
// Messages go through a bounded queue drained by a background task. Enqueueing never blocks
// the caller and a failed delivery is only logged.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::model::{Reservation, ReservationId};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Mail API rejected message with status {0}")]
    Rejected(u16),

    #[error("Initialization error: {0}")]
    InitError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn reservation_confirmed(reservation: &Reservation) -> Self {
        Self {
            subject: "Reservation confirmed".to_string(),
            body: format!(
                "Reservation {} confirmed for room {} from {} to {}",
                reservation.id,
                reservation.room_id,
                reservation.starting_date.to_rfc3339(),
                reservation.end_date.to_rfc3339()
            ),
        }
    }

    pub fn reservation_cancelled(id: ReservationId) -> Self {
        Self {
            subject: "Reservation cancelled".to_string(),
            body: format!("Reservation {id} cancelled"),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

// Writes notifications to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(subject, body, "notification");
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default = "MailConfig::default_endpoint")]
    pub endpoint: String,
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
    pub to_email: String,
    pub to_name: String,
    #[serde(default = "MailConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl MailConfig {
    fn default_endpoint() -> String {
        "https://api.sendgrid.com/v3/mail/send".to_string()
    }

    fn default_timeout_ms() -> u64 {
        10_000
    }
}

/// Sends notifications as mail through a SendGrid-compatible HTTP API.
pub struct MailSink {
    config: MailConfig,
    http: reqwest::Client,
}

impl MailSink {
    pub fn new(config: MailConfig) -> Result<Self, NotifyError> {
        // bounds a mail API that accepts the connection and never answers
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| NotifyError::InitError(e.to_string()))?;

        Ok(Self { config, http })
    }

    fn payload(&self, subject: &str, body: &str) -> serde_json::Value {
        json!({
            "personalizations": [{
                "to": [{ "email": self.config.to_email, "name": self.config.to_name }]
            }],
            "from": { "email": self.config.from_email, "name": self.config.from_name },
            "subject": subject,
            "content": [
                { "type": "text/plain", "value": body },
                { "type": "text/html", "value": format!("<strong>{body}</strong>") }
            ]
        })
    }
}

#[async_trait]
impl NotificationSink for MailSink {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let res = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&self.payload(subject, body))
            .send()
            .await
            .map_err(|e| NotifyError::NetworkError(e.to_string()))?;

        if !res.status().is_success() {
            return Err(NotifyError::Rejected(res.status().as_u16()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    Log,
    Sendgrid(MailConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub queue_capacity: usize,
    // how long shutdown waits for queued messages before abandoning them
    pub drain_timeout_ms: u64,
    pub sink: SinkConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            drain_timeout_ms: 5000,
            sink: SinkConfig::Log,
        }
    }
}

impl NotificationConfig {
    pub fn build_sink(&self) -> Result<Arc<dyn NotificationSink>, NotifyError> {
        Ok(match &self.sink {
            SinkConfig::Log => Arc::new(LogSink),
            SinkConfig::Sendgrid(mail) => Arc::new(MailSink::new(mail.clone())?),
        })
    }
}

/// Handle to the background notification task.
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
    handle: JoinHandle<()>,
    drain_timeout: Duration,
}

impl NotificationDispatcher {
    // Must be called from within a tokio runtime
    pub fn spawn(sink: Arc<dyn NotificationSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if let Err(e) = sink.send(&notification.subject, &notification.body).await {
                    warn!(
                        subject = %notification.subject,
                        error = %e,
                        "failed to deliver notification"
                    );
                }
            }
        });

        Self {
            tx,
            handle,
            drain_timeout: Duration::from_millis(5000),
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotifyError> {
        Ok(Self::spawn(config.build_sink()?, config.queue_capacity)
            .with_drain_timeout(Duration::from_millis(config.drain_timeout_ms)))
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Queues a notification without waiting. Returns false if it had to be dropped.
    pub fn notify(&self, notification: Notification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(n)) => {
                warn!(subject = %n.subject, "notification queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(n)) => {
                warn!(subject = %n.subject, "notification dispatcher stopped, dropping message");
                false
            }
        }
    }

    // Stops accepting messages and waits, at most drain_timeout, for the queued ones
    pub async fn shutdown(self) {
        let Self {
            tx,
            mut handle,
            drain_timeout,
        } = self;
        drop(tx);

        match tokio::time::timeout(drain_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "notification task ended abnormally"),
            Err(_) => {
                warn!(?drain_timeout, "notification drain timed out, dropping pending messages");
                handle.abort();
            }
        }
    }
}
