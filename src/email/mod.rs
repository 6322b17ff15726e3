use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::renewals::RenewalError;
use crate::shared::schema::renewal_deliveries;
use crate::shared::utils::DbPool;

#[derive(Debug, thiserror::Error)]
#[error("Dispatch failed: {0}")]
pub struct DispatchError(pub String);

#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send(
        &self,
        to: &str,
        cc: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// Immutable record of a dispatch attempt. Appended whether the send
/// succeeded or failed; never updated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = renewal_deliveries)]
pub struct DeliveryLogEntry {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub account_id: Uuid,
    pub sent_to: String,
    pub sent_cc: Vec<String>,
    pub subject: String,
    pub sender: String,
    pub recipient_contact_id: Option<Uuid>,
    pub status: String,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeliveryLog: Send + Sync {
    async fn append(&self, entry: DeliveryLogEntry) -> Result<(), RenewalError>;
    async fn recent(&self, limit: i64) -> Result<Vec<DeliveryLogEntry>, RenewalError>;
}

// ---------------------------------------------------------------------------
// SMTP dispatcher
// ---------------------------------------------------------------------------

pub struct SmtpDispatcher {
    config: SmtpConfig,
}

impl SmtpDispatcher {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport, DispatchError> {
        match (&self.config.user, &self.config.pass) {
            (Some(user), Some(pass)) => {
                let creds = Credentials::new(user.clone(), pass.clone());
                Ok(SmtpTransport::relay(&self.config.host)
                    .map_err(|e| DispatchError(format!("SMTP relay error: {e}")))?
                    .credentials(creds)
                    .build())
            }
            _ => Ok(SmtpTransport::builder_dangerous(&self.config.host).build()),
        }
    }
}

#[async_trait]
impl EmailDispatcher for SmtpDispatcher {
    async fn send(
        &self,
        to: &str,
        cc: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), DispatchError> {
        let mut builder = Message::builder()
            .from(
                self.config
                    .from
                    .parse()
                    .map_err(|e| DispatchError(format!("Invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| DispatchError(format!("Invalid to address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);

        for addr in cc {
            builder = builder.cc(addr
                .parse()
                .map_err(|e| DispatchError(format!("Invalid cc address: {e}")))?);
        }

        let email = builder
            .body(body.to_string())
            .map_err(|e| DispatchError(format!("Failed to build email: {e}")))?;

        let mailer = self.transport()?;
        mailer
            .send(&email)
            .map_err(|e| DispatchError(format!("Failed to send email: {e}")))?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Postgres delivery log
// ---------------------------------------------------------------------------

pub struct PgDeliveryLog {
    conn: DbPool,
}

impl PgDeliveryLog {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DeliveryLog for PgDeliveryLog {
    async fn append(&self, entry: DeliveryLogEntry) -> Result<(), RenewalError> {
        let mut conn = self
            .conn
            .get()
            .map_err(|e| RenewalError::Database(format!("Pool error: {e}")))?;

        diesel::insert_into(renewal_deliveries::table)
            .values(&entry)
            .execute(&mut conn)
            .map_err(|e| RenewalError::Database(e.to_string()))?;

        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<DeliveryLogEntry>, RenewalError> {
        let mut conn = self
            .conn
            .get()
            .map_err(|e| RenewalError::Database(format!("Pool error: {e}")))?;

        renewal_deliveries::table
            .order(renewal_deliveries::sent_at.desc())
            .limit(limit)
            .load(&mut conn)
            .map_err(|e| RenewalError::Database(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// In-memory implementations for tests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct MemoryDispatcher {
    pub sent: Arc<RwLock<Vec<SentMail>>>,
    pub fail_sends: Arc<RwLock<bool>>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.fail_sends.write().await = failing;
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.read().await.len()
    }
}

#[async_trait]
impl EmailDispatcher for MemoryDispatcher {
    async fn send(
        &self,
        to: &str,
        cc: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), DispatchError> {
        if *self.fail_sends.read().await {
            return Err(DispatchError("SMTP unavailable".to_string()));
        }
        let mut sent = self.sent.write().await;
        sent.push(SentMail {
            to: to.to_string(),
            cc: cc.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDeliveryLog {
    pub entries: Arc<RwLock<Vec<DeliveryLogEntry>>>,
}

impl MemoryDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryLog for MemoryDeliveryLog {
    async fn append(&self, entry: DeliveryLogEntry) -> Result<(), RenewalError> {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<DeliveryLogEntry>, RenewalError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().take(limit as usize).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_without_credentials_is_unauthenticated() {
        let dispatcher = SmtpDispatcher::new(SmtpConfig {
            host: "localhost".to_string(),
            user: None,
            pass: None,
            from: "renewals@example.com".to_string(),
        });
        assert!(dispatcher.transport().is_ok());
    }

    #[tokio::test]
    async fn test_memory_dispatcher_failure_toggle() {
        let dispatcher = MemoryDispatcher::new();
        dispatcher.set_failing(true).await;
        let err = dispatcher.send("a@b.c", &[], "s", "b").await;
        assert!(err.is_err());
        assert_eq!(dispatcher.sent_count().await, 0);

        dispatcher.set_failing(false).await;
        dispatcher.send("a@b.c", &[], "s", "b").await.unwrap();
        assert_eq!(dispatcher.sent_count().await, 1);
    }
}
