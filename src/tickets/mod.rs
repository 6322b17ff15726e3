use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::assets::lifecycle::classify;
use crate::assets::store::AssetStore;
use crate::assets::AssetStatus;
use crate::renewals::RenewalError;
use crate::shared::schema::support_tickets;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = support_tickets)]
pub struct SupportTicket {
    pub id: Uuid,
    pub account_id: Uuid,
    pub asset_id: Option<Uuid>,
    pub ticket_number: String,
    pub subject: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reference handed back to callers once a ticket exists.
#[derive(Debug, Clone, Serialize)]
pub struct TicketRef {
    pub ticket_id: Uuid,
    pub ticket_number: String,
    pub subject: String,
}

#[async_trait]
pub trait Ticketing: Send + Sync {
    async fn create_ticket(
        &self,
        account_id: Uuid,
        subject: String,
        source: String,
        asset_id: Option<Uuid>,
    ) -> Result<TicketRef, RenewalError>;
}

pub struct PgTicketing {
    conn: DbPool,
}

impl PgTicketing {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }
}

fn generate_ticket_number(conn: &mut PgConnection) -> String {
    let count: i64 = support_tickets::table
        .count()
        .get_result(conn)
        .unwrap_or(0);
    format!("TKT-{:06}", count + 1)
}

#[async_trait]
impl Ticketing for PgTicketing {
    async fn create_ticket(
        &self,
        account_id: Uuid,
        subject: String,
        source: String,
        asset_id: Option<Uuid>,
    ) -> Result<TicketRef, RenewalError> {
        let mut conn = self
            .conn
            .get()
            .map_err(|e| RenewalError::Database(format!("Pool error: {e}")))?;

        let now = Utc::now();
        let ticket = SupportTicket {
            id: Uuid::new_v4(),
            account_id,
            asset_id,
            ticket_number: generate_ticket_number(&mut conn),
            subject,
            description: None,
            status: "open".to_string(),
            priority: "medium".to_string(),
            source,
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(support_tickets::table)
            .values(&ticket)
            .execute(&mut conn)
            .map_err(|e| RenewalError::Database(e.to_string()))?;

        Ok(TicketRef {
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number,
            subject: ticket.subject,
        })
    }
}

#[derive(Default)]
pub struct MemoryTicketing {
    pub tickets: Arc<RwLock<Vec<SupportTicket>>>,
}

impl MemoryTicketing {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.tickets.read().await.len()
    }
}

#[async_trait]
impl Ticketing for MemoryTicketing {
    async fn create_ticket(
        &self,
        account_id: Uuid,
        subject: String,
        source: String,
        asset_id: Option<Uuid>,
    ) -> Result<TicketRef, RenewalError> {
        let mut tickets = self.tickets.write().await;
        let now = Utc::now();
        let ticket = SupportTicket {
            id: Uuid::new_v4(),
            account_id,
            asset_id,
            ticket_number: format!("TKT-{:06}", tickets.len() + 1),
            subject,
            description: None,
            status: "open".to_string(),
            priority: "medium".to_string(),
            source,
            created_at: now,
            updated_at: now,
        };
        let ticket_ref = TicketRef {
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number.clone(),
            subject: ticket.subject.clone(),
        };
        tickets.push(ticket);
        Ok(ticket_ref)
    }
}

/// Issues the support ticket that represents renewal work for an asset that
/// is expiring or already expired. Purely informational: it never touches
/// `expires_at` or the pending-invoice guard.
pub struct RenewalTicketIssuer {
    store: Arc<dyn AssetStore>,
    ticketing: Arc<dyn Ticketing>,
}

impl RenewalTicketIssuer {
    pub fn new(store: Arc<dyn AssetStore>, ticketing: Arc<dyn Ticketing>) -> Self {
        Self { store, ticketing }
    }

    pub async fn create_renewal_ticket(&self, asset_id: Uuid) -> Result<TicketRef, RenewalError> {
        let asset = self.store.get(asset_id).await?;

        let classification = classify(&asset, Utc::now());
        match classification.status {
            AssetStatus::Expiring | AssetStatus::Expired => {}
            other => {
                return Err(RenewalError::PreconditionFailed(format!(
                    "Asset {} is {}, not expiring or expired",
                    asset.name,
                    other.as_str()
                )));
            }
        }

        self.ticketing
            .create_ticket(
                asset.account_id,
                format!("Renew {}", asset.name),
                "renewal".to_string(),
                Some(asset.id),
            )
            .await
    }
}

#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub account_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn create_renewal_ticket(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<Uuid>,
) -> Result<Json<TicketRef>, RenewalError> {
    let ticket = state.ticket_issuer.create_renewal_ticket(asset_id).await?;
    log::info!(
        "Renewal ticket {} opened for asset {asset_id}",
        ticket.ticket_number
    );
    Ok(Json(ticket))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTicketsQuery>,
) -> Result<Json<Vec<SupportTicket>>, RenewalError> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| RenewalError::Database(format!("Pool error: {e}")))?;

    let mut q = support_tickets::table.into_boxed();
    if let Some(account_id) = query.account_id {
        q = q.filter(support_tickets::account_id.eq(account_id));
    }
    if let Some(status) = query.status {
        q = q.filter(support_tickets::status.eq(status));
    }

    let tickets: Vec<SupportTicket> = q
        .order(support_tickets::created_at.desc())
        .limit(query.limit.unwrap_or(50))
        .load(&mut conn)
        .map_err(|e| RenewalError::Database(e.to_string()))?;

    Ok(Json(tickets))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets))
        .route("/api/assets/:id/renewal-ticket", post(create_renewal_ticket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::store::{AssetStore, MemoryAssetStore, NewAsset};
    use crate::assets::AssetType;
    use chrono::Duration;

    async fn seed(store: &MemoryAssetStore, name: &str, expires_in: chrono::Duration) -> Uuid {
        store
            .insert(NewAsset {
                account_id: Uuid::new_v4(),
                asset_type: AssetType::Domain,
                name: name.to_string(),
                vendor: None,
                serial_number: None,
                ip_address: None,
                notes: None,
                specs: None,
                expires_at: Some(Utc::now() + expires_in),
                linked_product_id: None,
                auto_invoice: false,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_ticket_for_expiring_asset() {
        let store = Arc::new(MemoryAssetStore::new());
        let ticketing = Arc::new(MemoryTicketing::new());
        let issuer = RenewalTicketIssuer::new(store.clone(), ticketing.clone());

        let id = seed(&store, "example.com", Duration::days(10)).await;
        let ticket = issuer.create_renewal_ticket(id).await.unwrap();
        assert_eq!(ticket.subject, "Renew example.com");
        assert_eq!(ticketing.count().await, 1);

        // No lifecycle fields were touched.
        let asset = store.get(id).await.unwrap();
        assert!(asset.pending_renewal_invoice_id.is_none());
        assert_eq!(asset.version, 1);
    }

    #[tokio::test]
    async fn test_ticket_for_expired_asset() {
        let store = Arc::new(MemoryAssetStore::new());
        let ticketing = Arc::new(MemoryTicketing::new());
        let issuer = RenewalTicketIssuer::new(store.clone(), ticketing.clone());

        let id = seed(&store, "lapsed.net", Duration::days(-3)).await;
        assert!(issuer.create_renewal_ticket(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_active_asset_rejected_without_side_effects() {
        let store = Arc::new(MemoryAssetStore::new());
        let ticketing = Arc::new(MemoryTicketing::new());
        let issuer = RenewalTicketIssuer::new(store.clone(), ticketing.clone());

        let id = seed(&store, "healthy.org", Duration::days(120)).await;
        let err = issuer.create_renewal_ticket(id).await.unwrap_err();
        assert!(matches!(err, RenewalError::PreconditionFailed(_)));
        assert_eq!(ticketing.count().await, 0);
    }
}
