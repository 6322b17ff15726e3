use std::sync::Arc;

use crate::assets::store::{AssetStore, PgAssetStore};
use crate::billing::{InvoiceDrafter, PgCatalog, PgInvoiceDrafter, ProductCatalog};
use crate::config::AppConfig;
use crate::directory::{Directory, PgDirectory};
use crate::email::{DeliveryLog, EmailDispatcher, PgDeliveryLog, SmtpDispatcher};
use crate::renewals::orchestrator::RenewalOrchestrator;
use crate::shared::utils::DbPool;
use crate::tickets::{PgTicketing, RenewalTicketIssuer, Ticketing};

#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub assets: Arc<dyn AssetStore>,
    pub directory: Arc<dyn Directory>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub invoices: Arc<dyn InvoiceDrafter>,
    pub dispatcher: Arc<dyn EmailDispatcher>,
    pub deliveries: Arc<dyn DeliveryLog>,
    pub ticketing: Arc<dyn Ticketing>,
    pub orchestrator: Arc<RenewalOrchestrator>,
    pub ticket_issuer: Arc<RenewalTicketIssuer>,
}

impl AppState {
    /// Wires the Postgres/SMTP-backed collaborators behind the trait seams.
    pub fn production(conn: DbPool, config: AppConfig) -> Self {
        let assets: Arc<dyn AssetStore> = Arc::new(PgAssetStore::new(conn.clone()));
        let directory: Arc<dyn Directory> = Arc::new(PgDirectory::new(conn.clone()));
        let catalog: Arc<dyn ProductCatalog> = Arc::new(PgCatalog::new(conn.clone()));
        let invoices: Arc<dyn InvoiceDrafter> = Arc::new(PgInvoiceDrafter::new(conn.clone()));
        let dispatcher: Arc<dyn EmailDispatcher> =
            Arc::new(SmtpDispatcher::new(config.smtp.clone()));
        let deliveries: Arc<dyn DeliveryLog> = Arc::new(PgDeliveryLog::new(conn.clone()));
        let ticketing: Arc<dyn Ticketing> = Arc::new(PgTicketing::new(conn.clone()));

        let orchestrator = Arc::new(RenewalOrchestrator::new(
            Arc::clone(&assets),
            Arc::clone(&dispatcher),
            Arc::clone(&deliveries),
            config.smtp.from.clone(),
        ));
        let ticket_issuer = Arc::new(RenewalTicketIssuer::new(
            Arc::clone(&assets),
            Arc::clone(&ticketing),
        ));

        Self {
            conn,
            config,
            assets,
            directory,
            catalog,
            invoices,
            dispatcher,
            deliveries,
            ticketing,
            orchestrator,
            ticket_issuer,
        }
    }
}
