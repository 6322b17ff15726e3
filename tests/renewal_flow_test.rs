//! End-to-end renewal cycle over the in-memory collaborators: the scheduler
//! drafts an invoice and arms the guard, a technician confirms the renewal,
//! and the next scheduler pass finds nothing left to do.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use mspserver::assets::store::{AssetStore, MemoryAssetStore, NewAsset};
use mspserver::assets::AssetType;
use mspserver::billing::{
    test_product, InvoiceDrafter, MemoryCatalog, MemoryInvoiceDrafter, ProductCatalog,
};
use mspserver::email::{MemoryDeliveryLog, MemoryDispatcher};
use mspserver::renewals::notification::{RenewalNotificationRequest, TEST_MODE_ADDRESS};
use mspserver::renewals::orchestrator::RenewalOrchestrator;
use mspserver::renewals::scheduler::run_auto_invoice_pass;

struct Harness {
    store: Arc<MemoryAssetStore>,
    store_dyn: Arc<dyn AssetStore>,
    catalog: Arc<dyn ProductCatalog>,
    drafter_impl: Arc<MemoryInvoiceDrafter>,
    drafter: Arc<dyn InvoiceDrafter>,
    dispatcher: Arc<MemoryDispatcher>,
    deliveries: Arc<MemoryDeliveryLog>,
    orchestrator: RenewalOrchestrator,
    product_id: Uuid,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryAssetStore::new());
    let store_dyn: Arc<dyn AssetStore> = store.clone();

    let memory_catalog = Arc::new(MemoryCatalog::new());
    let product = test_product(250);
    let product_id = product.id;
    memory_catalog.put(product).await;
    let catalog: Arc<dyn ProductCatalog> = memory_catalog;

    let drafter_impl = Arc::new(MemoryInvoiceDrafter::new());
    let drafter: Arc<dyn InvoiceDrafter> = drafter_impl.clone();

    let dispatcher = Arc::new(MemoryDispatcher::new());
    let deliveries = Arc::new(MemoryDeliveryLog::new());
    let orchestrator = RenewalOrchestrator::new(
        store_dyn.clone(),
        dispatcher.clone(),
        deliveries.clone(),
        "renewals@msp.example".to_string(),
    );

    Harness {
        store,
        store_dyn,
        catalog,
        drafter_impl,
        drafter,
        dispatcher,
        deliveries,
        orchestrator,
        product_id,
    }
}

#[tokio::test]
async fn full_renewal_cycle() {
    let h = harness().await;

    // A domain inside the auto-invoice horizon, opted in and product-linked.
    let asset = h
        .store
        .insert(NewAsset {
            account_id: Uuid::new_v4(),
            asset_type: AssetType::Domain,
            name: "acme.com".to_string(),
            vendor: Some("Namecheap".to_string()),
            serial_number: None,
            ip_address: None,
            notes: None,
            specs: None,
            expires_at: Some(Utc::now() + Duration::days(12)),
            linked_product_id: Some(h.product_id),
            auto_invoice: true,
        })
        .await
        .unwrap();
    assert_eq!(asset.status, "expiring");

    // Scheduler pass one drafts the renewal invoice and arms the guard.
    let report = run_auto_invoice_pass(&h.store_dyn, &h.catalog, &h.drafter)
        .await
        .unwrap();
    assert_eq!(report.drafted.len(), 1);
    let invoice_id = report.drafted[0].invoice_id;

    let armed = h.store.get(asset.id).await.unwrap();
    assert_eq!(armed.pending_renewal_invoice_id, Some(invoice_id));

    let (_, account_id, line_items) = h.drafter_impl.drafted.read().await[0].clone();
    assert_eq!(account_id, asset.account_id);
    assert_eq!(line_items[0].description, "acme.com renewal");
    assert_eq!(line_items[0].quantity, 1);

    // Another pass before anyone confirms drafts nothing.
    let repeat = run_auto_invoice_pass(&h.store_dyn, &h.catalog, &h.drafter)
        .await
        .unwrap();
    assert_eq!(repeat.scanned, 0);
    assert_eq!(h.drafter_impl.draft_count().await, 1);

    // A technician confirms the renewal with a test-mode notification.
    let new_expiry = Utc::now() + Duration::days(365);
    let outcome = h
        .orchestrator
        .confirm_renewal(
            asset.id,
            new_expiry,
            Some(RenewalNotificationRequest {
                recipient_contact_id: None,
                to_email: "client@acme.example".to_string(),
                cc_emails: vec!["ops@acme.example".to_string()],
                subject: "acme.com Has Been Renewed".to_string(),
                message: None,
                test_mode: true,
            }),
        )
        .await
        .unwrap();

    assert_eq!(outcome.asset.expires_at, Some(new_expiry));
    assert!(outcome.asset.pending_renewal_invoice_id.is_none());
    assert_eq!(outcome.asset.status, "active");

    // Test mode rerouted the mail and the log shows what actually went out.
    let sent = h.dispatcher.sent.read().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, TEST_MODE_ADDRESS);
    assert!(sent[0].cc.is_empty());
    assert!(sent[0].subject.starts_with("[TEST] "));
    drop(sent);

    let entries = h.deliveries.entries.read().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sent_to, TEST_MODE_ADDRESS);
    assert_eq!(entries[0].status, "sent");
    drop(entries);

    // With the guard cleared and the expiry a year out, the next scheduler
    // pass has nothing to draft.
    let after = run_auto_invoice_pass(&h.store_dyn, &h.catalog, &h.drafter)
        .await
        .unwrap();
    assert_eq!(after.scanned, 0);
    assert_eq!(after.drafted.len(), 0);
    assert_eq!(h.drafter_impl.draft_count().await, 1);
}

#[tokio::test]
async fn expiring_listing_reflects_the_cycle() {
    let h = harness().await;

    let asset = h
        .store
        .insert(NewAsset {
            account_id: Uuid::new_v4(),
            asset_type: AssetType::License,
            name: "av seats".to_string(),
            vendor: None,
            serial_number: None,
            ip_address: None,
            notes: None,
            specs: None,
            expires_at: Some(Utc::now() + Duration::days(8)),
            linked_product_id: None,
            auto_invoice: false,
        })
        .await
        .unwrap();

    let listing = h.store.list_expiring(30, None).await.unwrap();
    assert_eq!(listing.total, 1);
    assert_eq!(listing.expiring_count, 1);
    assert_eq!(listing.assets[0].asset.id, asset.id);
    assert!(!listing.assets[0].is_expired);

    h.orchestrator
        .confirm_renewal(asset.id, Utc::now() + Duration::days(365), None)
        .await
        .unwrap();

    // Renewed a year out, the asset drops off the default window.
    let listing = h.store.list_expiring(30, None).await.unwrap();
    assert_eq!(listing.total, 0);
}
