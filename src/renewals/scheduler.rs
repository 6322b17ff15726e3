use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::assets::store::{AssetError, AssetPatch, AssetStore};
use crate::billing::{InvoiceDrafter, InvoiceLineItem, ProductCatalog};
use crate::renewals::RenewalError;

/// Assets classified within this many days of expiry are eligible for an
/// automatic renewal-invoice draft.
pub const AUTO_INVOICE_HORIZON_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct DraftedInvoice {
    pub asset_id: Uuid,
    pub invoice_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoInvoiceFailure {
    pub asset_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoInvoiceReport {
    pub scanned: usize,
    pub drafted: Vec<DraftedInvoice>,
    pub skipped_conflicts: usize,
    pub failures: Vec<AutoInvoiceFailure>,
}

/// One scan of the store on behalf of the external scheduler: draft a
/// renewal invoice for every eligible asset and arm its guard.
///
/// `pending_renewal_invoice_id` being non-null is the sole duplicate-draft
/// protection: an asset already carrying a pending invoice never appears in
/// the candidate list, and a guard conflict on write-back (another writer
/// got there first) is skipped, not retried.
pub async fn run_auto_invoice_pass(
    store: &Arc<dyn AssetStore>,
    catalog: &Arc<dyn ProductCatalog>,
    drafter: &Arc<dyn InvoiceDrafter>,
) -> Result<AutoInvoiceReport, RenewalError> {
    let candidates = store
        .list_auto_invoice_candidates(AUTO_INVOICE_HORIZON_DAYS)
        .await?;

    let mut report = AutoInvoiceReport {
        scanned: candidates.len(),
        drafted: Vec::new(),
        skipped_conflicts: 0,
        failures: Vec::new(),
    };

    for asset in candidates {
        // Candidate filtering guarantees the link is present.
        let Some(product_id) = asset.linked_product_id else {
            continue;
        };

        let product = match catalog.get_product(product_id).await {
            Ok(product) => product,
            Err(e) => {
                warn!("Auto-invoice skipped for asset {}: {e}", asset.id);
                report.failures.push(AutoInvoiceFailure {
                    asset_id: asset.id,
                    error: e.to_string(),
                });
                continue;
            }
        };

        let line_items = vec![InvoiceLineItem {
            description: format!("{} renewal", asset.name),
            quantity: 1,
            unit_price: product.unit_price.clone(),
            amount: product.unit_price.clone(),
        }];

        let invoice_id = match drafter.draft_invoice(asset.account_id, line_items).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Invoice draft failed for asset {}: {e}", asset.id);
                report.failures.push(AutoInvoiceFailure {
                    asset_id: asset.id,
                    error: e.to_string(),
                });
                continue;
            }
        };

        let patch = AssetPatch {
            pending_renewal_invoice_id: Some(Some(invoice_id)),
            ..AssetPatch::default()
        };
        match store.update(asset.id, asset.version, patch).await {
            Ok(_) => {
                info!(
                    "Drafted renewal invoice {invoice_id} for asset {} ({})",
                    asset.name, asset.id
                );
                report.drafted.push(DraftedInvoice {
                    asset_id: asset.id,
                    invoice_id,
                });
            }
            Err(AssetError::Conflict(_)) => {
                // A human confirmed (or another pass armed the guard)
                // between scan and write-back; the draft stays unlinked and
                // the asset is left alone.
                warn!(
                    "Guard conflict writing invoice {invoice_id} back to asset {}; skipping",
                    asset.id
                );
                report.skipped_conflicts += 1;
            }
            Err(e) => {
                report.failures.push(AutoInvoiceFailure {
                    asset_id: asset.id,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}
