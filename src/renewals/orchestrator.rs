use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::assets::store::{AssetPatch, AssetStore};
use crate::assets::Asset;
use crate::email::{DeliveryLog, DeliveryLogEntry, DeliveryStatus, EmailDispatcher};
use crate::renewals::notification::{apply_test_mode_override, RenewalNotificationRequest};
use crate::renewals::RenewalError;

/// Outcome of the notification leg, reported separately from the renewal
/// itself: a dispatch failure never means the renewal failed.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub sent: bool,
    pub sent_to: String,
    pub subject: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenewalOutcome {
    pub asset: Asset,
    pub notification: Option<DispatchOutcome>,
}

/// Drives the per-asset renewal state machine: `pending_renewal_invoice_id`
/// null (no renewal pending) → non-null (invoice drafted for this cycle) →
/// null again once the renewal is confirmed.
pub struct RenewalOrchestrator {
    store: Arc<dyn AssetStore>,
    dispatcher: Arc<dyn EmailDispatcher>,
    deliveries: Arc<dyn DeliveryLog>,
    sender: String,
}

impl RenewalOrchestrator {
    pub fn new(
        store: Arc<dyn AssetStore>,
        dispatcher: Arc<dyn EmailDispatcher>,
        deliveries: Arc<dyn DeliveryLog>,
        sender: String,
    ) -> Self {
        Self {
            store,
            dispatcher,
            deliveries,
            sender,
        }
    }

    /// Confirms a renewal: sets the new expiry and clears the pending
    /// invoice in one guarded write, then optionally dispatches the client
    /// notification.
    ///
    /// Repeating the call with the same date is a state-wise no-op, but a
    /// requested notification goes out every time; dispatch is not
    /// deduplicated here.
    ///
    /// A past `new_expires_at` is accepted; only well-formedness is
    /// validated, upstream of this call.
    pub async fn confirm_renewal(
        &self,
        asset_id: Uuid,
        new_expires_at: DateTime<Utc>,
        notification: Option<RenewalNotificationRequest>,
    ) -> Result<RenewalOutcome, RenewalError> {
        let asset = self.store.get(asset_id).await?;

        let patch = AssetPatch {
            expires_at: Some(Some(new_expires_at)),
            pending_renewal_invoice_id: Some(None),
            ..AssetPatch::default()
        };
        let asset = self.store.update(asset.id, asset.version, patch).await?;
        info!(
            "Renewal confirmed for asset {} ({}), new expiry {new_expires_at}",
            asset.name, asset.id
        );

        let notification = match notification {
            Some(request) => Some(self.dispatch_notification(&asset, request).await?),
            None => None,
        };

        Ok(RenewalOutcome { asset, notification })
    }

    /// Applies the test-mode override at the last possible moment, sends,
    /// and appends a delivery log entry either way. The log records the
    /// payload that actually left the building, not what the caller
    /// composed.
    async fn dispatch_notification(
        &self,
        asset: &Asset,
        request: RenewalNotificationRequest,
    ) -> Result<DispatchOutcome, RenewalError> {
        let request = apply_test_mode_override(request);

        let body = request.message.clone().unwrap_or_else(|| {
            format!(
                "{} has been renewed. The new expiry date is {}.",
                asset.name,
                asset
                    .expires_at
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "unset".to_string())
            )
        });

        let send_result = self
            .dispatcher
            .send(&request.to_email, &request.cc_emails, &request.subject, &body)
            .await;

        let (status, error) = match &send_result {
            Ok(()) => (DeliveryStatus::Sent, None),
            Err(e) => {
                warn!(
                    "Renewal notification for asset {} failed to send: {e}",
                    asset.id
                );
                (DeliveryStatus::Failed, Some(e.to_string()))
            }
        };

        self.deliveries
            .append(DeliveryLogEntry {
                id: Uuid::new_v4(),
                asset_id: asset.id,
                account_id: asset.account_id,
                sent_to: request.to_email.clone(),
                sent_cc: request.cc_emails.clone(),
                subject: request.subject.clone(),
                sender: self.sender.clone(),
                recipient_contact_id: request.recipient_contact_id,
                status: status.as_str().to_string(),
                error: error.clone(),
                sent_at: Utc::now(),
            })
            .await?;

        Ok(DispatchOutcome {
            sent: send_result.is_ok(),
            sent_to: request.to_email,
            subject: request.subject,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::store::{MemoryAssetStore, NewAsset};
    use crate::assets::AssetType;
    use crate::email::{MemoryDeliveryLog, MemoryDispatcher};
    use crate::renewals::notification::TEST_MODE_ADDRESS;
    use chrono::Duration;

    struct Fixture {
        store: Arc<MemoryAssetStore>,
        dispatcher: Arc<MemoryDispatcher>,
        deliveries: Arc<MemoryDeliveryLog>,
        orchestrator: RenewalOrchestrator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryAssetStore::new());
        let dispatcher = Arc::new(MemoryDispatcher::new());
        let deliveries = Arc::new(MemoryDeliveryLog::new());
        let orchestrator = RenewalOrchestrator::new(
            store.clone(),
            dispatcher.clone(),
            deliveries.clone(),
            "renewals@msp.example".to_string(),
        );
        Fixture {
            store,
            dispatcher,
            deliveries,
            orchestrator,
        }
    }

    async fn seed_with_pending(fx: &Fixture) -> Asset {
        let asset = fx
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
                expires_at: Some(Utc::now() + Duration::days(25)),
                linked_product_id: Some(Uuid::new_v4()),
                auto_invoice: true,
            })
            .await
            .unwrap();

        fx.store
            .update(
                asset.id,
                asset.version,
                AssetPatch {
                    pending_renewal_invoice_id: Some(Some(Uuid::new_v4())),
                    ..AssetPatch::default()
                },
            )
            .await
            .unwrap()
    }

    fn request(test_mode: bool) -> RenewalNotificationRequest {
        RenewalNotificationRequest {
            recipient_contact_id: Some(Uuid::new_v4()),
            to_email: "client@acme.example".to_string(),
            cc_emails: vec!["ops@acme.example".to_string()],
            subject: "acme.com Has Been Renewed".to_string(),
            message: None,
            test_mode,
        }
    }

    #[tokio::test]
    async fn test_confirm_clears_pending_invoice() {
        let fx = fixture();
        let asset = seed_with_pending(&fx).await;
        assert!(asset.pending_renewal_invoice_id.is_some());

        let new_expiry = Utc::now() + Duration::days(365);
        let outcome = fx
            .orchestrator
            .confirm_renewal(asset.id, new_expiry, None)
            .await
            .unwrap();

        assert_eq!(outcome.asset.expires_at, Some(new_expiry));
        assert!(outcome.asset.pending_renewal_invoice_id.is_none());
        assert_eq!(outcome.asset.status, "active");
        assert!(outcome.notification.is_none());
    }

    #[tokio::test]
    async fn test_confirm_is_idempotent_state_wise_but_not_for_mail() {
        let fx = fixture();
        let asset = seed_with_pending(&fx).await;
        let new_expiry = Utc::now() + Duration::days(365);

        let first = fx
            .orchestrator
            .confirm_renewal(asset.id, new_expiry, Some(request(false)))
            .await
            .unwrap();
        let second = fx
            .orchestrator
            .confirm_renewal(asset.id, new_expiry, Some(request(false)))
            .await
            .unwrap();

        assert_eq!(first.asset.expires_at, second.asset.expires_at);
        assert!(second.asset.pending_renewal_invoice_id.is_none());
        // Two dispatches, two log rows.
        assert_eq!(fx.dispatcher.sent_count().await, 2);
        assert_eq!(fx.deliveries.entries.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_failure_does_not_roll_back_renewal() {
        let fx = fixture();
        let asset = seed_with_pending(&fx).await;
        fx.dispatcher.set_failing(true).await;

        let new_expiry = Utc::now() + Duration::days(365);
        let outcome = fx
            .orchestrator
            .confirm_renewal(asset.id, new_expiry, Some(request(false)))
            .await
            .unwrap();

        // The renewal committed.
        let stored = fx.store.get(asset.id).await.unwrap();
        assert_eq!(stored.expires_at, Some(new_expiry));
        assert!(stored.pending_renewal_invoice_id.is_none());

        // The failure is a warning on the outcome and a failed log row.
        let notification = outcome.notification.unwrap();
        assert!(!notification.sent);
        assert!(notification.error.is_some());
        let entries = fx.deliveries.entries.read().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, "failed");
        assert!(entries[0].error.is_some());
    }

    #[tokio::test]
    async fn test_test_mode_redirect_is_what_gets_logged() {
        let fx = fixture();
        let asset = seed_with_pending(&fx).await;

        let outcome = fx
            .orchestrator
            .confirm_renewal(asset.id, Utc::now() + Duration::days(365), Some(request(true)))
            .await
            .unwrap();

        let notification = outcome.notification.unwrap();
        assert_eq!(notification.sent_to, TEST_MODE_ADDRESS);
        assert!(notification.subject.starts_with("[TEST] "));

        let sent = fx.dispatcher.sent.read().await;
        assert_eq!(sent[0].to, TEST_MODE_ADDRESS);
        assert!(sent[0].cc.is_empty());

        let entries = fx.deliveries.entries.read().await;
        assert_eq!(entries[0].sent_to, TEST_MODE_ADDRESS);
        assert!(entries[0].sent_cc.is_empty());
        assert_eq!(entries[0].recipient_contact_id, None);
    }

    #[tokio::test]
    async fn test_past_date_is_accepted() {
        let fx = fixture();
        let asset = seed_with_pending(&fx).await;

        let past = Utc::now() - Duration::days(10);
        let outcome = fx
            .orchestrator
            .confirm_renewal(asset.id, past, None)
            .await
            .unwrap();

        assert_eq!(outcome.asset.expires_at, Some(past));
        assert_eq!(outcome.asset.status, "expired");
    }

    #[tokio::test]
    async fn test_unknown_asset_is_not_found() {
        let fx = fixture();
        let err = fx
            .orchestrator
            .confirm_renewal(Uuid::new_v4(), Utc::now(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RenewalError::NotFound(_)));
    }
}
