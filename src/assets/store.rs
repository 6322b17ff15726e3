use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::assets::lifecycle::{classify, ExpiryTier};
use crate::assets::{Asset, AssetSpecs, AssetStatus, AssetType};
use crate::shared::schema::client_assets;
use crate::shared::utils::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(Uuid),
    #[error("Asset {0} was modified by another writer")]
    Conflict(Uuid),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl From<diesel::result::Error> for AssetError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Database(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewAsset {
    pub account_id: Uuid,
    pub asset_type: AssetType,
    pub name: String,
    pub vendor: Option<String>,
    pub serial_number: Option<String>,
    pub ip_address: Option<String>,
    pub notes: Option<String>,
    pub specs: Option<serde_json::Value>,
    pub expires_at: Option<DateTime<Utc>>,
    pub linked_product_id: Option<Uuid>,
    pub auto_invoice: bool,
}

impl NewAsset {
    /// Builds the full row, validating the spec tag against the declared
    /// type and deriving the initial status projection.
    pub fn materialize(self, now: DateTime<Utc>) -> Result<Asset, AssetError> {
        let specs = validate_specs(self.specs, self.asset_type)?;

        let mut asset = Asset {
            id: Uuid::new_v4(),
            account_id: self.account_id,
            asset_type: self.asset_type.as_str().to_string(),
            name: self.name,
            vendor: self.vendor,
            serial_number: self.serial_number,
            ip_address: self.ip_address,
            notes: self.notes,
            specs,
            status: AssetStatus::Active.as_str().to_string(),
            expires_at: self.expires_at,
            linked_product_id: self.linked_product_id,
            auto_invoice: self.auto_invoice,
            pending_renewal_invoice_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        asset.refresh_status(now);
        Ok(asset)
    }
}

fn validate_specs(
    specs: Option<serde_json::Value>,
    kind: AssetType,
) -> Result<serde_json::Value, AssetError> {
    let typed = match specs {
        Some(value) => serde_json::from_value::<AssetSpecs>(value)
            .map_err(|e| AssetError::Validation(format!("Invalid specs: {e}")))?,
        None => AssetSpecs::empty_for(kind),
    };
    if typed.kind() != kind {
        return Err(AssetError::Validation(format!(
            "Spec schema is for {} but asset type is {}",
            typed.kind().as_str(),
            kind.as_str()
        )));
    }
    serde_json::to_value(&typed).map_err(|e| AssetError::Database(e.to_string()))
}

/// Partial update. Outer `Option` is "touch this column at all"; the inner
/// one carries the new (possibly null) value for nullable columns.
#[derive(Debug, Clone, Default)]
pub struct AssetPatch {
    pub name: Option<String>,
    pub vendor: Option<Option<String>>,
    pub serial_number: Option<Option<String>>,
    pub ip_address: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub specs: Option<serde_json::Value>,
    pub status: Option<AssetStatus>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub linked_product_id: Option<Option<Uuid>>,
    pub auto_invoice: Option<bool>,
    pub pending_renewal_invoice_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiringAssetView {
    #[serde(flatten)]
    pub asset: Asset,
    pub days_until_expiry: i64,
    pub tier: Option<ExpiryTier>,
    pub is_expired: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiringAssets {
    pub assets: Vec<ExpiringAssetView>,
    pub expiring_count: i64,
    pub expired_count: i64,
    pub total: i64,
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn insert(&self, asset: NewAsset) -> Result<Asset, AssetError>;

    async fn get(&self, id: Uuid) -> Result<Asset, AssetError>;

    /// Partial update under the optimistic-concurrency guard. A stale
    /// `expected_version` loses with `AssetError::Conflict` instead of
    /// clobbering the other writer's change.
    async fn update(
        &self,
        id: Uuid,
        expected_version: i32,
        patch: AssetPatch,
    ) -> Result<Asset, AssetError>;

    /// Lifecycle assets whose expiry falls within `within_days` of now,
    /// expired ones included, most urgent first (ties broken by name).
    async fn list_expiring(
        &self,
        within_days: i64,
        account_filter: Option<Uuid>,
    ) -> Result<ExpiringAssets, AssetError>;

    /// Assets eligible for an automatic renewal invoice draft: opted in,
    /// linked to a product, no pending invoice, and within the horizon.
    async fn list_auto_invoice_candidates(
        &self,
        horizon_days: i64,
    ) -> Result<Vec<Asset>, AssetError>;

    async fn list_for_account(&self, account_id: Option<Uuid>) -> Result<Vec<Asset>, AssetError>;
}

fn apply_patch(asset: &mut Asset, patch: AssetPatch, now: DateTime<Utc>) -> Result<(), AssetError> {
    if let Some(specs) = patch.specs {
        let kind = asset.kind().ok_or_else(|| {
            AssetError::Validation(format!("Unknown asset type: {}", asset.asset_type))
        })?;
        asset.specs = validate_specs(Some(specs), kind)?;
    }
    if let Some(name) = patch.name {
        asset.name = name;
    }
    if let Some(vendor) = patch.vendor {
        asset.vendor = vendor;
    }
    if let Some(serial_number) = patch.serial_number {
        asset.serial_number = serial_number;
    }
    if let Some(ip_address) = patch.ip_address {
        asset.ip_address = ip_address;
    }
    if let Some(notes) = patch.notes {
        asset.notes = notes;
    }
    if let Some(expires_at) = patch.expires_at {
        asset.expires_at = expires_at;
    }
    if let Some(linked_product_id) = patch.linked_product_id {
        asset.linked_product_id = linked_product_id;
    }
    if let Some(auto_invoice) = patch.auto_invoice {
        asset.auto_invoice = auto_invoice;
    }
    if let Some(pending) = patch.pending_renewal_invoice_id {
        asset.pending_renewal_invoice_id = pending;
    }

    match patch.status {
        Some(status) => asset.status = status.as_str().to_string(),
        // Leaving decommissioned is an explicit act; otherwise the
        // projection follows the new expiry.
        None if asset.stored_status() != AssetStatus::Decommissioned => {
            asset.refresh_status(now);
        }
        None => {}
    }

    asset.version += 1;
    asset.updated_at = now;
    Ok(())
}

fn build_expiring_listing(
    mut assets: Vec<Asset>,
    within_days: i64,
    now: DateTime<Utc>,
) -> ExpiringAssets {
    let mut views: Vec<ExpiringAssetView> = Vec::new();
    for asset in assets.iter_mut() {
        let c = classify(asset, now);
        let Some(days) = c.days_until_expiry else {
            continue;
        };
        if c.status == AssetStatus::Decommissioned || days > within_days {
            continue;
        }
        asset.status = c.status.as_str().to_string();
        views.push(ExpiringAssetView {
            asset: asset.clone(),
            days_until_expiry: days,
            tier: c.tier,
            is_expired: c.is_expired,
        });
    }

    views.sort_by(|a, b| {
        a.days_until_expiry
            .cmp(&b.days_until_expiry)
            .then_with(|| a.asset.name.cmp(&b.asset.name))
    });

    let expired_count = views.iter().filter(|v| v.is_expired).count() as i64;
    let expiring_count = views.iter().filter(|v| !v.is_expired).count() as i64;
    let total = views.len() as i64;

    ExpiringAssets {
        assets: views,
        expiring_count,
        expired_count,
        total,
    }
}

fn auto_invoice_eligible(asset: &Asset, horizon_days: i64, now: DateTime<Utc>) -> bool {
    if !asset.auto_invoice
        || asset.linked_product_id.is_none()
        || asset.pending_renewal_invoice_id.is_some()
    {
        return false;
    }
    let c = classify(asset, now);
    if c.status == AssetStatus::Decommissioned {
        return false;
    }
    c.days_until_expiry.is_some_and(|d| d <= horizon_days)
}

// ---------------------------------------------------------------------------
// Postgres-backed store
// ---------------------------------------------------------------------------

pub struct PgAssetStore {
    conn: DbPool,
}

impl PgAssetStore {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }

    fn pooled(&self) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>, AssetError> {
        self.conn
            .get()
            .map_err(|e| AssetError::Database(format!("Pool error: {e}")))
    }
}

#[async_trait]
impl AssetStore for PgAssetStore {
    async fn insert(&self, asset: NewAsset) -> Result<Asset, AssetError> {
        let mut conn = self.pooled()?;
        let row = asset.materialize(Utc::now())?;

        diesel::insert_into(client_assets::table)
            .values(&row)
            .execute(&mut conn)?;

        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Asset, AssetError> {
        let mut conn = self.pooled()?;
        let mut asset: Asset = client_assets::table
            .filter(client_assets::id.eq(id))
            .first(&mut conn)
            .optional()?
            .ok_or(AssetError::NotFound(id))?;
        asset.refresh_status(Utc::now());
        Ok(asset)
    }

    async fn update(
        &self,
        id: Uuid,
        expected_version: i32,
        patch: AssetPatch,
    ) -> Result<Asset, AssetError> {
        let mut conn = self.pooled()?;
        let now = Utc::now();

        conn.transaction::<Asset, AssetError, _>(|conn| {
            let mut asset: Asset = client_assets::table
                .filter(client_assets::id.eq(id))
                .for_update()
                .first(conn)
                .optional()?
                .ok_or(AssetError::NotFound(id))?;

            if asset.version != expected_version {
                return Err(AssetError::Conflict(id));
            }

            apply_patch(&mut asset, patch, now)?;

            // The version filter keeps a racing writer that slipped past the
            // row lock from being silently overwritten.
            let updated = diesel::update(
                client_assets::table
                    .filter(client_assets::id.eq(id))
                    .filter(client_assets::version.eq(expected_version)),
            )
            .set(&asset)
            .execute(conn)?;

            if updated == 0 {
                return Err(AssetError::Conflict(id));
            }

            Ok(asset)
        })
    }

    async fn list_expiring(
        &self,
        within_days: i64,
        account_filter: Option<Uuid>,
    ) -> Result<ExpiringAssets, AssetError> {
        let mut conn = self.pooled()?;
        let now = Utc::now();
        let cutoff = now + Duration::days(within_days);

        let mut q = client_assets::table
            .filter(client_assets::expires_at.is_not_null())
            .filter(client_assets::expires_at.le(cutoff))
            .into_boxed();

        if let Some(account_id) = account_filter {
            q = q.filter(client_assets::account_id.eq(account_id));
        }

        let assets: Vec<Asset> = q.load(&mut conn)?;
        Ok(build_expiring_listing(assets, within_days, now))
    }

    async fn list_auto_invoice_candidates(
        &self,
        horizon_days: i64,
    ) -> Result<Vec<Asset>, AssetError> {
        let mut conn = self.pooled()?;
        let now = Utc::now();
        let cutoff = now + Duration::days(horizon_days);

        let assets: Vec<Asset> = client_assets::table
            .filter(client_assets::auto_invoice.eq(true))
            .filter(client_assets::linked_product_id.is_not_null())
            .filter(client_assets::pending_renewal_invoice_id.is_null())
            .filter(client_assets::expires_at.is_not_null())
            .filter(client_assets::expires_at.le(cutoff))
            .load(&mut conn)?;

        Ok(assets
            .into_iter()
            .filter(|a| auto_invoice_eligible(a, horizon_days, now))
            .collect())
    }

    async fn list_for_account(&self, account_id: Option<Uuid>) -> Result<Vec<Asset>, AssetError> {
        let mut conn = self.pooled()?;
        let now = Utc::now();

        let mut q = client_assets::table
            .order(client_assets::name.asc())
            .into_boxed();
        if let Some(account_id) = account_id {
            q = q.filter(client_assets::account_id.eq(account_id));
        }

        let mut assets: Vec<Asset> = q.load(&mut conn)?;
        for asset in assets.iter_mut() {
            asset.refresh_status(now);
        }
        Ok(assets)
    }
}

// ---------------------------------------------------------------------------
// In-memory store (tests and demo wiring)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryAssetStore {
    assets: Arc<RwLock<HashMap<Uuid, Asset>>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn insert(&self, asset: NewAsset) -> Result<Asset, AssetError> {
        let row = asset.materialize(Utc::now())?;
        let mut assets = self.assets.write().await;
        assets.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Asset, AssetError> {
        let assets = self.assets.read().await;
        let mut asset = assets.get(&id).cloned().ok_or(AssetError::NotFound(id))?;
        asset.refresh_status(Utc::now());
        Ok(asset)
    }

    async fn update(
        &self,
        id: Uuid,
        expected_version: i32,
        patch: AssetPatch,
    ) -> Result<Asset, AssetError> {
        let mut assets = self.assets.write().await;
        let asset = assets.get_mut(&id).ok_or(AssetError::NotFound(id))?;

        if asset.version != expected_version {
            return Err(AssetError::Conflict(id));
        }

        apply_patch(asset, patch, Utc::now())?;
        Ok(asset.clone())
    }

    async fn list_expiring(
        &self,
        within_days: i64,
        account_filter: Option<Uuid>,
    ) -> Result<ExpiringAssets, AssetError> {
        let assets = self.assets.read().await;
        let rows: Vec<Asset> = assets
            .values()
            .filter(|a| account_filter.map_or(true, |acc| a.account_id == acc))
            .cloned()
            .collect();
        Ok(build_expiring_listing(rows, within_days, Utc::now()))
    }

    async fn list_auto_invoice_candidates(
        &self,
        horizon_days: i64,
    ) -> Result<Vec<Asset>, AssetError> {
        let now = Utc::now();
        let assets = self.assets.read().await;
        Ok(assets
            .values()
            .filter(|a| auto_invoice_eligible(a, horizon_days, now))
            .cloned()
            .collect())
    }

    async fn list_for_account(&self, account_id: Option<Uuid>) -> Result<Vec<Asset>, AssetError> {
        let now = Utc::now();
        let assets = self.assets.read().await;
        let mut rows: Vec<Asset> = assets
            .values()
            .filter(|a| account_id.map_or(true, |acc| a.account_id == acc))
            .cloned()
            .collect();
        for asset in rows.iter_mut() {
            asset.refresh_status(now);
        }
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}
