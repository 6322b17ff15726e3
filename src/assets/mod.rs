pub mod lifecycle;
pub mod store;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::renewals::RenewalError;
use crate::shared::schema::client_assets;
use crate::shared::state::AppState;

use lifecycle::classify;
use store::{AssetPatch, ExpiringAssets, NewAsset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Domain,
    WebHosting,
    EmailHosting,
    Saas,
    Software,
    License,
    SecuritySoftware,
    Hardware,
    NetworkGear,
    Phone,
}

impl AssetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::WebHosting => "web_hosting",
            Self::EmailHosting => "email_hosting",
            Self::Saas => "saas",
            Self::Software => "software",
            Self::License => "license",
            Self::SecuritySoftware => "security_software",
            Self::Hardware => "hardware",
            Self::NetworkGear => "network_gear",
            Self::Phone => "phone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "domain" => Some(Self::Domain),
            "web_hosting" => Some(Self::WebHosting),
            "email_hosting" => Some(Self::EmailHosting),
            "saas" => Some(Self::Saas),
            "software" => Some(Self::Software),
            "license" => Some(Self::License),
            "security_software" => Some(Self::SecuritySoftware),
            "hardware" => Some(Self::Hardware),
            "network_gear" => Some(Self::NetworkGear),
            "phone" => Some(Self::Phone),
            _ => None,
        }
    }

    /// Types for which expiry, renewal and billing linkage are meaningful.
    pub fn is_lifecycle_bearing(self) -> bool {
        !matches!(self, Self::Hardware | Self::NetworkGear | Self::Phone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Active,
    Expiring,
    Expired,
    Decommissioned,
}

impl AssetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expiring => "expiring",
            Self::Expired => "expired",
            Self::Decommissioned => "decommissioned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "expiring" => Some(Self::Expiring),
            "expired" => Some(Self::Expired),
            "decommissioned" => Some(Self::Decommissioned),
            _ => None,
        }
    }
}

/// Per-type spec fields, tagged by the owning asset type. The tag must match
/// the asset's `asset_type` column; a mismatch is rejected on write instead
/// of surfacing later as a lookup miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "asset_type", rename_all = "snake_case")]
pub enum AssetSpecs {
    Domain {
        #[serde(default)]
        registrar: Option<String>,
        #[serde(default)]
        dns_provider: Option<String>,
        #[serde(default)]
        privacy_protection: Option<bool>,
    },
    WebHosting {
        #[serde(default)]
        plan: Option<String>,
        #[serde(default)]
        disk_gb: Option<i32>,
        #[serde(default)]
        control_panel: Option<String>,
    },
    EmailHosting {
        #[serde(default)]
        plan: Option<String>,
        #[serde(default)]
        mailboxes: Option<i32>,
    },
    Saas {
        #[serde(default)]
        plan: Option<String>,
        #[serde(default)]
        seats: Option<i32>,
        #[serde(default)]
        admin_url: Option<String>,
    },
    Software {
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        install_count: Option<i32>,
    },
    License {
        #[serde(default)]
        license_key: Option<String>,
        #[serde(default)]
        seats: Option<i32>,
    },
    SecuritySoftware {
        #[serde(default)]
        product_line: Option<String>,
        #[serde(default)]
        endpoints: Option<i32>,
    },
    Hardware {
        #[serde(default)]
        cpu: Option<String>,
        #[serde(default)]
        ram_gb: Option<i32>,
        #[serde(default)]
        os: Option<String>,
    },
    NetworkGear {
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        ports: Option<i32>,
        #[serde(default)]
        firmware: Option<String>,
    },
    Phone {
        #[serde(default)]
        imei: Option<String>,
        #[serde(default)]
        carrier: Option<String>,
    },
}

impl AssetSpecs {
    pub fn kind(&self) -> AssetType {
        match self {
            Self::Domain { .. } => AssetType::Domain,
            Self::WebHosting { .. } => AssetType::WebHosting,
            Self::EmailHosting { .. } => AssetType::EmailHosting,
            Self::Saas { .. } => AssetType::Saas,
            Self::Software { .. } => AssetType::Software,
            Self::License { .. } => AssetType::License,
            Self::SecuritySoftware { .. } => AssetType::SecuritySoftware,
            Self::Hardware { .. } => AssetType::Hardware,
            Self::NetworkGear { .. } => AssetType::NetworkGear,
            Self::Phone { .. } => AssetType::Phone,
        }
    }

    /// Empty spec set for the given type, used when a caller supplies none.
    pub fn empty_for(kind: AssetType) -> Self {
        let value = serde_json::json!({ "asset_type": kind.as_str() });
        serde_json::from_value(value).expect("empty specs deserialize for every variant")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = client_assets)]
#[diesel(treat_none_as_null = true)]
pub struct Asset {
    pub id: Uuid,
    pub account_id: Uuid,
    pub asset_type: String,
    pub name: String,
    pub vendor: Option<String>,
    pub serial_number: Option<String>,
    pub ip_address: Option<String>,
    pub notes: Option<String>,
    pub specs: serde_json::Value,
    pub status: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub linked_product_id: Option<Uuid>,
    pub auto_invoice: bool,
    pub pending_renewal_invoice_id: Option<Uuid>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn kind(&self) -> Option<AssetType> {
        AssetType::parse(&self.asset_type)
    }

    pub fn is_lifecycle_bearing(&self) -> bool {
        self.kind().is_some_and(AssetType::is_lifecycle_bearing)
    }

    pub fn stored_status(&self) -> AssetStatus {
        AssetStatus::parse(&self.status).unwrap_or(AssetStatus::Active)
    }

    pub fn typed_specs(&self) -> Result<AssetSpecs, serde_json::Error> {
        serde_json::from_value(self.specs.clone())
    }

    /// Recomputes the cached status projection against `now`. Stored status
    /// is never trusted as truth for lifecycle-bearing assets; every read
    /// path calls this before handing the asset out.
    pub fn refresh_status(&mut self, now: DateTime<Utc>) {
        self.status = classify(self, now).status.as_str().to_string();
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAssetRequest {
    pub account_id: Uuid,
    pub asset_type: AssetType,
    pub name: String,
    pub vendor: Option<String>,
    pub serial_number: Option<String>,
    pub ip_address: Option<String>,
    pub notes: Option<String>,
    pub specs: Option<serde_json::Value>,
    pub expires_at: Option<String>,
    pub linked_product_id: Option<Uuid>,
    pub auto_invoice: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAssetRequest {
    /// Version token from the last read; a stale token is rejected.
    pub version: i32,
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub serial_number: Option<String>,
    pub ip_address: Option<String>,
    pub notes: Option<String>,
    pub specs: Option<serde_json::Value>,
    pub expires_at: Option<String>,
    pub linked_product_id: Option<Uuid>,
    pub auto_invoice: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DecommissionRequest {
    pub version: i32,
}

#[derive(Debug, Deserialize)]
pub struct ListAssetsQuery {
    pub account_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
    pub account_id: Option<Uuid>,
}

fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, RenewalError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| RenewalError::Validation(format!("Invalid expires_at date: {e}")))
}

pub async fn create_asset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAssetRequest>,
) -> Result<Json<Asset>, RenewalError> {
    let expires_at = req.expires_at.as_deref().map(parse_expiry).transpose()?;

    let asset = state
        .assets
        .insert(NewAsset {
            account_id: req.account_id,
            asset_type: req.asset_type,
            name: req.name,
            vendor: req.vendor,
            serial_number: req.serial_number,
            ip_address: req.ip_address,
            notes: req.notes,
            specs: req.specs,
            expires_at,
            linked_product_id: req.linked_product_id,
            auto_invoice: req.auto_invoice.unwrap_or(false),
        })
        .await?;

    Ok(Json(asset))
}

pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Asset>, RenewalError> {
    let asset = state.assets.get(id).await?;
    Ok(Json(asset))
}

pub async fn list_assets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAssetsQuery>,
) -> Result<Json<Vec<Asset>>, RenewalError> {
    let assets = state.assets.list_for_account(query.account_id).await?;
    Ok(Json(assets))
}

pub async fn update_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAssetRequest>,
) -> Result<Json<Asset>, RenewalError> {
    let expires_at = req.expires_at.as_deref().map(parse_expiry).transpose()?;

    // Changing expires_at here deliberately leaves any pending renewal
    // invoice in place; only a confirmed renewal clears the guard.
    let patch = AssetPatch {
        name: req.name,
        vendor: req.vendor.map(Some),
        serial_number: req.serial_number.map(Some),
        ip_address: req.ip_address.map(Some),
        notes: req.notes.map(Some),
        specs: req.specs,
        expires_at: expires_at.map(Some),
        linked_product_id: req.linked_product_id.map(Some),
        auto_invoice: req.auto_invoice,
        ..AssetPatch::default()
    };

    let asset = state.assets.update(id, req.version, patch).await?;
    Ok(Json(asset))
}

pub async fn decommission_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecommissionRequest>,
) -> Result<Json<Asset>, RenewalError> {
    let patch = AssetPatch {
        status: Some(AssetStatus::Decommissioned),
        ..AssetPatch::default()
    };
    let asset = state.assets.update(id, req.version, patch).await?;
    Ok(Json(asset))
}

pub async fn list_expiring_assets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExpiringQuery>,
) -> Result<Json<ExpiringAssets>, RenewalError> {
    let days = query.days.unwrap_or(lifecycle::WARNING_WINDOW_DAYS);
    if days < 0 {
        return Err(RenewalError::Validation(
            "days must be non-negative".to_string(),
        ));
    }
    let listing = state.assets.list_expiring(days, query.account_id).await?;
    Ok(Json(listing))
}

pub fn configure_assets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/assets", get(list_assets).post(create_asset))
        .route("/api/assets/expiring", get(list_expiring_assets))
        .route("/api/assets/:id", get(get_asset).put(update_asset))
        .route("/api/assets/:id/decommission", post(decommission_asset))
}
