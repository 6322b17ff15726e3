use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::renewals::RenewalError;
use crate::shared::schema::{invoices, products};
use crate::shared::utils::DbPool;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingFrequency {
    Monthly,
    Quarterly,
    Annual,
}

impl BillingFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "annual" => Some(Self::Annual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = products)]
pub struct Product {
    pub id: Uuid,
    pub sku: Option<String>,
    pub name: String,
    pub unit_price: BigDecimal,
    pub currency: String,
    pub billing_frequency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn frequency(&self) -> Option<BillingFrequency> {
        BillingFrequency::parse(&self.billing_frequency)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub description: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = invoices)]
pub struct Invoice {
    pub id: Uuid,
    pub account_id: Uuid,
    pub number: String,
    pub status: String,
    pub currency: String,
    pub total: BigDecimal,
    pub line_items: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, id: Uuid) -> Result<Product, RenewalError>;
}

#[async_trait]
pub trait InvoiceDrafter: Send + Sync {
    /// Drafts (never finalizes) an invoice and returns its id. The caller
    /// stores the id on the asset to arm the duplicate-draft guard.
    async fn draft_invoice(
        &self,
        account_id: Uuid,
        line_items: Vec<InvoiceLineItem>,
    ) -> Result<Uuid, RenewalError>;
}

pub struct PgCatalog {
    conn: DbPool,
}

impl PgCatalog {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ProductCatalog for PgCatalog {
    async fn get_product(&self, id: Uuid) -> Result<Product, RenewalError> {
        let mut conn = self
            .conn
            .get()
            .map_err(|e| RenewalError::Database(format!("Pool error: {e}")))?;

        products::table
            .filter(products::id.eq(id))
            .filter(products::is_active.eq(true))
            .first(&mut conn)
            .optional()
            .map_err(|e| RenewalError::Database(e.to_string()))?
            .ok_or_else(|| RenewalError::NotFound(format!("Product not found: {id}")))
    }
}

pub struct PgInvoiceDrafter {
    conn: DbPool,
}

impl PgInvoiceDrafter {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }
}

fn next_invoice_number(conn: &mut PgConnection) -> Result<String, diesel::result::Error> {
    let count: i64 = invoices::table.count().get_result(conn)?;
    Ok(format!("INV-{:06}", count + 1))
}

#[async_trait]
impl InvoiceDrafter for PgInvoiceDrafter {
    async fn draft_invoice(
        &self,
        account_id: Uuid,
        line_items: Vec<InvoiceLineItem>,
    ) -> Result<Uuid, RenewalError> {
        let mut conn = self
            .conn
            .get()
            .map_err(|e| RenewalError::Database(format!("Pool error: {e}")))?;

        let now = Utc::now();
        let total: BigDecimal = line_items.iter().map(|li| li.amount.clone()).sum();
        let number = next_invoice_number(&mut conn)
            .map_err(|e| RenewalError::Database(e.to_string()))?;

        let invoice = Invoice {
            id: Uuid::new_v4(),
            account_id,
            number,
            status: "draft".to_string(),
            currency: "USD".to_string(),
            total,
            line_items: serde_json::to_value(&line_items)
                .map_err(|e| RenewalError::Database(e.to_string()))?,
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(invoices::table)
            .values(&invoice)
            .execute(&mut conn)
            .map_err(|e| RenewalError::Database(e.to_string()))?;

        Ok(invoice.id)
    }
}

// In-memory catalog and drafter for tests.

#[derive(Default)]
pub struct MemoryCatalog {
    products: Arc<RwLock<HashMap<Uuid, Product>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, product: Product) {
        let mut products = self.products.write().await;
        products.insert(product.id, product);
    }
}

#[async_trait]
impl ProductCatalog for MemoryCatalog {
    async fn get_product(&self, id: Uuid) -> Result<Product, RenewalError> {
        let products = self.products.read().await;
        products
            .get(&id)
            .cloned()
            .ok_or_else(|| RenewalError::NotFound(format!("Product not found: {id}")))
    }
}

#[derive(Default)]
pub struct MemoryInvoiceDrafter {
    pub drafted: Arc<RwLock<Vec<(Uuid, Uuid, Vec<InvoiceLineItem>)>>>,
}

impl MemoryInvoiceDrafter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn draft_count(&self) -> usize {
        self.drafted.read().await.len()
    }
}

#[async_trait]
impl InvoiceDrafter for MemoryInvoiceDrafter {
    async fn draft_invoice(
        &self,
        account_id: Uuid,
        line_items: Vec<InvoiceLineItem>,
    ) -> Result<Uuid, RenewalError> {
        let id = Uuid::new_v4();
        let mut drafted = self.drafted.write().await;
        drafted.push((id, account_id, line_items));
        Ok(id)
    }
}

/// A renewal product suitable for tests.
pub fn test_product(unit_price: i64) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4(),
        sku: Some("RNW-001".to_string()),
        name: "Annual renewal".to_string(),
        unit_price: BigDecimal::from(unit_price),
        currency: "USD".to_string(),
        billing_frequency: "annual".to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
