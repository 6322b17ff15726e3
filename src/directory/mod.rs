use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::renewals::RenewalError;
use crate::shared::schema::{crm_accounts, crm_contacts};
use crate::shared::utils::DbPool;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = crm_accounts)]
pub struct CrmAccount {
    pub id: Uuid,
    pub name: String,
    pub billing_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = crm_contacts)]
pub struct CrmContact {
    pub id: Uuid,
    pub account_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub persona: Option<String>,
    pub is_primary_contact: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account plus its contact roster, the shape the notification composer
/// resolves recipients from.
#[derive(Debug, Clone, Serialize)]
pub struct AccountEntry {
    pub id: Uuid,
    pub name: String,
    pub billing_email: String,
    pub contacts: Vec<CrmContact>,
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_account(&self, id: Uuid) -> Result<AccountEntry, RenewalError>;
}

pub struct PgDirectory {
    conn: DbPool,
}

impl PgDirectory {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn get_account(&self, id: Uuid) -> Result<AccountEntry, RenewalError> {
        let mut conn = self
            .conn
            .get()
            .map_err(|e| RenewalError::Database(format!("Pool error: {e}")))?;

        let account: CrmAccount = crm_accounts::table
            .filter(crm_accounts::id.eq(id))
            .first(&mut conn)
            .optional()
            .map_err(|e| RenewalError::Database(e.to_string()))?
            .ok_or_else(|| RenewalError::NotFound(format!("Account not found: {id}")))?;

        let contacts: Vec<CrmContact> = crm_contacts::table
            .filter(crm_contacts::account_id.eq(id))
            .order(crm_contacts::created_at.asc())
            .load(&mut conn)
            .map_err(|e| RenewalError::Database(e.to_string()))?;

        Ok(AccountEntry {
            id: account.id,
            name: account.name,
            billing_email: account.billing_email,
            contacts,
        })
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    accounts: Arc<RwLock<HashMap<Uuid, AccountEntry>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, entry: AccountEntry) {
        let mut accounts = self.accounts.write().await;
        accounts.insert(entry.id, entry);
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get_account(&self, id: Uuid) -> Result<AccountEntry, RenewalError> {
        let accounts = self.accounts.read().await;
        accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| RenewalError::NotFound(format!("Account not found: {id}")))
    }
}
