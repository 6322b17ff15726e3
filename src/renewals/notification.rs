use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::AccountEntry;

/// Fixed internal address all test-mode traffic is forced to.
pub const TEST_MODE_ADDRESS: &str = "renewal-test@mspserver.internal";
/// Subject prefix marking test-mode sends.
pub const TEST_MODE_SUBJECT_PREFIX: &str = "[TEST] ";
/// Contact persona that outranks the primary contact for renewal mail.
pub const BILLING_LEAD_PERSONA: &str = "Billing Lead";
/// Subject used when no asset name is available and the caller supplied no
/// default of their own.
pub const GENERIC_SUBJECT: &str = "Your Service Has Been Renewed";

/// What a renewal notification should look like. Ephemeral: only the
/// delivery log entry written at dispatch time survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewalNotificationRequest {
    pub recipient_contact_id: Option<Uuid>,
    pub to_email: String,
    #[serde(default)]
    pub cc_emails: Vec<String>,
    pub subject: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub test_mode: bool,
}

impl RenewalNotificationRequest {
    /// Queues a cc address; an exact duplicate of one already queued is a
    /// no-op.
    pub fn add_cc(&mut self, email: &str) {
        if !self.cc_emails.iter().any(|e| e == email) {
            self.cc_emails.push(email.to_string());
        }
    }

    /// Removes by exact string match.
    pub fn remove_cc(&mut self, email: &str) {
        self.cc_emails.retain(|e| e != email);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRecipient {
    pub email: String,
    pub contact_id: Option<Uuid>,
}

/// Default recipient for an account's renewal mail: the Billing Lead if one
/// has an email, otherwise the primary contact, otherwise the account's
/// generic billing address with no bound contact.
pub fn resolve_default_recipient(account: &AccountEntry) -> ResolvedRecipient {
    let billing_lead = account.contacts.iter().find(|c| {
        c.persona.as_deref() == Some(BILLING_LEAD_PERSONA) && c.email.is_some()
    });
    if let Some(contact) = billing_lead {
        return ResolvedRecipient {
            email: contact.email.clone().unwrap_or_default(),
            contact_id: Some(contact.id),
        };
    }

    let primary = account
        .contacts
        .iter()
        .find(|c| c.is_primary_contact && c.email.is_some());
    if let Some(contact) = primary {
        return ResolvedRecipient {
            email: contact.email.clone().unwrap_or_default(),
            contact_id: Some(contact.id),
        };
    }

    ResolvedRecipient {
        email: account.billing_email.clone(),
        contact_id: None,
    }
}

/// Subject line for a renewal notification. Recomputed on every call so a
/// changed asset name is always reflected; the explicit default only applies
/// when no asset name is in play.
pub fn compose_subject(asset_name: Option<&str>, explicit_default: Option<&str>) -> String {
    match asset_name {
        Some(name) => format!("{name} Has Been Renewed"),
        None => explicit_default.unwrap_or(GENERIC_SUBJECT).to_string(),
    }
}

/// The single place the test-mode override happens. Runs immediately before
/// dispatch so toggling test mode off right up to submission still sends to
/// the real recipient, and the delivery log records what actually went out.
pub fn apply_test_mode_override(
    mut request: RenewalNotificationRequest,
) -> RenewalNotificationRequest {
    if !request.test_mode {
        return request;
    }
    request.to_email = TEST_MODE_ADDRESS.to_string();
    request.cc_emails.clear();
    request.subject = format!("{TEST_MODE_SUBJECT_PREFIX}{}", request.subject);
    request.recipient_contact_id = None;
    request
}
