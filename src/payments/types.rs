//! Payment gateway request and response types.
//!
//! All monetary amounts are integer minor units (kobo for NGN). Nothing in
//! this crate handles decimal amounts; conversion happens at the edges that
//! render money for humans.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Payment channels offered on the gateway checkout page when the caller
/// does not narrow them
pub const DEFAULT_CHANNELS: &[&str] = &["card", "bank", "ussd", "qr", "mobile_money"];

/// Request to start a hosted checkout session
#[derive(Debug, Clone, Serialize)]
pub struct InitializePaymentRequest {
    /// Payer's email, required by the gateway for receipts
    pub email: String,
    /// Amount in minor units; must be positive
    pub amount_minor: i64,
    pub currency: String,
    /// Unique reference for this attempt; the gateway echoes it in webhooks
    pub reference: String,
    /// Where the gateway redirects the payer after checkout
    pub callback_url: Option<String>,
    /// Restrict the checkout page to these channels; `None` means
    /// [`DEFAULT_CHANNELS`]
    pub channels: Option<Vec<String>>,
    /// Opaque object echoed back in webhook payloads; carries the invoice
    /// linkage
    pub metadata: Option<Value>,
}

/// Successful initialization: where to send the payer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInit {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// Gateway-side status of a transaction as reported by a verify call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifiedStatus {
    Success,
    Pending,
    Failed,
    Abandoned,
    Reversed,
    /// Status string this build does not recognize
    Unknown,
}

impl VerifiedStatus {
    /// Maps the gateway's status strings. In-flight statuses collapse to
    /// `Pending`; anything unrecognized becomes `Unknown` rather than an
    /// error so new gateway statuses degrade gracefully.
    pub fn from_gateway(status: &str) -> Self {
        match status {
            "success" => VerifiedStatus::Success,
            "pending" | "ongoing" | "processing" | "queued" => VerifiedStatus::Pending,
            "failed" => VerifiedStatus::Failed,
            "abandoned" => VerifiedStatus::Abandoned,
            "reversed" => VerifiedStatus::Reversed,
            _ => VerifiedStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerifiedStatus::Success => "success",
            VerifiedStatus::Pending => "pending",
            VerifiedStatus::Failed => "failed",
            VerifiedStatus::Abandoned => "abandoned",
            VerifiedStatus::Reversed => "reversed",
            VerifiedStatus::Unknown => "unknown",
        }
    }
}

/// Result of a verify call against the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedTransaction {
    pub reference: String,
    pub status: VerifiedStatus,
    pub amount_minor: i64,
    pub currency: Option<String>,
    pub fees_minor: i64,
    pub channel: Option<String>,
    pub paid_at: Option<String>,
    pub gateway_response: Option<String>,
    pub metadata: Value,
}

/// Builds a unique gateway reference for one payment attempt.
///
/// The invoice number keeps references greppable in gateway dashboards; the
/// timestamp and random suffix keep retries of the same invoice distinct.
pub fn generate_reference(invoice_number: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        invoice_number,
        Utc::now().timestamp(),
        &suffix[..8]
    )
}
