//! Billing domain model.
//!
//! All monetary amounts are integer minor units (kobo for NGN). Nothing in
//! this crate stores or computes money as a float.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Invoice lifecycle status.
///
/// `Draft -> Sent` happens at issuance. From `Sent` an invoice can settle to
/// `Paid`, age into `Overdue`, be `Cancelled`, or sit at `PartiallyPaid`.
/// `Sent -> Overdue` is driven by the due date, not by payment events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
    PartiallyPaid,
}

impl InvoiceStatus {
    /// Whether a payment may still be initiated against the invoice
    pub fn is_payable(self) -> bool {
        matches!(
            self,
            InvoiceStatus::Draft
                | InvoiceStatus::Sent
                | InvoiceStatus::Overdue
                | InvoiceStatus::PartiallyPaid
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::PartiallyPaid => "partially_paid",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway transaction status. Everything except `Pending` is terminal and
/// must never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Reversed,
    Abandoned,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Reversed => "reversed",
            TransactionStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an invoice bills for. Settlement looks up the post-payment callback
/// for this type; types without a registered callback settle normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "invoice_type", rename_all = "snake_case")]
pub enum InvoiceType {
    ApplicationFee,
    AcceptanceFee,
    SchoolFees,
    Other,
}

impl InvoiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceType::ApplicationFee => "application_fee",
            InvoiceType::AcceptanceFee => "acceptance_fee",
            InvoiceType::SchoolFees => "school_fees",
            InvoiceType::Other => "other",
        }
    }
}

impl fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub invoice_type: InvoiceType,
    /// The student or applicant the invoice bills
    pub owner_id: Uuid,
    pub currency: String,
    pub total_minor: i64,
    pub platform_fee_minor: i64,
    pub status: InvoiceStatus,
    pub due_date: NaiveDate,
    pub paid_date: Option<NaiveDate>,
    /// Reference of the gateway transaction that settled the invoice
    pub gateway_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub invoice_id: Uuid,
    /// Unique reference shared with the gateway; the join key for webhooks
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub platform_fee_minor: i64,
    pub gateway_fee_minor: i64,
    pub net_minor: i64,
    pub channel: Option<String>,
    pub gateway_response: Option<String>,
    /// Sanitized gateway payload kept for audit
    pub gateway_payload: Value,
    /// Reconciliation breadcrumbs (invoice id and number, owner, invoice type)
    pub metadata: Value,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds the pending row recorded before the gateway is called
    pub fn new_pending(invoice: &Invoice, reference: &str, metadata: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            reference: reference.to_string(),
            amount_minor: invoice.total_minor,
            currency: invoice.currency.clone(),
            status: TransactionStatus::Pending,
            platform_fee_minor: invoice.platform_fee_minor,
            gateway_fee_minor: 0,
            net_minor: (invoice.total_minor - invoice.platform_fee_minor).max(0),
            channel: None,
            gateway_response: None,
            gateway_payload: Value::Object(Default::default()),
            metadata,
            initiated_at: now,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
