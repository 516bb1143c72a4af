//! Payment gateway trait definition
//!
//! Defines the interface the billing service programs against, so tests can
//! substitute a stub and a second gateway can be added without touching the
//! invoice lifecycle.

use crate::error::GatewayError;
use crate::payments::types::{InitializePaymentRequest, PaymentInit, VerifiedTransaction};
use async_trait::async_trait;

/// Trait for payment gateway implementations
///
/// Webhook signature verification deliberately lives outside this trait: the
/// receiver verifies signatures before it knows which gateway sent the
/// delivery.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initialize a hosted checkout session
    ///
    /// Starts a payment with the gateway and returns the authorization URL
    /// the payer is redirected to. The caller must have persisted its pending
    /// transaction row before calling this, so a webhook that races the
    /// response still finds the reference.
    ///
    /// # Arguments
    /// * `request` - Amount in minor units, payer email, unique reference
    ///
    /// # Returns
    /// * `PaymentInit` - Authorization URL, access code and echoed reference
    async fn initialize_payment(
        &self,
        request: InitializePaymentRequest,
    ) -> Result<PaymentInit, GatewayError>;

    /// Verify the status of a transaction
    ///
    /// Asks the gateway for the authoritative state of a transaction. Used by
    /// reconciliation when a webhook may have been missed.
    ///
    /// # Arguments
    /// * `reference` - Transaction reference from `initialize_payment`
    ///
    /// # Returns
    /// * `VerifiedTransaction` - Gateway-side status, amount and fees
    async fn verify_transaction(&self, reference: &str)
        -> Result<VerifiedTransaction, GatewayError>;
}
