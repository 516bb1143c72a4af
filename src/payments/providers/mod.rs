//! Payment gateway implementations
//!
//! Concrete implementations of the PaymentGateway trait.

pub mod paystack;

pub use paystack::{PaystackConfig, PaystackGateway};
