//! Typed webhook events.
//!
//! Raw gateway payloads are parsed into a closed set of variants. Event names
//! outside [`HANDLED_EVENTS`] become [`GatewayEvent::Unhandled`] and are
//! acknowledged without processing, so the gateway can add event types without
//! breaking us. Nested `data` objects are stripped to an allow-list before
//! anything downstream sees them; card, customer and authorization details
//! never reach storage or logs.

use crate::webhooks::error::SecurityError;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Header carrying the HMAC-SHA512 hex digest of the raw body
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Event names the receiver acts on. Everything else is accepted and ignored.
pub const HANDLED_EVENTS: &[&str] = &["charge.success", "charge.failed", "transfer.success"];

/// Fields of the nested `data` object that survive sanitization
const DATA_ALLOWED_FIELDS: &[&str] = &[
    "id",
    "reference",
    "amount",
    "currency",
    "status",
    "channel",
    "fees",
    "gateway_response",
    "paid_at",
    "created_at",
    "metadata",
];

/// One inbound delivery: the gateway's delivery id plus the typed event
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    /// Gateway-assigned id for this delivery attempt. Falls back to a random
    /// id when the gateway omits it; duplicate suppression then rests on the
    /// terminal-status check alone.
    pub delivery_id: String,
    pub event: GatewayEvent,
}

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    ChargeSuccess(ChargeEvent),
    ChargeFailed(ChargeEvent),
    /// Only synthesized by reconciliation when a verify call reports a
    /// reversal. The gateway does not deliver this over the webhook channel.
    ChargeReversed(ChargeEvent),
    TransferSuccess(TransferEvent),
    Unhandled { event: String },
}

impl GatewayEvent {
    pub fn name(&self) -> &str {
        match self {
            GatewayEvent::ChargeSuccess(_) => "charge.success",
            GatewayEvent::ChargeFailed(_) => "charge.failed",
            GatewayEvent::ChargeReversed(_) => "charge.reversed",
            GatewayEvent::TransferSuccess(_) => "transfer.success",
            GatewayEvent::Unhandled { event } => event,
        }
    }

    /// Transaction reference the event refers to, if it carries one
    pub fn reference(&self) -> Option<&str> {
        match self {
            GatewayEvent::ChargeSuccess(c)
            | GatewayEvent::ChargeFailed(c)
            | GatewayEvent::ChargeReversed(c) => Some(&c.reference),
            GatewayEvent::TransferSuccess(t) => Some(&t.reference),
            GatewayEvent::Unhandled { .. } => None,
        }
    }

    /// Sanitized payload carried by the event, if any
    pub fn payload(&self) -> Option<&Value> {
        match self {
            GatewayEvent::ChargeSuccess(c)
            | GatewayEvent::ChargeFailed(c)
            | GatewayEvent::ChargeReversed(c) => Some(&c.payload),
            GatewayEvent::TransferSuccess(t) => Some(&t.payload),
            GatewayEvent::Unhandled { .. } => None,
        }
    }
}

/// Payment outcome for a single charge attempt
#[derive(Debug, Clone)]
pub struct ChargeEvent {
    pub reference: String,
    pub amount_minor: i64,
    pub currency: Option<String>,
    /// Raw gateway status string ("success", "failed", ...)
    pub status: String,
    pub channel: Option<String>,
    pub fees_minor: i64,
    pub gateway_response: Option<String>,
    pub paid_at: Option<String>,
    pub metadata: Value,
    /// Sanitized `data` object, persisted for audit
    pub payload: Value,
}

/// Outgoing settlement confirmation. Routed to the payout ledger; invoices
/// and transactions are never touched by transfer events.
#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub reference: String,
    pub amount_minor: i64,
    pub currency: Option<String>,
    pub payload: Value,
}

/// Parses and types a raw delivery. The body must already be
/// signature-verified; parsing never runs on untrusted bytes.
pub fn parse_delivery(body: &[u8]) -> Result<WebhookDelivery, SecurityError> {
    let root: Value =
        serde_json::from_slice(body).map_err(|e| SecurityError::MalformedJson(e.to_string()))?;

    let obj = root
        .as_object()
        .ok_or(SecurityError::InvalidField { field: "." })?;

    let event_name = obj
        .get("event")
        .and_then(Value::as_str)
        .ok_or(SecurityError::MissingField { field: "event" })?
        .to_string();

    let delivery_id = delivery_id_of(obj);

    if !HANDLED_EVENTS.contains(&event_name.as_str()) {
        return Ok(WebhookDelivery {
            delivery_id,
            event: GatewayEvent::Unhandled { event: event_name },
        });
    }

    let data = match obj.get("data") {
        None => return Err(SecurityError::MissingField { field: "data" }),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(SecurityError::InvalidField { field: "data" }),
    };
    let payload = sanitize_data(data);

    let event = match event_name.as_str() {
        "charge.success" => GatewayEvent::ChargeSuccess(parse_charge(&payload)?),
        "charge.failed" => GatewayEvent::ChargeFailed(parse_charge(&payload)?),
        "transfer.success" => GatewayEvent::TransferSuccess(parse_transfer(&payload)?),
        // Unreachable: the whitelist check above returned already
        other => {
            return Ok(WebhookDelivery {
                delivery_id,
                event: GatewayEvent::Unhandled {
                    event: other.to_string(),
                },
            })
        }
    };

    Ok(WebhookDelivery { delivery_id, event })
}

/// Drops every `data` field not on the allow-list
pub fn sanitize_data(data: &Map<String, Value>) -> Value {
    let mut clean = data.clone();
    clean.retain(|key, _| DATA_ALLOWED_FIELDS.contains(&key.as_str()));
    Value::Object(clean)
}

fn delivery_id_of(obj: &Map<String, Value>) -> String {
    match obj.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

fn parse_charge(payload: &Value) -> Result<ChargeEvent, SecurityError> {
    let reference = required_str(payload, "reference", "data.reference")?;
    let amount_minor = match payload.get("amount") {
        None | Some(Value::Null) => {
            return Err(SecurityError::MissingField {
                field: "data.amount",
            })
        }
        Some(v) => v.as_i64().ok_or(SecurityError::InvalidField {
            field: "data.amount",
        })?,
    };
    let status = required_str(payload, "status", "data.status")?;

    Ok(ChargeEvent {
        reference,
        amount_minor,
        currency: optional_str(payload, "currency"),
        status,
        channel: optional_str(payload, "channel"),
        fees_minor: payload.get("fees").and_then(Value::as_i64).unwrap_or(0),
        gateway_response: optional_str(payload, "gateway_response"),
        paid_at: optional_str(payload, "paid_at"),
        metadata: payload
            .get("metadata")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())),
        payload: payload.clone(),
    })
}

fn parse_transfer(payload: &Value) -> Result<TransferEvent, SecurityError> {
    let reference = required_str(payload, "reference", "data.reference")?;
    let amount_minor = match payload.get("amount") {
        None | Some(Value::Null) => {
            return Err(SecurityError::MissingField {
                field: "data.amount",
            })
        }
        Some(v) => v.as_i64().ok_or(SecurityError::InvalidField {
            field: "data.amount",
        })?,
    };

    Ok(TransferEvent {
        reference,
        amount_minor,
        currency: optional_str(payload, "currency"),
        payload: payload.clone(),
    })
}

fn required_str(
    payload: &Value,
    key: &str,
    field: &'static str,
) -> Result<String, SecurityError> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(SecurityError::MissingField { field })
}

fn optional_str(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn charge_success_body() -> Vec<u8> {
        json!({
            "event": "charge.success",
            "id": 302_961,
            "data": {
                "id": 302_961,
                "reference": "INV-2024-001_1700000000_ab12cd34",
                "amount": 500_000,
                "currency": "NGN",
                "status": "success",
                "channel": "card",
                "fees": 7_500,
                "gateway_response": "Approved",
                "paid_at": "2024-11-14T20:15:00.000Z",
                "metadata": {
                    "invoice_id": "0b6cbb4a-9c3f-4f3c-8f1f-0c8f8b1f2a3d",
                    "invoice_number": "INV-2024-001"
                },
                "authorization": {
                    "authorization_code": "AUTH_pmx3mgawyd",
                    "bin": "408408",
                    "last4": "4081",
                    "card_type": "visa"
                },
                "customer": {
                    "email": "student@example.edu",
                    "customer_code": "CUS_xnxdt6s1zg1f4nx"
                },
                "log": {"attempts": 1}
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_parse_charge_success() {
        let delivery = parse_delivery(&charge_success_body()).unwrap();
        assert_eq!(delivery.delivery_id, "302961");
        let charge = match delivery.event {
            GatewayEvent::ChargeSuccess(c) => c,
            other => panic!("expected charge.success, got {}", other.name()),
        };
        assert_eq!(charge.reference, "INV-2024-001_1700000000_ab12cd34");
        assert_eq!(charge.amount_minor, 500_000);
        assert_eq!(charge.fees_minor, 7_500);
        assert_eq!(charge.channel.as_deref(), Some("card"));
        assert_eq!(charge.status, "success");
        assert_eq!(
            charge.metadata.get("invoice_number").and_then(Value::as_str),
            Some("INV-2024-001")
        );
    }

    #[test]
    fn test_sanitization_strips_card_and_customer_details() {
        let delivery = parse_delivery(&charge_success_body()).unwrap();
        let charge = match delivery.event {
            GatewayEvent::ChargeSuccess(c) => c,
            _ => unreachable!(),
        };
        assert!(charge.payload.get("authorization").is_none());
        assert!(charge.payload.get("customer").is_none());
        assert!(charge.payload.get("log").is_none());
        assert!(charge.payload.get("reference").is_some());
        assert!(charge.payload.get("fees").is_some());
    }

    #[test]
    fn test_unknown_event_is_unhandled_not_an_error() {
        let body = json!({
            "event": "subscription.disable",
            "id": "evt_123",
            "data": {"anything": true}
        })
        .to_string();
        let delivery = parse_delivery(body.as_bytes()).unwrap();
        match delivery.event {
            GatewayEvent::Unhandled { event } => assert_eq!(event, "subscription.disable"),
            other => panic!("expected unhandled, got {}", other.name()),
        }
    }

    #[test]
    fn test_unknown_event_skips_data_requirements() {
        // No data object at all; still acknowledged as unhandled
        let body = json!({"event": "invoice.create", "id": 9}).to_string();
        assert!(parse_delivery(body.as_bytes()).is_ok());
    }

    #[test]
    fn test_missing_reference_is_rejected() {
        let body = json!({
            "event": "charge.success",
            "id": 1,
            "data": {"amount": 1000, "status": "success"}
        })
        .to_string();
        let err = parse_delivery(body.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            SecurityError::MissingField {
                field: "data.reference"
            }
        );
    }

    #[test]
    fn test_non_integer_amount_is_rejected() {
        let body = json!({
            "event": "charge.success",
            "id": 1,
            "data": {"reference": "r", "amount": "5000", "status": "success"}
        })
        .to_string();
        let err = parse_delivery(body.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            SecurityError::InvalidField {
                field: "data.amount"
            }
        );
    }

    #[test]
    fn test_not_json_is_malformed() {
        let err = parse_delivery(b"not-json").unwrap_err();
        assert!(matches!(err, SecurityError::MalformedJson(_)));
    }

    #[test]
    fn test_missing_delivery_id_gets_a_fallback() {
        let body = json!({
            "event": "charge.failed",
            "data": {"reference": "r1", "amount": 2000, "status": "failed"}
        })
        .to_string();
        let delivery = parse_delivery(body.as_bytes()).unwrap();
        assert!(!delivery.delivery_id.is_empty());
        assert!(matches!(delivery.event, GatewayEvent::ChargeFailed(_)));
    }

    #[test]
    fn test_parse_transfer_success() {
        let body = json!({
            "event": "transfer.success",
            "id": "evt_tr_1",
            "data": {
                "reference": "payout_outflow_77",
                "amount": 1_200_000,
                "currency": "NGN",
                "status": "success",
                "recipient": {"name": "School Account"}
            }
        })
        .to_string();
        let delivery = parse_delivery(body.as_bytes()).unwrap();
        let transfer = match delivery.event {
            GatewayEvent::TransferSuccess(t) => t,
            other => panic!("expected transfer.success, got {}", other.name()),
        };
        assert_eq!(transfer.reference, "payout_outflow_77");
        assert_eq!(transfer.amount_minor, 1_200_000);
        assert!(transfer.payload.get("recipient").is_none());
    }
}
