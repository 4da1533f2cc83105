//! Maps verified provider events onto `BillingEvent`.
//!
//! This is the only place that knows the provider's per-type object layout.
//! Invoice and subscription objects nest the customer and subscription
//! references differently, and newer API versions moved some fields, so each
//! lookup tolerates both the flat and the expanded form.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::domain::foundation::{CustomerId, EventId, SubscriptionId};

use super::billing_event::{
    BillingEvent, BillingEventKind, InvoiceRef, PaymentRef, SubscriptionDeletion,
    SubscriptionState,
};
use super::errors::NormalizationError;
use super::provider_event::ProviderEvent;
use super::status::SubscriptionStatus;

/// Normalizes a verified event.
///
/// Unknown event types become `BillingEventKind::Unhandled` rather than an
/// error so new provider types never fail the pipeline.
///
/// # Errors
///
/// - `missing_subject` when a subscription or invoice event has no customer,
///   or a subscription event has no subscription id
/// - `unrecognized_status` for a subscription status outside the known set
/// - `invalid_field` when a field has an unexpected JSON type
pub fn normalize(event: &ProviderEvent) -> Result<BillingEvent, NormalizationError> {
    let id = EventId::new(event.id.clone()).map_err(|_| NormalizationError::invalid_field("id"))?;
    let occurred_at = Utc
        .timestamp_opt(event.created, 0)
        .single()
        .ok_or_else(|| NormalizationError::invalid_field("created"))?;
    let object = &event.data.object;

    let kind = match event.event_type.as_str() {
        "customer.subscription.created" => {
            BillingEventKind::SubscriptionCreated(subscription_state(object)?)
        }
        "customer.subscription.updated" => {
            BillingEventKind::SubscriptionUpdated(subscription_state(object)?)
        }
        "customer.subscription.deleted" => {
            BillingEventKind::SubscriptionDeleted(subscription_deletion(object)?)
        }
        "invoice.paid" => BillingEventKind::InvoicePaid(invoice_ref(object)?),
        "invoice.payment_failed" => BillingEventKind::InvoiceFailed(invoice_ref(object)?),
        "payment_intent.succeeded" => BillingEventKind::PaymentSucceeded(payment_ref(object)?),
        "payment_intent.payment_failed" => BillingEventKind::PaymentFailed(payment_ref(object)?),
        other => BillingEventKind::Unhandled {
            event_type: other.to_string(),
        },
    };

    let subject_customer_id = match &kind {
        BillingEventKind::Unhandled { .. } => expandable_id(object.get("customer"), "customer")
            .ok()
            .flatten()
            .and_then(|id| CustomerId::new(id).ok()),
        BillingEventKind::PaymentSucceeded(_) | BillingEventKind::PaymentFailed(_) => {
            customer_id(object)?
        }
        _ => Some(customer_id(object)?.ok_or_else(|| {
            NormalizationError::missing_subject(format!(
                "{} event carries no customer",
                kind.name()
            ))
        })?),
    };

    Ok(BillingEvent::new(id, kind, subject_customer_id, occurred_at))
}

/// Parses a provider subscription object into a full state.
///
/// Shared with the provider client, which receives the same object shape from
/// `GET /v1/subscriptions/{id}`.
pub fn subscription_state(object: &Value) -> Result<SubscriptionState, NormalizationError> {
    let subscription_id = subscription_object_id(object)?;

    let status = object
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| NormalizationError::invalid_field("status"))?;
    let status = SubscriptionStatus::from_provider(status)?;

    Ok(SubscriptionState {
        subscription_id,
        status,
        current_period_end: period_end(object)?,
        cancel_at_period_end: bool_field(object, "cancel_at_period_end")?,
        trial_end: timestamp_field(object, "trial_end")?,
    })
}

fn subscription_deletion(object: &Value) -> Result<SubscriptionDeletion, NormalizationError> {
    Ok(SubscriptionDeletion {
        subscription_id: subscription_object_id(object)?,
        current_period_end: period_end(object)?,
    })
}

fn invoice_ref(object: &Value) -> Result<InvoiceRef, NormalizationError> {
    let invoice_id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| NormalizationError::invalid_field("id"))?
        .to_string();

    let direct = expandable_id(object.get("subscription"), "subscription")?;
    let nested = match direct {
        Some(_) => None,
        None => expandable_id(
            object.pointer("/parent/subscription_details/subscription"),
            "parent.subscription_details.subscription",
        )?,
    };
    let subscription_id = direct
        .or(nested)
        .and_then(|id| SubscriptionId::new(id).ok());

    Ok(InvoiceRef {
        invoice_id,
        subscription_id,
    })
}

fn payment_ref(object: &Value) -> Result<PaymentRef, NormalizationError> {
    let payment_intent_id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| NormalizationError::invalid_field("id"))?
        .to_string();

    Ok(PaymentRef {
        payment_intent_id,
        amount: object.get("amount").and_then(Value::as_i64),
        currency: object
            .get("currency")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn subscription_object_id(object: &Value) -> Result<SubscriptionId, NormalizationError> {
    object
        .get("id")
        .and_then(Value::as_str)
        .and_then(|id| SubscriptionId::new(id).ok())
        .ok_or_else(|| NormalizationError::missing_subject("subscription object has no id"))
}

fn customer_id(object: &Value) -> Result<Option<CustomerId>, NormalizationError> {
    Ok(expandable_id(object.get("customer"), "customer")?.and_then(|id| CustomerId::new(id).ok()))
}

/// Reads a reference that is either an id string or an expanded object.
fn expandable_id(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Option<String>, NormalizationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id.clone())),
        Some(Value::Object(expanded)) => match expanded.get("id") {
            Some(Value::String(id)) => Ok(Some(id.clone())),
            _ => Err(NormalizationError::invalid_field(field)),
        },
        Some(_) => Err(NormalizationError::invalid_field(field)),
    }
}

/// Period end lives on the subscription in older API versions and on the
/// first item in newer ones.
fn period_end(object: &Value) -> Result<Option<DateTime<Utc>>, NormalizationError> {
    if let Some(end) = timestamp_field(object, "current_period_end")? {
        return Ok(Some(end));
    }
    match object.pointer("/items/data/0") {
        Some(item) => timestamp_field(item, "current_period_end"),
        None => Ok(None),
    }
}

fn timestamp_field(
    object: &Value,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, NormalizationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(Some)
            .ok_or_else(|| NormalizationError::invalid_field(field)),
    }
}

fn bool_field(object: &Value, field: &'static str) -> Result<bool, NormalizationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(NormalizationError::invalid_field(field)),
    }
}
