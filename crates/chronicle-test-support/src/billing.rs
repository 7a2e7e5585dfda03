//! Billing fixture domain — a small but complete aggregate, event set,
//! and registry used by integration tests across the workspace.

use std::any::Any;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use chronicle_core::aggregate::{AggregateId, AggregateRoot, Reconstitute, Root};
use chronicle_core::clock::Clock;
use chronicle_core::command::Command;
use chronicle_core::error::{AggregateError, SerializationError};
use chronicle_core::event::{DomainEvent, EventMetadata};
use chronicle_core::serializer::{coerce, emit, EventRegistry};

/// Emitted when an invoice draft is created.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDrafted {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Recipient the invoice is addressed to.
    pub recipient_id: String,
    /// Invoice total, when known at drafting time.
    pub amount_cents: Option<i64>,
}

/// Emitted when an invoice is issued to its recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceIssued {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Payment due date.
    pub due_on: Option<NaiveDate>,
}

/// Emitted when a payment settles the invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoicePaid {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Settlement timestamp.
    pub paid_at: Option<DateTime<Utc>>,
}

/// Events of the billing fixture domain.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    /// An invoice draft was created.
    Drafted(InvoiceDrafted),
    /// An invoice was issued.
    Issued(InvoiceIssued),
    /// An invoice was paid.
    Paid(InvoicePaid),
}

impl DomainEvent for BillingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Drafted(_) => "billing.invoice_drafted",
            Self::Issued(_) => "billing.invoice_issued",
            Self::Paid(_) => "billing.invoice_paid",
        }
    }

    fn metadata(&self) -> &EventMetadata {
        match self {
            Self::Drafted(e) => &e.metadata,
            Self::Issued(e) => &e.metadata,
            Self::Paid(e) => &e.metadata,
        }
    }

    fn attributes(&self) -> Map<String, Value> {
        let mut attributes = Map::new();
        match self {
            Self::Drafted(e) => {
                attributes.insert(
                    "recipient_id".to_owned(),
                    Value::String(e.recipient_id.clone()),
                );
                attributes.insert("amount_cents".to_owned(), emit::integer(&e.amount_cents));
            }
            Self::Issued(e) => {
                attributes.insert("due_on".to_owned(), emit::date(&e.due_on));
            }
            Self::Paid(e) => {
                attributes.insert("paid_at".to_owned(), emit::date_time(&e.paid_at));
            }
        }
        attributes
    }
}

fn decode_drafted(
    metadata: EventMetadata,
    attributes: &Map<String, Value>,
) -> Result<BillingEvent, SerializationError> {
    Ok(BillingEvent::Drafted(InvoiceDrafted {
        metadata,
        recipient_id: coerce::required_string(attributes, "recipient_id")?,
        amount_cents: coerce::integer(attributes, "amount_cents")?,
    }))
}

fn decode_issued(
    metadata: EventMetadata,
    attributes: &Map<String, Value>,
) -> Result<BillingEvent, SerializationError> {
    Ok(BillingEvent::Issued(InvoiceIssued {
        metadata,
        due_on: coerce::date(attributes, "due_on")?,
    }))
}

fn decode_paid(
    metadata: EventMetadata,
    attributes: &Map<String, Value>,
) -> Result<BillingEvent, SerializationError> {
    Ok(BillingEvent::Paid(InvoicePaid {
        metadata,
        paid_at: coerce::date_time(attributes, "paid_at")?,
    }))
}

/// Builds the registry covering every billing event type.
#[must_use]
pub fn billing_registry() -> EventRegistry<BillingEvent> {
    EventRegistry::new()
        .with("billing.invoice_drafted", decode_drafted)
        .with("billing.invoice_issued", decode_issued)
        .with("billing.invoice_paid", decode_paid)
}

/// The invoice aggregate of the billing fixture domain.
#[derive(Debug)]
pub struct Invoice {
    root: Root<BillingEvent>,
    /// Recipient the invoice is addressed to.
    pub recipient_id: Option<String>,
    /// Invoice total.
    pub amount_cents: Option<i64>,
    /// Whether the invoice has been issued.
    pub issued: bool,
    /// Whether the invoice has been paid.
    pub paid: bool,
}

impl Invoice {
    /// Creates a draft invoice, emitting its creation event.
    #[must_use]
    pub fn draft(
        id: AggregateId,
        recipient_id: &str,
        amount_cents: Option<i64>,
        clock: &dyn Clock,
    ) -> Self {
        let mut invoice = Self::blank(id);
        let event = BillingEvent::Drafted(InvoiceDrafted {
            metadata: invoice.root.next_metadata(clock),
            recipient_id: recipient_id.to_owned(),
            amount_cents,
        });
        invoice
            .apply(event)
            .expect("draft event is always handled");
        invoice
    }

    /// Issues the invoice.
    ///
    /// # Panics
    ///
    /// Panics only if the issued event loses its handler, which the
    /// exhaustive `handle` match prevents.
    pub fn issue(&mut self, due_on: Option<NaiveDate>, clock: &dyn Clock) {
        let event = BillingEvent::Issued(InvoiceIssued {
            metadata: self.root.next_metadata(clock),
            due_on,
        });
        self.apply(event).expect("issued event is always handled");
    }

    /// Records payment of the invoice.
    ///
    /// # Panics
    ///
    /// Panics only if the paid event loses its handler, which the
    /// exhaustive `handle` match prevents.
    pub fn pay(&mut self, paid_at: Option<DateTime<Utc>>, clock: &dyn Clock) {
        let event = BillingEvent::Paid(InvoicePaid {
            metadata: self.root.next_metadata(clock),
            paid_at,
        });
        self.apply(event).expect("paid event is always handled");
    }
}

impl AggregateRoot for Invoice {
    type Event = BillingEvent;

    fn root(&self) -> &Root<BillingEvent> {
        &self.root
    }

    fn root_mut(&mut self) -> &mut Root<BillingEvent> {
        &mut self.root
    }

    fn handle(&mut self, event: &BillingEvent) -> Result<(), AggregateError> {
        match event {
            BillingEvent::Drafted(e) => {
                self.recipient_id = Some(e.recipient_id.clone());
                self.amount_cents = e.amount_cents;
            }
            BillingEvent::Issued(_) => {
                self.issued = true;
            }
            BillingEvent::Paid(_) => {
                self.paid = true;
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Reconstitute for Invoice {
    fn blank(id: AggregateId) -> Self {
        Self {
            root: Root::new(id),
            recipient_id: None,
            amount_cents: None,
            issued: false,
            paid: false,
        }
    }
}

/// Command that drafts an invoice.
#[derive(Debug, Clone)]
pub struct DraftInvoice {
    /// The invoice aggregate to create.
    pub invoice_id: AggregateId,
    /// Recipient the invoice is addressed to.
    pub recipient_id: String,
}

impl Command for DraftInvoice {
    fn command_type(&self) -> &'static str {
        "billing.draft_invoice"
    }

    fn payload(&self) -> Value {
        serde_json::json!({
            "invoice_id": self.invoice_id.as_str(),
            "recipient_id": self.recipient_id,
        })
    }
}
