//! Shared test mocks and fixtures for the chronicle workspace.

mod billing;
mod clock;
mod handler;
mod store;

pub use billing::{
    billing_registry, BillingEvent, DraftInvoice, Invoice, InvoiceDrafted, InvoiceIssued,
    InvoicePaid,
};
pub use clock::{FixedClock, SteppingClock};
pub use handler::{FailingHandler, RecordingHandler};
pub use store::{FailingEventStore, InMemoryEventStore};
