//! Suppliers and the events announcing them.

mod model;
mod service;

pub use model::{NewSupplier, Supplier};
pub use service::{SupplierPublished, SupplierService};

/// Event type published when a supplier is created.
pub const SUPPLIER_CREATED: &str = "SUPPLIER_CREATED";

/// Event type published when a supplier is replaced by an update.
pub const SUPPLIER_UPDATED: &str = "SUPPLIER_UPDATED";

/// Topic carrying supplier lifecycle events.
pub const SUPPLIER_EVENTS_TOPIC: &str = "supplier-events";
