//! Business services riding on the event choreography core.
//!
//! - Suppliers: validated, then announced as `SUPPLIER_CREATED`/`SUPPLIER_UPDATED`
//! - Medicines: announced as `MEDICINE_CREATED`/`MEDICINE_UPDATED`
//! - Purchase plans: derived idempotently from supplier events, or created by hand
//! - Sales: persisted by the sale chain, in memory or PostgreSQL

pub mod error;
pub mod medicine;
pub mod purchase_plan;
pub mod sale;
pub mod supplier;

pub use error::{DomainError, Result};
pub use medicine::{
    MEDICINE_CREATED, MEDICINE_EVENTS_TOPIC, MEDICINE_UPDATED, Medicine, MedicinePublished,
    MedicineService, NewMedicine,
};
pub use purchase_plan::{
    InMemoryPurchasePlanRepository, NewPurchasePlan, PlanSource, PlanStatus, PurchasePlan,
    PurchasePlanHandler, PurchasePlanRepository, PurchasePlanUpdate,
};
pub use sale::{
    DEFAULT_LIST_LIMIT, InMemorySaleRepository, MAX_LIST_LIMIT, PostgresSaleRepository, Sale,
    SaleRepository,
};
pub use supplier::{
    NewSupplier, SUPPLIER_CREATED, SUPPLIER_EVENTS_TOPIC, SUPPLIER_UPDATED, Supplier,
    SupplierPublished, SupplierService,
};
