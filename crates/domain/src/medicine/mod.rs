//! Medicines and the events announcing them.

mod model;
mod service;

pub use model::{Medicine, NewMedicine};
pub use service::{MedicinePublished, MedicineService};

pub const MEDICINE_CREATED: &str = "MEDICINE_CREATED";
pub const MEDICINE_UPDATED: &str = "MEDICINE_UPDATED";

/// Topic carrying medicine lifecycle events.
pub const MEDICINE_EVENTS_TOPIC: &str = "medicine-events";
