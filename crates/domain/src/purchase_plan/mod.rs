//! Purchase plans, derived from supplier events or created by hand.

mod handler;
mod model;
mod repository;

pub use handler::PurchasePlanHandler;
pub use model::{NewPurchasePlan, PlanSource, PlanStatus, PurchasePlan, PurchasePlanUpdate};
pub use repository::{InMemoryPurchasePlanRepository, PurchasePlanRepository};
