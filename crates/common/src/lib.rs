//! Identifiers shared by every crate in the workspace.

pub mod ids;

pub use ids::{EventId, RecordId, RequestId};
