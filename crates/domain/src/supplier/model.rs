use chrono::{DateTime, Utc};
use common::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DomainError, Result};

/// Input for creating a supplier. Missing fields take their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewSupplier {
    pub name: String,
    pub contact_info: Option<Value>,
    pub address: Option<Value>,
    pub status: Option<String>,
    pub metadata: Option<Value>,
}

impl NewSupplier {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A registered supplier, as carried in `SUPPLIER_CREATED` and `SUPPLIER_UPDATED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: RecordId,
    pub name: String,
    pub contact_info: Option<Value>,
    pub address: Option<Value>,
    pub status: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl Supplier {
    pub const DEFAULT_STATUS: &'static str = "active";

    /// Builds a supplier with a fresh id, validating the input.
    pub fn create(input: NewSupplier) -> Result<Self> {
        Self::with_id(RecordId::new(), input)
    }

    /// Builds the full state of supplier `id` from `input`, validating it.
    pub fn with_id(id: RecordId, input: NewSupplier) -> Result<Self> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("Supplier name is required"));
        }

        Ok(Self {
            id,
            name: name.to_string(),
            contact_info: input.contact_info,
            address: input.address,
            status: input
                .status
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| Self::DEFAULT_STATUS.to_string()),
            metadata: input
                .metadata
                .unwrap_or_else(|| Value::Object(Default::default())),
            created_at: Utc::now(),
        })
    }
}
