use chrono::{DateTime, Utc};
use common::RecordId;
use serde::{Deserialize, Serialize};

use crate::{DomainError, Result};

/// Input for creating or replacing a medicine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewMedicine {
    pub name: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub supplier_id: Option<String>,
}

impl NewMedicine {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A medicine, as carried in `MEDICINE_CREATED` and `MEDICINE_UPDATED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub id: RecordId,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub supplier_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Medicine {
    /// Builds medicine `id` from `input`. The name must not be blank and a
    /// given price must not be negative.
    pub fn with_id(id: RecordId, input: NewMedicine) -> Result<Self> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("Medicine name is required"));
        }
        if input.price.is_some_and(|price| price < 0.0) {
            return Err(DomainError::validation("Medicine price cannot be negative"));
        }

        let now = Utc::now();
        Ok(Self {
            id,
            name: name.to_string(),
            description: input.description,
            price: input.price,
            category: input.category,
            supplier_id: input.supplier_id.filter(|s| !s.trim().is_empty()),
            created_at: now,
            updated_at: now,
        })
    }
}
