use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// A registered sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: String,
    pub sku: String,
    pub amount: i32,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    pub const DEFAULT_SKU: &'static str = "SKU-1";
    pub const DEFAULT_AMOUNT: i32 = 1;

    /// A sale with a fresh `S-<epoch-ms>` id.
    pub fn new(sku: impl Into<String>, amount: i32) -> Self {
        let now = Utc::now().trunc_subsecs(3);
        Self {
            id: format!("S-{}", now.timestamp_millis()),
            sku: sku.into(),
            amount,
            created_at: now,
        }
    }
}
