use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Sale;
use crate::Result;

/// Largest page `list` returns.
pub const MAX_LIST_LIMIT: u32 = 200;

/// Limit used when the caller gives none.
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Clamps a requested page size into `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_LIST_LIMIT)
}

/// Storage for sales.
#[async_trait]
pub trait SaleRepository: Send + Sync {
    /// Inserts the sale unless its id is already stored. Returns whether a
    /// row was written.
    async fn save(&self, sale: &Sale) -> Result<bool>;

    /// Most recent sales first, at most `limit` (clamped to 200).
    async fn list(&self, limit: u32) -> Result<Vec<Sale>>;
}

/// In-memory sales store used when no database is configured.
#[derive(Default)]
pub struct InMemorySaleRepository {
    sales: RwLock<HashMap<String, Sale>>,
}

impl InMemorySaleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SaleRepository for InMemorySaleRepository {
    async fn save(&self, sale: &Sale) -> Result<bool> {
        let mut sales = self.sales.write().await;
        if sales.contains_key(&sale.id) {
            return Ok(false);
        }
        sales.insert(sale.id.clone(), sale.clone());
        Ok(true)
    }

    async fn list(&self, limit: u32) -> Result<Vec<Sale>> {
        let sales = self.sales.read().await;
        let mut all: Vec<Sale> = sales.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        all.truncate(clamp_limit(limit) as usize);
        Ok(all)
    }
}
