use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{Sale, SaleRepository, clamp_limit};
use crate::Result;

/// PostgreSQL-backed sales store.
#[derive(Clone)]
pub struct PostgresSaleRepository {
    pool: PgPool,
}

impl PostgresSaleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_sale(row: PgRow) -> Result<Sale> {
        Ok(Sale {
            id: row.try_get("id")?,
            sku: row.try_get("sku")?,
            amount: row.try_get("amount")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl SaleRepository for PostgresSaleRepository {
    async fn save(&self, sale: &Sale) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO sales (id, sku, amount, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.sku)
        .bind(sale.amount)
        .bind(sale.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list(&self, limit: u32) -> Result<Vec<Sale>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sku, amount, created_at
            FROM sales
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(clamp_limit(limit)))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_sale).collect()
    }
}
