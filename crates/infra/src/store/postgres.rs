//! Postgres-backed catalog store.
//!
//! ## Reconciliation
//!
//! `reconcile_offers` runs in one transaction:
//!
//! 1. `SELECT ... FOR UPDATE` on the product row (serializes concurrent syncs
//!    of the same product across processes, and fails if it was deleted)
//! 2. load the offers of that product only
//! 3. plan, then execute inserts, updates and deletes scoped by `product_id`
//! 4. commit
//!
//! Any error drops the transaction, which rolls it back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use aggregator_core::{ExternalProductId, OfferId, ProductId};
use aggregator_products::{ExternalOffer, Offer, Product, ProductUpdate, ReconcileSummary, reconcile};

use super::{CatalogStore, StoreError};

#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect and apply the bundled migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;

        info!("postgres catalog store ready");
        Ok(Self::new(pool))
    }

    async fn lock_product(
        tx: &mut Transaction<'_, Postgres>,
        product_id: ProductId,
    ) -> Result<(), StoreError> {
        let row = sqlx::query("SELECT id FROM product WHERE id = $1 FOR UPDATE")
            .bind(product_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_product", e))?;

        match row {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(product_id)),
        }
    }
}

const PRODUCT_COLUMNS: &str = "id, name, description, external_id, created_at, updated_at";
const OFFER_COLUMNS: &str = "id, product_id, price, items_in_stock, last_seen_at, created_at, updated_at";

#[async_trait::async_trait]
impl CatalogStore for PostgresCatalogStore {
    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO product (id, name, description, external_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.description.as_deref())
        .bind(product.external_id.map(Uuid::from))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_registered_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product WHERE external_id IS NOT NULL ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_registered_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self, update), fields(product_id = %id), err)]
    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Product>, StoreError> {
        update.validate()?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE product
            SET name = $2, description = $3, updated_at = $4
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(&update.name)
        .bind(update.description.as_deref())
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        // Offers go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM product WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn list_offers(&self, product_id: ProductId) -> Result<Vec<Offer>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {OFFER_COLUMNS} FROM offer WHERE product_id = $1 ORDER BY id ASC"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_offers", e))?;

        rows.iter().map(offer_from_row).collect()
    }

    #[instrument(
        skip(self, incoming),
        fields(product_id = %product_id, incoming = incoming.len()),
        err
    )]
    async fn reconcile_offers(
        &self,
        product_id: ProductId,
        incoming: &[ExternalOffer],
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        Self::lock_product(&mut tx, product_id).await?;

        let rows = sqlx::query(&format!(
            "SELECT {OFFER_COLUMNS} FROM offer WHERE product_id = $1"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_offers", e))?;
        let existing = rows.iter().map(offer_from_row).collect::<Result<Vec<_>, _>>()?;

        let plan = reconcile::plan(&existing, incoming);

        for external in &plan.inserts {
            let inserted = sqlx::query(
                r#"
                INSERT INTO offer (id, product_id, price, items_in_stock, last_seen_at, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $5, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(external.id.as_uuid())
            .bind(product_id.as_uuid())
            .bind(external.price)
            .bind(external.items_in_stock)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_offer", e))?;

            if inserted.rows_affected() == 0 {
                // The id exists but was not among this product's offers.
                let owner = offer_owner(&mut tx, external.id).await?;
                return Err(StoreError::Conflict {
                    offer_id: external.id,
                    owner,
                });
            }
        }

        for external in &plan.updates {
            sqlx::query(
                r#"
                UPDATE offer
                SET price = $3, items_in_stock = $4, last_seen_at = $5, updated_at = $5
                WHERE id = $1 AND product_id = $2
                "#,
            )
            .bind(external.id.as_uuid())
            .bind(product_id.as_uuid())
            .bind(external.price)
            .bind(external.items_in_stock)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_offer", e))?;
        }

        if !plan.deletes.is_empty() {
            let ids: Vec<Uuid> = plan.deletes.iter().map(|id| Uuid::from(*id)).collect();
            sqlx::query("DELETE FROM offer WHERE product_id = $1 AND id = ANY($2)")
                .bind(product_id.as_uuid())
                .bind(ids)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_offers", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let summary = plan.summary();
        debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            "offers reconciled"
        );
        Ok(summary)
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("postgres pool closed");
        }
    }
}

async fn offer_owner(
    tx: &mut Transaction<'_, Postgres>,
    offer_id: OfferId,
) -> Result<ProductId, StoreError> {
    let row = sqlx::query("SELECT product_id FROM offer WHERE id = $1")
        .bind(offer_id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("offer_owner", e))?;
    let owner: Uuid = row.try_get("product_id").map_err(|e| map_sqlx_error("offer_owner", e))?;
    Ok(ProductId::from_uuid(owner))
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let decode = |e| map_sqlx_error("decode_product", e);
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        external_id: row
            .try_get::<Option<Uuid>, _>("external_id")
            .map_err(decode)?
            .map(ExternalProductId::from_uuid),
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn offer_from_row(row: &PgRow) -> Result<Offer, StoreError> {
    let decode = |e| map_sqlx_error("decode_offer", e);
    Ok(Offer {
        id: OfferId::from_uuid(row.try_get("id").map_err(decode)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
        price: row.try_get("price").map_err(decode)?,
        items_in_stock: row.try_get("items_in_stock").map_err(decode)?,
        last_seen_at: row.try_get("last_seen_at").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Database(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}
