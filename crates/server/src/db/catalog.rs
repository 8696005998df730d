//! Products and variants.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use sagebrush_core::{ProductId, VariantId};

use super::RepositoryError;
use crate::models::{CreateProductInput, CreateVariantInput, InventoryChange, Product, ProductVariant};

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    title: String,
    handle: String,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            title: row.title,
            handle: row.handle,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: i32,
    product_id: i32,
    sku: String,
    title: String,
    inventory_quantity: i32,
    low_stock_threshold: Option<i32>,
    updated_at: DateTime<Utc>,
}

impl From<VariantRow> for ProductVariant {
    fn from(row: VariantRow) -> Self {
        Self {
            id: VariantId::new(row.id),
            product_id: ProductId::new(row.product_id),
            sku: row.sku,
            title: row.title,
            inventory_quantity: row.inventory_quantity,
            low_stock_threshold: row.low_stock_threshold,
            updated_at: row.updated_at,
        }
    }
}

const VARIANT_COLUMNS: &str =
    "id, product_id, sku, title, inventory_quantity, low_stock_threshold, updated_at";

/// Repository for the product catalog.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the handle is taken.
    pub async fn create_product(&self, input: &CreateProductInput) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO commerce.product (title, handle)
            VALUES ($1, $2)
            RETURNING id, title, handle, created_at
            ",
        )
        .bind(&input.title)
        .bind(&input.handle)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "product handle"))?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn product_exists(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM commerce.product WHERE id = $1)")
                .bind(id)
                .fetch_one(self.pool)
                .await?;
        Ok(exists)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown product and
    /// `RepositoryError::Conflict` if the SKU is taken.
    pub async fn create_variant(
        &self,
        product_id: ProductId,
        input: &CreateVariantInput,
    ) -> Result<ProductVariant, RepositoryError> {
        if !self.product_exists(product_id).await? {
            return Err(RepositoryError::NotFound);
        }

        let sql = format!(
            r"
            INSERT INTO commerce.product_variant
                (product_id, sku, title, inventory_quantity, low_stock_threshold)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {VARIANT_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, VariantRow>(&sql)
            .bind(product_id)
            .bind(&input.sku)
            .bind(&input.title)
            .bind(input.inventory_quantity)
            .bind(input.low_stock_threshold)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "variant sku"))?;

        Ok(row.into())
    }

    /// Apply a stock change in a single statement.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown variant.
    pub async fn update_inventory(
        &self,
        id: VariantId,
        change: InventoryChange,
    ) -> Result<ProductVariant, RepositoryError> {
        let (set, delta) = match change {
            InventoryChange::Set(quantity) => (Some(quantity), 0),
            InventoryChange::Adjust(delta) => (None, delta),
        };
        let sql = format!(
            r"
            UPDATE commerce.product_variant
            SET inventory_quantity = COALESCE($2, inventory_quantity + $3),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {VARIANT_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, VariantRow>(&sql)
            .bind(id)
            .bind(set)
            .bind(delta)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }
}
