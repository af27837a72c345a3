pub mod catalog_config;
pub mod credentials;
pub(crate) mod dbutils;
pub mod namespace;
pub mod pagination;
pub mod table;

use icefloe_rest::ErrorModel;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres};

use crate::CONFIG;
use dbutils::DBErrorHandler as _;

/// Handle on the backing Postgres pools. Reads go to the read pool,
/// transactions to the write pool.
#[derive(Debug, Clone)]
pub struct CatalogState {
    read_pool: PgPool,
    write_pool: PgPool,
}

impl CatalogState {
    #[must_use]
    pub fn from_pools(read_pool: PgPool, write_pool: PgPool) -> Self {
        Self {
            read_pool,
            write_pool,
        }
    }

    #[must_use]
    pub fn read_pool(&self) -> PgPool {
        self.read_pool.clone()
    }

    #[must_use]
    pub fn write_pool(&self) -> PgPool {
        self.write_pool.clone()
    }
}

#[must_use]
pub fn build_pool_opts() -> PgPoolOptions {
    PgPoolOptions::new().acquire_timeout(CONFIG.pg_acquire_timeout())
}

pub async fn get_reader_pool(opts: PgPoolOptions) -> anyhow::Result<PgPool> {
    let pool = opts
        .max_connections(CONFIG.pg_read_pool_connections)
        .connect(CONFIG.pg_read_url())
        .await?;
    Ok(pool)
}

pub async fn get_writer_pool(opts: PgPoolOptions) -> anyhow::Result<PgPool> {
    let pool = opts
        .max_connections(CONFIG.pg_write_pool_connections)
        .connect(&CONFIG.pg_database_url)
        .await?;
    Ok(pool)
}

/// Apply the embedded migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}

/// A live backend transaction. Every mutating request holds exactly one
/// of these for its full duration; dropping it without `commit` rolls
/// back, which is what makes cancellation effect-free.
#[derive(Debug)]
pub struct PostgresTransaction {
    transaction: sqlx::Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    pub async fn begin_write(state: CatalogState) -> Result<Self, ErrorModel> {
        let transaction = state
            .write_pool
            .begin()
            .await
            .map_err(|e| e.into_error_model("Failed to begin write transaction"))?;
        Ok(Self { transaction })
    }

    pub async fn begin_read(state: CatalogState) -> Result<Self, ErrorModel> {
        let transaction = state
            .read_pool
            .begin()
            .await
            .map_err(|e| e.into_error_model("Failed to begin read transaction"))?;
        Ok(Self { transaction })
    }

    pub fn transaction(&mut self) -> &mut sqlx::Transaction<'static, Postgres> {
        &mut self.transaction
    }

    pub async fn commit(self) -> Result<(), ErrorModel> {
        self.transaction
            .commit()
            .await
            .map_err(|e| e.into_error_model("Failed to commit transaction"))
    }

    pub async fn rollback(self) -> Result<(), ErrorModel> {
        self.transaction
            .rollback()
            .await
            .map_err(|e| e.into_error_model("Failed to roll back transaction"))
    }
}
