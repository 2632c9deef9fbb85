use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::types::ChainId;

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

/// Get the last scanned block of a chain
pub async fn get_last_scanned_block(pool: &PgPool, chain_id: ChainId) -> Result<Option<u64>> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"SELECT last_scanned_block FROM chain_checkpoints WHERE chain_id = $1"#,
    )
    .bind(chain_id as i64)
    .fetch_optional(pool)
    .await
    .wrap_err_with(|| format!("Failed to get checkpoint for chain {}", chain_id))?;

    Ok(row.map(|r| r.0.max(0) as u64))
}

/// Advance the last scanned block. A lower value than the stored one is ignored.
pub async fn advance_last_scanned_block(
    pool: &PgPool,
    chain_id: ChainId,
    block_number: u64,
) -> Result<u64> {
    let block = i64::try_from(block_number)
        .wrap_err_with(|| format!("block {} out of range", block_number))?;
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO chain_checkpoints (chain_id, last_scanned_block)
        VALUES ($1, $2)
        ON CONFLICT (chain_id) DO UPDATE
            SET last_scanned_block = GREATEST(chain_checkpoints.last_scanned_block, EXCLUDED.last_scanned_block),
                updated_at = NOW()
        RETURNING last_scanned_block
        "#,
    )
    .bind(chain_id as i64)
    .bind(block)
    .fetch_one(pool)
    .await
    .wrap_err_with(|| format!("Failed to update checkpoint for chain {}", chain_id))?;

    Ok(row.0.max(0) as u64)
}
