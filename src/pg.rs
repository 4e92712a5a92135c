use sqlx::{PgExecutor, PgPool, Row};
use tracing::{debug, info};

use crate::allocator;
use crate::error::StoreError;
use crate::models::{header_row, LedgerRow};
use crate::store::{check_width, RecordStore};

/// Advisory lock key held while an id is allocated and its row inserted.
const ALLOCATION_LOCK_KEY: i64 = 0x5355_5256_4559;

/// Ledger rows kept in Postgres, one `TEXT[]` per row, header included.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

async fn fetch_rows<'e, E>(executor: E) -> Result<Vec<LedgerRow>, StoreError>
where
    E: PgExecutor<'e>,
{
    let records = sqlx::query("SELECT cells FROM survey_ledger.rows ORDER BY position")
        .fetch_all(executor)
        .await?;

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        rows.push(record.try_get::<Vec<String>, _>("cells")?);
    }
    Ok(rows)
}

async fn insert_row<'e, E>(executor: E, row: &LedgerRow) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    sqlx::query("INSERT INTO survey_ledger.rows (cells) VALUES ($1)")
        .bind(row.as_slice())
        .execute(executor)
        .await?;
    Ok(())
}

impl RecordStore for PgStore {
    async fn ensure_header(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ALLOCATION_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM survey_ledger.rows")
            .fetch_one(&mut *tx)
            .await?
            .try_get("count")?;
        if count == 0 {
            info!("writing ledger header");
            insert_row(&mut *tx, &header_row()).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<LedgerRow>, StoreError> {
        fetch_rows(&self.pool).await
    }

    async fn append(&self, row: LedgerRow) -> Result<(), StoreError> {
        check_width(&row)?;
        insert_row(&self.pool, &row).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ALLOCATION_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        sqlx::query("TRUNCATE survey_ledger.rows RESTART IDENTITY")
            .execute(&mut *tx)
            .await?;
        insert_row(&mut *tx, &header_row()).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_with_generated_id<F>(&self, build: F) -> Result<u64, StoreError>
    where
        F: FnOnce(u64) -> LedgerRow,
    {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ALLOCATION_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let rows = fetch_rows(&mut *tx).await?;
        let id = allocator::next_id_for_rows(&rows);
        let row = build(id);
        check_width(&row)?;
        insert_row(&mut *tx, &row).await?;

        tx.commit().await?;
        debug!(id, "appended ledger row");
        Ok(id)
    }
}
