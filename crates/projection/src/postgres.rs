use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DriverAddress, LogPosition, TxHash, ViolationId};
use ledger::{DriverAggregate, ViolationRecord};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{ProjectionError, Result, SyncCursor, store::ProjectionStore};

/// PostgreSQL-backed projection store.
#[derive(Clone)]
pub struct PostgresProjectionStore {
    pool: PgPool,
}

impl PostgresProjectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("projection schema migrated");
        Ok(())
    }

    fn row_to_driver(row: PgRow) -> Result<DriverAggregate> {
        let address: String = row.try_get("address")?;
        let address = DriverAddress::parse(&address)
            .map_err(|e| ProjectionError::Corrupt(format!("driver address: {e}")))?;
        Ok(DriverAggregate {
            address,
            total_points: row.try_get::<i32, _>("total_points")? as u32,
            violation_count: row.try_get::<i32, _>("violation_count")? as u32,
            is_suspended: row.try_get("is_suspended")?,
        })
    }

    fn row_to_violation(row: PgRow) -> Result<ViolationRecord> {
        let address: String = row.try_get("driver_address")?;
        let driver_address = DriverAddress::parse(&address)
            .map_err(|e| ProjectionError::Corrupt(format!("driver address: {e}")))?;
        let tx_hash: String = row.try_get("transaction_hash")?;
        let tx_hash = TxHash::parse(&tx_hash)
            .map_err(|e| ProjectionError::Corrupt(format!("transaction hash: {e}")))?;

        Ok(ViolationRecord {
            violation_id: ViolationId::new(row.try_get::<i64, _>("violation_id")? as u64),
            driver_address,
            points: row.try_get::<i32, _>("points")? as u32,
            violation_type: row.try_get("violation_type")?,
            occurred_at: row.try_get("occurred_at")?,
            is_revoked: row.try_get("is_revoked")?,
            position: LogPosition::new(
                row.try_get::<i64, _>("block_number")? as u64,
                row.try_get::<i32, _>("log_index")? as u32,
            ),
            tx_hash,
        })
    }
}

#[async_trait]
impl ProjectionStore for PostgresProjectionStore {
    async fn upsert_driver(&self, aggregate: &DriverAggregate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO drivers (address, total_points, violation_count, is_suspended)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (address) DO UPDATE SET
                total_points = EXCLUDED.total_points,
                violation_count = EXCLUDED.violation_count,
                is_suspended = EXCLUDED.is_suspended,
                updated_at = NOW()
            "#,
        )
        .bind(aggregate.address.to_string())
        .bind(aggregate.total_points as i32)
        .bind(aggregate.violation_count as i32)
        .bind(aggregate.is_suspended)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_violation(&self, record: &ViolationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO violations (
                violation_id, driver_address, points, violation_type,
                occurred_at, is_revoked, block_number, log_index, transaction_hash
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (violation_id) DO UPDATE SET
                points = EXCLUDED.points,
                violation_type = EXCLUDED.violation_type,
                is_revoked = EXCLUDED.is_revoked,
                block_number = EXCLUDED.block_number,
                log_index = EXCLUDED.log_index,
                transaction_hash = EXCLUDED.transaction_hash,
                updated_at = NOW()
            "#,
        )
        .bind(record.violation_id.as_u64() as i64)
        .bind(record.driver_address.to_string())
        .bind(record.points as i32)
        .bind(&record.violation_type)
        .bind(record.occurred_at)
        .bind(record.is_revoked)
        .bind(record.position.block_number as i64)
        .bind(record.position.log_index as i32)
        .bind(record.tx_hash.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_driver(&self, address: DriverAddress) -> Result<Option<DriverAggregate>> {
        let row = sqlx::query(
            r#"
            SELECT address, total_points, violation_count, is_suspended
            FROM drivers
            WHERE address = $1
            "#,
        )
        .bind(address.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_driver).transpose()
    }

    async fn get_violation(&self, violation_id: ViolationId) -> Result<Option<ViolationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT violation_id, driver_address, points, violation_type,
                   occurred_at, is_revoked, block_number, log_index, transaction_hash
            FROM violations
            WHERE violation_id = $1
            "#,
        )
        .bind(violation_id.as_u64() as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_violation).transpose()
    }

    async fn violations_for_driver(&self, address: DriverAddress) -> Result<Vec<ViolationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT violation_id, driver_address, points, violation_type,
                   occurred_at, is_revoked, block_number, log_index, transaction_hash
            FROM violations
            WHERE driver_address = $1
            ORDER BY violation_id DESC
            "#,
        )
        .bind(address.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_violation).collect()
    }

    async fn get_cursor(&self) -> Result<SyncCursor> {
        let row = sqlx::query(
            "SELECT last_block_number, last_log_index, last_sync_time FROM sync_status WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ProjectionError::Corrupt("sync_status singleton row missing".to_string()))?;

        let block: Option<i64> = row.try_get("last_block_number")?;
        let index: Option<i32> = row.try_get("last_log_index")?;
        let position = match (block, index) {
            (Some(block), Some(index)) => Some(LogPosition::new(block as u64, index as u32)),
            _ => None,
        };

        Ok(SyncCursor {
            position,
            last_sync_time: row.try_get::<DateTime<Utc>, _>("last_sync_time")?,
        })
    }

    async fn advance_cursor(&self, position: LogPosition) -> Result<()> {
        // Monotonic guard: a stale position leaves the cursor where it is
        // but still counts as a completed pass for staleness tracking.
        let updated = sqlx::query(
            r#"
            UPDATE sync_status
            SET last_block_number = $1, last_log_index = $2, last_sync_time = NOW()
            WHERE id = 1
              AND (last_block_number IS NULL
                   OR (last_block_number, last_log_index) <= ($1, $2))
            "#,
        )
        .bind(position.block_number as i64)
        .bind(position.log_index as i32)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            self.touch_sync_time().await?;
        }
        Ok(())
    }

    async fn touch_sync_time(&self) -> Result<()> {
        sqlx::query("UPDATE sync_status SET last_sync_time = NOW() WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
