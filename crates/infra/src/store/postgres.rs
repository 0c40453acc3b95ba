//! Postgres-backed ledger store.
//!
//! Every ledger transition runs in one transaction:
//!
//! 1. `SELECT ... FOR UPDATE` on the unit row (serializes writers per unit)
//! 2. re-check expected status and version
//! 3. relative counter `UPDATE` on the batch (guarded by table `CHECK` constraints)
//! 4. version-guarded `UPDATE` on the unit
//! 5. reservation insert/delete, movement insert, optional returns-register insert
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (check constraint violation) | `23514` | `InvariantViolation` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / RowNotFound / other | N/A | `Backend` |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tokio::runtime::RuntimeFlavor;
use tracing::instrument;
use uuid::Uuid;

use slabledger_core::{
    AggregateRoot, BatchId, ClientId, MovementId, PoItemId, ReturnId, StockId,
};
use slabledger_stock::codes::piece_number;
use slabledger_stock::{
    Assignment, Batch, BatchCounters, DeliveryMode, DeliveryOrderNo, MovementKind,
    MovementRecord, Reservation, ReservationChange, ReturnEntry, ReturnPhase, StockUnit,
    UnitDetails, UnitStatus,
};

use super::r#trait::{CommittedTransition, LedgerStore, StoreError, TransitionCommit};
use crate::config::DatabaseConfig;

const SCHEMA: &str = include_str!("../../../../migrations/0001_stock_ledger.sql");

const UNIT_COLUMNS: &str = "stock_id, batch_id, po_item_id, item_code, barcode, batch_code, \
     product_name, size, category, colour, status, client_id, delivery_order_no, version";

const BATCH_COLUMNS: &str = "batch_id, po_item_id, batch_code, quantity, out_count, sold_count, \
     returned_count, arrival_date, version";

const RESERVATION_COLUMNS: &str = "stock_id, client_id, delivery_order_no, notes, created_at";

const MOVEMENT_COLUMNS: &str = "movement_id, stock_id, kind, client_id, delivery_order_no, \
     scan_date, recorded_at, delivery_mode, reason";

const RETURN_COLUMNS: &str = "return_id, stock_id, item_codes, product_name, size, batch_code, \
     client_id, client_name, delivery_order_no, colour, reason, is_bulk, phase, return_date";

/// Postgres-backed ledger store.
///
/// `Send + Sync`; clones share the same connection pool. The synchronous
/// `LedgerStore` methods must be called from inside a multi-threaded tokio
/// runtime.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a connection pool sized from configuration.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the ledger tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_unit_where(
        &self,
        column: &str,
        value: UnitKey<'_>,
    ) -> Result<Option<StockUnit>, StoreError> {
        let sql = format!("SELECT {UNIT_COLUMNS} FROM stock_units WHERE {column} = $1");
        let query = sqlx::query(&sql);
        let query = match value {
            UnitKey::Id(id) => query.bind(id),
            UnitKey::Code(code) => query.bind(code),
        };
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_unit", e))?;
        row.map(|r| decode_unit(&r)).transpose()
    }

    #[instrument(skip(self), fields(batch_id = %batch_id), err)]
    pub async fn fetch_units_in_batch(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<StockUnit>, StoreError> {
        let sql = format!(
            "SELECT {UNIT_COLUMNS} FROM stock_units WHERE batch_id = $1 ORDER BY piece_no ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(batch_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_units_in_batch", e))?;
        rows.iter().map(decode_unit).collect()
    }

    async fn fetch_batch_where(
        &self,
        column: &str,
        value: Uuid,
    ) -> Result<Option<Batch>, StoreError> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM stock_batches WHERE {column} = $1");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_batch", e))?;
        row.map(|r| decode_batch(&r)).transpose()
    }

    #[instrument(skip(self), fields(stock_id = %stock_id), err)]
    pub async fn fetch_reservation(
        &self,
        stock_id: StockId,
    ) -> Result<Option<Reservation>, StoreError> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM stock_reservations WHERE stock_id = $1");
        let row = sqlx::query(&sql)
            .bind(stock_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_reservation", e))?;
        row.map(|r| decode_reservation(&r)).transpose()
    }

    #[instrument(skip(self), fields(stock_id = %stock_id), err)]
    pub async fn fetch_movements(
        &self,
        stock_id: StockId,
    ) -> Result<Vec<MovementRecord>, StoreError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE stock_id = $1 ORDER BY seq ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(stock_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_movements", e))?;
        rows.iter().map(decode_movement).collect()
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_returns(&self) -> Result<Vec<ReturnEntry>, StoreError> {
        let sql = format!("SELECT {RETURN_COLUMNS} FROM stock_returns ORDER BY seq DESC");
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_returns", e))?;
        rows.iter().map(decode_return).collect()
    }

    async fn fetch_client_name(&self, client_id: ClientId) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT name FROM clients WHERE client_id = $1")
            .bind(client_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_client_name", e))?;
        row.map(|r| column(&r, "name")).transpose()
    }

    /// Apply one ledger transition in a single transaction.
    #[instrument(
        skip(self, commit),
        fields(
            stock_id = %commit.stock_id,
            from = %commit.expected_status,
            to = %commit.to,
            expected_version = ?commit.expected_version
        ),
        err
    )]
    pub async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<CommittedTransition, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let sql = format!("SELECT {UNIT_COLUMNS} FROM stock_units WHERE stock_id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(commit.stock_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_unit", e))?;
        let Some(row) = row else {
            return rollback(
                tx,
                StoreError::NotFound(format!("stock unit {}", commit.stock_id)),
            )
            .await;
        };
        let mut unit = decode_unit(&row)?;

        if unit.status() != commit.expected_status {
            let err = StoreError::Conflict(format!(
                "stock unit {} is {}, expected {}",
                unit.item_code(),
                unit.status(),
                commit.expected_status
            ));
            return rollback(tx, err).await;
        }
        if let Err(e) = commit.expected_version.check(unit.version()) {
            return rollback(tx, e.into()).await;
        }
        if unit.batch_id() != commit.batch_id {
            let err = StoreError::InvariantViolation(format!(
                "stock unit {} does not belong to batch {}",
                unit.item_code(),
                commit.batch_id
            ));
            return rollback(tx, err).await;
        }

        let sql = format!(
            "UPDATE stock_batches \
             SET out_count = out_count + $2, \
                 sold_count = sold_count + $3, \
                 returned_count = returned_count + $4, \
                 version = version + 1 \
             WHERE batch_id = $1 \
             RETURNING {BATCH_COLUMNS}"
        );
        let batch_row = sqlx::query(&sql)
            .bind(commit.batch_id.as_uuid())
            .bind(commit.counters.out)
            .bind(commit.counters.sold)
            .bind(commit.counters.returned)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_batch_counters", e))?;
        let Some(batch_row) = batch_row else {
            return rollback(tx, StoreError::NotFound(format!("batch {}", commit.batch_id)))
                .await;
        };
        let batch = decode_batch(&batch_row)?;

        let expected_version = unit.version();
        unit.transition(commit.to, commit.assignment.clone());
        let assignment = unit.assignment().cloned();
        let updated = sqlx::query(
            r#"
            UPDATE stock_units
            SET status = $2, client_id = $3, delivery_order_no = $4, version = version + 1
            WHERE stock_id = $1 AND version = $5
            "#,
        )
        .bind(commit.stock_id.as_uuid())
        .bind(unit.status().as_str())
        .bind(assignment.as_ref().map(|a| *a.client_id.as_uuid()))
        .bind(assignment.as_ref().map(|a| a.delivery_order_no.as_str().to_string()))
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_unit", e))?;
        if updated.rows_affected() == 0 {
            let err = StoreError::Conflict(format!(
                "stock unit {} changed concurrently",
                unit.item_code()
            ));
            return rollback(tx, err).await;
        }

        match commit.reservation {
            ReservationChange::Open => {
                let Some(assignment) = assignment else {
                    let err = StoreError::InvariantViolation(format!(
                        "cannot reserve stock unit {} without an assignment",
                        unit.item_code()
                    ));
                    return rollback(tx, err).await;
                };
                sqlx::query(
                    r#"
                    INSERT INTO stock_reservations (stock_id, client_id, delivery_order_no, notes, created_at)
                    VALUES ($1, $2, $3, '', $4)
                    "#,
                )
                .bind(commit.stock_id.as_uuid())
                .bind(assignment.client_id.as_uuid())
                .bind(assignment.delivery_order_no.as_str())
                .bind(commit.movement.recorded_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        StoreError::InvariantViolation(format!(
                            "stock unit {} already has a reservation",
                            commit.stock_id
                        ))
                    } else {
                        map_sqlx_error("insert_reservation", e)
                    }
                })?;
            }
            ReservationChange::Close => {
                sqlx::query("DELETE FROM stock_reservations WHERE stock_id = $1")
                    .bind(commit.stock_id.as_uuid())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("delete_reservation", e))?;
            }
        }

        insert_movement(&mut tx, &commit.movement).await?;
        if let Some(entry) = &commit.return_entry {
            insert_return(&mut tx, entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(CommittedTransition {
            unit,
            batch,
            movement: commit.movement,
            return_entry: commit.return_entry,
        })
    }

    #[instrument(
        skip(self, batch, units),
        fields(batch_code = %batch.code(), unit_count = units.len()),
        err
    )]
    pub async fn insert_batch(
        &self,
        batch: Batch,
        units: Vec<StockUnit>,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO stock_batches (
                batch_id, po_item_id, batch_code, quantity,
                out_count, sold_count, returned_count, arrival_date, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(batch.id_typed().as_uuid())
        .bind(batch.po_item_id().as_uuid())
        .bind(batch.code())
        .bind(batch.quantity())
        .bind(batch.out())
        .bind(batch.sold())
        .bind(batch.returned())
        .bind(batch.arrival_date())
        .bind(batch.version() as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "purchase-order item {} already has a batch",
                    batch.po_item_id()
                ))
            } else {
                map_sqlx_error("insert_batch", e)
            }
        })?;

        for unit in &units {
            let details = unit.details();
            sqlx::query(
                r#"
                INSERT INTO stock_units (
                    stock_id, batch_id, po_item_id, item_code, barcode, batch_code, piece_no,
                    product_name, size, category, colour, status, version
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(unit.id_typed().as_uuid())
            .bind(unit.batch_id().as_uuid())
            .bind(unit.po_item_id().as_uuid())
            .bind(unit.item_code())
            .bind(unit.barcode())
            .bind(unit.batch_code())
            .bind(piece_number(unit.item_code()).unwrap_or(0))
            .bind(&details.product_name)
            .bind(&details.size)
            .bind(&details.category)
            .bind(details.colour.as_deref())
            .bind(unit.status().as_str())
            .bind(unit.version() as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_unit", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(po_item_id = %po_item_id), err)]
    pub async fn receive_item_units(
        &self,
        po_item_id: PoItemId,
    ) -> Result<Vec<StockUnit>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query("SELECT batch_id FROM stock_batches WHERE po_item_id = $1")
            .bind(po_item_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("find_batch", e))?;
        let Some(row) = row else {
            let err =
                StoreError::NotFound(format!("no batch for purchase-order item {po_item_id}"));
            return rollback(tx, err).await;
        };
        let batch_id: Uuid = column(&row, "batch_id")?;

        let sql = format!(
            "UPDATE stock_units \
             SET status = $2, version = version + 1 \
             WHERE batch_id = $1 AND status = $3 \
             RETURNING {UNIT_COLUMNS}"
        );
        let rows = sqlx::query(&sql)
            .bind(batch_id)
            .bind(UnitStatus::Available.as_str())
            .bind(UnitStatus::QrGenerated.as_str())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("receive_units", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let mut units = rows.iter().map(decode_unit).collect::<Result<Vec<_>, _>>()?;
        units.sort_by_key(|u| piece_number(u.item_code()));
        Ok(units)
    }

    #[instrument(skip(self, notes), fields(stock_id = %stock_id), err)]
    pub async fn update_reservation_notes(
        &self,
        stock_id: StockId,
        notes: String,
    ) -> Result<Reservation, StoreError> {
        let sql = format!(
            "UPDATE stock_reservations SET notes = $2 WHERE stock_id = $1 \
             RETURNING {RESERVATION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(stock_id.as_uuid())
            .bind(&notes)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_reservation_notes", e))?;
        match row {
            Some(row) => decode_reservation(&row),
            None => Err(StoreError::NotFound(format!(
                "no reservation for stock unit {stock_id}"
            ))),
        }
    }
}

enum UnitKey<'a> {
    Id(Uuid),
    Code(&'a str),
}

async fn rollback<T>(tx: Transaction<'_, Postgres>, err: StoreError) -> Result<T, StoreError> {
    tx.rollback()
        .await
        .map_err(|e| map_sqlx_error("rollback", e))?;
    Err(err)
}

async fn insert_movement(
    tx: &mut Transaction<'_, Postgres>,
    movement: &MovementRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            movement_id, stock_id, kind, client_id, delivery_order_no,
            scan_date, recorded_at, delivery_mode, reason
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(movement.movement_id.as_uuid())
    .bind(movement.stock_id.as_uuid())
    .bind(movement.kind.as_str())
    .bind(movement.client_id.map(Uuid::from))
    .bind(movement.delivery_order_no.as_ref().map(|d| d.as_str().to_string()))
    .bind(movement.scan_date)
    .bind(movement.recorded_at)
    .bind(movement.delivery_mode.map(|m| m.as_str()))
    .bind(movement.reason.as_deref())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;
    Ok(())
}

async fn insert_return(
    tx: &mut Transaction<'_, Postgres>,
    entry: &ReturnEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO stock_returns (
            return_id, stock_id, item_codes, product_name, size, batch_code, client_id,
            client_name, delivery_order_no, colour, reason, is_bulk, phase, return_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(entry.return_id.as_uuid())
    .bind(entry.stock_id.as_uuid())
    .bind(&entry.item_codes)
    .bind(&entry.product_name)
    .bind(&entry.size)
    .bind(&entry.batch_code)
    .bind(entry.client_id.map(Uuid::from))
    .bind(&entry.client_name)
    .bind(entry.delivery_order_no.as_ref().map(|d| d.as_str().to_string()))
    .bind(&entry.colour)
    .bind(&entry.reason)
    .bind(entry.is_bulk)
    .bind(entry.phase.as_str())
    .bind(entry.return_date)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_return", e))?;
    Ok(())
}

/// Run a pool future from the synchronous trait surface.
///
/// `block_in_place` keeps the calling worker from stalling the runtime, which
/// means these calls need the multi-threaded scheduler.
fn block_on<F, T>(fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Backend(
            "PostgresLedgerStore requires a tokio runtime; call it from within one".to_string(),
        )
    })?;
    if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
        return Err(StoreError::Backend(
            "PostgresLedgerStore requires the multi-threaded tokio runtime".to_string(),
        ));
    }
    tokio::task::block_in_place(|| handle.block_on(fut))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23514") => StoreError::InvariantViolation(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Backend(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("failed to read column {name}: {e}")))
}

fn decode<'r, R>(row: &'r PgRow, what: &str) -> Result<R, StoreError>
where
    R: FromRow<'r, PgRow>,
{
    R::from_row(row)
        .map_err(|e| StoreError::Backend(format!("failed to deserialize {what} row: {e}")))
}

fn decode_unit(row: &PgRow) -> Result<StockUnit, StoreError> {
    decode::<UnitRow>(row, "stock unit")?.try_into()
}

fn decode_batch(row: &PgRow) -> Result<Batch, StoreError> {
    decode::<BatchRow>(row, "batch")?.try_into()
}

fn decode_reservation(row: &PgRow) -> Result<Reservation, StoreError> {
    decode::<ReservationRow>(row, "reservation")?.try_into()
}

fn decode_movement(row: &PgRow) -> Result<MovementRecord, StoreError> {
    decode::<MovementRow>(row, "movement")?.try_into()
}

fn decode_return(row: &PgRow) -> Result<ReturnEntry, StoreError> {
    decode::<ReturnRow>(row, "return")?.try_into()
}

fn assignment_from(
    client_id: Option<Uuid>,
    delivery_order_no: Option<String>,
) -> Result<Option<Assignment>, StoreError> {
    match (client_id, delivery_order_no) {
        (Some(client_id), Some(delivery_order_no)) => Ok(Some(Assignment {
            client_id: ClientId::from_uuid(client_id),
            delivery_order_no: DeliveryOrderNo::parse(delivery_order_no)?,
        })),
        (None, None) => Ok(None),
        _ => Err(StoreError::InvariantViolation(
            "assignment row has a client without a delivery order (or vice versa)".to_string(),
        )),
    }
}

fn delivery_order_from(raw: Option<String>) -> Result<Option<DeliveryOrderNo>, StoreError> {
    raw.map(DeliveryOrderNo::parse).transpose().map_err(Into::into)
}

// SQLx row types

#[derive(Debug)]
struct UnitRow {
    stock_id: Uuid,
    batch_id: Uuid,
    po_item_id: Uuid,
    item_code: String,
    barcode: String,
    batch_code: String,
    product_name: String,
    size: String,
    category: String,
    colour: Option<String>,
    status: String,
    client_id: Option<Uuid>,
    delivery_order_no: Option<String>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for UnitRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UnitRow {
            stock_id: row.try_get("stock_id")?,
            batch_id: row.try_get("batch_id")?,
            po_item_id: row.try_get("po_item_id")?,
            item_code: row.try_get("item_code")?,
            barcode: row.try_get("barcode")?,
            batch_code: row.try_get("batch_code")?,
            product_name: row.try_get("product_name")?,
            size: row.try_get("size")?,
            category: row.try_get("category")?,
            colour: row.try_get("colour")?,
            status: row.try_get("status")?,
            client_id: row.try_get("client_id")?,
            delivery_order_no: row.try_get("delivery_order_no")?,
            version: row.try_get("version")?,
        })
    }
}

impl TryFrom<UnitRow> for StockUnit {
    type Error = StoreError;

    fn try_from(row: UnitRow) -> Result<Self, Self::Error> {
        let status = UnitStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Backend(format!("unknown unit status '{}'", row.status)))?;
        let assignment = assignment_from(row.client_id, row.delivery_order_no)?;
        Ok(StockUnit::restore(
            StockId::from_uuid(row.stock_id),
            BatchId::from_uuid(row.batch_id),
            PoItemId::from_uuid(row.po_item_id),
            row.item_code,
            row.barcode,
            row.batch_code,
            UnitDetails {
                product_name: row.product_name,
                size: row.size,
                category: row.category,
                colour: row.colour,
            },
            status,
            assignment,
            row.version as u64,
        ))
    }
}

#[derive(Debug)]
struct BatchRow {
    batch_id: Uuid,
    po_item_id: Uuid,
    batch_code: String,
    quantity: i64,
    out_count: i64,
    sold_count: i64,
    returned_count: i64,
    arrival_date: NaiveDate,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for BatchRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BatchRow {
            batch_id: row.try_get("batch_id")?,
            po_item_id: row.try_get("po_item_id")?,
            batch_code: row.try_get("batch_code")?,
            quantity: row.try_get("quantity")?,
            out_count: row.try_get("out_count")?,
            sold_count: row.try_get("sold_count")?,
            returned_count: row.try_get("returned_count")?,
            arrival_date: row.try_get("arrival_date")?,
            version: row.try_get("version")?,
        })
    }
}

impl TryFrom<BatchRow> for Batch {
    type Error = StoreError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        Ok(Batch::restore(
            BatchId::from_uuid(row.batch_id),
            PoItemId::from_uuid(row.po_item_id),
            row.batch_code,
            BatchCounters {
                quantity: row.quantity,
                out: row.out_count,
                sold: row.sold_count,
                returned: row.returned_count,
            },
            row.arrival_date,
            row.version as u64,
        )?)
    }
}

#[derive(Debug)]
struct ReservationRow {
    stock_id: Uuid,
    client_id: Uuid,
    delivery_order_no: String,
    notes: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ReservationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReservationRow {
            stock_id: row.try_get("stock_id")?,
            client_id: row.try_get("client_id")?,
            delivery_order_no: row.try_get("delivery_order_no")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            stock_id: StockId::from_uuid(row.stock_id),
            assignment: Assignment {
                client_id: ClientId::from_uuid(row.client_id),
                delivery_order_no: DeliveryOrderNo::parse(row.delivery_order_no)?,
            },
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct MovementRow {
    movement_id: Uuid,
    stock_id: Uuid,
    kind: String,
    client_id: Option<Uuid>,
    delivery_order_no: Option<String>,
    scan_date: NaiveDate,
    recorded_at: DateTime<Utc>,
    delivery_mode: Option<String>,
    reason: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            movement_id: row.try_get("movement_id")?,
            stock_id: row.try_get("stock_id")?,
            kind: row.try_get("kind")?,
            client_id: row.try_get("client_id")?,
            delivery_order_no: row.try_get("delivery_order_no")?,
            scan_date: row.try_get("scan_date")?,
            recorded_at: row.try_get("recorded_at")?,
            delivery_mode: row.try_get("delivery_mode")?,
            reason: row.try_get("reason")?,
        })
    }
}

impl TryFrom<MovementRow> for MovementRecord {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let kind = MovementKind::parse(&row.kind)
            .ok_or_else(|| StoreError::Backend(format!("unknown movement kind '{}'", row.kind)))?;
        let delivery_mode = row
            .delivery_mode
            .map(|m| {
                DeliveryMode::parse(&m)
                    .ok_or_else(|| StoreError::Backend(format!("unknown delivery mode '{m}'")))
            })
            .transpose()?;
        Ok(MovementRecord {
            movement_id: MovementId::from_uuid(row.movement_id),
            stock_id: StockId::from_uuid(row.stock_id),
            kind,
            client_id: row.client_id.map(ClientId::from_uuid),
            delivery_order_no: delivery_order_from(row.delivery_order_no)?,
            scan_date: row.scan_date,
            recorded_at: row.recorded_at,
            delivery_mode,
            reason: row.reason,
        })
    }
}

#[derive(Debug)]
struct ReturnRow {
    return_id: Uuid,
    stock_id: Uuid,
    item_codes: Vec<String>,
    product_name: String,
    size: String,
    batch_code: String,
    client_id: Option<Uuid>,
    client_name: String,
    delivery_order_no: Option<String>,
    colour: String,
    reason: String,
    is_bulk: bool,
    phase: String,
    return_date: NaiveDate,
}

impl<'r> FromRow<'r, PgRow> for ReturnRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReturnRow {
            return_id: row.try_get("return_id")?,
            stock_id: row.try_get("stock_id")?,
            item_codes: row.try_get("item_codes")?,
            product_name: row.try_get("product_name")?,
            size: row.try_get("size")?,
            batch_code: row.try_get("batch_code")?,
            client_id: row.try_get("client_id")?,
            client_name: row.try_get("client_name")?,
            delivery_order_no: row.try_get("delivery_order_no")?,
            colour: row.try_get("colour")?,
            reason: row.try_get("reason")?,
            is_bulk: row.try_get("is_bulk")?,
            phase: row.try_get("phase")?,
            return_date: row.try_get("return_date")?,
        })
    }
}

impl TryFrom<ReturnRow> for ReturnEntry {
    type Error = StoreError;

    fn try_from(row: ReturnRow) -> Result<Self, Self::Error> {
        let phase = ReturnPhase::parse(&row.phase)
            .ok_or_else(|| StoreError::Backend(format!("unknown return phase '{}'", row.phase)))?;
        Ok(ReturnEntry {
            return_id: ReturnId::from_uuid(row.return_id),
            stock_id: StockId::from_uuid(row.stock_id),
            item_codes: row.item_codes,
            product_name: row.product_name,
            size: row.size,
            batch_code: row.batch_code,
            client_id: row.client_id.map(ClientId::from_uuid),
            client_name: row.client_name,
            delivery_order_no: delivery_order_from(row.delivery_order_no)?,
            colour: row.colour,
            reason: row.reason,
            is_bulk: row.is_bulk,
            phase,
            return_date: row.return_date,
        })
    }
}

// Implement LedgerStore trait

impl LedgerStore for PostgresLedgerStore {
    fn unit(&self, stock_id: StockId) -> Result<Option<StockUnit>, StoreError> {
        block_on(self.fetch_unit_where("stock_id", UnitKey::Id(*stock_id.as_uuid())))
    }

    fn unit_by_barcode(&self, barcode: &str) -> Result<Option<StockUnit>, StoreError> {
        block_on(self.fetch_unit_where("barcode", UnitKey::Code(barcode)))
    }

    fn unit_by_item_code(&self, item_code: &str) -> Result<Option<StockUnit>, StoreError> {
        block_on(self.fetch_unit_where("item_code", UnitKey::Code(item_code)))
    }

    fn units_in_batch(&self, batch_id: BatchId) -> Result<Vec<StockUnit>, StoreError> {
        block_on(self.fetch_units_in_batch(batch_id))
    }

    fn batch(&self, batch_id: BatchId) -> Result<Option<Batch>, StoreError> {
        block_on(self.fetch_batch_where("batch_id", *batch_id.as_uuid()))
    }

    fn batch_for_po_item(&self, po_item_id: PoItemId) -> Result<Option<Batch>, StoreError> {
        block_on(self.fetch_batch_where("po_item_id", *po_item_id.as_uuid()))
    }

    fn reservation(&self, stock_id: StockId) -> Result<Option<Reservation>, StoreError> {
        block_on(self.fetch_reservation(stock_id))
    }

    fn movements(&self, stock_id: StockId) -> Result<Vec<MovementRecord>, StoreError> {
        block_on(self.fetch_movements(stock_id))
    }

    fn returns(&self) -> Result<Vec<ReturnEntry>, StoreError> {
        block_on(self.fetch_returns())
    }

    fn client_name(&self, client_id: ClientId) -> Result<Option<String>, StoreError> {
        block_on(self.fetch_client_name(client_id))
    }

    fn commit(&self, commit: TransitionCommit) -> Result<CommittedTransition, StoreError> {
        block_on(self.commit_transition(commit))
    }

    fn register_batch(&self, batch: Batch, units: Vec<StockUnit>) -> Result<(), StoreError> {
        block_on(self.insert_batch(batch, units))
    }

    fn receive_units(&self, po_item_id: PoItemId) -> Result<Vec<StockUnit>, StoreError> {
        block_on(self.receive_item_units(po_item_id))
    }

    fn set_reservation_notes(
        &self,
        stock_id: StockId,
        notes: String,
    ) -> Result<Reservation, StoreError> {
        block_on(self.update_reservation_notes(stock_id, notes))
    }
}
