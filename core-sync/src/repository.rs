//! # Sync Run Repository
//!
//! Persists the run history read by `nrpti-sync status` and by
//! operator-facing tooling.

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

use crate::job::{RunCounters, RunStatus, SyncRun, SyncRunId};
use crate::{Result, SyncError};

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    async fn insert(&self, run: &SyncRun) -> Result<()>;

    /// # Errors
    ///
    /// `RunNotFound` if the run was never inserted
    async fn update(&self, run: &SyncRun) -> Result<()>;

    async fn find_by_id(&self, id: &SyncRunId) -> Result<Option<SyncRun>>;

    /// Most recent runs first.
    async fn history(&self, limit: u32) -> Result<Vec<SyncRun>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

pub struct SqliteSyncRunRepository {
    pool: SqlitePool,
}

impl SqliteSyncRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SyncRunRow {
    id: String,
    data_source: String,
    status: String,
    cold_start: bool,
    mines_staged: i64,
    collections_staged: i64,
    documents_staged: i64,
    records_promoted: i64,
    records_skipped: i64,
    error_message: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl TryFrom<SyncRunRow> for SyncRun {
    type Error = SyncError;

    fn try_from(row: SyncRunRow) -> Result<Self> {
        Ok(SyncRun {
            id: SyncRunId::from_string(&row.id)?,
            data_source: row.data_source,
            status: row.status.parse()?,
            cold_start: row.cold_start,
            counters: RunCounters {
                mines_staged: row.mines_staged as u64,
                collections_staged: row.collections_staged as u64,
                documents_staged: row.documents_staged as u64,
                records_promoted: row.records_promoted as u64,
                records_skipped: row.records_skipped as u64,
            },
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

const SELECT_RUNS: &str = "SELECT id, data_source, status, cold_start, mines_staged, \
     collections_staged, documents_staged, records_promoted, records_skipped, \
     error_message, created_at, started_at, completed_at FROM sync_runs";

#[async_trait]
impl SyncRunRepository for SqliteSyncRunRepository {
    async fn insert(&self, run: &SyncRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                id, data_source, status, cold_start,
                mines_staged, collections_staged, documents_staged,
                records_promoted, records_skipped,
                error_message, created_at, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.as_str())
        .bind(&run.data_source)
        .bind(run.status.as_str())
        .bind(run.cold_start)
        .bind(run.counters.mines_staged as i64)
        .bind(run.counters.collections_staged as i64)
        .bind(run.counters.documents_staged as i64)
        .bind(run.counters.records_promoted as i64)
        .bind(run.counters.records_skipped as i64)
        .bind(&run.error_message)
        .bind(run.created_at)
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn update(&self, run: &SyncRun) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_runs SET
                status = ?,
                cold_start = ?,
                mines_staged = ?,
                collections_staged = ?,
                documents_staged = ?,
                records_promoted = ?,
                records_skipped = ?,
                error_message = ?,
                started_at = ?,
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(run.status.as_str())
        .bind(run.cold_start)
        .bind(run.counters.mines_staged as i64)
        .bind(run.counters.collections_staged as i64)
        .bind(run.counters.documents_staged as i64)
        .bind(run.counters.records_promoted as i64)
        .bind(run.counters.records_skipped as i64)
        .bind(&run.error_message)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::RunNotFound {
                run_id: run.id.to_string(),
            });
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &SyncRunId) -> Result<Option<SyncRun>> {
        let sql = format!("{} WHERE id = ?", SELECT_RUNS);
        let row: Option<SyncRunRow> = sqlx::query_as(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(SyncRun::try_from).transpose()
    }

    async fn history(&self, limit: u32) -> Result<Vec<SyncRun>> {
        let sql = format!("{} ORDER BY created_at DESC, rowid DESC LIMIT ?", SELECT_RUNS);
        let rows: Vec<SyncRunRow> = sqlx::query_as(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter().map(SyncRun::try_from).collect()
    }
}
