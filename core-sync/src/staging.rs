//! # Staging Store
//!
//! Durable local store of fetched-but-unpromoted registry records.
//!
//! `find_pending` and `update_flags` together form a resumable work queue:
//! a record stays pending until its flag is set, so an interrupted run is
//! picked up by the next one without re-fetching or double-inserting.
//! Records are keyed by `(schema_kind, original_id)` and are never deleted
//! except by [`StagingStore::reset`].

use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use core_records::{MappingError, SchemaKind, StagedPayload};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::record::{NewStagedRecord, StagedRecord, StagedRecordId, StagingFlag};
use crate::{Result, SyncError};

// ============================================================================
// Store Trait
// ============================================================================

#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Number of staged records of `kind`.
    async fn count(&self, kind: SchemaKind) -> Result<u64>;

    /// Records of `kind` whose `flag` is still false, oldest first.
    ///
    /// # Errors
    ///
    /// `InvalidFlag` when the flag does not apply to `kind`.
    async fn find_pending(&self, kind: SchemaKind, flag: StagingFlag) -> Result<Vec<StagedRecord>>;

    /// Insert records one by one.
    ///
    /// The outcome of each record is reported in input order; a duplicate
    /// `(kind, original_id)` fails only that record.
    async fn insert_many(&self, records: Vec<NewStagedRecord>) -> Vec<Result<StagedRecordId>>;

    /// Set flags on a record. Flags already set are left as they are.
    async fn update_flags(&self, id: &StagedRecordId, flags: &[StagingFlag]) -> Result<()>;

    async fn find_by_id(&self, id: &StagedRecordId) -> Result<Option<StagedRecord>>;

    async fn find_by_original_id(
        &self,
        kind: SchemaKind,
        original_id: &str,
    ) -> Result<Option<StagedRecord>>;

    /// Children of `parent_id` of the given kind, oldest first.
    async fn find_children(
        &self,
        parent_id: &StagedRecordId,
        kind: SchemaKind,
    ) -> Result<Vec<StagedRecord>>;

    async fn attach_canonical_id(&self, id: &StagedRecordId, canonical_id: &str) -> Result<()>;

    /// Note that the record's canonical copy references its mine.
    async fn mark_mine_linked(&self, id: &StagedRecordId) -> Result<()>;

    /// Promoted collections whose canonical copy, or that of one of their
    /// promoted documents, does not reference the mine yet.
    async fn find_unlinked_collections(&self) -> Result<Vec<StagedRecord>>;

    /// Record the staged collections of a mine on its payload.
    async fn attach_collections(
        &self,
        mine_id: &StagedRecordId,
        collection_ids: &[StagedRecordId],
    ) -> Result<()>;

    /// Delete every staged record. Returns the number removed.
    async fn reset(&self) -> Result<u64>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

pub struct SqliteStagingStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteStagingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn insert_one(&self, record: &NewStagedRecord) -> Result<StagedRecordId> {
        let kind = record.kind();
        let original_id = record.original_id().to_string();
        let id = StagedRecordId::new();
        let now = self.clock.unix_timestamp();

        let payload = serde_json::to_string(&record.payload).map_err(|e| {
            SyncError::StagingWriteFailure {
                kind: kind.to_string(),
                original_id: original_id.clone(),
                message: e.to_string(),
            }
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO staged_records (
                id, schema_kind, original_id, parent_id, payload,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(kind.as_str())
        .bind(&original_id)
        .bind(record.parent_id.map(|p| p.as_str()))
        .bind(payload)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(SyncError::DuplicateRecord {
                    kind: kind.to_string(),
                    original_id,
                })
            }
            Err(e) => Err(SyncError::StagingWriteFailure {
                kind: kind.to_string(),
                original_id,
                message: e.to_string(),
            }),
        }
    }

    async fn fetch_required(&self, id: &StagedRecordId) -> Result<StagedRecord> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| SyncError::RecordNotFound(id.to_string()))
    }
}

#[derive(Debug, FromRow)]
struct StagedRecordRow {
    id: String,
    schema_kind: String,
    original_id: String,
    parent_id: Option<String>,
    payload: String,
    saved_on_nrpti: bool,
    collections_saved_on_local: bool,
    documents_saved_on_nrpti: bool,
    canonical_id: Option<String>,
    mine_linked: bool,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<StagedRecordRow> for StagedRecord {
    type Error = SyncError;

    fn try_from(row: StagedRecordRow) -> Result<Self> {
        let kind: SchemaKind = row
            .schema_kind
            .parse()
            .map_err(|_| SyncError::Database(format!("Invalid schema_kind: {}", row.schema_kind)))?;

        let payload: StagedPayload = serde_json::from_str(&row.payload).map_err(|e| {
            SyncError::Database(format!("Corrupt payload for {}: {}", row.id, e))
        })?;

        Ok(StagedRecord {
            id: StagedRecordId::from_string(&row.id)?,
            kind,
            original_id: row.original_id,
            parent_id: row
                .parent_id
                .as_deref()
                .map(StagedRecordId::from_string)
                .transpose()?,
            payload,
            saved_on_nrpti: row.saved_on_nrpti,
            collections_saved_on_local: row.collections_saved_on_local,
            documents_saved_on_nrpti: row.documents_saved_on_nrpti,
            canonical_id: row.canonical_id,
            mine_linked: row.mine_linked,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_records(rows: Vec<StagedRecordRow>) -> Result<Vec<StagedRecord>> {
    rows.into_iter().map(StagedRecord::try_from).collect()
}

const SELECT_COLUMNS: &str = "SELECT id, schema_kind, original_id, parent_id, payload, \
     saved_on_nrpti, collections_saved_on_local, documents_saved_on_nrpti, \
     canonical_id, mine_linked, created_at, updated_at FROM staged_records";

#[async_trait]
impl StagingStore for SqliteStagingStore {
    async fn count(&self, kind: SchemaKind) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM staged_records WHERE schema_kind = ?")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    #[instrument(skip_all, fields(kind = %kind, flag = %flag))]
    async fn find_pending(&self, kind: SchemaKind, flag: StagingFlag) -> Result<Vec<StagedRecord>> {
        flag.check(kind)?;

        // Column name comes from a closed enum, never from input.
        let sql = format!(
            "{} WHERE schema_kind = ? AND {} = 0 ORDER BY created_at, rowid",
            SELECT_COLUMNS,
            flag.column()
        );
        let rows: Vec<StagedRecordRow> = sqlx::query_as(&sql)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        debug!(pending = rows.len(), "Loaded pending records");
        into_records(rows)
    }

    async fn insert_many(&self, records: Vec<NewStagedRecord>) -> Vec<Result<StagedRecordId>> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in &records {
            let outcome = self.insert_one(record).await;
            if let Err(e) = &outcome {
                warn!(
                    kind = %record.kind(),
                    original_id = record.original_id(),
                    error = %e,
                    "Record not staged"
                );
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn update_flags(&self, id: &StagedRecordId, flags: &[StagingFlag]) -> Result<()> {
        let record = self.fetch_required(id).await?;
        for flag in flags {
            flag.check(record.kind)?;
        }

        let pending: Vec<&StagingFlag> = flags.iter().filter(|f| !record.flag(**f)).collect();
        if pending.is_empty() {
            return Ok(());
        }

        let assignments = pending
            .iter()
            .map(|flag| format!("{} = 1", flag.column()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE staged_records SET {}, updated_at = ? WHERE id = ?",
            assignments
        );

        sqlx::query(&sql)
            .bind(self.clock.unix_timestamp())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &StagedRecordId) -> Result<Option<StagedRecord>> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let row: Option<StagedRecordRow> = sqlx::query_as(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(StagedRecord::try_from).transpose()
    }

    async fn find_by_original_id(
        &self,
        kind: SchemaKind,
        original_id: &str,
    ) -> Result<Option<StagedRecord>> {
        let sql = format!("{} WHERE schema_kind = ? AND original_id = ?", SELECT_COLUMNS);
        let row: Option<StagedRecordRow> = sqlx::query_as(&sql)
            .bind(kind.as_str())
            .bind(original_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(StagedRecord::try_from).transpose()
    }

    async fn find_children(
        &self,
        parent_id: &StagedRecordId,
        kind: SchemaKind,
    ) -> Result<Vec<StagedRecord>> {
        let sql = format!(
            "{} WHERE parent_id = ? AND schema_kind = ? ORDER BY created_at, rowid",
            SELECT_COLUMNS
        );
        let rows: Vec<StagedRecordRow> = sqlx::query_as(&sql)
            .bind(parent_id.as_str())
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }

    async fn attach_canonical_id(&self, id: &StagedRecordId, canonical_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE staged_records SET canonical_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(canonical_id)
        .bind(self.clock.unix_timestamp())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::RecordNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn mark_mine_linked(&self, id: &StagedRecordId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE staged_records SET mine_linked = 1, updated_at = ? WHERE id = ? AND mine_linked = 0",
        )
        .bind(self.clock.unix_timestamp())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Already linked is fine; a missing record is not
            self.fetch_required(id).await?;
        }
        Ok(())
    }

    async fn find_unlinked_collections(&self) -> Result<Vec<StagedRecord>> {
        let sql = format!(
            r#"{} AS c
            WHERE c.schema_kind = 'Collection' AND c.saved_on_nrpti = 1
              AND (c.mine_linked = 0 OR EXISTS (
                  SELECT 1 FROM staged_records d
                  WHERE d.parent_id = c.id AND d.schema_kind = 'Document'
                    AND d.saved_on_nrpti = 1 AND d.mine_linked = 0))
            ORDER BY c.created_at, c.rowid"#,
            SELECT_COLUMNS
        );
        let rows: Vec<StagedRecordRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        into_records(rows)
    }

    async fn attach_collections(
        &self,
        mine_id: &StagedRecordId,
        collection_ids: &[StagedRecordId],
    ) -> Result<()> {
        let record = self.fetch_required(mine_id).await?;
        let StagedPayload::Mine(mut mine) = record.payload else {
            return Err(MappingError::InvalidKind(record.kind.to_string()).into());
        };

        mine.collections = collection_ids.iter().map(StagedRecordId::as_str).collect();
        let payload = serde_json::to_string(&StagedPayload::Mine(mine))
            .map_err(|e| SyncError::Database(e.to_string()))?;

        sqlx::query("UPDATE staged_records SET payload = ?, updated_at = ? WHERE id = ?")
            .bind(payload)
            .bind(self.clock.unix_timestamp())
            .bind(mine_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn reset(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM staged_records")
            .execute(&self.pool)
            .await?;
        warn!(removed = result.rows_affected(), "Staging store reset");
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use bridge_traits::time::FixedClock;
    use chrono::{TimeZone, Utc};
    use core_records::{CollectionPayload, DocumentPayload, MinePayload};

    async fn store() -> SqliteStagingStore {
        let pool = create_test_pool().await.unwrap();
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        SqliteStagingStore::with_clock(pool, Arc::new(clock))
    }

    fn mine(original_id: &str, code: &str) -> NewStagedRecord {
        NewStagedRecord::new(StagedPayload::Mine(MinePayload {
            original_id: original_id.to_string(),
            name: format!("Mine {}", code),
            code: code.to_string(),
            permit_number: String::new(),
            permittee: String::new(),
            status: String::new(),
            region: String::new(),
            mine_type: String::new(),
            commodities: vec![],
            description: String::new(),
            summary: String::new(),
            latitude: None,
            longitude: None,
            collections: vec![],
        }))
    }

    fn collection(original_id: &str, parent: StagedRecordId) -> NewStagedRecord {
        NewStagedRecord::new(StagedPayload::Collection(CollectionPayload {
            original_id: original_id.to_string(),
            display_name: String::new(),
            collection_type: String::new(),
            parent_type: String::new(),
            agency: String::new(),
            date: None,
            documents: vec![DocumentPayload {
                original_id: "d1".to_string(),
                display_name: String::new(),
                file_name: String::new(),
                url: None,
                date: None,
            }],
            mine_id: Some(parent.as_str()),
        }))
        .with_parent(parent)
    }

    #[tokio::test]
    async fn test_insert_and_count() {
        let store = store().await;
        assert_eq!(store.count(SchemaKind::Mine).await.unwrap(), 0);

        let outcomes = store
            .insert_many(vec![mine("m1", "M-100"), mine("m2", "M-200")])
            .await;

        assert!(outcomes.iter().all(|o| o.is_ok()));
        assert_eq!(store.count(SchemaKind::Mine).await.unwrap(), 2);
        assert_eq!(store.count(SchemaKind::Collection).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_is_reported_per_record() {
        let store = store().await;
        store.insert_many(vec![mine("m1", "M-100")]).await;

        let outcomes = store
            .insert_many(vec![mine("m1", "M-100"), mine("m3", "M-300")])
            .await;

        assert!(matches!(
            outcomes[0],
            Err(SyncError::DuplicateRecord { ref original_id, .. }) if original_id == "m1"
        ));
        assert!(outcomes[1].is_ok());
        assert_eq!(store.count(SchemaKind::Mine).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_pending_and_update_flags() {
        let store = store().await;
        let ids = store
            .insert_many(vec![mine("m1", "M-100"), mine("m2", "M-200")])
            .await;
        let first = ids[0].as_ref().unwrap();

        store
            .update_flags(first, &[StagingFlag::CollectionsSavedOnLocal])
            .await
            .unwrap();
        // Setting an already-set flag is a no-op
        store
            .update_flags(first, &[StagingFlag::CollectionsSavedOnLocal])
            .await
            .unwrap();

        let pending = store
            .find_pending(SchemaKind::Mine, StagingFlag::CollectionsSavedOnLocal)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].original_id, "m2");

        let record = store.find_by_id(first).await.unwrap().unwrap();
        assert!(record.collections_saved_on_local);
        assert!(!record.saved_on_nrpti);
        assert_eq!(record.created_at, 1_709_294_400);
    }

    #[tokio::test]
    async fn test_foreign_flags_are_rejected() {
        let store = store().await;
        let ids = store.insert_many(vec![mine("m1", "M-100")]).await;
        let id = ids[0].as_ref().unwrap();

        assert!(matches!(
            store
                .update_flags(id, &[StagingFlag::DocumentsSavedOnNrpti])
                .await,
            Err(SyncError::InvalidFlag { .. })
        ));
        assert!(matches!(
            store
                .find_pending(SchemaKind::Document, StagingFlag::CollectionsSavedOnLocal)
                .await,
            Err(SyncError::InvalidFlag { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_flags_on_missing_record() {
        let store = store().await;
        assert!(matches!(
            store
                .update_flags(&StagedRecordId::new(), &[StagingFlag::SavedOnNrpti])
                .await,
            Err(SyncError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_children_and_lookup_by_original_id() {
        let store = store().await;
        let mine_id = store.insert_many(vec![mine("m1", "M-100")]).await.remove(0).unwrap();
        store
            .insert_many(vec![collection("c1", mine_id), collection("c2", mine_id)])
            .await;

        let children = store
            .find_children(&mine_id, SchemaKind::Collection)
            .await
            .unwrap();
        let ids: Vec<&str> = children.iter().map(|c| c.original_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);

        let found = store
            .find_by_original_id(SchemaKind::Collection, "c2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.parent_id, Some(mine_id));
        assert!(store
            .find_by_original_id(SchemaKind::Mine, "c2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_attach_canonical_id_and_collections() {
        let store = store().await;
        let mine_id = store.insert_many(vec![mine("m1", "M-100")]).await.remove(0).unwrap();
        let collection_id = store
            .insert_many(vec![collection("c1", mine_id)])
            .await
            .remove(0)
            .unwrap();

        store.attach_canonical_id(&mine_id, "nrpti-1").await.unwrap();
        store
            .attach_collections(&mine_id, &[collection_id])
            .await
            .unwrap();

        let record = store.find_by_id(&mine_id).await.unwrap().unwrap();
        assert_eq!(record.canonical_id.as_deref(), Some("nrpti-1"));
        assert_eq!(record.promoted_id(), None);
        let StagedPayload::Mine(payload) = record.payload else {
            panic!("expected mine payload");
        };
        assert_eq!(payload.collections, vec![collection_id.as_str()]);

        assert!(matches!(
            store.attach_collections(&collection_id, &[]).await,
            Err(SyncError::Mapping(MappingError::InvalidKind(ref kind))) if kind == "Collection"
        ));
    }

    #[tokio::test]
    async fn test_unlinked_collections_follow_documents() {
        let store = store().await;
        let mine_id = store.insert_many(vec![mine("m1", "M-100")]).await.remove(0).unwrap();
        let collection_id = store
            .insert_many(vec![collection("c1", mine_id)])
            .await
            .remove(0)
            .unwrap();
        let document_id = store
            .insert_many(vec![NewStagedRecord::new(StagedPayload::Document(DocumentPayload {
                original_id: "d1".to_string(),
                display_name: String::new(),
                file_name: String::new(),
                url: None,
                date: None,
            }))
            .with_parent(collection_id)])
            .await
            .remove(0)
            .unwrap();

        // Unpromoted collections are never reported
        assert!(store.find_unlinked_collections().await.unwrap().is_empty());

        for id in [collection_id, document_id] {
            store
                .update_flags(&id, &[StagingFlag::SavedOnNrpti])
                .await
                .unwrap();
        }
        assert_eq!(store.find_unlinked_collections().await.unwrap().len(), 1);

        // Linked collection with an unlinked document is still reported
        store.mark_mine_linked(&collection_id).await.unwrap();
        let unlinked = store.find_unlinked_collections().await.unwrap();
        assert_eq!(unlinked.len(), 1);
        assert!(unlinked[0].mine_linked);

        store.mark_mine_linked(&document_id).await.unwrap();
        store.mark_mine_linked(&document_id).await.unwrap();
        assert!(store.find_unlinked_collections().await.unwrap().is_empty());

        let children = store
            .find_children(&collection_id, SchemaKind::Document)
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert!(children[0].mine_linked);

        assert!(matches!(
            store.mark_mine_linked(&StagedRecordId::new()).await,
            Err(SyncError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let store = store().await;
        let ids = store.insert_many(vec![mine("m1", "M-100")]).await;
        store
            .update_flags(ids[0].as_ref().unwrap(), &[StagingFlag::SavedOnNrpti])
            .await
            .unwrap();

        assert_eq!(store.reset().await.unwrap(), 1);
        assert_eq!(store.count(SchemaKind::Mine).await.unwrap(), 0);
    }
}
