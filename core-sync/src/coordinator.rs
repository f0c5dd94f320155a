//! # Sync Orchestrator
//!
//! Drives one pipeline invocation: fetch from the remote registry, stage
//! locally, promote to the canonical repository.
//!
//! ## Phases
//!
//! 1. **Cold start**: when no mine is staged, fetch every published mine and
//!    stage it.
//! 2. **Collection expansion**: for each mine without
//!    `collectionsSavedOnLocal`, fetch its collections by mine code, stage
//!    them with a back-reference to the mine, then set the flag.
//! 3. **Mine promotion**: promote mines whose collections are staged.
//! 4. **Document and collection promotion**: for each unpromoted collection,
//!    stage and promote its documents one at a time, set
//!    `documentsSavedOnNrpti`, then promote the collection. A collection
//!    whose mine is not promoted is still promoted, without a mine reference.
//! 5. **Mine links**: once a mine is promoted, add its canonical id to the
//!    documents and collections promoted without it.
//!
//! Each phase re-reads its pending set from the staging store. A failure on
//! one record is logged and the record stays pending for the next run;
//! failures that prevent reading local state abort the run.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = SyncOrchestrator::new(
//!     OrchestratorConfig::from_pipeline(&config),
//!     registry,
//!     store,
//!     repository,
//!     runs,
//!     event_bus,
//! );
//! let run = orchestrator.run().await?;
//! println!("Promoted {} records", run.counters.records_promoted);
//! ```

use bridge_traits::registry::{RawRecord, RegistrySource};
use bridge_traits::time::{Clock, SystemClock};
use core_records::{
    map_registry_record, CollectionPayload, DocumentPayload, MappingError, PromotionContext,
    SchemaKind, StagedPayload,
};
use core_runtime::config::{PipelineConfig, DEFAULT_DATA_SOURCE, DEFAULT_SYNC_TIMEOUT_SECS};
use core_runtime::events::{CoreEvent, EventBus, RecordEvent, SyncEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::job::{RunCounters, SyncRun, SyncRunId};
use crate::promotion::{CanonicalRepository, PromotionWriter};
use crate::record::{NewStagedRecord, StagedRecord, StagedRecordId, StagingFlag};
use crate::repository::SyncRunRepository;
use crate::staging::StagingStore;
use crate::task::TaskDescriptor;
use crate::{Result, SyncError};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Source label written onto promoted records and run history
    pub data_source: String,
    /// Timeout for a whole run
    pub run_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            data_source: config.data_source.clone(),
            run_timeout: config.sync_timeout,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            data_source: DEFAULT_DATA_SOURCE.to_string(),
            run_timeout: Duration::from_secs(DEFAULT_SYNC_TIMEOUT_SECS),
        }
    }
}

/// State carried through one run.
struct RunProgress {
    run_id: SyncRunId,
    cold_start: bool,
    counters: RunCounters,
}

pub struct SyncOrchestrator {
    config: OrchestratorConfig,
    registry: Arc<dyn RegistrySource>,
    store: Arc<dyn StagingStore>,
    promoter: PromotionWriter,
    runs: Arc<dyn SyncRunRepository>,
    event_bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl SyncOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<dyn RegistrySource>,
        store: Arc<dyn StagingStore>,
        repository: Arc<dyn CanonicalRepository>,
        runs: Arc<dyn SyncRunRepository>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let promoter = PromotionWriter::new(repository, Arc::clone(&store));
        Self {
            config,
            registry,
            store,
            promoter,
            runs,
            event_bus,
            clock: Arc::new(SystemClock),
        }
    }

    /// Clock used for run history timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run the pipeline once.
    ///
    /// The run is recorded in the run history whatever the outcome.
    ///
    /// # Errors
    ///
    /// - Cold-start fetch failure (`RemoteUnavailable`, `MalformedPayload`)
    /// - Staging store read failure (`Database`)
    /// - `Timeout` when the run exceeds the configured limit
    #[instrument(skip(self), fields(data_source = %self.config.data_source))]
    pub async fn run(&self) -> Result<SyncRun> {
        let mut run = SyncRun::new(self.config.data_source.clone(), self.clock.as_ref())
            .start(self.clock.as_ref())?;
        self.runs.insert(&run).await?;

        let mut progress = RunProgress {
            run_id: run.id,
            cold_start: false,
            counters: RunCounters::default(),
        };

        let outcome = timeout(self.config.run_timeout, self.execute(&mut progress)).await;
        run.cold_start = progress.cold_start;

        match outcome {
            Ok(Ok(())) => {
                let run = run.complete(progress.counters, self.clock.as_ref())?;
                self.runs.update(&run).await?;

                let counters = run.counters;
                self.emit(CoreEvent::Sync(SyncEvent::Completed {
                    run_id: run.id.to_string(),
                    mines_staged: counters.mines_staged,
                    collections_staged: counters.collections_staged,
                    documents_staged: counters.documents_staged,
                    records_promoted: counters.records_promoted,
                    records_skipped: counters.records_skipped,
                    duration_secs: run.duration_secs().unwrap_or(0),
                }));
                info!(
                    run_id = %run.id,
                    staged = counters.total_staged(),
                    promoted = counters.records_promoted,
                    skipped = counters.records_skipped,
                    "Sync run completed"
                );
                Ok(run)
            }
            Ok(Err(e)) => {
                error!(run_id = %run.id, error = %e, "Sync run failed");
                self.record_failure(run, &e, progress.counters).await;
                Err(e)
            }
            Err(_) => {
                let e = SyncError::Timeout(self.config.run_timeout.as_secs());
                error!(run_id = %run.id, "Sync run timed out");
                self.record_failure(run, &e, progress.counters).await;
                Err(e)
            }
        }
    }

    /// Clear the staging store, then run from a cold start.
    pub async fn reseed(&self) -> Result<SyncRun> {
        let removed = self.store.reset().await?;
        warn!(removed, "Staging store cleared for reseed");
        self.run().await
    }

    /// Run an operator task.
    pub async fn run_task(&self, task: &TaskDescriptor) -> Result<SyncRun> {
        if !task.targets(&self.config.data_source) {
            return Err(SyncError::InvalidTask(format!(
                "unsupported dataSourceType {}",
                task.data_source_type
            )));
        }

        match task.task_type.to_lowercase().as_str() {
            "import" | "sync" => self.run().await,
            "reseed" => self.reseed().await,
            other => Err(SyncError::InvalidTask(format!("unsupported taskType {}", other))),
        }
    }

    async fn record_failure(&self, run: SyncRun, e: &SyncError, counters: RunCounters) {
        let run_id = run.id;
        match run.fail(e.to_string(), counters, self.clock.as_ref()) {
            Ok(failed) => {
                if let Err(update_err) = self.runs.update(&failed).await {
                    warn!(run_id = %run_id, error = %update_err, "Failed to record run failure");
                }
            }
            Err(transition_err) => warn!(error = %transition_err, "Run already finished"),
        }

        self.emit(CoreEvent::Sync(SyncEvent::Failed {
            run_id: run_id.to_string(),
            message: e.to_string(),
            recoverable: !e.is_fatal(),
        }));
    }

    async fn execute(&self, progress: &mut RunProgress) -> Result<()> {
        progress.cold_start = self.store.count(SchemaKind::Mine).await? == 0;

        self.emit(CoreEvent::Sync(SyncEvent::Started {
            run_id: progress.run_id.to_string(),
            data_source: self.config.data_source.clone(),
            cold_start: progress.cold_start,
        }));

        if progress.cold_start {
            let staged = self.stage_mines(progress).await?;
            self.phase_completed(progress, "stage_mines", staged);
        }

        let expanded = self.expand_collections(progress).await?;
        self.phase_completed(progress, "expand_collections", expanded);

        let promoted = self.promote_mines(progress).await?;
        self.phase_completed(progress, "promote_mines", promoted);

        let promoted = self.promote_collections(progress).await?;
        self.phase_completed(progress, "promote_collections", promoted);

        let linked = self.link_mines(progress).await?;
        self.phase_completed(progress, "link_mines", linked);

        Ok(())
    }

    // ========================================================================
    // Phase 1: cold start
    // ========================================================================

    #[instrument(skip_all)]
    async fn stage_mines(&self, progress: &mut RunProgress) -> Result<u64> {
        info!("Phase 1: Cold start, fetching published mines");

        let raw = self.registry.published_projects().await?;
        info!(count = raw.len(), "Fetched published mines");

        let records: Vec<NewStagedRecord> = raw
            .iter()
            .filter_map(|r| self.map_or_skip(r, SchemaKind::Mine, progress))
            .map(NewStagedRecord::new)
            .collect();

        let keys: Vec<String> = records.iter().map(|r| r.original_id().to_string()).collect();
        let mut staged = 0;

        for (original_id, outcome) in keys.iter().zip(self.store.insert_many(records).await) {
            match outcome {
                Ok(_) => {
                    staged += 1;
                    progress.counters.mines_staged += 1;
                    self.record_staged(SchemaKind::Mine, original_id);
                }
                Err(SyncError::DuplicateRecord { .. }) => {
                    debug!(original_id = %original_id, "Mine already staged");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => self.skip(progress, SchemaKind::Mine, original_id, &e),
            }
        }

        Ok(staged)
    }

    // ========================================================================
    // Phase 2: collection expansion
    // ========================================================================

    #[instrument(skip_all)]
    async fn expand_collections(&self, progress: &mut RunProgress) -> Result<u64> {
        let pending = self
            .store
            .find_pending(SchemaKind::Mine, StagingFlag::CollectionsSavedOnLocal)
            .await?;
        info!(pending = pending.len(), "Phase 2: Expanding mine collections");

        let mut expanded = 0;
        for mine in &pending {
            match self.expand_mine(mine, progress).await {
                Ok(count) => {
                    expanded += 1;
                    debug!(original_id = %mine.original_id, collections = count, "Mine expanded");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(
                        original_id = %mine.original_id,
                        error = %e,
                        "Collection expansion failed, mine left pending"
                    );
                    self.skip(progress, SchemaKind::Mine, &mine.original_id, &e);
                }
            }
        }

        Ok(expanded)
    }

    #[instrument(skip(self, mine, progress), fields(original_id = %mine.original_id))]
    async fn expand_mine(&self, mine: &StagedRecord, progress: &mut RunProgress) -> Result<usize> {
        let StagedPayload::Mine(payload) = &mine.payload else {
            return Err(MappingError::InvalidKind(mine.kind.to_string()).into());
        };
        if payload.code.is_empty() {
            return Err(MappingError::unmappable(SchemaKind::Mine.as_str(), "code").into());
        }

        let raw = self.registry.project_collections(&payload.code).await?;
        debug!(mine_code = %payload.code, count = raw.len(), "Fetched collections");

        let mut records = Vec::with_capacity(raw.len());
        for r in &raw {
            if let Some(mut payload) = self.map_or_skip(r, SchemaKind::Collection, progress) {
                if let StagedPayload::Collection(collection) = &mut payload {
                    collection.mine_id = Some(mine.id.as_str());
                }
                records.push(NewStagedRecord::new(payload).with_parent(mine.id));
            }
        }

        let keys: Vec<String> = records.iter().map(|r| r.original_id().to_string()).collect();
        let mut collection_ids: Vec<StagedRecordId> = Vec::with_capacity(keys.len());

        for (original_id, outcome) in keys.iter().zip(self.store.insert_many(records).await) {
            match outcome {
                Ok(id) => {
                    collection_ids.push(id);
                    progress.counters.collections_staged += 1;
                    self.record_staged(SchemaKind::Collection, original_id);
                }
                Err(SyncError::DuplicateRecord { .. }) => {
                    // Staged by an earlier run that stopped before the flag
                    let existing = self
                        .store
                        .find_by_original_id(SchemaKind::Collection, original_id)
                        .await?
                        .ok_or_else(|| SyncError::RecordNotFound(original_id.clone()))?;
                    debug!(original_id = %original_id, "Reattached staged collection");
                    collection_ids.push(existing.id);
                }
                Err(e) => return Err(e),
            }
        }

        self.store
            .attach_collections(&mine.id, &collection_ids)
            .await?;
        self.store
            .update_flags(&mine.id, &[StagingFlag::CollectionsSavedOnLocal])
            .await?;

        info!(
            mine_code = %payload.code,
            collections = collection_ids.len(),
            "Mine collections staged"
        );
        Ok(collection_ids.len())
    }

    // ========================================================================
    // Phase 3: mine promotion
    // ========================================================================

    #[instrument(skip_all)]
    async fn promote_mines(&self, progress: &mut RunProgress) -> Result<u64> {
        let pending = self
            .store
            .find_pending(SchemaKind::Mine, StagingFlag::SavedOnNrpti)
            .await?;
        info!(pending = pending.len(), "Phase 3: Promoting mines");

        let ctx = self.context(None, Vec::new());
        let mut promoted = 0;

        for mine in pending.iter().filter(|m| m.collections_saved_on_local) {
            match self.promoter.promote(mine, &ctx).await {
                Ok(canonical_id) => {
                    promoted += 1;
                    self.record_promoted(progress, mine, &canonical_id);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(original_id = %mine.original_id, error = %e, "Mine promotion failed");
                    self.skip(progress, SchemaKind::Mine, &mine.original_id, &e);
                }
            }
        }

        Ok(promoted)
    }

    // ========================================================================
    // Phase 4: document and collection promotion
    // ========================================================================

    #[instrument(skip_all)]
    async fn promote_collections(&self, progress: &mut RunProgress) -> Result<u64> {
        let pending = self
            .store
            .find_pending(SchemaKind::Collection, StagingFlag::SavedOnNrpti)
            .await?;
        info!(pending = pending.len(), "Phase 4: Promoting documents and collections");

        let mut promoted = 0;
        for collection in &pending {
            match self.promote_collection(collection, progress).await {
                Ok(()) => promoted += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(
                        original_id = %collection.original_id,
                        error = %e,
                        "Collection promotion failed, collection left pending"
                    );
                    self.skip(progress, SchemaKind::Collection, &collection.original_id, &e);
                }
            }
        }

        Ok(promoted)
    }

    /// Without a promoted mine the records go out unlinked and phase 5 adds
    /// the reference later.
    #[instrument(skip(self, collection, progress), fields(original_id = %collection.original_id))]
    async fn promote_collection(
        &self,
        collection: &StagedRecord,
        progress: &mut RunProgress,
    ) -> Result<()> {
        let mine_canonical_id = self.mine_canonical_id(collection).await?;
        if mine_canonical_id.is_none() {
            debug!("Owning mine not promoted, promoting without mine reference");
        }

        let StagedPayload::Collection(payload) = &collection.payload else {
            return Err(MappingError::InvalidKind(collection.kind.to_string()).into());
        };

        let document_ctx = self.context(mine_canonical_id.clone(), Vec::new());
        let document_ids = if collection.documents_saved_on_nrpti {
            self.promoted_document_ids(payload).await?
        } else {
            let ids = self
                .promote_documents(collection, payload, &document_ctx, progress)
                .await?;
            self.store
                .update_flags(&collection.id, &[StagingFlag::DocumentsSavedOnNrpti])
                .await?;
            ids
        };

        let ctx = self.context(mine_canonical_id, document_ids);
        let canonical_id = self.promoter.promote(collection, &ctx).await?;
        self.record_promoted(progress, collection, &canonical_id);

        Ok(())
    }

    /// Stage and promote each document in order; the first failure stops
    /// the collection.
    async fn promote_documents(
        &self,
        collection: &StagedRecord,
        payload: &CollectionPayload,
        ctx: &PromotionContext,
        progress: &mut RunProgress,
    ) -> Result<Vec<String>> {
        let mut canonical_ids = Vec::with_capacity(payload.documents.len());

        for document in &payload.documents {
            let staged = self.stage_document(collection, document, progress).await?;

            if let Some(existing) = staged.promoted_id() {
                canonical_ids.push(existing.to_string());
                continue;
            }

            let canonical_id = self.promoter.promote(&staged, ctx).await?;
            self.record_promoted(progress, &staged, &canonical_id);
            canonical_ids.push(canonical_id);
        }

        Ok(canonical_ids)
    }

    /// Staged record for a collection document, inserting it on first sight.
    async fn stage_document(
        &self,
        collection: &StagedRecord,
        document: &DocumentPayload,
        progress: &mut RunProgress,
    ) -> Result<StagedRecord> {
        if let Some(existing) = self
            .store
            .find_by_original_id(SchemaKind::Document, &document.original_id)
            .await?
        {
            return Ok(existing);
        }

        let record = NewStagedRecord::new(StagedPayload::Document(document.clone()))
            .with_parent(collection.id);

        match self.store.insert_many(vec![record]).await.pop() {
            Some(Ok(id)) => {
                progress.counters.documents_staged += 1;
                self.record_staged(SchemaKind::Document, &document.original_id);
                self.store
                    .find_by_id(&id)
                    .await?
                    .ok_or_else(|| SyncError::RecordNotFound(id.to_string()))
            }
            Some(Err(SyncError::DuplicateRecord { .. })) => self
                .store
                .find_by_original_id(SchemaKind::Document, &document.original_id)
                .await?
                .ok_or_else(|| SyncError::RecordNotFound(document.original_id.clone())),
            Some(Err(e)) => Err(e),
            None => Err(SyncError::StagingWriteFailure {
                kind: SchemaKind::Document.to_string(),
                original_id: document.original_id.clone(),
                message: "no insert outcome".to_string(),
            }),
        }
    }

    async fn promoted_document_ids(&self, payload: &CollectionPayload) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(payload.documents.len());
        for document in &payload.documents {
            let staged = self
                .store
                .find_by_original_id(SchemaKind::Document, &document.original_id)
                .await?
                .ok_or_else(|| SyncError::RecordNotFound(document.original_id.clone()))?;
            let canonical_id = staged
                .promoted_id()
                .ok_or_else(|| SyncError::RecordNotFound(document.original_id.clone()))?;
            ids.push(canonical_id.to_string());
        }
        Ok(ids)
    }

    // ========================================================================
    // Phase 5: mine links
    // ========================================================================

    #[instrument(skip_all)]
    async fn link_mines(&self, progress: &mut RunProgress) -> Result<u64> {
        let pending = self.store.find_unlinked_collections().await?;
        info!(pending = pending.len(), "Phase 5: Linking records to promoted mines");

        let mut linked = 0;
        for collection in &pending {
            let Some(mine_canonical_id) = self.mine_canonical_id(collection).await? else {
                debug!(original_id = %collection.original_id, "Owning mine not promoted, link deferred");
                continue;
            };

            match self.link_collection(collection, &mine_canonical_id).await {
                Ok(count) => linked += count,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(
                        original_id = %collection.original_id,
                        error = %e,
                        "Mine link failed, collection left unlinked"
                    );
                    self.skip(progress, SchemaKind::Collection, &collection.original_id, &e);
                }
            }
        }

        Ok(linked)
    }

    /// Documents first; the collection is marked last so a partial pass is
    /// picked up again.
    async fn link_collection(&self, collection: &StagedRecord, mine_canonical_id: &str) -> Result<u64> {
        let mut linked = 0;

        let documents = self
            .store
            .find_children(&collection.id, SchemaKind::Document)
            .await?;
        for document in &documents {
            if self.promoter.link_mine(document, mine_canonical_id).await? {
                linked += 1;
            }
        }

        if self.promoter.link_mine(collection, mine_canonical_id).await? {
            linked += 1;
        }

        Ok(linked)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Canonical id of the mine owning `collection`, if it is promoted.
    async fn mine_canonical_id(&self, collection: &StagedRecord) -> Result<Option<String>> {
        let Some(parent_id) = &collection.parent_id else {
            return Ok(None);
        };
        Ok(self
            .store
            .find_by_id(parent_id)
            .await?
            .as_ref()
            .and_then(StagedRecord::promoted_id)
            .map(str::to_string))
    }

    fn context(&self, mine_canonical_id: Option<String>, document_ids: Vec<String>) -> PromotionContext {
        PromotionContext {
            data_source: self.config.data_source.clone(),
            mine_canonical_id,
            document_ids,
        }
    }

    fn map_or_skip(
        &self,
        raw: &RawRecord,
        kind: SchemaKind,
        progress: &mut RunProgress,
    ) -> Option<StagedPayload> {
        match map_registry_record(raw, kind) {
            Ok(payload) => Some(payload),
            Err(e) => {
                let original_id = raw.remote_id().unwrap_or_default();
                warn!(kind = %kind, original_id = %original_id, error = %e, "Unmappable record skipped");
                self.skip(progress, kind, &original_id, &e.into());
                None
            }
        }
    }

    fn skip(&self, progress: &mut RunProgress, kind: SchemaKind, original_id: &str, reason: &SyncError) {
        progress.counters.records_skipped += 1;
        self.emit(CoreEvent::Record(RecordEvent::Skipped {
            kind: kind.to_string(),
            original_id: original_id.to_string(),
            reason: reason.to_string(),
        }));
    }

    fn record_staged(&self, kind: SchemaKind, original_id: &str) {
        self.emit(CoreEvent::Record(RecordEvent::Staged {
            kind: kind.to_string(),
            original_id: original_id.to_string(),
        }));
    }

    fn record_promoted(&self, progress: &mut RunProgress, record: &StagedRecord, canonical_id: &str) {
        progress.counters.records_promoted += 1;
        self.emit(CoreEvent::Record(RecordEvent::Promoted {
            kind: record.kind.to_string(),
            original_id: record.original_id.clone(),
            canonical_id: canonical_id.to_string(),
        }));
    }

    fn phase_completed(&self, progress: &RunProgress, phase: &str, items_processed: u64) {
        self.emit(CoreEvent::Sync(SyncEvent::PhaseCompleted {
            run_id: progress.run_id.to_string(),
            phase: phase.to_string(),
            items_processed,
        }));
    }

    fn emit(&self, event: CoreEvent) {
        self.event_bus.emit(event).ok();
    }
}
