//! # Registry Sync Pipeline
//!
//! Mirrors a remote registry (mines → collections → documents) into a local
//! staging store and promotes staged records into the canonical repository.
//!
//! ## Components
//!
//! - **Staged Records** (`record`): staged payloads and their monotonic progress flags
//! - **Staging Store** (`staging`): SQLite-backed resumable work queue
//! - **Promotion** (`promotion`): repository client and the promotion writer
//! - **Sync Run State Machine** (`job`): run lifecycle with validated transitions
//! - **Repository** (`repository`): run history persistence
//! - **Tasks** (`task`): operator task descriptor validation
//! - **Sync Orchestrator** (`coordinator`): phase-by-phase pipeline driver

pub mod coordinator;
pub mod db;
pub mod error;
pub mod job;
pub mod promotion;
pub mod record;
pub mod repository;
pub mod staging;
pub mod task;

pub use coordinator::{OrchestratorConfig, SyncOrchestrator};
pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, SyncError};
pub use job::{RunCounters, RunStatus, SyncRun, SyncRunId};
pub use promotion::{CanonicalRepository, NrptiRepository, PromotionWriter};
pub use record::{NewStagedRecord, StagedRecord, StagedRecordId, StagingFlag};
pub use repository::{SqliteSyncRunRepository, SyncRunRepository};
pub use staging::{SqliteStagingStore, StagingStore};
pub use task::TaskDescriptor;
