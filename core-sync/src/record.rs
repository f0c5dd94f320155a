//! # Staged Records
//!
//! A staged record wraps one mapped registry payload together with its
//! progress flags. Flags are monotonic: once set they stay set until an
//! explicit reset of the whole store.
//!
//! | Flag                         | Applies to  | Set when                               |
//! |------------------------------|-------------|----------------------------------------|
//! | `savedOnNrpti`               | all kinds   | the record is promoted                 |
//! | `collectionsSavedOnLocal`    | Mine        | every child collection is staged       |
//! | `documentsSavedOnNrpti`      | Collection  | every child document is promoted       |

use core_records::{SchemaKind, StagedPayload};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Result, SyncError};

// ============================================================================
// ID Types
// ============================================================================

/// Local identifier of a staged record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StagedRecordId(Uuid);

impl StagedRecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::Database(format!("Invalid staged record id {}: {}", s, e)))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for StagedRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StagedRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Flags
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StagingFlag {
    SavedOnNrpti,
    CollectionsSavedOnLocal,
    DocumentsSavedOnNrpti,
}

impl StagingFlag {
    /// Storage column for the flag.
    pub fn column(&self) -> &'static str {
        match self {
            StagingFlag::SavedOnNrpti => "saved_on_nrpti",
            StagingFlag::CollectionsSavedOnLocal => "collections_saved_on_local",
            StagingFlag::DocumentsSavedOnNrpti => "documents_saved_on_nrpti",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StagingFlag::SavedOnNrpti => "savedOnNrpti",
            StagingFlag::CollectionsSavedOnLocal => "collectionsSavedOnLocal",
            StagingFlag::DocumentsSavedOnNrpti => "documentsSavedOnNrpti",
        }
    }

    pub fn applies_to(&self, kind: SchemaKind) -> bool {
        match self {
            StagingFlag::SavedOnNrpti => true,
            StagingFlag::CollectionsSavedOnLocal => kind == SchemaKind::Mine,
            StagingFlag::DocumentsSavedOnNrpti => kind == SchemaKind::Collection,
        }
    }

    /// Reject a flag that has no meaning for `kind`.
    pub fn check(&self, kind: SchemaKind) -> Result<()> {
        if self.applies_to(kind) {
            Ok(())
        } else {
            Err(SyncError::InvalidFlag {
                flag: self.as_str().to_string(),
                kind: kind.as_str().to_string(),
            })
        }
    }
}

impl FromStr for StagingFlag {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "savedOnNrpti" => Ok(StagingFlag::SavedOnNrpti),
            "collectionsSavedOnLocal" => Ok(StagingFlag::CollectionsSavedOnLocal),
            "documentsSavedOnNrpti" => Ok(StagingFlag::DocumentsSavedOnNrpti),
            _ => Err(SyncError::InvalidFlag {
                flag: s.to_string(),
                kind: "any".to_string(),
            }),
        }
    }
}

impl fmt::Display for StagingFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// A record ready to be inserted into staging.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStagedRecord {
    pub payload: StagedPayload,
    pub parent_id: Option<StagedRecordId>,
}

impl NewStagedRecord {
    pub fn new(payload: StagedPayload) -> Self {
        Self {
            payload,
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: StagedRecordId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn kind(&self) -> SchemaKind {
        self.payload.kind()
    }

    pub fn original_id(&self) -> &str {
        self.payload.original_id()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagedRecord {
    pub id: StagedRecordId,
    pub kind: SchemaKind,
    /// Remote identifier, unique per kind
    pub original_id: String,
    /// Weak link to the owning record
    pub parent_id: Option<StagedRecordId>,
    pub payload: StagedPayload,
    pub saved_on_nrpti: bool,
    pub collections_saved_on_local: bool,
    pub documents_saved_on_nrpti: bool,
    /// Repository id, attached on promotion
    pub canonical_id: Option<String>,
    /// Whether the canonical record references its mine's canonical id
    pub mine_linked: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl StagedRecord {
    pub fn flag(&self, flag: StagingFlag) -> bool {
        match flag {
            StagingFlag::SavedOnNrpti => self.saved_on_nrpti,
            StagingFlag::CollectionsSavedOnLocal => self.collections_saved_on_local,
            StagingFlag::DocumentsSavedOnNrpti => self.documents_saved_on_nrpti,
        }
    }

    /// Canonical id, if the record has been promoted.
    pub fn promoted_id(&self) -> Option<&str> {
        if self.saved_on_nrpti {
            self.canonical_id.as_deref()
        } else {
            None
        }
    }
}
