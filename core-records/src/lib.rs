//! # Core Records
//!
//! Pure mapping from external representations into the shapes the sync
//! pipeline stores and publishes:
//!
//! - [`payload`]: typed registry payloads (`Mine`, `Collection`, `Document`)
//!   held in staging
//! - [`canonical`]: the canonical record written to the repository
//! - [`rule`]: declarative field rules for JSON payloads and tabular rows
//!
//! Nothing in this crate performs I/O.

pub mod canonical;
pub mod coerce;
pub mod error;
pub mod kind;
pub mod payload;
pub mod rule;

pub use canonical::{CanonicalRecord, IssuedTo, Legislation, PromotionContext, Publication};
pub use error::{MappingError, Result};
pub use kind::SchemaKind;
pub use payload::{
    map_registry_record, map_registry_record_in, CollectionPayload, DocumentPayload, MinePayload,
    StagedPayload,
};
pub use rule::{CanonicalField, Coercion, FieldSource, FieldSpec, MappingRule, SourceRecord, TabularRow};
