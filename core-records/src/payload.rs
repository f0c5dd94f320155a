//! Typed registry payloads
//!
//! Remote registry records are mapped into one closed variant per
//! [`SchemaKind`]. Only recognized fields survive; everything else in the
//! remote payload is discarded at this boundary.
//!
//! The remote identifier is mandatory for every kind and is kept as
//! `originalId`, distinct from any local identifier.

use bridge_traits::registry::{remote_id_of, RawRecord};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce::{self, DEFAULT_ZONE};
use crate::error::{MappingError, Result};
use crate::kind::SchemaKind;

/// Mapped payload stored in staging, tagged by `_schemaName`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_schemaName")]
pub enum StagedPayload {
    Mine(MinePayload),
    Collection(CollectionPayload),
    Document(DocumentPayload),
}

impl StagedPayload {
    pub fn kind(&self) -> SchemaKind {
        match self {
            StagedPayload::Mine(_) => SchemaKind::Mine,
            StagedPayload::Collection(_) => SchemaKind::Collection,
            StagedPayload::Document(_) => SchemaKind::Document,
        }
    }

    pub fn original_id(&self) -> &str {
        match self {
            StagedPayload::Mine(p) => &p.original_id,
            StagedPayload::Collection(p) => &p.original_id,
            StagedPayload::Document(p) => &p.original_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinePayload {
    pub original_id: String,
    pub name: String,
    /// Registry code used to look up the mine's collections
    pub code: String,
    pub permit_number: String,
    pub permittee: String,
    pub status: String,
    pub region: String,
    #[serde(rename = "type")]
    pub mine_type: String,
    pub commodities: Vec<String>,
    pub description: String,
    pub summary: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Local ids of the staged collections, attached once they are all staged
    #[serde(default)]
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPayload {
    pub original_id: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub collection_type: String,
    pub parent_type: String,
    pub agency: String,
    pub date: Option<DateTime<Utc>>,
    /// `mainDocuments` followed by `otherDocuments`, in remote order
    pub documents: Vec<DocumentPayload>,
    /// Local id of the owning mine
    #[serde(rename = "_mine", default)]
    pub mine_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub original_id: String,
    pub display_name: String,
    pub file_name: String,
    pub url: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Map a registry record into the staged variant for `kind`.
pub fn map_registry_record(raw: &RawRecord, kind: SchemaKind) -> Result<StagedPayload> {
    map_registry_record_in(raw, kind, DEFAULT_ZONE)
}

/// Same as [`map_registry_record`] with an explicit zone for date-only text.
pub fn map_registry_record_in(raw: &RawRecord, kind: SchemaKind, zone: Tz) -> Result<StagedPayload> {
    match kind {
        SchemaKind::Mine => map_mine(&raw.payload).map(StagedPayload::Mine),
        SchemaKind::Collection => map_collection(&raw.payload, zone).map(StagedPayload::Collection),
        SchemaKind::Document => map_document(&raw.payload, zone).map(StagedPayload::Document),
    }
}

fn original_id(payload: &Map<String, Value>, kind: SchemaKind) -> Result<String> {
    remote_id_of(payload).ok_or_else(|| MappingError::unmappable(kind.as_str(), "id"))
}

fn map_mine(p: &Map<String, Value>) -> Result<MinePayload> {
    Ok(MinePayload {
        original_id: original_id(p, SchemaKind::Mine)?,
        name: coerce::text(p.get("name")),
        code: coerce::text(p.get("code")),
        permit_number: coerce::first_text([p.get("permitNumber"), p.get("memPermitID")]),
        permittee: coerce::text(p.get("permittee")),
        status: coerce::text(p.get("status")),
        region: coerce::text(p.get("region")),
        mine_type: coerce::text(p.get("type")),
        commodities: coerce::text_list(p.get("commodities")),
        description: coerce::text(p.get("description")),
        summary: coerce::text(p.get("summary")),
        latitude: coerce::number(p.get("lat").or_else(|| p.get("latitude"))),
        longitude: coerce::number(p.get("lon").or_else(|| p.get("longitude"))),
        collections: Vec::new(),
    })
}

fn map_collection(p: &Map<String, Value>, zone: Tz) -> Result<CollectionPayload> {
    let original_id = original_id(p, SchemaKind::Collection)?;

    let documents = coerce::list(p.get("mainDocuments"))
        .iter()
        .chain(coerce::list(p.get("otherDocuments")).iter())
        .map(|entry| map_document_entry(entry, zone))
        .collect::<Result<Vec<_>>>()?;

    Ok(CollectionPayload {
        original_id,
        display_name: coerce::text(p.get("displayName")),
        collection_type: coerce::text(p.get("type")),
        parent_type: coerce::text(p.get("parentType")),
        agency: coerce::text(p.get("agency")),
        date: coerce::date(p.get("date"), zone),
        documents,
        mine_id: None,
    })
}

/// Collection entries either are documents or wrap one under `document`.
fn map_document_entry(entry: &Value, zone: Tz) -> Result<DocumentPayload> {
    let object = match entry {
        Value::Object(map) => match map.get("document") {
            Some(Value::Object(inner)) => inner,
            _ => map,
        },
        _ => return Err(MappingError::unmappable(SchemaKind::Document.as_str(), "id")),
    };
    map_document(object, zone)
}

fn map_document(p: &Map<String, Value>, zone: Tz) -> Result<DocumentPayload> {
    Ok(DocumentPayload {
        original_id: original_id(p, SchemaKind::Document)?,
        display_name: coerce::text(p.get("displayName")),
        file_name: coerce::first_text([p.get("documentFileName"), p.get("fileName")]),
        url: coerce::link(p.get("url")).or_else(|| coerce::link(p.get("link"))),
        date: coerce::date(p.get("date").or_else(|| p.get("dateUploaded")), zone),
    })
}
