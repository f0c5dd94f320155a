//! Canonical record shape written to the repository.
//!
//! Every field has a default, so a record built from sparse input is still
//! complete: text is `""`, dates are `null`, lists are `[]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::payload::{CollectionPayload, DocumentPayload, MinePayload, StagedPayload};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Legislation {
    pub act: String,
    pub section: String,
    pub sub_section: String,
    pub paragraph: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedTo {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub company_name: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub data_source: String,
    pub is_published: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub record_type: String,
    pub record_name: String,
    pub date_issued: Option<DateTime<Utc>>,
    pub issuing_agency: String,
    pub author: String,
    pub legislation: Legislation,
    pub legislation_description: String,
    pub issued_to: IssuedTo,
    pub project_name: String,
    pub location: String,
    pub description: String,
    pub summary: String,
    pub outcome_description: String,
    pub penalties: Vec<String>,
    /// Canonical ids of attached documents
    pub documents: Vec<String>,
    /// Remote identifier of the source record
    #[serde(rename = "_sourceRefId")]
    pub source_ref_id: String,
    /// Canonical id of the owning mine, when known
    #[serde(rename = "_mineId", skip_serializing_if = "Option::is_none", default)]
    pub mine_id: Option<String>,
    pub publication: Publication,
    /// Kind-specific attributes with no dedicated canonical field
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl CanonicalRecord {
    /// JSON keys of the dedicated fields. Attributes may not reuse them.
    pub const RESERVED_KEYS: &'static [&'static str] = &[
        "recordType",
        "recordName",
        "dateIssued",
        "issuingAgency",
        "author",
        "legislation",
        "legislationDescription",
        "issuedTo",
        "projectName",
        "location",
        "description",
        "summary",
        "outcomeDescription",
        "penalties",
        "documents",
        "_sourceRefId",
        "_mineId",
        "publication",
    ];

    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            ..Self::default()
        }
    }
}

/// Values a staged record needs from outside itself to become canonical.
#[derive(Debug, Clone, Default)]
pub struct PromotionContext {
    pub data_source: String,
    /// Canonical id of the owning mine
    pub mine_canonical_id: Option<String>,
    /// Canonical ids of the record's documents, in order
    pub document_ids: Vec<String>,
}

impl StagedPayload {
    /// Canonical form of a staged payload.
    pub fn to_canonical(&self, ctx: &PromotionContext) -> CanonicalRecord {
        let mut record = match self {
            StagedPayload::Mine(mine) => mine_record(mine),
            StagedPayload::Collection(collection) => collection_record(collection),
            StagedPayload::Document(document) => document_record(document),
        };
        record.publication.data_source = ctx.data_source.clone();
        record.mine_id = ctx.mine_canonical_id.clone();
        record.documents = ctx.document_ids.clone();
        record
    }
}

fn mine_record(mine: &MinePayload) -> CanonicalRecord {
    let mut record = CanonicalRecord::new("Mine");
    record.record_name = mine.name.clone();
    record.project_name = mine.name.clone();
    record.description = mine.description.clone();
    record.summary = mine.summary.clone();
    record.location = mine.region.clone();
    record.source_ref_id = mine.original_id.clone();
    record.issued_to = IssuedTo {
        entity_type: "Company".to_string(),
        company_name: mine.permittee.clone(),
        full_name: String::new(),
    };

    let attributes = [
        ("code", Value::from(mine.code.clone())),
        ("permitNumber", Value::from(mine.permit_number.clone())),
        ("status", Value::from(mine.status.clone())),
        ("type", Value::from(mine.mine_type.clone())),
        ("commodities", Value::from(mine.commodities.clone())),
        ("latitude", mine.latitude.map(Value::from).unwrap_or(Value::Null)),
        ("longitude", mine.longitude.map(Value::from).unwrap_or(Value::Null)),
    ];
    record.attributes = attributes
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
    record
}

fn collection_record(collection: &CollectionPayload) -> CanonicalRecord {
    let mut record = CanonicalRecord::new("Collection");
    record.record_name = collection.display_name.clone();
    record.date_issued = collection.date;
    record.issuing_agency = collection.agency.clone();
    record.author = collection.agency.clone();
    record.source_ref_id = collection.original_id.clone();
    record
        .attributes
        .insert("collectionType".to_string(), Value::from(collection.collection_type.clone()));
    record
        .attributes
        .insert("parentType".to_string(), Value::from(collection.parent_type.clone()));
    record
}

fn document_record(document: &DocumentPayload) -> CanonicalRecord {
    let mut record = CanonicalRecord::new("Document");
    record.record_name = document.display_name.clone();
    record.date_issued = document.date;
    record.source_ref_id = document.original_id.clone();
    record
        .attributes
        .insert("fileName".to_string(), Value::from(document.file_name.clone()));
    record.attributes.insert(
        "url".to_string(),
        document.url.clone().map(Value::from).unwrap_or(Value::Null),
    );
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> CollectionPayload {
        CollectionPayload {
            original_id: "c1".to_string(),
            display_name: "Permit Amendment".to_string(),
            collection_type: "Permit".to_string(),
            parent_type: "Authorizations".to_string(),
            agency: "EMPR".to_string(),
            date: None,
            documents: vec![],
            mine_id: Some("local-mine".to_string()),
        }
    }

    #[test]
    fn test_default_record_serializes_defaults() {
        let json = serde_json::to_value(CanonicalRecord::new("Order")).unwrap();

        assert_eq!(json["recordType"], "Order");
        assert_eq!(json["recordName"], "");
        assert!(json["dateIssued"].is_null());
        assert_eq!(json["penalties"], serde_json::json!([]));
        assert_eq!(json["legislation"]["subSection"], "");
        assert_eq!(json["issuedTo"]["type"], "");
        assert!(json.get("_mineId").is_none());
        assert_eq!(json["publication"]["isPublished"], false);
    }

    #[test]
    fn test_reserved_keys_cover_every_field() {
        let mut record = CanonicalRecord::new("Order");
        record.mine_id = Some("nrpti-m1".to_string());
        let json = serde_json::to_value(record).unwrap();

        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        let mut reserved = CanonicalRecord::RESERVED_KEYS.to_vec();
        keys.sort_unstable();
        reserved.sort_unstable();
        assert_eq!(keys, reserved);
    }

    #[test]
    fn test_collection_to_canonical_uses_context() {
        let ctx = PromotionContext {
            data_source: "BCMI".to_string(),
            mine_canonical_id: Some("nrpti-mine-1".to_string()),
            document_ids: vec!["nrpti-d1".to_string(), "nrpti-d2".to_string()],
        };

        let record = StagedPayload::Collection(collection()).to_canonical(&ctx);

        assert_eq!(record.record_type, "Collection");
        assert_eq!(record.record_name, "Permit Amendment");
        assert_eq!(record.source_ref_id, "c1");
        assert_eq!(record.mine_id.as_deref(), Some("nrpti-mine-1"));
        assert_eq!(record.documents, vec!["nrpti-d1", "nrpti-d2"]);
        assert_eq!(record.publication.data_source, "BCMI");
        assert!(!record.publication.is_published);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["collectionType"], "Permit");
        assert_eq!(json["_sourceRefId"], "c1");
    }

    #[test]
    fn test_mine_to_canonical_keeps_mine_attributes() {
        let mine = MinePayload {
            original_id: "m1".to_string(),
            name: "Red Chris".to_string(),
            code: "M-100".to_string(),
            permit_number: "C-179".to_string(),
            permittee: "Red Chris Development Company".to_string(),
            status: "Operating".to_string(),
            region: "Northwest".to_string(),
            mine_type: "Metal".to_string(),
            commodities: vec!["Copper".to_string()],
            description: String::new(),
            summary: String::new(),
            latitude: None,
            longitude: Some(-129.8),
            collections: vec![],
        };

        let record = StagedPayload::Mine(mine).to_canonical(&PromotionContext::default());

        assert_eq!(record.issued_to.company_name, "Red Chris Development Company");
        assert_eq!(record.attributes["code"], "M-100");
        assert!(record.attributes["latitude"].is_null());
        assert_eq!(record.attributes["longitude"], -129.8);
        assert!(record.mine_id.is_none());
    }
}
