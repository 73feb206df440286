//! STIX 2.1 objects emitted by the mapper.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const SPEC_VERSION: &str = "2.1";

/// Statement marking definition for TLP:WHITE, shared by every object.
pub const TLP_WHITE_ID: &str = "marking-definition--613f2e26-407d-48c7-9eca-b8e91df99dc9";
const TLP_WHITE_CREATED: &str = "2017-01-20T00:00:00.000Z";

/// STIX timestamps carry millisecond precision and a `Z` suffix.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StixObject {
    Vulnerability(Vulnerability),
    Software(Software),
    Relationship(Relationship),
    MarkingDefinition(MarkingDefinition),
}

impl StixObject {
    pub fn id(&self) -> &str {
        match self {
            StixObject::Vulnerability(v) => &v.id,
            StixObject::Software(s) => &s.id,
            StixObject::Relationship(r) => &r.id,
            StixObject::MarkingDefinition(m) => &m.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalReference {
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ExternalReference {
    pub fn with_id(source_name: &str, external_id: String) -> Self {
        Self {
            source_name: source_name.to_string(),
            external_id: Some(external_id),
            url: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vulnerability {
    pub spec_version: &'static str,
    pub id: String,
    pub created: String,
    pub modified: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_references: Vec<ExternalReference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Keyed by extension-definition id.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<&'static str, Map<String, Value>>,
    pub object_marking_refs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_flashpoint_cvssv4: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_flashpoint_epss_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Software {
    pub spec_version: &'static str,
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub object_marking_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub spec_version: &'static str,
    pub id: String,
    pub created: String,
    pub modified: String,
    pub relationship_type: &'static str,
    pub description: String,
    pub source_ref: String,
    pub target_ref: String,
    pub object_marking_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkingDefinition {
    pub spec_version: &'static str,
    pub id: String,
    pub created: String,
    pub definition_type: &'static str,
    pub definition: BTreeMap<&'static str, &'static str>,
}

impl MarkingDefinition {
    pub fn tlp_white() -> Self {
        Self {
            spec_version: SPEC_VERSION,
            id: TLP_WHITE_ID.to_string(),
            created: TLP_WHITE_CREATED.to_string(),
            definition_type: "statement",
            definition: BTreeMap::from([("statement", "TLP:WHITE")]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bundle {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub objects: Vec<StixObject>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marking_definition_shape() {
        let json = serde_json::to_value(StixObject::MarkingDefinition(MarkingDefinition::tlp_white()))
            .unwrap();
        assert_eq!(json["type"], "marking-definition");
        assert_eq!(json["id"], TLP_WHITE_ID);
        assert_eq!(json["definition"]["statement"], "TLP:WHITE");
    }

    #[test]
    fn timestamps_have_millis() {
        let at = "2024-05-01T08:30:00Z".parse().unwrap();
        assert_eq!(timestamp(at), "2024-05-01T08:30:00.000Z");
    }
}
