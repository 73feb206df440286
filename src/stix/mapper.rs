//! Mapping of vulnerability intelligence records onto STIX 2.1 objects.
//!
//! Records are walked as loose JSON: a field of the wrong type is treated as
//! absent rather than failing the whole record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

use super::objects::{
    ExternalReference, Relationship, SPEC_VERSION, Software, StixObject, TLP_WHITE_ID,
    Vulnerability, timestamp,
};

pub const CVSS_V3_EXTENSION: &str = "extension-definition--66e2492a-bbd3-4be6-88f5-cc91a017ac34";
pub const CVSS_V2_EXTENSION: &str = "extension-definition--39fc358f-1069-482c-a033-80cd5676f1e6";

/// Namespace for deterministic cyber-observable ids.
const SCO_NAMESPACE: Uuid = uuid::uuid!("00abedb4-aa42-466c-9c01-fed23315a9b7");

pub const SOURCE_NAME: &str = "Flashpoint Vulnerability Intelligence";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("vulnerability record is not a JSON object")]
    NotAnObject,
    #[error("vulnerability record has no id")]
    MissingId,
}

/// Map one record to its vulnerability, plus a software object and a `has`
/// relationship per affected product whose vendor can be resolved.
///
/// `now` stands in for missing publication timestamps.
pub fn map_vulnerability(item: &Value, now: DateTime<Utc>) -> Result<Vec<StixObject>, MapError> {
    if !item.is_object() {
        return Err(MapError::NotAnObject);
    }
    let source_id = scalar_string(&item["id"]).ok_or(MapError::MissingId)?;

    let timelines = &item["timelines"];
    let created = parse_timestamp(&timelines["published_at"]).unwrap_or(now);
    let modified = parse_timestamp(&timelines["last_modified_at"])
        .unwrap_or(created)
        .max(created);
    let disclosed = parse_timestamp(&timelines["disclosed_at"]);
    let exploit_published = parse_timestamp(&timelines["exploit_published_at"]);

    let external_references = external_references(item, &source_id);
    let severity = text(&item["scores"]["severity"]);

    let mut description = text(&item["description"]).unwrap_or_default().to_string();
    if let Some(solution) = text(&item["solution"]) {
        push_paragraph(&mut description, format!("Solution: {solution}"));
    }
    let credits = array(&item["creditees"])
        .filter_map(|c| text(&c["name"]))
        .collect::<Vec<_>>()
        .join(", ");
    if !credits.is_empty() {
        push_paragraph(&mut description, format!("Credits: {credits}"));
    }
    if let Some(at) = disclosed {
        push_paragraph(&mut description, format!("Disclosed On: {}", timestamp(at)));
    }
    if let Some(at) = exploit_published {
        push_paragraph(&mut description, format!("Exploit Published On: {}", timestamp(at)));
    }

    let mut labels = BTreeSet::new();
    labels.extend(array(&item["tags"]).filter_map(text).map(|t| format!("fp-tag:{t}")));
    if let Some(severity) = severity {
        labels.insert(format!("fp-severity:{}", severity.to_lowercase()));
    }
    if let Some(status) = text(&item["vuln_status"]) {
        labels.insert(format!("fp-status:{}", status.to_lowercase()));
    }
    labels.extend(
        array(&item["classifications"])
            .filter_map(|c| text(&c["name"]))
            .map(|name| format!("fp-classification:{name}")),
    );
    if exploit_published.is_some() {
        labels.insert("exploit-available".to_string());
    }

    let mut extensions = BTreeMap::new();
    if let Some(v3) = cvss_v3(item, severity) {
        extensions.insert(CVSS_V3_EXTENSION, v3);
    }
    if let Some(v2) = cvss_v2(item) {
        extensions.insert(CVSS_V2_EXTENSION, v2);
    }

    let vulnerability = Vulnerability {
        spec_version: SPEC_VERSION,
        id: format!("vulnerability--{}", Uuid::new_v4()),
        created: timestamp(created),
        modified: timestamp(modified),
        name: text(&item["title"])
            .map(str::to_string)
            .unwrap_or_else(|| format!("Flashpoint Vulnerability {source_id}")),
        description,
        external_references,
        labels: labels.into_iter().collect(),
        extensions,
        object_marking_refs: vec![TLP_WHITE_ID.to_string()],
        x_flashpoint_cvssv4: cvss_v4(item),
        x_flashpoint_epss_score: number(&item["scores"]["epss_score"]),
    };

    let display_id = vulnerability
        .external_references
        .iter()
        .find(|r| r.source_name == "cve")
        .and_then(|r| r.external_id.clone())
        .unwrap_or_else(|| format!("FP-{source_id}"));
    let vulnerability_id = vulnerability.id.clone();

    let mut objects = vec![StixObject::Vulnerability(vulnerability)];
    let mut seen_software = BTreeSet::new();

    for (product, vendor) in affected_products(item) {
        let software = software(product, vendor);
        let relationship = Relationship {
            spec_version: SPEC_VERSION,
            id: format!("relationship--{}", Uuid::new_v4()),
            created: timestamp(now),
            modified: timestamp(now),
            relationship_type: "has",
            description: format!("Vulnerability {display_id} affects {product} (by {vendor})"),
            source_ref: vulnerability_id.clone(),
            target_ref: software.id.clone(),
            object_marking_refs: vec![TLP_WHITE_ID.to_string()],
        };

        if seen_software.insert(software.id.clone()) {
            objects.push(StixObject::Software(software));
        }
        objects.push(StixObject::Relationship(relationship));
    }

    Ok(objects)
}

/// A software observable whose id depends only on its name and vendor.
pub fn software(name: &str, vendor: &str) -> Software {
    let contributing = json!({ "name": name, "vendor": vendor }).to_string();
    Software {
        spec_version: SPEC_VERSION,
        id: format!(
            "software--{}",
            Uuid::new_v5(&SCO_NAMESPACE, contributing.as_bytes())
        ),
        name: name.to_string(),
        vendor: vendor.to_string(),
        object_marking_refs: vec![TLP_WHITE_ID.to_string()],
    }
}

fn external_references(item: &Value, source_id: &str) -> Vec<ExternalReference> {
    fn push_unique(refs: &mut Vec<ExternalReference>, source: &str, id: String) {
        let exists = refs
            .iter()
            .any(|r| r.source_name == source && r.external_id.as_deref() == Some(id.as_str()));
        if !exists {
            refs.push(ExternalReference::with_id(source, id));
        }
    }

    let mut refs = Vec::new();
    for cve in array(&item["cve_ids"]).filter_map(text) {
        push_unique(&mut refs, "cve", cve.to_string());
    }
    for cwe in array(&item["cwes"]).filter_map(|c| cwe_number(&c["cwe_id"])) {
        push_unique(&mut refs, "cwe", format!("CWE-{cwe}"));
    }

    for reference in array(&item["ext_references"]) {
        let (Some(kind), Some(value)) = (text(&reference["type"]), text(&reference["value"])) else {
            continue;
        };
        match kind.to_lowercase().as_str() {
            "cve id" => push_unique(&mut refs, "cve", value.to_string()),
            "cwe id" => {
                if let Some(cwe) = cwe_number(&reference["value"]) {
                    push_unique(&mut refs, "cwe", format!("CWE-{cwe}"));
                }
            }
            lower if lower.contains("url") => refs.push(ExternalReference {
                source_name: kind.to_string(),
                external_id: None,
                url: Some(value.to_string()),
                description: None,
            }),
            _ => {}
        }
    }

    refs.push(ExternalReference {
        source_name: SOURCE_NAME.to_string(),
        external_id: None,
        url: None,
        description: Some(format!("Flashpoint Vulnerability ID: {source_id}")),
    });
    refs
}

/// Products paired with a vendor name: the product's own `vendor`, else its
/// `vendor_id` looked up in `vendors`, else the only vendor when there is
/// exactly one product and one vendor.
fn affected_products(item: &Value) -> Vec<(&str, &str)> {
    let products: Vec<&Value> = array(&item["products"]).collect();
    let vendors: Vec<&Value> = array(&item["vendors"]).collect();
    let only_vendor = if products.len() == 1 && vendors.len() == 1 {
        text(&vendors[0]["name"])
    } else {
        None
    };

    products
        .iter()
        .copied()
        .filter_map(|product| {
            let name = text(&product["name"])?;
            let vendor = text(&product["vendor"])
                .or_else(|| {
                    let wanted = product.get("vendor_id").filter(|id| !id.is_null())?;
                    vendors
                        .iter()
                        .copied()
                        .find(|v| v.get("id") == Some(wanted))
                        .and_then(|v| text(&v["name"]))
                })
                .or(only_vendor);

            if vendor.is_none() {
                debug!(product = name, "no vendor for product, skipping software object");
            }
            Some((name, vendor?))
        })
        .collect()
}

fn cvss_v3(item: &Value, severity: Option<&str>) -> Option<Map<String, Value>> {
    let data = item["cvss_v3s"].get(0)?.as_object()?;
    let (base, temporal) = match (score(data.get("score")), score(data.get("temporal_score"))) {
        (Ok(base), Ok(temporal)) => (base, temporal),
        _ => (None, None),
    };

    let mut out = Map::new();
    out.insert("spec_version".into(), json!("3.1"));
    let version = data
        .get("version")
        .and_then(scalar_string)
        .unwrap_or_else(|| "3.1".to_string());
    out.insert("version".into(), json!(version));
    copy_field(&mut out, data, "vector_string", "vectorString");
    put(&mut out, "baseScore", base.map(|s| json!(s)));
    for (from, to) in [
        ("attack_vector", "attackVector"),
        ("attack_complexity", "attackComplexity"),
        ("privileges_required", "privilegesRequired"),
        ("user_interaction", "userInteraction"),
        ("scope", "scope"),
        ("confidentiality_impact", "confidentialityImpact"),
        ("integrity_impact", "integrityImpact"),
        ("availability_impact", "availabilityImpact"),
        ("exploit_code_maturity", "exploitCodeMaturity"),
        ("remediation_level", "remediationLevel"),
        ("report_confidence", "reportConfidence"),
    ] {
        copy_field(&mut out, data, from, to);
    }
    put(&mut out, "temporalScore", temporal.map(|s| json!(s)));
    put(&mut out, "baseSeverity", severity.map(|s| json!(s)));
    Some(out)
}

fn cvss_v2(item: &Value) -> Option<Map<String, Value>> {
    let data = item["cvss_v2s"].get(0)?.as_object()?;

    let mut out = Map::new();
    out.insert("spec_version".into(), json!("2.0"));
    out.insert("version".into(), json!("2.0"));
    put(&mut out, "baseScore", score(data.get("score")).ok().flatten().map(|s| json!(s)));
    for (from, to) in [
        ("access_vector", "accessVector"),
        ("access_complexity", "accessComplexity"),
        ("authentication", "authentication"),
        ("confidentiality_impact", "confidentialityImpact"),
        ("integrity_impact", "integrityImpact"),
        ("availability_impact", "availabilityImpact"),
    ] {
        copy_field(&mut out, data, from, to);
    }
    Some(out)
}

/// First CVSS v4 entry carried over as-is, with numeric `baseScore` and
/// `threatScore` added when the raw scores parse.
fn cvss_v4(item: &Value) -> Option<Map<String, Value>> {
    let data = item["cvss_v4s"].get(0)?.as_object()?;
    let mut out: Map<String, Value> = data
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    match (score(data.get("score")), score(data.get("threat_score"))) {
        (Ok(base), Ok(threat)) => {
            put(&mut out, "baseScore", base.map(|s| json!(s)));
            put(&mut out, "threatScore", threat.map(|s| json!(s)));
        }
        _ => {
            out.remove("score");
            out.remove("threat_score");
        }
    }

    (!out.is_empty()).then_some(out)
}

/// Parse the timestamp formats seen in the feed. Naive values are UTC.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = text(value)?;
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn push_paragraph(description: &mut String, paragraph: String) {
    if !description.is_empty() {
        description.push_str("\n\n");
    }
    description.push_str(&paragraph);
}

fn copy_field(out: &mut Map<String, Value>, data: &Map<String, Value>, from: &str, to: &str) {
    put(out, to, data.get(from).filter(|v| !v.is_null()).cloned());
}

fn put(out: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        out.insert(key.to_string(), value);
    }
}

/// `Ok(None)` when absent, `Err` when present but not numeric.
fn score(value: Option<&Value>) -> Result<Option<f64>, ()> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => number(v).map(Some).ok_or(()),
    }
}

fn number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn cwe_number(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn text(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn array(value: &Value) -> impl Iterator<Item = &Value> {
    value.as_array().map(Vec::as_slice).unwrap_or_default().iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2024-06-01T00:00:00Z".parse().unwrap()
    }

    fn sample() -> Value {
        json!({
            "id": 912345,
            "title": "Acme Router Remote Code Execution",
            "description": "A crafted request executes code.",
            "solution": "Upgrade to 2.4.1.",
            "creditees": [{"name": "Ann"}, {"name": "Bo"}, {"nope": 1}],
            "timelines": {
                "published_at": "2024-05-20T10:00:00Z",
                "last_modified_at": "2024-05-21T11:00:00",
                "exploit_published_at": "2024-05-22"
            },
            "cve_ids": ["CVE-2024-1111"],
            "cwes": [{"cwe_id": 78}, {"cwe_id": "x"}],
            "ext_references": [
                {"type": "Vendor Specific Advisory URL", "value": "https://acme.example/adv"},
                {"type": "CVE ID", "value": "CVE-2024-1111"}
            ],
            "tags": ["router"],
            "scores": {"severity": "Critical", "epss_score": "0.42"},
            "vuln_status": "Active",
            "classifications": [{"name": "remote"}],
            "cvss_v3s": [{"score": 9.8, "vector_string": "AV:N", "attack_vector": "NETWORK", "scope": null}],
            "cvss_v2s": [{"score": "10.0", "access_vector": "NETWORK"}],
            "cvss_v4s": [{"score": 9.3, "threat_score": null, "vector_string": "CVSS:4.0/AV:N"}],
            "products": [{"name": "R100", "vendor_id": 7}, {"name": "R200", "vendor_id": 7}, {"name": "Orphan"}],
            "vendors": [{"id": 7, "name": "Acme"}]
        })
    }

    fn vulnerability(objects: &[StixObject]) -> Value {
        serde_json::to_value(&objects[0]).unwrap()
    }

    #[test]
    fn vulnerability_fields() {
        let objects = map_vulnerability(&sample(), now()).unwrap();
        let vuln = vulnerability(&objects);

        assert_eq!(vuln["type"], "vulnerability");
        assert_eq!(vuln["name"], "Acme Router Remote Code Execution");
        assert_eq!(vuln["created"], "2024-05-20T10:00:00.000Z");
        assert_eq!(vuln["modified"], "2024-05-21T11:00:00.000Z");
        assert_eq!(
            vuln["description"],
            "A crafted request executes code.\n\nSolution: Upgrade to 2.4.1.\n\nCredits: Ann, Bo\n\nExploit Published On: 2024-05-22T00:00:00.000Z"
        );
        assert_eq!(
            vuln["labels"],
            json!([
                "exploit-available",
                "fp-classification:remote",
                "fp-severity:critical",
                "fp-status:active",
                "fp-tag:router"
            ])
        );
        assert_eq!(vuln["object_marking_refs"][0], TLP_WHITE_ID);
        assert_eq!(vuln["x_flashpoint_epss_score"], 0.42);
    }

    #[test]
    fn external_references_are_deduplicated() {
        let objects = map_vulnerability(&sample(), now()).unwrap();
        let refs = vulnerability(&objects)["external_references"].clone();
        let refs = refs.as_array().unwrap();

        assert_eq!(refs.len(), 4);
        assert_eq!(refs[0], json!({"source_name": "cve", "external_id": "CVE-2024-1111"}));
        assert_eq!(refs[1], json!({"source_name": "cwe", "external_id": "CWE-78"}));
        assert_eq!(refs[2]["url"], "https://acme.example/adv");
        assert_eq!(refs[3]["description"], "Flashpoint Vulnerability ID: 912345");
    }

    #[test]
    fn cvss_extensions() {
        let objects = map_vulnerability(&sample(), now()).unwrap();
        let vuln = vulnerability(&objects);

        let v3 = &vuln["extensions"][CVSS_V3_EXTENSION];
        assert_eq!(v3["baseScore"], 9.8);
        assert_eq!(v3["vectorString"], "AV:N");
        assert_eq!(v3["baseSeverity"], "Critical");
        assert!(v3.get("scope").is_none());

        let v2 = &vuln["extensions"][CVSS_V2_EXTENSION];
        assert_eq!(v2["baseScore"], 10.0);
        assert_eq!(v2["accessVector"], "NETWORK");

        let v4 = &vuln["x_flashpoint_cvssv4"];
        assert_eq!(v4["baseScore"], 9.3);
        assert!(v4.get("threat_score").is_none());
    }

    #[test]
    fn software_and_relationships() {
        let objects = map_vulnerability(&sample(), now()).unwrap();
        let kinds: Vec<&str> = objects
            .iter()
            .map(|o| match o {
                StixObject::Vulnerability(_) => "vulnerability",
                StixObject::Software(_) => "software",
                StixObject::Relationship(_) => "relationship",
                StixObject::MarkingDefinition(_) => "marking-definition",
            })
            .collect();
        assert_eq!(
            kinds,
            ["vulnerability", "software", "relationship", "software", "relationship"]
        );

        let StixObject::Relationship(rel) = &objects[2] else {
            panic!("expected relationship");
        };
        assert_eq!(rel.relationship_type, "has");
        assert_eq!(rel.source_ref, objects[0].id());
        assert_eq!(rel.target_ref, objects[1].id());
        assert_eq!(rel.description, "Vulnerability CVE-2024-1111 affects R100 (by Acme)");
    }

    #[test]
    fn software_ids_are_deterministic() {
        assert_eq!(software("R100", "Acme").id, software("R100", "Acme").id);
        assert_ne!(software("R100", "Acme").id, software("R100", "Other").id);
        assert!(software("R100", "Acme").id.starts_with("software--"));
    }

    #[test]
    fn single_product_single_vendor_fallback() {
        let item = json!({"id": "a1", "products": [{"name": "Widget"}], "vendors": [{"name": "Solo"}]});
        let objects = map_vulnerability(&item, now()).unwrap();
        let StixObject::Software(sw) = &objects[1] else {
            panic!("expected software");
        };
        assert_eq!(sw.vendor, "Solo");
    }

    #[test]
    fn sparse_record_defaults() {
        let objects = map_vulnerability(&json!({"id": 5}), now()).unwrap();
        assert_eq!(objects.len(), 1);
        let vuln = vulnerability(&objects);
        assert_eq!(vuln["name"], "Flashpoint Vulnerability 5");
        assert_eq!(vuln["created"], "2024-06-01T00:00:00.000Z");
        assert_eq!(vuln["modified"], vuln["created"]);
        assert!(vuln.get("extensions").is_none());
    }

    #[test]
    fn modified_never_precedes_created() {
        let item = json!({"id": 1, "timelines": {
            "published_at": "2024-05-02T00:00:00Z",
            "last_modified_at": "2024-05-01T00:00:00Z"
        }});
        let vuln = vulnerability(&map_vulnerability(&item, now()).unwrap());
        assert_eq!(vuln["modified"], "2024-05-02T00:00:00.000Z");
    }

    #[test]
    fn records_without_id_are_rejected() {
        assert_eq!(map_vulnerability(&json!({"title": "x"}), now()), Err(MapError::MissingId));
        assert_eq!(map_vulnerability(&json!([1]), now()), Err(MapError::NotAnObject));
    }
}
