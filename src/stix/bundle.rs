//! Bundle assembly over a whole vulnerability listing.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use super::mapper::map_vulnerability;
use super::objects::{Bundle, MarkingDefinition, StixObject};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("none of the {items} vulnerability records could be mapped ({failed} failed)")]
pub struct NothingMapped {
    pub items: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BundleReport {
    pub bundle: Bundle,
    pub mapped: usize,
    pub failed: usize,
}

/// Map every record and append the TLP:WHITE marking definition once.
///
/// An empty listing yields a bundle holding only the marking definition.
/// A non-empty listing that produces no objects at all is an error.
/// Software observables shared between records appear once.
pub fn build_bundle(items: &[Value], now: DateTime<Utc>) -> Result<BundleReport, NothingMapped> {
    let mut objects = Vec::new();
    let mut seen_software = HashSet::new();
    let mut mapped = 0;
    let mut failed = 0;

    for item in items {
        match map_vulnerability(item, now) {
            Ok(mapped_objects) => {
                mapped += 1;
                for object in mapped_objects {
                    if let StixObject::Software(software) = &object
                        && !seen_software.insert(software.id.clone())
                    {
                        continue;
                    }
                    objects.push(object);
                }
            }
            Err(error) => {
                failed += 1;
                warn!(error = %error, id = %item["id"], "skipping vulnerability record");
            }
        }
    }

    if objects.is_empty() && !items.is_empty() {
        return Err(NothingMapped {
            items: items.len(),
            failed,
        });
    }

    info!(
        records = items.len(),
        mapped,
        failed,
        objects = objects.len(),
        "STIX bundle assembled"
    );

    objects.push(StixObject::MarkingDefinition(MarkingDefinition::tlp_white()));
    Ok(BundleReport {
        bundle: Bundle {
            kind: "bundle",
            id: format!("bundle--{}", Uuid::new_v4()),
            objects,
        },
        mapped,
        failed,
    })
}
