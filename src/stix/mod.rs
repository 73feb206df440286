//! STIX 2.1 vulnerability bundles, built in-process or fetched from the
//! external generator.

pub mod bundle;
pub mod generator;
pub mod mapper;
pub mod objects;
pub mod vulns;

pub use bundle::{BundleReport, NothingMapped, build_bundle};
pub use generator::{GENERATOR_TIMEOUT, GeneratorClient, GeneratorResponse};
pub use objects::{Bundle, StixObject};
pub use vulns::{MAX_PAGES, VulnClient, VulnFetchError, VulnListing, VulnTransport, fetch_all};
