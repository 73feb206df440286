//! HTTP surface: mention counts, bulk exports and STIX bundles.

pub mod bulk;
pub mod error;
pub mod mentions;
pub mod middleware;
pub mod routes;
pub mod stix;
pub mod status;

pub use routes::*;
