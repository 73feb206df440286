//! Client for the external threat-intelligence search API.

pub mod client;
pub mod errors;
pub mod json;
pub mod middleware;
pub mod query;
pub mod response;

pub use client::{SearchClient, SearchTransport};
pub use errors::UpstreamError;
pub use query::{QueryScope, SearchPayload};
pub use response::RawResponse;
