//! Time-windowed aggregation of upstream mention counts.

pub mod driver;
pub mod models;
pub mod retry;

pub use driver::AggregationDriver;
pub use models::{AggregationRun, BulkRun, CellFailure, CountResult, Incomplete, Term};
pub use retry::{FetchReport, RetryPolicy, RetryingFetcher, Step, next_step, retry_delay};
