//! Validation service HTTP client.
//!
//! Blocking reqwest client (no Tokio runtime required). One call per row:
//! POST the row's cells, get back the structured per-row result tree the
//! engine flattens into cell metadata.
//!
//! No retries, no request cancellation. A hung request stalls the live
//! pump until its timeout fires; toggling data check resets everything.

mod client;

pub use client::{ClientError, ValidatorClient};
