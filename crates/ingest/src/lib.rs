//! Ingestion gateway for Perceptor.
//!
//! Turns raw collector submissions into validated, redacted, deduplicated
//! stored events. All failures are in-band result values; nothing in this
//! crate returns an error to the caller.

pub mod gateway;
pub mod redact;

pub use gateway::{BatchError, BatchReport, BatchStatus, IngestGateway, RawSubmission, SubmitResult};
pub use redact::{REDACTION_MARKER, redact_credentials};
