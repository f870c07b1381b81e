//! dlbatch-core — batch client for a financial data vendor's remote
//! file-exchange service.
//!
//! The vendor takes requests as uploaded text files and deposits
//! gzip-compressed replies under the request's name once processing
//! finishes. This crate covers:
//! - Request serialization into the vendor's stanza wire format (`request`)
//! - Reply parsing into per-security date-indexed tables (`response`, `table`)
//! - Batch submission and polling over a pluggable transport (`engine`,
//!   `transport`), with bounded deadlines, cancellation, and retry of
//!   transient faults (`retry`)
//! - The gzip reply codec (`codec`) and serializable configuration (`config`)
//!
//! The network transport itself is an external collaborator behind the
//! [`transport::Transport`] trait.

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod request;
pub mod response;
pub mod retry;
pub mod table;
pub mod transport;

pub use config::ClientConfig;
pub use engine::{CancelToken, LogProgress, NullProgress, PollPolicy, PollProgress, PollingEngine};
pub use error::{DlError, TransportError};
pub use request::{Request, RequestBuilder, RequestId};
pub use response::parse_history;
pub use retry::RetryPolicy;
pub use table::SecurityTable;
