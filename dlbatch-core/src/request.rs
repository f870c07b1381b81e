//! Request serialization and per-session identifier allocation.
//!
//! The vendor accepts plain-text request files made of fixed marker stanzas:
//! a header block, a fields block, and a data block. Each request gets a
//! session-unique identifier that doubles as the base name of both the
//! uploaded request file and the reply file the vendor deposits.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default prefix for request identifiers.
pub const DEFAULT_ID_PREFIX: &str = "dlb";

/// Unique token correlating a submitted request file with its eventual reply
/// file. Format: `<prefix>_<YYYYmmddHHMMSS>_<counter>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Remote name of the request file this id is submitted under.
    pub fn req_path(&self) -> String {
        format!("{}.req", self.0)
    }

    /// Remote name of the compressed reply file the vendor deposits.
    /// This naming is the authoritative correlation key — it must match the
    /// `REPLYFILENAME` header of the request exactly.
    pub fn reply_path(&self) -> String {
        format!("{}.dat.gz", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A serialized request ready for submission. Immutable once built.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub text: String,
}

/// Builds vendor wire-format requests and allocates session-unique ids.
///
/// All identifier state is instance-scoped: the session timestamp is fixed at
/// construction and the counter only moves forward, so ids from one builder
/// are pairwise distinct and independent builders can coexist.
#[derive(Debug)]
pub struct RequestBuilder {
    firm_name: String,
    prefix: String,
    session_ts: String,
    counter: u64,
}

impl RequestBuilder {
    /// Builder stamped with the current UTC time.
    pub fn new(firm_name: impl Into<String>) -> Self {
        Self::with_session(firm_name, Utc::now().format("%Y%m%d%H%M%S").to_string())
    }

    /// Builder with an explicit session timestamp string, for deterministic
    /// identifiers.
    pub fn with_session(firm_name: impl Into<String>, session_ts: impl Into<String>) -> Self {
        Self {
            firm_name: firm_name.into(),
            prefix: DEFAULT_ID_PREFIX.to_string(),
            session_ts: session_ts.into(),
            counter: 0,
        }
    }

    /// Replace the default identifier prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn next_id(&mut self) -> RequestId {
        self.counter += 1;
        RequestId(format!("{}_{}_{}", self.prefix, self.session_ts, self.counter))
    }

    /// Serialize one request.
    ///
    /// The text is assembled in fixed order: opening marker, mandatory header
    /// entries, caller headers (one `KEY=VALUE` per line, in caller order),
    /// fields block, data block, closing marker. Empty field or data lists
    /// are legal and produce empty blocks. Pure text construction — no I/O.
    pub fn build(&mut self, headers: &[(&str, &str)], fields: &[&str], data: &[&str]) -> Request {
        let id = self.next_id();

        let mut text = String::new();
        text.push_str("START-OF-FILE\n");
        text.push_str(&format!("FIRMNAME={}\n", self.firm_name));
        // The vendor appends .gz itself because of COMPRESS=yes, so the
        // header names the uncompressed reply file.
        text.push_str(&format!("REPLYFILENAME={}.dat\n", id.as_str()));
        text.push_str("COMPRESS=yes\n");
        text.push_str("PROGRAMFLAG=oneshot\n");
        for (key, value) in headers {
            text.push_str(&format!("{key}={value}\n"));
        }
        text.push_str("START-OF-FIELDS\n");
        for field in fields {
            text.push_str(field);
            text.push('\n');
        }
        text.push_str("END-OF-FIELDS\n");
        text.push_str("START-OF-DATA\n");
        for line in data {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str("END-OF-DATA\n");
        text.push_str("END-OF-FILE\n");

        Request { id, text }
    }
}
