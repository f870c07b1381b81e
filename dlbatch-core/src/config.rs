//! Serializable client configuration.

use crate::engine::{PollPolicy, PollingEngine};
use crate::error::DlError;
use crate::request::{RequestBuilder, DEFAULT_ID_PREFIX};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Everything needed to stand up a request builder and a polling engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Vendor account name, sent as `FIRMNAME`.
    pub firm_name: String,

    /// Prefix for request identifiers.
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,

    #[serde(default)]
    pub poll: PollPolicy,

    #[serde(default = "RetryPolicy::default_network")]
    pub retry: RetryPolicy,
}

fn default_id_prefix() -> String {
    DEFAULT_ID_PREFIX.to_string()
}

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, DlError> {
        toml::from_str(raw).map_err(|e| DlError::Config(e.to_string()))
    }

    /// Fresh request builder for one session.
    pub fn builder(&self) -> RequestBuilder {
        RequestBuilder::new(self.firm_name.as_str()).with_prefix(self.id_prefix.as_str())
    }

    pub fn engine(&self) -> PollingEngine {
        PollingEngine::new(self.poll.clone()).with_retry(self.retry.clone())
    }
}
