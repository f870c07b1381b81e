//! Remote file-exchange transport interface.
//!
//! The network layer itself (SFTP session management, authentication,
//! directory navigation) is an external collaborator; the engine only needs
//! the capability set below. Sessions are RAII-scoped: dropping one releases
//! the connection on every exit path.

use crate::error::TransportError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Factory for transport sessions. One session scopes one polling batch.
pub trait Transport {
    fn connect(&self) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// A live session against the vendor's exchange directory.
///
/// Replies are consumed whole before decompression, so the read capability is
/// expressed as a whole-payload read rather than a stream handle.
pub trait TransportSession {
    /// Whether `path` exists in the exchange directory.
    fn exists(&mut self, path: &str) -> Result<bool, TransportError>;

    /// Read the whole file at `path` as raw bytes.
    fn read_all(&mut self, path: &str) -> Result<Vec<u8>, TransportError>;

    /// Create or overwrite the file at `path`.
    fn write_all(&mut self, path: &str, body: &[u8]) -> Result<(), TransportError>;
}

/// In-memory transport double.
///
/// Holds a shared file map so a test (or any embedding without a network) can
/// deposit reply files and inspect submitted requests. `deposit_after` makes
/// a file visible only after a number of existence probes, which is how tests
/// script multi-cycle polling.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    files: HashMap<String, Vec<u8>>,
    // Remaining exists() probes before the file becomes visible.
    delays: HashMap<String, u32>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposit a file that is immediately visible.
    pub fn deposit(&self, path: impl Into<String>, body: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(path.into(), body);
    }

    /// Deposit a file that becomes visible after `probes` existence checks.
    pub fn deposit_after(&self, path: impl Into<String>, body: Vec<u8>, probes: u32) {
        let path = path.into();
        let mut state = self.state.lock().unwrap();
        state.delays.insert(path.clone(), probes);
        state.files.insert(path, body);
    }

    /// Contents written under `path`, if any.
    pub fn written(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }
}

impl Transport for MemoryTransport {
    fn connect(&self) -> Result<Box<dyn TransportSession>, TransportError> {
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
}

impl TransportSession for MemorySession {
    fn exists(&mut self, path: &str) -> Result<bool, TransportError> {
        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.delays.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(false);
            }
        }
        Ok(state.files.contains_key(path))
    }

    fn read_all(&mut self, path: &str) -> Result<Vec<u8>, TransportError> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| TransportError::PathNotFound(path.to_string()))
    }

    fn write_all(&mut self, path: &str, body: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.files.insert(path.to_string(), body.to_vec());
        Ok(())
    }
}
