//! Batch polling engine: submit request files, poll for deposited replies.
//!
//! One transport session scopes the whole batch. Submission writes every
//! request to `<id>.req`; completion then alternates a cancellable wait with
//! an existence pass over the still-pending reply names, collecting each
//! `<id>.dat.gz` body as it appears. After every cycle the bookkeeping
//! invariant `completed + pending == submitted` holds — no identifier is lost
//! or double-counted.

use crate::codec;
use crate::error::DlError;
use crate::request::{Request, RequestId};
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Pacing and bounds for a polling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Pause between completion passes.
    pub poll_interval_ms: u64,
    /// Overall budget for the completion phase; `None` waits forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl PollPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// No deadline. The vendor gives no completion-time guarantee, so this is
    /// only sensible together with an external cancellation path.
    pub fn unbounded(poll_interval_ms: u64) -> Self {
        Self {
            poll_interval_ms,
            deadline_ms: None,
        }
    }
}

impl Default for PollPolicy {
    /// 30-second poll interval with a one-hour deadline.
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
            deadline_ms: Some(3_600_000),
        }
    }
}

/// Cooperative cancellation for an in-flight batch.
///
/// Clones share state; any clone can cancel and wake a waiting engine.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: Mutex<bool>,
    cv: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        *self.inner.cancelled.lock().unwrap() = true;
        self.inner.cv.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock().unwrap()
    }

    /// Block for up to `timeout`, waking early on cancellation. Returns true
    /// if the token was cancelled.
    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.inner.cancelled.lock().unwrap();
        let (cancelled, _timed_out) = self
            .inner
            .cv
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap();
        *cancelled
    }
}

/// Progress observer for a polling run.
pub trait PollProgress {
    /// A request file was written.
    fn on_submitted(&self, id: &RequestId, index: usize, total: usize);

    /// A reply was collected during `cycle`.
    fn on_resolved(&self, id: &RequestId, cycle: usize);

    /// A completion pass finished with the given bookkeeping counts.
    fn on_cycle(&self, cycle: usize, completed: usize, pending: usize);
}

/// Observer that ignores everything.
pub struct NullProgress;

impl PollProgress for NullProgress {
    fn on_submitted(&self, _id: &RequestId, _index: usize, _total: usize) {}
    fn on_resolved(&self, _id: &RequestId, _cycle: usize) {}
    fn on_cycle(&self, _cycle: usize, _completed: usize, _pending: usize) {}
}

/// Observer that reports through the `log` facade.
pub struct LogProgress;

impl PollProgress for LogProgress {
    fn on_submitted(&self, id: &RequestId, index: usize, total: usize) {
        info!("[{}/{total}] submitted {id}", index + 1);
    }

    fn on_resolved(&self, id: &RequestId, cycle: usize) {
        info!("{id} resolved in cycle {cycle}");
    }

    fn on_cycle(&self, cycle: usize, completed: usize, pending: usize) {
        debug!("poll cycle {cycle}: {completed} completed, {pending} pending");
    }
}

/// Owns a batch of outstanding request identifiers and polls the transport
/// until all are resolved, the deadline passes, or the caller cancels.
pub struct PollingEngine {
    policy: PollPolicy,
    retry: RetryPolicy,
}

impl PollingEngine {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            retry: RetryPolicy::default_network(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run a batch to completion. Request ids must be unique within the
    /// batch, which the builder guarantees.
    pub fn run(
        &self,
        transport: &dyn Transport,
        requests: &[Request],
        progress: &dyn PollProgress,
    ) -> Result<BTreeMap<RequestId, String>, DlError> {
        self.run_with_cancel(transport, requests, progress, &CancelToken::new())
    }

    /// Like [`run`](Self::run), but interruptible through `cancel`.
    pub fn run_with_cancel(
        &self,
        transport: &dyn Transport,
        requests: &[Request],
        progress: &dyn PollProgress,
        cancel: &CancelToken,
    ) -> Result<BTreeMap<RequestId, String>, DlError> {
        // Session release is the session's Drop, so every early return below
        // still closes the connection.
        let mut session = transport.connect()?;

        let submitted = requests.len();
        let mut pending: Vec<RequestId> = Vec::with_capacity(submitted);
        let mut completed: BTreeMap<RequestId, String> = BTreeMap::new();

        for (index, request) in requests.iter().enumerate() {
            self.retry
                .retry(|| session.write_all(&request.id.req_path(), request.text.as_bytes()))?;
            info!("submitted request id: {}", request.id);
            progress.on_submitted(&request.id, index, submitted);
            pending.push(request.id.clone());
        }

        let started = Instant::now();
        let mut cycle = 0usize;

        while !pending.is_empty() {
            let wait = match self.policy.deadline() {
                Some(deadline) => {
                    let elapsed = started.elapsed();
                    if elapsed >= deadline {
                        return Err(DlError::DeadlineExceeded {
                            deadline,
                            pending: pending.len(),
                        });
                    }
                    self.policy.interval().min(deadline - elapsed)
                }
                None => self.policy.interval(),
            };
            if cancel.wait(wait) {
                return Err(DlError::Cancelled {
                    pending: pending.len(),
                });
            }

            cycle += 1;
            let mut still_pending = Vec::with_capacity(pending.len());
            for id in std::mem::take(&mut pending) {
                let reply = id.reply_path();
                let present = match self.retry.retry(|| session.exists(&reply)) {
                    Ok(present) => present,
                    Err(err) if err.is_retryable() => {
                        warn!("exists({reply}) still failing after retries: {err}; will probe again next cycle");
                        still_pending.push(id);
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                };
                if !present {
                    still_pending.push(id);
                    continue;
                }
                let body = self.retry.retry(|| session.read_all(&reply))?;
                let text = codec::decode_reply(&body)?;
                debug!("request {id} resolved ({} compressed bytes)", body.len());
                completed.insert(id.clone(), text);
                progress.on_resolved(&id, cycle);
            }
            pending = still_pending;

            debug_assert_eq!(
                completed.len() + pending.len(),
                submitted,
                "request id lost or double-counted"
            );
            progress.on_cycle(cycle, completed.len(), pending.len());
        }

        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::request::RequestBuilder;
    use crate::transport::{MemoryTransport, TransportSession};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            poll_interval_ms: 1,
            deadline_ms: Some(5_000),
        }
    }

    fn requests(n: usize) -> Vec<Request> {
        let mut builder = RequestBuilder::with_session("acme", "20200101120000");
        (0..n)
            .map(|_| builder.build(&[], &["PX_LAST"], &["IBM Equity"]))
            .collect()
    }

    /// Records every on_cycle callback for invariant checks.
    #[derive(Default)]
    struct Recorder {
        cycles: Mutex<Vec<(usize, usize, usize)>>,
    }

    impl PollProgress for Recorder {
        fn on_submitted(&self, _id: &RequestId, _index: usize, _total: usize) {}
        fn on_resolved(&self, _id: &RequestId, _cycle: usize) {}
        fn on_cycle(&self, cycle: usize, completed: usize, pending: usize) {
            self.cycles.lock().unwrap().push((cycle, completed, pending));
        }
    }

    #[test]
    fn collects_replies_across_staggered_cycles() {
        let transport = MemoryTransport::new();
        let batch = requests(3);
        // One reply up immediately, the other two a cycle later.
        transport.deposit(batch[0].id.reply_path(), gzip("reply zero"));
        transport.deposit_after(batch[1].id.reply_path(), gzip("reply one"), 1);
        transport.deposit_after(batch[2].id.reply_path(), gzip("reply two"), 1);

        let recorder = Recorder::default();
        let engine = PollingEngine::new(fast_policy());
        let replies = engine.run(&transport, &batch, &recorder).unwrap();

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[&batch[0].id], "reply zero");
        assert_eq!(replies[&batch[1].id], "reply one");
        assert_eq!(replies[&batch[2].id], "reply two");

        // completed + pending == submitted after every cycle.
        let cycles = recorder.cycles.lock().unwrap();
        assert!(!cycles.is_empty());
        for (_, completed, pending) in cycles.iter() {
            assert_eq!(completed + pending, 3);
        }
        assert_eq!(cycles.last().unwrap().2, 0);
    }

    #[test]
    fn submission_writes_the_request_text_under_the_req_name() {
        let transport = MemoryTransport::new();
        let batch = requests(1);
        transport.deposit(batch[0].id.reply_path(), gzip("done"));

        let engine = PollingEngine::new(fast_policy());
        engine.run(&transport, &batch, &NullProgress).unwrap();

        assert_eq!(
            transport.written(&batch[0].id.req_path()),
            Some(batch[0].text.clone().into_bytes())
        );
    }

    #[test]
    fn empty_batch_resolves_without_polling() {
        let transport = MemoryTransport::new();
        let engine = PollingEngine::new(fast_policy());
        let replies = engine.run(&transport, &[], &NullProgress).unwrap();
        assert!(replies.is_empty());
    }

    #[test]
    fn deadline_bounds_the_wait() {
        let transport = MemoryTransport::new();
        let batch = requests(1); // no reply ever deposited
        let engine = PollingEngine::new(PollPolicy {
            poll_interval_ms: 5,
            deadline_ms: Some(20),
        });
        let err = engine.run(&transport, &batch, &NullProgress).unwrap_err();
        match err {
            DlError::DeadlineExceeded { pending, .. } => assert_eq!(pending, 1),
            other => panic!("expected deadline error, got {other:?}"),
        }
    }

    #[test]
    fn cancellation_interrupts_the_wait() {
        let transport = MemoryTransport::new();
        let batch = requests(2);
        let engine = PollingEngine::new(PollPolicy::unbounded(60_000));
        let cancel = CancelToken::new();

        let canceller = {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                cancel.cancel();
            })
        };

        let err = engine
            .run_with_cancel(&transport, &batch, &NullProgress, &cancel)
            .unwrap_err();
        canceller.join().unwrap();
        match err {
            DlError::Cancelled { pending } => assert_eq!(pending, 2),
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert!(cancel.is_cancelled());
    }

    /// Transport whose exists() drops the connection a fixed number of times
    /// before behaving.
    #[derive(Clone)]
    struct FlakyTransport {
        inner: MemoryTransport,
        exists_failures: Arc<AtomicU32>,
    }

    struct FlakySession {
        inner: Box<dyn TransportSession>,
        exists_failures: Arc<AtomicU32>,
    }

    impl Transport for FlakyTransport {
        fn connect(&self) -> Result<Box<dyn TransportSession>, TransportError> {
            Ok(Box::new(FlakySession {
                inner: self.inner.connect()?,
                exists_failures: Arc::clone(&self.exists_failures),
            }))
        }
    }

    impl TransportSession for FlakySession {
        fn exists(&mut self, path: &str) -> Result<bool, TransportError> {
            let remaining = self.exists_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.exists_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(TransportError::ConnectionLost("flaky".into()));
            }
            self.inner.exists(path)
        }

        fn read_all(&mut self, path: &str) -> Result<Vec<u8>, TransportError> {
            self.inner.read_all(path)
        }

        fn write_all(&mut self, path: &str, body: &[u8]) -> Result<(), TransportError> {
            self.inner.write_all(path, body)
        }
    }

    #[test]
    fn transient_exists_faults_are_retried_within_a_cycle() {
        let inner = MemoryTransport::new();
        let batch = requests(1);
        inner.deposit(batch[0].id.reply_path(), gzip("eventually"));
        let transport = FlakyTransport {
            inner,
            exists_failures: Arc::new(AtomicU32::new(2)),
        };

        let engine = PollingEngine::new(fast_policy())
            .with_retry(RetryPolicy::new(4, 1, 1, 0.0));
        let replies = engine.run(&transport, &batch, &NullProgress).unwrap();
        assert_eq!(replies[&batch[0].id], "eventually");
    }

    #[test]
    fn exhausted_exists_budget_leaves_the_id_pending_for_the_next_cycle() {
        let inner = MemoryTransport::new();
        let batch = requests(1);
        inner.deposit(batch[0].id.reply_path(), gzip("late but fine"));
        // Three failures against a budget of two spills into a second cycle.
        let transport = FlakyTransport {
            inner,
            exists_failures: Arc::new(AtomicU32::new(3)),
        };

        let recorder = Recorder::default();
        let engine = PollingEngine::new(fast_policy())
            .with_retry(RetryPolicy::new(2, 1, 1, 0.0));
        let replies = engine.run(&transport, &batch, &recorder).unwrap();
        assert_eq!(replies[&batch[0].id], "late but fine");

        let cycles = recorder.cycles.lock().unwrap();
        assert!(cycles.len() >= 2);
        assert_eq!(cycles[0], (1, 0, 1)); // still pending after the flaky cycle
        for (_, completed, pending) in cycles.iter() {
            assert_eq!(completed + pending, 1);
        }
    }

    /// Transport that rejects the login outright.
    struct LockedOutTransport;

    impl Transport for LockedOutTransport {
        fn connect(&self) -> Result<Box<dyn TransportSession>, TransportError> {
            Err(TransportError::AuthFailed("key rejected".into()))
        }
    }

    #[test]
    fn fatal_transport_faults_abort_the_batch() {
        let engine = PollingEngine::new(fast_policy());
        let err = engine
            .run(&LockedOutTransport, &requests(1), &NullProgress)
            .unwrap_err();
        match err {
            DlError::Transport(inner) => assert!(!inner.is_retryable()),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_reply_body_is_a_decode_error() {
        let transport = MemoryTransport::new();
        let batch = requests(1);
        transport.deposit(batch[0].id.reply_path(), b"plainly not gzip".to_vec());

        let engine = PollingEngine::new(fast_policy());
        let err = engine.run(&transport, &batch, &NullProgress).unwrap_err();
        assert!(matches!(err, DlError::Decode(_)));
    }
}
