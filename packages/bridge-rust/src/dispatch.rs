//! Concurrent call dispatch with per-call outcome capture.
//!
//! Each resolved call becomes an independent tokio task; the inbound path
//! that received the envelope is never blocked. The handler body runs on the
//! blocking pool because registered handlers are synchronous and may block
//! arbitrarily. No ordering is guaranteed between concurrent dispatches,
//! even for the same method.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::registry::{InvokeOutcome, MethodEntry, ServiceEntry};

// ---------------------------------------------------------------------------
// CallError / CallOutcome
// ---------------------------------------------------------------------------

/// Handler-side failure captured in a call outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    /// The positional arguments did not decode into the handler's declared
    /// argument type.
    #[error("argument decode failed: {0}")]
    ArgumentMismatch(String),
    /// The handler returned a non-nil error indicator.
    #[error("handler returned error: {0}")]
    Handler(String),
    /// The populated reply destination is not representable in the wire
    /// format.
    #[error("reply not representable in wire format: {0}")]
    ReplyEncode(String),
    /// The dispatcher stopped waiting. The handler itself is not
    /// interrupted; a hung handler keeps its blocking-pool slot.
    #[error("call exceeded deadline of {limit:?}")]
    DeadlineExceeded {
        /// The configured deadline.
        limit: Duration,
    },
    /// The handler panicked. The panic is contained by the dispatch task
    /// and never crosses into the inbound path.
    #[error("handler panicked")]
    Panicked,
}

/// The completed state of one dispatched call.
///
/// Both the reply value and the error indicator are retained so they can be
/// handed to a reply-sending collaborator once that path exists.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// Full `"Service.Method"` identifier of the call.
    pub method: String,
    /// Serialized reply destination after the handler ran.
    pub reply: Option<rmpv::Value>,
    /// Error indicator, absent on clean completion.
    pub error: Option<CallError>,
}

// ---------------------------------------------------------------------------
// ReplySink
// ---------------------------------------------------------------------------

/// Collaborator that receives every completed call outcome.
///
/// The reply-to-caller path is not wired yet and the wire protocol defines
/// no correlation scheme (request id or otherwise), so outcomes carry only
/// the method identifier. A real reply transport plugs in here.
pub trait ReplySink: Send + Sync {
    /// Accepts one completed outcome. Called from the dispatch task.
    fn deliver(&self, outcome: CallOutcome);
}

/// Default sink: logs each outcome and retains a bounded, inspectable trail.
///
/// Silent discard would lose caller-visible failure information, so until a
/// reply path exists every outcome is at least logged and queryable. A
/// capacity of zero logs but retains nothing.
pub struct UnmatchedReplyLog {
    capacity: usize,
    entries: Mutex<VecDeque<CallOutcome>>,
}

impl UnmatchedReplyLog {
    /// Creates a trail retaining at most `capacity` recent outcomes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Snapshot of the retained outcomes, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<CallOutcome> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of retained outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the trail is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ReplySink for UnmatchedReplyLog {
    fn deliver(&self, outcome: CallOutcome) {
        match &outcome.error {
            Some(error) => warn!(
                method = %outcome.method,
                %error,
                "call finished with error; reply path not wired"
            ),
            None => debug!(
                method = %outcome.method,
                "call finished; outcome retained (reply path not wired)"
            ),
        }
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(outcome);
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Awaitable completion of one dispatched call.
///
/// Dropping the handle detaches the call (fire-and-forget); the outcome
/// still reaches the [`ReplySink`].
#[derive(Debug)]
pub struct DispatchHandle {
    completion: oneshot::Receiver<CallOutcome>,
}

impl DispatchHandle {
    /// Waits for the call to complete. `None` only if the dispatch task was
    /// torn down before completing (runtime shutdown).
    pub async fn outcome(self) -> Option<CallOutcome> {
        self.completion.await.ok()
    }
}

/// Launches resolved calls as independent units of concurrent work.
pub struct Dispatcher {
    limiter: Option<Arc<Semaphore>>,
    call_timeout: Option<Duration>,
    sink: Arc<dyn ReplySink>,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    /// Creates a dispatcher with the given config and outcome sink.
    pub fn new(config: &BridgeConfig, sink: Arc<dyn ReplySink>) -> Self {
        Self {
            limiter: config
                .max_in_flight
                .map(|permits| Arc::new(Semaphore::new(permits))),
            call_timeout: config.call_timeout,
            sink,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of dispatched calls not yet completed. Diagnostic only.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Launches one call and returns immediately.
    ///
    /// The spawned task acquires an in-flight permit (when bounded),
    /// increments the method's call counter, runs the handler on the
    /// blocking pool, and hands the captured outcome to the sink. The
    /// permit gates handler execution only -- this method never blocks.
    pub fn dispatch(
        &self,
        service: &ServiceEntry,
        method: &Arc<MethodEntry>,
        method_id: String,
        args: Vec<rmpv::Value>,
    ) -> DispatchHandle {
        debug!(
            service = service.name(),
            method = %method_id,
            args = args.len(),
            "dispatching call"
        );

        let (completion_tx, completion_rx) = oneshot::channel();
        let limiter = self.limiter.clone();
        let call_timeout = self.call_timeout;
        let sink = Arc::clone(&self.sink);
        let in_flight = Arc::clone(&self.in_flight);
        let method = Arc::clone(method);

        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let _permit = match &limiter {
                Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
                None => None,
            };

            method.record_call();
            let invocation = {
                let method = Arc::clone(&method);
                tokio::task::spawn_blocking(move || method.run(args))
            };

            let outcome = match call_timeout {
                Some(limit) => match tokio::time::timeout(limit, invocation).await {
                    Ok(joined) => finish(&method_id, joined),
                    Err(_) => CallOutcome {
                        method: method_id,
                        reply: None,
                        error: Some(CallError::DeadlineExceeded { limit }),
                    },
                },
                None => finish(&method_id, invocation.await),
            };

            in_flight.fetch_sub(1, Ordering::SeqCst);
            let _ = completion_tx.send(outcome.clone());
            sink.deliver(outcome);
        });

        DispatchHandle {
            completion: completion_rx,
        }
    }
}

fn finish(
    method_id: &str,
    joined: Result<InvokeOutcome, tokio::task::JoinError>,
) -> CallOutcome {
    match joined {
        Ok(invoked) => CallOutcome {
            method: method_id.to_string(),
            reply: invoked.reply,
            error: invoked.error,
        },
        Err(join_error) => {
            warn!(method = method_id, %join_error, "handler task failed to join");
            CallOutcome {
                method: method_id.to_string(),
                reply: None,
                error: Some(CallError::Panicked),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
