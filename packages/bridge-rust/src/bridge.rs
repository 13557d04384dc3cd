//! Bridge facade: inbound decode/resolve/dispatch and the outbound call path.

use std::sync::Arc;

use tracing::{error, warn};

use hostlink_core::codec::{self, EncodeError};
use hostlink_core::envelope::{Envelope, MalformedIdentifier, MethodId};

use crate::config::BridgeConfig;
use crate::dispatch::{DispatchHandle, Dispatcher, ReplySink, UnmatchedReplyLog};
use crate::registry::Registry;
use crate::transport::{Transport, TransportError};

// ---------------------------------------------------------------------------
// OutboundError
// ---------------------------------------------------------------------------

/// Error on the locally-initiated call path.
#[derive(Debug, thiserror::Error)]
pub enum OutboundError {
    /// The method identifier would be unroutable on the peer side.
    #[error(transparent)]
    MalformedIdentifier(#[from] MalformedIdentifier),
    /// An argument value is not representable in the wire format.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// The transport refused the frame.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

/// One end of the call bridge.
///
/// Owns the dispatcher and the outbound transport handle; the registry is
/// shared so application code can register services before the transport
/// starts delivering envelopes.
pub struct Bridge<T> {
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    transport: T,
    reply_log: Option<Arc<UnmatchedReplyLog>>,
}

impl<T: Transport> Bridge<T> {
    /// Creates a bridge whose call outcomes land in an [`UnmatchedReplyLog`].
    #[must_use]
    pub fn new(registry: Arc<Registry>, transport: T, config: &BridgeConfig) -> Self {
        let reply_log = Arc::new(UnmatchedReplyLog::new(config.reply_log_capacity));
        let dispatcher = Dispatcher::new(config, reply_log.clone());
        Self {
            registry,
            dispatcher,
            transport,
            reply_log: Some(reply_log),
        }
    }

    /// Creates a bridge that hands call outcomes to a custom sink -- the
    /// hook for wiring a real reply path.
    #[must_use]
    pub fn with_reply_sink(
        registry: Arc<Registry>,
        transport: T,
        config: &BridgeConfig,
        sink: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            registry,
            dispatcher: Dispatcher::new(config, sink),
            transport,
            reply_log: None,
        }
    }

    /// Starts the transport's native channel. Call once, after registration.
    ///
    /// # Errors
    ///
    /// Propagates the transport's startup failure.
    pub fn start(&self) -> anyhow::Result<()> {
        self.transport.start()
    }

    /// The shared service registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The default outcome trail, absent when a custom sink was supplied.
    #[must_use]
    pub fn reply_log(&self) -> Option<&Arc<UnmatchedReplyLog>> {
        self.reply_log.as_ref()
    }

    /// The dispatcher, exposed for in-flight diagnostics.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handles one inbound frame: decode, resolve, dispatch.
    ///
    /// Decode and resolution failures are terminal for this frame only --
    /// they are logged and the frame is dropped, never escalated. On
    /// success the returned handle observes the call's completion; dropping
    /// it keeps the call fire-and-forget.
    pub fn handle_inbound(&self, frame: &[u8]) -> Option<DispatchHandle> {
        let envelope = match codec::decode(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, frame_len = frame.len(), "dropping undecodable envelope");
                return None;
            }
        };
        let (service, method) = match self.registry.resolve(&envelope.method) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(method = %envelope.method, error = %err, "dropping unroutable envelope");
                return None;
            }
        };
        Some(
            self.dispatcher
                .dispatch(&service, &method, envelope.method, envelope.args),
        )
    }

    /// Builds, encodes, and sends one outbound call. One-way: any reply
    /// arrives later as a new inbound envelope.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError`] for an ill-formed method identifier, an
    /// unencodable argument, or a transport refusal.
    pub fn call_remote(&self, method: &str, args: Vec<rmpv::Value>) -> Result<(), OutboundError> {
        // Reject unroutable identifiers before they reach the wire.
        MethodId::parse(method)?;
        let frame = codec::encode(&Envelope::new(method, args))?;
        self.transport.send(frame)?;
        Ok(())
    }

    /// Records an error event reported by the transport. Never fatal; the
    /// transport owns its own recovery.
    pub fn handle_transport_error(&self, event: &str) {
        error!(%event, "transport reported error event");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
