//! # Peer with Async Pump
//!
//! One end of a live connection. A `Peer` both issues calls to the other side and serves
//! calls against the objects in its own registry; the two ends are the same type.
//!
//! ## Architecture
//!
//! Creating a peer spawns two tasks:
//! - **Writer**: drains an ordered outbound queue into `Transport::send`.
//! - **Pump**: reads inbound frames one at a time. Replies are routed to the pending call
//!   with the matching sequence number. Calls are each dispatched on their own task, so a
//!   handler that suspends never holds up the frames behind it.
//!
//! ## Invariants
//! - **Fresh Sequence Numbers**: Strictly increasing from 1, never reused on a connection.
//! - **Single Settlement**: A pending call resolves exactly once (reply, timeout, cancel,
//!   or disconnect). A late reply for a call that timed out or was cancelled is dropped
//!   quietly.
//! - **Fatal Decode Errors**: A frame that fails to decode tears the connection down; every
//!   pending call fails with `CallError::Disconnected`.
//! - **Owned Connection**: The tasks never hold a user handle between frames. Dropping the
//!   last `Peer` clone tears the connection down and releases the registry.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::time::Sleep;
use tracing::Instrument;

use livepack::Value;
use liverpc::CallOutcome;
use liverpc::CallRequest;
use liverpc::ErrorInfo;
use liverpc::Frame;
use liverpc::ObjectId;

use crate::config::PeerConfig;
use crate::registry::ObjectRegistry;
use crate::registry::RemoteObject;
use crate::transport::Transport;

/// How a call failed, from the caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// The remote side answered with a failure.
    Remote(ErrorInfo),
    /// No reply arrived before the call's deadline.
    Timeout,
    /// The caller dropped interest in the call.
    Cancelled,
    /// The connection was torn down before a reply arrived.
    Disconnected(String),
    /// The arguments could not be encoded.
    Encode(liverpc::Error),
}

impl CallError {
    /// The remote failure message, if the other side produced one.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Remote(info) => Some(&info.message),
            _ => None,
        }
    }

    pub fn remote(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Remote(info) => Some(info),
            _ => None,
        }
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(info) => write!(f, "Remote failure: {}", info),
            Self::Timeout => write!(f, "Call timed out"),
            Self::Cancelled => write!(f, "Call cancelled"),
            Self::Disconnected(reason) => write!(f, "Disconnected: {}", reason),
            Self::Encode(e) => write!(f, "Encode error: {}", e),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Remote(info) => Some(info),
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ErrorInfo> for CallError {
    fn from(info: ErrorInfo) -> Self {
        Self::Remote(info)
    }
}

/// Connection-level happenings, published to `Peer::subscribe` listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// A reply arrived for a sequence number this peer never issued.
    UnexpectedReply { seq: u64 },
    /// The connection was torn down.
    Closed { reason: String },
}

/// A snapshot of a peer's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerStats {
    pub calls_sent: u64,
    pub replies_received: u64,
    pub unexpected_replies: u64,
    pub calls_served: u64,
}

#[derive(Default)]
struct Counters {
    calls_sent: AtomicU64,
    replies_received: AtomicU64,
    unexpected_replies: AtomicU64,
    calls_served: AtomicU64,
}

type Reply = Result<Value, CallError>;

/// Recently abandoned calls, oldest first.
#[derive(Default)]
struct Abandoned {
    ids: HashSet<u64>,
    order: VecDeque<u64>,
}

impl Abandoned {
    fn remember(&mut self, seq: u64, horizon: usize) {
        if horizon == 0 || !self.ids.insert(seq) {
            return;
        }
        self.order.push_back(seq);
        while self.order.len() > horizon {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn forget(&mut self, seq: u64) -> bool {
        if self.order.back() == Some(&seq) {
            self.order.pop_back();
        }
        self.ids.remove(&seq)
    }
}

struct Inner {
    name: String,
    config: PeerConfig,
    registry: ObjectRegistry,
    pending: DashMap<u64, oneshot::Sender<Reply>>,
    /// Calls that timed out or were cancelled and may still get a late reply.
    abandoned: Mutex<Abandoned>,
    seq_gen: AtomicU64,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    events: broadcast::Sender<PeerEvent>,
    closed: OnceLock<String>,
    shutdown: watch::Sender<bool>,
    counters: Counters,
}

impl Inner {
    /// Tears the connection down. Only the first reason sticks.
    fn teardown(&self, reason: String) {
        if self.closed.set(reason.clone()).is_err() {
            return;
        }
        self.shutdown.send_replace(true);
        tracing::info!(peer = %self.name, %reason, "connection closed");

        let keys: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, tx)) = self.pending.remove(&key) {
                let _ = tx.send(Err(CallError::Disconnected(reason.clone())));
            }
        }

        let _ = self.events.send(PeerEvent::Closed { reason });
    }

    fn abandoned(&self) -> MutexGuard<'_, Abandoned> {
        self.abandoned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops interest in a pending call, remembering its id so a late reply is ignored.
    fn abandon(&self, seq: u64) {
        // Mark first: the pump checks `pending` before `abandoned`.
        self.abandoned().remember(seq, self.config.abandoned_horizon);
        if self.pending.remove(&seq).is_none() {
            self.abandoned().forget(seq);
        }
    }
}

/// Shared by every `Peer` clone. The pump holds it only while handling a frame, and a
/// served call only until its handler returns.
struct Owner {
    inner: Arc<Inner>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.inner.teardown("Peer dropped".into());
    }
}

/// A handle to one end of a live connection.
///
/// Cloning is cheap; all clones share the same connection. The connection lives until
/// the transport closes, `close` is called, or the last clone is dropped.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<Inner>,
    _owner: Arc<Owner>,
}

impl Peer {
    /// Creates a new peer and spawns its writer and pump tasks.
    /// The name is used for logging and diagnostics.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self::with_config(name, transport, PeerConfig::default())
    }

    pub fn with_config(
        name: impl Into<String>,
        transport: Box<dyn Transport>,
        config: PeerConfig,
    ) -> Self {
        let transport: Arc<dyn Transport> = Arc::from(transport);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (shutdown, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            name: name.into(),
            config,
            registry: ObjectRegistry::new(),
            pending: DashMap::new(),
            abandoned: Mutex::new(Abandoned::default()),
            seq_gen: AtomicU64::new(1),
            outbound,
            events,
            closed: OnceLock::new(),
            shutdown,
            counters: Counters::default(),
        });
        let owner = Arc::new(Owner { inner: inner.clone() });

        tokio::spawn(Self::write_loop(inner.clone(), transport.clone(), outbound_rx));
        tokio::spawn(Self::pump(inner.clone(), Arc::downgrade(&owner), transport));

        Self { inner, _owner: owner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The objects this peer serves to the other side.
    pub fn registry(&self) -> &ObjectRegistry {
        &self.inner.registry
    }

    /// Shorthand for `registry().export(..)`.
    pub fn export(&self, object: Arc<dyn RemoteObject>) -> ObjectId {
        self.inner.registry.export(object)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get().is_some()
    }

    /// The reason the connection was torn down, if it was.
    pub fn close_reason(&self) -> Option<&str> {
        self.inner.closed.get().map(String::as_str)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.inner.events.subscribe()
    }

    pub fn stats(&self) -> PeerStats {
        let c = &self.inner.counters;
        PeerStats {
            calls_sent: c.calls_sent.load(Ordering::Relaxed),
            replies_received: c.replies_received.load(Ordering::Relaxed),
            unexpected_replies: c.unexpected_replies.load(Ordering::Relaxed),
            calls_served: c.calls_served.load(Ordering::Relaxed),
        }
    }

    /// Number of calls awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of cancelled or timed-out calls whose late replies would still be dropped
    /// quietly. Never more than `PeerConfig::abandoned_horizon`.
    pub fn abandoned_calls(&self) -> usize {
        self.inner.abandoned().ids.len()
    }

    /// Tears the connection down locally. Pending calls fail with `Disconnected`.
    pub fn close(&self) {
        self.inner.teardown("Closed locally".into());
    }

    /// Invokes `method` on the remote object `target`.
    ///
    /// Returns immediately; the request is queued and the returned future settles when
    /// the reply arrives. The peer's `default_deadline`, if any, applies.
    pub fn call(&self, target: ObjectId, method: impl Into<String>, args: Vec<Value>) -> CallFuture {
        self.start_call(target, method.into(), args, self.inner.config.default_deadline)
    }

    /// Like `call`, but settles to `CallError::Timeout` if no reply arrives within `deadline`.
    pub fn call_with_deadline(
        &self,
        target: ObjectId,
        method: impl Into<String>,
        args: Vec<Value>,
        deadline: Duration,
    ) -> CallFuture {
        self.start_call(target, method.into(), args, Some(deadline))
    }

    fn start_call(
        &self,
        target: ObjectId,
        method: String,
        args: Vec<Value>,
        deadline: Option<Duration>,
    ) -> CallFuture {
        let inner = &self.inner;
        let seq = inner.seq_gen.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let future = CallFuture {
            seq,
            rx,
            deadline: deadline.map(|d| Box::pin(tokio::time::sleep(d))),
            peer: Arc::downgrade(inner),
            settled: false,
        };

        inner.pending.insert(seq, tx);

        // Teardown sets `closed` before draining `pending`, so checking after the insert
        // cannot miss it.
        if let Some(reason) = inner.closed.get() {
            self.fail_pending(seq, CallError::Disconnected(reason.clone()));
            return future;
        }

        tracing::debug!(peer = %inner.name, seq, %target, %method, "call");
        let frame = Frame::Call(CallRequest::new(seq, target, method, args));
        match frame.encode() {
            Ok(bytes) => {
                if inner.outbound.send(bytes).is_err() {
                    self.fail_pending(seq, CallError::Disconnected("Writer stopped".into()));
                } else {
                    inner.counters.calls_sent.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => self.fail_pending(seq, CallError::Encode(e)),
        }

        future
    }

    fn fail_pending(&self, seq: u64, error: CallError) {
        if let Some((_, tx)) = self.inner.pending.remove(&seq) {
            let _ = tx.send(Err(error));
        }
    }

    /// Encodes and queues a frame. Frames leave in queue order.
    fn enqueue(&self, frame: Frame) -> liverpc::Result<()> {
        let bytes = frame.encode()?;
        // A closed queue means the connection is already down.
        let _ = self.inner.outbound.send(bytes);
        Ok(())
    }

    async fn write_loop(
        inner: Arc<Inner>,
        transport: Arc<dyn Transport>,
        mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        let mut shutdown = inner.shutdown.subscribe();
        loop {
            let bytes = tokio::select! {
                _ = shutdown.wait_for(|closed| *closed) => break,
                next = outbound.recv() => match next {
                    Some(bytes) => bytes,
                    None => break,
                },
            };

            if let Err(e) = transport.send(&bytes).await {
                tracing::warn!(peer = %inner.name, error = %e, "transport send failed");
                inner.teardown(format!("Transport error: {}", e));
                break;
            }
        }
    }

    async fn pump(inner: Arc<Inner>, owner: Weak<Owner>, transport: Arc<dyn Transport>) {
        let mut shutdown = inner.shutdown.subscribe();
        let reason = loop {
            let received = tokio::select! {
                _ = shutdown.wait_for(|closed| *closed) => return,
                received = transport.recv() => received,
            };

            match received {
                Ok(Some(bytes)) => {
                    // Dropping the last handle already tore the connection down.
                    let Some(owner) = owner.upgrade() else { return };
                    let peer = Peer { inner: inner.clone(), _owner: owner };
                    if let Err(e) = peer.handle_frame(&bytes) {
                        tracing::error!(
                            peer = %inner.name,
                            seq = ?liverpc::peek_seq(&bytes).ok(),
                            error = %e,
                            "undecodable frame"
                        );
                        break format!("Malformed frame: {}", e);
                    }
                }
                Ok(None) => break "Transport closed".to_string(),
                Err(e) => break format!("Transport error: {}", e),
            }
        };

        inner.teardown(reason);
    }

    fn handle_frame(&self, bytes: &[u8]) -> liverpc::Result<()> {
        match Frame::decode(bytes)? {
            Frame::Reply(outcome) => self.route_reply(outcome),
            Frame::Call(call) => self.serve(call),
        }
        Ok(())
    }

    fn route_reply(&self, outcome: CallOutcome) {
        let inner = &self.inner;
        let CallOutcome { seq, result } = outcome;
        inner.counters.replies_received.fetch_add(1, Ordering::Relaxed);

        if let Some((_, tx)) = inner.pending.remove(&seq) {
            // The caller may have dropped the future in the meantime.
            let _ = tx.send(result.map_err(CallError::Remote));
        } else if inner.abandoned().forget(seq) {
            tracing::debug!(peer = %inner.name, seq, "discarding late reply");
        } else {
            tracing::warn!(peer = %inner.name, seq, "reply for unknown call");
            inner.counters.unexpected_replies.fetch_add(1, Ordering::Relaxed);
            let _ = inner.events.send(PeerEvent::UnexpectedReply { seq });
        }
    }

    fn serve(&self, call: CallRequest) {
        let peer = self.clone();
        let span = tracing::debug_span!(
            "serve",
            peer = %self.inner.name,
            seq = call.seq,
            target = %call.target,
            method = %call.method
        );

        let task = async move {
            let CallRequest { seq, target, method, args } = call;
            let result = peer.inner.registry.dispatch(&peer, target, &method, args).await;
            peer.inner.counters.calls_served.fetch_add(1, Ordering::Relaxed);
            if let Err(info) = &result {
                tracing::debug!(peer = %peer.inner.name, seq, message = %info.message, "call failed");
            }

            if let Err(e) = peer.enqueue(Frame::Reply(CallOutcome { seq, result })) {
                // Only a non-finite float in the result can get here.
                let info = ErrorInfo::domain(format!("Result could not be encoded: {}", e));
                if let Err(e) = peer.enqueue(Frame::Reply(CallOutcome::err(seq, info))) {
                    tracing::error!(peer = %peer.inner.name, seq, error = %e, "failed to encode reply");
                }
            }
        };
        tokio::spawn(task.instrument(span));
    }
}

/// The pending result of `Peer::call`.
///
/// Dropping an unsettled `CallFuture` cancels it.
pub struct CallFuture {
    seq: u64,
    rx: oneshot::Receiver<Reply>,
    deadline: Option<Pin<Box<Sleep>>>,
    peer: Weak<Inner>,
    settled: bool,
}

impl CallFuture {
    /// The sequence number this call went out with.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Drops interest in the reply. Nothing is sent to the other side, so the remote
    /// handler may still run to completion. Awaiting the future afterwards yields
    /// `CallError::Cancelled`.
    pub fn cancel(&mut self) {
        if !self.settled {
            self.abandon();
            self.settled = true;
        }
    }

    fn abandon(&self) {
        if let Some(inner) = self.peer.upgrade() {
            inner.abandon(self.seq);
        }
    }
}

impl Future for CallFuture {
    type Output = Result<Value, CallError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        // Cancelled, or polled again after completion.
        if this.settled {
            return Poll::Ready(Err(CallError::Cancelled));
        }

        if let Poll::Ready(reply) = Pin::new(&mut this.rx).poll(cx) {
            this.settled = true;
            return Poll::Ready(
                reply.unwrap_or_else(|_| Err(CallError::Disconnected("Peer dropped".into()))),
            );
        }

        if let Some(deadline) = this.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                this.abandon();
                this.settled = true;
                return Poll::Ready(Err(CallError::Timeout));
            }
        }

        Poll::Pending
    }
}

impl Drop for CallFuture {
    fn drop(&mut self) {
        if !self.settled {
            self.abandon();
        }
    }
}
