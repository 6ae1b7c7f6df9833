//! # Async Aggregator
//!
//! Fan-in of `k` asynchronous outcomes into one completion signal.
//!
//! ## Invariants
//! - **Immediate Zero**: With `k == 0` the signal has already fired success.
//! - **Single Fire**: The signal settles at most once. Success fires when the `k`-th
//!   success arrives; failure fires on the first failure. Every later outcome is ignored.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::task::Context;
use std::task::Poll;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::oneshot;

/// Why an aggregate signal fired failure.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateFailure<E> {
    /// One of the aggregated operations failed.
    Failed(E),
    /// Every `Aggregator` handle was dropped with outcomes still missing.
    Abandoned { remaining: usize },
}

impl<E> AggregateFailure<E> {
    /// The underlying failure, if one of the operations produced it.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Abandoned { .. } => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for AggregateFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "Aggregated operation failed: {}", e),
            Self::Abandoned { remaining } => {
                write!(f, "Aggregator dropped with {} outcomes outstanding", remaining)
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AggregateFailure<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Abandoned { .. } => None,
        }
    }
}

type Signal<E> = Result<(), AggregateFailure<E>>;

struct State<E> {
    remaining: usize,
    /// Taken when the signal fires.
    tx: Option<oneshot::Sender<Signal<E>>>,
}

impl<E> State<E> {
    fn fire(&mut self, signal: Signal<E>) -> bool {
        match self.tx.take() {
            Some(tx) => {
                // The `Settled` side may be gone; firing still counts.
                let _ = tx.send(signal);
                true
            }
            None => false,
        }
    }
}

impl<E> Drop for State<E> {
    fn drop(&mut self) {
        let remaining = self.remaining;
        self.fire(Err(AggregateFailure::Abandoned { remaining }));
    }
}

/// Counts outcomes toward a `Settled` signal. Cloning yields another handle to the
/// same counter.
pub struct Aggregator<E> {
    state: Arc<Mutex<State<E>>>,
}

impl<E> Clone for Aggregator<E> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone() }
    }
}

impl<E> Aggregator<E> {
    /// Creates an aggregator expecting `k` successes, plus the signal it drives.
    pub fn new(k: usize) -> (Self, Settled<E>) {
        let (tx, rx) = oneshot::channel();
        let mut state = State { remaining: k, tx: Some(tx) };
        if k == 0 {
            state.fire(Ok(()));
        }

        let aggregator = Self { state: Arc::new(Mutex::new(state)) };
        (aggregator, Settled { rx })
    }

    fn lock(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one success. Returns true if this fired the signal.
    pub fn succeed(&self) -> bool {
        let mut state = self.lock();
        if state.tx.is_none() {
            return false;
        }
        state.remaining = state.remaining.saturating_sub(1);
        tracing::trace!(remaining = state.remaining, "aggregated success");
        if state.remaining == 0 {
            state.fire(Ok(()))
        } else {
            false
        }
    }

    /// Records a failure. Returns true if this fired the signal.
    pub fn fail(&self, error: E) -> bool {
        self.lock().fire(Err(AggregateFailure::Failed(error)))
    }

    /// Successes still needed.
    pub fn remaining(&self) -> usize {
        self.lock().remaining
    }

    pub fn is_settled(&self) -> bool {
        self.lock().tx.is_none()
    }
}

/// Resolves once the aggregate signal fires.
pub struct Settled<E> {
    rx: oneshot::Receiver<Signal<E>>,
}

impl<E> Future for Settled<E> {
    type Output = Signal<E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // The state always fires before its sender drops.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|signal| signal.unwrap_or(Err(AggregateFailure::Abandoned { remaining: 0 })))
    }
}

/// Drives `futures` concurrently and collects their values in input order.
///
/// Fails fast: the first error settles the result and the other futures are dropped.
pub async fn join_all<I, F, T, E>(futures: I) -> Result<Vec<T>, AggregateFailure<E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let mut running: FuturesUnordered<_> = futures
        .into_iter()
        .enumerate()
        .map(|(index, future)| async move { (index, future.await) })
        .collect();

    let (aggregator, settled) = Aggregator::new(running.len());
    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(running.len()).collect();

    while let Some((index, outcome)) = running.next().await {
        match outcome {
            Ok(value) => {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = Some(value);
                }
                aggregator.succeed();
            }
            Err(error) => {
                aggregator.fail(error);
                break;
            }
        }
    }

    drop(running);
    settled.await?;
    Ok(slots.into_iter().flatten().collect())
}
