//! Protocol transports.
//!
//! A [`TransportHandler`] sends one request and yields the raw response. It
//! knows nothing about OTLP semantics; interpreting status codes is the job
//! of [`crate::client`].

pub mod grpc;
pub mod http;

use crate::core::{ExporterError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub use grpc::GrpcTransport;
pub use http::{HttpRequest, HttpResponse, HttpTransport};

/// Network call abstraction for one protocol family.
#[async_trait]
pub trait TransportHandler: Send + Sync {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// Performs the call.
    ///
    /// Fails with [`ExporterError::Cancelled`] when `cancel` or
    /// [`cancel_pending`](Self::cancel_pending) fires first, with
    /// [`ExporterError::Timeout`] when the per-call timeout elapses, and with
    /// [`ExporterError::Disposed`] after [`dispose`](Self::dispose).
    async fn send(&self, request: Self::Request, cancel: CancellationToken) -> Result<Self::Response>;

    /// Cancels every call currently in flight. Idempotent.
    fn cancel_pending(&self);

    /// Resolves `true` once no call is in flight, `false` if `timeout` elapses first.
    async fn wait_idle(&self, timeout: Duration) -> bool;

    /// Cancels pending calls and rejects all later ones.
    fn dispose(&self);
}

/// In-flight and cancellation bookkeeping shared by the transports.
///
/// Every call runs under a child of the current root token. Cancelling
/// pending calls swaps in a fresh root so later calls are unaffected;
/// disposing cancels the root for good.
#[derive(Debug)]
pub struct CallTracker {
    root: Mutex<CancellationToken>,
    in_flight: AtomicUsize,
    idle: Notify,
    disposed: AtomicBool,
    timeout: Duration,
}

impl CallTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            root: Mutex::new(CancellationToken::new()),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
            disposed: AtomicBool::new(false),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Drives `call` to completion unless it is cancelled or times out first.
    ///
    /// The future is dropped on cancellation, which aborts the underlying
    /// request.
    pub async fn run<T, F>(&self, cancel: &CancellationToken, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let token = {
            let root = self.root.lock();
            if self.is_disposed() {
                return Err(ExporterError::Disposed);
            }
            root.child_token()
        };
        let _guard = InFlightGuard::enter(self);

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(self.cancelled_error()),
            _ = cancel.cancelled() => Err(ExporterError::Cancelled),
            _ = tokio::time::sleep(self.timeout) => {
                token.cancel();
                Err(ExporterError::Timeout { timeout_ms: duration_ms(self.timeout) })
            }
            result = call => result,
        }
    }

    pub fn cancel_pending(&self) {
        let mut root = self.root.lock();
        if self.is_disposed() {
            return;
        }
        let previous = std::mem::replace(&mut *root, CancellationToken::new());
        previous.cancel();
    }

    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                // Register before checking so a concurrent drop to zero is not missed.
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }

    pub fn dispose(&self) {
        let root = self.root.lock();
        self.disposed.store(true, Ordering::Release);
        root.cancel();
    }

    fn cancelled_error(&self) -> ExporterError {
        if self.is_disposed() {
            ExporterError::Disposed
        } else {
            ExporterError::Cancelled
        }
    }
}

struct InFlightGuard<'a> {
    tracker: &'a CallTracker,
}

impl<'a> InFlightGuard<'a> {
    fn enter(tracker: &'a CallTracker) -> Self {
        tracker.in_flight.fetch_add(1, Ordering::AcqRel);
        Self { tracker }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.tracker.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_completed_call_returns_result() {
        let tracker = CallTracker::new(Duration::from_secs(1));
        let result = tracker.run(&CancellationToken::new(), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_timeout_becomes_error() {
        let tracker = CallTracker::new(Duration::from_millis(20));
        let result: Result<()> = tracker
            .run(&CancellationToken::new(), std::future::pending())
            .await;
        assert!(matches!(result, Err(ExporterError::Timeout { timeout_ms: 20 })));
    }

    #[tokio::test]
    async fn test_caller_token_cancels() {
        let tracker = CallTracker::new(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = tracker.run(&cancel, std::future::pending()).await;
        assert!(matches!(result, Err(ExporterError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_pending_aborts_in_flight_only() {
        let tracker = Arc::new(CallTracker::new(Duration::from_secs(5)));

        let pending = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tracker
                    .run::<(), _>(&CancellationToken::new(), std::future::pending())
                    .await
            })
        };
        while tracker.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        tracker.cancel_pending();
        let result = pending.await.unwrap();
        assert!(matches!(result, Err(ExporterError::Cancelled)));
        assert!(tracker.wait_idle(Duration::from_millis(100)).await);

        // A fresh call after cancellation still goes through.
        let after = tracker.run(&CancellationToken::new(), async { Ok(1) }).await;
        assert!(after.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_pending_with_nothing_in_flight() {
        let tracker = CallTracker::new(Duration::from_secs(1));
        tracker.cancel_pending();
        tracker.cancel_pending();
        assert!(tracker.wait_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_wait_idle_times_out_while_busy() {
        let tracker = Arc::new(CallTracker::new(Duration::from_secs(5)));
        let busy = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tracker
                    .run::<(), _>(&CancellationToken::new(), std::future::pending())
                    .await
            })
        };
        while tracker.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(!tracker.wait_idle(Duration::from_millis(20)).await);
        tracker.cancel_pending();
        assert!(tracker.wait_idle(Duration::from_secs(1)).await);
        busy.await.unwrap().unwrap_err();
    }

    #[tokio::test]
    async fn test_dispose_rejects_new_calls() {
        let tracker = CallTracker::new(Duration::from_secs(1));
        tracker.dispose();
        let result = tracker.run(&CancellationToken::new(), async { Ok(()) }).await;
        assert!(matches!(result, Err(ExporterError::Disposed)));
        // No-op once disposed.
        tracker.cancel_pending();
        assert!(tracker.is_disposed());
    }
}
