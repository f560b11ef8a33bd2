//! Execution signal: two monotone, one-shot latches (`cancelled`,
//! `fast_forward`) with best-effort subscribers.
//!
//! Modeling this as write-once flags (rather than a resettable boolean)
//! sidesteps the ambiguity of what "un-cancelling" or "un-fast-forwarding"
//! mid-run would even mean — see §9's "Signal as monotone latch".

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::logging::log_subscriber_panic;

/// An event emitted when a latch is set.
#[derive(Debug, Clone)]
pub enum SignalEvent {
    Cancelled(Option<String>),
    FastForward,
}

type Subscriber = Box<dyn Fn(SignalEvent) + Send + Sync>;

struct Inner {
    cancelled: AtomicBool,
    fast_forward: AtomicBool,
    reason: Mutex<Option<String>>,
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
    next_subscriber_id: AtomicU64,
    cancelled_tx: watch::Sender<bool>,
    cancelled_rx: watch::Receiver<bool>,
    fast_forward_tx: watch::Sender<bool>,
    fast_forward_rx: watch::Receiver<bool>,
}

/// Broadcast object carrying the cancellation and fast-forward latches for
/// one run. Cheaply `Clone`able — all clones share the same underlying state.
#[derive(Clone)]
pub struct ExecutionSignal {
    inner: Arc<Inner>,
}

/// Token returned by `subscribe`, used to `unsubscribe` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken(u64);

impl ExecutionSignal {
    pub fn new() -> Self {
        let (cancelled_tx, cancelled_rx) = watch::channel(false);
        let (fast_forward_tx, fast_forward_rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                fast_forward: AtomicBool::new(false),
                reason: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
                next_subscriber_id: AtomicU64::new(0),
                cancelled_tx,
                cancelled_rx,
                fast_forward_tx,
                fast_forward_rx,
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_fast_forward(&self) -> bool {
        self.inner.fast_forward.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().unwrap().clone()
    }

    /// Latches cancellation. Idempotent: a second call is a no-op.
    pub fn cancel(&self, reason: Option<String>) {
        let already = self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err();
        if already {
            return;
        }
        *self.inner.reason.lock().unwrap() = reason.clone();
        let _ = self.inner.cancelled_tx.send(true);
        self.emit(SignalEvent::Cancelled(reason));
    }

    /// Latches the global fast-forward mode. Idempotent.
    pub fn set_fast_forward(&self) {
        let already = self
            .inner
            .fast_forward
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err();
        if already {
            return;
        }
        let _ = self.inner.fast_forward_tx.send(true);
        self.emit(SignalEvent::FastForward);
    }

    /// Resolves once cancellation has latched (immediately, if already so).
    pub async fn cancelled(&self) {
        let mut rx = self.inner.cancelled_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    /// Resolves once fast-forward has latched (immediately, if already so).
    pub async fn fast_forwarded(&self) {
        let mut rx = self.inner.fast_forward_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    /// Registers a best-effort subscriber. Subscribers that panic are caught
    /// and logged; they never abort signal emission.
    pub fn subscribe(&self, f: impl Fn(SignalEvent) + Send + Sync + 'static) -> SubscriptionToken {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .push((id, Box::new(f)));
        SubscriptionToken(id)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .retain(|(id, _)| *id != token.0);
    }

    fn emit(&self, event: SignalEvent) {
        let subscribers = self.inner.subscribers.lock().unwrap();
        for (_, sub) in subscribers.iter() {
            let event = event.clone();
            let kind = event_kind(&event);
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| sub(event)));
            if outcome.is_err() {
                log_subscriber_panic(match kind {
                    EventKind::Cancelled => "cancel",
                    EventKind::FastForward => "fast_forward",
                });
            }
        }
    }
}

enum EventKind {
    Cancelled,
    FastForward,
}

fn event_kind(event: &SignalEvent) -> EventKind {
    match event {
        SignalEvent::Cancelled(_) => EventKind::Cancelled,
        SignalEvent::FastForward => EventKind::FastForward,
    }
}

impl Default for ExecutionSignal {
    fn default() -> Self {
        Self::new()
    }
}
