//! Cancellation primitives.
//!
//! Two layers are involved in cancelling a dispatch:
//! - [`CancelToken`] is caller-facing. It fires at most once and carries a
//!   [`Cancel`] reason.
//! - [`AbortSignal`] is the per-dispatch native signal handed to the
//!   transport. The dispatcher owns the matching [`AbortController`] and
//!   aborts it from a token listener when the token fires.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tokio_util::sync::CancellationToken;

/// Cancellation reason
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cancel {
    message: Option<String>,
}

impl Cancel {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Cancel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message.as_deref().unwrap_or("canceled"))
    }
}

type Listener = Box<dyn FnOnce(&Cancel) + Send>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

struct TokenState {
    reason: OnceLock<Cancel>,
    fired: CancellationToken,
    listeners: Mutex<Listeners>,
}

/// Single-fire cancellation handle carried by a request descriptor
///
/// Cloning is cheap; all clones observe the same reason.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<TokenState>,
}

impl CancelToken {
    /// Create a token together with the source that fires it
    #[must_use]
    pub fn source() -> CancelTokenSource {
        CancelTokenSource {
            token: Self {
                state: Arc::new(TokenState {
                    reason: OnceLock::new(),
                    fired: CancellationToken::new(),
                    listeners: Mutex::default(),
                }),
            },
        }
    }

    /// Reason, once the token has fired
    #[must_use]
    pub fn reason(&self) -> Option<&Cancel> {
        self.state.reason.get()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.reason.get().is_some()
    }

    /// Return the reason as an error if the token already fired
    ///
    /// # Errors
    /// Returns the stored [`Cancel`] when cancellation was requested.
    pub fn throw_if_requested(&self) -> Result<(), Cancel> {
        match self.reason() {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    /// Resolve with the reason when the token fires
    ///
    /// Resolves immediately if the token has already fired.
    pub async fn cancelled(&self) -> Cancel {
        self.state.fired.cancelled().await;
        // The reason is stored before the token is triggered.
        self.state.reason.get().cloned().unwrap_or_default()
    }

    /// Run `listener` with the reason when the token fires
    ///
    /// The listener runs synchronously on the thread that fires the token, or
    /// immediately if the token has already fired. Dropping the returned
    /// [`Subscription`] unsubscribes it.
    pub fn subscribe(&self, listener: impl FnOnce(&Cancel) + Send + 'static) -> Subscription {
        let mut listeners = self.state.listeners.lock();
        if let Some(reason) = self.state.reason.get() {
            drop(listeners);
            listener(reason);
            return Subscription {
                state: Weak::new(),
                id: 0,
            };
        }
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.push((id, Box::new(listener)));
        Subscription {
            state: Arc::downgrade(&self.state),
            id,
        }
    }

    fn fire(&self, reason: Cancel) -> bool {
        if self.state.reason.set(reason).is_err() {
            return false;
        }
        // Listeners registered after this point see the stored reason.
        let entries = std::mem::take(&mut self.state.listeners.lock().entries);
        if let Some(reason) = self.state.reason.get() {
            for (_, listener) in entries {
                listener(reason);
            }
        }
        self.state.fired.cancel();
        true
    }
}

/// Registration returned by [`CancelToken::subscribe`]
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    state: Weak<TokenState>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.listeners.lock().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .finish()
    }
}

/// Owner side of a [`CancelToken`]
#[derive(Clone, Debug)]
pub struct CancelTokenSource {
    token: CancelToken,
}

impl CancelTokenSource {
    #[must_use]
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Fire the token with a reason
    ///
    /// Returns `false` if the token had already fired; the first reason wins.
    pub fn cancel(&self, message: impl Into<String>) -> bool {
        let fired = self.token.fire(Cancel::new(message));
        if fired {
            tracing::debug!("cancel token fired");
        }
        fired
    }
}

/// Native abort primitive, one per dispatch
#[derive(Clone, Debug, Default)]
pub struct AbortController {
    inner: CancellationToken,
}

impl AbortController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            inner: self.inner.clone(),
        }
    }

    pub fn abort(&self) {
        self.inner.cancel();
    }
}

/// Read side of an [`AbortController`], handed to the transport
#[derive(Clone, Debug)]
pub struct AbortSignal {
    inner: CancellationToken,
}

impl AbortSignal {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolve once the controller aborts
    pub async fn aborted(&self) {
        self.inner.cancelled().await;
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_reason_wins() {
        let source = CancelToken::source();
        let token = source.token();

        assert!(source.cancel("first"));
        assert!(!source.cancel("second"));
        assert_eq!(token.reason().and_then(Cancel::message), Some("first"));
    }

    #[test]
    fn test_throw_if_requested() {
        let source = CancelToken::source();
        let token = source.token();
        assert!(token.throw_if_requested().is_ok());

        source.cancel("stop");
        assert_eq!(token.throw_if_requested(), Err(Cancel::new("stop")));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_with_reason() {
        let source = CancelToken::source();
        let token = source.token();

        let waiter = tokio::spawn(async move { token.cancelled().await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        source.cancel("user cancelled");

        let reason = waiter.await.unwrap();
        assert_eq!(reason.to_string(), "user cancelled");
    }

    #[tokio::test]
    async fn test_cancelled_after_fire_is_immediate() {
        let source = CancelToken::source();
        source.cancel("early");
        let reason = tokio::time::timeout(Duration::from_millis(50), source.token().cancelled())
            .await
            .expect("already-fired token must resolve immediately");
        assert_eq!(reason.message(), Some("early"));
    }

    #[test]
    fn test_listener_runs_once_with_reason() {
        let source = CancelToken::source();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = source
            .token()
            .subscribe(move |reason| sink.lock().push(reason.to_string()));

        source.cancel("stop");
        source.cancel("again");

        assert_eq!(*seen.lock(), vec!["stop".to_owned()]);
    }

    #[test]
    fn test_subscribe_after_fire_runs_immediately() {
        let source = CancelToken::source();
        source.cancel("early");

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let _subscription = source
            .token()
            .subscribe(move |reason| *sink.lock() = reason.message().map(str::to_owned));

        assert_eq!(seen.lock().as_deref(), Some("early"));
    }

    #[test]
    fn test_dropped_subscription_is_not_called() {
        let source = CancelToken::source();
        let called = Arc::new(Mutex::new(false));
        let sink = Arc::clone(&called);
        drop(source.token().subscribe(move |_| *sink.lock() = true));

        source.cancel("stop");

        assert!(!*called.lock());
    }

    #[test]
    fn test_default_cancel_display() {
        assert_eq!(Cancel::default().to_string(), "canceled");
    }

    #[tokio::test]
    async fn test_abort_signal_follows_controller() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(!signal.is_aborted());

        controller.abort();
        signal.aborted().await;
        assert!(signal.is_aborted());
    }
}
