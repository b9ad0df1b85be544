//! Cancellation module
//!
//! A [`CancellationToken`] is shared by every upload of one publish session.
//! Operations register abort callbacks on it and receive a
//! [`CancelRegistration`] handle; dropping the handle removes the callback.
//!
//! # Example
//!
//! ```
//! use mizuchi_publisher::cancel::CancellationToken;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let token = CancellationToken::new();
//! let calls = Arc::new(AtomicUsize::new(0));
//!
//! let counter = calls.clone();
//! let _registration = token.on_cancel(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! token.cancel();
//! token.cancel();
//! assert!(token.is_cancelled());
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//! ```

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Registry {
    cancelled: bool,
    next_id: u64,
    callbacks: VecDeque<(u64, Callback)>,
}

struct Inner {
    cancelled: AtomicBool,
    registry: Mutex<Registry>,
}

/// Shared cancellation flag with an ordered callback registry
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a new, not yet cancelled token
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                registry: Mutex::new(Registry {
                    cancelled: false,
                    next_id: 0,
                    callbacks: VecDeque::new(),
                }),
            }),
        }
    }

    /// Whether `cancel` has been called on this token or any clone of it
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Register a callback to run once when the token is cancelled
    ///
    /// If the token is already cancelled, the callback runs immediately on the
    /// calling thread and the returned registration is inert.
    pub fn on_cancel<F>(&self, callback: F) -> CancelRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        let mut registry = self.inner.registry.lock();
        if registry.cancelled {
            drop(registry);
            callback();
            return CancelRegistration {
                inner: self.inner.clone(),
                id: None,
            };
        }

        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.push_back((id, Box::new(callback)));

        CancelRegistration {
            inner: self.inner.clone(),
            id: Some(id),
        }
    }

    /// Cancel the token
    ///
    /// Runs every registered callback exactly once, in registration order.
    /// Later calls have no effect.
    pub fn cancel(&self) {
        {
            let mut registry = self.inner.registry.lock();
            if registry.cancelled {
                return;
            }
            registry.cancelled = true;
            self.inner.cancelled.store(true, Ordering::Release);
        }

        tracing::debug!("Cancellation requested");

        // The lock is released around each callback so callbacks may
        // register, unregister or cancel without deadlocking.
        loop {
            let next = self.inner.registry.lock().callbacks.pop_front();
            match next {
                Some((_, callback)) => callback(),
                None => break,
            }
        }
    }

    /// Number of callbacks still waiting for cancellation
    pub fn pending_callbacks(&self) -> usize {
        self.inner.registry.lock().callbacks.len()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("pending_callbacks", &self.pending_callbacks())
            .finish()
    }
}

/// Handle to a callback registered with [`CancellationToken::on_cancel`]
///
/// Dropping the handle deregisters the callback if it has not run yet.
#[must_use = "dropping the registration removes the callback immediately"]
pub struct CancelRegistration {
    inner: Arc<Inner>,
    id: Option<u64>,
}

impl CancelRegistration {
    /// Remove the callback
    ///
    /// Returns `true` if the callback was still pending, `false` if it already
    /// ran (or the token was cancelled before registration).
    pub fn unregister(mut self) -> bool {
        self.remove()
    }

    /// Whether the callback is still waiting for cancellation
    pub fn is_pending(&self) -> bool {
        match self.id {
            Some(id) => self
                .inner
                .registry
                .lock()
                .callbacks
                .iter()
                .any(|(entry, _)| *entry == id),
            None => false,
        }
    }

    fn remove(&mut self) -> bool {
        let Some(id) = self.id.take() else {
            return false;
        };

        let removed = {
            let mut registry = self.inner.registry.lock();
            registry
                .callbacks
                .iter()
                .position(|(entry, _)| *entry == id)
                .and_then(|index| registry.callbacks.remove(index))
        };

        // The callback is dropped outside the lock; its captures may own
        // other registrations.
        removed.is_some()
    }
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl fmt::Debug for CancelRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelRegistration")
            .field("id", &self.id)
            .finish()
    }
}

/// Cancel `token` on the first interrupt and call `force_exit` on the second
///
/// Returns when the interrupt stream ends.
pub async fn cancel_on_interrupt<S, F>(mut interrupts: S, token: CancellationToken, force_exit: F)
where
    S: Stream<Item = ()> + Unpin,
    F: FnOnce(),
{
    if interrupts.next().await.is_none() {
        return;
    }
    tracing::warn!("Interrupted, cancelling uploads (interrupt again to exit)");
    token.cancel();

    if interrupts.next().await.is_some() {
        tracing::error!("Interrupted again, exiting");
        force_exit();
    }
}
