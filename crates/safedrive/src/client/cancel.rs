//! External cancellation for in-flight requests.
//!
//! A [`CancelToken`] is a cloneable signal shared between the code that owns
//! a request and the code that may want to abandon it. Child tokens are
//! cancelled together with their parent, which lets a poller cancel a single
//! tick without cancelling the whole loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(
            &mut *self
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// A cloneable cancellation signal.
///
/// Clones share the same state: cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Create a new, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that is cancelled whenever this one is.
    ///
    /// Cancelling the child does not affect the parent.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            let mut children = self
                .inner
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // The parent may have been cancelled between creation and registration.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Signal cancellation to every holder of this token and its children.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Check whether the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel() is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
