//! Lazy subscriptions from nodes to external change sources
//!
//! Nodes are often built speculatively (a search walking the tree, a
//! reconciliation pass), so a subscribeable node never binds to its source
//! at construction. The binding is created on first real use and torn down
//! on dispose or when a configuration change invalidates it.

use crate::error::Result;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A live binding; releasing it (explicitly or by drop) runs its release hook once
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Subscription released by running `release`
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Subscription backed by a forwarding task; releasing aborts the task
    pub fn from_task(task: JoinHandle<()>) -> Self {
        let abort = task.abort_handle();
        Self::new(move || abort.abort())
    }

    /// Subscription with nothing to release
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Release now
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_release();
    }
}

enum Slot {
    Idle,
    Active(Subscription),
    Disposed,
}

/// Owned slot for a node's subscription
///
/// `Idle -> Active -> Idle (reset) -> Active -> ... -> Disposed`
pub struct SubscriptionHandle {
    slot: Mutex<Slot>,
}

impl SubscriptionHandle {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Idle),
        }
    }

    /// Subscribe through `subscribe` unless already active or disposed
    ///
    /// Returns true when a new subscription was created.
    pub fn ensure<F>(&self, subscribe: F) -> Result<bool>
    where
        F: FnOnce() -> Result<Subscription>,
    {
        let mut slot = self.slot.lock();
        match *slot {
            Slot::Active(_) | Slot::Disposed => Ok(false),
            Slot::Idle => {
                *slot = Slot::Active(subscribe()?);
                Ok(true)
            }
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Active(_))
    }

    pub fn is_disposed(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Disposed)
    }

    /// Release the current subscription; the next `ensure` re-subscribes
    pub fn reset(&self) -> bool {
        let previous = {
            let mut slot = self.slot.lock();
            match *slot {
                Slot::Active(_) => std::mem::replace(&mut *slot, Slot::Idle),
                _ => return false,
            }
        };
        // Released outside the lock
        drop(previous);
        true
    }

    /// Release the subscription for good; later `ensure` calls are no-ops
    pub fn dispose(&self) -> bool {
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Disposed);
        match previous {
            Slot::Disposed => false,
            other => {
                drop(other);
                true
            }
        }
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Nodes that bind to an external change source
pub trait Subscribeable: Send + Sync {
    /// The node's subscription slot
    fn subscription(&self) -> &SubscriptionHandle;

    /// Create the live binding
    fn subscribe(&self) -> Result<Subscription>;

    /// Subscribe if not already subscribed
    ///
    /// Failures are logged and stay scoped to this node.
    fn ensure_subscribed(&self) -> bool {
        match self.subscription().ensure(|| self.subscribe()) {
            Ok(created) => created,
            Err(e) => {
                warn!("Subscription failed: {}", e);
                false
            }
        }
    }

    /// Tear the binding down; the next access re-subscribes
    fn unsubscribe(&self) -> bool {
        let released = self.subscription().reset();
        if released {
            debug!("Subscription released");
        }
        released
    }
}
