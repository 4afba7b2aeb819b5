//! Cooperative interruption.
//!
//! Every thread owns a [`ThreadControl`] holding its pending-request flag and
//! the depth of active [`DisableInterruption`] guards. Threads spawned by the
//! registry get a control the registry can reach; any other thread gets a
//! private one on first use, so the free functions here work everywhere.
//!
//! A thread blocked at a cancellation point records what it is blocked on,
//! so an interrupter can wake it instead of waiting for the block to end.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, ThreadError};

/// Something a thread can block on and be woken from.
pub(crate) trait Wake: Send + Sync {
    /// Wake every thread blocked on this object so it re-checks its state.
    fn wake_all(&self);
}

/// Per-thread interruption state.
pub(crate) struct ThreadControl {
    requested: AtomicBool,
    disabled: AtomicUsize,
    blocked_on: Mutex<Option<Arc<dyn Wake>>>,
}

impl ThreadControl {
    pub(crate) fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            disabled: AtomicUsize::new(0),
            blocked_on: Mutex::new(None),
        }
    }

    /// Post an interruption request and wake the thread if it is blocked.
    pub(crate) fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        let blocked = self.blocked_on.lock().clone();
        if let Some(target) = blocked {
            target.wake_all();
        }
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst) == 0
    }

    /// Deliver a pending request, consuming it.
    pub(crate) fn check(&self) -> Result<()> {
        if self.is_enabled() && self.requested.swap(false, Ordering::SeqCst) {
            return Err(ThreadError::Interrupted);
        }
        Ok(())
    }

    /// Record that the thread is about to block on `target`.
    ///
    /// The returned guard clears the record when dropped. It must be created
    /// before the target's internal lock is taken.
    pub(crate) fn block_on(&self, target: Arc<dyn Wake>) -> BlockedGuard<'_> {
        *self.blocked_on.lock() = Some(target);
        BlockedGuard { control: self }
    }
}

pub(crate) struct BlockedGuard<'a> {
    control: &'a ThreadControl,
}

impl Drop for BlockedGuard<'_> {
    fn drop(&mut self) {
        self.control.blocked_on.lock().take();
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<ThreadControl>>> = const { RefCell::new(None) };
}

/// Install the control for the calling thread. Called once at worker start.
pub(crate) fn set_current(control: Arc<ThreadControl>) {
    CURRENT.with(|current| *current.borrow_mut() = Some(control));
}

/// The calling thread's control, created on first use.
pub(crate) fn current() -> Arc<ThreadControl> {
    CURRENT.with(|current| {
        current
            .borrow_mut()
            .get_or_insert_with(|| Arc::new(ThreadControl::new()))
            .clone()
    })
}

/// Whether an interruption has been requested for the calling thread.
pub fn interruption_requested() -> bool {
    current().is_requested()
}

/// Whether the calling thread currently accepts interruption.
pub fn interruption_enabled() -> bool {
    current().is_enabled()
}

/// Explicit cancellation point.
///
/// Returns [`ThreadError::Interrupted`] if a request is pending and
/// interruption is enabled for the calling thread. The request is consumed.
pub fn interruption_point() -> Result<()> {
    current().check()
}

/// Suspends interruption delivery for the calling thread while alive.
///
/// Guards nest; delivery resumes when the outermost guard is dropped.
/// Requests posted meanwhile stay pending.
pub struct DisableInterruption {
    control: Arc<ThreadControl>,
    // Bound to the thread whose depth it incremented.
    _not_send: PhantomData<*const ()>,
}

impl DisableInterruption {
    pub fn new() -> Self {
        let control = current();
        control.disabled.fetch_add(1, Ordering::SeqCst);
        Self {
            control,
            _not_send: PhantomData,
        }
    }
}

impl Default for DisableInterruption {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DisableInterruption {
    fn drop(&mut self) {
        self.control.disabled.fetch_sub(1, Ordering::SeqCst);
    }
}
