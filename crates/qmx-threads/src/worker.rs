//! Worker threads owned by a group.

use std::fmt::Display;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, ThreadError};
use crate::interrupt::{self, ThreadControl, Wake};

/// Values a worker closure may return.
///
/// `()` is silent; an `Err` is logged when the worker exits.
pub trait WorkerExit {
    fn report(self, group: &str, thread: &str);
}

impl WorkerExit for () {
    fn report(self, _group: &str, _thread: &str) {}
}

impl<E: Display> WorkerExit for std::result::Result<(), E> {
    fn report(self, group: &str, thread: &str) {
        if let Err(e) = self {
            tracing::debug!(group, thread, error = %e, "Worker exited with error");
        }
    }
}

/// Completion flag a joiner can block on.
struct Completion {
    finished: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    fn new() -> Self {
        Self {
            finished: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn finish(&self) {
        *self.finished.lock() = true;
        self.cond.notify_all();
    }

    fn is_finished(&self) -> bool {
        *self.finished.lock()
    }

    /// Block until finished or `deadline` passes. Returns whether finished.
    fn wait(self: &Arc<Self>, control: &ThreadControl, deadline: Option<Instant>) -> Result<bool> {
        let _blocked = control.block_on(self.clone());
        let mut finished = self.finished.lock();

        loop {
            control.check()?;
            if *finished {
                return Ok(true);
            }
            match deadline {
                None => self.cond.wait(&mut finished),
                Some(deadline) => {
                    if self.cond.wait_until(&mut finished, deadline).timed_out() {
                        control.check()?;
                        return Ok(*finished);
                    }
                }
            }
        }
    }
}

impl Wake for Completion {
    fn wake_all(&self) {
        let _finished = self.finished.lock();
        self.cond.notify_all();
    }
}

/// A named OS thread with its interruption control and completion flag.
pub(crate) struct WorkerThread {
    group: String,
    name: String,
    control: Arc<ThreadControl>,
    done: Arc<Completion>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerThread {
    pub(crate) fn spawn<F, R>(group: &str, name: &str, f: F) -> Result<Arc<Self>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: WorkerExit,
    {
        let control = Arc::new(ThreadControl::new());
        let done = Arc::new(Completion::new());

        let handle = {
            let control = control.clone();
            let done = done.clone();
            let group_name = group.to_string();
            let thread_name = name.to_string();
            std::thread::Builder::new()
                .name(format!("{}/{}", group, name))
                .spawn(move || {
                    interrupt::set_current(control);
                    // Signal completion even if `f` panics.
                    let _finish = scopeguard::guard(done, |done| done.finish());
                    f().report(&group_name, &thread_name);
                })
                .map_err(|source| ThreadError::Spawn {
                    group: group.to_string(),
                    thread: name.to_string(),
                    source,
                })?
        };

        Ok(Arc::new(Self {
            group: group.to_string(),
            name: name.to_string(),
            control,
            done,
            handle: Mutex::new(Some(handle)),
        }))
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.done.is_finished()
    }

    pub(crate) fn interrupt(&self) {
        self.control.request();
    }

    /// Give up join responsibility; the thread keeps running.
    pub(crate) fn detach(&self) {
        self.handle.lock().take();
    }

    /// Wait for the thread to finish, bounded by `deadline` if given.
    ///
    /// A no-op for threads already joined or detached. Either way this is a
    /// cancellation point for the caller.
    pub(crate) fn join(&self, deadline: Option<Instant>) -> Result<bool> {
        let control = interrupt::current();

        let is_self = self
            .handle
            .lock()
            .as_ref()
            .map(|h| h.thread().id() == std::thread::current().id())
            .unwrap_or(false);
        if is_self {
            return Err(ThreadError::JoinSelf {
                group: self.group.clone(),
                thread: self.name.clone(),
            });
        }

        if self.handle.lock().is_none() {
            control.check()?;
            return Ok(true);
        }

        if !self.done.wait(&control, deadline)? {
            return Ok(false);
        }

        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::warn!(group = %self.group, thread = %self.name, "Worker panicked");
            }
        }
        Ok(true)
    }
}
