//! Thread group registry.
//!
//! The registry provides:
//! - Named groups of named worker threads
//! - An optional rendezvous barrier per group
//! - Cooperative interruption and bounded or unbounded joins
//!
//! All group state sits behind one reader/writer lock. Blocking calls copy
//! out the barrier or thread handles they need and release the lock before
//! blocking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::barrier::RendezvousBarrier;
use crate::error::{Result, ThreadError};
use crate::interrupt;
use crate::worker::{WorkerExit, WorkerThread};

/// What to do with a thread that is removed from its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposal {
    /// Post a cooperative interruption request.
    #[default]
    Interrupt,
    /// Abandon join responsibility and let the thread run to completion.
    Detach,
}

#[derive(Default)]
struct ThreadGroup {
    threads: HashMap<String, Arc<WorkerThread>>,
    barrier: Option<Arc<RendezvousBarrier>>,
}

/// Registry of named thread groups.
pub struct ThreadGroupRegistry {
    groups: RwLock<HashMap<String, ThreadGroup>>,
}

impl ThreadGroupRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Create an empty group.
    pub fn create_group(&self, name: &str) -> Result<()> {
        let mut groups = self.groups.write();
        if groups.contains_key(name) {
            return Err(ThreadError::GroupExists(name.to_string()));
        }
        groups.insert(name.to_string(), ThreadGroup::default());
        tracing::info!(group = name, "Thread group created");
        Ok(())
    }

    /// Destroy a group.
    ///
    /// A group that still owns threads is only destroyed when `force` is set;
    /// its threads are then interrupted or detached according to `disposal`.
    /// This never blocks for the threads to exit.
    pub fn destroy_group(&self, name: &str, force: bool, disposal: Disposal) -> Result<()> {
        let mut groups = self.groups.write();
        let group = groups
            .get(name)
            .ok_or_else(|| ThreadError::GroupNotFound(name.to_string()))?;

        if !group.threads.is_empty() && !force {
            return Err(ThreadError::GroupNotEmpty {
                group: name.to_string(),
                threads: group.threads.len(),
            });
        }

        if let Some(group) = groups.remove(name) {
            for worker in group.threads.values() {
                dispose(worker, disposal);
            }
            tracing::info!(
                group = name,
                threads = group.threads.len(),
                ?disposal,
                "Thread group destroyed"
            );
        }
        Ok(())
    }

    /// Names of all groups, in no particular order.
    pub fn group_ids(&self) -> Vec<String> {
        self.groups.read().keys().cloned().collect()
    }

    /// Install, replace or clear (`parties == 0`) the group's barrier.
    ///
    /// Call this before any thread waits on the group.
    pub fn set_barrier_size(&self, name: &str, parties: usize) -> Result<()> {
        let mut groups = self.groups.write();
        let group = groups
            .get_mut(name)
            .ok_or_else(|| ThreadError::GroupNotFound(name.to_string()))?;

        group.barrier = (parties > 0).then(|| Arc::new(RendezvousBarrier::new(parties)));
        tracing::debug!(group = name, parties, "Barrier size set");
        Ok(())
    }

    /// Current barrier size, 0 when no barrier is installed.
    pub fn barrier_size(&self, name: &str) -> Result<usize> {
        let groups = self.groups.read();
        let group = groups
            .get(name)
            .ok_or_else(|| ThreadError::GroupNotFound(name.to_string()))?;
        Ok(group.barrier.as_ref().map(|b| b.parties()).unwrap_or(0))
    }

    /// Spawn a named thread in a group running `f`.
    pub fn create_thread<F, R>(&self, group_name: &str, thread_name: &str, f: F) -> Result<()>
    where
        F: FnOnce() -> R + Send + 'static,
        R: WorkerExit,
    {
        let mut groups = self.groups.write();
        let group = groups
            .get_mut(group_name)
            .ok_or_else(|| ThreadError::GroupNotFound(group_name.to_string()))?;

        if group.threads.contains_key(thread_name) {
            return Err(ThreadError::ThreadExists {
                group: group_name.to_string(),
                thread: thread_name.to_string(),
            });
        }

        let worker = WorkerThread::spawn(group_name, thread_name, f)?;
        group.threads.insert(thread_name.to_string(), worker);
        tracing::debug!(group = group_name, thread = thread_name, "Thread created");
        Ok(())
    }

    /// Remove a thread from its group, interrupting or detaching it.
    ///
    /// Does not wait for the thread to exit.
    pub fn destroy_thread(&self, group_name: &str, thread_name: &str, disposal: Disposal) -> Result<()> {
        let mut groups = self.groups.write();
        let group = groups
            .get_mut(group_name)
            .ok_or_else(|| ThreadError::GroupNotFound(group_name.to_string()))?;

        let worker = group
            .threads
            .remove(thread_name)
            .ok_or_else(|| ThreadError::thread_not_found(group_name, thread_name))?;

        dispose(&worker, disposal);
        tracing::debug!(group = group_name, thread = thread_name, ?disposal, "Thread destroyed");
        Ok(())
    }

    /// Names of the threads in a group, in no particular order.
    pub fn thread_ids(&self, group_name: &str) -> Result<Vec<String>> {
        let groups = self.groups.read();
        let group = groups
            .get(group_name)
            .ok_or_else(|| ThreadError::GroupNotFound(group_name.to_string()))?;
        Ok(group.threads.keys().cloned().collect())
    }

    /// Rendezvous on the group's barrier. Cancellation point.
    ///
    /// Returns immediately when no barrier is installed.
    pub fn wait(&self, group_name: &str) -> Result<()> {
        let barrier = {
            let groups = self.groups.read();
            let group = groups
                .get(group_name)
                .ok_or_else(|| ThreadError::GroupNotFound(group_name.to_string()))?;
            group.barrier.clone()
        };

        match barrier {
            Some(barrier) => {
                tracing::trace!(group = group_name, "Waiting on barrier");
                barrier.wait(&interrupt::current())
            }
            None => Ok(()),
        }
    }

    /// Block until the thread finishes. Cancellation point.
    pub fn join(&self, group_name: &str, thread_name: &str) -> Result<()> {
        let worker = self.worker(group_name, thread_name)?;
        worker.join(None).map(|_| ())
    }

    /// Block until every thread in the group finishes. Cancellation point.
    pub fn join_all(&self, group_name: &str) -> Result<()> {
        for worker in self.workers(group_name)? {
            worker.join(None)?;
        }
        Ok(())
    }

    /// Join with a timeout. Returns whether the thread finished in time.
    pub fn try_join(&self, group_name: &str, thread_name: &str, timeout: Duration) -> Result<bool> {
        let worker = self.worker(group_name, thread_name)?;
        worker.join(deadline_after(timeout))
    }

    /// Join every thread in the group within one shared timeout.
    ///
    /// Returns whether all of them finished before the deadline.
    pub fn try_join_all(&self, group_name: &str, timeout: Duration) -> Result<bool> {
        let deadline = deadline_after(timeout);
        let mut all_joined = true;
        for worker in self.workers(group_name)? {
            all_joined &= worker.join(deadline)?;
        }
        Ok(all_joined)
    }

    /// Post an interruption request to one thread.
    pub fn interrupt(&self, group_name: &str, thread_name: &str) -> Result<()> {
        self.worker(group_name, thread_name)?.interrupt();
        tracing::debug!(group = group_name, thread = thread_name, "Interruption requested");
        Ok(())
    }

    /// Post an interruption request to every thread in the group.
    pub fn interrupt_all(&self, group_name: &str) -> Result<()> {
        let workers = self.workers(group_name)?;
        for worker in &workers {
            worker.interrupt();
        }
        tracing::debug!(group = group_name, threads = workers.len(), "Interruption requested");
        Ok(())
    }

    /// Whether every thread in the group has finished running.
    pub fn is_finished(&self, group_name: &str) -> Result<bool> {
        Ok(self.workers(group_name)?.iter().all(|w| w.is_finished()))
    }

    fn worker(&self, group_name: &str, thread_name: &str) -> Result<Arc<WorkerThread>> {
        let groups = self.groups.read();
        let group = groups
            .get(group_name)
            .ok_or_else(|| ThreadError::GroupNotFound(group_name.to_string()))?;
        group
            .threads
            .get(thread_name)
            .cloned()
            .ok_or_else(|| ThreadError::thread_not_found(group_name, thread_name))
    }

    fn workers(&self, group_name: &str) -> Result<Vec<Arc<WorkerThread>>> {
        let groups = self.groups.read();
        let group = groups
            .get(group_name)
            .ok_or_else(|| ThreadError::GroupNotFound(group_name.to_string()))?;
        Ok(group.threads.values().cloned().collect())
    }
}

impl Default for ThreadGroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadGroupRegistry {
    fn drop(&mut self) {
        let groups = std::mem::take(self.groups.get_mut());
        for (name, group) in groups {
            if !group.threads.is_empty() {
                tracing::debug!(
                    group = %name,
                    threads = group.threads.len(),
                    "Interrupting remaining threads on teardown"
                );
            }
            for worker in group.threads.values() {
                worker.interrupt();
                worker.detach();
            }
        }
    }
}

/// `None` (no deadline) when `timeout` is too large to represent.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn dispose(worker: &WorkerThread, disposal: Disposal) {
    match disposal {
        Disposal::Interrupt => worker.interrupt(),
        Disposal::Detach => worker.detach(),
    }
}
