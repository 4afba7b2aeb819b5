//! Interruptible rendezvous barrier.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::Result;
use crate::interrupt::{ThreadControl, Wake};

struct BarrierState {
    arrived: usize,
    generation: u64,
}

/// Releases all waiters together once `parties` threads have arrived.
pub(crate) struct RendezvousBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    cond: Condvar,
}

impl RendezvousBarrier {
    pub(crate) fn new(parties: usize) -> Self {
        Self {
            parties,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn parties(&self) -> usize {
        self.parties
    }

    /// Block until all parties arrive.
    ///
    /// A waiter interrupted before release withdraws its arrival, so the
    /// barrier still needs `parties` arrivals for the current generation.
    pub(crate) fn wait(self: &Arc<Self>, control: &ThreadControl) -> Result<()> {
        let _blocked = control.block_on(self.clone());
        let mut state = self.state.lock();

        control.check()?;

        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cond.notify_all();
            tracing::trace!(parties = self.parties, "Barrier released");
            return Ok(());
        }

        let generation = state.generation;
        while state.generation == generation {
            self.cond.wait(&mut state);
            if state.generation != generation {
                break;
            }
            if let Err(e) = control.check() {
                state.arrived -= 1;
                return Err(e);
            }
        }

        Ok(())
    }
}

impl Wake for RendezvousBarrier {
    fn wake_all(&self) {
        let _state = self.state.lock();
        self.cond.notify_all();
    }
}
