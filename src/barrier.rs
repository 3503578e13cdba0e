//! Reusable N-party synchronization barrier for the receive thread pool.
//!
//! The reference implementation hand-rolls a generation-counted barrier
//! because housekeeping needs two rendezvous points per pass.
//! `std::sync::Barrier` already generation-counts and tolerates being
//! waited on repeatedly, so this is a thin wrapper rather than a
//! reimplementation — it exists as its own type because the receive
//! scheduler wants to skip waiting entirely when there is only one
//! receive thread.

use std::sync::Barrier as StdBarrier;

pub struct ReceiveBarrier {
    inner: StdBarrier,
    parties: usize,
}

impl ReceiveBarrier {
    pub fn new(parties: usize) -> Self {
        Self {
            inner: StdBarrier::new(parties.max(1)),
            parties,
        }
    }

    /// Blocks until all parties have called `wait`. A no-op when there is
    /// only one party, matching the reference's `if (num_threads > 1)` guard.
    pub fn wait(&self) {
        if self.parties > 1 {
            self.inner.wait();
        }
    }
}
