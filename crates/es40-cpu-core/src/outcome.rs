//! Side-effect summary returned by execute units and the pipeline.
//!
//! A plain data record: the orchestrator interprets the flags, so the
//! units never need a pointer back into the pipeline or PAL dispatcher.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Effects: u32 {
        /// Full memory barrier: rendezvous with all peers.
        const MEMORY_BARRIER = 1 << 0;
        /// Write barrier: local drain only.
        const WRITE_BARRIER = 1 << 1;
        const DRAIN_WRITE_BUFFERS = 1 << 2;
        const FLUSH_PIPELINE = 1 << 3;
        const ENTER_PAL = 1 << 4;
        const MISPREDICT = 1 << 5;
        const FAULT_DISPATCHED = 1 << 6;
        const HALT = 1 << 7;
        /// Re-execute the same PC (barrier retry after contention).
        const RETRY = 1 << 8;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub effects: Effects,
    /// New PC when the step redirected control flow.
    pub redirect: Option<u64>,
}

impl Outcome {
    pub fn none() -> Outcome {
        Outcome {
            effects: Effects::empty(),
            redirect: None,
        }
    }

    pub fn with(mut self, e: Effects) -> Outcome {
        self.effects |= e;
        self
    }

    pub fn barrier(self) -> Outcome {
        self.with(Effects::MEMORY_BARRIER | Effects::DRAIN_WRITE_BUFFERS)
    }

    pub fn write_barrier(self) -> Outcome {
        self.with(Effects::WRITE_BARRIER | Effects::DRAIN_WRITE_BUFFERS)
    }

    pub fn flush(self) -> Outcome {
        self.with(Effects::FLUSH_PIPELINE)
    }

    pub fn enter_pal(self) -> Outcome {
        self.with(Effects::ENTER_PAL | Effects::FLUSH_PIPELINE)
    }

    pub fn mispredict(self) -> Outcome {
        self.with(Effects::MISPREDICT | Effects::FLUSH_PIPELINE)
    }

    pub fn fault_dispatched(self) -> Outcome {
        self.with(Effects::FAULT_DISPATCHED | Effects::FLUSH_PIPELINE)
    }

    pub fn halt(self) -> Outcome {
        self.with(Effects::HALT)
    }

    pub fn redirect(mut self, pc: u64) -> Outcome {
        self.redirect = Some(pc);
        self
    }
}
