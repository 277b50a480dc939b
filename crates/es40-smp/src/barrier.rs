//! Global memory-barrier rendezvous.
//!
//! One barrier in flight at a time. The initiating CPU broadcasts
//! `MEMORY_BARRIER_FULL` IPIs (the fabric is owned by the caller), each
//! recipient drains its write buffer and acknowledges, and the initiator
//! waits for the full ack count. An unreachable peer turns into a
//! machine check via [`BarrierTimeout`].

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use es40_types::CpuId;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarrierTimeout {
    pub source: CpuId,
    pub missing_acks: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitiateOutcome {
    /// Rendezvous started; broadcast IPIs and call `wait`.
    Started { required_acks: u32 },
    /// No other CPUs are active; the barrier is purely local.
    NoPeers,
    /// Another CPU's barrier is in flight. The caller must service its
    /// own mailbox (acknowledging the peer) before retrying, or the two
    /// initiators deadlock.
    Busy,
}

#[derive(Debug)]
struct State {
    active: bool,
    source: CpuId,
    required: u32,
    acks: u32,
}

pub struct BarrierCoordinator {
    state: Mutex<State>,
    cv: Condvar,
    timeout: Duration,
}

impl BarrierCoordinator {
    pub fn new(timeout: Duration) -> BarrierCoordinator {
        BarrierCoordinator {
            state: Mutex::new(State {
                active: false,
                source: 0,
                required: 0,
                acks: 0,
            }),
            cv: Condvar::new(),
            timeout,
        }
    }

    pub fn initiate(&self, source: CpuId, active_cpu_count: usize) -> InitiateOutcome {
        if active_cpu_count <= 1 {
            return InitiateOutcome::NoPeers;
        }
        let mut st = self.state.lock().unwrap();
        if st.active {
            return InitiateOutcome::Busy;
        }
        st.active = true;
        st.source = source;
        st.required = active_cpu_count as u32 - 1;
        st.acks = 0;
        InitiateOutcome::Started {
            required_acks: st.required,
        }
    }

    /// Called by a recipient after draining its write buffer.
    pub fn acknowledge(&self, _cpu: CpuId) {
        let mut st = self.state.lock().unwrap();
        if st.active {
            st.acks += 1;
            if st.acks >= st.required {
                self.cv.notify_all();
            }
        }
    }

    /// Initiator-side wait. Ends the barrier either way.
    pub fn wait(&self, source: CpuId) -> Result<(), BarrierTimeout> {
        let mut st = self.state.lock().unwrap();
        let deadline = std::time::Instant::now() + self.timeout;
        while st.active && st.source == source && st.acks < st.required {
            let now = std::time::Instant::now();
            if now >= deadline {
                let missing = st.required - st.acks;
                st.active = false;
                return Err(BarrierTimeout {
                    source,
                    missing_acks: missing,
                });
            }
            let (guard, _) = self.cv.wait_timeout(st, deadline - now).unwrap();
            st = guard;
        }
        st.active = false;
        Ok(())
    }

    /// Whether a barrier initiated by someone other than `cpu` wants an
    /// acknowledgement. Used by run loops servicing a halted CPU.
    pub fn needs_ack_from(&self, cpu: CpuId) -> bool {
        let st = self.state.lock().unwrap();
        st.active && st.source != cpu && st.acks < st.required
    }
}

impl Default for BarrierCoordinator {
    fn default() -> Self {
        BarrierCoordinator::new(DEFAULT_TIMEOUT)
    }
}
