//! Branch predictor: global history xor'd into a 2-bit counter table,
//! plus a small branch-target cache.
//!
//! The interpreter resolves every branch at execute, so the predictor's
//! only architectural effect is the mispredict/flush signal; it also
//! feeds the run-loop statistics.

const COUNTERS: usize = 1024;
const TARGETS: usize = 256;

pub struct BranchPredictor {
    history: u16,
    counters: Box<[u8; COUNTERS]>,
    targets: Box<[(u64, u64); TARGETS]>,
    pub resolved: u64,
    pub mispredicts: u64,
}

impl BranchPredictor {
    pub fn new() -> BranchPredictor {
        BranchPredictor {
            history: 0,
            counters: Box::new([1; COUNTERS]), // weakly not-taken
            targets: Box::new([(0, 0); TARGETS]),
            resolved: 0,
            mispredicts: 0,
        }
    }

    fn counter_idx(&self, pc: u64) -> usize {
        (((pc >> 2) as usize) ^ self.history as usize) & (COUNTERS - 1)
    }

    /// Records a resolved branch and reports whether the prediction was
    /// wrong (the pipeline flushes on mispredict).
    pub fn resolve(&mut self, pc: u64, taken: bool, target: u64) -> bool {
        let ci = self.counter_idx(pc);
        let predicted_taken = self.counters[ci] >= 2;
        let ti = ((pc >> 2) as usize) & (TARGETS - 1);
        let predicted_target = {
            let (tag, tgt) = self.targets[ti];
            (tag == pc).then_some(tgt)
        };

        let mispredict =
            predicted_taken != taken || (taken && predicted_target != Some(target));

        let c = &mut self.counters[ci];
        if taken {
            *c = (*c + 1).min(3);
        } else {
            *c = c.saturating_sub(1);
        }
        if taken {
            self.targets[ti] = (pc, target);
        }
        self.history = (self.history << 1) | taken as u16;

        self.resolved += 1;
        if mispredict {
            self.mispredicts += 1;
        }
        mispredict
    }
}

impl Default for BranchPredictor {
    fn default() -> Self {
        BranchPredictor::new()
    }
}
