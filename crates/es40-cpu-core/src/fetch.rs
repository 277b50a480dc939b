//! Instruction fetch: PC translation, decode-cache probes, guest-memory
//! read, grain resolution.

use es40_isa::DecodedInstruction;
use es40_types::{Access, Realm};

use crate::core::CpuCore;
use crate::fault::{Fault, MchkReason};

#[derive(Clone, Copy, Debug)]
pub enum FetchResult {
    Fetched(DecodedInstruction),
    Fault(Fault),
}

pub fn fetch_next(core: &mut CpuCore) -> FetchResult {
    let va = core.state.pc();
    let pa = match core.translate(va, Realm::Instruction, Access::Execute, core.state.ps.cm) {
        Ok(pa) => pa,
        Err(f) => return FetchResult::Fault(f),
    };

    // PC-indexed probe first; its hit is only honored when the recorded
    // PA matches the translation we just did.
    if let Some(di) = core.caches.lookup_va(va, pa) {
        return FetchResult::Fetched(di);
    }
    if let Some(di) = core.caches.lookup_pa(va, pa) {
        return FetchResult::Fetched(di);
    }

    let raw = match core.shared.mem.read_inst32(pa) {
        Ok(raw) => raw,
        Err(_) => {
            return FetchResult::Fault(Fault::MachineCheck {
                reason: MchkReason::BusError,
                addr: pa,
            })
        }
    };

    let shared = core.shared.clone();
    let id = match shared.registry.resolve(raw) {
        Some(id) => id,
        None => return FetchResult::Fault(Fault::Opcdec),
    };
    let di = DecodedInstruction::new(raw, va, pa, id, shared.registry.grain(id));
    core.caches.insert(di);
    FetchResult::Fetched(di)
}
