//! Per-CPU orchestrator: one call = one architectural step. Delivers
//! IPIs and pending events, claims interrupts, runs the pipeline, and
//! interprets the side-effect flags the units returned.

use es40_interrupts::IpiCommand;
use es40_smp::InitiateOutcome;
use es40_types::Mode;

use crate::core::{CpuCore, SystemShared};
use crate::fault::{EventPayload, ExcClass, Fault, MchkReason, PendingEvent, Priority};
use crate::fetch;
use crate::outcome::{Effects, Outcome};
use crate::pal;
use crate::pipeline;

pub fn step(core: &mut CpuCore) -> Outcome {
    let shared = core.shared.clone();
    core.state.iprs.cc_tick();

    // IPIs first: they can wake a halted CPU, acknowledge a peer's
    // barrier, or apply a shootdown that must precede the next fetch.
    while let Some(cmd) = shared.ipi.fetch(core.id) {
        handle_ipi(core, &shared, cmd);
    }

    if core.state.halted {
        return Outcome::none().halt();
    }

    // Synchronous event left by the previous instruction (or posted by
    // the barrier path) has priority over new work.
    if let Some(ev) = core.fault.take() {
        return pal::enter(core, ev);
    }

    // Asynchronous interrupts are masked while PAL runs.
    if !core.state.pal_mode {
        if let Some(ev) = claim_interrupt(core, &shared) {
            return pal::enter(core, ev);
        }
    }

    let fetched = fetch::fetch_next(core);
    let mut out = pipeline::tick(core, fetched);

    if out.effects.contains(Effects::MEMORY_BARRIER) {
        full_barrier(core, &shared, &mut out);
    }
    if core.state.halted {
        out = out.halt();
    }
    out
}

/// Applies an IPI command on the receiving CPU.
pub fn handle_ipi(core: &mut CpuCore, shared: &SystemShared, cmd: IpiCommand) {
    match cmd {
        IpiCommand::TlbInvalidateAll => core.tlb.invalidate_all(None),
        IpiCommand::TlbInvalidateAsn { asn } => core.tlb.invalidate_asn(asn),
        IpiCommand::TlbInvalidateVaBoth { va, asn } => core.tlb.invalidate_va(None, va, asn),
        IpiCommand::TlbInvalidateVaItb { va, asn } => {
            core.tlb
                .invalidate_va(Some(es40_types::Realm::Instruction), va, asn)
        }
        IpiCommand::TlbInvalidateVaDtb { va, asn } => {
            core.tlb.invalidate_va(Some(es40_types::Realm::Data), va, asn)
        }
        // The decode caches are the only line-grained cache model the
        // core keeps; drop them wholesale.
        IpiCommand::CacheInvalidateLine { .. }
        | IpiCommand::CacheFlushLine { .. }
        | IpiCommand::CacheEvictLine { .. } => core.caches.invalidate_all(),
        IpiCommand::MemoryBarrierFull | IpiCommand::MemoryBarrierWrite => {
            // Write buffers drain implicitly (stores commit in order);
            // all that is left is the acknowledgement.
            shared.barrier.acknowledge(core.id);
        }
        IpiCommand::HaltCpu => core.state.halted = true,
        IpiCommand::WakeCpu => core.state.halted = false,
        IpiCommand::ContextSwitch => shared.reservations.clear(core.id),
    }
}

fn claim_interrupt(core: &mut CpuCore, shared: &SystemShared) -> Option<PendingEvent> {
    let ipl = core.state.ps.ipl;
    let pc = core.state.pc();
    let asn = core.state.asn;
    let mode = core.state.ps.cm;

    if let Some(claim) = shared.router.claim_next(core.id, ipl) {
        return Some(PendingEvent {
            class: ExcClass::Interrupt,
            priority: Priority::Normal,
            pc,
            va: 0,
            asn,
            mode,
            payload: EventPayload::Interrupt {
                source: claim.source,
                ipl: claim.ipl,
                vector: claim.vector,
            },
        });
    }

    // Software interrupt requests (SIRR bits 1..15).
    if ipl < 15 {
        let above = core.state.iprs.sirr & (!0u64 << (ipl + 1)) & 0xFFFE;
        if above != 0 {
            let level = 63 - above.leading_zeros() as u8;
            core.state.iprs.sirr &= !(1u64 << level);
            return Some(PendingEvent {
                class: ExcClass::Interrupt,
                priority: Priority::Normal,
                pc,
                va: 0,
                asn,
                mode,
                payload: EventPayload::Interrupt {
                    source: 0,
                    ipl: level,
                    vector: level as u32,
                },
            });
        }
    }

    // ASTs deliver below IPL 2 when both requested and enabled.
    if ipl < 2 {
        let deliverable = core.state.iprs.astrr & core.state.iprs.asten & 0xF;
        if deliverable != 0 {
            let mode_bit = deliverable.trailing_zeros() as u8;
            core.state.iprs.astrr &= !(1u64 << mode_bit);
            return Some(PendingEvent {
                class: ExcClass::Interrupt,
                priority: Priority::Normal,
                pc,
                va: 0,
                asn,
                mode,
                payload: EventPayload::Ast {
                    mode: Mode::from_bits(mode_bit),
                },
            });
        }
    }

    None
}

fn full_barrier(core: &mut CpuCore, shared: &SystemShared, out: &mut Outcome) {
    loop {
        match shared.barrier.initiate(core.id, shared.cpu_count) {
            InitiateOutcome::NoPeers => return,
            InitiateOutcome::Started { .. } => {
                for peer in 0..shared.cpu_count {
                    if peer != core.id {
                        shared.ipi.post(peer, IpiCommand::MemoryBarrierFull);
                        (shared.wake)(peer);
                    }
                }
                if let Err(timeout) = shared.barrier.wait(core.id) {
                    core.post_fault(
                        Fault::MachineCheck {
                            reason: MchkReason::BarrierTimeout,
                            addr: timeout.missing_acks as u64,
                        },
                        core.state.pc(),
                    );
                    *out = out.with(Effects::FAULT_DISPATCHED | Effects::FLUSH_PIPELINE);
                }
                return;
            }
            InitiateOutcome::Busy => {
                // Another CPU's barrier is in flight; service it so both
                // initiators make progress, then retry.
                if let Some(cmd) = shared.ipi.fetch(core.id) {
                    handle_ipi(core, shared, cmd);
                } else {
                    std::hint::spin_loop();
                }
            }
        }
    }
}
