//! HW_MFPR/HW_MTPR: the IPR file's read/write dispatch, including the
//! write hooks with architectural side effects (TLB fills and
//! invalidations, decode-cache flushes, ASN and mode changes).

use es40_interrupts::IpiCommand;
use es40_isa::word;
use es40_mmu::Pte;
use es40_types::{Mode, Realm};

use crate::core::CpuCore;
use crate::fault::Fault;
use crate::outcome::Effects;
use crate::pipeline::Slot;
use crate::state::ipr::{index, IctlBits};

pub fn mfpr(core: &mut CpuCore, slot: &mut Slot) {
    let di = slot.di;
    match read_ipr(core, word::ipr_index(di.raw)) {
        Ok(v) => slot.write_int(di.ra, v),
        Err(f) => slot.fault = Some(f),
    }
}

pub fn mtpr(core: &mut CpuCore, slot: &mut Slot) {
    let di = slot.di;
    let idx = word::ipr_index(di.raw);
    let value = core.state.regs.read(di.ra);
    match write_ipr(core, idx, value) {
        Ok(()) => {
            if idx == index::SLEEP {
                slot.effects |= Effects::HALT;
            }
        }
        Err(f) => slot.fault = Some(f),
    }
}

pub fn read_ipr(core: &CpuCore, idx: u8) -> Result<u64, Fault> {
    let s = &core.state;
    let i = &s.iprs;
    let page_shift = core.shared.base_page.shift();
    Ok(match idx {
        index::ITB_TAG => i.itb_tag,
        index::EXC_ADDR => i.exc_addr,
        index::IVA_FORM => i.va_form(i.exc_addr & !3, page_shift),
        index::PS => s.hwpcb.saved_ps.to_bits(),
        index::CM => s.ps.cm.bits() as u64,
        index::IER => i.ier,
        index::SIRR => i.sirr,
        index::ISUM => i.sirr, // pending-summary view of the soft requests
        index::EXC_SUM => i.exc_sum,
        index::PAL_BASE => i.pal_base,
        index::I_CTL => i.i_ctl.bits(),
        index::I_STAT => i.i_stat,
        index::DTB_TAG0 => i.dtb_tag[0],
        index::DTB_TAG1 => i.dtb_tag[1],
        index::DTB_ASN0 => i.dtb_asn[0] as u64,
        index::DTB_ASN1 => i.dtb_asn[1] as u64,
        index::DTB_ALTMODE => i.alt_mode.bits() as u64,
        index::MM_STAT => i.mm_stat,
        index::M_CTL => i.m_ctl,
        index::DC_CTL => i.dc_ctl,
        index::DC_STAT => i.dc_stat,
        index::CC => i.cc_value(),
        index::CC_CTL => ((i.cc_ena as u64) << 32) | i.cc as u64,
        index::VA => i.fault_va,
        index::VA_FORM => i.va_form(i.fault_va, page_shift),
        index::VA_CTL => i.va_ctl,
        index::VPTB => i.vptb,
        index::PTBR => s.hwpcb.ptbr,
        index::ASN => s.asn as u64,
        index::FEN => s.fpen as u64,
        index::ASTRR => i.astrr,
        index::ASTEN => i.asten,
        index::SYSVAL => i.sysval,
        index::IPL => s.ps.ipl as u64,
        index::WHAMI => core.id as u64,
        _ => return Err(Fault::Opcdec),
    })
}

pub fn write_ipr(core: &mut CpuCore, idx: u8, v: u64) -> Result<(), Fault> {
    match idx {
        index::ITB_TAG => core.state.iprs.itb_tag = v,
        index::ITB_PTE => {
            // Fill the ITB with the latched tag and the current ASN.
            let entry = core.tlb.entry_from_pte(core.state.iprs.itb_tag, Pte(v), core.state.asn);
            core.tlb.install(Realm::Instruction, entry);
        }
        index::ITB_IAP => {
            core.tlb.invalidate_asn(core.state.asn);
            shootdown(core, IpiCommand::TlbInvalidateAsn { asn: core.state.asn });
        }
        index::ITB_IA => {
            core.tlb.invalidate_all(Some(Realm::Instruction));
            shootdown(core, IpiCommand::TlbInvalidateAll);
        }
        index::ITB_IS => {
            core.tlb.invalidate_va(Some(Realm::Instruction), v, core.state.asn);
            shootdown(
                core,
                IpiCommand::TlbInvalidateVaItb {
                    va: v,
                    asn: core.state.asn,
                },
            );
        }

        index::EXC_ADDR => core.state.iprs.exc_addr = v,
        index::PS => core.state.hwpcb.saved_ps = crate::state::ProcStatus::from_bits(v),
        index::CM => core.state.ps.cm = Mode::from_bits(v as u8),
        index::IER => core.state.iprs.ier = v,
        index::SIRR => core.state.iprs.sirr = v & 0xFFFE,
        index::HW_INT_CLR => core.state.iprs.sirr &= !v,
        index::EXC_SUM => core.state.iprs.exc_sum = 0,
        index::PAL_BASE => {
            core.state.iprs.pal_base = v & !0x7FFF;
            // Relocating PAL invalidates every cached decode.
            core.caches.invalidate_all();
        }
        index::I_CTL => {
            core.state.iprs.i_ctl = IctlBits::from_bits_truncate(v);
            if core.state.pal_mode {
                core.state.regs.shadow_active = core.state.iprs.shadow_enabled();
            }
        }
        index::IC_FLUSH | index::IC_FLUSH_ASM => core.caches.invalidate_all(),
        index::I_STAT => core.state.iprs.i_stat = 0,
        index::SLEEP => {
            core.state.halted = true;
        }

        index::DTB_TAG0 => core.state.iprs.dtb_tag[0] = v,
        index::DTB_TAG1 => core.state.iprs.dtb_tag[1] = v,
        index::DTB_PTE0 | index::DTB_PTE1 => {
            let port = (idx == index::DTB_PTE1) as usize;
            let tag = core.state.iprs.dtb_tag[port];
            let asn = core.state.iprs.dtb_asn[port];
            let entry = core.tlb.entry_from_pte(tag, Pte(v), asn);
            core.tlb.install(Realm::Data, entry);
        }
        index::DTB_IS0 | index::DTB_IS1 => {
            core.tlb.invalidate_va(Some(Realm::Data), v, core.state.asn);
            shootdown(
                core,
                IpiCommand::TlbInvalidateVaDtb {
                    va: v,
                    asn: core.state.asn,
                },
            );
        }
        index::DTB_IAP => {
            core.tlb.invalidate_asn(core.state.asn);
            shootdown(core, IpiCommand::TlbInvalidateAsn { asn: core.state.asn });
        }
        index::DTB_IA => {
            core.tlb.invalidate_all(Some(Realm::Data));
            shootdown(core, IpiCommand::TlbInvalidateAll);
        }
        index::DTB_ASN0 => core.state.iprs.dtb_asn[0] = v as u8,
        index::DTB_ASN1 => core.state.iprs.dtb_asn[1] = v as u8,
        index::DTB_ALTMODE => core.state.iprs.alt_mode = Mode::from_bits(v as u8),
        index::MM_STAT => {}
        index::M_CTL => core.state.iprs.m_ctl = v & 0b111,
        index::DC_CTL => core.state.iprs.dc_ctl = v,
        index::DC_STAT => core.state.iprs.dc_stat = 0,

        index::CC => core.state.iprs.cc_offset = (v >> 32) as u32,
        index::CC_CTL => {
            core.state.iprs.cc = v as u32;
            core.state.iprs.cc_ena = v & (1 << 32) != 0;
        }
        index::VA_CTL => core.state.iprs.va_ctl = v,
        index::VPTB => core.state.iprs.vptb = v,
        index::PTBR => core.state.hwpcb.ptbr = v,
        // ASN switches never flush: entries are tagged, stale ones die
        // by epoch when PAL retires the ASN.
        index::ASN => core.state.asn = v as u8,
        index::FEN => core.state.fpen = v & 1 != 0,
        index::ASTRR => core.state.iprs.astrr = v & 0xF,
        index::ASTEN => core.state.iprs.asten = v & 0xF,
        index::SYSVAL => core.state.iprs.sysval = v,
        index::IPL => core.state.ps.ipl = (v & 0x1F) as u8,
        _ => return Err(Fault::Opcdec),
    }
    Ok(())
}

/// Local TLB maintenance is mirrored to every peer as a shootdown IPI;
/// recipients apply it in their interrupt-handling path.
fn shootdown(core: &CpuCore, cmd: IpiCommand) {
    let shared = &core.shared;
    for peer in 0..shared.cpu_count {
        if peer != core.id {
            shared.ipi.post(peer, cmd);
            (shared.wake)(peer);
        }
    }
}
