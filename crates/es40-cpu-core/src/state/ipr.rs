//! The internal-processor-register file.
//!
//! This module holds only the data; reads and writes with their side
//! effects (TLB invalidation, decode-cache flushes, ASN retagging) are
//! dispatched in `exec::ipr_ops`, which has access to the whole core.
//!
//! The index map below is the PAL-visible register numbering this
//! implementation exposes through HW_MFPR/HW_MTPR.

use bitflags::bitflags;
use es40_types::Mode;

/// HW_MFPR/HW_MTPR index assignments.
pub mod index {
    pub const ITB_TAG: u8 = 0x00;
    pub const ITB_PTE: u8 = 0x01;
    pub const ITB_IAP: u8 = 0x02;
    pub const ITB_IA: u8 = 0x03;
    pub const ITB_IS: u8 = 0x04;
    pub const EXC_ADDR: u8 = 0x06;
    pub const IVA_FORM: u8 = 0x07;
    pub const PS: u8 = 0x08;
    pub const CM: u8 = 0x09;
    pub const IER: u8 = 0x0A;
    pub const SIRR: u8 = 0x0C;
    pub const ISUM: u8 = 0x0D;
    pub const HW_INT_CLR: u8 = 0x0E;
    pub const EXC_SUM: u8 = 0x0F;
    pub const PAL_BASE: u8 = 0x10;
    pub const I_CTL: u8 = 0x11;
    pub const IC_FLUSH_ASM: u8 = 0x12;
    pub const IC_FLUSH: u8 = 0x13;
    pub const I_STAT: u8 = 0x16;
    pub const SLEEP: u8 = 0x17;
    pub const DTB_TAG0: u8 = 0x20;
    pub const DTB_PTE0: u8 = 0x21;
    pub const DTB_IS0: u8 = 0x22;
    pub const DTB_ASN0: u8 = 0x23;
    pub const DTB_ALTMODE: u8 = 0x24;
    pub const MM_STAT: u8 = 0x25;
    pub const M_CTL: u8 = 0x26;
    pub const DC_CTL: u8 = 0x27;
    pub const DC_STAT: u8 = 0x28;
    pub const DTB_TAG1: u8 = 0x2A;
    pub const DTB_PTE1: u8 = 0x2B;
    pub const DTB_IAP: u8 = 0x2C;
    pub const DTB_IA: u8 = 0x2D;
    pub const DTB_IS1: u8 = 0x2E;
    pub const DTB_ASN1: u8 = 0x2F;
    pub const CC: u8 = 0x40;
    pub const CC_CTL: u8 = 0x41;
    pub const VA: u8 = 0x42;
    pub const VA_FORM: u8 = 0x43;
    pub const VA_CTL: u8 = 0x44;
    pub const VPTB: u8 = 0x45;
    pub const PTBR: u8 = 0x46;
    pub const ASN: u8 = 0x47;
    pub const FEN: u8 = 0x48;
    pub const ASTRR: u8 = 0x49;
    pub const ASTEN: u8 = 0x4A;
    pub const SYSVAL: u8 = 0x4B;
    pub const IPL: u8 = 0x4D;
    pub const WHAMI: u8 = 0x4E;
}

bitflags! {
    /// I_CTL layout: superpage enables, shadow enable, integer-overflow
    /// trap enable.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct IctlBits: u64 {
        const SPE0 = 1 << 0;
        const SPE1 = 1 << 1;
        const SPE2 = 1 << 2;
        const SDE = 1 << 3;
        const IOV = 1 << 4;
    }
}

pub struct Iprs {
    pub pal_base: u64,
    pub exc_addr: u64,
    pub exc_sum: u64,
    /// Faulting VA latched at D-stream fault delivery.
    pub fault_va: u64,
    pub mm_stat: u64,
    pub i_ctl: IctlBits,
    /// M_CTL<2:0> = D-stream superpage enables.
    pub m_ctl: u64,
    pub va_ctl: u64,
    pub vptb: u64,
    pub itb_tag: u64,
    pub dtb_tag: [u64; 2],
    pub dtb_asn: [u8; 2],
    pub alt_mode: Mode,
    /// Cycle counter: low 32 bits count retired instructions, high 32
    /// are the process offset written through CC.
    pub cc: u32,
    pub cc_offset: u32,
    pub cc_ena: bool,
    pub ier: u64,
    /// Software interrupt request bits 1..15.
    pub sirr: u64,
    pub astrr: u64,
    pub asten: u64,
    pub sysval: u64,
    pub i_stat: u64,
    pub dc_ctl: u64,
    pub dc_stat: u64,
}

impl Iprs {
    pub fn new() -> Iprs {
        Iprs {
            pal_base: 0,
            exc_addr: 0,
            exc_sum: 0,
            fault_va: 0,
            mm_stat: 0,
            // Overflow traps on, shadow registers enabled, superpages
            // off until PAL turns them on.
            i_ctl: IctlBits::SDE | IctlBits::IOV,
            m_ctl: 0,
            va_ctl: 0,
            vptb: 0,
            itb_tag: 0,
            dtb_tag: [0; 2],
            dtb_asn: [0; 2],
            alt_mode: Mode::Kernel,
            cc: 0,
            cc_offset: 0,
            cc_ena: true,
            ier: 0,
            sirr: 0,
            astrr: 0,
            asten: 0,
            sysval: 0,
            i_stat: 0,
            dc_ctl: 0,
            dc_stat: 0,
        }
    }

    pub fn cc_tick(&mut self) {
        if self.cc_ena {
            self.cc = self.cc.wrapping_add(1);
        }
    }

    /// RPCC image: process offset in the high half, counter in the low.
    pub fn cc_value(&self) -> u64 {
        ((self.cc_offset as u64) << 32) | self.cc as u64
    }

    pub fn overflow_traps_enabled(&self) -> bool {
        self.i_ctl.contains(IctlBits::IOV)
    }

    pub fn shadow_enabled(&self) -> bool {
        self.i_ctl.contains(IctlBits::SDE)
    }

    pub fn ictl_spe(&self) -> u8 {
        (self.i_ctl.bits() & 0b111) as u8
    }

    pub fn mctl_spe(&self) -> u8 {
        (self.m_ctl & 0b111) as u8
    }

    /// VA_FORM: the virtual PTE address for a faulting VA, formed from
    /// VPTB and the VPN.
    pub fn va_form(&self, va: u64, page_shift: u32) -> u64 {
        self.vptb | (((va & 0x0000_FFFF_FFFF_FFFF) >> page_shift) << 3)
    }
}

impl Default for Iprs {
    fn default() -> Self {
        Iprs::new()
    }
}
