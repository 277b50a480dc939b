//! Architectural per-CPU state: register files, processor status, the
//! IPR file, FPCR, and the hardware process control block.

pub mod fpcr;
pub mod hwpcb;
pub mod ipr;
pub mod ps;
pub mod regs;

pub use fpcr::Fpcr;
pub use hwpcb::Hwpcb;
pub use ipr::{IctlBits, Iprs};
pub use ps::ProcStatus;
pub use regs::{FpRegFile, RegFile};

use es40_types::Mode;

pub struct CpuState {
    pub regs: RegFile,
    pub fregs: FpRegFile,
    pub ps: ProcStatus,
    /// PC without the PAL-mode tag bit; `pal_mode` carries it.
    pc: u64,
    pub pal_mode: bool,
    pub fpcr: Fpcr,
    /// PS<FPE>: floating-point enable. Clear means any FP-touching
    /// instruction raises FEN.
    pub fpen: bool,
    pub asn: u8,
    pub iprs: Iprs,
    pub hwpcb: Hwpcb,
    pub halted: bool,
    pub halt_code: u64,
    /// RC/RS flag. Single-writer: only this CPU's execute path touches
    /// it, so a plain bool is sound even though peers may post
    /// interrupts concurrently.
    pub intr_flag: bool,
    /// Register-dirty scoreboard; bit i set means Ri has an outstanding
    /// writeback in the current slot.
    pub scoreboard: u32,
}

impl CpuState {
    pub fn new() -> CpuState {
        CpuState {
            regs: RegFile::new(),
            fregs: FpRegFile::new(),
            ps: ProcStatus {
                cm: Mode::Kernel,
                ipl: 31,
            },
            pc: 0,
            pal_mode: true,
            fpcr: Fpcr(0),
            fpen: true,
            asn: 0,
            iprs: Iprs::new(),
            hwpcb: Hwpcb::new(),
            halted: false,
            halt_code: 0,
            intr_flag: false,
            scoreboard: 0,
        }
    }

    pub fn pc(&self) -> u64 {
        self.pc
    }

    /// PC image including the PAL-mode tag in bit 0, as saved to
    /// EXC_ADDR.
    pub fn pc_tagged(&self) -> u64 {
        self.pc | self.pal_mode as u64
    }

    /// Plain PC update; does not touch the PAL-mode flag. Mode changes
    /// go through [`CpuState::jump_tagged`] or the PAL dispatcher.
    pub fn set_pc(&mut self, pc: u64) {
        self.pc = pc & !3;
    }

    /// Jump to a tagged target: bit 0 selects PAL mode (HW_RET, REI,
    /// PAL entry).
    pub fn jump_tagged(&mut self, target: u64) {
        self.pal_mode = target & 1 != 0;
        self.pc = target & !3;
    }

    pub fn advance_pc(&mut self) {
        self.pc = self.pc.wrapping_add(4);
    }
}

impl Default for CpuState {
    fn default() -> Self {
        CpuState::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_jump_toggles_pal_mode() {
        let mut s = CpuState::new();
        s.jump_tagged(0x8000_1001);
        assert!(s.pal_mode);
        assert_eq!(s.pc(), 0x8000_1000);
        assert_eq!(s.pc_tagged(), 0x8000_1001);

        s.jump_tagged(0x1_0000);
        assert!(!s.pal_mode);
        assert_eq!(s.pc_tagged(), 0x1_0000);
    }

    #[test]
    fn sequential_advance_keeps_mode() {
        let mut s = CpuState::new();
        s.jump_tagged(0x4001);
        s.advance_pc();
        assert!(s.pal_mode);
        assert_eq!(s.pc(), 0x4004);
    }
}
