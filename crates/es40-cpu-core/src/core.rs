//! The per-CPU core: state plus references to the shared SMP fabric,
//! and the translated data path the memory unit executes through.

use std::sync::Arc;

use es40_interrupts::{IpiBank, IrqRouter};
use es40_isa::GrainRegistry;
use es40_mmu::{walk, LookupResult, PageSize, Tlb, WalkFailure, WalkParams};
use es40_smp::{BarrierCoordinator, ReservationFile};
use es40_types::{Access, CpuId, Mode, Realm};
use memory::{MemError, MemoryBus};

use crate::decode_cache::DecodeCaches;
use crate::fault::{Fault, FaultSlot, MchkReason, PendingEvent};
use crate::pal::PalVariant;
use crate::predictor::BranchPredictor;
use crate::state::CpuState;

/// Hook the machine layer installs so IPI posts can wake a parked CPU
/// worker thread. The default is a no-op (deterministic stepping).
pub type WakeHook = Box<dyn Fn(CpuId) + Send + Sync>;

/// Everything shared between CPUs. Owned once by the machine and handed
/// to each core behind an `Arc`.
pub struct SystemShared {
    pub mem: Arc<dyn MemoryBus>,
    pub registry: GrainRegistry,
    pub router: IrqRouter,
    pub ipi: IpiBank,
    pub reservations: ReservationFile,
    pub barrier: BarrierCoordinator,
    pub cpu_count: usize,
    pub pal_variant: PalVariant,
    /// When set, a TLB miss with a valid mapping is filled by the core
    /// itself instead of vectoring to PAL.
    pub hardware_tb_fill: bool,
    pub base_page: PageSize,
    pub wake: WakeHook,
}

pub struct CpuCore {
    pub id: CpuId,
    pub state: CpuState,
    pub tlb: Arc<Tlb>,
    pub caches: DecodeCaches,
    pub fault: FaultSlot,
    pub predictor: BranchPredictor,
    pub shared: Arc<SystemShared>,
}

impl CpuCore {
    pub fn new(id: CpuId, shared: Arc<SystemShared>, tlb: Arc<Tlb>) -> CpuCore {
        CpuCore {
            id,
            state: CpuState::new(),
            tlb,
            caches: DecodeCaches::new(),
            fault: FaultSlot::new(),
            predictor: BranchPredictor::new(),
            shared,
        }
    }

    /// Queues a synchronous fault against the current instruction.
    pub fn post_fault(&mut self, fault: Fault, pc: u64) {
        let ev = PendingEvent::from_fault(fault, pc, self.state.asn, self.state.ps.cm);
        self.fault.set_pending(ev);
    }

    /// Virtual-to-physical translation for `realm`/`access` in `mode`.
    ///
    /// PAL-mode instruction fetches are physical (PC is a physical
    /// address while the tag bit is set). Kernel-mode accesses first try
    /// the superpage windows, then the TLB; a miss consults the page
    /// tables to classify single vs. double miss, and — only with
    /// hardware TB fill enabled — installs the translation directly.
    pub fn translate(
        &self,
        va: u64,
        realm: Realm,
        access: Access,
        mode: Mode,
    ) -> Result<u64, Fault> {
        if self.state.pal_mode && realm == Realm::Instruction {
            return Ok(va & !3);
        }

        let spe = match realm {
            Realm::Instruction => self.state.iprs.ictl_spe(),
            Realm::Data => self.state.iprs.mctl_spe(),
        };
        if mode == Mode::Kernel && spe != 0 {
            if let Some(pa) = es40_mmu::superpage(va, spe) {
                return Ok(pa);
            }
        }

        let asn = self.state.asn;
        match self.tlb.lookup(realm, va, asn, mode, access) {
            LookupResult::Hit(pa) => Ok(pa),
            LookupResult::Acv => Err(self.acv_fault(realm, va, access)),
            LookupResult::FaultOn(a) => Err(Fault::FaultOn { va, access: a }),
            LookupResult::Miss => self.handle_miss(va, realm, access, mode),
        }
    }

    fn acv_fault(&self, realm: Realm, va: u64, access: Access) -> Fault {
        match realm {
            Realm::Instruction => Fault::ItbAcv { va },
            Realm::Data => Fault::DtbAcv { va, access },
        }
    }

    fn miss_fault(&self, realm: Realm, va: u64, access: Access, double: bool) -> Fault {
        match (realm, double) {
            (Realm::Instruction, _) => Fault::ItbMiss { va },
            (Realm::Data, false) => Fault::DtbMissSingle { va, access },
            (Realm::Data, true) => Fault::DtbMissDouble { va, access },
        }
    }

    fn handle_miss(
        &self,
        va: u64,
        realm: Realm,
        access: Access,
        mode: Mode,
    ) -> Result<u64, Fault> {
        let params = WalkParams {
            ptbr: self.state.hwpcb.ptbr,
            page_shift: self.shared.base_page.shift(),
        };
        match walk(self.shared.mem.as_ref(), params, va) {
            Ok(pte) => {
                if !self.shared.hardware_tb_fill {
                    // PAL owns the fill; report a single-level miss.
                    return Err(self.miss_fault(realm, va, access, false));
                }
                if pte.fault_on(access) {
                    return Err(Fault::FaultOn { va, access });
                }
                if !pte.allows(mode, access) {
                    return Err(self.acv_fault(realm, va, access));
                }
                let entry = self.tlb.entry_from_pte(va, pte, self.state.asn);
                self.tlb.install(realm, entry);
                let shift = entry.size.shift();
                Ok((pte.pfn() << shift) | (va & (entry.size.bytes() - 1)))
            }
            Err(WalkFailure::MissSingle) => Err(self.miss_fault(realm, va, access, false)),
            Err(WalkFailure::MissDouble) => Err(self.miss_fault(realm, va, access, true)),
            Err(WalkFailure::Bus(_)) => Err(Fault::MachineCheck {
                reason: MchkReason::BusError,
                addr: va,
            }),
        }
    }

    /// Alignment-checked translation for a data read; LL needs the PA
    /// before the access to pin the reservation line.
    pub fn translate_data_read(&self, va: u64, width: u32) -> Result<u64, Fault> {
        if va % width as u64 != 0 {
            return Err(Fault::Unalign {
                va,
                access: Access::Read,
            });
        }
        self.translate(va, Realm::Data, Access::Read, self.state.ps.cm)
    }

    /// Alignment-checked translation for a data write; SC checks its
    /// reservation against the PA before committing.
    pub fn translate_data_write(&self, va: u64, width: u32) -> Result<u64, Fault> {
        if va % width as u64 != 0 {
            return Err(Fault::Unalign {
                va,
                access: Access::Write,
            });
        }
        self.translate(va, Realm::Data, Access::Write, self.state.ps.cm)
    }

    /// Translated data read of 1/2/4/8 bytes, alignment-checked.
    pub fn read_data(&mut self, va: u64, width: u32) -> Result<u64, Fault> {
        self.read_data_mode(va, width, self.state.ps.cm)
    }

    pub fn read_data_mode(&mut self, va: u64, width: u32, mode: Mode) -> Result<u64, Fault> {
        if va % width as u64 != 0 {
            return Err(Fault::Unalign {
                va,
                access: Access::Read,
            });
        }
        let pa = self.translate(va, Realm::Data, Access::Read, mode)?;
        self.read_physical(pa, width)
    }

    pub fn read_physical(&self, pa: u64, width: u32) -> Result<u64, Fault> {
        let mem = &self.shared.mem;
        let res = match width {
            1 => mem.read_u8(pa).map(u64::from),
            2 => mem.read_u16(pa).map(u64::from),
            4 => mem.read_u32(pa).map(u64::from),
            _ => mem.read_u64(pa),
        };
        res.map_err(|e| self.physical_fault(e, pa))
    }

    /// Translated data write; breaks every reservation on the line.
    pub fn write_data(&mut self, va: u64, width: u32, value: u64) -> Result<(), Fault> {
        self.write_data_mode(va, width, value, self.state.ps.cm)
    }

    pub fn write_data_mode(
        &mut self,
        va: u64,
        width: u32,
        value: u64,
        mode: Mode,
    ) -> Result<(), Fault> {
        if va % width as u64 != 0 {
            return Err(Fault::Unalign {
                va,
                access: Access::Write,
            });
        }
        let pa = self.translate(va, Realm::Data, Access::Write, mode)?;
        self.write_physical(pa, width, value)
    }

    pub fn write_physical(&self, pa: u64, width: u32, value: u64) -> Result<(), Fault> {
        let mem = &self.shared.mem;
        let res = match width {
            1 => mem.write_u8(pa, value as u8),
            2 => mem.write_u16(pa, value as u16),
            4 => mem.write_u32(pa, value as u32),
            _ => mem.write_u64(pa, value),
        };
        res.map_err(|e| self.physical_fault(e, pa))?;
        self.shared.reservations.break_on_line(pa);
        Ok(())
    }

    // The core aligns before anything reaches the bus, so whatever the
    // backing store reports is a machine check.
    fn physical_fault(&self, _e: MemError, pa: u64) -> Fault {
        Fault::MachineCheck {
            reason: MchkReason::BusError,
            addr: pa,
        }
    }
}
