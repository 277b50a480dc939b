#![allow(dead_code)] // each test binary uses a different helper subset

//! Shared fixture: a small system with flat guest RAM and one or more
//! cores, stepped deterministically.
//!
//! Cores start in PAL mode (instruction fetch is physical), which lets
//! tests place code at plain physical addresses. Data accesses still
//! translate; tests that want untranslated data go through the kseg
//! superpage window enabled here via M_CTL.

use std::sync::Arc;
use std::time::Duration;

use es40_cpu_core::core::{CpuCore, SystemShared};
use es40_cpu_core::{Outcome, PalVariant};
use es40_interrupts::{IpiBank, IrqRouter};
use es40_isa::GrainRegistry;
use es40_mmu::{PageSize, ReplacementPolicy, Tlb};
use es40_smp::{BarrierCoordinator, ReservationFile};
use memory::{GuestRam, MemoryBus};

pub const PAL_BASE: u64 = 0x1_0000;
pub const RAM_SIZE: u64 = 4 * 1024 * 1024;

/// Data-side superpage window: VA<47:46> = 10 maps identity to physical.
pub fn kseg(pa: u64) -> u64 {
    0x0000_8000_0000_0000 | pa
}

pub struct System {
    pub cores: Vec<CpuCore>,
    pub ram: Arc<GuestRam>,
    pub shared: Arc<SystemShared>,
}

pub fn system(cpu_count: usize) -> System {
    system_with(cpu_count, false, Duration::from_millis(50))
}

pub fn system_with(cpu_count: usize, hardware_tb_fill: bool, barrier_timeout: Duration) -> System {
    let ram = Arc::new(GuestRam::new(RAM_SIZE));
    let shared = Arc::new(SystemShared {
        mem: ram.clone(),
        registry: GrainRegistry::new(),
        router: IrqRouter::new(cpu_count),
        ipi: IpiBank::new(cpu_count),
        reservations: ReservationFile::new(cpu_count),
        barrier: BarrierCoordinator::new(barrier_timeout),
        cpu_count,
        pal_variant: PalVariant::Ev6,
        hardware_tb_fill,
        base_page: PageSize::Size8K,
        wake: Box::new(|_| {}),
    });
    let cores = (0..cpu_count)
        .map(|id| {
            let tlb = Arc::new(Tlb::new(ReplacementPolicy::Srrip, PageSize::Size8K));
            let mut core = CpuCore::new(id, shared.clone(), tlb);
            core.state.iprs.pal_base = PAL_BASE;
            // Open the kseg data window for tests that bypass paging.
            core.state.iprs.m_ctl = 0b100;
            core
        })
        .collect();
    System { cores, ram, shared }
}

impl System {
    pub fn load_words(&self, pa: u64, words: &[u32]) {
        for (i, w) in words.iter().enumerate() {
            self.ram.write_u32(pa + i as u64 * 4, *w).unwrap();
        }
    }

    pub fn step(&mut self, cpu: usize) -> Outcome {
        es40_cpu_core::step::step(&mut self.cores[cpu])
    }

    /// Steps until the CPU halts; panics if it does not within `max`.
    pub fn run_to_halt(&mut self, cpu: usize, max: usize) {
        for _ in 0..max {
            if self.cores[cpu].state.halted {
                return;
            }
            self.step(cpu);
        }
        panic!(
            "cpu{cpu} did not halt; pc={:#x} pal={}",
            self.cores[cpu].state.pc(),
            self.cores[cpu].state.pal_mode
        );
    }
}
