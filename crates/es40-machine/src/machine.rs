//! The machine: guest RAM, the shared SMP fabric, and one CPU core per
//! configured processor.
//!
//! Two execution styles share one state model. Deterministic stepping
//! (`step_cpu`) drives cores directly and is what the test suites use
//! for exact interleavings. `start` moves each core onto its own worker
//! thread; `stop` joins the workers and hands the cores back.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use es40_cpu_core::core::SystemShared;
use es40_cpu_core::fault::{EventPayload, ExcClass, PendingEvent, Priority};
use es40_cpu_core::{step, CpuCore, Effects, Outcome};
use es40_interrupts::{IpiBank, IpiCommand, IrqRouter};
use es40_isa::GrainRegistry;
use es40_mmu::Tlb;
use es40_smp::{BarrierCoordinator, ReservationFile};
use es40_types::{CpuId, Ipl, Mode};
use memory::{GuestRam, MemError, MemoryBus};
use thiserror::Error;

use crate::config::MachineConfig;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error("cpu {0} does not exist")]
    NoSuchCpu(CpuId),
    #[error("cpu {0} is running on a worker thread")]
    CpuRunning(CpuId),
    #[error("cpus did not halt within {0:?}")]
    HaltTimeout(Duration),
    #[error(transparent)]
    Mem(#[from] MemError),
}

const CMD_RUN: u8 = 0;
const CMD_PAUSE: u8 = 1;
const CMD_STOP: u8 = 2;

struct CpuControl {
    cmd: AtomicU8,
    halted: AtomicBool,
    lock: Mutex<()>,
    cv: Condvar,
}

impl CpuControl {
    fn new() -> CpuControl {
        CpuControl {
            cmd: AtomicU8::new(CMD_RUN),
            halted: AtomicBool::new(false),
            lock: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    fn notify(&self) {
        let _g = self.lock.lock().unwrap();
        self.cv.notify_all();
    }

    /// Brief interruptible nap; woken early by IPI posts and command
    /// changes.
    fn nap(&self, d: Duration) {
        let g = self.lock.lock().unwrap();
        let _ = self.cv.wait_timeout(g, d).unwrap();
    }
}

pub struct Machine {
    cfg: MachineConfig,
    shared: Arc<SystemShared>,
    ram: Arc<GuestRam>,
    tlbs: Vec<Arc<Tlb>>,
    cores: Vec<Option<CpuCore>>,
    workers: Vec<Option<JoinHandle<CpuCore>>>,
    controls: Arc<Vec<CpuControl>>,
}

impl Machine {
    pub fn new(cfg: MachineConfig) -> Machine {
        let ram = Arc::new(GuestRam::new(cfg.mem_size));
        let controls: Arc<Vec<CpuControl>> =
            Arc::new((0..cfg.cpu_count).map(|_| CpuControl::new()).collect());

        let wake = {
            let controls = Arc::clone(&controls);
            Box::new(move |cpu: CpuId| controls[cpu].notify())
        };

        let shared = Arc::new(SystemShared {
            mem: ram.clone(),
            registry: GrainRegistry::new(),
            router: IrqRouter::new(cfg.cpu_count),
            ipi: IpiBank::new(cfg.cpu_count),
            reservations: ReservationFile::new(cfg.cpu_count),
            barrier: BarrierCoordinator::new(cfg.barrier_timeout),
            cpu_count: cfg.cpu_count,
            pal_variant: cfg.pal_variant,
            hardware_tb_fill: cfg.hardware_tb_fill,
            base_page: cfg.page_size,
            wake,
        });

        let tlbs: Vec<Arc<Tlb>> = (0..cfg.cpu_count)
            .map(|_| Arc::new(Tlb::new(cfg.replacement, cfg.page_size)))
            .collect();

        let cores = (0..cfg.cpu_count)
            .map(|id| {
                let mut core = CpuCore::new(id, shared.clone(), tlbs[id].clone());
                core.state.iprs.pal_base = cfg.pal_base;
                core.state.jump_tagged(cfg.initial_pc);
                Some(core)
            })
            .collect();

        let workers = (0..cfg.cpu_count).map(|_| None).collect();

        Machine {
            cfg,
            shared,
            ram,
            tlbs,
            cores,
            workers,
            controls,
        }
    }

    pub fn from_ini_str(text: &str) -> Result<Machine, MachineError> {
        Ok(Machine::new(MachineConfig::from_ini_str(text)?))
    }

    pub fn config(&self) -> &MachineConfig {
        &self.cfg
    }

    pub fn cpu_count(&self) -> usize {
        self.cfg.cpu_count
    }

    pub fn ram(&self) -> &GuestRam {
        &self.ram
    }

    pub fn load_physical_bytes(&self, pa: u64, bytes: &[u8]) -> Result<(), MachineError> {
        Ok(self.ram.load_bytes(pa, bytes)?)
    }

    pub fn read_physical_bytes(&self, pa: u64, len: usize) -> Result<Vec<u8>, MachineError> {
        Ok(self.ram.read_bytes(pa, len)?)
    }

    /// Loads a sequence of instruction words at `pa`.
    pub fn load_program(&self, pa: u64, words: &[u32]) -> Result<(), MachineError> {
        for (i, w) in words.iter().enumerate() {
            self.ram.write_u32(pa + i as u64 * 4, *w)?;
        }
        Ok(())
    }

    // --- deterministic stepping -------------------------------------

    pub fn core(&self, cpu: CpuId) -> Result<&CpuCore, MachineError> {
        self.cores
            .get(cpu)
            .ok_or(MachineError::NoSuchCpu(cpu))?
            .as_ref()
            .ok_or(MachineError::CpuRunning(cpu))
    }

    pub fn core_mut(&mut self, cpu: CpuId) -> Result<&mut CpuCore, MachineError> {
        self.cores
            .get_mut(cpu)
            .ok_or(MachineError::NoSuchCpu(cpu))?
            .as_mut()
            .ok_or(MachineError::CpuRunning(cpu))
    }

    /// Executes one architectural step on `cpu`.
    pub fn step_cpu(&mut self, cpu: CpuId) -> Result<Outcome, MachineError> {
        let core = self.core_mut(cpu)?;
        Ok(step::step(core))
    }

    /// Steps `cpu` until it halts or `max_steps` is exhausted.
    pub fn run_cpu_to_halt(&mut self, cpu: CpuId, max_steps: usize) -> Result<(), MachineError> {
        for _ in 0..max_steps {
            let out = self.step_cpu(cpu)?;
            if out.effects.contains(Effects::HALT) {
                return Ok(());
            }
        }
        Err(MachineError::HaltTimeout(Duration::ZERO))
    }

    // --- threaded execution -----------------------------------------

    /// Moves every core onto its own worker thread.
    pub fn start(&mut self) {
        for id in 0..self.cfg.cpu_count {
            if self.workers[id].is_some() {
                continue;
            }
            let mut core = match self.cores[id].take() {
                Some(c) => c,
                None => continue,
            };
            let controls = Arc::clone(&self.controls);
            self.controls[id].cmd.store(CMD_RUN, Ordering::Release);
            let handle = std::thread::Builder::new()
                .name(format!("cpu{id}"))
                .spawn(move || {
                    tracing::debug!(cpu = id, "worker started");
                    let control = &controls[id];
                    loop {
                        match control.cmd.load(Ordering::Acquire) {
                            CMD_STOP => {
                                // A stopping CPU still owes its barrier
                                // acknowledgement or the initiator
                                // machine-checks on timeout.
                                if core.shared.barrier.needs_ack_from(id) {
                                    core.shared.barrier.acknowledge(id);
                                }
                                break;
                            }
                            CMD_PAUSE => control.nap(Duration::from_millis(1)),
                            _ => {
                                let out = step::step(&mut core);
                                control
                                    .halted
                                    .store(core.state.halted, Ordering::Release);
                                if out.effects.contains(Effects::HALT) {
                                    // Parked until an IPI or interrupt
                                    // post wakes us to rescan.
                                    control.nap(Duration::from_millis(1));
                                }
                            }
                        }
                    }
                    tracing::debug!(cpu = id, halt_code = core.state.halt_code, "worker stopped");
                    core
                })
                .expect("spawn cpu worker");
            self.workers[id] = Some(handle);
        }
    }

    /// Stops the workers at an instruction boundary and reclaims the
    /// cores.
    pub fn stop(&mut self) {
        for id in 0..self.cfg.cpu_count {
            if self.workers[id].is_some() {
                self.controls[id].cmd.store(CMD_STOP, Ordering::Release);
                self.controls[id].notify();
            }
        }
        for id in 0..self.cfg.cpu_count {
            if let Some(handle) = self.workers[id].take() {
                let core = handle.join().expect("cpu worker panicked");
                self.cores[id] = Some(core);
            }
        }
    }

    /// Pauses a running CPU; it parks at the next instruction boundary.
    pub fn pause(&self, cpu: CpuId) {
        self.controls[cpu].cmd.store(CMD_PAUSE, Ordering::Release);
        self.controls[cpu].notify();
    }

    pub fn resume(&self, cpu: CpuId) {
        self.controls[cpu].cmd.store(CMD_RUN, Ordering::Release);
        self.controls[cpu].notify();
    }

    pub fn is_halted(&self, cpu: CpuId) -> bool {
        match &self.cores[cpu] {
            Some(core) => core.state.halted,
            None => self.controls[cpu].halted.load(Ordering::Acquire),
        }
    }

    /// Blocks until every CPU reports halted, or the deadline passes.
    pub fn wait_all_halted(&self, timeout: Duration) -> Result<(), MachineError> {
        let deadline = Instant::now() + timeout;
        loop {
            if (0..self.cfg.cpu_count).all(|id| self.is_halted(id)) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(MachineError::HaltTimeout(timeout));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    // --- external interfaces ----------------------------------------

    /// Device-side interrupt delivery.
    pub fn post_external_interrupt(&self, cpu: CpuId, source: u32, ipl: Ipl, vector: u32) {
        self.shared.router.post(cpu, source, ipl, vector);
        self.controls[cpu].notify();
    }

    /// Applies a TLB maintenance command on `source_cpu` and broadcasts
    /// it to every peer as a shootdown IPI.
    pub fn request_tlb_shootdown(&self, source_cpu: CpuId, cmd: IpiCommand) {
        apply_tlb_command(&self.tlbs[source_cpu], cmd);
        for peer in 0..self.cfg.cpu_count {
            if peer != source_cpu {
                self.shared.ipi.post(peer, cmd);
                self.controls[peer].notify();
            }
        }
    }

    /// External mutator reported guest code modification over a PC
    /// range; the CPU's cached decodes for it must die.
    pub fn report_code_modification(
        &mut self,
        cpu: CpuId,
        lo: u64,
        hi: u64,
    ) -> Result<(), MachineError> {
        self.core_mut(cpu)?.caches.invalidate_va_range(lo, hi);
        Ok(())
    }

    pub fn post_ipi(&self, target: CpuId, cmd: IpiCommand) {
        self.shared.ipi.post(target, cmd);
        self.controls[target].notify();
    }

    /// Queues a reset event on every CPU: highest priority, clears
    /// pipelines, re-vectors to the RESET PAL entry.
    pub fn reset(&mut self) -> Result<(), MachineError> {
        for cpu in 0..self.cfg.cpu_count {
            let core = self.core_mut(cpu)?;
            core.state.halted = false;
            let ev = PendingEvent {
                class: ExcClass::Reset,
                priority: Priority::Reset,
                pc: core.state.pc(),
                va: 0,
                asn: core.state.asn,
                mode: Mode::Kernel,
                payload: EventPayload::None,
            };
            core.fault.set_pending(ev);
        }
        Ok(())
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn apply_tlb_command(tlb: &Tlb, cmd: IpiCommand) {
    use es40_types::Realm;
    match cmd {
        IpiCommand::TlbInvalidateAll => tlb.invalidate_all(None),
        IpiCommand::TlbInvalidateAsn { asn } => tlb.invalidate_asn(asn),
        IpiCommand::TlbInvalidateVaBoth { va, asn } => tlb.invalidate_va(None, va, asn),
        IpiCommand::TlbInvalidateVaItb { va, asn } => {
            tlb.invalidate_va(Some(Realm::Instruction), va, asn)
        }
        IpiCommand::TlbInvalidateVaDtb { va, asn } => {
            tlb.invalidate_va(Some(Realm::Data), va, asn)
        }
        _ => {}
    }
}
