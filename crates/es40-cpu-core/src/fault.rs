//! The fault taxonomy and the per-CPU pending-event slot.
//!
//! Architectural faults are plain `Copy` data, not `Error` types: they
//! flow from the execute units to the PAL dispatcher through
//! `Result<_, Fault>` and carry exactly the payload PAL argument
//! packaging needs.

use es40_types::{Access, Ipl, Mode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MchkReason {
    BusError,
    BarrierTimeout,
    IpiTimeout,
    DoubleFault,
}

impl MchkReason {
    pub fn code(self) -> u64 {
        match self {
            MchkReason::BusError => 0x01,
            MchkReason::BarrierTimeout => 0x02,
            MchkReason::IpiTimeout => 0x03,
            MchkReason::DoubleFault => 0x04,
        }
    }
}

/// Synchronous fault raised while processing one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    ItbMiss { va: u64 },
    ItbAcv { va: u64 },
    DtbMissSingle { va: u64, access: Access },
    DtbMissDouble { va: u64, access: Access },
    DtbAcv { va: u64, access: Access },
    FaultOn { va: u64, access: Access },
    Unalign { va: u64, access: Access },
    Opcdec,
    Fen,
    Arith { exc_sum: u64 },
    MachineCheck { reason: MchkReason, addr: u64 },
}

/// EV6 exception class, the key into the PAL vector table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExcClass {
    Reset,
    MachineCheck,
    Arith,
    Interrupt,
    DtbMissSingle,
    DtbMissDouble,
    ItbMiss,
    ItbAcv,
    DtbAcv,
    FaultOnRead,
    FaultOnWrite,
    FaultOnExecute,
    Unalign,
    Opcdec,
    Fen,
    CallPal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Normal,
    Critical,
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventPayload {
    None,
    PalFunc(u32),
    Interrupt {
        source: u32,
        ipl: Ipl,
        vector: u32,
    },
    Ast {
        mode: Mode,
    },
    Arith {
        exc_sum: u64,
    },
    MemFault {
        access: Access,
        is_write: bool,
    },
    Mchk {
        reason: MchkReason,
        addr: u64,
    },
}

/// A fault, trap, or interrupt awaiting delivery to PAL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingEvent {
    pub class: ExcClass,
    pub priority: Priority,
    /// Return PC to save (faulting PC for restartable faults, next PC
    /// for CALL_PAL).
    pub pc: u64,
    /// Faulting VA where meaningful.
    pub va: u64,
    pub asn: u8,
    pub mode: Mode,
    pub payload: EventPayload,
}

impl PendingEvent {
    /// Builds an event from a synchronous fault; `pc` is the faulting
    /// instruction's VA.
    pub fn from_fault(fault: Fault, pc: u64, asn: u8, mode: Mode) -> PendingEvent {
        let (class, va, priority, payload) = match fault {
            Fault::ItbMiss { va } => (ExcClass::ItbMiss, va, Priority::Normal, EventPayload::None),
            Fault::ItbAcv { va } => (ExcClass::ItbAcv, va, Priority::Normal, EventPayload::None),
            Fault::DtbMissSingle { va, access } => (
                ExcClass::DtbMissSingle,
                va,
                Priority::Normal,
                EventPayload::MemFault {
                    access,
                    is_write: access == Access::Write,
                },
            ),
            Fault::DtbMissDouble { va, access } => (
                ExcClass::DtbMissDouble,
                va,
                Priority::Normal,
                EventPayload::MemFault {
                    access,
                    is_write: access == Access::Write,
                },
            ),
            Fault::DtbAcv { va, access } => (
                ExcClass::DtbAcv,
                va,
                Priority::Normal,
                EventPayload::MemFault {
                    access,
                    is_write: access == Access::Write,
                },
            ),
            Fault::FaultOn { va, access } => {
                let class = match access {
                    Access::Read => ExcClass::FaultOnRead,
                    Access::Write => ExcClass::FaultOnWrite,
                    Access::Execute => ExcClass::FaultOnExecute,
                };
                (
                    class,
                    va,
                    Priority::Normal,
                    EventPayload::MemFault {
                        access,
                        is_write: access == Access::Write,
                    },
                )
            }
            Fault::Unalign { va, access } => (
                ExcClass::Unalign,
                va,
                Priority::Normal,
                EventPayload::MemFault {
                    access,
                    is_write: access == Access::Write,
                },
            ),
            Fault::Opcdec => (ExcClass::Opcdec, 0, Priority::Normal, EventPayload::None),
            Fault::Fen => (ExcClass::Fen, 0, Priority::Normal, EventPayload::None),
            Fault::Arith { exc_sum } => (
                ExcClass::Arith,
                0,
                Priority::Normal,
                EventPayload::Arith { exc_sum },
            ),
            Fault::MachineCheck { reason, addr } => (
                ExcClass::MachineCheck,
                addr,
                Priority::Critical,
                EventPayload::Mchk { reason, addr },
            ),
        };
        PendingEvent {
            class,
            priority,
            pc,
            va,
            asn,
            mode,
            payload,
        }
    }
}

/// Per-CPU single-slot event holder. Owned exclusively by the CPU's
/// thread; higher-priority events supersede a resident lower-priority
/// one rather than queueing behind it.
pub struct FaultSlot {
    slot: Option<PendingEvent>,
}

impl FaultSlot {
    pub fn new() -> FaultSlot {
        FaultSlot { slot: None }
    }

    /// Hot-path check, one load.
    pub fn event_pending(&self) -> bool {
        self.slot.is_some()
    }

    pub fn has_arithmetic(&self) -> bool {
        matches!(
            self.slot,
            Some(PendingEvent {
                class: ExcClass::Arith,
                ..
            })
        )
    }

    pub fn set_pending(&mut self, ev: PendingEvent) {
        match &self.slot {
            Some(cur) if cur.priority >= ev.priority => {}
            _ => self.slot = Some(ev),
        }
    }

    pub fn take(&mut self) -> Option<PendingEvent> {
        self.slot.take()
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}

impl Default for FaultSlot {
    fn default() -> Self {
        FaultSlot::new()
    }
}
