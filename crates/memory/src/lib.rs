//! Guest physical memory: the `MemoryBus` trait the CPU core translates
//! onto, plus the atomic RAM backing store shared by all CPU worker
//! threads.
//!
//! The bus is addressed purely by physical address. Natural-alignment
//! accesses at longword/quadword width are atomic with respect to every
//! other CPU; unaligned accesses are rejected with [`MemError::Unaligned`]
//! (the CPU core aligns or faults before the request reaches the bus).

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Status codes a physical-memory access can fail with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MemError {
    #[error("physical access violation")]
    AccessViolation,
    #[error("unaligned physical access")]
    Unaligned,
    #[error("translation miss reported by backing store")]
    TlbMiss,
    #[error("bus error (address out of range or device fault)")]
    BusError,
    #[error("illegal instruction fetch")]
    IllegalInstruction,
}

/// Physical-address bus consumed by the CPU core and the page walker.
///
/// All methods take `&self`: implementations are shared between CPU
/// threads and must provide their own interior atomicity.
pub trait MemoryBus: Send + Sync {
    fn read_u8(&self, paddr: u64) -> Result<u8, MemError>;
    fn read_u16(&self, paddr: u64) -> Result<u16, MemError>;
    fn read_u32(&self, paddr: u64) -> Result<u32, MemError>;
    fn read_u64(&self, paddr: u64) -> Result<u64, MemError>;

    fn write_u8(&self, paddr: u64, value: u8) -> Result<(), MemError>;
    fn write_u16(&self, paddr: u64, value: u16) -> Result<(), MemError>;
    fn write_u32(&self, paddr: u64, value: u32) -> Result<(), MemError>;
    fn write_u64(&self, paddr: u64, value: u64) -> Result<(), MemError>;

    /// Instruction-stream fetch. Identical to `read_u32` on plain RAM;
    /// kept separate so device-backed implementations can refuse
    /// execution from MMIO windows.
    fn read_inst32(&self, paddr: u64) -> Result<u32, MemError> {
        self.read_u32(paddr)
    }
}

/// Flat guest RAM backed by `AtomicU64` words.
///
/// Backing the store with 64-bit atomics gives every naturally aligned
/// sub-word access single-copy atomicity for free: a u8/u16/u32 read is a
/// relaxed load of the containing word plus a shift.
pub struct GuestRam {
    words: Box<[AtomicU64]>,
    size: u64,
}

impl GuestRam {
    /// Allocates `size` bytes of zeroed RAM (rounded up to 8 bytes).
    pub fn new(size: u64) -> GuestRam {
        let n = ((size + 7) / 8) as usize;
        let mut v = Vec::with_capacity(n);
        v.resize_with(n, || AtomicU64::new(0));
        GuestRam {
            words: v.into_boxed_slice(),
            size,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    fn word(&self, paddr: u64) -> Result<&AtomicU64, MemError> {
        self.words
            .get((paddr / 8) as usize)
            .ok_or(MemError::BusError)
    }

    fn check(&self, paddr: u64, len: u64) -> Result<(), MemError> {
        if paddr % len != 0 {
            return Err(MemError::Unaligned);
        }
        if paddr + len > self.size {
            return Err(MemError::BusError);
        }
        Ok(())
    }

    /// Bulk byte store for bring-up (loading PAL images, test programs).
    /// Not atomic across words; callers run it before CPUs start.
    pub fn load_bytes(&self, paddr: u64, bytes: &[u8]) -> Result<(), MemError> {
        if paddr + bytes.len() as u64 > self.size {
            return Err(MemError::BusError);
        }
        for (i, b) in bytes.iter().copied().enumerate() {
            let addr = paddr + i as u64;
            let w = self.word(addr)?;
            let shift = (addr % 8) * 8;
            let mut cur = w.load(Ordering::Relaxed);
            loop {
                let next = (cur & !(0xFFu64 << shift)) | ((b as u64) << shift);
                match w.compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed) {
                    Ok(_) => break,
                    Err(v) => cur = v,
                }
            }
        }
        Ok(())
    }

    /// Bulk byte read for tests and debug dumps.
    pub fn read_bytes(&self, paddr: u64, len: usize) -> Result<Vec<u8>, MemError> {
        let mut out = Vec::with_capacity(len);
        for i in 0..len as u64 {
            out.push(self.read_u8(paddr + i)?);
        }
        Ok(out)
    }

    fn read_narrow(&self, paddr: u64, len: u64) -> Result<u64, MemError> {
        self.check(paddr, len)?;
        let w = self.word(paddr)?.load(Ordering::Acquire);
        let shift = (paddr % 8) * 8;
        let mask = if len == 8 { u64::MAX } else { (1u64 << (len * 8)) - 1 };
        Ok((w >> shift) & mask)
    }

    fn write_narrow(&self, paddr: u64, len: u64, value: u64) -> Result<(), MemError> {
        self.check(paddr, len)?;
        let w = self.word(paddr)?;
        if len == 8 {
            w.store(value, Ordering::Release);
            return Ok(());
        }
        let shift = (paddr % 8) * 8;
        let mask = ((1u64 << (len * 8)) - 1) << shift;
        let mut cur = w.load(Ordering::Relaxed);
        loop {
            let next = (cur & !mask) | ((value << shift) & mask);
            match w.compare_exchange_weak(cur, next, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => return Ok(()),
                Err(v) => cur = v,
            }
        }
    }
}

impl MemoryBus for GuestRam {
    fn read_u8(&self, paddr: u64) -> Result<u8, MemError> {
        Ok(self.read_narrow(paddr, 1)? as u8)
    }

    fn read_u16(&self, paddr: u64) -> Result<u16, MemError> {
        Ok(self.read_narrow(paddr, 2)? as u16)
    }

    fn read_u32(&self, paddr: u64) -> Result<u32, MemError> {
        Ok(self.read_narrow(paddr, 4)? as u32)
    }

    fn read_u64(&self, paddr: u64) -> Result<u64, MemError> {
        self.read_narrow(paddr, 8)
    }

    fn write_u8(&self, paddr: u64, value: u8) -> Result<(), MemError> {
        self.write_narrow(paddr, 1, value as u64)
    }

    fn write_u16(&self, paddr: u64, value: u16) -> Result<(), MemError> {
        self.write_narrow(paddr, 2, value as u64)
    }

    fn write_u32(&self, paddr: u64, value: u32) -> Result<(), MemError> {
        self.write_narrow(paddr, 4, value as u64)
    }

    fn write_u64(&self, paddr: u64, value: u64) -> Result<(), MemError> {
        self.write_narrow(paddr, 8, value)
    }
}
