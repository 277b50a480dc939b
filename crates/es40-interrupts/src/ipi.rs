//! Inter-processor interrupts.
//!
//! One 64-bit mailbox slot per CPU; a new post overwrites whatever was
//! there (single latest IPI wins). Commands embed their full parameters
//! in the word, so overwriting can never alias two different shootdown
//! targets into one.
//!
//! Word layout: low 8 bits command code, upper 56 bits payload.

use std::sync::atomic::{AtomicU64, Ordering};

use es40_types::CpuId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpiCommand {
    TlbInvalidateAll,
    TlbInvalidateAsn { asn: u8 },
    TlbInvalidateVaBoth { va: u64, asn: u8 },
    TlbInvalidateVaItb { va: u64, asn: u8 },
    TlbInvalidateVaDtb { va: u64, asn: u8 },
    CacheInvalidateLine { pa: u64 },
    CacheFlushLine { pa: u64 },
    CacheEvictLine { pa: u64 },
    MemoryBarrierFull,
    MemoryBarrierWrite,
    HaltCpu,
    WakeCpu,
    ContextSwitch,
}

const CMD_TLB_INV_ALL: u64 = 0x01;
const CMD_TLB_INV_ASN: u64 = 0x02;
const CMD_TLB_INV_VA_BOTH: u64 = 0x03;
const CMD_TLB_INV_VA_ITB: u64 = 0x04;
const CMD_TLB_INV_VA_DTB: u64 = 0x05;
const CMD_CACHE_INV_LINE: u64 = 0x06;
const CMD_CACHE_FLUSH_LINE: u64 = 0x07;
const CMD_CACHE_EVICT_LINE: u64 = 0x08;
const CMD_MB_FULL: u64 = 0x09;
const CMD_MB_WRITE: u64 = 0x0A;
const CMD_HALT: u64 = 0x0B;
const CMD_WAKE: u64 = 0x0C;
const CMD_CTX_SWITCH: u64 = 0x0D;

impl IpiCommand {
    /// VA payloads carry the 4K-aligned page bits plus the ASN, which is
    /// enough for a shootdown at any granularity class.
    pub fn encode(self) -> u64 {
        fn va_asn(cmd: u64, va: u64, asn: u8) -> u64 {
            cmd | (((va >> 12) << 8 | asn as u64) << 8)
        }
        fn line(cmd: u64, pa: u64) -> u64 {
            cmd | ((pa >> 6) << 8)
        }
        match self {
            IpiCommand::TlbInvalidateAll => CMD_TLB_INV_ALL,
            IpiCommand::TlbInvalidateAsn { asn } => CMD_TLB_INV_ASN | ((asn as u64) << 8),
            IpiCommand::TlbInvalidateVaBoth { va, asn } => va_asn(CMD_TLB_INV_VA_BOTH, va, asn),
            IpiCommand::TlbInvalidateVaItb { va, asn } => va_asn(CMD_TLB_INV_VA_ITB, va, asn),
            IpiCommand::TlbInvalidateVaDtb { va, asn } => va_asn(CMD_TLB_INV_VA_DTB, va, asn),
            IpiCommand::CacheInvalidateLine { pa } => line(CMD_CACHE_INV_LINE, pa),
            IpiCommand::CacheFlushLine { pa } => line(CMD_CACHE_FLUSH_LINE, pa),
            IpiCommand::CacheEvictLine { pa } => line(CMD_CACHE_EVICT_LINE, pa),
            IpiCommand::MemoryBarrierFull => CMD_MB_FULL,
            IpiCommand::MemoryBarrierWrite => CMD_MB_WRITE,
            IpiCommand::HaltCpu => CMD_HALT,
            IpiCommand::WakeCpu => CMD_WAKE,
            IpiCommand::ContextSwitch => CMD_CTX_SWITCH,
        }
    }

    pub fn decode(word: u64) -> Option<IpiCommand> {
        let payload = word >> 8;
        let va = |p: u64| (p >> 8) << 12;
        let asn = |p: u64| p as u8;
        Some(match word & 0xFF {
            CMD_TLB_INV_ALL => IpiCommand::TlbInvalidateAll,
            CMD_TLB_INV_ASN => IpiCommand::TlbInvalidateAsn {
                asn: payload as u8,
            },
            CMD_TLB_INV_VA_BOTH => IpiCommand::TlbInvalidateVaBoth {
                va: va(payload),
                asn: asn(payload),
            },
            CMD_TLB_INV_VA_ITB => IpiCommand::TlbInvalidateVaItb {
                va: va(payload),
                asn: asn(payload),
            },
            CMD_TLB_INV_VA_DTB => IpiCommand::TlbInvalidateVaDtb {
                va: va(payload),
                asn: asn(payload),
            },
            CMD_CACHE_INV_LINE => IpiCommand::CacheInvalidateLine { pa: payload << 6 },
            CMD_CACHE_FLUSH_LINE => IpiCommand::CacheFlushLine { pa: payload << 6 },
            CMD_CACHE_EVICT_LINE => IpiCommand::CacheEvictLine { pa: payload << 6 },
            CMD_MB_FULL => IpiCommand::MemoryBarrierFull,
            CMD_MB_WRITE => IpiCommand::MemoryBarrierWrite,
            CMD_HALT => IpiCommand::HaltCpu,
            CMD_WAKE => IpiCommand::WakeCpu,
            CMD_CTX_SWITCH => IpiCommand::ContextSwitch,
            _ => return None,
        })
    }
}

pub struct IpiBank {
    slots: Vec<AtomicU64>,
}

impl IpiBank {
    pub fn new(cpu_count: usize) -> IpiBank {
        IpiBank {
            slots: (0..cpu_count).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Posts to `target`'s mailbox, overwriting any undelivered IPI.
    pub fn post(&self, target: CpuId, cmd: IpiCommand) {
        self.slots[target].store(cmd.encode(), Ordering::Release);
    }

    /// Atomically drains the mailbox.
    pub fn fetch(&self, target: CpuId) -> Option<IpiCommand> {
        match self.slots[target].swap(0, Ordering::AcqRel) {
            0 => None,
            w => IpiCommand::decode(w),
        }
    }

    /// Non-destructive look, for wakeup checks.
    pub fn peek(&self, target: CpuId) -> Option<IpiCommand> {
        match self.slots[target].load(Ordering::Acquire) {
            0 => None,
            w => IpiCommand::decode(w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_round_trip() {
        let cases = [
            IpiCommand::TlbInvalidateAll,
            IpiCommand::TlbInvalidateAsn { asn: 0x7F },
            IpiCommand::TlbInvalidateVaBoth {
                va: 0x0000_7FFF_FFFF_E000,
                asn: 3,
            },
            IpiCommand::TlbInvalidateVaItb { va: 0x2000, asn: 0 },
            IpiCommand::TlbInvalidateVaDtb {
                va: 0x4_5000_1000,
                asn: 255,
            },
            IpiCommand::CacheInvalidateLine { pa: 0x1_0040 },
            IpiCommand::CacheFlushLine { pa: 0xFFC0 },
            IpiCommand::CacheEvictLine { pa: 0 },
            IpiCommand::MemoryBarrierFull,
            IpiCommand::MemoryBarrierWrite,
            IpiCommand::HaltCpu,
            IpiCommand::WakeCpu,
            IpiCommand::ContextSwitch,
        ];
        for c in cases {
            assert_eq!(IpiCommand::decode(c.encode()), Some(c), "{c:?}");
            assert_ne!(c.encode(), 0, "{c:?} must not encode as empty-mailbox");
        }
    }

    #[test]
    fn mailbox_latest_wins() {
        let bank = IpiBank::new(2);
        bank.post(1, IpiCommand::TlbInvalidateAll);
        bank.post(1, IpiCommand::WakeCpu);
        assert_eq!(bank.peek(1), Some(IpiCommand::WakeCpu));
        assert_eq!(bank.fetch(1), Some(IpiCommand::WakeCpu));
        assert_eq!(bank.fetch(1), None);
    }
}
