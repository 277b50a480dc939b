//! In-memory page-table entry format.
//!
//! ```text
//! 63                    32 31          16 15        8 7 6 5 4 3 2 1 0
//! +-----------------------+--------------+-----------+---+---+-+-+-+-+
//! |          PFN          |   software   | UWE..KWE  |GH |rsv|A|F|F|F|V
//! |                       |              | URE..KRE  |   |   |S|O|O|O|
//! |                       |              |           |   |   |M|E|W|R|
//! +-----------------------+--------------+-----------+---+---+-+-+-+-+
//! ```

use bitflags::bitflags;
use es40_types::{Access, Mode};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PteBits: u64 {
        const VALID = 1 << 0;
        const FOR = 1 << 1;
        const FOW = 1 << 2;
        const FOE = 1 << 3;
        /// Address-space match: entry ignores ASN (global).
        const ASM = 1 << 4;
        const KRE = 1 << 8;
        const ERE = 1 << 9;
        const SRE = 1 << 10;
        const URE = 1 << 11;
        const KWE = 1 << 12;
        const EWE = 1 << 13;
        const SWE = 1 << 14;
        const UWE = 1 << 15;
    }
}

/// Page size classes probed by the TLB (granularity hint classes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PageSize {
    Size4K,
    Size8K,
    Size64K,
    Size512K,
}

impl PageSize {
    pub const ALL: [PageSize; 4] = [
        PageSize::Size8K,
        PageSize::Size4K,
        PageSize::Size64K,
        PageSize::Size512K,
    ];

    pub fn shift(self) -> u32 {
        match self {
            PageSize::Size4K => 12,
            PageSize::Size8K => 13,
            PageSize::Size64K => 16,
            PageSize::Size512K => 19,
        }
    }

    pub fn bytes(self) -> u64 {
        1 << self.shift()
    }

    pub fn index(self) -> usize {
        match self {
            PageSize::Size4K => 0,
            PageSize::Size8K => 1,
            PageSize::Size64K => 2,
            PageSize::Size512K => 3,
        }
    }

    /// Maps a PTE granularity-hint field onto a class, relative to the
    /// configured base page size. GH steps are 8x each on Alpha; the
    /// class ladder here is the subset the ES40 platform uses.
    pub fn from_gh(base: PageSize, gh: u8) -> PageSize {
        let ladder = [
            PageSize::Size4K,
            PageSize::Size8K,
            PageSize::Size64K,
            PageSize::Size512K,
        ];
        let start = ladder.iter().position(|p| *p == base).unwrap_or(1);
        ladder[(start + gh as usize).min(3)]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pte(pub u64);

impl Pte {
    pub fn valid(self) -> bool {
        self.0 & PteBits::VALID.bits() != 0
    }

    pub fn pfn(self) -> u64 {
        (self.0 >> 32) & 0x1F_FFFF
    }

    pub fn gh(self) -> u8 {
        ((self.0 >> 5) & 3) as u8
    }

    pub fn global(self) -> bool {
        self.0 & PteBits::ASM.bits() != 0
    }

    pub fn bits(self) -> PteBits {
        PteBits::from_bits_truncate(self.0)
    }

    /// Fault-on bit for the given access kind.
    pub fn fault_on(self, access: Access) -> bool {
        let bit = match access {
            Access::Read => PteBits::FOR,
            Access::Write => PteBits::FOW,
            Access::Execute => PteBits::FOE,
        };
        self.0 & bit.bits() != 0
    }

    /// Permission check for `(mode, access)`. Execute permission rides
    /// the read-enable bits; the I-stream realm is what distinguishes it.
    pub fn allows(self, mode: Mode, access: Access) -> bool {
        let base = match access {
            Access::Read | Access::Execute => 8,
            Access::Write => 12,
        };
        self.0 & (1u64 << (base + mode.bits() as u64)) != 0
    }

    /// Builds a PTE from parts; test and PAL-stub convenience.
    pub fn compose(pfn: u64, bits: PteBits) -> Pte {
        Pte(((pfn & 0x1F_FFFF) << 32) | bits.bits())
    }
}
