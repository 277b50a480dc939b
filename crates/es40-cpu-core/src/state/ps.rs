//! Processor status: current mode and IPL, packed the way PAL entry
//! saves it (`cm` in bits [1:0], `ipl` in bits [12:8]).

use es40_types::{Ipl, Mode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcStatus {
    pub cm: Mode,
    pub ipl: Ipl,
}

impl ProcStatus {
    pub fn to_bits(self) -> u64 {
        (self.cm.bits() as u64) | ((self.ipl as u64 & 0x1F) << 8)
    }

    pub fn from_bits(bits: u64) -> ProcStatus {
        ProcStatus {
            cm: Mode::from_bits(bits as u8),
            ipl: ((bits >> 8) & 0x1F) as Ipl,
        }
    }
}
