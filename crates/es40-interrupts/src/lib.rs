//! Cross-CPU interrupt fabric: the IRQ router (per-CPU pending-level
//! bitmask with a latched source/vector per level) and the IPI mailboxes
//! (one 64-bit slot per CPU, latest post wins).

pub mod ipi;
pub mod router;

pub use ipi::{IpiBank, IpiCommand};
pub use router::{IrqClaim, IrqRouter};
