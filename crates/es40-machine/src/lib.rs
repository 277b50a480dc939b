//! The system coordinator: machine construction, SMP topology, CPU
//! worker threads, and the external interfaces (interrupt posting, TLB
//! shootdown requests, physical-memory access for bring-up).

pub mod config;
pub mod machine;

pub use config::{ConfigError, MachineConfig};
pub use machine::{Machine, MachineError};
