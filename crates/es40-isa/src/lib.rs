//! Alpha AXP instruction set: raw-word field extraction, the grain
//! registry (one immutable descriptor per opcode variant), and the
//! decoded-instruction record the pipeline passes between stages.
//!
//! Grains are flyweights: a `DecodedInstruction` refers to its grain by
//! [`GrainId`] (an index into the registry array), never by pointer, so
//! decoded instructions stay `Copy` and cache-friendly.

pub mod decoded;
pub mod encode;
pub mod grain;
pub mod registry;
pub mod word;

pub use decoded::DecodedInstruction;
pub use grain::{BrOp, Format, FpOp, Grain, GrainFlags, GrainId, IntOp, JmpKind, MemOp, MiscOp};
pub use registry::GrainRegistry;
