//! Instruction grains: immutable per-opcode-variant descriptors.
//!
//! A grain carries everything the pipeline needs to route a decoded
//! instruction to an execute unit; the operation itself is a sum type so
//! unit dispatch is a `match` on [`Format`], not a pile of booleans.

use bitflags::bitflags;

/// Index of a grain in the [`crate::GrainRegistry`] array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GrainId(pub u16);

bitflags! {
    /// Semantic summary bits, copied into every decoded instruction so
    /// the hot path can test them without chasing the registry.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct GrainFlags: u16 {
        /// Control transfer (conditional or not).
        const BRANCH = 1 << 0;
        /// Touches guest memory.
        const MEMORY = 1 << 1;
        /// Load half of MEMORY.
        const LOAD = 1 << 2;
        /// Store half of MEMORY.
        const STORE = 1 << 3;
        /// Writes an integer destination register.
        const WRITES_INT = 1 << 4;
        /// Writes a floating-point destination register.
        const WRITES_FP = 1 << 5;
        /// Operate form may carry an 8-bit literal in place of Rb.
        const LIT_OK = 1 << 6;
        /// CALL_PAL.
        const CALL_PAL = 1 << 7;
        /// Signed-overflow trapping variant (`/V` suffix).
        const OVF_TRAP = 1 << 8;
        /// Reads or writes the FP register file (subject to FEN).
        const FP = 1 << 9;
        /// Only legal in PAL mode; OPCDEC otherwise.
        const PAL_ONLY = 1 << 10;
    }
}

/// Integer-unit operations (opcodes 0x08..0x13, 0x1C).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntOp {
    Lda,
    Ldah,
    Addl,
    Addlv,
    Addq,
    Addqv,
    Subl,
    Sublv,
    Subq,
    Subqv,
    S4addl,
    S4addq,
    S4subl,
    S4subq,
    S8addl,
    S8addq,
    S8subl,
    S8subq,
    Cmpbge,
    Cmpult,
    Cmpule,
    Cmpeq,
    Cmplt,
    Cmple,
    And,
    Bic,
    Bis,
    Ornot,
    Xor,
    Eqv,
    Cmovlbs,
    Cmovlbc,
    Cmoveq,
    Cmovne,
    Cmovlt,
    Cmovge,
    Cmovle,
    Cmovgt,
    Amask,
    Implver,
    Sll,
    Srl,
    Sra,
    Zap,
    Zapnot,
    Mskbl,
    Mskwl,
    Mskll,
    Mskql,
    Mskwh,
    Msklh,
    Mskqh,
    Extbl,
    Extwl,
    Extll,
    Extql,
    Extwh,
    Extlh,
    Extqh,
    Insbl,
    Inswl,
    Insll,
    Insql,
    Inswh,
    Inslh,
    Insqh,
    Mull,
    Mullv,
    Mulq,
    Mulqv,
    Umulh,
    Sextb,
    Sextw,
    Ctpop,
    Ctlz,
    Cttz,
    Perr,
    Pklb,
    Pkwb,
    Unpkbl,
    Unpkbw,
    Minub8,
    Minsb8,
    Minuw4,
    Minsw4,
    Maxub8,
    Maxsb8,
    Maxuw4,
    Maxsw4,
    Ftois,
    Ftoit,
}

/// Memory-unit operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemOp {
    Ldbu,
    Ldwu,
    Ldl,
    Ldq,
    LdqU,
    LdlL,
    LdqL,
    Stb,
    Stw,
    Stl,
    Stq,
    StqU,
    StlC,
    StqC,
    Ldf,
    Ldg,
    Lds,
    Ldt,
    Stf,
    Stg,
    Sts,
    Stt,
}

/// Conditional and unconditional displacement branches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrOp {
    Br,
    Bsr,
    Beq,
    Bne,
    Blt,
    Ble,
    Bgt,
    Bge,
    Blbc,
    Blbs,
    Fbeq,
    Fbne,
    Fblt,
    Fble,
    Fbgt,
    Fbge,
}

/// Jump-format transfer kinds (bits [15:14] of the word).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JmpKind {
    Jmp,
    Jsr,
    Ret,
    JsrCoroutine,
}

impl JmpKind {
    pub fn from_bits(bits: u8) -> JmpKind {
        match bits & 3 {
            0 => JmpKind::Jmp,
            1 => JmpKind::Jsr,
            2 => JmpKind::Ret,
            _ => JmpKind::JsrCoroutine,
        }
    }
}

/// Floating-point operations (opcodes 0x14..0x17).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FpOp {
    // IEEE single/double.
    Adds,
    Subs,
    Muls,
    Divs,
    Addt,
    Subt,
    Mult,
    Divt,
    Cmptun,
    Cmpteq,
    Cmptlt,
    Cmptle,
    Cvtts,
    Cvtst,
    Cvttq,
    Cvtqs,
    Cvtqt,
    // VAX F/G (plus the D-format conversions EV6 retains).
    Addf,
    Subf,
    Mulf,
    Divf,
    Addg,
    Subg,
    Mulg,
    Divg,
    Cmpgeq,
    Cmpglt,
    Cmpgle,
    Cvtgf,
    Cvtgd,
    Cvtdg,
    Cvtgq,
    Cvtqf,
    Cvtqg,
    // Data movement / FPCR access.
    Cvtlq,
    Cvtql,
    Cpys,
    Cpysn,
    Cpyse,
    MtFpcr,
    MfFpcr,
    Fcmoveq,
    Fcmovne,
    Fcmovlt,
    Fcmovge,
    Fcmovle,
    Fcmovgt,
    // Integer-to-FP transfers and square roots.
    Itofs,
    Itoff,
    Itoft,
    Sqrtf,
    Sqrtg,
    Sqrts,
    Sqrtt,
}

/// Miscellaneous opcode 0x18 functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MiscOp {
    Trapb,
    Excb,
    Mb,
    Wmb,
    Fetch,
    FetchM,
    Rpcc,
    Rc,
    Rs,
    Ecb,
    Wh64,
}

/// Instruction-format kind; drives execute-unit dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Operate(IntOp),
    FpOperate(FpOp),
    Memory(MemOp),
    Branch(BrOp),
    Jump(JmpKind),
    CallPal,
    Misc(MiscOp),
    HwLoad,
    HwStore,
    HwMfpr,
    HwMtpr,
    HwRet,
}

/// One immutable instruction descriptor. Many decoded instructions share
/// a single grain.
#[derive(Clone, Copy, Debug)]
pub struct Grain {
    pub mnemonic: &'static str,
    pub opcode: u8,
    /// Canonical function code under the registry key; 0 for formats
    /// whose opcode alone identifies the grain.
    pub func: u16,
    pub format: Format,
    pub flags: GrainFlags,
}
