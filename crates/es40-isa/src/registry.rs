//! The grain registry: a static table of instruction descriptors keyed by
//! `(opcode, canonical function code)`.
//!
//! Function-code extraction depends on the opcode family; FP function
//! fields additionally strip rounding/trap qualifier bits so that all
//! qualified encodings of one operation (`ADDT`, `ADDT/C`, `ADDT/SUI`, …)
//! resolve to the same grain. The decoded instruction keeps the raw
//! 11-bit field for the FP unit to honor the qualifiers.

use std::collections::HashMap;

use crate::grain::{BrOp, Format, FpOp, Grain, GrainFlags, GrainId, IntOp, JmpKind, MemOp, MiscOp};
use crate::word;

pub struct GrainRegistry {
    grains: Vec<Grain>,
    index: HashMap<(u8, u16), GrainId>,
}

/// Sentinel key for CVTST, which shares its low function bits with CVTTS
/// and is distinguished only by the trap-qualifier field.
const KEY_CVTST: u16 = 0x100 | 0x2C;

impl GrainRegistry {
    pub fn new() -> GrainRegistry {
        let grains = build_table();
        let mut index = HashMap::with_capacity(grains.len());
        for (i, g) in grains.iter().enumerate() {
            let prev = index.insert((g.opcode, g.func), GrainId(i as u16));
            debug_assert!(prev.is_none(), "duplicate grain key for {}", g.mnemonic);
        }
        GrainRegistry { grains, index }
    }

    pub fn len(&self) -> usize {
        self.grains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grains.is_empty()
    }

    pub fn grain(&self, id: GrainId) -> &Grain {
        &self.grains[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (GrainId, &Grain)> {
        self.grains
            .iter()
            .enumerate()
            .map(|(i, g)| (GrainId(i as u16), g))
    }

    /// Resolves a raw word to its grain, or `None` for an illegal opcode
    /// (the caller raises OPCDEC).
    pub fn resolve(&self, raw: u32) -> Option<GrainId> {
        let opcode = word::opcode(raw);
        let key = canonical_key(opcode, raw)?;
        self.index.get(&(opcode, key)).copied()
    }
}

impl Default for GrainRegistry {
    fn default() -> Self {
        GrainRegistry::new()
    }
}

/// Computes the registry key for a raw word. `None` means the word can
/// never match a grain (reserved opcode).
pub fn canonical_key(opcode: u8, raw: u32) -> Option<u16> {
    Some(match opcode {
        0x10 | 0x11 | 0x12 | 0x13 | 0x1C => word::opr_func(raw) as u16,
        0x14 => word::fp_func(raw) & 0xFF,
        0x15 => word::fp_func(raw) & 0x3F,
        0x16 => {
            let fn11 = word::fp_func(raw);
            let low = fn11 & 0x3F;
            // CVTST reuses CVTTS's function bits under trap codes 2/6.
            if low == 0x2C && matches!(word::fp_trap_qualifier(fn11), 2 | 6) {
                KEY_CVTST
            } else {
                low
            }
        }
        0x17 => word::fp_func(raw) & 0x1FF,
        0x18 => word::mem_func(raw) & 0xFC00,
        0x1A => word::jmp_kind(raw) as u16,
        _ => 0,
    })
}

fn g(mnemonic: &'static str, opcode: u8, func: u16, format: Format, flags: GrainFlags) -> Grain {
    Grain {
        mnemonic,
        opcode,
        func,
        format,
        flags,
    }
}

fn build_table() -> Vec<Grain> {
    use Format as F;
    use GrainFlags as Fl;
    use IntOp as I;

    let wr = Fl::WRITES_INT;
    let wrl = Fl::WRITES_INT | Fl::LIT_OK;
    let wf = Fl::WRITES_FP | Fl::FP;
    let ld = Fl::MEMORY | Fl::LOAD | Fl::WRITES_INT;
    let st = Fl::MEMORY | Fl::STORE;
    let fld = Fl::MEMORY | Fl::LOAD | Fl::WRITES_FP | Fl::FP;
    let fst = Fl::MEMORY | Fl::STORE | Fl::FP;
    let br = Fl::BRANCH;
    let fbr = Fl::BRANCH | Fl::FP;

    let mut t = Vec::with_capacity(256);

    // CALL_PAL.
    t.push(g("CALL_PAL", 0x00, 0, F::CallPal, Fl::CALL_PAL));

    // Address calculation (memory format, integer unit).
    t.push(g("LDA", 0x08, 0, F::Operate(I::Lda), wr));
    t.push(g("LDAH", 0x09, 0, F::Operate(I::Ldah), wr));

    // Byte/word loads and stores (BWX).
    t.push(g("LDBU", 0x0A, 0, F::Memory(MemOp::Ldbu), ld));
    t.push(g("LDQ_U", 0x0B, 0, F::Memory(MemOp::LdqU), ld));
    t.push(g("LDWU", 0x0C, 0, F::Memory(MemOp::Ldwu), ld));
    t.push(g("STW", 0x0D, 0, F::Memory(MemOp::Stw), st));
    t.push(g("STB", 0x0E, 0, F::Memory(MemOp::Stb), st));
    t.push(g("STQ_U", 0x0F, 0, F::Memory(MemOp::StqU), st));

    // Opcode 0x10: add/subtract/compare.
    for (mn, fc, op, fl) in [
        ("ADDL", 0x00, I::Addl, wrl),
        ("S4ADDL", 0x02, I::S4addl, wrl),
        ("SUBL", 0x09, I::Subl, wrl),
        ("S4SUBL", 0x0B, I::S4subl, wrl),
        ("CMPBGE", 0x0F, I::Cmpbge, wrl),
        ("S8ADDL", 0x12, I::S8addl, wrl),
        ("S8SUBL", 0x1B, I::S8subl, wrl),
        ("CMPULT", 0x1D, I::Cmpult, wrl),
        ("ADDQ", 0x20, I::Addq, wrl),
        ("S4ADDQ", 0x22, I::S4addq, wrl),
        ("SUBQ", 0x29, I::Subq, wrl),
        ("S4SUBQ", 0x2B, I::S4subq, wrl),
        ("CMPEQ", 0x2D, I::Cmpeq, wrl),
        ("S8ADDQ", 0x32, I::S8addq, wrl),
        ("S8SUBQ", 0x3B, I::S8subq, wrl),
        ("CMPULE", 0x3D, I::Cmpule, wrl),
        ("ADDL/V", 0x40, I::Addlv, wrl | Fl::OVF_TRAP),
        ("SUBL/V", 0x49, I::Sublv, wrl | Fl::OVF_TRAP),
        ("CMPLT", 0x4D, I::Cmplt, wrl),
        ("ADDQ/V", 0x60, I::Addqv, wrl | Fl::OVF_TRAP),
        ("SUBQ/V", 0x69, I::Subqv, wrl | Fl::OVF_TRAP),
        ("CMPLE", 0x6D, I::Cmple, wrl),
    ] {
        t.push(g(mn, 0x10, fc, F::Operate(op), fl));
    }

    // Opcode 0x11: logical and conditional move.
    for (mn, fc, op) in [
        ("AND", 0x00, I::And),
        ("BIC", 0x08, I::Bic),
        ("CMOVLBS", 0x14, I::Cmovlbs),
        ("CMOVLBC", 0x16, I::Cmovlbc),
        ("BIS", 0x20, I::Bis),
        ("CMOVEQ", 0x24, I::Cmoveq),
        ("CMOVNE", 0x26, I::Cmovne),
        ("ORNOT", 0x28, I::Ornot),
        ("XOR", 0x40, I::Xor),
        ("CMOVLT", 0x44, I::Cmovlt),
        ("CMOVGE", 0x46, I::Cmovge),
        ("EQV", 0x48, I::Eqv),
        ("AMASK", 0x61, I::Amask),
        ("CMOVLE", 0x64, I::Cmovle),
        ("CMOVGT", 0x66, I::Cmovgt),
        ("IMPLVER", 0x6C, I::Implver),
    ] {
        t.push(g(mn, 0x11, fc, F::Operate(op), wrl));
    }

    // Opcode 0x12: shifts and byte manipulation.
    for (mn, fc, op) in [
        ("MSKBL", 0x02, I::Mskbl),
        ("EXTBL", 0x06, I::Extbl),
        ("INSBL", 0x0B, I::Insbl),
        ("MSKWL", 0x12, I::Mskwl),
        ("EXTWL", 0x16, I::Extwl),
        ("INSWL", 0x1B, I::Inswl),
        ("MSKLL", 0x22, I::Mskll),
        ("EXTLL", 0x26, I::Extll),
        ("INSLL", 0x2B, I::Insll),
        ("ZAP", 0x30, I::Zap),
        ("ZAPNOT", 0x31, I::Zapnot),
        ("MSKQL", 0x32, I::Mskql),
        ("SRL", 0x34, I::Srl),
        ("EXTQL", 0x36, I::Extql),
        ("SLL", 0x39, I::Sll),
        ("INSQL", 0x3B, I::Insql),
        ("SRA", 0x3C, I::Sra),
        ("MSKWH", 0x52, I::Mskwh),
        ("INSWH", 0x57, I::Inswh),
        ("EXTWH", 0x5A, I::Extwh),
        ("MSKLH", 0x62, I::Msklh),
        ("INSLH", 0x67, I::Inslh),
        ("EXTLH", 0x6A, I::Extlh),
        ("MSKQH", 0x72, I::Mskqh),
        ("INSQH", 0x77, I::Insqh),
        ("EXTQH", 0x7A, I::Extqh),
    ] {
        t.push(g(mn, 0x12, fc, F::Operate(op), wrl));
    }

    // Opcode 0x13: multiplies.
    for (mn, fc, op, fl) in [
        ("MULL", 0x00, I::Mull, wrl),
        ("MULQ", 0x20, I::Mulq, wrl),
        ("UMULH", 0x30, I::Umulh, wrl),
        ("MULL/V", 0x40, I::Mullv, wrl | Fl::OVF_TRAP),
        ("MULQ/V", 0x60, I::Mulqv, wrl | Fl::OVF_TRAP),
    ] {
        t.push(g(mn, 0x13, fc, F::Operate(op), fl));
    }

    // Opcode 0x1C: sign extension, counts, multimedia, FP transfers.
    for (mn, fc, op, fl) in [
        ("SEXTB", 0x00, I::Sextb, wrl),
        ("SEXTW", 0x01, I::Sextw, wrl),
        ("CTPOP", 0x30, I::Ctpop, wr),
        ("PERR", 0x31, I::Perr, wr),
        ("CTLZ", 0x32, I::Ctlz, wr),
        ("CTTZ", 0x33, I::Cttz, wr),
        ("UNPKBW", 0x34, I::Unpkbw, wr),
        ("UNPKBL", 0x35, I::Unpkbl, wr),
        ("PKWB", 0x36, I::Pkwb, wr),
        ("PKLB", 0x37, I::Pklb, wr),
        ("MINSB8", 0x38, I::Minsb8, wrl),
        ("MINSW4", 0x39, I::Minsw4, wrl),
        ("MINUB8", 0x3A, I::Minub8, wrl),
        ("MINUW4", 0x3B, I::Minuw4, wrl),
        ("MAXUB8", 0x3C, I::Maxub8, wrl),
        ("MAXUW4", 0x3D, I::Maxuw4, wrl),
        ("MAXSB8", 0x3E, I::Maxsb8, wrl),
        ("MAXSW4", 0x3F, I::Maxsw4, wrl),
        ("FTOIT", 0x70, I::Ftoit, wr | Fl::FP),
        ("FTOIS", 0x78, I::Ftois, wr | Fl::FP),
    ] {
        t.push(g(mn, 0x1C, fc, F::Operate(op), fl));
    }

    // Opcode 0x14: integer-to-FP transfers and square roots.
    for (mn, fc, op) in [
        ("ITOFS", 0x04, FpOp::Itofs),
        ("SQRTF", 0x8A, FpOp::Sqrtf),
        ("SQRTS", 0x8B, FpOp::Sqrts),
        ("ITOFF", 0x14, FpOp::Itoff),
        ("ITOFT", 0x24, FpOp::Itoft),
        ("SQRTG", 0xAA, FpOp::Sqrtg),
        ("SQRTT", 0xAB, FpOp::Sqrtt),
    ] {
        t.push(g(mn, 0x14, fc, F::FpOperate(op), wf));
    }

    // Opcode 0x15: VAX floating point.
    for (mn, fc, op) in [
        ("ADDF", 0x00, FpOp::Addf),
        ("SUBF", 0x01, FpOp::Subf),
        ("MULF", 0x02, FpOp::Mulf),
        ("DIVF", 0x03, FpOp::Divf),
        ("CVTDG", 0x1E, FpOp::Cvtdg),
        ("ADDG", 0x20, FpOp::Addg),
        ("SUBG", 0x21, FpOp::Subg),
        ("MULG", 0x22, FpOp::Mulg),
        ("DIVG", 0x23, FpOp::Divg),
        ("CMPGEQ", 0x25, FpOp::Cmpgeq),
        ("CMPGLT", 0x26, FpOp::Cmpglt),
        ("CMPGLE", 0x27, FpOp::Cmpgle),
        ("CVTGF", 0x2C, FpOp::Cvtgf),
        ("CVTGD", 0x2D, FpOp::Cvtgd),
        ("CVTGQ", 0x2F, FpOp::Cvtgq),
        ("CVTQF", 0x3C, FpOp::Cvtqf),
        ("CVTQG", 0x3E, FpOp::Cvtqg),
    ] {
        t.push(g(mn, 0x15, fc, F::FpOperate(op), wf));
    }

    // Opcode 0x16: IEEE floating point.
    for (mn, fc, op) in [
        ("ADDS", 0x00, FpOp::Adds),
        ("SUBS", 0x01, FpOp::Subs),
        ("MULS", 0x02, FpOp::Muls),
        ("DIVS", 0x03, FpOp::Divs),
        ("ADDT", 0x20, FpOp::Addt),
        ("SUBT", 0x21, FpOp::Subt),
        ("MULT", 0x22, FpOp::Mult),
        ("DIVT", 0x23, FpOp::Divt),
        ("CMPTUN", 0x24, FpOp::Cmptun),
        ("CMPTEQ", 0x25, FpOp::Cmpteq),
        ("CMPTLT", 0x26, FpOp::Cmptlt),
        ("CMPTLE", 0x27, FpOp::Cmptle),
        ("CVTTS", 0x2C, FpOp::Cvtts),
        ("CVTST", KEY_CVTST, FpOp::Cvtst),
        ("CVTTQ", 0x2F, FpOp::Cvttq),
        ("CVTQS", 0x3C, FpOp::Cvtqs),
        ("CVTQT", 0x3E, FpOp::Cvtqt),
    ] {
        t.push(g(mn, 0x16, fc, F::FpOperate(op), wf));
    }

    // Opcode 0x17: FP data movement and FPCR access.
    for (mn, fc, op) in [
        ("CVTLQ", 0x010, FpOp::Cvtlq),
        ("CPYS", 0x020, FpOp::Cpys),
        ("CPYSN", 0x021, FpOp::Cpysn),
        ("CPYSE", 0x022, FpOp::Cpyse),
        ("MT_FPCR", 0x024, FpOp::MtFpcr),
        ("MF_FPCR", 0x025, FpOp::MfFpcr),
        ("FCMOVEQ", 0x02A, FpOp::Fcmoveq),
        ("FCMOVNE", 0x02B, FpOp::Fcmovne),
        ("FCMOVLT", 0x02C, FpOp::Fcmovlt),
        ("FCMOVGE", 0x02D, FpOp::Fcmovge),
        ("FCMOVLE", 0x02E, FpOp::Fcmovle),
        ("FCMOVGT", 0x02F, FpOp::Fcmovgt),
        ("CVTQL", 0x030, FpOp::Cvtql),
    ] {
        t.push(g(mn, 0x17, fc, F::FpOperate(op), wf));
    }

    // Opcode 0x18: miscellaneous (function in the displacement field).
    for (mn, fc, op) in [
        ("TRAPB", 0x0000, MiscOp::Trapb),
        ("EXCB", 0x0400, MiscOp::Excb),
        ("MB", 0x4000, MiscOp::Mb),
        ("WMB", 0x4400, MiscOp::Wmb),
        ("FETCH", 0x8000, MiscOp::Fetch),
        ("FETCH_M", 0xA000, MiscOp::FetchM),
        ("RPCC", 0xC000, MiscOp::Rpcc),
        ("RC", 0xE000, MiscOp::Rc),
        ("ECB", 0xE800, MiscOp::Ecb),
        ("RS", 0xF000, MiscOp::Rs),
        ("WH64", 0xF800, MiscOp::Wh64),
    ] {
        let fl = match op {
            MiscOp::Rpcc | MiscOp::Rc | MiscOp::Rs => wr,
            _ => Fl::empty(),
        };
        t.push(g(mn, 0x18, fc, F::Misc(op), fl));
    }

    // PAL-mode hardware instructions.
    t.push(g(
        "HW_MFPR",
        0x19,
        0,
        F::HwMfpr,
        Fl::WRITES_INT | Fl::PAL_ONLY,
    ));
    t.push(g(
        "HW_LD",
        0x1B,
        0,
        F::HwLoad,
        Fl::MEMORY | Fl::LOAD | Fl::WRITES_INT | Fl::PAL_ONLY,
    ));
    t.push(g("HW_MTPR", 0x1D, 0, F::HwMtpr, Fl::PAL_ONLY));
    t.push(g("HW_RET", 0x1E, 0, F::HwRet, Fl::BRANCH | Fl::PAL_ONLY));
    t.push(g(
        "HW_ST",
        0x1F,
        0,
        F::HwStore,
        Fl::MEMORY | Fl::STORE | Fl::PAL_ONLY,
    ));

    // Jump format.
    t.push(g("JMP", 0x1A, 0, F::Jump(JmpKind::Jmp), br | wr));
    t.push(g("JSR", 0x1A, 1, F::Jump(JmpKind::Jsr), br | wr));
    t.push(g("RET", 0x1A, 2, F::Jump(JmpKind::Ret), br | wr));
    t.push(g(
        "JSR_COROUTINE",
        0x1A,
        3,
        F::Jump(JmpKind::JsrCoroutine),
        br | wr,
    ));

    // FP loads/stores.
    t.push(g("LDF", 0x20, 0, F::Memory(MemOp::Ldf), fld));
    t.push(g("LDG", 0x21, 0, F::Memory(MemOp::Ldg), fld));
    t.push(g("LDS", 0x22, 0, F::Memory(MemOp::Lds), fld));
    t.push(g("LDT", 0x23, 0, F::Memory(MemOp::Ldt), fld));
    t.push(g("STF", 0x24, 0, F::Memory(MemOp::Stf), fst));
    t.push(g("STG", 0x25, 0, F::Memory(MemOp::Stg), fst));
    t.push(g("STS", 0x26, 0, F::Memory(MemOp::Sts), fst));
    t.push(g("STT", 0x27, 0, F::Memory(MemOp::Stt), fst));

    // Integer loads/stores, including load-locked/store-conditional.
    t.push(g("LDL", 0x28, 0, F::Memory(MemOp::Ldl), ld));
    t.push(g("LDQ", 0x29, 0, F::Memory(MemOp::Ldq), ld));
    t.push(g("LDL_L", 0x2A, 0, F::Memory(MemOp::LdlL), ld));
    t.push(g("LDQ_L", 0x2B, 0, F::Memory(MemOp::LdqL), ld));
    t.push(g("STL", 0x2C, 0, F::Memory(MemOp::Stl), st));
    t.push(g("STQ", 0x2D, 0, F::Memory(MemOp::Stq), st));
    t.push(g(
        "STL_C",
        0x2E,
        0,
        F::Memory(MemOp::StlC),
        st | Fl::WRITES_INT,
    ));
    t.push(g(
        "STQ_C",
        0x2F,
        0,
        F::Memory(MemOp::StqC),
        st | Fl::WRITES_INT,
    ));

    // Displacement branches.
    for (mn, opc, op, fl) in [
        ("BR", 0x30, BrOp::Br, br | wr),
        ("FBEQ", 0x31, BrOp::Fbeq, fbr),
        ("FBLT", 0x32, BrOp::Fblt, fbr),
        ("FBLE", 0x33, BrOp::Fble, fbr),
        ("BSR", 0x34, BrOp::Bsr, br | wr),
        ("FBNE", 0x35, BrOp::Fbne, fbr),
        ("FBGE", 0x36, BrOp::Fbge, fbr),
        ("FBGT", 0x37, BrOp::Fbgt, fbr),
        ("BLBC", 0x38, BrOp::Blbc, br),
        ("BEQ", 0x39, BrOp::Beq, br),
        ("BLT", 0x3A, BrOp::Blt, br),
        ("BLE", 0x3B, BrOp::Ble, br),
        ("BLBS", 0x3C, BrOp::Blbs, br),
        ("BNE", 0x3D, BrOp::Bne, br),
        ("BGE", 0x3E, BrOp::Bge, br),
        ("BGT", 0x3F, BrOp::Bgt, br),
    ] {
        t.push(g(mn, opc, 0, F::Branch(op), fl));
    }

    t
}
