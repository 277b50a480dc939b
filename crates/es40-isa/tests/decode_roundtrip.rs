use es40_isa::{encode, word, DecodedInstruction, GrainFlags, GrainRegistry};
use proptest::prelude::*;

#[test]
fn every_grain_resolves_to_itself() {
    // For each grain, synthesize a raw word in that grain's encoding and
    // check the resolver hands back the same descriptor.
    let reg = GrainRegistry::new();
    for (id, g) in reg.iter() {
        let raw = match g.opcode {
            0x00 => encode::call_pal(0x40),
            0x10 | 0x11 | 0x12 | 0x13 | 0x1C => encode::opr(g.opcode, 1, 2, g.func as u8, 3),
            0x14 | 0x15 | 0x16 | 0x17 => {
                // Reconstruct a representative fn11 for the canonical key.
                let fn11 = if g.mnemonic == "CVTST" {
                    0x2AC
                } else if g.opcode == 0x16 || g.opcode == 0x15 {
                    // Default trap/round qualifiers (trap 0, round "normal").
                    (g.func & 0x3F) | 0x080
                } else {
                    g.func
                };
                encode::fpop(g.opcode, 1, 2, fn11, 3)
            }
            0x18 => encode::misc(g.func),
            0x1A => encode::jmp(26, 27, g.func as u8, 0),
            _ => encode::mem(g.opcode, 1, 2, 0),
        };
        let resolved = reg
            .resolve(raw)
            .unwrap_or_else(|| panic!("{} failed to resolve", g.mnemonic));
        assert_eq!(resolved, id, "{} resolved to a different grain", g.mnemonic);
        assert_eq!(reg.grain(resolved).mnemonic, g.mnemonic);
    }
}

#[test]
fn decoded_instruction_captures_operands() {
    let reg = GrainRegistry::new();
    let raw = encode::opr_lit(0x10, 5, 0x7F, 0x20, 9);
    let id = reg.resolve(raw).unwrap();
    let di = DecodedInstruction::new(raw, 0x2000, 0x2000, id, reg.grain(id));
    assert_eq!(di.ra, 5);
    assert_eq!(di.rc, 9);
    assert!(di.uses_lit);
    assert_eq!(di.lit, 0x7F);
    assert!(di.flags.contains(GrainFlags::WRITES_INT));
}

#[test]
fn branch_target_arithmetic() {
    let reg = GrainRegistry::new();
    let raw = encode::br(0x39, 1, -2);
    let id = reg.resolve(raw).unwrap();
    let di = DecodedInstruction::new(raw, 0x1_0000, 0x1_0000, id, reg.grain(id));
    assert_eq!(di.branch_target(), 0x1_0000 + 4 - 8);
}

proptest! {
    /// Any 32-bit word either fails to resolve (OPCDEC) or resolves to a
    /// grain whose opcode matches the word's opcode field.
    #[test]
    fn resolver_never_mismatches_opcode(raw in any::<u32>()) {
        let reg = GrainRegistry::new();
        if let Some(id) = reg.resolve(raw) {
            prop_assert_eq!(reg.grain(id).opcode, word::opcode(raw));
        }
    }

    /// Decoding is total for all operate-format words whose function code
    /// is in the table, and the literal flag is honored.
    #[test]
    fn operate_literals_decode(ra in 0u8..32, lit in any::<u8>(), rc in 0u8..32) {
        let reg = GrainRegistry::new();
        let raw = encode::opr_lit(0x10, ra, lit, 0x20, rc);
        let id = reg.resolve(raw).unwrap();
        let di = DecodedInstruction::new(raw, 0, 0, id, reg.grain(id));
        prop_assert!(di.uses_lit);
        prop_assert_eq!(di.lit, lit);
        prop_assert_eq!(di.ra, ra);
        prop_assert_eq!(di.rc, rc);
    }
}
