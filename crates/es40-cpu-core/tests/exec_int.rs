mod common;

use common::system;
use es40_isa::encode;

const CODE: u64 = 0x4000;

fn run_one(sys: &mut common::System, words: &[u32]) {
    sys.load_words(CODE, words);
    sys.cores[0].state.jump_tagged(CODE | 1);
    for _ in 0..words.len() {
        sys.step(0);
    }
}

#[test]
fn lda_with_displacement_adds_and_advances_pc() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(3, 0x1000);
    run_one(&mut sys, &[encode::mem(0x08, 1, 3, 0x1234)]);

    let core = &sys.cores[0];
    assert_eq!(core.state.regs.read(1), 0x2234);
    assert_eq!(core.state.pc(), CODE + 4);
    assert!(!core.fault.event_pending());
}

#[test]
fn ldah_shifts_displacement() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(2, 0x10);
    run_one(&mut sys, &[encode::mem(0x09, 1, 2, -1)]);
    assert_eq!(sys.cores[0].state.regs.read(1), 0x10u64.wrapping_sub(1 << 16));
}

#[test]
fn addq_register_and_literal_forms() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, 70);
    sys.cores[0].state.regs.write(2, 5);
    run_one(
        &mut sys,
        &[
            encode::opr(0x10, 1, 2, 0x20, 3),      // ADDQ r1, r2, r3
            encode::opr_lit(0x10, 1, 200, 0x20, 4), // ADDQ r1, #200, r4
        ],
    );
    assert_eq!(sys.cores[0].state.regs.read(3), 75);
    assert_eq!(sys.cores[0].state.regs.read(4), 270);
}

#[test]
fn addl_sign_extends_longword_result() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, 0x7FFF_FFFF);
    sys.cores[0].state.regs.write(2, 1);
    run_one(&mut sys, &[encode::opr(0x10, 1, 2, 0x00, 3)]);
    // Non-trapping ADDL wraps and sign-extends.
    assert_eq!(sys.cores[0].state.regs.read(3), 0xFFFF_FFFF_8000_0000);
}

#[test]
fn writes_to_r31_are_dropped() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, 7);
    sys.cores[0].state.regs.write(2, 8);
    run_one(&mut sys, &[encode::opr(0x10, 1, 2, 0x20, 31)]);
    let core = &sys.cores[0];
    assert_eq!(core.state.regs.read(31), 0);
    // Neighbors untouched.
    assert_eq!(core.state.regs.read(1), 7);
    assert_eq!(core.state.regs.read(2), 8);
}

#[test]
fn compare_family() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, (-5i64) as u64);
    sys.cores[0].state.regs.write(2, 5);
    run_one(
        &mut sys,
        &[
            encode::opr(0x10, 1, 2, 0x4D, 3), // CMPLT (signed): -5 < 5
            encode::opr(0x10, 1, 2, 0x1D, 4), // CMPULT (unsigned): huge < 5 is false
            encode::opr(0x10, 1, 1, 0x2D, 5), // CMPEQ r1, r1
        ],
    );
    assert_eq!(sys.cores[0].state.regs.read(3), 1);
    assert_eq!(sys.cores[0].state.regs.read(4), 0);
    assert_eq!(sys.cores[0].state.regs.read(5), 1);
}

#[test]
fn cmpbge_compares_per_byte() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, 0x00FF_0102_0304_0506);
    sys.cores[0].state.regs.write(2, 0x0001_0102_0304_0507);
    run_one(&mut sys, &[encode::opr(0x10, 1, 2, 0x0F, 3)]);
    // Byte 0: 6 >= 7 no; bytes 1..6 equal yes; byte 6: FF >= 01 yes;
    // byte 7: 00 >= 00 yes.
    assert_eq!(sys.cores[0].state.regs.read(3), 0b1111_1110);
}

#[test]
fn logical_and_shift_ops() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, 0xF0F0);
    sys.cores[0].state.regs.write(2, 0x0FF0);
    run_one(
        &mut sys,
        &[
            encode::opr(0x11, 1, 2, 0x00, 3),      // AND
            encode::opr(0x11, 1, 2, 0x20, 4),      // BIS
            encode::opr(0x11, 1, 2, 0x40, 5),      // XOR
            encode::opr(0x11, 1, 2, 0x08, 6),      // BIC
            encode::opr_lit(0x12, 1, 8, 0x39, 7),  // SLL r1, #8
            encode::opr_lit(0x12, 1, 4, 0x34, 8),  // SRL r1, #4
        ],
    );
    let r = |i| sys.cores[0].state.regs.read(i);
    assert_eq!(r(3), 0x0FF0 & 0xF0F0);
    assert_eq!(r(4), 0xFFF0);
    assert_eq!(r(5), 0xF0F0 ^ 0x0FF0);
    assert_eq!(r(6), 0xF0F0 & !0x0FF0);
    assert_eq!(r(7), 0xF0F000);
    assert_eq!(r(8), 0xF0F);
}

#[test]
fn sra_is_arithmetic() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, (-64i64) as u64);
    run_one(&mut sys, &[encode::opr_lit(0x12, 1, 4, 0x3C, 2)]);
    assert_eq!(sys.cores[0].state.regs.read(2) as i64, -4);
}

#[test]
fn byte_extract_insert_mask() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, 0x8877_6655_4433_2211);
    sys.cores[0].state.regs.write(2, 3);
    run_one(
        &mut sys,
        &[
            encode::opr(0x12, 1, 2, 0x06, 3), // EXTBL: byte 3
            encode::opr(0x12, 1, 2, 0x16, 4), // EXTWL
            encode::opr(0x12, 1, 2, 0x0B, 5), // INSBL
            encode::opr(0x12, 1, 2, 0x02, 6), // MSKBL
        ],
    );
    let r = |i| sys.cores[0].state.regs.read(i);
    assert_eq!(r(3), 0x44);
    assert_eq!(r(4), 0x5544);
    assert_eq!(r(5), 0x11 << 24);
    assert_eq!(r(6), 0x8877_6655_0033_2211);
}

#[test]
fn zap_and_zapnot() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, u64::MAX);
    run_one(
        &mut sys,
        &[
            encode::opr_lit(0x12, 1, 0x0F, 0x30, 2), // ZAP low 4 bytes
            encode::opr_lit(0x12, 1, 0x0F, 0x31, 3), // ZAPNOT keeps low 4
        ],
    );
    assert_eq!(sys.cores[0].state.regs.read(2), 0xFFFF_FFFF_0000_0000);
    assert_eq!(sys.cores[0].state.regs.read(3), 0x0000_0000_FFFF_FFFF);
}

#[test]
fn conditional_move_only_writes_when_taken() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, 0); // condition register
    sys.cores[0].state.regs.write(2, 0xAA);
    sys.cores[0].state.regs.write(3, 0x11);
    sys.cores[0].state.regs.write(4, 0x22);
    run_one(
        &mut sys,
        &[
            encode::opr(0x11, 1, 2, 0x24, 3), // CMOVEQ: taken, r3 = 0xAA
            encode::opr(0x11, 1, 2, 0x26, 4), // CMOVNE: not taken
        ],
    );
    assert_eq!(sys.cores[0].state.regs.read(3), 0xAA);
    assert_eq!(sys.cores[0].state.regs.read(4), 0x22);
}

#[test]
fn multiply_family() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, u64::MAX); // -1
    sys.cores[0].state.regs.write(2, 3);
    run_one(
        &mut sys,
        &[
            encode::opr(0x13, 1, 2, 0x20, 3), // MULQ
            encode::opr(0x13, 1, 2, 0x30, 4), // UMULH
            encode::opr(0x13, 1, 2, 0x00, 5), // MULL
        ],
    );
    let r = |i| sys.cores[0].state.regs.read(i);
    assert_eq!(r(3) as i64, -3);
    // (2^64-1) * 3 >> 64 == 2.
    assert_eq!(r(4), 2);
    assert_eq!(r(5) as i64, -3);
}

#[test]
fn counts_and_sign_extension() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(2, 0x0000_8000_0000_0080);
    run_one(
        &mut sys,
        &[
            encode::opr(0x1C, 31, 2, 0x30, 3), // CTPOP
            encode::opr(0x1C, 31, 2, 0x32, 4), // CTLZ
            encode::opr(0x1C, 31, 2, 0x33, 5), // CTTZ
            encode::opr(0x1C, 31, 2, 0x00, 6), // SEXTB
        ],
    );
    let r = |i| sys.cores[0].state.regs.read(i);
    assert_eq!(r(3), 2);
    assert_eq!(r(4), 16);
    assert_eq!(r(5), 7);
    assert_eq!(r(6), 0xFFFF_FFFF_FFFF_FF80);
}

#[test]
fn amask_reports_bwx_fix_cix_mvi() {
    let mut sys = system(1);
    run_one(&mut sys, &[encode::opr_lit(0x11, 31, 0xFF, 0x61, 1)]);
    // Supported feature bits are cleared; only bits 3..7 minus CIX
    // survive from 0xFF.
    assert_eq!(sys.cores[0].state.regs.read(1), 0xFF & !0x07);
}

#[test]
fn implver_reports_ev6() {
    let mut sys = system(1);
    run_one(&mut sys, &[encode::opr_lit(0x11, 31, 1, 0x6C, 1)]);
    assert_eq!(sys.cores[0].state.regs.read(1), 2);
}

#[test]
fn scaled_add() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, 0x10);
    sys.cores[0].state.regs.write(2, 0x3);
    run_one(
        &mut sys,
        &[
            encode::opr(0x10, 1, 2, 0x02, 3), // S4ADDL
            encode::opr(0x10, 1, 2, 0x32, 4), // S8ADDQ
        ],
    );
    assert_eq!(sys.cores[0].state.regs.read(3), 0x43);
    assert_eq!(sys.cores[0].state.regs.read(4), 0x83);
}

#[test]
fn overflow_without_ipr_enable_wraps_silently() {
    let mut sys = system(1);
    // Clear the overflow-trap enable.
    sys.cores[0].state.iprs.i_ctl &= !es40_cpu_core::state::ipr::IctlBits::IOV;
    sys.cores[0].state.regs.write(1, 0x7FFF_FFFF);
    sys.cores[0].state.regs.write(2, 1);
    run_one(&mut sys, &[encode::opr(0x10, 1, 2, 0x40, 3)]); // ADDL/V
    assert_eq!(sys.cores[0].state.regs.read(3), 0xFFFF_FFFF_8000_0000);
    assert!(!sys.cores[0].fault.event_pending());
}
