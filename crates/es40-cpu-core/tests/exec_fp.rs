mod common;

use common::{kseg, system, PAL_BASE};
use es40_isa::encode;
use memory::MemoryBus;

const CODE: u64 = 0x4000;
const DATA: u64 = 0x8000;

/// FP compare "true" (2.0 in T format).
const CMP_TRUE: u64 = 0x4000_0000_0000_0000;

fn run(sys: &mut common::System, words: &[u32]) {
    sys.load_words(CODE, words);
    sys.cores[0].state.jump_tagged(CODE | 1);
    for _ in 0..words.len() {
        sys.step(0);
    }
}

fn fwrite(sys: &mut common::System, reg: u8, v: f64) {
    sys.cores[0].state.fregs.write(reg, v.to_bits());
}

fn fread(sys: &common::System, reg: u8) -> f64 {
    f64::from_bits(sys.cores[0].state.fregs.read(reg))
}

#[test]
fn ieee_double_arithmetic() {
    let mut sys = system(1);
    fwrite(&mut sys, 1, 2.5);
    fwrite(&mut sys, 2, 0.5);
    run(
        &mut sys,
        &[
            encode::fpop(0x16, 1, 2, 0x0A0, 3), // ADDT
            encode::fpop(0x16, 1, 2, 0x0A1, 4), // SUBT
            encode::fpop(0x16, 1, 2, 0x0A2, 5), // MULT
            encode::fpop(0x16, 1, 2, 0x0A3, 6), // DIVT
        ],
    );
    assert_eq!(fread(&sys, 3), 3.0);
    assert_eq!(fread(&sys, 4), 2.0);
    assert_eq!(fread(&sys, 5), 1.25);
    assert_eq!(fread(&sys, 6), 5.0);
}

#[test]
fn ieee_single_rounds_to_single_precision() {
    let mut sys = system(1);
    // 1/3 in single precision differs from double.
    fwrite(&mut sys, 1, 1.0);
    fwrite(&mut sys, 2, 3.0);
    run(&mut sys, &[encode::fpop(0x16, 1, 2, 0x083, 3)]); // DIVS
    let expect = (1.0f32 / 3.0f32) as f64;
    assert_eq!(fread(&sys, 3), expect);
}

#[test]
fn ieee_compares_produce_two_or_zero() {
    let mut sys = system(1);
    fwrite(&mut sys, 1, 1.0);
    fwrite(&mut sys, 2, 2.0);
    run(
        &mut sys,
        &[
            encode::fpop(0x16, 1, 2, 0x0A6, 3), // CMPTLT
            encode::fpop(0x16, 1, 2, 0x0A5, 4), // CMPTEQ
            encode::fpop(0x16, 1, 2, 0x0A4, 5), // CMPTUN
        ],
    );
    assert_eq!(sys.cores[0].state.fregs.read(3), CMP_TRUE);
    assert_eq!(sys.cores[0].state.fregs.read(4), 0);
    assert_eq!(sys.cores[0].state.fregs.read(5), 0);
}

#[test]
fn nan_is_unordered() {
    let mut sys = system(1);
    fwrite(&mut sys, 1, f64::NAN);
    fwrite(&mut sys, 2, 1.0);
    run(&mut sys, &[encode::fpop(0x16, 1, 2, 0x0A4, 3)]); // CMPTUN
    assert_eq!(sys.cores[0].state.fregs.read(3), CMP_TRUE);
}

#[test]
fn cvttq_rounds_and_cvtqt_widens() {
    let mut sys = system(1);
    fwrite(&mut sys, 2, 2.5);
    sys.cores[0].state.fregs.write(4, 7u64);
    run(
        &mut sys,
        &[
            encode::fpop(0x16, 31, 2, 0x0AF, 3), // CVTTQ (nearest-even: 2)
            encode::fpop(0x16, 31, 4, 0x0BE, 5), // CVTQT
        ],
    );
    assert_eq!(sys.cores[0].state.fregs.read(3), 2);
    assert_eq!(fread(&sys, 5), 7.0);
}

#[test]
fn cvttq_chopped_truncates() {
    let mut sys = system(1);
    fwrite(&mut sys, 2, 2.9);
    // /C form: rounding qualifier bits = 0.
    run(&mut sys, &[encode::fpop(0x16, 31, 2, 0x02F, 3)]);
    assert_eq!(sys.cores[0].state.fregs.read(3), 2);
}

#[test]
fn copy_sign_family() {
    let mut sys = system(1);
    fwrite(&mut sys, 1, -1.0);
    fwrite(&mut sys, 2, 2.0);
    run(
        &mut sys,
        &[
            encode::fpop(0x17, 1, 2, 0x020, 3), // CPYS: sign(-1), mag(2)
            encode::fpop(0x17, 1, 2, 0x021, 4), // CPYSN: flipped sign
        ],
    );
    assert_eq!(fread(&sys, 3), -2.0);
    assert_eq!(fread(&sys, 4), 2.0);
}

#[test]
fn fcmov_moves_only_when_condition_holds() {
    let mut sys = system(1);
    fwrite(&mut sys, 1, -3.0); // condition operand (negative)
    fwrite(&mut sys, 2, 9.0);
    fwrite(&mut sys, 3, 1.0);
    fwrite(&mut sys, 4, 1.0);
    run(
        &mut sys,
        &[
            encode::fpop(0x17, 1, 2, 0x02C, 3), // FCMOVLT: taken
            encode::fpop(0x17, 1, 2, 0x02D, 4), // FCMOVGE: not taken
        ],
    );
    assert_eq!(fread(&sys, 3), 9.0);
    assert_eq!(fread(&sys, 4), 1.0);
}

#[test]
fn fpcr_round_trip_through_mt_mf() {
    let mut sys = system(1);
    let fpcr = 2u64 << 58; // dynamic rounding: nearest
    sys.cores[0].state.fregs.write(1, fpcr);
    run(
        &mut sys,
        &[
            encode::fpop(0x17, 1, 1, 0x024, 31), // MT_FPCR
            encode::fpop(0x17, 31, 31, 0x025, 2), // MF_FPCR
        ],
    );
    assert_eq!(sys.cores[0].state.fregs.read(2), fpcr);
}

#[test]
fn division_by_zero_with_trap_qualifier_enters_arith() {
    let mut sys = system(1);
    fwrite(&mut sys, 1, 1.0);
    fwrite(&mut sys, 2, 0.0);
    fwrite(&mut sys, 3, 0.25);
    // DIVT/SU: trap-qualified.
    run(&mut sys, &[encode::fpop(0x16, 1, 2, 0x5A3, 3)]);

    // Precise: destination unchanged.
    assert_eq!(fread(&sys, 3), 0.25);
    assert!(sys.cores[0].fault.event_pending());
    sys.step(0);
    assert_eq!(sys.cores[0].state.pc(), PAL_BASE + 0x100);
    // EXC_SUM carries DZE.
    assert_eq!(sys.cores[0].state.regs.read(16) & (1 << 2), 1 << 2);
    // Status accumulated in the FPCR as well.
    assert_ne!(sys.cores[0].state.fpcr.0 & (1 << 53), 0);
}

#[test]
fn untrapped_division_by_zero_accumulates_only() {
    let mut sys = system(1);
    fwrite(&mut sys, 1, 1.0);
    fwrite(&mut sys, 2, 0.0);
    run(&mut sys, &[encode::fpop(0x16, 1, 2, 0x0A3, 3)]); // DIVT (no /S)
    assert!(!sys.cores[0].fault.event_pending());
    assert!(fread(&sys, 3).is_infinite());
    assert_ne!(sys.cores[0].state.fpcr.0 & (1 << 53), 0);
}

#[test]
fn fen_clear_faults_before_execution() {
    let mut sys = system(1);
    sys.cores[0].state.fpen = false;
    fwrite(&mut sys, 1, 1.0);
    fwrite(&mut sys, 2, 2.0);
    run(&mut sys, &[encode::fpop(0x16, 1, 2, 0x0A0, 3)]);
    assert!(sys.cores[0].fault.event_pending());
    sys.step(0);
    assert_eq!(sys.cores[0].state.pc(), PAL_BASE + 0x580);
    assert_eq!(sys.cores[0].state.fregs.read(3), 0);
}

#[test]
fn fp_loads_and_stores_round_trip() {
    let mut sys = system(1);
    sys.ram.write_u64(DATA, std::f64::consts::PI.to_bits()).unwrap();
    sys.ram
        .write_u32(DATA + 16, std::f32::consts::E.to_bits())
        .unwrap();
    sys.cores[0].state.regs.write(16, kseg(DATA));
    run(
        &mut sys,
        &[
            encode::mem(0x23, 1, 16, 0),  // LDT
            encode::mem(0x22, 2, 16, 16), // LDS
            encode::mem(0x27, 1, 16, 8),  // STT
            encode::mem(0x26, 2, 16, 20), // STS
        ],
    );
    assert_eq!(fread(&sys, 1), std::f64::consts::PI);
    assert_eq!(fread(&sys, 2), std::f32::consts::E as f64);
    assert_eq!(
        sys.ram.read_u64(DATA + 8).unwrap(),
        std::f64::consts::PI.to_bits()
    );
    assert_eq!(
        sys.ram.read_u32(DATA + 20).unwrap(),
        std::f32::consts::E.to_bits()
    );
}

#[test]
fn itof_ftoi_transfers() {
    let mut sys = system(1);
    sys.cores[0].state.regs.write(1, 0x4008_0000_0000_0000); // 3.0 bits
    run(
        &mut sys,
        &[
            encode::fpop(0x14, 1, 31, 0x024, 2),  // ITOFT r1 -> f2
            encode::opr(0x1C, 2, 31, 0x70, 3),    // FTOIT f2 -> r3
        ],
    );
    assert_eq!(fread(&sys, 2), 3.0);
    assert_eq!(sys.cores[0].state.regs.read(3), 0x4008_0000_0000_0000);
}

#[test]
fn sqrt_double() {
    let mut sys = system(1);
    fwrite(&mut sys, 2, 9.0);
    run(&mut sys, &[encode::fpop(0x14, 31, 2, 0x0AB, 3)]); // SQRTT
    assert_eq!(fread(&sys, 3), 3.0);
}

#[test]
fn vax_g_arithmetic_round_trips_through_memory() {
    let mut sys = system(1);
    // Build VAX G images for 1.5 and 2.0 in registers, store/load
    // through memory, then add.
    let g1 = es40_cpu_core::exec::fp_rep::host_to_vax_reg(1.5).unwrap();
    let g2 = es40_cpu_core::exec::fp_rep::host_to_vax_reg(2.0).unwrap();
    sys.cores[0].state.fregs.write(1, g1);
    sys.cores[0].state.fregs.write(2, g2);
    sys.cores[0].state.regs.write(16, kseg(DATA));
    run(
        &mut sys,
        &[
            encode::mem(0x25, 1, 16, 0),        // STG
            encode::mem(0x21, 3, 16, 0),        // LDG
            encode::fpop(0x15, 3, 2, 0x0A0, 4), // ADDG
        ],
    );
    let sum = es40_cpu_core::exec::fp_rep::vax_reg_to_host(
        sys.cores[0].state.fregs.read(4),
    )
    .unwrap();
    assert_eq!(sum, 3.5);
}

#[test]
fn vax_reserved_operand_always_traps() {
    let mut sys = system(1);
    sys.cores[0].state.fregs.write(1, 1u64 << 63); // reserved operand
    sys.cores[0].state.fregs.write(2, 0);
    run(&mut sys, &[encode::fpop(0x15, 1, 2, 0x0A0, 3)]); // ADDG
    assert!(sys.cores[0].fault.event_pending());
    sys.step(0);
    assert_eq!(sys.cores[0].state.pc(), PAL_BASE + 0x100);
    // EXC_SUM: invalid operation.
    assert_eq!(sys.cores[0].state.regs.read(16) & (1 << 1), 1 << 1);
}

#[test]
fn cvtlq_cvtql_round_trip() {
    let mut sys = system(1);
    sys.cores[0].state.fregs.write(2, (-5i64) as u64);
    run(
        &mut sys,
        &[
            encode::fpop(0x17, 31, 2, 0x030, 3), // CVTQL
            encode::fpop(0x17, 31, 3, 0x010, 4), // CVTLQ
        ],
    );
    assert_eq!(sys.cores[0].state.fregs.read(4) as i64, -5);
}
