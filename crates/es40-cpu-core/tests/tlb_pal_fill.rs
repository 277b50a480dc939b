mod common;

use common::{kseg, system, system_with, PAL_BASE};
use es40_cpu_core::state::ipr::{index, IctlBits};
use es40_isa::encode;
use es40_mmu::{LookupResult, Pte, PteBits};
use es40_types::{Access, Mode, Realm};
use memory::MemoryBus;
use std::time::Duration;

const CODE: u64 = 0x4000;
const L0: u64 = 0x20000;
const L1: u64 = 0x22000;
const L2: u64 = 0x24000;
const DATA_PA: u64 = 0x40000;
const VA: u64 = 0x2_0000; // 8K page 16: L0[0] -> L1[0] -> L2[16]

fn table_pte(pa: u64) -> u64 {
    Pte::compose(pa >> 13, PteBits::VALID | PteBits::KRE).0
}

fn build_page_tables(sys: &common::System) {
    sys.ram.write_u64(L0, table_pte(L1)).unwrap();
    sys.ram.write_u64(L1, table_pte(L2)).unwrap();
    // Kernel-read-only data page.
    let leaf = Pte::compose(DATA_PA >> 13, PteBits::VALID | PteBits::KRE).0;
    sys.ram.write_u64(L2 + 16 * 8, leaf).unwrap();
    sys.ram.write_u32(DATA_PA, 0x1234_5678).unwrap();
}

/// The single-miss PAL handler: a real three-level walk over physical
/// memory using HW_LD, then a DTB fill and return.
///
/// On entry R16 holds the faulting VA (argument packaging). R1..R7 are
/// scratch; R4..R7 are shadow registers while SDE is on.
fn miss_handler() -> Vec<u32> {
    const SRL: u8 = 0x34;
    const SLL: u8 = 0x39;
    const AND: u8 = 0x00;
    const ADDQ: u8 = 0x20;
    let mut p = Vec::new();
    // r7 = 0x3FF (level-index mask), r1 = PTBR.
    p.push(encode::mem(0x08, 7, 31, 0x3FF)); // LDA r7, 0x3FF(r31)
    p.push(encode::hw_mfpr(1, index::PTBR));

    // One level: r3 = base + ((va >> shift) & mask) * 8; r4 = [r3].
    let level = |p: &mut Vec<u32>, base: u8, shift: u8| {
        p.push(encode::opr_lit(0x12, 16, shift, SRL, 2)); // r2 = va >> shift
        p.push(encode::opr(0x11, 2, 7, AND, 2)); // r2 &= mask
        p.push(encode::opr_lit(0x12, 2, 3, SLL, 2)); // r2 *= 8
        p.push(encode::opr(0x10, base, 2, ADDQ, 3)); // r3 = base + r2
        p.push(encode::hw_ld(4, 3, 1, true, 0)); // r4 = phys[r3]
    };

    level(&mut p, 1, 33); // L0: r4 = pte0
    p.push(encode::opr_lit(0x12, 4, 32, SRL, 5)); // r5 = pfn
    p.push(encode::opr_lit(0x12, 5, 13, SLL, 1)); // r1 = pfn << 13
    level(&mut p, 1, 23); // L1: r4 = pte1
    p.push(encode::opr_lit(0x12, 4, 32, SRL, 5));
    p.push(encode::opr_lit(0x12, 5, 13, SLL, 1));
    level(&mut p, 1, 13); // L2: r4 = leaf pte

    // Fill DTB port 0 and return to the faulting instruction.
    p.push(encode::hw_mtpr(16, index::DTB_TAG0));
    p.push(encode::hw_mfpr(2, index::ASN));
    p.push(encode::hw_mtpr(2, index::DTB_ASN0));
    p.push(encode::hw_mtpr(4, index::DTB_PTE0));
    p.push(encode::hw_mfpr(26, index::EXC_ADDR));
    p.push(encode::hw_ret(26));
    p
}

#[test]
fn tlb_miss_pal_fill_and_retry() {
    let mut sys = system(1);
    build_page_tables(&sys);
    sys.load_words(PAL_BASE + 0x200, &miss_handler());

    // Kernel program: LDL r1, 0(r16); CALL_PAL HALT.
    sys.load_words(CODE, &[encode::mem(0x28, 1, 16, 0), encode::call_pal(0x00)]);
    let core = &mut sys.cores[0];
    core.state.iprs.i_ctl |= IctlBits::SPE2;
    core.state.hwpcb.ptbr = L0;
    core.state.asn = 11;
    core.state.regs.write(16, VA);
    core.state.jump_tagged(kseg(CODE));

    // First step raises DTB_MISS_SINGLE; the delivery lands on the PAL
    // handler, which walks, fills, and returns; the retry succeeds.
    sys.step(0);
    assert!(sys.cores[0].fault.event_pending());
    sys.step(0);
    assert!(sys.cores[0].state.pal_mode);
    assert_eq!(sys.cores[0].state.pc(), PAL_BASE + 0x200);

    sys.run_to_halt(0, 200);

    let core = &sys.cores[0];
    assert_eq!(core.state.regs.read(1), 0x1234_5678);
    // The fill is resident: a fresh lookup hits without PAL.
    assert_eq!(
        core.tlb.lookup(Realm::Data, VA, 11, Mode::Kernel, Access::Read),
        LookupResult::Hit(DATA_PA)
    );
}

#[test]
fn filled_entry_is_asn_tagged() {
    let mut sys = system(1);
    build_page_tables(&sys);
    sys.load_words(PAL_BASE + 0x200, &miss_handler());
    sys.load_words(CODE, &[encode::mem(0x28, 1, 16, 0), encode::call_pal(0x00)]);
    let core = &mut sys.cores[0];
    core.state.iprs.i_ctl |= IctlBits::SPE2;
    core.state.hwpcb.ptbr = L0;
    core.state.asn = 11;
    core.state.regs.write(16, VA);
    core.state.jump_tagged(kseg(CODE));
    sys.run_to_halt(0, 200);

    // The mapping was installed for ASN 11 without the global bit, so
    // ASN 12 must miss.
    assert_eq!(
        sys.cores[0]
            .tlb
            .lookup(Realm::Data, VA, 12, Mode::Kernel, Access::Read),
        LookupResult::Miss
    );
}

#[test]
fn kernel_read_only_page_rejects_user_reads() {
    let mut sys = system(1);
    build_page_tables(&sys);
    sys.load_words(PAL_BASE + 0x200, &miss_handler());
    sys.load_words(CODE, &[encode::mem(0x28, 1, 16, 0), encode::call_pal(0x00)]);
    let core = &mut sys.cores[0];
    core.state.iprs.i_ctl |= IctlBits::SPE2;
    core.state.hwpcb.ptbr = L0;
    core.state.regs.write(16, VA);
    core.state.jump_tagged(kseg(CODE));
    sys.run_to_halt(0, 200);

    assert_eq!(
        sys.cores[0]
            .tlb
            .lookup(Realm::Data, VA, 0, Mode::User, Access::Read),
        LookupResult::Acv
    );
}

#[test]
fn hardware_tb_fill_skips_pal() {
    let mut sys = system_with(1, true, Duration::from_millis(50));
    build_page_tables(&sys);
    sys.load_words(CODE, &[encode::mem(0x28, 1, 16, 0), encode::call_pal(0x00)]);
    let core = &mut sys.cores[0];
    core.state.iprs.i_ctl |= IctlBits::SPE2;
    core.state.hwpcb.ptbr = L0;
    core.state.regs.write(16, VA);
    core.state.jump_tagged(kseg(CODE));

    sys.step(0);
    assert!(
        !sys.cores[0].fault.event_pending(),
        "hardware fill must not vector to PAL"
    );
    assert_eq!(sys.cores[0].state.regs.read(1), 0x1234_5678);
}

#[test]
fn write_to_kernel_read_only_page_is_acv() {
    let mut sys = system_with(1, true, Duration::from_millis(50));
    build_page_tables(&sys);
    // STL to the read-only page under hardware fill: ACV, then DFAULT.
    sys.load_words(CODE, &[encode::mem(0x2C, 1, 16, 0)]);
    let core = &mut sys.cores[0];
    core.state.iprs.i_ctl |= IctlBits::SPE2;
    core.state.hwpcb.ptbr = L0;
    core.state.regs.write(16, VA);
    core.state.jump_tagged(kseg(CODE));

    sys.step(0);
    sys.step(0);
    assert!(sys.cores[0].state.pal_mode);
    assert_eq!(sys.cores[0].state.pc(), PAL_BASE + 0x400);
    // R19 = is-write flag.
    assert_eq!(sys.cores[0].state.regs.read(19), 1);
}

#[test]
fn fault_on_write_bit_vectors_to_single_miss_with_flag() {
    let mut sys = system_with(1, true, Duration::from_millis(50));
    build_page_tables(&sys);
    // Replace the leaf with a writable page that has FOW set.
    let leaf = Pte::compose(
        DATA_PA >> 13,
        PteBits::VALID | PteBits::KRE | PteBits::KWE | PteBits::FOW,
    )
    .0;
    sys.ram.write_u64(L2 + 16 * 8, leaf).unwrap();

    sys.load_words(CODE, &[encode::mem(0x2C, 1, 16, 0)]);
    let core = &mut sys.cores[0];
    core.state.iprs.i_ctl |= IctlBits::SPE2;
    core.state.hwpcb.ptbr = L0;
    core.state.regs.write(16, VA);
    core.state.jump_tagged(kseg(CODE));

    sys.step(0);
    sys.step(0);
    // Fault-on events share the single-miss vector; MM_STAT flags the
    // kind.
    assert_eq!(sys.cores[0].state.pc(), PAL_BASE + 0x200);
    assert_eq!(sys.cores[0].state.iprs.mm_stat, 0x8 | 1);
}
