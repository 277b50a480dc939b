mod common;

use common::{system, PAL_BASE};
use es40_cpu_core::state::ipr::index;
use es40_isa::encode;

const CODE: u64 = 0x4000;

#[test]
fn imb_invalidates_cached_decodes() {
    let mut sys = system(1);
    // ADDQ r1, r2, r3 at CODE; run it once so both decode caches hold it.
    sys.load_words(CODE, &[encode::opr(0x10, 1, 2, 0x20, 3)]);
    sys.cores[0].state.regs.write(1, 10);
    sys.cores[0].state.regs.write(2, 5);
    sys.cores[0].state.jump_tagged(CODE | 1);
    sys.step(0);
    assert_eq!(sys.cores[0].state.regs.read(3), 15);

    // Overwrite the backing word (device DMA): SUBQ r1, r2, r3.
    sys.load_words(CODE, &[encode::opr(0x10, 1, 2, 0x29, 3)]);

    // Without a barrier the stale decode still hits (same VA, same PA).
    sys.cores[0].state.jump_tagged(CODE | 1);
    sys.step(0);
    assert_eq!(sys.cores[0].state.regs.read(3), 15, "stale decode expected");

    // CALL_PAL IMB; the PAL stub at the 0x86 entry just returns.
    sys.load_words(CODE + 0x100, &[encode::call_pal(0x86)]);
    sys.load_words(
        PAL_BASE + (0x86 << 6),
        &[encode::hw_mfpr(26, index::EXC_ADDR), encode::hw_ret(26)],
    );
    sys.cores[0].state.jump_tagged((CODE + 0x100) | 1);
    sys.step(0); // CALL_PAL IMB (flushes decode caches)
    sys.step(0); // PAL entry
    sys.step(0); // HW_MFPR
    sys.step(0); // HW_RET

    // The fresh fetch decodes the new backing word.
    sys.cores[0].state.jump_tagged(CODE | 1);
    sys.step(0);
    assert_eq!(sys.cores[0].state.regs.read(3), 5, "fresh decode expected");
}

#[test]
fn reported_code_modification_invalidates_range() {
    let mut sys = system(1);
    sys.load_words(CODE, &[encode::opr(0x10, 1, 2, 0x20, 3)]);
    sys.cores[0].state.regs.write(1, 1);
    sys.cores[0].state.regs.write(2, 2);
    sys.cores[0].state.jump_tagged(CODE | 1);
    sys.step(0);

    sys.load_words(CODE, &[encode::opr(0x10, 1, 2, 0x29, 3)]);
    // External mutator reports the modified PC range.
    sys.cores[0].caches.invalidate_va_range(CODE, CODE + 4);

    sys.cores[0].state.jump_tagged(CODE | 1);
    sys.step(0);
    assert_eq!(sys.cores[0].state.regs.read(3) as i64, -1);
}

#[test]
fn unknown_opcode_raises_opcdec() {
    let mut sys = system(1);
    sys.load_words(CODE, &[0x07u32 << 26]); // reserved opcode
    sys.cores[0].state.jump_tagged(CODE | 1);
    sys.step(0);
    assert!(sys.cores[0].fault.event_pending());
    sys.step(0);
    assert_eq!(sys.cores[0].state.pc(), PAL_BASE + 0x500);
}

#[test]
fn fetch_from_bad_physical_address_machine_checks() {
    let mut sys = system(1);
    // Kernel-mode fetch through the I-stream superpage window to a
    // physical address beyond the backing store.
    sys.cores[0].state.iprs.i_ctl |= es40_cpu_core::state::ipr::IctlBits::SPE2;
    sys.cores[0]
        .state
        .jump_tagged(common::kseg(common::RAM_SIZE + 0x1000));
    sys.step(0);
    sys.step(0);
    // Machine check vector, critical priority.
    assert!(sys.cores[0].state.pal_mode);
    assert_eq!(sys.cores[0].state.pc(), PAL_BASE + 0x080);
}

#[test]
fn pal_base_write_flushes_decode_caches() {
    let mut sys = system(1);
    sys.load_words(CODE, &[encode::opr(0x10, 1, 2, 0x20, 3)]);
    sys.cores[0].state.regs.write(1, 3);
    sys.cores[0].state.regs.write(2, 4);
    sys.cores[0].state.jump_tagged(CODE | 1);
    sys.step(0);
    assert_eq!(sys.cores[0].state.regs.read(3), 7);

    sys.load_words(CODE, &[encode::opr(0x10, 1, 2, 0x29, 3)]);
    // HW_MTPR PAL_BASE (same value) must still flush the decode caches.
    sys.load_words(CODE + 0x40, &[encode::hw_mtpr(7, index::PAL_BASE)]);
    sys.cores[0].state.regs.write(7, PAL_BASE);
    sys.cores[0].state.jump_tagged((CODE + 0x40) | 1);
    sys.step(0);

    sys.cores[0].state.jump_tagged(CODE | 1);
    sys.step(0);
    assert_eq!(sys.cores[0].state.regs.read(3) as i64, -1);
}
