mod common;

use common::{CODE, RomBuilder, machine, run_instructions};
use dotmatrix_core::{Machine, error::StateError};

/// Timer running, a work RAM page being incremented, B counting loops.
fn busy_rom() -> Vec<u8> {
    RomBuilder::new(0x1B, 4, 0x03)
        .code(&[
            0x3E, 0x05, // LD A,0x05
            0xE0, 0x07, // LDH (0x07),A
            0x3E, 0x0A, // LD A,0x0A
            0xEA, 0x00, 0x00, // LD (0x0000),A
            0x21, 0x00, 0xC0, // LD HL,0xC000
            0x34, // INC (HL)
            0x2C, // INC L
            0x04, // INC B
            0xEA, 0x00, 0xA0, // LD (0xA000),A
            0x3C, // INC A
            0x18, 0xF7, // JR -9
        ])
        .build()
}

fn assert_same(a: &Machine, b: &Machine) {
    assert_eq!(a.cpu().regs, b.cpu().regs);
    assert_eq!(a.now(), b.now());
    assert_eq!(a.frame_count(), b.frame_count());
    for addr in (0xC000..=0xC0FF).chain(0xA000..=0xA000).chain(0xFF04..=0xFF07) {
        assert_eq!(a.memory().peek(addr), b.memory().peek(addr), "{addr:#06X}");
    }
    assert_eq!(a.pixels(), b.pixels());
}

#[test]
fn restored_machine_continues_identically() {
    let rom = busy_rom();
    let mut original = machine(rom.clone());
    run_instructions(&mut original, 10_000);
    let state = original.save_state().expect("encode");

    let mut restored = machine(rom);
    restored.load_state(&state).expect("decode");
    assert_eq!(restored.cpu().regs, original.cpu().regs);
    assert_eq!(restored.now(), original.now());

    run_instructions(&mut original, 10_000);
    run_instructions(&mut restored, 10_000);
    assert!(original.is_running() && restored.is_running());
    assert_same(&original, &restored);
}

#[test]
fn loading_rewinds_a_machine() {
    let mut m = machine(busy_rom());
    run_instructions(&mut m, 500);
    let state = m.save_state().expect("encode");
    let regs = m.cpu().regs;
    let now = m.now();

    run_instructions(&mut m, 500);
    assert_ne!(m.now(), now);
    m.load_state(&state).expect("decode");
    assert_eq!(m.cpu().regs, regs);
    assert_eq!(m.now(), now);
}

#[test]
fn pc_breakpoints_survive_loading() {
    let mut m = machine(busy_rom());
    run_instructions(&mut m, 20);
    let state = m.save_state().expect("encode");

    m.add_pc_breakpoint(CODE + 12);
    m.load_state(&state).expect("decode");
    run_instructions(&mut m, 10);
    assert!(m.is_paused());
    assert_eq!(m.cpu().regs.pc, CODE + 12);
}

#[test]
fn rejects_foreign_and_damaged_states() {
    let mut m = machine(busy_rom());
    run_instructions(&mut m, 100);
    let state = m.save_state().expect("encode");
    let regs = m.cpu().regs;

    let mut other = machine(RomBuilder::plain().build());
    assert!(matches!(other.load_state(&state), Err(StateError::RomMismatch)));

    assert!(matches!(m.load_state(b"DM"), Err(StateError::BadMagic)));
    let mut wrong_version = state.clone();
    wrong_version[4] = 0x02;
    assert!(matches!(
        m.load_state(&wrong_version),
        Err(StateError::UnsupportedVersion(2))
    ));
    let truncated = &state[..state.len() / 2];
    assert!(matches!(m.load_state(truncated), Err(StateError::Decode(_))));

    assert_eq!(m.cpu().regs, regs);
    assert!(m.is_running());
}
