mod common;

use common::{CODE, RomBuilder, machine, run_instructions, run_to};
use dotmatrix_core::{
    cpu::CpuState,
    registers::{FLAG_C, FLAG_H, FLAG_Z},
};

#[test]
fn bare_image_load_and_subtract() {
    let mut m = machine(vec![0x3E, 0xFF, 0xD6, 0x01, 0x00, 0x00]);
    run_instructions(&mut m, 2);
    let regs = m.cpu().regs;
    assert_eq!(regs.a, 0xFE);
    assert_eq!(regs.f & FLAG_Z, 0, "zero flag");
    assert_eq!(regs.f & FLAG_C, 0, "carry flag");
    assert_eq!(regs.f & FLAG_H, 0, "half-carry flag");
}

#[test]
fn pop_af_clears_low_flag_bits() {
    // LD BC,12FF ; PUSH BC ; POP AF
    let rom = RomBuilder::plain()
        .code(&[0x01, 0xFF, 0x12, 0xC5, 0xF1])
        .build();
    let mut m = machine(rom);
    run_to(&mut m, CODE, 10);
    run_instructions(&mut m, 3);
    assert_eq!(m.cpu().regs.a, 0x12);
    assert_eq!(m.cpu().regs.f, 0xF0);
}

#[test]
fn halt_bug_executes_next_byte_twice() {
    // LD A,04 ; LDH (IE),A ; LDH (IF),A ; HALT ; INC A ; NOP
    let rom = RomBuilder::plain()
        .code(&[0x3E, 0x04, 0xE0, 0xFF, 0xE0, 0x0F, 0x76, 0x3C, 0x00])
        .build();
    let mut m = machine(rom);
    run_to(&mut m, CODE, 10);
    run_instructions(&mut m, 4);
    assert_eq!(m.cpu().state, CpuState::Running);
    assert_eq!(m.cpu().regs.pc, CODE + 7);

    run_instructions(&mut m, 2);
    assert_eq!(m.cpu().regs.a, 0x06);
    assert_eq!(m.cpu().regs.pc, CODE + 8);
}

#[test]
fn halt_wakes_without_ime_and_continues() {
    // LD A,04 ; LDH (IE),A ; XOR A ; LDH (IF),A ; HALT ; INC B
    let rom = RomBuilder::plain()
        .code(&[0x3E, 0x04, 0xE0, 0xFF, 0xAF, 0xE0, 0x0F, 0x76, 0x04])
        .build();
    let mut m = machine(rom);
    run_to(&mut m, CODE, 10);
    run_instructions(&mut m, 5);
    assert_eq!(m.cpu().state, CpuState::Halted);

    assert_eq!(m.simulate(), 4);
    assert_eq!(m.cpu().state, CpuState::Halted);

    m.memory_mut()
        .io
        .request(dotmatrix_core::interrupts::InterruptKind::Timer);
    m.simulate();
    assert_eq!(m.cpu().state, CpuState::Running);
    let b = m.cpu().regs.b;
    m.simulate();
    assert_eq!(m.cpu().regs.b, b.wrapping_add(1));
    assert_eq!(m.cpu().regs.pc, CODE + 9);
}

#[test]
fn ei_takes_effect_after_the_next_instruction() {
    // LD A,04 ; LDH (IE),A ; LDH (IF),A ; EI ; INC B ; INC B
    let rom = RomBuilder::plain()
        .code(&[0x3E, 0x04, 0xE0, 0xFF, 0xE0, 0x0F, 0xFB, 0x04, 0x04])
        .build();
    let mut m = machine(rom);
    run_to(&mut m, CODE, 10);
    run_instructions(&mut m, 4);
    assert!(!m.cpu().ime);
    assert_eq!(m.cpu().regs.pc, CODE + 7);

    let b = m.cpu().regs.b;
    assert_eq!(m.simulate(), 4 + 20);
    assert_eq!(m.cpu().regs.b, b.wrapping_add(1));
    assert_eq!(m.cpu().regs.pc, 0x0050);
    assert!(!m.cpu().ime);

    let sp = m.cpu().regs.sp;
    assert_eq!(sp, 0xFFFC);
    assert_eq!(m.memory().peek(sp), 0x58);
    assert_eq!(m.memory().peek(sp + 1), 0x01);
    assert_eq!(m.memory().io.if_reg() & 0x04, 0);
}

#[test]
fn di_cancels_a_pending_ei() {
    // LD A,04 ; LDH (IE),A ; LDH (IF),A ; EI ; DI ; NOP ; NOP
    let rom = RomBuilder::plain()
        .code(&[0x3E, 0x04, 0xE0, 0xFF, 0xE0, 0x0F, 0xFB, 0xF3, 0x00, 0x00])
        .build();
    let mut m = machine(rom);
    run_to(&mut m, CODE, 10);
    run_instructions(&mut m, 7);
    assert!(!m.cpu().ime);
    assert_eq!(m.cpu().regs.pc, CODE + 10);
}

#[test]
fn di_takes_effect_after_the_next_instruction() {
    // LD A,04 ; LDH (IE),A ; EI ; NOP ; DI ; NOP
    let rom = RomBuilder::plain()
        .code(&[0x3E, 0x04, 0xE0, 0xFF, 0xFB, 0x00, 0xF3, 0x00])
        .build();
    let mut m = machine(rom);
    run_to(&mut m, CODE, 10);
    run_instructions(&mut m, 4);
    assert!(m.cpu().ime);

    // Requested just before DI: IME is still set when DI completes.
    m.memory_mut()
        .io
        .request(dotmatrix_core::interrupts::InterruptKind::Timer);
    assert_eq!(m.simulate(), 4 + 20);
    assert_eq!(m.cpu().regs.pc, 0x0050);
    let sp = m.cpu().regs.sp;
    assert_eq!(m.memory().peek(sp), 0x57);
    assert_eq!(m.memory().peek(sp + 1), 0x01);
}

#[test]
fn conditional_call_and_return_costs() {
    // XOR A ; CALL NZ,0200 ; CALL Z,0200 ; ... 0200: RET NZ ; RET Z
    let rom = RomBuilder::plain()
        .code(&[0xAF, 0xC4, 0x00, 0x02, 0xCC, 0x00, 0x02])
        .at(0x0200, &[0xC0, 0xC8])
        .build();
    let mut m = machine(rom);
    run_to(&mut m, CODE, 10);
    assert_eq!(m.simulate(), 4);
    assert_eq!(m.simulate(), 12);
    assert_eq!(m.simulate(), 24);
    assert_eq!(m.cpu().regs.pc, 0x0200);
    assert_eq!(m.simulate(), 8);
    assert_eq!(m.simulate(), 20);
    assert_eq!(m.cpu().regs.pc, CODE + 7);
}

#[test]
fn hl_increment_stores_walk_memory() {
    // LD HL,C000 ; LD A,5A ; LD (HL+),A ; LD (HL+),A ; LD A,(HL-)
    let rom = RomBuilder::plain()
        .code(&[0x21, 0x00, 0xC0, 0x3E, 0x5A, 0x22, 0x22, 0x3A])
        .build();
    let mut m = machine(rom);
    run_to(&mut m, CODE, 10);
    run_instructions(&mut m, 5);
    assert_eq!(m.memory().peek(0xC000), 0x5A);
    assert_eq!(m.memory().peek(0xC001), 0x5A);
    assert_eq!(m.cpu().regs.hl(), 0xC001);
    assert_eq!(m.cpu().regs.a, 0x00);
}

#[test]
fn double_speed_switch_on_cgb() {
    // LD A,01 ; LDH (KEY1),A ; STOP ; NOP
    let rom = RomBuilder::plain()
        .cgb()
        .code(&[0x3E, 0x01, 0xE0, 0x4D, 0x10, 0x00, 0x00])
        .build();
    let mut m = machine(rom);
    assert!(m.is_cgb());
    run_to(&mut m, CODE, 10);
    run_instructions(&mut m, 3);
    assert!(m.is_running());
    assert!(m.memory().io.double_speed());
    assert_eq!(m.memory().peek(0xFF4D), 0xFE);
    assert_eq!(m.cpu().regs.pc, CODE + 6);
}
