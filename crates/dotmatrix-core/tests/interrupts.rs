mod common;

use common::{CODE, RomBuilder, machine, run_instructions, run_to};
use dotmatrix_core::{Event, Hook, interrupts::InterruptKind};
use std::{cell::RefCell, rc::Rc};

/// Enable every source, raise `flags`, then `EI ; NOP ; NOP`.
fn program(flags: u8) -> Vec<u8> {
    RomBuilder::plain()
        .code(&[0x3E, 0x1F, 0xE0, 0xFF, 0x3E, flags, 0xE0, 0x0F, 0xFB, 0x00, 0x00])
        // RETI at every vector.
        .at(0x0040, &[0xD9])
        .at(0x0048, &[0xD9])
        .at(0x0050, &[0xD9])
        .at(0x0058, &[0xD9])
        .at(0x0060, &[0xD9])
        .build()
}

#[test]
fn lowest_bit_wins_and_reti_chains_the_next() {
    let mut m = machine(program(0x14));
    run_to(&mut m, CODE, 10);
    run_instructions(&mut m, 6);
    assert_eq!(m.cpu().regs.pc, 0x0050, "timer before joypad");
    assert_eq!(m.memory().io.if_reg(), 0x10);

    // RETI re-enables at once, so the joypad request is taken straight away.
    m.simulate();
    assert_eq!(m.cpu().regs.pc, 0x0060);
    assert_eq!(m.memory().io.if_reg(), 0x00);

    m.simulate();
    assert_eq!(m.cpu().regs.pc, CODE + 10);
    assert!(m.cpu().ime);

    let io = &m.memory().io;
    assert_eq!(io.interrupt(InterruptKind::Timer).count, 1);
    assert_eq!(io.interrupt(InterruptKind::Joypad).count, 1);
    assert_eq!(io.interrupt(InterruptKind::VBlank).count, 0);
    assert!(
        io.interrupt(InterruptKind::Joypad).last_time
            > io.interrupt(InterruptKind::Timer).last_time
    );
}

#[test]
fn vblank_outranks_everything() {
    let mut m = machine(program(0x1F));
    run_to(&mut m, CODE, 10);
    run_instructions(&mut m, 6);
    assert_eq!(m.cpu().regs.pc, 0x0040);
}

#[test]
fn requests_without_enable_are_not_taken() {
    // IE = 0, IF = timer, EI ; NOP ; NOP
    let rom = RomBuilder::plain()
        .code(&[0xAF, 0xE0, 0xFF, 0x3E, 0x04, 0xE0, 0x0F, 0xFB, 0x00, 0x00])
        .build();
    let mut m = machine(rom);
    run_to(&mut m, CODE, 10);
    run_instructions(&mut m, 7);
    assert_eq!(m.cpu().regs.pc, CODE + 10);
    assert_eq!(m.memory().io.if_reg(), 0x04);
}

#[test]
fn joypad_press_requests_interrupt_when_line_selected() {
    // Select the direction keys, then spin.
    let rom = RomBuilder::plain()
        .code(&[0x3E, 0x20, 0xE0, 0x00, 0xAF, 0xE0, 0x0F, 0x18, 0xFE])
        .build();
    let mut m = machine(rom);
    run_to(&mut m, CODE + 7, 10);

    m.set_inputs(dotmatrix_core::joypad::buttons::A);
    assert_eq!(m.memory().io.if_reg() & 0x10, 0, "buttons not selected");
    m.set_inputs(dotmatrix_core::joypad::buttons::UP);
    assert_eq!(m.memory().io.if_reg() & 0x10, 0x10);
    assert_eq!(m.memory().peek(0xFF00) & 0x0F, 0x0B);
}

#[test]
fn timer_hook_sees_overflow() {
    // TMA=F0, TIMA=F0, TAC=05 (16 cycles), spin.
    let rom = RomBuilder::plain()
        .code(&[
            0x3E, 0xF0, 0xE0, 0x06, 0xE0, 0x05, 0x3E, 0x05, 0xE0, 0x07, 0x18, 0xFE,
        ])
        .build();
    let mut m = machine(rom);
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    m.set_hook(Hook::Timer, move |machine, event| {
        sink.borrow_mut().push((event, machine.now()));
    });

    run_to(&mut m, CODE + 10, 20);
    run_instructions(&mut m, 100);
    let events = events.borrow();
    assert!(events.len() >= 3, "got {} overflows", events.len());
    assert!(events.iter().all(|(e, _)| *e == Event::TimerOverflow));
    // 16 increments of 16 cycles between reloads, seen at instruction
    // boundaries.
    let gap = events[2].1 - events[1].1;
    assert!((256 - 12..=256 + 12).contains(&gap), "gap {gap}");
    assert_ne!(m.memory().io.if_reg() & 0x04, 0);
}
