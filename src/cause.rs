//! Exception and interrupt cause codes (spec §4.7).
//!
//! Exceptions occupy bits 2..6 of the cause word, interrupts bits 8..9, so a single
//! delivery routine can carry both (§9 "Interrupts vs. exceptions").

pub const ADDRESS_EXCEPTION_LOAD: u32 = 0x10;
pub const ADDRESS_EXCEPTION_STORE: u32 = 0x14;
pub const SYSCALL_EXCEPTION: u32 = 0x20;
pub const BREAKPOINT_EXCEPTION: u32 = 0x24;
pub const RESERVED_INSTRUCTION_EXCEPTION: u32 = 0x28;
pub const ARITHMETIC_OVERFLOW_EXCEPTION: u32 = 0x30;
pub const TRAP_EXCEPTION: u32 = 0x34;
pub const DIVIDE_BY_ZERO_EXCEPTION: u32 = 0x38;
pub const FLOATING_POINT_OVERFLOW: u32 = 0x3C;
pub const FLOATING_POINT_UNDERFLOW: u32 = 0x40;

pub const KEYBOARD_INTERRUPT: u32 = 0x0100;
pub const DISPLAY_INTERRUPT: u32 = 0x0200;
