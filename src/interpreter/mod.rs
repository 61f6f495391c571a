//! Fetch/decode/execute, exception and interrupt delivery, and the loader that
//! turns a `MemLayout` into a running `State` (spec §4.7).
//!
//! The dispatch shape — one big match over decoded fields, delegated to small
//! per-shape execute functions — follows the teacher's `Core::tick`; the MIPS
//! op/funct decode tree itself (§4.7 point 6) replaces the teacher's custom ISA.

mod exec;

use crate::cause;
use crate::config::IoMode;
use crate::console::Console;
use crate::constants::*;
use crate::cp0::{self, STATUS_DISPLAY_MASK, STATUS_KEYBOARD_MASK};
use crate::error::{MasmError, Result};
use crate::layout::MemLayout;
use crate::memory::section::{KTEXT_BASE, TEXT_BASE, TEXT_UPPER_BOUND};
use crate::register::Gpr;
use crate::state::State;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Exited(i32),
}

/// Copies a `MemLayout`'s sections into memory and sets up the initial machine
/// state (spec §4.7 "Initialization").
pub fn load(state: &mut State, layout: &MemLayout) {
    debug!(
        "loading layout: text={}B data={}B ktext={}B kdata={}B",
        layout.sections.text.len(),
        layout.sections.data.len(),
        layout.sections.ktext.len(),
        layout.sections.kdata.len(),
    );
    state.memory.load_bytes(TEXT_BASE, &layout.sections.text);
    state
        .memory
        .load_bytes(crate::memory::section::DATA_BASE, &layout.sections.data);
    state.memory.load_bytes(KTEXT_BASE, &layout.sections.ktext);
    state
        .memory
        .load_bytes(crate::memory::section::KDATA_BASE, &layout.sections.kdata);
    state.debug = layout.debug.clone();

    state.registers.set_u(Gpr::Pc, TEXT_BASE);
    state
        .registers
        .set_u(Gpr::Sp, crate::memory::section::STACK_BASE);
    state
        .registers
        .set_u(Gpr::Fp, crate::memory::section::STACK_BASE);
    state
        .registers
        .set_u(Gpr::Gp, crate::memory::section::GLOBAL_BASE);

    state.memory.mmio_set_output_idle();
    state
        .cp0
        .set_status(cp0::STATUS_INTERRUPT_ENABLE | STATUS_KEYBOARD_MASK | STATUS_DISPLAY_MASK);

    info!("interpreter starting at {:#010x}", TEXT_BASE);
}

fn current_locator_message(state: &State, pc: u32, default_file: &str) -> (String, usize) {
    match state.debug.locator_at(pc) {
        Some(loc) => (loc.file.clone(), loc.line),
        None => (default_file.to_string(), 0),
    }
}

fn deliver_exception(state: &mut State, cause_bits: u32, fallback_msg: &str) -> Result<()> {
    if !state.memory.is_allocated(KTEXT_BASE) {
        let pc = state.registers.get_u(Gpr::Pc).wrapping_sub(4);
        let (file, line) = current_locator_message(state, pc, "<unknown>");
        warn!("exception cause={:#x} unhandled (no ktext): {}", cause_bits, fallback_msg);
        return Err(MasmError::runtime(pc, file, line, fallback_msg));
    }
    let pc = state.registers.get_u(Gpr::Pc);
    state.cp0.set_epc(pc.wrapping_sub(4));
    state.cp0.set_cause(cause_bits);
    state.registers.set_u(Gpr::Pc, KTEXT_BASE);
    debug!("exception cause={:#x} delivered, jumping to ktext at {:#010x}", cause_bits, KTEXT_BASE);
    Ok(())
}

fn eret(state: &mut State) {
    let epc = state.cp0.epc();
    state.registers.set_u(Gpr::Pc, epc);
    state.cp0.set_epc(0);
    state.cp0.set_cause(0);
}

/// One interpreter step, per spec §4.7.
pub fn step(state: &mut State, console: &mut dyn Console) -> Result<StepOutcome> {
    let pc = state.registers.get_u(Gpr::Pc);
    let mut mmio_cause: u32 = 0;

    if state.config.io_mode == IoMode::Mmio && pc < KTEXT_BASE {
        let enabled = state.cp0.interrupts_enabled();
        if !state.memory.mmio_input_ready() {
            if let Some(byte) = console.poll_byte() {
                state.memory.mmio_push_input(byte);
                if enabled && state.cp0.status() & STATUS_KEYBOARD_MASK != 0 {
                    mmio_cause |= cause::KEYBOARD_INTERRUPT;
                }
            }
        }
        if let Some(byte) = state.memory.mmio_poll_output() {
            let _ = console.write_byte(byte);
            if enabled && state.cp0.status() & STATUS_DISPLAY_MASK != 0 {
                mmio_cause |= cause::DISPLAY_INTERRUPT;
            }
        }
    }

    if !state.memory.is_allocated(pc) {
        return Err(MasmError::exit(-1, "fell off end of program"));
    }
    if pc < KTEXT_BASE && pc >= TEXT_UPPER_BOUND {
        let (file, line) = current_locator_message(state, pc, "<unknown>");
        return Err(MasmError::runtime(pc, file, line, "pc out of bounds"));
    }

    let word = state.memory.sys_word_at(pc);
    state.registers.set_u(Gpr::Pc, pc.wrapping_add(4));

    if mmio_cause != 0 {
        return match deliver_exception(state, mmio_cause, "unhandled interrupt") {
            Ok(()) => Ok(StepOutcome::Continue),
            Err(e) => Err(e),
        };
    }

    match exec::dispatch(state, word, console) {
        Ok(()) => Ok(StepOutcome::Continue),
        Err(MasmError::Exec { cause, message }) => {
            match deliver_exception(state, cause, &message) {
                Ok(()) => Ok(StepOutcome::Continue),
                Err(e) => Err(e),
            }
        }
        Err(MasmError::Exit { code, .. }) => Ok(StepOutcome::Exited(code)),
        Err(e) => Err(e),
    }
}

/// Runs `state` to completion, returning the program's exit code.
pub fn interpret(state: &mut State, console: &mut dyn Console) -> Result<i32> {
    loop {
        match step(state, console)? {
            StepOutcome::Continue => continue,
            StepOutcome::Exited(code) => return Ok(code),
        }
    }
}

pub(crate) fn sign_extend_16(imm: u16) -> i32 {
    imm as i16 as i32
}
