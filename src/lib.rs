//! A MIPS32 assembler and interpreter core: fixed-format binary encode/decode,
//! segmented memory with an MMIO console, coprocessors 0 and 1, and the syscall
//! table an assembled program runs against.
//!
//! This crate is the execution engine; `masm-asm` turns source text into a
//! [`layout::MemLayout`] and `masm-obj` serializes one to and from the object
//! container format.

#[macro_use]
extern crate log;

pub mod cause;
pub mod config;
pub mod console;
pub mod constants;
pub mod cp0;
pub mod cp1;
pub mod debug_info;
pub mod error;
pub mod heap;
pub mod interpreter;
pub mod layout;
pub mod memory;
pub mod register;
pub mod state;
pub mod syscalls;

pub use config::Config;
pub use error::{MasmError, Result};
pub use layout::MemLayout;
pub use state::State;

#[cfg(test)]
mod tests {
    use crate::config::{Config, IoMode};
    use crate::console::BufferConsole;
    use crate::constants::*;
    use crate::error::MasmError;
    use crate::interpreter::{self, StepOutcome};
    use crate::layout::MemLayout;
    use crate::memory::section::{DATA_BASE, TEXT_BASE};
    use crate::register::Gpr;
    use crate::state::State;

    fn push_word(layout: &mut MemLayout, word: u32) {
        layout.sections.text.extend_from_slice(&word.to_be_bytes());
    }

    #[test]
    fn hello_world_print_string_then_exit() {
        let mut layout = MemLayout::new();
        push_word(&mut layout, pack_i(0x09, 0, Gpr::V0.index() as u32, 4)); // li v0, 4
        push_word(
            &mut layout,
            pack_i(0x0F, 0, Gpr::A0.index() as u32, (DATA_BASE >> 16) as u16),
        ); // lui a0, hi(data)
        push_word(
            &mut layout,
            pack_i(
                0x0D,
                Gpr::A0.index() as u32,
                Gpr::A0.index() as u32,
                (DATA_BASE & 0xFFFF) as u16,
            ),
        ); // ori a0, a0, lo(data)
        push_word(&mut layout, SYSCALL_WORD);
        push_word(&mut layout, pack_i(0x09, 0, Gpr::V0.index() as u32, 10)); // li v0, 10
        push_word(&mut layout, SYSCALL_WORD);

        let mut data = b"Hi\n".to_vec();
        data.push(0);
        layout.sections.data = data;

        let mut state = State::new(Config::default());
        interpreter::load(&mut state, &layout);
        let mut console = BufferConsole::default();
        let code = interpreter::interpret(&mut state, &mut console).unwrap();

        assert_eq!(code, 0);
        assert_eq!(console.output_string(), "Hi\n");
    }

    #[test]
    fn mult_then_mflo_reads_low_word() {
        let mut layout = MemLayout::new();
        push_word(&mut layout, pack_i(0x09, 0, Gpr::T0.index() as u32, 5)); // li t0, 5
        push_word(&mut layout, pack_i(0x09, 0, Gpr::T1.index() as u32, 3)); // li t1, 3
        push_word(
            &mut layout,
            pack_r(Gpr::T0.index() as u32, Gpr::T1.index() as u32, 0, 0, 0x18),
        ); // mult t0, t1
        push_word(
            &mut layout,
            pack_r(0, 0, Gpr::T2.index() as u32, 0, 0x12),
        ); // mflo t2

        let mut state = State::new(Config::default());
        interpreter::load(&mut state, &layout);
        let mut console = BufferConsole::default();
        for _ in 0..4 {
            interpreter::step(&mut state, &mut console).unwrap();
        }

        assert_eq!(state.registers.get_i(Gpr::T2), 15);
    }

    #[test]
    fn add_overflow_without_ktext_surfaces_as_runtime_error() {
        let mut layout = MemLayout::new();
        push_word(
            &mut layout,
            pack_r(Gpr::T0.index() as u32, Gpr::T1.index() as u32, Gpr::T2.index() as u32, 0, 0x20),
        ); // add t2, t0, t1

        let mut state = State::new(Config::default());
        interpreter::load(&mut state, &layout);
        state.registers.set_i(Gpr::T0, i32::MAX);
        state.registers.set_i(Gpr::T1, 1);

        let mut console = BufferConsole::default();
        let err = interpreter::step(&mut state, &mut console).unwrap_err();
        assert!(matches!(err, MasmError::Runtime { .. }));
    }

    #[test]
    fn divide_by_zero_surfaces_as_runtime_error() {
        let mut layout = MemLayout::new();
        push_word(
            &mut layout,
            pack_r(Gpr::T0.index() as u32, Gpr::T1.index() as u32, 0, 0, 0x1A),
        ); // div t0, t1

        let mut state = State::new(Config::default());
        interpreter::load(&mut state, &layout);
        state.registers.set_i(Gpr::T0, 10);
        state.registers.set_i(Gpr::T1, 0);

        let mut console = BufferConsole::default();
        let err = interpreter::step(&mut state, &mut console).unwrap_err();
        assert!(matches!(err, MasmError::Runtime { .. }));
    }

    #[test]
    fn mmio_mode_surfaces_polled_input_as_ready() {
        let config = Config {
            io_mode: IoMode::Mmio,
            ..Config::default()
        };
        let layout = MemLayout::new();

        let mut state = State::new(config);
        interpreter::load(&mut state, &layout);

        let mut console = BufferConsole::with_input("z");
        let _ = interpreter::step(&mut state, &mut console);
        assert!(state.memory.mmio_input_ready());
    }

    #[test]
    fn fell_off_end_of_program_exits_minus_one() {
        let layout = MemLayout::new();
        let mut state = State::new(Config::default());
        interpreter::load(&mut state, &layout);

        let mut console = BufferConsole::default();
        let err = interpreter::step(&mut state, &mut console).unwrap_err();
        assert!(matches!(err, MasmError::Exit { code: -1, .. }));
    }

    #[test]
    fn loader_sets_pc_to_text_base() {
        let layout = MemLayout::new();
        let mut state = State::new(Config::default());
        interpreter::load(&mut state, &layout);
        assert_eq!(state.registers.get_u(Gpr::Pc), TEXT_BASE);
    }

    #[test]
    fn step_outcome_continue_is_distinct_from_exit() {
        assert_ne!(StepOutcome::Continue, StepOutcome::Exited(0));
    }
}
