//! The syscall table (spec §4.8), dispatched on the value in `$v0` when the
//! interpreter fetches a `syscall` instruction.
//!
//! Grounded on the original `SystemHandle::exec` switch: each handler reads its
//! arguments from `$a0`/`$a1`, some also write `$v0`, and console-facing handlers
//! are rejected outright in MMIO mode rather than attempting a blocking read.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cause;
use crate::config::IoMode;
use crate::console::Console;
use crate::error::{MasmError, Result};
use crate::register::Gpr;
use crate::state::State;

const PRINT_INT: i32 = 1;
const PRINT_STRING: i32 = 4;
const READ_INT: i32 = 5;
const READ_STRING: i32 = 8;
const HEAP_ALLOC: i32 = 9;
const EXIT: i32 = 10;
const PRINT_CHAR: i32 = 11;
const READ_CHAR: i32 = 12;
const EXIT_VAL: i32 = 17;
const TIME: i32 = 30;
const SLEEP: i32 = 32;
const PRINT_INT_HEX: i32 = 34;
const PRINT_INT_BIN: i32 = 35;
const PRINT_UINT: i32 = 36;
const SET_SEED: i32 = 40;
const RAND_INT: i32 = 41;
const RAND_INT_RANGE: i32 = 42;

fn requires_syscall_mode(state: &State, name: &str) -> Result<()> {
    if state.config.io_mode != IoMode::Syscall {
        return Err(MasmError::exec(
            cause::SYSCALL_EXCEPTION,
            format!("{} syscall not supported in MMIO mode", name),
        ));
    }
    Ok(())
}

fn io_err(e: std::io::Error) -> MasmError {
    MasmError::exec(cause::SYSCALL_EXCEPTION, e.to_string())
}

/// Runs the syscall selected by `$v0`. Returning `Ok(())` means "keep stepping";
/// `Err(MasmError::Exit { .. })` is the normal-termination path back through
/// [`crate::interpreter::step`].
pub fn exec(state: &mut State, console: &mut dyn Console) -> Result<()> {
    let code = state.registers.get_i(Gpr::V0);

    match code {
        PRINT_INT => {
            requires_syscall_mode(state, "PRINT_INT")?;
            let value = state.registers.get_i(Gpr::A0);
            console.write_str(&value.to_string()).map_err(io_err)
        }
        PRINT_STRING => {
            requires_syscall_mode(state, "PRINT_STRING")?;
            let mut addr = state.registers.get_u(Gpr::A0);
            loop {
                let byte = state.memory.byte_at(addr);
                if byte == 0 {
                    break;
                }
                console.write_byte(byte).map_err(io_err)?;
                addr += 1;
            }
            Ok(())
        }
        READ_INT => {
            requires_syscall_mode(state, "READ_INT")?;
            let line = console.read_line().map_err(io_err)?;
            let value: i32 = line
                .trim()
                .parse()
                .map_err(|_| MasmError::exec(cause::SYSCALL_EXCEPTION, format!("invalid input: {}", line)))?;
            state.registers.set_i(Gpr::V0, value);
            Ok(())
        }
        READ_STRING => {
            requires_syscall_mode(state, "READ_STRING")?;
            let addr = state.registers.get_u(Gpr::A0);
            let length = state.registers.get_i(Gpr::A1).max(0) as u32;
            let mut written = 0u32;
            while written < length {
                let byte = console.read_byte().map_err(io_err)?;
                if byte == b'\n' {
                    break;
                }
                if byte != 0x08 {
                    state.memory.byte_to(addr + written, byte)?;
                    written += 1;
                } else if written > 0 {
                    written -= 1;
                }
            }
            Ok(())
        }
        HEAP_ALLOC => {
            let size = state.registers.get_i(Gpr::A0).max(0) as u32;
            let ptr = state
                .heap
                .allocate(size)
                .map_err(|e| MasmError::exec(cause::SYSCALL_EXCEPTION, e.0))?;
            state.registers.set_u(Gpr::V0, ptr);
            Ok(())
        }
        EXIT => Err(MasmError::exit(0, "program exited with code 0")),
        PRINT_CHAR => {
            requires_syscall_mode(state, "PRINT_CHAR")?;
            let c = state.registers.get_i(Gpr::A0) as u8;
            console.write_byte(c).map_err(io_err)
        }
        READ_CHAR => {
            requires_syscall_mode(state, "READ_CHAR")?;
            let c = console.read_byte().map_err(io_err)?;
            state.registers.set_i(Gpr::V0, c as i32);
            Ok(())
        }
        EXIT_VAL => {
            let code = state.registers.get_i(Gpr::A0);
            Err(MasmError::exit(code, format!("program exited with code {}", code)))
        }
        TIME => {
            let millis = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0) as i64;
            state.registers.set_u(Gpr::A0, millis as u32);
            state.registers.set_u(Gpr::A1, (millis >> 32) as u32);
            Ok(())
        }
        SLEEP => {
            let millis = state.registers.get_i(Gpr::A0);
            if millis < 0 {
                return Err(MasmError::exec(
                    cause::SYSCALL_EXCEPTION,
                    format!("negative sleep time: {}", millis),
                ));
            }
            std::thread::sleep(std::time::Duration::from_millis(millis as u64));
            Ok(())
        }
        PRINT_INT_HEX => {
            requires_syscall_mode(state, "PRINT_INT_HEX")?;
            let value = state.registers.get_u(Gpr::A0);
            console.write_str(&format!("{:08x}", value)).map_err(io_err)
        }
        PRINT_INT_BIN => {
            requires_syscall_mode(state, "PRINT_INT_BIN")?;
            let value = state.registers.get_u(Gpr::A0);
            console.write_str(&format!("{:032b}", value)).map_err(io_err)
        }
        PRINT_UINT => {
            requires_syscall_mode(state, "PRINT_UINT")?;
            let value = state.registers.get_u(Gpr::A0);
            console.write_str(&value.to_string()).map_err(io_err)
        }
        SET_SEED => {
            let id = state.registers.get_u(Gpr::A0);
            let seed = state.registers.get_u(Gpr::A1);
            state.rng_map.insert(id, StdRng::seed_from_u64(seed as u64));
            Ok(())
        }
        RAND_INT => {
            let id = state.registers.get_u(Gpr::A0);
            let rng = rng_for(state, id);
            let value = rng.gen_range(0i64, i32::MAX as i64 + 1) as i32;
            state.registers.set_i(Gpr::A0, value);
            Ok(())
        }
        RAND_INT_RANGE => {
            let id = state.registers.get_u(Gpr::A0);
            let max = state.registers.get_i(Gpr::A1);
            let rng = rng_for(state, id);
            let value: i32 = rng.gen_range(0, max.max(0) + 1);
            state.registers.set_i(Gpr::A0, value);
            Ok(())
        }
        other => {
            warn!("unknown syscall {} dispatched", other);
            Err(MasmError::exec(
                cause::SYSCALL_EXCEPTION,
                format!("unknown syscall {}", other),
            ))
        }
    }
}

fn rng_for(state: &mut State, id: u32) -> &mut StdRng {
    state.rng_map.entry(id).or_insert_with(|| {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        StdRng::seed_from_u64(seed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::console::BufferConsole;

    fn new_state() -> State {
        State::new(Config::default())
    }

    #[test]
    fn exit_val_carries_code_through_error() {
        let mut state = new_state();
        state.registers.set_i(Gpr::V0, EXIT_VAL);
        state.registers.set_i(Gpr::A0, 7);
        let mut console = BufferConsole::default();
        let err = exec(&mut state, &mut console).unwrap_err();
        assert!(matches!(err, MasmError::Exit { code: 7, .. }));
    }

    #[test]
    fn print_string_reads_until_nul() {
        let mut state = new_state();
        let addr = 0x1001_0000;
        for (i, b) in b"hi\0".iter().enumerate() {
            state.memory.sys_byte_to(addr + i as u32, *b);
        }
        state.registers.set_i(Gpr::V0, PRINT_STRING);
        state.registers.set_u(Gpr::A0, addr);
        let mut console = BufferConsole::default();
        exec(&mut state, &mut console).unwrap();
        assert_eq!(console.output_string(), "hi");
    }

    #[test]
    fn print_int_rejected_in_mmio_mode() {
        let mut state = new_state();
        state.config.io_mode = IoMode::Mmio;
        state.registers.set_i(Gpr::V0, PRINT_INT);
        let mut console = BufferConsole::default();
        let err = exec(&mut state, &mut console).unwrap_err();
        assert!(matches!(err, MasmError::Exec { .. }));
    }

    #[test]
    fn rand_int_range_is_seed_stable() {
        let mut state = new_state();
        state.registers.set_u(Gpr::A0, 1);
        state.registers.set_u(Gpr::A1, 5);
        state.registers.set_i(Gpr::V0, SET_SEED);
        let mut console = BufferConsole::default();
        exec(&mut state, &mut console).unwrap();

        state.registers.set_i(Gpr::V0, RAND_INT_RANGE);
        state.registers.set_u(Gpr::A0, 1);
        state.registers.set_i(Gpr::A1, 10);
        exec(&mut state, &mut console).unwrap();
        let first = state.registers.get_i(Gpr::A0);
        assert!((0..=10).contains(&first));
    }

    #[test]
    fn heap_alloc_writes_pointer_to_v0() {
        let mut state = new_state();
        state.registers.set_i(Gpr::V0, HEAP_ALLOC);
        state.registers.set_i(Gpr::A0, 16);
        let mut console = BufferConsole::default();
        exec(&mut state, &mut console).unwrap();
        assert_ne!(state.registers.get_u(Gpr::V0), 0);
    }
}
