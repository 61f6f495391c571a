//! Decode/dispatch table for one fetched instruction word (spec §4.7 point 6).

use super::{eret, sign_extend_16};
use crate::cause;
use crate::console::Console;
use crate::constants::*;
use crate::error::{MasmError, Result};
use crate::register::Gpr;
use crate::state::State;

fn exc(code: u32, msg: impl Into<String>) -> MasmError {
    MasmError::exec(code, msg)
}

pub fn dispatch(state: &mut State, word: u32, console: &mut dyn Console) -> Result<()> {
    if word == SYSCALL_WORD {
        return crate::syscalls::exec(state, console);
    }
    if word == ERET_WORD {
        eret(state);
        return Ok(());
    }

    let opcode = opcode_of(word);
    match opcode {
        OPCODE_CP0 => exec_cp0(state, word),
        OPCODE_CP1 => exec_cp1(state, word),
        OPCODE_SPECIAL => exec_r(state, word),
        OPCODE_J | OPCODE_JAL => exec_j(state, word, opcode),
        op if CP1_MEM_OPCODES.contains(&op) => exec_cp1_mem(state, word, op),
        _ => exec_i(state, word, opcode),
    }
}

fn reg(index: u32) -> Gpr {
    Gpr::from_index(index as usize).expect("5-bit register field always in range")
}

fn exec_r(state: &mut State, word: u32) -> Result<()> {
    let f = unpack_r(word);
    let (rs, rt, rd) = (reg(f.rs), reg(f.rt), reg(f.rd));
    let rs_i = state.registers.get_i(rs);
    let rt_i = state.registers.get_i(rt);
    let rs_u = state.registers.get_u(rs);
    let rt_u = state.registers.get_u(rt);

    match f.funct {
        0x20 => {
            let v = rs_i
                .checked_add(rt_i)
                .ok_or_else(|| exc(cause::ARITHMETIC_OVERFLOW_EXCEPTION, "add overflow"))?;
            state.registers.set_i(rd, v);
        }
        0x21 => state.registers.set_u(rd, rs_u.wrapping_add(rt_u)),
        0x22 => {
            let v = rs_i
                .checked_sub(rt_i)
                .ok_or_else(|| exc(cause::ARITHMETIC_OVERFLOW_EXCEPTION, "sub overflow"))?;
            state.registers.set_i(rd, v);
        }
        0x23 => state.registers.set_u(rd, rs_u.wrapping_sub(rt_u)),
        0x24 => state.registers.set_u(rd, rs_u & rt_u),
        0x25 => state.registers.set_u(rd, rs_u | rt_u),
        0x26 => state.registers.set_u(rd, rs_u ^ rt_u),
        0x27 => state.registers.set_u(rd, !(rs_u | rt_u)),
        0x2A => state.registers.set_i(rd, (rs_i < rt_i) as i32),
        0x2B => state.registers.set_u(rd, (rs_u < rt_u) as u32),
        0x00 => state.registers.set_u(rd, rt_u << f.shamt),
        0x02 => state.registers.set_u(rd, rt_u >> f.shamt),
        0x03 => state.registers.set_i(rd, rt_i >> f.shamt),
        0x04 => state.registers.set_u(rd, rt_u << (rs_u & 0x1F)),
        0x06 => state.registers.set_u(rd, rt_u >> (rs_u & 0x1F)),
        0x07 => state.registers.set_i(rd, rt_i >> (rs_u & 0x1F)),
        0x08 => state.registers.set_u(Gpr::Pc, rs_u),
        0x09 => {
            let link = state.registers.get_u(Gpr::Pc);
            let link_reg = if f.rd == 0 { Gpr::Ra } else { rd };
            state.registers.set_u(link_reg, link);
            state.registers.set_u(Gpr::Pc, rs_u);
        }
        0x10 => state.registers.set_u(rd, state.registers.get_u(Gpr::Hi)),
        0x11 => state.registers.set_u(Gpr::Hi, rs_u),
        0x12 => state.registers.set_u(rd, state.registers.get_u(Gpr::Lo)),
        0x13 => state.registers.set_u(Gpr::Lo, rs_u),
        0x18 => {
            let v = (rs_i as i64) * (rt_i as i64);
            state.registers.set_u(Gpr::Lo, v as u32);
            state.registers.set_u(Gpr::Hi, (v >> 32) as u32);
        }
        0x19 => {
            let v = (rs_u as u64) * (rt_u as u64);
            state.registers.set_u(Gpr::Lo, v as u32);
            state.registers.set_u(Gpr::Hi, (v >> 32) as u32);
        }
        0x1A => {
            if rt_i == 0 {
                return Err(exc(cause::DIVIDE_BY_ZERO_EXCEPTION, "division by zero"));
            }
            state.registers.set_i(Gpr::Lo, rs_i.wrapping_div(rt_i));
            state.registers.set_i(Gpr::Hi, rs_i.wrapping_rem(rt_i));
        }
        0x1B => {
            if rt_u == 0 {
                return Err(exc(cause::DIVIDE_BY_ZERO_EXCEPTION, "division by zero"));
            }
            state.registers.set_u(Gpr::Lo, rs_u / rt_u);
            state.registers.set_u(Gpr::Hi, rs_u % rt_u);
        }
        0x0D => return Err(exc(cause::BREAKPOINT_EXCEPTION, "breakpoint")),
        _ => {
            return Err(exc(
                cause::RESERVED_INSTRUCTION_EXCEPTION,
                format!("unknown R-type funct {:#x}", f.funct),
            ))
        }
    }
    Ok(())
}

fn exec_i(state: &mut State, word: u32, opcode: u32) -> Result<()> {
    let f = unpack_r(word);
    let (rs, rt) = (reg(f.rs), reg(f.rt));
    let imm16 = (word & IMM16_MASK) as u16;
    let imm_s = sign_extend_16(imm16);
    let rs_i = state.registers.get_i(rs);
    let rs_u = state.registers.get_u(rs);

    match opcode {
        0x08 => {
            let v = rs_i
                .checked_add(imm_s)
                .ok_or_else(|| exc(cause::ARITHMETIC_OVERFLOW_EXCEPTION, "addi overflow"))?;
            state.registers.set_i(rt, v);
        }
        0x09 => state.registers.set_i(rt, rs_i.wrapping_add(imm_s)),
        0x0C => state.registers.set_u(rt, rs_u & imm16 as u32),
        0x0D => state.registers.set_u(rt, rs_u | imm16 as u32),
        0x0E => state.registers.set_u(rt, rs_u ^ imm16 as u32),
        0x0F => state.registers.set_u(rt, (imm16 as u32) << 16),
        0x0A => state.registers.set_i(rt, (rs_i < imm_s) as i32),
        0x0B => state
            .registers
            .set_u(rt, (rs_u < imm_s as u32) as u32),
        0x04 => {
            if rs_u == state.registers.get_u(rt) {
                branch(state, imm16);
            }
        }
        0x05 => {
            if rs_u != state.registers.get_u(rt) {
                branch(state, imm16);
            }
        }
        0x20 => {
            let addr = (rs_u as i32).wrapping_add(imm_s) as u32;
            let v = state.memory.byte_at(addr) as i8 as i32;
            state.registers.set_i(rt, v);
        }
        0x24 => {
            let addr = (rs_u as i32).wrapping_add(imm_s) as u32;
            let v = state.memory.byte_at(addr) as u32;
            state.registers.set_u(rt, v);
        }
        0x21 => {
            let addr = (rs_u as i32).wrapping_add(imm_s) as u32;
            let v = state.memory.half_at(addr)? as i16 as i32;
            state.registers.set_i(rt, v);
        }
        0x25 => {
            let addr = (rs_u as i32).wrapping_add(imm_s) as u32;
            let v = state.memory.half_at(addr)? as u32;
            state.registers.set_u(rt, v);
        }
        0x23 => {
            let addr = (rs_u as i32).wrapping_add(imm_s) as u32;
            let v = state.memory.word_at(addr)?;
            state.registers.set_u(rt, v);
        }
        0x28 => {
            let addr = (rs_u as i32).wrapping_add(imm_s) as u32;
            state.memory.byte_to(addr, state.registers.get_u(rt) as u8)?;
        }
        0x29 => {
            let addr = (rs_u as i32).wrapping_add(imm_s) as u32;
            state
                .memory
                .half_to(addr, state.registers.get_u(rt) as u16)?;
        }
        0x2B => {
            let addr = (rs_u as i32).wrapping_add(imm_s) as u32;
            state.memory.word_to(addr, state.registers.get_u(rt))?;
        }
        _ => {
            return Err(exc(
                cause::RESERVED_INSTRUCTION_EXCEPTION,
                format!("unknown I-type opcode {:#x}", opcode),
            ))
        }
    }
    Ok(())
}

fn branch(state: &mut State, imm16: u16) {
    let pc = state.registers.get_u(Gpr::Pc);
    let offset = sign_extend_16(imm16) << 2;
    state.registers.set_u(Gpr::Pc, (pc as i32).wrapping_add(offset) as u32);
}

fn exec_j(state: &mut State, word: u32, opcode: u32) -> Result<()> {
    let addr26 = word & ADDR26_MASK;
    let pc = state.registers.get_u(Gpr::Pc);
    if opcode == OPCODE_JAL {
        state.registers.set_u(Gpr::Ra, pc);
    }
    let target = (pc & PC_UPPER_MASK) | (addr26 << 2);
    state.registers.set_u(Gpr::Pc, target);
    Ok(())
}

fn exec_cp0(state: &mut State, word: u32) -> Result<()> {
    let f = unpack_r(word);
    match f.rs {
        CP0_MOVE_FROM_RS => {
            let v = state.cp0.get(f.rd as usize);
            state.registers.set_u(reg(f.rt), v);
        }
        CP0_MOVE_TO_RS => {
            let v = state.registers.get_u(reg(f.rt));
            state.cp0.set(f.rd as usize, v);
        }
        _ => {
            return Err(exc(
                cause::RESERVED_INSTRUCTION_EXCEPTION,
                "unknown CP0 move direction",
            ))
        }
    }
    Ok(())
}

fn exec_cp1(state: &mut State, word: u32) -> Result<()> {
    let f = unpack_r(word);
    let sub = (word >> CP1_SUB_OFFSET) & CP1_SUB_MASK;

    match sub {
        CP1_MOVE_FROM_SUB => {
            let v = state.cp1.get_word(f.rd as usize);
            state.registers.set_u(reg(f.rt), v);
        }
        CP1_MOVE_TO_SUB => {
            let v = state.registers.get_u(reg(f.rt));
            state.cp1.set_word(f.rd as usize, v);
        }
        CP1_COND_BRANCH_SUB => {
            let flag_index = ((word >> 18) & 0x7) as usize;
            let tf = (word >> 16) & 1 == 1;
            let imm16 = (word & IMM16_MASK) as u16;
            if state.cp1.flag(flag_index) == tf {
                branch(state, imm16);
            }
        }
        _ => {
            let is_compare = f.funct & 0x30 == 0x30;
            let fs = state.cp1.get_float(f.rd as usize);
            let ft = state.cp1.get_float(f.rt as usize);
            if is_compare {
                let cond = f.funct & 0xF;
                let result = match cond {
                    0x2 => fs == ft,
                    0xC => fs < ft,
                    0xE => fs <= ft,
                    _ => {
                        return Err(exc(
                            cause::RESERVED_INSTRUCTION_EXCEPTION,
                            "unknown CP1 compare condition",
                        ))
                    }
                };
                state.cp1.set_flag(0, result);
            } else {
                let v = match f.funct {
                    0x00 => fs + ft,
                    0x01 => fs - ft,
                    0x02 => fs * ft,
                    0x03 => fs / ft,
                    _ => {
                        return Err(exc(
                            cause::RESERVED_INSTRUCTION_EXCEPTION,
                            format!("unknown CP1 funct {:#x}", f.funct),
                        ))
                    }
                };
                state.cp1.set_float(f.shamt as usize, v);
            }
        }
    }
    Ok(())
}

fn exec_cp1_mem(state: &mut State, word: u32, opcode: u32) -> Result<()> {
    let f = unpack_r(word);
    let base = reg(f.rs);
    let imm_s = sign_extend_16((word & IMM16_MASK) as u16);
    let addr = (state.registers.get_u(base) as i32).wrapping_add(imm_s) as u32;

    match opcode {
        0x31 => {
            let v = state.memory.word_at(addr)?;
            state.cp1.set_word(f.rt as usize, v);
        }
        0x39 => {
            let v = state.cp1.get_word(f.rt as usize);
            state.memory.word_to(addr, v)?;
        }
        0x35 => {
            let lo = state.memory.word_at(addr)?;
            let hi = state.memory.word_at(addr + 4)?;
            state.cp1.set_word(f.rt as usize, lo);
            state.cp1.set_word(f.rt as usize + 1, hi);
        }
        0x3D => {
            let lo = state.cp1.get_word(f.rt as usize);
            let hi = state.cp1.get_word(f.rt as usize + 1);
            state.memory.word_to(addr, lo)?;
            state.memory.word_to(addr + 4, hi)?;
        }
        _ => unreachable!("opcode filtered by CP1_MEM_OPCODES"),
    }
    Ok(())
}
