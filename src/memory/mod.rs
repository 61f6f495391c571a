//! Segmented 32-bit address space with MMIO side effects.
//!
//! Backing storage is a sparse address→byte map rather than a flat `Vec<u8>`: the
//! MIPS section bases are spread across the full 32-bit range (text at
//! `0x00400000`, kernel data at `0x90000000`), so a dense array would need gigabytes
//! of unused padding. An unset address reads as zero but, unlike a zero-initialized
//! array, is distinguishable from one that was explicitly written — the interpreter's
//! fetch step relies on that distinction to detect falling off the end of a program.

pub mod section;

use std::collections::HashMap;

use crate::cause;
use crate::config::Endianness;
use crate::error::{MasmError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

pub use section::MemSection;

#[derive(Debug, Clone, Default)]
struct Mmio {
    input_ready: bool,
    input_data: u8,
    output_ready: bool,
    output_data: u8,
}

/// The byte-addressable memory backing one interpreter run.
pub struct Memory {
    cells: HashMap<u32, u8>,
    mmio: Mmio,
    endianness: Endianness,
}

impl Memory {
    pub fn new(endianness: Endianness) -> Self {
        Memory {
            cells: HashMap::new(),
            mmio: Mmio::default(),
            endianness,
        }
    }

    fn mmio_offset(address: u32) -> Option<u32> {
        let base = section::MMIO_BASE;
        if address >= base {
            Some(address - base)
        } else {
            None
        }
    }

    /// True if `address` was written (directly or via the loader), distinguishing
    /// "never touched" from "holds a zero byte".
    pub fn is_allocated(&self, address: u32) -> bool {
        self.cells.contains_key(&address)
    }

    /// Public byte read: triggers MMIO side effects at the console range.
    pub fn byte_at(&mut self, address: u32) -> u8 {
        if let Some(offset) = Self::mmio_offset(address) {
            return self.mmio_byte_at(offset);
        }
        *self.cells.get(&address).unwrap_or(&0)
    }

    /// Public byte write: rejects writes to MMIO input registers and the output
    /// ready flag, per §4.6.
    pub fn byte_to(&mut self, address: u32, value: u8) -> Result<()> {
        if let Some(offset) = Self::mmio_offset(address) {
            return self.mmio_byte_to(offset, value);
        }
        self.cells.insert(address, value);
        Ok(())
    }

    /// Privileged byte write bypassing MMIO rejection and alignment rules. Used by
    /// the loader and by the interpreter's own MMIO poller.
    pub fn sys_byte_to(&mut self, address: u32, value: u8) {
        if let Some(offset) = Self::mmio_offset(address) {
            self.mmio_sys_byte_to(offset, value);
            return;
        }
        self.cells.insert(address, value);
    }

    pub fn sys_byte_at(&self, address: u32) -> u8 {
        if let Some(offset) = Self::mmio_offset(address) {
            return self.mmio_sys_byte_at(offset);
        }
        *self.cells.get(&address).unwrap_or(&0)
    }

    fn mmio_byte_at(&mut self, offset: u32) -> u8 {
        match offset {
            0..=3 => {
                if offset == 3 {
                    self.mmio.input_ready as u8
                } else {
                    0
                }
            }
            4..=7 => {
                if offset == 7 {
                    let v = self.mmio.input_data;
                    self.mmio.input_ready = false;
                    v
                } else {
                    0
                }
            }
            8..=11 => {
                if offset == 11 {
                    self.mmio.output_ready as u8
                } else {
                    0
                }
            }
            12..=15 => {
                if offset == 15 {
                    self.mmio.output_data
                } else {
                    0
                }
            }
            _ => 0,
        }
    }

    fn mmio_byte_to(&mut self, offset: u32, value: u8) -> Result<()> {
        match offset {
            0..=3 => Err(MasmError::exec(
                cause::ADDRESS_EXCEPTION_STORE,
                "write to MMIO input_ready is rejected",
            )),
            4..=7 => Err(MasmError::exec(
                cause::ADDRESS_EXCEPTION_STORE,
                "write to MMIO input_data is rejected",
            )),
            8..=11 => Err(MasmError::exec(
                cause::ADDRESS_EXCEPTION_STORE,
                "write to MMIO output_ready is rejected",
            )),
            12..=15 => {
                if offset == 15 {
                    self.mmio.output_data = value;
                    self.mmio.output_ready = false;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn mmio_sys_byte_at(&self, offset: u32) -> u8 {
        match offset {
            3 => self.mmio.input_ready as u8,
            7 => self.mmio.input_data,
            11 => self.mmio.output_ready as u8,
            15 => self.mmio.output_data,
            _ => 0,
        }
    }

    fn mmio_sys_byte_to(&mut self, offset: u32, value: u8) {
        match offset {
            3 => self.mmio.input_ready = value & 1 != 0,
            7 => self.mmio.input_data = value,
            11 => self.mmio.output_ready = value & 1 != 0,
            15 => self.mmio.output_data = value,
            _ => {}
        }
    }

    /// Queues an incoming byte for the program to read, if the previous one has
    /// already been consumed. Returns whether the byte was accepted.
    pub fn mmio_push_input(&mut self, byte: u8) -> bool {
        if self.mmio.input_ready {
            return false;
        }
        self.mmio.input_data = byte;
        self.mmio.input_ready = true;
        true
    }

    /// Pulls a pending output byte written by the program, if any, clearing the
    /// pending flag back to idle.
    pub fn mmio_poll_output(&mut self) -> Option<u8> {
        if self.mmio.output_ready {
            None
        } else {
            self.mmio.output_ready = true;
            Some(self.mmio.output_data)
        }
    }

    pub fn mmio_set_output_idle(&mut self) {
        self.mmio.output_ready = true;
    }

    pub fn mmio_input_ready(&self) -> bool {
        self.mmio.input_ready
    }

    pub fn mmio_output_ready(&self) -> bool {
        self.mmio.output_ready
    }

    pub fn half_at(&mut self, address: u32) -> Result<u16> {
        if address % 2 != 0 {
            return Err(MasmError::exec(
                cause::ADDRESS_EXCEPTION_LOAD,
                format!("unaligned half read at {:#010x}", address),
            ));
        }
        Ok(self.read_bytes(address, 2) as u16)
    }

    pub fn half_to(&mut self, address: u32, value: u16) -> Result<()> {
        if address % 2 != 0 {
            return Err(MasmError::exec(
                cause::ADDRESS_EXCEPTION_STORE,
                format!("unaligned half write at {:#010x}", address),
            ));
        }
        self.write_bytes(address, value as u32, 2)
    }

    pub fn word_at(&mut self, address: u32) -> Result<u32> {
        if address % 4 != 0 {
            return Err(MasmError::exec(
                cause::ADDRESS_EXCEPTION_LOAD,
                format!("unaligned word read at {:#010x}", address),
            ));
        }
        Ok(self.read_bytes(address, 4))
    }

    pub fn word_to(&mut self, address: u32, value: u32) -> Result<()> {
        if address % 4 != 0 {
            return Err(MasmError::exec(
                cause::ADDRESS_EXCEPTION_STORE,
                format!("unaligned word write at {:#010x}", address),
            ));
        }
        self.write_bytes(address, value, 4)
    }

    /// Privileged word read bypassing alignment checks, for the loader/interpreter.
    pub fn sys_word_at(&self, address: u32) -> u32 {
        let mut buf = [0u8; 4];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.sys_byte_at(address + i as u32);
        }
        self.decode(&buf)
    }

    pub fn sys_word_to(&mut self, address: u32, value: u32) {
        let mut buf = [0u8; 4];
        self.encode(value, &mut buf);
        for (i, b) in buf.iter().enumerate() {
            self.sys_byte_to(address + i as u32, *b);
        }
    }

    fn read_bytes(&mut self, address: u32, size: u32) -> u32 {
        let mut buf = [0u8; 4];
        for i in 0..size {
            buf[i as usize] = self.byte_at(address + i);
        }
        self.decode(&buf[..size as usize])
    }

    fn write_bytes(&mut self, address: u32, value: u32, size: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        self.encode(value, &mut buf);
        for i in 0..size {
            self.byte_to(address + i, buf[i as usize])?;
        }
        Ok(())
    }

    fn decode(&self, buf: &[u8]) -> u32 {
        match self.endianness {
            Endianness::Big => BigEndian::read_uint(buf, buf.len()) as u32,
            Endianness::Little => LittleEndian::read_uint(buf, buf.len()) as u32,
        }
    }

    fn encode(&self, value: u32, buf: &mut [u8; 4]) {
        match self.endianness {
            Endianness::Big => BigEndian::write_u32(buf, value),
            Endianness::Little => LittleEndian::write_u32(buf, value),
        }
    }

    /// Copies a contiguous byte run into memory starting at `address`, as the
    /// loader does for each section of a `MemLayout`.
    pub fn load_bytes(&mut self, address: u32, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.sys_byte_to(address + i as u32, *b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_round_trips_at_aligned_address() {
        let mut mem = Memory::new(Endianness::Big);
        mem.sys_word_to(0x1000, 0xDEAD_BEEF);
        assert_eq!(mem.sys_word_at(0x1000), 0xDEAD_BEEF);
    }

    #[test]
    fn unaligned_word_write_raises() {
        let mut mem = Memory::new(Endianness::Big);
        assert!(mem.word_to(0x1001, 1).is_err());
    }

    #[test]
    fn unallocated_reads_zero_but_is_not_allocated() {
        let mem = Memory::new(Endianness::Big);
        assert_eq!(mem.sys_byte_at(0x2000), 0);
        assert!(!mem.is_allocated(0x2000));
    }

    #[test]
    fn mmio_input_write_is_rejected() {
        let mut mem = Memory::new(Endianness::Big);
        let addr = section::MMIO_BASE + 7;
        assert!(mem.byte_to(addr, 5).is_err());
    }

    #[test]
    fn mmio_reading_input_clears_ready() {
        let mut mem = Memory::new(Endianness::Big);
        mem.mmio_push_input(b'x');
        assert!(mem.mmio_input_ready());
        let addr = section::MMIO_BASE + 7;
        let byte = mem.byte_at(addr);
        assert_eq!(byte, b'x');
        assert!(!mem.mmio_input_ready());
    }

    #[test]
    fn mmio_writing_output_clears_ready() {
        let mut mem = Memory::new(Endianness::Big);
        mem.mmio_set_output_idle();
        assert!(mem.mmio_output_ready());
        let addr = section::MMIO_BASE + 15;
        mem.byte_to(addr, b'y').unwrap();
        assert!(!mem.mmio_output_ready());
        assert_eq!(mem.mmio_poll_output(), Some(b'y'));
        assert!(mem.mmio_output_ready());
    }
}
