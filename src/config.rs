//! Run-wide knobs threaded through the assembler and the interpreter.

/// Byte order used for multi-byte values in memory and in directive encoding.
/// Never affects the object container (§4.9), which has its own fixed layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Big
    }
}

/// Whether user I/O goes through blocking syscalls or through MMIO polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Syscall,
    Mmio,
}

impl Default for IoMode {
    fn default() -> Self {
        IoMode::Syscall
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    pub endianness: Endianness,
    pub io_mode: IoMode,
}

impl Config {
    pub fn new(endianness: Endianness, io_mode: IoMode) -> Self {
        Config { endianness, io_mode }
    }
}
