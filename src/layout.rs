//! The assembler's output: raw section bytes plus debug info, consumed once by the
//! interpreter's loader (spec §3 "MemLayout" / "Lifecycle").

use crate::debug_info::DebugArena;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionBytes {
    pub text: Vec<u8>,
    pub data: Vec<u8>,
    pub ktext: Vec<u8>,
    pub kdata: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct MemLayout {
    pub sections: SectionBytes,
    pub debug: DebugArena,
}

impl MemLayout {
    pub fn new() -> Self {
        MemLayout::default()
    }
}
