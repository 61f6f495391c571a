//! `State`: everything one interpreter run owns (spec §3).

use std::collections::HashMap;

use rand::rngs::StdRng;

use crate::config::Config;
use crate::cp0::Cp0;
use crate::cp1::Cp1;
use crate::debug_info::DebugArena;
use crate::heap::HeapAllocator;
use crate::memory::Memory;
use crate::register::RegisterFile;

pub struct State {
    pub registers: RegisterFile,
    pub cp0: Cp0,
    pub cp1: Cp1,
    pub memory: Memory,
    pub heap: HeapAllocator,
    pub debug: DebugArena,
    pub rng_map: HashMap<u32, StdRng>,
    pub config: Config,
}

impl State {
    pub fn new(config: Config) -> Self {
        State {
            registers: RegisterFile::new(),
            cp0: Cp0::new(),
            cp1: Cp1::new(),
            memory: Memory::new(config.endianness),
            heap: HeapAllocator::new(),
            debug: DebugArena::new(),
            rng_map: HashMap::new(),
            config,
        }
    }
}
