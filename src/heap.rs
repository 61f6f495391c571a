//! First-fit heap allocator over the fixed heap segment (spec §4.8).

use crate::memory::section::{HEAP_BASE, HEAP_SIZE};
use std::fmt;

/// Allocator-local failure; callers (the `heap_alloc` syscall) attach PC/source
/// context and raise the crate-wide `MasmError` from this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapError(pub String);

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HeapError {}

/// Two parallel sequences of `(address, size)` kept sorted by address; no free
/// operation is exposed, matching the bump-style allocator the spec describes.
#[derive(Debug, Clone)]
pub struct HeapAllocator {
    addresses: Vec<u32>,
    sizes: Vec<u32>,
}

impl HeapAllocator {
    pub fn new() -> Self {
        HeapAllocator {
            addresses: Vec::new(),
            sizes: Vec::new(),
        }
    }

    fn next_free(&self, size: u32) -> u32 {
        let mut ptr = HEAP_BASE;
        for (addr, blk_size) in self.addresses.iter().zip(self.sizes.iter()) {
            if addr.saturating_sub(ptr) >= size {
                return ptr;
            }
            ptr = addr + blk_size;
        }
        ptr
    }

    pub fn allocate(&mut self, size: u32) -> Result<u32, HeapError> {
        if size == 0 {
            return Err(HeapError("cannot allocate zero bytes".to_string()));
        }
        let address = self.next_free(size);
        if address >= HEAP_BASE + HEAP_SIZE {
            return Err(HeapError("heap overflow".to_string()));
        }

        let position = self
            .addresses
            .iter()
            .position(|&existing| existing > address)
            .unwrap_or(self.addresses.len());
        self.addresses.insert(position, address);
        self.sizes.insert(position, size);
        Ok(address)
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        HeapAllocator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_matches_spec_scenario() {
        let mut heap = HeapAllocator::new();
        let a = heap.allocate(100).unwrap();
        let b = heap.allocate(50).unwrap();
        let c = heap.allocate(200).unwrap();
        assert_eq!(a, HEAP_BASE);
        assert_eq!(b, HEAP_BASE + 100);
        assert_eq!(c, HEAP_BASE + 150);
    }

    #[test]
    fn zero_size_request_fails() {
        let mut heap = HeapAllocator::new();
        assert!(heap.allocate(0).is_err());
    }
}
