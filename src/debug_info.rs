//! Arena of source locators shared across many addresses (spec §9).
//!
//! Many addresses can point at the same source line (every byte of a `.word`
//! directive, or the second instruction word of a pseudo-expansion). Rather than
//! duplicating the locator at each address, the arena owns the locators and the
//! per-address map stores indices into it.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    pub file: String,
    pub line: usize,
    pub source_text: String,
}

pub type LocatorId = usize;

#[derive(Debug, Clone)]
pub struct DebugInfo {
    pub locator: Option<LocatorId>,
    pub label: Option<String>,
}

/// Owns `SourceLocator`s and the address → `DebugInfo` map built by the assembler
/// and consumed by the interpreter and the `.i` pretty-printer.
#[derive(Debug, Clone, Default)]
pub struct DebugArena {
    locators: Vec<SourceLocator>,
    by_address: HashMap<u32, DebugInfo>,
}

impl DebugArena {
    pub fn new() -> Self {
        DebugArena {
            locators: Vec::new(),
            by_address: HashMap::new(),
        }
    }

    pub fn intern(&mut self, locator: SourceLocator) -> LocatorId {
        self.locators.push(locator);
        self.locators.len() - 1
    }

    pub fn locator(&self, id: LocatorId) -> &SourceLocator {
        &self.locators[id]
    }

    pub fn attach(&mut self, address: u32, locator: LocatorId, label: Option<String>) {
        self.by_address.insert(address, DebugInfo {
            locator: Some(locator),
            label,
        });
    }

    pub fn at(&self, address: u32) -> Option<&DebugInfo> {
        self.by_address.get(&address)
    }

    pub fn locator_at(&self, address: u32) -> Option<&SourceLocator> {
        self.at(address).and_then(|info| info.locator).map(|id| self.locator(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn many_addresses_share_one_locator() {
        let mut arena = DebugArena::new();
        let id = arena.intern(SourceLocator {
            file: "a.asm".into(),
            line: 3,
            source_text: "li $t0, 5".into(),
        });
        arena.attach(0x400000, id, Some("start".into()));
        arena.attach(0x400004, id, None);

        assert_eq!(arena.locator_at(0x400000).unwrap().line, 3);
        assert_eq!(arena.locator_at(0x400004).unwrap().line, 3);
        assert_eq!(arena.at(0x400000).unwrap().label.as_deref(), Some("start"));
        assert!(arena.at(0x400004).unwrap().label.is_none());
    }
}
