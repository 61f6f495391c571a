//! `.i` pretty-printer (spec §4.10): renders a fully assembled [`MemLayout`]
//! back as annotated source text, one line per instruction or data byte.
//!
//! Executable sections print one source line per word, taken from the debug
//! arena the emission pass attached; other sections print one `.byte 0xXX`
//! per byte. A label definition at an address gets its own line just above.

use masm_core::layout::MemLayout;
use masm_core::memory::section::MemSection;

use crate::labels::{name_at, LabelMap};

fn section_name(section: MemSection) -> &'static str {
    match section {
        MemSection::Text => "text",
        MemSection::Data => "data",
        MemSection::KText => "ktext",
        MemSection::KData => "kdata",
        MemSection::Global => "global",
        MemSection::Heap => "heap",
        MemSection::Stack => "stack",
        MemSection::Mmio => "mmio",
    }
}

/// Strips a mangled label's `@fileId` (or `@macro_pos`) suffix for display.
pub(crate) fn unmangle_label(name: &str) -> &str {
    name.split('@').next().unwrap_or(name)
}

fn stringify_section(out: &mut String, section: MemSection, bytes: &[u8], layout: &MemLayout, labels: &LabelMap) {
    if bytes.is_empty() {
        return;
    }
    out.push_str(&format!("\n.{}\n\n", section_name(section)));
    let base = section.base();
    let executable = section.is_executable();

    let mut i = 0usize;
    while i < bytes.len() {
        if executable && i % 4 != 0 {
            i += 1;
            continue;
        }
        let address = base + i as u32;
        if let Some(name) = name_at(labels, address) {
            out.push_str(&format!("\n{}:\n", unmangle_label(name)));
        }
        if executable {
            if let Some(locator) = layout.debug.locator_at(address) {
                out.push_str(&locator.source_text);
                out.push('\n');
            }
        } else {
            out.push_str(&format!(".byte 0x{:02x}\n", bytes[i]));
        }
        i += 1;
    }
}

/// Renders a fully assembled program back as annotated source text, in the
/// fixed data/text/ktext/kdata section order (the iteration order of the
/// original's `std::map<MemSection, ...>`, keyed by a data-before-text enum).
pub fn stringify_layout(layout: &MemLayout, labels: &LabelMap) -> String {
    let mut out = String::new();
    stringify_section(&mut out, MemSection::Data, &layout.sections.data, layout, labels);
    stringify_section(&mut out, MemSection::Text, &layout.sections.text, layout, labels);
    stringify_section(&mut out, MemSection::KText, &layout.sections.ktext, layout, labels);
    stringify_section(&mut out, MemSection::KData, &layout.sections.kdata, layout, labels);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use masm_core::debug_info::SourceLocator;

    #[test]
    fn executable_section_emits_one_line_per_word_with_label() {
        let mut layout = MemLayout::new();
        layout.sections.text = vec![0, 0, 0, 0];
        let id = layout.debug.intern(SourceLocator {
            file: "t.asm".into(),
            line: 1,
            source_text: "nop".into(),
        });
        layout.debug.attach(MemSection::Text.base(), id, Some("start".into()));

        let mut labels = LabelMap::new();
        labels.insert("start@t.asm".to_string(), MemSection::Text.base());

        let text = stringify_layout(&layout, &labels);
        assert!(text.contains("start:"));
        assert!(text.contains("nop"));
        assert!(!text.contains("start@t.asm"));
    }

    #[test]
    fn data_section_emits_byte_directives() {
        let mut layout = MemLayout::new();
        layout.sections.data = vec![0xAB, 0xCD];
        let labels = LabelMap::new();
        let text = stringify_layout(&layout, &labels);
        assert!(text.contains(".byte 0xab"));
        assert!(text.contains(".byte 0xcd"));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let layout = MemLayout::new();
        let labels = LabelMap::new();
        assert_eq!(stringify_layout(&layout, &labels), "");
    }
}
