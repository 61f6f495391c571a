//! First-pass address resolution: walks preprocessed lines once, sizing each
//! allocating line without emitting bytes, and resolves every label to an address
//! (spec §4.3).

use std::collections::HashMap;

use masm_core::config::Config;
use masm_core::memory::section::{DATA_BASE, KDATA_BASE, KTEXT_BASE, TEXT_BASE};

use crate::directives;
use crate::error::AsmError;
use crate::instructions::instruction_size;
use crate::lexer::{LineTokens, TokenCategory};

pub type LabelMap = HashMap<String, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Text,
    Data,
    KText,
    KData,
}

impl Section {
    fn base(self) -> u32 {
        match self {
            Section::Text => TEXT_BASE,
            Section::Data => DATA_BASE,
            Section::KText => KTEXT_BASE,
            Section::KData => KDATA_BASE,
        }
    }
}

/// Per-section running byte size, used both to resolve labels and, by the
/// emission pass, as the initial capacity for each section's buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SectionSizes {
    pub text: u32,
    pub data: u32,
    pub ktext: u32,
    pub kdata: u32,
}

impl SectionSizes {
    fn get(&self, section: Section) -> u32 {
        match section {
            Section::Text => self.text,
            Section::Data => self.data,
            Section::KText => self.ktext,
            Section::KData => self.kdata,
        }
    }

    fn add(&mut self, section: Section, n: u32) {
        match section {
            Section::Text => self.text += n,
            Section::Data => self.data += n,
            Section::KText => self.ktext += n,
            Section::KData => self.kdata += n,
        }
    }
}

/// Resolves every label to its final address and returns the final per-section
/// sizes an emission pass can use to preallocate output buffers.
pub fn resolve(lines: &[LineTokens], config: &Config) -> Result<(LabelMap, SectionSizes), AsmError> {
    let mut labels = LabelMap::new();
    let mut sizes = SectionSizes::default();
    let mut section = Section::Text;
    let mut pending_labels: Vec<String> = Vec::new();

    for lt in lines {
        let first = match lt.tokens.first() {
            Some(t) => t,
            None => continue,
        };

        match first.category {
            TokenCategory::SectionDirective => {
                section = match first.value.as_str() {
                    "text" => Section::Text,
                    "data" => Section::Data,
                    "ktext" => Section::KText,
                    "kdata" => Section::KData,
                    other => return Err(AsmError::label(&lt.file, lt.line, format!("unknown section '.{}'", other))),
                };
            }
            TokenCategory::LabelDef => {
                pending_labels.push(first.value.clone());
            }
            TokenCategory::AllocDirective => {
                let name = &first.value;
                let args: Vec<_> = lt.tokens[1..]
                    .iter()
                    .filter(|t| t.category != TokenCategory::Separator)
                    .cloned()
                    .collect();
                let loc = sizes.get(section);
                let (bytes, leading_pad) =
                    directives::encode(name, &args, loc, config.endianness, &lt.file, lt.line)?;
                commit_labels(&mut labels, &mut pending_labels, section, &sizes, leading_pad as u32)?;
                sizes.add(section, bytes.len() as u32);
            }
            TokenCategory::Instruction => {
                let loc = sizes.get(section);
                commit_labels(&mut labels, &mut pending_labels, section, &sizes, 0)?;
                let size = instruction_size(&lt.tokens)?;
                let _ = loc;
                sizes.add(section, size);
            }
            _ => {}
        }
    }

    if !pending_labels.is_empty() {
        return Err(AsmError::label(
            "<eof>",
            0,
            format!("label(s) {:?} defined with nothing following", pending_labels),
        ));
    }

    Ok((labels, sizes))
}

fn commit_labels(
    labels: &mut LabelMap,
    pending: &mut Vec<String>,
    section: Section,
    sizes: &SectionSizes,
    leading_pad: u32,
) -> Result<(), AsmError> {
    if pending.is_empty() {
        return Ok(());
    }
    let address = section.base() + sizes.get(section) + leading_pad;
    for name in pending.drain(..) {
        if labels.contains_key(&name) {
            return Err(AsmError::label("<label>", 0, format!("duplicate label '{}'", name)));
        }
        labels.insert(name, address);
    }
    Ok(())
}

/// Reverse lookup, for the `.i` pretty-printer (spec §4.10): linear scan, first
/// match wins.
pub fn name_at(labels: &LabelMap, address: u32) -> Option<&str> {
    labels
        .iter()
        .find(|(_, &addr)| addr == address)
        .map(|(name, _)| name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    #[test]
    fn label_before_word_resolves_past_alignment_pad() {
        let mut lines = tokenize("t.asm", ".data\n.byte 1\nL: .word 5\n").unwrap();
        lines.retain(|l| !l.tokens.is_empty());
        let (labels, _) = resolve(&lines, &Config::default()).unwrap();
        assert_eq!(labels["L"], DATA_BASE + 4);
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let lines = tokenize("t.asm", ".text\nA: nop\nA: nop\n").unwrap();
        assert!(resolve(&lines, &Config::default()).is_err());
    }
}
