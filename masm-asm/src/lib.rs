//! Turns MIPS32 source text into a [`MemLayout`], wiring lexing →
//! preprocessing → label resolution → encoding into one [`assemble`] entry
//! point (spec §4 "Pipeline").

pub mod directives;
pub mod error;
pub mod instructions;
pub mod intermediates;
pub mod labels;
pub mod lexer;
pub mod preprocessor;
pub mod pseudo;

use std::collections::BTreeMap;

use log::{debug, info};

use masm_core::config::Config;
use masm_core::debug_info::SourceLocator;
use masm_core::layout::MemLayout;
use masm_core::memory::section::{DATA_BASE, KDATA_BASE, KTEXT_BASE, TEXT_BASE};

use error::AsmError;
use labels::{LabelMap, Section};
use lexer::{LineTokens, Token, TokenCategory};

/// One source file to assemble, keyed by the name its `.include` directives
/// refer to it by.
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

/// Assembles a full program, returning the encoded layout and the label map
/// a `.i` pretty-printer (see [`intermediates`]) needs alongside it.
pub fn assemble(files: &[SourceFile], config: &Config) -> Result<(MemLayout, LabelMap), AsmError> {
    let mut lexed: BTreeMap<String, Vec<LineTokens>> = BTreeMap::new();
    for f in files {
        debug!("loading file '{}' ({} bytes)", f.name, f.text.len());
        lexed.insert(f.name.clone(), lexer::tokenize(&f.name, &f.text)?);
    }

    let mut lines = preprocessor::process(lexed)?;
    lines.retain(|l| !l.tokens.is_empty());

    let (labels, _sizes) = labels::resolve(&lines, config)?;

    let mut layout = MemLayout::new();
    let mut section = Section::Text;

    for lt in &lines {
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
                    other => return Err(AsmError::encode(&lt.file, lt.line, format!("unknown section '.{}'", other))),
                };
            }
            TokenCategory::LabelDef => {}
            TokenCategory::AllocDirective => {
                let name = &first.value;
                let args: Vec<Token> = lt.tokens[1..]
                    .iter()
                    .filter(|t| t.category != TokenCategory::Separator)
                    .cloned()
                    .collect();
                let loc = section_len(&layout, section);
                let (bytes, _pad) = directives::encode(name, &args, loc, config.endianness, &lt.file, lt.line)?;
                section_buf_mut(&mut layout, section).extend_from_slice(&bytes);
            }
            TokenCategory::Instruction => {
                let loc = section_len(&layout, section);
                let words = instructions::encode(&lt.tokens, loc, &labels, &lt.file, lt.line)?;

                let id = layout.debug.intern(SourceLocator {
                    file: lt.file.clone(),
                    line: lt.line,
                    source_text: render_source_text(&lt.tokens),
                });
                let base = section_base(section);
                let mut off = 0u32;
                while (off as usize) < words.len() {
                    layout.debug.attach(base + loc + off, id, None);
                    off += 4;
                }

                section_buf_mut(&mut layout, section).extend_from_slice(&words);
            }
            _ => {}
        }
    }

    info!(
        "layout built: text={}B data={}B ktext={}B kdata={}B",
        layout.sections.text.len(),
        layout.sections.data.len(),
        layout.sections.ktext.len(),
        layout.sections.kdata.len(),
    );
    Ok((layout, labels))
}

/// Renders a preprocessed line's tokens back into source-like text for the
/// `.i` pretty-printer, unmangling any label reference it carries.
fn render_source_text(tokens: &[Token]) -> String {
    let mut out = String::new();
    for t in tokens {
        match t.category {
            TokenCategory::Separator => out.push_str(&t.value),
            TokenCategory::LabelRef => {
                out.push(' ');
                out.push_str(intermediates::unmangle_label(&t.value));
            }
            _ => {
                out.push(' ');
                out.push_str(&t.value);
            }
        }
    }
    out
}

fn section_base(section: Section) -> u32 {
    match section {
        Section::Text => TEXT_BASE,
        Section::Data => DATA_BASE,
        Section::KText => KTEXT_BASE,
        Section::KData => KDATA_BASE,
    }
}

fn section_len(layout: &MemLayout, section: Section) -> u32 {
    match section {
        Section::Text => layout.sections.text.len() as u32,
        Section::Data => layout.sections.data.len() as u32,
        Section::KText => layout.sections.ktext.len() as u32,
        Section::KData => layout.sections.kdata.len() as u32,
    }
}

fn section_buf_mut(layout: &mut MemLayout, section: Section) -> &mut Vec<u8> {
    match section {
        Section::Text => &mut layout.sections.text,
        Section::Data => &mut layout.sections.data,
        Section::KText => &mut layout.sections.ktext,
        Section::KData => &mut layout.sections.kdata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, text: &str) -> SourceFile {
        SourceFile {
            name: name.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn assembles_hello_world_into_text_and_data() {
        let files = [file(
            "hello.asm",
            ".data\nmsg: .asciiz \"hi\"\n.text\nli $v0, 4\nla $a0, msg\nsyscall\nli $v0, 10\nsyscall\n",
        )];
        let (layout, labels) = assemble(&files, &Config::default()).unwrap();
        assert!(!layout.sections.text.is_empty());
        assert_eq!(layout.sections.data, b"hi\0".to_vec());
        assert!(labels.contains_key("msg@masm_mangle_file_hello.asm"));
    }

    #[test]
    fn label_forward_reference_resolves_to_branch_target() {
        let files = [file("t.asm", ".text\nbeq $zero, $zero, done\nnop\ndone: nop\n")];
        let (layout, _) = assemble(&files, &Config::default()).unwrap();
        assert_eq!(layout.sections.text.len(), 12);
    }

    #[test]
    fn undefined_label_is_a_pipeline_error() {
        let files = [file("t.asm", ".text\nj nowhere\n")];
        assert!(assemble(&files, &Config::default()).is_err());
    }
}
