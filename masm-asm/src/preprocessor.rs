//! Token-stream rewriting passes that run between lexing and label resolution
//! (spec §4.2): base-addressing desugaring, `.include` splicing, `.eqv`
//! substitution, `.macro` expansion, and finally label mangling so identically
//! named labels in different files don't collide.
//!
//! Passes run in a fixed order, one file at a time, except `.include` (which
//! needs every file's tokens up front) and label mangling (which needs every
//! file's tokens at once to resolve `.globl`).

use std::collections::{BTreeMap, HashMap};

use crate::error::AsmError;
use crate::lexer::{LineTokens, Token, TokenCategory};

/// Runs every postprocessing pass over a set of already-lexed files and
/// returns the single flattened, fully mangled token stream the label pass
/// consumes. `files` is keyed by the name used in `.include` directives.
pub fn process(files: BTreeMap<String, Vec<LineTokens>>) -> Result<Vec<LineTokens>, AsmError> {
    let mut raw: BTreeMap<String, Vec<LineTokens>> = BTreeMap::new();
    for (name, mut lines) in files {
        process_base_addressing(&mut lines)?;
        raw.insert(name, lines);
    }

    process_includes(&mut raw)?;

    let mut program: BTreeMap<String, Vec<LineTokens>> = BTreeMap::new();
    for (name, mut lines) in raw {
        replace_eqv(&mut lines)?;
        process_macros(&mut lines)?;
        program.insert(format!("masm_mangle_file_{}", name), lines);
    }

    mangle_labels(&mut program)?;

    Ok(program.into_values().flatten().collect())
}

/// Rewrites `op rt, imm(base)` into `op rt, base, imm` so the instruction
/// encoder only ever sees flat operand lists. A missing immediate becomes an
/// explicit `0`.
fn process_base_addressing(lines: &mut [LineTokens]) -> Result<(), AsmError> {
    for lt in lines.iter_mut() {
        let open_paren = lt.tokens.iter().position(|t| t.category == TokenCategory::OpenParen);
        let open_paren = match open_paren {
            Some(p) => p,
            None => continue,
        };
        if lt.tokens.first().map(|t| t.category) != Some(TokenCategory::Instruction) {
            continue;
        }
        if open_paren == 0 || lt.tokens.len() < 4 {
            return Err(AsmError::preprocess(&lt.file, lt.line, "malformed parenthesis expression"));
        }

        let mut last_four = lt.tokens.split_off(lt.tokens.len() - 4);
        if last_four[0].category != TokenCategory::Immediate {
            let pushed = last_four[0].clone();
            lt.tokens.push(pushed);
            last_four[0] = Token {
                category: TokenCategory::Immediate,
                value: "0".to_string(),
            };
        }

        let pattern_ok = last_four[0].category == TokenCategory::Immediate
            && last_four[1].category == TokenCategory::OpenParen
            && last_four[2].category == TokenCategory::Register
            && last_four[3].category == TokenCategory::CloseParen;
        if !pattern_ok {
            return Err(AsmError::preprocess(&lt.file, lt.line, "malformed parenthesis expression"));
        }

        lt.tokens.push(last_four[2].clone());
        lt.tokens.push(Token {
            category: TokenCategory::Separator,
            value: ",".to_string(),
        });
        lt.tokens.push(last_four[0].clone());
    }
    Ok(())
}

/// Splices each `.include "name"` line's already-tokenized content in place of
/// itself. A freshly spliced block's own first line is not re-checked for
/// being itself an include (mirrors the one-pass-forward scan this is
/// grounded on); only lines after it get a chance to nest further.
fn process_includes(files: &mut BTreeMap<String, Vec<LineTokens>>) -> Result<(), AsmError> {
    let names: Vec<String> = files.keys().cloned().collect();
    for name in names {
        let mut i = 0;
        loop {
            let len = match files.get(&name) {
                Some(v) => v.len(),
                None => break,
            };
            if i >= len {
                break;
            }
            let line = files[&name][i].clone();
            let first = match line.tokens.first() {
                Some(t) => t.clone(),
                None => {
                    i += 1;
                    continue;
                }
            };
            if first.category != TokenCategory::MetaDirective || first.value != "include" {
                i += 1;
                continue;
            }
            if line.tokens.len() != 2 || line.tokens[1].category != TokenCategory::String {
                return Err(AsmError::preprocess(&line.file, line.line, "invalid include directive"));
            }
            let include_name = line.tokens[1].value.clone();
            let include_contents = files.get(&include_name).cloned().ok_or_else(|| {
                AsmError::preprocess(&line.file, line.line, format!("included file '{}' not found", include_name))
            })?;
            let target = files.get_mut(&name).unwrap();
            target.splice(i..i + 1, include_contents.iter().cloned());
            i += 1;
        }
    }
    Ok(())
}

/// Forward-only substitution: once a `.eqv NAME value...` line is seen, every
/// later `NAME` label reference in the same file is replaced by `value`'s
/// tokens. The substituted tokens are never themselves rescanned for further
/// `.eqv` names.
fn replace_eqv(lines: &mut Vec<LineTokens>) -> Result<(), AsmError> {
    let mut mapping: HashMap<String, Vec<Token>> = HashMap::new();
    let mut i = 0;
    while i < lines.len() {
        let is_eqv = lines[i]
            .tokens
            .first()
            .map(|t| t.category == TokenCategory::MetaDirective && t.value == "eqv")
            .unwrap_or(false);
        if is_eqv {
            let line = lines[i].clone();
            if line.tokens.len() < 3 || line.tokens[1].category != TokenCategory::LabelRef {
                return Err(AsmError::preprocess(&line.file, line.line, "invalid eqv declaration"));
            }
            mapping.insert(line.tokens[1].value.clone(), line.tokens[2..].to_vec());
            lines.remove(i);
            continue;
        }

        let mut j = 0;
        while j < lines[i].tokens.len() {
            if lines[i].tokens[j].category == TokenCategory::LabelRef {
                if let Some(repl) = mapping.get(&lines[i].tokens[j].value).cloned() {
                    let repl_len = repl.len();
                    lines[i].tokens.splice(j..j + 1, repl);
                    j += repl_len;
                    continue;
                }
            }
            j += 1;
        }
        i += 1;
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct Macro {
    name: String,
    params: Vec<Token>,
    body: Vec<LineTokens>,
}

fn parse_macro_params(line: &LineTokens) -> Result<Vec<Token>, AsmError> {
    if line.tokens.len() < 3 {
        return Ok(Vec::new());
    }
    if line.tokens[2].category != TokenCategory::OpenParen
        || line.tokens.last().map(|t| t.category) != Some(TokenCategory::CloseParen)
    {
        return Err(AsmError::preprocess(&line.file, line.line, "malformed macro parameter declaration"));
    }
    let raw = &line.tokens[3..line.tokens.len() - 1];
    Ok(raw
        .iter()
        .filter(|t| t.category == TokenCategory::MacroParam)
        .cloned()
        .collect())
}

/// Mangles every label defined inside a macro body to `name@macro_pos`, and
/// every reference to one of those same labels, so two expansions of the same
/// macro never collide. References to labels defined outside the macro are
/// left untouched.
fn mangle_macro_labels(source: &Macro, pos: usize) -> Macro {
    let mut mangled = source.clone();
    let mut defined: Vec<String> = Vec::new();

    for body_line in mangled.body.iter_mut() {
        for t in body_line.tokens.iter_mut() {
            if t.category == TokenCategory::LabelDef {
                defined.push(t.value.clone());
                t.value = format!("{}@{}_{}", t.value, mangled.name, pos);
            }
        }
    }
    for body_line in mangled.body.iter_mut() {
        for t in body_line.tokens.iter_mut() {
            if t.category == TokenCategory::LabelRef && defined.contains(&t.value) {
                t.value = format!("{}@{}_{}", t.value, mangled.name, pos);
            }
        }
    }

    mangled
}

/// Splices `macro_`'s (mangled) body in place of the call-site line at `pos`,
/// substituting every `%param` token for its matching call argument by
/// position. Leaves `pos` at the call site's last expanded line.
fn expand_macro(macro_: &Macro, pos: &mut usize, lines: &mut Vec<LineTokens>) -> Result<(), AsmError> {
    let call = lines[*pos].clone();
    let mut macro_args: Vec<Token> = Vec::new();
    if call.tokens.len() > 2 {
        let end = call.tokens.len() - 1;
        macro_args = call.tokens[2..end]
            .iter()
            .filter(|t| t.category != TokenCategory::Separator)
            .cloned()
            .collect();
    }
    if macro_args.len() != macro_.params.len() {
        return Err(AsmError::preprocess(&call.file, call.line, "invalid number of macro arguments"));
    }

    let mangled = mangle_macro_labels(macro_, *pos);
    let macro_end = *pos + mangled.body.len();
    lines.splice(*pos..*pos + 1, mangled.body.iter().cloned());

    while *pos < macro_end {
        let (file, line_no) = (lines[*pos].file.clone(), lines[*pos].line);
        for token in lines[*pos].tokens.iter_mut() {
            if token.category != TokenCategory::MacroParam {
                continue;
            }
            let idx = macro_
                .params
                .iter()
                .position(|p| p.value == token.value)
                .ok_or_else(|| AsmError::preprocess(&file, line_no, format!("invalid macro parameter '{}'", token.value)))?;
            *token = macro_args[idx].clone();
        }
        *pos += 1;
    }
    *pos -= 1;
    Ok(())
}

/// Expands every `.macro`/`.end_macro` block and every call site within a
/// single file. Call sites found while still scanning a macro's own body are
/// expanded immediately (so a macro can call an earlier macro), which is why
/// this takes one full pass rather than two.
fn process_macros(lines: &mut Vec<LineTokens>) -> Result<(), AsmError> {
    let mut macro_map: HashMap<String, Macro> = HashMap::new();
    let mut i = 0;
    while i < lines.len() {
        let first = lines[i].tokens.first().cloned();
        let is_macro_start = first
            .as_ref()
            .map(|t| t.category == TokenCategory::MetaDirective && t.value == "macro")
            .unwrap_or(false);

        if is_macro_start {
            let macro_start = i;
            let decl = lines[i].clone();
            if decl.tokens.len() < 2 || decl.tokens[1].category != TokenCategory::LabelRef {
                return Err(AsmError::preprocess(&decl.file, decl.line, "invalid macro declaration"));
            }
            let name = decl.tokens[1].value.clone();
            let params = parse_macro_params(&decl)?;

            loop {
                i += 1;
                if i >= lines.len() {
                    return Err(AsmError::preprocess(&decl.file, decl.line, "unmatched macro declaration"));
                }
                let line_first = lines[i].tokens.first().cloned();
                let Some(t) = line_first else { continue };
                if t.category == TokenCategory::MetaDirective && t.value == "end_macro" {
                    break;
                }
                if t.category == TokenCategory::LabelRef {
                    if let Some(m) = macro_map.get(&t.value).cloned() {
                        expand_macro(&m, &mut i, lines)?;
                    }
                }
            }

            let body = lines[macro_start + 1..i].to_vec();
            macro_map.insert(name.clone(), Macro { name, params, body });
            lines.splice(macro_start..i + 1, std::iter::empty());
            i = macro_start;
            continue;
        }

        if let Some(t) = &first {
            if t.category == TokenCategory::LabelRef {
                if let Some(m) = macro_map.get(&t.value).cloned() {
                    expand_macro(&m, &mut i, lines)?;
                }
            }
        }
        i += 1;
    }
    Ok(())
}

/// Removes and collects every `.globl NAME` declaration in a file.
fn collect_globals(lines: &mut Vec<LineTokens>) -> Result<Vec<(String, LineTokens)>, AsmError> {
    let mut globals = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let is_globl = lines[i]
            .tokens
            .first()
            .map(|t| t.category == TokenCategory::MetaDirective && t.value == "globl")
            .unwrap_or(false);
        if is_globl {
            let line = lines[i].clone();
            if line.tokens.len() != 2 || line.tokens[1].category != TokenCategory::LabelRef {
                return Err(AsmError::preprocess(&line.file, line.line, "invalid global label declaration"));
            }
            globals.push((line.tokens[1].value.clone(), line));
            lines.remove(i);
            continue;
        }
        i += 1;
    }
    Ok(globals)
}

/// Suffixes every label def/ref in `line` with `@file_id`, except names in
/// `globals` (those stay shared across files). Returns the label this line
/// defines, if any.
fn mangle_labels_in_line(globals: &[String], line: &mut LineTokens, file_id: &str) -> Option<String> {
    let mut declared = None;
    for t in line.tokens.iter_mut() {
        if t.category != TokenCategory::LabelDef && t.category != TokenCategory::LabelRef {
            continue;
        }
        if t.category == TokenCategory::LabelDef {
            declared = Some(t.value.clone());
        }
        if !globals.iter().any(|g| g == &t.value) {
            t.value = format!("{}@{}", t.value, file_id);
        }
    }
    declared
}

/// Collects every file's `.globl` declarations, then mangles every remaining
/// label in the whole program by its owning file id, leaving globals shared.
/// A global declared but never defined anywhere is a hard error.
fn mangle_labels(program: &mut BTreeMap<String, Vec<LineTokens>>) -> Result<(), AsmError> {
    let mut globals: Vec<(String, LineTokens)> = Vec::new();
    for lines in program.values_mut() {
        globals.extend(collect_globals(lines)?);
    }
    let global_names: Vec<String> = globals.iter().map(|(n, _)| n.clone()).collect();
    let mut undeclared = globals.clone();

    for (file_id, lines) in program.iter_mut() {
        for line in lines.iter_mut() {
            if let Some(declared) = mangle_labels_in_line(&global_names, line, file_id) {
                if let Some(pos) = undeclared.iter().position(|(n, _)| n == &declared) {
                    undeclared.remove(pos);
                }
            }
        }
    }

    if let Some((name, origin)) = undeclared.first() {
        return Err(AsmError::preprocess(
            &origin.file,
            origin.line,
            format!("global label '{}' referenced without declaration", name),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn one_file(name: &str, src: &str) -> BTreeMap<String, Vec<LineTokens>> {
        let mut m = BTreeMap::new();
        m.insert(name.to_string(), tokenize(name, src).unwrap());
        m
    }

    #[test]
    fn base_addressing_rewrites_offset_paren_register() {
        let files = one_file("t.asm", ".text\nlw $t0, 4($sp)\n");
        let lines = process(files).unwrap();
        let ix = lines.iter().position(|l| l.tokens[0].category == TokenCategory::Instruction).unwrap();
        let ops: Vec<_> = lines[ix].tokens[1..]
            .iter()
            .filter(|t| t.category != TokenCategory::Separator)
            .map(|t| t.value.clone())
            .collect();
        assert_eq!(ops, vec!["$t0".to_string(), "$sp".to_string(), "4".to_string()]);
    }

    #[test]
    fn base_addressing_defaults_missing_offset_to_zero() {
        let files = one_file("t.asm", ".text\nlw $t0, ($sp)\n");
        let lines = process(files).unwrap();
        let ix = lines.iter().position(|l| l.tokens[0].category == TokenCategory::Instruction).unwrap();
        let last = lines[ix].tokens.last().unwrap();
        assert_eq!(last.value, "0");
    }

    #[test]
    fn eqv_substitutes_later_references() {
        let files = one_file("t.asm", ".eqv COUNT 5\n.text\nli $t0, COUNT\n");
        let lines = process(files).unwrap();
        let imm = lines
            .iter()
            .flat_map(|l| l.tokens.iter())
            .find(|t| t.category == TokenCategory::Immediate)
            .unwrap();
        assert_eq!(imm.value, "5");
    }

    #[test]
    fn macro_call_expands_with_substituted_params() {
        let src = ".macro increment(%reg)\naddiu %reg, %reg, 1\n.end_macro\n.text\nincrement($t0)\n";
        let files = one_file("t.asm", src);
        let lines = process(files).unwrap();
        let call = lines.iter().find(|l| l.tokens[0].value == "addiu").unwrap();
        let reg_values: Vec<_> = call.tokens.iter().filter(|t| t.category == TokenCategory::Register).map(|t| t.value.clone()).collect();
        assert_eq!(reg_values, vec!["$t0".to_string(), "$t0".to_string()]);
    }

    #[test]
    fn macro_internal_labels_are_mangled_per_call_site() {
        let src = ".macro loopback()\nL: nop\nj L\n.end_macro\n.text\nloopback()\n";
        let files = one_file("t.asm", src);
        let lines = process(files).unwrap();
        let def = lines.iter().flat_map(|l| l.tokens.iter()).find(|t| t.category == TokenCategory::LabelDef).unwrap();
        assert!(def.value.starts_with("L@loopback_"));
    }

    #[test]
    fn include_splices_named_file_contents() {
        let mut files = BTreeMap::new();
        files.insert("main.asm".to_string(), tokenize("main.asm", ".text\n.include \"helper\"\n").unwrap());
        files.insert("helper".to_string(), tokenize("helper", "nop\n").unwrap());
        let lines = process(files).unwrap();
        assert!(lines.iter().any(|l| l.tokens[0].value == "nop"));
    }

    #[test]
    fn globl_label_is_shared_unmangled_across_files() {
        let mut files = BTreeMap::new();
        files.insert("a.asm".to_string(), tokenize("a.asm", ".globl main\n.text\nmain: nop\n").unwrap());
        let lines = process(files).unwrap();
        let def = lines.iter().flat_map(|l| l.tokens.iter()).find(|t| t.category == TokenCategory::LabelDef).unwrap();
        assert_eq!(def.value, "main");
    }

    #[test]
    fn undeclared_global_definition_is_an_error() {
        let files = one_file("a.asm", ".globl missing\n.text\nnop\n");
        assert!(process(files).is_err());
    }

    #[test]
    fn local_label_is_mangled_with_file_id() {
        let files = one_file("a.asm", ".text\nlocal: nop\n");
        let lines = process(files).unwrap();
        let def = lines.iter().flat_map(|l| l.tokens.iter()).find(|t| t.category == TokenCategory::LabelDef).unwrap();
        assert!(def.value.starts_with("local@"));
    }
}
