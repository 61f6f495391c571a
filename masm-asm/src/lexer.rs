//! Single-pass character classifier turning source text into [`LineTokens`] (spec §4.1).
//!
//! The state machine below is the same shape as the original tokenizer's
//! `tokenizeLine`: one pass over the line's characters (plus a trailing sentinel
//! space to flush the last token), a `currentType`/`currentToken` pair carried
//! across the loop, with `:` splitting one physical line into two `LineTokens`
//! entries so `L: add …` assembles as if it were two lines.

use crate::error::AsmError;
use crate::instructions;
use crate::pseudo;

/// Whether `name` names a real mnemonic (native or pseudo), used to demote a
/// tentative first-token `Instruction` classification to `LabelRef` when it
/// doesn't (spec §4.1 "first token rule").
fn is_instruction(name: &str) -> bool {
    instructions::is_native(name) || pseudo::pseudo_size(name).is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCategory {
    Unknown,
    SectionDirective,
    AllocDirective,
    MetaDirective,
    LabelDef,
    LabelRef,
    Instruction,
    Register,
    Immediate,
    Separator,
    OpenParen,
    CloseParen,
    String,
    MacroParam,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub category: TokenCategory,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct LineTokens {
    pub file: String,
    pub line: usize,
    pub tokens: Vec<Token>,
}

const SECTION_DIRECTIVES: [&str; 4] = ["data", "text", "kdata", "ktext"];
const META_DIRECTIVES: [&str; 5] = ["globl", "eqv", "macro", "end_macro", "include"];

fn hex_to_decimal(value: &str) -> String {
    let negative = value.starts_with('-');
    let digits = value.trim_start_matches('-');
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        if let Ok(n) = i64::from_str_radix(hex, 16) {
            let n = if negative { -n } else { n };
            return n.to_string();
        }
    }
    value.to_string()
}

fn classify_directive(word: &str) -> TokenCategory {
    if SECTION_DIRECTIVES.contains(&word) {
        TokenCategory::SectionDirective
    } else if META_DIRECTIVES.contains(&word) {
        TokenCategory::MetaDirective
    } else {
        TokenCategory::AllocDirective
    }
}

struct LineLexer<'a> {
    file: &'a str,
    line: usize,
    tokens: Vec<Token>,
    current: String,
    category: TokenCategory,
    prev_char: char,
    /// True until the first non-label token of the current (possibly `:`-split)
    /// logical line has been flushed.
    at_line_start: bool,
}

impl<'a> LineLexer<'a> {
    fn new(file: &'a str, line: usize) -> Self {
        LineLexer {
            file,
            line,
            tokens: Vec::new(),
            current: String::new(),
            category: TokenCategory::Unknown,
            prev_char: '\0',
            at_line_start: true,
        }
    }

    fn err(&self, message: impl Into<String>) -> AsmError {
        AsmError::lex(self.file, self.line, message)
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let raw = std::mem::take(&mut self.current);
        let value = if self.category == TokenCategory::Immediate {
            hex_to_decimal(&raw)
        } else {
            raw
        };
        let category = if self.category == TokenCategory::Instruction {
            if self.at_line_start && is_instruction(&value) {
                TokenCategory::Instruction
            } else {
                TokenCategory::LabelRef
            }
        } else {
            self.category
        };
        self.at_line_start = category == TokenCategory::LabelDef;
        self.tokens.push(Token { category, value });
        self.category = TokenCategory::Unknown;
    }

    fn push_separator(&mut self) {
        self.tokens.push(Token {
            category: TokenCategory::Separator,
            value: ",".to_string(),
        });
    }

    fn run(mut self, text: &str) -> Result<Vec<Token>, AsmError> {
        let mut in_string = false;
        for c in text.chars().chain(std::iter::once(' ')) {
            if in_string {
                if c == '"' && self.prev_char != '\\' {
                    in_string = false;
                    self.tokens.push(Token {
                        category: TokenCategory::String,
                        value: std::mem::take(&mut self.current),
                    });
                } else {
                    self.current.push(c);
                }
                self.prev_char = c;
                continue;
            }

            if c == '#' {
                break;
            }

            if c == '"' {
                if !self.current.is_empty() {
                    return Err(self.err("unexpected quote mid-token"));
                }
                in_string = true;
                continue;
            }

            if c.is_whitespace() || c == ',' || c == ':' || c == '(' || c == ')' {
                if matches!(c, ',' | ':' | '(' | ')') && self.current.is_empty() && self.tokens.is_empty() {
                    return Err(self.err(format!("unexpected '{}' at the start of a line", c)));
                }
                if c == ':' && !self.current.is_empty() {
                    self.category = TokenCategory::LabelDef;
                }
                self.flush();
                match c {
                    ',' => self.push_separator(),
                    '(' => self.tokens.push(Token {
                        category: TokenCategory::OpenParen,
                        value: "(".to_string(),
                    }),
                    ')' => self.tokens.push(Token {
                        category: TokenCategory::CloseParen,
                        value: ")".to_string(),
                    }),
                    _ => {}
                }
                continue;
            }

            match c {
                '.' if self.current.is_empty() => self.category = TokenCategory::AllocDirective,
                '$' if self.current.is_empty() => self.category = TokenCategory::Register,
                '%' if self.current.is_empty() => self.category = TokenCategory::MacroParam,
                _ if c.is_ascii_digit() || (c == '-' && self.current.is_empty()) => {
                    if matches!(self.category, TokenCategory::Unknown) {
                        self.category = TokenCategory::Immediate;
                    }
                }
                _ if c.is_alphabetic() || c == '_' => {
                    if matches!(self.category, TokenCategory::Unknown) {
                        self.category = TokenCategory::Instruction;
                    }
                }
                _ => {}
            }
            self.current.push(c);
            self.prev_char = c;
        }

        if in_string {
            return Err(self.err("unmatched quote"));
        }
        if !self.current.is_empty() {
            return Err(self.err(format!("unexpected EOL while parsing token '{}'", self.current)));
        }

        let mut tokens = self.tokens;
        reclassify_directives(&mut tokens);
        force_eqv_replacement_head(&mut tokens);
        Ok(tokens)
    }
}

fn reclassify_directives(tokens: &mut [Token]) {
    for t in tokens.iter_mut() {
        if t.category == TokenCategory::AllocDirective {
            t.category = classify_directive(&t.value);
        }
    }
}

/// `.eqv NAME value` tentatively treats `NAME` like a first-token mnemonic
/// candidate too, subject to the same demotion as the real first token.
fn force_eqv_replacement_head(tokens: &mut [Token]) {
    if tokens.len() >= 3 && tokens[0].category == TokenCategory::MetaDirective && tokens[0].value == "eqv"
    {
        if is_instruction(&tokens[2].value) {
            tokens[2].category = TokenCategory::Instruction;
        }
    }
}

/// Tokenizes one file's full text into one [`LineTokens`] per physical or
/// `:`-split line.
pub fn tokenize(file: &str, text: &str) -> Result<Vec<LineTokens>, AsmError> {
    let mut out = Vec::new();
    for (i, raw_line) in text.lines().enumerate() {
        let line_no = i + 1;
        let mut remaining = raw_line;
        loop {
            let lexer = LineLexer::new(file, line_no);
            let tokens = lexer.run(remaining)?;
            if tokens.is_empty() {
                break;
            }
            if let Some(split) = tokens.iter().position(|t| t.category == TokenCategory::LabelDef) {
                let (label_part, rest_part) = tokens.split_at(split + 1);
                out.push(LineTokens {
                    file: file.to_string(),
                    line: line_no,
                    tokens: label_part.to_vec(),
                });
                if rest_part.is_empty() {
                    break;
                }
                out.push(LineTokens {
                    file: file.to_string(),
                    line: line_no,
                    tokens: rest_part.to_vec(),
                });
                break;
            } else {
                out.push(LineTokens {
                    file: file.to_string(),
                    line: line_no,
                    tokens,
                });
                break;
            }
        }
        let _ = &mut remaining;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cats(line: &str) -> Vec<TokenCategory> {
        tokenize("t.asm", line).unwrap()[0]
            .tokens
            .iter()
            .map(|t| t.category)
            .collect()
    }

    #[test]
    fn classifies_instruction_then_register_then_immediate() {
        let cats = cats("addiu $t0, $zero, 5");
        assert_eq!(
            cats,
            vec![
                TokenCategory::Instruction,
                TokenCategory::Register,
                TokenCategory::Separator,
                TokenCategory::Register,
                TokenCategory::Separator,
                TokenCategory::Immediate,
            ]
        );
    }

    #[test]
    fn hex_immediate_becomes_decimal_text() {
        let lines = tokenize("t.asm", "li $t0, 0x10").unwrap();
        let imm = &lines[0].tokens[3];
        assert_eq!(imm.category, TokenCategory::Immediate);
        assert_eq!(imm.value, "16");
    }

    #[test]
    fn label_def_splits_line_in_two() {
        let lines = tokenize("t.asm", "L: add $t0, $t1, $t2").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].tokens[0].category, TokenCategory::LabelDef);
        assert_eq!(lines[0].line, lines[1].line);
    }

    #[test]
    fn section_and_meta_directives_are_reclassified() {
        assert_eq!(cats(".text"), vec![TokenCategory::SectionDirective]);
        assert_eq!(
            cats(".globl main")[0],
            TokenCategory::MetaDirective
        );
        assert_eq!(cats(".word 1")[0], TokenCategory::AllocDirective);
    }

    #[test]
    fn comment_discards_rest_of_line() {
        let lines = tokenize("t.asm", "nop # this is a comment, ignored").unwrap();
        assert_eq!(lines[0].tokens.len(), 1);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(tokenize("t.asm", "la $a0, \"unterminated").is_err());
    }

    #[test]
    fn unrecognized_first_token_is_a_label_reference_not_an_instruction() {
        assert_eq!(cats("foo(1, 2)")[0], TokenCategory::LabelRef);
    }

    #[test]
    fn recognized_first_token_stays_an_instruction() {
        assert_eq!(cats("syscall"), vec![TokenCategory::Instruction]);
    }

    #[test]
    fn non_first_tokens_are_always_label_references_even_if_they_name_a_mnemonic() {
        // "nop" is a real mnemonic, but here it's the second token (a label operand).
        let cats = cats("j nop");
        assert_eq!(cats, vec![TokenCategory::Instruction, TokenCategory::LabelRef]);
    }

    #[test]
    fn bare_comma_at_start_of_line_is_an_error() {
        assert!(tokenize("t.asm", ",").is_err());
    }

    #[test]
    fn bare_open_paren_at_start_of_line_is_an_error() {
        assert!(tokenize("t.asm", "(").is_err());
    }

    #[test]
    fn bare_close_paren_at_start_of_line_is_an_error() {
        assert!(tokenize("t.asm", ")").is_err());
    }

    #[test]
    fn bare_colon_at_start_of_line_is_an_error() {
        assert!(tokenize("t.asm", ":").is_err());
    }

    #[test]
    fn colon_after_whitespace_separated_label_is_not_an_error() {
        // The label text was already flushed as its own token by the preceding
        // space; the colon isn't at the start of the line even though `current`
        // happens to be empty when it's reached.
        assert!(tokenize("t.asm", "foo : nop").is_ok());
    }
}
