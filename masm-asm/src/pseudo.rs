//! Pseudo-instruction expansion (spec §4.5 "Pseudo-instruction expansions").
//!
//! Each pseudo emits a fixed native sequence; every generated word inherits the
//! pseudo's own source location, and only the first gets any label the pseudo
//! line carried.

use crate::error::AsmError;
use crate::instructions::NativeCall;
use crate::lexer::{Token, TokenCategory};

fn reg(name: &str) -> Token {
    Token {
        category: TokenCategory::Register,
        value: name.to_string(),
    }
}

fn imm(value: impl ToString) -> Token {
    Token {
        category: TokenCategory::Immediate,
        value: value.to_string(),
    }
}

fn label(name: &str) -> Token {
    Token {
        category: TokenCategory::LabelRef,
        value: name.to_string(),
    }
}

fn sep(args: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::new();
    for (i, a) in args.into_iter().enumerate() {
        if i > 0 {
            out.push(Token {
                category: TokenCategory::Separator,
                value: ",".to_string(),
            });
        }
        out.push(a);
    }
    out
}

fn call(name: &str, args: Vec<Token>) -> NativeCall {
    NativeCall {
        name: name.to_string(),
        args: sep(args),
    }
}

/// Returns the fixed encoded size (4 or 8 bytes) of a pseudo, or `None` if
/// `name` isn't a known pseudo-instruction.
pub fn pseudo_size(name: &str) -> Option<u32> {
    match name {
        "li" | "move" | "nop" => Some(4),
        "la" | "mul" | "blt" | "bgt" | "ble" | "bge" | "bltz" | "bgtz" | "blez" | "bgez" => Some(8),
        _ => None,
    }
}

/// Expands a pseudo-instruction line's operand tokens into the native calls it
/// compiles down to.
pub fn expand(
    name: &str,
    operands: &[Token],
    file: &str,
    line: usize,
) -> Result<Vec<NativeCall>, AsmError> {
    let args: Vec<&Token> = operands
        .iter()
        .filter(|t| t.category != TokenCategory::Separator)
        .collect();

    match name {
        "nop" => Ok(vec![call("sll", vec![reg("zero"), reg("zero"), imm(0)])]),
        "li" => {
            let rd = args.get(0).ok_or_else(|| missing(file, line, "li"))?;
            let v = args.get(1).ok_or_else(|| missing(file, line, "li"))?;
            Ok(vec![call(
                "addiu",
                vec![(*rd).clone(), reg("zero"), (*v).clone()],
            )])
        }
        "move" => {
            let rd = args.get(0).ok_or_else(|| missing(file, line, "move"))?;
            let rs = args.get(1).ok_or_else(|| missing(file, line, "move"))?;
            Ok(vec![call(
                "addu",
                vec![(*rd).clone(), reg("zero"), (*rs).clone()],
            )])
        }
        "la" => Err(AsmError::encode(
            file,
            line,
            "'la' needs its label resolved to an address; handled directly by the encoder",
        )),
        "mul" => {
            let rd = args.get(0).ok_or_else(|| missing(file, line, "mul"))?;
            let rs = args.get(1).ok_or_else(|| missing(file, line, "mul"))?;
            let rt = args.get(2).ok_or_else(|| missing(file, line, "mul"))?;
            Ok(vec![
                call("mult", vec![(*rs).clone(), (*rt).clone()]),
                call("mflo", vec![(*rd).clone()]),
            ])
        }
        "blt" | "bgt" | "ble" | "bge" => {
            let ra = args.get(0).ok_or_else(|| missing(file, line, name))?;
            let rb = args.get(1).ok_or_else(|| missing(file, line, name))?;
            let l = args.get(2).ok_or_else(|| missing(file, line, name))?;
            expand_compare(name, ra, rb, l)
        }
        "bltz" | "bgtz" | "blez" | "bgez" => {
            let ra = args.get(0).ok_or_else(|| missing(file, line, name))?;
            let l = args.get(1).ok_or_else(|| missing(file, line, name))?;
            let zero = reg("zero");
            let native = &name[..name.len() - 1];
            expand_compare(native, ra, &zero, l)
        }
        _ => Err(AsmError::encode(file, line, format!("unknown pseudo-instruction '{}'", name))),
    }
}

fn expand_compare(name: &str, ra: &Token, rb: &Token, l: &Token) -> Result<Vec<NativeCall>, AsmError> {
    let (x, y, branch) = match name {
        "blt" => (ra, rb, "bne"),
        "bgt" => (rb, ra, "bne"),
        "ble" => (rb, ra, "beq"),
        "bge" => (ra, rb, "beq"),
        _ => unreachable!(),
    };
    Ok(vec![
        call("slt", vec![reg("at"), x.clone(), y.clone()]),
        call(branch, vec![reg("at"), reg("zero"), l.clone()]),
    ])
}

fn missing(file: &str, line: usize, name: &str) -> AsmError {
    AsmError::encode(file, line, format!("'{}' is missing an operand", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn li_expands_to_addiu_against_zero() {
        let ops = sep(vec![reg("t0"), imm(5)]);
        let calls = expand("li", &ops, "t.asm", 1).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "addiu");
    }

    #[test]
    fn blt_expands_to_slt_then_bne() {
        let ops = sep(vec![reg("t0"), reg("t1"), label("L")]);
        let calls = expand("blt", &ops, "t.asm", 1).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "slt");
        assert_eq!(calls[1].name, "bne");
    }

    #[test]
    fn bgtz_reuses_compare_table_against_zero() {
        let ops = sep(vec![reg("t0"), label("L")]);
        let calls = expand("bgtz", &ops, "t.asm", 1).unwrap();
        assert_eq!(calls[1].name, "bne");
        assert_eq!(calls[0].args[2].value, "zero");
    }
}
