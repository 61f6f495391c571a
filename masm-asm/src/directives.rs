//! Allocation directive sizing and byte encoding (spec §4.4).
//!
//! Each directive is a pure function of its arguments and the current location
//! counter — computing `(bytes, leading_pad)` never touches anything outside its
//! own return value, so the same call does double duty as the dry-run sizing
//! pass (§4.3) and the emission pass.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use masm_core::config::Endianness;

use crate::error::AsmError;
use crate::lexer::Token;

fn align_pad(loc: u32, align: u32) -> usize {
    let mask = align - 1;
    let rem = loc & mask;
    if rem == 0 {
        0
    } else {
        (align - rem) as usize
    }
}

fn unescape(file: &str, line: usize, s: &str) -> Result<Vec<u8>, AsmError> {
    let mut out = Vec::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c as u8);
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('r') => out.push(b'\r'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some('"') => out.push(b'"'),
            Some('\'') => out.push(b'\''),
            Some(other) => {
                return Err(AsmError::encode(
                    file,
                    line,
                    format!("unknown escape sequence '\\{}'", other),
                ))
            }
            None => return Err(AsmError::encode(file, line, "trailing backslash in string")),
        }
    }
    Ok(out)
}

fn parse_i64(file: &str, line: usize, token: &str) -> Result<i64, AsmError> {
    token
        .parse()
        .map_err(|_| AsmError::encode(file, line, format!("invalid integer literal '{}'", token)))
}

fn write_int(endianness: Endianness, out: &mut Vec<u8>, value: i64, size: usize) {
    let mut buf = [0u8; 8];
    match endianness {
        Endianness::Big => BigEndian::write_i64(&mut buf, value),
        Endianness::Little => LittleEndian::write_i64(&mut buf, value),
    }
    match endianness {
        Endianness::Big => out.extend_from_slice(&buf[8 - size..]),
        Endianness::Little => out.extend_from_slice(&buf[..size]),
    }
}

/// Encodes one allocation directive. `name` excludes the leading `.`. `loc` is
/// the current byte offset within its section, used for alignment.
pub fn encode(
    name: &str,
    args: &[Token],
    loc: u32,
    endianness: Endianness,
    file: &str,
    line: usize,
) -> Result<(Vec<u8>, usize), AsmError> {
    match name {
        "align" => {
            let n: u32 = args
                .get(0)
                .ok_or_else(|| AsmError::encode(file, line, "'.align' needs one argument"))?
                .value
                .parse()
                .map_err(|_| AsmError::encode(file, line, "'.align' argument must be 0..3"))?;
            if n > 3 {
                return Err(AsmError::encode(file, line, "'.align' argument must be 0..3"));
            }
            let pad = align_pad(loc, 1 << n);
            Ok((vec![0u8; pad], pad))
        }
        "ascii" => {
            let s = args
                .get(0)
                .ok_or_else(|| AsmError::encode(file, line, "'.ascii' needs a string argument"))?;
            Ok((unescape(file, line, &s.value)?, 0))
        }
        "asciiz" => {
            let s = args
                .get(0)
                .ok_or_else(|| AsmError::encode(file, line, "'.asciiz' needs a string argument"))?;
            let mut bytes = unescape(file, line, &s.value)?;
            bytes.push(0);
            Ok((bytes, 0))
        }
        "byte" => {
            let mut out = Vec::new();
            for a in args {
                let v = parse_i64(file, line, &a.value)?;
                if !(-128..=255).contains(&v) {
                    return Err(AsmError::encode(file, line, format!("{} does not fit in a byte", v)));
                }
                out.push(v as u8);
            }
            Ok((out, 0))
        }
        "half" => {
            let pad = align_pad(loc, 2);
            let mut out = vec![0u8; pad];
            for a in args {
                let v = parse_i64(file, line, &a.value)?;
                write_int(endianness, &mut out, v, 2);
            }
            Ok((out, pad))
        }
        "word" => {
            let pad = align_pad(loc, 4);
            let mut out = vec![0u8; pad];
            for a in args {
                let v = parse_i64(file, line, &a.value)?;
                write_int(endianness, &mut out, v, 4);
            }
            Ok((out, pad))
        }
        "float" => {
            let pad = align_pad(loc, 4);
            let mut out = vec![0u8; pad];
            for a in args {
                let v: f32 = a
                    .value
                    .parse()
                    .map_err(|_| AsmError::encode(file, line, format!("invalid float '{}'", a.value)))?;
                let mut buf = [0u8; 4];
                match endianness {
                    Endianness::Big => BigEndian::write_f32(&mut buf, v),
                    Endianness::Little => LittleEndian::write_f32(&mut buf, v),
                }
                out.extend_from_slice(&buf);
            }
            Ok((out, pad))
        }
        "double" => {
            let pad = align_pad(loc, 8);
            let mut out = vec![0u8; pad];
            for a in args {
                let v: f64 = a
                    .value
                    .parse()
                    .map_err(|_| AsmError::encode(file, line, format!("invalid double '{}'", a.value)))?;
                let mut buf = [0u8; 8];
                match endianness {
                    Endianness::Big => BigEndian::write_f64(&mut buf, v),
                    Endianness::Little => LittleEndian::write_f64(&mut buf, v),
                }
                out.extend_from_slice(&buf);
            }
            Ok((out, pad))
        }
        "space" => {
            let n: usize = args
                .get(0)
                .ok_or_else(|| AsmError::encode(file, line, "'.space' needs one argument"))?
                .value
                .parse()
                .map_err(|_| AsmError::encode(file, line, "'.space' argument must be a non-negative integer"))?;
            Ok((vec![0u8; n], 0))
        }
        other => Err(AsmError::encode(file, line, format!("unknown directive '.{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TokenCategory;

    fn imm(v: &str) -> Token {
        Token {
            category: TokenCategory::Immediate,
            value: v.to_string(),
        }
    }

    #[test]
    fn word_aligns_from_odd_location() {
        let (bytes, pad) = encode("word", &[imm("1")], 2, Endianness::Big, "t", 1).unwrap();
        assert_eq!(pad, 2);
        assert_eq!(bytes.len(), 6);
        assert_eq!(&bytes[2..], &[0, 0, 0, 1]);
    }

    #[test]
    fn asciiz_appends_nul() {
        let (bytes, pad) = encode(
            "asciiz",
            &[Token {
                category: TokenCategory::String,
                value: "Hi\\n".to_string(),
            }],
            0,
            Endianness::Big,
            "t",
            1,
        )
        .unwrap();
        assert_eq!(pad, 0);
        assert_eq!(bytes, vec![b'H', b'i', b'\n', 0]);
    }

    #[test]
    fn byte_out_of_range_is_an_error() {
        assert!(encode("byte", &[imm("300")], 0, Endianness::Big, "t", 1).is_err());
    }

    #[test]
    fn space_emits_n_zero_bytes_unaligned() {
        let (bytes, pad) = encode("space", &[imm("3")], 1, Endianness::Big, "t", 1).unwrap();
        assert_eq!(pad, 0);
        assert_eq!(bytes, vec![0, 0, 0]);
    }
}
