//! The MASM object container format (spec §4.9): a `MemLayout`'s text, data,
//! ktext and kdata sections serialized to and read back from a flat binary,
//! the same shape read/write split and `*Ext` trait/`*_file` helpers as the
//! rest of this toolchain's file formats.
//!
//! Layout: a 4-byte `"MASM"` magic, then four little-endian `u32` header
//! slots (one per section, in text/data/ktext/kdata order) each holding the
//! byte offset of that section's region, or `0` if the section is absent.
//! Each region is a little-endian `u32` length followed by that many raw
//! bytes, padded with zeroes to the next 4-byte boundary.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info};
use thiserror::Error;

use masm_core::layout::MemLayout;

const MAGIC: &[u8; 4] = b"MASM";
const HEADER_LEN: usize = 20;
const SECTION_HEADERS: [usize; 4] = [4, 8, 12, 16];

#[derive(Debug, Error)]
pub enum ObjError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("not a MASM object file")]
    BadMagic,
    #[error("truncated MASM object file")]
    Truncated,
}

fn section_bytes(layout: &MemLayout, i: usize) -> &[u8] {
    match i {
        0 => &layout.sections.text,
        1 => &layout.sections.data,
        2 => &layout.sections.ktext,
        3 => &layout.sections.kdata,
        _ => unreachable!(),
    }
}

fn section_slot(layout: &mut MemLayout, i: usize) -> &mut Vec<u8> {
    match i {
        0 => &mut layout.sections.text,
        1 => &mut layout.sections.data,
        2 => &mut layout.sections.ktext,
        3 => &mut layout.sections.kdata,
        _ => unreachable!(),
    }
}

pub fn write<W: Write>(writer: &mut W, layout: &MemLayout) -> Result<(), ObjError> {
    debug!(
        "saving container: text={}B data={}B ktext={}B kdata={}B",
        layout.sections.text.len(),
        layout.sections.data.len(),
        layout.sections.ktext.len(),
        layout.sections.kdata.len(),
    );
    let mut binary = Vec::with_capacity(HEADER_LEN);
    binary.extend_from_slice(MAGIC);
    binary.extend_from_slice(&[0u8; 16]);

    for (i, &header) in SECTION_HEADERS.iter().enumerate() {
        let bytes = section_bytes(layout, i);
        if bytes.is_empty() {
            continue;
        }
        let offset = binary.len() as u32;
        LittleEndian::write_u32(&mut binary[header..header + 4], offset);
        let mut len_buf = [0u8; 4];
        LittleEndian::write_u32(&mut len_buf, bytes.len() as u32);
        binary.extend_from_slice(&len_buf);
        binary.extend_from_slice(bytes);
        while binary.len() % 4 != 0 {
            binary.push(0);
        }
    }

    writer.write_all(&binary)?;
    Ok(())
}

pub fn read<R: Read>(reader: &mut R) -> Result<MemLayout, ObjError> {
    let mut binary = Vec::new();
    reader.read_to_end(&mut binary)?;
    if binary.len() < HEADER_LEN {
        return Err(ObjError::Truncated);
    }
    if &binary[0..4] != MAGIC {
        return Err(ObjError::BadMagic);
    }

    let mut layout = MemLayout::new();
    for (i, &header) in SECTION_HEADERS.iter().enumerate() {
        let offset = LittleEndian::read_u32(&binary[header..header + 4]) as usize;
        if offset == 0 {
            continue;
        }
        if offset + 4 > binary.len() {
            return Err(ObjError::Truncated);
        }
        let len = LittleEndian::read_u32(&binary[offset..offset + 4]) as usize;
        let start = offset + 4;
        let end = start.checked_add(len).ok_or(ObjError::Truncated)?;
        if end > binary.len() {
            return Err(ObjError::Truncated);
        }
        *section_slot(&mut layout, i) = binary[start..end].to_vec();
    }
    info!("loaded container ({} bytes)", binary.len());
    Ok(layout)
}

pub trait ReadMasmExt: Read + Sized {
    fn read_masm(&mut self) -> Result<MemLayout, ObjError> {
        read(self)
    }
}

impl<R: Read + Sized> ReadMasmExt for R {}

pub trait WriteMasmExt: Write + Sized {
    fn write_masm(&mut self, layout: &MemLayout) -> Result<(), ObjError> {
        write(self, layout)
    }
}

impl<W: Write + Sized> WriteMasmExt for W {}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<MemLayout, ObjError> {
    BufReader::new(File::open(path)?).read_masm()
}

pub fn write_file<P: AsRef<Path>>(path: P, layout: &MemLayout) -> Result<(), ObjError> {
    BufWriter::new(File::create(path)?).write_masm(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_all_four_sections() {
        let mut layout = MemLayout::new();
        layout.sections.text = vec![1, 2, 3, 4];
        layout.sections.data = vec![5, 6];
        layout.sections.ktext = vec![7, 8, 9, 10];
        layout.sections.kdata = vec![11];

        let mut buf = Vec::new();
        write(&mut buf, &layout).unwrap();
        let read_back = read(&mut Cursor::new(buf)).unwrap();

        assert_eq!(read_back.sections.text, layout.sections.text);
        assert_eq!(read_back.sections.data, layout.sections.data);
        assert_eq!(read_back.sections.ktext, layout.sections.ktext);
        assert_eq!(read_back.sections.kdata, layout.sections.kdata);
    }

    #[test]
    fn absent_sections_round_trip_empty() {
        let mut layout = MemLayout::new();
        layout.sections.text = vec![42];

        let mut buf = Vec::new();
        write(&mut buf, &layout).unwrap();
        let read_back = read(&mut Cursor::new(buf)).unwrap();

        assert!(read_back.sections.data.is_empty());
        assert!(read_back.sections.ktext.is_empty());
        assert!(read_back.sections.kdata.is_empty());
    }

    #[test]
    fn missing_magic_is_rejected() {
        let buf = vec![0u8; 20];
        assert!(matches!(read(&mut Cursor::new(buf)), Err(ObjError::BadMagic)));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let buf = vec![b'M', b'A', b'S'];
        assert!(matches!(read(&mut Cursor::new(buf)), Err(ObjError::Truncated)));
    }
}
