//! Minimal command-line frontend: reads one or more source files (or a single
//! already-assembled object file), assembles and runs them. Argument parsing,
//! file discovery and the rest of a real frontend's concerns stay here and
//! nowhere else; masm-core, masm-asm and masm-obj don't know this crate exists.

#[macro_use]
extern crate clap;

use std::fs;
use std::io;
use std::path::Path;
use std::process;

use clap::Arg;
use thiserror::Error;

use masm_asm::error::AsmError;
use masm_core::config::{Config, Endianness, IoMode};
use masm_core::console::StdConsole;
use masm_core::error::MasmError;
use masm_core::interpreter;
use masm_core::layout::MemLayout;
use masm_core::state::State;
use masm_obj::ObjError;

#[derive(Debug, Error)]
enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Asm(#[from] AsmError),
    #[error("{0}")]
    Obj(#[from] ObjError),
    #[error("{0}")]
    Masm(#[from] MasmError),
}

fn is_object_file(path: &str) -> bool {
    Path::new(path).extension().and_then(|ext| ext.to_str()) == Some("o")
}

fn sibling(first_input: &str, extension: &str) -> std::path::PathBuf {
    Path::new(first_input).with_extension(extension)
}

fn assemble_inputs(inputs: &[&str], config: &Config) -> Result<(MemLayout, masm_asm::labels::LabelMap), Error> {
    let mut files = Vec::with_capacity(inputs.len());
    for path in inputs {
        let text = fs::read_to_string(path)?;
        files.push(masm_asm::SourceFile {
            name: Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| (*path).to_string()),
            text,
        });
    }
    Ok(masm_asm::assemble(&files, config)?)
}

fn run() -> Result<i32, Error> {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("Source files to assemble, or a single .o object file to run")
                .multiple(true)
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("mmio")
                .short("m")
                .long("mmio")
                .help("Use MMIO polling for I/O instead of blocking syscalls"),
        )
        .arg(
            Arg::with_name("little-endian")
                .short("l")
                .long("little-endian")
                .help("Use little-endian byte order instead of the default big-endian"),
        )
        .arg(
            Arg::with_name("save-temps")
                .long("save-temps")
                .help("Write the preprocessed .i listing and .o object next to the first input"),
        )
        .arg(
            Arg::with_name("assemble")
                .short("s")
                .long("assemble")
                .help("Stop after assembling; don't run the program"),
        )
        .get_matches();

    let inputs: Vec<&str> = matches.values_of("INPUT").unwrap().collect();
    let config = Config::new(
        if matches.is_present("little-endian") { Endianness::Little } else { Endianness::Big },
        if matches.is_present("mmio") { IoMode::Mmio } else { IoMode::Syscall },
    );

    let layout = if inputs.len() == 1 && is_object_file(inputs[0]) {
        masm_obj::read_file(inputs[0])?
    } else {
        let (layout, labels) = assemble_inputs(&inputs, &config)?;

        if matches.is_present("save-temps") {
            fs::write(sibling(inputs[0], "i"), masm_asm::intermediates::stringify_layout(&layout, &labels))?;
            masm_obj::write_file(sibling(inputs[0], "o"), &layout)?;
        }

        layout
    };

    if matches.is_present("assemble") {
        return Ok(0);
    }

    let mut state = State::new(config);
    interpreter::load(&mut state, &layout);
    let mut console = StdConsole;
    Ok(interpreter::interpret(&mut state, &mut console)?)
}

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("masm: {}", e);
            process::exit(1);
        }
    }
}
