//! Crate-wide error taxonomy.
//!
//! Four shapes, matching the pipeline boundaries they cross: syntax errors carry
//! file/line provenance from the lexer, preprocessor, or assembler; runtime errors
//! carry the offending PC from the interpreter; `Exec` is an internal signal that
//! never escapes the interpreter unconverted; `Exit` is the sentinel that carries a
//! program's exit code out of `interpret()`.

use thiserror::Error;

/// A CPU exception or interrupt cause code, see the cause-bit table in the interpreter.
pub type CauseCode = u32;

#[derive(Debug, Error)]
pub enum MasmError {
    #[error("Syntax error at {file}:{line} -> {message}")]
    Syntax {
        file: String,
        line: usize,
        message: String,
    },

    #[error("Runtime error at {pc:#010x} ({file}:{line}) -> {message}")]
    Runtime {
        pc: u32,
        file: String,
        line: usize,
        message: String,
    },

    /// Internal: signals that a CPU exception must be delivered. Never surfaced to a
    /// caller directly; the interpreter either routes it to a KText handler or
    /// converts it into `Runtime`.
    #[error("exec exception {cause:#x}: {message}")]
    Exec { cause: CauseCode, message: String },

    /// Sentinel for normal termination, propagated out of `interpret()`.
    #[error("exit({code}): {message}")]
    Exit { code: i32, message: String },
}

impl MasmError {
    pub fn syntax(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        MasmError::Syntax {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn runtime(
        pc: u32,
        file: impl Into<String>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        MasmError::Runtime {
            pc,
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn exec(cause: CauseCode, message: impl Into<String>) -> Self {
        MasmError::Exec {
            cause,
            message: message.into(),
        }
    }

    pub fn exit(code: i32, message: impl Into<String>) -> Self {
        MasmError::Exit {
            code,
            message: message.into(),
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, MasmError::Exit { .. })
    }
}

pub type Result<T> = std::result::Result<T, MasmError>;
