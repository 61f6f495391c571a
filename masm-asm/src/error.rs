//! Assembler-stage error taxonomy.
//!
//! Every pipeline stage (lexer, preprocessor, label pass, directive/instruction
//! encoding) raises file/line-tagged errors; [`AsmError::into_masm`] is the single
//! conversion point into the crate-wide [`masm_core::MasmError::Syntax`] the
//! interpreter's error type shares with runtime errors.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("{file}:{line}: lex error: {message}")]
    Lex {
        file: String,
        line: usize,
        message: String,
    },

    #[error("{file}:{line}: preprocessor error: {message}")]
    Preprocess {
        file: String,
        line: usize,
        message: String,
    },

    #[error("{file}:{line}: label error: {message}")]
    Label {
        file: String,
        line: usize,
        message: String,
    },

    #[error("{file}:{line}: encoding error: {message}")]
    Encode {
        file: String,
        line: usize,
        message: String,
    },
}

impl AsmError {
    pub fn lex(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        AsmError::Lex {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn preprocess(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        AsmError::Preprocess {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn label(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        AsmError::Label {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn encode(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        AsmError::Encode {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    fn parts(&self) -> (&str, usize, String) {
        match self {
            AsmError::Lex { file, line, message }
            | AsmError::Preprocess { file, line, message }
            | AsmError::Label { file, line, message }
            | AsmError::Encode { file, line, message } => (file.as_str(), *line, message.clone()),
        }
    }

    /// Converts into the crate-wide error type the interpreter also raises.
    pub fn into_masm(self) -> masm_core::MasmError {
        let (file, line, message) = self.parts();
        masm_core::MasmError::syntax(file, line, message)
    }
}
