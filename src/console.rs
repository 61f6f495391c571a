//! The external stream handle the interpreter reads from and writes to (spec §5,
//! §6 "Wire/host I/O"). Boundary concerns (raw-mode terminal setup) stay with the
//! caller; the core only needs a byte-oriented read/write/poll surface.

use std::io::{self, Read, Write};

pub trait Console {
    fn write_str(&mut self, s: &str) -> io::Result<()>;
    fn write_byte(&mut self, b: u8) -> io::Result<()>;
    /// Blocking: reads one line, used by `read_int`/`read_string`.
    fn read_line(&mut self) -> io::Result<String>;
    /// Blocking: reads a single byte, used by `read_char`.
    fn read_byte(&mut self) -> io::Result<u8>;
    /// Non-blocking: returns a byte if one is immediately available, for MMIO
    /// polling.
    fn poll_byte(&mut self) -> Option<u8>;
}

/// Console backed by process stdin/stdout, for syscall-mode I/O.
pub struct StdConsole;

impl Console for StdConsole {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        print!("{}", s);
        io::stdout().flush()
    }

    fn write_byte(&mut self, b: u8) -> io::Result<()> {
        io::stdout().write_all(&[b])?;
        io::stdout().flush()
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(line)
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        io::stdin().read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn poll_byte(&mut self) -> Option<u8> {
        // A real MMIO frontend disables line discipline and polls a raw fd; the
        // core only specifies the interface (§5), so a blocking fallback here
        // would defeat the purpose. Callers driving MMIO mode are expected to
        // supply their own non-blocking `Console` (see `tests` for an example).
        None
    }
}

/// An in-memory console for tests and embedders that already have buffered I/O.
#[derive(Debug, Clone, Default)]
pub struct BufferConsole {
    pub input: std::collections::VecDeque<u8>,
    pub output: Vec<u8>,
}

impl BufferConsole {
    pub fn with_input(input: &str) -> Self {
        BufferConsole {
            input: input.bytes().collect(),
            output: Vec::new(),
        }
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Console for BufferConsole {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.output.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn write_byte(&mut self, b: u8) -> io::Result<()> {
        self.output.push(b);
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        while let Some(b) = self.input.pop_front() {
            if b == b'\n' {
                break;
            }
            line.push(b);
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        self.input.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "no more buffered input")
        })
    }

    fn poll_byte(&mut self) -> Option<u8> {
        self.input.pop_front()
    }
}
