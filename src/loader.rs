//! External collaborator contracts (§6, §10).
//!
//! The textual assembler/disassembler and the ncurses TUI are explicitly
//! out of scope for the core (§1); this module gives them a narrow trait
//! boundary instead of a real implementation, plus the one concrete
//! loader the core does own: reading an already-assembled binary word
//! stream (§6's SRAM file layout).

use std::io::{self, Read};
use std::path::Path;

use crate::debugger::{DebugSnapshot, DebuggerCommand};

/// Produces already-assembled 32-bit words for an EPROM or SRAM image.
///
/// The real text-format assembler lives outside this core; this trait is
/// the seam a caller plugs one into. [`RawWordLoader`] is the only
/// implementation shipped here, and it expects its input to already be a
/// big-endian word stream (§6).
pub trait ProgramLoader {
    /// # Errors
    /// Returns an `io::Error` if `path` cannot be read.
    fn load(&self, path: &Path) -> io::Result<Vec<u32>>;
}

/// Reads a big-endian 32-bit word stream, matching §6's SRAM file format.
/// Also accepts `-` meaning "read from stdin" per the CLI surface.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawWordLoader;

impl ProgramLoader for RawWordLoader {
    fn load(&self, path: &Path) -> io::Result<Vec<u32>> {
        let mut bytes = Vec::new();
        if path == Path::new("-") {
            io::stdin().read_to_end(&mut bytes)?;
        } else {
            bytes = std::fs::read(path)?;
        }
        let mut words = Vec::with_capacity(bytes.len() / 4);
        for chunk in bytes.chunks_exact(4) {
            words.push(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        Ok(words)
    }
}

/// Draws the current machine state and returns the next user command.
///
/// The real ncurses box-layout renderer lives outside this core; only
/// [`NullTui`] is shipped, which drives the machine headlessly.
pub trait TuiDriver {
    fn render(&mut self, snapshot: &DebugSnapshot) -> DebuggerCommand;
}

/// Always continues; used whenever `-d` (debug/TUI mode) is not passed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTui;

impl TuiDriver for NullTui {
    fn render(&mut self, _snapshot: &DebugSnapshot) -> DebuggerCommand {
        DebuggerCommand::Continue
    }
}

/// Supplies the integers the UART receive channel consumes (§4.4, §6).
pub trait InputSource {
    /// Returns the next scripted word, if any remain.
    fn next_word(&mut self) -> Option<i64>;
    /// Blocks for one integer or single character from the user; called
    /// only when `next_word` returns `None`.
    fn prompt_blocking(&mut self) -> i64;
}

/// An ordered list of words, consumed in order — the `-m` "scripted
/// input" mode reads these from program comments; tests construct them
/// directly.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    words: std::collections::VecDeque<i64>,
}

impl ScriptedInput {
    #[must_use]
    pub fn new(words: Vec<i64>) -> Self {
        Self {
            words: words.into(),
        }
    }
}

impl InputSource for ScriptedInput {
    fn next_word(&mut self) -> Option<i64> {
        self.words.pop_front()
    }

    fn prompt_blocking(&mut self) -> i64 {
        0
    }
}

/// Blocks on stdin for an integer, or a single character whose code
/// becomes the word, once the scripted list (if any) is exhausted.
#[derive(Debug, Default)]
pub struct StdinInput;

impl InputSource for StdinInput {
    fn next_word(&mut self) -> Option<i64> {
        None
    }

    fn prompt_blocking(&mut self) -> i64 {
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return 0;
        }
        let trimmed = line.trim();
        trimmed
            .parse::<i64>()
            .unwrap_or_else(|_| trimmed.chars().next().map_or(0, |c| c as i64))
    }
}
