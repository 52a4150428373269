//! Error taxonomy for the emulator core.
//!
//! Mirrors the fatal/non-fatal/warning split: fatal variants are returned
//! as `Err` and unwind the interpreter loop; non-fatal variants are
//! logged via the `log` facade and execution continues (see
//! `cpu::Cpu::step` and `interrupt::Controller::enqueue`).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmuError {
    /// Signed division by zero, from an immediate, register, or memory
    /// operand. Fatal: the dividing register/memory cell is left
    /// untouched and the interpreter loop exits.
    #[error("division by zero in {opcode} (divisor source: {source_desc})")]
    DivisionByZero {
        opcode: &'static str,
        source_desc: String,
    },

    /// The top 7 bits of a fetched word do not name a known opcode.
    #[error("invalid instruction: opcode field {opcode:#04x} is not assigned")]
    InvalidInstruction { opcode: u8 },

    /// The pending-interrupt heap is full (more than 255 entries).
    #[error("too many hardware interrupts pending (heap capacity exceeded)")]
    HeapOverflow,

    /// `INT` executed while any hardware-sourced frame is active.
    /// Non-fatal: reported via the notification path, no transition occurs.
    #[error("software interrupt not allowed while a hardware interrupt is active")]
    InvalidSoftwareInterruptContext,

    /// A UART register was read or written in a way the protocol warns
    /// about (busy, stale, or programmer-only register). Warning only.
    #[error("invalid UART use: {0}")]
    InvalidUartUse(&'static str),

    /// A bad debugger command letter or an out-of-range watch address.
    /// Non-fatal: surfaced and retried.
    #[error("invalid user input: {0}")]
    InvalidUserInput(String),

    /// A CLI flag value was out of range or unusable. Fatal at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configured file (EPROM image, ISR image, SRAM backing file)
    /// could not be read.
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::sync::Arc<std::io::Error>,
    },
}

impl EmuError {
    /// Whether this error should abort the run (vs. be logged and
    /// continue from the next step), per §7's taxonomy.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            EmuError::InvalidSoftwareInterruptContext
                | EmuError::InvalidUartUse(_)
                | EmuError::InvalidUserInput(_)
        )
    }
}

impl From<(PathBuf, std::io::Error)> for EmuError {
    fn from((path, source): (PathBuf, std::io::Error)) -> Self {
        EmuError::Io {
            path,
            source: std::sync::Arc::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification_matches_taxonomy() {
        assert!(EmuError::DivisionByZero {
            opcode: "DIVI",
            source_desc: "IN1".into()
        }
        .is_fatal());
        assert!(EmuError::InvalidInstruction { opcode: 0x7F }.is_fatal());
        assert!(EmuError::HeapOverflow.is_fatal());
        assert!(!EmuError::InvalidSoftwareInterruptContext.is_fatal());
        assert!(!EmuError::InvalidUartUse("reading send register is meaningless").is_fatal());
        assert!(!EmuError::InvalidUserInput("bad watch address".into()).is_fatal());
    }
}
