//! RETI Register File
//!
//! This module defines the complete register file of the machine:
//! - `PC`, `IN1`, `IN2`, `ACC`, `SP`, `BAF`, `CS`, `DS` — eight general
//!   32-bit registers, each with a fixed architectural meaning.
//! - A debugger-only sentinel (`Register::Address`) that never names a
//!   real register but lets the debugger address "the last computed
//!   address" the same way it addresses `ACC` or `PC`.
//!
//! Every read returns the last write; there is no hidden latching or
//! pipeline effect. The one register with special interpreter behavior
//! is `PC`: writing it suppresses the post-execution increment the
//! interpreter would otherwise apply (see `cpu::Cpu::step`).

use std::fmt;

/// Number of architectural registers (excludes the debugger sentinel).
pub const REGISTER_COUNT: usize = 8;

/// Names an architectural register, or the debugger-only `Address` slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    Pc,
    In1,
    In2,
    Acc,
    Sp,
    Baf,
    Cs,
    Ds,
    /// Sentinel used only by the debugger to watch "the last computed
    /// address"; never a real register and never produced by the decoder.
    Address,
}

impl Register {
    /// All real architectural registers, in register-file order.
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::Pc,
        Register::In1,
        Register::In2,
        Register::Acc,
        Register::Sp,
        Register::Baf,
        Register::Cs,
        Register::Ds,
    ];

    /// The 3-bit register code used by the bit codec, or `None` for the
    /// debugger sentinel (which never appears in an encoded instruction).
    #[must_use]
    pub const fn code(self) -> Option<u8> {
        match self {
            Register::Pc => Some(0),
            Register::In1 => Some(1),
            Register::In2 => Some(2),
            Register::Acc => Some(3),
            Register::Sp => Some(4),
            Register::Baf => Some(5),
            Register::Cs => Some(6),
            Register::Ds => Some(7),
            Register::Address => None,
        }
    }

    /// Decodes a 3-bit register code into a `Register`.
    ///
    /// # Panics
    /// Panics if `code` is not in `0..8`; the bit codec never produces a
    /// wider field, so an out-of-range code indicates a decoder bug.
    #[must_use]
    pub const fn from_code(code: u8) -> Register {
        match code {
            0 => Register::Pc,
            1 => Register::In1,
            2 => Register::In2,
            3 => Register::Acc,
            4 => Register::Sp,
            5 => Register::Baf,
            6 => Register::Cs,
            7 => Register::Ds,
            _ => panic!("register code out of range"),
        }
    }

    const fn index(self) -> usize {
        match self {
            Register::Pc => 0,
            Register::In1 => 1,
            Register::In2 => 2,
            Register::Acc => 3,
            Register::Sp => 4,
            Register::Baf => 5,
            Register::Cs => 6,
            Register::Ds => 7,
            Register::Address => panic!("Address is a debugger sentinel, not a storage slot"),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Register::Pc => "PC",
            Register::In1 => "IN1",
            Register::In2 => "IN2",
            Register::Acc => "ACC",
            Register::Sp => "SP",
            Register::Baf => "BAF",
            Register::Cs => "CS",
            Register::Ds => "DS",
            Register::Address => "ADDRESS",
        };
        f.write_str(name)
    }
}

/// The eight 32-bit architectural registers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    words: [u32; REGISTER_COUNT],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Creates a register file with every register cleared to zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: [0; REGISTER_COUNT],
        }
    }

    /// Reads a register.
    ///
    /// # Panics
    /// Panics if `reg` is `Register::Address` (the debugger sentinel has
    /// no storage of its own).
    #[must_use]
    #[inline]
    pub const fn get(&self, reg: Register) -> u32 {
        self.words[reg.index()]
    }

    /// Writes a register.
    ///
    /// # Panics
    /// Panics if `reg` is `Register::Address`.
    #[inline]
    pub fn set(&mut self, reg: Register, value: u32) {
        self.words[reg.index()] = value;
    }

    /// Reads `PC`.
    #[must_use]
    #[inline]
    pub const fn pc(&self) -> u32 {
        self.words[Register::Pc.index()]
    }

    /// Writes `PC`.
    #[inline]
    pub fn set_pc(&mut self, value: u32) {
        self.words[Register::Pc.index()] = value;
    }

    /// Reads `DS`.
    #[must_use]
    #[inline]
    pub const fn ds(&self) -> u32 {
        self.words[Register::Ds.index()]
    }

    /// Reads `SP`.
    #[must_use]
    #[inline]
    pub const fn sp(&self) -> u32 {
        self.words[Register::Sp.index()]
    }

    /// Writes `SP`.
    #[inline]
    pub fn set_sp(&mut self, value: u32) {
        self.words[Register::Sp.index()] = value;
    }

    /// Reads `ACC` as a signed value, used by `JUMPxx` condition checks.
    #[must_use]
    #[inline]
    pub const fn acc_signed(&self) -> i32 {
        self.words[Register::Acc.index()] as i32
    }

    /// Resets every register to zero (the `r` debugger command).
    pub fn reset(&mut self) {
        self.words = [0; REGISTER_COUNT];
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for reg in Register::ALL {
            writeln!(f, "{reg:<4} = {:#010x}", self.get(reg))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_register_file_is_zeroed() {
        let regs = RegisterFile::new();
        for reg in Register::ALL {
            assert_eq!(regs.get(reg), 0);
        }
    }

    #[test]
    fn read_returns_last_write() {
        let mut regs = RegisterFile::new();
        regs.set(Register::Acc, 42);
        regs.set(Register::Ds, 0x8000_0000);
        assert_eq!(regs.get(Register::Acc), 42);
        assert_eq!(regs.get(Register::Ds), 0x8000_0000);
        assert_eq!(regs.get(Register::Sp), 0);
    }

    #[test]
    fn register_code_round_trips() {
        for reg in Register::ALL {
            let code = reg.code().expect("architectural register has a code");
            assert_eq!(Register::from_code(code), reg);
        }
    }

    #[test]
    fn reset_clears_everything() {
        let mut regs = RegisterFile::new();
        regs.set(Register::Pc, 10);
        regs.set(Register::Acc, 20);
        regs.reset();
        assert_eq!(regs.get(Register::Pc), 0);
        assert_eq!(regs.get(Register::Acc), 0);
    }
}
