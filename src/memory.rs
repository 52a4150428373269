//! Memory subsystem: EPROM, file-backed SRAM, and the unified address
//! space that routes loads/stores between them and the UART.

use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::warn;

use crate::addressing::{self, Region};
use crate::error::EmuError;
use crate::loader::InputSource;
use crate::uart::Uart;

/// Read-only instruction memory, addressed by word index.
///
/// Built once by `machine::synthesize_boot_eprom` (or loaded from a custom
/// image); see `DESIGN.md` for why post-boot EPROM writes are left
/// undefined rather than guarded.
#[derive(Clone, Debug, Default)]
pub struct Eprom {
    words: Vec<u32>,
}

impl Eprom {
    #[must_use]
    pub fn new(words: Vec<u32>) -> Self {
        Self { words }
    }

    #[must_use]
    pub fn read(&self, index: u32) -> u32 {
        self.words.get(index as usize).copied().unwrap_or(0)
    }

    pub fn write(&mut self, index: u32, value: u32) {
        if (index as usize) >= self.words.len() {
            self.words.resize(index as usize + 1, 0);
        }
        self.words[index as usize] = value;
    }
}

/// File-backed SRAM: a flat word array addressed by a 31-bit offset.
///
/// The whole image is read into memory at load time; per the Non-goals in
/// §1, nothing is written back to disk — SRAM contents do not outlive one
/// run.
#[derive(Clone, Debug)]
pub struct Sram {
    words: Vec<u32>,
}

impl Sram {
    /// Creates a zero-filled SRAM of the given word count.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            words: vec![0; size],
        }
    }

    /// Loads an SRAM image from a big-endian word file (§6's SRAM file
    /// layout). The image is zero-padded or truncated to `size` words.
    ///
    /// # Errors
    /// Returns `EmuError::Io` if `path` cannot be read.
    pub fn load_from_file(path: &Path, size: usize) -> Result<Self, EmuError> {
        let bytes = fs::read(path).map_err(|e| (PathBuf::from(path), e))?;
        let mut cursor = std::io::Cursor::new(bytes);
        let mut words = Vec::with_capacity(size);
        while words.len() < size {
            match cursor.read_u32::<BigEndian>() {
                Ok(word) => words.push(word),
                Err(_) => break,
            }
        }
        words.resize(size, 0);
        Ok(Self { words })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[must_use]
    pub fn read(&self, offset: u32) -> u32 {
        self.words.get(offset as usize).copied().unwrap_or(0)
    }

    pub fn write(&mut self, offset: u32, value: u32) {
        if let Some(slot) = self.words.get_mut(offset as usize) {
            *slot = value;
        }
    }

    /// Serializes the image back to big-endian words, mainly for tests
    /// that want to assert on file round-trips.
    #[must_use]
    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.words.len() * 4);
        for word in &self.words {
            out.write_u32::<BigEndian>(*word).expect("write to Vec cannot fail");
        }
        out
    }
}

/// The unified 32-bit address space: routes every load/store to EPROM,
/// UART, or SRAM based on the top two address bits (§4.2).
pub struct AddressSpace {
    pub eprom: Eprom,
    pub sram: Sram,
    pub uart: Uart,
}

impl AddressSpace {
    #[must_use]
    pub fn new(eprom: Eprom, sram: Sram, uart: Uart) -> Self {
        Self { eprom, sram, uart }
    }

    /// Reads the 32-bit word at `address`.
    #[must_use]
    pub fn read(&mut self, address: u32) -> u32 {
        let (region, offset) = addressing::decode_region(address);
        match region {
            Region::Eprom => self.eprom.read(offset),
            Region::Uart => self.uart.read(offset),
            Region::Sram => self.sram.read(offset),
        }
    }

    /// Writes `value` to `address`.
    ///
    /// Writes into the EPROM region outside of boot synthesis are left
    /// undefined rather than guarded; this path simply writes through.
    pub fn write(&mut self, address: u32, value: u32, input: &mut dyn InputSource) {
        let (region, offset) = addressing::decode_region(address);
        match region {
            Region::Eprom => {
                warn!("write to EPROM region at runtime (undefined by spec, applied anyway)");
                self.eprom.write(offset, value);
            }
            Region::Uart => self.uart.write(offset, value, input),
            Region::Sram => self.sram.write(offset, value),
        }
    }
}
