//! Command-line argument surface (§6, §4.8).
//!
//! Mirrors the flag list one-to-one; the only validation performed here is
//! what `MachineConfig` itself needs to make sense of (`sram_size` must fit
//! an IVT slot and at least one program word).

use std::path::PathBuf;

use clap::Parser;

use crate::error::EmuError;
use crate::machine::MachineConfig;

/// Minimum SRAM size: one IVT slot plus room for at least one instruction.
const MIN_SRAM_SIZE: usize = 2;

#[derive(Parser, Debug)]
#[command(name = "reti-emu", about = "Emulator for a pedagogical 32-bit register machine")]
pub struct Args {
    /// SRAM size in words.
    #[arg(short = 's', long, default_value_t = 4096)]
    pub sram_size: usize,

    /// Page size in words, used only to size diagnostic dumps.
    #[arg(short = 'p', long, default_value_t = 256)]
    pub page_size: usize,

    /// Directory holding peripheral backing files.
    #[arg(short = 'f', long)]
    pub peripherals_dir: Option<PathBuf>,

    /// Custom EPROM image; omit to synthesize the boot prologue.
    #[arg(short = 'e', long)]
    pub eprom_path: Option<PathBuf>,

    /// ISR image (IVT entries plus interrupt service routines).
    #[arg(short = 'i', long)]
    pub isrs_path: Option<PathBuf>,

    /// Inclusive upper bound on UART service latency, in steps.
    #[arg(short = 'w', long, default_value_t = 0)]
    pub max_waiting_instrs: u32,

    /// Timer interval, in steps; 0 disables the timer.
    #[arg(short = 'I', long, default_value_t = 0)]
    pub timer_interval: u32,

    /// Debug/TUI mode.
    #[arg(short = 'd', long, default_value_t = false)]
    pub debug: bool,

    /// Test mode: force legacy stdout, write out.txt/err.txt, rewrite fatal exit codes to 0.
    #[arg(short = 't', long, default_value_t = false)]
    pub test_mode: bool,

    /// Read scripted UART input from program comments.
    #[arg(short = 'm', long, default_value_t = false)]
    pub read_input_from_comments: bool,

    /// Verbose logging.
    #[arg(short = 'v', long, default_value_t = false)]
    pub verbose: bool,

    /// Binary display in the TUI.
    #[arg(short = 'b', long, default_value_t = false)]
    pub binary_display: bool,

    /// Extended TUI features.
    #[arg(short = 'E', long, default_value_t = false)]
    pub extended_tui: bool,

    /// Unsigned display for the data segment.
    #[arg(short = 'u', long, default_value_t = false)]
    pub unsigned_data_display: bool,

    /// Enable all TUI extras at once.
    #[arg(short = 'a', long, default_value_t = false)]
    pub enable_all: bool,

    /// Main program path, or `-` for stdin.
    pub program: PathBuf,
}

impl Args {
    /// Validates flag values and produces the machine configuration.
    ///
    /// # Errors
    /// Returns `EmuError::InvalidConfig` if `sram_size` cannot hold the IVT
    /// plus at least one instruction.
    pub fn into_config(self) -> Result<MachineConfig, EmuError> {
        if self.sram_size < MIN_SRAM_SIZE {
            return Err(EmuError::InvalidConfig(format!(
                "sram_size {} is too small to hold an IVT entry and an instruction",
                self.sram_size
            )));
        }
        Ok(MachineConfig {
            sram_size: self.sram_size,
            page_size: self.page_size,
            peripherals_dir: self.peripherals_dir,
            eprom_path: self.eprom_path,
            isrs_path: self.isrs_path,
            max_waiting_instrs: self.max_waiting_instrs,
            timer_interval: self.timer_interval,
            isr_bindings: Vec::new(),
            isr_priorities: Vec::new(),
            debug: self.debug,
            test_mode: self.test_mode,
            read_input_from_comments: self.read_input_from_comments,
            verbose: self.verbose,
            binary_display: self.binary_display,
            extended_tui: self.extended_tui,
            unsigned_data_display: self.unsigned_data_display,
            enable_all: self.enable_all,
        })
    }
}
