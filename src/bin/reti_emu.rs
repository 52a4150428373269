//! Binary entry point: `Args` → `MachineConfig` → `Machine::new` →
//! `Machine::run`, translating the result into a process exit code (§4.8).

use std::process::ExitCode;

use clap::Parser;
use log::{error, warn};

use reti_emu::cli::Args;
use reti_emu::loader::{NullTui, ProgramLoader, RawWordLoader, StdinInput};
use reti_emu::machine::{Machine, RunOutcome};
use reti_emu::memory::Eprom;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

/// Writes the legacy `out.txt`/`err.txt` pair the `-t` test mode produces,
/// relative to the current directory.
fn write_test_mode_files(error_message: Option<&str>) {
    let _ = std::fs::write("out.txt", "");
    let _ = std::fs::write("err.txt", error_message.unwrap_or(""));
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.read_input_from_comments {
        warn!("-m (scripted input from program comments) requires the external assembler; falling back to stdin");
    }
    if args.debug {
        warn!("-d (TUI mode) requested but no ncurses driver is linked in; running headless");
    }

    let loader = RawWordLoader;
    let test_mode = args.test_mode;

    let program_words = match loader.load(&args.program) {
        Ok(words) => words,
        Err(e) => {
            error!("could not read program {}: {e}", args.program.display());
            if test_mode {
                write_test_mode_files(Some(&e.to_string()));
                return ExitCode::SUCCESS;
            }
            return ExitCode::FAILURE;
        }
    };

    let isrs_words = match &args.isrs_path {
        Some(path) => match loader.load(path) {
            Ok(words) => words,
            Err(e) => {
                error!("could not read ISR image {}: {e}", path.display());
                if test_mode {
                    write_test_mode_files(Some(&e.to_string()));
                    return ExitCode::SUCCESS;
                }
                return ExitCode::FAILURE;
            }
        },
        None => Vec::new(),
    };

    let eprom_override = match &args.eprom_path {
        Some(path) => match loader.load(path) {
            Ok(words) => Some(Eprom::new(words)),
            Err(e) => {
                error!("could not read EPROM image {}: {e}", path.display());
                if test_mode {
                    write_test_mode_files(Some(&e.to_string()));
                    return ExitCode::SUCCESS;
                }
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            if test_mode {
                write_test_mode_files(Some(&e.to_string()));
                return ExitCode::SUCCESS;
            }
            return ExitCode::FAILURE;
        }
    };

    let mut machine = match Machine::new(config, eprom_override, isrs_words, program_words) {
        Ok(machine) => machine,
        Err(e) => {
            error!("{e}");
            if test_mode {
                write_test_mode_files(Some(&e.to_string()));
                return ExitCode::SUCCESS;
            }
            return ExitCode::FAILURE;
        }
    };

    let mut tui = NullTui;
    let mut input = StdinInput;
    let result = machine.run(&mut tui, &mut input);

    match result {
        Ok(RunOutcome::Halted | RunOutcome::QuitByDebugger) => {
            if test_mode {
                write_test_mode_files(None);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            if test_mode {
                write_test_mode_files(Some(&e.to_string()));
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

