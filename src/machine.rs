//! The top-level aggregate: owns every subsystem, synthesizes the EPROM
//! boot prologue, and runs the interpreter loop with the debugger gate
//! (§3 "EPROM", §4.1, §4.5, §6's CLI surface via `MachineConfig`).

use std::path::PathBuf;

use log::info;

use crate::cpu::{Cpu, StepOutcome};
use crate::debugger::{DebugFlags, DebugSnapshot, DebuggerCommand};
use crate::error::EmuError;
use crate::instructions::{encode, Instruction, Opcode};
use crate::interrupt::{Controller, Device};
use crate::loader::{InputSource, TuiDriver};
use crate::memory::{AddressSpace, Eprom, Sram};
use crate::registers::Register;
use crate::scheduler::{Event, Scheduler};
use crate::uart::Uart;

/// Everything a run needs, gathered from the CLI (or a test) before
/// `Machine::new` is called.
#[derive(Clone, Debug)]
pub struct MachineConfig {
    pub sram_size: usize,
    /// Advisory; used only to size diagnostic dumps in the TUI.
    pub page_size: usize,
    pub peripherals_dir: Option<PathBuf>,
    pub eprom_path: Option<PathBuf>,
    pub isrs_path: Option<PathBuf>,
    pub max_waiting_instrs: u32,
    pub timer_interval: u32,
    /// `(device, isr)` bindings and `(isr, priority)` entries the real
    /// assembler's `IVTE`/`IVTEDP` directives would otherwise produce;
    /// since the assembler is out of scope (§1), callers supply the
    /// already-resolved table directly.
    pub isr_bindings: Vec<(Device, u8)>,
    pub isr_priorities: Vec<(u8, u8)>,
    pub debug: bool,
    pub test_mode: bool,
    pub read_input_from_comments: bool,
    pub verbose: bool,
    pub binary_display: bool,
    pub extended_tui: bool,
    pub unsigned_data_display: bool,
    pub enable_all: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            sram_size: 4096,
            page_size: 256,
            peripherals_dir: None,
            eprom_path: None,
            isrs_path: None,
            max_waiting_instrs: 0,
            timer_interval: 0,
            isr_bindings: Vec::new(),
            isr_priorities: Vec::new(),
            debug: false,
            test_mode: false,
            read_input_from_comments: false,
            verbose: false,
            binary_display: false,
            extended_tui: false,
            unsigned_data_display: false,
            enable_all: false,
        }
    }
}

/// Why `Machine::run` returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// `JUMP 0` was fetched.
    Halted,
    /// The debugger's `q` command was issued.
    QuitByDebugger,
}

/// Splits a 32-bit value into the `(upper 22 bits, lower 10 bits)` pair
/// the boot prologue's `LOADI`/`MULTI 1024`/`ORI` triplet reassembles,
/// since `LOADI` can only carry a 22-bit immediate (§3 "EPROM").
const fn split_22_10(value: u32) -> (u32, u32) {
    ((value >> 10) & 0x3F_FFFF, value & 0x3FF)
}

fn reg_code(reg: Register) -> u32 {
    u32::from(reg.code().expect("boot prologue only uses architectural registers"))
}

fn push_loadi_multi_ori(words: &mut Vec<u32>, reg: Register, value: u32) {
    let (upper, lower) = split_22_10(value);
    words.push(encode(&Instruction::new(Opcode::Loadi, reg_code(reg), upper, 0)));
    words.push(encode(&Instruction::new(Opcode::Multi, reg_code(reg), 1024, 0)));
    words.push(encode(&Instruction::new(Opcode::Ori, reg_code(reg), lower, 0)));
}

/// Synthesizes the boot-loader prologue: sets `SP`/`CS`/`DS` from the
/// configured layout, clears `ACC`, then jumps to `CS`.
fn synthesize_boot_eprom(sram_size: usize, num_instrs_isrs: u32, num_instrs_prgrm: u32) -> Eprom {
    let stack_top = (0b10u32 << 30) | (sram_size as u32 - 1);
    let program_start = (0b10u32 << 30) | num_instrs_isrs;

    let mut words = Vec::with_capacity(14);
    push_loadi_multi_ori(&mut words, Register::Sp, stack_top);
    words.push(encode(&Instruction::new(Opcode::Move, reg_code(Register::Sp), reg_code(Register::Baf), 0)));

    push_loadi_multi_ori(&mut words, Register::Cs, program_start);
    words.push(encode(&Instruction::new(Opcode::Move, reg_code(Register::Cs), reg_code(Register::Ds), 0)));

    push_loadi_multi_ori(&mut words, Register::Acc, num_instrs_prgrm);
    words.push(encode(&Instruction::new(Opcode::Addr, reg_code(Register::Ds), reg_code(Register::Acc), 0)));

    words.push(encode(&Instruction::new(Opcode::Loadi, reg_code(Register::Acc), 0, 0)));
    words.push(encode(&Instruction::new(Opcode::Move, reg_code(Register::Cs), reg_code(Register::Pc), 0)));

    Eprom::new(words)
}

/// The aggregate tying every subsystem together (§9's resolution of the
/// original's scattered globals into one owner).
pub struct Machine {
    cpu: Cpu,
    mem: AddressSpace,
    controller: Controller,
    scheduler: Scheduler,
    flags: DebugFlags,
    config: MachineConfig,
}

impl Machine {
    /// Builds a machine: synthesizes or loads the EPROM, lays out SRAM as
    /// `isrs_words ++ program_words` zero-padded to `sram_size`, and binds
    /// the interrupt table from `config`.
    ///
    /// # Errors
    /// Returns `EmuError::InvalidConfig` if `sram_size` cannot hold the
    /// supplied ISR and program images.
    pub fn new(
        config: MachineConfig,
        eprom_override: Option<Eprom>,
        isrs_words: Vec<u32>,
        program_words: Vec<u32>,
    ) -> Result<Self, EmuError> {
        if isrs_words.len() + program_words.len() > config.sram_size {
            return Err(EmuError::InvalidConfig(format!(
                "sram_size {} is too small for {} ISR words + {} program words",
                config.sram_size,
                isrs_words.len(),
                program_words.len()
            )));
        }

        let num_instrs_isrs = isrs_words.len() as u32;
        let num_instrs_prgrm = program_words.len() as u32;

        let mut sram = Sram::new(config.sram_size);
        for (offset, word) in isrs_words.into_iter().chain(program_words).enumerate() {
            sram.write(offset as u32, word);
        }

        let eprom = eprom_override
            .unwrap_or_else(|| synthesize_boot_eprom(config.sram_size, num_instrs_isrs, num_instrs_prgrm));
        let uart = Uart::new(config.max_waiting_instrs);
        let mem = AddressSpace::new(eprom, sram, uart);

        let mut controller = Controller::new(config.timer_interval);
        for (device, isr) in &config.isr_bindings {
            controller.bind_device(*device, *isr);
        }
        for (isr, priority) in &config.isr_priorities {
            controller.set_priority(*isr, *priority);
        }

        Ok(Self {
            cpu: Cpu::new(),
            mem,
            controller,
            scheduler: Scheduler::new(),
            flags: DebugFlags::new(),
            config,
        })
    }

    #[must_use]
    pub const fn registers(&self) -> &crate::registers::RegisterFile {
        &self.cpu.regs
    }

    /// Raises the keypress hardware interrupt (the `t` debugger command).
    ///
    /// # Errors
    /// Propagates a fatal `EmuError` if admitting the interrupt overflows
    /// the pending heap.
    pub fn trigger_keypress(&mut self, input: &mut dyn InputSource) -> Result<(), EmuError> {
        let Some(isr) = self.controller.isr_for(Device::Keypress) else {
            return Ok(());
        };
        match self.scheduler.handle(
            Event::HardwareInterrupt(isr),
            &mut self.controller,
            &mut self.cpu.regs,
            &mut self.mem,
            &mut self.flags,
            input,
        ) {
            Ok(()) => Ok(()),
            Err(e) if !e.is_fatal() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Runs until halt or a debugger quit, driving `tui` whenever the
    /// debugger gate opens (§4.5).
    ///
    /// # Errors
    /// Propagates any fatal `EmuError` from the interpreter loop.
    pub fn run(
        &mut self,
        tui: &mut dyn TuiDriver,
        input: &mut dyn InputSource,
    ) -> Result<RunOutcome, EmuError> {
        loop {
            if self.flags.should_render(self.config.debug) {
                let snapshot = DebugSnapshot {
                    registers: &self.cpu.regs,
                    flags: &self.flags,
                    active_stack_depth: self.controller.active_depth(),
                };
                match tui.render(&snapshot) {
                    DebuggerCommand::Step => {}
                    DebuggerCommand::Continue => {
                        self.scheduler.handle(
                            Event::Continue,
                            &mut self.controller,
                            &mut self.cpu.regs,
                            &mut self.mem,
                            &mut self.flags,
                            input,
                        )?;
                    }
                    DebuggerCommand::StepInto => {
                        self.scheduler.handle(
                            Event::StepIntoAction,
                            &mut self.controller,
                            &mut self.cpu.regs,
                            &mut self.mem,
                            &mut self.flags,
                            input,
                        )?;
                    }
                    DebuggerCommand::Finalize => {
                        self.scheduler.handle(
                            Event::Finalize,
                            &mut self.controller,
                            &mut self.cpu.regs,
                            &mut self.mem,
                            &mut self.flags,
                            input,
                        )?;
                    }
                    DebuggerCommand::TriggerKeypress => self.trigger_keypress(input)?,
                    DebuggerCommand::ResetRegisters => self.cpu.regs.reset(),
                    DebuggerCommand::Quit => return Ok(RunOutcome::QuitByDebugger),
                }
            }

            match self.cpu.step(&mut self.mem, &mut self.controller, &mut self.scheduler, &mut self.flags, input)? {
                StepOutcome::Continue => {}
                StepOutcome::Halted => {
                    info!("halted at PC={:#010x}", self.cpu.regs.pc());
                    return Ok(RunOutcome::Halted);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{NullTui, ScriptedInput};

    fn config(sram_size: usize) -> MachineConfig {
        MachineConfig {
            sram_size,
            ..MachineConfig::default()
        }
    }

    #[test]
    fn boot_prologue_lands_on_program_start_with_acc_cleared() {
        let program = vec![encode(&Instruction::new(Opcode::Jump, 0, 0, 0))];
        let mut machine = Machine::new(config(256), None, vec![], program).unwrap();
        let mut tui = NullTui;
        let mut input = ScriptedInput::new(vec![]);
        let outcome = machine.run(&mut tui, &mut input).unwrap();
        assert_eq!(outcome, RunOutcome::Halted);
        assert_eq!(machine.registers().get(Register::Acc), 0);
    }

    #[test]
    fn rejects_images_that_do_not_fit_in_sram() {
        let program = vec![0u32; 10];
        let err = Machine::new(config(4), None, vec![], program).unwrap_err();
        assert!(matches!(err, EmuError::InvalidConfig(_)));
    }

    #[test]
    fn program_runs_to_completion_through_the_synthesized_boot_rom() {
        let neg_three = (-3i32 as u32) & 0x3F_FFFF;
        let program = vec![
            encode(&Instruction::new(Opcode::Loadi, reg_code(Register::Acc), 10, 0)),
            encode(&Instruction::new(Opcode::Addi, reg_code(Register::Acc), neg_three, 0)),
            encode(&Instruction::new(Opcode::Jump, 0, 0, 0)),
        ];
        let mut machine = Machine::new(config(512), None, vec![], program).unwrap();
        let mut tui = NullTui;
        let mut input = ScriptedInput::new(vec![]);
        let outcome = machine.run(&mut tui, &mut input).unwrap();
        assert_eq!(outcome, RunOutcome::Halted);
        assert_eq!(machine.registers().get(Register::Acc), 7);
    }
}
