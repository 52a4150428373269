//! Instruction interpreter: fetch/decode/execute and the per-step polling
//! order (§4.1).

use log::warn;

use crate::addressing;
use crate::debugger::DebugFlags;
use crate::error::EmuError;
use crate::instructions::{self, Instruction, Opcode};
use crate::interrupt::{Controller, Device};
use crate::loader::InputSource;
use crate::memory::AddressSpace;
use crate::registers::{Register, RegisterFile};
use crate::scheduler::{Event, Scheduler};

/// What one `Cpu::step` call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// `JUMP 0` was fetched; the conventional program terminator.
    Halted,
}

/// One of the eight arithmetic/bitwise families shared by the
/// immediate/register/memory opcode triplets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AluOp {
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    Oplus,
    Or,
    And,
}

impl AluOp {
    const fn is_bitwise(self) -> bool {
        matches!(self, AluOp::Oplus | AluOp::Or | AluOp::And)
    }
}

fn alu_op_for(opcode: Opcode) -> AluOp {
    use Opcode::*;
    match opcode {
        Addi | Addr | Addm => AluOp::Add,
        Subi | Subr | Subm => AluOp::Sub,
        Multi | Multr | Multm => AluOp::Mult,
        Divi | Divr | Divm => AluOp::Div,
        Modi | Modr | Modm => AluOp::Mod,
        Oplusi | Oplusr | Oplusm => AluOp::Oplus,
        Ori | Orr | Orm => AluOp::Or,
        Andi | Andr | Andm => AluOp::And,
        other => unreachable!("{other:?} is not an arithmetic/bitwise opcode"),
    }
}

fn opcode_name(opcode: Opcode) -> &'static str {
    use Opcode::*;
    match opcode {
        Addi => "ADDI", Subi => "SUBI", Multi => "MULTI", Divi => "DIVI", Modi => "MODI",
        Oplusi => "OPLUSI", Ori => "ORI", Andi => "ANDI",
        Addr => "ADDR", Subr => "SUBR", Multr => "MULTR", Divr => "DIVR", Modr => "MODR",
        Oplusr => "OPLUSR", Orr => "ORR", Andr => "ANDR",
        Addm => "ADDM", Subm => "SUBM", Multm => "MULTM", Divm => "DIVM", Modm => "MODM",
        Oplusm => "OPLUSM", Orm => "ORM", Andm => "ANDM",
        Load => "LOAD", Loadin => "LOADIN", Loadi => "LOADI",
        Store => "STORE", Storein => "STOREIN", Move => "MOVE",
        Nop => "NOP", Int => "INT", Rti => "RTI",
        Jumpgt => "JUMPGT", Jumpeq => "JUMPEQ", Jumpge => "JUMPGE",
        Jumplt => "JUMPLT", Jumpne => "JUMPNE", Jumple => "JUMPLE", Jump => "JUMP",
    }
}

/// Applies the Euclidean-remainder rule (`0 <= r < |m|`) division families
/// use, rather than Rust's truncating `%`.
fn euclidean_rem(a: i32, m: i32) -> i32 {
    let r = a.wrapping_rem(m);
    if r < 0 {
        r.wrapping_add(m.wrapping_abs())
    } else {
        r
    }
}

fn apply_alu(
    op: AluOp,
    lhs: i32,
    rhs: i32,
    opcode: Opcode,
    source_desc: impl FnOnce() -> String,
) -> Result<i32, EmuError> {
    match op {
        AluOp::Add => Ok(lhs.wrapping_add(rhs)),
        AluOp::Sub => Ok(lhs.wrapping_sub(rhs)),
        AluOp::Mult => Ok(lhs.wrapping_mul(rhs)),
        AluOp::Div => {
            if rhs == 0 {
                return Err(EmuError::DivisionByZero {
                    opcode: opcode_name(opcode),
                    source_desc: source_desc(),
                });
            }
            Ok(lhs.wrapping_div(rhs))
        }
        AluOp::Mod => {
            if rhs == 0 {
                return Err(EmuError::DivisionByZero {
                    opcode: opcode_name(opcode),
                    source_desc: source_desc(),
                });
            }
            Ok(euclidean_rem(lhs, rhs))
        }
        AluOp::Oplus => Ok(lhs ^ rhs),
        AluOp::Or => Ok(lhs | rhs),
        AluOp::And => Ok(lhs & rhs),
    }
}

/// The instruction interpreter's own state: just the register file. Memory,
/// the interrupt controller, and the scheduler are passed in by the
/// aggregate (`machine::Machine`) that owns them.
#[derive(Debug, Default)]
pub struct Cpu {
    pub regs: RegisterFile,
}

impl Cpu {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: RegisterFile::new(),
        }
    }

    /// Runs one fetch/decode/execute/poll cycle (§4.1).
    ///
    /// # Errors
    /// Returns any fatal `EmuError` from decode or execution; non-fatal
    /// errors are logged and execution continues.
    pub fn step(
        &mut self,
        mem: &mut AddressSpace,
        controller: &mut Controller,
        scheduler: &mut Scheduler,
        flags: &mut DebugFlags,
        input: &mut dyn InputSource,
    ) -> Result<StepOutcome, EmuError> {
        let pc = self.regs.pc();
        let word = mem.read(pc);
        let instr = instructions::decode(word)?;

        if instr.opcode == Opcode::Jump && instr.opd1 == 0 {
            return Ok(StepOutcome::Halted);
        }

        if instr.opcode == Opcode::Int && instr.opd1 == 3 {
            scheduler.handle(Event::BreakpointEncountered, controller, &mut self.regs, mem, flags, input)?;
            self.regs.set_pc(pc.wrapping_add(1));
        } else {
            let pc_written = self.execute(&instr, pc, mem, controller, scheduler, flags, input)?;
            if !pc_written {
                self.regs.set_pc(pc.wrapping_add(1));
            }
        }

        self.poll_devices(mem, controller, scheduler, flags, input)?;
        Ok(StepOutcome::Continue)
    }

    /// Timer, then UART receive, then UART send (§4.1 step 7).
    fn poll_devices(
        &mut self,
        mem: &mut AddressSpace,
        controller: &mut Controller,
        scheduler: &mut Scheduler,
        flags: &mut DebugFlags,
        input: &mut dyn InputSource,
    ) -> Result<(), EmuError> {
        if controller.tick_timer() {
            self.raise_device_interrupt(Device::Timer, mem, controller, scheduler, flags, input)?;
        }
        if mem.uart.tick_receive() {
            self.raise_device_interrupt(Device::UartRecv, mem, controller, scheduler, flags, input)?;
        }
        if mem.uart.tick_send() {
            self.raise_device_interrupt(Device::UartSend, mem, controller, scheduler, flags, input)?;
        }
        Ok(())
    }

    fn raise_device_interrupt(
        &mut self,
        device: Device,
        mem: &mut AddressSpace,
        controller: &mut Controller,
        scheduler: &mut Scheduler,
        flags: &mut DebugFlags,
        input: &mut dyn InputSource,
    ) -> Result<(), EmuError> {
        let Some(isr) = controller.isr_for(device) else {
            return Ok(());
        };
        match scheduler.handle(Event::HardwareInterrupt(isr), controller, &mut self.regs, mem, flags, input) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("{e}");
                Ok(())
            }
        }
    }

    /// Executes one decoded instruction. Returns whether `PC` was written
    /// as part of execution (suppressing the caller's auto-increment).
    fn execute(
        &mut self,
        instr: &Instruction,
        pc: u32,
        mem: &mut AddressSpace,
        controller: &mut Controller,
        scheduler: &mut Scheduler,
        flags: &mut DebugFlags,
        input: &mut dyn InputSource,
    ) -> Result<bool, EmuError> {
        use Opcode::*;
        match instr.opcode {
            Addi | Subi | Multi | Divi | Modi | Oplusi | Ori | Andi => {
                let dest = instr.reg1();
                let op = alu_op_for(instr.opcode);
                let lhs = self.regs.get(dest) as i32;
                let rhs = if op.is_bitwise() {
                    instructions::mask_22(instr.opd2) as i32
                } else {
                    instructions::sign_extend_22(instr.opd2)
                };
                let result = apply_alu(op, lhs, rhs, instr.opcode, || format!("immediate {rhs}"))?;
                self.regs.set(dest, result as u32);
                Ok(is_pc(dest))
            }
            Loadi => {
                let dest = instr.reg1();
                self.regs.set(dest, instr.opd2);
                Ok(is_pc(dest))
            }
            Addr | Subr | Multr | Divr | Modr | Oplusr | Orr | Andr => {
                let dest = instr.reg1();
                let src = instr.reg2();
                let op = alu_op_for(instr.opcode);
                let lhs = self.regs.get(dest) as i32;
                let rhs = self.regs.get(src) as i32;
                let result = apply_alu(op, lhs, rhs, instr.opcode, || format!("{src}"))?;
                self.regs.set(dest, result as u32);
                Ok(is_pc(dest))
            }
            Move => {
                let src = instr.reg1();
                let dest = instr.reg2();
                self.regs.set(dest, self.regs.get(src));
                Ok(is_pc(dest))
            }
            Addm | Subm | Multm | Divm | Modm | Oplusm | Orm | Andm => {
                let dest = instr.reg1();
                let op = alu_op_for(instr.opcode);
                let addr = addressing::ds_fill(instr.opd2, self.regs.ds());
                let lhs = self.regs.get(dest) as i32;
                let rhs = mem.read(addr) as i32;
                let result = apply_alu(op, lhs, rhs, instr.opcode, || format!("M[{addr:#010x}]"))?;
                self.regs.set(dest, result as u32);
                Ok(is_pc(dest))
            }
            Load => {
                let dest = instr.reg1();
                let addr = addressing::ds_fill(instr.opd2, self.regs.ds());
                self.regs.set(dest, mem.read(addr));
                Ok(is_pc(dest))
            }
            Store => {
                let src = instr.reg1();
                let addr = addressing::ds_fill(instr.opd2, self.regs.ds());
                mem.write(addr, self.regs.get(src), input);
                Ok(false)
            }
            Loadin => {
                let base = instr.reg1();
                let target = instr.reg2();
                let disp = instructions::sign_extend(instr.opd3, instructions::LOADIN_DISPLACEMENT_WIDTH);
                let addr = (self.regs.get(base) as i32).wrapping_add(disp) as u32;
                self.regs.set(target, mem.read(addr));
                Ok(is_pc(target))
            }
            Storein => {
                let base = instr.reg1();
                let target = instr.reg2();
                let disp = instructions::sign_extend(instr.opd3, instructions::LOADIN_DISPLACEMENT_WIDTH);
                let addr = (self.regs.get(base) as i32).wrapping_add(disp) as u32;
                mem.write(addr, self.regs.get(target), input);
                Ok(false)
            }
            Jumpgt | Jumpeq | Jumpge | Jumplt | Jumpne | Jumple | Jump => {
                let acc = self.regs.acc_signed();
                let taken = match instr.opcode {
                    Jumpgt => acc > 0,
                    Jumpeq => acc == 0,
                    Jumpge => acc >= 0,
                    Jumplt => acc < 0,
                    Jumpne => acc != 0,
                    Jumple => acc <= 0,
                    Jump => true,
                    _ => unreachable!(),
                };
                if taken {
                    let disp = instructions::sign_extend_22(instr.opd1);
                    self.regs.set_pc((pc as i32).wrapping_add(disp) as u32);
                } else {
                    self.regs.set_pc(pc.wrapping_add(1));
                }
                Ok(true)
            }
            Int => {
                // `setup_interrupt` pushes whatever `PC` currently holds, so
                // advance to the return address first: the instruction
                // after this `INT`, exactly like the post-poll hardware
                // case where `PC` has already moved past the trigger.
                self.regs.set_pc(pc.wrapping_add(1));
                let isr = (instr.opd1 & 0xFF) as u8;
                match scheduler.handle(Event::SoftwareInterrupt(isr), controller, &mut self.regs, mem, flags, input) {
                    Ok(()) => Ok(true),
                    Err(e) if !e.is_fatal() => {
                        warn!("{e}");
                        Ok(true)
                    }
                    Err(e) => Err(e),
                }
            }
            Rti => {
                let had_frame = controller.active_depth() > 0;
                scheduler.handle(Event::ReturnFromInterrupt, controller, &mut self.regs, mem, flags, input)?;
                Ok(had_frame)
            }
            Nop => Ok(false),
        }
    }
}

fn is_pc(reg: Register) -> bool {
    reg.code() == Register::Pc.code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::{encode, Instruction};
    use crate::loader::ScriptedInput;
    use crate::memory::{Eprom, Sram};
    use crate::uart::Uart;

    fn harness(sram_words: Vec<u32>) -> (Cpu, AddressSpace, Controller, Scheduler, DebugFlags, ScriptedInput) {
        let cpu = Cpu::new();
        let eprom = Eprom::new(vec![]);
        let mut sram = Sram::new(sram_words.len().max(256));
        for (i, word) in sram_words.into_iter().enumerate() {
            sram.write(i as u32, word);
        }
        let uart = Uart::with_seed(0, 1);
        let mem = AddressSpace::new(eprom, sram, uart);
        let controller = Controller::new(0);
        let scheduler = Scheduler::new();
        let flags = DebugFlags::new();
        let input = ScriptedInput::new(vec![]);
        (cpu, mem, controller, scheduler, flags, input)
    }

    fn sram_addr(offset: u32) -> u32 {
        addressing::const_fill(offset)
    }

    #[test]
    fn arithmetic_scenario_loads_adds_and_halts() {
        let neg_three = (-3i32 as u32) & 0x3F_FFFF;
        let program = vec![
            encode(&Instruction::new(Opcode::Loadi, Register::Acc.code().unwrap() as u32, 10, 0)),
            encode(&Instruction::new(Opcode::Addi, Register::Acc.code().unwrap() as u32, neg_three, 0)),
            encode(&Instruction::new(Opcode::Jump, 0, 0, 0)),
        ];
        let (mut cpu, mut mem, mut controller, mut scheduler, mut flags, mut input) = harness(program);
        cpu.regs.set_pc(sram_addr(0));
        cpu.regs.set(Register::Ds, sram_addr(0));

        loop {
            match cpu.step(&mut mem, &mut controller, &mut scheduler, &mut flags, &mut input).unwrap() {
                StepOutcome::Halted => break,
                StepOutcome::Continue => {}
            }
        }
        assert_eq!(cpu.regs.get(Register::Acc), 7);
    }

    #[test]
    fn memory_round_trip_scenario() {
        let program = vec![
            encode(&Instruction::new(Opcode::Loadi, Register::In1.code().unwrap() as u32, 42, 0)),
            encode(&Instruction::new(Opcode::Store, Register::In1.code().unwrap() as u32, 100, 0)),
            encode(&Instruction::new(Opcode::Load, Register::Acc.code().unwrap() as u32, 100, 0)),
            encode(&Instruction::new(Opcode::Jump, 0, 0, 0)),
        ];
        let (mut cpu, mut mem, mut controller, mut scheduler, mut flags, mut input) = harness(program);
        cpu.regs.set_pc(sram_addr(0));
        cpu.regs.set(Register::Ds, sram_addr(0));

        loop {
            match cpu.step(&mut mem, &mut controller, &mut scheduler, &mut flags, &mut input).unwrap() {
                StepOutcome::Halted => break,
                StepOutcome::Continue => {}
            }
        }
        assert_eq!(cpu.regs.get(Register::Acc), 42);
        assert_eq!(mem.read(sram_addr(100)), 42);
    }

    #[test]
    fn software_interrupt_scenario_runs_isr_and_returns() {
        // SRAM layout: IVT[1] = handler addr; handler at 10: LOADI ACC 99; RTI.
        // Main program at 20: INT 1; JUMP 0.
        let mut words = vec![0u32; 64];
        words[1] = sram_addr(10);
        words[10] = encode(&Instruction::new(Opcode::Loadi, Register::Acc.code().unwrap() as u32, 99, 0));
        words[11] = encode(&Instruction::new(Opcode::Rti, 0, 0, 0));
        words[20] = encode(&Instruction::new(Opcode::Int, 1, 0, 0));
        words[21] = encode(&Instruction::new(Opcode::Jump, 0, 0, 0));
        let (mut cpu, mut mem, mut controller, mut scheduler, mut flags, mut input) = harness(words);
        cpu.regs.set_pc(sram_addr(20));
        cpu.regs.set(Register::Ds, sram_addr(0));
        cpu.regs.set_sp(sram_addr(63));

        loop {
            match cpu.step(&mut mem, &mut controller, &mut scheduler, &mut flags, &mut input).unwrap() {
                StepOutcome::Halted => break,
                StepOutcome::Continue => {}
            }
        }
        assert_eq!(cpu.regs.get(Register::Acc), 99);
        assert_eq!(controller.active_depth(), 0);
    }

    #[test]
    fn division_by_zero_is_fatal_and_leaves_register_untouched() {
        let program = vec![
            encode(&Instruction::new(Opcode::Loadi, Register::Acc.code().unwrap() as u32, 5, 0)),
            encode(&Instruction::new(Opcode::Divi, Register::Acc.code().unwrap() as u32, 0, 0)),
        ];
        let (mut cpu, mut mem, mut controller, mut scheduler, mut flags, mut input) = harness(program);
        cpu.regs.set_pc(sram_addr(0));
        cpu.step(&mut mem, &mut controller, &mut scheduler, &mut flags, &mut input).unwrap();
        let err = cpu
            .step(&mut mem, &mut controller, &mut scheduler, &mut flags, &mut input)
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(cpu.regs.get(Register::Acc), 5);
    }

    #[test]
    fn int_three_sets_breakpoint_flag_without_ivt_dispatch() {
        let program = vec![encode(&Instruction::new(Opcode::Int, 3, 0, 0))];
        let (mut cpu, mut mem, mut controller, mut scheduler, mut flags, mut input) = harness(program);
        cpu.regs.set_pc(sram_addr(0));
        cpu.step(&mut mem, &mut controller, &mut scheduler, &mut flags, &mut input).unwrap();
        assert!(flags.breakpoint_encountered);
        assert_eq!(cpu.regs.pc(), sram_addr(1));
        assert_eq!(controller.active_depth(), 0);
    }
}
