//! End-to-end scenarios run through the public `Machine` API: a program is
//! built directly as `Instruction` values (no text assembler), loaded
//! through the synthesized boot ROM, and run to completion or halt.

use reti_emu::addressing;
use reti_emu::instructions::{encode, Instruction, Opcode};
use reti_emu::interrupt::Device;
use reti_emu::loader::{NullTui, ScriptedInput};
use reti_emu::machine::{Machine, MachineConfig, RunOutcome};
use reti_emu::registers::Register;

fn reg(r: Register) -> u32 {
    u32::from(r.code().unwrap())
}

fn config(sram_size: usize) -> MachineConfig {
    MachineConfig {
        sram_size,
        ..MachineConfig::default()
    }
}

fn run(config: MachineConfig, isrs_words: Vec<u32>, program_words: Vec<u32>) -> Machine {
    let mut machine = Machine::new(config, None, isrs_words, program_words).unwrap();
    let mut tui = NullTui;
    let mut input = ScriptedInput::new(vec![]);
    let outcome = machine.run(&mut tui, &mut input).unwrap();
    assert_eq!(outcome, RunOutcome::Halted);
    machine
}

#[test]
fn arithmetic_scenario_runs_through_the_synthesized_boot_rom() {
    let neg_three = (-3i32 as u32) & 0x3F_FFFF;
    let program = vec![
        encode(&Instruction::new(Opcode::Loadi, reg(Register::Acc), 10, 0)),
        encode(&Instruction::new(Opcode::Addi, reg(Register::Acc), neg_three, 0)),
        encode(&Instruction::new(Opcode::Jump, 0, 0, 0)),
    ];
    let machine = run(config(512), vec![], program);
    assert_eq!(machine.registers().get(Register::Acc), 7);
}

#[test]
fn memory_round_trip_scenario_stores_and_reloads_a_word() {
    let program = vec![
        encode(&Instruction::new(Opcode::Loadi, reg(Register::In1), 42, 0)),
        encode(&Instruction::new(Opcode::Store, reg(Register::In1), 400, 0)),
        encode(&Instruction::new(Opcode::Load, reg(Register::Acc), 400, 0)),
        encode(&Instruction::new(Opcode::Jump, 0, 0, 0)),
    ];
    let machine = run(config(1024), vec![], program);
    assert_eq!(machine.registers().get(Register::Acc), 42);
}

#[test]
fn software_interrupt_scenario_runs_isr_and_resumes_after_int() {
    // IVT[1] = handler address; handler sets ACC := 99 and returns.
    let mut isrs = vec![0u32; 16];
    isrs[1] = addressing::const_fill(10);
    isrs[10] = encode(&Instruction::new(Opcode::Loadi, reg(Register::Acc), 99, 0));
    isrs[11] = encode(&Instruction::new(Opcode::Rti, 0, 0, 0));

    let mut cfg = config(512);
    cfg.isr_priorities.push((1, 1));
    let program = vec![
        encode(&Instruction::new(Opcode::Int, 1, 0, 0)),
        encode(&Instruction::new(Opcode::Jump, 0, 0, 0)),
    ];
    let machine = run(cfg, isrs, program);
    assert_eq!(machine.registers().get(Register::Acc), 99);
}

#[test]
fn hardware_timer_interrupt_preempts_the_main_loop() {
    // IVT[5] = handler address; handler sets ACC := 77 and returns.
    let mut isrs = vec![0u32; 16];
    isrs[5] = addressing::const_fill(10);
    isrs[10] = encode(&Instruction::new(Opcode::Loadi, reg(Register::Acc), 77, 0));
    isrs[11] = encode(&Instruction::new(Opcode::Rti, 0, 0, 0));

    let mut cfg = config(512);
    cfg.timer_interval = 20; // fires once partway through the NOP loop below, never during boot.
    cfg.isr_bindings.push((Device::Timer, 5));
    cfg.isr_priorities.push((5, 5));

    let mut program: Vec<u32> = (0..10).map(|_| encode(&Instruction::new(Opcode::Nop, 0, 0, 0))).collect();
    program.push(encode(&Instruction::new(Opcode::Jump, 0, 0, 0)));

    let machine = run(cfg, isrs, program);
    assert_eq!(machine.registers().get(Register::Acc), 77);
}

#[test]
fn uart_send_completes_within_one_step_at_zero_latency() {
    // Tags the data segment as UART-region (top two bits 01) using the same
    // LOADI/MULTI-1024/ORI split the boot ROM uses to build 32-bit
    // constants out of a 22-bit immediate field, then sends one byte and
    // reads the status register back to confirm the ready bit is restored.
    let ds_uart_tag = 0x4000_0000u32;
    let upper = (ds_uart_tag >> 10) & 0x3F_FFFF;
    let lower = ds_uart_tag & 0x3FF;

    let mut program = vec![
        encode(&Instruction::new(Opcode::Loadi, reg(Register::Ds), upper, 0)),
        encode(&Instruction::new(Opcode::Multi, reg(Register::Ds), 1024, 0)),
        encode(&Instruction::new(Opcode::Ori, reg(Register::Ds), lower, 0)),
        encode(&Instruction::new(Opcode::Loadi, reg(Register::In1), 0, 0)), // STRING tag, empty string
        encode(&Instruction::new(Opcode::Store, reg(Register::In1), 0, 0)),
        encode(&Instruction::new(Opcode::Store, reg(Register::In1), 0, 0)), // terminator byte
        encode(&Instruction::new(Opcode::Load, reg(Register::Acc), 2, 0)), // read status register back
    ];
    program.push(encode(&Instruction::new(Opcode::Jump, 0, 0, 0)));

    let machine = run(config(256), vec![], program);
    assert_eq!(machine.registers().get(Register::Acc) & 0b01, 0b01);
}
