//! Abstract scheduler state machine driving the interrupt controller
//! (§4.3).
//!
//! `Scheduler` tracks only the three abstract states the debugger and
//! interpreter care about — `NORMAL`, `HW_HANDLING`, `SW_HANDLING` — and
//! applies each event's primitive actions directly against
//! [`Controller`], [`RegisterFile`], and [`AddressSpace`]. Keeping the
//! mutation inline here (rather than returning a transition record for a
//! separate applier) avoids the two modules needing to reference each
//! other.

use log::warn;

use crate::addressing;
use crate::debugger::DebugFlags;
use crate::error::EmuError;
use crate::interrupt::Controller;
use crate::loader::InputSource;
use crate::memory::AddressSpace;
use crate::registers::{Register, RegisterFile};

/// The scheduler's abstract state (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Normal,
    HwHandling,
    SwHandling,
}

/// An event fed into the state machine (§4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    SoftwareInterrupt(u8),
    HardwareInterrupt(u8),
    ReturnFromInterrupt,
    StepIntoAction,
    Finalize,
    Continue,
    BreakpointEncountered,
}

pub struct Scheduler {
    state: SchedulerState,
    si_happened: bool,
}

impl Scheduler {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SchedulerState::Normal,
            si_happened: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Pushes `PC` onto the stack (at `SP+1`, then decrements `SP`) and
    /// dispatches to the IVT entry for `isr` (§4.3's `setup_interrupt`).
    fn setup_interrupt(
        isr: u8,
        regs: &mut RegisterFile,
        mem: &mut AddressSpace,
        input: &mut dyn InputSource,
    ) {
        let sp = regs.sp();
        mem.write(sp.wrapping_add(1), regs.pc(), input);
        regs.set_sp(sp.wrapping_sub(1));
        let vector = addressing::const_fill(u32::from(isr));
        let handler = mem.read(vector);
        regs.set_pc(handler);
    }

    /// Pops `PC` from `SP+1` and increments `SP` (§4.3's
    /// `return_from_interrupt`).
    fn return_from_interrupt(regs: &mut RegisterFile, mem: &mut AddressSpace) {
        let sp = regs.sp();
        let pc = mem.read(sp.wrapping_add(1));
        regs.set_pc(pc);
        regs.set_sp(sp.wrapping_add(1));
    }

    /// Marks an ISR just admitted without an active step-into request as
    /// "don't step into", stamping the depth it was entered at so the gate
    /// re-opens once `RTI` unwinds back past it.
    fn arm_skip_step_into(flags: &mut DebugFlags, entered_depth: usize) {
        if !flags.step_into_activated {
            flags.isr_not_step_into = false;
            flags.not_stepped_into_isr_here = Some(entered_depth);
        }
    }

    /// Applies one event to the state machine.
    ///
    /// # Errors
    /// Returns `EmuError::HeapOverflow` (fatal) if a hardware interrupt
    /// cannot be enqueued, or `EmuError::InvalidSoftwareInterruptContext`
    /// (non-fatal, see `EmuError::is_fatal`) for a software interrupt
    /// attempted from inside hardware handling.
    #[allow(clippy::too_many_arguments)]
    pub fn handle(
        &mut self,
        event: Event,
        controller: &mut Controller,
        regs: &mut RegisterFile,
        mem: &mut AddressSpace,
        flags: &mut DebugFlags,
        input: &mut dyn InputSource,
    ) -> Result<(), EmuError> {
        match event {
            Event::SoftwareInterrupt(isr) => {
                if self.state == SchedulerState::HwHandling {
                    return Err(EmuError::InvalidSoftwareInterruptContext);
                }
                self.si_happened = true;
                Self::setup_interrupt(isr, regs, mem, input);
                controller.admit(isr, false);
                Self::arm_skip_step_into(flags, controller.active_depth());
                self.state = SchedulerState::SwHandling;
                Ok(())
            }
            Event::HardwareInterrupt(isr) => {
                if controller.would_preempt(isr) {
                    // `admit` clears the timer/keypress gates itself (§4.3's
                    // `check_deactivation_timer`) when the admitted ISR
                    // matches the bound device.
                    controller.admit(isr, true);
                    Self::setup_interrupt(isr, regs, mem, input);
                    Self::arm_skip_step_into(flags, controller.active_depth());
                    self.state = SchedulerState::HwHandling;
                    Ok(())
                } else {
                    controller.enqueue(isr)
                }
            }
            Event::ReturnFromInterrupt => {
                if controller.active_depth() == 0 {
                    warn!("RTI with no active interrupt frame; ignored");
                    return Ok(());
                }
                Self::return_from_interrupt(regs, mem);
                controller.pop_active();
                flags.on_stack_depth_changed(controller.active_depth());

                match self.state {
                    SchedulerState::SwHandling => {
                        self.si_happened = false;
                        self.state = SchedulerState::Normal;
                    }
                    SchedulerState::HwHandling => {
                        if let Some(pending_prio) = controller.peek_pending_priority() {
                            let current_top_prio =
                                controller.top_isr().map(|isr| controller.priority_of(isr));
                            let promote = match current_top_prio {
                                None => true,
                                Some(top_prio) => pending_prio > top_prio,
                            };
                            if promote {
                                let isr = controller
                                    .pop_pending()
                                    .expect("peek_pending_priority guarantees an entry");
                                controller.admit(isr, true);
                                Self::setup_interrupt(isr, regs, mem, input);
                                Self::arm_skip_step_into(flags, controller.active_depth());
                            }
                        } else if controller.active_depth() == 0 {
                            self.state = if self.si_happened {
                                SchedulerState::SwHandling
                            } else {
                                SchedulerState::Normal
                            };
                        }
                    }
                    SchedulerState::Normal => {}
                }
                Ok(())
            }
            Event::StepIntoAction => {
                flags.step_into_activated = true;
                flags.stepped_into_here = Some(controller.active_depth());
                Ok(())
            }
            Event::Finalize => {
                if controller.active_depth() > 0 {
                    flags.finished_isr_here = Some(controller.active_depth());
                    flags.isr_finished = false;
                }
                Ok(())
            }
            Event::Continue => {
                flags.breakpoint_encountered = false;
                Ok(())
            }
            Event::BreakpointEncountered => {
                flags.breakpoint_encountered = true;
                Ok(())
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
