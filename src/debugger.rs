//! Debugger gate and flag bookkeeping (§4.5, §9).
//!
//! The interpreter exposes a single boolean predicate that decides
//! whether to block for a TUI render this step. The flags behind that
//! predicate are depth-scoped: `finished_isr_here`/`not_stepped_into_isr_here`/
//! `stepped_into_here` remember *which* active-stack depth asked for "run to
//! end of ISR", "don't step into this ISR", or "step into the next ISR", so
//! the complementary condition can be re-asserted once `RTI` unwinds past
//! that depth (§4.3's last row, §9).

use crate::registers::RegisterFile;

/// Debugger-visible flags layered on top of the scheduler state (§3).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebugFlags {
    pub breakpoint_encountered: bool,
    pub isr_finished: bool,
    pub step_into_activated: bool,
    pub isr_not_step_into: bool,
    pub si_happened: bool,
    /// Active-stack depth at which "finalize" was requested, if any.
    pub finished_isr_here: Option<usize>,
    /// Active-stack depth at which "don't step into" was requested, if any.
    pub not_stepped_into_isr_here: Option<usize>,
    /// Active-stack depth recorded when `step_into_activated` was last set, if any.
    pub stepped_into_here: Option<usize>,
}

impl DebugFlags {
    #[must_use]
    pub fn new() -> Self {
        Self {
            isr_finished: true,
            isr_not_step_into: true,
            ..Default::default()
        }
    }

    /// The render/block predicate from §4.5:
    /// `debug_mode AND breakpoint_encountered AND isr_finished AND
    /// (isr_not_step_into OR step_into_activated)`.
    #[must_use]
    pub const fn should_render(&self, debug_mode: bool) -> bool {
        debug_mode
            && self.breakpoint_encountered
            && self.isr_finished
            && (self.isr_not_step_into || self.step_into_activated)
    }

    /// Re-asserts `isr_finished`/`isr_not_step_into` once the active stack
    /// unwinds past the depth that recorded a "here" mark (§4.3, §9).
    pub fn on_stack_depth_changed(&mut self, new_depth: usize) {
        if let Some(depth) = self.finished_isr_here {
            if new_depth <= depth {
                self.isr_finished = true;
                self.finished_isr_here = None;
            }
        }
        if let Some(depth) = self.not_stepped_into_isr_here {
            if new_depth <= depth {
                self.isr_not_step_into = true;
                self.not_stepped_into_isr_here = None;
            }
        }
        if let Some(depth) = self.stepped_into_here {
            if new_depth <= depth {
                self.step_into_activated = false;
                self.stepped_into_here = None;
            }
        }
    }
}

/// A snapshot of machine state handed to the TUI driver for rendering.
#[derive(Clone, Debug)]
pub struct DebugSnapshot<'a> {
    pub registers: &'a RegisterFile,
    pub flags: &'a DebugFlags,
    pub active_stack_depth: usize,
}

/// A user command, translated from a single TUI key press (§4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebuggerCommand {
    /// `n` — step one instruction.
    Step,
    /// `c` — continue, clearing the breakpoint flag.
    Continue,
    /// `s` — step into the next `INT` or admitted hardware ISR.
    StepInto,
    /// `f` — run the rest of the current ISR without stopping.
    Finalize,
    /// `t` — trigger a keypress hardware interrupt.
    TriggerKeypress,
    /// `r` — reset registers to zero.
    ResetRegisters,
    /// `q` — finalize and exit.
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_is_closed_without_debug_mode() {
        let mut flags = DebugFlags::new();
        flags.breakpoint_encountered = true;
        assert!(!flags.should_render(false));
        assert!(flags.should_render(true));
    }

    #[test]
    fn gate_requires_isr_finished_and_not_step_into_or_step_into_activated() {
        let mut flags = DebugFlags::new();
        flags.breakpoint_encountered = true;
        flags.isr_finished = false;
        assert!(!flags.should_render(true));
        flags.isr_finished = true;
        flags.isr_not_step_into = false;
        assert!(!flags.should_render(true));
        flags.step_into_activated = true;
        assert!(flags.should_render(true));
    }

    #[test]
    fn here_marks_reassert_on_unwind_past_recorded_depth() {
        let mut flags = DebugFlags::new();
        flags.isr_finished = false;
        flags.finished_isr_here = Some(2);
        flags.on_stack_depth_changed(3);
        assert!(!flags.isr_finished);
        flags.on_stack_depth_changed(2);
        assert!(flags.isr_finished);
        assert_eq!(flags.finished_isr_here, None);
    }

    #[test]
    fn step_into_activated_clears_on_unwind_past_recorded_depth() {
        let mut flags = DebugFlags::new();
        flags.step_into_activated = true;
        flags.stepped_into_here = Some(1);
        flags.on_stack_depth_changed(2);
        assert!(flags.step_into_activated);
        flags.on_stack_depth_changed(1);
        assert!(!flags.step_into_activated);
        assert_eq!(flags.stepped_into_here, None);
    }
}
