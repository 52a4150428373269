//! Interrupt controller: priority table, active-nest stack, and the
//! pending-priority max-heap (§3, §4.3).
//!
//! This module owns the controller's *data* — admission, enqueueing, and
//! the priority comparison the scheduler state machine (`scheduler.rs`)
//! consults to decide preempt vs. enqueue. The abstract NORMAL /
//! HW_HANDLING / SW_HANDLING transitions themselves live in `scheduler.rs`
//! so the two modules don't need to call back into each other (§9).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::EmuError;

/// Maximum number of interrupts the pending heap can hold at once.
pub const HEAP_CAPACITY: usize = 255;
/// Maximum active-stack nesting depth the priority rule allows a new
/// admission past.
pub const MAX_ACTIVE_DEPTH: usize = 255;

/// The four hardware devices that can source an interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Device {
    Timer,
    UartRecv,
    UartSend,
    Keypress,
}

impl Device {
    const ALL: [Device; 4] = [Device::Timer, Device::UartRecv, Device::UartSend, Device::Keypress];

    const fn index(self) -> usize {
        match self {
            Device::Timer => 0,
            Device::UartRecv => 1,
            Device::UartSend => 2,
            Device::Keypress => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HeapEntry {
    isr: u8,
    priority: u8,
    /// Breaks priority ties in admission order, oldest first, so repeated
    /// runs with the same priority set are deterministic.
    sequence: u64,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The interrupt controller's mutable state (§3).
pub struct Controller {
    device_to_isr: [Option<u8>; 4],
    isr_to_prio: [u8; 256],
    active_stack: Vec<u8>,
    is_hw_stack: Vec<bool>,
    pending_heap: BinaryHeap<HeapEntry>,
    next_sequence: u64,
    latest_isr: Option<u8>,
    keypress_interrupt_active: bool,
    interrupt_timer_active: bool,
    /// Active-stack depth at which the timer gate was last cleared; `RTI`
    /// re-enables the gate once the stack unwinds back to this depth.
    timer_deactivation_depth: Option<usize>,
    pub timer_cnt: u32,
    pub timer_interval: u32,
}

impl Controller {
    #[must_use]
    pub fn new(timer_interval: u32) -> Self {
        Self {
            device_to_isr: [None; 4],
            isr_to_prio: [0; 256],
            active_stack: Vec::new(),
            is_hw_stack: Vec::new(),
            pending_heap: BinaryHeap::new(),
            next_sequence: 0,
            latest_isr: None,
            keypress_interrupt_active: true,
            interrupt_timer_active: true,
            timer_deactivation_depth: None,
            timer_cnt: 0,
            timer_interval,
        }
    }

    pub fn bind_device(&mut self, device: Device, isr: u8) {
        self.device_to_isr[device.index()] = Some(isr);
    }

    pub fn set_priority(&mut self, isr: u8, priority: u8) {
        self.isr_to_prio[isr as usize] = priority;
    }

    #[must_use]
    pub fn priority_of(&self, isr: u8) -> u8 {
        self.isr_to_prio[isr as usize]
    }

    #[must_use]
    pub fn isr_for(&self, device: Device) -> Option<u8> {
        self.device_to_isr[device.index()]
    }

    #[must_use]
    pub fn active_depth(&self) -> usize {
        self.active_stack.len()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending_heap.len()
    }

    #[must_use]
    pub fn top_isr(&self) -> Option<u8> {
        self.active_stack.last().copied()
    }

    #[must_use]
    pub fn latest_isr(&self) -> Option<u8> {
        self.latest_isr
    }

    #[must_use]
    pub fn keypress_interrupt_active(&self) -> bool {
        self.keypress_interrupt_active
    }

    #[must_use]
    pub fn interrupt_timer_active(&self) -> bool {
        self.interrupt_timer_active
    }

    /// Whether `isr` would preempt the current top frame (§4.3's priority
    /// rule): the stack is empty, or `isr`'s priority strictly exceeds the
    /// top frame's and the stack has room for one more frame.
    #[must_use]
    pub fn would_preempt(&self, isr: u8) -> bool {
        match self.top_isr() {
            None => true,
            Some(top) => {
                self.priority_of(isr) > self.priority_of(top) && self.active_depth() < MAX_ACTIVE_DEPTH
            }
        }
    }

    /// Pushes `isr` onto the active stack, tagged hardware or software.
    pub fn admit(&mut self, isr: u8, is_hw: bool) {
        if is_hw && self.isr_for(Device::Timer) == Some(isr) {
            self.timer_deactivation_depth = Some(self.active_stack.len());
            self.interrupt_timer_active = false;
        }
        if is_hw && self.isr_for(Device::Keypress) == Some(isr) {
            self.keypress_interrupt_active = false;
        }
        self.active_stack.push(isr);
        self.is_hw_stack.push(is_hw);
        self.latest_isr = Some(isr);
    }

    /// Inserts `isr` into the pending max-heap.
    ///
    /// # Errors
    /// Returns `EmuError::HeapOverflow` if the heap is already at
    /// [`HEAP_CAPACITY`].
    pub fn enqueue(&mut self, isr: u8) -> Result<(), EmuError> {
        if self.pending_heap.len() >= HEAP_CAPACITY {
            return Err(EmuError::HeapOverflow);
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending_heap.push(HeapEntry {
            isr,
            priority: self.priority_of(isr),
            sequence,
        });
        Ok(())
    }

    /// Removes and returns the highest-priority pending ISR, if any.
    pub fn pop_pending(&mut self) -> Option<u8> {
        self.pending_heap.pop().map(|entry| entry.isr)
    }

    /// Priority of the pending heap's top entry, without removing it.
    #[must_use]
    pub fn peek_pending_priority(&self) -> Option<u8> {
        self.pending_heap.peek().map(|entry| entry.priority)
    }

    /// Pops the active stack's top frame, returning `(isr, was_hw)`.
    ///
    /// # Panics
    /// Panics if the active stack is empty.
    pub fn pop_active(&mut self) -> (u8, bool) {
        let isr = self.active_stack.pop().expect("pop_active on empty stack");
        let was_hw = self.is_hw_stack.pop().expect("is_hw_stack parallel to active_stack");
        let depth = self.active_stack.len();
        if let Some(stamp) = self.timer_deactivation_depth {
            if depth <= stamp {
                self.interrupt_timer_active = true;
                self.timer_deactivation_depth = None;
            }
        }
        if !self.keypress_interrupt_active && self.isr_for(Device::Keypress) != Some(isr) {
            // Only the matching keypress frame's own return re-enables it;
            // intervening returns from other frames leave the gate as-is.
        } else if self.isr_for(Device::Keypress) == Some(isr) {
            self.keypress_interrupt_active = true;
        }
        (isr, was_hw)
    }

    /// Invariant check (a): the active stack is non-decreasing in
    /// priority from bottom to top.
    #[must_use]
    pub fn active_stack_is_sorted(&self) -> bool {
        self.active_stack
            .windows(2)
            .all(|pair| self.priority_of(pair[0]) <= self.priority_of(pair[1]))
    }

    /// Ticks the programmable timer; returns `true` once per
    /// `timer_interval` steps when the timer gate is open.
    pub fn tick_timer(&mut self) -> bool {
        if !self.interrupt_timer_active || self.timer_interval == 0 {
            return false;
        }
        self.timer_cnt += 1;
        if self.timer_cnt >= self.timer_interval {
            self.timer_cnt = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller_with(priorities: &[(u8, u8)]) -> Controller {
        let mut c = Controller::new(0);
        for (isr, prio) in priorities {
            c.set_priority(*isr, *prio);
        }
        c
    }

    #[test]
    fn empty_stack_always_preempts() {
        let c = controller_with(&[(1, 5)]);
        assert!(c.would_preempt(1));
    }

    #[test]
    fn higher_priority_preempts_lower() {
        let mut c = controller_with(&[(1, 5), (2, 7)]);
        c.admit(1, true);
        assert!(c.would_preempt(2));
        assert!(!c.would_preempt(1));
    }

    #[test]
    fn heap_orders_by_priority_highest_first() {
        let mut c = controller_with(&[(3, 3), (5, 5), (7, 7), (9, 9)]);
        c.admit(9, true);
        c.enqueue(3).unwrap();
        c.enqueue(7).unwrap();
        c.enqueue(5).unwrap();
        assert_eq!(c.pop_pending(), Some(7));
        assert_eq!(c.pop_pending(), Some(5));
        assert_eq!(c.pop_pending(), Some(3));
        assert_eq!(c.pop_pending(), None);
    }

    #[test]
    fn heap_overflow_is_fatal_past_capacity() {
        let mut c = Controller::new(0);
        for isr in 0..HEAP_CAPACITY {
            c.enqueue(isr as u8).unwrap();
        }
        assert!(matches!(c.enqueue(1), Err(EmuError::HeapOverflow)));
    }

    #[test]
    fn timer_gate_clears_on_admission_and_restores_at_matching_depth() {
        let mut c = controller_with(&[(1, 5)]);
        c.bind_device(Device::Timer, 1);
        c.admit(1, true);
        assert!(!c.interrupt_timer_active());
        c.pop_active();
        assert!(c.interrupt_timer_active());
    }

    #[test]
    fn active_stack_sorted_invariant_holds_after_nested_admission() {
        let mut c = controller_with(&[(1, 5), (2, 7)]);
        c.admit(1, true);
        c.admit(2, true);
        assert!(c.active_stack_is_sorted());
    }

    #[test]
    fn timer_ticks_fire_once_per_interval() {
        let mut c = Controller::new(3);
        assert!(!c.tick_timer());
        assert!(!c.tick_timer());
        assert!(c.tick_timer());
        assert!(!c.tick_timer());
    }
}
