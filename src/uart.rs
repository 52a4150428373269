//! UART device model.
//!
//! The UART exposes three byte-addressed registers at SRAM-space offsets
//! 0 (send data / datatype tag), 1 (receive data), and 2 (status: bit 0
//! "sender ready", bit 1 "fresh receive byte"). Both send and receive are
//! independent two-phase (*armed* → *completing*) state machines that
//! share the status register; see the module-level doc in `memory.rs` for
//! how address-space reads/writes route here.

use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::loader::InputSource;

/// Bit 0 of the status register: the sender will accept a new byte.
pub const STATUS_SEND_READY: u8 = 0b01;
/// Bit 1 of the status register: the receiver has a fresh byte waiting.
pub const STATUS_RECV_FRESH: u8 = 0b10;

const SEND_REG: u32 = 0;
const RECV_REG: u32 = 1;
const STATUS_REG: u32 = 2;

/// The datatype tag carried by the first byte of a send frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Datatype {
    String,
    Integer,
}

impl Datatype {
    const fn from_tag(tag: u8) -> Datatype {
        match tag {
            4 => Datatype::Integer,
            _ => Datatype::String,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Counting down the randomized service latency before completion.
    Armed(u32),
}

struct SendChannel {
    phase: Phase,
    pending_byte: u8,
    datatype: Option<Datatype>,
    string_buf: Vec<u8>,
    int_buf: Vec<u8>,
}

impl SendChannel {
    const fn new() -> Self {
        Self {
            phase: Phase::Idle,
            pending_byte: 0,
            datatype: None,
            string_buf: Vec::new(),
            int_buf: Vec::new(),
        }
    }
}

struct RecvChannel {
    phase: Phase,
    /// The 32-bit word currently being shifted out a byte at a time, and
    /// the index (3..0) of the next byte to emit. `-1` (modeled as
    /// `None`) means no word is in flight.
    word: u32,
    byte_idx: Option<u8>,
    last_byte: u8,
}

impl RecvChannel {
    const fn new() -> Self {
        Self {
            phase: Phase::Idle,
            word: 0,
            byte_idx: None,
            last_byte: 0,
        }
    }
}

/// The UART device: status register, and the send/receive state machines.
pub struct Uart {
    status: u8,
    send: SendChannel,
    recv: RecvChannel,
    /// Inclusive upper bound on the randomized service latency, in
    /// interpreter steps. `0` means every transfer completes immediately.
    max_waiting_instrs: u32,
    rng: StdRng,
    /// Where flushed `STRING`/`INTEGER` frames are written.
    sink: Sink,
}

enum Sink {
    Stdout,
    Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>),
}

impl Uart {
    /// Creates a UART with the given latency bound, writing completed
    /// frames to stdout.
    #[must_use]
    pub fn new(max_waiting_instrs: u32) -> Self {
        Self {
            status: STATUS_SEND_READY | STATUS_RECV_FRESH,
            send: SendChannel::new(),
            recv: RecvChannel::new(),
            max_waiting_instrs,
            rng: StdRng::from_entropy(),
            sink: Sink::Stdout,
        }
    }

    /// Creates a UART with a deterministic RNG seed and a captured output
    /// buffer, for tests.
    #[cfg(test)]
    #[must_use]
    pub fn with_seed(max_waiting_instrs: u32, seed: u64) -> Self {
        Self {
            status: STATUS_SEND_READY | STATUS_RECV_FRESH,
            send: SendChannel::new(),
            recv: RecvChannel::new(),
            max_waiting_instrs,
            rng: StdRng::seed_from_u64(seed),
            sink: Sink::Captured(std::sync::Arc::new(std::sync::Mutex::new(Vec::new()))),
        }
    }

    #[cfg(test)]
    fn flushed_output(&self) -> String {
        match &self.sink {
            Sink::Captured(buf) => String::from_utf8_lossy(&buf.lock().unwrap()).into_owned(),
            Sink::Stdout => String::new(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> u8 {
        self.status
    }

    /// Reads one of the three UART registers. Returns the raw byte value;
    /// out-of-protocol reads are warned about but never fail.
    pub fn read(&mut self, offset: u32) -> u32 {
        match offset {
            SEND_REG => {
                warn!("reading send register is meaningless");
                u32::from(self.send.pending_byte)
            }
            RECV_REG => {
                if self.status & STATUS_RECV_FRESH == 0 {
                    warn!("no new data in the receive register");
                }
                u32::from(self.recv.last_byte)
            }
            STATUS_REG => u32::from(self.status),
            _ => 0,
        }
    }

    /// Writes one of the three UART registers.
    pub fn write(&mut self, offset: u32, value: u32, input: &mut dyn InputSource) {
        let byte = (value & 0xFF) as u8;
        match offset {
            SEND_REG => {
                if self.status & STATUS_SEND_READY == 0 {
                    warn!("UART busy, does not accept data");
                    return;
                }
                self.status &= !STATUS_SEND_READY;
                self.arm_send(byte);
            }
            RECV_REG => {
                warn!("writing recv register is meaningless");
            }
            STATUS_REG => {
                if byte & STATUS_SEND_READY != 0 && self.status & STATUS_SEND_READY == 0 {
                    warn!("only the UART may re-enable sending");
                }
                let recv_rising = byte & STATUS_RECV_FRESH != 0 && self.status & STATUS_RECV_FRESH == 0;
                if recv_rising {
                    warn!("only the UART may signal that it has received data");
                }
                let recv_falling = byte & STATUS_RECV_FRESH == 0 && self.status & STATUS_RECV_FRESH != 0;
                self.status = byte;
                if recv_falling {
                    self.arm_recv(input);
                }
            }
            _ => {}
        }
    }

    fn latency(&mut self) -> u32 {
        if self.max_waiting_instrs == 0 {
            0
        } else {
            self.rng.gen_range(0..=self.max_waiting_instrs)
        }
    }

    fn arm_send(&mut self, byte: u8) {
        self.send.pending_byte = byte;
        let latency = self.latency();
        self.send.phase = Phase::Armed(latency);
    }

    fn arm_recv(&mut self, input: &mut dyn InputSource) {
        if self.recv.byte_idx.is_none() {
            let word = input.next_word().unwrap_or_else(|| input.prompt_blocking());
            self.recv.word = word as u32;
            self.recv.byte_idx = Some(3);
        }
        let latency = self.latency();
        self.recv.phase = Phase::Armed(latency);
    }

    fn flush(&mut self, text: &str) {
        match &mut self.sink {
            Sink::Stdout => println!("{text}"),
            Sink::Captured(buf) => {
                let mut buf = buf.lock().unwrap();
                buf.extend_from_slice(text.as_bytes());
                buf.push(b'\n');
            }
        }
    }

    /// Advances the send state machine by one interpreter step. Returns
    /// `true` the step a transfer completes, so the caller can raise the
    /// UART-send hardware interrupt.
    pub fn tick_send(&mut self) -> bool {
        match self.send.phase {
            Phase::Idle => false,
            Phase::Armed(0) => {
                self.complete_send();
                self.status |= STATUS_SEND_READY;
                self.send.phase = Phase::Idle;
                true
            }
            Phase::Armed(n) => {
                self.send.phase = Phase::Armed(n - 1);
                false
            }
        }
    }

    fn complete_send(&mut self) {
        let byte = self.send.pending_byte;
        match self.send.datatype {
            None => {
                let datatype = Datatype::from_tag(byte);
                self.send.datatype = Some(datatype);
                self.send.string_buf.clear();
                self.send.int_buf.clear();
            }
            Some(Datatype::String) => {
                if byte == 0 {
                    let text = String::from_utf8_lossy(&self.send.string_buf).into_owned();
                    self.flush(&text);
                    self.send.datatype = None;
                } else {
                    self.send.string_buf.push(byte);
                }
            }
            Some(Datatype::Integer) => {
                self.send.int_buf.push(byte);
                if self.send.int_buf.len() == 4 {
                    let value = i32::from_be_bytes([
                        self.send.int_buf[0],
                        self.send.int_buf[1],
                        self.send.int_buf[2],
                        self.send.int_buf[3],
                    ]);
                    self.flush(&value.to_string());
                    self.send.datatype = None;
                    self.send.int_buf.clear();
                }
            }
        }
    }

    /// Advances the receive state machine by one interpreter step. Returns
    /// `true` the step a byte is delivered, so the caller can raise the
    /// UART-receive hardware interrupt.
    pub fn tick_receive(&mut self) -> bool {
        match self.recv.phase {
            Phase::Idle => false,
            Phase::Armed(0) => {
                self.complete_recv();
                self.recv.phase = Phase::Idle;
                true
            }
            Phase::Armed(n) => {
                self.recv.phase = Phase::Armed(n - 1);
                false
            }
        }
    }

    fn complete_recv(&mut self) {
        let idx = self.recv.byte_idx.expect("complete_recv only runs while armed");
        let byte = ((self.recv.word >> (idx * 8)) & 0xFF) as u8;
        self.recv.last_byte = byte;
        self.status |= STATUS_RECV_FRESH;
        self.recv.byte_idx = if idx == 0 { None } else { Some(idx - 1) };
    }
}
