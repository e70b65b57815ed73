//! Mock ports for unit tests.

extern crate std;

use core::cell::Cell;
use std::collections::VecDeque;
use std::vec::Vec;

use crate::label::ArincLabel;
use crate::port::{
    AdcCommand, AdcFrame, AdcLink, Clock, Discretes, StrapPins, Transceiver, LABEL_FILTER_LEN,
};

/// A clock whose time and tick flag the test sets explicitly.
pub struct MockClock {
    now: Cell<u32>,
    pending_ticks: Cell<u32>,
}

impl MockClock {
    pub fn new(now: u32) -> Self {
        MockClock {
            now: Cell::new(now),
            pending_ticks: Cell::new(0),
        }
    }

    pub fn set(&self, now: u32) {
        self.now.set(now);
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }

    pub fn grant_ticks(&self, count: u32) {
        self.pending_ticks.set(self.pending_ticks.get() + count);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(ms);
    }

    fn take_tick(&mut self) -> bool {
        let pending = self.pending_ticks.get();
        if pending > 0 {
            self.pending_ticks.set(pending - 1);
            true
        } else {
            false
        }
    }
}

/// Self-test control word recognized by the mock device.
const SELF_TEST_CTRL: u16 = 0x8000;

/// A transceiver with scripted receive FIFOs and recorded transmissions.
pub struct MockTxvr {
    rx1: VecDeque<u32>,
    rx2: VecDeque<u32>,
    pub sent: Vec<u32>,
    ctrl: u16,
    filters: [ArincLabel; LABEL_FILTER_LEN],
    /// When false the device misbehaves in self-test mode.
    pub loopback_healthy: bool,
    /// When false, filter readback returns zeros.
    pub filter_readback_healthy: bool,
    /// When false, control register readback returns garbage.
    pub ctrl_reg_healthy: bool,
}

impl MockTxvr {
    pub fn new() -> Self {
        MockTxvr {
            rx1: VecDeque::new(),
            rx2: VecDeque::new(),
            sent: Vec::new(),
            ctrl: 0,
            filters: [ArincLabel(0); LABEL_FILTER_LEN],
            loopback_healthy: true,
            filter_readback_healthy: true,
            ctrl_reg_healthy: true,
        }
    }

    pub fn queue_rx2(&mut self, word: u32) {
        self.rx2.push_back(word);
    }

    pub fn rx2_remaining(&self) -> usize {
        self.rx2.len()
    }
}

impl Transceiver for MockTxvr {
    fn data_ready_rx1(&mut self) -> bool {
        !self.rx1.is_empty()
    }

    fn data_ready_rx2(&mut self) -> bool {
        !self.rx2.is_empty()
    }

    fn read_rx1(&mut self) -> u32 {
        self.rx1.pop_front().unwrap_or(0)
    }

    fn read_rx2(&mut self) -> u32 {
        self.rx2.pop_front().unwrap_or(0)
    }

    fn transmit(&mut self, word: u32) {
        if self.ctrl == SELF_TEST_CTRL {
            // wrap-around path: rx1 sees the transmitted word, rx2 sees the
            // device's fixed self-test signature
            if self.loopback_healthy {
                self.rx1.push_back(word);
                self.rx2.push_back(0xDA5A_5AFF);
            } else {
                self.rx1.push_back(0);
                self.rx2.push_back(0);
            }
        } else {
            self.sent.push(word);
        }
    }

    fn write_ctrl_reg(&mut self, value: u16) {
        self.ctrl = value;
    }

    fn read_ctrl_reg(&mut self) -> u16 {
        if self.ctrl_reg_healthy {
            self.ctrl
        } else {
            !self.ctrl
        }
    }

    fn write_label_filter(&mut self, labels: &[ArincLabel; LABEL_FILTER_LEN]) {
        self.filters = *labels;
    }

    fn read_label_filter(&mut self) -> [ArincLabel; LABEL_FILTER_LEN] {
        if self.filter_readback_healthy {
            self.filters
        } else {
            [ArincLabel(0); LABEL_FILTER_LEN]
        }
    }
}

/// An RS-422 link with scripted inbound frames and optional canned version
/// replies.
pub struct MockLink {
    pub frames: VecDeque<AdcFrame>,
    pub sent: Vec<(AdcCommand, Vec<u8>)>,
    /// Queued as a reply whenever a software version request goes out.
    pub sw_reply: Option<AdcFrame>,
    /// Queued as a reply whenever a hardware serial request goes out.
    pub hw_reply: Option<AdcFrame>,
}

impl MockLink {
    pub fn new() -> Self {
        MockLink {
            frames: VecDeque::new(),
            sent: Vec::new(),
            sw_reply: None,
            hw_reply: None,
        }
    }

    pub fn queue_frame(&mut self, cmd: AdcCommand, data: &[u8]) {
        self.frames.push_back(AdcFrame {
            cmd,
            data: heapless::Vec::from_slice(data).unwrap(),
        });
    }
}

impl AdcLink for MockLink {
    fn pump(&mut self) {}

    fn take_frame(&mut self) -> Option<AdcFrame> {
        self.frames.pop_front()
    }

    fn send(&mut self, cmd: AdcCommand, payload: &[u8]) {
        self.sent.push((cmd, payload.to_vec()));
        match cmd {
            AdcCommand::SoftwareVersion => {
                if let Some(reply) = self.sw_reply.clone() {
                    self.frames.push_back(reply);
                }
            }
            AdcCommand::HardwareSerial => {
                if let Some(reply) = self.hw_reply.clone() {
                    self.frames.push_back(reply);
                }
            }
            _ => {}
        }
    }
}

/// Discrete I/O with recorded fault-pin transitions and fixed straps.
pub struct MockDiscretes {
    pub fault_pin: Vec<bool>,
    pub straps: StrapPins,
}

impl MockDiscretes {
    pub fn new() -> Self {
        MockDiscretes {
            fault_pin: Vec::new(),
            straps: StrapPins {
                s1: false,
                s2: false,
                s3: false,
                parity: true,
            },
        }
    }
}

impl Discretes for MockDiscretes {
    fn set_fault_pin(&mut self, high: bool) {
        self.fault_pin.push(high);
    }

    fn read_straps(&mut self) -> StrapPins {
        self.straps
    }
}
