//! Hardware ports.
//!
//! The register-level layers (transceiver pin sequencing, UART interrupt
//! plumbing, RS-422 framing, timers) live outside this crate; these traits
//! are the contracts they implement. Everything is synchronous because the
//! unit runs a single polled super-loop.

use heapless::Vec;
use num_enum::TryFromPrimitive;

use crate::label::ArincLabel;

/// Monotonic millisecond timebase plus the 100 Hz scheduling flag.
///
/// `now_ms` wraps freely; consumers compute elapsed time with wrapping
/// subtraction, so a wrap mid-measurement still reads correctly.
pub trait Clock {
    fn now_ms(&self) -> u32;

    /// Busy-waits for the given number of milliseconds. Only used during
    /// initialization, never inside the scheduler loop.
    fn delay_ms(&mut self, ms: u32);

    /// Reads and clears the system-frequency flag. Returns true once per
    /// 100 Hz timer period.
    fn take_tick(&mut self) -> bool;
}

/// Transmit channel selector, one per transceiver device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// AHRS side, low-speed line driver.
    A,
    /// PFD side, high-speed line driver.
    B,
}

/// Number of entries in a transceiver's hardware label filter.
pub const LABEL_FILTER_LEN: usize = 16;

/// One dual-receiver ARINC 429 transceiver device.
///
/// `data_ready_*` report whether the corresponding receiver FIFO holds a
/// word; `read_*` pop one word with the hardware parity flag in bit 32.
/// The control register and label filter primitives are only exercised by
/// the bootstrap sequence.
pub trait Transceiver {
    fn data_ready_rx1(&mut self) -> bool;
    fn data_ready_rx2(&mut self) -> bool;
    fn read_rx1(&mut self) -> u32;
    fn read_rx2(&mut self) -> u32;

    /// Queues one 32-bit word for transmission. Parity is appended by the
    /// device.
    fn transmit(&mut self, word: u32);

    fn write_ctrl_reg(&mut self, value: u16);
    fn read_ctrl_reg(&mut self) -> u16;

    fn write_label_filter(&mut self, labels: &[ArincLabel; LABEL_FILTER_LEN]);
    fn read_label_filter(&mut self) -> [ArincLabel; LABEL_FILTER_LEN];
}

/// Commands carried by the air-data computer's serial frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AdcCommand {
    ComputedData = 0x30,
    Status = 0x31,
    SoftwareVersion = 0x32,
    HardwareSerial = 0x33,
    /// Attitude and air-data snapshot sent back to the ADC.
    CurrentData = 0x34,
}

/// Largest frame payload the link delivers (software version reply).
pub const ADC_FRAME_MAX: usize = 24;

/// A de-framed message from the air-data computer: command byte plus
/// payload, with framing and checksum already verified by the link layer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcFrame {
    pub cmd: AdcCommand,
    pub data: Vec<u8, ADC_FRAME_MAX>,
}

/// The RS-422 link to the air-data computer.
///
/// The framing codec is external; this trait trades whole de-framed
/// messages. `pump` drains whatever the receive interrupt has buffered
/// since the last call.
pub trait AdcLink {
    fn pump(&mut self);
    fn take_frame(&mut self) -> Option<AdcFrame>;
    fn send(&mut self, cmd: AdcCommand, payload: &[u8]);
}

/// Raw strap pin levels, read together.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StrapPins {
    pub s1: bool,
    pub s2: bool,
    pub s3: bool,
    pub parity: bool,
}

/// Discrete I/O owned by the processor board.
pub trait Discretes {
    /// Drives the fault one-shot line. Pulsed high inside each healthy
    /// tick and dropped at tick end; the external circuit treats a missing
    /// pulse train as a fault.
    fn set_fault_pin(&mut self, high: bool);

    fn read_straps(&mut self) -> StrapPins;
}
