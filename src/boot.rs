//! Startup built-in tests and strap decoding.
//!
//! Any failure here latches a boot fault; a latched fault keeps the
//! scheduler idle for the life of the power cycle.

use bitflags::bitflags;

use crate::label::ArincLabel;
use crate::port::{Clock, Discretes, Transceiver, LABEL_FILTER_LEN};
use crate::receive::RxGroup;

/// Control word that puts a transceiver in self-test (wrap-around) mode.
const SELF_TEST_CTRL: u16 = 0x8000;
/// Control word that opens the label filter for loading.
const LABEL_FILTER_CTRL: u16 = 0x0002;
/// Label recognition enable bit in the control word.
const LABEL_RECOGNITION_BIT: u16 = 0x0008;

/// Loopback test pattern and the readbacks each receiver must produce.
const LOOPBACK_PATTERN: u32 = 0xA5A5_A500;
const LOOPBACK_RX1_EXPECTED: u32 = 0xA5A5_A500;
const LOOPBACK_RX2_EXPECTED: u32 = 0xDA5A_5AFF;
const LOOPBACK_MAX_CYCLES: usize = 50;
/// Bounded spin while waiting for the wrapped word to land.
const LOOPBACK_READY_SPIN: u32 = 50_000;

const LABEL_FILTER_RETRIES: usize = 3;
/// Receiver FIFO depth, flushed with one extra read.
const FIFO_FLUSH_READS: usize = 33;

const STRAP_READS: usize = 10;
const STRAP_READ_SPACING_MS: u32 = 10;
/// Strap value selecting maintenance mode.
const MAINTENANCE_STRAPPING: u8 = 0x07;

bitflags! {
    /// Latched startup failures.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BootFaults: u8 {
        const RAM_TEST = 1 << 0;
        const CODE_CRC = 1 << 1;
        const ARINC = 1 << 2;
        const LABEL_FILTER = 1 << 3;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BootFaults {
    fn format(&self, fmt: defmt::Formatter<'_>) {
        defmt::write!(fmt, "BootFaults({=u8:#x})", self.bits());
    }
}

/// Results of the memory self-tests run by the hardware layer before any
/// of this code executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SelfTestReport {
    pub ram_test_passed: bool,
    pub code_crc_passed: bool,
}

/// Writes a transceiver control register and verifies it by readback.
pub fn load_ctrl_reg(txvr: &mut impl Transceiver, value: u16) -> bool {
    txvr.write_ctrl_reg(value);
    txvr.read_ctrl_reg() == value
}

/// Wrap-around test of one transceiver.
///
/// Enables self-test mode, flushes both receiver FIFOs, then transmits a
/// known pattern until both receivers return their expected signatures or
/// fifty attempts pass. The previous control word is restored either way.
pub fn loopback_test(txvr: &mut impl Transceiver) -> bool {
    let saved_ctrl = txvr.read_ctrl_reg();
    let mut status = load_ctrl_reg(txvr, SELF_TEST_CTRL);

    for _ in 0..FIFO_FLUSH_READS {
        txvr.read_rx1();
    }
    for _ in 0..FIFO_FLUSH_READS {
        txvr.read_rx2();
    }

    let mut rx1_readback = 0;
    let mut rx2_readback = 0;
    for _ in 0..LOOPBACK_MAX_CYCLES {
        txvr.transmit(LOOPBACK_PATTERN);

        let mut spin = 0;
        while !(txvr.data_ready_rx1() && txvr.data_ready_rx2()) && spin < LOOPBACK_READY_SPIN {
            spin += 1;
        }
        rx1_readback = txvr.read_rx1();
        rx2_readback = txvr.read_rx2();
        if rx1_readback == LOOPBACK_RX1_EXPECTED && rx2_readback == LOOPBACK_RX2_EXPECTED {
            break;
        }
    }

    status &= rx1_readback == LOOPBACK_RX1_EXPECTED && rx2_readback == LOOPBACK_RX2_EXPECTED;
    load_ctrl_reg(txvr, saved_ctrl);
    status
}

/// Programs a transceiver's hardware label filter from a group's table.
///
/// The sixteen filter entries are written and read back, with up to three
/// attempts. If readback never matches, label recognition is disabled so
/// the receiver passes all traffic instead of silently dropping it.
pub fn setup_label_filters(txvr: &mut impl Transceiver, group: &RxGroup<'_>) -> bool {
    if group.len() > LABEL_FILTER_LEN {
        return false;
    }

    let mut labels = [ArincLabel(0); LABEL_FILTER_LEN];
    for (entry, label) in labels.iter_mut().zip(group.labels()) {
        *entry = label;
    }

    let mut saved_ctrl = txvr.read_ctrl_reg();
    let mut ok = false;
    for _ in 0..LABEL_FILTER_RETRIES {
        load_ctrl_reg(txvr, LABEL_FILTER_CTRL);
        txvr.write_label_filter(&labels);
        if txvr.read_label_filter() == labels {
            ok = true;
            break;
        }
    }

    if !ok {
        saved_ctrl &= !LABEL_RECOGNITION_BIT;
    }
    load_ctrl_reg(txvr, saved_ctrl);
    ok
}

/// Reads the strap pins: ten consistent reads 10 ms apart, odd parity
/// across the three value pins and the parity pin. Returns the decoded
/// strap value, or `None` when the pins are unstable or parity fails.
pub fn read_strapping(
    discretes: &mut impl Discretes,
    clock: &mut impl Clock,
) -> Option<u8> {
    let first = discretes.read_straps();
    for _ in 1..STRAP_READS {
        clock.delay_ms(STRAP_READ_SPACING_MS);
        if discretes.read_straps() != first {
            return None;
        }
    }

    let ones =
        first.s1 as u8 + first.s2 as u8 + first.s3 as u8 + first.parity as u8;
    if ones & 0x1 != 0x1 {
        return None;
    }
    Some(((first.s1 as u8) << 2) | ((first.s2 as u8) << 1) | first.s3 as u8)
}

/// True when the straps select maintenance mode, which is handled outside
/// the operational core.
pub fn is_maintenance_strapping(strapping: u8) -> bool {
    strapping == MAINTENANCE_STRAPPING
}

/// Runs the ARINC-side built-in tests and folds in the memory self-test
/// results reported by the hardware layer.
pub fn run_built_in_tests(
    txvr_a: &mut impl Transceiver,
    txvr_b: &mut impl Transceiver,
    txvr_a_ctrl: u16,
    txvr_b_ctrl: u16,
    report: SelfTestReport,
) -> BootFaults {
    let mut faults = BootFaults::empty();
    if !report.ram_test_passed {
        faults |= BootFaults::RAM_TEST;
    }
    if !report.code_crc_passed {
        faults |= BootFaults::CODE_CRC;
    }

    let mut arinc_ok = loopback_test(txvr_a);
    arinc_ok &= loopback_test(txvr_b);
    arinc_ok &= load_ctrl_reg(txvr_a, txvr_a_ctrl);
    arinc_ok &= load_ctrl_reg(txvr_b, txvr_b_ctrl);
    if !arinc_ok {
        faults |= BootFaults::ARINC;
    }
    faults
}
