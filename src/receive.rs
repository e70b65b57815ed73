//! Receive-side label dispatch and timekeeping.
//!
//! Each receive source (AHRS, PFD, the RS-422-fed ADC image) owns an
//! [`RxGroup`]: an ordered table of label configurations with one live slot
//! per label. Words are dispatched by wire-order label; slots carry the
//! decoded fields plus the babble and freshness bookkeeping the derived-word
//! calculators gate on.

use heapless::Vec;
use snafu::Snafu;

use crate::codec::{self, DecodeError};
use crate::config::LabelConfig;
use crate::label::{ArincLabel, PARITY_ERROR_BIT};
use crate::port::{Clock, Transceiver};

/// Upper bound on configured labels per receive source.
pub const MAX_GROUP_LABELS: usize = 64;

/// Receiver FIFO depth; one drain pass never reads more than this.
pub const MAX_DRAIN_WORDS: usize = 32;

/// Live state for one configured label.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxSlot {
    pub raw_word: u32,
    pub sm: u8,
    pub sdi: u8,
    pub eng_float: f32,
    pub eng_int: i32,
    pub discrete_bits: u32,
    /// Timestamp of the last successful type-specific parse.
    pub last_good_ms: u32,
    /// True when the two most recent good receipts were at least the
    /// minimum transmit interval apart.
    pub is_not_babbling: bool,
    /// Derived from the clock at every read, never cached.
    pub is_fresh: bool,
}

/// A label configuration paired with its live slot.
#[derive(Debug)]
pub struct RxMsg<'c> {
    pub config: &'c LabelConfig,
    pub slot: RxSlot,
}

/// Group construction failures. Fatal at initialization, impossible later.
#[derive(Debug, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GroupError {
    #[snafu(display("more than {} labels configured", MAX_GROUP_LABELS))]
    TooManyLabels,
    #[snafu(display("label {:#04x} configured twice", label))]
    DuplicateLabel { label: u8 },
    #[snafu(display("label {:#04x} configuration malformed", label))]
    MalformedConfig { label: u8 },
}

/// Receive processing failures. The word is dropped, the slot untouched.
#[derive(Debug, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveError {
    /// The word's label is not configured for this source.
    #[snafu(display("no matching label"))]
    NoMatchingLabel,
    #[snafu(display("decode failed: {cause}"))]
    Decode { cause: DecodeError },
}

/// All configured labels and slots for one receive source, plus the
/// bus-level failure counter.
#[derive(Debug)]
pub struct RxGroup<'c> {
    msgs: Vec<RxMsg<'c>, MAX_GROUP_LABELS>,
    /// Ticks without traffic before the bus is declared failed.
    pub max_bus_failure_counts: u32,
    pub current_counts: u32,
    pub has_bus_failed: bool,
}

impl<'c> RxGroup<'c> {
    /// Builds a group from a configuration table, verifying per-label
    /// invariants and label uniqueness.
    pub fn new(
        configs: &'c [LabelConfig],
        max_bus_failure_counts: u32,
    ) -> Result<Self, GroupError> {
        let mut msgs: Vec<RxMsg<'c>, MAX_GROUP_LABELS> = Vec::new();
        for config in configs {
            if !config.is_well_formed() {
                return Err(GroupError::MalformedConfig {
                    label: config.label.wire(),
                });
            }
            if msgs.iter().any(|m| m.config.label == config.label) {
                return Err(GroupError::DuplicateLabel {
                    label: config.label.wire(),
                });
            }
            msgs.push(RxMsg {
                config,
                slot: RxSlot::default(),
            })
            .map_err(|_| GroupError::TooManyLabels)?;
        }
        Ok(RxGroup {
            msgs,
            max_bus_failure_counts,
            current_counts: 0,
            has_bus_failed: false,
        })
    }

    pub fn len(&self) -> usize {
        self.msgs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }

    /// Wire-order labels in table order, used for hardware filter setup.
    pub fn labels(&self) -> impl Iterator<Item = ArincLabel> + '_ {
        self.msgs.iter().map(|m| m.config.label)
    }

    /// Direct slot access without freshness evaluation.
    pub fn slot(&self, label: ArincLabel) -> Option<&RxSlot> {
        self.msgs
            .iter()
            .find(|m| m.config.label == label)
            .map(|m| &m.slot)
    }

    /// Dispatches one received word to its slot.
    ///
    /// The babble flag is evaluated against the previous receipt time
    /// before the timestamp is advanced.
    pub fn process_received(
        &mut self,
        clock: &impl Clock,
        word: u32,
    ) -> Result<(), ReceiveError> {
        let label = ArincLabel::of_word(word);
        let msg = self
            .msgs
            .iter_mut()
            .find(|m| m.config.label == label)
            .ok_or(ReceiveError::NoMatchingLabel)?;

        let fields =
            codec::decode(msg.config, word).map_err(|cause| ReceiveError::Decode { cause })?;

        let now = clock.now_ms();
        let slot = &mut msg.slot;
        slot.raw_word = fields.raw_word;
        slot.sm = fields.sm;
        slot.sdi = fields.sdi;
        slot.eng_float = fields.eng_float;
        slot.eng_int = fields.eng_int;
        slot.discrete_bits = fields.discrete_bits;
        slot.is_not_babbling =
            now.wrapping_sub(slot.last_good_ms) >= msg.config.min_tx_interval_ms as u32;
        slot.last_good_ms = now;
        Ok(())
    }

    /// Copies out the slot for a label with freshness evaluated against the
    /// current clock.
    pub fn get_latest_label_data(&self, clock: &impl Clock, label: ArincLabel) -> Option<RxSlot> {
        let msg = self.msgs.iter().find(|m| m.config.label == label)?;
        let mut out = msg.slot;
        out.is_fresh = clock.now_ms().wrapping_sub(msg.slot.last_good_ms)
            <= msg.config.max_tx_interval_ms as u32;
        Some(out)
    }

    /// Returns the latest raw word for an octal label, but only when the
    /// slot exists, is fresh, and is not babbling.
    pub fn get_latest_word(&self, clock: &impl Clock, octal_label: u16) -> Option<u32> {
        let label = ArincLabel::try_from_octal(octal_label)?;
        let data = self.get_latest_label_data(clock, label)?;
        if data.is_fresh && data.is_not_babbling {
            Some(data.raw_word)
        } else {
            None
        }
    }

    /// Empties the second receiver FIFO of a transceiver into this group.
    ///
    /// Words flagged by the hardware parity check are discarded. Any
    /// successfully processed word resets the bus-failure counter.
    pub fn drain_rx2(&mut self, clock: &impl Clock, txvr: &mut impl Transceiver) {
        let mut words_processed = 0;
        while txvr.data_ready_rx2() && words_processed < MAX_DRAIN_WORDS {
            let word = txvr.read_rx2();
            if word & PARITY_ERROR_BIT == 0 && self.process_received(clock, word).is_ok() {
                self.current_counts = 0;
            }
            words_processed += 1;
        }
    }

    /// Resets the bus-failure counter; called when traffic arrives through
    /// a path other than [`drain_rx2`].
    pub fn note_bus_activity(&mut self) {
        self.current_counts = 0;
    }

    /// Advances the bus-failure counter one tick and reports the verdict.
    pub fn tick_bus_failure(&mut self) -> bool {
        self.current_counts = self.current_counts.saturating_add(1);
        self.has_bus_failed = self.current_counts >= self.max_bus_failure_counts;
        self.has_bus_failed
    }
}
