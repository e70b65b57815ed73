//! # arinc-iop
//!
//! Core of an avionics I/O processor that bridges an attitude/heading
//! reference, a primary flight display and an air-data computer: a
//! bit-exact ARINC 429 codec, receive-side label dispatch with freshness
//! and babble timekeeping, derived-word calculators (turn rate, slip
//! angle, AHRS status words), and the 100 Hz scheduler that drives it all.
//!
//! Hardware stays behind the traits in [`port`]; the crate itself is
//! `no_std`, allocation free, and runs its logic identically on the target
//! and on a host under test.
//!
//! # Usage
//! ```ignore
//! use arinc_iop::{Core, IopConfig, SelfTestReport};
//!
//! let mut core = Core::new(clock, txvr_a, txvr_b, adc_link, discretes,
//!     IopConfig::DEFAULT)?;
//! core.boot(SelfTestReport { ram_test_passed, code_crc_passed }, program_crc);
//!
//! loop {
//!     core.poll(); // drains receivers; runs tick tasks on the 100 Hz flag
//! }
//! ```
//!
//! # Decoding a single word
//! ```
//! use arinc_iop::{codec, LabelConfig};
//!
//! // magnetic heading: 15 significant bits at 0.0055 degrees per count
//! let cfg = LabelConfig::bnr(0o320, 15, 0.0055, 15, 25);
//! let fields = codec::decode(&cfg, 0x6000_800B).unwrap();
//! assert_eq!(fields.sm, 0x3);
//! ```

#![no_std]

pub mod boot;
pub mod codec;
pub mod config;
pub mod derive;
pub mod filter;
pub mod label;
pub mod port;
pub mod receive;
pub mod sched;
pub mod tables;
pub mod version;

#[cfg(test)]
pub(crate) mod testutil;

pub use boot::{BootFaults, SelfTestReport};
pub use codec::{DecodeError, EncodeError, EncodedWord, RxFields, TxMsg};
pub use config::{IopConfig, LabelConfig, MessageType};
pub use label::{ArincLabel, BcdSsm, BnrSsm, DiscreteSsm};
pub use port::{AdcCommand, AdcFrame, AdcLink, Channel, Clock, Discretes, Transceiver};
pub use receive::{GroupError, ReceiveError, RxGroup, RxSlot};
pub use sched::Core;
