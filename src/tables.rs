//! Receive label tables for the three sources the unit listens to.
//!
//! Bus-failure limits are roughly 2.5 times each source's nominal receive
//! interval, counted in 10 ms scheduler ticks.

use crate::config::LabelConfig;
use crate::receive::{GroupError, RxGroup};

/// Air-data words, delivered over the RS-422 link and mirrored here as
/// ARINC words.
pub static ADC_RX_CONFIGS: [LabelConfig; 20] = [
    // Airspeed Rate
    LabelConfig::bnr(0o200, 14, 0.003_906_25, 30, 65),
    // Pressure Altitude
    LabelConfig::bnr(0o203, 17, 1.0, 30, 65),
    // Baro-Corrected Altitude
    LabelConfig::bnr(0o204, 17, 1.0, 30, 65),
    // Mach Number
    LabelConfig::bnr(0o205, 16, 0.000_062_5, 30, 65),
    // Equivalent Airspeed
    LabelConfig::bnr(0o206, 14, 0.0625, 30, 65),
    // True Airspeed
    LabelConfig::bnr(0o210, 15, 0.0625, 30, 65),
    // Total Air Temperature
    LabelConfig::bnr(0o211, 12, 0.125, 30, 65),
    // Altitude Rate
    LabelConfig::bnr(0o212, 11, 16.0, 30, 65),
    // Static Air Temperature
    LabelConfig::bnr(0o213, 11, 0.25, 30, 65),
    // Corrected Impact Pressure
    LabelConfig::bnr(0o215, 14, 0.031_25, 30, 65),
    // Angle of Attack
    LabelConfig::bnr(0o221, 12, 0.043_995, 30, 65),
    // Delta P Alpha
    LabelConfig::bnr(0o222, 18, 0.000_061_035, 30, 65),
    // Uncorrected Impact Pressure
    LabelConfig::bnr(0o223, 14, 0.031_25, 30, 65),
    // AOA Rate
    LabelConfig::bnr(0o224, 13, 0.015_625, 30, 65),
    // Indicated OAT
    LabelConfig::bnr(0o231, 12, 0.125, 30, 65),
    // Baro Correction
    LabelConfig::bcd(0o235, 5, 0.001, 30, 65),
    // Total Pressure
    LabelConfig::bnr(0o242, 16, 0.031_25, 30, 65),
    // Static Pressure
    LabelConfig::bnr(0o246, 16, 0.031_25, 30, 65),
    // ADC Status
    LabelConfig::discrete(0o271, 18, 30, 65),
    // Equipment Identification
    LabelConfig::discrete(0o377, 10, 30, 65),
];

/// Attitude and heading words received from the AHRS transceiver.
pub static AHRS_RX_CONFIGS: [LabelConfig; 12] = [
    // MSU Calibration Status
    LabelConfig::discrete(0o270, 4, 450, 550),
    // AHRS Status
    LabelConfig::discrete(0o271, 1, 450, 550),
    // Magnetic Heading
    LabelConfig::bnr(0o320, 15, 0.0055, 15, 25),
    // Flight Path Acceleration
    LabelConfig::bnr(0o323, 12, 0.001, 15, 25),
    // Pitch Angle
    LabelConfig::bnr(0o324, 14, 0.010_986, 15, 25),
    // Roll Angle
    LabelConfig::bnr(0o325, 14, 0.010_986, 15, 25),
    // Body Pitch Rate
    LabelConfig::bnr(0o326, 13, 0.015_625, 15, 25),
    // Body Roll Rate
    LabelConfig::bnr(0o327, 13, 0.015_625, 15, 25),
    // Body Yaw Rate
    LabelConfig::bnr(0o330, 13, 0.015_625, 15, 25),
    // Body Longitudinal Acceleration
    LabelConfig::bnr(0o331, 12, 0.000_976_563, 15, 25),
    // Body Lateral Acceleration
    LabelConfig::bnr(0o332, 12, 0.000_976_563, 15, 25),
    // Body Normal Acceleration
    LabelConfig::bnr(0o333, 12, 0.000_976_563, 15, 25),
];

/// Words received from the primary flight display.
pub static PFD_RX_CONFIGS: [LabelConfig; 4] = [
    // Phase of Flight
    LabelConfig::discrete(0o124, 3, 180, 220),
    // Baro Correction
    LabelConfig::bcd(0o235, 5, 0.001, 40, 60),
    // ADC Status loop-around
    LabelConfig::discrete(0o270, 18, 45, 55),
    // AHRS Status loop-around
    LabelConfig::discrete(0o271, 18, 45, 55),
];

/// 150 ms of silence fails the air-data link.
pub const ADC_MAX_BUS_FAILURE_COUNTS: u32 = 30;
/// 50 ms of silence fails the AHRS bus.
pub const AHRS_MAX_BUS_FAILURE_COUNTS: u32 = 10;
/// 125 ms of silence fails the PFD bus.
pub const PFD_MAX_BUS_FAILURE_COUNTS: u32 = 25;

pub fn adc_group() -> Result<RxGroup<'static>, GroupError> {
    RxGroup::new(&ADC_RX_CONFIGS, ADC_MAX_BUS_FAILURE_COUNTS)
}

pub fn ahrs_group() -> Result<RxGroup<'static>, GroupError> {
    RxGroup::new(&AHRS_RX_CONFIGS, AHRS_MAX_BUS_FAILURE_COUNTS)
}

pub fn pfd_group() -> Result<RxGroup<'static>, GroupError> {
    RxGroup::new(&PFD_RX_CONFIGS, PFD_MAX_BUS_FAILURE_COUNTS)
}
