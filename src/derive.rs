//! Derived-word calculators.
//!
//! Each calculator reads one or two slots from a receive group, composes a
//! transmit message against the display side's label configuration, and
//! returns the assembled word. Anything stale, babbling or flagged invalid
//! degrades to a failure SSM; the calculators themselves never fail.

use crate::codec::{self, check_bnr_validity, TxMsg};
use crate::config::{IopConfig, LabelConfig};
use crate::filter::{Differentiator, Lowpass, Spool, SpoolStep};
use crate::label::{ArincLabel, BcdSsm, BnrSsm, DiscreteSsm};
use crate::port::Clock;
use crate::receive::{RxGroup, RxSlot};

/// Transmit configurations for the display side, which expects narrower
/// fields than the attitude source provides.
const SLIP_ANGLE_250: LabelConfig = LabelConfig::bnr_bounded(0o250, 12, 0.043_945_3, -180.0, 180.0);
const TURN_RATE_340: LabelConfig = LabelConfig::bnr_bounded(0o340, 13, 0.015_625, -128.0, 128.0);
const MAG_HEADING_320: LabelConfig = LabelConfig::bnr_bounded(0o320, 12, 0.043_945, -180.0, 180.0);
const PITCH_324: LabelConfig = LabelConfig::bnr_bounded(0o324, 13, 0.010_986_328, -90.0, 90.0);
const ROLL_325: LabelConfig = LabelConfig::bnr_bounded(0o325, 12, 0.043_945_313, -180.0, 180.0);
const LAT_ACCEL_332: LabelConfig = LabelConfig::bnr(0o332, 12, 0.000_976_563, 15, 25);
/// Bounds include the one-g offset applied on the way out.
const NORM_ACCEL_333: LabelConfig = LabelConfig::bnr_bounded(0o333, 12, 0.000_976_563, -3.0, 5.0);
const BARO_CORRECTION_235: LabelConfig = LabelConfig::bcd(0o235, 5, 0.001, 0, 0);

/// SDI and SSM bits copied from the attitude source's status word into the
/// synthesized status words.
const STATUS_SDI_SSM_MASK: u32 = 0x6000_0300;
/// Failure SSM pattern ORed into a status word when its inputs are bad.
const DISC_SSM_FAIL: u32 = 0x6000_0000;
/// Magnetometer failure flag in the received status word 271.
const MSU_FAIL_MASK: u32 = 0x400;
/// Magnetometer calibration flag in the received status word 270.
const MSU_CALIBRATING_MASK: u32 = 0x400;

const STATUS_272_BASE: u32 = 0x0000_005D;
const STATUS_272_ADC_TIMEOUT: u32 = 1 << 25;
const STATUS_272_MSU_FAIL: u32 = 0xC00;

const STATUS_274_BASE: u32 = 0x0000_003D;
const STATUS_274_MSU_FAIL: u32 = 0x1000_0000;
const STATUS_274_MSU_CALIBRATING: u32 = 0x800;
const STATUS_274_ADC_TIMEOUT: u32 = 0x1000;

const STATUS_275_BASE: u32 = 0x0000_40BD;
const STATUS_275_MSU_FAIL: u32 = 0x40_0000;
const STATUS_275_FPA_VALID: u32 = 0x200_0000;
const STATUS_275_FPA_INVALID: u32 = 0x300_0000;

fn fetch(group: &RxGroup<'_>, clock: &impl Clock, octal: u16) -> Option<RxSlot> {
    group.get_latest_label_data(clock, ArincLabel::from_octal(octal))
}

/// Fresh, not babbling.
fn is_live(slot: &Option<RxSlot>) -> bool {
    matches!(slot, Some(s) if s.is_fresh && s.is_not_babbling)
}

/// Fresh, not babbling, and carrying a normal-operation BNR SSM.
fn is_bnr_normal(slot: &Option<RxSlot>) -> bool {
    matches!(slot, Some(s) if s.is_fresh
        && s.is_not_babbling
        && BnrSsm::from_bits(s.sm) == BnrSsm::NormalOperation)
}

/// Fresh, not babbling, and carrying a normal-operation discrete SSM.
fn is_discrete_normal(slot: &Option<RxSlot>) -> bool {
    matches!(slot, Some(s) if s.is_fresh
        && s.is_not_babbling
        && DiscreteSsm::from_bits(s.sm) == DiscreteSsm::NormalOperation)
}

fn assemble_bnr(config: &LabelConfig, sm: BnrSsm, sdi: u8, eng_value: f32) -> u32 {
    let tx = TxMsg {
        config,
        sm: sm.bits(),
        sdi,
        eng_value,
        discrete_bits: 0,
    };
    codec::encode_bnr(&tx).map_or(0, |encoded| encoded.word)
}

/// Filter state owned by the stateful calculators.
#[derive(Debug)]
pub struct Calculators {
    heading_diff: Differentiator,
    heading_spool: Spool,
    az_filter: Lowpass,
    az_spool: Spool,
}

impl Calculators {
    pub fn new(config: &IopConfig) -> Self {
        Calculators {
            heading_diff: Differentiator::new(config.differentiator),
            heading_spool: Spool::new(),
            az_filter: Lowpass::new(config.lowpass),
            az_spool: Spool::new(),
        }
    }

    /// Turn rate: the rate-limited derivative of magnetic heading.
    ///
    /// The differentiator spools over the warm-up window; until it settles
    /// the word carries a failure SSM. An invalid heading restarts the
    /// spool and holds the last computed rate.
    pub fn turn_rate(&mut self, ahrs: &RxGroup<'_>, clock: &impl Clock) -> u32 {
        let heading = fetch(ahrs, clock, 0o320);
        let sdi = heading.map_or(0, |s| s.sdi);

        let (rate_dps, sm) = if is_bnr_normal(&heading) {
            let eng = heading.map_or(0.0, |s| s.eng_float);
            match self.heading_spool.advance() {
                SpoolStep::Preload => {
                    self.heading_diff.reset();
                    self.heading_diff.preload(eng);
                    (0.0, BnrSsm::FailureWarning)
                }
                SpoolStep::Spooling => {
                    (self.heading_diff.step(eng), BnrSsm::FailureWarning)
                }
                SpoolStep::Settled => {
                    let rate = self.heading_diff.step(eng);
                    (rate, check_bnr_validity(rate, &TURN_RATE_340))
                }
            }
        } else {
            self.heading_spool.invalidate();
            (self.heading_diff.last_output(), BnrSsm::FailureWarning)
        };

        assemble_bnr(&TURN_RATE_340, sm, sdi, rate_dps)
    }

    /// Slip angle: `atan2(-aY, filtered(aZ) + 1)` in degrees.
    ///
    /// The normal-acceleration filter spools on aZ alone; lateral
    /// acceleration must also be valid for the output to be trusted, but an
    /// invalid aY does not disturb the spool.
    pub fn slip_angle(&mut self, ahrs: &RxGroup<'_>, clock: &impl Clock) -> u32 {
        let ay = fetch(ahrs, clock, 0o332);
        let az = fetch(ahrs, clock, 0o333);
        let sdi = az.map_or(0, |s| s.sdi);
        let ay_eng = ay.map_or(0.0, |s| s.eng_float);

        let (slip_deg, mut sm) = if is_bnr_normal(&az) {
            let az_eng = az.map_or(0.0, |s| s.eng_float);
            match self.az_spool.advance() {
                SpoolStep::Preload => {
                    self.az_filter.reset();
                    self.az_filter.preload(az_eng);
                    (0.0, BnrSsm::FailureWarning)
                }
                SpoolStep::Spooling => {
                    let filtered = self.az_filter.filter(az_eng);
                    let slip = libm::atan2f(-ay_eng, filtered + 1.0).to_degrees();
                    (slip, BnrSsm::FailureWarning)
                }
                SpoolStep::Settled => {
                    let filtered = self.az_filter.filter(az_eng);
                    let slip = libm::atan2f(-ay_eng, filtered + 1.0).to_degrees();
                    (slip, check_bnr_validity(slip, &SLIP_ANGLE_250))
                }
            }
        } else {
            self.az_spool.invalidate();
            (0.0, BnrSsm::FailureWarning)
        };

        // an invalid aY fails the word but leaves the aZ spool running
        if !is_bnr_normal(&ay) {
            sm = BnrSsm::FailureWarning;
        }

        assemble_bnr(&SLIP_ANGLE_250, sm, sdi, slip_deg)
    }
}

/// Re-scales magnetic heading to the display's narrower field. A reported
/// magnetometer failure in status word 271 forces a failure SSM.
pub fn new_mag_heading(ahrs: &RxGroup<'_>, clock: &impl Clock) -> u32 {
    let heading = fetch(ahrs, clock, 0o320);
    let status = fetch(ahrs, clock, 0o271);

    let sm = if is_live(&heading) && is_discrete_normal(&status) {
        let msu_failed = status.map_or(false, |s| s.raw_word & MSU_FAIL_MASK != 0);
        if msu_failed {
            BnrSsm::FailureWarning
        } else {
            BnrSsm::from_bits(heading.map_or(0, |s| s.sm))
        }
    } else {
        BnrSsm::FailureWarning
    };

    assemble_bnr(
        &MAG_HEADING_320,
        sm,
        heading.map_or(0, |s| s.sdi),
        heading.map_or(0.0, |s| s.eng_float),
    )
}

/// Re-scales pitch angle, inheriting the received SSM.
pub fn new_pitch(ahrs: &RxGroup<'_>, clock: &impl Clock) -> u32 {
    let pitch = fetch(ahrs, clock, 0o324);
    let sm = if is_live(&pitch) {
        BnrSsm::from_bits(pitch.map_or(0, |s| s.sm))
    } else {
        BnrSsm::FailureWarning
    };
    assemble_bnr(
        &PITCH_324,
        sm,
        pitch.map_or(0, |s| s.sdi),
        pitch.map_or(0.0, |s| s.eng_float),
    )
}

/// Re-scales roll angle, inheriting the received SSM.
pub fn new_roll(ahrs: &RxGroup<'_>, clock: &impl Clock) -> u32 {
    let roll = fetch(ahrs, clock, 0o325);
    let sm = if is_live(&roll) {
        BnrSsm::from_bits(roll.map_or(0, |s| s.sm))
    } else {
        BnrSsm::FailureWarning
    };
    assemble_bnr(
        &ROLL_325,
        sm,
        roll.map_or(0, |s| s.sdi),
        roll.map_or(0.0, |s| s.eng_float),
    )
}

/// Body lateral acceleration with the polarity the display expects.
pub fn body_lat_accel(ahrs: &RxGroup<'_>, clock: &impl Clock) -> u32 {
    let lat = fetch(ahrs, clock, 0o332);
    let sm = if is_live(&lat) {
        BnrSsm::from_bits(lat.map_or(0, |s| s.sm))
    } else {
        BnrSsm::FailureWarning
    };
    assemble_bnr(
        &LAT_ACCEL_332,
        sm,
        lat.map_or(0, |s| s.sdi),
        -lat.map_or(0.0, |s| s.eng_float),
    )
}

/// Body normal acceleration offset by one g and re-validated against the
/// display's range.
pub fn normal_accel(ahrs: &RxGroup<'_>, clock: &impl Clock) -> u32 {
    let norm = fetch(ahrs, clock, 0o333);
    let offset_eng = norm.map_or(0.0, |s| s.eng_float) + 1.0;

    let sm = if is_live(&norm) {
        let received = BnrSsm::from_bits(norm.map_or(0, |s| s.sm));
        if received == BnrSsm::NormalOperation {
            check_bnr_validity(offset_eng, &NORM_ACCEL_333)
        } else {
            received
        }
    } else {
        BnrSsm::FailureWarning
    };

    assemble_bnr(&NORM_ACCEL_333, sm, norm.map_or(0, |s| s.sdi), offset_eng)
}

/// Barometric correction pass-through. Anything but a clean positive
/// reading degrades to no-computed-data with zeroed digits.
pub fn baro_correction(pfd: &RxGroup<'_>, clock: &impl Clock) -> u32 {
    let baro = fetch(pfd, clock, 0o235);

    let passthrough = matches!(&baro, Some(s) if s.is_fresh
        && s.is_not_babbling
        && BcdSsm::from_bits(s.sm) == BcdSsm::Plus);

    let tx = if passthrough {
        let s = baro.unwrap_or_default();
        TxMsg {
            config: &BARO_CORRECTION_235,
            sm: BcdSsm::Plus.bits(),
            sdi: s.sdi,
            eng_value: s.eng_float,
            discrete_bits: 0,
        }
    } else {
        TxMsg {
            config: &BARO_CORRECTION_235,
            sm: BcdSsm::NoComputedData.bits(),
            sdi: 0,
            eng_value: 0.0,
            discrete_bits: 0,
        }
    };

    codec::encode_bcd(&tx).map_or(0, |encoded| encoded.word)
}

/// AHRS status word 272: mirrors 271's SDI and SSM, reports the air-data
/// timeout on bit 25 and a magnetometer failure on bits 10 and 11.
pub fn ahrs_status_272(ahrs: &RxGroup<'_>, clock: &impl Clock, adc_timeout: bool) -> u32 {
    let status = fetch(ahrs, clock, 0o271);
    let mut word = STATUS_272_BASE;

    if is_discrete_normal(&status) {
        let raw = status.map_or(0, |s| s.raw_word);
        word |= raw & STATUS_SDI_SSM_MASK;
        if adc_timeout {
            word |= STATUS_272_ADC_TIMEOUT;
        }
        if raw & MSU_FAIL_MASK != 0 {
            word |= STATUS_272_MSU_FAIL;
        }
    } else {
        word |= DISC_SSM_FAIL;
    }
    word
}

/// AHRS status word 274: magnetometer failure on bit 28, calibration in
/// progress on bit 11, air-data timeout on bit 12.
pub fn ahrs_status_274(ahrs: &RxGroup<'_>, clock: &impl Clock, adc_timeout: bool) -> u32 {
    let status = fetch(ahrs, clock, 0o271);
    let cal = fetch(ahrs, clock, 0o270);
    let mut word = STATUS_274_BASE;

    if is_discrete_normal(&status) && is_discrete_normal(&cal) {
        let raw = status.map_or(0, |s| s.raw_word);
        word |= raw & STATUS_SDI_SSM_MASK;
        if raw & MSU_FAIL_MASK != 0 {
            word |= STATUS_274_MSU_FAIL;
        }
        if cal.map_or(0, |s| s.raw_word) & MSU_CALIBRATING_MASK != 0 {
            word |= STATUS_274_MSU_CALIBRATING;
        }
        if adc_timeout {
            word |= STATUS_274_ADC_TIMEOUT;
        }
    } else {
        word |= DISC_SSM_FAIL;
    }
    word
}

/// AHRS status word 275: magnetometer failure on bit 23; bit 25 reports
/// whether flight-path acceleration is arriving with a healthy SSM.
pub fn ahrs_status_275(ahrs: &RxGroup<'_>, clock: &impl Clock) -> u32 {
    let status = fetch(ahrs, clock, 0o271);
    let fpa = fetch(ahrs, clock, 0o323);
    let mut word = STATUS_275_BASE;

    if is_discrete_normal(&status) && is_live(&fpa) {
        let raw = status.map_or(0, |s| s.raw_word);
        word |= raw & STATUS_SDI_SSM_MASK;
        if raw & MSU_FAIL_MASK != 0 {
            word |= STATUS_275_MSU_FAIL;
        }
        let fpa_normal =
            BnrSsm::from_bits(fpa.map_or(0, |s| s.sm)) == BnrSsm::NormalOperation;
        word |= if fpa_normal {
            STATUS_275_FPA_VALID
        } else {
            STATUS_275_FPA_INVALID
        };
    } else {
        word |= DISC_SSM_FAIL;
    }
    word
}
