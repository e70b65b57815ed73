//! Encoding and decoding of 32-bit ARINC 429 words.
//!
//! Bit 32 carries parity and is owned by the hardware on both paths; it is
//! never set here and arrives as a receiver-side error flag. Data fields are
//! right-justified against bit 29 for BNR and grow upward from bit 11 for
//! BCD, with discrete payloads shifted fully left.

use crate::config::{LabelConfig, MessageType};
use crate::label::{self, BnrSsm};
use snafu::Snafu;

/// Highest shift applied to a BNR data field (one significant bit).
const BNR_MAX_FIELD_SHIFT: u8 = 28;
/// Discrete payloads pad on the LSB side up to this shift.
const DISCRETE_MAX_FIELD_SHIFT: u8 = 28;
/// BCD and BNR discrete bits sit directly above the SDI field.
const DISCRETE_BITS_SHIFT: u32 = 10;
/// BCD data field placement.
const BCD_FIELD_SHIFT: u8 = 10;
const BCD_BITS_PER_DIGIT: u8 = 4;
const BCD_MAX_DIGIT: u32 = 9;
/// Bits available to the most significant BCD character.
const BCD_MSC_BITS: u8 = 3;

/// Data field masks; wider BNR fields consume the SDI bits.
const BNR_FIELD_MASK_UPTO_18: u32 = 0x1FFF_FC00;
const BNR_FIELD_MASK_19: u32 = 0x1FFF_FE00;
const BNR_FIELD_MASK_20: u32 = 0x1FFF_FF00;
const BCD_FIELD_MASK: u32 = 0x1FFF_FC00;

/// Decode failures. The offending word is dropped; receive state is never
/// touched on any of these.
#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(context(suffix(false)))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum DecodeError {
    /// The label configuration violates a structural invariant.
    #[snafu(display("invalid label configuration"))]
    InvalidConfig,
    /// The data field contains a malformed digit.
    #[snafu(display("malformed BCD digit in data field"))]
    InvalidMessage,
}

/// Encode failures. Clipping is not an error; see [`EncodedWord::clipped`].
#[derive(Debug, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum EncodeError {
    /// The label configuration violates a structural invariant.
    #[snafu(display("invalid label configuration"))]
    InvalidConfig,
    /// The engineering value cannot be represented at all, e.g. a negative
    /// BCD magnitude whose sign belongs in the SSM.
    #[snafu(display("engineering value not representable"))]
    InvalidData,
}

/// Fields recovered from one received word.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxFields {
    pub raw_word: u32,
    /// Sign/status matrix bits. For BCD words this carries the sign.
    pub sm: u8,
    /// Source/destination identifier, zeroed when the width consumes it.
    pub sdi: u8,
    pub eng_float: f32,
    /// Engineering value rounded half away from zero, clamped to `i32`.
    pub eng_int: i32,
    pub discrete_bits: u32,
}

/// A word to transmit, described in engineering terms.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxMsg<'a> {
    pub config: &'a LabelConfig,
    pub sm: u8,
    pub sdi: u8,
    pub eng_value: f32,
    pub discrete_bits: u32,
}

/// An assembled wire word plus the clipping outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncodedWord {
    pub word: u32,
    /// True when the engineering value exceeded the field and was clipped
    /// to the extreme representable value. The word is still transmittable.
    pub clipped: bool,
}

/// Rounds half away from zero and clamps into `i32`, via a widened
/// intermediate so the clamp happens before any narrowing.
fn round_clamp_i32(value: f64) -> i32 {
    let rounded = if value < 0.0 { value - 0.5 } else { value + 0.5 };
    rounded.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

fn mask_low_bits(width: u8) -> u32 {
    u32::MAX >> (32 - width as u32)
}

/// Converts an engineering value to a right-aligned BNR data field.
///
/// Values beyond the field are clipped to the signed extreme, never wrapped.
pub fn bnr_eng_to_raw(
    num_sig_bits: u8,
    resolution: f32,
    eng: f32,
) -> Result<(u32, bool), EncodeError> {
    if num_sig_bits < 1 || num_sig_bits > LabelConfig::BNR_MAX_SIG_BITS {
        return Err(EncodeError::InvalidConfig);
    }

    let scaled = if resolution != 0.0 {
        eng as f64 / resolution as f64
    } else {
        0.0
    };
    let mut raw = round_clamp_i32(scaled) as u32;

    // Every bit at and above the sign position must agree with the sign,
    // otherwise the value does not fit in the field.
    let overflow_mask = u32::MAX << num_sig_bits;
    let mut clipped = false;
    if raw & 0x8000_0000 != 0 {
        if raw & overflow_mask != overflow_mask {
            raw = 1 << num_sig_bits; // sign bit only: minimum field value
            clipped = true;
        }
    } else if raw & overflow_mask != 0 {
        raw = mask_low_bits(num_sig_bits); // maximum field value
        clipped = true;
    }

    Ok((raw, clipped))
}

/// Converts a right-aligned BNR data field (sign bit included) back to
/// engineering units, sign-extending at the configured width.
pub fn bnr_raw_to_eng(num_sig_bits: u8, resolution: f32, raw: u32) -> Result<f32, DecodeError> {
    if num_sig_bits < 1 || num_sig_bits > LabelConfig::BNR_MAX_SIG_BITS {
        return Err(DecodeError::InvalidConfig);
    }

    let mut extended = raw;
    if raw & (1 << num_sig_bits) != 0 {
        extended |= u32::MAX << num_sig_bits;
    }
    Ok(extended as i32 as f32 * resolution)
}

/// Converts packed BCD digits to engineering units. Fails on any digit
/// above 9 or on data wider than the configured digit count.
pub fn bcd_raw_to_eng(
    num_sig_digits: u8,
    resolution: f32,
    raw: u32,
) -> Result<f32, DecodeError> {
    if num_sig_digits < 1 || num_sig_digits > LabelConfig::BCD_MAX_SIG_DIGITS {
        return Err(DecodeError::InvalidConfig);
    }

    let mut remaining = raw;
    let mut value: u32 = 0;
    let mut weight: u32 = 1;
    let mut count = 0;
    while remaining > 0 && count < num_sig_digits {
        let digit = remaining & 0xF;
        if digit > BCD_MAX_DIGIT {
            return Err(DecodeError::InvalidMessage);
        }
        value += weight * digit;
        remaining >>= BCD_BITS_PER_DIGIT;
        weight *= 10;
        count += 1;
    }
    if remaining != 0 {
        return Err(DecodeError::InvalidMessage);
    }
    Ok(value as f32 * resolution)
}

/// Converts a non-negative engineering value to packed BCD. Oversize values
/// clip to the maximum pattern the digit count and MSC width allow.
pub fn bcd_eng_to_raw(
    num_sig_digits: u8,
    resolution: f32,
    num_bits_msc: u8,
    eng: f32,
) -> Result<(u32, bool), EncodeError> {
    if num_sig_digits < 1
        || num_sig_digits > LabelConfig::BCD_MAX_SIG_DIGITS
        || num_bits_msc < 1
        || num_bits_msc > BCD_BITS_PER_DIGIT
    {
        return Err(EncodeError::InvalidConfig);
    }

    let scaled = if resolution != 0.0 { eng / resolution } else { 0.0 };
    let mut remaining = (scaled as f64 + 0.5) as u32;
    let msc_limit = mask_low_bits(num_bits_msc);

    let mut packed: u32 = 0;
    let mut count = 0u8;
    while remaining > 0 && count < num_sig_digits {
        let digit = remaining % 10;
        if count + 1 == num_sig_digits && digit > msc_limit {
            break; // would spill into bits the MSC does not own
        }
        packed += digit << (BCD_BITS_PER_DIGIT * count);
        remaining /= 10;
        count += 1;
    }

    let clipped = remaining != 0;
    if clipped {
        packed = 0;
        for pos in 0..num_sig_digits {
            let digit = if pos + 1 == num_sig_digits {
                msc_limit
            } else {
                BCD_MAX_DIGIT
            };
            packed += digit << (BCD_BITS_PER_DIGIT * pos);
        }
    }

    Ok((packed, clipped))
}

fn decode_bnr(cfg: &LabelConfig, word: u32) -> Result<RxFields, DecodeError> {
    if cfg.num_sig_bits < 1 || cfg.num_sig_bits > LabelConfig::BNR_MAX_SIG_BITS {
        return Err(DecodeError::InvalidConfig);
    }

    let raw = (word >> (BNR_MAX_FIELD_SHIFT - cfg.num_sig_bits) as u32)
        & mask_low_bits(cfg.num_sig_bits + 1); // sign bit rides along
    let eng = bnr_raw_to_eng(cfg.num_sig_bits, cfg.resolution, raw)?;

    let discrete_bits = if cfg.num_discrete_bits > 0 {
        (word >> DISCRETE_BITS_SHIFT) & mask_low_bits(cfg.num_discrete_bits)
    } else {
        0
    };

    Ok(RxFields {
        raw_word: word,
        sm: label::extract_ssm(word),
        // SDI bits are data above 18 significant bits
        sdi: if cfg.num_sig_bits <= LabelConfig::BNR_SDI_AS_DATA_ABOVE {
            label::extract_sdi(word)
        } else {
            0
        },
        eng_float: eng,
        eng_int: round_clamp_i32(eng as f64),
        discrete_bits,
    })
}

fn decode_bcd(cfg: &LabelConfig, word: u32) -> Result<RxFields, DecodeError> {
    if cfg.num_sig_digits < 1
        || cfg.num_sig_digits > LabelConfig::BCD_MAX_SIG_DIGITS
        || (cfg.num_sig_digits as u16 * 4 - 1) + cfg.num_discrete_bits as u16
            > LabelConfig::DATA_FIELD_BITS as u16
    {
        return Err(DecodeError::InvalidMessage);
    }

    let pad = BCD_BITS_PER_DIGIT * (LabelConfig::BCD_MAX_SIG_DIGITS - cfg.num_sig_digits);
    let raw = (word & BCD_FIELD_MASK) >> (BCD_FIELD_SHIFT + pad) as u32;
    let eng = bcd_raw_to_eng(cfg.num_sig_digits, cfg.resolution, raw)?;

    let discrete_bits = if cfg.num_discrete_bits > 0 {
        (word >> DISCRETE_BITS_SHIFT) & mask_low_bits(cfg.num_discrete_bits)
    } else {
        0
    };

    Ok(RxFields {
        raw_word: word,
        sm: label::extract_ssm(word),
        sdi: label::extract_sdi(word),
        eng_float: eng,
        eng_int: round_clamp_i32(eng as f64),
        discrete_bits,
    })
}

fn decode_discrete(cfg: &LabelConfig, word: u32) -> Result<RxFields, DecodeError> {
    if cfg.num_discrete_bits < 1 || cfg.num_discrete_bits > LabelConfig::DISCRETE_MAX_BITS {
        return Err(DecodeError::InvalidConfig);
    }

    Ok(RxFields {
        raw_word: word,
        sm: label::extract_ssm(word),
        sdi: label::extract_sdi(word),
        eng_float: 0.0,
        eng_int: 0,
        discrete_bits: (word >> DISCRETE_BITS_SHIFT) & mask_low_bits(cfg.num_discrete_bits),
    })
}

/// Decodes one received word against its label configuration.
pub fn decode(cfg: &LabelConfig, word: u32) -> Result<RxFields, DecodeError> {
    match cfg.msg_type {
        MessageType::Bnr => decode_bnr(cfg, word),
        MessageType::Bcd => decode_bcd(cfg, word),
        MessageType::Discrete => decode_discrete(cfg, word),
    }
}

/// Assembles a BNR word.
pub fn encode_bnr(tx: &TxMsg<'_>) -> Result<EncodedWord, EncodeError> {
    let cfg = tx.config;
    let (raw, clipped) = bnr_eng_to_raw(cfg.num_sig_bits, cfg.resolution, tx.eng_value)?;

    let mut field = raw << (BNR_MAX_FIELD_SHIFT - cfg.num_sig_bits) as u32;
    field &= match cfg.num_sig_bits {
        20 => BNR_FIELD_MASK_20,
        19 => BNR_FIELD_MASK_19,
        _ => BNR_FIELD_MASK_UPTO_18,
    };

    let mut word = cfg.label.wire() as u32;
    word |= field;
    if cfg.num_discrete_bits > 0 {
        word |= (tx.discrete_bits & mask_low_bits(cfg.num_discrete_bits)) << DISCRETE_BITS_SHIFT;
    }
    if cfg.num_sig_bits <= LabelConfig::BNR_SDI_AS_DATA_ABOVE {
        word |= ((tx.sdi as u32) & label::SDI_MASK) << label::SDI_SHIFT;
    }
    word |= ((tx.sm as u32) & label::SSM_MASK) << label::SSM_SHIFT;

    Ok(EncodedWord { word, clipped })
}

/// Assembles a BCD word. The engineering value must be non-negative; its
/// sign belongs in the SSM.
pub fn encode_bcd(tx: &TxMsg<'_>) -> Result<EncodedWord, EncodeError> {
    let cfg = tx.config;
    if cfg.num_sig_digits < 1
        || cfg.num_sig_digits > LabelConfig::BCD_MAX_SIG_DIGITS
        || (cfg.num_sig_digits as u16 * 4 - 1) + cfg.num_discrete_bits as u16
            > LabelConfig::DATA_FIELD_BITS as u16
    {
        return Err(EncodeError::InvalidConfig);
    }
    if tx.eng_value < 0.0 {
        return Err(EncodeError::InvalidData);
    }

    let (packed, clipped) =
        bcd_eng_to_raw(cfg.num_sig_digits, cfg.resolution, BCD_MSC_BITS, tx.eng_value)?;

    let pad = BCD_BITS_PER_DIGIT * (LabelConfig::BCD_MAX_SIG_DIGITS - cfg.num_sig_digits);
    let field = (packed << (BCD_FIELD_SHIFT + pad) as u32) & BCD_FIELD_MASK;

    let mut word = cfg.label.wire() as u32;
    word |= field;
    if cfg.num_discrete_bits > 0 {
        word |= (tx.discrete_bits & mask_low_bits(cfg.num_discrete_bits)) << DISCRETE_BITS_SHIFT;
    }
    word |= ((tx.sdi as u32) & label::SDI_MASK) << label::SDI_SHIFT;
    word |= ((tx.sm as u32) & label::SSM_MASK) << label::SSM_SHIFT;

    Ok(EncodedWord { word, clipped })
}

/// Assembles a discrete word; bits pack against the top of the data field.
pub fn encode_discrete(tx: &TxMsg<'_>) -> Result<EncodedWord, EncodeError> {
    let cfg = tx.config;
    if cfg.num_discrete_bits < 1 || cfg.num_discrete_bits > LabelConfig::DISCRETE_MAX_BITS {
        return Err(EncodeError::InvalidConfig);
    }

    let bits = tx.discrete_bits & mask_low_bits(cfg.num_discrete_bits);
    let shift = (DISCRETE_MAX_FIELD_SHIFT - cfg.num_discrete_bits + 1) as u32;

    let mut word = cfg.label.wire() as u32;
    word |= bits << shift;
    word |= ((tx.sdi as u32) & label::SDI_MASK) << label::SDI_SHIFT;
    word |= ((tx.sm as u32) & label::SSM_MASK) << label::SSM_SHIFT;

    Ok(EncodedWord {
        word,
        clipped: false,
    })
}

/// Assembles a word of whichever family the configuration names.
pub fn encode(tx: &TxMsg<'_>) -> Result<EncodedWord, EncodeError> {
    match tx.config.msg_type {
        MessageType::Bnr => encode_bnr(tx),
        MessageType::Bcd => encode_bcd(tx),
        MessageType::Discrete => encode_discrete(tx),
    }
}

/// Transmit-side range check: out-of-bounds engineering data is flagged as
/// failure warning, in-bounds data as normal operation.
pub fn check_bnr_validity(eng: f32, cfg: &LabelConfig) -> BnrSsm {
    let below = cfg.min_valid.map_or(false, |min| eng < min);
    let above = cfg.max_valid.map_or(false, |max| eng > max);
    if below || above {
        BnrSsm::FailureWarning
    } else {
        BnrSsm::NormalOperation
    }
}
