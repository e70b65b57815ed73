//! Label configuration records and the read-only unit configuration block.

use crate::label::ArincLabel;

/// Encoding family of an ARINC 429 word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageType {
    /// Two's-complement binary data.
    Bnr,
    /// Binary coded decimal data, up to five digits, sign in the SSM.
    Bcd,
    /// Bit-field data with no numeric interpretation.
    Discrete,
}

/// Per-label configuration. Built once, immutable afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LabelConfig {
    /// Wire-order label this configuration applies to.
    pub label: ArincLabel,
    pub msg_type: MessageType,
    /// BNR only: significant data bits, 1..=20. Above 18 the SDI bits carry
    /// data and are no longer exposed as SDI.
    pub num_sig_bits: u8,
    /// BCD only: significant digits, 1..=5.
    pub num_sig_digits: u8,
    /// Engineering units per least significant bit or digit.
    pub resolution: f32,
    /// Valid range in engineering units, used for transmit-side SSM checks.
    pub min_valid: Option<f32>,
    pub max_valid: Option<f32>,
    /// Discrete bits in the data field. Mandatory (1..=19) for discrete
    /// words, optional for BNR/BCD where they sit just above the SDI field.
    pub num_discrete_bits: u8,
    /// Contracted transmit interval bounds, milliseconds.
    pub min_tx_interval_ms: u16,
    pub max_tx_interval_ms: u16,
}

impl LabelConfig {
    /// Maximum significant bits in a BNR data field.
    pub const BNR_MAX_SIG_BITS: u8 = 20;
    /// SDI bits carry data above this width.
    pub const BNR_SDI_AS_DATA_ABOVE: u8 = 18;
    /// Maximum significant digits in a BCD data field.
    pub const BCD_MAX_SIG_DIGITS: u8 = 5;
    /// Maximum discrete bits in a discrete word.
    pub const DISCRETE_MAX_BITS: u8 = 19;
    /// Size of the BCD/discrete data field in bits.
    pub const DATA_FIELD_BITS: u8 = 19;

    /// A BNR configuration with no discrete bits and no validity bounds.
    pub const fn bnr(
        octal: u16,
        num_sig_bits: u8,
        resolution: f32,
        min_tx_interval_ms: u16,
        max_tx_interval_ms: u16,
    ) -> Self {
        LabelConfig {
            label: ArincLabel::from_octal(octal),
            msg_type: MessageType::Bnr,
            num_sig_bits,
            num_sig_digits: 0,
            resolution,
            min_valid: None,
            max_valid: None,
            num_discrete_bits: 0,
            min_tx_interval_ms,
            max_tx_interval_ms,
        }
    }

    /// A BNR configuration with a validity range.
    pub const fn bnr_bounded(
        octal: u16,
        num_sig_bits: u8,
        resolution: f32,
        min_valid: f32,
        max_valid: f32,
    ) -> Self {
        LabelConfig {
            label: ArincLabel::from_octal(octal),
            msg_type: MessageType::Bnr,
            num_sig_bits,
            num_sig_digits: 0,
            resolution,
            min_valid: Some(min_valid),
            max_valid: Some(max_valid),
            num_discrete_bits: 0,
            min_tx_interval_ms: 0,
            max_tx_interval_ms: 0,
        }
    }

    /// A standard BCD configuration.
    pub const fn bcd(
        octal: u16,
        num_sig_digits: u8,
        resolution: f32,
        min_tx_interval_ms: u16,
        max_tx_interval_ms: u16,
    ) -> Self {
        LabelConfig {
            label: ArincLabel::from_octal(octal),
            msg_type: MessageType::Bcd,
            num_sig_bits: 0,
            num_sig_digits,
            resolution,
            min_valid: None,
            max_valid: None,
            num_discrete_bits: 0,
            min_tx_interval_ms,
            max_tx_interval_ms,
        }
    }

    /// A discrete configuration.
    pub const fn discrete(
        octal: u16,
        num_discrete_bits: u8,
        min_tx_interval_ms: u16,
        max_tx_interval_ms: u16,
    ) -> Self {
        LabelConfig {
            label: ArincLabel::from_octal(octal),
            msg_type: MessageType::Discrete,
            num_sig_bits: 0,
            num_sig_digits: 0,
            resolution: 0.0,
            min_valid: None,
            max_valid: None,
            num_discrete_bits,
            min_tx_interval_ms,
            max_tx_interval_ms,
        }
    }

    /// Checks the structural invariants a configuration must satisfy before
    /// it may enter a receive group.
    pub fn is_well_formed(&self) -> bool {
        if self.min_tx_interval_ms > self.max_tx_interval_ms {
            return false;
        }
        match self.msg_type {
            MessageType::Bnr => {
                self.num_sig_bits >= 1 && self.num_sig_bits <= Self::BNR_MAX_SIG_BITS
            }
            MessageType::Bcd => {
                self.num_sig_digits >= 1
                    && self.num_sig_digits <= Self::BCD_MAX_SIG_DIGITS
                    && (self.num_sig_digits as u16 * 4 - 1) + self.num_discrete_bits as u16
                        <= Self::DATA_FIELD_BITS as u16
            }
            MessageType::Discrete => {
                self.num_discrete_bits >= 1 && self.num_discrete_bits <= Self::DISCRETE_MAX_BITS
            }
        }
    }
}

/// First-order low-pass filter coefficients.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LowpassConfig {
    pub k1: f32,
    pub k2: f32,
}

/// Rate-limited differentiator parameters.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DifferentiatorConfig {
    pub k1: f32,
    pub sample_rate_hz: f32,
    pub upper_limit: f32,
    pub lower_limit: f32,
    pub upper_delta: f32,
    pub lower_delta: f32,
}

/// Hardware initialization constants applied by the bootstrap sequence.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HardwareConfig {
    /// Control words loaded into the two ARINC transceivers.
    pub txvr_a_ctrl: u16,
    pub txvr_b_ctrl: u16,
    /// System frequency timer setup.
    pub sys_timer_config: u16,
    pub sys_timer_period: u16,
    /// Millisecond timer setup.
    pub ms_timer_config: u16,
    pub ms_timer_period: u32,
    pub ms_timer_scale: u32,
    /// Serial link setup for the air-data computer.
    pub uart_baud_select: u16,
    pub uart_mode: u16,
    /// RAM test patterns.
    pub ram_test_word1: u16,
    pub ram_test_word2: u16,
    /// Program memory CRC generator polynomial key.
    pub crc_key: u32,
}

/// The read-only configuration block supplied to the unit at a fixed
/// address by the build tooling.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IopConfig {
    pub lowpass: LowpassConfig,
    pub differentiator: DifferentiatorConfig,
    pub hardware: HardwareConfig,
}

impl IopConfig {
    /// The shipped configuration values.
    pub const DEFAULT: IopConfig = IopConfig {
        lowpass: LowpassConfig {
            k1: 0.777_767_8,
            k2: 0.222_232_2,
        },
        differentiator: DifferentiatorConfig {
            k1: 0.99,
            sample_rate_hz: 50.0,
            upper_limit: 180.0,
            lower_limit: -180.0,
            upper_delta: 360.0,
            lower_delta: -360.0,
        },
        hardware: HardwareConfig {
            txvr_a_ctrl: 0xA038,
            txvr_b_ctrl: 0x8038,
            sys_timer_config: 0x8010,
            sys_timer_period: 0x47FF,
            ms_timer_config: 0x8038,
            ms_timer_period: 0xFFFF_FFFF,
            ms_timer_scale: 114,
            uart_baud_select: 0x000F,
            uart_mode: 0x8000,
            ram_test_word1: 0xA5A5,
            ram_test_word2: 0x5A5A,
            crc_key: 0x04C1_1DB7,
        },
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bnr_width_bounds() {
        let mut cfg = LabelConfig::bnr(0o320, 15, 0.0055, 15, 25);
        assert!(cfg.is_well_formed());
        cfg.num_sig_bits = 0;
        assert!(!cfg.is_well_formed());
        cfg.num_sig_bits = 21;
        assert!(!cfg.is_well_formed());
        cfg.num_sig_bits = 20;
        assert!(cfg.is_well_formed());
    }

    #[test]
    fn test_bcd_digit_and_discrete_overlap() {
        let mut cfg = LabelConfig::bcd(0o235, 5, 0.001, 40, 60);
        assert!(cfg.is_well_formed());
        // 5 digits occupy the full field, no room for a discrete bit
        cfg.num_discrete_bits = 1;
        assert!(!cfg.is_well_formed());
        // 4 digits leave four bits over
        cfg.num_sig_digits = 4;
        cfg.num_discrete_bits = 4;
        assert!(cfg.is_well_formed());
        cfg.num_discrete_bits = 5;
        assert!(!cfg.is_well_formed());
    }

    #[test]
    fn test_interval_ordering_required() {
        let mut cfg = LabelConfig::discrete(0o271, 18, 30, 65);
        assert!(cfg.is_well_formed());
        cfg.min_tx_interval_ms = 70;
        assert!(!cfg.is_well_formed());
    }

    #[test]
    fn test_discrete_width_bounds() {
        assert!(!LabelConfig::discrete(0o271, 0, 30, 65).is_well_formed());
        assert!(!LabelConfig::discrete(0o271, 20, 30, 65).is_well_formed());
        assert!(LabelConfig::discrete(0o271, 19, 30, 65).is_well_formed());
    }
}
