//! The 100 Hz cooperative scheduler and the state it owns.
//!
//! One [`Core`] value holds the three receive groups, the filter states,
//! the version table and the tick counters; nothing lives in module
//! statics. The hardware layer constructs it, runs `boot` once, then calls
//! `poll` forever. Receive drains happen before any transmission inside a
//! tick, and the AHRS FIFO is drained again between transmit blocks so it
//! cannot overflow while the slower tasks run.

use crate::boot::{self, BootFaults, SelfTestReport};
use crate::config::IopConfig;
use crate::derive::{self, Calculators};
use crate::label::{self, ArincLabel, BcdSsm};
use crate::port::{AdcCommand, AdcFrame, AdcLink, Channel, Clock, Discretes, Transceiver};
use crate::receive::{GroupError, RxGroup};
use crate::tables;
use crate::version::VersionTable;

/// Fixed words in the serial reply to the air-data computer. No GNSS
/// source exists in this installation, so altitude and figure-of-merit go
/// out as no-computed-data.
const GNSS_ALT_NCD: u32 = 0x2000_007C;
const VDOP_NCD: u32 = 0x0000_007A;
const VFOM_NCD: u32 = 0x2000_007A;
/// Substitute status word when the display's 271 loop-around is missing.
const STATUS_271_FAILURE: u32 = 0x6000_009D;

/// ARINC words carried in each serial reply.
const ADC_REPLY_WORDS: usize = 5;
/// Reply payload: SDI byte plus the packed words.
const ADC_REPLY_PAYLOAD_LEN: usize = 1 + 4 * ADC_REPLY_WORDS;

/// Air-data pass-through labels, split so the AHRS FIFO gets a drain
/// between the two batches.
const AIR_DATA_BATCH_1: [u16; 10] =
    [0o200, 0o203, 0o204, 0o205, 0o206, 0o210, 0o211, 0o212, 0o213, 0o215];
const AIR_DATA_BATCH_2: [u16; 10] =
    [0o221, 0o222, 0o223, 0o224, 0o231, 0o235, 0o242, 0o246, 0o271, 0o377];

/// Attitude-rate words forwarded to the display unchanged.
const AHRS_PASSTHROUGH: [u16; 4] = [0o331, 0o326, 0o327, 0o330];
/// Air data echoed back to the attitude source.
const ADC_TO_AHRS: [u16; 3] = [0o206, 0o210, 0o221];

/// Everything the I/O processor owns, wired to its five ports.
pub struct Core<C, TA, TB, L, D>
where
    C: Clock,
    TA: Transceiver,
    TB: Transceiver,
    L: AdcLink,
    D: Discretes,
{
    pub(crate) clock: C,
    pub(crate) txvr_a: TA,
    pub(crate) txvr_b: TB,
    pub(crate) adc_link: L,
    pub(crate) discretes: D,
    config: IopConfig,

    pub(crate) ahrs: RxGroup<'static>,
    pub(crate) pfd: RxGroup<'static>,
    pub(crate) adc: RxGroup<'static>,

    calc: Calculators,
    versions: VersionTable,

    rate_counter: u32,
    boot_faults: BootFaults,
    /// Feeds the external one-shot: pulsed high each healthy tick.
    internal_ok: bool,
    maintenance_requested: bool,

    adc_bus_failed: bool,
    ahrs_bus_failed: bool,
    pfd_bus_failed: bool,
}

impl<C, TA, TB, L, D> Core<C, TA, TB, L, D>
where
    C: Clock,
    TA: Transceiver,
    TB: Transceiver,
    L: AdcLink,
    D: Discretes,
{
    pub fn new(
        clock: C,
        txvr_a: TA,
        txvr_b: TB,
        adc_link: L,
        discretes: D,
        config: IopConfig,
    ) -> Result<Self, GroupError> {
        Ok(Core {
            clock,
            txvr_a,
            txvr_b,
            adc_link,
            discretes,
            config,
            ahrs: tables::ahrs_group()?,
            pfd: tables::pfd_group()?,
            adc: tables::adc_group()?,
            calc: Calculators::new(&config),
            versions: VersionTable::new(),
            rate_counter: 0,
            boot_faults: BootFaults::empty(),
            internal_ok: false,
            maintenance_requested: false,
            adc_bus_failed: false,
            ahrs_bus_failed: false,
            pfd_bus_failed: false,
        })
    }

    /// Startup sequence: built-in tests, strap decode, version gathering
    /// and hardware label filters. Any failure latches a boot fault and
    /// leaves the scheduler idling.
    pub fn boot(&mut self, report: SelfTestReport, program_crc: u32) {
        self.boot_faults = boot::run_built_in_tests(
            &mut self.txvr_a,
            &mut self.txvr_b,
            self.config.hardware.txvr_a_ctrl,
            self.config.hardware.txvr_b_ctrl,
            report,
        );

        match boot::read_strapping(&mut self.discretes, &mut self.clock) {
            Some(strapping) => {
                self.maintenance_requested = boot::is_maintenance_strapping(strapping);
            }
            None => self.maintenance_requested = false,
        }

        if !self.boot_faults.is_empty() {
            self.internal_ok = false;
            return;
        }

        self.versions.load_local_crc(program_crc);
        self.versions.gather(&mut self.adc_link, &mut self.clock);

        let mut filters_ok = boot::setup_label_filters(&mut self.txvr_a, &self.ahrs);
        filters_ok &= boot::setup_label_filters(&mut self.txvr_b, &self.pfd);
        if !filters_ok {
            self.boot_faults |= BootFaults::LABEL_FILTER;
        }
        self.internal_ok = self.boot_faults.is_empty();
    }

    pub fn has_boot_fault(&self) -> bool {
        !self.boot_faults.is_empty()
    }

    pub fn boot_faults(&self) -> BootFaults {
        self.boot_faults
    }

    /// True when the straps selected maintenance mode at boot; servicing
    /// it is the integrator's concern.
    pub fn maintenance_requested(&self) -> bool {
        self.maintenance_requested
    }

    pub fn adc_bus_failed(&self) -> bool {
        self.adc_bus_failed
    }

    pub fn ahrs_bus_failed(&self) -> bool {
        self.ahrs_bus_failed
    }

    pub fn pfd_bus_failed(&self) -> bool {
        self.pfd_bus_failed
    }

    /// One pass of the operating loop: drain the receive paths, then run
    /// the tick tasks if the 100 Hz flag fired. A latched boot fault
    /// reduces this to an idle spin.
    pub fn poll(&mut self) {
        if !self.boot_faults.is_empty() {
            return;
        }

        self.ahrs.drain_rx2(&self.clock, &mut self.txvr_a);

        self.adc_link.pump();
        while let Some(frame) = self.adc_link.take_frame() {
            Self::ingest_adc_frame(&self.clock, &mut self.adc, &frame);
        }

        self.pfd.drain_rx2(&self.clock, &mut self.txvr_b);

        if self.clock.take_tick() {
            self.tick();
        }
    }

    /// Unpacks the ARINC words inside an air-data frame into the ADC
    /// receive group. Version replies are only meaningful at boot and are
    /// ignored here.
    fn ingest_adc_frame(clock: &C, adc: &mut RxGroup<'static>, frame: &AdcFrame) {
        match frame.cmd {
            AdcCommand::ComputedData | AdcCommand::Status => {
                for chunk in frame.data.chunks_exact(4) {
                    let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    if adc.process_received(clock, word).is_ok() {
                        adc.note_bus_activity();
                    }
                }
            }
            _ => {}
        }
    }

    /// The 100 Hz tick body. Sub-rate tasks run on fixed phases of the
    /// tick counter so no two blocks collide within one tick.
    fn tick(&mut self) {
        self.discretes.set_fault_pin(self.internal_ok);
        self.rate_counter = self.rate_counter.wrapping_add(1);

        self.adc_bus_failed = self.adc.tick_bus_failure();
        self.ahrs_bus_failed = self.ahrs.tick_bus_failure();
        self.pfd_bus_failed = self.pfd.tick_bus_failure();

        if self.rate_counter % 4 == 0 {
            self.ahrs.drain_rx2(&self.clock, &mut self.txvr_a);
            self.transmit_ahrs_words();
        }

        if self.rate_counter % 10 == 7 {
            self.ahrs.drain_rx2(&self.clock, &mut self.txvr_a);
            self.transmit_status_words();
            self.send_adc_reply();
        }

        if self.rate_counter % 12 == 2 {
            self.ahrs.drain_rx2(&self.clock, &mut self.txvr_a);
            self.transmit_air_data();
        }

        if self.rate_counter % 20 == 3 {
            let word = self.versions.next_word(self.mag_heading_sdi());
            self.txvr_b.transmit(word);
            self.ahrs.drain_rx2(&self.clock, &mut self.txvr_a);
        }

        self.ahrs.drain_rx2(&self.clock, &mut self.txvr_a);

        self.internal_ok = self.boot_faults.is_empty();
        self.discretes.set_fault_pin(false);
    }

    fn transmit_on(&mut self, channel: Channel, word: u32) {
        match channel {
            Channel::A => self.txvr_a.transmit(word),
            Channel::B => self.txvr_b.transmit(word),
        }
    }

    /// SDI the attitude source is currently transmitting on, taken from
    /// the latest heading word.
    fn mag_heading_sdi(&self) -> u8 {
        self.ahrs
            .slot(ArincLabel::from_octal(0o320))
            .map_or(0, |slot| slot.sdi)
    }

    /// The 50 Hz block: freshly derived attitude words, the unchanged
    /// rate words, and air data echoed to the attitude source.
    fn transmit_ahrs_words(&mut self) {
        let word = self.calc.turn_rate(&self.ahrs, &self.clock);
        self.transmit_on(Channel::B, word);
        let word = self.calc.slip_angle(&self.ahrs, &self.clock);
        self.transmit_on(Channel::B, word);

        self.transmit_on(Channel::B, derive::new_mag_heading(&self.ahrs, &self.clock));
        self.transmit_on(Channel::B, derive::new_pitch(&self.ahrs, &self.clock));
        self.transmit_on(Channel::B, derive::new_roll(&self.ahrs, &self.clock));
        self.transmit_on(Channel::B, derive::body_lat_accel(&self.ahrs, &self.clock));
        self.transmit_on(Channel::B, derive::normal_accel(&self.ahrs, &self.clock));

        self.ahrs.drain_rx2(&self.clock, &mut self.txvr_a);

        for octal in AHRS_PASSTHROUGH {
            if let Some(word) = self.ahrs.get_latest_word(&self.clock, octal) {
                self.transmit_on(Channel::B, word);
            }
        }
        for octal in ADC_TO_AHRS {
            if let Some(word) = self.adc.get_latest_word(&self.clock, octal) {
                self.transmit_on(Channel::A, word);
            }
        }
    }

    /// The 20 Hz status block.
    fn transmit_status_words(&mut self) {
        let adc_timeout = self.adc_bus_failed;
        let word = derive::ahrs_status_272(&self.ahrs, &self.clock, adc_timeout);
        self.transmit_on(Channel::B, word);
        let word = derive::ahrs_status_274(&self.ahrs, &self.clock, adc_timeout);
        self.transmit_on(Channel::B, word);
        let word = derive::ahrs_status_275(&self.ahrs, &self.clock);
        self.transmit_on(Channel::B, word);
    }

    /// Serial reply to the air-data computer: placeholder GNSS words, the
    /// display's barometric correction, and the display's 271 status
    /// loop-around (or a failure pattern when it is missing).
    fn send_adc_reply(&mut self) {
        let words: [u32; ADC_REPLY_WORDS] = [
            GNSS_ALT_NCD,
            VDOP_NCD,
            VFOM_NCD,
            derive::baro_correction(&self.pfd, &self.clock),
            self.pfd
                .get_latest_word(&self.clock, 0o271)
                .unwrap_or(STATUS_271_FAILURE),
        ];

        let mut payload = [0u8; ADC_REPLY_PAYLOAD_LEN];
        payload[0] = self.mag_heading_sdi();
        for (idx, word) in words.iter().enumerate() {
            payload[1 + 4 * idx..5 + 4 * idx].copy_from_slice(&word.to_le_bytes());
        }
        self.adc_link.send(AdcCommand::CurrentData, &payload);
    }

    /// The air-data pass-through block, gated on a healthy barometric
    /// correction from the display.
    fn transmit_air_data(&mut self) {
        let baro_valid = self
            .pfd
            .get_latest_word(&self.clock, 0o235)
            .map_or(false, |word| {
                BcdSsm::from_bits(label::extract_ssm(word)) == BcdSsm::Plus
            });

        if baro_valid {
            for octal in AIR_DATA_BATCH_1 {
                if let Some(word) = self.adc.get_latest_word(&self.clock, octal) {
                    self.transmit_on(Channel::B, word);
                }
            }
        }

        self.ahrs.drain_rx2(&self.clock, &mut self.txvr_a);

        if baro_valid {
            for octal in AIR_DATA_BATCH_2 {
                if let Some(word) = self.adc.get_latest_word(&self.clock, octal) {
                    self.transmit_on(Channel::B, word);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::codec::{self, TxMsg};
    use crate::config::LabelConfig;
    use crate::label::{BnrSsm, DiscreteSsm};
    use crate::testutil::{MockClock, MockDiscretes, MockLink, MockTxvr};

    type TestCore = Core<MockClock, MockTxvr, MockTxvr, MockLink, MockDiscretes>;

    fn healthy_report() -> SelfTestReport {
        SelfTestReport {
            ram_test_passed: true,
            code_crc_passed: true,
        }
    }

    fn booted_core() -> TestCore {
        let mut core = Core::new(
            MockClock::new(1000),
            MockTxvr::new(),
            MockTxvr::new(),
            MockLink::new(),
            MockDiscretes::new(),
            IopConfig::DEFAULT,
        )
        .unwrap();
        core.boot(healthy_report(), 0xDEAD_BEEF);
        assert!(!core.has_boot_fault());
        // discard boot-time traffic so tests see only scheduler output
        core.txvr_a.sent.clear();
        core.txvr_b.sent.clear();
        core.adc_link.sent.clear();
        core
    }

    fn run_ticks(core: &mut TestCore, count: usize) {
        for _ in 0..count {
            core.clock.advance(10);
            core.clock.grant_ticks(1);
            core.poll();
        }
    }

    fn ahrs_cfg(octal: u16) -> &'static LabelConfig {
        tables::AHRS_RX_CONFIGS
            .iter()
            .find(|c| c.label == ArincLabel::from_octal(octal))
            .unwrap()
    }

    fn adc_cfg(octal: u16) -> &'static LabelConfig {
        tables::ADC_RX_CONFIGS
            .iter()
            .find(|c| c.label == ArincLabel::from_octal(octal))
            .unwrap()
    }

    fn bnr_word(cfg: &LabelConfig, eng: f32) -> u32 {
        codec::encode_bnr(&TxMsg {
            config: cfg,
            sm: BnrSsm::NormalOperation.bits(),
            sdi: 1,
            eng_value: eng,
            discrete_bits: 0,
        })
        .unwrap()
        .word
    }

    #[test]
    fn test_boot_fault_holds_scheduler_idle() {
        let mut core = Core::new(
            MockClock::new(0),
            MockTxvr::new(),
            MockTxvr::new(),
            MockLink::new(),
            MockDiscretes::new(),
            IopConfig::DEFAULT,
        )
        .unwrap();
        core.boot(
            SelfTestReport {
                ram_test_passed: false,
                code_crc_passed: true,
            },
            0,
        );
        assert!(core.has_boot_fault());
        assert_eq!(core.boot_faults(), BootFaults::RAM_TEST);

        run_ticks(&mut core, 50);
        assert!(core.txvr_b.sent.is_empty());
        assert!(core.discretes.fault_pin.is_empty());
    }

    #[test]
    fn test_boot_latches_label_filter_fault() {
        let mut bad_txvr = MockTxvr::new();
        bad_txvr.filter_readback_healthy = false;
        let mut core = Core::new(
            MockClock::new(0),
            bad_txvr,
            MockTxvr::new(),
            MockLink::new(),
            MockDiscretes::new(),
            IopConfig::DEFAULT,
        )
        .unwrap();
        core.boot(healthy_report(), 0);
        assert_eq!(core.boot_faults(), BootFaults::LABEL_FILTER);
    }

    #[test]
    fn test_maintenance_strapping_decoded_at_boot() {
        let mut discretes = MockDiscretes::new();
        discretes.straps.s1 = true;
        discretes.straps.s2 = true;
        discretes.straps.s3 = true;
        discretes.straps.parity = false;
        let mut core = Core::new(
            MockClock::new(0),
            MockTxvr::new(),
            MockTxvr::new(),
            MockLink::new(),
            discretes,
            IopConfig::DEFAULT,
        )
        .unwrap();
        core.boot(healthy_report(), 0);
        assert!(core.maintenance_requested());
    }

    #[test]
    fn test_tick_cadence() {
        let mut core = booted_core();

        // tick 1: no sub-rate phase matches
        run_ticks(&mut core, 1);
        assert_eq!(core.txvr_b.sent.len(), 0);

        // tick 2 is the air-data phase, but baro is invalid: nothing
        run_ticks(&mut core, 1);
        assert_eq!(core.txvr_b.sent.len(), 0);

        // tick 3 emits the software version word
        run_ticks(&mut core, 1);
        assert_eq!(core.txvr_b.sent.len(), 1);
        assert_eq!(core.txvr_b.sent[0] & 0xFF, 0x7F);

        // tick 4 is the 50 Hz attitude block: seven derived words
        run_ticks(&mut core, 1);
        assert_eq!(core.txvr_b.sent.len(), 8);

        // ticks 5 and 6: nothing new; tick 7 adds the three status words
        run_ticks(&mut core, 3);
        assert_eq!(core.txvr_b.sent.len(), 8 + 3);
        // and one serial reply to the air-data computer
        assert_eq!(core.adc_link.sent.len(), 1);
        assert_eq!(core.adc_link.sent[0].0, AdcCommand::CurrentData);
    }

    #[test]
    fn test_fault_pin_pulses_within_tick() {
        let mut core = booted_core();
        run_ticks(&mut core, 1);
        // healthy: the one-shot sees a pulse, high at entry and low at exit
        assert_eq!(core.discretes.fault_pin, &[true, false]);
    }

    #[test]
    fn test_receive_drains_precede_transmits() {
        let mut core = booted_core();

        // heading arrives through the transceiver FIFO just before the
        // 50 Hz phase; the drain must pick it up in the same tick
        run_ticks(&mut core, 3);
        core.txvr_b.sent.clear();
        core.txvr_a.queue_rx2(bnr_word(ahrs_cfg(0o320), 90.0));
        run_ticks(&mut core, 1);

        let heading_slot = core.ahrs.slot(ArincLabel::from_octal(0o320)).unwrap();
        assert!(heading_slot.last_good_ms > 0);
        // seven derived words went out on the same tick
        assert_eq!(core.txvr_b.sent.len(), 7);
    }

    #[test]
    fn test_adc_frame_ingest_resets_bus_counter() {
        let mut core = booted_core();
        run_ticks(&mut core, 5);
        assert!(core.adc.current_counts > 0);

        let word = bnr_word(adc_cfg(0o206), 150.0);
        let mut payload = std::vec::Vec::new();
        payload.extend_from_slice(&word.to_le_bytes());
        core.adc_link.queue_frame(AdcCommand::ComputedData, &payload);
        core.poll();

        assert_eq!(core.adc.current_counts, 0);
        let slot = core.adc.slot(ArincLabel::from_octal(0o206)).unwrap();
        assert_eq!(slot.raw_word, word);
    }

    #[test]
    fn test_adc_timeout_reaches_status_272() {
        let mut core = booted_core();
        // 30 silent ticks fail the air-data link; stop on a status phase
        run_ticks(&mut core, 37);
        assert!(core.adc_bus_failed());

        // find the last status-272 word sent to the display
        let status = core
            .txvr_b
            .sent
            .iter()
            .rev()
            .find(|w| *w & 0xFF == 0x5D)
            .copied()
            .unwrap();
        // the word degrades for the stale 271 and reports no ADC bit, or
        // carries the timeout bit when 271 is healthy; with no AHRS
        // traffic at all the failure SSM path must be taken
        assert_eq!(status & 0x6000_0000, 0x6000_0000);
    }

    #[test]
    fn test_status_words_report_adc_timeout_with_healthy_271() {
        let mut core = booted_core();

        // one AHRS status receipt stays fresh for 550 ms, long past the
        // 300 ms air-data timeout
        let status_word = (ArincLabel::from_octal(0o271).wire() as u32)
            | ((DiscreteSsm::NormalOperation.bits() as u32) << label::SSM_SHIFT);
        core.txvr_a.queue_rx2(status_word);
        run_ticks(&mut core, 37);
        assert!(core.adc_bus_failed());

        let status = core
            .txvr_b
            .sent
            .iter()
            .rev()
            .find(|w| *w & 0xFF == 0x5D)
            .copied()
            .unwrap();
        assert_ne!(status & (1 << 25), 0);
        assert_eq!(status & 0x6000_0000, 0);
    }

    #[test]
    fn test_air_data_passthrough_gated_on_baro() {
        let mut core = booted_core();

        // make the display's baro correction valid and keep it fresh
        let baro = codec::encode_bcd(&TxMsg {
            config: &tables::PFD_RX_CONFIGS[1],
            sm: 0,
            sdi: 0,
            eng_value: 29.921,
            discrete_bits: 0,
        })
        .unwrap()
        .word;
        // queue air data words
        let tas = bnr_word(adc_cfg(0o210), 250.0);
        let mut payload = std::vec::Vec::new();
        payload.extend_from_slice(&tas.to_le_bytes());

        // refresh both inputs every 50 ms (inside their freshness windows,
        // slower than their babble limits), crossing the %12 == 2 phase
        // at tick 14
        for _ in 0..4 {
            core.txvr_b.queue_rx2(baro);
            core.adc_link
                .queue_frame(AdcCommand::ComputedData, &payload);
            run_ticks(&mut core, 5);
        }

        assert!(core.txvr_b.sent.iter().any(|w| *w == tas));
    }

    #[test]
    fn test_air_data_passthrough_blocked_without_baro() {
        let mut core = booted_core();
        let tas = bnr_word(adc_cfg(0o210), 250.0);
        let mut payload = std::vec::Vec::new();
        payload.extend_from_slice(&tas.to_le_bytes());

        for _ in 0..4 {
            core.adc_link
                .queue_frame(AdcCommand::ComputedData, &payload);
            run_ticks(&mut core, 5);
        }
        assert!(!core.txvr_b.sent.iter().any(|w| *w == tas));
    }

    #[test]
    fn test_adc_reply_contents() {
        let mut core = booted_core();
        run_ticks(&mut core, 7);

        let (cmd, payload) = core.adc_link.sent.last().unwrap();
        assert_eq!(*cmd, AdcCommand::CurrentData);
        assert_eq!(payload.len(), ADC_REPLY_PAYLOAD_LEN);

        let word_at = |idx: usize| {
            u32::from_le_bytes([
                payload[1 + 4 * idx],
                payload[2 + 4 * idx],
                payload[3 + 4 * idx],
                payload[4 + 4 * idx],
            ])
        };
        assert_eq!(word_at(0), GNSS_ALT_NCD);
        assert_eq!(word_at(1), VDOP_NCD);
        assert_eq!(word_at(2), VFOM_NCD);
        // no valid baro from the display: no-computed-data pattern
        assert_eq!(label::extract_ssm(word_at(3)), BcdSsm::NoComputedData.bits());
        // no 271 loop-around from the display: failure substitute
        assert_eq!(word_at(4), STATUS_271_FAILURE);
    }

    #[test]
    fn test_ahrs_passthrough_words_forwarded() {
        let mut core = booted_core();
        run_ticks(&mut core, 2);

        let pitch_rate = bnr_word(ahrs_cfg(0o326), 1.5);
        core.txvr_a.queue_rx2(pitch_rate);
        // drained on tick 3, still fresh when the 50 Hz block runs at 4
        run_ticks(&mut core, 2);

        assert!(core.txvr_b.sent.iter().any(|w| *w == pitch_rate));
    }

    #[test]
    fn test_adc_echo_to_ahrs_channel_a() {
        let mut core = booted_core();
        let aoa = bnr_word(adc_cfg(0o221), 4.5);
        let mut payload = std::vec::Vec::new();
        payload.extend_from_slice(&aoa.to_le_bytes());

        // a single receipt is fresh for 65 ms, covering the 50 Hz phase
        core.adc_link
            .queue_frame(AdcCommand::ComputedData, &payload);
        run_ticks(&mut core, 4);
        assert!(core.txvr_a.sent.iter().any(|w| *w == aoa));
    }
}
