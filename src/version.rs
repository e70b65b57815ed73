//! Software version reporting.
//!
//! The unit announces three subsystems' version strings over a custom
//! ARINC word, one byte per transmission, walking a 3x16 table. The local
//! row carries the program memory CRC; the air-data and pitot/AOA rows are
//! gathered over the serial link at startup.

use crc::{Crc, CRC_32_MPEG_2};

use crate::port::{AdcCommand, AdcLink, Clock, ADC_FRAME_MAX};

/// Generator for the program memory check, keyed with the polynomial from
/// the configuration block.
static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Wire-order label carrying version bytes (octal 376).
const VERSION_LABEL: u32 = 0x7F;

const SUBSYS_SHIFT: u32 = 23;
const MSG_IDX_SHIFT: u32 = 18;
const DATA_SHIFT: u32 = 10;
const SDI_SHIFT: u32 = 8;

/// Rows in the version table, in announcement order.
const NUM_SUBSYSTEMS: usize = 3;
/// Bytes announced per subsystem.
const BYTES_PER_SUBSYSTEM: usize = 16;

const LOCAL_ROW: usize = 0;
const ADC_ROW: usize = 1;
const PITOT_AOA_ROW: usize = 2;

/// Subsystem identity codes, transmitted alongside each version byte.
const SUBSYSTEM_CODES: [u8; NUM_SUBSYSTEMS] = [0x12, 0x16, 0x17];

/// Version string length in a software version reply.
const SW_VERSION_LEN: usize = 12;
/// Hardware serial length and its position within a table row.
const HW_VERSION_LEN: usize = 4;
const HW_VERSION_OFFSET: usize = 12;
/// Payload bytes expected in the two replies.
const SW_REPLY_LEN: usize = 2 * SW_VERSION_LEN;
const HW_REPLY_LEN: usize = 2 * HW_VERSION_LEN;

/// ASCII-hex position and length of the CRC in the local row.
const CRC_ASCII_CHARS: usize = 8;
const CRC_RAW_OFFSET: usize = 8;

const GATHER_RETRIES: usize = 10;
const GATHER_REPLY_DELAY_MS: u32 = 5;

/// Computes the program-image checksum announced in the local version row.
pub fn program_crc(image: &[u8]) -> u32 {
    CRC32.checksum(image)
}

/// Converts a nibble to its ASCII hex character.
fn ascii_hex(nibble: u8) -> u8 {
    if nibble < 0xA {
        nibble + 0x30
    } else {
        nibble + 0x37
    }
}

/// The 3x16 version byte table and the rolling announcement indices.
#[derive(Debug)]
pub struct VersionTable {
    bytes: [[u8; BYTES_PER_SUBSYSTEM]; NUM_SUBSYSTEMS],
    sys_idx: usize,
    msg_idx: usize,
}

impl VersionTable {
    /// An all-zero table; subsystems that never answer announce NUL bytes.
    pub const fn new() -> Self {
        VersionTable {
            bytes: [[0; BYTES_PER_SUBSYSTEM]; NUM_SUBSYSTEMS],
            sys_idx: 0,
            msg_idx: 0,
        }
    }

    /// Fills the local row: eight ASCII hex characters of the CRC, most
    /// significant nibble first, then the four raw CRC bytes.
    pub fn load_local_crc(&mut self, crc: u32) {
        for pos in 0..CRC_ASCII_CHARS {
            let nibble = ((crc << (4 * pos)) >> 28) as u8 & 0xF;
            self.bytes[LOCAL_ROW][pos] = ascii_hex(nibble);
        }
        for pos in 0..4 {
            self.bytes[LOCAL_ROW][CRC_RAW_OFFSET + pos] = ((crc >> (8 * pos)) & 0xFF) as u8;
        }
    }

    /// Requests the remote subsystems' versions over the serial link.
    ///
    /// Each request is retried up to ten times with a 5 ms reply window.
    /// Rows for subsystems that never answer stay zeroed.
    pub fn gather(&mut self, link: &mut impl AdcLink, clock: &mut impl Clock) {
        if let Some(reply) = Self::request(link, clock, AdcCommand::SoftwareVersion, SW_REPLY_LEN)
        {
            self.bytes[ADC_ROW][..SW_VERSION_LEN].copy_from_slice(&reply[..SW_VERSION_LEN]);
            self.bytes[PITOT_AOA_ROW][..SW_VERSION_LEN]
                .copy_from_slice(&reply[SW_VERSION_LEN..SW_REPLY_LEN]);
        }
        if let Some(reply) = Self::request(link, clock, AdcCommand::HardwareSerial, HW_REPLY_LEN) {
            self.bytes[ADC_ROW][HW_VERSION_OFFSET..HW_VERSION_OFFSET + HW_VERSION_LEN]
                .copy_from_slice(&reply[..HW_VERSION_LEN]);
            self.bytes[PITOT_AOA_ROW][HW_VERSION_OFFSET..HW_VERSION_OFFSET + HW_VERSION_LEN]
                .copy_from_slice(&reply[HW_VERSION_LEN..HW_REPLY_LEN]);
        }
    }

    fn request(
        link: &mut impl AdcLink,
        clock: &mut impl Clock,
        cmd: AdcCommand,
        expected_len: usize,
    ) -> Option<heapless::Vec<u8, ADC_FRAME_MAX>> {
        for _ in 0..GATHER_RETRIES {
            link.send(cmd, &[]);
            clock.delay_ms(GATHER_REPLY_DELAY_MS);
            link.pump();
            while let Some(frame) = link.take_frame() {
                if frame.cmd == cmd && frame.data.len() == expected_len {
                    return Some(frame.data);
                }
            }
        }
        None
    }

    /// Emits the next version word and advances the table indices: message
    /// index 0..15, then the next subsystem, wrapping after the last.
    pub fn next_word(&mut self, sdi: u8) -> u32 {
        let mut word = VERSION_LABEL;
        word |= ((sdi & 0x3) as u32) << SDI_SHIFT;
        word |= (SUBSYSTEM_CODES[self.sys_idx] as u32) << SUBSYS_SHIFT;
        word |= (self.msg_idx as u32) << MSG_IDX_SHIFT;
        word |= (self.bytes[self.sys_idx][self.msg_idx] as u32) << DATA_SHIFT;

        self.msg_idx += 1;
        if self.msg_idx == BYTES_PER_SUBSYSTEM {
            self.msg_idx = 0;
            self.sys_idx += 1;
            if self.sys_idx == NUM_SUBSYSTEMS {
                self.sys_idx = 0;
            }
        }
        word
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::port::AdcFrame;
    use crate::testutil::{MockClock, MockLink};
    use std::vec::Vec;

    #[test]
    fn test_ascii_hex_conversion() {
        assert_eq!(ascii_hex(0x0), b'0');
        assert_eq!(ascii_hex(0x9), b'9');
        assert_eq!(ascii_hex(0xA), b'A');
        assert_eq!(ascii_hex(0xF), b'F');
    }

    #[test]
    fn test_local_crc_row_layout() {
        let mut table = VersionTable::new();
        table.load_local_crc(0x1234_ABCD);
        assert_eq!(&table.bytes[LOCAL_ROW][..8], b"1234ABCD");
        // raw bytes follow, least significant first
        assert_eq!(
            &table.bytes[LOCAL_ROW][8..12],
            &[0xCD, 0xAB, 0x34, 0x12]
        );
        assert_eq!(&table.bytes[LOCAL_ROW][12..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_word_layout_and_index_walk() {
        let mut table = VersionTable::new();
        table.bytes[0][0] = b'A';
        table.bytes[1][0] = b'x';

        let word = table.next_word(1);
        assert_eq!(word & 0xFF, 0x7F);
        assert_eq!((word >> 8) & 0x3, 1);
        assert_eq!((word >> 10) & 0xFF, b'A' as u32);
        assert_eq!((word >> 18) & 0x1F, 0);
        assert_eq!((word >> 23) & 0x3F, 0x12);

        // walk to the second subsystem
        for _ in 0..15 {
            table.next_word(1);
        }
        let word = table.next_word(1);
        assert_eq!((word >> 23) & 0x3F, 0x16);
        assert_eq!((word >> 18) & 0x1F, 0);
        assert_eq!((word >> 10) & 0xFF, b'x' as u32);

        // and all the way around the table
        for _ in 0..(16 * 3 - 17) {
            table.next_word(1);
        }
        let word = table.next_word(0);
        assert_eq!((word >> 23) & 0x3F, 0x12);
        assert_eq!((word >> 18) & 0x1F, 0);
    }

    #[test]
    fn test_gather_fills_remote_rows() {
        let mut link = MockLink::new();
        let mut clock = MockClock::new(0);

        let sw: Vec<u8> = (b'a'..b'a' + 24).collect();
        link.sw_reply = Some(AdcFrame {
            cmd: AdcCommand::SoftwareVersion,
            data: heapless::Vec::from_slice(&sw).unwrap(),
        });
        link.hw_reply = Some(AdcFrame {
            cmd: AdcCommand::HardwareSerial,
            data: heapless::Vec::from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap(),
        });

        let mut table = VersionTable::new();
        table.gather(&mut link, &mut clock);

        assert_eq!(&table.bytes[ADC_ROW][..12], &sw[..12]);
        assert_eq!(&table.bytes[PITOT_AOA_ROW][..12], &sw[12..]);
        assert_eq!(&table.bytes[ADC_ROW][12..], &[1, 2, 3, 4]);
        assert_eq!(&table.bytes[PITOT_AOA_ROW][12..], &[5, 6, 7, 8]);
        // one request each was enough
        assert_eq!(link.sent.len(), 2);
    }

    #[test]
    fn test_gather_retries_then_gives_up() {
        let mut link = MockLink::new();
        let mut clock = MockClock::new(0);

        let mut table = VersionTable::new();
        table.gather(&mut link, &mut clock);

        // ten tries per request, no replies, rows stay zeroed
        assert_eq!(link.sent.len(), 20);
        assert_eq!(table.bytes[ADC_ROW], [0; 16]);
        // the reply windows consumed wall time
        assert_eq!(clock.now_ms(), 100);
    }

    #[test]
    fn test_gather_ignores_wrong_length_replies() {
        let mut link = MockLink::new();
        let mut clock = MockClock::new(0);
        link.queue_frame(AdcCommand::SoftwareVersion, &[0xEE; 5]);

        let mut table = VersionTable::new();
        table.gather(&mut link, &mut clock);
        assert_eq!(table.bytes[ADC_ROW], [0; 16]);
    }

    #[test]
    fn test_program_crc_matches_generator_key() {
        // CRC-32/MPEG-2 check value for "123456789"
        assert_eq!(program_crc(b"123456789"), 0x0376_E6E7);
    }
}
