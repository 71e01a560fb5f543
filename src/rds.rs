//! RDS (RBDS) group decoder.
//!
//! The tuner delivers the Radio Data System bitstream as 3-byte records,
//! one per 16-bit block, with a block number and an error flag. This
//! module reassembles the four blocks of each group, dispatches on the
//! group type and maintains the persistent program model:
//! - 0A: program-service name, traffic flags, decoder identification,
//!   alternate frequencies
//! - 2A: radio-text
//! - 4A: clock and date
//! - 8A: traffic message channel
//! - 14A: enhanced other networks
//!
//! Decoded events are queued as [`Notice`] values and drained by the
//! caller (see [`RdsDecoder::take_notices`]).

use tracing::trace;

use crate::clock;
use crate::notify::Notice;
use crate::programs::ProgramTable;

/// Program-type names, indexed by PTY code minus one (RBDS table).
pub const PROGRAM_TYPES: [&str; 31] = [
    "News",
    "Current affairs",
    "Information",
    "Sport",
    "Education",
    "Drama",
    "Culture",
    "Science",
    "Varied",
    "Pop music",
    "Rock music",
    "Easy listening",
    "Light classical",
    "Serious classical",
    "Other music",
    "Weather",
    "Finance",
    "Children's programmes",
    "Social affairs",
    "Religion",
    "Phone-in",
    "Travel",
    "Leisure",
    "Jazz music",
    "Country music",
    "National music",
    "Oldies music",
    "Folk music",
    "Documentary",
    "Alarm test",
    "Alarm",
];

/// Duration labels for single-group TMC messages, indexed by the
/// 3-bit continuity/duration code.
const TMC_DURATIONS: [&str; 8] = [
    "unknown",
    "15 minutes",
    "30 minutes",
    "1 hour",
    "2 hours",
    "3 hour",
    "4 hour",
    "rest of the day",
];

/// Name for a PTY code, `None` for 0 or out-of-range values.
pub fn program_type_name(pty: u8) -> Option<&'static str> {
    if (1..=31).contains(&pty) {
        Some(PROGRAM_TYPES[pty as usize - 1])
    } else {
        None
    }
}

/// Size of one raw RDS record on the wire.
pub const RECORD_SIZE: usize = 3;

/// One 3-byte RDS record as read from the radio device:
/// `{ LSB, MSB, block }` where the block byte carries the block number
/// in its low 3 bits and the uncorrectable-error flag in bit 7.
#[derive(Debug, Clone, Copy)]
pub struct BlockRecord {
    pub lsb: u8,
    pub msb: u8,
    pub block: u8,
}

impl BlockRecord {
    pub fn from_bytes(bytes: [u8; RECORD_SIZE]) -> Self {
        Self {
            lsb: bytes[0],
            msb: bytes[1],
            block: bytes[2],
        }
    }

    /// Block number within the group.
    pub fn number(&self) -> u8 {
        self.block & 0x07
    }

    /// Set when the receiver could not correct this block.
    pub fn is_uncorrectable(&self) -> bool {
        self.block & 0x80 != 0
    }

    /// The 16-bit block content (MSB:LSB).
    pub fn word(&self) -> u16 {
        (self.msb as u16) << 8 | self.lsb as u16
    }
}

fn af_frequency(code: u8) -> f32 {
    ((100 * (code as i32 - 1)) + 87600) as f32 / 1000.0
}

/// Block-synchronous RDS decoder with the program model it maintains.
pub struct RdsDecoder {
    min_mhz: f32,
    /// Four 16-bit blocks of the group being assembled, MSB first.
    group: [u8; 8],
    /// Previous completed group, for duplicate suppression.
    last_group: [u8; 8],
    /// 5-bit group type + version code from block 1.
    group_code: u8,
    /// PI of the program the tuner is currently receiving.
    current_pi: Option<u16>,
    /// Program-service name assembly buffer (NUL-delimited like the
    /// 8-character PS field itself).
    name: [u8; 8],
    last_name: Option<String>,
    /// Stereo state; `None` until the first DI segment-3 report.
    stereo: Option<bool>,
    ta: bool,
    music: bool,
    af_remaining: u8,
    text: [u8; 64],
    text_ab: bool,
    blocks: u64,
    errors: u64,
    programs: ProgramTable,
    notices: Vec<Notice>,
}

impl RdsDecoder {
    /// Create a decoder. `min_mhz` is the band's lower edge, used by the
    /// EON alternate-frequency plausibility check.
    pub fn new(min_mhz: f32) -> Self {
        Self {
            min_mhz,
            group: [0; 8],
            last_group: [0; 8],
            group_code: 0,
            current_pi: None,
            name: [0; 8],
            last_name: None,
            stereo: None,
            ta: false,
            music: false,
            af_remaining: 0,
            text: [b' '; 64],
            text_ab: false,
            blocks: 0,
            errors: 0,
            programs: ProgramTable::new(),
            notices: Vec::new(),
        }
    }

    /// Counts of records seen and uncorrectable records dropped.
    pub fn stats(&self) -> (u64, u64) {
        (self.blocks, self.errors)
    }

    /// Music/speech flag from the last 0A group (recorded, not emitted).
    pub fn is_music(&self) -> bool {
        self.music
    }

    pub fn programs(&self) -> &ProgramTable {
        &self.programs
    }

    pub fn programs_mut(&mut self) -> &mut ProgramTable {
        &mut self.programs
    }

    /// Drain the queued notices.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Feed one record from the device. `current_mhz` is the frequency
    /// the tuner is sitting on; new program records are stamped with it.
    pub fn handle_record(&mut self, rec: BlockRecord, current_mhz: f32) {
        self.blocks += 1;
        if rec.is_uncorrectable() {
            self.errors += 1;
            self.notices.push(Notice::BlockErrors {
                errors: self.errors,
                blocks: self.blocks,
            });
            return;
        }

        let number = rec.number();
        if number > 3 {
            // C' and invalid markers from the kernel; nothing to slot
            // them into.
            trace!(block = number, "dropping block outside 0..=3");
            return;
        }

        if number == 0 {
            let pi = rec.word();
            self.programs.get_or_create(pi).freq_mhz = current_mhz;
            self.current_pi = Some(pi);
        }
        if number == 1 {
            let pty = ((rec.msb << 3) & 0x18) | ((rec.lsb >> 5) & 0x07);
            if pty != 0 {
                if let Some(pi) = self.current_pi {
                    let program = self.programs.get_or_create(pi);
                    if program.pty != pty {
                        program.pty = pty;
                        if let Some(name) = program_type_name(pty) {
                            self.notices.push(Notice::ProgramType { name: name.into() });
                        }
                    }
                }
            }
            self.group_code = rec.msb >> 3;
        }

        let slot = 2 * number as usize;
        self.group[slot] = rec.msb;
        self.group[slot + 1] = rec.lsb;

        if number == 3 {
            if self.group == self.last_group {
                return;
            }
            self.dispatch();
            self.last_group = self.group;
            self.group = [0; 8];
        }
    }

    fn dispatch(&mut self) {
        match self.group_code {
            0x00 => self.handle_basic(),
            0x04 => self.handle_radiotext(),
            0x08 => self.handle_clock(),
            0x10 => self.handle_tmc(),
            0x1C => self.handle_eon(),
            code => self.notices.push(Notice::RawGroup {
                group_type: code,
                data: self.group,
            }),
        }
    }

    /// Type 0A: basic tuning and switching information.
    fn handle_basic(&mut self) {
        let g = self.group;
        let tp = g[2] & 0x04 != 0;
        let ta = g[3] & 0x10 != 0;
        self.music = g[3] & 0x08 != 0;
        let index = ((g[3] & 0x03) << 1) as usize;

        if let Some(pi) = self.current_pi {
            self.programs.get_or_create(pi).tp = tp;
        }

        if tp && ta != self.ta {
            self.ta = ta;
            if let Some(pi) = self.current_pi {
                self.programs.get_or_create(pi).ta = ta;
            }
            self.notices.push(Notice::TrafficAnnouncement { on: ta });
        }

        self.name[index] = g[6];
        self.name[index + 1] = g[7];
        if index == 6 {
            let len = self.name.iter().position(|&b| b == 0).unwrap_or(8);
            if len > 0 {
                let assembled = String::from_utf8_lossy(&self.name[..len])
                    .trim_end()
                    .to_string();
                if !assembled.is_empty() && self.last_name.as_deref() != Some(&assembled) {
                    self.notices.push(Notice::Program {
                        name: assembled.clone(),
                    });
                    self.last_name = Some(assembled);
                }
                self.name[0] = 0;
            }
        }

        // Decoder identification arrives one bit per segment; segment 3
        // carries the stereo flag.
        if g[3] & 0x03 == 3 {
            let is_stereo = g[3] & 0x04 != 0;
            if self.stereo != Some(is_stereo) {
                self.stereo = Some(is_stereo);
                self.notices.push(Notice::Stereo { stereo: is_stereo });
            }
        }

        // Alternate frequencies: 224..=249 introduces a list of
        // (byte - 224) entries; following groups carry two codes each.
        if (224..=249).contains(&g[4]) {
            self.af_remaining = g[4] - 224;
            if self.af_remaining > 0 && (1..=204).contains(&g[5]) {
                self.notices.push(Notice::AlternateFrequency {
                    freq_mhz: af_frequency(g[5]),
                });
                self.af_remaining -= 1;
            }
        } else if self.af_remaining > 0 {
            for code in [g[4], g[5]] {
                if (1..=204).contains(&code) {
                    self.notices.push(Notice::AlternateFrequency {
                        freq_mhz: af_frequency(code),
                    });
                }
            }
            self.af_remaining = self.af_remaining.saturating_sub(2);
        }
    }

    /// Type 2A: radio-text, 4 characters per group into a 64-byte buffer.
    fn handle_radiotext(&mut self) {
        let g = self.group;
        let index = (g[3] & 0x0F) as usize;
        let ab = g[3] & 0x10 != 0;

        if ab != self.text_ab {
            self.text_ab = ab;
            let end = self
                .text
                .iter()
                .rposition(|&b| !matches!(b, b' ' | b'\r' | 0))
                .map_or(0, |i| i + 1);
            if end > 0 {
                self.notices.push(Notice::Text {
                    text: String::from_utf8_lossy(&self.text[..end]).into_owned(),
                });
            }
            self.text = [b' '; 64];
        }

        self.text[4 * index..4 * index + 4].copy_from_slice(&g[4..8]);
    }

    /// Type 4A: clock-time and date.
    fn handle_clock(&mut self) {
        let g = self.group;
        let mjd = ((g[3] & 0x03) as u32) << 15 | (g[4] as u32) << 7 | (g[5] as u32) >> 1;
        let (year, month, day) = clock::mjd_to_date(mjd);

        let utc_hour = (((g[5] & 0x01) as i32) << 4) | (g[6] >> 4) as i32;
        let utc_minute = (((g[6] & 0x0F) as i32) << 2) | ((g[7] & 0xC0) >> 6) as i32;
        let mut offset = (g[7] & 0x1F) as i32;
        if g[7] & 0x20 != 0 {
            offset = -offset;
        }

        let local = clock::local_time(year, month, day, utc_hour, utc_minute, offset);
        self.notices.push(Notice::Date {
            year: local.year,
            month: local.month,
            day: local.day,
            hour: local.hour,
            minute: local.minute,
            offset_minutes: offset * 30,
        });
    }

    /// Type 8A: traffic message channel. Only single-group messages are
    /// decoded; everything else is a verbose diagnostic.
    fn handle_tmc(&mut self) {
        let g = self.group;
        let subtype = (g[3] & 0x18) >> 3;
        let ci = g[3] & 0x07;
        let extent = (g[4] & 0x38) >> 3;
        let event = ((g[4] & 0x07) as u16) << 8 | g[5] as u16;
        let location = (g[6] as u16) << 8 | g[7] as u16;

        if subtype == 1 {
            self.notices.push(Notice::TmcSingle {
                event,
                location,
                extent,
                duration: TMC_DURATIONS[ci as usize],
            });
        } else {
            self.notices.push(Notice::TmcOther {
                subtype,
                ci,
                event,
                location,
            });
        }
    }

    /// Type 14A: enhanced other networks. Cross-references are kept as
    /// PI codes and resolved through the program table.
    fn handle_eon(&mut self) {
        let g = self.group;
        let tpon = g[3] & 0x10 != 0;
        let variant = g[3] & 0x0F;
        let info = (g[4] as u16) << 8 | g[5] as u16;
        let other_pi = (g[6] as u16) << 8 | g[7] as u16;

        let this_freq = self
            .current_pi
            .and_then(|pi| self.programs.get(pi))
            .map(|p| p.freq_mhz);
        let min_mhz = self.min_mhz;

        let other = self.programs.get_or_create(other_pi);
        match variant {
            0..=3 => other.set_name_fragment(variant as usize, [g[4], g[5]]),
            5 => {
                let f1 = af_frequency(g[4]);
                let f2 = af_frequency(g[5]);
                if let Some(freq) = this_freq {
                    if freq >= min_mhz && f1 >= freq - 0.04 && f1 <= freq + 0.04 {
                        other.freq_mhz = f2;
                        if let Some(station) = other.name() {
                            self.notices.push(Notice::EonFrequency {
                                station,
                                freq_mhz: f2,
                            });
                        }
                    }
                }
            }
            0x0D => {
                let taon = g[5] & 0x01 != 0;
                if tpon && taon && other.ta != taon {
                    let station = other
                        .name()
                        .unwrap_or_else(|| format!("{:X}", other_pi));
                    other.ta = taon;
                    self.notices.push(Notice::EonTraffic { station, on: taon });
                }
            }
            _ => self.notices.push(Notice::EonOther {
                tpon,
                variant,
                info,
                pi: other_pi,
            }),
        }
    }
}

#[cfg(test)]
#[path = "rds_tests.rs"]
mod tests;
