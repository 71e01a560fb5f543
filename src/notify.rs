//! User-visible events and their rendering.
//!
//! The RDS decoder and the monitor loop produce [`Notice`] values
//! instead of printing directly; the [`Emitter`] renders them to
//! standard output, either as the human text lines of the protocol or
//! as one JSON object per line.

use std::fmt;

use serde::Serialize;

/// A user-visible event.
///
/// Each variant renders to exactly one output line. Variants carry a
/// verbosity level (see [`Notice::level`]); the emitter drops notices
/// above its configured verbosity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notice {
    /// A complete program-service name was assembled.
    Program { name: String },
    /// A radio-text message was completed by an A/B flag flip.
    Text { text: String },
    /// Clock and date from group 4A, already shifted to local time.
    Date {
        year: i32,
        month: i32,
        day: i32,
        hour: i32,
        minute: i32,
        offset_minutes: i32,
    },
    /// Stereo/mono state changed (or latched for the first time).
    Stereo { stereo: bool },
    /// Traffic-announcement flag changed on the tuned program.
    TrafficAnnouncement { on: bool },
    /// Program-type code changed.
    ProgramType { name: String },
    /// Single-group traffic message (TMC subtype 1).
    TmcSingle {
        #[serde(rename = "tmc_event")]
        event: u16,
        location: u16,
        extent: u8,
        duration: &'static str,
    },
    /// Any other TMC subtype, verbose only.
    TmcOther {
        subtype: u8,
        ci: u8,
        #[serde(rename = "tmc_event")]
        event: u16,
        location: u16,
    },
    /// Traffic announcement switched on another network (EON 0xD).
    EonTraffic { station: String, on: bool },
    /// Another network's frequency was learned (EON variant 5).
    EonFrequency { station: String, freq_mhz: f32 },
    /// Unhandled EON variant, verbose only.
    EonOther {
        tpon: bool,
        variant: u8,
        info: u16,
        pi: u16,
    },
    /// Decoded alternate frequency from a 0A group, verbose only.
    AlternateFrequency { freq_mhz: f32 },
    /// Switching to another known program.
    Switching { name: String, freq_mhz: f32 },
    /// The next-program sweep found nothing else.
    NoOtherStations,
    /// The tuner was stepped to a new frequency.
    FrequencyTuned { freq_mhz: f32 },
    /// An unbound key was pressed.
    Keyboard { key: u8 },
    /// The 1 s poll expired without data, verbose only.
    NoRdsData,
    /// Running uncorrectable-block tally, verbose only.
    BlockErrors { errors: u64, blocks: u64 },
    /// Raw dump of an otherwise unhandled group, high verbosity only.
    RawGroup { group_type: u8, data: [u8; 8] },
    /// A partial RDS record was discarded.
    ShortRead { count: usize },
}

impl Notice {
    /// Minimum verbosity at which this notice is printed.
    pub fn level(&self) -> u8 {
        match self {
            Notice::NoRdsData
            | Notice::BlockErrors { .. }
            | Notice::TmcOther { .. }
            | Notice::EonFrequency { .. }
            | Notice::EonOther { .. }
            | Notice::AlternateFrequency { .. } => 1,
            Notice::RawGroup { .. } => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Program { name } => write!(f, "Program: {}", name),
            Notice::Text { text } => write!(f, "Text: {}", text),
            Notice::Date {
                year,
                month,
                day,
                hour,
                minute,
                offset_minutes,
            } => {
                let sign = if *offset_minutes < 0 { '-' } else { '+' };
                let abs = offset_minutes.abs();
                write!(
                    f,
                    "Date: {:04}-{:02}-{:02} {:02}:{:02} ({}{:02}:{:02})",
                    year,
                    month,
                    day,
                    hour,
                    minute,
                    sign,
                    abs / 60,
                    abs % 60
                )
            }
            Notice::Stereo { stereo } => {
                write!(f, "Program is {}", if *stereo { "stereo" } else { "mono" })
            }
            Notice::TrafficAnnouncement { on } => {
                write!(f, "Traffic announcement {}", if *on { "on" } else { "off" })
            }
            Notice::ProgramType { name } => write!(f, "Program type: {}", name),
            Notice::TmcSingle {
                event,
                location,
                extent,
                duration,
            } => write!(
                f,
                "TMC(single): evt={:X}, loc={:X}, extent={:X}, dur={}",
                event, location, extent, duration
            ),
            Notice::TmcOther {
                subtype,
                ci,
                event,
                location,
            } => write!(
                f,
                "TMC: Type={:X}, CI={:X}, event={:X}, loc={:X}",
                subtype, ci, event, location
            ),
            Notice::EonTraffic { station, on } => write!(
                f,
                "Traffic Announcement on {} is {}",
                station,
                if *on { "on" } else { "off" }
            ),
            Notice::EonFrequency { station, freq_mhz } => {
                write!(f, "{} is on {:.2}MHz", station, freq_mhz)
            }
            Notice::EonOther {
                tpon,
                variant,
                info,
                pi,
            } => write!(
                f,
                "EON: TPON={}, v={:X}, info={:X}, PION={:X}",
                *tpon as u8, variant, info, pi
            ),
            Notice::AlternateFrequency { freq_mhz } => {
                write!(f, "Alternate frequency {:.2}", freq_mhz)
            }
            Notice::Switching { name, freq_mhz } => {
                write!(f, "Switching to {} ({:.2})", name, freq_mhz)
            }
            Notice::NoOtherStations => write!(f, "No other stations known"),
            Notice::FrequencyTuned { freq_mhz } => {
                write!(f, "Frequency tuned to {:.2}", freq_mhz)
            }
            Notice::Keyboard { key } => write!(f, "Keyboard: {} ({:X})", key, key),
            Notice::NoRdsData => write!(f, "No RDS data"),
            Notice::BlockErrors { errors, blocks } => {
                write!(f, "{} errors in {} blocks so far", errors, blocks)
            }
            Notice::RawGroup { group_type, data } => write!(
                f,
                "Group({:X}): {:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}",
                group_type,
                data[0],
                data[1],
                data[2],
                data[3],
                data[4],
                data[5],
                data[6],
                data[7]
            ),
            Notice::ShortRead { count } => {
                write!(f, "ERR: Incomplete RDS block, count was {}", count)
            }
        }
    }
}

/// Renders notices to standard output.
#[derive(Debug, Clone, Copy)]
pub struct Emitter {
    verbosity: u8,
    json: bool,
}

impl Emitter {
    pub fn new(verbosity: u8, json: bool) -> Self {
        Self { verbosity, json }
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Print one notice, if its level is within the configured verbosity.
    pub fn emit(&self, notice: &Notice) {
        if notice.level() > self.verbosity {
            return;
        }
        if self.json {
            match serde_json::to_string(notice) {
                Ok(line) => println!("{}", line),
                Err(_) => println!("{}", notice),
            }
        } else {
            println!("{}", notice);
        }
    }

    /// Drain a batch of notices in order.
    pub fn emit_all<I: IntoIterator<Item = Notice>>(&self, notices: I) {
        for n in notices {
            self.emit(&n);
        }
    }
}
