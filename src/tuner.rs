//! V4L2 radio-device facade.
//!
//! Wraps an Si470x-class tuner exposed as a kernel radio device:
//! - frequency get/set with band range checking
//! - hardware seek with wrap-around
//! - mute and volume mapped into the device's advertised control range
//!
//! The raw `v4l2_*` structures and ioctl numbers below mirror
//! `linux/videodev2.h` for the handful of calls a radio tuner needs.

// Kernel struct names are kept verbatim.
#![allow(non_camel_case_types)]

use std::fs::File;
use std::io::Read;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

use tracing::debug;

use crate::error::{Error, Result};

const V4L2_TUNER_RADIO: u32 = 1;
const V4L2_TUNER_CAP_LOW: u32 = 0x0001;
const V4L2_TUNER_MODE_STEREO: u32 = 1;
const V4L2_CAP_RDS_CAPTURE: u32 = 0x0000_0100;
const V4L2_CID_AUDIO_VOLUME: u32 = 0x0098_0905;
const V4L2_CID_AUDIO_MUTE: u32 = 0x0098_0909;

/// Volume commands are expressed on a 0..=100 scale; larger values clamp.
pub const MAX_VOLUME: u32 = 100;

#[repr(C)]
pub struct v4l2_tuner {
    pub index: u32,
    pub name: [u8; 32],
    pub type_: u32,
    pub capability: u32,
    pub rangelow: u32,
    pub rangehigh: u32,
    pub rxsubchans: u32,
    pub audmode: u32,
    pub signal: i32,
    pub afc: i32,
    pub reserved: [u32; 4],
}

#[repr(C)]
pub struct v4l2_frequency {
    pub tuner: u32,
    pub type_: u32,
    pub frequency: u32,
    pub reserved: [u32; 8],
}

#[repr(C)]
pub struct v4l2_hw_freq_seek {
    pub tuner: u32,
    pub type_: u32,
    pub seek_upward: u32,
    pub wrap_around: u32,
    pub spacing: u32,
    pub rangelow: u32,
    pub rangehigh: u32,
    pub reserved: [u32; 5],
}

#[repr(C)]
pub struct v4l2_control {
    pub id: u32,
    pub value: i32,
}

#[repr(C)]
pub struct v4l2_queryctrl {
    pub id: u32,
    pub type_: u32,
    pub name: [u8; 32],
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
    pub flags: u32,
    pub reserved: [u32; 2],
}

#[repr(C)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

nix::ioctl_read!(vidioc_querycap, b'V', 0, v4l2_capability);
nix::ioctl_readwrite!(vidioc_s_ctrl, b'V', 28, v4l2_control);
nix::ioctl_readwrite!(vidioc_g_tuner, b'V', 29, v4l2_tuner);
nix::ioctl_readwrite!(vidioc_queryctrl, b'V', 36, v4l2_queryctrl);
nix::ioctl_readwrite!(vidioc_g_frequency, b'V', 56, v4l2_frequency);
nix::ioctl_write_ptr!(vidioc_s_frequency, b'V', 57, v4l2_frequency);
nix::ioctl_write_ptr!(vidioc_s_hw_freq_seek, b'V', 82, v4l2_hw_freq_seek);

/// Frequency divider for a tuner capability word.
///
/// `V4L2_TUNER_CAP_LOW` advertises 62.5 Hz tuning units (16000 per MHz);
/// without it the unit is 62.5 kHz (16 per MHz).
pub fn divider_for_capability(capability: u32) -> u32 {
    if capability & V4L2_TUNER_CAP_LOW != 0 {
        16000
    } else {
        16
    }
}

/// Map a 0..=100 volume onto the device's advertised `[min, max]` range.
pub fn map_volume(volume: u32, min: i32, max: i32) -> i32 {
    let volume = volume.min(MAX_VOLUME) as i64;
    let span = max as i64 - min as i64;
    (min as i64 + volume * span / MAX_VOLUME as i64) as i32
}

fn c_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// An opened FM radio device.
///
/// Owns the file handle and the tuning constants established at open
/// time: the frequency divider and the band limits in MHz. All
/// operations are synchronous ioctls; failures carry the operation name
/// and errno as [`Error::Device`].
pub struct Tuner {
    file: File,
    divider: u32,
    min_mhz: f32,
    max_mhz: f32,
    name: String,
    stereo: bool,
    signal: i32,
    rds_capture: bool,
}

impl Tuner {
    /// Open a radio device read-only and query its tuner and capabilities.
    ///
    /// Fails with [`Error::Config`] when the device is not an FM radio
    /// tuner. RDS capture support is recorded but not required here; the
    /// caller decides whether to enter the RDS loop.
    pub fn open(path: &str) -> Result<Self> {
        let file = File::open(path)?;
        let fd = file.as_raw_fd();

        let mut tuner: v4l2_tuner = unsafe { std::mem::zeroed() };
        unsafe { vidioc_g_tuner(fd, &mut tuner) }
            .map_err(|e| Error::device("VIDIOC_G_TUNER", e))?;

        let mut caps: v4l2_capability = unsafe { std::mem::zeroed() };
        unsafe { vidioc_querycap(fd, &mut caps) }
            .map_err(|e| Error::device("VIDIOC_QUERYCAP", e))?;
        debug!(capabilities = %format!("{:X}", caps.capabilities), "device capabilities");

        if tuner.type_ != V4L2_TUNER_RADIO {
            return Err(Error::config(format!("{} is not a FM radio", path)));
        }

        let divider = divider_for_capability(tuner.capability);
        Ok(Self {
            file,
            divider,
            min_mhz: tuner.rangelow as f32 / divider as f32,
            max_mhz: tuner.rangehigh as f32 / divider as f32,
            name: c_name(&tuner.name),
            stereo: tuner.audmode & V4L2_TUNER_MODE_STEREO != 0,
            signal: tuner.signal,
            rds_capture: caps.capabilities & V4L2_CAP_RDS_CAPTURE != 0,
        })
    }

    /// Read the current frequency in MHz.
    pub fn frequency(&self) -> Result<f32> {
        let mut freq: v4l2_frequency = unsafe { std::mem::zeroed() };
        freq.type_ = V4L2_TUNER_RADIO;
        unsafe { vidioc_g_frequency(self.file.as_raw_fd(), &mut freq) }
            .map_err(|e| Error::device("VIDIOC_G_FREQUENCY", e))?;
        Ok(freq.frequency as f32 / self.divider as f32)
    }

    /// Tune to a frequency in MHz.
    ///
    /// Fails with [`Error::OutOfRange`] unless strictly inside the band.
    pub fn set_frequency(&self, mhz: f32) -> Result<()> {
        if mhz >= self.max_mhz || mhz <= self.min_mhz {
            return Err(Error::OutOfRange {
                frequency: mhz,
                min: self.min_mhz,
                max: self.max_mhz,
            });
        }
        let mut freq: v4l2_frequency = unsafe { std::mem::zeroed() };
        freq.type_ = V4L2_TUNER_RADIO;
        freq.frequency = (mhz * self.divider as f32).round() as u32;
        unsafe { vidioc_s_frequency(self.file.as_raw_fd(), &freq) }
            .map_err(|e| Error::device("VIDIOC_S_FREQUENCY", e))?;
        Ok(())
    }

    /// Start a hardware seek with wrap-around and return the frequency
    /// it settled on.
    pub fn seek(&self, upward: bool) -> Result<f32> {
        let mut seek: v4l2_hw_freq_seek = unsafe { std::mem::zeroed() };
        seek.type_ = V4L2_TUNER_RADIO;
        seek.seek_upward = upward as u32;
        seek.wrap_around = 1;
        unsafe { vidioc_s_hw_freq_seek(self.file.as_raw_fd(), &seek) }
            .map_err(|e| Error::device("VIDIOC_S_HW_FREQ_SEEK", e))?;
        self.frequency()
    }

    /// Set the audio volume on a 0..=100 scale.
    ///
    /// Volume 0 mutes; anything above unmutes and is mapped linearly into
    /// the range advertised by `VIDIOC_QUERYCTRL`.
    pub fn set_volume(&self, volume: u32) -> Result<()> {
        let fd = self.file.as_raw_fd();
        let mut mute = v4l2_control {
            id: V4L2_CID_AUDIO_MUTE,
            value: (volume == 0) as i32,
        };
        unsafe { vidioc_s_ctrl(fd, &mut mute) }
            .map_err(|e| Error::device("VIDIOC_S_CTRL", e))?;

        let mut query: v4l2_queryctrl = unsafe { std::mem::zeroed() };
        query.id = V4L2_CID_AUDIO_VOLUME;
        unsafe { vidioc_queryctrl(fd, &mut query) }
            .map_err(|e| Error::device("VIDIOC_QUERYCTRL", e))?;

        let mut control = v4l2_control {
            id: V4L2_CID_AUDIO_VOLUME,
            value: map_volume(volume, query.minimum, query.maximum),
        };
        unsafe { vidioc_s_ctrl(fd, &mut control) }
            .map_err(|e| Error::device("VIDIOC_S_CTRL", e))?;
        Ok(())
    }

    /// Lower band edge in MHz.
    pub fn min_frequency(&self) -> f32 {
        self.min_mhz
    }

    /// Upper band edge in MHz.
    pub fn max_frequency(&self) -> f32 {
        self.max_mhz
    }

    /// Device tuning units per MHz (16 or 16000).
    pub fn divider(&self) -> u32 {
        self.divider
    }

    /// Tuner name as reported by the driver.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the tuner reported stereo audio mode.
    pub fn is_stereo(&self) -> bool {
        self.stereo
    }

    /// Signal strength as reported by the driver.
    pub fn signal(&self) -> i32 {
        self.signal
    }

    /// Whether the device can deliver raw RDS blocks.
    pub fn has_rds_capture(&self) -> bool {
        self.rds_capture
    }

    /// Read one raw RDS record into `buf`, returning the byte count
    /// (0 at end of stream, possibly short under load).
    pub fn read_rds_record(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        (&self.file).read(buf)
    }
}

impl AsRawFd for Tuner {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl AsFd for Tuner {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}
