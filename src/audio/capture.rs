//! Sound-card capture wrapper.
//!
//! Opens the capture device nonblocking in S16_LE interleaved mode and
//! exposes the handful of operations the bridge needs: available-frame
//! queries, exact-count reads with retry, stream rewind and frame
//! discard. Underruns and suspends are recovered in place; only a
//! failed recovery surfaces as an error.

use std::thread;
use std::time::Duration;

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use nix::libc;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Pause between retries while the device is suspended or starved.
const RETRY_SLEEP: Duration = Duration::from_micros(100);

/// An opened capture stream.
pub struct Capture {
    pcm: PCM,
    rate: u32,
    channels: usize,
}

impl Capture {
    /// Open and configure a capture device. Rates, channel counts and
    /// buffer geometry are negotiated; mismatches against the request
    /// are logged, not fatal.
    pub fn open(
        device: &str,
        rate: u32,
        channels: usize,
        period: i64,
        periods: u32,
    ) -> Result<Self> {
        let pcm = PCM::new(device, Direction::Capture, true)?;
        let (actual_rate, actual_channels);
        {
            let hwp = HwParams::any(&pcm)?;
            hwp.set_access(Access::RWInterleaved)?;
            hwp.set_format(Format::s16())?;
            hwp.set_channels(channels as u32)?;
            hwp.set_rate(rate, ValueOr::Nearest)?;
            hwp.set_period_size_near(period, ValueOr::Nearest)?;
            hwp.set_periods(periods, ValueOr::Nearest)?;
            pcm.hw_params(&hwp)?;

            actual_rate = hwp.get_rate()?;
            actual_channels = hwp.get_channels()? as usize;
            let actual_period = hwp.get_period_size()?;
            let actual_buffer = hwp.get_buffer_size()?;
            if actual_rate != rate {
                warn!(requested = rate, got = actual_rate, "capture rate differs");
            }
            if actual_channels != channels {
                warn!(
                    requested = channels,
                    got = actual_channels,
                    "capture channel count differs"
                );
            }
            if actual_period != period || actual_buffer != period * periods as i64 {
                warn!(
                    period = actual_period,
                    buffer = actual_buffer,
                    "capture buffer geometry differs"
                );
            }
            info!(
                rate = actual_rate,
                channels = actual_channels,
                period = actual_period,
                buffer = actual_buffer,
                "capture configured"
            );
        }
        {
            let swp = pcm.sw_params_current()?;
            // Start once a full period is captured; wake with two.
            swp.set_start_threshold(period)?;
            swp.set_avail_min(2 * period)?;
            pcm.sw_params(&swp)?;
        }
        pcm.start()?;

        Ok(Self {
            pcm,
            rate: actual_rate,
            channels: actual_channels,
        })
    }

    /// Negotiated capture rate in Hz.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Negotiated channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Captured frames currently readable.
    pub fn avail(&self) -> Result<i64> {
        match self.pcm.avail() {
            Ok(frames) => Ok(frames),
            Err(e) => {
                self.recover(e)?;
                Ok(self.pcm.avail()?)
            }
        }
    }

    /// Move the read pointer back by `frames`; returns how far it
    /// actually went.
    pub fn rewind(&self, frames: i64) -> Result<i64> {
        Ok(self.pcm.rewind(frames)?)
    }

    /// Read exactly `buf.len() / channels` interleaved frames, retrying
    /// on starvation and recovering from xruns.
    pub fn read_exact(&self, buf: &mut [i16]) -> Result<()> {
        let io = self.pcm.io_i16()?;
        let mut offset = 0usize;
        while offset < buf.len() {
            match io.readi(&mut buf[offset..]) {
                Ok(got) => offset += got * self.channels,
                Err(e) if e.errno() == libc::EAGAIN => thread::sleep(RETRY_SLEEP),
                Err(e) => self.recover(e)?,
            }
        }
        Ok(())
    }

    /// Read and drop `frames` captured frames, chunked through
    /// `scratch`.
    pub fn discard(&self, scratch: &mut [i16], frames: i64) -> Result<()> {
        let io = self.pcm.io_i16()?;
        let chunk_frames = (scratch.len() / self.channels) as i64;
        let mut remaining = frames;
        while remaining > 0 {
            let want = remaining.min(chunk_frames) as usize * self.channels;
            match io.readi(&mut scratch[..want]) {
                Ok(got) => remaining -= got as i64,
                Err(e) if e.errno() == libc::EAGAIN => continue,
                Err(e) => self.recover(e)?,
            }
        }
        Ok(())
    }

    /// Bring the stream back after an underrun or suspend.
    ///
    /// EPIPE means an overrun on a capture stream: re-prepare. A
    /// suspended stream is resumed, polling until the suspend flag
    /// clears, falling back to prepare.
    pub fn recover(&self, err: alsa::Error) -> Result<()> {
        let errno = err.errno();
        if errno == libc::EPIPE {
            debug!("capture overrun, preparing");
            self.pcm.prepare()?;
            Ok(())
        } else if errno == libc::ESTRPIPE {
            debug!("capture suspended, resuming");
            loop {
                match self.pcm.resume() {
                    Ok(()) => return Ok(()),
                    Err(e) if e.errno() == libc::EAGAIN => thread::sleep(RETRY_SLEEP),
                    Err(_) => {
                        self.pcm.prepare()?;
                        return Ok(());
                    }
                }
            }
        } else {
            Err(err.into())
        }
    }
}
