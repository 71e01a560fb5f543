//! Bridge between the capture stream and the audio output device.
//!
//! The output device calls back once per period asking for N frames.
//! Each callback measures the capture delay, lets the controller derive
//! a resampling factor, reads exactly the input the resampler asks for
//! and hands back N resampled frames. All buffers are sized up front;
//! the callback path does not allocate.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rubato::{
    Resampler, SincFixedOut, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tinyaudio::prelude::*;
use tracing::{debug, error, info, trace, warn};

use super::capture::Capture;
use super::control::RateController;
use super::{CHANNELS, PERIODS, PERIOD_FRAMES, SERVER_PERIOD, SERVER_RATE, SOURCE_RATE};
use crate::error::{Error, Result};

const SAMPLE_16BIT_SCALING: f32 = 32767.0;

/// Controller diagnostics published by the realtime callback and read
/// by the owner loop.
#[derive(Default)]
pub struct BridgeStats {
    factor_bits: AtomicU64,
    offset_bits: AtomicU64,
    integral_bits: AtomicU64,
    new_delay: AtomicI64,
}

impl BridgeStats {
    fn publish(&self, factor: f64, offset: f64, integral: f64) {
        self.factor_bits.store(factor.to_bits(), Ordering::Relaxed);
        self.offset_bits.store(offset.to_bits(), Ordering::Relaxed);
        self.integral_bits
            .store(integral.to_bits(), Ordering::Relaxed);
    }

    fn note_resync(&self, delay: i64) {
        self.new_delay.store(delay, Ordering::Relaxed);
    }

    pub fn factor(&self) -> f64 {
        f64::from_bits(self.factor_bits.load(Ordering::Relaxed))
    }

    pub fn offset(&self) -> f64 {
        f64::from_bits(self.offset_bits.load(Ordering::Relaxed))
    }

    pub fn integral(&self) -> f64 {
        f64::from_bits(self.integral_bits.load(Ordering::Relaxed))
    }

    /// Last hard-resync delay, cleared on read.
    pub fn take_resync(&self) -> i64 {
        self.new_delay.swap(0, Ordering::Relaxed)
    }
}

struct Bridge {
    capture: Capture,
    controller: RateController,
    resampler: SincFixedOut<f32>,
    read_buf: Vec<i16>,
    planar_in: Vec<Vec<f32>>,
    planar_out: Vec<Vec<f32>>,
    stats: Arc<BridgeStats>,
}

impl Bridge {
    /// One server cycle. Failures that recovery cannot absorb terminate
    /// the process; the server never sees an error.
    fn process(&mut self, out: &mut [f32]) {
        let target = self.controller.target();
        let max_diff = self.controller.max_diff();

        let mut delay = match self.capture.avail() {
            Ok(d) => d,
            Err(e) => fatal(&e),
        };

        if delay > target + max_diff {
            let skip = delay - target;
            debug!(skip, delay, "capture ahead, skipping");
            if let Err(e) = self.capture.discard(&mut self.read_buf, skip) {
                fatal(&e);
            }
            self.stats.note_resync(delay);
            self.controller.reset();
            delay = target;
        } else if delay < target - max_diff {
            let rewound = match self.capture.rewind(target - delay) {
                Ok(r) => r,
                Err(e) => fatal(&e),
            };
            debug!(rewound, delay, "capture behind, rewound");
            self.stats.note_resync(delay);
            self.controller.reset();
            delay += rewound;
        }

        let offset = (delay - target) as f64;
        let factor = self.controller.update(delay);
        self.stats
            .publish(factor, offset, self.controller.integral());

        if let Err(e) = self.resampler.set_resample_ratio(factor, true) {
            warn!("resample ratio {} rejected: {}", factor, e);
        }

        let needed = self.resampler.input_frames_next();
        let interleaved = &mut self.read_buf[..needed * CHANNELS];
        if let Err(e) = self.capture.read_exact(interleaved) {
            fatal(&e);
        }

        for (ch, plane) in self.planar_in.iter_mut().enumerate() {
            plane.clear();
            plane.extend(
                interleaved[ch..]
                    .iter()
                    .step_by(CHANNELS)
                    .map(|&s| s as f32 / SAMPLE_16BIT_SCALING),
            );
        }

        let input: [&[f32]; CHANNELS] =
            [self.planar_in[0].as_slice(), self.planar_in[1].as_slice()];
        match self.resampler.process_into_buffer(&input, &mut self.planar_out, None) {
            Ok((_, produced)) => {
                let frames = out.len() / CHANNELS;
                for frame in 0..frames {
                    for ch in 0..CHANNELS {
                        out[frame * CHANNELS + ch] = if frame < produced {
                            self.planar_out[ch][frame]
                        } else {
                            0.0
                        };
                    }
                }
            }
            Err(e) => {
                warn!("resampler failed: {}", e);
                out.fill(0.0);
            }
        }
    }
}

fn fatal(err: &Error) -> ! {
    error!("audio bridge cannot continue: {}", err);
    std::process::exit(1);
}

/// Run the audio bridge until the quit flag is raised.
///
/// Opens the capture device, starts the output device (whose thread
/// runs the bridge cycle once per period), then sits in the 250 ms
/// supervision loop publishing controller diagnostics.
pub fn run(device: &str, quit: Arc<AtomicBool>) -> Result<()> {
    let capture = Capture::open(
        device,
        SOURCE_RATE,
        CHANNELS,
        PERIOD_FRAMES,
        PERIODS,
    )?;

    if capture.channels() != CHANNELS {
        return Err(Error::config(format!(
            "capture negotiated {} channels, need {}",
            capture.channels(),
            CHANNELS
        )));
    }

    let static_factor = SERVER_RATE as f64 / capture.rate() as f64;
    let buffer_frames = PERIODS as i64 * PERIOD_FRAMES;
    let target = buffer_frames / 2 + SERVER_PERIOD as i64 / 2;
    let max_diff = buffer_frames - target;
    info!(target, max_diff, static_factor, "audio bridge starting");

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 160,
        window: WindowFunction::BlackmanHarris2,
    };
    let resampler = SincFixedOut::<f32>::new(static_factor, 16.0, params, SERVER_PERIOD, CHANNELS)
        .map_err(|e| Error::config(format!("resampler: {}", e)))?;

    // Worst-case input demand at the lowest admissible ratio, plus the
    // whole capture buffer for hard skips.
    let max_input = resampler
        .input_frames_max()
        .max(buffer_frames as usize);

    let stats = Arc::new(BridgeStats::default());
    let mut bridge = Bridge {
        capture,
        controller: RateController::new(static_factor, target, max_diff),
        resampler,
        read_buf: vec![0i16; max_input * CHANNELS],
        planar_in: vec![Vec::with_capacity(max_input); CHANNELS],
        planar_out: vec![vec![0.0f32; SERVER_PERIOD]; CHANNELS],
        stats: Arc::clone(&stats),
    };

    let _device = run_output_device(
        OutputDeviceParameters {
            channels_count: CHANNELS,
            sample_rate: SERVER_RATE as usize,
            channel_sample_count: SERVER_PERIOD,
        },
        move |data| bridge.process(data),
    )
    .map_err(|e| Error::config(format!("audio output: {}", e)))?;

    while !quit.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(250));
        let resync = stats.take_resync();
        if resync != 0 {
            debug!(delay = resync, "hard resync");
        }
        trace!(
            factor = stats.factor(),
            offset = stats.offset(),
            integral = stats.integral(),
            "controller state"
        );
    }
    info!("audio bridge stopping");
    Ok(())
}
