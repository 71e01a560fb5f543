//! PI controller for the adaptive resampling ratio.
//!
//! Once per server cycle the bridge records how far the capture buffer
//! sits from its target delay. The controller low-passes that offset
//! with a Hann-windowed ring of the last 512 samples, integrates it,
//! and derives a resampling factor:
//!
//! ```text
//! factor = static − smooth/catch_factor − integral/(catch_factor·catch_factor2)
//! ```
//!
//! The factor is quantized around a slow rolling mean so integrator
//! noise cannot dither the resampler, then clamped to [0.25, 4.0].

/// Offset samples kept for smoothing.
pub const SMOOTH_SIZE: usize = 512;

/// Proportional gain divisor.
const CATCH_FACTOR: f64 = 100_000.0;
/// Additional integral gain divisor.
const CATCH_FACTOR2: f64 = 10_000.0;
/// Smoothed offsets below this magnitude feed only the integrator.
const P_CLAMP: f64 = 15.0;
/// Quantization steps per unit of ratio.
const CONTROL_QUANT: f64 = 10_000.0;

pub const MIN_RESAMPLE_FACTOR: f64 = 0.25;
pub const MAX_RESAMPLE_FACTOR: f64 = 4.0;

fn hann(x: f64) -> f64 {
    0.5 * (1.0 - (2.0 * std::f64::consts::PI * x).cos())
}

/// Controller state for one capture stream.
pub struct RateController {
    static_factor: f64,
    mean: f64,
    target: i64,
    max_diff: i64,
    offsets: Box<[f64; SMOOTH_SIZE]>,
    window: Box<[f64; SMOOTH_SIZE]>,
    index: usize,
    integral: f64,
    smoothed: f64,
}

impl RateController {
    /// `static_factor` is server rate ÷ source rate; `target` the
    /// desired capture delay in frames; `max_diff` the band around it
    /// inside which no hard resync happens.
    pub fn new(static_factor: f64, target: i64, max_diff: i64) -> Self {
        let mut window = Box::new([0.0; SMOOTH_SIZE]);
        for (i, w) in window.iter_mut().enumerate() {
            *w = hann(i as f64 / (SMOOTH_SIZE as f64 - 1.0));
        }
        Self {
            static_factor,
            mean: static_factor,
            target,
            max_diff,
            offsets: Box::new([0.0; SMOOTH_SIZE]),
            window,
            index: 0,
            integral: 0.0,
            smoothed: 0.0,
        }
    }

    pub fn target(&self) -> i64 {
        self.target
    }

    pub fn max_diff(&self) -> i64 {
        self.max_diff
    }

    /// Last smoothed offset, for diagnostics.
    pub fn smoothed_offset(&self) -> f64 {
        self.smoothed
    }

    /// Current integrator value, for diagnostics.
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Begin a new control cycle after a hard skip or rewind: preload
    /// the integrator so the output starts from the learned mean, and
    /// clear the offset history.
    pub fn reset(&mut self) {
        self.integral = -(self.mean - self.static_factor) * CATCH_FACTOR * CATCH_FACTOR2;
        self.offsets.fill(0.0);
    }

    /// Record this cycle's capture delay and return the resampling
    /// factor to use.
    pub fn update(&mut self, delay: i64) -> f64 {
        let offset = (delay - self.target) as f64;
        self.offsets[self.index % SMOOTH_SIZE] = offset;
        self.index = self.index.wrapping_add(1);

        let mut smooth = 0.0;
        for i in 0..SMOOTH_SIZE {
            smooth += self.offsets[(i + self.index - 1) % SMOOTH_SIZE] * self.window[i];
        }
        smooth /= SMOOTH_SIZE as f64;
        self.smoothed = smooth;

        self.integral += smooth;

        // The smoothed offset still carries noise that would land on the
        // resampling coefficient; below the clamp only the integrator
        // keeps fine-tuning.
        if smooth.abs() < P_CLAMP {
            smooth = 0.0;
        }

        let mut factor = self.static_factor
            - smooth / CATCH_FACTOR
            - self.integral / CATCH_FACTOR / CATCH_FACTOR2;

        factor = ((factor - self.mean) * CONTROL_QUANT).round() / CONTROL_QUANT + self.mean;

        factor = factor.clamp(MIN_RESAMPLE_FACTOR, MAX_RESAMPLE_FACTOR);

        self.mean = 0.9999 * self.mean + 0.0001 * factor;
        factor
    }
}
