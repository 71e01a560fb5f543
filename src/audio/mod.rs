//! Realtime audio path.
//!
//! Captures PCM from the sound card the tuner feeds and resamples it
//! into an audio output device running on an independent clock. A PI
//! controller (see [`control`]) continuously trims the resampling ratio
//! so the capture buffer hovers at a target delay.

pub mod bridge;
pub mod capture;
pub mod control;

/// Capture rate the tuner card is driven at.
pub const SOURCE_RATE: u32 = 96_000;
/// Interleaved capture channels.
pub const CHANNELS: usize = 2;
/// Capture period in frames.
pub const PERIOD_FRAMES: i64 = 2048;
/// Capture periods in the device buffer (~85 ms total).
pub const PERIODS: u32 = 4;

/// Output-server sample rate.
pub const SERVER_RATE: u32 = 48_000;
/// Frames requested per server callback.
pub const SERVER_PERIOD: usize = 1024;
