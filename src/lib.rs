//! FM radio monitor core for Si470x-class V4L2 tuners.
//!
//! Provides the building blocks of the `radiomon` binary:
//! - Tuner facade over the kernel radio device (frequency, seek, volume)
//! - RDS (RBDS) group decoder with a persistent program model
//! - Clock/date arithmetic for RDS group 4A
//! - Adaptive audio bridge from a sound-card capture into an audio
//!   output device running on its own clock

pub mod audio;
pub mod clock;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod programs;
pub mod rds;
pub mod tuner;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use monitor::Monitor;
pub use notify::{Emitter, Notice};
pub use programs::ProgramTable;
pub use rds::RdsDecoder;
pub use tuner::Tuner;
