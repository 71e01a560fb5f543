//! FM radio monitor for Si470x-class V4L2 tuners.
//!
//! Tunes the radio, decodes the RDS stream and routes the captured
//! audio:
//! - default: pipe through `arecord | aplay`
//! - `-j`: bridge into the low-latency audio output with adaptive
//!   resampling
//! - `-o FILE`: pipe through an external Ogg encoder
//!
//! # Usage Examples
//!
//! ```bash
//! radiomon -F 98.5
//! radiomon -d /dev/radio0 -a hw:Music -j -v
//! radiomon -s -o capture.ogg
//! ```
//!
//! While running, `n` switches to the next known program, `+`/`-` step
//! the frequency by 0.05 MHz.

use std::io::ErrorKind;
use std::process::{Child, Command, ExitCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use clap::{ArgAction, Parser};
use tracing::{error, info, warn};

use radiomon::audio;
use radiomon::monitor::Monitor;
use radiomon::notify::Emitter;
use radiomon::tuner::Tuner;
use radiomon::{Error, Result};

#[derive(Parser, Debug)]
#[command(author, version, about = "FM radio monitor with RDS decoding for Si470x-class tuners", long_about = None)]
struct Args {
    /// Radio device
    #[arg(short = 'd', long, default_value = "/dev/radio0")]
    device: String,

    /// Audio device to read from
    #[arg(short = 'a', long = "audio-device", default_value = "hw:Music")]
    audio_device: String,

    /// Set frequency (in MHz)
    #[arg(short = 'F', long)]
    frequency: Option<f32>,

    /// Bridge captured audio into the audio server
    #[arg(short = 'j', long = "bridge", default_value_t = false)]
    bridge: bool,

    /// Write output to this file through an external encoder
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Seek upward for a station at startup
    #[arg(short = 's', long, default_value_t = false)]
    seek: bool,

    /// Increase verbosity (-v diagnostics, -vv raw groups)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Emit events as JSON lines instead of text
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // 0 = WARN (quiet), 1 = INFO, 2 = DEBUG, 3+ = TRACE
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .try_init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let quit = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&quit))?;
    }

    let tuner = match Tuner::open(&args.device) {
        Ok(tuner) => tuner,
        Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
            error!("Device {} does not exist", args.device);
            return Err(e.into());
        }
        Err(e) => return Err(e),
    };

    println!(
        "Tuner: {} ({}), {}",
        tuner.name(),
        if tuner.is_stereo() { "stereo" } else { "mono" },
        tuner.signal()
    );
    println!(
        "Radio: {:.1} <= {:.1} <= {:.1}",
        tuner.min_frequency(),
        tuner.frequency()?,
        tuner.max_frequency()
    );

    let mut current_mhz = match args.frequency {
        Some(mhz) => match tuner.set_frequency(mhz) {
            Ok(()) => mhz,
            Err(e) => {
                warn!("{}", e);
                tuner.frequency()?
            }
        },
        None => tuner.frequency()?,
    };

    if args.seek {
        match tuner.seek(true) {
            Ok(freq) if freq >= tuner.min_frequency() / 2.0 => {
                current_mhz = freq;
                println!("Seek stopped at {:.2}", freq);
            }
            Ok(_) => println!("Seek failed"),
            Err(e) => {
                warn!("{}", e);
                println!("Seek failed");
            }
        }
    }

    if let Err(e) = tuner.set_volume(100) {
        warn!("{}", e);
    }

    let audio_path = start_audio_path(args, &quit)?;

    if tuner.has_rds_capture() {
        let emitter = Emitter::new(args.verbose, args.json);
        let mut monitor = Monitor::new(&tuner, emitter, current_mhz, Arc::clone(&quit));
        let outcome = monitor.run();
        quit.store(true, Ordering::Relaxed);
        stop_audio_path(audio_path);
        outcome
    } else {
        println!("Radio Data System not supported, try linux-2.6.32 or later");
        while !quit.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_secs(1));
        }
        stop_audio_path(audio_path);
        Ok(())
    }
}

enum AudioPath {
    Bridge(JoinHandle<()>),
    Child(Child),
}

/// Start whichever audio path the flags select: the adaptive bridge on
/// its own thread, or an external `arecord` pipeline reading the card
/// at 96 kHz, 2 channels, S16_LE.
fn start_audio_path(args: &Args, quit: &Arc<AtomicBool>) -> Result<AudioPath> {
    if args.bridge {
        let device = args.audio_device.clone();
        let quit = Arc::clone(quit);
        let handle = thread::spawn(move || {
            if let Err(e) = audio::bridge::run(&device, quit) {
                error!("{}", e);
                std::process::exit(1);
            }
        });
        return Ok(AudioPath::Bridge(handle));
    }

    let pipeline = match &args.output {
        Some(path) => format!(
            "arecord -q -D '{}' -r96000 -c2 -f S16_LE | \
             oggenc -Q --resample 48000 -q 5 -o '{}' -",
            args.audio_device, path
        ),
        None => format!(
            "arecord -q -D '{}' -r96000 -c2 -f S16_LE | aplay -q -B -",
            args.audio_device
        ),
    };
    info!(command = %pipeline, "starting audio pipeline");
    let child = Command::new("sh").arg("-c").arg(&pipeline).spawn()?;
    Ok(AudioPath::Child(child))
}

fn stop_audio_path(path: AudioPath) {
    match path {
        AudioPath::Bridge(handle) => {
            let _ = handle.join();
        }
        AudioPath::Child(mut child) => {
            // The recorder pipeline reads the card until we go away;
            // take it down with us.
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
