//! The RDS event loop.
//!
//! One cooperative loop multiplexes the tuner's RDS stream and standard
//! input with a 1 s poll timeout. Keystrokes mutate tuner state inline
//! (`n` next program, `+`/`-` frequency steps), so no handler runs
//! concurrently with block accumulation. When stdin is a terminal it is
//! switched out of canonical mode for the duration of the loop and
//! restored on every exit path.

use std::io::{IsTerminal, Read};
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::notify::{Emitter, Notice};
use crate::programs::NextStation;
use crate::rds::{BlockRecord, RdsDecoder, RECORD_SIZE};
use crate::tuner::Tuner;

/// Poll timeout; expiry only drives the "no RDS data" heartbeat.
const POLL_TIMEOUT_MS: u16 = 1000;

/// Frequency step for the `+`/`-` keys, in MHz.
const STEP_MHZ: f32 = 0.05;

/// Restores the saved terminal attributes when dropped.
struct RawModeGuard {
    saved: Termios,
}

impl RawModeGuard {
    fn engage() -> Result<Self> {
        let stdin = std::io::stdin();
        let saved =
            termios::tcgetattr(&stdin).map_err(|e| Error::device("tcgetattr", e))?;
        let mut raw = saved.clone();
        raw.local_flags.remove(LocalFlags::ECHO | LocalFlags::ICANON);
        termios::tcsetattr(&stdin, SetArg::TCSAFLUSH, &raw)
            .map_err(|e| Error::device("tcsetattr", e))?;
        Ok(Self { saved })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(&std::io::stdin(), SetArg::TCSAFLUSH, &self.saved);
    }
}

/// Drives the RDS decoder and the keyboard against one tuner.
pub struct Monitor<'a> {
    tuner: &'a Tuner,
    decoder: RdsDecoder,
    emitter: Emitter,
    current_mhz: f32,
    quit: Arc<AtomicBool>,
}

impl<'a> Monitor<'a> {
    pub fn new(
        tuner: &'a Tuner,
        emitter: Emitter,
        current_mhz: f32,
        quit: Arc<AtomicBool>,
    ) -> Self {
        Self {
            tuner,
            decoder: RdsDecoder::new(tuner.min_frequency()),
            emitter,
            current_mhz,
            quit,
        }
    }

    /// Run until end of stream or until the quit flag is raised.
    pub fn run(&mut self) -> Result<()> {
        let stdin = std::io::stdin();
        let _guard = if stdin.is_terminal() {
            Some(RawModeGuard::engage()?)
        } else {
            None
        };

        loop {
            if self.quit.load(Ordering::Relaxed) {
                debug!("quit flag set, leaving RDS loop");
                return Ok(());
            }

            let mut fds = [
                PollFd::new(self.tuner.as_fd(), PollFlags::POLLIN),
                PollFd::new(stdin.as_fd(), PollFlags::POLLIN),
            ];
            let ready = match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
                Ok(n) => n,
                Err(nix::Error::EINTR) => continue,
                Err(e) => return Err(Error::device("poll", e)),
            };
            if ready == 0 {
                self.emitter.emit(&Notice::NoRdsData);
                continue;
            }
            let tuner_ready = fds[0].revents().is_some_and(|r| !r.is_empty());
            let stdin_ready = fds[1].revents().is_some_and(|r| !r.is_empty());
            drop(fds);

            if tuner_ready {
                let mut buf = [0u8; RECORD_SIZE];
                let count = self.tuner.read_rds_record(&mut buf)?;
                if count == 0 {
                    debug!("RDS stream ended");
                    return Ok(());
                }
                if count != RECORD_SIZE {
                    self.emitter.emit(&Notice::ShortRead { count });
                } else {
                    self.decoder
                        .handle_record(BlockRecord::from_bytes(buf), self.current_mhz);
                    let notices = self.decoder.take_notices();
                    self.emitter.emit_all(notices);
                }
            }

            if stdin_ready {
                let mut key = [0u8; 1];
                if (&stdin).read(&mut key)? == 0 {
                    debug!("stdin closed");
                    return Ok(());
                }
                self.handle_key(key[0]);
            }
        }
    }

    fn handle_key(&mut self, key: u8) {
        match key {
            b'n' => self.next_program(),
            b'+' => self.step_frequency(STEP_MHZ),
            b'-' => self.step_frequency(-STEP_MHZ),
            _ => self.emitter.emit(&Notice::Keyboard { key }),
        }
    }

    fn step_frequency(&mut self, delta_mhz: f32) {
        self.current_mhz += delta_mhz;
        if self.current_mhz > self.tuner.max_frequency() {
            self.current_mhz = self.tuner.min_frequency();
        } else if self.current_mhz < self.tuner.min_frequency() {
            self.current_mhz = self.tuner.max_frequency();
        }
        if let Err(e) = self.tuner.set_frequency(self.current_mhz) {
            warn!("{}", e);
        }
        self.emitter.emit(&Notice::FrequencyTuned {
            freq_mhz: self.current_mhz,
        });
    }

    fn next_program(&mut self) {
        match self
            .decoder
            .programs()
            .next_after(self.current_mhz, self.tuner.min_frequency())
        {
            NextStation::Switch {
                name,
                freq_mhz,
                ..
            } => {
                if let Some(name) = name {
                    self.emitter.emit(&Notice::Switching { name, freq_mhz });
                }
                if let Err(e) = self.tuner.set_frequency(freq_mhz) {
                    warn!("{}", e);
                }
                self.current_mhz = freq_mhz;
            }
            NextStation::NoneKnown => self.emitter.emit(&Notice::NoOtherStations),
            NextStation::NoMatch => {}
        }
    }
}
