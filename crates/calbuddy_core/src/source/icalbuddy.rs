//! `icalBuddy` subprocess source.
//!
//! # Invariants
//! - Every invocation is bounded by the configured timeout.
//! - A failed or empty ranged query falls back to `eventsToday` once.
//! - Timeouts and a missing binary abort without falling back.

use super::{ListingSource, LookbackWindow, SourceError, SourceResult};
use crate::parse::normalize::normalize_text;
use log::{info, warn};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

const DATE_FORMAT_ARG: &str = "%Y-%m-%d";
const TIME_FORMAT_ARG: &str = "%I:%M %p";

/// Runs `icalBuddy` with absolute dates and 12-hour times.
#[derive(Debug, Clone)]
pub struct IcalBuddySource {
    binary: String,
    timeout: Duration,
    raw_dump_path: Option<PathBuf>,
}

impl IcalBuddySource {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            raw_dump_path: None,
        }
    }

    /// Also writes the raw output to `path` (best effort) for debugging.
    pub fn with_raw_dump(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_dump_path = Some(path.into());
        self
    }

    /// Arguments for the ranged query covering `window`.
    pub fn range_args(window: &LookbackWindow) -> Vec<String> {
        let mut args = Self::base_args();
        args.push(format!("eventsFrom:{}", window.start().format(DATE_FORMAT_ARG)));
        args.push(format!("to:{}", window.today.format(DATE_FORMAT_ARG)));
        args
    }

    /// Arguments for the today-only fallback query.
    pub fn fallback_args() -> Vec<String> {
        let mut args = Self::base_args();
        args.push("eventsToday".to_string());
        args
    }

    fn base_args() -> Vec<String> {
        ["-nrd", "-df", DATE_FORMAT_ARG, "-tf", TIME_FORMAT_ARG]
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn run(&self, args: &[String]) -> SourceResult<String> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => SourceError::BinaryNotFound(self.binary.clone()),
                _ => SourceError::Io {
                    context: format!("failed to spawn `{}`", self.binary),
                    source,
                },
            })?;

        // Pipes are drained off-thread so a large listing cannot block the child.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                kill(&mut child);
                return Err(SourceError::TimedOut {
                    binary: self.binary.clone(),
                    timeout: self.timeout,
                });
            }
            Err(source) => {
                kill(&mut child);
                return Err(SourceError::Io {
                    context: format!("failed waiting for `{}`", self.binary),
                    source,
                });
            }
        };

        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;
        if !status.success() {
            return Err(SourceError::Failed {
                status: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(stdout)
    }

    fn write_raw_dump(&self, raw: &str) {
        let Some(path) = self.raw_dump_path.as_ref() else {
            return;
        };
        if let Err(err) = std::fs::write(path, raw) {
            warn!(
                "event=source_raw_dump module=source status=error error_code=write_failed error={}",
                err
            );
        }
    }
}

impl ListingSource for IcalBuddySource {
    fn name(&self) -> &str {
        "icalbuddy"
    }

    fn fetch_lines(&self, window: &LookbackWindow) -> SourceResult<Vec<String>> {
        let started_at = Instant::now();
        info!(
            "event=source_fetch module=source status=start source=icalbuddy lookback_days={}",
            window.days
        );

        let (raw, query) = match self.run(&Self::range_args(window)) {
            Ok(raw) if !raw.trim().is_empty() => (raw, "range"),
            Ok(_) | Err(SourceError::Failed { .. }) => {
                warn!(
                    "event=source_fetch module=source status=fallback source=icalbuddy query=eventsToday"
                );
                (self.run(&Self::fallback_args())?, "today_fallback")
            }
            Err(err) => return Err(err),
        };

        self.write_raw_dump(&raw);
        let lines = normalize_text(&raw);
        info!(
            "event=source_fetch module=source status=ok source=icalbuddy query={} lines={} duration_ms={}",
            query,
            lines.len(),
            started_at.elapsed().as_millis()
        );
        Ok(lines)
    }
}

type Drain = Option<JoinHandle<std::io::Result<String>>>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Drain {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buffer = String::new();
            pipe.read_to_string(&mut buffer).map(|_| buffer)
        })
    })
}

fn collect(handle: Drain) -> SourceResult<String> {
    let Some(handle) = handle else {
        return Ok(String::new());
    };
    let joined = handle.join().map_err(|_| SourceError::Io {
        context: "listing reader panicked".to_string(),
        source: std::io::Error::other("reader thread panicked"),
    })?;
    joined.map_err(|source| SourceError::Io {
        context: "failed to read listing output".to_string(),
        source,
    })
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
