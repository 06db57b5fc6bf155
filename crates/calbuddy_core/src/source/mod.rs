//! Listing sources feeding the parser.
//!
//! # Responsibility
//! - Define the listing collaborator contract.
//! - Report source unavailability before any reconciliation starts.
//!
//! # Invariants
//! - Sources never touch storage.
//! - Returned lines are normalized.

use crate::parse::normalize::normalize_text;
use chrono::{Duration, NaiveDate};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

mod icalbuddy;

pub use icalbuddy::IcalBuddySource;

pub type SourceResult<T> = Result<T, SourceError>;

/// The listing collaborator failed; the run must abort without writing.
#[derive(Debug)]
pub enum SourceError {
    BinaryNotFound(String),
    TimedOut { binary: String, timeout: StdDuration },
    Failed { status: Option<i32>, stderr: String },
    Io { context: String, source: std::io::Error },
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BinaryNotFound(binary) => write!(
                f,
                "`{binary}` not found; install it with `brew install ical-buddy`"
            ),
            Self::TimedOut { binary, timeout } => write!(
                f,
                "`{binary}` timed out after {} seconds",
                timeout.as_secs()
            ),
            Self::Failed { status, stderr } => match status {
                Some(code) => write!(f, "listing command failed with status {code}: {stderr}"),
                None => write!(f, "listing command terminated by signal: {stderr}"),
            },
            Self::Io { context, source } => write!(f, "{context}: {source}"),
        }
    }
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Days covered by one fetch, ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    pub today: NaiveDate,
    pub days: u32,
}

impl LookbackWindow {
    pub fn new(today: NaiveDate, days: u32) -> Self {
        Self { today, days }
    }

    pub fn start(&self) -> NaiveDate {
        self.today
            .checked_sub_signed(Duration::days(i64::from(self.days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// A look-back window is not the full current state.
    pub fn is_partial(&self) -> bool {
        self.days > 0
    }
}

/// Listing collaborator contract.
pub trait ListingSource {
    /// Short name for logs.
    fn name(&self) -> &str;
    fn fetch_lines(&self, window: &LookbackWindow) -> SourceResult<Vec<String>>;
}

/// Reads a previously captured listing from disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ListingSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch_lines(&self, _window: &LookbackWindow) -> SourceResult<Vec<String>> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| {
            error!(
                "event=source_fetch module=source status=error source=file error_code=read_failed error={}",
                source
            );
            SourceError::Io {
                context: format!("failed to read listing `{}`", self.path.display()),
                source,
            }
        })?;

        let lines = normalize_text(&raw);
        info!(
            "event=source_fetch module=source status=ok source=file lines={}",
            lines.len()
        );
        Ok(lines)
    }
}
