//! Drives one input file from path validation through to a finished action.
//!
//! ```text
//! Start -> Validated -> Detected -> Enumerated -> Listing | Testing | Extracting -> Done
//!                                                                          \-> Failed
//! ```
//!
//! Every phase change is logged at debug level. Informational lines go to the
//! caller's output sink; errors are returned, never printed.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::actions::{self, Action, ActionOutcome};
use crate::error::{InputError, UnpackError};
use crate::handlers::ArchiveRecord;
use crate::progress::{ProgressState, Stage};
use crate::resolver::FormatResolver;

/// One invocation: which file, what to do with it, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub input: PathBuf,
    pub action: Action,
    /// Root for Extract; defaults to the input's directory.
    pub output_dir: Option<PathBuf>,
    /// Parent of the Test scratch directory; defaults to the system temp dir.
    pub temp_root: Option<PathBuf>,
}

impl Request {
    pub fn new(input: impl Into<PathBuf>, action: Action) -> Self {
        Self {
            input: input.into(),
            action,
            output_dir: None,
            temp_root: None,
        }
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn with_temp_root(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_root = dir;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Start,
    Validated,
    Detected,
    Enumerated,
    Listing,
    Testing,
    Extracting,
    Done,
    Failed,
}

/// Result of a successful run, suitable for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub input: PathBuf,
    pub size: u64,
    pub format: String,
    pub detected: Vec<String>,
    pub records: Vec<ArchiveRecord>,
    pub outcome: ActionOutcome,
}

pub struct Orchestrator<'a> {
    resolver: &'a dyn FormatResolver,
    progress: &'a ProgressState,
    phase: Phase,
}

impl<'a> Orchestrator<'a> {
    pub fn new(resolver: &'a dyn FormatResolver, progress: &'a ProgressState) -> Self {
        Self {
            resolver,
            progress,
            phase: Phase::Start,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run `request` to completion, writing informational lines to `out`.
    pub fn run(&mut self, request: &Request, out: &mut dyn Write) -> Result<Report, UnpackError> {
        self.phase = Phase::Start;
        match self.execute(request, out) {
            Ok(report) => {
                self.transition(Phase::Done);
                Ok(report)
            }
            Err(e) => {
                tracing::debug!(kind = ?e.kind(), "{}", e);
                self.transition(Phase::Failed);
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: Phase) {
        tracing::debug!(from = ?self.phase, to = ?next, "phase transition");
        self.phase = next;
    }

    /// A progress stage owned by the orchestrator itself. Running out of
    /// slots here only costs the status label.
    fn stage(&self, total: u64, status: &str) -> Option<Stage<'a>> {
        match self.progress.claim(total, status) {
            Ok(stage) => Some(stage),
            Err(e) => {
                tracing::warn!("no progress slot for {:?}: {}", status, e);
                None
            }
        }
    }

    fn execute(&mut self, request: &Request, out: &mut dyn Write) -> Result<Report, UnpackError> {
        let input = &request.input;
        let size = validate_input(input)?;
        self.transition(Phase::Validated);

        let absolute = absolute_path(input);
        writeln!(out, "Processing file: {}", absolute.display())?;
        writeln!(out, "File size: {size} bytes")?;

        let file = File::open(input).map_err(|source| InputError::CannotOpen {
            path: input.clone(),
            source,
        })?;
        let mut source = BufReader::new(file);
        let file_name = input.file_name().and_then(|n| n.to_str());

        let detecting = self.stage(0, "Detecting format");
        let types = self.resolver.detect(&mut source, file_name)?;
        drop(detecting);

        let format = self.resolver.preferred(&types);
        let format_name = format.to_string();
        writeln!(out, "File type: {format_name}")?;
        tracing::debug!(detected = ?types, preferred = %format_name, "format resolved");

        let handler = self
            .resolver
            .open_handler(format, file_name.unwrap_or_default())
            .ok_or_else(|| UnpackError::UnsupportedFormat(format_name.clone()))?;
        let archive = handler
            .as_archive()
            .ok_or_else(|| UnpackError::NotAnArchive(format_name.clone()))?;
        self.transition(Phase::Detected);

        let records = {
            let _enumerating = self.stage(0, "Reading records");
            archive
                .enumerate_records(&mut source, self.progress)
                .map_err(|source| UnpackError::Enumerate {
                    format: format_name.clone(),
                    source,
                })?
        };
        writeln!(out, "Number of records: {}", records.len())?;
        if records.is_empty() {
            return Err(UnpackError::EmptyArchive);
        }
        self.transition(Phase::Enumerated);

        let mut processing = self.stage(records.len() as u64, "Processing files");
        let outcome = match request.action {
            Action::List => {
                self.transition(Phase::Listing);
                actions::list::run(&records, out)?
            }
            Action::Test => {
                self.transition(Phase::Testing);
                actions::integrity::run(
                    archive,
                    &mut source,
                    request.temp_root.as_deref(),
                    self.progress,
                    out,
                )?
            }
            Action::Extract => {
                self.transition(Phase::Extracting);
                actions::extract::run(
                    archive,
                    &mut source,
                    records.len(),
                    input,
                    request.output_dir.as_deref(),
                    self.progress,
                    out,
                )?
            }
        };
        if let Some(stage) = processing.as_mut() {
            stage.advance(records.len() as u64);
        }
        drop(processing);

        writeln!(out, "Operation completed successfully")?;
        Ok(Report {
            input: absolute,
            size,
            format: format_name,
            detected: types.iter().map(ToString::to_string).collect(),
            records,
            outcome,
        })
    }
}

/// The input must exist and be a regular file. Returns its size.
fn validate_input(path: &Path) -> Result<u64, InputError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(InputError::NotFound(path.to_path_buf()))
        }
        Err(source) => {
            return Err(InputError::CannotOpen {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if !metadata.is_file() {
        return Err(InputError::NotAFile(path.to_path_buf()));
    }
    Ok(metadata.len())
}

fn absolute_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    })
}
