use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::actions::ActionOutcome;
use crate::error::{HandlerError, UnpackError};
use crate::handlers::{ArchiveHandler, ByteSource};
use crate::progress::ProgressState;

/// The directory extraction directories are created in: `output`, else the
/// input's own directory, made absolute against the working directory.
pub fn extraction_root(input: &Path, output: Option<&Path>) -> PathBuf {
    if let Some(dir) = output {
        return dir.to_path_buf();
    }
    let input = match env::current_dir() {
        Ok(cwd) if input.is_relative() => cwd.join(input),
        _ => input.to_path_buf(),
    };
    input
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `<root>/<input name without its final extension>`.
pub fn destination_for(input: &Path, output: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "extracted".into());
    extraction_root(input, output).join(stem)
}

/// Extract every record of `input` into its destination directory. Partial
/// output is left in place on failure.
pub fn run(
    handler: &dyn ArchiveHandler,
    source: &mut dyn ByteSource,
    record_count: usize,
    input: &Path,
    output: Option<&Path>,
    progress: &ProgressState,
    out: &mut dyn Write,
) -> Result<ActionOutcome, UnpackError> {
    writeln!(out, "Extracting to: {}", extraction_root(input, output).display())?;

    let destination = destination_for(input, output);
    let failed = |source: HandlerError| UnpackError::ExtractionFailed {
        destination: destination.clone(),
        source,
    };
    fs::create_dir_all(&destination).map_err(|e| failed(e.into()))?;

    writeln!(out, "Unpacking archive...")?;
    let summary = handler
        .extract_to_folder(source, &destination, progress)
        .map_err(failed)?;
    tracing::info!(
        "extracted {} entries ({} bytes) into {}",
        summary.entries,
        summary.bytes,
        destination.display()
    );

    writeln!(out, "Extracted {record_count} file(s) successfully")?;
    Ok(ActionOutcome::Extracted {
        destination,
        files: record_count,
    })
}
