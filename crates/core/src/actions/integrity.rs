use std::io::Write;
use std::path::Path;

use walkdir::WalkDir;

use crate::actions::ActionOutcome;
use crate::error::UnpackError;
use crate::handlers::{ArchiveHandler, ByteSource};
use crate::progress::ProgressState;

pub const TEMP_PREFIX: &str = "xunpack_test_";

/// Extract into a throwaway directory and check that something came out.
/// The directory is removed whatever the result.
pub fn run(
    handler: &dyn ArchiveHandler,
    source: &mut dyn ByteSource,
    temp_root: Option<&Path>,
    progress: &ProgressState,
    out: &mut dyn Write,
) -> Result<ActionOutcome, UnpackError> {
    writeln!(out, "Testing archive integrity...")?;

    let root = temp_root.map_or_else(std::env::temp_dir, Path::to_path_buf);
    let temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempdir_in(&root)
        .map_err(|e| UnpackError::TestFailed {
            reason: format!("cannot create temporary directory: {e}"),
            temp_dir: root.clone(),
        })?;
    let temp_dir = temp.path().to_path_buf();
    writeln!(out, "Extracting to temporary location: {}", temp_dir.display())?;

    let extracted = handler.extract_to_folder(source, &temp_dir, progress);
    let files = match &extracted {
        Ok(_) => count_files(&temp_dir),
        Err(_) => 0,
    };

    if let Err(e) = temp.close() {
        tracing::warn!("failed to remove {}: {}", temp_dir.display(), e);
    }

    match extracted {
        Ok(_) if files > 0 => {
            writeln!(out, "Test PASSED: Successfully extracted {files} file(s)")?;
            tracing::info!("test passed with {} files", files);
            Ok(ActionOutcome::Tested { files, temp_dir })
        }
        Ok(_) => Err(UnpackError::TestFailed {
            reason: "no files were produced".to_string(),
            temp_dir,
        }),
        Err(e) => Err(UnpackError::TestFailed {
            reason: e.to_string(),
            temp_dir,
        }),
    }
}

/// Regular files anywhere under `dir`.
pub fn count_files(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .count() as u64
}
