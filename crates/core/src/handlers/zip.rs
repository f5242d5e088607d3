use std::fs;
use std::io::{BufWriter, SeekFrom};
use std::path::Path;

use zip::ZipArchive;

use crate::detect::Format;
use crate::error::HandlerError;
use crate::handlers::{
    copy_with_cancel, ArchiveHandler, ArchiveRecord, ByteSource, ExtractSummary, FileHandler,
};
use crate::progress::{ProgressState, StageReader};
use crate::security::{self, SecurityLimits};

const FORMAT: &str = "ZIP";

pub struct ZipHandler {
    limits: SecurityLimits,
}

impl ZipHandler {
    pub fn new(limits: SecurityLimits) -> Self {
        Self { limits }
    }
}

fn open(source: &mut dyn ByteSource) -> Result<ZipArchive<&mut dyn ByteSource>, HandlerError> {
    source.seek(SeekFrom::Start(0))?;
    ZipArchive::new(source).map_err(|e| HandlerError::malformed(FORMAT, e))
}

impl FileHandler for ZipHandler {
    fn format(&self) -> Format {
        Format::Zip
    }

    fn as_archive(&self) -> Option<&dyn ArchiveHandler> {
        Some(self)
    }
}

impl ArchiveHandler for ZipHandler {
    fn enumerate_records(
        &self,
        source: &mut dyn ByteSource,
        progress: &ProgressState,
    ) -> Result<Vec<ArchiveRecord>, HandlerError> {
        let mut archive = open(source)?;
        let count = archive.len();
        let mut stage = progress.claim(count as u64, "Reading ZIP directory")?;

        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            if stage.should_stop() {
                return Err(HandlerError::Cancelled);
            }
            let file = archive
                .by_index_raw(i)
                .map_err(|e| HandlerError::malformed(FORMAT, e))?;
            records.push(ArchiveRecord {
                name: file.name().to_string(),
                compressed_size: file.compressed_size(),
                uncompressed_size: file.size(),
                crc32: file.crc32(),
                stream_size: file.compressed_size(),
                is_dir: file.is_dir(),
            });
            stage.advance(i as u64 + 1);
        }
        Ok(records)
    }

    fn extract_to_folder(
        &self,
        source: &mut dyn ByteSource,
        destination: &Path,
        progress: &ProgressState,
    ) -> Result<ExtractSummary, HandlerError> {
        let mut archive = open(source)?;
        let count = archive.len();
        security::check_file_count(count as u64, &self.limits)?;

        let mut entries = progress.claim(count as u64, "Extracting files")?;
        let mut summary = ExtractSummary::default();

        for i in 0..count {
            if entries.should_stop() {
                return Err(HandlerError::Cancelled);
            }
            let file = archive
                .by_index(i)
                .map_err(|e| HandlerError::malformed(FORMAT, e))?;
            let name = file.name().to_string();
            security::check_entry_path(&name)?;
            let relative = file
                .enclosed_name()
                .ok_or_else(|| crate::error::SecurityError::PathTraversal { path: name.clone() })?;
            let target = destination.join(relative);

            if file.is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                security::check_total_size(summary.bytes.saturating_add(file.size()), &self.limits)?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let size = file.size();
                let stage = progress.claim(size, format!("Decompressing {name}"))?;
                let mut reader = StageReader::new(file, stage);
                let mut out = BufWriter::new(fs::File::create(&target)?);
                let written = copy_with_cancel(&mut reader, &mut out, progress)?;
                out.into_inner().map_err(|e| e.into_error())?;
                summary.files += 1;
                summary.bytes += written;
            }

            summary.entries += 1;
            entries.advance(summary.entries);
        }

        tracing::debug!(
            "extracted {} ZIP entries ({} bytes) into {}",
            summary.entries,
            summary.bytes,
            destination.display()
        );
        Ok(summary)
    }
}
