use std::fs;
use std::path::Path;

use tar::Archive;

use crate::codec::{maybe_decoder, Codec};
use crate::detect::Format;
use crate::error::{HandlerError, SecurityError};
use crate::handlers::{
    source_len, ArchiveHandler, ArchiveRecord, ByteSource, ExtractSummary, FileHandler,
};
use crate::progress::{ProgressState, StageReader};
use crate::security::{self, SecurityLimits};

/// Tar archives, plain or inside one compressed stream.
pub struct TarHandler {
    codec: Option<Codec>,
    limits: SecurityLimits,
}

impl TarHandler {
    pub fn new(codec: Option<Codec>, limits: SecurityLimits) -> Self {
        Self { codec, limits }
    }

    fn format_name(&self) -> String {
        Format::Tar(self.codec).to_string()
    }

    /// Tar has no central directory, so both operations stream the whole
    /// source. Progress is reported in compressed bytes consumed.
    fn open<'a>(
        &self,
        source: &'a mut dyn ByteSource,
        progress: &'a ProgressState,
        status: &str,
    ) -> Result<Archive<Box<dyn std::io::Read + 'a>>, HandlerError> {
        let len = source_len(source)?;
        let stage = progress.claim(len, status)?;
        let reader = StageReader::new(source, stage);
        let decoder = maybe_decoder(self.codec, reader)?;
        Ok(Archive::new(decoder))
    }

    fn malformed(&self, err: std::io::Error) -> HandlerError {
        HandlerError::malformed(self.format_name(), err)
    }
}

impl FileHandler for TarHandler {
    fn format(&self) -> Format {
        Format::Tar(self.codec)
    }

    fn as_archive(&self) -> Option<&dyn ArchiveHandler> {
        Some(self)
    }
}

impl ArchiveHandler for TarHandler {
    fn enumerate_records(
        &self,
        source: &mut dyn ByteSource,
        progress: &ProgressState,
    ) -> Result<Vec<ArchiveRecord>, HandlerError> {
        let status = format!("Reading {} headers", self.format_name());
        let mut archive = self.open(source, progress, &status)?;

        let mut records = Vec::new();
        for entry in archive.entries().map_err(|e| self.malformed(e))? {
            if progress.should_stop() {
                return Err(HandlerError::Cancelled);
            }
            let entry = entry.map_err(|e| self.malformed(e))?;
            let size = entry.size();
            records.push(ArchiveRecord {
                name: String::from_utf8_lossy(&entry.path_bytes()).into_owned(),
                compressed_size: 0,
                uncompressed_size: size,
                crc32: 0,
                stream_size: size,
                is_dir: entry.header().entry_type().is_dir(),
            });
        }
        Ok(records)
    }

    fn extract_to_folder(
        &self,
        source: &mut dyn ByteSource,
        destination: &Path,
        progress: &ProgressState,
    ) -> Result<ExtractSummary, HandlerError> {
        let status = format!("Unpacking {}", self.format_name());
        let mut archive = self.open(source, progress, &status)?;
        archive.set_overwrite(true);
        let current = progress.claim(0, "")?;

        let mut summary = ExtractSummary::default();
        for entry in archive.entries().map_err(|e| self.malformed(e))? {
            if progress.should_stop() {
                return Err(HandlerError::Cancelled);
            }
            let mut entry = entry.map_err(|e| self.malformed(e))?;
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            security::check_entry_path(&name)?;
            security::check_file_count(summary.entries + 1, &self.limits)?;
            let size = entry.size();
            security::check_total_size(summary.bytes.saturating_add(size), &self.limits)?;

            current.set_status(name.clone());
            let is_file = entry.header().entry_type().is_file();
            if !entry.unpack_in(destination)? {
                return Err(SecurityError::PathTraversal { path: name }.into());
            }

            summary.entries += 1;
            if is_file {
                summary.files += 1;
                summary.bytes += size;
            }
        }

        if summary.entries == 0 {
            // An empty tar stream still leaves the destination in place.
            fs::create_dir_all(destination)?;
        }
        tracing::debug!(
            "extracted {} {} entries ({} bytes) into {}",
            summary.entries,
            self.format_name(),
            summary.bytes,
            destination.display()
        );
        Ok(summary)
    }
}
