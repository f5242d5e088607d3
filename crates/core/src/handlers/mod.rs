//! Format handlers. A [`FileHandler`] is bound to one detected [`Format`];
//! archive-capable handlers expose an [`ArchiveHandler`] that enumerates and
//! extracts records.

pub mod opaque;
pub mod stream;
pub mod tar;
pub mod zip;

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::Serialize;

use crate::detect::Format;
use crate::error::HandlerError;
use crate::progress::ProgressState;

/// A readable, seekable byte source (the opened input file, or a buffer in tests).
pub trait ByteSource: Read + Seek {}

impl<T: Read + Seek + ?Sized> ByteSource for T {}

/// One logical entry inside an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveRecord {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// CRC32 of the entry data; 0 when the format does not carry one.
    pub crc32: u32,
    /// Raw on-disk size, used when `compressed_size` is unknown.
    pub stream_size: u64,
    pub is_dir: bool,
}

impl ArchiveRecord {
    pub fn display_compressed_size(&self) -> u64 {
        if self.compressed_size == 0 {
            self.stream_size
        } else {
            self.compressed_size
        }
    }
}

/// What a successful extraction produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    pub entries: u64,
    pub files: u64,
    pub bytes: u64,
}

pub trait FileHandler: Send + Sync {
    fn format(&self) -> Format;

    /// The archive capability, if this type can be enumerated and extracted.
    fn as_archive(&self) -> Option<&dyn ArchiveHandler> {
        None
    }

    fn is_archive_capable(&self) -> bool {
        self.as_archive().is_some()
    }
}

pub trait ArchiveHandler: Send + Sync {
    /// List the records in `source`. Implementations rewind the source first.
    fn enumerate_records(
        &self,
        source: &mut dyn ByteSource,
        progress: &ProgressState,
    ) -> Result<Vec<ArchiveRecord>, HandlerError>;

    /// Materialize every record under `destination`, which already exists.
    fn extract_to_folder(
        &self,
        source: &mut dyn ByteSource,
        destination: &Path,
        progress: &ProgressState,
    ) -> Result<ExtractSummary, HandlerError>;
}

/// Length of the source in bytes. Leaves the cursor at the start.
pub(crate) fn source_len(source: &mut dyn ByteSource) -> io::Result<u64> {
    let len = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;
    Ok(len)
}

const COPY_CHUNK: usize = 64 * 1024;

/// Copy `reader` into `writer`, polling the stop flag between chunks.
pub(crate) fn copy_with_cancel<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    progress: &ProgressState,
) -> Result<u64, HandlerError> {
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut copied: u64 = 0;
    loop {
        if progress.should_stop() {
            return Err(HandlerError::Cancelled);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        writer.write_all(&buf[..n])?;
        copied += n as u64;
    }
}
