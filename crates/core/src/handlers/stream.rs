use std::fs;
use std::io::{self, BufWriter, Read, SeekFrom};

use flate2::CrcReader;
use std::path::Path;

use crate::codec::Codec;
use crate::detect::Format;
use crate::error::HandlerError;
use crate::handlers::{
    copy_with_cancel, source_len, ArchiveHandler, ArchiveRecord, ByteSource, ExtractSummary,
    FileHandler,
};
use crate::progress::{ProgressState, StageReader};
use crate::security::{self, SecurityLimits};

/// A single compressed stream (`notes.txt.gz`), presented as an archive of one record.
pub struct StreamHandler {
    codec: Codec,
    /// Record name used when the stream does not carry one.
    fallback_name: String,
    limits: SecurityLimits,
}

impl StreamHandler {
    /// `source_name` is the input's file name; its last extension is dropped
    /// to name the decompressed record.
    pub fn new(codec: Codec, source_name: &str, limits: SecurityLimits) -> Self {
        let stem = Path::new(source_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("data");
        Self {
            codec,
            fallback_name: stem.to_string(),
            limits,
        }
    }

    /// The original file name stored in a gzip header, else the fallback.
    fn record_name(&self, source: &mut dyn ByteSource) -> io::Result<String> {
        let mut name = None;
        if self.codec == Codec::Gzip {
            source.seek(SeekFrom::Start(0))?;
            let decoder = flate2::read::GzDecoder::new(&mut *source);
            name = decoder
                .header()
                .and_then(|h| h.filename())
                .map(|raw| String::from_utf8_lossy(raw).into_owned())
                .and_then(|raw| {
                    // Only the final component; the header is untrusted.
                    let base = raw.rsplit(&['/', '\\'][..]).next()?.to_string();
                    security::check_entry_path(&base).ok()?;
                    (!base.is_empty() && base != "." && base != "..").then_some(base)
                });
        }
        source.seek(SeekFrom::Start(0))?;
        Ok(name.unwrap_or_else(|| self.fallback_name.clone()))
    }

    fn decode_error(&self, err: HandlerError) -> HandlerError {
        match err {
            HandlerError::Io(e) => HandlerError::malformed(self.codec.name(), e),
            other => other,
        }
    }
}

impl FileHandler for StreamHandler {
    fn format(&self) -> Format {
        Format::Compressed(self.codec)
    }

    fn as_archive(&self) -> Option<&dyn ArchiveHandler> {
        Some(self)
    }
}

impl ArchiveHandler for StreamHandler {
    fn enumerate_records(
        &self,
        source: &mut dyn ByteSource,
        progress: &ProgressState,
    ) -> Result<Vec<ArchiveRecord>, HandlerError> {
        let name = self.record_name(source)?;
        let len = source_len(source)?;

        // Size and CRC are only known after a full pass. The CRC spans every
        // member of a concatenated gzip.
        let stage = progress.claim(len, format!("Measuring {name}"))?;
        let reader = StageReader::new(&mut *source, stage);
        let mut decoder = CrcReader::new(self.codec.decoder(reader)?);
        let size = copy_with_cancel(&mut decoder, &mut io::sink(), progress)
            .map_err(|e| self.decode_error(e))?;
        // Only gzip carries a CRC32; other codecs list as `-`.
        let crc32 = match self.codec {
            Codec::Gzip => decoder.crc().sum(),
            _ => 0,
        };

        Ok(vec![ArchiveRecord {
            name,
            compressed_size: len,
            uncompressed_size: size,
            crc32,
            stream_size: len,
            is_dir: false,
        }])
    }

    fn extract_to_folder(
        &self,
        source: &mut dyn ByteSource,
        destination: &Path,
        progress: &ProgressState,
    ) -> Result<ExtractSummary, HandlerError> {
        let name = self.record_name(source)?;
        let len = source_len(source)?;
        let target = destination.join(&name);

        let stage = progress.claim(len, format!("Decompressing {name}"))?;
        let reader = StageReader::new(&mut *source, stage);
        let limit = self.limits.max_total_size_bytes;
        let mut decoder = self.codec.decoder(reader)?.take(limit.saturating_add(1));

        let mut out = BufWriter::new(fs::File::create(&target)?);
        let written = copy_with_cancel(&mut decoder, &mut out, progress)
            .map_err(|e| self.decode_error(e))?;
        out.into_inner().map_err(|e| e.into_error())?;

        if let Err(e) = security::check_total_size(written, &self.limits) {
            if let Err(err) = fs::remove_file(&target) {
                tracing::warn!("could not remove oversized {}: {}", target.display(), err);
            }
            return Err(e.into());
        }

        tracing::debug!("decompressed {} bytes into {}", written, target.display());
        Ok(ExtractSummary {
            entries: 1,
            files: 1,
            bytes: written,
        })
    }
}
