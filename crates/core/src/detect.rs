//! Format detection via magic bytes, a probe inside compressed streams, and file extension.

use std::collections::BTreeSet;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::Serialize;

use crate::codec::Codec;
use crate::error::DetectError;

/// File types the built-in resolver knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Format {
    Zip,
    /// Tar archive, optionally wrapped in a compressed stream.
    Tar(Option<Codec>),
    /// A single compressed stream that is not a tar archive.
    Compressed(Codec),
    Elf,
    Pe,
    Pdf,
    Png,
    /// Generic fallback; every detection result contains it.
    Binary,
}

impl Format {
    /// Tie-break weight: the most specific interpretation wins.
    pub fn specificity(&self) -> u8 {
        match self {
            Format::Tar(_) => 5,
            Format::Zip => 4,
            Format::Compressed(_) => 3,
            Format::Elf | Format::Pe | Format::Pdf | Format::Png => 2,
            Format::Binary => 0,
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Zip => write!(f, "ZIP"),
            Format::Tar(None) => write!(f, "TAR"),
            Format::Tar(Some(codec)) => write!(f, "TAR.{}", codec.tar_suffix()),
            Format::Compressed(codec) => write!(f, "{}", codec.name()),
            Format::Elf => write!(f, "ELF"),
            Format::Pe => write!(f, "PE"),
            Format::Pdf => write!(f, "PDF"),
            Format::Png => write!(f, "PNG"),
            Format::Binary => write!(f, "Binary"),
        }
    }
}

/// The set of plausible types for one input.
pub type FileTypes = BTreeSet<Format>;

pub const HEADER_SIZE: usize = 4096;
const TAR_BLOCK: usize = 512;

/// Pick the single preferred type from a detection set.
pub fn preferred_of(types: &FileTypes) -> Format {
    types
        .iter()
        .copied()
        .max_by_key(Format::specificity)
        .unwrap_or(Format::Binary)
}

/// Detect plausible types from the first bytes of a file and its name.
///
/// `inner` is the decompressed head of the stream when the header carries a
/// compression magic; it is only used to spot a wrapped tar archive.
pub fn detect(header: &[u8], inner: Option<&[u8]>, filename: Option<&str>) -> FileTypes {
    let mut types = FileTypes::new();
    types.insert(Format::Binary);

    // 1. Magic bytes
    if let Some(format) = detect_magic_bytes(header) {
        types.insert(format);
        if let Format::Compressed(codec) = format {
            if inner.is_some_and(is_tar_header) {
                types.insert(Format::Tar(Some(codec)));
            }
        }
        return types;
    }

    // 2. File extension, for archives without a signature (pre-POSIX tar)
    if let Some(format) = filename.and_then(detect_by_extension) {
        types.insert(format);
    }

    types
}

/// Convenience: detect from a seekable source, leaving it rewound.
pub fn detect_source<R: Read + Seek + ?Sized>(
    source: &mut R,
    filename: Option<&str>,
) -> Result<FileTypes, DetectError> {
    source.seek(SeekFrom::Start(0))?;
    let header = read_head(&mut *source, HEADER_SIZE)?;

    let inner = match Codec::from_magic(&header) {
        Some(codec) if !is_tar_header(&header) => {
            source.seek(SeekFrom::Start(0))?;
            probe_decompressed(codec, source)
        }
        _ => None,
    };

    source.seek(SeekFrom::Start(0))?;
    Ok(detect(&header, inner.as_deref(), filename))
}

/// Decompress just enough of the stream to look at its first tar block.
fn probe_decompressed<R: Read + ?Sized>(codec: Codec, source: &mut R) -> Option<Vec<u8>> {
    let decoder = codec.decoder(source).ok()?;
    match read_head(decoder, TAR_BLOCK) {
        Ok(head) => Some(head),
        Err(e) => {
            tracing::debug!("{} probe failed: {}", codec.name(), e);
            None
        }
    }
}

fn read_head<R: Read>(reader: R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(limit);
    reader.take(limit as u64).read_to_end(&mut head)?;
    Ok(head)
}

fn detect_magic_bytes(header: &[u8]) -> Option<Format> {
    if header.starts_with(b"PK\x03\x04") || header.starts_with(b"PK\x05\x06") {
        return Some(Format::Zip);
    }
    // The ustar signature at offset 257 outranks short magics that a tar's
    // first entry name can start with.
    if is_tar_header(header) {
        return Some(Format::Tar(None));
    }
    if let Some(codec) = Codec::from_magic(header) {
        return Some(Format::Compressed(codec));
    }
    if header.starts_with(b"\x7FELF") {
        return Some(Format::Elf);
    }
    if header.starts_with(b"MZ") {
        return Some(Format::Pe);
    }
    if header.starts_with(b"%PDF-") {
        return Some(Format::Pdf);
    }
    if header.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(Format::Png);
    }
    None
}

fn is_tar_header(data: &[u8]) -> bool {
    data.len() >= TAR_BLOCK && &data[257..262] == b"ustar"
}

/// Detect format by file extension alone.
fn detect_by_extension(filename: &str) -> Option<Format> {
    let lower = filename.to_lowercase();
    let name = Path::new(&lower).file_name()?.to_str()?;

    let table: &[(&[&str], Format)] = &[
        (&[".tar.gz", ".tgz", ".taz"], Format::Tar(Some(Codec::Gzip))),
        (&[".tar.bz2", ".tbz", ".tbz2", ".tz2"], Format::Tar(Some(Codec::Bzip2))),
        (&[".tar.xz", ".txz"], Format::Tar(Some(Codec::Xz))),
        (&[".tar.zst", ".tzst"], Format::Tar(Some(Codec::Zstd))),
        (&[".tar"], Format::Tar(None)),
        (&[".zip", ".jar"], Format::Zip),
    ];

    table
        .iter()
        .find(|(suffixes, _)| suffixes.iter().any(|s| name.ends_with(s)))
        .map(|(_, format)| *format)
}
