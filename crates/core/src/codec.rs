//! Stream compression codecs that can wrap a tar archive or stand alone.

use std::io::{self, Read};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Codec {
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl Codec {
    /// Identify a codec from the leading bytes of a stream.
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        match header {
            [0x1F, 0x8B, ..] => Some(Codec::Gzip),
            [b'B', b'Z', b'h', ..] => Some(Codec::Bzip2),
            [0xFD, b'7', b'z', b'X', b'Z', 0x00, ..] => Some(Codec::Xz),
            [0x28, 0xB5, 0x2F, 0xFD, ..] => Some(Codec::Zstd),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Gzip => "GZIP",
            Codec::Bzip2 => "BZIP2",
            Codec::Xz => "XZ",
            Codec::Zstd => "ZSTD",
        }
    }

    pub fn tar_suffix(&self) -> &'static str {
        match self {
            Codec::Gzip => "GZ",
            Codec::Bzip2 => "BZ2",
            Codec::Xz => "XZ",
            Codec::Zstd => "ZST",
        }
    }

    /// Wrap `reader` in the matching decompressor.
    pub fn decoder<'a, R: Read + 'a>(&self, reader: R) -> io::Result<Box<dyn Read + 'a>> {
        let decoder: Box<dyn Read + 'a> = match self {
            Codec::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
            Codec::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
            Codec::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)),
            Codec::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
        };
        Ok(decoder)
    }
}

/// Decoder for an optional codec; `None` passes the reader through.
pub fn maybe_decoder<'a, R: Read + 'a>(
    codec: Option<Codec>,
    reader: R,
) -> io::Result<Box<dyn Read + 'a>> {
    match codec {
        Some(codec) => codec.decoder(reader),
        None => Ok(Box::new(reader)),
    }
}
