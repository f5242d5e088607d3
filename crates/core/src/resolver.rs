//! Maps an input to its plausible formats and a handler for the preferred one.

use crate::detect::{self, FileTypes, Format};
use crate::error::DetectError;
use crate::handlers::opaque::OpaqueHandler;
use crate::handlers::stream::StreamHandler;
use crate::handlers::tar::TarHandler;
use crate::handlers::zip::ZipHandler;
use crate::handlers::{ByteSource, FileHandler};
use crate::security::SecurityLimits;

pub trait FormatResolver {
    /// Every format the source could plausibly be. Leaves the source rewound.
    fn detect(
        &self,
        source: &mut dyn ByteSource,
        file_name: Option<&str>,
    ) -> Result<FileTypes, DetectError>;

    /// The single format to act on.
    fn preferred(&self, types: &FileTypes) -> Format {
        detect::preferred_of(types)
    }

    /// A handler for `format`, or `None` when the format is not supported.
    /// `source_name` is the input's file name, used to name single-stream output.
    fn open_handler(&self, format: Format, source_name: &str) -> Option<Box<dyn FileHandler>>;
}

/// Resolver over the formats this crate implements.
#[derive(Debug, Clone, Default)]
pub struct BuiltinResolver {
    limits: SecurityLimits,
}

impl BuiltinResolver {
    pub fn new(limits: SecurityLimits) -> Self {
        Self { limits }
    }
}

impl FormatResolver for BuiltinResolver {
    fn detect(
        &self,
        source: &mut dyn ByteSource,
        file_name: Option<&str>,
    ) -> Result<FileTypes, DetectError> {
        detect::detect_source(source, file_name)
    }

    fn open_handler(&self, format: Format, source_name: &str) -> Option<Box<dyn FileHandler>> {
        let limits = self.limits.clone();
        match format {
            Format::Zip => Some(Box::new(ZipHandler::new(limits))),
            Format::Tar(codec) => Some(Box::new(TarHandler::new(codec, limits))),
            Format::Compressed(codec) => {
                Some(Box::new(StreamHandler::new(codec, source_name, limits)))
            }
            Format::Elf | Format::Pe | Format::Pdf | Format::Png => {
                Some(Box::new(OpaqueHandler::new(format)))
            }
            Format::Binary => None,
        }
    }
}
