use crate::detect::Format;
use crate::handlers::FileHandler;

/// Recognized file types that have no records to enumerate (executables, documents, images).
#[derive(Debug, Clone, Copy)]
pub struct OpaqueHandler {
    format: Format,
}

impl OpaqueHandler {
    pub fn new(format: Format) -> Self {
        Self { format }
    }
}

impl FileHandler for OpaqueHandler {
    fn format(&self) -> Format {
        self.format
    }
}
