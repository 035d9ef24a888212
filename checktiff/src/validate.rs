//! Full-scan validation
//!
//! A validation call opens a source, decodes every row (or tile) of the
//! image and returns every error and warning the decoder raised along the
//! way. Pixel data is discarded. Each call owns its own
//! [`DiagnosticSink`], so calls share no state and may run in parallel.

use crate::decoder::TiffReader;
use crate::diagnostics::{DiagnosticSink, DEFAULT_MESSAGE_LIMIT};
use crate::error::TiffError;
use crate::handler::{DecoderHandler, SinkBridge};
use crate::source::{Source, VirtualSource};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Module name used for in-memory sources
pub const BUFFER_NAME: &str = "<memory>";

/// Diagnostics captured during one validation call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Errors, in the order they were raised
    pub errors: Vec<String>,
    /// Warnings, in the order they were raised
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// No errors were raised
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Neither errors nor warnings were raised
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// Validation options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Scan every directory in the chain, not just the first
    pub all_directories: bool,
    /// Per-message length bound in bytes
    pub message_limit: usize,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        ValidateOptions {
            all_directories: false,
            message_limit: DEFAULT_MESSAGE_LIMIT,
        }
    }
}

impl ValidateOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every directory
    pub fn all_directories(mut self, all: bool) -> Self {
        self.all_directories = all;
        self
    }

    /// Set the per-message length bound
    pub fn message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit;
        self
    }
}

/// What to validate
#[derive(Debug, Clone, Copy)]
pub enum SourceDescriptor<'a> {
    /// File on disk
    Path(&'a Path),
    /// Caller-owned bytes, borrowed for the call
    Buffer(&'a [u8]),
}

/// Runs full-scan validations with fixed options
#[derive(Debug, Clone, Default)]
pub struct Validator {
    options: ValidateOptions,
}

impl Validator {
    /// Create a validator
    pub fn new(options: ValidateOptions) -> Self {
        Validator { options }
    }

    /// Options in effect
    pub fn options(&self) -> &ValidateOptions {
        &self.options
    }

    /// Validate one source
    pub fn validate(&self, descriptor: SourceDescriptor<'_>) -> ValidationResult {
        let mut sink = DiagnosticSink::new().with_message_limit(self.options.message_limit);
        {
            let mut bridge = SinkBridge::new(&mut sink);
            self.run(descriptor, &mut bridge);
        }
        export(&mut sink)
    }

    fn run(&self, descriptor: SourceDescriptor<'_>, handler: &mut dyn DecoderHandler) {
        let (source, name) = match descriptor {
            SourceDescriptor::Path(path) => {
                let name = path.display().to_string();
                match VirtualSource::open_file(path) {
                    Ok(source) => (source, name),
                    Err(err) => {
                        handler.error(&name, format_args!("{}: Cannot open: {}", name, err));
                        return;
                    }
                }
            }
            SourceDescriptor::Buffer(data) => {
                (VirtualSource::from_buffer(data), BUFFER_NAME.to_string())
            }
        };

        let Ok(mut reader) = TiffReader::open(source, &name, handler) else {
            return;
        };

        loop {
            scan_directory(&mut reader);
            if !self.options.all_directories {
                break;
            }
            if reader.read_directory().is_err() {
                break;
            }
        }
        reader.close();
    }
}

/// Decode every row or tile of the current directory
fn scan_directory<S: Source>(reader: &mut TiffReader<'_, S>) {
    let layout = reader.layout().clone();
    debug!(
        module = reader.name(),
        directory = reader.current_directory(),
        endian = ?reader.endian(),
        %layout,
        "scanning"
    );

    let mut decoded = 0u64;
    let mut failed = 0u64;

    if layout.is_tiled() {
        for index in 0..layout.number_of_tiles() {
            match reader.read_tile(index) {
                Ok(_) => decoded += 1,
                Err(TiffError::UnsupportedCompression(_)) => break,
                // Every later tile lacks an offset too
                Err(TiffError::ChunkOutOfRange { .. }) => break,
                Err(_) => failed += 1,
            }
        }
    } else {
        let rows_per_strip = layout.rows_per_strip.max(1);
        'planes: for sample in 0..layout.planes() {
            let mut row = 0;
            while row < layout.height {
                match reader.read_scanline(row, sample) {
                    Ok(_) => {
                        decoded += 1;
                        row += 1;
                    }
                    Err(TiffError::UnsupportedCompression(_)) => break 'planes,
                    Err(TiffError::ChunkOutOfRange { .. }) => break 'planes,
                    Err(_) => {
                        // The rest of a damaged strip cannot raise anything new
                        let next = (row / rows_per_strip + 1).saturating_mul(rows_per_strip);
                        failed += (next.min(layout.height) - row) as u64;
                        row = next;
                    }
                }
            }
        }
    }

    debug!(module = reader.name(), decoded, failed, "scan finished");
}

/// Move the sink's contents into a result, leaving it empty
pub fn export(sink: &mut DiagnosticSink) -> ValidationResult {
    let (errors, warnings) = sink.drain();
    ValidationResult { errors, warnings }
}

/// Validate the file at `path` with default options
pub fn validate_tiff_from_file<P: AsRef<Path>>(path: P) -> ValidationResult {
    Validator::default().validate(SourceDescriptor::Path(path.as_ref()))
}

/// Validate `buffer` with default options
pub fn validate_tiff_from_buffer(buffer: &[u8]) -> ValidationResult {
    Validator::default().validate(SourceDescriptor::Buffer(buffer))
}
