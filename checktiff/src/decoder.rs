//! TIFF strip and tile reader
//!
//! [`TiffReader`] holds one directory at a time and decodes its strips or
//! tiles on request. It never prints: every fault goes to the
//! [`DecoderHandler`] it was opened with, under the source name as module.
//! A damaged strip or tile is reported the first time it is touched; later
//! reads from it fail without a second report.

use crate::compression::{decompress, is_old_style_lzw, Compression};
use crate::error::{Result, TiffError};
use crate::handler::DecoderHandler;
use crate::ifd::Ifd;
use crate::jpeg::JpegDecoder;
use crate::source::Source;
use crate::tags::{tag, tag_name};
use crate::types::{Endian, ImageLayout, PhotometricInterpretation, PlanarConfig, Tiling};
use crate::{BIGTIFF_VERSION, TIFF_VERSION};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

const HEADER_SIZE: usize = 8;

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Decoded size of strip or tile `index`
fn chunk_size(layout: &ImageLayout, index: u32) -> u64 {
    if layout.is_tiled() {
        layout.tile_size()
    } else {
        (layout.rows_in_strip(index) as u64).saturating_mul(layout.scanline_size())
    }
}

/// Offsets and byte counts of the current directory's strips or tiles
#[derive(Debug, Default)]
struct ChunkTable {
    offsets: Vec<u32>,
    byte_counts: Vec<u32>,
}

/// Most recently decoded chunk plus the chunks known to be damaged
#[derive(Debug, Default)]
struct ChunkCache {
    index: Option<u32>,
    data: Vec<u8>,
    failed: HashSet<u32>,
}

/// Reader over a [`Source`], reporting into a borrowed [`DecoderHandler`]
pub struct TiffReader<'h, S: Source> {
    source: S,
    name: String,
    handler: &'h mut dyn DecoderHandler,
    endian: Endian,
    file_size: u64,
    ifd: Ifd,
    directory: u32,
    visited: HashSet<u32>,
    layout: ImageLayout,
    chunks: ChunkTable,
    cache: ChunkCache,
    decodable: bool,
    jpeg: Option<JpegDecoder>,
    lzw_warned: bool,
    closed: bool,
}

impl<'h, S: Source> TiffReader<'h, S> {
    /// Parse the header and the first directory.
    ///
    /// On failure the fault has already been reported to `handler` and the
    /// source is closed.
    pub fn open(source: S, name: &str, handler: &'h mut dyn DecoderHandler) -> Result<Self> {
        let mut reader = TiffReader {
            source,
            name: name.to_string(),
            handler,
            endian: Endian::Little,
            file_size: 0,
            ifd: Ifd::new(),
            directory: 0,
            visited: HashSet::new(),
            layout: ImageLayout::default(),
            chunks: ChunkTable::default(),
            cache: ChunkCache::default(),
            decodable: true,
            jpeg: None,
            lzw_warned: false,
            closed: false,
        };

        let first = match reader.read_header() {
            Ok(offset) => offset,
            Err(err) => return reader.fail(err),
        };
        if let Err(err) = reader.load_directory(first) {
            return reader.fail(err);
        }
        Ok(reader)
    }

    /// Name used as module for every report
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte order of the file
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Zero-based index of the current directory
    pub fn current_directory(&self) -> u32 {
        self.directory
    }

    /// Organization of the current directory
    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    /// Decode row `row` of sample plane `sample`.
    ///
    /// `sample` only matters for planar images.
    pub fn read_scanline(&mut self, row: u32, sample: u16) -> Result<&[u8]> {
        if self.layout.is_tiled() {
            return self.fail(TiffError::WrongOrganization("scanline from a tiled image"));
        }
        if row >= self.layout.height {
            return self.fail(TiffError::RowOutOfRange { row, max: self.layout.height });
        }
        let plane = match self.layout.planar_config {
            PlanarConfig::Chunky => 0,
            PlanarConfig::Planar => {
                let planes = self.layout.planes();
                if sample >= planes {
                    return self.fail(TiffError::SampleOutOfRange { sample, max: planes });
                }
                sample
            }
        };
        if !self.decodable {
            return Err(TiffError::UnsupportedCompression(self.layout.compression.to_u16()));
        }

        let rows_per_strip = self.layout.rows_per_strip.max(1);
        let strip = (plane as u32)
            .saturating_mul(self.layout.strips_per_image())
            .saturating_add(row / rows_per_strip);
        let scanline = self.layout.scanline_size();
        let start = to_usize(((row % rows_per_strip) as u64).saturating_mul(scanline));
        let end = start.saturating_add(to_usize(scanline));

        let data = self.load_chunk(strip)?;
        match data.get(start..end) {
            Some(line) => Ok(line),
            None => Err(TiffError::ChunkUnavailable { kind: "strip", index: strip }),
        }
    }

    /// Decode tile `index`, counted across then down, plane after plane
    pub fn read_tile(&mut self, index: u32) -> Result<&[u8]> {
        if !self.layout.is_tiled() {
            return self.fail(TiffError::WrongOrganization("tile from a stripped image"));
        }
        let tiles = self.layout.number_of_tiles();
        if index >= tiles {
            return self.fail(TiffError::ChunkOutOfRange { kind: "tile", index, max: tiles });
        }
        if !self.decodable {
            return Err(TiffError::UnsupportedCompression(self.layout.compression.to_u16()));
        }

        let expected = to_usize(self.layout.tile_size());
        let data = self.load_chunk(index)?;
        if data.len() < expected {
            return Err(TiffError::ChunkUnavailable { kind: "tile", index });
        }
        Ok(data)
    }

    /// Advance to the next directory in the chain.
    ///
    /// The end of the chain is [`TiffError::NoMoreDirectories`] and is not
    /// reported; any other failure is.
    pub fn read_directory(&mut self) -> Result<()> {
        let next = self.ifd.next_ifd_offset;
        if next == 0 {
            return Err(TiffError::NoMoreDirectories);
        }
        match self.load_directory(next) {
            Ok(()) => {
                self.directory += 1;
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    /// Release the source
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.source.close() {
            debug!(module = %self.name, error = %err, "failed to close source");
        }
    }

    fn fail<T>(&mut self, err: TiffError) -> Result<T> {
        self.report(&err);
        Err(err)
    }

    fn report(&mut self, err: &TiffError) {
        self.handler.error(&self.name, format_args!("{}", err));
    }

    fn warn(&mut self, args: fmt::Arguments<'_>) {
        self.handler.warning(&self.name, args);
    }

    fn chunk_kind(&self) -> &'static str {
        if self.layout.is_tiled() {
            "tile"
        } else {
            "strip"
        }
    }

    /// Validate the 8-byte header, returning the first directory offset
    fn read_header(&mut self) -> Result<u32> {
        self.file_size = self.source.size()?;

        let mut header = [0u8; HEADER_SIZE];
        if self.source.read_at(0, &mut header)? < HEADER_SIZE {
            return Err(TiffError::TruncatedHeader);
        }

        self.endian = Endian::from_magic([header[0], header[1]])
            .ok_or(TiffError::InvalidMagic(u16::from_be_bytes([header[0], header[1]])))?;

        match self.endian.read_u16(&header[2..4]) {
            TIFF_VERSION => Ok(self.endian.read_u32(&header[4..8])),
            BIGTIFF_VERSION => Err(TiffError::BigTiff),
            version => Err(TiffError::UnsupportedVersion { version }),
        }
    }

    /// Read the directory at `offset` and make it current
    fn load_directory(&mut self, offset: u32) -> Result<()> {
        self.ifd = Ifd::new();
        self.layout = ImageLayout::default();
        self.chunks = ChunkTable::default();
        self.cache = ChunkCache::default();
        self.decodable = true;
        self.jpeg = None;
        self.lzw_warned = false;

        if (offset as usize) < HEADER_SIZE {
            return Err(TiffError::InvalidIfd(format!("bad directory offset {}", offset)));
        }
        if !self.visited.insert(offset) {
            return Err(TiffError::InvalidIfd(format!(
                "directory loop detected at offset {}",
                offset
            )));
        }

        let ifd = Ifd::read(&mut self.source, self.endian, offset, &mut *self.handler, &self.name)?;
        let (layout, chunks) = self.setup(&ifd)?;

        debug!(
            module = %self.name,
            directory = self.directory,
            offset,
            entries = ifd.len(),
            %layout,
            "directory loaded"
        );

        self.decodable = layout.compression.is_decodable();
        self.ifd = ifd;
        self.layout = layout;
        self.chunks = chunks;

        let compression = self.layout.compression;
        if !self.decodable {
            self.warn(format_args!(
                "Compression scheme {} ({}) is not supported for decoding; image data not checked",
                compression.to_u16(),
                compression.name()
            ));
        } else if compression == Compression::Jpeg {
            self.jpeg = self.jpeg_decoder();
            self.decodable = self.jpeg.is_some();
        }
        Ok(())
    }

    /// Decoder for the current directory's JPEG chunks, preloaded with its
    /// JPEGTables. `None` after reporting why its chunks cannot be decoded.
    fn jpeg_decoder(&mut self) -> Option<JpegDecoder> {
        let bits = self.layout.bits_per_sample;
        if bits != 8 {
            self.report(&TiffError::DecompressionError(format!(
                "JPEG: {} bits per sample are not supported",
                bits
            )));
            return None;
        }

        let tables = self.ifd.get_value(tag::JPEG_TABLES).and_then(|v| v.as_bytes());
        let Some(tables) = tables else {
            return Some(JpegDecoder::new());
        };
        match JpegDecoder::with_tables(tables) {
            Ok(decoder) => Some(decoder),
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    /// Derive the layout and chunk table of `ifd`, warning about oddities
    fn setup(&mut self, ifd: &Ifd) -> Result<(ImageLayout, ChunkTable)> {
        let width = ifd.get_required_u32(tag::IMAGE_WIDTH)?;
        let height = ifd.get_required_u32(tag::IMAGE_LENGTH)?;
        if width == 0 && height > 0 {
            return Err(TiffError::InvalidDimensions { width, height });
        }

        let samples_per_pixel = ifd.get_u16_or(tag::SAMPLES_PER_PIXEL, 1);
        if samples_per_pixel == 0 {
            return Err(TiffError::InvalidTagValue { tag: "SamplesPerPixel", value: 0 });
        }

        let bits = ifd
            .get_value(tag::BITS_PER_SAMPLE)
            .and_then(|v| v.as_u16_vec())
            .unwrap_or_else(|| vec![1]);
        let bits_per_sample = bits.first().copied().unwrap_or(1);
        if bits_per_sample == 0 || bits_per_sample > 64 {
            return Err(TiffError::InvalidTagValue {
                tag: "BitsPerSample",
                value: bits_per_sample as u32,
            });
        }
        if bits.iter().any(|&b| b != bits_per_sample) {
            self.warn(format_args!(
                "BitsPerSample differs between samples, using {}",
                bits_per_sample
            ));
        }

        let scheme = ifd.get_u16_or(tag::COMPRESSION, 1);
        let compression =
            Compression::from_u16(scheme).ok_or(TiffError::UnsupportedCompression(scheme))?;

        match ifd.get_value(tag::PHOTOMETRIC_INTERPRETATION).and_then(|v| v.as_u16()) {
            None => {
                let assumed = if samples_per_pixel >= 3 { "RGB" } else { "min-is-black" };
                self.warn(format_args!(
                    "Photometric interpretation is missing, assuming {}",
                    assumed
                ));
            }
            Some(value) if PhotometricInterpretation::from_u16(value).is_none() => {
                self.warn(format_args!("Unknown photometric interpretation {}", value));
            }
            Some(_) => {}
        }

        let planar_value = ifd.get_u16_or(tag::PLANAR_CONFIGURATION, 1);
        let planar_config = PlanarConfig::from_u16(planar_value).ok_or(
            TiffError::InvalidTagValue { tag: "PlanarConfiguration", value: planar_value as u32 },
        )?;
        let planar_config = if samples_per_pixel == 1 {
            PlanarConfig::Chunky
        } else {
            planar_config
        };

        let predictor = ifd.get_u16_or(tag::PREDICTOR, 1);
        if !(1..=3).contains(&predictor) {
            self.warn(format_args!("Unknown Predictor value {}", predictor));
        }

        let tiling = if ifd.contains(tag::TILE_WIDTH) || ifd.contains(tag::TILE_LENGTH) {
            let tile_width = ifd.get_required_u32(tag::TILE_WIDTH)?;
            let tile_length = ifd.get_required_u32(tag::TILE_LENGTH)?;
            if tile_width == 0 {
                return Err(TiffError::InvalidTagValue { tag: "TileWidth", value: 0 });
            }
            if tile_length == 0 {
                return Err(TiffError::InvalidTagValue { tag: "TileLength", value: 0 });
            }
            if tile_width % 16 != 0 || tile_length % 16 != 0 {
                self.warn(format_args!(
                    "Nonstandard tile size {}x{}, should be a multiple of 16",
                    tile_width, tile_length
                ));
            }
            Some(Tiling { width: tile_width, length: tile_length })
        } else {
            None
        };

        let rows_per_strip = match ifd.get_value(tag::ROWS_PER_STRIP).and_then(|v| v.as_u32()) {
            _ if tiling.is_some() => height,
            Some(0) if height > 0 => {
                self.warn(format_args!("Zero RowsPerStrip, assuming {}", height));
                height
            }
            Some(rows) => rows.min(height),
            None => height,
        };

        let layout = ImageLayout {
            width,
            height,
            bits_per_sample,
            samples_per_pixel,
            planar_config,
            compression,
            rows_per_strip,
            tiling,
        };

        let chunks = self.chunk_table(ifd, &layout)?;
        Ok((layout, chunks))
    }

    fn chunk_table(&mut self, ifd: &Ifd, layout: &ImageLayout) -> Result<ChunkTable> {
        let (offsets_tag, counts_tag, expected) = if layout.is_tiled() {
            (tag::TILE_OFFSETS, tag::TILE_BYTE_COUNTS, layout.number_of_tiles())
        } else {
            (tag::STRIP_OFFSETS, tag::STRIP_BYTE_COUNTS, layout.number_of_strips())
        };

        let offsets = match ifd.get_value(offsets_tag).and_then(|v| v.as_u32_vec()) {
            Some(offsets) => offsets,
            None if expected == 0 => Vec::new(),
            None => return Err(TiffError::MissingTag(tag_name(offsets_tag))),
        };
        if offsets.len() < expected as usize {
            self.report(&TiffError::MissingOffsets {
                kind: if layout.is_tiled() { "tile" } else { "strip" },
                missing: expected - offsets.len() as u32,
                expected,
            });
        }

        let byte_counts = match ifd.get_value(counts_tag).and_then(|v| v.as_u32_vec()) {
            Some(counts) => {
                if counts.len() < offsets.len() {
                    self.warn(format_args!(
                        "Incorrect count for \"{}\"; tag has {} values, expected {}",
                        tag_name(counts_tag),
                        counts.len(),
                        offsets.len()
                    ));
                }
                counts
            }
            None if offsets.is_empty() => Vec::new(),
            None => {
                self.warn(format_args!(
                    "TIFF directory is missing required \"{}\" field, \
                     calculating from image layout",
                    tag_name(counts_tag)
                ));
                self.estimate_byte_counts(layout, &offsets)
            }
        };

        Ok(ChunkTable { offsets, byte_counts })
    }

    /// Uncompressed chunks take their decoded size; compressed ones run to
    /// the end of the file.
    fn estimate_byte_counts(&self, layout: &ImageLayout, offsets: &[u32]) -> Vec<u32> {
        offsets
            .iter()
            .enumerate()
            .map(|(index, &offset)| {
                let estimate = if layout.compression == Compression::None {
                    chunk_size(layout, index as u32)
                } else {
                    self.file_size.saturating_sub(offset as u64)
                };
                u32::try_from(estimate).unwrap_or(u32::MAX)
            })
            .collect()
    }

    /// Decoded bytes of chunk `index`, possibly short of the layout's size.
    ///
    /// Faults are reported on first access only.
    fn load_chunk(&mut self, index: u32) -> Result<&[u8]> {
        if self.cache.index != Some(index) {
            let kind = self.chunk_kind();
            if self.cache.failed.contains(&index) {
                return Err(TiffError::ChunkUnavailable { kind, index });
            }

            let max = self.chunks.offsets.len() as u32;
            let Some(&offset) = self.chunks.offsets.get(index as usize) else {
                // Counted once when the directory loaded
                return Err(TiffError::ChunkOutOfRange { kind, index, max });
            };

            let expected = to_usize(chunk_size(&self.layout, index));
            match self.decode_chunk(index, offset, expected) {
                Ok(data) => {
                    if data.len() < expected {
                        self.report(&TiffError::NotEnoughData {
                            kind,
                            index,
                            got: data.len(),
                            expected,
                        });
                    }
                    self.cache.index = Some(index);
                    self.cache.data = data;
                }
                Err(err) => {
                    self.cache.failed.insert(index);
                    return self.fail(err);
                }
            }
        }
        Ok(&self.cache.data)
    }

    fn decode_chunk(&mut self, index: u32, offset: u32, expected: usize) -> Result<Vec<u8>> {
        let kind = self.chunk_kind();
        let byte_count = self.chunks.byte_counts.get(index as usize).copied().unwrap_or(0);
        if byte_count == 0 {
            return Err(TiffError::ZeroByteCount { kind, index });
        }

        let available = self.file_size.saturating_sub(offset as u64);
        if available < byte_count as u64 {
            return Err(TiffError::ShortRead {
                kind,
                index,
                got: available,
                expected: byte_count as u64,
            });
        }

        let mut raw = vec![0u8; byte_count as usize];
        let got = self.source.read_at(offset as u64, &mut raw)?;
        if got < raw.len() {
            return Err(TiffError::ShortRead {
                kind,
                index,
                got: got as u64,
                expected: byte_count as u64,
            });
        }

        match self.layout.compression {
            Compression::Jpeg => self.decode_jpeg(index, &raw),
            Compression::Lzw if !self.lzw_warned && is_old_style_lzw(&raw) => {
                self.lzw_warned = true;
                self.warn(format_args!("Old-style LZW codes, convert file"));
                decompress(Compression::Lzw, &raw, expected)
            }
            compression => decompress(compression, &raw, expected),
        }
    }

    /// Check the frame of a JPEG chunk against the layout, then decode it.
    ///
    /// A frame smaller than its strip or tile only warns; so does a final
    /// strip that runs below the image. Anything else larger is an error.
    fn decode_jpeg(&mut self, index: u32, raw: &[u8]) -> Result<Vec<u8>> {
        let stream = match &self.jpeg {
            Some(decoder) => decoder.read_header(raw)?,
            None => return Err(TiffError::UnsupportedCompression(Compression::Jpeg.to_u16())),
        };

        let kind = self.chunk_kind();
        let (width, height) = match self.layout.tiling {
            Some(tiling) => (tiling.width, tiling.length),
            None => (self.layout.width, self.layout.rows_in_strip(index)),
        };
        let (got_width, got_height) = (stream.width(), stream.height());

        if got_width < width || got_height < height {
            self.warn(format_args!(
                "Improper JPEG {} {} size, expected {}x{}, got {}x{}",
                kind, index, width, height, got_width, got_height
            ));
        }
        let strips = self.layout.strips_per_image().max(1);
        let last_strip = !self.layout.is_tiled() && (index + 1) % strips == 0;
        if got_width == width && got_height > height && last_strip {
            self.warn(format_args!(
                "JPEG {} {} size exceeds expected dimensions, expected {}x{}, got {}x{}",
                kind, index, width, height, got_width, got_height
            ));
        } else if got_width > width || got_height > height {
            return Err(TiffError::JpegMismatch {
                kind,
                index,
                detail: format!(
                    "size exceeds expected dimensions, expected {}x{}, got {}x{}",
                    width, height, got_width, got_height
                ),
            });
        }

        let components = match self.layout.planar_config {
            PlanarConfig::Chunky => self.layout.samples_per_pixel,
            PlanarConfig::Planar => 1,
        };
        if stream.components() != components {
            return Err(TiffError::JpegMismatch {
                kind,
                index,
                detail: format!(
                    "component count {}, expected {}",
                    stream.components(),
                    components
                ),
            });
        }

        stream.decode(height)
    }
}

impl<S: Source> Drop for TiffReader<'_, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S: Source> fmt::Debug for TiffReader<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiffReader")
            .field("name", &self.name)
            .field("endian", &self.endian)
            .field("directory", &self.directory)
            .field("layout", &self.layout)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticRecord, DiagnosticSink};
    use crate::handler::SinkBridge;
    use crate::source::{BufferSource, Whence};
    use crate::tags::data_type::{LONG, SHORT};
    use std::cell::Cell;
    use std::rc::Rc;

    /// Little-endian file with one inline-valued directory after `strip`
    fn tiff(fields: &[(u16, u16, u32)], strip: &[u8]) -> Vec<u8> {
        let ifd_offset = (HEADER_SIZE + strip.len() + 1) & !1;
        let mut out = vec![0x49, 0x49, 0x2A, 0x00];
        out.extend_from_slice(&(ifd_offset as u32).to_le_bytes());
        out.extend_from_slice(strip);
        out.resize(ifd_offset, 0);
        out.extend_from_slice(&(fields.len() as u16).to_le_bytes());
        for &(tag, ty, value) in fields {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&ty.to_le_bytes());
            out.extend_from_slice(&1u32.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        out
    }

    /// 4x2 8-bit grayscale, one strip at offset 8
    fn gray(compression: u32, strip_offset: u32, byte_count: u32) -> Vec<(u16, u16, u32)> {
        vec![
            (tag::IMAGE_WIDTH, LONG, 4),
            (tag::IMAGE_LENGTH, LONG, 2),
            (tag::BITS_PER_SAMPLE, SHORT, 8),
            (tag::COMPRESSION, SHORT, compression),
            (tag::PHOTOMETRIC_INTERPRETATION, SHORT, 1),
            (tag::STRIP_OFFSETS, LONG, strip_offset),
            (tag::SAMPLES_PER_PIXEL, SHORT, 1),
            (tag::ROWS_PER_STRIP, LONG, 2),
            (tag::STRIP_BYTE_COUNTS, LONG, byte_count),
        ]
    }

    fn set(fields: &mut [(u16, u16, u32)], id: u16, value: u32) {
        for field in fields.iter_mut().filter(|f| f.0 == id) {
            field.2 = value;
        }
    }

    fn run<T>(
        data: &[u8],
        f: impl FnOnce(&mut TiffReader<'_, BufferSource<'_>>) -> T,
    ) -> (Result<T>, DiagnosticSink) {
        let mut sink = DiagnosticSink::new();
        let result = {
            let mut bridge = SinkBridge::new(&mut sink);
            TiffReader::open(BufferSource::new(data), "test.tif", &mut bridge)
                .map(|mut reader| f(&mut reader))
        };
        (result, sink)
    }

    fn texts(records: &[DiagnosticRecord]) -> Vec<&str> {
        records.iter().map(|r| r.text()).collect()
    }

    #[test]
    fn test_header_errors() {
        let (result, sink) = run(b"II*", |_| ());
        assert!(matches!(result, Err(TiffError::TruncatedHeader)));
        assert_eq!(texts(sink.errors()), vec!["Cannot read TIFF header"]);

        let (result, sink) = run(b"PK\x03\x04\x14\x00\x00\x00", |_| ());
        assert!(matches!(result, Err(TiffError::InvalidMagic(0x504B))));
        assert_eq!(sink.errors().len(), 1);

        let (result, _) = run(b"II+\x00\x08\x00\x00\x00", |_| ());
        assert!(matches!(result, Err(TiffError::BigTiff)));

        let (result, _) = run(b"MM\x00\x2B\x00\x00\x00\x08", |_| ());
        assert!(matches!(result, Err(TiffError::BigTiff)));
    }

    #[test]
    fn test_reads_scanlines() {
        let data = tiff(&gray(1, 8, 8), &[0, 1, 2, 3, 4, 5, 6, 7]);
        let (result, sink) = run(&data, |reader| {
            assert_eq!(reader.layout().scanline_size(), 4);
            let first = reader.read_scanline(0, 0).unwrap().to_vec();
            let second = reader.read_scanline(1, 0).unwrap().to_vec();
            (first, second)
        });

        let (first, second) = result.unwrap();
        assert_eq!(first, vec![0, 1, 2, 3]);
        assert_eq!(second, vec![4, 5, 6, 7]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_row_out_of_range_reported() {
        let data = tiff(&gray(1, 8, 8), &[0; 8]);
        let (result, sink) = run(&data, |reader| reader.read_scanline(2, 0).is_err());
        assert!(result.unwrap());
        assert_eq!(texts(sink.errors()), vec!["2: Row out of range, max 2"]);
    }

    #[test]
    fn test_short_strip_reported_once() {
        let data = tiff(&gray(1, 8, 4), &[9, 9, 9, 9]);
        let (result, sink) = run(&data, |reader| {
            let first = reader.read_scanline(0, 0).is_ok();
            let second = reader.read_scanline(1, 0).is_err();
            let again = reader.read_scanline(1, 0).is_err();
            (first, second, again)
        });

        assert_eq!(result.unwrap(), (true, true, true));
        assert_eq!(
            texts(sink.errors()),
            vec!["Not enough data in strip 0; decoded 4 bytes, expected 8"]
        );
    }

    #[test]
    fn test_strip_past_end_reported_once() {
        let data = tiff(&gray(1, 1000, 8), &[0; 8]);
        let (result, sink) = run(&data, |reader| {
            (reader.read_scanline(0, 0).is_err(), reader.read_scanline(1, 0).is_err())
        });

        assert_eq!(result.unwrap(), (true, true));
        assert_eq!(sink.errors().len(), 1);
        assert!(sink.errors()[0].text().starts_with("Read error on strip 0; got 0 bytes"));
    }

    #[test]
    fn test_undecodable_compression_warned_at_open() {
        let data = tiff(&gray(3, 8, 8), &[0; 8]);
        let (result, sink) = run(&data, |reader| {
            matches!(reader.read_scanline(0, 0), Err(TiffError::UnsupportedCompression(3)))
        });

        assert!(result.unwrap());
        assert!(sink.errors().is_empty());
        assert_eq!(
            texts(sink.warnings()),
            vec![
                "Compression scheme 3 (CCITT Group 3) is not supported for decoding; \
                 image data not checked"
            ]
        );
    }

    #[test]
    fn test_missing_offsets_counted_once() {
        let mut fields = gray(1, 8, 4);
        set(&mut fields, tag::ROWS_PER_STRIP, 1);
        let data = tiff(&fields, &[0; 4]);
        let (result, sink) = run(&data, |reader| {
            let first = reader.read_scanline(0, 0).is_ok();
            let missing = matches!(
                reader.read_scanline(1, 0),
                Err(TiffError::ChunkOutOfRange { index: 1, max: 1, .. })
            );
            (first, missing)
        });

        assert_eq!(result.unwrap(), (true, true));
        assert_eq!(texts(sink.errors()), vec!["1 of 2 strips have no offset"]);
    }

    fn jpeg_strip(width: u16, height: u16) -> Vec<u8> {
        crate::jpeg::tests::FlatEncoder::gray(width, height).encode(true)
    }

    #[test]
    fn test_jpeg_strip_decodes() {
        let strip = jpeg_strip(4, 2);
        let data = tiff(&gray(7, 8, strip.len() as u32), &strip);
        let (result, sink) = run(&data, |reader| {
            let first = reader.read_scanline(0, 0).map(|l| l.to_vec());
            let second = reader.read_scanline(1, 0).map(|l| l.to_vec());
            (first.unwrap(), second.unwrap())
        });

        assert_eq!(result.unwrap(), (vec![132; 4], vec![132; 4]));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_jpeg_tall_last_strip_warns() {
        let strip = jpeg_strip(4, 16);
        let data = tiff(&gray(7, 8, strip.len() as u32), &strip);
        let (result, sink) = run(&data, |reader| reader.read_scanline(1, 0).is_ok());

        assert!(result.unwrap());
        assert!(sink.errors().is_empty());
        assert_eq!(
            texts(sink.warnings()),
            vec!["JPEG strip 0 size exceeds expected dimensions, expected 4x2, got 4x16"]
        );
    }

    #[test]
    fn test_jpeg_wide_frame_is_error() {
        let strip = jpeg_strip(8, 2);
        let data = tiff(&gray(7, 8, strip.len() as u32), &strip);
        let (result, sink) = run(&data, |reader| reader.read_scanline(0, 0).is_err());

        assert!(result.unwrap());
        assert_eq!(
            texts(sink.errors()),
            vec![
                "Improper JPEG strip 0: size exceeds expected dimensions, \
                 expected 4x2, got 8x2"
            ]
        );
    }

    #[test]
    fn test_jpeg_needs_eight_bit_samples() {
        let strip = jpeg_strip(4, 2);
        let mut fields = gray(7, 8, strip.len() as u32);
        set(&mut fields, tag::BITS_PER_SAMPLE, 16);
        let data = tiff(&fields, &strip);
        let (result, sink) = run(&data, |reader| {
            matches!(reader.read_scanline(0, 0), Err(TiffError::UnsupportedCompression(7)))
        });

        assert!(result.unwrap());
        assert_eq!(
            texts(sink.errors()),
            vec!["Decompression error: JPEG: 16 bits per sample are not supported"]
        );
    }

    #[test]
    fn test_unknown_compression_fails_open() {
        let data = tiff(&gray(12345, 8, 8), &[0; 8]);
        let (result, sink) = run(&data, |_| ());
        assert!(matches!(result, Err(TiffError::UnsupportedCompression(12345))));
        assert_eq!(sink.errors().len(), 1);
    }

    #[test]
    fn test_missing_image_length_fails_open() {
        let mut fields = gray(1, 8, 8);
        fields.retain(|f| f.0 != tag::IMAGE_LENGTH);
        let data = tiff(&fields, &[0; 8]);
        let (result, sink) = run(&data, |_| ());

        assert!(matches!(result, Err(TiffError::MissingTag("ImageLength"))));
        assert_eq!(
            texts(sink.errors()),
            vec!["TIFF directory is missing required \"ImageLength\" field"]
        );
    }

    #[test]
    fn test_end_of_directory_chain_is_silent() {
        let data = tiff(&gray(1, 8, 8), &[0; 8]);
        let (result, sink) = run(&data, |reader| reader.read_directory());
        assert!(matches!(result, Ok(Err(TiffError::NoMoreDirectories))));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_tile_read_on_stripped_image() {
        let data = tiff(&gray(1, 8, 8), &[0; 8]);
        let (result, sink) = run(&data, |reader| reader.read_tile(0).is_err());
        assert!(result.unwrap());
        assert_eq!(texts(sink.errors()), vec!["Can not read tile from a stripped image"]);
    }

    #[test]
    fn test_missing_byte_counts_estimated() {
        let mut fields = gray(1, 8, 8);
        fields.retain(|f| f.0 != tag::STRIP_BYTE_COUNTS);
        let data = tiff(&fields, &[1; 8]);
        let (result, sink) = run(&data, |reader| reader.read_scanline(1, 0).map(|l| l.to_vec()));

        assert_eq!(result.unwrap().unwrap(), vec![1, 1, 1, 1]);
        assert!(sink.errors().is_empty());
        assert_eq!(sink.warnings().len(), 1);
    }

    struct Tracked<'a> {
        inner: BufferSource<'a>,
        closes: Rc<Cell<u32>>,
    }

    impl Source for Tracked<'_> {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.inner.read(buf)
        }

        fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
            self.inner.seek(offset, whence)
        }

        fn size(&mut self) -> Result<u64> {
            self.inner.size()
        }

        fn close(&mut self) -> Result<()> {
            self.closes.set(self.closes.get() + 1);
            self.inner.close()
        }
    }

    #[test]
    fn test_source_closed_exactly_once() {
        let data = tiff(&gray(1, 8, 8), &[0; 8]);
        let mut sink = DiagnosticSink::new();
        let mut bridge = SinkBridge::new(&mut sink);

        let closes = Rc::new(Cell::new(0));
        let source = Tracked { inner: BufferSource::new(&data), closes: closes.clone() };
        let reader = TiffReader::open(source, "t", &mut bridge).unwrap();
        reader.close();
        assert_eq!(closes.get(), 1);

        let closes = Rc::new(Cell::new(0));
        let source = Tracked { inner: BufferSource::new(&data), closes: closes.clone() };
        drop(TiffReader::open(source, "t", &mut bridge).unwrap());
        assert_eq!(closes.get(), 1);

        let closes = Rc::new(Cell::new(0));
        let source = Tracked { inner: BufferSource::new(b"nope"), closes: closes.clone() };
        assert!(TiffReader::open(source, "t", &mut bridge).is_err());
        assert_eq!(closes.get(), 1);
    }
}
