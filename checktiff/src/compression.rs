//! TIFF compression methods

use crate::error::{Result, TiffError};
use crate::jpeg::JpegDecoder;
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression
    #[default]
    None,
    /// CCITT modified Huffman RLE
    CcittRle,
    /// CCITT Group 3 fax encoding
    CcittGroup3,
    /// CCITT Group 4 fax encoding
    CcittGroup4,
    /// LZW compression
    Lzw,
    /// JPEG compression (old-style)
    OldJpeg,
    /// JPEG compression
    Jpeg,
    /// Deflate/ZIP compression (Adobe)
    AdobeDeflate,
    /// PackBits RLE compression
    PackBits,
    /// Deflate compression
    Deflate,
}

impl Compression {
    /// Create from TIFF compression tag value
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            2 => Some(Compression::CcittRle),
            3 => Some(Compression::CcittGroup3),
            4 => Some(Compression::CcittGroup4),
            5 => Some(Compression::Lzw),
            6 => Some(Compression::OldJpeg),
            7 => Some(Compression::Jpeg),
            8 => Some(Compression::AdobeDeflate),
            32773 => Some(Compression::PackBits),
            32946 => Some(Compression::Deflate),
            _ => None,
        }
    }

    /// Convert to TIFF compression tag value
    pub fn to_u16(self) -> u16 {
        match self {
            Compression::None => 1,
            Compression::CcittRle => 2,
            Compression::CcittGroup3 => 3,
            Compression::CcittGroup4 => 4,
            Compression::Lzw => 5,
            Compression::OldJpeg => 6,
            Compression::Jpeg => 7,
            Compression::AdobeDeflate => 8,
            Compression::PackBits => 32773,
            Compression::Deflate => 32946,
        }
    }

    /// Get compression name
    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::CcittRle => "CCITT RLE",
            Compression::CcittGroup3 => "CCITT Group 3",
            Compression::CcittGroup4 => "CCITT Group 4",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::AdobeDeflate => "Adobe Deflate",
            Compression::PackBits => "PackBits",
            Compression::Deflate => "Deflate",
        }
    }

    /// Whether strips in this scheme can be decompressed and checked
    pub fn is_decodable(&self) -> bool {
        matches!(
            self,
            Compression::None
                | Compression::Lzw
                | Compression::Jpeg
                | Compression::PackBits
                | Compression::AdobeDeflate
                | Compression::Deflate
        )
    }
}

/// Decompress one strip or tile, stopping once `expected_size` bytes exist.
///
/// Running out of input early is not an error here; the caller compares the
/// returned length against the layout.
pub fn decompress(compression: Compression, data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data[..data.len().min(expected_size)].to_vec()),
        Compression::PackBits => decompress_packbits(data, expected_size),
        Compression::Lzw => {
            let order = if is_old_style_lzw(data) {
                BitOrder::Lsb
            } else {
                BitOrder::Msb
            };
            decompress_lzw(data, expected_size, order)
        }
        Compression::AdobeDeflate | Compression::Deflate => decompress_deflate(data, expected_size),
        Compression::Jpeg => {
            let mut output = JpegDecoder::new().read_header(data)?.decode(u32::MAX)?;
            output.truncate(expected_size);
            Ok(output)
        }
        _ => Err(TiffError::UnsupportedCompression(compression.to_u16())),
    }
}

/// Upper bound on up-front allocation; corrupt headers can claim gigabytes
const MAX_PREALLOC: usize = 1 << 24;

pub(crate) fn initial_capacity(expected_size: usize) -> usize {
    expected_size.min(MAX_PREALLOC)
}

/// Detect LZW streams written by pre-5.0 encoders (LSB-first codes)
pub fn is_old_style_lzw(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0 && data[1] & 0x01 != 0
}

/// Decompress PackBits RLE data
fn decompress_packbits(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(initial_capacity(expected_size));
    let mut i = 0;

    while i < data.len() && output.len() < expected_size {
        let header = data[i] as i8;
        i += 1;

        if header >= 0 {
            // Literal run: copy next (header + 1) bytes
            let count = (header as usize) + 1;
            if i + count > data.len() {
                return Err(TiffError::DecompressionError(
                    "PackBits: unexpected end of data".into(),
                ));
            }
            output.extend_from_slice(&data[i..i + count]);
            i += count;
        } else if header != -128 {
            // Repeat run: repeat next byte (-header + 1) times
            let count = (-(header as isize)) as usize + 1;
            if i >= data.len() {
                return Err(TiffError::DecompressionError(
                    "PackBits: unexpected end of data".into(),
                ));
            }
            let value = data[i];
            i += 1;
            output.resize(output.len() + count, value);
        }
        // header == -128 is a no-op
    }

    output.truncate(expected_size);
    Ok(output)
}

/// Decompress zlib-wrapped Deflate data
fn decompress_deflate(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(initial_capacity(expected_size));
    ZlibDecoder::new(data)
        .take(expected_size as u64)
        .read_to_end(&mut output)
        .map_err(|e| TiffError::DecompressionError(format!("Deflate: {}", e)))?;
    Ok(output)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BitOrder {
    /// TIFF 6.0 codes, width grows one code early
    Msb,
    /// Old-style codes, width grows exactly at the power of two
    Lsb,
}

const LZW_CLEAR: u16 = 256;
const LZW_EOI: u16 = 257;
const LZW_FIRST: u16 = 258;
const LZW_MAX_BITS: u8 = 12;
const LZW_TABLE_SIZE: usize = 1 << LZW_MAX_BITS;

/// LZW code reader
struct LzwBits<'a> {
    data: &'a [u8],
    bit_pos: usize,
    order: BitOrder,
}

impl LzwBits<'_> {
    fn next_code(&mut self, width: u8) -> Option<u16> {
        if self.bit_pos + width as usize > self.data.len() * 8 {
            return None;
        }

        let mut code: u16 = 0;
        for i in 0..width as usize {
            let pos = self.bit_pos + i;
            let byte = self.data[pos / 8];
            match self.order {
                BitOrder::Msb => {
                    let bit = (byte >> (7 - pos % 8)) & 1;
                    code = (code << 1) | bit as u16;
                }
                BitOrder::Lsb => {
                    let bit = (byte >> (pos % 8)) & 1;
                    code |= (bit as u16) << i;
                }
            }
        }
        self.bit_pos += width as usize;
        Some(code)
    }
}

/// LZW decoder state
struct LzwDecoder {
    table: Vec<Vec<u8>>,
    code_size: u8,
    order: BitOrder,
}

impl LzwDecoder {
    fn new(order: BitOrder) -> Self {
        let mut decoder = LzwDecoder {
            table: Vec::with_capacity(LZW_TABLE_SIZE),
            code_size: 9,
            order,
        };
        decoder.reset();
        decoder
    }

    fn reset(&mut self) {
        self.table.clear();
        // Initialize with single-byte entries
        for i in 0..256 {
            self.table.push(vec![i as u8]);
        }
        // Clear code and EOI code
        self.table.push(vec![]);
        self.table.push(vec![]);
        self.code_size = 9;
    }

    fn next_code(&self) -> u16 {
        self.table.len() as u16
    }

    fn add_entry(&mut self, entry: Vec<u8>) {
        if self.table.len() >= LZW_TABLE_SIZE {
            return;
        }
        self.table.push(entry);

        let threshold = match self.order {
            BitOrder::Msb => (1usize << self.code_size) - 1,
            BitOrder::Lsb => 1usize << self.code_size,
        };
        if self.table.len() >= threshold && self.code_size < LZW_MAX_BITS {
            self.code_size += 1;
        }
    }
}

/// Decompress LZW data
fn decompress_lzw(data: &[u8], expected_size: usize, order: BitOrder) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(initial_capacity(expected_size));
    let mut decoder = LzwDecoder::new(order);
    let mut bits = LzwBits { data, bit_pos: 0, order };
    let mut prev_code: Option<u16> = None;

    while output.len() < expected_size {
        let Some(code) = bits.next_code(decoder.code_size) else {
            break;
        };

        if code == LZW_EOI {
            break;
        }

        if code == LZW_CLEAR {
            decoder.reset();
            prev_code = None;
            continue;
        }

        let entry = match prev_code {
            None if code < LZW_CLEAR => decoder.table[code as usize].clone(),
            None => {
                return Err(TiffError::DecompressionError(format!(
                    "LZW: code {} without preceding clear code at byte {}",
                    code,
                    bits.bit_pos / 8
                )));
            }
            Some(_) if code < decoder.next_code() && code != LZW_CLEAR && code != LZW_EOI => {
                decoder.table[code as usize].clone()
            }
            Some(prev) if code == decoder.next_code() => {
                // Special case: code not in table yet
                let mut entry = decoder.table[prev as usize].clone();
                entry.push(entry[0]);
                entry
            }
            Some(_) => {
                return Err(TiffError::DecompressionError(format!(
                    "LZW: corrupted code {} at byte {}",
                    code,
                    bits.bit_pos / 8
                )));
            }
        };

        output.extend_from_slice(&entry);

        if let Some(prev) = prev_code {
            let mut new_entry = decoder.table[prev as usize].clone();
            new_entry.push(entry[0]);
            decoder.add_entry(new_entry);
        }

        prev_code = Some(code);
    }

    output.truncate(expected_size);
    Ok(output)
}
