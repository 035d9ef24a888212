//! TIFF type definitions

use crate::compression::Compression;
use crate::{TIFF_MAGIC_BE, TIFF_MAGIC_LE};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fmt;

/// Byte order declared by the file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// "II" - Intel
    Little,
    /// "MM" - Motorola
    Big,
}

impl Endian {
    /// Detect from the two magic bytes
    pub fn from_magic(magic: [u8; 2]) -> Option<Self> {
        match magic {
            TIFF_MAGIC_LE => Some(Endian::Little),
            TIFF_MAGIC_BE => Some(Endian::Big),
            _ => None,
        }
    }

    /// Read a u16 from the first two bytes of `buf`
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    /// Read a u32 from the first four bytes of `buf`
    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }

    /// Read an i16
    pub fn read_i16(self, buf: &[u8]) -> i16 {
        match self {
            Endian::Little => LittleEndian::read_i16(buf),
            Endian::Big => BigEndian::read_i16(buf),
        }
    }

    /// Read an i32
    pub fn read_i32(self, buf: &[u8]) -> i32 {
        match self {
            Endian::Little => LittleEndian::read_i32(buf),
            Endian::Big => BigEndian::read_i32(buf),
        }
    }

    /// Read an IEEE single
    pub fn read_f32(self, buf: &[u8]) -> f32 {
        match self {
            Endian::Little => LittleEndian::read_f32(buf),
            Endian::Big => BigEndian::read_f32(buf),
        }
    }

    /// Read an IEEE double
    pub fn read_f64(self, buf: &[u8]) -> f64 {
        match self {
            Endian::Little => LittleEndian::read_f64(buf),
            Endian::Big => BigEndian::read_f64(buf),
        }
    }
}

/// Photometric interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotometricInterpretation {
    /// WhiteIsZero - min value is white
    WhiteIsZero,
    /// BlackIsZero - min value is black
    BlackIsZero,
    /// RGB color
    Rgb,
    /// Palette color (indexed)
    Palette,
    /// Transparency mask
    TransparencyMask,
    /// CMYK
    Cmyk,
    /// YCbCr
    YCbCr,
    /// CIE L*a*b*
    CieLab,
    /// ICC L*a*b*
    IccLab,
    /// ITU L*a*b*
    ItuLab,
    /// Color filter array (raw sensor data)
    ColorFilterArray,
    /// Linear raw
    LinearRaw,
}

impl PhotometricInterpretation {
    /// Create from TIFF value
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(PhotometricInterpretation::WhiteIsZero),
            1 => Some(PhotometricInterpretation::BlackIsZero),
            2 => Some(PhotometricInterpretation::Rgb),
            3 => Some(PhotometricInterpretation::Palette),
            4 => Some(PhotometricInterpretation::TransparencyMask),
            5 => Some(PhotometricInterpretation::Cmyk),
            6 => Some(PhotometricInterpretation::YCbCr),
            8 => Some(PhotometricInterpretation::CieLab),
            9 => Some(PhotometricInterpretation::IccLab),
            10 => Some(PhotometricInterpretation::ItuLab),
            32803 => Some(PhotometricInterpretation::ColorFilterArray),
            34892 => Some(PhotometricInterpretation::LinearRaw),
            _ => None,
        }
    }
}

/// Planar configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanarConfig {
    /// Chunky format (RGBRGBRGB...)
    #[default]
    Chunky,
    /// Planar format (RRR...GGG...BBB...)
    Planar,
}

impl PlanarConfig {
    /// Create from TIFF value
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(PlanarConfig::Chunky),
            2 => Some(PlanarConfig::Planar),
            _ => None,
        }
    }
}

/// Tile geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tiling {
    /// Tile width in pixels
    pub width: u32,
    /// Tile length in rows
    pub length: u32,
}

/// Data organization of one directory, as needed to decode it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageLayout {
    /// Image width
    pub width: u32,
    /// Image length (rows)
    pub height: u32,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Samples per pixel
    pub samples_per_pixel: u16,
    /// Planar configuration
    pub planar_config: PlanarConfig,
    /// Compression scheme
    pub compression: Compression,
    /// Rows per strip, clamped to the image length
    pub rows_per_strip: u32,
    /// Tile geometry for tiled images
    pub tiling: Option<Tiling>,
}

impl ImageLayout {
    /// Samples stored together in one strip or tile
    fn samples_per_chunk(&self) -> u64 {
        match self.planar_config {
            PlanarConfig::Chunky => self.samples_per_pixel as u64,
            PlanarConfig::Planar => 1,
        }
    }

    /// Number of separately stored sample planes
    pub fn planes(&self) -> u16 {
        match self.planar_config {
            PlanarConfig::Chunky => 1,
            PlanarConfig::Planar => self.samples_per_pixel,
        }
    }

    /// Bytes in one row of `width` pixels
    fn row_bytes(&self, width: u32) -> u64 {
        (width as u64 * self.bits_per_sample as u64 * self.samples_per_chunk()).div_ceil(8)
    }

    /// Bytes in one decoded scanline
    pub fn scanline_size(&self) -> u64 {
        self.row_bytes(self.width)
    }

    /// Strips needed to cover one sample plane
    pub fn strips_per_image(&self) -> u32 {
        if self.height == 0 || self.rows_per_strip == 0 {
            return 0;
        }
        self.height.div_ceil(self.rows_per_strip)
    }

    /// Strips needed for the whole image
    pub fn number_of_strips(&self) -> u32 {
        self.strips_per_image().saturating_mul(self.planes() as u32)
    }

    /// Rows held by strip `strip` (counted within its plane)
    pub fn rows_in_strip(&self, strip: u32) -> u32 {
        let start = (strip % self.strips_per_image().max(1)).saturating_mul(self.rows_per_strip);
        self.rows_per_strip.min(self.height.saturating_sub(start))
    }

    /// Bytes in one decoded tile
    pub fn tile_size(&self) -> u64 {
        match self.tiling {
            Some(t) => self.row_bytes(t.width).saturating_mul(t.length as u64),
            None => 0,
        }
    }

    /// Tiles across and down one sample plane
    pub fn tile_grid(&self) -> (u32, u32) {
        match self.tiling {
            Some(t) if t.width > 0 && t.length > 0 => {
                (self.width.div_ceil(t.width), self.height.div_ceil(t.length))
            }
            _ => (0, 0),
        }
    }

    /// Tiles needed for the whole image
    pub fn number_of_tiles(&self) -> u32 {
        let (across, down) = self.tile_grid();
        across
            .saturating_mul(down)
            .saturating_mul(self.planes() as u32)
    }

    /// Whether data is organized in tiles
    pub fn is_tiled(&self) -> bool {
        self.tiling.is_some()
    }
}

impl fmt::Display for ImageLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {}x{}-bit {:?} {}",
            self.width,
            self.height,
            self.samples_per_pixel,
            self.bits_per_sample,
            self.planar_config,
            self.compression.name()
        )?;
        if let Some(t) = self.tiling {
            write!(f, " tiles {}x{}", t.width, t.length)?;
        }
        Ok(())
    }
}
