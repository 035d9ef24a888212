//! TIFF tag definitions

/// Standard TIFF tags
pub mod tag {
    // Subfile description
    pub const NEW_SUBFILE_TYPE: u16 = 254;
    pub const SUBFILE_TYPE: u16 = 255;

    // Basic tags
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const PHOTOMETRIC_INTERPRETATION: u16 = 262;
    pub const THRESHHOLDING: u16 = 263;
    pub const FILL_ORDER: u16 = 266;

    // Metadata
    pub const DOCUMENT_NAME: u16 = 269;
    pub const IMAGE_DESCRIPTION: u16 = 270;
    pub const MAKE: u16 = 271;
    pub const MODEL: u16 = 272;
    pub const PAGE_NAME: u16 = 285;
    pub const PAGE_NUMBER: u16 = 297;
    pub const SOFTWARE: u16 = 305;
    pub const DATE_TIME: u16 = 306;
    pub const ARTIST: u16 = 315;
    pub const HOST_COMPUTER: u16 = 316;
    pub const COPYRIGHT: u16 = 33432;

    // Data organization
    pub const STRIP_OFFSETS: u16 = 273;
    pub const ORIENTATION: u16 = 274;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const MIN_SAMPLE_VALUE: u16 = 280;
    pub const MAX_SAMPLE_VALUE: u16 = 281;

    // Resolution
    pub const X_RESOLUTION: u16 = 282;
    pub const Y_RESOLUTION: u16 = 283;
    pub const X_POSITION: u16 = 286;
    pub const Y_POSITION: u16 = 287;
    pub const RESOLUTION_UNIT: u16 = 296;

    // Planar configuration
    pub const PLANAR_CONFIGURATION: u16 = 284;

    // Transfer
    pub const TRANSFER_FUNCTION: u16 = 301;
    pub const WHITE_POINT: u16 = 318;
    pub const PRIMARY_CHROMATICITIES: u16 = 319;

    // Predictor (for compression)
    pub const PREDICTOR: u16 = 317;

    // Palette
    pub const COLOR_MAP: u16 = 320;

    // Tile organization
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;

    pub const SUB_IFDS: u16 = 330;
    pub const INK_SET: u16 = 332;

    // Extra samples
    pub const EXTRA_SAMPLES: u16 = 338;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const S_MIN_SAMPLE_VALUE: u16 = 340;
    pub const S_MAX_SAMPLE_VALUE: u16 = 341;

    // JPEG tables
    pub const JPEG_TABLES: u16 = 347;

    // YCbCr
    pub const YCBCR_COEFFICIENTS: u16 = 529;
    pub const YCBCR_SUB_SAMPLING: u16 = 530;
    pub const YCBCR_POSITIONING: u16 = 531;

    // Reference
    pub const REFERENCE_BLACK_WHITE: u16 = 532;

    // Private directories and blobs commonly written by cameras
    pub const XMP: u16 = 700;
    pub const IPTC: u16 = 33723;
    pub const PHOTOSHOP: u16 = 34377;
    pub const EXIF_IFD: u16 = 34665;
    pub const ICC_PROFILE: u16 = 34675;
    pub const GPS_IFD: u16 = 34853;
    pub const INTEROPERABILITY_IFD: u16 = 40965;
}

/// TIFF data types
pub mod data_type {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const RATIONAL: u16 = 5;
    pub const SBYTE: u16 = 6;
    pub const UNDEFINED: u16 = 7;
    pub const SSHORT: u16 = 8;
    pub const SLONG: u16 = 9;
    pub const SRATIONAL: u16 = 10;
    pub const FLOAT: u16 = 11;
    pub const DOUBLE: u16 = 12;
    pub const IFD: u16 = 13;

    /// Get byte size of data type, 0 for unknown types
    pub fn size(type_id: u16) -> usize {
        match type_id {
            BYTE | ASCII | SBYTE | UNDEFINED => 1,
            SHORT | SSHORT => 2,
            LONG | SLONG | FLOAT | IFD => 4,
            RATIONAL | SRATIONAL | DOUBLE => 8,
            _ => 0,
        }
    }
}

/// Get tag name, `None` for tags the decoder does not know
pub fn known_tag_name(tag_id: u16) -> Option<&'static str> {
    let name = match tag_id {
        tag::NEW_SUBFILE_TYPE => "NewSubfileType",
        tag::SUBFILE_TYPE => "SubfileType",
        tag::IMAGE_WIDTH => "ImageWidth",
        tag::IMAGE_LENGTH => "ImageLength",
        tag::BITS_PER_SAMPLE => "BitsPerSample",
        tag::COMPRESSION => "Compression",
        tag::PHOTOMETRIC_INTERPRETATION => "PhotometricInterpretation",
        tag::THRESHHOLDING => "Threshholding",
        tag::FILL_ORDER => "FillOrder",
        tag::DOCUMENT_NAME => "DocumentName",
        tag::IMAGE_DESCRIPTION => "ImageDescription",
        tag::MAKE => "Make",
        tag::MODEL => "Model",
        tag::STRIP_OFFSETS => "StripOffsets",
        tag::ORIENTATION => "Orientation",
        tag::SAMPLES_PER_PIXEL => "SamplesPerPixel",
        tag::ROWS_PER_STRIP => "RowsPerStrip",
        tag::STRIP_BYTE_COUNTS => "StripByteCounts",
        tag::MIN_SAMPLE_VALUE => "MinSampleValue",
        tag::MAX_SAMPLE_VALUE => "MaxSampleValue",
        tag::X_RESOLUTION => "XResolution",
        tag::Y_RESOLUTION => "YResolution",
        tag::PLANAR_CONFIGURATION => "PlanarConfiguration",
        tag::PAGE_NAME => "PageName",
        tag::X_POSITION => "XPosition",
        tag::Y_POSITION => "YPosition",
        tag::RESOLUTION_UNIT => "ResolutionUnit",
        tag::PAGE_NUMBER => "PageNumber",
        tag::TRANSFER_FUNCTION => "TransferFunction",
        tag::SOFTWARE => "Software",
        tag::DATE_TIME => "DateTime",
        tag::ARTIST => "Artist",
        tag::HOST_COMPUTER => "HostComputer",
        tag::PREDICTOR => "Predictor",
        tag::WHITE_POINT => "WhitePoint",
        tag::PRIMARY_CHROMATICITIES => "PrimaryChromaticities",
        tag::COLOR_MAP => "ColorMap",
        tag::TILE_WIDTH => "TileWidth",
        tag::TILE_LENGTH => "TileLength",
        tag::TILE_OFFSETS => "TileOffsets",
        tag::TILE_BYTE_COUNTS => "TileByteCounts",
        tag::SUB_IFDS => "SubIFDs",
        tag::INK_SET => "InkSet",
        tag::EXTRA_SAMPLES => "ExtraSamples",
        tag::SAMPLE_FORMAT => "SampleFormat",
        tag::S_MIN_SAMPLE_VALUE => "SMinSampleValue",
        tag::S_MAX_SAMPLE_VALUE => "SMaxSampleValue",
        tag::JPEG_TABLES => "JPEGTables",
        tag::YCBCR_COEFFICIENTS => "YCbCrCoefficients",
        tag::YCBCR_SUB_SAMPLING => "YCbCrSubsampling",
        tag::YCBCR_POSITIONING => "YCbCrPositioning",
        tag::REFERENCE_BLACK_WHITE => "ReferenceBlackWhite",
        tag::XMP => "XMLPacket",
        tag::COPYRIGHT => "Copyright",
        tag::IPTC => "RichTIFFIPTC",
        tag::PHOTOSHOP => "Photoshop",
        tag::EXIF_IFD => "EXIFIFDOffset",
        tag::ICC_PROFILE => "ICC Profile",
        tag::GPS_IFD => "GPSIFDOffset",
        tag::INTEROPERABILITY_IFD => "InteroperabilityIFDOffset",
        _ => return None,
    };
    Some(name)
}

/// Get tag name
pub fn tag_name(tag_id: u16) -> &'static str {
    known_tag_name(tag_id).unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_size() {
        assert_eq!(data_type::size(data_type::BYTE), 1);
        assert_eq!(data_type::size(data_type::SHORT), 2);
        assert_eq!(data_type::size(data_type::LONG), 4);
        assert_eq!(data_type::size(data_type::IFD), 4);
        assert_eq!(data_type::size(data_type::RATIONAL), 8);
        assert_eq!(data_type::size(99), 0);
    }

    #[test]
    fn test_tag_name() {
        assert_eq!(tag_name(tag::IMAGE_WIDTH), "ImageWidth");
        assert_eq!(tag_name(tag::COMPRESSION), "Compression");
        assert_eq!(known_tag_name(50000), None);
        assert_eq!(tag_name(50000), "Unknown");
    }
}
