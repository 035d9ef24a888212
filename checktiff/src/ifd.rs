//! TIFF Image File Directory (IFD) handling

use crate::error::{Result, TiffError};
use crate::handler::DecoderHandler;
use crate::source::Source;
use crate::tags::{data_type, known_tag_name, tag_name};
use crate::types::Endian;
use std::collections::BTreeMap;

/// Size of one directory entry on disk
const ENTRY_SIZE: usize = 12;

/// IFD entry value
#[derive(Debug, Clone, PartialEq)]
pub enum IfdValue {
    /// Byte values
    Bytes(Vec<u8>),
    /// ASCII string
    Ascii(String),
    /// Short (u16) values
    Shorts(Vec<u16>),
    /// Long (u32) values, also used for IFD offsets
    Longs(Vec<u32>),
    /// Rational (numerator/denominator) values
    Rationals(Vec<(u32, u32)>),
    /// Signed byte values
    SBytes(Vec<i8>),
    /// Undefined bytes
    Undefined(Vec<u8>),
    /// Signed short values
    SShorts(Vec<i16>),
    /// Signed long values
    SLongs(Vec<i32>),
    /// Signed rational values
    SRationals(Vec<(i32, i32)>),
    /// Float values
    Floats(Vec<f32>),
    /// Double values
    Doubles(Vec<f64>),
}

impl IfdValue {
    /// Get as single u16 value
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            IfdValue::Bytes(v) if !v.is_empty() => Some(v[0] as u16),
            IfdValue::Shorts(v) if !v.is_empty() => Some(v[0]),
            IfdValue::Longs(v) if !v.is_empty() => u16::try_from(v[0]).ok(),
            _ => None,
        }
    }

    /// Get as single u32 value
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            IfdValue::Bytes(v) if !v.is_empty() => Some(v[0] as u32),
            IfdValue::Shorts(v) if !v.is_empty() => Some(v[0] as u32),
            IfdValue::Longs(v) if !v.is_empty() => Some(v[0]),
            _ => None,
        }
    }

    /// Get as vector of u16 values
    pub fn as_u16_vec(&self) -> Option<Vec<u16>> {
        match self {
            IfdValue::Bytes(v) => Some(v.iter().map(|&b| b as u16).collect()),
            IfdValue::Shorts(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Get as vector of u32 values
    pub fn as_u32_vec(&self) -> Option<Vec<u32>> {
        match self {
            IfdValue::Bytes(v) => Some(v.iter().map(|&b| b as u32).collect()),
            IfdValue::Shorts(v) => Some(v.iter().map(|&s| s as u32).collect()),
            IfdValue::Longs(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<String> {
        match self {
            IfdValue::Ascii(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Get raw bytes of a BYTE or UNDEFINED value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            IfdValue::Bytes(v) | IfdValue::Undefined(v) => Some(v),
            _ => None,
        }
    }
}

/// IFD entry
#[derive(Debug, Clone, PartialEq)]
pub struct IfdEntry {
    /// Tag ID
    pub tag: u16,
    /// Value
    pub value: IfdValue,
}

impl IfdEntry {
    /// Create new entry
    pub fn new(tag: u16, value: IfdValue) -> Self {
        IfdEntry { tag, value }
    }
}

/// Image File Directory
#[derive(Debug, Clone, Default)]
pub struct Ifd {
    /// Entries by tag
    entries: BTreeMap<u16, IfdEntry>,
    /// Offset to next IFD (0 if none)
    pub next_ifd_offset: u32,
}

impl Ifd {
    /// Create new empty IFD
    pub fn new() -> Self {
        Ifd::default()
    }

    /// Add entry, keeping the first one for a repeated tag.
    ///
    /// Returns `false` when the tag was already present.
    pub fn add(&mut self, entry: IfdEntry) -> bool {
        if self.entries.contains_key(&entry.tag) {
            return false;
        }
        self.entries.insert(entry.tag, entry);
        true
    }

    /// Get entry by tag
    pub fn get(&self, tag: u16) -> Option<&IfdEntry> {
        self.entries.get(&tag)
    }

    /// Get value by tag
    pub fn get_value(&self, tag: u16) -> Option<&IfdValue> {
        self.entries.get(&tag).map(|e| &e.value)
    }

    /// Check if a tag is present
    pub fn contains(&self, tag: u16) -> bool {
        self.entries.contains_key(&tag)
    }

    /// Get required u32 value
    pub fn get_required_u32(&self, tag: u16) -> Result<u32> {
        self.get_value(tag)
            .and_then(|v| v.as_u32())
            .ok_or(TiffError::MissingTag(tag_name(tag)))
    }

    /// Get optional u16 value with default
    pub fn get_u16_or(&self, tag: u16, default: u16) -> u16 {
        self.get_value(tag)
            .and_then(|v| v.as_u16())
            .unwrap_or(default)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read the directory at `offset`.
    ///
    /// Entries that cannot be used are reported as warnings and skipped; only
    /// an unreadable directory header is an error.
    pub fn read<S: Source>(
        source: &mut S,
        endian: Endian,
        offset: u32,
        handler: &mut dyn DecoderHandler,
        module: &str,
    ) -> Result<Self> {
        let file_size = source.size()?;

        let mut count_bytes = [0u8; 2];
        if source.read_at(offset as u64, &mut count_bytes)? < 2 {
            return Err(TiffError::InvalidIfd(format!(
                "cannot read directory count at offset {}",
                offset
            )));
        }
        let declared = endian.read_u16(&count_bytes) as usize;
        if declared == 0 {
            return Err(TiffError::InvalidIfd(
                "sanity check on directory count failed, zero tag directories not supported".into(),
            ));
        }

        let mut table = vec![0u8; declared * ENTRY_SIZE];
        let got = source.read_at(offset as u64 + 2, &mut table)?;
        let readable = got / ENTRY_SIZE;
        if readable == 0 {
            return Err(TiffError::InvalidIfd(format!(
                "cannot read directory entries at offset {}",
                offset
            )));
        }
        if readable < declared {
            handler.warning(
                module,
                format_args!(
                    "TIFF directory is truncated, {} of {} entries readable",
                    readable, declared
                ),
            );
        }

        let mut ifd = Ifd::new();
        if readable == declared {
            let mut next = [0u8; 4];
            let next_at = offset as u64 + 2 + table.len() as u64;
            if source.read_at(next_at, &mut next)? == 4 {
                ifd.next_ifd_offset = endian.read_u32(&next);
            } else {
                handler.warning(module, format_args!("Can not read next directory offset"));
            }
        }

        let mut prev_tag: Option<u16> = None;
        let mut unsorted_reported = false;

        for raw in table[..readable * ENTRY_SIZE].chunks_exact(ENTRY_SIZE) {
            let tag = endian.read_u16(&raw[0..2]);

            if let Some(prev) = prev_tag {
                if tag <= prev && !unsorted_reported {
                    handler.warning(
                        module,
                        format_args!(
                            "Invalid TIFF directory; tags are not sorted in ascending order"
                        ),
                    );
                    unsorted_reported = true;
                }
            }
            prev_tag = Some(tag);

            let entry = Self::read_entry(source, endian, raw, file_size, handler, module)?;
            let Some(entry) = entry else {
                continue;
            };

            if known_tag_name(tag).is_none() {
                handler.warning(
                    module,
                    format_args!("Unknown field with tag {} ({:#x}) encountered", tag, tag),
                );
            }

            if !ifd.add(entry) {
                handler.warning(
                    module,
                    format_args!("Duplicated tag \"{}\" ({}) ignored", tag_name(tag), tag),
                );
            }
        }

        Ok(ifd)
    }

    /// Decode one 12-byte entry, `None` if the entry must be ignored
    fn read_entry<S: Source>(
        source: &mut S,
        endian: Endian,
        raw: &[u8],
        file_size: u64,
        handler: &mut dyn DecoderHandler,
        module: &str,
    ) -> Result<Option<IfdEntry>> {
        let tag = endian.read_u16(&raw[0..2]);
        let type_id = endian.read_u16(&raw[2..4]);
        let count = endian.read_u32(&raw[4..8]);

        let type_size = data_type::size(type_id);
        if type_size == 0 {
            handler.warning(
                module,
                format_args!(
                    "Wrong data type {} for \"{}\" ({}); tag ignored",
                    type_id,
                    tag_name(tag),
                    tag
                ),
            );
            return Ok(None);
        }

        let total_size = type_size as u64 * count as u64;

        let data = if total_size <= 4 {
            // Value fits in the 4-byte field
            raw[8..8 + total_size as usize].to_vec()
        } else {
            // Value is at an offset
            let offset = endian.read_u32(&raw[8..12]) as u64;
            if offset + total_size > file_size {
                handler.warning(
                    module,
                    format_args!(
                        "Incorrect value for \"{}\" ({}); data at offset {} runs past end of file; \
                         tag ignored",
                        tag_name(tag),
                        tag,
                        offset
                    ),
                );
                return Ok(None);
            }

            let mut data = vec![0u8; total_size as usize];
            if source.read_at(offset, &mut data)? < data.len() {
                handler.warning(
                    module,
                    format_args!(
                        "Cannot read value of \"{}\" ({}); tag ignored",
                        tag_name(tag),
                        tag
                    ),
                );
                return Ok(None);
            }
            data
        };

        if type_id == data_type::ASCII && data.last() != Some(&0) {
            handler.warning(
                module,
                format_args!(
                    "ASCII value for tag \"{}\" does not end in null byte",
                    tag_name(tag)
                ),
            );
        }

        let value = Self::parse_value(endian, type_id, count, &data);
        Ok(Some(IfdEntry::new(tag, value)))
    }

    /// Parse value from bytes
    fn parse_value(endian: Endian, type_id: u16, count: u32, data: &[u8]) -> IfdValue {
        let count = count as usize;
        match type_id {
            data_type::BYTE => IfdValue::Bytes(data[..count].to_vec()),
            data_type::ASCII => {
                let s = String::from_utf8_lossy(&data[..count]);
                IfdValue::Ascii(s.trim_end_matches('\0').to_string())
            }
            data_type::SHORT => IfdValue::Shorts(
                data.chunks_exact(2)
                    .take(count)
                    .map(|c| endian.read_u16(c))
                    .collect(),
            ),
            data_type::LONG | data_type::IFD => IfdValue::Longs(
                data.chunks_exact(4)
                    .take(count)
                    .map(|c| endian.read_u32(c))
                    .collect(),
            ),
            data_type::RATIONAL => IfdValue::Rationals(
                data.chunks_exact(8)
                    .take(count)
                    .map(|c| (endian.read_u32(&c[..4]), endian.read_u32(&c[4..])))
                    .collect(),
            ),
            data_type::SBYTE => IfdValue::SBytes(data[..count].iter().map(|&b| b as i8).collect()),
            data_type::SSHORT => IfdValue::SShorts(
                data.chunks_exact(2)
                    .take(count)
                    .map(|c| endian.read_i16(c))
                    .collect(),
            ),
            data_type::SLONG => IfdValue::SLongs(
                data.chunks_exact(4)
                    .take(count)
                    .map(|c| endian.read_i32(c))
                    .collect(),
            ),
            data_type::SRATIONAL => IfdValue::SRationals(
                data.chunks_exact(8)
                    .take(count)
                    .map(|c| (endian.read_i32(&c[..4]), endian.read_i32(&c[4..])))
                    .collect(),
            ),
            data_type::FLOAT => IfdValue::Floats(
                data.chunks_exact(4)
                    .take(count)
                    .map(|c| endian.read_f32(c))
                    .collect(),
            ),
            data_type::DOUBLE => IfdValue::Doubles(
                data.chunks_exact(8)
                    .take(count)
                    .map(|c| endian.read_f64(c))
                    .collect(),
            ),
            // UNDEFINED, and anything else that has a size
            _ => IfdValue::Undefined(data[..count.min(data.len())].to_vec()),
        }
    }
}
