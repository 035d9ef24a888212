//! In-memory TIFF fixtures shared by the integration suites

#![allow(dead_code)]

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use checktiff::tags::{data_type, tag};
use std::collections::HashMap;
use std::io::Write;

/// Byte order of a fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Little,
    Big,
}

/// Tag value as written to disk
#[derive(Debug, Clone)]
pub enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Ascii(String),
    /// Arbitrary type id and count over raw bytes
    Raw { ty: u16, count: u32, bytes: Vec<u8> },
}

impl Value {
    fn type_and_count(&self) -> (u16, u32) {
        match self {
            Value::Short(v) => (data_type::SHORT, v.len() as u32),
            Value::Long(v) => (data_type::LONG, v.len() as u32),
            Value::Ascii(s) => (data_type::ASCII, s.len() as u32 + 1),
            Value::Raw { ty, count, .. } => (*ty, *count),
        }
    }

    fn encode(&self, order: Order) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Value::Short(v) => v.iter().for_each(|&x| put_u16(&mut out, order, x)),
            Value::Long(v) => v.iter().for_each(|&x| put_u32(&mut out, order, x)),
            Value::Ascii(s) => {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            Value::Raw { bytes, .. } => out.extend_from_slice(bytes),
        }
        out
    }
}

/// How the byte-count tag is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteCounts {
    /// Lengths of the chunks as stored
    Actual,
    /// No byte-count tag at all
    Omit,
    /// These values instead
    Explicit(Vec<u32>),
}

/// One image directory plus its strip or tile data
#[derive(Debug, Clone)]
pub struct Page {
    fields: Vec<(u16, Value)>,
    chunks: Vec<Vec<u8>>,
    tiled: bool,
    byte_counts: ByteCounts,
    offsets: Option<Vec<u32>>,
}

impl Page {
    /// 8-bit grayscale with every row in one strip and no data yet
    pub fn gray8(width: u32, height: u32) -> Self {
        Page {
            fields: vec![
                (tag::IMAGE_WIDTH, Value::Long(vec![width])),
                (tag::IMAGE_LENGTH, Value::Long(vec![height])),
                (tag::BITS_PER_SAMPLE, Value::Short(vec![8])),
                (tag::COMPRESSION, Value::Short(vec![1])),
                (tag::PHOTOMETRIC_INTERPRETATION, Value::Short(vec![1])),
                (tag::SAMPLES_PER_PIXEL, Value::Short(vec![1])),
                (tag::ROWS_PER_STRIP, Value::Long(vec![height])),
            ],
            chunks: Vec::new(),
            tiled: false,
            byte_counts: ByteCounts::Actual,
            offsets: None,
        }
    }

    /// Set a tag, replacing an earlier value
    pub fn set(mut self, tag: u16, value: Value) -> Self {
        match self.fields.iter_mut().find(|(t, _)| *t == tag) {
            Some(field) => field.1 = value,
            None => self.fields.push((tag, value)),
        }
        self
    }

    /// Drop a tag
    pub fn remove(mut self, tag: u16) -> Self {
        self.fields.retain(|(t, _)| *t != tag);
        self
    }

    /// Append one strip or tile
    pub fn chunk(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.chunks.push(data.into());
        self
    }

    /// Store chunks as tiles of the given size
    pub fn tiled(mut self, width: u32, length: u32) -> Self {
        self.tiled = true;
        self.remove(tag::ROWS_PER_STRIP)
            .set(tag::TILE_WIDTH, Value::Long(vec![width]))
            .set(tag::TILE_LENGTH, Value::Long(vec![length]))
    }

    pub fn byte_counts(mut self, counts: ByteCounts) -> Self {
        self.byte_counts = counts;
        self
    }

    /// Write these offsets instead of the real ones
    pub fn offsets(mut self, offsets: Vec<u32>) -> Self {
        self.offsets = Some(offsets);
        self
    }
}

fn put_u16(out: &mut Vec<u8>, order: Order, value: u16) {
    match order {
        Order::Little => out.write_u16::<LittleEndian>(value),
        Order::Big => out.write_u16::<BigEndian>(value),
    }
    .unwrap();
}

fn put_u32(out: &mut Vec<u8>, order: Order, value: u32) {
    match order {
        Order::Little => out.write_u32::<LittleEndian>(value),
        Order::Big => out.write_u32::<BigEndian>(value),
    }
    .unwrap();
}

fn patch_u32(out: &mut [u8], at: usize, order: Order, value: u32) {
    match order {
        Order::Little => LittleEndian::write_u32(&mut out[at..at + 4], value),
        Order::Big => BigEndian::write_u32(&mut out[at..at + 4], value),
    }
}

/// Serialize `pages` as a chain of directories
pub fn build(order: Order, pages: &[Page]) -> Vec<u8> {
    let mut out = match order {
        Order::Little => b"II".to_vec(),
        Order::Big => b"MM".to_vec(),
    };
    put_u16(&mut out, order, 42);
    let mut link_at = out.len();
    put_u32(&mut out, order, 0);

    for page in pages {
        let mut stored = Vec::new();
        for chunk in &page.chunks {
            stored.push(out.len() as u32);
            out.extend_from_slice(chunk);
        }

        let (offsets_tag, counts_tag) = if page.tiled {
            (tag::TILE_OFFSETS, tag::TILE_BYTE_COUNTS)
        } else {
            (tag::STRIP_OFFSETS, tag::STRIP_BYTE_COUNTS)
        };

        let mut fields = page.fields.clone();
        if !page.chunks.is_empty() || page.offsets.is_some() {
            let offsets = page.offsets.clone().unwrap_or(stored);
            fields.push((offsets_tag, Value::Long(offsets)));
            match &page.byte_counts {
                ByteCounts::Actual => {
                    let counts = page.chunks.iter().map(|c| c.len() as u32).collect();
                    fields.push((counts_tag, Value::Long(counts)));
                }
                ByteCounts::Explicit(counts) => {
                    fields.push((counts_tag, Value::Long(counts.clone())));
                }
                ByteCounts::Omit => {}
            }
        }
        fields.sort_by_key(|(tag, _)| *tag);

        if out.len() % 2 == 1 {
            out.push(0);
        }
        let ifd_offset = out.len();
        patch_u32(&mut out, link_at, order, ifd_offset as u32);

        let extra_start = ifd_offset + 2 + fields.len() * 12 + 4;
        let mut extra = Vec::new();
        put_u16(&mut out, order, fields.len() as u16);
        for (tag, value) in &fields {
            let (ty, count) = value.type_and_count();
            let mut bytes = value.encode(order);
            put_u16(&mut out, order, *tag);
            put_u16(&mut out, order, ty);
            put_u32(&mut out, order, count);
            if bytes.len() <= 4 {
                bytes.resize(4, 0);
                out.extend_from_slice(&bytes);
            } else {
                if extra.len() % 2 == 1 {
                    extra.push(0);
                }
                put_u32(&mut out, order, (extra_start + extra.len()) as u32);
                extra.extend_from_slice(&bytes);
            }
        }
        link_at = out.len();
        put_u32(&mut out, order, 0);
        out.extend_from_slice(&extra);
    }

    out
}

/// Little-endian single-directory file
pub fn single(page: Page) -> Vec<u8> {
    build(Order::Little, &[page])
}

/// Ramp of `len` bytes
pub fn ramp(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 13 % 256) as u8).collect()
}

/// PackBits encoding made only of literal runs
pub fn packbits(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for run in data.chunks(128) {
        out.push((run.len() - 1) as u8);
        out.extend_from_slice(run);
    }
    out
}

/// Zlib stream as written for Deflate compression
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// MSB-first TIFF LZW encoding
pub fn lzw(data: &[u8]) -> Vec<u8> {
    const CLEAR: u16 = 256;
    const EOI: u16 = 257;
    const FIRST: u16 = 258;
    const MAX_BITS: u8 = 12;

    let mut out = Vec::new();
    let mut acc: u32 = 0;
    let mut nbits: u32 = 0;
    let mut put = |out: &mut Vec<u8>, code: u16, width: u8| {
        acc = (acc << width) | code as u32;
        nbits += width as u32;
        while nbits >= 8 {
            out.push((acc >> (nbits - 8)) as u8);
            nbits -= 8;
        }
        acc &= (1 << nbits) - 1;
    };

    let mut table: HashMap<Vec<u8>, u16> = (0..256u16).map(|i| (vec![i as u8], i)).collect();
    let mut next = FIRST;
    let mut width: u8 = 9;

    put(&mut out, CLEAR, width);
    let mut current: Vec<u8> = Vec::new();
    for &byte in data {
        let mut candidate = current.clone();
        candidate.push(byte);
        if table.contains_key(&candidate) {
            current = candidate;
            continue;
        }
        put(&mut out, table[&current], width);
        table.insert(candidate, next);
        next += 1;
        if next as usize >= (1usize << width) && width < MAX_BITS {
            width += 1;
        }
        if next as usize >= (1usize << MAX_BITS) - 2 {
            put(&mut out, CLEAR, width);
            table = (0..256u16).map(|i| (vec![i as u8], i)).collect();
            next = FIRST;
            width = 9;
        }
        current = vec![byte];
    }
    if !current.is_empty() {
        put(&mut out, table[&current], width);
        next += 1;
        if next as usize >= (1usize << width) && width < MAX_BITS {
            width += 1;
        }
    }
    put(&mut out, EOI, width);
    if nbits > 0 {
        out.push((acc << (8 - nbits)) as u8);
    }
    out
}

/// DQT of eights, a DC table with categories 0 ("0") and 3 ("10"), and an
/// AC table holding only end-of-block ("0")
fn jpeg_table_segments() -> Vec<u8> {
    let mut out = vec![0xFF, 0xDB, 0x00, 67, 0x00];
    out.extend_from_slice(&[8u8; 64]);
    out.extend_from_slice(&[0xFF, 0xC4, 0x00, 21, 0x00, 1, 1]);
    out.extend_from_slice(&[0u8; 14]);
    out.extend_from_slice(&[0, 3]);
    out.extend_from_slice(&[0xFF, 0xC4, 0x00, 20, 0x10, 1]);
    out.extend_from_slice(&[0u8; 15]);
    out.push(0);
    out
}

/// JPEGTables contents matching [`jpeg`] streams written without tables
pub fn jpeg_tables() -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    out.extend(jpeg_table_segments());
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// Baseline JPEG whose samples all decode to 132, with `components`
/// unsubsampled components; abbreviated when `tables` is false
pub fn jpeg(width: u16, height: u16, components: u8, tables: bool) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    if tables {
        out.extend(jpeg_table_segments());
    }

    out.extend_from_slice(&[0xFF, 0xC0, 0x00, 8 + 3 * components, 8]);
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.push(components);
    for id in 1..=components {
        out.extend_from_slice(&[id, 0x11, 0]);
    }
    out.extend_from_slice(&[0xFF, 0xDA, 0x00, 6 + 2 * components, components]);
    for id in 1..=components {
        out.extend_from_slice(&[id, 0x00]);
    }
    out.extend_from_slice(&[0, 63, 0]);

    // First block of each component: DC "10" + "100" (+4), EOB "0".
    // Later blocks: DC "0", EOB "0".
    let blocks = (width as usize).div_ceil(8) * (height as usize).div_ceil(8);
    let mut bits: Vec<u8> = Vec::new();
    for block in 0..blocks {
        for _ in 0..components {
            if block == 0 {
                bits.extend_from_slice(&[1, 0, 1, 0, 0, 0]);
            } else {
                bits.extend_from_slice(&[0, 0]);
            }
        }
    }
    while bits.len() % 8 != 0 {
        bits.push(1);
    }
    for byte in bits.chunks(8) {
        let value = byte.iter().fold(0u8, |acc, &b| (acc << 1) | b);
        out.push(value);
        if value == 0xFF {
            out.push(0x00);
        }
    }

    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}
