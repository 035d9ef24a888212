//! Baseline JPEG decoding for compression scheme 7
//!
//! Each strip or tile of a JPEG-compressed TIFF is a JPEG stream of its own,
//! usually abbreviated: the quantization and Huffman tables are stored once
//! in the JPEGTables field and left out of the chunks. [`JpegDecoder`] holds
//! those shared tables. [`JpegDecoder::read_header`] parses one chunk up to
//! its scan so the caller can check the frame against the TIFF layout before
//! [`JpegStream::decode`] produces interleaved 8-bit samples at full
//! resolution.
//!
//! Only sequential Huffman-coded streams with 8-bit samples and a single
//! scan are accepted.

use crate::compression::initial_capacity;
use crate::error::{Result, TiffError};
use std::f32::consts::{FRAC_1_SQRT_2, PI};
use std::fmt;

/// Zigzag position to natural (row-major) block index
const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

mod marker {
    pub const SOF0: u8 = 0xC0;
    pub const SOF1: u8 = 0xC1;
    pub const DHT: u8 = 0xC4;
    pub const SOI: u8 = 0xD8;
    pub const EOI: u8 = 0xD9;
    pub const SOS: u8 = 0xDA;
    pub const DQT: u8 = 0xDB;
    pub const DRI: u8 = 0xDD;
}

fn corrupt(message: impl fmt::Display) -> TiffError {
    TiffError::DecompressionError(format!("JPEG: {}", message))
}

/// Canonical Huffman table in the maxcode/valptr form of ITU T.81 F.2.2.3
#[derive(Debug, Clone)]
struct HuffmanTable {
    mincode: [i32; 17],
    maxcode: [i32; 17],
    valptr: [i32; 17],
    values: Vec<u8>,
}

impl HuffmanTable {
    fn new(counts: &[u8], values: &[u8]) -> Result<Self> {
        let mut table = HuffmanTable {
            mincode: [0; 17],
            maxcode: [-1; 17],
            valptr: [0; 17],
            values: values.to_vec(),
        };

        let mut code = 0i32;
        let mut index = 0i32;
        for len in 1..=16 {
            let n = counts[len - 1] as i32;
            if n > 0 {
                table.valptr[len] = index;
                table.mincode[len] = code;
                code += n;
                index += n;
                table.maxcode[len] = code - 1;
            }
            if code > 1 << len {
                return Err(corrupt("bogus Huffman table definition"));
            }
            code <<= 1;
        }
        Ok(table)
    }

    fn decode(&self, reader: &mut BitReader<'_>) -> Result<u8> {
        let mut code = 0i32;
        for len in 1..=16 {
            code = (code << 1) | reader.bit()? as i32;
            if code <= self.maxcode[len] {
                let index = self.valptr[len] + code - self.mincode[len];
                return self
                    .values
                    .get(index as usize)
                    .copied()
                    .ok_or_else(|| corrupt("Huffman value out of range"));
            }
        }
        Err(corrupt("corrupt Huffman code"))
    }
}

/// Tables that persist across streams decoded with the same decoder
#[derive(Debug, Clone, Default)]
struct Tables {
    quant: [Option<[u16; 64]>; 4],
    dc: [Option<HuffmanTable>; 4],
    ac: [Option<HuffmanTable>; 4],
    restart_interval: u16,
}

impl Tables {
    fn read_dqt(&mut self, mut seg: &[u8]) -> Result<()> {
        while let Some((&info, rest)) = seg.split_first() {
            let precision = info >> 4;
            let id = (info & 0x0F) as usize;
            if id > 3 {
                return Err(corrupt(format!("bad quantization table id {}", id)));
            }
            let size = if precision == 0 { 64 } else { 128 };
            if rest.len() < size {
                return Err(corrupt("truncated quantization table"));
            }

            let mut table = [0u16; 64];
            for (k, &natural) in ZIGZAG.iter().enumerate() {
                table[natural] = if precision == 0 {
                    rest[k] as u16
                } else {
                    u16::from_be_bytes([rest[2 * k], rest[2 * k + 1]])
                };
            }
            self.quant[id] = Some(table);
            seg = &rest[size..];
        }
        Ok(())
    }

    fn read_dht(&mut self, mut seg: &[u8]) -> Result<()> {
        while let Some((&info, rest)) = seg.split_first() {
            let class = info >> 4;
            let id = (info & 0x0F) as usize;
            if class > 1 || id > 3 {
                return Err(corrupt(format!("bad Huffman table class {} id {}", class, id)));
            }
            if rest.len() < 16 {
                return Err(corrupt("truncated Huffman table"));
            }
            let (counts, rest) = rest.split_at(16);
            let total: usize = counts.iter().map(|&n| n as usize).sum();
            if rest.len() < total || total > 256 {
                return Err(corrupt("truncated Huffman table"));
            }
            let (values, rest) = rest.split_at(total);

            let table = HuffmanTable::new(counts, values)?;
            if class == 0 {
                self.dc[id] = Some(table);
            } else {
                self.ac[id] = Some(table);
            }
            seg = rest;
        }
        Ok(())
    }

    fn read_dri(&mut self, seg: &[u8]) -> Result<()> {
        if seg.len() != 2 {
            return Err(corrupt("bad restart interval segment"));
        }
        self.restart_interval = u16::from_be_bytes([seg[0], seg[1]]);
        Ok(())
    }

    /// Resolve the tables of every component in the scan header `seg`
    fn scan(&self, frame: &Frame, seg: &[u8]) -> Result<Vec<ScanComponent>> {
        let count = seg.first().copied().unwrap_or(0) as usize;
        if count == 0 || seg.len() < 1 + 2 * count + 3 {
            return Err(corrupt("bad scan header"));
        }
        if count != frame.components.len() {
            return Err(corrupt("streams with more than one scan are not supported"));
        }

        let mut scan = Vec::with_capacity(count);
        for selector in seg[1..1 + 2 * count].chunks_exact(2) {
            let (id, tables) = (selector[0], selector[1]);
            let index = frame
                .components
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| corrupt(format!("scan references unknown component {}", id)))?;
            let quant_id = frame.components[index].quant_table as usize;
            let (dc_id, ac_id) = ((tables >> 4) as usize, (tables & 0x0F) as usize);

            let quant = self
                .quant
                .get(quant_id)
                .copied()
                .flatten()
                .ok_or_else(|| corrupt(format!("missing quantization table {}", quant_id)))?;
            let dc = self.dc.get(dc_id).cloned().flatten();
            let ac = self.ac.get(ac_id).cloned().flatten();
            let (Some(dc), Some(ac)) = (dc, ac) else {
                return Err(corrupt(format!("missing Huffman table for component {}", id)));
            };
            scan.push(ScanComponent { index, quant, dc, ac });
        }
        Ok(scan)
    }
}

#[derive(Debug, Clone)]
struct FrameComponent {
    id: u8,
    h: usize,
    v: usize,
    quant_table: u8,
}

#[derive(Debug, Clone)]
struct Frame {
    width: u16,
    height: u16,
    components: Vec<FrameComponent>,
}

impl Frame {
    fn parse(seg: &[u8]) -> Result<Self> {
        if seg.len() < 6 {
            return Err(corrupt("truncated frame header"));
        }
        if seg[0] != 8 {
            return Err(corrupt(format!("unsupported sample precision {}", seg[0])));
        }
        let height = u16::from_be_bytes([seg[1], seg[2]]);
        let width = u16::from_be_bytes([seg[3], seg[4]]);
        if width == 0 || height == 0 {
            return Err(corrupt(format!("bad frame size {}x{}", width, height)));
        }
        let count = seg[5] as usize;
        if !(1..=4).contains(&count) || seg.len() < 6 + 3 * count {
            return Err(corrupt(format!("bad component count {}", count)));
        }

        let mut components = Vec::with_capacity(count);
        for c in seg[6..6 + 3 * count].chunks_exact(3) {
            let (h, v) = ((c[1] >> 4) as usize, (c[1] & 0x0F) as usize);
            if !(1..=4).contains(&h) || !(1..=4).contains(&v) || c[2] > 3 {
                return Err(corrupt(format!("bad parameters for component {}", c[0])));
            }
            components.push(FrameComponent { id: c[0], h, v, quant_table: c[2] });
        }
        Ok(Frame { width, height, components })
    }
}

#[derive(Debug, Clone)]
struct ScanComponent {
    index: usize,
    quant: [u16; 64],
    dc: HuffmanTable,
    ac: HuffmanTable,
}

/// Walks the marker segments of a stream
struct Markers<'d> {
    data: &'d [u8],
    pos: usize,
}

impl<'d> Markers<'d> {
    fn new(data: &'d [u8]) -> Result<Self> {
        if data.len() < 2 || data[0] != 0xFF || data[1] != marker::SOI {
            return Err(corrupt("missing SOI marker"));
        }
        Ok(Markers { data, pos: 2 })
    }

    /// Next marker code, skipping fill bytes; `None` at end of data
    fn next(&mut self) -> Option<u8> {
        while self.pos + 1 < self.data.len() {
            if self.data[self.pos] != 0xFF {
                self.pos += 1;
                continue;
            }
            let code = self.data[self.pos + 1];
            if code == 0xFF {
                self.pos += 1;
                continue;
            }
            self.pos += 2;
            if code != 0x00 {
                return Some(code);
            }
        }
        None
    }

    /// Body of the segment at the cursor
    fn segment(&mut self) -> Result<&'d [u8]> {
        let data = self.data;
        let Some(bytes) = data.get(self.pos..self.pos + 2) else {
            return Err(corrupt("truncated marker segment"));
        };
        let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        let end = self.pos + len;
        if len < 2 || end > data.len() {
            return Err(corrupt("truncated marker segment"));
        }
        let body = &data[self.pos + 2..end];
        self.pos = end;
        Ok(body)
    }

    fn rest(&self) -> &'d [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }
}

/// Shared tables for the strips or tiles of one directory
#[derive(Debug, Clone, Default)]
pub struct JpegDecoder {
    tables: Tables,
}

impl JpegDecoder {
    /// Decoder for streams that carry their own tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder preloaded from a JPEGTables stream
    pub fn with_tables(data: &[u8]) -> Result<Self> {
        let mut tables = Tables::default();
        let mut markers = Markers::new(data)?;
        while let Some(code) = markers.next() {
            match code {
                marker::EOI => break,
                marker::DQT => tables.read_dqt(markers.segment()?)?,
                marker::DHT => tables.read_dht(markers.segment()?)?,
                marker::DRI => tables.read_dri(markers.segment()?)?,
                0xD0..=0xD7 | 0x01 => {}
                _ => {
                    markers.segment()?;
                }
            }
        }
        Ok(JpegDecoder { tables })
    }

    /// Parse `data` up to the start of its entropy-coded scan
    pub fn read_header<'d>(&self, data: &'d [u8]) -> Result<JpegStream<'d>> {
        let mut tables = self.tables.clone();
        let mut frame = None;
        let mut markers = Markers::new(data)?;

        while let Some(code) = markers.next() {
            match code {
                marker::SOF0 | marker::SOF1 => frame = Some(Frame::parse(markers.segment()?)?),
                0xC2 | 0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                    let detail = format!("unsupported coding process (marker {:#04x})", code);
                    return Err(corrupt(detail));
                }
                marker::DQT => tables.read_dqt(markers.segment()?)?,
                marker::DHT => tables.read_dht(markers.segment()?)?,
                marker::DRI => tables.read_dri(markers.segment()?)?,
                marker::SOS => {
                    let frame = frame.ok_or_else(|| corrupt("scan before frame header"))?;
                    let scan = tables.scan(&frame, markers.segment()?)?;
                    return Ok(JpegStream {
                        frame,
                        scan,
                        restart_interval: tables.restart_interval,
                        entropy: markers.rest(),
                    });
                }
                marker::EOI => break,
                0xD0..=0xD7 | 0x01 => {}
                _ => {
                    markers.segment()?;
                }
            }
        }
        Err(corrupt("no image data"))
    }
}

/// One stream whose headers have been read
#[derive(Debug)]
pub struct JpegStream<'d> {
    frame: Frame,
    scan: Vec<ScanComponent>,
    restart_interval: u16,
    entropy: &'d [u8],
}

impl JpegStream<'_> {
    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.frame.width as u32
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.frame.height as u32
    }

    /// Number of components per pixel
    pub fn components(&self) -> u16 {
        self.frame.components.len() as u16
    }

    /// Decode the first `max_rows` rows (at most the frame height).
    ///
    /// Components are upsampled to full resolution and interleaved, so each
    /// row holds `width * components` bytes.
    pub fn decode(self, max_rows: u32) -> Result<Vec<u8>> {
        let width = self.frame.width as usize;
        let rows = self.height().min(max_rows) as usize;
        let n = self.frame.components.len();

        // A lone component is coded block by block whatever its sampling
        let sampling: Vec<(usize, usize)> = if n == 1 {
            vec![(1, 1)]
        } else {
            self.frame.components.iter().map(|c| (c.h, c.v)).collect()
        };
        let hmax = sampling.iter().map(|s| s.0).max().unwrap_or(1);
        let vmax = sampling.iter().map(|s| s.1).max().unwrap_or(1);
        let (mcu_width, mcu_height) = (8 * hmax, 8 * vmax);
        let mcus_across = width.div_ceil(mcu_width);
        let mcu_rows = rows.div_ceil(mcu_height);

        let strides: Vec<usize> = sampling.iter().map(|&(h, _)| mcus_across * h * 8).collect();
        let mut planes: Vec<Vec<u8>> = sampling
            .iter()
            .zip(&strides)
            .map(|(&(_, v), &stride)| vec![0u8; stride * v * 8])
            .collect();

        let idct = Idct::new();
        let mut reader = BitReader::new(self.entropy);
        let mut predictions = vec![0i32; n];
        let mut out = Vec::with_capacity(initial_capacity(width * rows * n));
        let interval = self.restart_interval as usize;
        let mut coded = 0usize;

        for mcu_row in 0..mcu_rows {
            for mcu_x in 0..mcus_across {
                if interval > 0 && coded > 0 && coded % interval == 0 {
                    reader.restart()?;
                    predictions.iter_mut().for_each(|p| *p = 0);
                }
                for component in &self.scan {
                    let (h, v) = sampling[component.index];
                    let stride = strides[component.index];
                    for by in 0..v {
                        for bx in 0..h {
                            let coefficients = decode_block(
                                &mut reader,
                                component,
                                &mut predictions[component.index],
                            )?;
                            let samples = idct.apply(&coefficients);
                            let x0 = (mcu_x * h + bx) * 8;
                            let plane = &mut planes[component.index];
                            for (y, line) in samples.chunks_exact(8).enumerate() {
                                let at = (by * 8 + y) * stride + x0;
                                plane[at..at + 8].copy_from_slice(line);
                            }
                        }
                    }
                }
                coded += 1;
            }

            let first = mcu_row * mcu_height;
            for y in first..(first + mcu_height).min(rows) {
                for x in 0..width {
                    for (c, &(h, v)) in sampling.iter().enumerate() {
                        let py = (y - first) * v / vmax;
                        let px = x * h / hmax;
                        out.push(planes[c][py * strides[c] + px]);
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Sign-extend the `size`-bit magnitude `bits` (T.81 F.2.2.1)
fn extend(bits: u16, size: u8) -> i32 {
    if size == 0 {
        return 0;
    }
    let value = bits as i32;
    if value < 1 << (size - 1) {
        value - (1 << size) + 1
    } else {
        value
    }
}

fn decode_block(
    reader: &mut BitReader<'_>,
    component: &ScanComponent,
    prediction: &mut i32,
) -> Result<[i32; 64]> {
    let mut coefficients = [0i32; 64];

    let size = component.dc.decode(reader)?;
    if size > 11 {
        return Err(corrupt("bad DC difference category"));
    }
    *prediction = prediction.wrapping_add(extend(reader.bits(size)?, size));
    coefficients[0] = prediction.wrapping_mul(component.quant[0] as i32);

    let mut k = 1;
    while k < 64 {
        let symbol = component.ac.decode(reader)?;
        let (run, size) = ((symbol >> 4) as usize, symbol & 0x0F);
        if size == 0 {
            if run == 15 {
                k += 16;
                continue;
            }
            break;
        }
        k += run;
        if k > 63 {
            return Err(corrupt("AC coefficient index out of range"));
        }
        let natural = ZIGZAG[k];
        let value = extend(reader.bits(size)?, size);
        coefficients[natural] = value.wrapping_mul(component.quant[natural] as i32);
        k += 1;
    }

    Ok(coefficients)
}

/// Separable floating-point inverse DCT
struct Idct {
    basis: [[f32; 8]; 8],
}

impl Idct {
    fn new() -> Self {
        let mut basis = [[0.0f32; 8]; 8];
        for (x, row) in basis.iter_mut().enumerate() {
            for (u, value) in row.iter_mut().enumerate() {
                let scale = if u == 0 { FRAC_1_SQRT_2 } else { 1.0 };
                *value = scale * ((2 * x + 1) as f32 * u as f32 * PI / 16.0).cos() / 2.0;
            }
        }
        Idct { basis }
    }

    /// Level-shifted 8-bit samples of one block
    fn apply(&self, coefficients: &[i32; 64]) -> [u8; 64] {
        let mut rows = [0.0f32; 64];
        for v in 0..8 {
            for x in 0..8 {
                rows[v * 8 + x] = (0..8)
                    .map(|u| self.basis[x][u] * coefficients[v * 8 + u] as f32)
                    .sum();
            }
        }

        let mut samples = [0u8; 64];
        for y in 0..8 {
            for x in 0..8 {
                let value: f32 = (0..8).map(|v| self.basis[y][v] * rows[v * 8 + x]).sum();
                samples[y * 8 + x] = (value.round() + 128.0).clamp(0.0, 255.0) as u8;
            }
        }
        samples
    }
}

/// MSB-first reader over entropy-coded data with byte stuffing removed
struct BitReader<'d> {
    data: &'d [u8],
    pos: usize,
    acc: u32,
    count: u32,
}

impl<'d> BitReader<'d> {
    fn new(data: &'d [u8]) -> Self {
        BitReader { data, pos: 0, acc: 0, count: 0 }
    }

    fn fill(&mut self) -> Result<()> {
        let Some(&byte) = self.data.get(self.pos) else {
            return Err(corrupt("premature end of data segment"));
        };
        if byte == 0xFF {
            if self.data.get(self.pos + 1) != Some(&0x00) {
                return Err(corrupt("premature end of data segment"));
            }
            self.pos += 2;
        } else {
            self.pos += 1;
        }
        self.acc = byte as u32;
        self.count = 8;
        Ok(())
    }

    fn bit(&mut self) -> Result<u16> {
        if self.count == 0 {
            self.fill()?;
        }
        self.count -= 1;
        Ok(((self.acc >> self.count) & 1) as u16)
    }

    fn bits(&mut self, n: u8) -> Result<u16> {
        let mut value = 0u16;
        for _ in 0..n {
            value = (value << 1) | self.bit()?;
        }
        Ok(value)
    }

    /// Drop buffered bits and consume the RSTn marker that must follow
    fn restart(&mut self) -> Result<()> {
        self.count = 0;
        while self.data.get(self.pos) == Some(&0xFF) && self.data.get(self.pos + 1) == Some(&0xFF) {
            self.pos += 1;
        }
        match (self.data.get(self.pos), self.data.get(self.pos + 1)) {
            (Some(&0xFF), Some(&code)) if (0xD0..=0xD7).contains(&code) => {
                self.pos += 2;
                Ok(())
            }
            _ => Err(corrupt("missing restart marker")),
        }
    }
}
