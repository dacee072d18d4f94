//! Elevation raster layers (DEMS: DEMI headers + DEMD sample grids).
//!
//! A layer is a flat grid of samples stored row-major with x varying fastest
//! (`index = y * width + x`), in one of three sample formats selected by the
//! header flags: 32-bit float, signed integer, or unsigned integer, the
//! integer widths being 1, 2, or 4 bytes. A (scale, offset) pair maps raw
//! samples to world units, mirroring the pool scaling scheme.

use crate::bytes::{DataReader, DataWriter};
use crate::error::{DsfError, DsfResult};
use log::warn;

/// Sample storage format, from the low two header flag bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleFormat {
    Float,
    Signed,
    Unsigned,
}

/// One raster layer: DEMI header fields plus the raw DEMD sample bytes.
#[derive(Debug, Clone)]
pub struct RasterLayer {
    /// Layer name from the DEMN definition table (e.g. "elevation").
    pub name: String,
    version: u8,
    bytes_per_sample: u8,
    flags: u16,
    width: u32,
    height: u32,
    scale: f32,
    offset: f32,
    data: Vec<u8>,
}

impl RasterLayer {
    /// Parses a DEMI payload and claims the matching DEMD payload.
    pub fn decode(info: &[u8], samples: Vec<u8>) -> DsfResult<RasterLayer> {
        if info.len() != 20 {
            return Err(DsfError::Format(format!(
                "raster header is {} bytes, expected 20",
                info.len()
            )));
        }
        let mut r = DataReader::new(info);
        let layer = RasterLayer {
            name: String::new(),
            version: r.read_u8()?,
            bytes_per_sample: r.read_u8()?,
            flags: r.read_u16()?,
            width: r.read_u32()?,
            height: r.read_u32()?,
            scale: r.read_f32()?,
            offset: r.read_f32()?,
            data: samples,
        };
        if layer.version != 1 {
            return Err(DsfError::Format(format!(
                "unsupported raster header version {}",
                layer.version
            )));
        }
        let format = layer.format()?;
        match (format, layer.bytes_per_sample) {
            (SampleFormat::Float, 4) => {}
            (SampleFormat::Signed | SampleFormat::Unsigned, 1 | 2 | 4) => {}
            _ => {
                return Err(DsfError::Format(format!(
                    "raster sample format {:?} with {} bytes per sample",
                    format, layer.bytes_per_sample
                )))
            }
        }
        let expected = layer.width as usize * layer.height as usize * layer.bytes_per_sample as usize;
        if layer.data.len() != expected {
            return Err(DsfError::Format(format!(
                "raster data is {} bytes, expected {} for {}x{}x{}",
                layer.data.len(),
                expected,
                layer.width,
                layer.height,
                layer.bytes_per_sample
            )));
        }
        Ok(layer)
    }

    /// Builds an empty layer, used by tests and mesh splicing.
    pub fn new(
        name: &str,
        format: SampleFormat,
        bytes_per_sample: u8,
        width: u32,
        height: u32,
        scale: f32,
        offset: f32,
    ) -> RasterLayer {
        let flags = match format {
            SampleFormat::Float => 0,
            SampleFormat::Signed => 1,
            SampleFormat::Unsigned => 2,
        };
        RasterLayer {
            name: name.to_string(),
            version: 1,
            bytes_per_sample,
            flags,
            width,
            height,
            scale,
            offset,
            data: vec![0; width as usize * height as usize * bytes_per_sample as usize],
        }
    }

    pub fn format(&self) -> DsfResult<SampleFormat> {
        match self.flags & 0x3 {
            0 => Ok(SampleFormat::Float),
            1 => Ok(SampleFormat::Signed),
            2 => Ok(SampleFormat::Unsigned),
            other => Err(DsfError::Format(format!(
                "unknown raster sample format bits {}",
                other
            ))),
        }
    }

    /// Whether samples sit on grid posts rather than cell centers.
    pub fn post_centric(&self) -> bool {
        self.flags & 0x4 != 0
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    fn sample_offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        (y as usize * self.width as usize + x as usize) * self.bytes_per_sample as usize
    }

    /// The raw (unscaled) sample at (x, y).
    pub fn raw(&self, x: u32, y: u32) -> f64 {
        let at = self.sample_offset(x, y);
        let b = &self.data[at..at + self.bytes_per_sample as usize];
        // Format/width combinations and the grid size were validated at
        // construction, so the slice always holds a whole sample.
        match (self.flags & 0x3, self.bytes_per_sample) {
            (0, _) => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            (1, 1) => b[0] as i8 as f64,
            (1, 2) => i16::from_le_bytes([b[0], b[1]]) as f64,
            (1, _) => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            (_, 1) => b[0] as f64,
            (_, 2) => u16::from_le_bytes([b[0], b[1]]) as f64,
            (_, _) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
        }
    }

    /// The sample at (x, y) in world units.
    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.raw(x, y) * self.scale as f64 + self.offset as f64
    }

    /// Stores a world-unit value at (x, y), re-quantizing to the layer's
    /// sample type. Out-of-range values clamp with a warning.
    pub fn set(&mut self, x: u32, y: u32, value: f64) {
        let raw = if self.scale != 0.0 {
            (value - self.offset as f64) / self.scale as f64
        } else {
            value
        };
        let mut w = DataWriter::new();
        let mut clamped = false;
        let mut quantize = |raw: f64, lo: f64, hi: f64| -> f64 {
            let r = raw.round();
            if r < lo {
                clamped = true;
                lo
            } else if r > hi {
                clamped = true;
                hi
            } else {
                r
            }
        };
        match (self.flags & 0x3, self.bytes_per_sample) {
            (0, _) => w.put_f32(raw as f32),
            (1, 1) => w.put_u8(quantize(raw, i8::MIN as f64, i8::MAX as f64) as i8 as u8),
            (1, 2) => w.put_u16(quantize(raw, i16::MIN as f64, i16::MAX as f64) as i16 as u16),
            (1, _) => w.put_i32(quantize(raw, i32::MIN as f64, i32::MAX as f64) as i32),
            (_, 1) => w.put_u8(quantize(raw, 0.0, u8::MAX as f64) as u8),
            (_, 2) => w.put_u16(quantize(raw, 0.0, u16::MAX as f64) as u16),
            (_, _) => w.put_u32(quantize(raw, 0.0, u32::MAX as f64) as u32),
        }
        if clamped {
            warn!(
                "Raster '{}': value {} at ({}, {}) is out of range for the sample type; clamped.",
                self.name, value, x, y
            );
        }
        let at = self.sample_offset(x, y);
        self.data[at..at + self.bytes_per_sample as usize].copy_from_slice(
            &w.into_bytes(),
        );
    }

    /// Sets every sample in the half-open grid rectangle to `value`; the
    /// rectangle is clamped to the layer bounds.
    pub fn fill_region(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, value: f64) {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                self.set(x, y, value);
            }
        }
    }

    /// Re-encodes the DEMI header payload.
    pub fn encode_info(&self) -> Vec<u8> {
        let mut w = DataWriter::new();
        w.put_u8(self.version);
        w.put_u8(self.bytes_per_sample);
        w.put_u16(self.flags);
        w.put_u32(self.width);
        w.put_u32(self.height);
        w.put_f32(self.scale);
        w.put_f32(self.offset);
        w.into_bytes()
    }

    /// The DEMD payload: the sample grid as stored.
    pub fn samples(&self) -> &[u8] {
        &self.data
    }
}
