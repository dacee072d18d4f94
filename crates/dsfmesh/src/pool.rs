//! The quantized vertex-pool codec.
//!
//! Pool value encoding:
//!
//! - Each pool has one or more planes; every plane has the same number of
//!   points, and exactly one scaling (multiplier, offset) pair that maps the
//!   pool's integers into world units.
//! - Raw values are 16 bits wide (POOL) or 32 bits wide (PO32, used by road
//!   networks for their larger index space).
//! - Each plane carries a one-byte encoding selector: plain or delta-coded,
//!   each either directly stored or run-length packed.
//!
//! Run-length tokens are single bytes: values with the 0x80 bit set mean
//! "repeat the following scalar (token & 0x7f) times"; values below 0x80
//! mean "that many individual scalars follow". Delta-coded planes store
//! successive differences modulo the scalar range, relying on unsigned
//! wrap-around for negative steps. Delta-of-equal and evenly-spaced values
//! become runs of a single byte value, which is why the combination is the
//! common case in real files.
//!
//! Decoded points are stored interleaved (all planes of a point adjacent) so
//! a slice into the buffer can represent one vertex.

use crate::bytes::{DataReader, DataWriter, Scalar};
use crate::error::{DsfError, DsfResult};
use log::{trace, warn};

/// One (multiplier, offset) pair: the quantization box `[offset,
/// offset + multiplier]` for a plane. A zero multiplier disables scaling for
/// the plane and the raw integer value is used directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    pub multiplier: f64,
    pub offset: f64,
}

impl Scaling {
    pub fn new(multiplier: f64, offset: f64) -> Scaling {
        Scaling { multiplier, offset }
    }

    /// World-unit size of one quantization step for a 16-bit pool.
    pub fn step(&self) -> f64 {
        if self.multiplier != 0.0 {
            self.multiplier / u16::MAX as f64
        } else {
            1.0
        }
    }

    /// Whether `v` lies inside the box, tolerating `slack` beyond either end.
    pub fn contains(&self, v: f64, slack: f64) -> bool {
        if self.multiplier == 0.0 {
            return true;
        }
        v >= self.offset - slack && v <= self.offset + self.multiplier + slack
    }
}

/// The four per-plane encoding selectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaneEncoding {
    Raw = 0,
    Differenced = 1,
    RunLength = 2,
    RunLengthDifferenced = 3,
}

impl PlaneEncoding {
    fn from_u8(value: u8) -> DsfResult<PlaneEncoding> {
        match value {
            0 => Ok(PlaneEncoding::Raw),
            1 => Ok(PlaneEncoding::Differenced),
            2 => Ok(PlaneEncoding::RunLength),
            3 => Ok(PlaneEncoding::RunLengthDifferenced),
            _ => Err(DsfError::Format(format!(
                "unknown plane encoding selector {}",
                value
            ))),
        }
    }

    fn is_differenced(self) -> bool {
        matches!(
            self,
            PlaneEncoding::Differenced | PlaneEncoding::RunLengthDifferenced
        )
    }

    fn is_run_length(self) -> bool {
        matches!(
            self,
            PlaneEncoding::RunLength | PlaneEncoding::RunLengthDifferenced
        )
    }
}

/// The integer type backing a pool: u16 for POOL, u32 for PO32.
pub trait PoolScalar: Scalar + PartialEq + std::fmt::Debug {
    /// The scalar's maximum as f64; the quantization denominator (M-1).
    const MAX_F64: f64;
    fn zero() -> Self;
    fn wrapping_add(self, other: Self) -> Self;
    fn wrapping_sub(self, other: Self) -> Self;
    fn to_f64(self) -> f64;
    /// Rounds and clamps a raw value into range; the bool reports whether
    /// clamping was needed.
    fn from_f64_clamped(v: f64) -> (Self, bool);
}

impl PoolScalar for u16 {
    const MAX_F64: f64 = u16::MAX as f64;
    fn zero() -> u16 {
        0
    }
    fn wrapping_add(self, other: u16) -> u16 {
        u16::wrapping_add(self, other)
    }
    fn wrapping_sub(self, other: u16) -> u16 {
        u16::wrapping_sub(self, other)
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64_clamped(v: f64) -> (u16, bool) {
        let r = v.round();
        if r < 0.0 {
            (0, true)
        } else if r > Self::MAX_F64 {
            (u16::MAX, true)
        } else {
            (r as u16, false)
        }
    }
}

impl PoolScalar for u32 {
    const MAX_F64: f64 = u32::MAX as f64;
    fn zero() -> u32 {
        0
    }
    fn wrapping_add(self, other: u32) -> u32 {
        u32::wrapping_add(self, other)
    }
    fn wrapping_sub(self, other: u32) -> u32 {
        u32::wrapping_sub(self, other)
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64_clamped(v: f64) -> (u32, bool) {
        let r = v.round();
        if r < 0.0 {
            (0, true)
        } else if r > Self::MAX_F64 {
            (u32::MAX, true)
        } else {
            (r as u32, false)
        }
    }
}

/// One decoded vertex pool with its scaling table, mutable in memory so the
/// allocator can append re-quantized vertices.
#[derive(Debug, Clone, Default)]
pub struct Pool {
    planes: Vec<Scaling>,
    /// Interleaved plane data: all planes of point i are adjacent.
    data: Vec<f64>,
    /// True for PO32 pools (32-bit raw values).
    extended: bool,
}

impl Pool {
    pub fn new(planes: Vec<Scaling>, extended: bool) -> Pool {
        Pool {
            planes,
            data: Vec::new(),
            extended,
        }
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn num_points(&self) -> usize {
        if self.planes.is_empty() {
            0
        } else {
            self.data.len() / self.planes.len()
        }
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn scaling(&self, plane: usize) -> Scaling {
        self.planes[plane]
    }

    pub fn scalings(&self) -> &[Scaling] {
        &self.planes
    }

    pub fn point(&self, i: usize) -> &[f64] {
        let np = self.num_planes();
        &self.data[i * np..(i + 1) * np]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.num_planes().max(1))
    }

    /// Appends a vertex; the caller has already checked it fits the scaling.
    pub fn push(&mut self, coords: &[f64]) -> usize {
        assert_eq!(coords.len(), self.num_planes());
        self.data.extend_from_slice(coords);
        self.num_points() - 1
    }

    /// Overwrites the coordinates of point `i`.
    pub fn set_point(&mut self, i: usize, coords: &[f64]) {
        let np = self.num_planes();
        assert_eq!(coords.len(), np);
        self.data[i * np..(i + 1) * np].copy_from_slice(coords);
    }

    /// Whether point `i` equals `coords` within one quantization step on
    /// every plane.
    pub fn matches(&self, i: usize, coords: &[f64]) -> bool {
        if coords.len() != self.num_planes() {
            return false;
        }
        self.point(i)
            .iter()
            .zip(coords)
            .zip(&self.planes)
            .all(|((a, b), s)| (a - b).abs() <= s.step())
    }

    /// Decodes a POOL/PO32 payload against an already-decoded scaling table.
    pub fn decode<T: PoolScalar>(reader: &mut DataReader, planes: Vec<Scaling>) -> DsfResult<Pool> {
        let count = reader.read_u32()? as usize;
        let plane_count = reader.read_u8()? as usize;
        trace!("  pool with {} planes x {} points", plane_count, count);
        if plane_count != planes.len() {
            return Err(DsfError::Format(format!(
                "pool has {} planes but its scaling table has {}",
                plane_count,
                planes.len()
            )));
        }
        let mut pool = Pool {
            planes,
            data: vec![0.0; count * plane_count],
            extended: T::MAX_F64 > u16::MAX as f64,
        };
        for plane in 0..plane_count {
            let encoding = PlaneEncoding::from_u8(reader.read_u8()?)?;
            let raw: Vec<T> = decode_plane(reader, count, encoding)?;
            let Scaling { multiplier, offset } = pool.planes[plane];
            let mut prev = T::zero();
            for (i, v) in raw.into_iter().enumerate() {
                let v = if encoding.is_differenced() {
                    // Relies on unsigned wrap-around for negative deltas.
                    prev = prev.wrapping_add(v);
                    prev
                } else {
                    v
                };
                // A zero multiplier means "unscaled", per the format.
                let real = if multiplier != 0.0 {
                    v.to_f64() * multiplier / T::MAX_F64 + offset
                } else {
                    v.to_f64()
                };
                pool.data[i * plane_count + plane] = real;
            }
        }
        Ok(pool)
    }

    /// Encodes the pool back into a POOL/PO32 payload.
    ///
    /// Values outside the quantization box clamp to the range bound with a
    /// warning instead of failing the write; the loss is at most the
    /// out-of-range amount.
    pub fn encode<T: PoolScalar>(&self) -> Vec<u8> {
        let mut w = DataWriter::new();
        w.put_u32(self.num_points() as u32);
        w.put_u8(self.num_planes() as u8);
        for (plane, scaling) in self.planes.iter().enumerate() {
            let mut clamped = 0usize;
            let raw: Vec<T> = (0..self.num_points())
                .map(|i| {
                    let real = self.point(i)[plane];
                    let unscaled = if scaling.multiplier != 0.0 {
                        (real - scaling.offset) * T::MAX_F64 / scaling.multiplier
                    } else {
                        real
                    };
                    let (v, was_clamped) = T::from_f64_clamped(unscaled);
                    if was_clamped {
                        clamped += 1;
                    }
                    v
                })
                .collect();
            if clamped > 0 {
                warn!(
                    "Pool plane {}: {} of {} values fell outside {:?} and were clamped.",
                    plane,
                    clamped,
                    raw.len(),
                    scaling
                );
            }
            encode_plane(&mut w, &raw);
        }
        w.into_bytes()
    }

    /// Encodes the pool's scaling table as a SCAL/SC32 payload.
    pub fn encode_scalings(&self) -> Vec<u8> {
        let mut w = DataWriter::new();
        for s in &self.planes {
            w.put_f32(s.multiplier as f32);
            w.put_f32(s.offset as f32);
        }
        w.into_bytes()
    }
}

/// Decodes a SCAL/SC32 payload: two f32s per plane, applied in f64.
pub fn decode_scalings(data: &[u8]) -> DsfResult<Vec<Scaling>> {
    if data.len() % 8 != 0 {
        return Err(DsfError::Format(format!(
            "scaling atom length {} is not a multiple of 8",
            data.len()
        )));
    }
    let mut reader = DataReader::new(data);
    let mut planes = Vec::with_capacity(data.len() / 8);
    while !reader.done() {
        let multiplier = reader.read_f32()? as f64;
        let offset = reader.read_f32()? as f64;
        planes.push(Scaling { multiplier, offset });
    }
    Ok(planes)
}

/// Expands one plane's worth of scalars, honoring the run-length layer.
fn decode_plane<T: PoolScalar>(
    reader: &mut DataReader,
    count: usize,
    encoding: PlaneEncoding,
) -> DsfResult<Vec<T>> {
    let mut out = Vec::with_capacity(count);
    if !encoding.is_run_length() {
        for _ in 0..count {
            out.push(reader.read::<T>()?);
        }
        return Ok(out);
    }
    while out.len() < count {
        let token = reader.read_u8()?;
        let n = (token & 0x7f) as usize;
        if token & 0x80 != 0 {
            let v = reader.read::<T>()?;
            for _ in 0..n {
                out.push(v);
            }
        } else {
            for _ in 0..n {
                out.push(reader.read::<T>()?);
            }
        }
    }
    if out.len() > count {
        warn!(
            "Run-length plane overshot its point count ({} > {}); truncating.",
            out.len(),
            count
        );
        out.truncate(count);
    }
    Ok(out)
}

/// Writes one plane: picks the smaller of plain and delta+run-length form.
fn encode_plane<T: PoolScalar>(w: &mut DataWriter, raw: &[T]) {
    let mut deltas = Vec::with_capacity(raw.len());
    let mut prev = T::zero();
    for &v in raw {
        deltas.push(v.wrapping_sub(prev));
        prev = v;
    }
    let rle = run_length_encode(&deltas);
    let plain_len = raw.len() * std::mem::size_of::<T>();
    if rle.len() < plain_len {
        w.put_u8(PlaneEncoding::RunLengthDifferenced as u8);
        w.put_bytes(&rle);
    } else {
        w.put_u8(PlaneEncoding::Raw as u8);
        for &v in raw {
            w.put(v);
        }
    }
}

/// Greedy run-length packing: a repeat token for every run of two or more
/// equal values, literal tokens otherwise, both capped at 127 per token.
fn run_length_encode<T: PoolScalar>(values: &[T]) -> Vec<u8> {
    let mut w = DataWriter::new();
    let run_len = |at: usize| -> usize {
        let mut n = 1;
        while at + n < values.len() && n < 127 && values[at + n] == values[at] {
            n += 1;
        }
        n
    };
    let mut i = 0;
    while i < values.len() {
        let run = run_len(i);
        if run >= 2 {
            w.put_u8(0x80 | run as u8);
            w.put(values[i]);
            i += run;
        } else {
            let start = i;
            while i < values.len() && i - start < 127 && run_len(i) < 2 {
                i += 1;
            }
            w.put_u8((i - start) as u8);
            for &v in &values[start..i] {
                w.put(v);
            }
        }
    }
    w.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode16(payload: &[u8], planes: Vec<Scaling>) -> Pool {
        let mut reader = DataReader::new(payload);
        Pool::decode::<u16>(&mut reader, planes).unwrap()
    }

    #[test]
    fn raw_u16_plane() {
        #[rustfmt::skip]
        let data: Vec<u8> = vec![
            4, 0, 0, 0,  // point count: u32
            1,           // plane count: u8
            0,           // plane 0 encoding: Raw
            1, 0, 2, 0, 3, 0, 4, 0,
        ];
        let pool = decode16(&data, vec![Scaling::new(0.0, 0.0)]);
        assert_eq!(4, pool.num_points());
        assert_eq!(
            vec![&[1.0][..], &[2.0], &[3.0], &[4.0]],
            pool.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn truncated_pool_payload_is_a_format_error() {
        // Header claims 100 points, but only one u16 of plane data follows.
        #[rustfmt::skip]
        let data: Vec<u8> = vec![
            100, 0, 0, 0,  // point count: u32
            1,             // plane count: u8
            0,             // plane 0 encoding: Raw
            1, 0,
        ];
        let mut reader = DataReader::new(&data);
        let got = Pool::decode::<u16>(&mut reader, vec![Scaling::new(0.0, 0.0)]);
        assert!(matches!(got, Err(DsfError::Format(_))));
    }

    #[test]
    fn raw_u32_plane() {
        #[rustfmt::skip]
        let data: Vec<u8> = vec![
            4, 0, 0, 0,
            1,
            0,
            0, 0, 0, 0, 1, 0, 0, 0, 1, 2, 3, 4, 255, 255, 255, 255,
        ];
        let mut reader = DataReader::new(&data);
        let pool = Pool::decode::<u32>(&mut reader, vec![Scaling::new(0.0, 0.0)]).unwrap();
        assert!(pool.is_extended());
        assert_eq!(
            vec![&[0.0][..], &[1.0], &[67305985.0], &[u32::MAX as f64]],
            pool.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn scaling_applied_per_plane() {
        #[rustfmt::skip]
        let data: Vec<u8> = vec![
            2, 0, 0, 0,
            3,
            0,  // plane 0: Raw, unscaled
            1, 0, 2, 0,
            0,  // plane 1: Raw, scaled
            3, 0, 4, 0,
            0,  // plane 2: Raw, unscaled
            5, 0, 6, 0,
        ];
        const MULT: f64 = 6.0;
        const OFFSET: f64 = 100.0;
        let pool = decode16(
            &data,
            vec![
                Scaling::new(0.0, 0.0),
                Scaling::new(MULT, OFFSET),
                Scaling::new(0.0, 0.0),
            ],
        );
        let recip = 1.0 / u16::MAX as f64;
        assert_eq!(
            vec![
                &[1.0, OFFSET + MULT * 3.0 * recip, 5.0][..],
                &[2.0, OFFSET + MULT * 4.0 * recip, 6.0],
            ],
            pool.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn all_four_encodings() {
        #[rustfmt::skip]
        let data: Vec<u8> = vec![
            4, 0, 0, 0,
            3,
            1,  // plane 0: Differenced
            1, 0, 0, 0, 10, 0, 100, 0,
            2,  // plane 1: RunLength (4 x 42)
            4 | 0x80, 42, 0,
            3,  // plane 2: RunLengthDifferenced (4 x +2)
            4 | 0x80, 2, 0,
        ];
        let pool = decode16(
            &data,
            vec![
                Scaling::new(0.0, 0.0),
                Scaling::new(0.0, 0.0),
                Scaling::new(0.0, 0.0),
            ],
        );
        assert_eq!(
            vec![
                &[1.0, 42.0, 2.0][..],
                &[1.0, 42.0, 4.0],
                &[11.0, 42.0, 6.0],
                &[111.0, 42.0, 8.0],
            ],
            pool.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn run_length_tokens() {
        // Three mixed values, then five of the same, then one more.
        let values: Vec<u16> = vec![1, 2, 3, 42, 42, 42, 42, 42, 7];
        let bytes = run_length_encode(&values);
        assert_eq!(
            vec![3, 1, 0, 2, 0, 3, 0, 5 | 0x80, 42, 0, 1, 7, 0],
            bytes
        );
        let mut reader = DataReader::new(&bytes);
        let decoded: Vec<u16> =
            decode_plane(&mut reader, values.len(), PlaneEncoding::RunLength).unwrap();
        assert_eq!(values, decoded);
    }

    #[test]
    fn run_length_caps_at_127() {
        let values: Vec<u16> = vec![9; 300];
        let bytes = run_length_encode(&values);
        assert_eq!(0x80 | 127, bytes[0]);
        let mut reader = DataReader::new(&bytes);
        let decoded: Vec<u16> = decode_plane(&mut reader, 300, PlaneEncoding::RunLength).unwrap();
        assert_eq!(values, decoded);
    }

    #[test]
    fn encode_decode_round_trip_within_one_step() {
        // Longitude-like plane in a 1-degree box, elevation plane, and an
        // unscaled plane.
        let planes = vec![
            Scaling::new(1.0, -123.0),
            Scaling::new(65535.0, -32768.0),
            Scaling::new(0.0, 0.0),
        ];
        let mut pool = Pool::new(planes.clone(), false);
        let points = [
            [-123.0, 12.5, 3.0],
            [-122.731, 100.0, 4.0],
            [-122.2507, 1044.25, 5.0],
            [-122.0001, -20.75, 6.0],
        ];
        for p in &points {
            pool.push(p);
        }
        let payload = pool.encode::<u16>();
        let mut reader = DataReader::new(&payload);
        let decoded = Pool::decode::<u16>(&mut reader, planes.clone()).unwrap();
        assert!(reader.done());
        assert_eq!(pool.num_points(), decoded.num_points());
        for (a, b) in pool.iter().zip(decoded.iter()) {
            for ((x, y), s) in a.iter().zip(b).zip(&planes) {
                assert!(
                    (x - y).abs() <= s.step(),
                    "{} vs {} exceeds step {}",
                    x,
                    y,
                    s.step()
                );
            }
        }
    }

    #[test]
    fn out_of_range_values_clamp() {
        let planes = vec![Scaling::new(1.0, 0.0)];
        let mut pool = Pool::new(planes.clone(), false);
        pool.push(&[2.5]); // outside [0, 1]
        pool.push(&[-1.0]);
        let payload = pool.encode::<u16>();
        let mut reader = DataReader::new(&payload);
        let decoded = Pool::decode::<u16>(&mut reader, planes).unwrap();
        assert_eq!(1.0, decoded.point(0)[0]);
        assert_eq!(0.0, decoded.point(1)[0]);
    }

    #[test]
    fn scaling_table_round_trip() {
        let planes = vec![Scaling::new(1.0, -123.0), Scaling::new(65535.0, -32768.0)];
        let pool = Pool::new(planes.clone(), false);
        let decoded = decode_scalings(&pool.encode_scalings()).unwrap();
        assert_eq!(planes, decoded);
    }

    #[test]
    fn matches_tolerates_one_step() {
        let planes = vec![Scaling::new(1.0, 0.0)];
        let mut pool = Pool::new(planes, false);
        pool.push(&[0.5]);
        let step = pool.scaling(0).step();
        assert!(pool.matches(0, &[0.5 + step * 0.9]));
        assert!(!pool.matches(0, &[0.5 + step * 3.0]));
    }
}
