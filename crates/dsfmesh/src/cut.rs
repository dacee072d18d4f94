//! Cutting a closed polygon out of a mesh triangle.
//!
//! The cutting polygon is walked as a closed chain around the subject
//! polygon (initially a mesh triangle). Each place where the chain
//! genuinely crosses the subject boundary - decided by probing a chain
//! point just before and just after the candidate intersection - opens or
//! closes a border chain; every entry/exit pair splits the subject in two
//! along that chain, and the walk recurses into both halves until no
//! crossing remains. Finished pieces are classified inner or outer by
//! testing a strictly interior sample point against the closed cutting
//! polygon.
//!
//! Grazing touches (the chain brushes the boundary without changing sides)
//! and collinear edge pairs produce no cut. Cut points landing within
//! `EditConfig::accuracy` of a subject vertex snap onto it so the split
//! reuses the existing vertex instead of minting a sliver next to it; if
//! both ends of a split snap to the same vertex the split is dropped
//! entirely.
//!
//! A cutting polygon wholly inside one triangle never crosses an edge, so
//! it is bridged into the triangle as a keyhole hole instead.

use crate::earclip;
use crate::geom::{self, Point, SegmentHit};
use crate::EditConfig;
use log::{debug, warn};

/// Chain offset for the before/after probes. Larger than the boundary band
/// of the strictly-inside test, far smaller than any mesh edge.
const PROBE_DELTA: f64 = 1e-7;

const MAX_SPLIT_DEPTH: usize = 64;

/// All pieces produced by one cut, plus every vertex the cut introduced on
/// the subject boundary or inside it (deduplicated).
#[derive(Debug, Clone, Default)]
pub struct CutOutput {
    pub outer: Vec<Vec<Point>>,
    pub inner: Vec<Vec<Point>>,
    pub border: Vec<Point>,
}

/// Position along the cutting chain: a segment index plus a distance along
/// that segment. Splits resume the walk just past their exit point so the
/// same crossing is never consumed twice.
#[derive(Debug, Clone, Copy)]
struct CutCursor {
    segment: usize,
    distance: f64,
}

/// Cuts `cut` out of the triangle. Returns `None` when the chain never
/// crosses the triangle boundary and does not lie inside it; the caller
/// then treats the triangle as a whole (fully outside or fully inside the
/// cutting polygon).
pub fn cut_triangle(tri: &[Point; 3], cut: &[Point], cfg: &EditConfig) -> Option<CutOutput> {
    if cut.len() < 3 {
        warn!("Cutting polygon has only {} vertices; ignored.", cut.len());
        return None;
    }
    let subject: Vec<Point> = tri.to_vec();
    if cut
        .iter()
        .all(|&p| geom::strictly_inside(&subject, p, cfg.epsilon))
    {
        return keyhole(&subject, cut, cfg);
    }

    // Start the walk at a chain vertex that is not strictly inside the
    // subject, so the first crossing found is an entry.
    let start = cut
        .iter()
        .position(|&p| !geom::strictly_inside(&subject, p, cfg.epsilon))
        .unwrap_or(0);
    let chain: Vec<Point> = cut[start..].iter().chain(&cut[..start]).copied().collect();

    let mut cutter = Cutter::new(&chain, cut, cfg);
    cutter.run(
        subject,
        CutCursor {
            segment: 0,
            distance: 0.0,
        },
        0,
    );
    if !cutter.split_any {
        return None;
    }
    Some(CutOutput {
        outer: cutter.outer,
        inner: cutter.inner,
        border: dedup_points(cutter.border, cfg.min_point_distance),
    })
}

struct Cutter<'a> {
    /// The cutting chain, rotated so index 0 starts outside the subject.
    chain: &'a [Point],
    /// The original closed cutting polygon, for inner/outer classification.
    cut: &'a [Point],
    cfg: &'a EditConfig,
    /// Arc-length prefix over the chain's closed edge loop.
    prefix: Vec<f64>,
    split_any: bool,
    outer: Vec<Vec<Point>>,
    inner: Vec<Vec<Point>>,
    border: Vec<Point>,
}

/// One accepted entry/exit pair and the pieces it produces.
struct Split {
    forward: Vec<Point>,
    backward: Vec<Point>,
    resume: CutCursor,
}

impl<'a> Cutter<'a> {
    fn new(chain: &'a [Point], cut: &'a [Point], cfg: &'a EditConfig) -> Cutter<'a> {
        let n = chain.len();
        let mut prefix = Vec::with_capacity(n + 1);
        prefix.push(0.0);
        for i in 0..n {
            let len = geom::dist(chain[i], chain[(i + 1) % n]);
            prefix.push(prefix[i] + len);
        }
        Cutter {
            chain,
            cut,
            cfg,
            prefix,
            split_any: false,
            outer: Vec::new(),
            inner: Vec::new(),
            border: Vec::new(),
        }
    }

    fn run(&mut self, subject: Vec<Point>, cursor: CutCursor, depth: usize) {
        if depth > MAX_SPLIT_DEPTH {
            warn!("Cut recursion exceeded {} splits; keeping the piece whole.", MAX_SPLIT_DEPTH);
            self.finish(subject);
            return;
        }
        match self.find_split(&subject, cursor) {
            Some(split) => {
                self.split_any = true;
                self.run(split.forward, split.resume, depth + 1);
                self.run(split.backward, split.resume, depth + 1);
            }
            None => self.finish(subject),
        }
    }

    /// The chain point at arc length `s`, clamped to the walk's extent.
    fn at_arc(&self, s: f64) -> Point {
        let total = *self.prefix.last().unwrap_or(&0.0);
        let s = s.clamp(0.0, total);
        let n = self.chain.len();
        for seg in 0..n {
            if s <= self.prefix[seg + 1] || seg == n - 1 {
                let len = self.prefix[seg + 1] - self.prefix[seg];
                let t = if len > 0.0 {
                    (s - self.prefix[seg]) / len
                } else {
                    0.0
                };
                let (a, b) = (self.chain[seg], self.chain[(seg + 1) % n]);
                return [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])];
            }
        }
        self.chain[0]
    }

    /// Walks the chain from `cursor` looking for the next entry/exit pair
    /// against `subject`.
    fn find_split(&mut self, subject: &[Point], cursor: CutCursor) -> Option<Split> {
        let n = self.chain.len();
        let eps = self.cfg.epsilon;
        // (entry point, subject edge, edge parameter) once inside.
        let mut entry: Option<(Point, usize, f64)> = None;
        let mut bchain: Vec<Point> = Vec::new();

        for seg in cursor.segment..n {
            let (v, w) = (self.chain[seg], self.chain[(seg + 1) % n]);
            let seg_len = self.prefix[seg + 1] - self.prefix[seg];

            let mut hits: Vec<(f64, Point, usize, f64)> = Vec::new();
            let m = subject.len();
            for j in 0..m {
                match geom::segment_intersection(v, w, subject[j], subject[(j + 1) % m], eps) {
                    SegmentHit::Point { at, t, u } => hits.push((t * seg_len, at, j, u)),
                    SegmentHit::Collinear => {
                        debug!(
                            "Chain segment {} is collinear with subject edge {}; not a cut.",
                            seg, j
                        );
                    }
                    SegmentHit::None => {}
                }
            }
            hits.sort_by(|a, b| a.0.total_cmp(&b.0));

            for (dist, at, j, u) in hits {
                if seg == cursor.segment && dist <= cursor.distance {
                    continue;
                }
                let s_hit = self.prefix[seg] + dist;
                let before_in =
                    geom::strictly_inside(subject, self.at_arc(s_hit - PROBE_DELTA), eps);
                let after_in =
                    geom::strictly_inside(subject, self.at_arc(s_hit + PROBE_DELTA), eps);
                match entry {
                    None => {
                        if !before_in && after_in {
                            entry = Some((at, j, u));
                            bchain.clear();
                            bchain.push(at);
                        }
                    }
                    Some((e_at, je, ue)) => {
                        if before_in && !after_in {
                            bchain.push(at);
                            let resume = CutCursor {
                                segment: seg,
                                distance: dist + self.cfg.min_point_distance,
                            };
                            match self.make_split(
                                subject,
                                &bchain,
                                (e_at, je, ue),
                                (at, j, u),
                                resume,
                            ) {
                                Some(split) => return Some(split),
                                None => {
                                    // Degenerate split (both ends snapped to
                                    // one vertex); keep scanning as if the
                                    // chain never dipped inside.
                                    entry = None;
                                    bchain.clear();
                                }
                            }
                        }
                    }
                }
            }
            if entry.is_some() {
                // The chain edge ended while inside: its endpoint becomes
                // part of the border chain.
                bchain.push(w);
            }
        }
        if entry.is_some() {
            warn!("Cut chain entered the subject but never exited; split dropped.");
        }
        None
    }

    /// Builds the two pieces for one entry/exit pair, snapping the cut
    /// points onto nearby subject vertices first.
    fn make_split(
        &mut self,
        subject: &[Point],
        bchain: &[Point],
        entry: (Point, usize, f64),
        exit: (Point, usize, f64),
        resume: CutCursor,
    ) -> Option<Split> {
        let n = subject.len();
        let (e_at, je, ue) = entry;
        let (x_at, jx, ux) = exit;

        let (e_at, e_snap) = snap_to_edge_vertex(e_at, subject, je, self.cfg.accuracy);
        let (x_at, x_snap) = snap_to_edge_vertex(x_at, subject, jx, self.cfg.accuracy);
        if let (Some(a), Some(b)) = (e_snap, x_snap) {
            if a == b {
                debug!("Entry and exit both snapped to subject vertex {}; cut dropped.", a);
                return None;
            }
        }
        if geom::dist(e_at, x_at) <= self.cfg.min_point_distance {
            debug!("Entry and exit coincide; cut dropped.");
            return None;
        }

        let mut chain = bchain.to_vec();
        chain[0] = e_at;
        let last = chain.len() - 1;
        chain[last] = x_at;

        let (forward, backward) = if je != jx {
            let forward: Vec<Point> = chain
                .iter()
                .copied()
                .chain(wrap_range(subject, (jx + 1) % n, je))
                .collect();
            let backward: Vec<Point> = chain
                .iter()
                .rev()
                .copied()
                .chain(wrap_range(subject, (je + 1) % n, jx))
                .collect();
            (forward, backward)
        } else {
            // Both cut points on one edge: the chain closes into the small
            // piece by itself, and the big piece takes every subject vertex.
            let small = chain.clone();
            let big: Vec<Point> = if ue <= ux {
                chain
                    .iter()
                    .copied()
                    .chain(wrap_range(subject, (je + 1) % n, je))
                    .collect()
            } else {
                chain
                    .iter()
                    .rev()
                    .copied()
                    .chain(wrap_range(subject, (je + 1) % n, je))
                    .collect()
            };
            (big, small)
        };

        let forward = dedup_ring(forward, self.cfg.min_point_distance);
        let backward = dedup_ring(backward, self.cfg.min_point_distance);
        if forward.len() < 3 || backward.len() < 3 {
            debug!("A split piece degenerated to fewer than 3 vertices; cut dropped.");
            return None;
        }

        self.border.extend(chain);
        Some(Split {
            forward,
            backward,
            resume,
        })
    }

    /// Classifies a finished piece and stores it.
    fn finish(&mut self, piece: Vec<Point>) {
        let tris = earclip::triangulate(&piece, self.cfg.epsilon);
        let Some(first) = tris.first() else {
            debug!("Dropping a degenerate cut piece of {} vertices.", piece.len());
            return;
        };
        let sample = geom::centroid(&[piece[first[0]], piece[first[1]], piece[first[2]]]);
        if geom::point_in_poly(self.cut, sample) {
            self.inner.push(piece);
        } else {
            self.outer.push(piece);
        }
    }
}

/// Snaps a cut point to the nearer endpoint of its subject edge when it is
/// within `accuracy` of it and strictly nearer than to the other endpoint.
/// Returns the (possibly moved) point and the snapped vertex index.
fn snap_to_edge_vertex(
    p: Point,
    subject: &[Point],
    edge: usize,
    accuracy: f64,
) -> (Point, Option<usize>) {
    let n = subject.len();
    let (ia, ib) = (edge, (edge + 1) % n);
    let da = geom::dist(p, subject[ia]);
    let db = geom::dist(p, subject[ib]);
    if da < accuracy && da < db {
        (subject[ia], Some(ia))
    } else if db < accuracy && db < da {
        (subject[ib], Some(ib))
    } else {
        (p, None)
    }
}

/// Subject vertices from `from` to `to`, both inclusive, wrapping.
fn wrap_range(subject: &[Point], from: usize, to: usize) -> Vec<Point> {
    let n = subject.len();
    let count = (to + n - from) % n + 1;
    (0..count).map(|k| subject[(from + k) % n]).collect()
}

/// Removes consecutive near-duplicate ring vertices, including across the
/// closing edge.
fn dedup_ring(mut ring: Vec<Point>, tol: f64) -> Vec<Point> {
    ring.dedup_by(|a, b| geom::dist(*a, *b) <= tol);
    while ring.len() > 1 && geom::dist(ring[0], ring[ring.len() - 1]) <= tol {
        ring.pop();
    }
    ring
}

fn dedup_points(points: Vec<Point>, tol: f64) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        if !out.iter().any(|&q| geom::dist(p, q) <= tol) {
            out.push(p);
        }
    }
    out
}

/// The chain lies wholly inside the subject: bridge it in as a hole. The
/// outer piece is the subject with the hole spliced in through the first
/// chord that crosses neither boundary; the inner piece is the cutting
/// polygon itself.
fn keyhole(subject: &[Point], cut: &[Point], cfg: &EditConfig) -> Option<CutOutput> {
    let chord = find_chord(subject, cut, cfg)?;
    let (k, m) = chord;

    // The hole must wind opposite to the subject for ear clipping.
    let reverse_hole = geom::is_clockwise(subject) == geom::is_clockwise(cut);
    let nc = cut.len();
    let hole_cycle: Vec<Point> = (0..=nc)
        .map(|step| {
            let idx = if reverse_hole {
                (m + nc - step % nc) % nc
            } else {
                (m + step) % nc
            };
            cut[idx]
        })
        .collect();

    let mut ring: Vec<Point> = subject[..=k].to_vec();
    ring.extend(hole_cycle);
    ring.push(subject[k]);
    ring.extend(subject[k + 1..].iter().copied());

    Some(CutOutput {
        outer: vec![ring],
        inner: vec![cut.to_vec()],
        border: dedup_points(cut.to_vec(), cfg.min_point_distance),
    })
}

/// First (subject vertex, cut vertex) pair whose connecting segment stays
/// inside the subject, outside the cutting polygon, and crosses no edge of
/// either.
fn find_chord(subject: &[Point], cut: &[Point], cfg: &EditConfig) -> Option<(usize, usize)> {
    let eps = cfg.epsilon;
    for k in 0..subject.len() {
        'cut: for m in 0..cut.len() {
            let (a, b) = (subject[k], cut[m]);
            let mid = [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0];
            if !geom::strictly_inside(subject, mid, eps) || geom::point_in_poly(cut, mid) {
                continue;
            }
            for ring in [subject, cut] {
                let n = ring.len();
                for j in 0..n {
                    match geom::segment_intersection(a, b, ring[j], ring[(j + 1) % n], eps) {
                        SegmentHit::Point { t, u, .. } => {
                            // Touching either chord endpoint is fine; a
                            // crossing in the middle is not.
                            let interior_t = t > 1e-6 && t < 1.0 - 1e-6;
                            let endpoint_u = u < 1e-6 || u > 1.0 - 1e-6;
                            if interior_t || (!endpoint_u && t > 1e-6) {
                                continue 'cut;
                            }
                        }
                        SegmentHit::Collinear => continue 'cut,
                        SegmentHit::None => {}
                    }
                }
            }
            return Some((k, m));
        }
    }
    warn!("No keyhole chord found for an interior cutting polygon.");
    None
}
