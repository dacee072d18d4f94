//! 2-D predicates shared by the cutter, the triangulator, and the editor.
//!
//! Points are `[longitude, latitude]` pairs; polygons are open vertex lists
//! (the closing edge back to the first vertex is implicit). All tests take
//! their tolerance from the caller so the engine has one set of named
//! constants (`EditConfig`) instead of scattered literals.

/// A 2-D point, `[x, y]`.
pub type Point = [f64; 2];

pub fn dist_sq(a: Point, b: Point) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

pub fn dist(a: Point, b: Point) -> f64 {
    dist_sq(a, b).sqrt()
}

/// z-component of the cross product of (b - a) and (c - a): positive when
/// c lies left of a->b in standard axes.
pub fn cross(a: Point, b: Point, c: Point) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// Even-odd containment test; boundary points are implementation-defined
/// (use [`strictly_inside`] or [`on_boundary`] when the edge case matters).
pub fn point_in_poly(poly: &[Point], p: Point) -> bool {
    let mut inside = false;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        let (pi, pj) = (poly[i], poly[j]);
        if (pi[1] > p[1]) != (pj[1] > p[1]) {
            let x = pi[0] + (p[1] - pi[1]) * (pj[0] - pi[0]) / (pj[1] - pi[1]);
            if p[0] < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Distance from `p` to the segment a-b.
pub fn point_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let len_sq = dist_sq(a, b);
    if len_sq == 0.0 {
        return dist(p, a);
    }
    let t = ((p[0] - a[0]) * (b[0] - a[0]) + (p[1] - a[1]) * (b[1] - a[1])) / len_sq;
    let t = t.clamp(0.0, 1.0);
    dist(p, [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])])
}

/// Whether `p` lies within `epsilon` of any polygon edge.
pub fn on_boundary(poly: &[Point], p: Point, epsilon: f64) -> bool {
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        if point_segment_distance(p, poly[j], poly[i]) <= epsilon {
            return true;
        }
        j = i;
    }
    false
}

/// Containment minus an epsilon boundary band: true only for points that
/// are inside and not within `epsilon` of an edge. The band makes the test
/// stable for probe points that sit almost exactly on a shared edge.
pub fn strictly_inside(poly: &[Point], p: Point, epsilon: f64) -> bool {
    point_in_poly(poly, p) && !on_boundary(poly, p, epsilon)
}

/// Barycentric coordinates of `p` in the triangle (a, b, c); weights sum
/// to one and are each in [0, 1] exactly when `p` is inside.
pub fn barycentric(a: Point, b: Point, c: Point, p: Point) -> [f64; 3] {
    let d = cross(a, b, c);
    if d == 0.0 {
        // Degenerate triangle; nothing sensible to interpolate.
        return [1.0, 0.0, 0.0];
    }
    let wa = cross(b, c, p) / d;
    let wb = cross(c, a, p) / d;
    [wa, wb, 1.0 - wa - wb]
}

/// Barycentric containment with a tolerance band on each weight.
pub fn point_in_tria(a: Point, b: Point, c: Point, p: Point, epsilon: f64) -> bool {
    barycentric(a, b, c, p).iter().all(|&w| w >= -epsilon)
}

/// Result of intersecting two closed segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentHit {
    /// No intersection (includes parallel non-collinear pairs).
    None,
    /// A single crossing point; `t` and `u` are the parameters along the
    /// first and second segment respectively, both in [0, 1].
    Point { at: Point, t: f64, u: f64 },
    /// The segments are collinear and overlap; there is no single crossing
    /// point and callers must treat the pair specially.
    Collinear,
}

/// Intersects segments a0-a1 and b0-b1. `epsilon` bounds both the
/// parallelism test and the parameter range slack at the endpoints.
pub fn segment_intersection(a0: Point, a1: Point, b0: Point, b1: Point, epsilon: f64) -> SegmentHit {
    let da = [a1[0] - a0[0], a1[1] - a0[1]];
    let db = [b1[0] - b0[0], b1[1] - b0[1]];
    let denom = da[0] * db[1] - da[1] * db[0];
    // Scale-aware parallelism cutoff.
    let scale = (da[0].abs() + da[1].abs()) * (db[0].abs() + db[1].abs());
    if denom.abs() <= epsilon * scale.max(1.0) {
        let off = cross(a0, a1, b0);
        if off.abs() <= epsilon * scale.max(1.0) {
            // Collinear; overlapping iff the projections onto the longer
            // axis intersect.
            let axis = usize::from(da[0].abs() < da[1].abs());
            let (alo, ahi) = minmax(a0[axis], a1[axis]);
            let (blo, bhi) = minmax(b0[axis], b1[axis]);
            if alo <= bhi + epsilon && blo <= ahi + epsilon {
                return SegmentHit::Collinear;
            }
        }
        return SegmentHit::None;
    }
    let t = ((b0[0] - a0[0]) * db[1] - (b0[1] - a0[1]) * db[0]) / denom;
    let u = ((b0[0] - a0[0]) * da[1] - (b0[1] - a0[1]) * da[0]) / denom;
    if !(-epsilon..=1.0 + epsilon).contains(&t) || !(-epsilon..=1.0 + epsilon).contains(&u) {
        return SegmentHit::None;
    }
    SegmentHit::Point {
        at: [a0[0] + t * da[0], a0[1] + t * da[1]],
        t: t.clamp(0.0, 1.0),
        u: u.clamp(0.0, 1.0),
    }
}

fn minmax(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Shoelace area: positive for counter-clockwise winding in standard axes.
pub fn signed_area(poly: &[Point]) -> f64 {
    let mut sum = 0.0;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        sum += poly[j][0] * poly[i][1] - poly[i][0] * poly[j][1];
        j = i;
    }
    sum / 2.0
}

/// Clockwise as seen from above with x = longitude, y = latitude.
pub fn is_clockwise(poly: &[Point]) -> bool {
    signed_area(poly) < 0.0
}

pub fn centroid(points: &[Point]) -> Point {
    let n = points.len() as f64;
    let mut c = [0.0, 0.0];
    for p in points {
        c[0] += p[0];
        c[1] += p[1];
    }
    [c[0] / n, c[1] / n]
}

/// Interior angle at `v` between the edges v->a and v->b, in degrees.
pub fn angle_at(v: Point, a: Point, b: Point) -> f64 {
    let va = [a[0] - v[0], a[1] - v[1]];
    let vb = [b[0] - v[0], b[1] - v[1]];
    let dot = va[0] * vb[0] + va[1] * vb[1];
    let det = va[0] * vb[1] - va[1] * vb[0];
    det.atan2(dot).abs().to_degrees()
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn of(points: impl IntoIterator<Item = Point>) -> Bounds {
        let mut b = Bounds {
            min: [f64::INFINITY, f64::INFINITY],
            max: [f64::NEG_INFINITY, f64::NEG_INFINITY],
        };
        for p in points {
            b.min[0] = b.min[0].min(p[0]);
            b.min[1] = b.min[1].min(p[1]);
            b.max[0] = b.max[0].max(p[0]);
            b.max[1] = b.max[1].max(p[1]);
        }
        b
    }

    pub fn expanded(self, margin: f64) -> Bounds {
        Bounds {
            min: [self.min[0] - margin, self.min[1] - margin],
            max: [self.max[0] + margin, self.max[1] + margin],
        }
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min[0] <= other.max[0]
            && other.min[0] <= self.max[0]
            && self.min[1] <= other.max[1]
            && other.min[1] <= self.max[1]
    }

    pub fn contains(&self, p: Point) -> bool {
        p[0] >= self.min[0] && p[0] <= self.max[0] && p[1] >= self.min[1] && p[1] <= self.max[1]
    }
}
