//! Degeneracy-aware ear clipping.
//!
//! The cutter hands this module the simple polygons it carves out of mesh
//! triangles; many of them have near-collinear vertices from snapping, so
//! plain "first ear wins" clipping produces sliver triangles that later
//! quantize to zero area. Candidate ears are therefore ranked in three
//! tiers:
//!
//! 1. ears whose clipped triangle keeps every remaining vertex clear of an
//!    epsilon interior margin and whose apex angle stays below the sliver
//!    cutoff, shortest chord first;
//! 2. ears that fail the margin or angle test but still contain no
//!    remaining vertex strictly inside;
//! 3. any convex vertex.
//!
//! The input may wind either way; triangles always come back clockwise,
//! as X-Plane requires for terrain, as index triples into the input.

use crate::geom::{self, Point};
use log::warn;

/// Apex angles above this demote an ear to the second tier.
const MAX_EAR_ANGLE_DEG: f64 = 175.0;

/// Triangulates a simple polygon into exactly `n - 2` clockwise triangles,
/// returned as indices into `points`. Polygons with fewer than three
/// vertices yield nothing.
pub fn triangulate(points: &[Point], epsilon: f64) -> Vec<[usize; 3]> {
    if points.len() < 3 {
        warn!("Cannot triangulate {} vertices.", points.len());
        return Vec::new();
    }
    // Work on a clockwise index ring so consecutive triples are already
    // wound the way the output needs them.
    let mut ring: Vec<usize> = (0..points.len()).collect();
    if !geom::is_clockwise(points) {
        ring.reverse();
    }

    let mut out = Vec::with_capacity(points.len() - 2);
    while ring.len() > 3 {
        let at = pick_ear(points, &ring, epsilon);
        let n = ring.len();
        let (a, b, c) = (ring[(at + n - 1) % n], ring[at], ring[(at + 1) % n]);
        out.push([a, b, c]);
        ring.remove(at);
    }
    out.push([ring[0], ring[1], ring[2]]);
    out
}

fn pick_ear(points: &[Point], ring: &[usize], epsilon: f64) -> usize {
    let n = ring.len();
    let mut best: Option<(u8, f64, usize)> = None; // (tier, chord, position)
    for at in 0..n {
        let (ia, ib, ic) = (ring[(at + n - 1) % n], ring[at], ring[(at + 1) % n]);
        let (a, b, c) = (points[ia], points[ib], points[ic]);
        // A clockwise ring turns right at every convex vertex.
        if geom::cross(a, b, c) >= 0.0 {
            continue;
        }
        let clear_with_margin = ring_clear_of(points, ring, at, a, b, c, epsilon);
        let clear = clear_with_margin || ring_clear_of(points, ring, at, a, b, c, -epsilon);
        let sliver = geom::angle_at(b, a, c) > MAX_EAR_ANGLE_DEG;
        let tier = if clear_with_margin && !sliver {
            0
        } else if clear {
            1
        } else {
            2
        };
        let chord = geom::dist_sq(a, c);
        let candidate = (tier, chord, at);
        if best.map_or(true, |(bt, bc, _)| (tier, chord) < (bt, bc)) {
            best = Some(candidate);
        }
    }
    match best {
        Some((_, _, at)) => at,
        None => {
            // No convex vertex at all: the remainder is degenerate (zero
            // area or repeated points). Clip anywhere to guarantee
            // progress; the sliver it produces quantizes away.
            warn!("No convex ear in a {}-gon; clipping a degenerate ear.", n);
            0
        }
    }
}

/// Whether every ring vertex other than the ear's three corners stays out
/// of the candidate triangle, widened (or shrunk, for negative values) by
/// `margin`.
fn ring_clear_of(
    points: &[Point],
    ring: &[usize],
    at: usize,
    a: Point,
    b: Point,
    c: Point,
    margin: f64,
) -> bool {
    let n = ring.len();
    let skip = [(at + n - 1) % n, at, (at + 1) % n];
    ring.iter().enumerate().all(|(pos, &idx)| {
        skip.contains(&pos) || !geom::point_in_tria(a, b, c, points[idx], margin)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPS: f64 = 1e-9;

    fn tri_area(points: &[Point], t: [usize; 3]) -> f64 {
        geom::signed_area(&[points[t[0]], points[t[1]], points[t[2]]])
    }

    fn total_area(points: &[Point], tris: &[[usize; 3]]) -> f64 {
        tris.iter().map(|&t| tri_area(points, t).abs()).sum()
    }

    #[test]
    fn square_becomes_two_clockwise_triangles() {
        let sq = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let tris = triangulate(&sq, EPS);
        assert_eq!(2, tris.len());
        for &t in &tris {
            assert!(tri_area(&sq, t) < 0.0, "triangle {:?} is not clockwise", t);
        }
        assert_relative_eq!(1.0, total_area(&sq, &tris));
    }

    #[test]
    fn clockwise_input_is_accepted_too() {
        let sq = vec![[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
        let tris = triangulate(&sq, EPS);
        assert_eq!(2, tris.len());
        for &t in &tris {
            assert!(tri_area(&sq, t) < 0.0);
        }
    }

    #[test]
    fn concave_polygon_conserves_area() {
        // An L shape of area 3.
        let l = vec![
            [0.0, 0.0],
            [2.0, 0.0],
            [2.0, 1.0],
            [1.0, 1.0],
            [1.0, 2.0],
            [0.0, 2.0],
        ];
        let tris = triangulate(&l, EPS);
        assert_eq!(4, tris.len());
        assert_relative_eq!(3.0, total_area(&l, &tris));
        // No triangle may stick out into the notch.
        for &t in &tris {
            let c = geom::centroid(&[l[t[0]], l[t[1]], l[t[2]]]);
            assert!(geom::point_in_poly(&l, c), "centroid {:?} escaped", c);
        }
    }

    #[test]
    fn pentagon_with_cut_corners() {
        // The outer piece of a corner-cut right triangle.
        let pent = vec![
            [0.0, 0.5],
            [0.5, 0.5],
            [0.5, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
        ];
        let tris = triangulate(&pent, EPS);
        assert_eq!(3, tris.len());
        assert_relative_eq!(0.25, total_area(&pent, &tris));
    }

    #[test]
    fn collinear_vertex_is_handled() {
        // (0.5, 0) sits on the bottom edge.
        let tri = vec![[0.0, 0.0], [0.5, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let tris = triangulate(&tri, EPS);
        assert_eq!(2, tris.len());
        assert_relative_eq!(0.5, total_area(&tri, &tris));
    }

    #[test]
    fn too_few_vertices_yield_nothing() {
        assert!(triangulate(&[[0.0, 0.0], [1.0, 0.0]], EPS).is_empty());
    }
}
