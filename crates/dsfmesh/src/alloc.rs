//! Re-pooling edited vertices.
//!
//! After an edit, area vertices fall into two groups: untouched ones whose
//! back-reference still matches the pool contents, and new or moved ones
//! with no valid slot. The allocator keeps the former and packs the latter
//! into pools created during this pass, appending to an existing new pool
//! whenever the vertex fits its scaling, deduplicating equal vertices, and
//! creating further pools as needed. Original pools are never appended to:
//! their slots may be shared with triangles outside the extracted area.
//!
//! Two vertices at the same (x, y) but different elevations would z-fight
//! along a shared patch boundary, so they merge to the higher elevation on
//! both sides.
//!
//! Pool creation inherits plane count and scalings from the pool of a
//! sibling vertex, rebases the elevation plane when the edit asks for
//! sub-meter precision a tile-wide scaling cannot hold, and grows the
//! scaling box one multiplier step at a time until the vertex fits. The
//! 16-bit pool index bounds the whole scheme: needing a 65,536th pool
//! aborts the update.

use crate::cmds::VertexRef;
use crate::error::{DsfError, DsfResult};
use crate::mesh::{AreaVertex, MeshArea, ELEVATION_PLANE};
use crate::pool::{Pool, Scaling};
use crate::{EditConfig, RASTER_ELEVATION_SENTINEL};
use log::{debug, warn};

/// Default elevation scaling for raster-driven tiles; encodes the raster
/// sentinel exactly at raw zero.
const RASTER_ELEVATION_SCALING: Scaling = Scaling {
    multiplier: 65_535.0,
    offset: -32_768.0,
};

/// Elevation scaling used when an edit needs fractional elevations that the
/// inherited tile-wide scaling cannot represent: centimeter steps over a
/// 655 m band around the rebased offset.
const REBASED_ELEVATION_MULTIPLIER: f64 = 655.35;

/// Gives every area vertex a valid pool slot, mutating `pools` in place.
pub fn allocate(area: &mut MeshArea, pools: &mut Vec<Pool>, cfg: &EditConfig) -> DsfResult<()> {
    let first_new = pools.len();
    let mut appended = 0usize;
    let mut reused = 0usize;

    // Template for invented pools: the source pool of a sibling vertex in
    // the same triangle, resolved per triangle before any source is
    // cleared by allocation.
    let templates: Vec<Option<u16>> = area
        .triangles
        .iter()
        .map(|t| t.vertices.iter().find_map(|v| v.source.map(|r| r.pool)))
        .collect();
    let area_template = templates.iter().flatten().next().copied();
    let elevation_scaling = area.elevation_scaling;

    for (tri_idx, tri) in area.triangles.iter_mut().enumerate() {
        let template = templates[tri_idx].or(area_template);
        for v in &mut tri.vertices {
            if let Some(r) = v.source {
                let valid = pools
                    .get(r.pool as usize)
                    .map_or(false, |p| {
                        (r.index as usize) < p.num_points() && p.matches(r.index as usize, &v.coords)
                    });
                if valid {
                    continue;
                }
                debug!(
                    "Back-reference {}:{} no longer matches its vertex; reallocating.",
                    r.pool, r.index
                );
                v.source = None;
            }
            match place(v, pools, first_new, template, elevation_scaling, cfg)? {
                Placement::Reused => reused += 1,
                Placement::Appended => appended += 1,
            }
        }
    }
    if appended + reused > 0 {
        debug!(
            "Allocated {} vertices ({} shared), {} new pools.",
            appended + reused,
            reused,
            pools.len() - first_new
        );
    }
    Ok(())
}

enum Placement {
    Reused,
    Appended,
}

fn place(
    v: &mut AreaVertex,
    pools: &mut Vec<Pool>,
    first_new: usize,
    template: Option<u16>,
    elevation_scaling: Option<Scaling>,
    cfg: &EditConfig,
) -> DsfResult<Placement> {
    // Try every pool created this pass.
    for pool_idx in first_new..pools.len() {
        let pool = &mut pools[pool_idx];
        if pool.num_planes() != v.coords.len() || !fits(pool, &v.coords, cfg.scaling_slack) {
            continue;
        }
        if let Some(index) = find_equal(pool, v, cfg) {
            v.source = Some(VertexRef::new(pool_idx as u16, index as u16));
            return Ok(Placement::Reused);
        }
        if pool.num_points() < cfg.max_pool_size {
            let coords = snapped_coords(pool, &v.coords);
            let index = pool.push(&coords);
            v.coords = coords;
            v.source = Some(VertexRef::new(pool_idx as u16, index as u16));
            return Ok(Placement::Appended);
        }
    }

    // No room anywhere: invent a pool.
    if pools.len() >= cfg.max_pools {
        return Err(DsfError::PoolExhausted {
            pools: pools.len() + 1,
            limit: cfg.max_pools,
        });
    }
    let mut pool = new_pool_for(v, pools, template, elevation_scaling);
    let pool_idx = pools.len();
    let index = pool.push(&v.coords);
    pools.push(pool);
    v.source = Some(VertexRef::new(pool_idx as u16, index as u16));
    Ok(Placement::Appended)
}

fn fits(pool: &Pool, coords: &[f64], slack: f64) -> bool {
    coords
        .iter()
        .zip(pool.scalings())
        .all(|(&c, s)| s.contains(c, slack))
}

/// Values just past a scaling bound (within the slack `fits` allowed) move
/// onto the bound so they quantize inside the box.
fn snapped_coords(pool: &Pool, coords: &[f64]) -> Vec<f64> {
    coords
        .iter()
        .zip(pool.scalings())
        .map(|(&c, s)| {
            if s.multiplier == 0.0 {
                c
            } else {
                c.clamp(s.offset, s.offset + s.multiplier)
            }
        })
        .collect()
}

/// Finds a pool vertex equal to `v` within one quantization step. A vertex
/// at the same (x, y) with a different elevation merges with it, keeping
/// the higher of the two elevations on both sides.
fn find_equal(pool: &mut Pool, v: &mut AreaVertex, cfg: &EditConfig) -> Option<usize> {
    for i in 0..pool.num_points() {
        let p = pool.point(i);
        let same_xy = (p[0] - v.coords[0]).abs() <= cfg.min_point_distance
            && (p[1] - v.coords[1]).abs() <= cfg.min_point_distance;
        if !same_xy {
            continue;
        }
        if pool.matches(i, &v.coords) {
            return Some(i);
        }
        if v.coords.len() > ELEVATION_PLANE && pool.num_planes() > ELEVATION_PLANE {
            let pooled = p[ELEVATION_PLANE];
            let wanted = v.coords[ELEVATION_PLANE];
            let rest_match = p
                .iter()
                .zip(&v.coords)
                .enumerate()
                .all(|(k, (a, b))| k == ELEVATION_PLANE || (a - b).abs() <= cfg.min_point_distance);
            if rest_match {
                let higher = pooled.max(wanted);
                debug!(
                    "Merging duplicate vertex at ({}, {}): elevations {} / {} -> {}.",
                    v.coords[0], v.coords[1], pooled, wanted, higher
                );
                let mut coords = p.to_vec();
                coords[ELEVATION_PLANE] = higher;
                pool.set_point(i, &coords);
                v.coords[ELEVATION_PLANE] = higher;
                return Some(i);
            }
        }
    }
    None
}

/// Builds a pool whose scalings can hold `v`, starting from the template
/// pool's scalings when one exists. Without a usable template the most
/// recently defined pool with a matching plane count lends its scaling
/// table, so invented pools stay consistent with the rest of the file.
fn new_pool_for(
    v: &AreaVertex,
    pools: &[Pool],
    template: Option<u16>,
    elevation_scaling: Option<Scaling>,
) -> Pool {
    let mut planes: Vec<Scaling> = template
        .and_then(|t| pools.get(t as usize))
        .filter(|p| p.num_planes() == v.coords.len())
        .or_else(|| pools.iter().rev().find(|p| p.num_planes() == v.coords.len()))
        .map(|p| p.scalings().to_vec())
        .unwrap_or_else(|| synthesized_scalings(v, elevation_scaling));

    for (plane, s) in planes.iter_mut().enumerate() {
        if plane == ELEVATION_PLANE && v.coords.len() > ELEVATION_PLANE {
            let elevation = v.coords[ELEVATION_PLANE];
            if elevation == RASTER_ELEVATION_SENTINEL {
                // Keep the raster default so the sentinel survives
                // quantization exactly.
                *s = RASTER_ELEVATION_SCALING;
                continue;
            }
            if s.step() >= 1.0 && elevation.fract() != 0.0 {
                // The inherited scaling only resolves whole units; rebase
                // around the requested elevation instead.
                *s = Scaling::new(
                    REBASED_ELEVATION_MULTIPLIER,
                    elevation.floor() - REBASED_ELEVATION_MULTIPLIER / 2.0,
                );
            }
        }
        grow_to_fit(s, v.coords[plane]);
    }
    Pool::new(planes, false)
}

/// Last-resort scalings when no pool in the file shares the vertex's plane
/// count: degree-tile boxes for the horizontal planes, the area's finest
/// (or the raster default) elevation scaling, and a signed unit box for the
/// normal and terrain planes.
fn synthesized_scalings(v: &AreaVertex, elevation_scaling: Option<Scaling>) -> Vec<Scaling> {
    warn!(
        "No pool in the file has {} planes; synthesizing scalings.",
        v.coords.len()
    );
    (0..v.coords.len())
        .map(|plane| match plane {
            0 | 1 => Scaling::new(1.0, v.coords[plane].floor()),
            ELEVATION_PLANE => elevation_scaling.unwrap_or(RASTER_ELEVATION_SCALING),
            _ => Scaling::new(2.0, -1.0),
        })
        .collect()
}

/// Extends a scaling box one multiplier step at a time until it contains
/// `value`. Growing only ever widens the box, so vertices already placed
/// against it stay representable.
fn grow_to_fit(s: &mut Scaling, value: f64) {
    if s.multiplier == 0.0 {
        return;
    }
    let step = s.multiplier;
    let mut guard = 0;
    while !s.contains(value, 0.0) && guard < 1024 {
        if value < s.offset {
            s.offset -= step;
            s.multiplier += step;
        } else {
            s.multiplier += step;
        }
        guard += 1;
    }
    if guard > 0 {
        debug!("Grew a pool scaling by {} steps to hold {}.", guard, value);
    }
}
