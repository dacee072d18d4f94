//! Working representation of a mesh region under edit.
//!
//! Editing never runs over the whole tile: the driver extracts every patch
//! triangle touching the edit polygon's bounding box into a `MeshArea`,
//! where vertices are deep copies carrying all their planes plus a
//! back-reference to the pool slot they came from. The cutter and the
//! elevation edits rewrite the area freely (new vertices have no
//! back-reference yet); the allocator then gives every vertex a valid
//! reference again, and reinsertion pushes the triangles back into the
//! patches they came from.

use crate::cmds::{Patch, VertexRef};
use crate::geom::{Bounds, Point};
use crate::pool::{Pool, Scaling};
use log::{debug, warn};

/// Plane order in terrain pools: longitude, latitude, elevation, then
/// normals and terrain-specific texture planes.
pub const ELEVATION_PLANE: usize = 2;

/// One vertex of the working area: every plane of the original pool entry,
/// plus where it came from (`None` for vertices created by an edit).
#[derive(Debug, Clone, PartialEq)]
pub struct AreaVertex {
    pub coords: Vec<f64>,
    pub source: Option<VertexRef>,
}

impl AreaVertex {
    pub fn new(coords: Vec<f64>) -> AreaVertex {
        AreaVertex {
            coords,
            source: None,
        }
    }

    pub fn x(&self) -> f64 {
        self.coords[0]
    }

    pub fn y(&self) -> f64 {
        self.coords[1]
    }

    pub fn position(&self) -> Point {
        [self.coords[0], self.coords[1]]
    }

    pub fn elevation(&self) -> Option<f64> {
        self.coords.get(ELEVATION_PLANE).copied()
    }

    pub fn set_elevation(&mut self, elevation: f64) {
        if self.coords.len() > ELEVATION_PLANE {
            self.coords[ELEVATION_PLANE] = elevation;
            // The old pool slot no longer holds this vertex.
            self.source = None;
        }
    }
}

/// A triangle of the working area, remembering which patch it belongs to.
#[derive(Debug, Clone)]
pub struct AreaTriangle {
    pub vertices: [AreaVertex; 3],
    pub patch: usize,
}

impl AreaTriangle {
    pub fn positions(&self) -> [Point; 3] {
        [
            self.vertices[0].position(),
            self.vertices[1].position(),
            self.vertices[2].position(),
        ]
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::of(self.positions())
    }
}

/// The triangles extracted for one edit, plus the finest elevation scaling
/// seen among the pools they came from (the allocator's fallback when it
/// has to invent a pool).
#[derive(Debug, Clone)]
pub struct MeshArea {
    pub bounds: Bounds,
    pub triangles: Vec<AreaTriangle>,
    pub elevation_scaling: Option<Scaling>,
}

/// Moves every patch triangle whose bounding box touches `bounds` out of
/// its patch and into a new working area. Triangles referencing points
/// missing from their pool are dropped with a warning.
pub fn extract_area(patches: &mut [Patch], pools: &[Pool], bounds: Bounds) -> MeshArea {
    let mut area = MeshArea {
        bounds,
        triangles: Vec::new(),
        elevation_scaling: None,
    };
    for (patch_id, patch) in patches.iter_mut().enumerate() {
        let mut kept = Vec::with_capacity(patch.triangles.len());
        for tri in patch.triangles.drain(..) {
            match materialize(&tri, pools, bounds) {
                Some(vertices) => {
                    for v in &vertices {
                        note_elevation_scaling(&mut area, pools, v);
                    }
                    area.triangles.push(AreaTriangle {
                        vertices,
                        patch: patch_id,
                    });
                }
                None => kept.push(tri),
            }
        }
        patch.triangles = kept;
    }
    debug!(
        "Extracted {} triangles for bounds [{:?}..{:?}].",
        area.triangles.len(),
        bounds.min,
        bounds.max
    );
    area
}

/// Copies a triangle's vertices out of the pools if it touches `bounds`.
fn materialize(tri: &[VertexRef; 3], pools: &[Pool], bounds: Bounds) -> Option<[AreaVertex; 3]> {
    let mut vertices = Vec::with_capacity(3);
    for r in tri {
        let pool = pools.get(r.pool as usize)?;
        if r.index as usize >= pool.num_points() {
            warn!(
                "Vertex reference {}:{} is out of range; leaving its triangle alone.",
                r.pool, r.index
            );
            return None;
        }
        vertices.push(AreaVertex {
            coords: pool.point(r.index as usize).to_vec(),
            source: Some(*r),
        });
    }
    let tri_bounds = Bounds::of(vertices.iter().map(|v| v.position()));
    if !tri_bounds.intersects(&bounds) {
        return None;
    }
    // Length is exactly 3 by construction.
    vertices.try_into().ok()
}

fn note_elevation_scaling(area: &mut MeshArea, pools: &[Pool], v: &AreaVertex) {
    let Some(r) = v.source else { return };
    let pool = &pools[r.pool as usize];
    if pool.num_planes() <= ELEVATION_PLANE {
        return;
    }
    let s = pool.scaling(ELEVATION_PLANE);
    let finer = match area.elevation_scaling {
        Some(current) => s.multiplier != 0.0 && s.multiplier < current.multiplier,
        None => true,
    };
    if finer {
        area.elevation_scaling = Some(s);
    }
}

/// Returns the edited triangles to their patches. Every vertex must carry a
/// pool reference by now; triangles that do not are dropped with a warning
/// (the allocator reports them first, so this is a backstop).
pub fn insert_area(patches: &mut [Patch], area: &MeshArea) {
    let mut dropped = 0usize;
    for tri in &area.triangles {
        let refs: Option<Vec<VertexRef>> = tri.vertices.iter().map(|v| v.source).collect();
        match refs {
            Some(refs) if tri.patch < patches.len() => {
                patches[tri.patch]
                    .triangles
                    .push([refs[0], refs[1], refs[2]]);
            }
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!("{} edited triangles had no pool slot and were dropped.", dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool() -> Pool {
        let planes = vec![
            Scaling::new(0.0, 0.0),
            Scaling::new(0.0, 0.0),
            Scaling::new(1000.0, 0.0),
        ];
        let mut pool = Pool::new(planes, false);
        pool.push(&[0.0, 0.0, 10.0]);
        pool.push(&[1.0, 0.0, 20.0]);
        pool.push(&[0.0, 1.0, 30.0]);
        pool.push(&[5.0, 5.0, 40.0]);
        pool.push(&[6.0, 5.0, 50.0]);
        pool.push(&[5.0, 6.0, 60.0]);
        pool
    }

    fn test_patch() -> Patch {
        Patch {
            definition: 1,
            flags: 1,
            lod_near: 0.0,
            lod_far: -1.0,
            triangles: vec![
                [
                    VertexRef::new(0, 0),
                    VertexRef::new(0, 1),
                    VertexRef::new(0, 2),
                ],
                [
                    VertexRef::new(0, 3),
                    VertexRef::new(0, 4),
                    VertexRef::new(0, 5),
                ],
            ],
        }
    }

    #[test]
    fn extracts_only_touching_triangles() {
        let pools = vec![test_pool()];
        let mut patches = vec![test_patch()];
        let bounds = Bounds::of(vec![[-0.5, -0.5], [2.0, 2.0]]);
        let area = extract_area(&mut patches, &pools, bounds);
        assert_eq!(1, area.triangles.len());
        assert_eq!(1, patches[0].triangles.len());
        assert_eq!(
            Some(VertexRef::new(0, 0)),
            area.triangles[0].vertices[0].source
        );
        assert_eq!(Some(20.0), area.triangles[0].vertices[1].elevation());
    }

    #[test]
    fn records_the_finest_elevation_scaling() {
        let pools = vec![test_pool()];
        let mut patches = vec![test_patch()];
        let bounds = Bounds::of(vec![[-10.0, -10.0], [10.0, 10.0]]);
        let area = extract_area(&mut patches, &pools, bounds);
        assert_eq!(Some(Scaling::new(1000.0, 0.0)), area.elevation_scaling);
    }

    #[test]
    fn insert_restores_extracted_triangles() {
        let pools = vec![test_pool()];
        let mut patches = vec![test_patch()];
        let bounds = Bounds::of(vec![[-10.0, -10.0], [10.0, 10.0]]);
        let area = extract_area(&mut patches, &pools, bounds);
        assert!(patches[0].triangles.is_empty());
        insert_area(&mut patches, &area);
        assert_eq!(2, patches[0].triangles.len());
    }

    #[test]
    fn insert_drops_unallocated_vertices() {
        let mut patches = vec![test_patch()];
        patches[0].triangles.clear();
        let area = MeshArea {
            bounds: Bounds::of(vec![[0.0, 0.0]]),
            triangles: vec![AreaTriangle {
                vertices: [
                    AreaVertex::new(vec![0.0, 0.0, 1.0]),
                    AreaVertex::new(vec![1.0, 0.0, 1.0]),
                    AreaVertex::new(vec![0.0, 1.0, 1.0]),
                ],
                patch: 0,
            }],
            elevation_scaling: None,
        };
        insert_area(&mut patches, &area);
        assert!(patches[0].triangles.is_empty());
    }

    #[test]
    fn set_elevation_invalidates_the_source() {
        let mut v = AreaVertex {
            coords: vec![0.0, 0.0, 5.0],
            source: Some(VertexRef::new(0, 0)),
        };
        v.set_elevation(9.0);
        assert_eq!(Some(9.0), v.elevation());
        assert_eq!(None, v.source);
    }
}
