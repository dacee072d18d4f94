//! Declarative terrain edits and the driver that applies them.
//!
//! Each command runs the same pipeline: extract the patch triangles whose
//! bounding boxes touch the edit polygon, cut the polygon against each one,
//! re-triangulate the pieces, interpolate the non-positional planes from the
//! original triangle, apply the commanded elevation, re-quantize everything
//! into pools, and reinsert. Commands that cannot apply (empty region,
//! unknown raster layer, degenerate polygon) are skipped and reported;
//! structural failures such as pool exhaustion abort the whole update so a
//! half-edited tile is never written.

use crate::alloc;
use crate::cut;
use crate::dsf::Dsf;
use crate::earclip;
use crate::error::{DsfError, DsfResult};
use crate::geom::{self, Bounds, Point};
use crate::mesh::{AreaTriangle, AreaVertex};
use crate::EditConfig;
use log::{debug, warn};

/// One terrain edit. Polygons are open rings (no repeated last vertex) in
/// tile coordinates; a repeated last vertex is tolerated and stripped.
#[derive(Debug, Clone)]
pub enum EditCommand {
    /// Cuts the polygon into the mesh, optionally flattening its interior
    /// and rim to a fixed elevation. With `keep_inner` false the interior
    /// triangles are removed, leaving a hole.
    CutPolygon {
        polygon: Vec<Point>,
        elevation: Option<f64>,
        keep_inner: bool,
    },

    /// Cuts the polygon's footprint and drapes its interior onto the plane
    /// through the first three corners, e.g. a sloped runway surround.
    CutRamp { corners: Vec<[f64; 3]> },

    /// Sets the elevation of every existing vertex inside the polygon
    /// without changing the triangulation.
    UpdateElevation { polygon: Vec<Point>, elevation: f64 },

    /// Fills a geographic region of the named raster layer with one value.
    UpdateRasterElevation {
        layer: String,
        region: Bounds,
        elevation: f64,
    },

    /// Removes the mesh inside `boundary` and splices in pre-built
    /// triangles, given as full per-vertex plane coordinates.
    InsertMesh {
        boundary: Vec<Point>,
        triangles: Vec<[Vec<f64>; 3]>,
    },
}

#[derive(Debug)]
pub struct SkippedCommand {
    pub index: usize,
    pub reason: String,
}

/// What `apply_commands` did: commands applied, and the ones it skipped
/// with the reason for each.
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub applied: usize,
    pub skipped: Vec<SkippedCommand>,
}

impl UpdateReport {
    pub fn all_applied(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Applies the commands in order. A command that cannot apply is skipped
/// and recorded; any other error aborts immediately.
pub fn apply_commands(
    dsf: &mut Dsf,
    commands: &[EditCommand],
    cfg: &EditConfig,
) -> DsfResult<UpdateReport> {
    let mut report = UpdateReport::default();
    for (index, command) in commands.iter().enumerate() {
        match apply_one(dsf, command, cfg) {
            Ok(()) => report.applied += 1,
            Err(DsfError::UpdateFailed(reason)) => {
                warn!("Skipping command {}: {}", index, reason);
                report.skipped.push(SkippedCommand { index, reason });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

/// How an edit assigns elevations to the vertices it touches.
enum ElevationRule {
    Keep,
    Constant(f64),
    /// `e = a + b*x + c*y`.
    Plane([f64; 3]),
}

impl ElevationRule {
    fn eval(&self, p: Point) -> Option<f64> {
        match self {
            ElevationRule::Keep => None,
            ElevationRule::Constant(e) => Some(*e),
            ElevationRule::Plane([a, b, c]) => Some(a + b * p[0] + c * p[1]),
        }
    }
}

fn apply_one(dsf: &mut Dsf, command: &EditCommand, cfg: &EditConfig) -> DsfResult<()> {
    match command {
        EditCommand::CutPolygon {
            polygon,
            elevation,
            keep_inner,
        } => {
            let polygon = clean_polygon(polygon, cfg)?;
            let rule = match elevation {
                Some(e) => ElevationRule::Constant(*e),
                None => ElevationRule::Keep,
            };
            apply_cut(dsf, &polygon, &rule, *keep_inner, cfg)?;
            Ok(())
        }
        EditCommand::CutRamp { corners } => {
            let footprint: Vec<Point> = corners.iter().map(|c| [c[0], c[1]]).collect();
            let footprint = clean_polygon(&footprint, cfg)?;
            let plane = fit_plane(corners).ok_or_else(|| {
                DsfError::UpdateFailed("ramp corners do not define a plane".into())
            })?;
            apply_cut(dsf, &footprint, &ElevationRule::Plane(plane), true, cfg)?;
            Ok(())
        }
        EditCommand::UpdateElevation { polygon, elevation } => {
            let polygon = clean_polygon(polygon, cfg)?;
            update_elevation(dsf, &polygon, *elevation, cfg)
        }
        EditCommand::UpdateRasterElevation {
            layer,
            region,
            elevation,
        } => update_raster(dsf, layer, *region, *elevation),
        EditCommand::InsertMesh {
            boundary,
            triangles,
        } => {
            let boundary = clean_polygon(boundary, cfg)?;
            insert_mesh(dsf, &boundary, triangles, cfg)
        }
    }
}

/// Strips a repeated closing vertex and rejects rings that are too small.
fn clean_polygon(polygon: &[Point], cfg: &EditConfig) -> DsfResult<Vec<Point>> {
    let mut ring = polygon.to_vec();
    if ring.len() > 1 {
        let (first, last) = (ring[0], ring[ring.len() - 1]);
        if geom::dist(first, last) < cfg.min_point_distance {
            ring.pop();
        }
    }
    if ring.len() < 3 {
        return Err(DsfError::UpdateFailed(format!(
            "polygon has only {} distinct vertices",
            ring.len()
        )));
    }
    Ok(ring)
}

/// The shared cut pipeline. Returns the patch index of the first triangle
/// found inside the polygon, which `insert_mesh` uses as the splice target.
fn apply_cut(
    dsf: &mut Dsf,
    polygon: &[Point],
    rule: &ElevationRule,
    keep_inner: bool,
    cfg: &EditConfig,
) -> DsfResult<Option<usize>> {
    let bounds = Bounds::of(polygon.iter().copied()).expanded(cfg.accuracy);
    let mut area = dsf.extract_mesh_area(bounds);
    if area.triangles.is_empty() {
        return Err(DsfError::UpdateFailed(
            "no mesh triangles touch the edit polygon".into(),
        ));
    }

    let mut out: Vec<AreaTriangle> = Vec::new();
    let mut inner_patch: Option<usize> = None;
    let mut pieces = 0usize;
    for tri in area.triangles.drain(..) {
        let positions = tri.positions();
        match cut::cut_triangle(&positions, polygon, cfg) {
            Some(result) => {
                pieces += result.outer.len() + result.inner.len();
                for ring in &result.outer {
                    emit_piece(&mut out, &tri, ring, false, rule, &result.border, cfg);
                }
                for ring in &result.inner {
                    inner_patch.get_or_insert(tri.patch);
                    if keep_inner {
                        emit_piece(&mut out, &tri, ring, true, rule, &result.border, cfg);
                    }
                }
            }
            None => {
                let inside = geom::point_in_poly(polygon, geom::centroid(&positions));
                if !inside {
                    out.push(tri);
                } else {
                    inner_patch.get_or_insert(tri.patch);
                    if keep_inner {
                        let mut tri = tri;
                        for v in tri.vertices.iter_mut() {
                            if let Some(e) = rule.eval(v.position()) {
                                v.set_elevation(e);
                            }
                        }
                        out.push(tri);
                    }
                }
            }
        }
    }
    debug!(
        "Cut produced {} pieces; area holds {} triangles.",
        pieces,
        out.len()
    );

    area.triangles = out;
    alloc::allocate(&mut area, &mut dsf.pools, cfg)?;
    dsf.insert_mesh_area(&area);
    Ok(inner_patch)
}

/// Triangulates one cut piece and emits its triangles into the area, with
/// plane values interpolated from the source triangle. Inner-piece vertices
/// and vertices the cut introduced on the rim take the rule's elevation.
fn emit_piece(
    out: &mut Vec<AreaTriangle>,
    src: &AreaTriangle,
    ring: &[Point],
    inner: bool,
    rule: &ElevationRule,
    border: &[Point],
    cfg: &EditConfig,
) {
    for t in earclip::triangulate(ring, cfg.epsilon) {
        let vertices = [ring[t[0]], ring[t[1]], ring[t[2]]].map(|p| {
            let mut v = lerp_vertex(src, p, cfg.min_point_distance);
            let on_rim = border
                .iter()
                .any(|&b| geom::dist(b, p) < cfg.min_point_distance);
            if inner || on_rim {
                if let Some(e) = rule.eval(p) {
                    v.set_elevation(e);
                }
            }
            v
        });
        out.push(AreaTriangle {
            vertices,
            patch: src.patch,
        });
    }
}

/// A vertex at `p` inside `src`: an original vertex when one coincides,
/// otherwise every plane interpolated barycentrically. Planes that agree on
/// all three corners (notably the raster-elevation sentinel) carry over
/// exactly rather than through arithmetic.
fn lerp_vertex(src: &AreaTriangle, p: Point, min_distance: f64) -> AreaVertex {
    for v in &src.vertices {
        if geom::dist(v.position(), p) < min_distance {
            return v.clone();
        }
    }
    let [a, b, c] = src.positions();
    let w = geom::barycentric(a, b, c, p);
    let planes = src.vertices[0].coords.len();
    let mut coords = Vec::with_capacity(planes);
    for k in 0..planes {
        let (va, vb, vc) = (
            src.vertices[0].coords[k],
            src.vertices[1].coords[k],
            src.vertices[2].coords[k],
        );
        if va == vb && vb == vc {
            coords.push(va);
        } else {
            coords.push(w[0] * va + w[1] * vb + w[2] * vc);
        }
    }
    coords[0] = p[0];
    coords[1] = p[1];
    AreaVertex::new(coords)
}

/// Plane through the first three corners as `[a, b, c]` with
/// `e = a + b*x + c*y`, or `None` when they are collinear in x/y.
fn fit_plane(corners: &[[f64; 3]]) -> Option<[f64; 3]> {
    if corners.len() < 3 {
        return None;
    }
    let (p0, p1, p2) = (corners[0], corners[1], corners[2]);
    let u = [p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]];
    let v = [p2[0] - p0[0], p2[1] - p0[1], p2[2] - p0[2]];
    let nx = u[1] * v[2] - u[2] * v[1];
    let ny = u[2] * v[0] - u[0] * v[2];
    let nz = u[0] * v[1] - u[1] * v[0];
    if nz.abs() < 1e-12 {
        return None;
    }
    let b = -nx / nz;
    let c = -ny / nz;
    let a = p0[2] - b * p0[0] - c * p0[1];
    Some([a, b, c])
}

fn update_elevation(
    dsf: &mut Dsf,
    polygon: &[Point],
    elevation: f64,
    cfg: &EditConfig,
) -> DsfResult<()> {
    let bounds = Bounds::of(polygon.iter().copied());
    let mut area = dsf.extract_mesh_area(bounds);
    let mut changed = 0usize;
    for tri in area.triangles.iter_mut() {
        for v in tri.vertices.iter_mut() {
            let p = v.position();
            if geom::point_in_poly(polygon, p) || geom::on_boundary(polygon, p, cfg.epsilon) {
                v.set_elevation(elevation);
                changed += 1;
            }
        }
    }
    if changed == 0 {
        // Put the untouched triangles back before bailing.
        dsf.insert_mesh_area(&area);
        return Err(DsfError::UpdateFailed(
            "no mesh vertices inside the polygon".into(),
        ));
    }
    debug!("Set {} vertices to elevation {}.", changed, elevation);
    alloc::allocate(&mut area, &mut dsf.pools, cfg)?;
    dsf.insert_mesh_area(&area);
    Ok(())
}

fn update_raster(dsf: &mut Dsf, layer: &str, region: Bounds, elevation: f64) -> DsfResult<()> {
    let (west, south, east, north) = dsf.properties.bounds();
    let (west, south) = (west as f64, south as f64);
    let (span_x, span_y) = (east as f64 - west, north as f64 - south);
    let raster = dsf
        .raster_mut(layer)
        .ok_or_else(|| DsfError::UpdateFailed(format!("no raster layer named {:?}", layer)))?;
    let post = raster.post_centric();
    let (x0, x1) = sample_range(region.min[0], region.max[0], west, span_x, raster.width(), post);
    let (y0, y1) = sample_range(region.min[1], region.max[1], south, span_y, raster.height(), post);
    if x0 >= x1 || y0 >= y1 {
        return Err(DsfError::UpdateFailed(format!(
            "region {:?} covers no samples of raster {:?}",
            region, layer
        )));
    }
    debug!(
        "Filling raster {:?} samples [{},{})x[{},{}) with {}.",
        layer, x0, x1, y0, y1, elevation
    );
    raster.fill_region(x0, y0, x1, y1, elevation);
    Ok(())
}

/// The half-open sample index range whose sample positions fall inside
/// `[v0, v1]` along one raster axis.
fn sample_range(v0: f64, v1: f64, origin: f64, span: f64, count: u32, post: bool) -> (u32, u32) {
    let denom = if post {
        count as f64
    } else {
        count.saturating_sub(1).max(1) as f64
    };
    let to_index = |v: f64| (v - origin) / span * denom;
    let lo = to_index(v0).ceil().max(0.0) as u32;
    let hi = (to_index(v1).floor() as i64 + 1).clamp(0, count as i64) as u32;
    (lo, hi.max(lo))
}

fn insert_mesh(
    dsf: &mut Dsf,
    boundary: &[Point],
    triangles: &[[Vec<f64>; 3]],
    cfg: &EditConfig,
) -> DsfResult<()> {
    if triangles.is_empty() {
        return Err(DsfError::UpdateFailed("no triangles to insert".into()));
    }
    for (i, tri) in triangles.iter().enumerate() {
        if tri.iter().any(|v| v.len() < 3) {
            return Err(DsfError::UpdateFailed(format!(
                "inserted triangle {} has a vertex with fewer than 3 planes",
                i
            )));
        }
    }

    // Carve the hole first; its patch is where the new triangles go.
    let patch = apply_cut(dsf, boundary, &ElevationRule::Keep, false, cfg)?
        .ok_or_else(|| {
            DsfError::UpdateFailed("boundary encloses no existing mesh".into())
        })?;

    let mut area = dsf.extract_mesh_area(Bounds::of(boundary.iter().copied()));
    for tri in triangles {
        area.triangles.push(AreaTriangle {
            vertices: [
                AreaVertex::new(tri[0].clone()),
                AreaVertex::new(tri[1].clone()),
                AreaVertex::new(tri[2].clone()),
            ],
            patch,
        });
    }
    alloc::allocate(&mut area, &mut dsf.pools, cfg)?;
    dsf.insert_mesh_area(&area);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::{Properties, StringTable};
    use crate::cmds::{self, Command, VertexRef};
    use crate::pool::{Pool, Scaling};
    use crate::raster::{RasterLayer, SampleFormat};
    use approx::assert_relative_eq;

    fn test_cfg() -> EditConfig {
        EditConfig {
            accuracy: 0.01,
            ..EditConfig::default()
        }
    }

    /// A unit-square tile: two triangles over (0,0)..(1,1), elevations
    /// 10/20/30/40 at the corners, plus a 3x3 elevation raster.
    fn test_dsf() -> Dsf {
        let mut table = StringTable::default();
        for (k, v) in [
            ("sim/west", "0"),
            ("sim/east", "1"),
            ("sim/south", "0"),
            ("sim/north", "1"),
        ] {
            table.push(k);
            table.push(v);
        }
        let mut dsf = Dsf::new(Properties::new(table).unwrap());
        dsf.terrain_defs.push("terrain_Water");

        let planes = vec![
            Scaling::new(1.0, 0.0),
            Scaling::new(1.0, 0.0),
            Scaling::new(1000.0, 0.0),
        ];
        let mut pool = Pool::new(planes, false);
        pool.push(&[0.0, 0.0, 10.0]);
        pool.push(&[1.0, 0.0, 20.0]);
        pool.push(&[1.0, 1.0, 30.0]);
        pool.push(&[0.0, 1.0, 40.0]);
        dsf.pools.push(pool);

        dsf.commands = vec![
            Command::SetDefinition(0),
            Command::PoolSelect(0),
            Command::TerrainPatchFlagsLod {
                flags: 1,
                near: 0.0,
                far: -1.0,
            },
            Command::Triangle(vec![0, 1, 2, 0, 2, 3]),
        ];
        dsf.patches = cmds::build_patches(&dsf.commands);

        let raster = RasterLayer::new("elevation", SampleFormat::Signed, 2, 3, 3, 1.0, 0.0);
        dsf.rasters.push(raster);
        dsf
    }

    /// A square strictly inside the lower-right triangle (0,0)-(1,0)-(1,1).
    fn inner_square() -> Vec<Point> {
        vec![[0.4, 0.05], [0.8, 0.05], [0.8, 0.3], [0.4, 0.3]]
    }

    fn resolve(dsf: &Dsf, r: VertexRef) -> Vec<f64> {
        dsf.pools[r.pool as usize].point(r.index as usize).to_vec()
    }

    fn patch_area(dsf: &Dsf) -> f64 {
        dsf.patches[0]
            .triangles
            .iter()
            .map(|t| {
                let ps: Vec<Point> = t.iter().map(|&r| {
                    let v = resolve(dsf, r);
                    [v[0], v[1]]
                }).collect();
                geom::signed_area(&ps).abs()
            })
            .sum()
    }

    fn has_vertex(dsf: &Dsf, x: f64, y: f64, e: f64) -> bool {
        dsf.pools.iter().any(|pool| {
            pool.iter().any(|p| {
                (p[0] - x).abs() < 1e-6 && (p[1] - y).abs() < 1e-6 && (p[2] - e).abs() < 1e-6
            })
        })
    }

    #[test]
    fn flatten_conserves_area_and_sets_elevation() {
        let mut dsf = test_dsf();
        let report = apply_commands(
            &mut dsf,
            &[EditCommand::CutPolygon {
                polygon: inner_square(),
                elevation: Some(50.0),
                keep_inner: true,
            }],
            &test_cfg(),
        )
        .unwrap();
        assert!(report.all_applied());
        assert_eq!(1, report.applied);

        assert!(dsf.patches[0].triangles.len() > 2);
        assert_relative_eq!(1.0, patch_area(&dsf), epsilon = 1e-9);
        assert!(has_vertex(&dsf, 0.4, 0.05, 50.0));

        // Every triangle inside the flattened square sits at 50.
        let square = inner_square();
        for t in &dsf.patches[0].triangles {
            let vs: Vec<Vec<f64>> = t.iter().map(|&r| resolve(&dsf, r)).collect();
            let c = geom::centroid(&[
                [vs[0][0], vs[0][1]],
                [vs[1][0], vs[1][1]],
                [vs[2][0], vs[2][1]],
            ]);
            if geom::strictly_inside(&square, c, 1e-9) {
                for v in &vs {
                    assert!((v[2] - 50.0).abs() < 1e-6, "vertex {:?} not flattened", v);
                }
            }
        }
    }

    #[test]
    fn dropping_the_interior_leaves_a_hole() {
        let mut dsf = test_dsf();
        apply_commands(
            &mut dsf,
            &[EditCommand::CutPolygon {
                polygon: inner_square(),
                elevation: None,
                keep_inner: false,
            }],
            &test_cfg(),
        )
        .unwrap();

        assert_relative_eq!(0.9, patch_area(&dsf), epsilon = 1e-9);
        let square = inner_square();
        for t in &dsf.patches[0].triangles {
            let vs: Vec<Vec<f64>> = t.iter().map(|&r| resolve(&dsf, r)).collect();
            let c = geom::centroid(&[
                [vs[0][0], vs[0][1]],
                [vs[1][0], vs[1][1]],
                [vs[2][0], vs[2][1]],
            ]);
            assert!(!geom::strictly_inside(&square, c, 1e-9));
        }
    }

    #[test]
    fn ramp_drapes_the_interior_onto_the_plane() {
        let mut dsf = test_dsf();
        // e = 100 + 10x over the inner square's footprint.
        let corners = vec![
            [0.4, 0.05, 104.0],
            [0.8, 0.05, 108.0],
            [0.8, 0.3, 108.0],
            [0.4, 0.3, 104.0],
        ];
        apply_commands(
            &mut dsf,
            &[EditCommand::CutRamp { corners }],
            &test_cfg(),
        )
        .unwrap();
        assert_relative_eq!(1.0, patch_area(&dsf), epsilon = 1e-9);
        assert!(has_vertex(&dsf, 0.4, 0.05, 104.0));
        assert!(has_vertex(&dsf, 0.8, 0.3, 108.0));
    }

    #[test]
    fn collinear_ramp_corners_are_skipped() {
        let mut dsf = test_dsf();
        let report = apply_commands(
            &mut dsf,
            &[EditCommand::CutRamp {
                corners: vec![
                    [0.1, 0.1, 1.0],
                    [0.2, 0.2, 2.0],
                    [0.3, 0.3, 3.0],
                    [0.4, 0.1, 1.0],
                ],
            }],
            &test_cfg(),
        )
        .unwrap();
        assert_eq!(0, report.applied);
        assert_eq!(1, report.skipped.len());
    }

    #[test]
    fn update_elevation_touches_every_vertex() {
        let mut dsf = test_dsf();
        apply_commands(
            &mut dsf,
            &[EditCommand::UpdateElevation {
                polygon: vec![[-0.5, -0.5], [1.5, -0.5], [1.5, 1.5], [-0.5, 1.5]],
                elevation: 7.0,
            }],
            &test_cfg(),
        )
        .unwrap();

        // The triangulation is unchanged; every referenced vertex moved to 7.
        assert_eq!(2, dsf.patches[0].triangles.len());
        assert_relative_eq!(1.0, patch_area(&dsf), epsilon = 1e-9);
        for t in &dsf.patches[0].triangles {
            for &r in t.iter() {
                assert!((resolve(&dsf, r)[2] - 7.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn raster_fill_hits_only_the_region() {
        let mut dsf = test_dsf();
        apply_commands(
            &mut dsf,
            &[EditCommand::UpdateRasterElevation {
                layer: "elevation".into(),
                region: Bounds::of(vec![[0.3, 0.3], [0.7, 0.7]]),
                elevation: 99.0,
            }],
            &test_cfg(),
        )
        .unwrap();
        let raster = dsf.raster("elevation").unwrap();
        assert_eq!(99.0, raster.get(1, 1));
        assert_eq!(0.0, raster.get(0, 0));
        assert_eq!(0.0, raster.get(2, 2));
    }

    #[test]
    fn unknown_raster_layer_is_skipped() {
        let mut dsf = test_dsf();
        let report = apply_commands(
            &mut dsf,
            &[EditCommand::UpdateRasterElevation {
                layer: "bathymetry".into(),
                region: Bounds::of(vec![[0.0, 0.0], [1.0, 1.0]]),
                elevation: 0.0,
            }],
            &test_cfg(),
        )
        .unwrap();
        assert_eq!(1, report.skipped.len());
        assert!(report.skipped[0].reason.contains("bathymetry"));
    }

    #[test]
    fn insert_mesh_replaces_the_interior() {
        let mut dsf = test_dsf();
        let square = inner_square();
        // Two triangles tiling the square exactly, at elevation 60.
        let v = |x: f64, y: f64| vec![x, y, 60.0];
        let triangles = vec![
            [v(0.4, 0.05), v(0.8, 0.05), v(0.8, 0.3)],
            [v(0.4, 0.05), v(0.8, 0.3), v(0.4, 0.3)],
        ];
        apply_commands(
            &mut dsf,
            &[EditCommand::InsertMesh {
                boundary: square,
                triangles,
            }],
            &test_cfg(),
        )
        .unwrap();
        assert_relative_eq!(1.0, patch_area(&dsf), epsilon = 1e-9);
        assert!(has_vertex(&dsf, 0.4, 0.05, 60.0));
        assert!(has_vertex(&dsf, 0.8, 0.3, 60.0));
    }

    #[test]
    fn edits_outside_the_mesh_are_reported() {
        let mut dsf = test_dsf();
        let report = apply_commands(
            &mut dsf,
            &[EditCommand::CutPolygon {
                polygon: vec![[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 6.0]],
                elevation: Some(0.0),
                keep_inner: true,
            }],
            &test_cfg(),
        )
        .unwrap();
        assert_eq!(0, report.applied);
        assert_eq!(1, report.skipped.len());
        // The mesh is untouched.
        assert_eq!(2, dsf.patches[0].triangles.len());
    }

    #[test]
    fn degenerate_polygon_is_skipped() {
        let mut dsf = test_dsf();
        let report = apply_commands(
            &mut dsf,
            &[EditCommand::CutPolygon {
                polygon: vec![[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]],
                elevation: None,
                keep_inner: true,
            }],
            &test_cfg(),
        )
        .unwrap();
        assert_eq!(1, report.skipped.len());
    }
}
