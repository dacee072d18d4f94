// A library for reading, editing, and writing X-Plane's DSF terrain meshes.
//
// DSF - Distribution Scenery Format
//   https://developer.x-plane.com/article/dsf-file-format-specification/
//   https://developer.x-plane.com/article/dsf-usage-in-x-plane/
//   Base meshes: https://developer.x-plane.com/article/understanding-and-building-dsf-base-meshes/
//
// A DSF tile is a chunked ("atom") container holding quantized vertex pools,
// a flat command stream that assembles triangles/objects/polygons/road
// networks out of those pools, and optional elevation raster layers. This
// crate decodes the whole container into an editable in-memory mesh, applies
// declarative terrain edits (flatten an area, stamp a ramp, raise a raster
// region, splice in a pre-built mesh), and re-serializes a valid container.
//
// The editing pipeline is:
//   read -> extract a working triangle set for a bounding box -> cut the edit
//   polygon against each working triangle (ear-clipping the pieces) ->
//   re-quantize changed vertices into pools -> reinsert -> write.

pub mod alloc;
pub mod atoms;
pub mod bytes;
pub mod cmds;
pub mod cut;
pub mod dsf;
pub mod earclip;
pub mod edit;
pub mod error;
pub mod geom;
pub mod mesh;
pub mod pool;
pub mod raster;

pub use dsf::{Dsf, NoProgress, Progress};
pub use edit::{apply_commands, EditCommand, UpdateReport};
pub use error::{DsfError, DsfResult};
pub use mesh::{AreaTriangle, AreaVertex, MeshArea};

/// Named tolerances and limits used by the geometry engine and the pool
/// allocator. All distance-like values are in the same units as the mesh
/// coordinates (degrees) unless noted otherwise; some defaults originate
/// from meter-based reasoning in the source material and are deliberately
/// not unit-corrected, because which vertices snap depends on the exact
/// constant in use.
#[derive(Debug, Clone)]
pub struct EditConfig {
    /// Snap-to-vertex tolerance for cut border points. A border point within
    /// this distance of an existing subject-polygon vertex (and strictly
    /// closer to it than to the other edge endpoint) is replaced by that
    /// vertex, preventing near-zero-area sliver triangles.
    pub accuracy: f64,

    /// Distance below which two points are considered the same point, used
    /// when deduplicating border vertices and matching pool entries.
    pub min_point_distance: f64,

    /// Tolerance for the strictly-inside test's boundary band and for the
    /// collinearity test in segment intersection.
    pub epsilon: f64,

    /// Values this close to a pool scaling boundary are snapped onto it
    /// rather than forcing the pool's base to grow.
    pub scaling_slack: f64,

    /// Maximum number of vertices in a single 16-bit-indexed pool.
    pub max_pool_size: usize,

    /// Maximum number of pools in a file; the 65,536th pool is a fatal
    /// allocation error.
    pub max_pools: usize,
}

impl Default for EditConfig {
    fn default() -> Self {
        EditConfig {
            accuracy: 0.3,
            min_point_distance: 1e-7,
            epsilon: 1e-9,
            scaling_slack: 1e-7,
            max_pool_size: 65_535,
            max_pools: 65_535,
        }
    }
}

/// Elevation value meaning "take the elevation from the raster layer".
/// Vertices carrying it keep the raster default scaling when re-pooled so
/// the sentinel survives quantization exactly.
pub const RASTER_ELEVATION_SENTINEL: f64 = -32768.0;
