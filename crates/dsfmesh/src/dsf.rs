//! The whole-file model: reading a DSF tile into memory, and writing the
//! edited model back out.
//!
//! Files on disk may be raw or wrapped in a 7z archive with exactly one
//! member. The trailing MD5 digest is read and compared but a mismatch is
//! only logged, since third-party tools ship files with stale digests; a
//! fresh digest is always written.
//!
//! On write the atoms go out in the fixed order HEAD, DEFN, GEOD, DEMS,
//! CMDS, with POOL and SCAL interleaved per pool (then PO32/SC32), which is
//! the order X-Plane's own tools produce.

use crate::atoms::{self, AtomId, Properties, RawAtom, StringTable};
use crate::bytes::{DataReader, DataWriter};
use crate::cmds::{self, Command, Patch};
use crate::error::{DsfError, DsfResult};
use crate::geom::Bounds;
use crate::mesh::{self, MeshArea};
use crate::pool::{self, Pool};
use crate::raster::RasterLayer;
use log::{debug, info, warn};
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Callback for long-running reads and writes. `percent` runs 0..=100 and is
/// reported roughly every two percent.
pub trait Progress {
    fn report(&mut self, percent: usize);
}

/// The no-op progress sink.
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _percent: usize) {}
}

/// Rate-limits progress callbacks to two-percent steps.
struct Ticker<'a> {
    last: usize,
    sink: &'a mut dyn Progress,
}

impl<'a> Ticker<'a> {
    fn new(sink: &'a mut dyn Progress) -> Ticker<'a> {
        Ticker { last: 0, sink }
    }

    fn tick(&mut self, done: usize, total: usize) {
        let percent = done * 100 / total.max(1);
        if percent >= self.last + 2 || (percent == 100 && self.last != 100) {
            self.last = percent;
            self.sink.report(percent);
        }
    }
}

/// An entire DSF tile, decoded.
///
/// `patches` is the editable view of the terrain: `commands` keeps every
/// non-triangle command in stream order, and writing regenerates the
/// triangle commands from the patches.
pub struct Dsf {
    pub properties: Properties,
    pub terrain_defs: StringTable,
    pub object_defs: StringTable,
    pub polygon_defs: StringTable,
    pub network_defs: StringTable,

    /// 16-bit vertex pools, in file order; triangle references index these.
    pub pools: Vec<Pool>,
    /// 32-bit pools, used by road networks.
    pub pools32: Vec<Pool>,

    pub rasters: Vec<RasterLayer>,

    /// The full decoded command stream, original triangle commands included.
    pub commands: Vec<Command>,
    /// Terrain patches expanded from the stream, in patch-command order.
    pub patches: Vec<Patch>,
}

impl fmt::Display for Dsf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (w, s, e, n) = self.properties.bounds();
        writeln!(f, "DSF tile {}°..{}° E, {}°..{}° N", w, e, s, n)?;
        writeln!(
            f,
            "  definitions: {} terrain, {} object, {} polygon, {} network",
            self.terrain_defs.len(),
            self.object_defs.len(),
            self.polygon_defs.len(),
            self.network_defs.len()
        )?;
        let points: usize = self.pools.iter().map(|p| p.num_points()).sum();
        writeln!(
            f,
            "  geometry: {} pools ({} points), {} extended pools",
            self.pools.len(),
            points,
            self.pools32.len()
        )?;
        let triangles: usize = self.patches.iter().map(|p| p.triangles.len()).sum();
        writeln!(
            f,
            "  commands: {} ({} patches, {} triangles)",
            self.commands.len(),
            self.patches.len(),
            triangles
        )?;
        for raster in &self.rasters {
            writeln!(
                f,
                "  raster \"{}\": {}x{}",
                raster.name,
                raster.width(),
                raster.height()
            )?;
        }
        Ok(())
    }
}

impl Dsf {
    /// An empty tile with the given properties.
    pub fn new(properties: Properties) -> Dsf {
        Dsf {
            properties,
            terrain_defs: StringTable::default(),
            object_defs: StringTable::default(),
            polygon_defs: StringTable::default(),
            network_defs: StringTable::default(),
            pools: Vec::new(),
            pools32: Vec::new(),
            rasters: Vec::new(),
            commands: Vec::new(),
            patches: Vec::new(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> DsfResult<Dsf> {
        let raw = fs::read(&path)?;
        info!(
            "Read {} ({} bytes).",
            path.as_ref().display(),
            raw.len()
        );
        Dsf::from_bytes(&raw, &mut NoProgress)
    }

    /// Decodes a tile, decompressing the 7z wrapper if present.
    pub fn from_bytes(raw: &[u8], progress: &mut dyn Progress) -> DsfResult<Dsf> {
        let data = maybe_decompress(raw)?;
        let data = data.as_ref();
        if data.len() < 8 + 4 + 16 {
            return Err(DsfError::Format(format!(
                "{} bytes is too short for a DSF file",
                data.len()
            )));
        }
        if &data[..atoms::MAGIC.len()] != atoms::MAGIC {
            return Err(DsfError::Format("bad magic cookie".into()));
        }
        let version = DataReader::new(&data[8..12]).read_u32()?;
        if version != atoms::VERSION {
            return Err(DsfError::Format(format!(
                "unsupported DSF version {}",
                version
            )));
        }
        check_digest(data);

        let root_start = 8 + 4;
        let root_end = data.len() - 16;
        let mut ticker = Ticker::new(progress);

        let mut properties: Option<Properties> = None;
        let mut terrain_defs = StringTable::default();
        let mut object_defs = StringTable::default();
        let mut polygon_defs = StringTable::default();
        let mut network_defs = StringTable::default();
        let mut raster_names = StringTable::default();
        let mut pools: Vec<Pool> = Vec::new();
        let mut pools32: Vec<Pool> = Vec::new();
        let mut rasters: Vec<RasterLayer> = Vec::new();
        let mut commands: Vec<Command> = Vec::new();

        for root in frame(data, root_start, root_end)? {
            match root.id {
                AtomId::Head => {
                    for child in frame(data, root.start, root.end)? {
                        if child.id == AtomId::Prop {
                            let table = StringTable::decode(payload(data, child))?;
                            properties = Some(Properties::new(table)?);
                        }
                    }
                }
                AtomId::Defn => {
                    for child in frame(data, root.start, root.end)? {
                        let table = StringTable::decode(payload(data, child))?;
                        match child.id {
                            AtomId::Tert => terrain_defs = table,
                            AtomId::Objt => object_defs = table,
                            AtomId::Poly => polygon_defs = table,
                            AtomId::Netw => network_defs = table,
                            AtomId::Demn => raster_names = table,
                            other => {
                                warn!("Unexpected atom {:?} inside DEFN; ignored.", other)
                            }
                        }
                    }
                }
                AtomId::Geod => {
                    let children = frame(data, root.start, root.end)?;
                    pools = decode_pools::<u16>(
                        data,
                        &children,
                        AtomId::Pool,
                        AtomId::Scal,
                        root_end,
                        &mut ticker,
                    )?;
                    pools32 = decode_pools::<u32>(
                        data,
                        &children,
                        AtomId::Po32,
                        AtomId::Sc32,
                        root_end,
                        &mut ticker,
                    )?;
                }
                AtomId::Dems => {
                    let children = frame(data, root.start, root.end)?;
                    let infos: Vec<RawAtom> = by_id(&children, AtomId::Demi);
                    let grids: Vec<RawAtom> = by_id(&children, AtomId::Demd);
                    if infos.len() != grids.len() {
                        return Err(DsfError::Format(format!(
                            "{} DEMI atoms but {} DEMD atoms",
                            infos.len(),
                            grids.len()
                        )));
                    }
                    for (info, grid) in infos.iter().zip(&grids) {
                        rasters.push(RasterLayer::decode(
                            payload(data, *info),
                            payload(data, *grid).to_vec(),
                        )?);
                    }
                }
                AtomId::Cmds => {
                    commands = cmds::decode_commands(payload(data, root))?;
                }
                other => warn!("Unexpected root atom {:?}; ignored.", other),
            }
            ticker.tick(root.end, root_end);
        }

        let properties = properties
            .ok_or_else(|| DsfError::Format("file has no HEAD/PROP atom".into()))?;

        if raster_names.len() != rasters.len() {
            warn!(
                "{} raster names for {} raster layers; names unassigned.",
                raster_names.len(),
                rasters.len()
            );
        } else {
            for (raster, name) in rasters.iter_mut().zip(raster_names.iter()) {
                raster.name = name.clone();
            }
        }

        let patches = cmds::build_patches(&commands);
        debug!(
            "Decoded {} pools, {} commands, {} patches, {} rasters.",
            pools.len(),
            commands.len(),
            patches.len(),
            rasters.len()
        );
        Ok(Dsf {
            properties,
            terrain_defs,
            object_defs,
            polygon_defs,
            network_defs,
            pools,
            pools32,
            rasters,
            commands,
            patches,
        })
    }

    /// Serializes the tile, regenerating patch triangle commands and the
    /// trailing digest.
    pub fn to_bytes(&self, progress: &mut dyn Progress) -> Vec<u8> {
        let commands = cmds::regenerate_stream(&self.commands, &self.patches);
        let mut ticker = Ticker::new(progress);
        let total = self.pools.len() + self.pools32.len() + 1;
        let mut done = 0usize;

        let mut w = DataWriter::new();
        w.put_bytes(atoms::MAGIC);
        w.put_u32(atoms::VERSION);

        let mut head = DataWriter::new();
        atoms::put_atom(&mut head, AtomId::Prop, &self.properties.encode());
        atoms::put_atom(&mut w, AtomId::Head, &head.into_bytes());

        let mut defn = DataWriter::new();
        atoms::put_atom(&mut defn, AtomId::Tert, &self.terrain_defs.encode());
        atoms::put_atom(&mut defn, AtomId::Objt, &self.object_defs.encode());
        atoms::put_atom(&mut defn, AtomId::Poly, &self.polygon_defs.encode());
        atoms::put_atom(&mut defn, AtomId::Netw, &self.network_defs.encode());
        if !self.rasters.is_empty() {
            let mut names = StringTable::default();
            for raster in &self.rasters {
                names.push(&raster.name);
            }
            atoms::put_atom(&mut defn, AtomId::Demn, &names.encode());
        }
        atoms::put_atom(&mut w, AtomId::Defn, &defn.into_bytes());

        let mut geod = DataWriter::new();
        for pool in &self.pools {
            atoms::put_atom(&mut geod, AtomId::Pool, &pool.encode::<u16>());
            atoms::put_atom(&mut geod, AtomId::Scal, &pool.encode_scalings());
            done += 1;
            ticker.tick(done, total);
        }
        for pool in &self.pools32 {
            atoms::put_atom(&mut geod, AtomId::Po32, &pool.encode::<u32>());
            atoms::put_atom(&mut geod, AtomId::Sc32, &pool.encode_scalings());
            done += 1;
            ticker.tick(done, total);
        }
        atoms::put_atom(&mut w, AtomId::Geod, &geod.into_bytes());

        if !self.rasters.is_empty() {
            let mut dems = DataWriter::new();
            for raster in &self.rasters {
                atoms::put_atom(&mut dems, AtomId::Demi, &raster.encode_info());
                atoms::put_atom(&mut dems, AtomId::Demd, raster.samples());
            }
            atoms::put_atom(&mut w, AtomId::Dems, &dems.into_bytes());
        }

        atoms::put_atom(&mut w, AtomId::Cmds, &cmds::encode_commands(&commands));

        let mut bytes = w.into_bytes();
        let digest = md5::compute(&bytes);
        bytes.extend_from_slice(&digest.0);
        ticker.tick(total, total);
        bytes
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> DsfResult<()> {
        let bytes = self.to_bytes(&mut NoProgress);
        fs::write(&path, &bytes)?;
        info!(
            "Wrote {} ({} bytes).",
            path.as_ref().display(),
            bytes.len()
        );
        Ok(())
    }

    /// Pulls every patch triangle touching `bounds` into a working area.
    pub fn extract_mesh_area(&mut self, bounds: Bounds) -> MeshArea {
        mesh::extract_area(&mut self.patches, &self.pools, bounds)
    }

    /// Returns an edited working area's triangles to their patches.
    pub fn insert_mesh_area(&mut self, area: &MeshArea) {
        mesh::insert_area(&mut self.patches, area);
    }

    pub fn raster(&self, name: &str) -> Option<&RasterLayer> {
        self.rasters.iter().find(|r| r.name == name)
    }

    pub fn raster_mut(&mut self, name: &str) -> Option<&mut RasterLayer> {
        self.rasters.iter_mut().find(|r| r.name == name)
    }
}

/// Strips the optional 7z wrapper. Exactly one archive member is required.
fn maybe_decompress(raw: &[u8]) -> DsfResult<Cow<'_, [u8]>> {
    if raw.len() < 2 || &raw[0..2] != b"7z" {
        return Ok(Cow::Borrowed(raw));
    }
    let mut source = Cursor::new(raw);
    let files = compress_tools::list_archive_files(&mut source)
        .map_err(|e| DsfError::Archive(e.to_string()))?;
    if files.len() != 1 {
        return Err(DsfError::Archive(format!(
            "expected exactly one archive member, found {:?}",
            files
        )));
    }
    source.set_position(0);
    let mut data = Vec::new();
    compress_tools::uncompress_archive_file(&mut source, &mut data, &files[0])
        .map_err(|e| DsfError::Archive(e.to_string()))?;
    debug!(
        "Decompressed {} archive bytes into {}.",
        raw.len(),
        data.len()
    );
    Ok(Cow::Owned(data))
}

/// Compares the trailing digest against the content. Stale digests are
/// common in the wild, so a mismatch only logs.
fn check_digest(data: &[u8]) {
    let body = data.len() - 16;
    let digest = md5::compute(&data[..body]);
    if digest.0 != data[body..] {
        debug!(
            "Digest mismatch: computed {:x}, file carries {:x?}.",
            digest,
            &data[body..]
        );
    }
}

fn frame(data: &[u8], start: usize, end: usize) -> DsfResult<Vec<RawAtom>> {
    atoms::frame_atoms(data, start, end)
}

fn payload(data: &[u8], atom: RawAtom) -> &[u8] {
    &data[atom.start..atom.end]
}

fn by_id(children: &[RawAtom], id: AtomId) -> Vec<RawAtom> {
    children.iter().copied().filter(|a| a.id == id).collect()
}

/// Pairs pool atoms with scaling atoms by ordinal and decodes them.
fn decode_pools<T: pool::PoolScalar>(
    data: &[u8],
    children: &[RawAtom],
    pool_id: AtomId,
    scaling_id: AtomId,
    total: usize,
    ticker: &mut Ticker,
) -> DsfResult<Vec<Pool>> {
    let pool_atoms = by_id(children, pool_id);
    let scaling_atoms = by_id(children, scaling_id);
    if pool_atoms.len() != scaling_atoms.len() {
        return Err(DsfError::Format(format!(
            "{} {:?} atoms but {} {:?} atoms",
            pool_atoms.len(),
            pool_id,
            scaling_atoms.len(),
            scaling_id
        )));
    }
    let mut pools = Vec::with_capacity(pool_atoms.len());
    for (p, s) in pool_atoms.iter().zip(&scaling_atoms) {
        let planes = pool::decode_scalings(payload(data, *s))?;
        let mut reader = DataReader::new(payload(data, *p));
        pools.push(Pool::decode::<T>(&mut reader, planes)?);
        ticker.tick(p.end, total);
    }
    Ok(pools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmds::VertexRef;
    use crate::pool::Scaling;
    use crate::raster::SampleFormat;

    fn test_properties() -> Properties {
        let mut table = StringTable::default();
        for (k, v) in [
            ("sim/west", "-123"),
            ("sim/east", "-122"),
            ("sim/south", "37"),
            ("sim/north", "38"),
        ] {
            table.push(k);
            table.push(v);
        }
        Properties::new(table).unwrap()
    }

    fn test_dsf() -> Dsf {
        let mut dsf = Dsf::new(test_properties());
        dsf.terrain_defs.push("terrain_Water");
        dsf.terrain_defs.push("lib/g10/terrain10/apt_tmp_dry.ter");

        let planes = vec![
            Scaling::new(1.0, -123.0),
            Scaling::new(1.0, 37.0),
            Scaling::new(1000.0, 0.0),
        ];
        let mut pool = Pool::new(planes, false);
        pool.push(&[-122.5, 37.5, 120.0]);
        pool.push(&[-122.4, 37.5, 121.0]);
        pool.push(&[-122.5, 37.6, 119.0]);
        pool.push(&[-122.4, 37.6, 122.0]);
        dsf.pools.push(pool);

        dsf.commands = vec![
            Command::SetDefinition(1),
            Command::PoolSelect(0),
            Command::TerrainPatchFlagsLod {
                flags: 1,
                near: 0.0,
                far: -1.0,
            },
            Command::TriangleStrip(vec![0, 1, 2, 3]),
            Command::Comment(vec![42]),
        ];
        dsf.patches = cmds::build_patches(&dsf.commands);

        let mut raster =
            RasterLayer::new("elevation", SampleFormat::Signed, 2, 3, 3, 1.0, 0.0);
        raster.set(1, 1, 135.0);
        dsf.rasters.push(raster);
        dsf
    }

    #[test]
    fn round_trip_preserves_the_tile() {
        let original = test_dsf();
        let bytes = original.to_bytes(&mut NoProgress);
        let parsed = Dsf::from_bytes(&bytes, &mut NoProgress).unwrap();

        assert_eq!((-123, 37, -122, 38), parsed.properties.bounds());
        assert_eq!(2, parsed.terrain_defs.len());
        assert_eq!("terrain_Water", parsed.terrain_defs.get(0));

        assert_eq!(1, parsed.pools.len());
        assert_eq!(4, parsed.pools[0].num_points());
        let p1 = parsed.pools[0].point(1);
        assert!((p1[0] - -122.4).abs() < 1e-4);
        assert!((p1[2] - 121.0).abs() < 0.1);

        // The strip became explicit cross-pool triangles; the comment and
        // state commands survived.
        assert_eq!(1, parsed.patches.len());
        assert_eq!(2, parsed.patches[0].triangles.len());
        assert_eq!(
            [
                VertexRef::new(0, 0),
                VertexRef::new(0, 1),
                VertexRef::new(0, 2)
            ],
            parsed.patches[0].triangles[0]
        );
        assert!(parsed
            .commands
            .iter()
            .any(|c| matches!(c, Command::Comment(bytes) if bytes == &vec![42])));

        assert_eq!(1, parsed.rasters.len());
        assert_eq!("elevation", parsed.rasters[0].name);
        assert_eq!(135.0, parsed.rasters[0].get(1, 1));
    }

    #[test]
    fn written_digest_is_valid() {
        let bytes = test_dsf().to_bytes(&mut NoProgress);
        let body = bytes.len() - 16;
        assert_eq!(md5::compute(&bytes[..body]).0, bytes[body..]);
    }

    #[test]
    fn stale_digest_still_parses() {
        let mut bytes = test_dsf().to_bytes(&mut NoProgress);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(Dsf::from_bytes(&bytes, &mut NoProgress).is_ok());
    }

    #[test]
    fn bad_magic_is_a_format_error() {
        let mut bytes = test_dsf().to_bytes(&mut NoProgress);
        bytes[0] = b'Y';
        assert!(matches!(
            Dsf::from_bytes(&bytes, &mut NoProgress),
            Err(DsfError::Format(_))
        ));
    }

    #[test]
    fn unpaired_pool_is_a_format_error() {
        let mut w = DataWriter::new();
        w.put_bytes(atoms::MAGIC);
        w.put_u32(atoms::VERSION);
        let mut head = DataWriter::new();
        atoms::put_atom(&mut head, AtomId::Prop, &test_properties().encode());
        atoms::put_atom(&mut w, AtomId::Head, &head.into_bytes());
        let mut geod = DataWriter::new();
        let pool = Pool::new(vec![Scaling::new(0.0, 0.0)], false);
        atoms::put_atom(&mut geod, AtomId::Pool, &pool.encode::<u16>());
        // No SCAL for it.
        atoms::put_atom(&mut w, AtomId::Geod, &geod.into_bytes());
        let mut bytes = w.into_bytes();
        let digest = md5::compute(&bytes);
        bytes.extend_from_slice(&digest.0);

        assert!(matches!(
            Dsf::from_bytes(&bytes, &mut NoProgress),
            Err(DsfError::Format(_))
        ));
    }

    #[test]
    fn progress_reaches_one_hundred() {
        struct Last(usize);
        impl Progress for Last {
            fn report(&mut self, percent: usize) {
                self.0 = percent;
            }
        }
        let mut last = Last(0);
        test_dsf().to_bytes(&mut last);
        assert_eq!(100, last.0);
    }
}
