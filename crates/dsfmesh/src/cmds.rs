//! The CMDS interpreter: a flat byte stream of stateful drawing commands.
//!
//! The stream is decoded into a `Vec<Command>` of tagged variants so the
//! editor can rewrite the terrain-patch parts while passing objects,
//! polygons, and road networks through untouched. `build_patches` then
//! interprets the state machine (current pool / definition / patch flags)
//! and expands every triangle opcode family into explicit per-vertex pool
//! references, which is the form the mesh editor works on.
//!
//! Commands reference vertices by (pool, index); all geometry stays
//! quantized until a pool resolves it.

use crate::bytes::{DataReader, DataWriter};
use crate::error::DsfResult;
use log::{debug, error, trace, warn};

/// Triangles per cross-pool opcode: 255 vertex references, the u8 count max
/// rounded down to a whole number of triangles.
pub const TRIANGLES_PER_COMMAND: usize = 85;

/// A fully qualified vertex reference: pool index and point index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexRef {
    pub pool: u16,
    pub index: u16,
}

impl VertexRef {
    pub fn new(pool: u16, index: u16) -> VertexRef {
        VertexRef { pool, index }
    }
}

/// One decoded command. Width-variant opcodes (SetDefinition 8/16/32, the
/// three comment lengths) collapse into a single variant; the encoder picks
/// the narrowest width that fits on the way back out.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PoolSelect(u16),
    JunctionOffsetSelect(u32),
    SetDefinition(u32),
    SetRoadSubtype(u8),
    Object(u16),
    ObjectRange { first: u16, last: u16 },
    NetworkChain(Vec<u16>),
    NetworkChainRange { first: u16, last: u16 },
    NetworkChain32(Vec<u32>),
    Polygon { parameter: u16, indices: Vec<u16> },
    PolygonRange { parameter: u16, first: u16, last: u16 },
    NestedPolygon { parameter: u16, windings: Vec<Vec<u16>> },
    /// `boundaries` holds the winding start indices plus one past the end,
    /// i.e. winding w spans `boundaries[w]..boundaries[w + 1]`.
    NestedPolygonRange { parameter: u16, boundaries: Vec<u16> },
    TerrainPatch,
    TerrainPatchFlags { flags: u8 },
    TerrainPatchFlagsLod { flags: u8, near: f32, far: f32 },
    Triangle(Vec<u16>),
    TriangleCrossPool(Vec<VertexRef>),
    TriangleRange { first: u16, last: u16 },
    TriangleStrip(Vec<u16>),
    TriangleStripCrossPool(Vec<VertexRef>),
    TriangleStripRange { first: u16, last: u16 },
    TriangleFan(Vec<u16>),
    TriangleFanCrossPool(Vec<VertexRef>),
    TriangleFanRange { first: u16, last: u16 },
    Comment(Vec<u8>),
}

/// One terrain patch after state-machine expansion: its definition-table
/// index, flag bits (1 = physical, 2 = overlay), LOD range, and explicit
/// triangle list.
#[derive(Debug, Clone)]
pub struct Patch {
    pub definition: u32,
    pub flags: u8,
    pub lod_near: f32,
    pub lod_far: f32,
    pub triangles: Vec<[VertexRef; 3]>,
}

/// Decodes a CMDS payload into commands.
///
/// An unrecognized opcode aborts decoding of the remainder with an error
/// log; commands decoded before it remain valid, so a file with a trailing
/// extension the codec does not know still loads. A stream that ends in the
/// middle of a command is corrupt and fails with a `Format` error.
pub fn decode_commands(data: &[u8]) -> DsfResult<Vec<Command>> {
    let mut reader = DataReader::new(data);
    let mut out = Vec::new();
    while !reader.done() {
        let opcode = reader.read_u8()?;
        match decode_one(opcode, &mut reader)? {
            Some(cmd) => out.push(cmd),
            None => {
                error!(
                    "Unsupported command opcode {} at stream offset {}; \
                     ignoring the rest of the command stream ({} bytes).",
                    opcode,
                    data.len() - reader.remaining() - 1,
                    reader.remaining()
                );
                break;
            }
        }
    }
    trace!("Decoded {} commands.", out.len());
    Ok(out)
}

fn read_refs(reader: &mut DataReader, count: usize) -> DsfResult<Vec<VertexRef>> {
    (0..count)
        .map(|_| {
            let pool = reader.read_u16()?;
            let index = reader.read_u16()?;
            Ok(VertexRef { pool, index })
        })
        .collect()
}

fn read_indices(reader: &mut DataReader, count: usize) -> DsfResult<Vec<u16>> {
    (0..count).map(|_| reader.read_u16()).collect()
}

fn read_bytes(reader: &mut DataReader, count: usize) -> DsfResult<Vec<u8>> {
    (0..count).map(|_| reader.read_u8()).collect()
}

fn decode_one(opcode: u8, reader: &mut DataReader) -> DsfResult<Option<Command>> {
    let cmd = match opcode {
        1 => Command::PoolSelect(reader.read_u16()?),
        2 => Command::JunctionOffsetSelect(reader.read_u32()?),
        3 => Command::SetDefinition(reader.read_u8()? as u32),
        4 => Command::SetDefinition(reader.read_u16()? as u32),
        5 => Command::SetDefinition(reader.read_u32()?),
        6 => Command::SetRoadSubtype(reader.read_u8()?),
        7 => Command::Object(reader.read_u16()?),
        8 => Command::ObjectRange {
            first: reader.read_u16()?,
            last: reader.read_u16()?,
        },
        9 => {
            let count = reader.read_u8()? as usize;
            Command::NetworkChain(read_indices(reader, count)?)
        }
        10 => Command::NetworkChainRange {
            first: reader.read_u16()?,
            last: reader.read_u16()?,
        },
        11 => {
            let count = reader.read_u8()? as usize;
            Command::NetworkChain32(
                (0..count)
                    .map(|_| reader.read_u32())
                    .collect::<DsfResult<Vec<_>>>()?,
            )
        }
        12 => {
            let parameter = reader.read_u16()?;
            let count = reader.read_u8()? as usize;
            Command::Polygon {
                parameter,
                indices: read_indices(reader, count)?,
            }
        }
        13 => Command::PolygonRange {
            parameter: reader.read_u16()?,
            first: reader.read_u16()?,
            last: reader.read_u16()?,
        },
        14 => {
            let parameter = reader.read_u16()?;
            let num_windings = reader.read_u8()? as usize;
            let windings = (0..num_windings)
                .map(|_| {
                    let count = reader.read_u8()? as usize;
                    read_indices(reader, count)
                })
                .collect::<DsfResult<Vec<_>>>()?;
            Command::NestedPolygon {
                parameter,
                windings,
            }
        }
        15 => {
            let parameter = reader.read_u16()?;
            let count = reader.read_u8()? as usize;
            Command::NestedPolygonRange {
                parameter,
                boundaries: read_indices(reader, count + 1)?,
            }
        }
        16 => Command::TerrainPatch,
        17 => Command::TerrainPatchFlags {
            flags: reader.read_u8()?,
        },
        18 => Command::TerrainPatchFlagsLod {
            flags: reader.read_u8()?,
            near: reader.read_f32()?,
            far: reader.read_f32()?,
        },
        23 => {
            let count = reader.read_u8()? as usize;
            Command::Triangle(read_indices(reader, count)?)
        }
        24 => {
            let count = reader.read_u8()? as usize;
            Command::TriangleCrossPool(read_refs(reader, count)?)
        }
        25 => Command::TriangleRange {
            first: reader.read_u16()?,
            last: reader.read_u16()?,
        },
        26 => {
            let count = reader.read_u8()? as usize;
            Command::TriangleStrip(read_indices(reader, count)?)
        }
        27 => {
            let count = reader.read_u8()? as usize;
            Command::TriangleStripCrossPool(read_refs(reader, count)?)
        }
        28 => Command::TriangleStripRange {
            first: reader.read_u16()?,
            last: reader.read_u16()?,
        },
        29 => {
            let count = reader.read_u8()? as usize;
            Command::TriangleFan(read_indices(reader, count)?)
        }
        30 => {
            let count = reader.read_u8()? as usize;
            Command::TriangleFanCrossPool(read_refs(reader, count)?)
        }
        31 => Command::TriangleFanRange {
            first: reader.read_u16()?,
            last: reader.read_u16()?,
        },
        32 => {
            let len = reader.read_u8()? as usize;
            Command::Comment(read_bytes(reader, len)?)
        }
        33 => {
            let len = reader.read_u16()? as usize;
            Command::Comment(read_bytes(reader, len)?)
        }
        34 => {
            let len = reader.read_u32()? as usize;
            Command::Comment(read_bytes(reader, len)?)
        }
        _ => return Ok(None),
    };
    Ok(Some(cmd))
}

/// Re-serializes a command list, the inverse of [`decode_commands`] up to
/// width selection on collapsed variants.
pub fn encode_commands(commands: &[Command]) -> Vec<u8> {
    let mut w = DataWriter::new();
    for cmd in commands {
        encode_one(cmd, &mut w);
    }
    w.into_bytes()
}

fn put_refs(w: &mut DataWriter, refs: &[VertexRef]) {
    w.put_u8(refs.len() as u8);
    for r in refs {
        w.put_u16(r.pool);
        w.put_u16(r.index);
    }
}

fn put_indices(w: &mut DataWriter, indices: &[u16]) {
    w.put_u8(indices.len() as u8);
    for &i in indices {
        w.put_u16(i);
    }
}

fn encode_one(cmd: &Command, w: &mut DataWriter) {
    match cmd {
        Command::PoolSelect(pool) => {
            w.put_u8(1);
            w.put_u16(*pool);
        }
        Command::JunctionOffsetSelect(offset) => {
            w.put_u8(2);
            w.put_u32(*offset);
        }
        Command::SetDefinition(def) => {
            if *def <= u8::MAX as u32 {
                w.put_u8(3);
                w.put_u8(*def as u8);
            } else if *def <= u16::MAX as u32 {
                w.put_u8(4);
                w.put_u16(*def as u16);
            } else {
                w.put_u8(5);
                w.put_u32(*def);
            }
        }
        Command::SetRoadSubtype(subtype) => {
            w.put_u8(6);
            w.put_u8(*subtype);
        }
        Command::Object(index) => {
            w.put_u8(7);
            w.put_u16(*index);
        }
        Command::ObjectRange { first, last } => {
            w.put_u8(8);
            w.put_u16(*first);
            w.put_u16(*last);
        }
        Command::NetworkChain(indices) => {
            w.put_u8(9);
            put_indices(w, indices);
        }
        Command::NetworkChainRange { first, last } => {
            w.put_u8(10);
            w.put_u16(*first);
            w.put_u16(*last);
        }
        Command::NetworkChain32(indices) => {
            w.put_u8(11);
            w.put_u8(indices.len() as u8);
            for &i in indices {
                w.put_u32(i);
            }
        }
        Command::Polygon { parameter, indices } => {
            w.put_u8(12);
            w.put_u16(*parameter);
            put_indices(w, indices);
        }
        Command::PolygonRange {
            parameter,
            first,
            last,
        } => {
            w.put_u8(13);
            w.put_u16(*parameter);
            w.put_u16(*first);
            w.put_u16(*last);
        }
        Command::NestedPolygon {
            parameter,
            windings,
        } => {
            w.put_u8(14);
            w.put_u16(*parameter);
            w.put_u8(windings.len() as u8);
            for winding in windings {
                put_indices(w, winding);
            }
        }
        Command::NestedPolygonRange {
            parameter,
            boundaries,
        } => {
            w.put_u8(15);
            w.put_u16(*parameter);
            w.put_u8((boundaries.len() - 1) as u8);
            for &b in boundaries {
                w.put_u16(b);
            }
        }
        Command::TerrainPatch => w.put_u8(16),
        Command::TerrainPatchFlags { flags } => {
            w.put_u8(17);
            w.put_u8(*flags);
        }
        Command::TerrainPatchFlagsLod { flags, near, far } => {
            w.put_u8(18);
            w.put_u8(*flags);
            w.put_f32(*near);
            w.put_f32(*far);
        }
        Command::Triangle(indices) => {
            w.put_u8(23);
            put_indices(w, indices);
        }
        Command::TriangleCrossPool(refs) => {
            w.put_u8(24);
            put_refs(w, refs);
        }
        Command::TriangleRange { first, last } => {
            w.put_u8(25);
            w.put_u16(*first);
            w.put_u16(*last);
        }
        Command::TriangleStrip(indices) => {
            w.put_u8(26);
            put_indices(w, indices);
        }
        Command::TriangleStripCrossPool(refs) => {
            w.put_u8(27);
            put_refs(w, refs);
        }
        Command::TriangleStripRange { first, last } => {
            w.put_u8(28);
            w.put_u16(*first);
            w.put_u16(*last);
        }
        Command::TriangleFan(indices) => {
            w.put_u8(29);
            put_indices(w, indices);
        }
        Command::TriangleFanCrossPool(refs) => {
            w.put_u8(30);
            put_refs(w, refs);
        }
        Command::TriangleFanRange { first, last } => {
            w.put_u8(31);
            w.put_u16(*first);
            w.put_u16(*last);
        }
        Command::Comment(bytes) => {
            if bytes.len() <= u8::MAX as usize {
                w.put_u8(32);
                w.put_u8(bytes.len() as u8);
            } else if bytes.len() <= u16::MAX as usize {
                w.put_u8(33);
                w.put_u16(bytes.len() as u16);
            } else {
                w.put_u8(34);
                w.put_u32(bytes.len() as u32);
            }
            w.put_bytes(bytes);
        }
    }
}

/// Runs the command state machine and expands every triangle opcode family
/// into explicit triangles, grouped per terrain patch.
///
/// Triangle commands outside an open patch are malformed; they are skipped
/// with a warning rather than failing the load.
pub fn build_patches(commands: &[Command]) -> Vec<Patch> {
    let mut patches: Vec<Patch> = Vec::new();
    let mut pool: u16 = 0;
    let mut definition: u32 = u32::MAX;
    let mut flags: u8 = 0xff;
    let mut lod_near: f32 = -1.0;
    let mut lod_far: f32 = -1.0;

    let push_tris =
        |patches: &mut Vec<Patch>, tris: &mut dyn Iterator<Item = [VertexRef; 3]>| match patches
            .last_mut()
        {
            Some(patch) => patch.triangles.extend(tris),
            None => warn!("Triangle command before any terrain patch command; skipped."),
        };

    for cmd in commands {
        match cmd {
            Command::PoolSelect(p) => pool = *p,
            Command::SetDefinition(d) => definition = *d,
            Command::TerrainPatch
            | Command::TerrainPatchFlags { .. }
            | Command::TerrainPatchFlagsLod { .. } => {
                match cmd {
                    Command::TerrainPatchFlags { flags: f } => flags = *f,
                    Command::TerrainPatchFlagsLod { flags: f, near, far } => {
                        flags = *f;
                        lod_near = *near;
                        lod_far = *far;
                    }
                    _ => {}
                }
                patches.push(Patch {
                    definition,
                    flags,
                    lod_near,
                    lod_far,
                    triangles: Vec::new(),
                });
            }
            Command::Triangle(indices) => {
                let refs: Vec<VertexRef> =
                    indices.iter().map(|&i| VertexRef::new(pool, i)).collect();
                push_tris(&mut patches, &mut list_triangles(&refs));
            }
            Command::TriangleCrossPool(refs) => {
                push_tris(&mut patches, &mut list_triangles(refs));
            }
            Command::TriangleRange { first, last } => {
                let refs: Vec<VertexRef> =
                    (*first..*last).map(|i| VertexRef::new(pool, i)).collect();
                push_tris(&mut patches, &mut list_triangles(&refs));
            }
            Command::TriangleStrip(indices) => {
                let refs: Vec<VertexRef> =
                    indices.iter().map(|&i| VertexRef::new(pool, i)).collect();
                push_tris(&mut patches, &mut strip_triangles(&refs));
            }
            Command::TriangleStripCrossPool(refs) => {
                push_tris(&mut patches, &mut strip_triangles(refs));
            }
            Command::TriangleStripRange { first, last } => {
                let refs: Vec<VertexRef> =
                    (*first..*last).map(|i| VertexRef::new(pool, i)).collect();
                push_tris(&mut patches, &mut strip_triangles(&refs));
            }
            Command::TriangleFan(indices) => {
                let refs: Vec<VertexRef> =
                    indices.iter().map(|&i| VertexRef::new(pool, i)).collect();
                push_tris(&mut patches, &mut fan_triangles(&refs));
            }
            Command::TriangleFanCrossPool(refs) => {
                push_tris(&mut patches, &mut fan_triangles(refs));
            }
            Command::TriangleFanRange { first, last } => {
                let refs: Vec<VertexRef> =
                    (*first..*last).map(|i| VertexRef::new(pool, i)).collect();
                push_tris(&mut patches, &mut fan_triangles(&refs));
            }
            // Objects, polygons, networks, comments: no effect on patches.
            _ => {}
        }
    }
    patches
}

fn list_triangles<'a>(refs: &'a [VertexRef]) -> impl Iterator<Item = [VertexRef; 3]> + 'a {
    refs.chunks_exact(3).map(|c| [c[0], c[1], c[2]])
}

/// Strip expansion: points 1,2,3,4,5 become triangles 123, 324, 345, ...
/// Every odd triangle swaps its first two references to keep all triangles
/// clockwise as seen from above.
fn strip_triangles<'a>(refs: &'a [VertexRef]) -> impl Iterator<Item = [VertexRef; 3]> + 'a {
    (0..refs.len().saturating_sub(2)).map(move |j| {
        if j % 2 == 0 {
            [refs[j], refs[j + 1], refs[j + 2]]
        } else {
            [refs[j + 1], refs[j], refs[j + 2]]
        }
    })
}

/// Fan expansion: points 1,2,3,4,5 become triangles 123, 134, 145, ...
fn fan_triangles<'a>(refs: &'a [VertexRef]) -> impl Iterator<Item = [VertexRef; 3]> + 'a {
    (0..refs.len().saturating_sub(2)).map(move |j| [refs[0], refs[j + 1], refs[j + 2]])
}

/// Packs an explicit triangle list into cross-pool triangle commands,
/// at most [`TRIANGLES_PER_COMMAND`] triangles per command.
pub fn encode_triangles(triangles: &[[VertexRef; 3]]) -> Vec<Command> {
    triangles
        .chunks(TRIANGLES_PER_COMMAND)
        .map(|chunk| {
            Command::TriangleCrossPool(chunk.iter().flat_map(|t| t.iter().copied()).collect())
        })
        .collect()
}

/// Rebuilds the full command stream after editing: each terrain patch
/// command is replaced by its patch's regenerated header and triangle
/// commands, original triangle commands are dropped, and everything else
/// passes through unchanged. `patches` must be in original patch order.
///
/// Regenerated triangles are all cross-pool, so they do not depend on the
/// pass-through PoolSelect state.
pub fn regenerate_stream(commands: &[Command], patches: &[Patch]) -> Vec<Command> {
    let mut out = Vec::with_capacity(commands.len());
    let mut next_patch = 0usize;
    for cmd in commands {
        match cmd {
            Command::TerrainPatch
            | Command::TerrainPatchFlags { .. }
            | Command::TerrainPatchFlagsLod { .. } => {
                let patch = &patches[next_patch];
                next_patch += 1;
                if patch.triangles.is_empty() {
                    debug!(
                        "Patch {} (definition {}) lost all triangles; dropped.",
                        next_patch - 1,
                        patch.definition
                    );
                    continue;
                }
                out.push(Command::SetDefinition(patch.definition));
                out.push(Command::TerrainPatchFlagsLod {
                    flags: patch.flags,
                    near: patch.lod_near,
                    far: patch.lod_far,
                });
                out.extend(encode_triangles(&patch.triangles));
            }
            Command::Triangle(_)
            | Command::TriangleCrossPool(_)
            | Command::TriangleRange { .. }
            | Command::TriangleStrip(_)
            | Command::TriangleStripCrossPool(_)
            | Command::TriangleStripRange { .. }
            | Command::TriangleFan(_)
            | Command::TriangleFanCrossPool(_)
            | Command::TriangleFanRange { .. } => {}
            other => out.push(other.clone()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(pool: u16, index: u16) -> VertexRef {
        VertexRef::new(pool, index)
    }

    #[test]
    fn decodes_state_and_patch_commands() {
        #[rustfmt::skip]
        let data: Vec<u8> = vec![
            3, 7,                   // SetDefinition8(7)
            1, 2, 0,                // PoolSelect(2)
            18, 1, 0, 0, 0, 0, 0, 0, 128, 63, // PatchFlagsLod(1, 0.0, 1.0)
            23, 3, 0, 0, 1, 0, 2, 0, // Triangle [0, 1, 2]
        ];
        let commands = decode_commands(&data).unwrap();
        assert_eq!(
            vec![
                Command::SetDefinition(7),
                Command::PoolSelect(2),
                Command::TerrainPatchFlagsLod {
                    flags: 1,
                    near: 0.0,
                    far: 1.0
                },
                Command::Triangle(vec![0, 1, 2]),
            ],
            commands
        );
    }

    #[test]
    fn unknown_opcode_keeps_prior_commands() {
        #[rustfmt::skip]
        let data: Vec<u8> = vec![
            3, 7,     // SetDefinition8(7)
            20, 1, 2, // opcode 20 is undefined
            3, 9,
        ];
        let commands = decode_commands(&data).unwrap();
        assert_eq!(vec![Command::SetDefinition(7)], commands);
    }

    #[test]
    fn truncated_command_is_a_format_error() {
        // A cross-pool triangle claiming 10 vertex references, then nothing.
        let data: Vec<u8> = vec![24, 10, 0, 0];
        let got = decode_commands(&data);
        assert!(matches!(got, Err(crate::error::DsfError::Format(_))));
    }

    #[test]
    fn round_trips_a_mixed_stream() {
        let commands = vec![
            Command::SetDefinition(300), // needs the 16-bit form
            Command::PoolSelect(1),
            Command::JunctionOffsetSelect(70_000),
            Command::SetRoadSubtype(3),
            Command::NetworkChain(vec![5, 6, 7]),
            Command::Object(12),
            Command::Polygon {
                parameter: 65535,
                indices: vec![1, 2, 3, 4],
            },
            Command::NestedPolygon {
                parameter: 0,
                windings: vec![vec![1, 2, 3], vec![4, 5, 6]],
            },
            Command::NestedPolygonRange {
                parameter: 9,
                boundaries: vec![0, 4, 8],
            },
            Command::TerrainPatch,
            Command::TriangleStrip(vec![0, 1, 2, 3]),
            Command::Comment(vec![1, 0, 2, 0, 0, 0]),
        ];
        assert_eq!(
            commands,
            decode_commands(&encode_commands(&commands)).unwrap()
        );
    }

    #[test]
    fn strips_alternate_winding() {
        let commands = vec![
            Command::SetDefinition(1),
            Command::PoolSelect(4),
            Command::TerrainPatch,
            Command::TriangleStrip(vec![0, 1, 2, 3, 4]),
        ];
        let patches = build_patches(&commands);
        assert_eq!(1, patches.len());
        assert_eq!(
            vec![
                [r(4, 0), r(4, 1), r(4, 2)],
                [r(4, 2), r(4, 1), r(4, 3)],
                [r(4, 2), r(4, 3), r(4, 4)],
            ],
            patches[0].triangles
        );
    }

    #[test]
    fn fans_pivot_on_the_first_vertex() {
        let commands = vec![
            Command::SetDefinition(1),
            Command::PoolSelect(0),
            Command::TerrainPatch,
            Command::TriangleFanRange { first: 10, last: 14 },
        ];
        let patches = build_patches(&commands);
        assert_eq!(
            vec![
                [r(0, 10), r(0, 11), r(0, 12)],
                [r(0, 10), r(0, 12), r(0, 13)],
            ],
            patches[0].triangles
        );
    }

    #[test]
    fn patch_state_carries_between_patches() {
        let commands = vec![
            Command::SetDefinition(5),
            Command::PoolSelect(0),
            Command::TerrainPatchFlagsLod {
                flags: 1,
                near: 0.0,
                far: 10_000.0,
            },
            Command::Triangle(vec![0, 1, 2]),
            // Bare TerrainPatch keeps the previous flags and LOD range.
            Command::TerrainPatch,
            Command::Triangle(vec![3, 4, 5]),
        ];
        let patches = build_patches(&commands);
        assert_eq!(2, patches.len());
        assert_eq!(patches[0].flags, patches[1].flags);
        assert_eq!(patches[0].lod_far, patches[1].lod_far);
        assert_eq!(5, patches[1].definition);
    }

    #[test]
    fn encode_triangles_chunks_at_85() {
        let tris: Vec<[VertexRef; 3]> = (0..200u16).map(|i| [r(0, i); 3]).collect();
        let commands = encode_triangles(&tris);
        assert_eq!(3, commands.len());
        match &commands[0] {
            Command::TriangleCrossPool(refs) => assert_eq!(255, refs.len()),
            other => panic!("unexpected command {:?}", other),
        }
        match &commands[2] {
            Command::TriangleCrossPool(refs) => assert_eq!(30 * 3, refs.len()),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn regenerate_replaces_patches_and_keeps_the_rest() {
        let commands = vec![
            Command::SetDefinition(2),
            Command::PoolSelect(0),
            Command::TerrainPatchFlagsLod {
                flags: 1,
                near: 0.0,
                far: 0.0,
            },
            Command::TriangleStrip(vec![0, 1, 2, 3]),
            Command::SetDefinition(9),
            Command::Object(4),
        ];
        let mut patches = build_patches(&commands);
        patches[0].triangles.truncate(1);
        let stream = regenerate_stream(&commands, &patches);
        assert_eq!(
            vec![
                Command::SetDefinition(2),
                Command::PoolSelect(0),
                Command::SetDefinition(2),
                Command::TerrainPatchFlagsLod {
                    flags: 1,
                    near: 0.0,
                    far: 0.0
                },
                Command::TriangleCrossPool(vec![r(0, 0), r(0, 1), r(0, 2)]),
                Command::SetDefinition(9),
                Command::Object(4),
            ],
            stream
        );
    }

    #[test]
    fn regenerate_drops_emptied_patches() {
        let commands = vec![
            Command::SetDefinition(2),
            Command::TerrainPatch,
            Command::Triangle(vec![0, 1, 2]),
        ];
        let mut patches = build_patches(&commands);
        patches[0].triangles.clear();
        let stream = regenerate_stream(&commands, &patches);
        assert_eq!(vec![Command::SetDefinition(2)], stream);
    }
}
