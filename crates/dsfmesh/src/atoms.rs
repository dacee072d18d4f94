//! Atom container framing: tags, the atom iterator, string tables, and the
//! PROP properties atom.
//!
//! A DSF file is `XPLNEDSF` + a little-endian u32 version, a sequence of
//! atoms, and a trailing 16-byte digest. Each atom is a 4-byte tag plus a
//! little-endian u32 total length that includes the 8-byte atom header.
//! Container atoms nest child atoms in their payload; leaf atoms hold raw
//! data. POOL/SCAL, PO32/SC32 and DEMI/DEMD are "multi" atoms that repeat,
//! one pair per pool or raster layer.

use crate::bytes::{DataReader, DataWriter};
use crate::error::{DsfError, DsfResult};
use itertools::Itertools;
use log::{info, warn};
use std::fmt;

pub const MAGIC: &[u8; 8] = b"XPLNEDSF";
pub const VERSION: u32 = 1;

/// The known atom tags. The numeric values are the little-endian u32 read
/// straight off the file, so e.g. `HEAD` appears on disk as `DAEH`.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum AtomId {
    /// Header container; holds PROP.
    Head = 0x48454144,
    /// Definitions container; holds the five string tables below.
    Defn = 0x4445464e,
    /// Geodata container; holds the POOL/SCAL and PO32/SC32 multi-atoms.
    Geod = 0x47454f44,
    /// The flat command stream instantiating all geometry.
    Cmds = 0x434d4453,
    /// Raster container; holds DEMI/DEMD pairs.
    Dems = 0x44454d53,

    /// Properties string table (key/value pairs) inside HEAD.
    Prop = 0x50524f50,

    /// Terrain-definition file table.
    Tert = 0x54455254,
    /// Object-definition file table.
    Objt = 0x4f424a54,
    /// Polygon-definition file table.
    Poly = 0x504f4c59,
    /// Network-definition file table.
    Netw = 0x4e455457,
    /// Raster layer name table.
    Demn = 0x44454d4e,

    /// 16-bit quantized vertex pool (repeats, one per pool).
    Pool = 0x504f4f4c,
    /// Scaling table for the POOL with the same ordinal.
    Scal = 0x5343414c,
    /// 32-bit quantized vertex pool, used by road networks.
    Po32 = 0x504f3332,
    /// Scaling table for the PO32 with the same ordinal.
    Sc32 = 0x53433332,

    /// Raster layer header record.
    Demi = 0x44454d49,
    /// Raster layer sample grid.
    Demd = 0x44454d44,
}

impl AtomId {
    pub fn from_u32(value: u32) -> Option<AtomId> {
        use AtomId::*;
        match value {
            0x48454144 => Some(Head),
            0x4445464e => Some(Defn),
            0x47454f44 => Some(Geod),
            0x434d4453 => Some(Cmds),
            0x44454d53 => Some(Dems),
            0x50524f50 => Some(Prop),
            0x54455254 => Some(Tert),
            0x4f424a54 => Some(Objt),
            0x504f4c59 => Some(Poly),
            0x4e455457 => Some(Netw),
            0x44454d4e => Some(Demn),
            0x504f4f4c => Some(Pool),
            0x5343414c => Some(Scal),
            0x504f3332 => Some(Po32),
            0x53433332 => Some(Sc32),
            0x44454d49 => Some(Demi),
            0x44454d44 => Some(Demd),
            _ => None,
        }
    }
}

/// Formats an atom tag value as its four ASCII characters for log messages.
pub fn tag_name(value: u32) -> String {
    let b = value.to_be_bytes();
    b.iter()
        .map(|&c| {
            if c.is_ascii_graphic() {
                c as char
            } else {
                '?'
            }
        })
        .collect()
}

/// One atom found while framing: its tag, and the byte range of its payload
/// (the tag/length header excluded) within the enclosing buffer.
#[derive(Debug, Clone, Copy)]
pub struct RawAtom {
    pub id: AtomId,
    pub start: usize,
    pub end: usize,
}

/// Frames the atoms in `data[start..end]`.
///
/// Truncated or inside-out lengths are a `Format` error; unknown tags are
/// skipped with a warning and do not appear in the result.
pub fn frame_atoms(data: &[u8], start: usize, end: usize) -> DsfResult<Vec<RawAtom>> {
    assert!(end <= data.len());
    let mut result = Vec::new();
    let mut pos = start;
    while pos < end {
        if end - pos < 8 {
            return Err(DsfError::Format(format!(
                "truncated atom header at byte {}",
                pos
            )));
        }
        let mut r = DataReader::new(&data[pos..pos + 8]);
        let tag = r.read_u32()?;
        let len = r.read_u32()? as usize;
        if len < 8 || pos + len > end {
            return Err(DsfError::Format(format!(
                "atom {} at byte {} has impossible length {}",
                tag_name(tag),
                pos,
                len
            )));
        }
        match AtomId::from_u32(tag) {
            Some(id) => result.push(RawAtom {
                id,
                start: pos + 8,
                end: pos + len,
            }),
            None => warn!(
                "Skipping unknown atom {} ({} bytes) at byte {}.",
                tag_name(tag),
                len,
                pos
            ),
        }
        pos += len;
    }
    Ok(result)
}

/// Appends one atom (header + payload) to the writer.
pub fn put_atom(w: &mut DataWriter, id: AtomId, payload: &[u8]) {
    w.put_u32(id as u32);
    w.put_u32((payload.len() + 8) as u32);
    w.put_bytes(payload);
}

/// A DSF string table: strings identified by zero-based index, stored as
/// NUL-terminated UTF-8.
#[derive(Debug, Default, Clone)]
pub struct StringTable {
    strings: Vec<String>,
}

impl fmt::Display for StringTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "String table with {} entries:", self.len())?;
        for (i, s) in self.strings.iter().enumerate() {
            writeln!(f, "  {}: {}", i, s)?;
        }
        Ok(())
    }
}

impl StringTable {
    /// Parses a string-table payload. Requires UTF-8-clean content.
    pub fn decode(data: &[u8]) -> DsfResult<StringTable> {
        let mut table = StringTable::default();
        for chunk in data.split(|&b| b == 0) {
            if chunk.is_empty() {
                continue;
            }
            let s = std::str::from_utf8(chunk)
                .map_err(|e| DsfError::Format(format!("non-UTF-8 string table entry: {}", e)))?;
            table.push(s);
        }
        Ok(table)
    }

    /// Serializes the table back to its atom payload form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for s in &self.strings {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn get(&self, i: usize) -> &str {
        &self.strings[i]
    }

    pub fn push(&mut self, s: &str) {
        self.strings.push(String::from(s));
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.strings.iter()
    }
}

/// The PROP atom: file-level metadata as ordered key/value string pairs.
///
/// The geographic bounds (`sim/west` etc.) are required and validated; all
/// other pairs are carried through untouched so provenance and private tags
/// round-trip.
#[derive(Debug, Default, Clone)]
pub struct Properties {
    table: StringTable,

    /// Cached (west, south, east, north) in whole degrees.
    bounds: (i32, i32, i32, i32),

    /// Whether `sim/overlay` was present and set to 1.
    is_overlay: bool,
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Properties:")?;
        for (k, v) in self.pairs() {
            writeln!(f, "  {}: {}", k, v)?;
        }
        Ok(())
    }
}

impl Properties {
    pub fn new(table: StringTable) -> DsfResult<Properties> {
        if table.len() % 2 == 1 {
            return Err(DsfError::Format(
                "properties atom has an odd number of strings".into(),
            ));
        }
        let mut bounds = (-1000, -1000, -1000, -1000);
        let mut is_overlay = false;
        for (key, value) in table.strings.iter().tuples::<(_, _)>() {
            let parse = |v: &str| -> DsfResult<i32> {
                v.parse()
                    .map_err(|_| DsfError::Format(format!("bad value for {}: {}", key, v)))
            };
            match key.as_str() {
                "sim/west" => bounds.0 = parse(value)?,
                "sim/south" => bounds.1 = parse(value)?,
                "sim/east" => bounds.2 = parse(value)?,
                "sim/north" => bounds.3 = parse(value)?,
                "sim/overlay" => is_overlay = value == "1",
                "sim/creation_agent" => info!("DSF creation agent: {}", value),
                _ => {}
            }
        }
        let (w, s, e, n) = bounds;
        if !(-180..=180).contains(&w)
            || !(-90..=90).contains(&s)
            || !(-180..=180).contains(&e)
            || !(-90..=90).contains(&n)
        {
            return Err(DsfError::Format(format!(
                "invalid geographic bounds {:?}",
                bounds
            )));
        }
        Ok(Properties {
            table,
            bounds,
            is_overlay,
        })
    }

    /// (west, south, east, north) in whole degrees.
    pub fn bounds(&self) -> (i32, i32, i32, i32) {
        self.bounds
    }

    pub fn is_overlay(&self) -> bool {
        self.is_overlay
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replaces the value for `key`, or appends the pair if absent.
    pub fn set(&mut self, key: &str, value: &str) {
        for i in (0..self.table.strings.len()).step_by(2) {
            if self.table.strings[i] == key {
                self.table.strings[i + 1] = String::from(value);
                return;
            }
        }
        self.table.push(key);
        self.table.push(value);
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&String, &String)> {
        self.table.strings.iter().tuples::<(_, _)>()
    }

    pub fn encode(&self) -> Vec<u8> {
        self.table.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom_bytes(id: AtomId, payload: &[u8]) -> Vec<u8> {
        let mut w = DataWriter::new();
        put_atom(&mut w, id, payload);
        w.into_bytes()
    }

    #[test]
    fn frames_known_atoms() {
        let mut data = atom_bytes(AtomId::Cmds, &[1, 2, 3]);
        data.extend(atom_bytes(AtomId::Geod, &[]));
        let atoms = frame_atoms(&data, 0, data.len()).unwrap();
        assert_eq!(2, atoms.len());
        assert_eq!(AtomId::Cmds, atoms[0].id);
        assert_eq!((8, 11), (atoms[0].start, atoms[0].end));
        assert_eq!(AtomId::Geod, atoms[1].id);
    }

    #[test]
    fn skips_unknown_atom() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x58585858u32.to_le_bytes()); // "XXXX"
        data.extend_from_slice(&12u32.to_le_bytes());
        data.extend_from_slice(&[0; 4]);
        data.extend(atom_bytes(AtomId::Cmds, &[]));
        let atoms = frame_atoms(&data, 0, data.len()).unwrap();
        assert_eq!(1, atoms.len());
        assert_eq!(AtomId::Cmds, atoms[0].id);
    }

    #[test]
    fn truncated_atom_is_a_format_error() {
        let data = atom_bytes(AtomId::Cmds, &[0; 16]);
        let err = frame_atoms(&data, 0, data.len() - 4).unwrap_err();
        assert!(matches!(err, DsfError::Format(_)));
    }

    #[test]
    fn string_table_round_trip() {
        let mut t = StringTable::default();
        t.push("lib/g10/terrain10/fruit_tmprn_rain.ter");
        t.push("terrain_Water");
        let decoded = StringTable::decode(&t.encode()).unwrap();
        assert_eq!(2, decoded.len());
        assert_eq!("terrain_Water", decoded.get(1));
    }

    #[test]
    fn properties_bounds_and_set() {
        let mut t = StringTable::default();
        for (k, v) in [
            ("sim/west", "-123"),
            ("sim/east", "-122"),
            ("sim/south", "37"),
            ("sim/north", "38"),
            ("sim/planet", "earth"),
        ] {
            t.push(k);
            t.push(v);
        }
        let mut props = Properties::new(t).unwrap();
        assert_eq!((-123, 37, -122, 38), props.bounds());
        assert!(!props.is_overlay());
        props.set("sim/creation_agent", "dsfmesh");
        assert_eq!(Some("dsfmesh"), props.get("sim/creation_agent"));

        let reparsed = Properties::new(StringTable::decode(&props.encode()).unwrap()).unwrap();
        assert_eq!(Some("earth"), reparsed.get("sim/planet"));
    }

    #[test]
    fn properties_reject_odd_table() {
        let mut t = StringTable::default();
        t.push("sim/west");
        assert!(matches!(
            Properties::new(t),
            Err(DsfError::Format(_))
        ));
    }
}
