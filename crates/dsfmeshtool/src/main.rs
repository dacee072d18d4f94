use clap::{arg, command, Command};
use dsfmesh::geom::Point;
use dsfmesh::{apply_commands, Dsf, EditCommand, EditConfig};
use std::error::Error;
use std::fmt::Write as _;

fn main() -> Result<(), Box<dyn Error>> {
    let matches = command!()
        .propagate_version(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(arg!(-v --verbose ... "Increases verbosity by one level (can be repeated)"))
        .arg(
            arg!(--vmodule <FILTER> "sets the env_logger filter to the given string: \
                                     default,module::path=level,... \
                                     {trace,debug,info,warn,error,none}")
            .required(false),
        )
        .subcommand(Command::new("version").about("Print version information"))
        .subcommand(
            Command::new("info")
                .about("prints a summary of a dsf terrain file")
                .arg(arg!(-a --all "If set, prints the definition tables and properties too."))
                .arg(arg!([PATH]).required(true).allow_invalid_utf8(true)),
        )
        .subcommand(
            Command::new("text")
                .about("dumps the mesh of a dsf file as text")
                .arg(arg!([INPUT]).required(true).allow_invalid_utf8(true))
                .arg(arg!([OUTPUT]).required(false).allow_invalid_utf8(true)),
        )
        .subcommand(
            Command::new("flatten")
                .about("flattens a polygonal area of the mesh to one elevation")
                .arg(arg!(--polygon <RING> "the area to flatten, as \"lon,lat lon,lat ...\""))
                .arg(
                    arg!(--elevation <METERS> "the elevation to flatten to")
                        .required(false),
                )
                .arg(arg!(--"drop-inner" "If set, removes the interior instead of flattening it."))
                .arg(arg!([INPUT]).required(true).allow_invalid_utf8(true))
                .arg(arg!([OUTPUT]).required(true).allow_invalid_utf8(true)),
        )
        .get_matches();

    // Logging stuff: keep above everything but the cmdline parsing.
    let mut log_builder = env_logger::Builder::new();
    match matches.occurrences_of("verbose") {
        1 => {
            log_builder.filter_level(log::LevelFilter::Info);
        }
        2 => {
            log_builder.filter_level(log::LevelFilter::Debug);
        }
        3 => {
            log_builder.filter_level(log::LevelFilter::Trace);
        }
        _ => (),
    };
    if let Some(filter) = matches.value_of("vmodule") {
        log_builder.parse_filters(filter);
    }
    log_builder.init();

    match matches.subcommand() {
        Some(("version", _)) => {
            println!(env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(("info", sub_matches)) => {
            let path = sub_matches.value_of_os("PATH").unwrap();
            let dsf = Dsf::from_file(path)?;
            print!("{}", &dsf);
            if sub_matches.is_present("all") {
                print!("{}", &dsf.properties);
                println!("Terrain definitions:");
                for (i, name) in dsf.terrain_defs.iter().enumerate() {
                    println!("  {}: {}", i, name);
                }
                println!("Object definitions:");
                for (i, name) in dsf.object_defs.iter().enumerate() {
                    println!("  {}: {}", i, name);
                }
                println!("Polygon definitions:");
                for (i, name) in dsf.polygon_defs.iter().enumerate() {
                    println!("  {}: {}", i, name);
                }
                println!("Network definitions:");
                for (i, name) in dsf.network_defs.iter().enumerate() {
                    println!("  {}: {}", i, name);
                }
            }
        }
        Some(("text", sub_matches)) => {
            let in_path = sub_matches.value_of_os("INPUT").unwrap();
            let dsf = Dsf::from_file(in_path)?;
            let text = to_text(&dsf)?;
            if let Some(out_path) = sub_matches.value_of_os("OUTPUT") {
                std::fs::write(out_path, &text)?;
                println!("Wrote data to {:?}", &out_path);
            } else {
                println!("{}", text);
            }
        }
        Some(("flatten", sub_matches)) => {
            let in_path = sub_matches.value_of_os("INPUT").unwrap();
            let out_path = sub_matches.value_of_os("OUTPUT").unwrap();
            let polygon = parse_polygon(sub_matches.value_of("polygon").unwrap())?;
            let elevation = sub_matches
                .value_of("elevation")
                .map(str::parse::<f64>)
                .transpose()?;
            let drop_inner = sub_matches.is_present("drop-inner");

            let mut dsf = Dsf::from_file(in_path)?;
            let report = apply_commands(
                &mut dsf,
                &[EditCommand::CutPolygon {
                    polygon,
                    elevation,
                    keep_inner: !drop_inner,
                }],
                &EditConfig::default(),
            )?;
            for skipped in &report.skipped {
                eprintln!("Edit not applied: {}", skipped.reason);
            }
            if report.applied > 0 {
                dsf.write_file(out_path)?;
                println!("Wrote edited mesh to {:?}", &out_path);
            }
        }
        _ => unreachable!(),
    }
    Ok(())
}

/// Parses "lon,lat lon,lat ..." into a polygon ring.
fn parse_polygon(text: &str) -> Result<Vec<Point>, Box<dyn Error>> {
    let mut ring = Vec::new();
    for pair in text.split_whitespace() {
        let (lon, lat) = pair
            .split_once(',')
            .ok_or_else(|| format!("expected lon,lat but got {:?}", pair))?;
        ring.push([lon.trim().parse::<f64>()?, lat.trim().parse::<f64>()?]);
    }
    Ok(ring)
}

/// Renders the terrain mesh in a DSF2Text-like layout: one PATCH line per
/// patch, one VT line per triangle vertex.
fn to_text(dsf: &Dsf) -> Result<String, Box<dyn Error>> {
    let mut out = String::new();
    let (w, s, e, n) = dsf.properties.bounds();
    writeln!(out, "# dsfmeshtool text dump")?;
    writeln!(out, "PROPERTY sim/west {}", w)?;
    writeln!(out, "PROPERTY sim/south {}", s)?;
    writeln!(out, "PROPERTY sim/east {}", e)?;
    writeln!(out, "PROPERTY sim/north {}", n)?;
    for name in dsf.terrain_defs.iter() {
        writeln!(out, "TERRAIN_DEF {}", name)?;
    }
    for patch in &dsf.patches {
        writeln!(
            out,
            "PATCH {} {} {} {}",
            patch.definition, patch.flags, patch.lod_near, patch.lod_far
        )?;
        for tri in &patch.triangles {
            writeln!(out, "TRI")?;
            for r in tri {
                let point = dsf.pools[r.pool as usize].point(r.index as usize);
                write!(out, "VT")?;
                for v in point {
                    write!(out, " {}", v)?;
                }
                writeln!(out)?;
            }
        }
    }
    for raster in &dsf.rasters {
        writeln!(
            out,
            "RASTER {} {}x{}",
            raster.name,
            raster.width(),
            raster.height()
        )?;
    }
    writeln!(out, "# Result code: 0")?;
    Ok(out)
}
