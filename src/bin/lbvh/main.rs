//! lbvh-cli - build, inspect and trace LBVH trees from the command line.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use lbvh::prelude::*;
use lbvh::tree::save_words;
use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const DEFAULT_SEED: u64 = 0x5EED;
const DEFAULT_GRID: usize = 64;

/// Global options parsed ahead of the command.
struct Options {
    config: BvhConfig,
    seed: u64,
    level: &'static str,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut level = "info";
    let mut config_path: Option<String> = None;
    let mut seed = DEFAULT_SEED;
    let mut filtered_args: Vec<&str> = Vec::new();
    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            "-c" | "--config" => config_path = iter.next().cloned(),
            "--seed" => match iter.next().and_then(|s| s.parse().ok()) {
                Some(s) => seed = s,
                None => fail("--seed expects an integer"),
            },
            "-V" | "--version" => {
                print_version();
                return;
            }
            _ => filtered_args.push(arg),
        }
    }

    init_tracing(level);

    let config = match config_path {
        Some(path) => BvhConfig::load(&path).unwrap_or_else(|e| fail(&format!("{path}: {e}"))),
        None => BvhConfig::default(),
    };
    let opts = Options { config, seed, level };

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        "build" | "b" => match filtered_args.get(1) {
            Some(scene) => cmd_build(&opts, scene),
            None => usage("lbvh-cli build <triangles.bin | synth:N>"),
        },
        "synth" | "s" => match filtered_args.get(1).and_then(|s| s.parse::<usize>().ok()) {
            Some(count) => cmd_synth(&opts, count, filtered_args.get(2).copied()),
            None => usage("lbvh-cli synth <count> [out.bin]"),
        },
        "dump" | "d" => match (filtered_args.get(1), filtered_args.get(2)) {
            (Some(scene), Some(out_dir)) => cmd_dump(&opts, scene, out_dir),
            _ => usage("lbvh-cli dump <triangles.bin | synth:N> <out_dir>"),
        },
        "trace" | "t" => match filtered_args.get(1) {
            Some(scene) => {
                let grid = filtered_args
                    .get(2)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_GRID);
                let check = filtered_args.iter().any(|&s| s == "--check");
                cmd_trace(&opts, scene, grid, check)
            }
            None => usage("lbvh-cli trace <triangles.bin | synth:N> [grid] [--check]"),
        },
        "h" | "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Error: unknown command '{other}'");
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        fail(&e.to_string());
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(msg: &str) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

fn usage(text: &str) -> Result<()> {
    eprintln!("Usage: {text}");
    std::process::exit(1);
}

fn print_version() {
    println!(
        "lbvh-cli {} (built {} {})",
        env!("CARGO_PKG_VERSION"),
        env!("LBVH_BUILD_DATE"),
        env!("LBVH_BUILD_TIME")
    );
}

fn print_help() {
    println!("lbvh-cli - LBVH build and traversal toolkit");
    println!();
    println!("USAGE:");
    println!("    lbvh-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    b, build  <scene>                 Build trees and print a summary");
    println!("    s, synth  <count> [out.bin]       Generate a seeded scene (optionally save it)");
    println!("    d, dump   <scene> <out_dir>       Write binary.words and wide.words");
    println!("    t, trace  <scene> [grid] [--check] Fire a grid of +Z rays and report hits");
    println!("    h, help                           Show this help");
    println!();
    println!("SCENES:");
    println!("    <file.bin>    Flat little-endian f32 triangle soup, 9 floats per triangle");
    println!("    synth:<N>     N synthetic triangles from --seed");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <file.json>   Engine configuration");
    println!("    --seed <n>                 Seed for synthetic scenes");
    println!("    -v, --verbose              Show debug output");
    println!("    -vv, --trace               Show trace output (very verbose)");
    println!("    -q, --quiet                Errors only");
    println!("    -V, --version              Show version and build date");
    println!();
    println!("NOTES:");
    println!("    - RUST_LOG overrides the verbosity flags");
}

/// Resolve a scene argument: a triangle file or `synth:N`.
fn load_scene(opts: &Options, scene: &str) -> Result<Vec<Triangle>> {
    if let Some(count) = scene.strip_prefix("synth:") {
        let count: usize = count
            .parse()
            .map_err(|_| Error::input(format!("bad synthetic count '{count}'")))?;
        return Ok(synthetic_scene(count, opts.seed));
    }

    let bytes = std::fs::read(scene)?;
    if bytes.len() % 4 != 0 {
        return Err(Error::input(format!("{scene}: {} bytes is not a whole number of f32s", bytes.len())));
    }
    let mut flat = vec![0f32; bytes.len() / 4];
    LittleEndian::read_f32_into(&bytes, &mut flat);
    Ok(TriangleStore::from_flat(&flat)?.as_slice().to_vec())
}

fn build_engine(opts: &Options, triangles: &[Triangle]) -> Result<(Engine, f64)> {
    let mut engine = Engine::with_capacity(triangles.len(), opts.config.clone())?;
    let start = Instant::now();
    engine.rebuild_triangles(triangles)?;
    Ok((engine, start.elapsed().as_secs_f64() * 1000.0))
}

fn print_summary(engine: &Engine, ms: f64) {
    let binary = engine.binary_tree();
    let wide = engine.wide_tree();
    println!("Primitives:    {}", engine.triangles().len());
    println!("Binary nodes:  {} (depth {})", binary.len(), binary.depth());
    println!("Wide nodes:    {} (arity {}, depth {})", wide.len(), wide.arity(), wide.depth());
    println!("Build time:    {ms:.3} ms");
}

fn cmd_build(opts: &Options, scene: &str) -> Result<()> {
    let triangles = load_scene(opts, scene)?;
    let (engine, ms) = build_engine(opts, &triangles)?;
    print_summary(&engine, ms);
    if opts.level != "error" {
        println!();
        print!("{}", engine.wide_tree().describe(2));
    }
    Ok(())
}

fn cmd_synth(opts: &Options, count: usize, out: Option<&str>) -> Result<()> {
    let triangles = synthetic_scene(count, opts.seed);
    if let Some(path) = out {
        let mut w = BufWriter::new(File::create(path)?);
        for tri in &triangles {
            for v in tri.v0.iter().chain(&tri.v1).chain(&tri.v2) {
                w.write_f32::<LittleEndian>(*v)?;
            }
        }
        tracing::info!(count, path, "scene written");
    }
    let (engine, ms) = build_engine(opts, &triangles)?;
    print_summary(&engine, ms);
    Ok(())
}

fn cmd_dump(opts: &Options, scene: &str, out_dir: &str) -> Result<()> {
    let triangles = load_scene(opts, scene)?;
    let (engine, _) = build_engine(opts, &triangles)?;
    let dir = Path::new(out_dir);
    std::fs::create_dir_all(dir)?;

    let binary_path = dir.join("binary.words");
    let wide_path = dir.join("wide.words");
    save_words(&binary_path, &engine.binary_tree().to_words())?;
    save_words(&wide_path, &engine.wide_tree().to_words())?;
    println!("Wrote {}", binary_path.display());
    println!("Wrote {}", wide_path.display());
    Ok(())
}

fn cmd_trace(opts: &Options, scene: &str, grid: usize, check: bool) -> Result<()> {
    let triangles = load_scene(opts, scene)?;
    let (engine, _) = build_engine(opts, &triangles)?;

    let mut bounds = Aabb::EMPTY;
    for tri in &triangles {
        bounds.expand_by_box(&tri.aabb());
    }
    if bounds.is_empty() {
        println!("Empty scene, nothing to trace");
        return Ok(());
    }

    // Rays start below the scene and travel along +Z over an XY grid
    let grid = grid.max(1);
    let size = bounds.size();
    let z = bounds.min.z - 1.0 - size.z;
    let rays: Vec<Ray> = (0..grid * grid)
        .map(|i| {
            let fx = ((i % grid) as f32 + 0.5) / grid as f32;
            let fy = ((i / grid) as f32 + 0.5) / grid as f32;
            let origin = Vec3::new(bounds.min.x + fx * size.x, bounds.min.y + fy * size.y, z);
            Ray::new(origin, Vec3::Z)
        })
        .collect();

    let start = Instant::now();
    let (hits, stats) = engine.intersect_rays(&rays);
    let ms = start.elapsed().as_secs_f64() * 1000.0;
    let hit_count = hits.iter().filter(|h| h.hit).count();

    println!("Rays:              {}", rays.len());
    println!("Hits:              {hit_count}");
    println!("Trace time:        {ms:.3} ms");
    println!("Nodes visited:     {}", stats.nodes_visited);
    println!("Leaf tests:        {}", stats.leaf_tests);
    println!("Stack truncations: {}", stats.stack_truncations);

    if check {
        let mismatches = rays
            .iter()
            .zip(&hits)
            .filter(|(ray, hit)| engine.intersect_brute_force(ray).primitive() != hit.primitive())
            .count();
        println!("Brute-force mismatches: {mismatches}");
        if mismatches > 0 {
            return Err(Error::input(format!("{mismatches} rays disagree with brute force")));
        }
    }
    Ok(())
}
