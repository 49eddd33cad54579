use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use octamap_benchmark::BenchmarkMetrics;
use octamap_gen::{FlatGenerator, MapBuilder, ScatterGenerator, VoxelWorld, WorldGenerator};
use octamap_ogz::dump::{map_from_json, map_summary, map_to_json};
use octamap_ogz::{Map, MapVar};

#[derive(Parser)]
#[command(name = "octamap", about = "Inspect, verify and generate cube-engine .ogz maps")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print header, variables, entities and octree statistics
    Info { path: PathBuf },

    /// Dump the whole map as JSON
    Dump {
        path: PathBuf,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Keep going past an unknown octree tag and dump the partial tree
        #[arg(long)]
        partial: bool,
    },

    /// Decode and re-encode a map, checking the bodies match byte for byte
    Roundtrip { path: PathBuf },

    /// Build a .ogz map from a JSON dump
    Pack { json: PathBuf, output: PathBuf },

    /// Generate a new map
    Generate {
        output: PathBuf,
        /// World generator: "flat" or "scatter"
        #[arg(short, long, env = "OCTAMAP_GENERATOR", default_value = "flat")]
        generator: String,
        /// Seed for the scatter generator
        #[arg(long, env = "OCTAMAP_SEED", default_value = "0")]
        seed: u64,
        /// World edge length in voxels (power of two)
        #[arg(long, env = "OCTAMAP_SIZE", default_value = "32")]
        size: i32,
        /// World units per voxel
        #[arg(long, default_value_t = octamap_gen::builder::DEFAULT_VOXEL_SCALE)]
        scale: i32,
        #[arg(long)]
        title: Option<String>,
    },
}

fn load_map(path: &Path, benchmark: Option<&BenchmarkMetrics>) -> Result<(Map, Option<String>)> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let body = octamap_ogz::decompress(&data).with_context(|| format!("Failed to decompress {}", path.display()))?;
    let start = Instant::now();
    let (map, failure) =
        Map::decode_partial(&body).with_context(|| format!("Failed to decode {}", path.display()))?;
    if let Some(b) = benchmark {
        b.record_decode(start.elapsed(), body.len());
    }
    let failure = failure.map(|f| format!("unknown octree tag {} at offset {}", f.tag, f.offset));
    Ok((map, failure))
}

fn save_map(map: &Map, path: &Path, benchmark: Option<&BenchmarkMetrics>) -> Result<()> {
    let start = Instant::now();
    let body = map.encode();
    let encoded = start.elapsed();
    let compress_start = Instant::now();
    let data = octamap_ogz::compress(&body)?;
    if let Some(b) = benchmark {
        b.record_compression(compress_start.elapsed());
        b.record_encode(encoded + compress_start.elapsed(), data.len());
    }
    fs::write(path, &data).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {} ({} bytes, {} uncompressed)", path.display(), data.len(), body.len());
    Ok(())
}

fn write_json(value: &serde_json::Value, output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", text),
    }
    Ok(())
}

fn run(command: Command, benchmark: Option<&BenchmarkMetrics>) -> Result<()> {
    match command {
        Command::Info { path } => {
            let (map, failure) = load_map(&path, benchmark)?;
            if let Some(f) = failure {
                bail!("{}: {}", path.display(), f);
            }
            write_json(&map_summary(&map), None)?;
        }
        Command::Dump { path, output, partial } => {
            let (map, failure) = load_map(&path, benchmark)?;
            match failure {
                Some(f) if !partial => bail!("{}: {} (use --partial to dump anyway)", path.display(), f),
                Some(f) => log::warn!("Dumping partial tree: {}", f),
                None => {}
            }
            write_json(&map_to_json(&map)?, output.as_deref())?;
        }
        Command::Roundtrip { path } => {
            let data = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let start = Instant::now();
            let mismatch = octamap_ogz::verify_round_trip(&data)
                .with_context(|| format!("Failed to decode {}", path.display()))?;
            if let Some(b) = benchmark {
                b.record_decode(start.elapsed(), data.len());
            }
            match mismatch {
                None => println!("{}: round trip OK", path.display()),
                Some(offset) => bail!("{}: re-encoded body differs at byte {}", path.display(), offset),
            }
        }
        Command::Pack { json, output } => {
            let text = fs::read_to_string(&json).with_context(|| format!("Failed to read {}", json.display()))?;
            let value: serde_json::Value = serde_json::from_str(&text)?;
            let map = map_from_json(value).with_context(|| format!("Invalid map JSON in {}", json.display()))?;
            save_map(&map, &output, benchmark)?;
        }
        Command::Generate { output, generator, seed, size, scale, title } => {
            let generator: Box<dyn WorldGenerator> = match generator.as_str() {
                "scatter" => {
                    println!("Using ScatterGenerator with seed: {}", seed);
                    Box::new(ScatterGenerator::new(seed))
                }
                "flat" => {
                    println!("Using FlatGenerator");
                    Box::new(FlatGenerator)
                }
                other => bail!("Unknown generator '{}' (expected flat or scatter)", other),
            };
            let mut builder = MapBuilder::scaled(VoxelWorld::new(size)?, scale)?;
            builder.generate(generator.as_ref(), benchmark)?;
            if let Some(title) = title {
                builder.set_var("maptitle", MapVar::Str(title.into()));
            }
            let map = builder.build(benchmark);
            save_map(&map, &output, benchmark)?;
        }
    }
    Ok(())
}

fn write_report(bench: &BenchmarkMetrics) -> Result<()> {
    let report = bench.generate_report();
    let timestamp = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH)?.as_secs();
    fs::create_dir_all("benchmarks").context("Failed to create benchmarks directory")?;
    let filename = format!("benchmarks/benchmark-{}.txt", timestamp);
    fs::write(&filename, &report).with_context(|| format!("Failed to write {}", filename))?;
    println!("Benchmark report written to {}", filename);
    println!("{}", report);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let benchmark = if std::env::var("BENCHMARK").is_ok() {
        println!("BENCHMARK MODE ENABLED");
        Some(BenchmarkMetrics::new())
    } else {
        None
    };

    let result = run(args.command, benchmark.as_ref());

    if let Some(bench) = &benchmark {
        if let Err(e) = write_report(bench) {
            eprintln!("Failed to write benchmark report: {:#}", e);
        }
    }
    result
}
