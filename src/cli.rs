// Command-line front end for oxiszx.
//
// Subcommands map onto the library entry points:
//   compress    float file -> stream        (io::compress_file)
//   decompress  stream -> float file        (io::decompress_file)
//   inspect     print a stream's layout     (compress::inspect)
//   bench       time compress/decompress on generated or loaded data
//   config      print build and default settings

use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::compress::backend::{Backend, EmulatedDevice};
use crate::compress::decoder::{decompress, inspect};
use crate::compress::encoder::{CompressOptions, compress};
use crate::compress::stats::BlockState;
use crate::format::header::FormatVersion;
use crate::io;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_ERROR_BOUND: f32 = 1e-3;
const DEFAULT_BLOCK_SIZE: usize = 64;
const DEFAULT_BENCH_COUNT: usize = 1 << 20;
const DEFAULT_BENCH_ITERATIONS: u32 = 5;

// ---------------------------------------------------------------------------
// Count parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_count(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty count string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024usize),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1usize),
    };
    let num: usize = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid count '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("count overflow: '{s}'"))
}

fn parse_error_bound(s: &str) -> Result<f32, String> {
    let v: f32 = s
        .trim()
        .parse()
        .map_err(|e| format!("invalid error bound '{s}': {e}"))?;
    if !v.is_finite() || v < 0.0 {
        return Err(format!("error bound must be finite and non-negative: '{s}'"));
    }
    Ok(v)
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Error-bounded lossy compressor for f32 data.
#[derive(Parser, Debug)]
#[command(
    name = "oxiszx",
    version,
    about = "Error-bounded lossy f32 compressor",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compress a flat file of f32 samples.
    Compress(CompressArgs),
    /// Decompress a stream back to a flat f32 file.
    Decompress(DecompressArgs),
    /// Print the layout of a compressed stream.
    Inspect(InspectArgs),
    /// Measure compression time, ratio and error.
    Bench(BenchArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// Version 0.1: host-native tables, at most 3 bytes per value.
    Legacy,
    /// Version 0.2: big-endian tables, full-width values.
    Portable,
}

impl From<FormatArg> for FormatVersion {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Legacy => Self::Legacy,
            FormatArg::Portable => Self::Portable,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct CodecArgs {
    /// Maximum absolute error per sample.
    #[arg(long = "error-bound", short = 'e', value_parser = parse_error_bound, default_value_t = DEFAULT_ERROR_BOUND)]
    error_bound: f32,

    /// Samples per block.
    #[arg(long = "block-size", short = 'b', value_parser = clap::value_parser!(u64).range(1..), default_value_t = DEFAULT_BLOCK_SIZE as u64)]
    block_size: u64,

    /// Stream format version to write.
    #[arg(long, value_enum, default_value_t = FormatArg::Portable)]
    format: FormatArg,

    /// Route variable blocks through the emulated offload device.
    #[arg(long = "emulated-offload")]
    emulated_offload: bool,

    /// Fail instead of growing past the raw input size.
    #[arg(long = "strict-capacity")]
    strict_capacity: bool,
}

#[derive(Args, Debug)]
struct CompressArgs {
    #[command(flatten)]
    codec: CodecArgs,

    /// Flat f32 input file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Compressed output file.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct DecompressArgs {
    /// Number of samples in the stream.
    #[arg(long, short = 'n', value_parser = parse_count)]
    count: usize,

    /// Compressed input file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Flat f32 output file.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Number of samples in the stream.
    #[arg(long, short = 'n', value_parser = parse_count)]
    count: usize,

    /// List every block.
    #[arg(long)]
    blocks: bool,

    /// Compressed input file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct BenchArgs {
    #[command(flatten)]
    codec: CodecArgs,

    /// Flat f32 dataset; a synthetic field is generated when omitted.
    #[arg(long, value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Samples in the synthetic field.
    #[arg(long, short = 'n', value_parser = parse_count, default_value_t = DEFAULT_BENCH_COUNT)]
    count: usize,

    /// Timed repetitions of each phase.
    #[arg(long, short = 'i', value_parser = clap::value_parser!(u32).range(1..), default_value_t = DEFAULT_BENCH_ITERATIONS)]
    iterations: u32,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Compress,
    Decompress,
    Inspect,
    Bench,
    Config,
}

struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    codec: Option<CodecArgs>,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    count: usize,
    list_blocks: bool,
    iterations: u32,
}

fn resolve_options(cli: Cli) -> Options {
    let base = Options {
        command: Command::Config,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        codec: None,
        input_file: None,
        output_file: None,
        count: 0,
        list_blocks: false,
        iterations: DEFAULT_BENCH_ITERATIONS,
    };

    match cli.command {
        Cmd::Compress(args) => Options {
            command: Command::Compress,
            codec: Some(args.codec),
            input_file: Some(args.input),
            output_file: Some(args.output),
            ..base
        },
        Cmd::Decompress(args) => Options {
            command: Command::Decompress,
            input_file: Some(args.input),
            output_file: Some(args.output),
            count: args.count,
            ..base
        },
        Cmd::Inspect(args) => Options {
            command: Command::Inspect,
            input_file: Some(args.input),
            count: args.count,
            list_blocks: args.blocks,
            ..base
        },
        Cmd::Bench(args) => Options {
            command: Command::Bench,
            codec: Some(args.codec),
            input_file: args.input,
            count: args.count,
            iterations: args.iterations,
            ..base
        },
        Cmd::Config => base,
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("oxiszx".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Build CompressOptions from CLI options
// ---------------------------------------------------------------------------

fn build_compress_options(codec: &CodecArgs) -> Result<CompressOptions, String> {
    let version = FormatVersion::from(codec.format);
    let block_size = usize::try_from(codec.block_size)
        .map_err(|_| format!("block size {} too large", codec.block_size))?;
    let backend = if codec.emulated_offload {
        Backend::offload(EmulatedDevice::new(version))
    } else {
        Backend::Software
    };
    Ok(CompressOptions {
        error_bound: codec.error_bound,
        block_size,
        version,
        backend,
        strict_capacity: codec.strict_capacity,
    })
}

fn hex(digest: &[u8; 32]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn print_json(json: &serde_json::Value) {
    eprintln!("{}", serde_json::to_string_pretty(json).unwrap_or_default());
}

fn check_output(path: &Path, force: bool) -> Result<(), String> {
    if path.exists() && !force {
        return Err(format!(
            "output file exists, use -f to overwrite: {}",
            path.display()
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("oxiszx version {version} (Rust), Copyright (C) oxiszx contributors");
    eprintln!("Licensed under the Apache License, Version 2.0");

    let file_io = cfg!(feature = "file-io") as u8;
    let parallel = cfg!(feature = "parallel") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("FILE_IO={file_io}");
    eprintln!("PARALLEL={parallel}");
    eprintln!("DEFAULT_ERROR_BOUND={DEFAULT_ERROR_BOUND}");
    eprintln!("DEFAULT_BLOCK_SIZE={DEFAULT_BLOCK_SIZE}");
    eprintln!("DEFAULT_FORMAT={}", FormatVersion::default());
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Compress command
// ---------------------------------------------------------------------------

fn cmd_compress(opts: &Options) -> i32 {
    let (Some(codec), Some(input), Some(output)) =
        (&opts.codec, &opts.input_file, &opts.output_file)
    else {
        return 1;
    };
    let compress_opts = match build_compress_options(codec) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("oxiszx: {e}");
            return 1;
        }
    };
    if let Err(e) = check_output(output, opts.force) {
        eprintln!("oxiszx: {e}");
        return 1;
    }

    let stats = match io::compress_file(input, output, &compress_opts) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("oxiszx: compress error: {e}");
            return 1;
        }
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "oxiszx: compress: samples: {}, input size: {}, output size: {}, ratio: {:.3}, \
             blocks: {} ({} constant)",
            stats.count,
            stats.input_size,
            stats.output_size,
            stats.ratio(),
            stats.nb_blocks,
            stats.nb_constant_blocks
        );
    }

    if opts.json_output {
        print_json(&serde_json::json!({
            "command": "compress",
            "count": stats.count,
            "input_size": stats.input_size,
            "output_size": stats.output_size,
            "ratio": stats.ratio(),
            "blocks": stats.nb_blocks,
            "constant_blocks": stats.nb_constant_blocks,
            "error_bound": compress_opts.error_bound,
            "block_size": compress_opts.block_size,
            "format": compress_opts.version.to_string(),
            "input_sha256": stats.input_sha256.as_ref().map(hex),
            "output_sha256": stats.output_sha256.as_ref().map(hex),
        }));
    }

    0
}

// ---------------------------------------------------------------------------
// Decompress command
// ---------------------------------------------------------------------------

fn cmd_decompress(opts: &Options) -> i32 {
    let (Some(input), Some(output)) = (&opts.input_file, &opts.output_file) else {
        return 1;
    };
    if let Err(e) = check_output(output, opts.force) {
        eprintln!("oxiszx: {e}");
        return 1;
    }

    let stats = match io::decompress_file(input, output, opts.count) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("oxiszx: decompress error: {e}");
            return 1;
        }
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "oxiszx: decompress: samples: {}, input size: {}, output size: {}",
            stats.count, stats.input_size, stats.output_size
        );
    }

    if opts.json_output {
        print_json(&serde_json::json!({
            "command": "decompress",
            "count": stats.count,
            "input_size": stats.input_size,
            "output_size": stats.output_size,
            "output_sha256": stats.output_sha256.as_ref().map(hex),
        }));
    }

    0
}

// ---------------------------------------------------------------------------
// Inspect command
// ---------------------------------------------------------------------------

fn cmd_inspect(opts: &Options) -> i32 {
    let Some(input) = &opts.input_file else {
        return 1;
    };
    let data = match io::read_bytes(input) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("oxiszx: input file: {}: {e}", input.display());
            return 1;
        }
    };
    let summary = match inspect(&data, opts.count) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("oxiszx: inspect error: {e}");
            return 1;
        }
    };

    if opts.json_output {
        let blocks: Vec<serde_json::Value> = summary
            .blocks
            .iter()
            .map(|b| {
                serde_json::json!({
                    "index": b.index,
                    "constant": b.state == BlockState::Constant,
                    "len": b.len,
                    "median": b.median,
                    "req_length": b.req_length,
                    "payload_size": b.payload_size,
                })
            })
            .collect();
        print_json(&serde_json::json!({
            "command": "inspect",
            "format": summary.version.to_string(),
            "block_size": summary.block_size,
            "blocks": summary.nb_blocks,
            "constant_blocks": summary.nb_constant_blocks,
            "fixed_size": summary.fixed_len,
            "payload_size": summary.payload_len(),
            "total_size": summary.total_len,
            "block_list": blocks,
        }));
        return 0;
    }

    if opts.quiet {
        return 0;
    }

    println!("stream:                 {}", input.display());
    println!("format version:         {}", summary.version);
    println!("block size:             {}", summary.block_size);
    println!("blocks:                 {}", summary.nb_blocks);
    println!("constant blocks:        {}", summary.nb_constant_blocks);
    println!("variable blocks:        {}", summary.nb_variable_blocks());
    println!("fixed sections:         {} bytes", summary.fixed_len);
    println!("payloads:               {} bytes", summary.payload_len());
    println!("total:                  {} bytes", summary.total_len);

    if opts.list_blocks || opts.verbose > 1 {
        println!();
        println!("  block     len  state     median        reqLength  size");
        for b in &summary.blocks {
            match (b.req_length, b.payload_size) {
                (Some(req), Some(size)) => println!(
                    "  {:>5}  {:>6}  variable  {:<12e}  {:>9}  {:>4}",
                    b.index, b.len, b.median, req, size
                ),
                _ => println!(
                    "  {:>5}  {:>6}  constant  {:<12e}  {:>9}  {:>4}",
                    b.index, b.len, b.median, "-", "-"
                ),
            }
        }
    }

    0
}

// ---------------------------------------------------------------------------
// Bench command
// ---------------------------------------------------------------------------

/// Smooth field with small-scale ripple and a few flat stretches, close to
/// what simulation output looks like.
fn synthetic_field(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let x = i as f32 / 1024.0;
            if (i / 4096) % 7 == 3 {
                1.0
            } else {
                x.sin() * 50.0 + (x * 37.0).cos() * 0.5 + (i % 13) as f32 * 1e-3
            }
        })
        .collect()
}

fn per_run(total: Duration, iterations: u32) -> Duration {
    total / iterations
}

fn throughput_mib_s(bytes: usize, d: Duration) -> f64 {
    let secs = d.as_secs_f64();
    if secs == 0.0 {
        0.0
    } else {
        bytes as f64 / (1024.0 * 1024.0) / secs
    }
}

fn cmd_bench(opts: &Options) -> i32 {
    let Some(codec) = &opts.codec else {
        return 1;
    };
    let compress_opts = match build_compress_options(codec) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("oxiszx: {e}");
            return 1;
        }
    };

    let samples = match &opts.input_file {
        Some(path) => match io::read_floats(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("oxiszx: input file: {}: {e}", path.display());
                return 1;
            }
        },
        None => synthetic_field(opts.count),
    };
    let raw_size = samples.len() * std::mem::size_of::<f32>();

    let mut stream = None;
    let start = Instant::now();
    for _ in 0..opts.iterations {
        match compress(&samples, &compress_opts) {
            Ok(s) => stream = Some(s),
            Err(e) => {
                eprintln!("oxiszx: compress error: {e}");
                return 1;
            }
        }
    }
    let compress_time = per_run(start.elapsed(), opts.iterations);
    let Some(stream) = stream else {
        return 1;
    };

    let mut restored = Vec::new();
    let start = Instant::now();
    for _ in 0..opts.iterations {
        match decompress(stream.as_bytes(), samples.len()) {
            Ok(r) => restored = r,
            Err(e) => {
                eprintln!("oxiszx: decompress error: {e}");
                return 1;
            }
        }
    }
    let decompress_time = per_run(start.elapsed(), opts.iterations);

    let max_error = samples
        .iter()
        .zip(&restored)
        .filter(|(a, _)| a.is_finite())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    let ratio = if stream.is_empty() {
        0.0
    } else {
        raw_size as f64 / stream.len() as f64
    };
    let within_bound = max_error <= compress_opts.error_bound;

    if opts.json_output {
        print_json(&serde_json::json!({
            "command": "bench",
            "count": samples.len(),
            "input_size": raw_size,
            "output_size": stream.len(),
            "ratio": ratio,
            "blocks": stream.nb_blocks(),
            "constant_blocks": stream.nb_constant_blocks(),
            "error_bound": compress_opts.error_bound,
            "max_error": max_error,
            "compress_us": compress_time.as_micros() as u64,
            "decompress_us": decompress_time.as_micros() as u64,
            "iterations": opts.iterations,
        }));
    } else if !opts.quiet {
        println!("samples:          {}", samples.len());
        println!("block size:       {}", compress_opts.block_size);
        println!("error bound:      {:e}", compress_opts.error_bound);
        println!(
            "compressed:       {} -> {} bytes (ratio {ratio:.3})",
            raw_size,
            stream.len()
        );
        println!(
            "constant blocks:  {} of {}",
            stream.nb_constant_blocks(),
            stream.nb_blocks()
        );
        println!(
            "compress:         {:?} ({:.1} MiB/s)",
            compress_time,
            throughput_mib_s(raw_size, compress_time)
        );
        println!(
            "decompress:       {:?} ({:.1} MiB/s)",
            decompress_time,
            throughput_mib_s(raw_size, decompress_time)
        );
        println!("max error:        {max_error:e}");
    }

    if !within_bound {
        eprintln!(
            "oxiszx: max error {max_error:e} exceeds bound {:e}",
            compress_opts.error_bound
        );
        return 2;
    }
    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    let default_filter = match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let exit_code = match opts.command {
        Command::Compress => cmd_compress(&opts),
        Command::Decompress => cmd_decompress(&opts),
        Command::Inspect => cmd_inspect(&opts),
        Command::Bench => cmd_bench(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
