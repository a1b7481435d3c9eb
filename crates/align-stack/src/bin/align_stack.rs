//! align-stack CLI: align frames against a reference and stack them.

use std::path::PathBuf;

use align_stack::image_io::save_stack;
use align_stack::{
    AlignParams, AlignmentOrchestrator, BatchResult, CombineRule, EngineConfig, FrameSource,
    MatcherMethod,
};
use clap::{Args, Parser, Subcommand, ValueEnum};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "align-stack")]
#[command(about = "Align images on shared features and stack them into one frame")]
#[command(version)]
struct Cli {
    /// Log verbosity on stderr.
    #[arg(long, value_enum, global = true, default_value_t = LogLevelArg::Info)]
    log_level: LogLevelArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align frames and print the JSON report.
    Align(AlignArgs),

    /// Align frames, stack the aligned ones and write the result.
    Stack(StackArgs),
}

#[derive(Debug, Clone, Args)]
struct AlignArgs {
    /// Input images; the reference is picked by --reference.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Index of the reference image in the input list.
    #[arg(long, default_value_t = 0)]
    reference: usize,

    /// Feature sensitivity in [0, 1]; higher keeps fainter corners.
    #[arg(long, default_value_t = 0.5)]
    sensitivity: f32,

    /// Minimum ratio-tested matches for a frame to be aligned.
    #[arg(long, default_value_t = 10)]
    min_matches: usize,

    /// Restrict the transform to scale plus translation.
    #[arg(long)]
    no_rotation: bool,

    #[arg(long, value_enum, default_value_t = MatcherArg::Auto)]
    matcher: MatcherArg,

    /// RANSAC seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Engine configuration (JSON); missing fields take defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker threads; defaults to all cores.
    #[arg(long)]
    workers: Option<usize>,

    /// Also write the JSON report to this file.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct StackArgs {
    #[command(flatten)]
    align: AlignArgs,

    /// Output image; the format follows the extension.
    #[arg(long, short)]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = CombineArg::Mean)]
    combine: CombineArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MatcherArg {
    Auto,
    #[value(alias = "bf")]
    BruteForce,
    Flann,
}

impl From<MatcherArg> for MatcherMethod {
    fn from(m: MatcherArg) -> Self {
        match m {
            MatcherArg::Auto => MatcherMethod::Auto,
            MatcherArg::BruteForce => MatcherMethod::BruteForce,
            MatcherArg::Flann => MatcherMethod::Flann,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CombineArg {
    Mean,
    Median,
}

impl From<CombineArg> for CombineRule {
    fn from(c: CombineArg) -> Self {
        match c {
            CombineArg::Mean => CombineRule::Mean,
            CombineArg::Median => CombineRule::Median,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevelArg {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevelArg {
    fn filter(self) -> log::LevelFilter {
        match self {
            LogLevelArg::Off => log::LevelFilter::Off,
            LogLevelArg::Error => log::LevelFilter::Error,
            LogLevelArg::Warn => log::LevelFilter::Warn,
            LogLevelArg::Info => log::LevelFilter::Info,
            LogLevelArg::Debug => log::LevelFilter::Debug,
            LogLevelArg::Trace => log::LevelFilter::Trace,
        }
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match cli.command {
        Commands::Align(args) => run_align(&args).map(|_| ()),
        Commands::Stack(args) => run_stack(&args),
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: LogLevelArg) {
    // A logger may already be installed when embedded in another process.
    let _ = align_stack::core::init_with_level(level.filter());
}

#[cfg(feature = "tracing")]
fn init_logging(level: LogLevelArg) {
    align_stack::core::init_tracing(false, level.filter());
}

fn engine(args: &AlignArgs) -> CliResult<AlignmentOrchestrator> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_json(path)?,
        None => EngineConfig::default(),
    };
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    Ok(AlignmentOrchestrator::new(config)?)
}

fn align_params(args: &AlignArgs) -> AlignParams {
    AlignParams {
        reference_index: args.reference,
        feature_sensitivity: args.sensitivity,
        min_matches: args.min_matches,
        allow_rotation: !args.no_rotation,
        matcher_method: args.matcher.into(),
        seed: args.seed,
    }
}

fn align_with(engine: &AlignmentOrchestrator, args: &AlignArgs) -> CliResult<BatchResult> {
    let sources: Vec<FrameSource> = args.images.iter().cloned().map(FrameSource::from).collect();
    let batch = engine.align(&sources, &align_params(args))?;

    let report = batch.report();
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(path) = &args.report {
        report.write_json(path)?;
        log::info!("wrote report to {}", path.display());
    }
    Ok(batch)
}

fn run_align(args: &AlignArgs) -> CliResult<BatchResult> {
    let engine = engine(args)?;
    align_with(&engine, args)
}

fn run_stack(args: &StackArgs) -> CliResult<()> {
    let engine = engine(&args.align)?;
    let batch = align_with(&engine, &args.align)?;
    let stacked = engine.stack(&batch, args.combine.into())?;
    save_stack(&stacked, &args.output)?;
    log::info!(
        "stacked {} of {} frames into {}",
        batch.aligned_paths().len() + 1,
        batch.results.len() + 1,
        args.output.display()
    );
    Ok(())
}
