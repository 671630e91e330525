mod cli;

use std::path::PathBuf;

use chrono::Local;
use clap::{Parser, Subcommand};
use genobits::error::{GenoError, Result};
use genobits::model::Orientation;
use miette::IntoDiagnostic;

/// Pack diploid genotype tables into bit planes and report allele summaries
/// or pairwise identity-by-state distances.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ranked alleles, frequencies and heterozygote counts per site.
    Summary(SummaryArgs),
    /// Pairwise IBS distances between taxa.
    Distance(DistanceArgs),
}

#[derive(clap::Args, Debug)]
pub struct InputArgs {
    /// Whitespace-delimited genotype table (id chrom pos taxa...).
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    input: PathBuf,

    /// Output directory.
    #[arg(
        short,
        long,
        value_hint = clap::ValueHint::DirPath,
        default_value_t = format!("genobits_output_{}", Local::now().format("%Y%m%d_%H%M%S"))
    )]
    output_directory: String,

    /// Ranked alleles kept per site.
    #[arg(long, default_value_t = 2)]
    max_alleles: usize,

    /// Keep a presence plane for alleles ranked past --max-alleles.
    #[arg(long)]
    retain_rare: bool,

    /// Bit-plane layouts to build.
    #[arg(long, value_enum, default_value_t = Orientation::Both)]
    orientation: Orientation,

    /// Number of threads to use (default: all cores).
    #[arg(short, long)]
    threads: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct SummaryArgs {
    #[command(flatten)]
    input: InputArgs,
}

#[derive(clap::Args, Debug)]
pub struct DistanceArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Distances from this many sites or fewer are reported as NaN.
    #[arg(long, default_value_t = 0)]
    min_sites: usize,

    /// Write distances to ibs_distances.npz instead of CSV.
    #[arg(long)]
    npz: bool,

    /// Also write reference_mask.csv comparing every taxon with this one.
    #[arg(long)]
    reference_taxon: Option<String>,
}

fn try_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let input = match &args.command {
        Command::Summary(a) => &a.input,
        Command::Distance(a) => &a.input,
    };
    let output_dir = PathBuf::from(&input.output_directory);
    std::fs::create_dir_all(&output_dir).map_err(|e| GenoError::OutputDir { source: e })?;

    match &args.command {
        Command::Summary(a) => cli::run_summary(a, &output_dir),
        Command::Distance(a) => cli::run_distance(a, &output_dir),
    }
}

fn main() -> miette::Result<()> {
    try_main().into_diagnostic()
}
