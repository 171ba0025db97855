//! Command line entry point of the germline assignment engine.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use itertools::Itertools;
use log::{info, LevelFilter};
use rayon::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use vdj_assign::{AssignParameters, Assigner};
use vdj_reference::GermlineReference;

/// Assign germline V, D and J genes to antibody sequences.
#[derive(Parser, Debug)]
#[clap(name = "vdj_assign", version)]
struct Args {
    /// Directory holding the `{species}_{V,D,J}.fasta` germline databases.
    #[clap(long, value_name = "PATH")]
    germline_dir: PathBuf,

    /// Species of the germline databases.
    #[clap(long, default_value = "human")]
    species: String,

    /// Directory receiving one `<input>.json` file per input.
    #[clap(long, value_name = "PATH", default_value = ".")]
    output: PathBuf,

    /// TOML file overriding the default assignment parameters.
    #[clap(long, value_name = "TOML")]
    params: Option<PathBuf>,

    /// Search the germline databases in process instead of running blastn.
    #[clap(long)]
    native: bool,

    /// Number of worker threads, all cores when absent.
    #[clap(long, value_name = "NUM")]
    threads: Option<usize>,

    /// Log every per-sequence outcome.
    #[clap(long, short)]
    verbose: bool,

    /// FASTA files to assign.
    #[clap(required = true, value_name = "FASTA")]
    inputs: Vec<PathBuf>,
}

fn init_log(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

/// Print an error together with everything that caused it.
fn print_error_chain(err: &anyhow::Error) {
    println!("ERROR: {}", err.chain().join("\n\tCaused by: "));
}

fn inner_main() -> Result<ExitCode> {
    let args = Args::parse();
    init_log(args.verbose);

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("unable to start the worker pool")?;
    }
    if !args.output.is_dir() {
        bail!("output directory {} does not exist", args.output.display());
    }

    let params = AssignParameters::load(args.params.as_deref())?;
    let reference = Arc::new(GermlineReference::load(&args.germline_dir, &args.species)?);
    let assigner = if args.native {
        Assigner::native(reference, params)
    } else {
        Assigner::blastn(reference, params)
    };
    info!(
        "assigning {} files against {} germlines",
        args.inputs.len(),
        args.species
    );

    let results: Vec<_> = args
        .inputs
        .par_iter()
        .map(|input| assigner.run(input, &args.output))
        .collect();

    let mut failed = false;
    for result in results {
        match result {
            Ok(summary) => println!("{summary}"),
            Err(err) => {
                print_error_chain(&err);
                failed = true;
            }
        }
    }
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn main() -> ExitCode {
    match inner_main() {
        Ok(exit_code) => exit_code,
        Err(err) => {
            print_error_chain(&err);
            ExitCode::FAILURE
        }
    }
}
