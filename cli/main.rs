// ========================================================================================
//
//                              The medley command line
//
// ========================================================================================
//
// Thin shell around the library pipeline: parse arguments, apply overrides on
// top of the configuration file, run, and translate failures into exit codes.

#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::Parser;
use std::path::PathBuf;
use std::process;

use medley::config::EnsembleConfig;
use medley::pipeline::{self, EnsembleError};

#[derive(Parser, Debug)]
#[clap(
    name = "medley",
    version,
    about = "Combines per-model submission CSVs into one integer-labeled submission."
)]
struct Args {
    /// Path to the TOML configuration describing the model set.
    #[clap(value_name = "CONFIG")]
    config: PathBuf,

    /// Directory the submission CSV is written to (overrides the configuration).
    #[clap(long, value_name = "PATH")]
    output_dir: Option<PathBuf>,

    /// Short mode string embedded in the output filename (overrides the configuration).
    #[clap(long, value_name = "STRING")]
    tag: Option<String>,

    /// Number of classes K; output labels are clipped to [0, K-1] (overrides the configuration).
    #[clap(long, value_name = "N")]
    num_classes: Option<i64>,
}

fn run(args: Args) -> Result<PathBuf, EnsembleError> {
    let mut config = EnsembleConfig::load(&args.config)?;
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(tag) = args.tag {
        config.tag = tag;
    }
    if let Some(num_classes) = args.num_classes {
        config.num_classes = Some(num_classes);
    }

    pipeline::run(&config)
}

fn main() {
    env_logger::init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        process::exit(e.exit_code());
    }
}
