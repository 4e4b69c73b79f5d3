//! # ms2match
//!
//! Command-line front end for MS2 spectral library matching.
//!
//! ```bash
//! # Inspect inputs
//! ms2match peaks PeakTable.csv --mz-min 100 --mz-max 300
//! ms2match library reference.msp --compounds
//!
//! # Extract and match
//! ms2match extract run.mzXML PeakTable.csv -o queries.json
//! ms2match match run.mzXML PeakTable.csv reference.msp -a modified_cosine --csv hits.csv
//!
//! # Preprocess with XCMS, or serve the HTTP API
//! ms2match process a.mzXML b.mzXML -o xcms_output
//! ms2match serve --port 8000
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli::init_logging(cli.verbosity());
    cli::dispatch(cli)
}
