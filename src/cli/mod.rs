use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ms2match::matching::Algorithm;

mod config;
mod export;
mod extract;
mod library;
mod matching;
mod output;
mod peaks;
mod process;
#[cfg(feature = "server")]
mod serve;

pub use config::Config;

/// ms2match - MS2 spectral library matching for XCMS features
#[derive(Parser)]
#[command(name = "ms2match")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Load settings from a TOML config file (default: ./ms2match.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the features of an XCMS peak table
    Peaks {
        /// XCMS peak table (CSV or TSV)
        #[arg(value_name = "TABLE")]
        table: PathBuf,

        #[arg(long)]
        mz_min: Option<f64>,

        #[arg(long)]
        mz_max: Option<f64>,

        /// Minimum retention time in seconds
        #[arg(long)]
        rt_min: Option<f64>,

        /// Maximum retention time in seconds
        #[arg(long)]
        rt_max: Option<f64>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Load a spectral library and report what was parsed
    Library {
        /// Library file (.msp, .mgf, .json, .mzML)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// List distinct compound names
        #[arg(long)]
        compounds: bool,
    },

    /// Extract one MS2 spectrum per XCMS feature
    Extract {
        #[arg(value_name = "MZXML")]
        mzxml: PathBuf,

        #[arg(value_name = "TABLE")]
        table: PathBuf,

        /// Precursor m/z tolerance in Da
        #[arg(long)]
        mz_tolerance: Option<f64>,

        /// Retention time tolerance in seconds
        #[arg(long)]
        rt_tolerance: Option<f64>,

        /// Drop fragment peaks below this intensity
        #[arg(long)]
        min_intensity: Option<f64>,

        /// Write the query spectra as JSON
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Match extracted MS2 spectra against a library
    Match {
        #[arg(value_name = "MZXML")]
        mzxml: PathBuf,

        #[arg(value_name = "TABLE")]
        table: PathBuf,

        #[arg(value_name = "LIBRARY")]
        library: PathBuf,

        /// dot_product, cosine, modified_cosine or ml_assisted (alias ms2query)
        #[arg(short, long)]
        algorithm: Option<Algorithm>,

        /// Fragment m/z tolerance (Da, or ppm with --ppm)
        #[arg(long)]
        mz_tolerance: Option<f64>,

        /// Interpret --mz-tolerance as ppm
        #[arg(long)]
        ppm: bool,

        #[arg(long)]
        min_score: Option<f64>,

        #[arg(long)]
        top_n: Option<usize>,

        /// JSON scoring model for ml_assisted
        #[arg(long, value_name = "FILE")]
        model: Option<PathBuf>,

        /// Worker threads (default: all cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Write results as CSV
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,

        /// Write the full result set as JSON
        #[arg(long, value_name = "FILE")]
        json: Option<PathBuf>,
    },

    /// Convert a saved JSON result set to CSV
    Export {
        /// Result set written by `match --json`
        #[arg(value_name = "RESULTS")]
        input: PathBuf,

        #[arg(value_name = "CSV")]
        output: PathBuf,
    },

    /// Run XCMS peak detection through Rscript
    Process {
        /// Input mzXML files
        #[arg(value_name = "MZXML", required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Directory receiving the peak table
        #[arg(short, long, default_value = "xcms_output")]
        output_dir: PathBuf,

        /// Rscript executable
        #[arg(long, default_value = "Rscript")]
        rscript: PathBuf,

        /// Timeout in seconds
        #[arg(long, default_value_t = 3600)]
        timeout: u64,
    },

    /// Start the HTTP service
    #[cfg(feature = "server")]
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for uploaded files
        #[arg(long)]
        upload_dir: Option<PathBuf>,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

pub fn dispatch(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Peaks {
            table,
            mz_min,
            mz_max,
            rt_min,
            rt_max,
            json,
        } => peaks::run(table, mz_min, mz_max, rt_min, rt_max, json),
        Commands::Library { file, compounds } => library::run(file, compounds),
        Commands::Extract {
            mzxml,
            table,
            mz_tolerance,
            rt_tolerance,
            min_intensity,
            output,
        } => {
            let mut extraction = config.extraction;
            if let Some(v) = mz_tolerance {
                extraction.mz_tolerance = v;
            }
            if let Some(v) = rt_tolerance {
                extraction.rt_tolerance = v;
            }
            if let Some(v) = min_intensity {
                extraction.min_intensity = v;
            }
            extract::run(mzxml, table, extraction, output)
        }
        Commands::Match {
            mzxml,
            table,
            library,
            algorithm,
            mz_tolerance,
            ppm,
            min_score,
            top_n,
            model,
            threads,
            csv,
            json,
        } => {
            let mut matching = config.matching;
            if let Some(v) = algorithm {
                matching.algorithm = v;
            }
            if let Some(v) = mz_tolerance {
                matching.mz_tolerance = v;
            }
            if ppm {
                matching.tolerance_unit = ms2match::matching::ToleranceUnit::Ppm;
            }
            if let Some(v) = min_score {
                matching.min_score = v;
            }
            if let Some(v) = top_n {
                matching.top_n = v;
            }
            if model.is_some() {
                matching.model_path = model;
            }
            if threads.is_some() {
                matching.threads = threads;
            }
            matching::run(
                mzxml,
                table,
                library,
                config.extraction,
                matching,
                csv,
                json,
            )
        }
        Commands::Export { input, output } => export::run(input, output),
        Commands::Process {
            inputs,
            output_dir,
            rscript,
            timeout,
        } => process::run(inputs, output_dir, rscript, timeout, config.xcms),
        #[cfg(feature = "server")]
        Commands::Serve {
            host,
            port,
            upload_dir,
        } => {
            let mut server = config.server;
            if let Some(v) = host {
                server.host = v;
            }
            if let Some(v) = port {
                server.port = v;
            }
            if let Some(v) = upload_dir {
                server.upload_dir = v;
            }
            serve::run(server, config.matching, config.extraction, config.xcms)
        }
    }
}
