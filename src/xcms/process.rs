//! XCMS peak detection through R.
//!
//! The XCMS algorithms (centWave, obiwarp, density grouping) live in R. This
//! module renders a parameterised R script, runs it with `Rscript` as a
//! blocking child process, and publishes the resulting peak table.
//!
//! Output is written to a staging directory inside the output directory and
//! moved into place only after R exits successfully, so a failed, timed out or
//! cancelled run never leaves a partial `PeakTable_verbose.csv` behind. The
//! sample table is published first and removed again if the peak table cannot
//! be moved.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::ProcessingError;

/// File name of the peak table written by the R script
pub const PEAK_TABLE_FILE: &str = "PeakTable_verbose.csv";

/// File name of the sample info table written by the R script
pub const SAMPLE_INFO_FILE: &str = "sample.info.csv";

/// Default wall-clock limit for one XCMS run
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

const DETECTION_METHODS: &[&str] = &["centWave", "matchedFilter", "massifquant", "MSW"];
const GROUPING_METHODS: &[&str] = &["density", "mzClust", "nearest"];
const RT_CORRECTION_METHODS: &[&str] = &["obiwarp", "loess", "peakgroups"];
const QUANT_METHODS: &[&str] = &["into", "intb", "maxo"];

/// XCMS processing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XcmsProcessingConfig {
    /// centWave m/z deviation in ppm
    pub ppm: f64,
    /// Minimum chromatographic peak width in seconds
    pub peakwidth_min: f64,
    /// Maximum chromatographic peak width in seconds
    pub peakwidth_max: f64,
    /// Signal-to-noise cutoff
    pub snthresh: f64,
    /// Minimum m/z difference between overlapping peaks
    pub mzdiff: f64,
    /// Quantitation value: `into`, `intb` or `maxo`
    pub quant_method: String,
    /// Fraction of samples a group must appear in
    pub minfrac: f64,
    /// Number of samples a group must appear in
    pub minsamp: u32,
    /// Density grouping bandwidth in seconds
    pub bw: f64,
    /// Density grouping m/z slice width
    pub mzwid: f64,
    /// Peak detection method
    pub peak_detection_method: String,
    /// Peak grouping method
    pub peak_grouping_method: String,
    /// Retention time correction method
    pub rt_correction_method: String,
    /// Prefilter: minimum number of scans
    pub prefilter_min: u32,
    /// Prefilter: minimum intensity
    pub prefilter_max: f64,
}

impl Default for XcmsProcessingConfig {
    fn default() -> Self {
        Self {
            ppm: 10.0,
            peakwidth_min: 5.0,
            peakwidth_max: 30.0,
            snthresh: 6.0,
            mzdiff: 0.01,
            quant_method: "into".to_string(),
            minfrac: 0.5,
            minsamp: 0,
            bw: 5.0,
            mzwid: 0.006,
            peak_detection_method: "centWave".to_string(),
            peak_grouping_method: "density".to_string(),
            rt_correction_method: "obiwarp".to_string(),
            prefilter_min: 3,
            prefilter_max: 100.0,
        }
    }
}

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), ProcessingError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ProcessingError::InvalidParameter(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

fn check_choice(name: &str, value: &str, allowed: &[&str]) -> Result<(), ProcessingError> {
    if !allowed.contains(&value) {
        return Err(ProcessingError::InvalidParameter(format!(
            "{} must be one of {}, got '{}'",
            name,
            allowed.join(", "),
            value
        )));
    }
    Ok(())
}

impl XcmsProcessingConfig {
    /// Check every parameter against its accepted range
    pub fn validate(&self) -> Result<(), ProcessingError> {
        check_range("ppm", self.ppm, 1.0, 50.0)?;
        check_range("peakwidth_min", self.peakwidth_min, 1.0, 100.0)?;
        check_range("peakwidth_max", self.peakwidth_max, 1.0, 200.0)?;
        if self.peakwidth_min >= self.peakwidth_max {
            return Err(ProcessingError::InvalidParameter(format!(
                "peakwidth_min ({}) must be less than peakwidth_max ({})",
                self.peakwidth_min, self.peakwidth_max
            )));
        }
        check_range("snthresh", self.snthresh, 1.0, 20.0)?;
        check_range("mzdiff", self.mzdiff, 0.001, 1.0)?;
        check_range("minfrac", self.minfrac, 0.0, 1.0)?;
        check_range("bw", self.bw, 1.0, 50.0)?;
        check_range("mzwid", self.mzwid, 0.001, 0.1)?;
        check_range("prefilter_min", self.prefilter_min as f64, 1.0, 100.0)?;
        check_range("prefilter_max", self.prefilter_max, 10.0, 10000.0)?;
        check_choice("quant_method", &self.quant_method, QUANT_METHODS)?;
        check_choice(
            "peak_detection_method",
            &self.peak_detection_method,
            DETECTION_METHODS,
        )?;
        check_choice(
            "peak_grouping_method",
            &self.peak_grouping_method,
            GROUPING_METHODS,
        )?;
        check_choice(
            "rt_correction_method",
            &self.rt_correction_method,
            RT_CORRECTION_METHODS,
        )?;
        Ok(())
    }
}

/// Result of a successful XCMS run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XcmsOutput {
    /// Always `true` for a returned output
    pub success: bool,
    /// Published peak table
    pub peak_table: PathBuf,
    /// Published sample table, when R wrote one
    pub sample_info: Option<PathBuf>,
    /// Directory the tables were published to
    pub output_dir: PathBuf,
    /// Status line
    pub message: String,
}

/// Quote a string as an R string literal
fn r_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Render the R script that runs the full XCMS workflow
pub fn generate_r_script(
    mzxml_files: &[PathBuf],
    output_dir: &Path,
    config: &XcmsProcessingConfig,
) -> String {
    let files = mzxml_files
        .iter()
        .map(|f| r_string(&f.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(", ");

    let group_call = format!(
        "xset <- group(\n    xset,\n    method = {},\n    bw = {},\n    mzwid = {},\n    minfrac = {},\n    minsamp = {}\n)",
        r_string(&config.peak_grouping_method),
        config.bw,
        config.mzwid,
        config.minfrac,
        config.minsamp
    );

    format!(
        r#"# XCMS processing script
suppressPackageStartupMessages(library(xcms))

mzxml_files <- c({files})
output_dir <- {output_dir}
dir.create(output_dir, showWarnings = FALSE, recursive = TRUE)

xset <- xcmsSet(
    files = mzxml_files,
    method = {detection},
    ppm = {ppm},
    peakwidth = c({pw_min}, {pw_max}),
    snthresh = {snthresh},
    mzdiff = {mzdiff},
    prefilter = c({pf_min}, {pf_max})
)

{group_call}

xset <- retcor(xset, method = {retcor})

{group_call}

xset <- fillPeaks(xset)

peak_table <- peakTable(xset, method = "medret", value = {quant})
write.csv(peak_table, file = file.path(output_dir, "{peak_table}"), row.names = FALSE)

sample_names <- basename(mzxml_files)
sample_info <- data.frame(
    sample.name = sample_names,
    group = rep(".", length(sample_names)),
    stringsAsFactors = FALSE
)
write.csv(sample_info, file = file.path(output_dir, "{sample_info}"), row.names = FALSE)

cat("XCMS processing completed successfully\n")
"#,
        files = files,
        output_dir = r_string(&output_dir.to_string_lossy()),
        detection = r_string(&config.peak_detection_method),
        ppm = config.ppm,
        pw_min = config.peakwidth_min,
        pw_max = config.peakwidth_max,
        snthresh = config.snthresh,
        mzdiff = config.mzdiff,
        pf_min = config.prefilter_min,
        pf_max = config.prefilter_max,
        group_call = group_call,
        retcor = r_string(&config.rt_correction_method),
        quant = r_string(&config.quant_method),
        peak_table = PEAK_TABLE_FILE,
        sample_info = SAMPLE_INFO_FILE,
    )
}

/// Runs XCMS scripts through `Rscript`
#[derive(Debug, Clone)]
pub struct XcmsProcessor {
    rscript: PathBuf,
    timeout: Duration,
    cancel: Arc<AtomicBool>,
}

impl Default for XcmsProcessor {
    fn default() -> Self {
        Self {
            rscript: PathBuf::from("Rscript"),
            timeout: DEFAULT_TIMEOUT,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl XcmsProcessor {
    /// Processor that runs `Rscript` from `PATH` with the default timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `Rscript` executable
    pub fn with_rscript<P: Into<PathBuf>>(mut self, rscript: P) -> Self {
        self.rscript = rscript.into();
        self
    }

    /// Limit each run to `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Flag that aborts a running job when set to `true`.
    ///
    /// Shared with clones of this processor. Each call to [`process`](Self::process)
    /// clears it on entry, so a cancelled run does not poison later ones.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Check that `Rscript` runs and the xcms package loads
    pub fn check_available(&self) -> Result<(), ProcessingError> {
        let mut version = Command::new(&self.rscript);
        version.arg("--version");
        match self.run_quiet(version, Duration::from_secs(5)) {
            Ok(status) if status.success() => {}
            Ok(_) => {
                return Err(ProcessingError::Unavailable(
                    "Rscript failed to start".into(),
                ))
            }
            Err(ProcessingError::Cancelled) => return Err(ProcessingError::Cancelled),
            Err(e) => {
                return Err(ProcessingError::Unavailable(format!(
                    "cannot run {}: {}",
                    self.rscript.display(),
                    e
                )))
            }
        }

        let mut library = Command::new(&self.rscript);
        library.args(["-e", "library(xcms)"]);
        match self.run_quiet(library, Duration::from_secs(10)) {
            Ok(status) if status.success() => Ok(()),
            Err(ProcessingError::Cancelled) => Err(ProcessingError::Cancelled),
            _ => Err(ProcessingError::Unavailable(
                "the R package 'xcms' is not installed".into(),
            )),
        }
    }

    fn run_quiet(
        &self,
        mut command: Command,
        limit: Duration,
    ) -> Result<ExitStatus, ProcessingError> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        self.wait(child, limit)
    }

    /// Poll a child until it exits, the deadline passes, or the job is cancelled
    fn wait(&self, mut child: Child, limit: Duration) -> Result<ExitStatus, ProcessingError> {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if self.cancel.load(Ordering::Relaxed) {
                log::warn!("Cancelling XCMS process {}", child.id());
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessingError::Cancelled);
            }
            if Instant::now() >= deadline {
                log::warn!("XCMS process {} exceeded {:?}, killing", child.id(), limit);
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessingError::Timeout(limit.as_secs()));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Run peak detection, alignment and grouping over the given mzXML files
    pub fn process(
        &self,
        mzxml_files: &[PathBuf],
        output_dir: &Path,
        config: &XcmsProcessingConfig,
    ) -> Result<XcmsOutput, ProcessingError> {
        config.validate()?;
        if mzxml_files.is_empty() {
            return Err(ProcessingError::InvalidParameter(
                "at least one mzXML file is required".into(),
            ));
        }
        for file in mzxml_files {
            if !file.is_file() {
                return Err(ProcessingError::MissingInput(file.display().to_string()));
            }
        }

        self.cancel.store(false, Ordering::Relaxed);
        self.check_available()?;

        std::fs::create_dir_all(output_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(".xcms-staging-")
            .tempdir_in(output_dir)?;

        let inputs: Vec<PathBuf> = mzxml_files
            .iter()
            .map(|f| f.canonicalize())
            .collect::<Result<_, _>>()?;
        let script = generate_r_script(&inputs, staging.path(), config);
        let script_path = staging.path().join("xcms_process.R");
        std::fs::write(&script_path, script)?;

        log::info!(
            "Running XCMS on {} file(s) with {}",
            inputs.len(),
            self.rscript.display()
        );

        let mut child = Command::new(&self.rscript)
            .arg(&script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = self.wait(child, self.timeout)?;
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        for line in stdout.lines() {
            log::debug!("Rscript: {}", line);
        }

        if !status.success() {
            return Err(ProcessingError::Failed(tail(&stderr, 20)));
        }

        let staged_table = staging.path().join(PEAK_TABLE_FILE);
        if !staged_table.is_file() {
            return Err(ProcessingError::MissingOutput);
        }

        let staged_info = staging.path().join(SAMPLE_INFO_FILE);
        let sample_info = if staged_info.is_file() {
            let dest = output_dir.join(SAMPLE_INFO_FILE);
            std::fs::rename(&staged_info, &dest)?;
            Some(dest)
        } else {
            None
        };

        // The peak table goes last; on failure nothing from this run stays published
        let peak_table = output_dir.join(PEAK_TABLE_FILE);
        if let Err(e) = std::fs::rename(&staged_table, &peak_table) {
            if let Some(info) = &sample_info {
                let _ = std::fs::remove_file(info);
            }
            return Err(e.into());
        }

        log::info!("XCMS peak table written to {}", peak_table.display());

        Ok(XcmsOutput {
            success: true,
            peak_table,
            sample_info,
            output_dir: output_dir.to_path_buf(),
            message: "XCMS processing completed successfully".to_string(),
        })
    }
}

/// Read a child pipe to completion on a helper thread
fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Last `n` lines of a message
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
