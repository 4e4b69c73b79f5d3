use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::info;

use super::{ExportError, ResultSet};

/// Column header of the CSV export
pub const CSV_HEADER: [&str; 7] = [
    "Feature",
    "m/z",
    "RT",
    "Compound",
    "Score",
    "Algorithm",
    "Confidence",
];

impl ResultSet {
    /// One row per feature, describing its best match.
    ///
    /// Features without a match keep an empty compound and score.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(CSV_HEADER)?;

        for result in &self.results {
            let (compound, score, algorithm) = match &result.best_match {
                Some(best) => (
                    best.compound_name.clone().unwrap_or_else(|| best.library_id.clone()),
                    format!("{:.4}", best.score),
                    best.algorithm.to_string(),
                ),
                None => (String::new(), String::new(), result.algorithm.to_string()),
            };
            csv.write_record([
                result.feature_name.clone(),
                format!("{:.4}", result.precursor_mz),
                format!("{:.2}", result.rt),
                compound,
                score,
                algorithm,
                format!("{:.4}", result.confidence),
            ])?;
        }

        csv.flush()?;
        Ok(())
    }

    /// Write the CSV export to `path`
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        let path = path.as_ref();
        self.write_csv(BufWriter::new(File::create(path)?))?;
        info!("Wrote {} results to {}", self.len(), path.display());
        Ok(())
    }

    /// Serialize the whole result set as JSON
    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Write the JSON export to `path`
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_json(&mut writer)?;
        writer.flush()?;
        info!("Wrote {} results to {}", self.len(), path.display());
        Ok(())
    }

    /// Read a result set written by [`write_json`](Self::write_json)
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ExportError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Reload a JSON export
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        Self::from_json_reader(BufReader::new(File::open(path)?))
    }
}
