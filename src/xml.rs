//! Small quick-xml helpers shared by the mzXML reader and the mzML library parser.

use quick_xml::events::BytesStart;

/// PSI-MS and unit ontology terms read from library mzML files
pub mod accession {
    /// MS level
    pub const MS_LEVEL: &str = "MS:1000511";
    /// Scan start time
    pub const SCAN_START_TIME: &str = "MS:1000016";
    /// Selected ion m/z
    pub const SELECTED_ION_MZ: &str = "MS:1000744";
    /// Charge state
    pub const CHARGE_STATE: &str = "MS:1000041";
    /// Isolation window target m/z
    pub const ISOLATION_WINDOW_TARGET_MZ: &str = "MS:1000827";
    /// m/z array
    pub const MZ_ARRAY: &str = "MS:1000514";
    /// Intensity array
    pub const INTENSITY_ARRAY: &str = "MS:1000515";
    /// Spectrum title
    pub const SPECTRUM_TITLE: &str = "MS:1000796";

    /// Minute unit
    pub const UNIT_MINUTE: &str = "UO:0000031";
    /// Millisecond unit
    pub const UNIT_MILLISECOND: &str = "UO:0000028";
}

/// One `<cvParam>` element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CvParam {
    /// Term accession
    pub accession: String,
    /// Term name
    pub name: String,
    /// Raw value, if any
    pub value: Option<String>,
    /// Unit term accession, if any
    pub unit_accession: Option<String>,
}

impl CvParam {
    /// Value parsed as a float
    pub fn f64_value(&self) -> Option<f64> {
        self.value.as_deref()?.trim().parse().ok()
    }

    /// Value parsed as an integer
    pub fn i64_value(&self) -> Option<i64> {
        self.value.as_deref()?.trim().parse().ok()
    }

    /// Value as seconds, honouring a minute or millisecond unit
    pub fn seconds(&self) -> Option<f64> {
        let value = self.f64_value()?;
        Some(match self.unit_accession.as_deref() {
            Some(accession::UNIT_MINUTE) => value * 60.0,
            Some(accession::UNIT_MILLISECOND) => value / 1000.0,
            _ => value,
        })
    }
}

/// Unescaped value of attribute `name`, if present
pub(crate) fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>, quick_xml::Error> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == name.as_bytes() {
            let raw = String::from_utf8_lossy(&attr.value);
            return Ok(Some(quick_xml::escape::unescape(&raw)?.into_owned()));
        }
    }
    Ok(None)
}

pub(crate) fn cv_param(e: &BytesStart) -> Result<CvParam, quick_xml::Error> {
    Ok(CvParam {
        accession: attribute(e, "accession")?.unwrap_or_default(),
        name: attribute(e, "name")?.unwrap_or_default(),
        value: attribute(e, "value")?,
        unit_accession: attribute(e, "unitAccession")?,
    })
}
