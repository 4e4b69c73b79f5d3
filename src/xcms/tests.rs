use std::io::Cursor;

use super::*;

const PEAK_TABLE: &str = "\
name,mz,mzmin,mzmax,rt,rtmin,rtmax,npeaks,.,sample_A,sample_B
M181T62,181.0707,181.0701,181.0712,62.3,58.1,66.0,2,1,15000.5,NA
M195T120,195.0877,195.0870,195.0881,120.0,115.2,124.9,2,1,2200,3100
M268T95,268.1040,268.1032,268.1049,95.2,90.0,99.8,1,1,,870
";

fn table() -> PeakTable {
    PeakTable::from_reader(Cursor::new(PEAK_TABLE)).unwrap()
}

#[test]
fn test_load_peak_table() {
    let table = table();
    assert_eq!(table.len(), 3);
    assert_eq!(table.samples(), &["sample_A".to_string(), "sample_B".to_string()]);

    let first = &table.peaks()[0];
    assert_eq!(first.name, "M181T62");
    assert_eq!(first.mz, 181.0707);
    assert_eq!(first.mzmin, 181.0701);
    assert_eq!(first.rtmax, 66.0);
    assert_eq!(first.npeaks, 2);
    assert_eq!(first.intensities.get("sample_A"), Some(&15000.5));
    assert!(!first.intensities.contains_key("sample_B"));

    let third = &table.peaks()[2];
    assert_eq!(third.intensities.len(), 1);
    assert_eq!(third.intensities.get("sample_B"), Some(&870.0));
}

#[test]
fn test_get_peak() {
    let table = table();
    assert_eq!(table.get_peak("M195T120").map(|p| p.rt), Some(120.0));
    assert!(table.get_peak("M999T1").is_none());
}

#[test]
fn test_filter_peaks() {
    let table = table();
    let filter = PeakFilter {
        mz_min: Some(190.0),
        rt_max: Some(100.0),
        ..Default::default()
    };
    let names: Vec<&str> = table
        .filter_peaks(&filter)
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(names, vec!["M268T95"]);

    assert_eq!(table.filter_peaks(&PeakFilter::default()).len(), 3);
}

#[test]
fn test_find_by_mz_rt() {
    let table = table();
    let peak = table.find_by_mz_rt(181.075, 70.0, 0.01, 30.0).unwrap();
    assert_eq!(peak.name, "M181T62");

    assert!(table.find_by_mz_rt(181.2, 62.0, 0.01, 30.0).is_none());
    assert!(table.find_by_mz_rt(181.0707, 200.0, 0.01, 30.0).is_none());
}

#[test]
fn test_nearest_feature_tie_prefers_earlier() {
    let csv = "name,mz,rt\nA,100.0,50.0\nB,100.0,50.0\n";
    let table = PeakTable::from_reader(Cursor::new(csv)).unwrap();
    assert_eq!(table.find_by_mz_rt(100.0, 50.0, 0.01, 10.0).unwrap().name, "A");
}

#[test]
fn test_tab_separated_and_generated_names() {
    let tsv = "mz\trt\tS1\n150.4\t33.3\t10\n";
    let table = PeakTable::from_reader(Cursor::new(tsv)).unwrap();
    let peak = &table.peaks()[0];
    assert_eq!(peak.name, "M150T33");
    assert_eq!(peak.mzmin, 150.4);
    assert_eq!(peak.rtmax, 33.3);
    assert_eq!(peak.intensities.get("S1"), Some(&10.0));
}

#[test]
fn test_missing_required_column() {
    let err = PeakTable::from_reader(Cursor::new("name,mz\nA,100\n")).unwrap_err();
    assert!(matches!(err, XcmsError::MissingColumn(ref c) if c == "rt"));
}

#[test]
fn test_invalid_required_value() {
    let err = PeakTable::from_reader(Cursor::new("name,mz,rt\nA,abc,10\n")).unwrap_err();
    match err {
        XcmsError::InvalidValue { row, column, value } => {
            assert_eq!(row, 1);
            assert_eq!(column, "mz");
            assert_eq!(value, "abc");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_sample_info() {
    let csv = "sample.name,group\nrun1.mzXML,control\nrun2.mzXML,treated\n";
    let info = sample_info_from_reader(Cursor::new(csv)).unwrap();
    assert_eq!(info.len(), 2);
    assert_eq!(info.get("run2.mzXML").map(String::as_str), Some("treated"));

    assert!(matches!(
        sample_info_from_reader(Cursor::new("name,group\na,b\n")),
        Err(XcmsError::MissingColumn(_))
    ));
}
