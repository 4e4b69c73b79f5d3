#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

use ms2match::library::{Library, LibraryFormat};

fuzz_target!(|data: &[u8]| {
    for format in [
        LibraryFormat::Msp,
        LibraryFormat::Mgf,
        LibraryFormat::Json,
        LibraryFormat::MzMl,
    ] {
        if let Ok(library) = Library::from_reader(Cursor::new(data), format) {
            let report = library.report();
            assert_eq!(report.valid + report.skipped, report.total);
            assert_eq!(library.len(), report.valid);
        }
    }
});
