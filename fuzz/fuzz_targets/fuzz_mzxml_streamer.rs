#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

use ms2match::mzxml::MzXmlStreamer;

fuzz_target!(|data: &[u8]| {
    // Malformed input must surface as an error, never a panic
    let Ok(mut streamer) = MzXmlStreamer::new(Cursor::new(data)) else {
        return;
    };

    for _ in 0..100 {
        match streamer.next_scan() {
            Ok(Some(scan)) => {
                let _ = scan.to_spectrum();
            }
            Ok(None) | Err(_) => break,
        }
    }
});
