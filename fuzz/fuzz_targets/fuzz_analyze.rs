#![no_main]

use libfuzzer_sys::fuzz_target;

use wshade_analysis::AnalysisOptions;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // The full parse + analyze pipeline should never panic; a
        // malformed layer must surface as an error value.
        if let Ok(layer) = wshade_parser::parse(source) {
            let _ = wshade_analysis::analyze(&layer, &AnalysisOptions::default());
        }
    }
});
