#![no_main]

use std::path::Path;

use fixtree::combine;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Convert bytes to UTF-8 string (ignore invalid UTF-8)
    if let Ok(s) = std::str::from_utf8(data) {
        // The reader must reject malformed input with an error, never a panic
        if let Ok(module) = combine::read_module(Path::new("fuzz/input.js"), s) {
            // A module that reads cleanly must also bundle cleanly on its own
            let bundle = combine::Bundle { modules: vec![module] };
            let _ = combine::gen_code(&bundle);
        }
    }
});
