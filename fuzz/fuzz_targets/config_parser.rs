#![no_main]

use libfuzzer_sys::fuzz_target;
use pdta::config::PipelineConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing and validation should not panic regardless of input
        if let Ok(config) = PipelineConfig::from_toml_str(input) {
            assert!(config.validate().is_ok());
        }
    }
});
