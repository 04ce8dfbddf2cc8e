#![no_main]

use libfuzzer_sys::fuzz_target;
use pdta::config::PipelineConfig;
use pdta::pipeline::AnomalyDetector;
use pdta::sequence::TimedSequence;

const SYMBOLS: [&str; 4] = ["a", "b", "c", "d"];

// Every 3 bytes become one step: symbol, then a 16-bit delay in hundredths
fn sequences(data: &[u8]) -> Vec<TimedSequence> {
    data.split(|b| *b == 0xff)
        .map(|chunk| {
            TimedSequence::from_pairs(chunk.chunks_exact(3).map(|step| {
                let symbol = SYMBOLS[step[0] as usize % SYMBOLS.len()];
                let delay = u16::from_le_bytes([step[1], step[2]]) as f64 / 100.0;
                (symbol, delay)
            }))
        })
        .collect()
}

fuzz_target!(|data: &[u8]| {
    let split = data.len() / 2;
    let training = sequences(&data[..split]);
    let incoming = sequences(&data[split..]);

    // Training may reject degenerate input but must never panic
    if let Ok(detector) = AnomalyDetector::train(PipelineConfig::default(), &training) {
        assert!(detector.automaton().verify_probability_mass(1e-9).is_ok());
        let results = detector.score_batch(&incoming);
        assert_eq!(results.len(), incoming.len());
    }
});
