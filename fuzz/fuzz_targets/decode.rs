#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut decoder = ablzw::decode::Decoder::new();
    let _ = decoder.into_stream(std::io::sink()).decode_all(data);
});
