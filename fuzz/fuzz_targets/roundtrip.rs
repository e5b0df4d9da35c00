#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let (pick, data) = match data.split_first() {
        Some((&pick, data)) => (pick, data),
        None => return,
    };
    let max_bits = 9 + pick % 8;

    let mut encoder = ablzw::encode::Encoder::new(max_bits);
    let mut compressed = Vec::with_capacity(2 * data.len() + 40);
    let result = encoder.into_stream(&mut compressed).encode_all(data);
    result.status.expect("compression failed");

    let mut decoder = ablzw::decode::Decoder::new();
    let mut restored = Vec::with_capacity(data.len());
    let result = decoder.into_stream(&mut restored).decode_all(compressed.as_slice());
    assert!(result.status.is_ok(), "{:?}", result.status);
    assert_eq!(restored, data);
});
