use std::io;

use ablzw::decode::{Decoder, LzwStatus};
use ablzw::encode::Encoder;

fn compress(data: &[u8], max_bits: u8) -> Vec<u8> {
    let mut compressed = Vec::with_capacity(data.len() / 2 + 64);
    let mut encoder = Encoder::new(max_bits);
    let result = encoder.into_stream(&mut compressed).encode_all(data);
    result.status.expect("compression failed");
    compressed
}

fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut restored = Vec::new();
    let mut decoder = Decoder::new();
    let result = decoder.into_stream(&mut restored).decode_all(data);
    result.status?;
    Ok(restored)
}

fn assert_roundtrips(data: &[u8], max_bits: u8) {
    let compressed = compress(data, max_bits);
    let restored = decompress(&compressed).expect("decompression failed");
    assert!(
        restored == data,
        "mismatch for {} bytes at max_bits = {}: got {} bytes back",
        data.len(),
        max_bits,
        restored.len(),
    );
}

/// The loosest inflation the format is allowed to produce: 8 percent plus
/// header and end framing.
fn inflation_bound(len: usize) -> usize {
    len * 108 / 100 + 9
}

/// A small deterministic generator for test corpora, in the spirit of the
/// multiply-and-fold kernels compression test harnesses tend to carry.
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Lcg(seed.wrapping_mul(2).wrapping_add(1))
    }

    fn next_byte(&mut self) -> u8 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 56) as u8
    }

    fn below(&mut self, bound: usize) -> usize {
        self.next_byte();
        (self.0 >> 24) as usize % bound
    }
}

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = Lcg::new(seed);
    (0..len).map(|_| rng.next_byte()).collect()
}

/// Segments of fresh random pairs padded with long runs. The runs keep every
/// window of the stream comfortably compressible while the random part feeds
/// the dictionary around 130 new entries per segment, so long inputs push the
/// alphabet up without ever provoking a clear.
fn pair_rich(segments: usize, seed: u64) -> Vec<u8> {
    let mut rng = Lcg::new(seed);
    let mut data = Vec::with_capacity(segments * 512);
    for segment in 0..segments {
        for _ in 0..128 {
            data.push(rng.next_byte());
        }
        data.extend_from_slice(&[(segment % 7) as u8 * 37; 384]);
    }
    data
}

/// Text-like filler, runs, and a random tail in one buffer.
fn mixed_corpus() -> Vec<u8> {
    let words: [&[u8]; 8] = [
        b"the ", b"quick ", b"brown ", b"fox ", b"jumps ", b"over ", b"lazy ", b"dogs ",
    ];
    let mut data = Vec::new();
    let mut rng = Lcg::new(11);
    while data.len() < 1 << 15 {
        data.extend_from_slice(words[rng.below(words.len())]);
    }
    for run in 0..64 {
        data.extend_from_slice(&[run as u8; 200]);
    }
    data.extend_from_slice(&random_bytes(1 << 14, 12));
    data
}

#[test]
fn empty_input_all_widths() {
    for max_bits in 9..=16 {
        let compressed = compress(b"", max_bits);
        assert_eq!(compressed[0], max_bits);
        assert!(compressed.len() <= inflation_bound(0));
        assert_eq!(decompress(&compressed).unwrap(), b"");
    }
}

#[test]
fn single_byte() {
    assert_roundtrips(b"A", 12);
    for max_bits in 9..=16 {
        assert_roundtrips(b"\x00", max_bits);
        assert_roundtrips(b"\xff", max_bits);
    }
}

#[test]
fn short_phrase_all_widths() {
    for max_bits in 9..=16 {
        assert_roundtrips(b"TOBEORNOTTOBEORTOBEORNOT", max_bits);
    }
}

#[test]
fn mixed_corpus_all_widths() {
    let data = mixed_corpus();
    for max_bits in 9..=16 {
        assert_roundtrips(&data, max_bits);
        let compressed = compress(&data, max_bits);
        assert!(
            compressed.len() <= inflation_bound(data.len()),
            "max_bits {} inflated {} to {}",
            max_bits,
            data.len(),
            compressed.len(),
        );
    }
}

#[test]
fn highly_repetitive_megabyte() {
    let data = vec![b'A'; 1_000_000];
    let compressed = compress(&data, 16);
    assert!(
        compressed.len() < data.len() / 100,
        "only shrank to {} bytes",
        compressed.len(),
    );
    assert_eq!(decompress(&compressed).unwrap(), data);
}

#[test]
fn self_referential_codes() {
    // The classic alternating pattern makes the decoder see a code the
    // encoder assigned immediately before sending it.
    assert_roundtrips(b"ABABABABABABABAB", 9);
    for max_bits in 9..=16 {
        assert_roundtrips(&b"ab".repeat(3000), max_bits);
    }
}

#[test]
fn single_run_grows_one_chain() {
    // One long run keeps exactly one growing chain in the dictionary. At
    // max_bits 9 the chain ends up as the only leaf, which exercises the
    // case where the recycling scan finds no victim at all.
    let data = vec![b'a'; 300_000];
    for max_bits in [9, 10, 16] {
        assert_roundtrips(&data, max_bits);
    }
}

#[test]
fn incompressible_megabyte_stays_bounded() {
    let data = random_bytes(1 << 20, 77);
    let compressed = compress(&data, 12);
    assert!(
        compressed.len() <= inflation_bound(data.len()),
        "inflated {} to {}",
        data.len(),
        compressed.len(),
    );
    assert_eq!(decompress(&compressed).unwrap(), data);
}

#[test]
fn incompressible_bound_all_widths() {
    let data = random_bytes(1 << 16, 5);
    for max_bits in 9..=16 {
        let compressed = compress(&data, max_bits);
        assert!(
            compressed.len() <= inflation_bound(data.len()),
            "max_bits {} inflated {} to {}",
            max_bits,
            data.len(),
            compressed.len(),
        );
        assert_eq!(decompress(&compressed).unwrap(), data);
    }
}

#[test]
fn dictionary_growth_crosses_width_boundaries() {
    // Enough fresh pairs to push the alphabet across every power of two up
    // to the configured cap.
    let data = pair_rich(512, 21);
    for max_bits in 9..=16 {
        assert_roundtrips(&data, max_bits);
    }
}

#[test]
fn recycling_regime_small_dictionary() {
    // Far more than ten times the 512-code dictionary span, compressible
    // enough that the encoder never clears, so full-table recycling carries
    // the adaptation.
    let data = pair_rich(128, 3);
    assert!(data.len() > 10 * 512);
    assert_roundtrips(&data, 9);
    assert_roundtrips(&data, 10);
}

#[test]
fn compression_is_deterministic() {
    let data = mixed_corpus();
    let first = compress(&data, 12);
    let second = compress(&data, 12);
    assert_eq!(first, second);
}

#[test]
fn chunked_io_matches_one_shot() {
    let data = pair_rich(12, 9);
    let reference = compress(&data, 11);

    for max_io_len in [1, 3, 7] {
        let mut writer = TinyWrite {
            data: Vec::with_capacity(reference.len()),
            max_write_len: max_io_len,
        };
        let mut encoder = Encoder::new(11);
        let reader = TinyRead {
            data: &data,
            max_read_len: max_io_len,
        };
        encoder
            .into_stream(&mut writer)
            .encode_all(reader)
            .status
            .expect("chunked compression failed");
        assert_eq!(writer.data, reference, "io chunks of {}", max_io_len);

        let mut restored = vec![];
        let mut decoder = Decoder::new();
        let reader = TinyRead {
            data: &writer.data,
            max_read_len: max_io_len,
        };
        decoder
            .into_stream(&mut restored)
            .decode_all(reader)
            .status
            .expect("chunked decompression failed");
        assert_eq!(restored, data, "io chunks of {}", max_io_len);
    }
}

#[test]
fn one_byte_output_buffers() {
    let data = b"ABABABABABABABABAABBAABB".repeat(40);
    let compressed = compress(&data, 9);

    let mut decoder = Decoder::new();
    let mut restored = Vec::new();
    let mut stream = &compressed[..];
    let mut chunk = [0u8; 1];
    loop {
        let result = decoder.decode_bytes(stream, &mut chunk);
        stream = &stream[result.consumed_in..];
        restored.extend_from_slice(&chunk[..result.consumed_out]);
        if let LzwStatus::Done = result.status.expect("decode failed") {
            break;
        }
    }
    assert_eq!(restored, data);
}

#[test]
fn truncated_streams_always_error() {
    let data = mixed_corpus();
    let compressed = compress(&data[..2048], 10);
    for len in 0..compressed.len() {
        let result = decompress(&compressed[..len]);
        assert!(result.is_err(), "prefix of {} bytes decoded cleanly", len);
    }
}

#[test]
fn corrupted_streams_never_crash() {
    let data = mixed_corpus();
    let compressed = compress(&data[..4096], 12);
    let mut rng = Lcg::new(1234);

    for _ in 0..10_000 {
        let mut corrupt = compressed.clone();
        let bit = rng.below(corrupt.len() * 8);
        corrupt[bit / 8] ^= 1 << (bit % 8);

        // Success with garbage output and a clean error are both fine; the
        // decoder just must not panic or run away.
        let _ = decompress(&corrupt);
    }
}

#[test]
fn trailing_garbage_is_ignored() {
    let data = b"trailing bytes after the end code do not disturb decoding";
    let mut compressed = compress(data, 9);
    compressed.extend_from_slice(&[0xaa; 32]);
    assert_eq!(decompress(&compressed).unwrap(), data);
}

struct TinyRead<'a> {
    data: &'a [u8],
    max_read_len: usize,
}

impl io::BufRead for TinyRead<'_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(&self.data[..self.data.len().min(self.max_read_len)])
    }
    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.max_read_len);
        self.data = &self.data[n..];
    }
}

impl io::Read for TinyRead<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.data.len().min(buf.len()).min(self.max_read_len);
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

struct TinyWrite {
    data: Vec<u8>,
    max_write_len: usize,
}

impl io::Write for TinyWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.max_write_len);
        self.data.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
