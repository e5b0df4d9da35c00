//! # Adjusted-binary LZW decoder and encoder
//!
//! This crate provides a streaming compressor and decompressor for an LZW
//! variant that writes its symbols as adjusted-binary (phase-in) codes. The
//! dictionary carries at most `1 << max_bits` codes for a configured maximum
//! symbol width between 9 and 16 bits, and once it is full its leaf entries
//! are recycled in place so adaptation continues on long streams.
//!
//! A stream starts with a single header byte carrying `max_bits`, followed by
//! the code stream packed least-significant-bit first. The code stream begins
//! with ordinary data codes (there is no leading clear code), may contain
//! `CLEAR` codes whenever the encoder decides the dictionary stopped paying
//! for itself, and always finishes with an `END` code padded to a byte
//! boundary.
//!
//! Exemplary use of the encoder and decoder:
//!
//! ```
//! use ablzw::{decode::Decoder, encode::Encoder};
//!
//! let data = b"TOBEORNOTTOBEORTOBEORNOT";
//!
//! let mut compressed = vec![];
//! let mut encoder = Encoder::new(12);
//! encoder.into_stream(&mut compressed).encode_all(&data[..]).status.unwrap();
//!
//! let mut restored = vec![];
//! let mut decoder = Decoder::new();
//! decoder.into_stream(&mut restored).decode_all(&compressed[..]).status.unwrap();
//!
//! assert_eq!(&restored[..], &data[..]);
//! ```

pub mod decode;
pub mod encode;

/// Alias for a LZW code point.
pub(crate) type Code = u16;

/// Code that resets the dictionary to its initial state.
pub(crate) const CLEAR_CODE: Code = 256;

/// Code that terminates the stream.
pub(crate) const END_CODE: Code = 257;

/// First code that can be assigned to a dictionary string.
pub(crate) const FIRST_STRING: Code = 258;

/// Smallest maximum symbol width a stream may be encoded with.
pub const MIN_MAX_BITS: u8 = 9;

/// Largest maximum symbol width a stream may be encoded with.
pub const MAX_MAX_BITS: u8 = 16;

/// Split an alphabet of `n` symbols into its adjusted-binary parameters: the
/// short codeword width `k` and the count `t` of short codewords. Values
/// below `t` travel in `k` bits, the remainder in `k + 1` bits. When `n` is a
/// power of two every codeword is short and the code degenerates to plain
/// fixed-width binary.
pub(crate) fn code_span(n: u32) -> (u32, u32) {
    debug_assert!(n >= 2);
    let k = n.ilog2();
    (k, (1 << (k + 1)) - n)
}
