//! A module for all encoding needs.
use crate::{code_span, Code, CLEAR_CODE, END_CODE, FIRST_STRING, MAX_MAX_BITS, MIN_MAX_BITS};
use crate::decode::{AllResult, LzwStatus, StreamResult};

use std::io::{self, BufRead, Write};

/// The state for encoding data as an adjusted-binary LZW stream.
pub struct Encoder {
    state: Box<EncodeState>,
}

/// An encoding stream sink.
///
/// See [`Encoder::into_stream`] on how to create this type.
///
/// [`Encoder::into_stream`]: struct.Encoder.html#method.into_stream
pub struct IntoStream<'d, W> {
    encoder: &'d mut Encoder,
    writer: W,
}

struct EncodeState {
    /// The configured maximum symbol width.
    max_bits: u8,
    /// The current encoding dictionary.
    tree: Tree,
    /// Ratio tracking behind the decision to send a clear code.
    monitor: RatioMonitor,
    /// The code for the input matched so far, if any.
    current: Option<Code>,
    /// How many bytes the string behind `current` covers.
    run_len: u32,
    /// If the header byte has been put into the bit buffer.
    header_written: bool,
    /// If the caller marked the input as complete.
    has_ended: bool,
    /// If the end code and its padding have been buffered.
    end_written: bool,
    /// The buffer bits.
    bit_buffer: u64,
    /// The number of valid buffer bits.
    bits_in_buffer: u8,
}

/// The encoding dictionary.
///
/// The same parallel per-code arrays the decoder keeps, extended by a
/// bucket-chained index over `(prefix, byte)` pairs for the longest-match
/// search. Zero is never an assigned string code, so it doubles as the nil
/// link of the chains.
struct Tree {
    max_strings: u32,
    prefix: Vec<Code>,
    terminator: Vec<u8>,
    children: Vec<u16>,
    heads: Vec<Code>,
    links: Vec<Code>,
    hash_shift: u32,
    next_free: u32,
    cursor: u32,
}

/// Rolling counters deciding when the dictionary stopped paying for itself.
///
/// Both counters halve once enough input accumulated, which keeps the
/// comparison anchored to the recent past. A clear is requested as soon as
/// the recent output exceeds the recent input by a small margin; waiting for
/// the dictionary to fill first would let mid-sized alphabets inflate
/// incompressible data far beyond the intended bound.
struct RatioMonitor {
    in_bits: u64,
    out_bits: u64,
}

/// Input bits the monitor wants to see before its first verdict.
const MONITOR_MIN_IN_BITS: u64 = 2048;

/// Fold point at which both monitor counters halve.
const MONITOR_FOLD_IN_BITS: u64 = 4096;

/// Worst case bits buffered in one pass of the coding loop: one data code,
/// one reserved code and the padding to a byte boundary.
const MAX_BURST_BITS: u8 = 17 + 17 + 7;

impl Encoder {
    /// Create a new encoder for streams with the given maximum symbol width.
    ///
    /// The width becomes the stream's header byte and bounds the dictionary
    /// at `1 << max_bits` codes.
    ///
    /// # Panics
    ///
    /// On `max_bits` outside of `9..=16`. The width is a caller choice, not
    /// stream data, so this is treated as a usage error.
    pub fn new(max_bits: u8) -> Self {
        assert!(
            (MIN_MAX_BITS..=MAX_MAX_BITS).contains(&max_bits),
            "maximum symbol width must lie in 9..=16",
        );
        Encoder {
            state: Box::new(EncodeState::new(max_bits)),
        }
    }

    /// Encode some bytes from `inp` into `out`.
    ///
    /// See [`into_stream`] for high-level functions and [`finish`] for
    /// marking the input data as complete.
    ///
    /// [`into_stream`]: #method.into_stream
    /// [`finish`]: #method.finish
    pub fn encode_bytes(&mut self, inp: &[u8], out: &mut [u8]) -> StreamResult {
        self.state.advance(inp, out)
    }

    /// Construct an encoder into a writer.
    pub fn into_stream<W: Write>(&mut self, writer: W) -> IntoStream<'_, W> {
        IntoStream {
            encoder: self,
            writer,
        }
    }

    /// Mark the encoding as finished.
    ///
    /// In following calls to `encode_bytes` the encoder will try to emit the
    /// code for any pending match and the end code after encoding all of
    /// `inp`. It's not recommended, but also not unsound, to use different
    /// byte slices in different calls from this point forward.
    pub fn finish(&mut self) {
        self.state.has_ended = true;
    }
}

impl<W: Write> IntoStream<'_, W> {
    /// Encode data from a reader.
    ///
    /// This will drain the supplied reader. It will not encode an end marker
    /// after all data has been processed.
    pub fn encode(&mut self, read: impl BufRead) -> AllResult {
        self.encode_part(read, false)
    }

    /// Encode data from a reader and an end marker.
    pub fn encode_all(mut self, read: impl BufRead) -> AllResult {
        self.encode_part(read, true)
    }

    fn encode_part(&mut self, mut read: impl BufRead, finish: bool) -> AllResult {
        let IntoStream { encoder, writer } = self;
        enum Progress {
            Ok,
            Done,
        }

        let mut bytes_read = 0;
        let mut bytes_written = 0;

        let read_bytes = &mut bytes_read;
        let write_bytes = &mut bytes_written;

        let mut outbuf = vec![0; 1 << 20];
        let once = move || {
            let data = read.fill_buf()?;

            if data.is_empty() {
                if finish {
                    encoder.finish();
                } else {
                    return Ok(Progress::Done);
                }
            }

            let result = encoder.encode_bytes(data, &mut outbuf[..]);
            *read_bytes += result.consumed_in;
            *write_bytes += result.consumed_out;
            read.consume(result.consumed_in);

            let done = result
                .status
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

            if let LzwStatus::Done = done {
                writer.write_all(&outbuf[..result.consumed_out])?;
                return Ok(Progress::Done);
            }

            if let LzwStatus::NoProgress = done {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "no more data but no end marker detected",
                ));
            }

            writer.write_all(&outbuf[..result.consumed_out])?;
            Ok(Progress::Ok)
        };

        let status = core::iter::repeat_with(once)
            // scan+fuse can be replaced with map_while
            .scan((), |(), result| match result {
                Ok(Progress::Ok) => Some(Ok(())),
                Err(err) => Some(Err(err)),
                Ok(Progress::Done) => None,
            })
            .fuse()
            .collect();

        AllResult {
            bytes_read,
            bytes_written,
            status,
        }
    }
}

impl EncodeState {
    fn new(max_bits: u8) -> Self {
        EncodeState {
            max_bits,
            tree: Tree::new(max_bits),
            monitor: RatioMonitor::new(),
            current: None,
            run_len: 0,
            header_written: false,
            has_ended: false,
            end_written: false,
            bit_buffer: 0,
            bits_in_buffer: 0,
        }
    }

    fn advance(&mut self, mut inp: &[u8], mut out: &mut [u8]) -> StreamResult {
        let c_in = inp.len();
        let c_out = out.len();

        loop {
            if self.push_out(&mut out) {
                break;
            }

            if !self.header_written {
                self.buffer_bits(u32::from(self.max_bits), 8);
                self.header_written = true;
                continue;
            }

            if inp.is_empty() {
                if self.has_ended && !self.end_written {
                    if let Some(code) = self.current.take() {
                        self.buffer_code(u32::from(code), self.tree.alphabet());
                        // The decoder grows its table once more on this code
                        // before it reads the end code.
                        let grown = (self.tree.alphabet() + 1).min(self.tree.max_strings);
                        self.buffer_code(u32::from(END_CODE), grown);
                    } else {
                        self.buffer_code(u32::from(END_CODE), self.tree.alphabet());
                    }
                    self.buffer_pad();
                    self.end_written = true;
                    continue;
                }

                break;
            }

            let mut emitted = None;
            let mut bytes = inp.iter();
            while let Some(&byte) = bytes.next() {
                let current = match self.current {
                    None => {
                        self.current = Some(Code::from(byte));
                        self.run_len = 1;
                        continue;
                    }
                    Some(code) => code,
                };

                match self.tree.lookup(current, byte) {
                    Some(code) => {
                        self.current = Some(code);
                        self.run_len += 1;
                    }
                    None => {
                        emitted = Some((current, byte));
                        break;
                    }
                }
            }
            inp = bytes.as_slice();

            let (code, byte) = match emitted {
                Some(pair) => pair,
                None => continue,
            };

            let width = self.buffer_code(u32::from(code), self.tree.alphabet());
            self.tree.insert(code, byte);
            self.current = Some(Code::from(byte));

            self.monitor.record(self.run_len, width);
            self.run_len = 1;
            if self.monitor.wants_flush() {
                self.buffer_code(u32::from(CLEAR_CODE), self.tree.alphabet());
                self.tree.reset();
                self.monitor.reset();
            }
        }

        let mut status = Ok(LzwStatus::Ok);
        if self.end_written && !self.flush_out(&mut out) {
            status = Ok(LzwStatus::Done);
        }

        StreamResult {
            consumed_in: c_in - inp.len(),
            consumed_out: c_out - out.len(),
            status,
        }
    }

    fn buffer_bits(&mut self, value: u32, width: u32) {
        self.bit_buffer |= u64::from(value) << self.bits_in_buffer;
        self.bits_in_buffer += width as u8;
    }

    /// Append one adjusted-binary codeword and return its width in bits.
    ///
    /// Long codewords travel with their top bits first so the reader can
    /// decide their width from the short-sized head alone.
    fn buffer_code(&mut self, code: u32, alphabet: u32) -> u32 {
        let (short_bits, shorts) = code_span(alphabet);
        if code < shorts {
            self.buffer_bits(code, short_bits);
            short_bits
        } else {
            let wide = code + shorts;
            self.buffer_bits(wide >> 1, short_bits);
            self.buffer_bits(wide & 1, 1);
            short_bits + 1
        }
    }

    fn buffer_pad(&mut self) {
        let to_byte = self.bits_in_buffer.wrapping_neg() & 0x7;
        self.bits_in_buffer += to_byte;
    }

    /// Push bytes if the buffer space is getting small.
    fn push_out(&mut self, out: &mut &mut [u8]) -> bool {
        if self.bits_in_buffer + MAX_BURST_BITS <= 64 {
            return false;
        }

        self.flush_out(out)
    }

    /// Flush all full bytes, returning if at least one more byte remains.
    fn flush_out(&mut self, out: &mut &mut [u8]) -> bool {
        let want = usize::from(self.bits_in_buffer / 8);
        let count = want.min((*out).len());
        let (bytes, tail) = core::mem::replace(out, &mut []).split_at_mut(count);
        *out = tail;

        for b in bytes {
            *b = (self.bit_buffer & 0x0000_0000_0000_00ff) as u8;
            self.bit_buffer >>= 8;
            self.bits_in_buffer -= 8;
        }

        count < want
    }
}

impl Tree {
    fn new(max_bits: u8) -> Self {
        let max = 1usize << max_bits;
        Tree {
            max_strings: max as u32,
            prefix: vec![0; max],
            terminator: vec![0; max],
            children: vec![0; max],
            heads: vec![0; max],
            links: vec![0; max],
            hash_shift: 32 - u32::from(max_bits),
            next_free: u32::from(FIRST_STRING),
            cursor: u32::from(FIRST_STRING),
        }
    }

    fn reset(&mut self) {
        self.heads.iter_mut().for_each(|head| *head = 0);
        self.children.iter_mut().for_each(|count| *count = 0);
        // Stale links are unreachable once the heads are gone.
        self.next_free = u32::from(FIRST_STRING);
        self.cursor = u32::from(FIRST_STRING);
    }

    /// The number of codes the decoder accepts for the symbol sent next.
    fn alphabet(&self) -> u32 {
        self.next_free
    }

    fn bucket(&self, prefix: Code, byte: u8) -> usize {
        let key = u32::from(prefix) << 8 | u32::from(byte);
        (key.wrapping_mul(0x9e37_79b1) >> self.hash_shift) as usize
    }

    fn lookup(&self, prefix: Code, byte: u8) -> Option<Code> {
        let mut code = self.heads[self.bucket(prefix, byte)];
        while code != 0 {
            let index = usize::from(code);
            if self.prefix[index] == prefix && self.terminator[index] == byte {
                return Some(code);
            }
            code = self.links[index];
        }
        None
    }

    /// Record `(prefix, byte)` under a fresh code, recycling a leaf once the
    /// free codes are gone.
    fn insert(&mut self, prefix: Code, byte: u8) {
        let slot = if self.next_free < self.max_strings {
            let slot = self.next_free as Code;
            self.next_free += 1;
            slot
        } else if let Some(victim) = self.scan_victim(prefix) {
            self.unlink(victim);
            let parent = usize::from(self.prefix[usize::from(victim)]);
            self.children[parent] -= 1;
            self.cursor = u32::from(victim) + 1;
            if self.cursor == self.max_strings {
                self.cursor = u32::from(FIRST_STRING);
            }
            victim
        } else {
            // No leaf besides the new string's own prefix, so the entry is
            // dropped. The decoder's scan reaches the same verdict.
            return;
        };

        let index = usize::from(slot);
        self.prefix[index] = prefix;
        self.terminator[index] = byte;
        self.children[usize::from(prefix)] += 1;

        let bucket = self.bucket(prefix, byte);
        self.links[index] = self.heads[bucket];
        self.heads[bucket] = slot;
    }

    /// The first recyclable leaf at or after the cursor, skipping the entry
    /// the new string extends.
    fn scan_victim(&self, new_prefix: Code) -> Option<Code> {
        let span = self.max_strings - u32::from(FIRST_STRING);
        let mut candidate = self.cursor;
        for _ in 0..span {
            if self.children[candidate as usize] == 0 && candidate != u32::from(new_prefix) {
                return Some(candidate as Code);
            }
            candidate += 1;
            if candidate == self.max_strings {
                candidate = u32::from(FIRST_STRING);
            }
        }
        None
    }

    fn unlink(&mut self, code: Code) {
        let index = usize::from(code);
        let bucket = self.bucket(self.prefix[index], self.terminator[index]);
        if self.heads[bucket] == code {
            self.heads[bucket] = self.links[index];
            return;
        }

        let mut walk = usize::from(self.heads[bucket]);
        while self.links[walk] != code {
            walk = usize::from(self.links[walk]);
        }
        self.links[walk] = self.links[index];
    }
}

impl RatioMonitor {
    fn new() -> Self {
        RatioMonitor {
            in_bits: 0,
            out_bits: 0,
        }
    }

    fn record(&mut self, bytes_in: u32, bits_out: u32) {
        self.in_bits += 8 * u64::from(bytes_in);
        self.out_bits += u64::from(bits_out);
        while self.in_bits >= MONITOR_FOLD_IN_BITS {
            self.in_bits >>= 1;
            self.out_bits >>= 1;
        }
    }

    fn wants_flush(&self) -> bool {
        self.in_bits >= MONITOR_MIN_IN_BITS && self.out_bits > self.in_bits + (self.in_bits >> 6)
    }

    fn reset(&mut self) {
        self.in_bits = 0;
        self.out_bits = 0;
    }
}
