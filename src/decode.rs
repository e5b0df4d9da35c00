//! A module for all decoding needs.
use crate::{code_span, Code, CLEAR_CODE, END_CODE, FIRST_STRING, MAX_MAX_BITS, MIN_MAX_BITS};

use std::fmt;
use std::io::{self, BufRead, Write};

/// The state for decoding an adjusted-binary LZW stream.
///
/// The maximum symbol width travels in the stream header, so the decoder is
/// constructed without parameters and sizes its dictionary once the first
/// byte has been seen.
pub struct Decoder {
    state: Box<DecodeState>,
}

/// A decoding stream sink.
///
/// See [`Decoder::into_stream`] on how to create this type.
///
/// [`Decoder::into_stream`]: struct.Decoder.html#method.into_stream
pub struct IntoStream<'d, W> {
    decoder: &'d mut Decoder,
    writer: W,
}

struct DecodeState {
    /// The code table, unsized until the stream header has been read.
    table: Table,

    /// The buffer with the most recently reconstructed string.
    buffer: Buffer,

    /// The previously decoded code, if any since the last clear.
    prev: Option<Code>,

    /// Whether the end code has been read.
    has_ended: bool,

    bit_buffer: u64,
    bits: u8,
}

/// The dictionary as parallel per-code arrays.
///
/// Codes `0..256` denote their own byte, `256` and `257` are reserved, and
/// every assigned code from `258` on denotes the string of its prefix code
/// followed by one terminator byte. The `children` counts exist to identify
/// leaves, which are the only entries the recycling scan may displace.
struct Table {
    max_strings: u32,
    prefix: Vec<Code>,
    terminator: Vec<u8>,
    children: Vec<u16>,
    /// The next never-assigned code, stuck at `max_strings` once full.
    next_free: u32,
    /// Where the next recycling scan starts.
    cursor: u32,
}

/// Scratch space for reconstructed strings, drained towards the caller.
///
/// Strings are materialized back to front at the tail of the allocation
/// while walking the prefix chain, so no separate reversal pass is needed.
struct Buffer {
    bytes: Box<[u8]>,
    read_mark: usize,
    write_mark: usize,
}

/// The result of a coding operation on a pair of buffers.
pub struct StreamResult {
    /// The number of bytes consumed from the input.
    pub consumed_in: usize,
    /// The number of bytes written into the output.
    pub consumed_out: usize,
    /// The status after returning from the write call.
    pub status: Result<LzwStatus, LzwError>,
}

/// The result of coding into an output stream.
pub struct AllResult {
    /// The total number of bytes consumed from the reader.
    pub bytes_read: usize,
    /// The total number of bytes written into the writer.
    pub bytes_written: usize,
    /// The status after returning from the write call.
    pub status: std::io::Result<()>,
}

/// The status after successful coding of an LZW stream.
#[derive(Debug, Clone, Copy)]
pub enum LzwStatus {
    /// Everything went well.
    Ok,
    /// No bytes were read or written and no internal state advanced.
    NoProgress,
    /// The end code was encountered and the stream is finished.
    Done,
}

/// The error kind after unsuccessful coding of an LZW stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LzwError {
    /// The header byte carries a maximum symbol width outside `9..=16`.
    InvalidHeader,
    /// The input ended before the end code was found.
    ///
    /// The streaming state machine itself reports `NoProgress` since more
    /// bytes could still arrive; the io adapters translate that into this
    /// error once their reader is exhausted.
    TruncatedInput,
}

impl fmt::Display for LzwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LzwError::InvalidHeader => f.write_str("maximum symbol width outside the range 9 to 16"),
            LzwError::TruncatedInput => f.write_str("stream ended before the end code"),
        }
    }
}

impl std::error::Error for LzwError {}

impl Decoder {
    /// Create a new decoder. The dictionary size is read from the stream
    /// header, not configured.
    pub fn new() -> Self {
        Decoder {
            state: Box::new(DecodeState::new()),
        }
    }

    /// Decode some bytes from `inp` and write the result to `out`.
    ///
    /// Returns the number of bytes that were consumed, the number that were
    /// written, and the status of the stream. The call suspends cleanly at
    /// either buffer boundary and can be resumed with the remaining data.
    pub fn decode_bytes(&mut self, inp: &[u8], out: &mut [u8]) -> StreamResult {
        self.state.advance(inp, out)
    }

    /// Construct a decoder into a writer.
    pub fn into_stream<W: Write>(&mut self, writer: W) -> IntoStream<'_, W> {
        IntoStream {
            decoder: self,
            writer,
        }
    }

    /// Check if the end code has been reached.
    pub fn has_ended(&self) -> bool {
        self.state.has_ended
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> IntoStream<'_, W> {
    /// Decode a complete stream from a reader.
    ///
    /// Runs until the end code has been consumed. Input remaining after the
    /// end code, such as the padding of an enclosing container, is left
    /// untouched beyond what the bit reader buffered ahead.
    pub fn decode_all(mut self, read: impl BufRead) -> AllResult {
        self.decode_part(read)
    }

    fn decode_part(&mut self, mut read: impl BufRead) -> AllResult {
        let IntoStream { decoder, writer } = self;
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

            let result = decoder.decode_bytes(data, &mut outbuf[..]);
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
                    LzwError::TruncatedInput,
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

impl DecodeState {
    fn new() -> Self {
        DecodeState {
            table: Table::empty(),
            buffer: Buffer::empty(),
            prev: None,
            has_ended: false,
            bit_buffer: 0,
            bits: 0,
        }
    }

    fn advance(&mut self, mut inp: &[u8], mut out: &mut [u8]) -> StreamResult {
        let o_in = inp.len();
        let o_out = out.len();
        let mut status = Ok(LzwStatus::Ok);

        if !self.table.is_sized() {
            match inp.split_first() {
                None => {
                    return StreamResult {
                        consumed_in: 0,
                        consumed_out: 0,
                        status: Ok(LzwStatus::NoProgress),
                    }
                }
                Some((&max_bits, rest)) => {
                    inp = rest;
                    if !(MIN_MAX_BITS..=MAX_MAX_BITS).contains(&max_bits) {
                        return StreamResult {
                            consumed_in: o_in - inp.len(),
                            consumed_out: 0,
                            status: Err(LzwError::InvalidHeader),
                        };
                    }
                    self.table.size_for(max_bits);
                    self.buffer.size_for(max_bits);
                }
            }
        }

        loop {
            if self.buffer.has_pending() {
                let taken = self.buffer.drain_into(&mut out);
                if self.buffer.has_pending() {
                    if taken == 0 {
                        status = Ok(LzwStatus::NoProgress);
                    }
                    break;
                }
            }

            if self.has_ended {
                status = Ok(LzwStatus::Done);
                break;
            }

            self.refill_bits(&mut inp);
            let alphabet = self.table.alphabet(self.prev.is_some());
            let code = match self.next_symbol(alphabet) {
                Some(code) => code,
                None => {
                    status = Ok(LzwStatus::NoProgress);
                    break;
                }
            };

            if code == END_CODE {
                self.has_ended = true;
                continue;
            }

            if code == CLEAR_CODE {
                self.table.reset();
                self.prev = None;
                continue;
            }

            match self.prev {
                // The first code after a clear. The alphabet excludes every
                // unassigned slot at this point, so it must be a literal.
                None => {
                    self.buffer.reconstruct(&self.table, code, false);
                }
                Some(prev) => {
                    let slot = self.table.upcoming_slot(prev);
                    let first = if slot == Some(code) {
                        // The code the encoder assigned right after sending
                        // `prev`: the string is `prev` extended by its own
                        // first byte.
                        self.buffer.reconstruct(&self.table, prev, true)
                    } else {
                        self.buffer.reconstruct(&self.table, code, false)
                    };
                    if let Some(slot) = slot {
                        self.table.commit(slot, prev, first);
                    }
                }
            }
            self.prev = Some(code);
        }

        if o_in > inp.len() {
            if let Ok(LzwStatus::NoProgress) = status {
                status = Ok(LzwStatus::Ok);
            }
        }

        StreamResult {
            consumed_in: o_in - inp.len(),
            consumed_out: o_out - out.len(),
            status,
        }
    }

    fn refill_bits(&mut self, inp: &mut &[u8]) {
        while self.bits <= 56 {
            match inp.split_first() {
                Some((&byte, rest)) => {
                    self.bit_buffer |= u64::from(byte) << self.bits;
                    self.bits += 8;
                    *inp = rest;
                }
                None => break,
            }
        }
    }

    /// Take one adjusted-binary symbol for the given alphabet size, or
    /// `None` while the accumulator cannot cover it.
    fn next_symbol(&mut self, alphabet: u32) -> Option<Code> {
        let (short_bits, shorts) = code_span(alphabet);
        if u32::from(self.bits) < short_bits {
            return None;
        }

        let head = (self.bit_buffer & ((1u64 << short_bits) - 1)) as u32;
        if head < shorts {
            self.bit_buffer >>= short_bits;
            self.bits -= short_bits as u8;
            return Some(head as Code);
        }

        // A long codeword: its top bits came first, one more carries the
        // lowest bit.
        if u32::from(self.bits) < short_bits + 1 {
            return None;
        }
        let tail = ((self.bit_buffer >> short_bits) & 1) as u32;
        self.bit_buffer >>= short_bits + 1;
        self.bits -= short_bits as u8 + 1;
        Some((((head << 1) | tail) - shorts) as Code)
    }
}

impl Table {
    fn empty() -> Self {
        Table {
            max_strings: 0,
            prefix: Vec::new(),
            terminator: Vec::new(),
            children: Vec::new(),
            next_free: u32::from(FIRST_STRING),
            cursor: u32::from(FIRST_STRING),
        }
    }

    fn is_sized(&self) -> bool {
        self.max_strings != 0
    }

    fn size_for(&mut self, max_bits: u8) {
        let max = 1usize << max_bits;
        self.max_strings = max as u32;
        self.prefix = vec![0; max];
        self.terminator = vec![0; max];
        self.children = vec![0; max];
        for code in 0..256 {
            self.terminator[code] = code as u8;
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.children.iter_mut().for_each(|count| *count = 0);
        self.next_free = u32::from(FIRST_STRING);
        self.cursor = u32::from(FIRST_STRING);
    }

    /// The number of codes the stream may carry next. While an insertion is
    /// pending this includes the slot it will occupy, which is exactly the
    /// code a self-referential symbol arrives as.
    fn alphabet(&self, pending: bool) -> u32 {
        (self.next_free + u32::from(pending)).min(self.max_strings)
    }

    /// The slot the pending insertion will occupy: the next free code while
    /// the table still grows, afterwards the first recyclable leaf at or
    /// after the cursor. `None` when the scan comes up empty.
    fn upcoming_slot(&self, new_prefix: Code) -> Option<Code> {
        if self.next_free < self.max_strings {
            return Some(self.next_free as Code);
        }

        let span = self.max_strings - u32::from(FIRST_STRING);
        let mut candidate = self.cursor;
        for _ in 0..span {
            // Only leaves may be displaced, and never the entry the new
            // string extends: that would create a self-referential chain.
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

    /// Bind `slot` to `(prefix, terminator)`, displacing whatever leaf held
    /// it when the table is already full.
    fn commit(&mut self, slot: Code, prefix: Code, terminator: u8) {
        let index = usize::from(slot);
        if u32::from(slot) == self.next_free {
            self.next_free += 1;
        } else {
            let parent = usize::from(self.prefix[index]);
            self.children[parent] -= 1;
            self.cursor = u32::from(slot) + 1;
            if self.cursor == self.max_strings {
                self.cursor = u32::from(FIRST_STRING);
            }
        }
        self.prefix[index] = prefix;
        self.terminator[index] = terminator;
        self.children[usize::from(prefix)] += 1;
    }
}

impl Buffer {
    fn empty() -> Self {
        Buffer {
            bytes: Box::default(),
            read_mark: 0,
            write_mark: 0,
        }
    }

    fn size_for(&mut self, max_bits: u8) {
        self.bytes = vec![0; 1usize << max_bits].into_boxed_slice();
        self.read_mark = 0;
        self.write_mark = 0;
    }

    fn has_pending(&self) -> bool {
        self.read_mark < self.write_mark
    }

    fn drain_into(&mut self, out: &mut &mut [u8]) -> usize {
        let count = (self.write_mark - self.read_mark).min(out.len());
        let (into, tail) = core::mem::replace(out, &mut []).split_at_mut(count);
        into.copy_from_slice(&self.bytes[self.read_mark..self.read_mark + count]);
        *out = tail;
        self.read_mark += count;
        count
    }

    /// Rebuild the string behind `code` at the tail of the scratch buffer
    /// and return its first byte. With `extend` the string is lengthened by
    /// a copy of that first byte, which resolves codes that reference the
    /// entry currently being defined.
    fn reconstruct(&mut self, table: &Table, code: Code, extend: bool) -> u8 {
        let end = self.bytes.len() - usize::from(extend);
        let mut mark = end;
        let mut walk = code;
        loop {
            mark -= 1;
            self.bytes[mark] = table.terminator[usize::from(walk)];
            if walk < CLEAR_CODE {
                break;
            }
            walk = table.prefix[usize::from(walk)];
        }

        let first = self.bytes[mark];
        if extend {
            self.bytes[end] = first;
        }
        self.read_mark = mark;
        self.write_mark = self.bytes.len();
        first
    }
}
