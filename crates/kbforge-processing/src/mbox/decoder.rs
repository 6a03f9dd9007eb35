//! Incremental splitter for mbox archives.
//!
//! The decoder does no I/O: callers feed it chunks of any size and collect the
//! frames it emits. A message is only emitted once the next separator line (or
//! the end of the stream) has been seen, so separators split across chunk
//! edges are handled by keeping the unfinished trailing line as residual.

use memchr::memchr_iter;

const SEPARATOR: &[u8] = b"From ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Before the first separator line.
    Preamble,
    /// Accumulating the current message.
    InMessage,
    /// Current message outgrew the ceiling; its bytes are counted, not kept.
    Discarding,
}

/// Unit emitted by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete message, separator line included.
    Message { offset: u64, raw: Vec<u8> },
    /// A message dropped for exceeding the size ceiling.
    Oversized { offset: u64, length: u64 },
}

impl Frame {
    pub fn offset(&self) -> u64 {
        match self {
            Frame::Message { offset, .. } | Frame::Oversized { offset, .. } => *offset,
        }
    }
}

pub struct MboxDecoder {
    state: DecoderState,
    max_message_bytes: usize,
    /// Bytes of the line that has not been terminated yet.
    residual: Vec<u8>,
    /// Whether `residual` starts at the beginning of a line.
    residual_at_line_start: bool,
    /// Absolute offset of `residual[0]`.
    residual_offset: u64,
    message: Vec<u8>,
    message_offset: u64,
    discarded: u64,
    preamble_bytes: u64,
    finished: bool,
}

impl MboxDecoder {
    pub fn new(max_message_bytes: usize) -> Self {
        Self {
            state: DecoderState::Preamble,
            max_message_bytes: max_message_bytes.max(1),
            residual: Vec::new(),
            residual_at_line_start: true,
            residual_offset: 0,
            message: Vec::new(),
            message_offset: 0,
            discarded: 0,
            preamble_bytes: 0,
            finished: false,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Bytes seen before the first separator; they belong to no message.
    pub fn preamble_bytes(&self) -> u64 {
        self.preamble_bytes
    }

    /// Feed the next chunk, appending completed frames to `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<Frame>) {
        debug_assert!(!self.finished, "feed after finish");

        let mut start = 0;
        for nl in memchr_iter(b'\n', chunk) {
            let piece = &chunk[start..=nl];
            let offset = self.residual_offset;
            let at_line_start = self.residual_at_line_start;
            let line_len = if self.residual.is_empty() {
                self.line(piece, offset, at_line_start, out);
                piece.len()
            } else {
                let mut line = std::mem::take(&mut self.residual);
                line.extend_from_slice(piece);
                self.line(&line, offset, at_line_start, out);
                let len = line.len();
                line.clear();
                self.residual = line;
                len
            };
            self.residual_offset += line_len as u64;
            self.residual_at_line_start = true;
            start = nl + 1;
        }

        let tail = &chunk[start..];
        if tail.is_empty() {
            return;
        }
        self.residual.extend_from_slice(tail);

        // An unterminated line longer than the ceiling is passed through in
        // pieces; its continuation is never treated as a line start.
        if self.residual.len() > self.max_message_bytes {
            let partial = std::mem::take(&mut self.residual);
            let offset = self.residual_offset;
            let at_line_start = self.residual_at_line_start;
            self.line(&partial, offset, at_line_start, out);
            self.residual_offset += partial.len() as u64;
            self.residual_at_line_start = false;
        }
    }

    /// Flush the residual line and the last message at end of stream.
    pub fn finish(&mut self, out: &mut Vec<Frame>) {
        if self.finished {
            return;
        }
        self.finished = true;

        if !self.residual.is_empty() {
            let line = std::mem::take(&mut self.residual);
            let offset = self.residual_offset;
            let at_line_start = self.residual_at_line_start;
            self.line(&line, offset, at_line_start, out);
            self.residual_offset += line.len() as u64;
        }
        self.close_message(out);
        self.state = DecoderState::Preamble;
    }

    fn line(&mut self, line: &[u8], offset: u64, at_line_start: bool, out: &mut Vec<Frame>) {
        if at_line_start && line.starts_with(SEPARATOR) {
            self.close_message(out);
            self.state = DecoderState::InMessage;
            self.message_offset = offset;
            self.message.clear();
        }

        match self.state {
            DecoderState::Preamble => {
                self.preamble_bytes += line.len() as u64;
            }
            DecoderState::InMessage => {
                if self.message.len() + line.len() > self.max_message_bytes {
                    self.discarded = (self.message.len() + line.len()) as u64;
                    self.message = Vec::new();
                    self.state = DecoderState::Discarding;
                } else {
                    self.message.extend_from_slice(line);
                }
            }
            DecoderState::Discarding => {
                self.discarded += line.len() as u64;
            }
        }
    }

    fn close_message(&mut self, out: &mut Vec<Frame>) {
        match self.state {
            DecoderState::Preamble => {}
            DecoderState::InMessage => {
                out.push(Frame::Message {
                    offset: self.message_offset,
                    raw: std::mem::take(&mut self.message),
                });
            }
            DecoderState::Discarding => {
                out.push(Frame::Oversized {
                    offset: self.message_offset,
                    length: self.discarded,
                });
                self.discarded = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(data: &[u8], chunk: usize, max: usize) -> Vec<Frame> {
        let mut decoder = MboxDecoder::new(max);
        let mut out = Vec::new();
        for piece in data.chunks(chunk) {
            decoder.feed(piece, &mut out);
        }
        decoder.finish(&mut out);
        out
    }

    const ARCHIVE: &[u8] = b"From a@x Mon Jan  1 00:00:00 2024\nSubject: one\n\nhello\n\nFrom b@x Tue Jan  2 00:00:00 2024\nSubject: two\n\nworld\n";

    #[test]
    fn test_splits_on_separator_lines() {
        let frames = decode(ARCHIVE, ARCHIVE.len(), 1024);
        assert_eq!(frames.len(), 2);
        match &frames[0] {
            Frame::Message { offset, raw } => {
                assert_eq!(*offset, 0);
                assert!(raw.starts_with(b"From a@x"));
                assert!(raw.ends_with(b"hello\n\n"));
            }
            other => panic!("unexpected frame {:?}", other),
        }
        let second = ARCHIVE.windows(7).position(|w| w == b"From b@").unwrap() as u64;
        assert_eq!(frames[1].offset(), second);
    }

    #[test]
    fn test_every_chunk_size_gives_same_frames() {
        let whole = decode(ARCHIVE, ARCHIVE.len(), 1024);
        for chunk in 1..ARCHIVE.len() {
            assert_eq!(decode(ARCHIVE, chunk, 1024), whole, "chunk size {}", chunk);
        }
    }

    #[test]
    fn test_from_inside_a_line_is_not_a_separator() {
        let data = b"From a@x\nSubject: s\n\nsaid From here\n>From escaped\n";
        let frames = decode(data, 3, 1024);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_preamble_is_ignored() {
        let data = b"garbage line\nmore\nFrom a@x\n\nbody\n";
        let mut decoder = MboxDecoder::new(1024);
        let mut out = Vec::new();
        decoder.feed(data, &mut out);
        decoder.finish(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(decoder.preamble_bytes(), 18);
        assert_eq!(out[0].offset(), 18);
    }

    #[test]
    fn test_oversized_message_is_discarded_and_measured() {
        let mut data = b"From big@x\n\n".to_vec();
        data.extend(std::iter::repeat(b'a').take(100));
        data.push(b'\n');
        let big_len = data.len() as u64;
        data.extend_from_slice(b"From small@x\n\nok\n");

        let frames = decode(&data, 7, 64);
        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[0],
            Frame::Oversized {
                offset: 0,
                length: big_len
            }
        );
        assert!(matches!(&frames[1], Frame::Message { offset, .. } if *offset == big_len));
    }

    #[test]
    fn test_unterminated_long_line_does_not_grow_residual() {
        let mut data = b"From big@x\n\n".to_vec();
        data.extend(std::iter::repeat(b'z').take(500));
        let mut decoder = MboxDecoder::new(64);
        let mut out = Vec::new();
        for piece in data.chunks(50) {
            decoder.feed(piece, &mut out);
            assert!(decoder.residual.len() <= 64 + 50);
        }
        assert_eq!(decoder.state(), DecoderState::Discarding);
        decoder.finish(&mut out);
        assert_eq!(
            out,
            vec![Frame::Oversized {
                offset: 0,
                length: data.len() as u64
            }]
        );
    }

    #[test]
    fn test_last_message_without_trailing_newline() {
        let data = b"From a@x\n\nlast";
        let frames = decode(data, 4, 1024);
        assert_eq!(
            frames,
            vec![Frame::Message {
                offset: 0,
                raw: data.to_vec()
            }]
        );
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(decode(b"", 1, 16).is_empty());
    }
}
