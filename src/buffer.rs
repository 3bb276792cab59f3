//! Line-aligned chunk buffers and the input reader that fills them.

use std::io::{self, prelude::*};
use std::mem;

use crate::gate::AdmissionGate;
use crate::record::{Key, Layout};
use crate::sort::SortError;

const NEWLINE: u8 = b'\n';

/// A record view into its chunk's text.
#[derive(Debug, Clone, Copy)]
pub struct Record {
    start: usize,
    end: usize,
    layout: Layout,
}

impl Record {
    fn line<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }

    fn key<'a>(&self, text: &'a str) -> Key<'a> {
        self.layout.key(self.line(text))
    }
}

/// A batch of whole lines. The chunk owns its text; records are views into it.
#[derive(Debug, Default)]
pub struct Chunk {
    text: String,
    records: Vec<Record>,
}

impl Chunk {
    /// Builds a chunk from newline separated lines.
    #[cfg(test)]
    pub(crate) fn from_text(text: String) -> Result<Chunk, SortError> {
        let mut buffer = ChunkBuffer::new(text.len());
        buffer.extend(text.as_bytes())?;
        buffer.finish()
    }

    /// Sorts the records by key. The sort is stable, so sorting a sorted chunk again is a no-op.
    pub fn sort(&mut self) {
        let text = &self.text;
        self.records.sort_by(|a, b| a.key(text).cmp(&b.key(text)));
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Size of the chunk text in bytes.
    pub fn text_len(&self) -> usize {
        self.text.len()
    }

    /// Returns record lines in the current order.
    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.records.iter().map(move |record| record.line(&self.text))
    }
}

/// Chunk under construction. Complete lines are indexed as they arrive,
/// a trailing partial line is carried over to the next chunk.
pub struct ChunkBuffer {
    bytes: Vec<u8>,
    records: Vec<Record>,
    /// Start of the line not yet terminated.
    line_start: usize,
    limit: usize,
}

impl ChunkBuffer {
    pub fn new(limit: usize) -> Self {
        ChunkBuffer {
            bytes: Vec::with_capacity(limit),
            records: Vec::new(),
            line_start: 0,
            limit,
        }
    }

    /// Appends raw input and indexes every line completed by it.
    pub fn extend(&mut self, data: &[u8]) -> Result<(), SortError> {
        let mut scan_from = self.bytes.len();
        self.bytes.extend_from_slice(data);

        while let Some(pos) = self.bytes[scan_from..].iter().position(|&b| b == NEWLINE) {
            let newline = scan_from + pos;
            self.push_record(newline)?;
            self.line_start = newline + 1;
            scan_from = newline + 1;
        }

        return Ok(());
    }

    /// Checks if the buffer reached the limit. A buffer without a complete line is never full,
    /// so lines longer than the limit grow the buffer instead of being split.
    pub fn is_full(&self) -> bool {
        self.bytes.len() >= self.limit && !self.records.is_empty()
    }

    /// Size of buffered input in bytes, including the partial line.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Closes a chunk with all complete lines. The partial line stays in the buffer.
    pub fn split_off(&mut self) -> Result<Chunk, SortError> {
        let mut carry = Vec::with_capacity(self.limit.max(self.bytes.len() - self.line_start));
        carry.extend_from_slice(&self.bytes[self.line_start..]);
        self.bytes.truncate(self.line_start);

        let bytes = mem::replace(&mut self.bytes, carry);
        let records = mem::take(&mut self.records);
        self.line_start = 0;

        return Ok(Chunk {
            text: String::from_utf8(bytes).map_err(SortError::InvalidUtf8)?,
            records,
        });
    }

    /// Closes the last chunk at end of input. A trailing unterminated line becomes a record.
    pub fn finish(&mut self) -> Result<Chunk, SortError> {
        if self.line_start < self.bytes.len() {
            let end = self.bytes.len();
            self.push_record(end)?;
            self.line_start = end;
        }

        self.split_off()
    }

    fn push_record(&mut self, end: usize) -> Result<(), SortError> {
        let start = self.line_start;
        let end = if end > start && self.bytes[end - 1] == b'\r' { end - 1 } else { end };

        let layout = Layout::parse(&self.bytes[start..end]).map_err(SortError::MalformedRecord)?;
        self.records.push(Record { start, end, layout });

        return Ok(());
    }
}

/// Reads input through a fixed size buffer and yields line-aligned chunks of about `chunk_size` bytes.
///
/// When a gate is attached, every buffer fill happens while holding one of its permits.
pub struct ChunkReader<'g, R: Read> {
    reader: R,
    read_buf: Vec<u8>,
    buffer: ChunkBuffer,
    gate: Option<&'g AdmissionGate>,
    finished: bool,
}

impl<'g, R: Read> ChunkReader<'g, R> {
    pub fn new(reader: R, buf_size: usize, chunk_size: usize) -> Self {
        ChunkReader {
            reader,
            read_buf: vec![0; buf_size.max(1)],
            buffer: ChunkBuffer::new(chunk_size),
            gate: None,
            finished: false,
        }
    }

    /// Couples buffer fills to an admission gate.
    pub fn with_gate(mut self, gate: &'g AdmissionGate) -> Self {
        self.gate = Some(gate);
        return self;
    }

    fn fill(&mut self) -> io::Result<usize> {
        let _permit = self.gate.map(AdmissionGate::acquire);
        loop {
            match self.reader.read(&mut self.read_buf) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    fn next_chunk(&mut self) -> Result<Option<Chunk>, SortError> {
        loop {
            let read = self.fill()?;
            if read == 0 {
                self.finished = true;
                let chunk = self.buffer.finish()?;
                return Ok(if chunk.is_empty() { None } else { Some(chunk) });
            }

            self.buffer.extend(&self.read_buf[..read])?;
            if self.buffer.is_full() {
                return self.buffer.split_off().map(Some);
            }
        }
    }
}

impl<R: Read> Iterator for ChunkReader<'_, R> {
    type Item = Result<Chunk, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_chunk() {
            Ok(chunk) => chunk.map(Ok),
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// Detects a byte-order mark at the start of `reader`.
/// A UTF-8 mark is skipped, UTF-16 and UTF-32 marks are rejected.
pub fn skip_byte_order_mark<R: Read>(mut reader: R) -> Result<io::Chain<io::Cursor<Vec<u8>>, R>, SortError> {
    let mut head = [0u8; 4];
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(SortError::IO(err)),
        }
    }

    let head = &head[..filled];
    let skip = if head.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) || head.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        return Err(SortError::UnsupportedEncoding("UTF-32"));
    } else if head.starts_with(&[0xFF, 0xFE]) || head.starts_with(&[0xFE, 0xFF]) {
        return Err(SortError::UnsupportedEncoding("UTF-16"));
    } else if head.starts_with(&[0xEF, 0xBB, 0xBF]) {
        3
    } else {
        0
    };

    return Ok(io::Cursor::new(head[skip..].to_vec()).chain(reader));
}

#[cfg(test)]
mod test {
    use std::io::{self, prelude::*};

    use rand::seq::SliceRandom;
    use rstest::*;

    use super::{skip_byte_order_mark, Chunk, ChunkBuffer, ChunkReader};
    use crate::gate::AdmissionGate;
    use crate::sort::SortError;

    fn sample_input(lines: usize) -> String {
        let words = ["Apple", "banana", "Cherry is red", "date", "Elder berry bush"];
        (0..lines)
            .map(|i| format!("{}. {}\n", i * 7 % 1000, words[i % words.len()]))
            .collect()
    }

    fn read_chunks(input: &str, buf_size: usize, chunk_size: usize) -> Vec<Chunk> {
        ChunkReader::new(input.as_bytes(), buf_size, chunk_size)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_chunk_buffer_carries_partial_line() {
        let mut buffer = ChunkBuffer::new(8);
        buffer.extend(b"1. Apple\n2. Ban").unwrap();
        assert!(buffer.is_full());

        let chunk = buffer.split_off().unwrap();
        assert_eq!(Vec::from_iter(chunk.lines()), vec!["1. Apple"]);
        assert_eq!(buffer.len(), "2. Ban".len());

        buffer.extend(b"ana\r\n3. Cherry").unwrap();
        let chunk = buffer.finish().unwrap();
        assert_eq!(Vec::from_iter(chunk.lines()), vec!["2. Banana", "3. Cherry"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_long_line_is_never_full() {
        let mut buffer = ChunkBuffer::new(4);
        buffer.extend(b"1. A very long line without end").unwrap();
        assert!(!buffer.is_full());
    }

    #[rstest]
    #[case(1, 1)]
    #[case(1, 50)]
    #[case(3, 16)]
    #[case(7, 7)]
    #[case(16, 3)]
    #[case(64, 256)]
    #[case(4096, 100)]
    #[case(4096, 1_000_000)]
    fn test_chunk_boundaries(#[case] buf_size: usize, #[case] chunk_size: usize) {
        let input = sample_input(200);
        let expected = Vec::from_iter(input.lines());

        let chunks = read_chunks(&input, buf_size, chunk_size);
        let actual = Vec::from_iter(chunks.iter().flat_map(Chunk::lines));

        assert_eq!(actual, expected);
        assert!(chunks.iter().all(|chunk| !chunk.is_empty()));
    }

    #[test]
    fn test_chunk_size_is_bounded() {
        let input = sample_input(500);
        let longest_line = input.lines().map(|line| line.len() + 1).max().unwrap();

        for chunk in read_chunks(&input, 10, 100) {
            assert!(chunk.text_len() < 100 + 10 + longest_line);
        }
    }

    #[rstest]
    #[case("1. no newline at the end", vec!["1. no newline at the end"])]
    #[case("1. a\n2. b", vec!["1. a", "2. b"])]
    #[case("1. a\r\n2. b\r\n", vec!["1. a", "2. b"])]
    #[case("", vec![])]
    fn test_end_of_input(#[case] input: &str, #[case] expected: Vec<&str>) {
        let chunks = read_chunks(input, 2, 4);
        let actual = Vec::from_iter(chunks.iter().flat_map(Chunk::lines));
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_malformed_line_is_reported() {
        let mut reader = ChunkReader::new("1. fine\nbroken line\n2. fine\n".as_bytes(), 4, 1024);

        match reader.next() {
            Some(Err(SortError::MalformedRecord(_))) => {}
            other => panic!("unexpected result: {:?}", other.map(|r| r.map(|c| c.len()))),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_reported() {
        let input: &[u8] = b"1. caf\xE9\n";
        let result: Result<Vec<_>, _> = ChunkReader::new(input, 16, 16).collect();
        assert!(matches!(result, Err(SortError::InvalidUtf8(_))));
    }

    #[test]
    fn test_reader_with_gate_releases_permits() {
        let gate = AdmissionGate::default();
        let input = sample_input(50);

        let chunks: Vec<Chunk> = ChunkReader::new(input.as_bytes(), 8, 64)
            .with_gate(&gate)
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(chunks.len() > 1);
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut lines = Vec::from_iter(sample_input(300).lines().map(str::to_string));
        lines.push("5. APPLE".to_string());
        lines.push("5. apple".to_string());
        lines.shuffle(&mut rand::thread_rng());

        let mut chunk = Chunk::from_text(lines.join("\n")).unwrap();
        chunk.sort();
        let sorted = Vec::from_iter(chunk.lines().map(str::to_string));

        let mut resorted = Chunk::from_text(sorted.join("\n")).unwrap();
        resorted.sort();
        assert_eq!(Vec::from_iter(resorted.lines()), sorted);
    }

    #[test]
    fn test_chunk_sort() {
        let mut chunk = Chunk::from_text("3. Banana\n10. Apple\n2. Apple\n1. banana\n".to_string()).unwrap();
        chunk.sort();
        assert_eq!(
            Vec::from_iter(chunk.lines()),
            vec!["2. Apple", "10. Apple", "1. banana", "3. Banana"]
        );
    }

    #[rstest]
    #[case(b"\xEF\xBB\xBF1. a\n", Some(b"1. a\n".to_vec()))]
    #[case(b"1. a\n", Some(b"1. a\n".to_vec()))]
    #[case(b"1.", Some(b"1.".to_vec()))]
    #[case(b"", Some(vec![]))]
    #[case(b"\xFF\xFE1\x00", None)]
    #[case(b"\xFE\xFF\x001", None)]
    #[case(b"\xFF\xFE\x00\x00", None)]
    fn test_byte_order_mark(#[case] input: &[u8], #[case] expected: Option<Vec<u8>>) {
        match skip_byte_order_mark(input) {
            Ok(mut reader) => {
                let mut actual = Vec::new();
                reader.read_to_end(&mut actual).unwrap();
                assert_eq!(Some(actual), expected);
            }
            Err(SortError::UnsupportedEncoding(_)) => assert_eq!(expected, None),
            Err(err) => panic!("unexpected error: {}", err),
        }
    }

    #[test]
    fn test_read_error_is_reported() {
        struct FailingReader;

        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "test error"))
            }
        }

        let result: Result<Vec<_>, _> = ChunkReader::new(FailingReader, 16, 16).collect();
        assert!(matches!(result, Err(SortError::IO(_))));
    }
}
