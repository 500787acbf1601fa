use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Turns chunked bytes into complete lines.
///
/// Lines are terminated by `\n`, one directly preceding `\r` is
/// stripped so `\r\n` and bare `\n` behave identically. A bare `\r`
/// does not terminate a line. Bytes after the last terminator are
/// carried over to the next chunk.
///
/// `close` flushes a non-empty remainder as a final line and then
/// reports end of feed exactly once. A closed scanner ignores
/// further input, it is not restartable.
#[derive(Debug, Default)]
pub struct LineScanner {
    carry: Vec<u8>,
    closed: bool,
}

impl LineScanner {
    pub fn new() -> LineScanner {
        Default::default()
    }

    /// Consumes a chunk, invoking `sink` for every completed line
    pub fn push(&mut self, chunk: &[u8], sink: &mut impl FnMut(&str)) {
        if self.closed {
            return;
        }
        for &byte in chunk {
            if byte == b'\n' {
                if self.carry.last() == Some(&b'\r') {
                    self.carry.pop();
                }
                sink(&String::from_utf8_lossy(&self.carry));
                self.carry.clear();
            } else {
                self.carry.push(byte);
            }
        }
    }

    /// Flushes the remainder (as `Some`) and reports end of feed
    /// (as `None`). Second and later calls do nothing.
    pub fn close(&mut self, sink: &mut impl FnMut(Option<&str>)) {
        if self.closed {
            return;
        }
        self.closed = true;
        if !self.carry.is_empty() {
            let tail = std::mem::take(&mut self.carry);
            sink(Some(&String::from_utf8_lossy(&tail)));
        }
        sink(None);
    }
}

const READ_STORAGE_SIZE: usize = 8 * 1024;

/// Async line-by-line reader over a byte stream.
///
/// Wraps any `AsyncRead` with a [`LineScanner`], reading through a
/// fixed-size buffer. `next_line` resolves to `Ok(None)` at end of
/// stream, after the carried remainder (if any) was returned.
pub struct LineReader<R> {
    source: R,
    scanner: LineScanner,
    ready: VecDeque<String>,
    storage: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(source: R) -> LineReader<R> {
        LineReader {
            source,
            scanner: LineScanner::new(),
            ready: VecDeque::new(),
            storage: vec![0; READ_STORAGE_SIZE],
            eof: false,
        }
    }

    /// Next complete line, or None once the stream is drained
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }
            let read = self.source.read(&mut self.storage).await?;
            let ready = &mut self.ready;
            if read == 0 {
                self.eof = true;
                self.scanner.close(&mut |line| {
                    if let Some(line) = line {
                        ready.push_back(line.to_owned());
                    }
                });
            } else {
                let (scanner, storage) = (&mut self.scanner, &self.storage);
                scanner.push(&storage[..read], &mut |line| {
                    ready.push_back(line.to_owned());
                });
            }
        }
    }

    /// Consumes the reader, returning the underlying stream
    pub fn into_inner(self) -> R {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&[u8]]) -> Vec<Option<String>> {
        let mut scanner = LineScanner::new();
        let mut got = Vec::new();
        for chunk in chunks {
            scanner.push(chunk, &mut |line| got.push(Some(line.to_owned())));
        }
        scanner.close(&mut |line| got.push(line.map(str::to_owned)));
        got
    }

    #[test]
    fn crlf_and_lf_lines() {
        let got = run(&[b"Hello\r\nWorld\nHello\nWorld\r\n"]);
        assert_eq!(
            got,
            vec![
                Some("Hello".to_owned()),
                Some("World".to_owned()),
                Some("Hello".to_owned()),
                Some("World".to_owned()),
                None,
            ]
        );
    }

    #[test]
    fn unterminated_tail_is_flushed() {
        let got = run(&[b"Not terminated"]);
        assert_eq!(got, vec![Some("Not terminated".to_owned()), None]);
    }

    #[test]
    fn line_split_across_chunks() {
        let got = run(&[b"Hel", b"lo\r", b"\nWo", b"rld"]);
        assert_eq!(
            got,
            vec![
                Some("Hello".to_owned()),
                Some("World".to_owned()),
                None,
            ]
        );
    }

    #[test]
    fn bare_cr_is_not_a_terminator() {
        let got = run(&[b"a\rb\n"]);
        assert_eq!(got, vec![Some("a\rb".to_owned()), None]);
    }

    #[test]
    fn empty_input_yields_only_sentinel() {
        let got = run(&[]);
        assert_eq!(got, vec![None]);
    }

    #[test]
    fn sentinel_emitted_exactly_once() {
        let mut scanner = LineScanner::new();
        let mut ends = 0;
        scanner.close(&mut |line| {
            if line.is_none() {
                ends += 1;
            }
        });
        scanner.close(&mut |_| ends += 1);
        scanner.push(b"late\n", &mut |_| ends += 1);
        assert_eq!(ends, 1);
    }

    #[test]
    fn chunk_boundaries_never_change_the_result() {
        let input: &[u8] = b"one\r\ntwo\n\nfour\rstill four\nlast";
        let whole = run(&[input]);
        for split in 1..input.len() {
            let (head, tail) = input.split_at(split);
            assert_eq!(run(&[head, tail]), whole, "split at {}", split);
        }
    }

    #[test]
    fn bytes_are_preserved() {
        // concatenating emitted lines with \n restored gives the
        // input back modulo dropped \r before \n
        let input: &[u8] = b"one\r\ntwo\nthree";
        let got = run(&[input]);
        let lines: Vec<&str> = got
            .iter()
            .filter_map(|l| l.as_deref())
            .collect();
        assert_eq!(lines.join("\n"), "one\ntwo\nthree");
    }

    #[tokio::test]
    async fn line_reader_over_byte_stream() {
        let data: &[u8] = b"alpha\r\nbeta\ngamma";
        let mut reader = LineReader::new(data);
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("alpha"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("beta"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("gamma"));
        assert_eq!(reader.next_line().await.unwrap(), None);
        assert_eq!(reader.next_line().await.unwrap(), None);
    }
}
