use bytes::{Buf, Bytes, BytesMut};

use crate::Error;

const CRLF: &[u8] = b"\r\n";
const CRLFCRLF: &[u8] = b"\r\n\r\n";
const BOUNDARY_LAST_PART_SENTINEL: &[u8] = b"--";

/// Outcome of one scan over the buffered input.
#[derive(Debug, PartialEq)]
pub(crate) enum Scan {
    /// Bytes that can no longer be part of a delimiter.
    Body(Bytes),
    /// A complete delimiter line. `body` is everything that preceded it.
    Boundary { body: Bytes, terminal: bool },
    NeedMore,
}

enum Tail {
    Incomplete,
    NotBoundary,
    Next(usize),
    Terminal,
}

/// Incremental boundary scanner over an append-only buffer.
///
/// Every delimiter is searched for as `\r\n--{boundary}`. The buffer starts out
/// holding a CRLF, so a boundary on the very first line of the body is found by
/// the same search as all the others.
#[derive(Debug)]
pub(crate) struct ByteScanner {
    delimiter: Vec<u8>,
    buffer: BytesMut,
}

impl ByteScanner {
    pub fn with_capacity<S: AsRef<str>>(boundary: S, capacity: usize) -> Self {
        let delimiter = format!("\r\n--{}", boundary.as_ref()).into_bytes();

        log::debug!("Creating scanner with delimiter: {:?}", String::from_utf8_lossy(&delimiter));

        let mut buffer = BytesMut::with_capacity(capacity.max(delimiter.len() + 4));
        buffer.extend_from_slice(CRLF);

        Self { delimiter, buffer }
    }

    pub fn feed<T: AsRef<[u8]>>(&mut self, chunk: T) {
        self.buffer.extend_from_slice(chunk.as_ref());
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Looks for the next delimiter, handing out whatever precedes it.
    ///
    /// A delimiter must be followed by `--` (terminal), or by optional
    /// whitespace and CRLF. Anything else makes it literal content.
    pub fn scan(&mut self) -> Scan {
        let mut from = 0;

        loop {
            let at = match twoway::find_bytes(&self.buffer[from..], &self.delimiter) {
                Some(i) => from + i,
                None => {
                    let keep = partial_delimiter_len(&self.buffer[from..], &self.delimiter);
                    let safe = self.buffer.len() - keep;
                    if safe == 0 {
                        return Scan::NeedMore;
                    }
                    return Scan::Body(self.buffer.split_to(safe).freeze());
                }
            };

            let after = at + self.delimiter.len();
            match classify_tail(&self.buffer[after..]) {
                Tail::NotBoundary => {
                    log::trace!("Delimiter at {} is not followed by CRLF, treating as content", at);
                    from = at + 1;
                }

                Tail::Incomplete => {
                    if at == 0 {
                        return Scan::NeedMore;
                    }
                    return Scan::Body(self.buffer.split_to(at).freeze());
                }

                Tail::Next(n) => {
                    let body = self.buffer.split_to(at).freeze();
                    self.buffer.advance(self.delimiter.len() + n);
                    return Scan::Boundary {
                        body,
                        terminal: false,
                    };
                }

                Tail::Terminal => {
                    log::debug!("Found terminal boundary at index: {}", at);

                    let body = self.buffer.split_to(at).freeze();
                    // Whatever follows is epilogue.
                    self.buffer.clear();
                    return Scan::Boundary {
                        body,
                        terminal: true,
                    };
                }
            }
        }
    }

    /// Splits off the header block of a part, right after its boundary line.
    ///
    /// Returns `Ok(None)` until the blank line ending the block has arrived.
    pub fn take_header_block(&mut self, max_size: usize) -> Result<Option<Bytes>, Error> {
        // A part without headers starts with the blank line directly.
        if self.buffer.starts_with(CRLF) {
            self.buffer.advance(CRLF.len());
            return Ok(Some(Bytes::new()));
        }

        match twoway::find_bytes(&self.buffer[..], CRLFCRLF) {
            Some(i) if i > max_size => Err(header_overflow(max_size)),
            Some(i) => {
                let block = self.buffer.split_to(i).freeze();
                self.buffer.advance(CRLFCRLF.len());
                Ok(Some(block))
            }
            None if self.buffer.len() > max_size + CRLFCRLF.len() => {
                Err(header_overflow(max_size))
            }
            None => Ok(None),
        }
    }
}

fn header_overflow(max_size: usize) -> Error {
    Error::malformed(format!("header block exceeds {} bytes", max_size))
}

fn classify_tail(tail: &[u8]) -> Tail {
    if tail.len() < 2 {
        return Tail::Incomplete;
    }

    if &tail[..2] == BOUNDARY_LAST_PART_SENTINEL {
        return Tail::Terminal;
    }

    // Transport padding is allowed between the boundary and its CRLF.
    let padding = tail
        .iter()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count();
    let rest = &tail[padding..];

    match rest {
        [] | [b'\r'] => Tail::Incomplete,
        [b'\r', b'\n', ..] => Tail::Next(padding + CRLF.len()),
        _ => Tail::NotBoundary,
    }
}

/// Length of the longest suffix of `data` that is a proper prefix of `delimiter`.
fn partial_delimiter_len(data: &[u8], delimiter: &[u8]) -> usize {
    let max = data.len().min(delimiter.len() - 1);
    (1..=max)
        .rev()
        .find(|&n| data.ends_with(&delimiter[..n]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {

    use super::*;

    fn boundary(body: &str, terminal: bool) -> Scan {
        Scan::Boundary {
            body: Bytes::from(body.to_string()),
            terminal,
        }
    }

    #[test]
    fn scan_boundary_at_start_of_body() {
        let mut s = ByteScanner::with_capacity("simple boundary", 500);
        s.feed("--simple boundary\r\nrest");

        assert_eq!(boundary("", false), s.scan());
        assert_eq!(Scan::Body(Bytes::from_static(b"rest")), s.scan());
        assert_eq!(Scan::NeedMore, s.scan());
    }

    #[test]
    fn scan_skips_preamble() {
        let mut s = ByteScanner::with_capacity("b", 500);
        s.feed("This is the preamble.\r\n--b\r\n");

        assert_eq!(boundary("\r\nThis is the preamble.", false), s.scan());
    }

    #[test]
    fn scan_terminal_boundary_drops_epilogue() {
        let mut s = ByteScanner::with_capacity("b", 500);
        s.feed("--b\r\npart\r\n--b--\r\nThis is the epilogue.");

        assert_eq!(boundary("", false), s.scan());
        assert_eq!(boundary("part", true), s.scan());
        assert_eq!(0, s.buffered());
    }

    #[test]
    fn scan_holds_back_split_delimiter() {
        let mut s = ByteScanner::with_capacity("boundary", 500);
        s.feed("--boundary\r\nhello\r\n--boun");

        assert_eq!(boundary("", false), s.scan());
        assert_eq!(Scan::Body(Bytes::from_static(b"hello")), s.scan());
        assert_eq!(Scan::NeedMore, s.scan());

        s.feed("dary");
        assert_eq!(Scan::NeedMore, s.scan());

        s.feed("\r\n");
        assert_eq!(boundary("", false), s.scan());
    }

    #[test]
    fn scan_treats_unterminated_delimiter_as_content() {
        let mut s = ByteScanner::with_capacity("b", 500);
        s.feed("--b\r\nx\r\n--bx\r\n--b--");

        assert_eq!(boundary("", false), s.scan());
        assert_eq!(boundary("x\r\n--bx", true), s.scan());
    }

    #[test]
    fn scan_accepts_transport_padding() {
        let mut s = ByteScanner::with_capacity("b", 500);
        s.feed("--b \t\r\nbody");

        assert_eq!(boundary("", false), s.scan());
        assert_eq!(Scan::Body(Bytes::from_static(b"body")), s.scan());
    }

    #[test]
    fn take_header_block_waits_for_blank_line() {
        let mut s = ByteScanner::with_capacity("b", 500);
        s.feed("--b\r\nContent-Disposition: form-data; name=\"a\"\r\n");

        assert_eq!(boundary("", false), s.scan());
        assert_eq!(None, s.take_header_block(1024).unwrap());

        s.feed("\r\nvalue");
        let block = s.take_header_block(1024).unwrap().unwrap();
        assert_eq!(&b"Content-Disposition: form-data; name=\"a\""[..], &block[..]);
        assert_eq!(Scan::Body(Bytes::from_static(b"value")), s.scan());
    }

    #[test]
    fn take_header_block_empty() {
        let mut s = ByteScanner::with_capacity("b", 500);
        s.feed("--b\r\n\r\nbody");

        assert_eq!(boundary("", false), s.scan());
        assert_eq!(Some(Bytes::new()), s.take_header_block(1024).unwrap());
    }

    #[test]
    fn take_header_block_overflow() {
        let mut s = ByteScanner::with_capacity("b", 500);
        s.feed("X-Long: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");

        // Skip the seeded CRLF so the block does not look empty.
        s.buffer.advance(2);
        assert!(s.take_header_block(16).is_err());
    }

    #[test]
    fn partial_delimiter_suffix() {
        assert_eq!(0, partial_delimiter_len(b"abc", b"\r\n--b"));
        assert_eq!(1, partial_delimiter_len(b"abc\r", b"\r\n--b"));
        assert_eq!(4, partial_delimiter_len(b"abc\r\n--", b"\r\n--b"));
    }
}
