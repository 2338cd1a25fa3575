use argon::shared::{FatalKind, NetError, NetResult};
use std::io::{Read, Write};

/// Opening delimiter of a framed record on a link byte stream.
pub const FRAME_START: [u8; 2] = [b'!', b'&'];
/// Closing delimiter.
pub const FRAME_END: [u8; 2] = [b'!', b'#'];

/// Scanner states. `Stop1` means a `!` has been consumed inside the body
/// and the next byte decides whether the frame is over.
enum ScanState {
    Start1,
    Start2,
    Body,
    Stop1,
}

/// Writes `!&` body `!#` to the stream.
pub fn write_frame<W: Write>(stream: &mut W, body: &[u8]) -> NetResult<()> {
    stream.write_all(&FRAME_START)?;
    stream.write_all(body)?;
    stream.write_all(&FRAME_END)?;
    Ok(())
}

/// Scans the stream for the next delimited frame and returns its body.
///
/// A `!` or `&` inside the body survives because `#` only terminates right
/// after a `!`; on any other byte the scanner falls back into the body,
/// keeping what it buffered. A body containing the exact terminator pair
/// `!#` is not representable by this framing; the transport checksum is what
/// catches the rare truncation this causes.
///
/// Bodies longer than `max_len` are rejected as fatal.
pub fn read_frame<R: Read>(stream: &mut R, max_len: usize) -> NetResult<Vec<u8>> {
    let mut body = Vec::new();
    let mut state = ScanState::Start1;

    loop {
        let byte = read_byte(stream)?;

        match state {
            ScanState::Start1 => {
                if byte == b'!' {
                    state = ScanState::Start2;
                }
            }
            ScanState::Start2 => {
                state = match byte {
                    b'&' => ScanState::Body,
                    _ => ScanState::Start1,
                };
            }
            ScanState::Body => {
                body.push(byte);
                if byte == b'!' {
                    state = ScanState::Stop1;
                }
            }
            ScanState::Stop1 => match byte {
                b'#' => {
                    // The buffered trailing `!` belongs to the delimiter.
                    body.pop();
                    return Ok(body);
                }
                b'!' => body.push(byte),
                _ => {
                    body.push(byte);
                    state = ScanState::Body;
                }
            },
        }

        // One byte of slack: a full-length body still buffers the `!` of
        // its own terminator before the `#` arrives.
        if body.len() > max_len + 1 {
            return Err(NetError::Fatal(FatalKind::PayloadTooLarge));
        }
    }
}

#[inline]
fn read_byte<R: Read>(stream: &mut R) -> NetResult<u8> {
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte)?;
    Ok(byte[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::min;
    use std::io;
    use std::io::Cursor;

    const MAX: usize = 4096;

    /// Reader that hands out data in fixed-size chunks, the way a TCP
    /// stream delivers partial reads.
    struct ChunkedStream {
        data: Vec<u8>,
        cursor: usize,
        chunk: usize,
    }

    impl io::Read for ChunkedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.cursor == self.data.len() {
                return Ok(0);
            }

            let count = min(min(self.chunk, buf.len()), self.data.len() - self.cursor);
            buf[..count].copy_from_slice(&self.data[self.cursor..self.cursor + count]);
            self.cursor += count;
            Ok(count)
        }
    }

    fn roundtrip(body: &[u8]) -> Vec<u8> {
        let mut wire = Vec::new();
        write_frame(&mut wire, body).unwrap();
        read_frame(&mut Cursor::new(wire), MAX).unwrap()
    }

    #[test]
    fn test_plain_body() {
        assert_eq!(roundtrip(b"hello"), b"hello");
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(roundtrip(b""), b"");
    }

    #[test]
    fn test_body_with_start_delimiter() {
        assert_eq!(roundtrip(b"ab!&cd"), b"ab!&cd");
    }

    #[test]
    fn test_body_with_double_bang() {
        assert_eq!(roundtrip(b"a!!b"), b"a!!b");
    }

    #[test]
    fn test_body_with_trailing_bang() {
        assert_eq!(roundtrip(b"abc!"), b"abc!");
    }

    #[test]
    fn test_body_with_loose_hash_and_amp() {
        assert_eq!(roundtrip(b"a#b&c"), b"a#b&c");
    }

    #[test]
    fn test_leading_noise_is_skipped() {
        let mut wire: Vec<u8> = b"#&!x".to_vec();
        write_frame(&mut wire, b"payload").unwrap();

        assert_eq!(read_frame(&mut Cursor::new(wire), MAX).unwrap(), b"payload");
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"first!").unwrap();
        write_frame(&mut wire, b"&second").unwrap();

        let mut cursor = Cursor::new(wire);
        assert_eq!(read_frame(&mut cursor, MAX).unwrap(), b"first!");
        assert_eq!(read_frame(&mut cursor, MAX).unwrap(), b"&second");
    }

    #[test]
    fn test_chunked_delivery() {
        let body = b"chunk!ed &body!! with noise".to_vec();
        let mut wire = Vec::new();
        write_frame(&mut wire, &body).unwrap();

        for chunk in 1..8 {
            let mut stream = ChunkedStream {
                data: wire.clone(),
                cursor: 0,
                chunk,
            };
            assert_eq!(read_frame(&mut stream, MAX).unwrap(), body);
        }
    }

    #[test]
    fn test_eof_mid_frame_is_fatal() {
        let wire = b"!&abc".to_vec();
        let result = read_frame(&mut Cursor::new(wire), MAX);

        assert_eq!(
            result.unwrap_err(),
            NetError::Fatal(FatalKind::Io(io::ErrorKind::UnexpectedEof))
        );
    }

    #[test]
    fn test_oversized_body_is_fatal() {
        let mut wire = Vec::new();
        write_frame(&mut wire, &[b'a'; 32]).unwrap();

        let result = read_frame(&mut Cursor::new(wire), 16);
        assert_eq!(result.unwrap_err(), NetError::Fatal(FatalKind::PayloadTooLarge));
    }
}
