//! Byte-level pkt-line framing: the four-hex-digit length prefix and flush
//! marker that every git smart-protocol conversation is built from.
//!
//! Grounded in the teacher's `protocol::utils::read_pkt_line` (pkt-line
//! parsing over a `Bytes` buffer) and `dulwich.protocol.Protocol`, adapted to
//! read/write directly against a blocking transport instead of a
//! pre-buffered byte string.

use std::io::{self, Read, Write};

use bytes::BytesMut;

use crate::error::TransportError;

/// Direction of a physical read/write, passed to the optional activity hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

const MIN_PKT_LEN: usize = 4;
const MAX_PKT_LEN: usize = 0xffff;

/// Wraps a transport's reader and writer halves with pkt-line framing.
///
/// `report_activity`, when set, is invoked after every physical read or
/// write with the number of bytes transferred — used for diagnostics only,
/// never for flow control. It is called synchronously from the owning task
/// and must be reentrant-safe.
pub struct Framer<R, W> {
    reader: R,
    writer: W,
    report_activity: Option<Box<dyn FnMut(usize, Direction)>>,
}

/// A single pkt-line payload, or the flush marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Flush,
    Data(Vec<u8>),
}

impl Packet {
    pub fn is_flush(&self) -> bool {
        matches!(self, Packet::Flush)
    }

    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            Packet::Flush => None,
            Packet::Data(d) => Some(d),
        }
    }
}

impl<R: Read, W: Write> Framer<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            report_activity: None,
        }
    }

    pub fn with_activity_hook(mut self, hook: Box<dyn FnMut(usize, Direction)>) -> Self {
        self.report_activity = Some(hook);
        self
    }

    fn note(&mut self, n: usize, dir: Direction) {
        if let Some(hook) = self.report_activity.as_mut() {
            hook(n, dir);
        }
    }

    /// Read exactly one pkt-line: a length prefix and, unless it was a flush
    /// packet, its payload verbatim (embedded newlines included; the
    /// trailing `\n` convention is not stripped here).
    pub fn read_packet(&mut self) -> Result<Packet, TransportError> {
        let mut len_buf = [0u8; MIN_PKT_LEN];
        match read_exact_or_eof(&mut self.reader, &mut len_buf)? {
            0 => {
                return Err(TransportError::protocol(
                    "end of stream while reading pkt-line length prefix",
                ));
            }
            n if n < MIN_PKT_LEN => {
                return Err(TransportError::protocol(
                    "truncated pkt-line length prefix",
                ));
            }
            _ => {}
        }
        self.note(MIN_PKT_LEN, Direction::Read);

        let len_str = std::str::from_utf8(&len_buf).map_err(|_| {
            TransportError::protocol("pkt-line length prefix is not valid UTF-8")
        })?;
        let len = usize::from_str_radix(len_str, 16)
            .map_err(|_| TransportError::protocol(format!("pkt-line length `{len_str}` is not hex")))?;

        if len == 0 {
            return Ok(Packet::Flush);
        }
        if len < MIN_PKT_LEN || len > MAX_PKT_LEN {
            return Err(TransportError::protocol(format!(
                "invalid pkt-line length {len}"
            )));
        }

        let payload_len = len - MIN_PKT_LEN;
        let mut payload = vec![0u8; payload_len];
        self.reader.read_exact(&mut payload).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                TransportError::protocol("pkt-line payload shorter than declared length")
            } else {
                TransportError::Io(e)
            }
        })?;
        self.note(payload_len, Direction::Read);

        Ok(Packet::Data(payload))
    }

    /// Read pkt-lines until (and not including) a flush packet.
    pub fn read_sequence(&mut self) -> Result<Vec<Vec<u8>>, TransportError> {
        let mut out = Vec::new();
        loop {
            match self.read_packet()? {
                Packet::Flush => break,
                Packet::Data(d) => out.push(d),
            }
        }
        Ok(out)
    }

    /// Write a single pkt-line. `None` writes the flush marker `"0000"`.
    pub fn write_packet(&mut self, payload: Option<&[u8]>) -> Result<(), TransportError> {
        match payload {
            None => {
                self.writer.write_all(b"0000")?;
                self.note(4, Direction::Write);
            }
            Some(data) => {
                let len = data.len() + MIN_PKT_LEN;
                if len > MAX_PKT_LEN {
                    return Err(TransportError::protocol(format!(
                        "pkt-line payload too long ({len} bytes)"
                    )));
                }
                let header = format!("{len:04x}");
                self.writer.write_all(header.as_bytes())?;
                self.writer.write_all(data)?;
                self.note(len, Direction::Write);
            }
        }
        Ok(())
    }

    /// Write a pkt-line carrying a UTF-8 string payload (the common case for
    /// protocol commands like `want <id>\n`).
    pub fn write_packet_str(&mut self, payload: &str) -> Result<(), TransportError> {
        self.write_packet(Some(payload.as_bytes()))
    }

    /// Write the flush marker.
    pub fn write_flush(&mut self) -> Result<(), TransportError> {
        self.write_packet(None)
    }

    /// Write untransformed bytes, bypassing pkt-line framing entirely. Used
    /// to stream pack data once negotiation has finished.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.writer.write_all(bytes)?;
        self.note(bytes.len(), Direction::Write);
        Ok(())
    }

    /// Read raw bytes into `buf`, bypassing pkt-line framing. Returns the
    /// number of bytes read (0 at end of stream).
    pub fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = self.reader.read(buf)?;
        self.note(n, Direction::Read);
        Ok(n)
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Confirms the transport has nothing left to send: a single byte read
    /// returning `0` is a clean end-of-stream, anything else is unexpected
    /// trailing data the caller never asked for. Used by both conversations
    /// once their response has been fully consumed (spec.md §4.E step 7,
    /// §4.F step 8, §7 "unexpected trailing bytes").
    pub fn expect_eof(&mut self) -> Result<(), TransportError> {
        let mut trailing = [0u8; 1];
        if self.read_raw(&mut trailing)? != 0 {
            return Err(TransportError::protocol(
                "unexpected trailing bytes after the conversation's final read",
            ));
        }
        Ok(())
    }
}

/// Incrementally parses pkt-lines out of byte chunks that are not
/// necessarily aligned on pkt-line boundaries — needed because side-band
/// channel payloads are chopped up by the outer side-band framing without
/// regard to the inner pkt-line structure they carry (e.g. report-status
/// lines on a pushed channel 1). Ported from `dulwich.protocol.PktLineParser`.
#[derive(Debug, Default)]
pub struct IncrementalParser {
    buf: BytesMut,
}

impl IncrementalParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes in and drain every pkt-line that is now complete.
    /// Incomplete trailing data stays buffered for the next call.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Packet>, TransportError> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();
        loop {
            if self.buf.len() < MIN_PKT_LEN {
                break;
            }
            let len_str = std::str::from_utf8(&self.buf[..MIN_PKT_LEN])
                .map_err(|_| TransportError::protocol("pkt-line length prefix is not valid UTF-8"))?;
            let len = usize::from_str_radix(len_str, 16).map_err(|_| {
                TransportError::protocol(format!("pkt-line length `{len_str}` is not hex"))
            })?;
            if len == 0 {
                self.buf.split_to(MIN_PKT_LEN);
                out.push(Packet::Flush);
                continue;
            }
            if len < MIN_PKT_LEN || len > MAX_PKT_LEN {
                return Err(TransportError::protocol(format!(
                    "invalid pkt-line length {len}"
                )));
            }
            if self.buf.len() < len {
                break; // wait for more data
            }
            let frame = self.buf.split_to(len);
            out.push(Packet::Data(frame[MIN_PKT_LEN..].to_vec()));
        }
        Ok(out)
    }
}

/// Like `Read::read_exact`, but returns the number of bytes actually read
/// instead of erroring when the stream ends before the buffer is full — the
/// caller distinguishes "clean EOF" (0 bytes) from "truncated frame".
fn read_exact_or_eof(r: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match r.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn framer(input: &[u8]) -> Framer<Cursor<Vec<u8>>, Vec<u8>> {
        Framer::new(Cursor::new(input.to_vec()), Vec::new())
    }

    #[test]
    fn round_trips_a_data_packet() {
        let mut buf = Vec::new();
        {
            let mut f = Framer::new(Cursor::new(Vec::new()), &mut buf);
            f.write_packet_str("want abc\n").unwrap();
        }
        let mut f = framer(&buf);
        match f.read_packet().unwrap() {
            Packet::Data(d) => assert_eq!(d, b"want abc\n"),
            Packet::Flush => panic!("expected data packet"),
        }
    }

    #[test]
    fn flush_ends_a_sequence_and_is_not_yielded() {
        let mut buf = Vec::new();
        {
            let mut f = Framer::new(Cursor::new(Vec::new()), &mut buf);
            f.write_packet_str("a").unwrap();
            f.write_packet_str("b").unwrap();
            f.write_flush().unwrap();
        }
        let mut f = framer(&buf);
        let seq = f.read_sequence().unwrap();
        assert_eq!(seq, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn rejects_non_hex_length() {
        let mut f = framer(b"zzzzpayload");
        assert!(f.read_packet().is_err());
    }

    #[test]
    fn rejects_truncated_payload() {
        // Declares 10 bytes of payload but only provides 2.
        let mut f = framer(b"000eab");
        assert!(f.read_packet().is_err());
    }

    #[test]
    fn absent_payload_writes_flush() {
        let mut buf = Vec::new();
        {
            let mut f = Framer::new(Cursor::new(Vec::new()), &mut buf);
            f.write_packet(None).unwrap();
        }
        assert_eq!(buf, b"0000");
    }

    #[test]
    fn incremental_parser_handles_split_chunks() {
        let mut parser = IncrementalParser::new();
        // "unpack ok\n" as a pkt-line, split mid-frame across two feeds.
        let full = b"000eunpack ok\n".to_vec();
        let (first, second) = full.split_at(5);
        assert!(parser.feed(first).unwrap().is_empty());
        let pkts = parser.feed(second).unwrap();
        assert_eq!(pkts, vec![Packet::Data(b"unpack ok\n".to_vec())]);
    }

    #[test]
    fn incremental_parser_yields_flush() {
        let mut parser = IncrementalParser::new();
        let pkts = parser.feed(b"0000").unwrap();
        assert_eq!(pkts, vec![Packet::Flush]);
    }
}
