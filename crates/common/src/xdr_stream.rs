//! XDR frame streams for size-prefixed binary records.
//!
//! Implements the wire format of stellar-core's `XDROutputFileStream`. Each
//! record is one or more fragments of:
//!
//! ```text
//! [4-byte big-endian size | payload]
//! ```
//!
//! Bit 31 of the size word marks the final fragment of a record, per the XDR
//! record marking standard (RFC 1832 / RFC 4506); the lower 31 bits carry
//! the fragment's byte count. stellar-core emits every record as a single
//! fragment with the bit set, but readers must accept fragmented records
//! since the convention permits them.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use stellar_xdr::curr::{Limits, ReadXdr, WriteXdr};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

/// Bit 31 of a fragment's size word: set on the final fragment of a record.
const TERMINAL_FRAGMENT_BIT: u32 = 1 << 31;

/// Upper bound on a record (2 GiB); the size word cannot express more, and
/// anything claiming to is treated as malformed.
const MAX_RECORD_SIZE: u64 = TERMINAL_FRAGMENT_BIT as u64;

/// Reads size-prefixed XDR records off an async byte stream.
///
/// The reader is stateless across records: every [`read_one`] call assumes
/// the stream is positioned on a record boundary, which holds as long as the
/// previous call succeeded.
///
/// [`read_one`]: XdrFramedReader::read_one
pub struct XdrFramedReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> XdrFramedReader<R> {
    /// Wrap a byte stream positioned on a record boundary.
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Read one framed XDR value from the stream.
    ///
    /// Returns `Ok(None)` on a clean end of stream at a record boundary.
    /// End of stream inside a header or payload is surfaced as
    /// [`io::ErrorKind::UnexpectedEof`] (a truncated frame); a payload that
    /// does not decode is [`io::ErrorKind::InvalidData`].
    pub async fn read_one<T: ReadXdr>(&mut self) -> io::Result<Option<T>> {
        let mut payload = Vec::new();
        loop {
            let word = match self.read_fragment_header(payload.is_empty()).await? {
                Some(word) => word,
                None => return Ok(None),
            };

            let last_fragment = word & TERMINAL_FRAGMENT_BIT != 0;
            let size = word & !TERMINAL_FRAGMENT_BIT;

            if payload.len() as u64 + size as u64 > MAX_RECORD_SIZE {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("framed record exceeds {} bytes", MAX_RECORD_SIZE),
                ));
            }

            let start = payload.len();
            payload.resize(start + size as usize, 0);
            self.reader.read_exact(&mut payload[start..]).await?;

            if last_fragment {
                break;
            }
        }

        let value = T::from_xdr(&payload, Limits::none())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(value))
    }

    /// Read a 4-byte fragment header as its big-endian size word.
    /// `at_boundary` selects whether an immediate end of stream is a clean
    /// end (`None`) or a truncation.
    async fn read_fragment_header(&mut self, at_boundary: bool) -> io::Result<Option<u32>> {
        let mut header = [0u8; 4];
        let mut filled = 0;
        while filled < header.len() {
            let n = self.reader.read(&mut header[filled..]).await?;
            if n == 0 {
                if filled == 0 && at_boundary {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated frame header",
                ));
            }
            filled += n;
        }
        Ok(Some(u32::from_be_bytes(header)))
    }
}

/// Writes XDR values as size-prefixed frames.
///
/// The counterpart of [`XdrFramedReader`]: every value becomes a single
/// fragment whose size word carries the terminal-fragment bit, which is the
/// shape stellar-core itself emits, so downstream consumers of a captive
/// core can read our output too.
pub struct XdrOutputStream<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> XdrOutputStream<W> {
    /// Wrap any writer positioned on a record boundary.
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Serialize `value` and write it as one terminal fragment.
    ///
    /// The frame is flushed to the underlying writer before returning, so a
    /// consumer on the other end of a pipe never waits on a half-buffered
    /// record. Returns the number of bytes written, header included. A
    /// record whose encoding cannot fit the 31-bit size word is refused
    /// with [`io::ErrorKind::InvalidData`].
    pub fn write_one<T: WriteXdr>(&mut self, value: &T) -> io::Result<usize> {
        let payload = value
            .to_xdr(Limits::none())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if payload.len() as u64 >= MAX_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("refusing to frame a {} byte record", payload.len()),
            ));
        }
        let word = payload.len() as u32 | TERMINAL_FRAGMENT_BIT;

        self.writer.write_all(&word.to_be_bytes())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;

        Ok(4 + payload.len())
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl XdrOutputStream<File> {
    /// Create a stream writing to `path`, truncating anything already
    /// there. Works for regular files and named pipes (FIFOs).
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?))
    }

    /// Adopt a raw file descriptor already open for writing.
    ///
    /// # Safety
    ///
    /// `fd` must be valid and open for writing, and nothing else may use it
    /// afterwards: the stream takes ownership and closes it on drop.
    #[cfg(unix)]
    pub unsafe fn from_raw_fd(fd: std::os::unix::io::RawFd) -> Self {
        use std::os::unix::io::FromRawFd;
        Self::new(File::from_raw_fd(fd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use stellar_xdr::curr::{LedgerCloseMeta, LedgerCloseMetaV0};

    /// A thread-safe in-memory writer that allows reading the buffer after
    /// writing.
    #[derive(Clone)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Vec::new())))
        }
        fn data(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn meta_with_seq(seq: u32) -> LedgerCloseMeta {
        let mut v0 = LedgerCloseMetaV0::default();
        v0.ledger_header.header.ledger_seq = seq;
        LedgerCloseMeta::V0(v0)
    }

    #[test]
    fn test_write_one_header_format() {
        let buf = SharedBuffer::new();
        let mut stream = XdrOutputStream::new(buf.clone());

        let meta = meta_with_seq(7);
        let bytes_written = stream.write_one(&meta).unwrap();

        let data = buf.data();
        assert!(data[0] & 0x80 != 0, "terminal-fragment bit must be set");

        let word = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        assert_eq!((word & !TERMINAL_FRAGMENT_BIT) as usize, data.len() - 4);
        assert_eq!(bytes_written, data.len());

        let decoded = LedgerCloseMeta::from_xdr(&data[4..], Limits::none()).unwrap();
        assert_eq!(
            decoded.to_xdr(Limits::none()).unwrap(),
            meta.to_xdr(Limits::none()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_read_one_roundtrip() {
        let buf = SharedBuffer::new();
        let mut out = XdrOutputStream::new(buf.clone());
        out.write_one(&meta_with_seq(1)).unwrap();
        out.write_one(&meta_with_seq(2)).unwrap();

        let data = buf.data();
        let mut reader = XdrFramedReader::new(data.as_slice());

        let first: LedgerCloseMeta = reader.read_one().await.unwrap().unwrap();
        let second: LedgerCloseMeta = reader.read_one().await.unwrap().unwrap();
        assert_eq!(
            first.to_xdr(Limits::none()).unwrap(),
            meta_with_seq(1).to_xdr(Limits::none()).unwrap()
        );
        assert_eq!(
            second.to_xdr(Limits::none()).unwrap(),
            meta_with_seq(2).to_xdr(Limits::none()).unwrap()
        );

        // Third read hits a clean end of stream.
        let done: Option<LedgerCloseMeta> = reader.read_one().await.unwrap();
        assert!(done.is_none());
    }

    #[tokio::test]
    async fn test_read_one_empty_stream() {
        let mut reader = XdrFramedReader::new(&[][..]);
        let entry: Option<LedgerCloseMeta> = reader.read_one().await.unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn test_read_one_truncated_header() {
        // Only 2 bytes of a 4-byte header.
        let mut reader = XdrFramedReader::new(&[0x80u8, 0x00][..]);
        let result: io::Result<Option<LedgerCloseMeta>> = reader.read_one().await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_read_one_truncated_payload() {
        // Header promising 100 bytes, followed by only 4.
        let mut data = vec![0x80, 0x00, 0x00, 100];
        data.extend_from_slice(&[0u8; 4]);
        let mut reader = XdrFramedReader::new(data.as_slice());
        let result: io::Result<Option<LedgerCloseMeta>> = reader.read_one().await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_read_one_garbage_payload() {
        // Well-formed frame whose payload is not valid XDR for the type.
        let mut data = vec![0x80, 0x00, 0x00, 3];
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        let mut reader = XdrFramedReader::new(data.as_slice());
        let result: io::Result<Option<LedgerCloseMeta>> = reader.read_one().await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_read_one_fragmented_record() {
        // The same record split into two fragments: the first without the
        // terminal bit, the second with it.
        let meta = meta_with_seq(42);
        let payload = meta.to_xdr(Limits::none()).unwrap();
        let split = payload.len() / 2;

        let mut data = Vec::new();
        data.extend_from_slice(&(split as u32).to_be_bytes());
        data.extend_from_slice(&payload[..split]);
        let rest = (payload.len() - split) as u32 | TERMINAL_FRAGMENT_BIT;
        data.extend_from_slice(&rest.to_be_bytes());
        data.extend_from_slice(&payload[split..]);

        let mut reader = XdrFramedReader::new(data.as_slice());
        let decoded: LedgerCloseMeta = reader.read_one().await.unwrap().unwrap();
        assert_eq!(
            decoded.to_xdr(Limits::none()).unwrap(),
            meta.to_xdr(Limits::none()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_read_one_eof_between_fragments() {
        // A non-terminal fragment followed by end of stream is a truncation,
        // not a clean end.
        let mut data = vec![0x00, 0x00, 0x00, 2];
        data.extend_from_slice(&[0xAB, 0xCD]);
        let mut reader = XdrFramedReader::new(data.as_slice());
        let result: io::Result<Option<LedgerCloseMeta>> = reader.read_one().await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_write_one_to_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();

        {
            let mut out = XdrOutputStream::create(&path).unwrap();
            out.write_one(&meta_with_seq(9)).unwrap();
        }

        let data = std::fs::read(&path).unwrap();
        assert!(data[0] & 0x80 != 0);
        let decoded = LedgerCloseMeta::from_xdr(&data[4..], Limits::none()).unwrap();
        assert_eq!(
            decoded.to_xdr(Limits::none()).unwrap(),
            meta_with_seq(9).to_xdr(Limits::none()).unwrap()
        );
    }
}
