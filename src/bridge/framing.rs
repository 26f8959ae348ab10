//! RFC 4571 framing
//!
//! Each record is a 2-byte big-endian length followed by exactly that many
//! payload bytes. The same layout is used on the media socket and in replay
//! capture files.

use std::io::{self, Read};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Length prefix size
pub const HEADER_LEN: usize = 2;

/// Largest payload a record can carry
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Encode one record
///
/// Returns `None` if the payload is too large for the length prefix.
pub fn encode(payload: &[u8]) -> Option<Bytes> {
    let len = u16::try_from(payload.len()).ok()?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u16(len);
    buf.put_slice(payload);
    Some(buf.freeze())
}

/// Write one record, waiting for the socket to accept it
///
/// Returns the number of bytes written including the prefix.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let record = encode(payload).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds {}", payload.len(), MAX_FRAME_LEN),
        )
    })?;
    writer.write_all(&record).await?;
    Ok(record.len())
}

/// Read one record
///
/// Returns `Ok(None)` on a clean end of stream between records. A stream that
/// ends inside a header or payload is `UnexpectedEof`.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;

    let len = u16::from_be_bytes(header) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Bytes::from(payload)))
}

/// Blocking record reader over any `Read`
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a reader
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next record; `Ok(None)` at a clean end of stream
    pub fn next_record(&mut self) -> io::Result<Option<Bytes>> {
        let mut header = [0u8; HEADER_LEN];
        loop {
            match self.inner.read(&mut header[..1]) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.inner.read_exact(&mut header[1..])?;

        let len = u16::from_be_bytes(header) as usize;
        let mut payload = vec![0u8; len];
        self.inner.read_exact(&mut payload)?;
        Ok(Some(Bytes::from(payload)))
    }

    /// Mutable access to the inner reader
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_header() {
        let record = encode(&[0xAA; 300]).unwrap();

        assert_eq!(record.len(), 302);
        assert_eq!(&record[..2], &[0x01, 0x2C]);
        assert!(record[2..].iter().all(|b| *b == 0xAA));
    }

    #[test]
    fn test_encode_limits() {
        assert!(encode(&[]).is_some());
        assert!(encode(&vec![0u8; MAX_FRAME_LEN]).is_some());
        assert!(encode(&vec![0u8; MAX_FRAME_LEN + 1]).is_none());
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mut out = Vec::new();
        let n = write_frame(&mut out, b"abc").await.unwrap();

        assert_eq!(n, 5);
        assert_eq!(out, vec![0x00, 0x03, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn test_write_frame_too_large() {
        let mut out = Vec::new();
        let err = write_frame(&mut out, &vec![0u8; MAX_FRAME_LEN + 1])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_read_frames_until_eof() {
        let data: &[u8] = &[0x00, 0x01, 0x07, 0x00, 0x00, 0x00, 0x02, 0x08, 0x09];
        let mut reader = data;

        assert_eq!(read_frame(&mut reader).await.unwrap().unwrap(), &[0x07][..]);
        assert_eq!(read_frame(&mut reader).await.unwrap().unwrap(), &[][..]);
        assert_eq!(read_frame(&mut reader).await.unwrap().unwrap(), &[0x08, 0x09][..]);
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_truncated_payload() {
        let data: &[u8] = &[0x00, 0x05, 0x01];
        let mut reader = data;

        let err = read_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_read_truncated_header() {
        let data: &[u8] = &[0x00, 0x01, 0x07, 0x00];
        let mut reader = data;

        assert_eq!(read_frame(&mut reader).await.unwrap().unwrap(), &[0x07][..]);
        let err = read_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_blocking_reader_truncated_header() {
        let data: &[u8] = &[0x00, 0x01, 0x03, 0x00];
        let mut reader = FrameReader::new(data);

        assert_eq!(reader.next_record().unwrap().unwrap(), &[0x03][..]);
        let err = reader.next_record().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_blocking_reader() {
        let data: &[u8] = &[0x00, 0x02, 0x01, 0x02, 0x00, 0x01, 0x03];
        let mut reader = FrameReader::new(data);

        assert_eq!(reader.next_record().unwrap().unwrap(), &[0x01, 0x02][..]);
        assert_eq!(reader.next_record().unwrap().unwrap(), &[0x03][..]);
        assert!(reader.next_record().unwrap().is_none());
    }
}
