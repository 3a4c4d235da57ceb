//! Cursor-addressable byte sources and sinks.
//!
//! A [Stream] is created by the caller, handed to a top-level parse or build
//! call, and outlives it. Constructs never own streams.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::{
    bits::BitOrder,
    errors::{Result, StreamError},
};

/// Reference point for [Stream::seek].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Whence {
    /// Offset is absolute.
    #[default]
    Start,
    /// Offset is relative to the cursor.
    Current,
    /// Offset is relative to the end of the stream.
    End,
}

/// A byte source/sink with a cursor.
///
/// Reads return exactly the requested amount or fail with
/// [StreamError::EndOfStream] without moving the cursor.
pub trait Stream {
    /// Reads exactly `n` units.
    fn read(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Writes `data` at the cursor, overwriting or extending, and advances.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Current cursor position.
    fn tell(&mut self) -> Result<usize>;

    /// Moves the cursor and returns the new absolute position.
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<usize>;

    /// Total length of the stream.
    fn size(&mut self) -> Result<usize>;

    /// True when no data remains after the cursor.
    fn at_end(&mut self) -> Result<bool> {
        Ok(self.tell()? >= self.size()?)
    }

    /// Bit order of an open bit scope, `None` for byte streams.
    fn bit_order(&self) -> Option<BitOrder> {
        None
    }

    /// Reads an `n`-bit unsigned value.
    ///
    /// Byte streams only accept whole-byte widths, read big-endian.
    fn read_bits(&mut self, n: usize) -> Result<u64> {
        if n > 64 {
            return Err(StreamError::TooManyBits(n).into());
        }
        if n % 8 != 0 {
            return Err(StreamError::NotBitScoped { bits: n }.into());
        }

        let bytes = self.read(n / 8)?;
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }

    /// Writes the low `n` bits of `value`.
    ///
    /// Byte streams only accept whole-byte widths, written big-endian.
    fn write_bits(&mut self, n: usize, value: u64) -> Result<()> {
        if n > 64 {
            return Err(StreamError::TooManyBits(n).into());
        }
        if n % 8 != 0 {
            return Err(StreamError::NotBitScoped { bits: n }.into());
        }

        let bytes = value.to_be_bytes();
        self.write(&bytes[8 - n / 8..])
    }
}

fn seek_target(base: usize, offset: i64) -> Result<usize> {
    let target = base as i128 + offset as i128;
    usize::try_from(target).map_err(|_| StreamError::InvalidSeek { target }.into())
}

/// In-memory stream over a `Vec<u8>`.
///
/// Streams created with [MemoryStream::new] are growable: seeking past the
/// end zero-fills up to the target. Streams created from existing bytes
/// reject such seeks.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    data: Vec<u8>,
    pos: usize,
    growable: bool,
}

impl MemoryStream {
    /// Empty, growable stream for building.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            pos: 0,
            growable: true,
        }
    }

    /// Fixed-size stream over `data`, positioned at the start.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            growable: false,
        }
    }

    /// Everything written or loaded so far, regardless of the cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the stream and returns its buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Cursor position; same as [Stream::tell] without needing `&mut`.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream for MemoryStream {
    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let available = self.data.len() - self.pos;
        if n > available {
            return Err(StreamError::EndOfStream {
                requested: n,
                available,
            }
            .into());
        }

        let out = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(out)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let end = self.pos + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    fn tell(&mut self) -> Result<usize> {
        Ok(self.pos)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<usize> {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.pos,
            Whence::End => self.data.len(),
        };
        let target = seek_target(base, offset)?;

        if target > self.data.len() {
            if !self.growable {
                return Err(StreamError::InvalidSeek {
                    target: target as i128,
                }
                .into());
            }
            self.data.resize(target, 0);
        }

        self.pos = target;
        Ok(target)
    }

    fn size(&mut self) -> Result<usize> {
        Ok(self.data.len())
    }
}

/// Stream over any std I/O handle that can read, write and seek (e.g. a `File`).
///
/// Like [MemoryStream], seeks past the end are rejected unless the stream was
/// opened with [IoStream::growable], in which case the gap is zero-filled.
#[derive(Debug)]
pub struct IoStream<T> {
    inner: T,
    growable: bool,
}

impl<T> IoStream<T> {
    /// Fixed-size stream over `inner`; seeking past its end fails.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            growable: false,
        }
    }

    /// Stream for building into `inner`; seeking past the end zero-fills.
    pub fn growable(inner: T) -> Self {
        Self {
            inner,
            growable: true,
        }
    }

    /// Returns the wrapped handle.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn io_error(err: io::Error) -> crate::errors::Error {
    StreamError::Io(err.to_string()).into()
}

impl<T: Read + Write + Seek> Stream for IoStream<T> {
    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let start = self.tell()?;
        let available = self.size()?.saturating_sub(start);
        if n > available {
            return Err(StreamError::EndOfStream {
                requested: n,
                available,
            }
            .into());
        }

        let mut buf = vec![0u8; n];
        match self.inner.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                // The handle shrank underneath us.
                self.inner
                    .seek(SeekFrom::Start(start as u64))
                    .map_err(io_error)?;
                let available = self.size()?.saturating_sub(start);
                Err(StreamError::EndOfStream {
                    requested: n,
                    available,
                }
                .into())
            }
            Err(err) => Err(io_error(err)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data).map_err(io_error)
    }

    fn tell(&mut self) -> Result<usize> {
        let pos = self.inner.stream_position().map_err(io_error)?;
        Ok(pos as usize)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<usize> {
        let size = self.size()?;
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.tell()?,
            Whence::End => size,
        };
        let target = seek_target(base, offset)?;

        if target > size {
            if !self.growable {
                return Err(StreamError::InvalidSeek {
                    target: target as i128,
                }
                .into());
            }
            self.inner
                .seek(SeekFrom::Start(size as u64))
                .map_err(io_error)?;
            io::copy(&mut io::repeat(0).take((target - size) as u64), &mut self.inner)
                .map_err(io_error)?;
        }

        let pos = self
            .inner
            .seek(SeekFrom::Start(target as u64))
            .map_err(io_error)?;
        Ok(pos as usize)
    }

    fn size(&mut self) -> Result<usize> {
        let pos = self.inner.stream_position().map_err(io_error)?;
        let end = self.inner.seek(SeekFrom::End(0)).map_err(io_error)?;
        self.inner.seek(SeekFrom::Start(pos)).map_err(io_error)?;
        Ok(end as usize)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_read_exact_or_fail() {
        let mut s = MemoryStream::from_bytes(b"abcdef".to_vec());
        assert_eq!(s.read(3).unwrap(), b"abc");
        let err = s.read(4).unwrap_err();
        assert!(err.is_end_of_stream());
        assert_eq!(s.tell().unwrap(), 3);
        assert_eq!(s.read(3).unwrap(), b"def");
        assert!(s.at_end().unwrap());
    }

    #[test]
    fn test_write_overwrites_and_extends() {
        let mut s = MemoryStream::new();
        s.write(b"abcd").unwrap();
        s.seek(2, Whence::Start).unwrap();
        s.write(b"XYZ").unwrap();
        assert_eq!(s.as_bytes(), b"abXYZ");
    }

    #[test]
    fn test_seek() {
        let mut s = MemoryStream::from_bytes(vec![0; 8]);
        assert_eq!(s.seek(-2, Whence::End).unwrap(), 6);
        assert_eq!(s.seek(-1, Whence::Current).unwrap(), 5);
        assert!(s.seek(-1, Whence::Start).is_err());
        assert!(s.seek(9, Whence::Start).is_err());
        assert_eq!(s.tell().unwrap(), 5);
    }

    #[test]
    fn test_growable_seek_zero_fills() {
        let mut s = MemoryStream::new();
        s.seek(3, Whence::Start).unwrap();
        s.write(&[7]).unwrap();
        assert_eq!(s.into_inner(), vec![0, 0, 0, 7]);
    }

    #[test]
    fn test_byte_stream_bits() {
        let mut s = MemoryStream::from_bytes(vec![0x12, 0x34]);
        assert_eq!(s.read_bits(16).unwrap(), 0x1234);
        assert!(matches!(
            MemoryStream::new().read_bits(3),
            Err(crate::errors::Error::Stream(StreamError::NotBitScoped { bits: 3 }))
        ));

        let mut out = MemoryStream::new();
        out.write_bits(16, 0xabcd).unwrap();
        assert_eq!(out.as_bytes(), &[0xab, 0xcd]);
    }

    #[test]
    fn test_io_stream() {
        let mut s = IoStream::new(Cursor::new(vec![1u8, 2, 3]));
        assert_eq!(s.size().unwrap(), 3);
        assert_eq!(s.read(2).unwrap(), vec![1, 2]);
        assert!(s.read(2).unwrap_err().is_end_of_stream());
        assert_eq!(s.tell().unwrap(), 2);

        s.seek(0, Whence::End).unwrap();
        s.write(&[4]).unwrap();
        assert_eq!(s.into_inner().into_inner(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_io_stream_rejects_oversized_read_before_allocating() {
        let mut s = IoStream::new(Cursor::new(vec![1u8, 2, 3]));
        s.read(1).unwrap();
        assert!(matches!(
            s.read(usize::MAX),
            Err(crate::errors::Error::Stream(StreamError::EndOfStream {
                requested: usize::MAX,
                available: 2,
            }))
        ));
        assert_eq!(s.tell().unwrap(), 1);
    }

    #[test]
    fn test_io_stream_seek_past_end() {
        let mut s = IoStream::new(Cursor::new(vec![0u8; 4]));
        assert_eq!(s.seek(4, Whence::Start).unwrap(), 4);
        assert!(matches!(
            s.seek(1_000_000, Whence::Start),
            Err(crate::errors::Error::Stream(StreamError::InvalidSeek { target: 1_000_000 }))
        ));
        assert!(s.seek(1, Whence::End).is_err());
        assert_eq!(s.tell().unwrap(), 4);

        let mut s = IoStream::growable(Cursor::new(Vec::new()));
        s.seek(3, Whence::Start).unwrap();
        s.write(&[7]).unwrap();
        assert_eq!(s.into_inner().into_inner(), vec![0, 0, 0, 7]);
    }
}
