//! Bit-granular access over a byte [Stream].
//!
//! A [BitStream] lives for exactly one bit scope. Inside the scope positions
//! and sizes are measured in bits from the scope start, and byte reads and
//! writes move eight bits per byte. Closing the scope leaves the underlying
//! stream on the next byte boundary: a partially read byte is skipped, a
//! partially written byte is padded with zero bits.

use tracing::{debug, trace};

use crate::{
    bits::{BitOrder, bytes_for, mask},
    errors::{Error, Result, StreamError},
    stream::{Stream, Whence},
};

#[derive(Debug, Clone, Copy)]
struct CachedByte {
    index: usize,
    byte: u8,
    dirty: bool,
}

/// A bit scope over a borrowed byte stream.
pub struct BitStream<'a> {
    inner: &'a mut dyn Stream,
    order: BitOrder,
    origin: usize,
    pos: usize,
    cache: Option<CachedByte>,
    closed: bool,
}

impl<'a> BitStream<'a> {
    /// Opens a bit scope at the current position of `inner`.
    pub fn open(inner: &'a mut dyn Stream, order: BitOrder) -> Result<Self> {
        if inner.bit_order().is_some() {
            return Err(StreamError::NestedBitScope.into());
        }

        let origin = inner.tell()?;
        trace!(origin, ?order, "opened bit scope");

        Ok(Self {
            inner,
            order,
            origin,
            pos: 0,
            cache: None,
            closed: false,
        })
    }

    pub fn order(&self) -> BitOrder {
        self.order
    }

    /// Bits consumed or produced since the scope was opened.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Flushes any pending byte and moves the underlying stream to the byte
    /// boundary following the last touched bit. Calling it twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.flush()?;
        let end = self.origin + bytes_for(self.pos);
        self.inner.seek(end as i64, Whence::Start)?;
        trace!(bits = self.pos, end, "closed bit scope");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(cached) = self.cache.as_mut() {
            if cached.dirty {
                self.inner
                    .seek((self.origin + cached.index) as i64, Whence::Start)?;
                self.inner.write(&[cached.byte])?;
                cached.dirty = false;
            }
        }
        Ok(())
    }

    fn load(&mut self, index: usize, for_write: bool) -> Result<CachedByte> {
        if let Some(cached) = self.cache {
            if cached.index == index {
                return Ok(cached);
            }
        }

        self.flush()?;
        self.inner
            .seek((self.origin + index) as i64, Whence::Start)?;
        let byte = match self.inner.read(1) {
            Ok(bytes) => bytes[0],
            Err(err) if for_write && err.is_end_of_stream() => 0,
            Err(err) => return Err(err),
        };

        let cached = CachedByte {
            index,
            byte,
            dirty: false,
        };
        self.cache = Some(cached);
        Ok(cached)
    }

    fn size_bits(&mut self) -> Result<usize> {
        let mut bytes = self.inner.size()?.saturating_sub(self.origin);
        if let Some(cached) = self.cache {
            if cached.dirty {
                bytes = bytes.max(cached.index + 1);
            }
        }
        Ok(bytes * 8)
    }

    fn ensure_available(&mut self, bits: usize) -> Result<()> {
        let available = self.size_bits()?.saturating_sub(self.pos);
        if bits > available {
            return Err(StreamError::EndOfStream {
                requested: bits,
                available,
            }
            .into());
        }
        Ok(())
    }

    fn read_bit(&mut self) -> Result<u64> {
        let cached = self.load(self.pos / 8, false)?;
        let bit = (cached.byte >> self.order.shift(self.pos % 8)) & 1;
        self.pos += 1;
        Ok(bit as u64)
    }

    fn write_bit(&mut self, bit: u64) -> Result<()> {
        let mut cached = self.load(self.pos / 8, true)?;
        let shift = self.order.shift(self.pos % 8);
        cached.byte = (cached.byte & !(1 << shift)) | ((bit as u8) << shift);
        cached.dirty = true;
        self.cache = Some(cached);
        self.pos += 1;
        Ok(())
    }
}

impl Stream for BitStream<'_> {
    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure_available(n * 8)?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.read_bits(8)? as u8);
        }
        Ok(out)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        for &byte in data {
            self.write_bits(8, byte as u64)?;
        }
        Ok(())
    }

    fn tell(&mut self) -> Result<usize> {
        Ok(self.pos)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<usize> {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.pos,
            Whence::End => self.size_bits()?,
        };
        let target = base as i128 + offset as i128;
        let target =
            usize::try_from(target).map_err(|_| Error::from(StreamError::InvalidSeek { target }))?;

        if target > self.size_bits()? {
            // Lets the byte stream decide: growable streams zero-fill, fixed ones refuse.
            self.flush()?;
            self.inner
                .seek((self.origin + bytes_for(target)) as i64, Whence::Start)?;
        }

        self.pos = target;
        Ok(target)
    }

    fn size(&mut self) -> Result<usize> {
        self.size_bits()
    }

    fn bit_order(&self) -> Option<BitOrder> {
        Some(self.order)
    }

    fn read_bits(&mut self, n: usize) -> Result<u64> {
        if n > 64 {
            return Err(StreamError::TooManyBits(n).into());
        }
        self.ensure_available(n)?;

        let mut value = 0u64;
        for i in 0..n {
            let bit = self.read_bit()?;
            match self.order {
                BitOrder::MsbFirst => value = (value << 1) | bit,
                BitOrder::LsbFirst => value |= bit << i,
            }
        }
        Ok(value)
    }

    fn write_bits(&mut self, n: usize, value: u64) -> Result<()> {
        if n > 64 {
            return Err(StreamError::TooManyBits(n).into());
        }
        if value & !mask(n) != 0 {
            return Err(Error::Range {
                value: value as i128,
                bits: n,
                signed: false,
            });
        }

        for i in 0..n {
            let bit = match self.order {
                BitOrder::MsbFirst => (value >> (n - 1 - i)) & 1,
                BitOrder::LsbFirst => (value >> i) & 1,
            };
            self.write_bit(bit)?;
        }
        Ok(())
    }
}

impl Drop for BitStream<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(%err, "failed to close bit scope");
        }
    }
}

/// Runs `f` inside a bit scope over `stream`.
///
/// The scope is closed on every exit path; an error from `f` takes precedence
/// over an error from closing.
pub fn with_bit_scope<T>(
    stream: &mut dyn Stream,
    order: BitOrder,
    f: impl FnOnce(&mut BitStream<'_>) -> Result<T>,
) -> Result<T> {
    let mut bits = BitStream::open(stream, order)?;
    let result = f(&mut bits);
    let closed = bits.close();
    let value = result?;
    closed?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    #[test]
    fn test_read_msb_first() {
        let mut bytes = MemoryStream::from_bytes(vec![0b1000_0101, 0xff]);
        let (flag, value) = with_bit_scope(&mut bytes, BitOrder::MsbFirst, |bits| {
            Ok((bits.read_bits(1)?, bits.read_bits(7)?))
        })
        .unwrap();
        assert_eq!((flag, value), (1, 5));
        assert_eq!(bytes.tell().unwrap(), 1);
    }

    #[test]
    fn test_read_lsb_first() {
        let mut bytes = MemoryStream::from_bytes(vec![0b0000_1011]);
        let fields = with_bit_scope(&mut bytes, BitOrder::LsbFirst, |bits| {
            Ok((bits.read_bits(1)?, bits.read_bits(3)?))
        })
        .unwrap();
        assert_eq!(fields, (1, 0b101));
    }

    #[test]
    fn test_partial_byte_is_skipped_on_close() {
        let mut bytes = MemoryStream::from_bytes(vec![0xff, 0x01]);
        with_bit_scope(&mut bytes, BitOrder::MsbFirst, |bits| bits.read_bits(3)).unwrap();
        assert_eq!(bytes.tell().unwrap(), 1);
        assert_eq!(bytes.read(1).unwrap(), vec![0x01]);
    }

    #[test]
    fn test_write_pads_to_byte() {
        let mut out = MemoryStream::new();
        with_bit_scope(&mut out, BitOrder::MsbFirst, |bits| {
            bits.write_bits(1, 1)?;
            bits.write_bits(2, 0b01)
        })
        .unwrap();
        assert_eq!(out.tell().unwrap(), 1);
        assert_eq!(out.into_inner(), vec![0b1010_0000]);
    }

    #[test]
    fn test_write_spanning_bytes() {
        let mut out = MemoryStream::new();
        out.write(&[0xaa]).unwrap();
        with_bit_scope(&mut out, BitOrder::MsbFirst, |bits| bits.write_bits(12, 0xabc)).unwrap();
        out.write(&[0x55]).unwrap();
        assert_eq!(out.into_inner(), vec![0xaa, 0xab, 0xc0, 0x55]);
    }

    #[test]
    fn test_end_of_stream_does_not_consume() {
        let mut bytes = MemoryStream::from_bytes(vec![0xf0]);
        with_bit_scope(&mut bytes, BitOrder::MsbFirst, |bits| {
            assert_eq!(bits.read_bits(4)?, 0xf);
            let err = bits.read_bits(5).unwrap_err();
            assert!(err.is_end_of_stream());
            assert_eq!(bits.tell()?, 4);
            assert_eq!(bits.read_bits(4)?, 0);
            assert!(bits.at_end()?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_close_on_error_path() {
        let mut bytes = MemoryStream::from_bytes(vec![0xff, 0x00]);
        let err = with_bit_scope(&mut bytes, BitOrder::MsbFirst, |bits| -> Result<()> {
            bits.read_bits(2)?;
            Err(Error::Validation("boom".into()))
        })
        .unwrap_err();
        assert_eq!(err, Error::Validation("boom".into()));
        assert_eq!(bytes.tell().unwrap(), 1);
    }

    #[test]
    fn test_bytes_inside_scope() {
        let mut bytes = MemoryStream::from_bytes(vec![0b1001_0001, 0b1010_0000]);
        let read = with_bit_scope(&mut bytes, BitOrder::MsbFirst, |bits| {
            bits.read_bits(1)?;
            bits.read(1)
        })
        .unwrap();
        assert_eq!(read, vec![0b0010_0011]);
        assert_eq!(bytes.tell().unwrap(), 2);
    }

    #[test]
    fn test_seek_in_bits() {
        let mut bytes = MemoryStream::from_bytes(vec![0b0000_0001]);
        with_bit_scope(&mut bytes, BitOrder::MsbFirst, |bits| {
            assert_eq!(bits.size()?, 8);
            bits.seek(7, Whence::Start)?;
            assert_eq!(bits.read_bits(1)?, 1);
            bits.seek(-8, Whence::End)?;
            assert_eq!(bits.read_bits(7)?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_nested_scope_rejected() {
        let mut bytes = MemoryStream::from_bytes(vec![0]);
        let err = with_bit_scope(&mut bytes, BitOrder::MsbFirst, |bits| {
            BitStream::open(bits, BitOrder::MsbFirst).map(|_| ())
        })
        .unwrap_err();
        assert_eq!(err, Error::Stream(StreamError::NestedBitScope));
    }

    #[test]
    fn test_write_value_too_wide() {
        let mut out = MemoryStream::new();
        let err = with_bit_scope(&mut out, BitOrder::MsbFirst, |bits| bits.write_bits(3, 8)).unwrap_err();
        assert!(matches!(err, Error::Range { bits: 3, .. }));
    }
}
