//! Fixed-width integer, float and bit-field codecs.
//!
//! These are pure functions: they never touch a stream and never truncate.
//! A value that does not fit the requested width is a [Error::Range].

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{
    bits::{BitOrder, bytes_for, mask},
    errors::{Error, FieldError, Result, StreamError},
};

/// Byte order of a multi-byte primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Endian {
    #[default]
    Big,
    Little,
    /// Byte order of the target platform.
    Native,
}

impl Endian {
    /// Replaces [Endian::Native] with the concrete platform order.
    pub const fn resolve(self) -> Self {
        match self {
            Endian::Native => {
                if cfg!(target_endian = "big") {
                    Endian::Big
                } else {
                    Endian::Little
                }
            }
            other => other,
        }
    }

    fn is_big(self) -> bool {
        matches!(self.resolve(), Endian::Big)
    }
}

fn int_width(width_bits: usize) -> Result<usize> {
    if width_bits == 0 || width_bits % 8 != 0 || width_bits > 128 {
        return Err(FieldError::InvalidWidth(width_bits).into());
    }
    Ok(width_bits / 8)
}

/// Checks that `value` fits in `bits` bits under the given signedness.
pub fn check_range(value: i128, bits: usize, signed: bool) -> Result<()> {
    if bits == 0 || bits > 128 {
        return Err(FieldError::InvalidWidth(bits).into());
    }

    let fits = if signed {
        if bits == 128 {
            true
        } else {
            let half = 1i128 << (bits - 1);
            value >= -half && value < half
        }
    } else {
        value >= 0 && (bits >= 127 || value < (1i128 << bits))
    };

    if fits {
        Ok(())
    } else {
        Err(Error::Range {
            value,
            bits,
            signed,
        })
    }
}

/// Encodes `value` as a `width_bits`-wide integer (a multiple of 8, at most 128).
pub fn encode_int(value: i128, width_bits: usize, signed: bool, endian: Endian) -> Result<Vec<u8>> {
    let nbytes = int_width(width_bits)?;
    check_range(value, width_bits, signed)?;

    let mut buf = vec![0u8; nbytes];
    match (signed, endian.is_big()) {
        (true, true) => BigEndian::write_int128(&mut buf, value, nbytes),
        (true, false) => LittleEndian::write_int128(&mut buf, value, nbytes),
        (false, true) => BigEndian::write_uint128(&mut buf, value as u128, nbytes),
        (false, false) => LittleEndian::write_uint128(&mut buf, value as u128, nbytes),
    }

    Ok(buf)
}

/// Decodes a `width_bits`-wide integer. `bytes` must hold exactly `width_bits / 8` bytes.
pub fn decode_int(bytes: &[u8], width_bits: usize, signed: bool, endian: Endian) -> Result<i128> {
    let nbytes = int_width(width_bits)?;
    if bytes.len() != nbytes {
        return Err(FieldError::WrongLength {
            expected: nbytes,
            actual: bytes.len(),
        }
        .into());
    }

    if signed {
        Ok(if endian.is_big() {
            BigEndian::read_int128(bytes, nbytes)
        } else {
            LittleEndian::read_int128(bytes, nbytes)
        })
    } else {
        let raw = if endian.is_big() {
            BigEndian::read_uint128(bytes, nbytes)
        } else {
            LittleEndian::read_uint128(bytes, nbytes)
        };
        i128::try_from(raw).map_err(|_| Error::Range {
            value: i128::MAX,
            bits: width_bits,
            signed: false,
        })
    }
}

/// Encodes an IEEE 754 float of 32 or 64 bits.
pub fn encode_float(value: f64, width_bits: usize, endian: Endian) -> Result<Vec<u8>> {
    match width_bits {
        32 => {
            let narrow = value as f32;
            if value.is_finite() && !narrow.is_finite() {
                return Err(Error::Validation(format!("{value} does not fit in a 32-bit float")));
            }
            let mut buf = vec![0u8; 4];
            if endian.is_big() {
                BigEndian::write_f32(&mut buf, narrow);
            } else {
                LittleEndian::write_f32(&mut buf, narrow);
            }
            Ok(buf)
        }
        64 => {
            let mut buf = vec![0u8; 8];
            if endian.is_big() {
                BigEndian::write_f64(&mut buf, value);
            } else {
                LittleEndian::write_f64(&mut buf, value);
            }
            Ok(buf)
        }
        other => Err(FieldError::InvalidWidth(other).into()),
    }
}

/// Decodes an IEEE 754 float of 32 or 64 bits.
pub fn decode_float(bytes: &[u8], width_bits: usize, endian: Endian) -> Result<f64> {
    let expected = match width_bits {
        32 | 64 => width_bits / 8,
        other => return Err(FieldError::InvalidWidth(other).into()),
    };
    if bytes.len() != expected {
        return Err(FieldError::WrongLength {
            expected,
            actual: bytes.len(),
        }
        .into());
    }

    Ok(match (width_bits, endian.is_big()) {
        (32, true) => BigEndian::read_f32(bytes) as f64,
        (32, false) => LittleEndian::read_f32(bytes) as f64,
        (_, true) => BigEndian::read_f64(bytes),
        (_, false) => LittleEndian::read_f64(bytes),
    })
}

/// Splits `data` into consecutive bit-fields of the given widths.
///
/// Each field is assembled according to `order` (see [BitOrder]).
pub fn unpack_bits(data: &[u8], widths: &[usize], order: BitOrder) -> Result<Vec<u64>> {
    let mut pos = 0usize;
    let mut out = Vec::with_capacity(widths.len());

    for &width in widths {
        if width > 64 {
            return Err(StreamError::TooManyBits(width).into());
        }
        if pos + width > data.len() * 8 {
            return Err(StreamError::EndOfStream {
                requested: width,
                available: data.len() * 8 - pos,
            }
            .into());
        }

        let mut value = 0u64;
        for i in 0..width {
            let bit = (data[pos / 8] >> order.shift(pos % 8)) & 1;
            value |= match order {
                BitOrder::MsbFirst => (bit as u64) << (width - 1 - i),
                BitOrder::LsbFirst => (bit as u64) << i,
            };
            pos += 1;
        }
        out.push(value);
    }

    Ok(out)
}

/// Packs `(value, width)` bit-fields into bytes, zero-padding the final byte.
pub fn pack_bits(fields: &[(u64, usize)], order: BitOrder) -> Result<Vec<u8>> {
    let total: usize = fields.iter().map(|(_, width)| width).sum();
    let mut out = vec![0u8; bytes_for(total)];
    let mut pos = 0usize;

    for &(value, width) in fields {
        if width > 64 {
            return Err(StreamError::TooManyBits(width).into());
        }
        if value & !mask(width) != 0 {
            return Err(Error::Range {
                value: value as i128,
                bits: width,
                signed: false,
            });
        }

        for i in 0..width {
            let bit = match order {
                BitOrder::MsbFirst => (value >> (width - 1 - i)) & 1,
                BitOrder::LsbFirst => (value >> i) & 1,
            };
            out[pos / 8] |= (bit as u8) << order.shift(pos % 8);
            pos += 1;
        }
    }

    Ok(out)
}
