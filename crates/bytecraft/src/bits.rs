//! Low-level bit manipulation helpers.
//!
//! Bits are addressed inside a byte according to a [BitOrder]: with
//! [BitOrder::MsbFirst] bit 0 is the high bit of the byte.

/// Order in which bits are taken from each byte inside a bit scope.
///
/// With `MsbFirst`, the first bit read is the high bit of the byte and a
/// multi-bit field is assembled most-significant bit first. With `LsbFirst`
/// the low bit comes first and fields are assembled least-significant bit
/// first, as in DEFLATE-style formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

impl BitOrder {
    /// Shift that selects bit `offset` (0..8) of a byte under this order.
    pub fn shift(self, offset: usize) -> usize {
        match self {
            BitOrder::MsbFirst => 7 - offset,
            BitOrder::LsbFirst => offset,
        }
    }
}

/// Sign-extends the low `bits` of `value` to a full `i64`.
pub fn sign_extend(value: u64, bits: usize) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Mask covering the low `bits` bits.
pub fn mask(bits: usize) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Number of whole bytes needed to hold `bits` bits.
pub fn bytes_for(bits: usize) -> usize {
    bits.div_ceil(8)
}
