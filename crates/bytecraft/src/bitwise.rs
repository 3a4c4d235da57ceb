//! Bit-scoped regions inside a byte layout.

use crate::{
    aggregate::Struct,
    bits::BitOrder,
    bitstream::with_bit_scope,
    construct::{Construct, ConstructRef, IntoConstruct, size_overflow},
    context::Context,
    errors::Result,
    stream::Stream,
    value::Value,
};

/// Runs `inner` over a bit scope opened at the current byte.
///
/// Inside, [crate::primitives::BitsInt] and [crate::primitives::Flag] address
/// single bits. When the scope closes, the byte stream is left on the next
/// byte boundary, so the region always occupies whole bytes.
#[derive(Debug, Clone)]
pub struct Bitwise {
    inner: ConstructRef,
    order: BitOrder,
}

impl Bitwise {
    pub fn new(inner: impl IntoConstruct) -> Self {
        Self::with_order(inner, BitOrder::default())
    }

    pub fn with_order(inner: impl IntoConstruct, order: BitOrder) -> Self {
        Self {
            inner: inner.into_construct(),
            order,
        }
    }
}

impl Construct for Bitwise {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        with_bit_scope(stream, self.order, |bits| self.inner.parse(bits, ctx))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        with_bit_scope(stream, self.order, |bits| self.inner.build(value, bits, ctx))
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        self.inner
            .sizeof_bits(ctx)?
            .checked_next_multiple_of(8)
            .ok_or_else(size_overflow)
    }

    fn is_implicit(&self) -> bool {
        self.inner.is_implicit()
    }
}

/// A [Struct] whose fields are measured in bits, most significant bit first.
pub fn bit_struct(fields: Struct) -> Bitwise {
    Bitwise::new(fields)
}
