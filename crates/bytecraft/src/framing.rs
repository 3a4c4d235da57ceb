//! Length-delimited, terminator-delimited and reordered sub-streams.

use crate::{
    construct::{Construct, ConstructRef, IntoConstruct, size_overflow},
    context::Context,
    errors::{Error, Result},
    stream::{MemoryStream, Stream},
    value::Value,
};

/// A byte length encoded by `length`, followed by that many bytes which
/// `inner` sees as a stream of its own.
#[derive(Debug, Clone)]
pub struct Prefixed {
    length: ConstructRef,
    inner: ConstructRef,
}

impl Prefixed {
    pub fn new(length: impl IntoConstruct, inner: impl IntoConstruct) -> Self {
        Self {
            length: length.into_construct(),
            inner: inner.into_construct(),
        }
    }
}

impl Construct for Prefixed {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let n = self.length.parse(stream, ctx)?.as_usize()?;
        let mut frame = MemoryStream::from_bytes(stream.read(n)?);
        self.inner.parse(&mut frame, ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let mut frame = MemoryStream::new();
        let written = self.inner.build(value, &mut frame, ctx)?;
        let data = frame.into_inner();
        self.length.build(&Value::from(data.len()), stream, ctx)?;
        stream.write(&data)?;
        Ok(written)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        self.length
            .sizeof_bits(ctx)?
            .checked_add(self.inner.sizeof_bits(ctx)?)
            .ok_or_else(size_overflow)
    }
}

/// Bytes up to a terminator byte (zero by default), which `inner` sees as a
/// stream of its own. The terminator is consumed and written but is not part
/// of the value.
#[derive(Debug, Clone)]
pub struct NullTerminated {
    inner: ConstructRef,
    terminator: u8,
}

impl NullTerminated {
    pub fn new(inner: impl IntoConstruct) -> Self {
        Self {
            inner: inner.into_construct(),
            terminator: 0,
        }
    }

    pub fn terminator(mut self, terminator: u8) -> Self {
        self.terminator = terminator;
        self
    }
}

impl Construct for NullTerminated {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let mut data = Vec::new();
        loop {
            let byte = stream.read(1)?[0];
            if byte == self.terminator {
                break;
            }
            data.push(byte);
        }

        let mut frame = MemoryStream::from_bytes(data);
        self.inner.parse(&mut frame, ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let mut frame = MemoryStream::new();
        let written = self.inner.build(value, &mut frame, ctx)?;
        let mut data = frame.into_inner();
        if let Some(pos) = data.iter().position(|b| *b == self.terminator) {
            return Err(Error::Validation(format!(
                "terminator {:#04x} appears inside the value at byte {pos}",
                self.terminator
            )));
        }

        data.push(self.terminator);
        stream.write(&data)?;
        Ok(written)
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Err(Error::Sizeof("terminated data has no fixed size".into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Swap {
    Bytes,
    Bits,
}

impl Swap {
    fn apply(self, data: &mut [u8]) {
        data.reverse();
        if self == Swap::Bits {
            for byte in data.iter_mut() {
                *byte = byte.reverse_bits();
            }
        }
    }
}

fn parse_swapped(
    inner: &dyn Construct,
    swap: Swap,
    stream: &mut dyn Stream,
    ctx: &mut Context<'_>,
) -> Result<Value> {
    let n = inner.sizeof(ctx)?;
    let mut data = stream.read(n)?;
    swap.apply(&mut data);
    inner.parse(&mut MemoryStream::from_bytes(data), ctx)
}

fn build_swapped(
    inner: &dyn Construct,
    swap: Swap,
    value: &Value,
    stream: &mut dyn Stream,
    ctx: &mut Context<'_>,
) -> Result<Value> {
    let mut frame = MemoryStream::new();
    let written = inner.build(value, &mut frame, ctx)?;
    let mut data = frame.into_inner();
    swap.apply(&mut data);
    stream.write(&data)?;
    Ok(written)
}

/// Fixed-size `inner` stored with its bytes in reverse order, e.g. a
/// little-endian struct of big-endian fields.
#[derive(Debug, Clone)]
pub struct ByteSwapped {
    inner: ConstructRef,
}

impl ByteSwapped {
    pub fn new(inner: impl IntoConstruct) -> Self {
        Self {
            inner: inner.into_construct(),
        }
    }
}

impl Construct for ByteSwapped {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        parse_swapped(self.inner.as_ref(), Swap::Bytes, stream, ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        build_swapped(self.inner.as_ref(), Swap::Bytes, value, stream, ctx)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        self.inner.sizeof_bits(ctx)
    }
}

/// Fixed-size `inner` stored with its whole bit string reversed: last bit
/// first. Usually wraps a [Bitwise](crate::bitwise::Bitwise) region.
#[derive(Debug, Clone)]
pub struct BitsSwapped {
    inner: ConstructRef,
}

impl BitsSwapped {
    pub fn new(inner: impl IntoConstruct) -> Self {
        Self {
            inner: inner.into_construct(),
        }
    }
}

impl Construct for BitsSwapped {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        parse_swapped(self.inner.as_ref(), Swap::Bits, stream, ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        build_swapped(self.inner.as_ref(), Swap::Bits, value, stream, ctx)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        self.inner.sizeof_bits(ctx)
    }
}
