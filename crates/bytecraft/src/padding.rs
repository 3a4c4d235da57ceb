//! Filler: fixed padding, alignment and fixed-size framing of a field.

use crate::{
    bits::mask,
    construct::{Construct, ConstructRef, IntoConstruct, byte_bits, size_overflow},
    context::Context,
    errors::{Error, ExpressionError, Result},
    expr::Expr,
    stream::Stream,
    value::Value,
};

/// Unit a [Padding] length is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PadUnit {
    #[default]
    Bytes,
    Bits,
}

#[derive(Debug, Clone, Copy)]
enum Amount {
    Bytes(usize),
    Bits(usize),
}

impl Amount {
    /// `units` in the stream's own unit: bits inside a bit scope, bytes outside.
    fn native(stream: &dyn Stream, units: usize) -> Self {
        match stream.bit_order() {
            Some(_) => Amount::Bits(units),
            None => Amount::Bytes(units),
        }
    }
}

fn unit_bits(stream: &dyn Stream) -> usize {
    if stream.bit_order().is_some() { 1 } else { 8 }
}

/// Units the cursor advanced past `start`.
fn advanced(stream: &mut dyn Stream, start: usize) -> Result<usize> {
    let end = stream.tell()?;
    end.checked_sub(start).ok_or_else(|| {
        Error::Validation(format!("cursor moved backwards from {start} to {end}"))
    })
}

fn fill_bits(pattern: u8, n: usize) -> u64 {
    if pattern == 0 { 0 } else { mask(n) }
}

fn skip_fill(stream: &mut dyn Stream, amount: Amount, pattern: u8, strict: bool) -> Result<()> {
    match amount {
        Amount::Bytes(n) => {
            let data = stream.read(n)?;
            if strict {
                if let Some(pos) = data.iter().position(|b| *b != pattern) {
                    return Err(Error::Validation(format!(
                        "padding byte {pos} is {:#04x}, expected {pattern:#04x}",
                        data[pos]
                    )));
                }
            }
        }
        Amount::Bits(mut n) => {
            while n > 0 {
                let chunk = n.min(64);
                let raw = stream.read_bits(chunk)?;
                if strict && raw != fill_bits(pattern, chunk) {
                    return Err(Error::Validation(format!("padding bits {raw:#x} do not match")));
                }
                n -= chunk;
            }
        }
    }
    Ok(())
}

fn write_fill(stream: &mut dyn Stream, amount: Amount, pattern: u8) -> Result<()> {
    match amount {
        Amount::Bytes(n) => stream.write(&vec![pattern; n]),
        Amount::Bits(mut n) => {
            while n > 0 {
                let chunk = n.min(64);
                stream.write_bits(chunk, fill_bits(pattern, chunk))?;
                n -= chunk;
            }
            Ok(())
        }
    }
}

/// Filler of a fixed or computed length.
///
/// Parsing discards the filler unless the padding is strict, in which case
/// every byte must equal the pattern. Bit padding is all zeros for a zero
/// pattern and all ones otherwise.
#[derive(Debug, Clone)]
pub struct Padding {
    length: Expr,
    unit: PadUnit,
    pattern: u8,
    strict: bool,
}

impl Padding {
    pub fn bytes(length: impl Into<Expr>) -> Self {
        Self {
            length: length.into(),
            unit: PadUnit::Bytes,
            pattern: 0,
            strict: false,
        }
    }

    pub fn bits(length: impl Into<Expr>) -> Self {
        Self {
            unit: PadUnit::Bits,
            ..Self::bytes(length)
        }
    }

    pub fn pattern(mut self, pattern: u8) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    fn amount(&self, ctx: &Context<'_>) -> Result<Amount> {
        let n = self.length.eval(ctx)?.as_usize()?;
        Ok(match self.unit {
            PadUnit::Bytes => Amount::Bytes(n),
            PadUnit::Bits => Amount::Bits(n),
        })
    }
}

impl Construct for Padding {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let amount = self.amount(ctx)?;
        skip_fill(stream, amount, self.pattern, self.strict)?;
        Ok(Value::None)
    }

    fn build(&self, _: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let amount = self.amount(ctx)?;
        write_fill(stream, amount, self.pattern)?;
        Ok(Value::None)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        let n = self.length.eval_sized(ctx)?.as_usize()?;
        match self.unit {
            PadUnit::Bytes => byte_bits(n),
            PadUnit::Bits => Ok(n),
        }
    }

    fn is_implicit(&self) -> bool {
        true
    }
}

/// Pads `inner` so that its total length is a multiple of `modulus` bytes.
#[derive(Debug, Clone)]
pub struct Aligned {
    modulus: usize,
    inner: ConstructRef,
    pattern: u8,
}

impl Aligned {
    pub fn new(modulus: usize, inner: impl IntoConstruct) -> Self {
        Self {
            modulus,
            inner: inner.into_construct(),
            pattern: 0,
        }
    }

    pub fn pattern(mut self, pattern: u8) -> Self {
        self.pattern = pattern;
        self
    }

    fn modulus_bits(&self) -> Result<usize> {
        if self.modulus == 0 {
            return Err(Error::Validation("alignment modulus must be positive".into()));
        }
        byte_bits(self.modulus)
    }

    /// Filler needed after `consumed` stream units.
    fn remainder(&self, stream: &dyn Stream, consumed: usize) -> Result<Amount> {
        let modulus = self.modulus_bits()? / unit_bits(stream);
        Ok(Amount::native(stream, (modulus - consumed % modulus) % modulus))
    }
}

impl Construct for Aligned {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let start = stream.tell()?;
        let value = self.inner.parse(stream, ctx)?;
        let consumed = advanced(stream, start)?;
        let pad = self.remainder(stream, consumed)?;
        skip_fill(stream, pad, self.pattern, false)?;
        Ok(value)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let start = stream.tell()?;
        let written = self.inner.build(value, stream, ctx)?;
        let produced = advanced(stream, start)?;
        let pad = self.remainder(stream, produced)?;
        write_fill(stream, pad, self.pattern)?;
        Ok(written)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        let modulus = self.modulus_bits()?;
        self.inner
            .sizeof_bits(ctx)?
            .checked_next_multiple_of(modulus)
            .ok_or_else(size_overflow)
    }

    fn is_implicit(&self) -> bool {
        self.inner.is_implicit()
    }
}

/// Gives `inner` exactly `length` bytes, padding what it leaves unused.
/// An inner value longer than the frame is a validation error.
#[derive(Debug, Clone)]
pub struct Padded {
    length: Expr,
    inner: ConstructRef,
    pattern: u8,
}

impl Padded {
    pub fn new(length: impl Into<Expr>, inner: impl IntoConstruct) -> Self {
        Self {
            length: length.into(),
            inner: inner.into_construct(),
            pattern: 0,
        }
    }

    pub fn pattern(mut self, pattern: u8) -> Self {
        self.pattern = pattern;
        self
    }

    fn remainder(&self, stream: &dyn Stream, ctx: &Context<'_>, used: usize) -> Result<Amount> {
        let total = self
            .length
            .eval(ctx)?
            .as_usize()?
            .checked_mul(8)
            .ok_or(ExpressionError::Overflow)?
            / unit_bits(stream);
        if used > total {
            return Err(Error::Validation(format!(
                "field uses {used} units, more than its padded length of {total}"
            )));
        }
        Ok(Amount::native(stream, total - used))
    }
}

impl Construct for Padded {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let start = stream.tell()?;
        let value = self.inner.parse(stream, ctx)?;
        let used = advanced(stream, start)?;
        let pad = self.remainder(stream, ctx, used)?;
        skip_fill(stream, pad, self.pattern, false)?;
        Ok(value)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let start = stream.tell()?;
        let written = self.inner.build(value, stream, ctx)?;
        let used = advanced(stream, start)?;
        let pad = self.remainder(stream, ctx, used)?;
        write_fill(stream, pad, self.pattern)?;
        Ok(written)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        byte_bits(self.length.eval_sized(ctx)?.as_usize()?)
    }

    fn is_implicit(&self) -> bool {
        self.inner.is_implicit()
    }
}
