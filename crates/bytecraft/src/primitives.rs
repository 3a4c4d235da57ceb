//! Leaf constructs: numbers, flags, byte strings and value-only fields.

use crate::{
    bits::{mask, sign_extend},
    codec::{Endian, check_range, decode_float, decode_int, encode_float, encode_int},
    construct::{Construct, ConstructRef, IntoConstruct, byte_bits},
    context::Context,
    errors::{Error, FieldError, Result},
    expr::Expr,
    stream::Stream,
    value::Value,
};

/// Byte-aligned integer of 1 to 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Int {
    bytes: usize,
    signed: bool,
    endian: Endian,
}

impl Int {
    /// `endian` is resolved here, so [Endian::Native] is fixed for the
    /// lifetime of the construct.
    pub const fn new(bytes: usize, signed: bool, endian: Endian) -> Self {
        Self {
            bytes,
            signed,
            endian: endian.resolve(),
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    fn width(&self) -> Result<usize> {
        if self.bytes == 0 || self.bytes > 16 {
            return Err(FieldError::InvalidWidth(self.bytes * 8).into());
        }
        Ok(self.bytes * 8)
    }
}

impl Construct for Int {
    fn parse(&self, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        let width = self.width()?;
        let bytes = stream.read(self.bytes)?;
        decode_int(&bytes, width, self.signed, self.endian).map(Value::Int)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        let v = value.as_int()?;
        let bytes = encode_int(v, self.width()?, self.signed, self.endian)?;
        stream.write(&bytes)?;
        Ok(Value::Int(v))
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        self.width()
    }
}

macro_rules! int_shortcuts {
    ( $( $name:ident => ($bytes:expr, $signed:expr, $endian:ident) ),+ $(,)? ) => {
        $( #[doc = concat!("`", stringify!($name), "` integer field.")]
        pub const fn $name() -> Int {
            Int::new($bytes, $signed, Endian::$endian)
        }
        )+
    };
}

int_shortcuts![
    u8 => (1, false, Big),
    i8 => (1, true, Big),
    u16be => (2, false, Big),
    u16le => (2, false, Little),
    u16ne => (2, false, Native),
    i16be => (2, true, Big),
    i16le => (2, true, Little),
    i16ne => (2, true, Native),
    u24be => (3, false, Big),
    u24le => (3, false, Little),
    i24be => (3, true, Big),
    i24le => (3, true, Little),
    u32be => (4, false, Big),
    u32le => (4, false, Little),
    u32ne => (4, false, Native),
    i32be => (4, true, Big),
    i32le => (4, true, Little),
    i32ne => (4, true, Native),
    u64be => (8, false, Big),
    u64le => (8, false, Little),
    u64ne => (8, false, Native),
    i64be => (8, true, Big),
    i64le => (8, true, Little),
    i64ne => (8, true, Native),
];

/// Integer measured in bits, 1 to 64 wide.
///
/// Widths that are not a multiple of 8 only work inside a bit scope (see
/// [crate::bitwise::Bitwise]); on a byte stream whole-byte widths read
/// big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitsInt {
    bits: usize,
    signed: bool,
}

impl BitsInt {
    pub const fn new(bits: usize, signed: bool) -> Self {
        Self { bits, signed }
    }

    fn width(&self) -> Result<usize> {
        if self.bits == 0 || self.bits > 64 {
            return Err(FieldError::InvalidWidth(self.bits).into());
        }
        Ok(self.bits)
    }
}

impl Construct for BitsInt {
    fn parse(&self, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        let bits = self.width()?;
        let raw = stream.read_bits(bits)?;
        Ok(if self.signed {
            Value::Int(sign_extend(raw, bits) as i128)
        } else {
            Value::Int(raw as i128)
        })
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        let bits = self.width()?;
        let v = value.as_int()?;
        check_range(v, bits, self.signed)?;
        stream.write_bits(bits, (v as u64) & mask(bits))?;
        Ok(Value::Int(v))
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        self.width()
    }
}

/// Unsigned bit field of the given width.
pub const fn bits(width: usize) -> BitsInt {
    BitsInt::new(width, false)
}

pub const fn bit() -> BitsInt {
    BitsInt::new(1, false)
}

pub const fn nibble() -> BitsInt {
    BitsInt::new(4, false)
}

pub const fn octet() -> BitsInt {
    BitsInt::new(8, false)
}

/// IEEE 754 float of 32 or 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Float {
    bits: usize,
    endian: Endian,
}

impl Float {
    pub const fn new(bits: usize, endian: Endian) -> Self {
        Self {
            bits,
            endian: endian.resolve(),
        }
    }
}

impl Construct for Float {
    fn parse(&self, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        let bytes = stream.read(self.bits / 8)?;
        decode_float(&bytes, self.bits, self.endian).map(Value::Float)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        let v = value.as_float()?;
        stream.write(&encode_float(v, self.bits, self.endian)?)?;
        Ok(Value::Float(v))
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        match self.bits {
            32 | 64 => Ok(self.bits),
            other => Err(FieldError::InvalidWidth(other).into()),
        }
    }
}

pub const fn f32be() -> Float {
    Float::new(32, Endian::Big)
}

pub const fn f32le() -> Float {
    Float::new(32, Endian::Little)
}

pub const fn f64be() -> Float {
    Float::new(64, Endian::Big)
}

pub const fn f64le() -> Float {
    Float::new(64, Endian::Little)
}

/// Boolean stored as a single bit or a whole byte. Any nonzero pattern parses
/// as `true`; building writes 1 or 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flag {
    bits: usize,
}

impl Flag {
    pub const fn bit() -> Self {
        Self { bits: 1 }
    }

    pub const fn byte() -> Self {
        Self { bits: 8 }
    }
}

impl Construct for Flag {
    fn parse(&self, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        Ok(Value::Bool(stream.read_bits(self.bits)? != 0))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        let flag = value.as_bool()?;
        stream.write_bits(self.bits, flag as u64)?;
        Ok(Value::Bool(flag))
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Ok(self.bits)
    }
}

/// One-bit boolean.
pub const fn flag() -> Flag {
    Flag::bit()
}

/// Byte string whose length is evaluated from the context.
#[derive(Debug, Clone)]
pub struct Bytes {
    length: Expr,
}

impl Bytes {
    pub fn new(length: impl Into<Expr>) -> Self {
        Self {
            length: length.into(),
        }
    }
}

impl Construct for Bytes {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let n = self.length.eval(ctx)?.as_usize()?;
        stream.read(n).map(Value::Bytes)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let data = value.as_bytes()?;
        let n = self.length.eval(ctx)?.as_usize()?;
        if data.len() != n {
            return Err(FieldError::WrongLength {
                expected: n,
                actual: data.len(),
            }
            .into());
        }
        stream.write(data)?;
        Ok(Value::Bytes(data.to_vec()))
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        byte_bits(self.length.eval_sized(ctx)?.as_usize()?)
    }
}

/// Every remaining byte of the stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyBytes;

impl Construct for GreedyBytes {
    fn parse(&self, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        let remaining = stream.size()?.saturating_sub(stream.tell()?);
        let n = match stream.bit_order() {
            Some(_) => remaining / 8,
            None => remaining,
        };
        stream.read(n).map(Value::Bytes)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        let data = value.as_bytes()?;
        stream.write(data)?;
        Ok(Value::Bytes(data.to_vec()))
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Err(Error::Sizeof("greedy bytes consume the rest of the stream".into()))
    }
}

/// Fixed value encoded by an inner construct, such as a magic number.
///
/// Parsing a different value is a validation error. Building writes the
/// fixed value; a supplied value must match it.
#[derive(Debug, Clone)]
pub struct Const {
    inner: ConstructRef,
    value: Value,
}

impl Const {
    pub fn new(inner: impl IntoConstruct, value: impl Into<Value>) -> Self {
        Self {
            inner: inner.into_construct(),
            value: value.into(),
        }
    }

    /// Literal byte signature.
    pub fn bytes(signature: &[u8]) -> Self {
        Self::new(Bytes::new(signature.len()), signature)
    }

    fn mismatch(&self, found: &Value) -> Error {
        Error::Validation(format!("expected constant {}, found {found}", self.value))
    }
}

impl Construct for Const {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let parsed = self.inner.parse(stream, ctx)?;
        if parsed != self.value {
            return Err(self.mismatch(&parsed));
        }
        Ok(parsed)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        if !value.is_none() && *value != self.value {
            return Err(self.mismatch(value));
        }
        self.inner.build(&self.value, stream, ctx)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        self.inner.sizeof_bits(ctx)
    }

    fn is_implicit(&self) -> bool {
        true
    }
}

/// Value derived from the context; occupies no bytes.
#[derive(Debug, Clone)]
pub struct Computed {
    expr: Expr,
}

impl Computed {
    pub fn new(expr: impl Into<Expr>) -> Self {
        Self { expr: expr.into() }
    }
}

impl Construct for Computed {
    fn parse(&self, _: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        self.expr.eval(ctx)
    }

    fn build(&self, _: &Value, _: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        self.expr.eval(ctx)
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn is_implicit(&self) -> bool {
        true
    }
}

/// Field whose built value is always recomputed from the context, such as a
/// length or count that precedes the data it describes.
#[derive(Debug, Clone)]
pub struct Rebuild {
    inner: ConstructRef,
    expr: Expr,
}

impl Rebuild {
    pub fn new(inner: impl IntoConstruct, expr: impl Into<Expr>) -> Self {
        Self {
            inner: inner.into_construct(),
            expr: expr.into(),
        }
    }
}

impl Construct for Rebuild {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        self.inner.parse(stream, ctx)
    }

    fn build(&self, _: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let value = self.expr.eval(ctx)?;
        self.inner.build(&value, stream, ctx)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        self.inner.sizeof_bits(ctx)
    }

    fn is_implicit(&self) -> bool {
        true
    }
}

/// Field that may be left out when building; an absent value is replaced by
/// `default`, evaluated against the context. Parsing is unaffected.
#[derive(Debug, Clone)]
pub struct Defaulted {
    inner: ConstructRef,
    default: Expr,
}

impl Defaulted {
    pub fn new(inner: impl IntoConstruct, default: impl Into<Expr>) -> Self {
        Self {
            inner: inner.into_construct(),
            default: default.into(),
        }
    }
}

impl Construct for Defaulted {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        self.inner.parse(stream, ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        if value.is_none() {
            let value = self.default.eval(ctx)?;
            return self.inner.build(&value, stream, ctx);
        }
        self.inner.build(value, stream, ctx)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        self.inner.sizeof_bits(ctx)
    }

    fn is_implicit(&self) -> bool {
        true
    }
}

/// Assertion evaluated in both directions.
#[derive(Debug, Clone)]
pub struct Check {
    condition: Expr,
}

impl Check {
    pub fn new(condition: impl Into<Expr>) -> Self {
        Self {
            condition: condition.into(),
        }
    }

    fn check(&self, ctx: &Context<'_>) -> Result<Value> {
        if self.condition.eval(ctx)?.truthy() {
            Ok(Value::None)
        } else {
            Err(Error::Validation(format!("check failed: {}", self.condition)))
        }
    }
}

impl Construct for Check {
    fn parse(&self, _: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        self.check(ctx)
    }

    fn build(&self, _: &Value, _: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        self.check(ctx)
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn is_implicit(&self) -> bool {
        true
    }
}

/// Does nothing and yields no value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pass;

impl Construct for Pass {
    fn parse(&self, _: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        Ok(Value::None)
    }

    fn build(&self, _: &Value, _: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        Ok(Value::None)
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn is_implicit(&self) -> bool {
        true
    }
}

/// Requires the stream to be exhausted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Terminated;

impl Construct for Terminated {
    fn parse(&self, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        let remaining = stream.size()?.saturating_sub(stream.tell()?);
        if remaining > 0 {
            return Err(Error::Validation(format!(
                "expected end of stream, {remaining} units remain"
            )));
        }
        Ok(Value::None)
    }

    fn build(&self, _: &Value, _: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        Ok(Value::None)
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn is_implicit(&self) -> bool {
        true
    }
}
