//! Adapters that reinterpret the value of an inner construct.
//!
//! A [Transform] maps a raw value to a presented value after parsing
//! ([Transform::decode]) and back before building ([Transform::encode]).
//! [Adapted] attaches a transform to a construct. Transforms may be lossy:
//! a round trip is exact only where encode is the inverse of decode.
//!
//! Numeric transforms apply element-wise to lists, so an array of raw
//! readings can be scaled or labelled as a whole.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    construct::{Construct, ConstructRef, IntoConstruct},
    context::Context,
    errors::{Error, Result},
    framing::{NullTerminated, Prefixed},
    primitives::{Bytes, GreedyBytes},
    stream::Stream,
    value::{Container, Value},
};

/// Bidirectional value mapping used by [Adapted].
pub trait Transform: fmt::Debug + Send + Sync {
    /// Raw parsed value to presented value.
    fn decode(&self, raw: Value, ctx: &Context<'_>) -> Result<Value>;

    /// Presented value to the raw value the inner construct builds.
    fn encode(&self, value: &Value, ctx: &Context<'_>) -> Result<Value>;
}

/// A construct whose value passes through a [Transform].
///
/// Building returns the presented value the caller supplied, so an enclosing
/// aggregate records what the caller sees rather than the raw encoding.
#[derive(Debug, Clone)]
pub struct Adapted<T> {
    inner: ConstructRef,
    transform: T,
}

impl<T: Transform> Adapted<T> {
    pub fn new(inner: impl IntoConstruct, transform: T) -> Self {
        Self {
            inner: inner.into_construct(),
            transform,
        }
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }
}

impl<T: Transform> Construct for Adapted<T> {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let raw = self.inner.parse(stream, ctx)?;
        self.transform.decode(raw, ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let raw = self.transform.encode(value, ctx)?;
        self.inner.build(&raw, stream, ctx)?;
        Ok(value.clone())
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        self.inner.sizeof_bits(ctx)
    }

    fn is_implicit(&self) -> bool {
        self.inner.is_implicit()
    }
}

fn map_elements(value: Value, f: &dyn Fn(Value) -> Result<Value>) -> Result<Value> {
    match value {
        Value::List(items) => items
            .into_iter()
            .map(|item| map_elements(item, f))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        other => f(other),
    }
}

/// `raw * scale + offset`; decoding always yields a float.
///
/// Encoding inverts the mapping and rounds to the nearest integer unless
/// [Linear::keep_float] is set, in which case the raw value stays a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linear {
    scale: f64,
    offset: f64,
    round: bool,
}

impl Linear {
    /// Fails when scale or offset is not finite, or when scale is zero and
    /// the mapping could not be inverted.
    pub fn new(scale: f64, offset: f64) -> Result<Self> {
        if !scale.is_finite() || !offset.is_finite() {
            return Err(Error::Adaptation("scale and offset must be finite".into()));
        }
        if scale == 0.0 {
            return Err(Error::Adaptation("scale must be nonzero".into()));
        }
        Ok(Self {
            scale,
            offset,
            round: true,
        })
    }

    pub fn keep_float(mut self) -> Self {
        self.round = false;
        self
    }

    fn unscale(&self, value: Value) -> Result<Value> {
        let raw = (value.as_float()? - self.offset) / self.scale;
        if !self.round {
            return Ok(Value::Float(raw));
        }

        let rounded = raw.round();
        if !rounded.is_finite() || rounded.abs() >= i128::MAX as f64 {
            return Err(Error::Adaptation(format!("{raw} is out of integer range")));
        }
        Ok(Value::Int(rounded as i128))
    }
}

impl Transform for Linear {
    fn decode(&self, raw: Value, _: &Context<'_>) -> Result<Value> {
        map_elements(raw, &|v| Ok(Value::Float(v.as_float()? * self.scale + self.offset)))
    }

    fn encode(&self, value: &Value, _: &Context<'_>) -> Result<Value> {
        map_elements(value.clone(), &|v| self.unscale(v))
    }
}

/// Integer to label mapping.
///
/// Integers without a label fail to decode, and labels without an integer
/// fail to encode. Encoding also accepts a raw integer that has a label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumMap {
    labels: HashMap<i128, String>,
}

impl EnumMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, value: i128, label: impl Into<String>) -> Self {
        self.labels.insert(value, label.into());
        self
    }

    fn to_label(&self, value: Value) -> Result<Value> {
        let raw = value.as_int()?;
        self.labels
            .get(&raw)
            .map(|label| Value::String(label.clone()))
            .ok_or_else(|| Error::Adaptation(format!("no label for {raw}")))
    }

    fn to_raw(&self, value: Value) -> Result<Value> {
        match value {
            Value::String(label) => self
                .labels
                .iter()
                .find(|(_, l)| **l == label)
                .map(|(raw, _)| Value::Int(*raw))
                .ok_or_else(|| Error::Adaptation(format!("unknown label {label:?}"))),
            other => {
                let raw = other.as_int()?;
                if self.labels.contains_key(&raw) {
                    Ok(Value::Int(raw))
                } else {
                    Err(Error::Adaptation(format!("no label for {raw}")))
                }
            }
        }
    }
}

impl<S: Into<String>, const N: usize> From<[(i128, S); N]> for EnumMap {
    fn from(entries: [(i128, S); N]) -> Self {
        Self {
            labels: entries.into_iter().map(|(v, l)| (v, l.into())).collect(),
        }
    }
}

impl Transform for EnumMap {
    fn decode(&self, raw: Value, _: &Context<'_>) -> Result<Value> {
        map_elements(raw, &|v| self.to_label(v))
    }

    fn encode(&self, value: &Value, _: &Context<'_>) -> Result<Value> {
        map_elements(value.clone(), &|v| self.to_raw(v))
    }
}

/// Integer bit set to a container of named booleans.
///
/// Decoding yields one entry per declared flag, in declaration order, set
/// when all of the flag's bits are present; undeclared bits are dropped.
/// Encoding accepts that container (unset or missing flags are clear), a
/// `"a|b"` string of flag names, or a raw integer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagsEnum {
    flags: Vec<(String, i128)>,
}

impl FlagsEnum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(mut self, name: impl Into<String>, bits: i128) -> Self {
        self.flags.push((name.into(), bits));
        self
    }

    fn bits_of(&self, name: &str) -> Result<i128> {
        self.flags
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bits)| *bits)
            .ok_or_else(|| Error::Adaptation(format!("unknown flag {name:?}")))
    }

    fn to_flags(&self, value: Value) -> Result<Value> {
        let raw = value.as_int()?;
        Ok(Value::Container(
            self.flags
                .iter()
                .map(|(name, bits)| (name.as_str(), (raw & bits) == *bits))
                .collect::<Container>(),
        ))
    }

    fn to_raw(&self, value: Value) -> Result<Value> {
        match value {
            Value::Container(set) => set.iter().try_fold(0i128, |raw, (name, on)| {
                let bits = self.bits_of(name)?;
                Ok::<_, Error>(if on.truthy() { raw | bits } else { raw })
            }),
            Value::String(names) => names
                .split('|')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .try_fold(0i128, |raw, name| Ok::<_, Error>(raw | self.bits_of(name)?)),
            other => other.as_int(),
        }
        .map(Value::Int)
    }
}

impl<S: Into<String>, const N: usize> From<[(S, i128); N]> for FlagsEnum {
    fn from(entries: [(S, i128); N]) -> Self {
        Self {
            flags: entries.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }
}

impl Transform for FlagsEnum {
    fn decode(&self, raw: Value, _: &Context<'_>) -> Result<Value> {
        map_elements(raw, &|v| self.to_flags(v))
    }

    fn encode(&self, value: &Value, _: &Context<'_>) -> Result<Value> {
        map_elements(value.clone(), &|v| self.to_raw(v))
    }
}

/// Character encoding of a [Text] field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Encoding {
    /// Any valid UTF-8 sequence.
    #[default]
    Utf8,
    /// Every byte must be in 0..=0x7F.
    Ascii,
}

/// Bytes to string.
///
/// Decoding optionally cuts at the first zero byte and trims surrounding
/// whitespace. Encoding optionally zero-fills to a fixed width; a longer
/// string is an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Text {
    encoding: Encoding,
    zero_terminated: bool,
    trim: bool,
    width: Option<usize>,
}

impl Text {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Default::default()
        }
    }

    pub fn zero_terminated(mut self) -> Self {
        self.zero_terminated = true;
        self
    }

    pub fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    pub fn width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    fn check_ascii(&self, bytes: &[u8]) -> Result<()> {
        if self.encoding == Encoding::Ascii {
            if let Some(b) = bytes.iter().find(|b| **b > 0x7f) {
                return Err(Error::Adaptation(format!("byte {b:#04x} is not ascii")));
            }
        }
        Ok(())
    }
}

impl Transform for Text {
    fn decode(&self, raw: Value, _: &Context<'_>) -> Result<Value> {
        let mut bytes = match raw {
            Value::Bytes(b) => b,
            other => {
                return Err(Error::Adaptation(format!(
                    "cannot decode {} as text",
                    other.type_name()
                )));
            }
        };

        if self.zero_terminated {
            if let Some(pos) = bytes.iter().position(|b| *b == 0) {
                bytes.truncate(pos);
            }
        }

        self.check_ascii(&bytes)?;
        let mut s = String::from_utf8(bytes).map_err(|err| Error::Adaptation(err.to_string()))?;

        if self.trim {
            s = s.trim().to_string();
        }

        Ok(Value::String(s))
    }

    fn encode(&self, value: &Value, _: &Context<'_>) -> Result<Value> {
        let mut bytes = value.as_str()?.as_bytes().to_vec();
        self.check_ascii(&bytes)?;

        if let Some(width) = self.width {
            if bytes.len() > width {
                return Err(Error::Adaptation(format!(
                    "text of {} bytes does not fit in {width}",
                    bytes.len()
                )));
            }
            bytes.resize(width, 0);
        }

        Ok(Value::Bytes(bytes))
    }
}

type TransformFn = Arc<dyn Fn(Value, &Context<'_>) -> Result<Value> + Send + Sync>;

/// Transform backed by two host closures.
#[derive(Clone)]
pub struct FnTransform {
    decode: TransformFn,
    encode: TransformFn,
}

impl FnTransform {
    pub fn new(
        decode: impl Fn(Value, &Context<'_>) -> Result<Value> + Send + Sync + 'static,
        encode: impl Fn(Value, &Context<'_>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            decode: Arc::new(decode),
            encode: Arc::new(encode),
        }
    }
}

impl fmt::Debug for FnTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransform").finish_non_exhaustive()
    }
}

impl Transform for FnTransform {
    fn decode(&self, raw: Value, ctx: &Context<'_>) -> Result<Value> {
        (self.decode)(raw, ctx)
    }

    fn encode(&self, value: &Value, ctx: &Context<'_>) -> Result<Value> {
        (self.encode)(value.clone(), ctx)
    }
}

/// String ended by a zero byte.
pub fn c_string(encoding: Encoding) -> Adapted<Text> {
    Adapted::new(NullTerminated::new(GreedyBytes), Text::new(encoding))
}

/// String stored in exactly `width` bytes, zero-filled.
pub fn padded_string(width: usize, encoding: Encoding) -> Adapted<Text> {
    Adapted::new(
        Bytes::new(width),
        Text::new(encoding).zero_terminated().width(width),
    )
}

/// String preceded by its byte length, encoded by `length`.
pub fn pascal_string(length: impl IntoConstruct, encoding: Encoding) -> Adapted<Text> {
    Adapted::new(Prefixed::new(length, GreedyBytes), Text::new(encoding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate::Struct,
        primitives::{u8, u16be, u16le},
        repeat::Array,
        value::Container,
    };

    #[test]
    fn test_linear() {
        let temp = Adapted::new(u16be(), Linear::new(0.5, -40.0).unwrap());
        assert_eq!(temp.parse_bytes(&[0, 100]).unwrap(), Value::Float(10.0));
        assert_eq!(temp.build_bytes(&Value::Float(10.0)).unwrap(), vec![0, 100]);
        assert_eq!(temp.size().unwrap(), 2);
    }

    #[test]
    fn test_linear_invalid() {
        assert!(Linear::new(f64::NAN, 0.0).is_err());
        assert!(Linear::new(1.0, f64::INFINITY).is_err());
        assert!(Linear::new(0.0, 1.0).is_err());
    }

    #[test]
    fn test_linear_keep_float() {
        let ctx = Context::new();
        let linear = Linear::new(2.0, 1.0).unwrap().keep_float();
        assert_eq!(linear.encode(&Value::Float(4.0), &ctx).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_linear_over_array() {
        let readings = Adapted::new(Array::new(3, u8()), Linear::new(2.0, 1.0).unwrap());
        assert_eq!(
            readings.parse_bytes(&[10, 20, 30]).unwrap(),
            Value::List(vec![Value::Float(21.0), Value::Float(41.0), Value::Float(61.0)])
        );
    }

    #[test]
    fn test_enum_map() {
        let kind = Adapted::new(u8(), EnumMap::from([(1, "one"), (2, "two")]));
        assert_eq!(kind.parse_bytes(&[2]).unwrap(), Value::from("two"));
        assert_eq!(kind.build_bytes(&Value::from("one")).unwrap(), vec![1]);
        assert_eq!(kind.build_bytes(&Value::Int(2)).unwrap(), vec![2]);
        assert!(matches!(kind.parse_bytes(&[3]), Err(Error::Adaptation(_))));
        assert!(matches!(kind.build_bytes(&Value::from("three")), Err(Error::Adaptation(_))));
    }

    #[test]
    fn test_text_ascii() {
        let ctx = Context::new();
        let text = Text::new(Encoding::Ascii).trim();
        assert_eq!(
            text.decode(Value::Bytes(b" Hello\n".to_vec()), &ctx).unwrap(),
            Value::from("Hello")
        );
        let err = text.decode(Value::Bytes("Hello❤️".as_bytes().to_vec()), &ctx);
        assert!(matches!(err, Err(Error::Adaptation(_))));
        assert!(text.encode(&Value::from("é"), &ctx).is_err());
    }

    #[test]
    fn test_invalid_utf8() {
        let ctx = Context::new();
        let err = Text::new(Encoding::Utf8).decode(Value::Bytes(vec![0xff]), &ctx);
        assert!(matches!(err, Err(Error::Adaptation(_))));
    }

    #[test]
    fn test_c_string() {
        let layout = Struct::new().field("name", c_string(Encoding::Utf8)).field("n", u8());
        let value = layout.parse_bytes(b"hi\x00\x05").unwrap();
        assert_eq!(
            value,
            Value::Container(Container::from([
                ("name", Value::from("hi")),
                ("n", Value::Int(5)),
            ]))
        );
        assert_eq!(layout.build_bytes(&value).unwrap(), b"hi\x00\x05".to_vec());
    }

    #[test]
    fn test_padded_string() {
        let name = padded_string(6, Encoding::Ascii);
        assert_eq!(name.build_bytes(&Value::from("abc")).unwrap(), b"abc\x00\x00\x00".to_vec());
        assert_eq!(name.parse_bytes(b"abc\x00\x00\x00").unwrap(), Value::from("abc"));
        assert_eq!(name.size().unwrap(), 6);
        assert!(name.build_bytes(&Value::from("too long")).is_err());
    }

    #[test]
    fn test_pascal_string() {
        let name = pascal_string(u16le(), Encoding::Utf8);
        let bytes = name.build_bytes(&Value::from("héllo")).unwrap();
        assert_eq!(bytes[..2], [6, 0]);
        assert_eq!(name.parse_bytes(&bytes).unwrap(), Value::from("héllo"));
    }

    #[test]
    fn test_fn_transform() {
        let negated = FnTransform::new(
            |raw, _| Ok(Value::Int(-raw.as_int()?)),
            |value, _| Ok(Value::Int(-value.as_int()?)),
        );
        let field = Adapted::new(u8(), negated);
        assert_eq!(field.parse_bytes(&[5]).unwrap(), Value::Int(-5));
        assert_eq!(field.build_bytes(&Value::Int(-7)).unwrap(), vec![7]);
    }

    #[test]
    fn test_flags_enum() {
        let flags = FlagsEnum::from([("read", 1), ("write", 2), ("exec", 4)]);
        let layout = Adapted::new(u8(), flags);

        let value = layout.parse_bytes(&[0b1000_0101]).unwrap();
        assert_eq!(
            value,
            Value::Container(Container::from([("read", true), ("write", false), ("exec", true)]))
        );
        assert_eq!(layout.build_bytes(&value).unwrap(), vec![0b101]);

        let partial = Value::Container(Container::from([("write", true)]));
        assert_eq!(layout.build_bytes(&partial).unwrap(), vec![2]);
        assert_eq!(layout.build_bytes(&Value::from("read | exec")).unwrap(), vec![5]);
        assert_eq!(layout.build_bytes(&Value::Int(0x80)).unwrap(), vec![0x80]);

        let unknown = Value::Container(Container::from([("delete", true)]));
        assert!(matches!(layout.build_bytes(&unknown), Err(Error::Adaptation(_))));
    }
}
