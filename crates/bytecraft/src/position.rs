//! Constructs that read or move the stream cursor.

use crate::{
    construct::{Construct, ConstructRef, IntoConstruct},
    context::Context,
    errors::{Error, Result, StreamError},
    expr::Expr,
    stream::{Stream, Whence},
    value::Value,
};

fn seek_offset(value: &Value) -> Result<i64> {
    let offset = value.as_int()?;
    i64::try_from(offset).map_err(|_| StreamError::InvalidSeek { target: offset }.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Absolute,
    Relative,
}

/// Parses or builds `inner` somewhere else in the stream and then returns to
/// where it started, so it occupies no space among its siblings.
///
/// Absolute offsets count from the start of the stream, or from the end when
/// negative. Relative offsets count from the pointer's own position.
#[derive(Debug, Clone)]
pub struct Pointer {
    offset: Expr,
    anchor: Anchor,
    inner: ConstructRef,
}

impl Pointer {
    pub fn absolute(offset: impl Into<Expr>, inner: impl IntoConstruct) -> Self {
        Self {
            offset: offset.into(),
            anchor: Anchor::Absolute,
            inner: inner.into_construct(),
        }
    }

    pub fn relative(offset: impl Into<Expr>, inner: impl IntoConstruct) -> Self {
        Self {
            offset: offset.into(),
            anchor: Anchor::Relative,
            inner: inner.into_construct(),
        }
    }

    /// Moves to the target and returns the position to come back to.
    fn jump(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let offset = seek_offset(&self.offset.eval(ctx)?)?;
        let origin = stream.tell()?;
        let whence = match self.anchor {
            Anchor::Absolute if offset < 0 => Whence::End,
            Anchor::Absolute => Whence::Start,
            Anchor::Relative => Whence::Current,
        };
        stream.seek(offset, whence)?;
        Ok(origin)
    }
}

impl Construct for Pointer {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let origin = self.jump(stream, ctx)?;
        let value = self.inner.parse(stream, ctx)?;
        stream.seek(origin as i64, Whence::Start)?;
        Ok(value)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let origin = self.jump(stream, ctx)?;
        let written = self.inner.build(value, stream, ctx)?;
        stream.seek(origin as i64, Whence::Start)?;
        Ok(written)
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Ok(0)
    }
}

/// Moves the cursor; the value is the new position.
#[derive(Debug, Clone)]
pub struct Seek {
    offset: Expr,
    whence: Whence,
}

impl Seek {
    pub fn new(offset: impl Into<Expr>, whence: Whence) -> Self {
        Self {
            offset: offset.into(),
            whence,
        }
    }

    fn apply(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let offset = seek_offset(&self.offset.eval(ctx)?)?;
        stream.seek(offset, self.whence).map(Value::from)
    }
}

impl Construct for Seek {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        self.apply(stream, ctx)
    }

    fn build(&self, _: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        self.apply(stream, ctx)
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Err(Error::Sizeof("seek moves the cursor by a data-dependent amount".into()))
    }

    fn is_implicit(&self) -> bool {
        true
    }
}

/// Current cursor position; bits inside a bit scope, bytes otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tell;

impl Construct for Tell {
    fn parse(&self, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        stream.tell().map(Value::from)
    }

    fn build(&self, _: &Value, stream: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        stream.tell().map(Value::from)
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn is_implicit(&self) -> bool {
        true
    }
}

/// Parses `inner` without consuming it. Building writes nothing.
#[derive(Debug, Clone)]
pub struct Peek {
    inner: ConstructRef,
}

impl Peek {
    pub fn new(inner: impl IntoConstruct) -> Self {
        Self {
            inner: inner.into_construct(),
        }
    }
}

impl Construct for Peek {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let start = stream.tell()?;
        let result = self.inner.parse(stream, ctx);
        stream.seek(start as i64, Whence::Start)?;
        result
    }

    fn build(&self, value: &Value, _: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        Ok(value.clone())
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn is_implicit(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate::Struct,
        expr::this,
        primitives::{u8, u16be},
        stream::MemoryStream,
        value::Container,
    };

    #[test]
    fn test_pointer_does_not_displace_siblings() {
        let layout = Struct::new()
            .field("offset", u8())
            .field("target", Pointer::absolute(this("offset"), u16be()))
            .field("next", u8());
        let mut stream = MemoryStream::from_bytes(vec![4, 0x11, 0, 0, 0xbe, 0xef]);
        let value = layout.parse_stream(&mut stream).unwrap();
        let fields = value.as_container().unwrap();
        assert_eq!(fields.get("target"), Some(&Value::Int(0xbeef)));
        assert_eq!(fields.get("next"), Some(&Value::Int(0x11)));
        assert_eq!(stream.tell().unwrap(), 2);
        assert_eq!(layout.size().unwrap(), 2);
    }

    #[test]
    fn test_pointer_build_past_end() {
        let layout = Struct::new()
            .field("data", Pointer::absolute(4, u8()))
            .field("tail", u8());
        let input = Container::from([("data", 0xaa), ("tail", 0x01)]);
        let bytes = layout.build_bytes(&Value::Container(input)).unwrap();
        assert_eq!(bytes, vec![0x01, 0, 0, 0, 0xaa]);
    }

    #[test]
    fn test_pointer_from_end_and_relative() {
        let mut stream = MemoryStream::from_bytes(vec![1, 2, 3, 4]);
        assert_eq!(
            Pointer::absolute(-1, u8()).parse_stream(&mut stream).unwrap(),
            Value::Int(4)
        );
        stream.seek(1, Whence::Start).unwrap();
        assert_eq!(
            Pointer::relative(2, u8()).parse_stream(&mut stream).unwrap(),
            Value::Int(4)
        );
        assert_eq!(stream.tell().unwrap(), 1);
    }

    #[test]
    fn test_pointer_invalid_target() {
        let err = Pointer::absolute(10, u8()).parse_bytes(&[0]).unwrap_err();
        assert_eq!(err, Error::Stream(StreamError::InvalidSeek { target: 10 }));
    }

    #[test]
    fn test_tell_and_seek() {
        let layout = Struct::new()
            .field("a", u8())
            .field("here", Tell)
            .field("skip", Seek::new(1, Whence::Current))
            .field("b", u8());
        let value = layout.parse_bytes(&[1, 2, 3]).unwrap();
        let fields = value.as_container().unwrap();
        assert_eq!(fields.get("here"), Some(&Value::Int(1)));
        assert_eq!(fields.get("b"), Some(&Value::Int(3)));
        assert!(layout.size().is_err());
    }

    #[test]
    fn test_peek() {
        let layout = Struct::new().field("ahead", Peek::new(u16be())).field("first", u8());
        let value = layout.parse_bytes(&[0x01, 0x02]).unwrap();
        let fields = value.as_container().unwrap();
        assert_eq!(fields.get("ahead"), Some(&Value::Int(0x0102)));
        assert_eq!(fields.get("first"), Some(&Value::Int(1)));

        let input = Container::from([("first", 7)]);
        assert_eq!(layout.build_bytes(&Value::Container(input)).unwrap(), vec![7]);
    }
}
