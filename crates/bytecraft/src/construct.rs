//! The [Construct] capability shared by every layout node.

use std::{fmt::Debug, sync::Arc};

use crate::{
    context::Context,
    errors::{Error, Result},
    stream::{MemoryStream, Stream},
    value::Value,
};

/// Immutable description of a binary layout.
///
/// A construct carries no per-call state; one instance may serve any number of
/// concurrent parse and build calls, each with its own stream and context.
///
/// Sizes are computed in bits so that bit-scoped layouts compose. The byte
/// oriented [Construct::sizeof] is derived from [Construct::sizeof_bits].
pub trait Construct: Debug + Send + Sync {
    /// Decodes one value starting at the stream cursor.
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value>;

    /// Encodes `value` at the stream cursor and returns the value actually
    /// written, which aggregates record so later fields can reference it.
    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value>;

    /// Encoded size in bits, or [Error::Sizeof] when it depends on data the
    /// context does not hold.
    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize>;

    /// True for constructs that need no input when building (padding,
    /// constants, computed values, markers). Aggregates do not require such
    /// fields to be present in the build input.
    fn is_implicit(&self) -> bool {
        false
    }

    /// True when an enclosing aggregate or greedy repeater should stop
    /// before this member. Only stop markers ever say yes.
    fn stops(&self, _ctx: &Context<'_>) -> Result<bool> {
        Ok(false)
    }

    /// Encoded size in bytes.
    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        whole_bytes(self.sizeof_bits(ctx)?)
    }

    /// Size in bytes against an empty context.
    fn size(&self) -> Result<usize> {
        self.sizeof(&Context::new())
    }

    fn parse_stream(&self, stream: &mut dyn Stream) -> Result<Value> {
        self.parse(stream, &mut Context::new())
    }

    fn build_stream(&self, value: &Value, stream: &mut dyn Stream) -> Result<Value> {
        self.build(value, stream, &mut Context::new())
    }

    fn parse_bytes(&self, data: &[u8]) -> Result<Value> {
        self.parse_stream(&mut MemoryStream::from_bytes(data))
    }

    fn build_bytes(&self, value: &Value) -> Result<Vec<u8>> {
        let mut out = MemoryStream::new();
        self.build_stream(value, &mut out)?;
        Ok(out.into_inner())
    }
}

/// Shared handle to a construct, used for children of composite constructs.
pub type ConstructRef = Arc<dyn Construct>;

/// Anything that can become a child construct: concrete constructs and
/// already shared [ConstructRef]s.
pub trait IntoConstruct {
    fn into_construct(self) -> ConstructRef;
}

impl<C: Construct + 'static> IntoConstruct for C {
    fn into_construct(self) -> ConstructRef {
        Arc::new(self)
    }
}

impl IntoConstruct for ConstructRef {
    fn into_construct(self) -> ConstructRef {
        self
    }
}

/// Error for a size that does not fit in `usize`.
pub(crate) fn size_overflow() -> Error {
    Error::Sizeof("size does not fit in usize".into())
}

/// Size in bits of `bytes` whole bytes.
pub(crate) fn byte_bits(bytes: usize) -> Result<usize> {
    bytes.checked_mul(8).ok_or_else(size_overflow)
}

/// Bits to bytes for constructs that only operate on whole bytes.
fn whole_bytes(bits: usize) -> Result<usize> {
    if bits % 8 != 0 {
        return Err(Error::Sizeof(format!("{bits} bits is not a whole number of bytes")));
    }
    Ok(bits / 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Nibble;

    impl Construct for Nibble {
        fn parse(&self, _: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
            Ok(Value::None)
        }

        fn build(&self, value: &Value, _: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
            Ok(value.clone())
        }

        fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
            Ok(4)
        }
    }

    #[test]
    fn test_sizeof_requires_whole_bytes() {
        assert_eq!(Nibble.sizeof_bits(&Context::new()).unwrap(), 4);
        assert!(matches!(Nibble.size(), Err(Error::Sizeof(_))));
    }

    #[test]
    fn test_into_construct() {
        let shared: ConstructRef = Nibble.into_construct();
        let again = shared.clone().into_construct();
        assert!(Arc::ptr_eq(&shared, &again));
    }
}
