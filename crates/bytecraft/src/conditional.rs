//! Data-dependent choice between constructs.

use tracing::debug;

use crate::{
    construct::{Construct, ConstructRef, IntoConstruct},
    context::Context,
    errors::{Error, Result},
    expr::Expr,
    primitives::Pass,
    stream::{MemoryStream, Stream, Whence},
    value::Value,
};

/// Picks a case by the value of a key expression.
#[derive(Debug, Clone)]
pub struct Switch {
    key: Expr,
    cases: Vec<(Value, ConstructRef)>,
    default: Option<ConstructRef>,
}

impl Switch {
    pub fn new(key: impl Into<Expr>) -> Self {
        Self {
            key: key.into(),
            cases: Vec::new(),
            default: None,
        }
    }

    /// Adds a case; the first case declared for a key wins.
    pub fn case(mut self, key: impl Into<Value>, construct: impl IntoConstruct) -> Self {
        self.cases.push((key.into(), construct.into_construct()));
        self
    }

    /// Construct used when no case matches.
    pub fn default(mut self, construct: impl IntoConstruct) -> Self {
        self.default = Some(construct.into_construct());
        self
    }

    fn select(&self, key: &Value) -> Result<&dyn Construct> {
        self.cases
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, c)| c)
            .or(self.default.as_ref())
            .map(|c| c.as_ref())
            .ok_or_else(|| Error::NoMatchingCase {
                key: key.to_string(),
            })
    }
}

impl Construct for Switch {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let key = self.key.eval(ctx)?;
        self.select(&key)?.parse(stream, ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let key = self.key.eval(ctx)?;
        self.select(&key)?.build(value, stream, ctx)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        let key = self.key.eval_sized(ctx)?;
        self.select(&key)?.sizeof_bits(ctx)
    }
}

/// Two-way choice on a condition.
#[derive(Debug, Clone)]
pub struct IfThenElse {
    condition: Expr,
    then: ConstructRef,
    otherwise: ConstructRef,
}

impl IfThenElse {
    pub fn new(
        condition: impl Into<Expr>,
        then: impl IntoConstruct,
        otherwise: impl IntoConstruct,
    ) -> Self {
        Self {
            condition: condition.into(),
            then: then.into_construct(),
            otherwise: otherwise.into_construct(),
        }
    }

    fn branch(&self, condition: &Value) -> &dyn Construct {
        if condition.truthy() {
            self.then.as_ref()
        } else {
            self.otherwise.as_ref()
        }
    }
}

impl Construct for IfThenElse {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let condition = self.condition.eval(ctx)?;
        self.branch(&condition).parse(stream, ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let condition = self.condition.eval(ctx)?;
        self.branch(&condition).build(value, stream, ctx)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        let condition = self.condition.eval_sized(ctx)?;
        self.branch(&condition).sizeof_bits(ctx)
    }

    fn is_implicit(&self) -> bool {
        self.then.is_implicit() || self.otherwise.is_implicit()
    }
}

/// Present only when `condition` holds; otherwise nothing is read or written
/// and the value is absent.
pub fn if_then(condition: impl Into<Expr>, then: impl IntoConstruct) -> IfThenElse {
    IfThenElse::new(condition, then, Pass)
}

/// Attempts the inner construct and falls back to an absent value.
///
/// A failed parse restores the stream to where the attempt started, whatever
/// the inner construct consumed. Building an absent value writes nothing, and
/// a missing build input counts as absent.
#[derive(Debug, Clone)]
pub struct Optional {
    inner: ConstructRef,
}

impl Optional {
    pub fn new(inner: impl IntoConstruct) -> Self {
        Self {
            inner: inner.into_construct(),
        }
    }
}

impl Construct for Optional {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let start = stream.tell()?;
        match self.inner.parse(stream, ctx) {
            Ok(value) => Ok(value),
            Err(err) => {
                stream.seek(start as i64, Whence::Start)?;
                debug!(%err, position = start, "optional field absent");
                Ok(Value::None)
            }
        }
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        if value.is_none() {
            return Ok(Value::None);
        }
        self.inner.build(value, stream, ctx)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        match self.inner.sizeof_bits(ctx) {
            Ok(0) => Ok(0),
            _ => Err(Error::Sizeof("optional field may be absent".into())),
        }
    }

    fn is_implicit(&self) -> bool {
        true
    }
}

/// First alternative that succeeds.
///
/// Parsing tries each alternative from the same position and rewinds after
/// every failure. Building encodes into a scratch buffer per attempt, so a
/// failed alternative leaves nothing behind in the stream.
#[derive(Debug, Clone, Default)]
pub struct Select {
    alternatives: Vec<ConstructRef>,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn or(mut self, construct: impl IntoConstruct) -> Self {
        self.alternatives.push(construct.into_construct());
        self
    }

    fn exhausted(&self) -> Error {
        Error::NoMatchingAlternative {
            tried: self.alternatives.len(),
        }
    }
}

impl Construct for Select {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let start = stream.tell()?;
        for (i, alternative) in self.alternatives.iter().enumerate() {
            match alternative.parse(stream, ctx) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    stream.seek(start as i64, Whence::Start)?;
                    debug!(alternative = i, %err, "select alternative rejected");
                }
            }
        }
        Err(self.exhausted())
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        for (i, alternative) in self.alternatives.iter().enumerate() {
            let mut scratch = MemoryStream::new();
            match alternative.build(value, &mut scratch, ctx) {
                Ok(written) => {
                    stream.write(scratch.as_bytes())?;
                    return Ok(written);
                }
                Err(err) => debug!(alternative = i, %err, "select alternative rejected"),
            }
        }
        Err(self.exhausted())
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Err(Error::Sizeof("select depends on which alternative matches".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate::Struct,
        expr::this,
        primitives::{Bytes, Const, u8, u16be, u32be},
        transform::{Encoding, c_string},
        stream::MemoryStream,
        value::Container,
    };

    fn tagged() -> Struct {
        Struct::new().field("tag", u8()).field(
            "body",
            Switch::new(this("tag")).case(1, u8()).case(2, u16be()),
        )
    }

    #[test]
    fn test_switch_on_earlier_field() {
        let value = tagged().parse_bytes(&[2, 0, 1]).unwrap();
        assert_eq!(value.as_container().unwrap().get("body"), Some(&Value::Int(1)));

        let input = Container::from([("tag", 1), ("body", 9)]);
        assert_eq!(tagged().build_bytes(&Value::Container(input)).unwrap(), vec![1, 9]);
    }

    #[test]
    fn test_switch_no_matching_case() {
        let err = tagged().parse_bytes(&[3, 0]).unwrap_err();
        assert_eq!(err, Error::NoMatchingCase { key: "3".into() });
    }

    #[test]
    fn test_switch_default() {
        let switch = Switch::new(this("tag")).case(1, u8()).default(u32be());
        let ctx = Context::from_container(Container::from([("tag", 7)]));
        assert_eq!(switch.sizeof(&ctx).unwrap(), 4);
        assert!(matches!(switch.size(), Err(Error::Sizeof(_))));
    }

    #[test]
    fn test_if_then() {
        let layout = Struct::new()
            .field("has_extra", u8())
            .field("extra", if_then(this("has_extra").equal(1), u16be()));

        let value = layout.parse_bytes(&[0]).unwrap();
        assert_eq!(value.as_container().unwrap().get("extra"), Some(&Value::None));

        let value = layout.parse_bytes(&[1, 0, 5]).unwrap();
        assert_eq!(value.as_container().unwrap().get("extra"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_optional_restores_position() {
        let layout = Struct::new()
            .field(
                "magic",
                Optional::new(Struct::new().field("a", u8()).field("m", Const::new(u8(), 0xff))),
            )
            .field("rest", u8());
        let mut stream = MemoryStream::from_bytes(vec![0x10, 0x20]);
        let value = layout.parse_stream(&mut stream).unwrap();
        let fields = value.as_container().unwrap();
        assert_eq!(fields.get("magic"), Some(&Value::None));
        assert_eq!(fields.get("rest"), Some(&Value::Int(0x10)));
        assert_eq!(stream.tell().unwrap(), 1);
    }

    #[test]
    fn test_optional_build_absent() {
        let optional = Optional::new(u8());
        assert_eq!(optional.build_bytes(&Value::None).unwrap(), Vec::<u8>::new());
        assert_eq!(optional.build_bytes(&Value::Int(4)).unwrap(), vec![4]);

        let layout = Struct::new().field("maybe", optional);
        let empty = Value::Container(Container::new());
        assert_eq!(layout.build_bytes(&empty).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_if_then_build_without_input() {
        let layout = Struct::new()
            .field("has_extra", u8())
            .field("extra", if_then(this("has_extra").equal(1), u16be()));
        let input = Value::Container(Container::from([("has_extra", 0)]));
        assert_eq!(layout.build_bytes(&input).unwrap(), vec![0]);
    }

    fn int_or_text() -> Select {
        Select::new()
            .or(Struct::new().field("magic", Const::new(u8(), 1)).field("n", u16be()))
            .or(c_string(Encoding::Utf8))
    }

    #[test]
    fn test_select_parse_rewinds() {
        let mut stream = MemoryStream::from_bytes(b"\x01\x00\x05".to_vec());
        let value = int_or_text().parse_stream(&mut stream).unwrap();
        assert_eq!(value.as_container().unwrap().get("n"), Some(&Value::Int(5)));

        let mut stream = MemoryStream::from_bytes(b"hi\x00!".to_vec());
        assert_eq!(
            int_or_text().parse_stream(&mut stream).unwrap(),
            Value::String("hi".into())
        );
        assert_eq!(stream.tell().unwrap(), 3);

        let mut stream = MemoryStream::from_bytes(vec![0xff]);
        assert_eq!(
            int_or_text().parse_stream(&mut stream).unwrap_err(),
            Error::NoMatchingAlternative { tried: 2 }
        );
        assert_eq!(stream.tell().unwrap(), 0);
    }

    #[test]
    fn test_select_build_first_that_fits() {
        let select = Select::new().or(u8()).or(u16be()).or(Bytes::new(3));
        assert_eq!(select.build_bytes(&Value::Int(7)).unwrap(), vec![7]);
        assert_eq!(select.build_bytes(&Value::Int(300)).unwrap(), vec![1, 44]);
        assert_eq!(
            select.build_bytes(&Value::Bytes(b"abc".to_vec())).unwrap(),
            b"abc".to_vec()
        );
        assert!(matches!(
            select.build_bytes(&Value::Int(1 << 20)),
            Err(Error::NoMatchingAlternative { tried: 3 })
        ));
        assert!(matches!(select.size(), Err(Error::Sizeof(_))));
    }
}
