//! Ordered aggregates: [Struct] with named fields, [Sequence] with positional
//! ones, and [FocusedSeq] which exposes a single member of a struct.
//!
//! All three end early at a member whose [Construct::stops] holds, such as a
//! [StopIf](crate::repeat::StopIf); later members are neither parsed nor built.

use tracing::trace;

use crate::{
    construct::{Construct, ConstructRef, IntoConstruct, size_overflow},
    context::Context,
    errors::{FieldError, Result},
    stream::Stream,
    value::{Container, Value},
};

#[derive(Debug, Clone)]
struct Member {
    name: Option<String>,
    construct: ConstructRef,
}

/// Named fields laid out back to back in declaration order.
///
/// Parsing yields a [Container] whose keys follow declaration order; each
/// field sees the fields before it (and any enclosing scope) through the
/// context. Building takes a container, requires every named field that is
/// not implicit, and ignores keys the struct does not declare.
#[derive(Debug, Clone, Default)]
pub struct Struct {
    members: Vec<Member>,
}

impl Struct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a named field.
    pub fn field(mut self, name: impl Into<String>, construct: impl IntoConstruct) -> Self {
        self.members.push(Member {
            name: Some(name.into()),
            construct: construct.into_construct(),
        });
        self
    }

    /// Appends a field whose value is not stored, such as padding or a check.
    pub fn anon(mut self, construct: impl IntoConstruct) -> Self {
        self.members.push(Member {
            name: None,
            construct: construct.into_construct(),
        });
        self
    }

    /// Names of the stored fields in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().filter_map(|m| m.name.as_deref())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Construct for Struct {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let mut local = Context::with_parent(ctx);

        for member in &self.members {
            if member.construct.stops(&local)? {
                trace!(fields = local.fields().len(), "struct stopped");
                break;
            }
            let value = member.construct.parse(stream, &mut local)?;
            if let Some(name) = &member.name {
                trace!(field = %name, kind = value.type_name(), "parsed field");
                local.insert(name.clone(), value);
            }
        }

        Ok(Value::Container(local.into_fields()))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let input = value.as_container()?;

        // Later fields stay visible so length and count fields can be rebuilt
        // from the data that follows them.
        let mut local = Context::with_parent(ctx);
        for (name, value) in input.iter() {
            local.insert(name, value.clone());
        }

        let absent = Value::None;
        let mut built = Container::new();

        for member in &self.members {
            if member.construct.stops(&local)? {
                break;
            }
            let item = match &member.name {
                Some(name) => match input.get(name) {
                    Some(item) => item,
                    None if member.construct.is_implicit() => &absent,
                    None => return Err(FieldError::Missing(name.clone()).into()),
                },
                None => &absent,
            };

            let written = member.construct.build(item, stream, &mut local)?;
            if let Some(name) = &member.name {
                trace!(field = %name, kind = written.type_name(), "built field");
                local.insert(name.clone(), written.clone());
                built.insert(name.clone(), written);
            }
        }

        Ok(Value::Container(built))
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        let local = Context::with_parent(ctx);
        self.members
            .iter()
            .try_fold(0usize, |total, m| {
                total
                    .checked_add(m.construct.sizeof_bits(&local)?)
                    .ok_or_else(size_overflow)
            })
    }
}

/// Unnamed constructs laid out back to back; the value is a list with one
/// element per construct.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    items: Vec<ConstructRef>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, construct: impl IntoConstruct) -> Self {
        self.items.push(construct.into_construct());
        self
    }
}

impl Construct for Sequence {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let mut local = Context::with_parent(ctx);
        let mut values = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if item.stops(&local)? {
                break;
            }
            values.push(item.parse(stream, &mut local)?);
        }
        Ok(Value::List(values))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let values = value.as_list()?;
        let wrong_length = || FieldError::WrongLength {
            expected: self.items.len(),
            actual: values.len(),
        };
        if values.len() > self.items.len() {
            return Err(wrong_length().into());
        }

        // A stopped sequence parses to fewer values than it has items.
        let mut local = Context::with_parent(ctx);
        let mut written = Vec::with_capacity(values.len());
        for (i, item) in self.items.iter().enumerate() {
            if item.stops(&local)? {
                break;
            }
            let value = values.get(i).ok_or_else(wrong_length)?;
            written.push(item.build(value, stream, &mut local)?);
        }
        Ok(Value::List(written))
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        let local = Context::with_parent(ctx);
        self.items
            .iter()
            .try_fold(0usize, |total, c| {
                total
                    .checked_add(c.sizeof_bits(&local)?)
                    .ok_or_else(size_overflow)
            })
    }
}

/// Members laid out like a [Struct], of which only the `focus` field is the
/// value.
///
/// Building places the value under `focus`; every other named member must be
/// implicit, since nothing else supplies it.
#[derive(Debug, Clone)]
pub struct FocusedSeq {
    focus: String,
    members: Struct,
}

impl FocusedSeq {
    pub fn new(focus: impl Into<String>) -> Self {
        Self {
            focus: focus.into(),
            members: Struct::new(),
        }
    }

    /// Focuses on `focus` among the fields of an existing struct.
    pub fn from_struct(focus: impl Into<String>, members: Struct) -> Self {
        Self {
            focus: focus.into(),
            members,
        }
    }

    pub fn field(mut self, name: impl Into<String>, construct: impl IntoConstruct) -> Self {
        self.members = self.members.field(name, construct);
        self
    }

    pub fn anon(mut self, construct: impl IntoConstruct) -> Self {
        self.members = self.members.anon(construct);
        self
    }

    fn focused(&self, all: Value) -> Result<Value> {
        let Value::Container(mut fields) = all else {
            return Err(FieldError::Missing(self.focus.clone()).into());
        };
        fields
            .remove(&self.focus)
            .ok_or_else(|| FieldError::Missing(self.focus.clone()).into())
    }
}

impl Construct for FocusedSeq {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let all = self.members.parse(stream, ctx)?;
        self.focused(all)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let input = Container::from([(self.focus.as_str(), value.clone())]);
        let all = self.members.build(&Value::Container(input), stream, ctx)?;
        self.focused(all)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        self.members.sizeof_bits(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::Error,
        expr::{len_of, this},
        primitives::{Bytes, Check, Computed, Const, Rebuild, u8, u16be},
        repeat::StopIf,
        stream::MemoryStream,
    };

    fn pair() -> Struct {
        Struct::new().field("a", u8()).field("b", u8())
    }

    #[test]
    fn test_parse_two_fields() {
        let value = pair().parse_bytes(&[5, 7]).unwrap();
        assert_eq!(value, Value::Container(Container::from([("a", 5), ("b", 7)])));
    }

    #[test]
    fn test_build_two_fields() {
        let input = Value::Container(Container::from([("a", 5), ("b", 7)]));
        assert_eq!(pair().build_bytes(&input).unwrap(), vec![5, 7]);
        assert_eq!(pair().size().unwrap(), 2);
    }

    #[test]
    fn test_field_order_follows_declaration() {
        let layout = Struct::new().field("z", u8()).field("a", u8()).field("m", u8());
        let value = layout.parse_bytes(&[1, 2, 3]).unwrap();
        let keys: Vec<_> = value.as_container().unwrap().keys().map(str::to_string).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);

        // build ignores input order and extra keys
        let input = Container::from([("m", 3), ("extra", 9), ("a", 2), ("z", 1)]);
        assert_eq!(layout.build_bytes(&Value::Container(input)).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_field() {
        let input = Value::Container(Container::from([("a", 5)]));
        assert_eq!(
            pair().build_bytes(&input).unwrap_err(),
            Error::Field(FieldError::Missing("b".into()))
        );
    }

    #[test]
    fn test_length_from_earlier_field() {
        let layout = Struct::new()
            .field("len", u8())
            .field("data", Bytes::new(this("len")));
        let value = layout.parse_bytes(&[2, 0xaa, 0xbb, 0xcc]).unwrap();
        let fields = value.as_container().unwrap();
        assert_eq!(fields.get("data"), Some(&Value::Bytes(vec![0xaa, 0xbb])));

        assert!(matches!(layout.size(), Err(Error::Sizeof(_))));
    }

    #[test]
    fn test_rebuild_length_from_later_field() {
        let layout = Struct::new()
            .field("len", Rebuild::new(u8(), len_of(this("data"))))
            .field("data", Bytes::new(this("len")));
        let input = Container::from([("data", Value::Bytes(vec![1, 2, 3]))]);
        let bytes = layout.build_bytes(&Value::Container(input)).unwrap();
        assert_eq!(bytes, vec![3, 1, 2, 3]);
    }

    #[test]
    fn test_build_returns_written_values() {
        let layout = Struct::new()
            .field("magic", Const::new(u8(), 0x7f))
            .field("n", u8())
            .field("twice", Computed::new(this("n") * 2))
            .anon(Check::new(this("twice").less(100)));
        let mut out = MemoryStream::new();
        let written = layout
            .build_stream(&Value::Container(Container::from([("n", 4)])), &mut out)
            .unwrap();
        assert_eq!(
            written,
            Value::Container(Container::from([("magic", 0x7f), ("n", 4), ("twice", 8)]))
        );
        assert_eq!(out.into_inner(), vec![0x7f, 4]);
    }

    #[test]
    fn test_nested_struct_sees_parent() {
        let inner = Struct::new().field("body", Bytes::new(this("_.size")));
        let layout = Struct::new().field("size", u8()).field("inner", inner);
        let value = layout.parse_bytes(&[1, 0xee]).unwrap();
        let inner = value.as_container().unwrap().get("inner").unwrap();
        assert_eq!(
            inner.as_container().unwrap().get("body"),
            Some(&Value::Bytes(vec![0xee]))
        );
    }

    #[test]
    fn test_sizeof_with_caller_context() {
        let layout = Struct::new().field("data", Bytes::new(this("n")));
        let ctx = Context::from_container(Container::from([("n", 6)]));
        assert_eq!(layout.sizeof(&ctx).unwrap(), 6);
    }

    #[test]
    fn test_sequence() {
        let seq = Sequence::new().then(u8()).then(u16be());
        let value = seq.parse_bytes(&[1, 0, 2]).unwrap();
        assert_eq!(value, Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(seq.build_bytes(&value).unwrap(), vec![1, 0, 2]);
        assert_eq!(seq.size().unwrap(), 3);
        assert!(seq.build_bytes(&Value::List(vec![Value::Int(1)])).is_err());
    }

    #[test]
    fn test_size_overflow() {
        let huge = usize::MAX / 8;
        let layout = Struct::new()
            .field("a", Bytes::new(huge))
            .field("b", Bytes::new(huge));
        assert!(matches!(layout.size(), Err(Error::Sizeof(_))));

        let seq = Sequence::new().then(Bytes::new(huge)).then(u8());
        assert!(matches!(seq.size(), Err(Error::Sizeof(_))));
    }

    #[test]
    fn test_focused_seq() {
        let layout = FocusedSeq::new("payload")
            .field("magic", Const::bytes(b"FS"))
            .field("len", Rebuild::new(u8(), len_of(this("payload"))))
            .field("payload", Bytes::new(this("len")));

        let value = layout.parse_bytes(b"FS\x02hi").unwrap();
        assert_eq!(value, Value::Bytes(b"hi".to_vec()));
        assert_eq!(layout.build_bytes(&value).unwrap(), b"FS\x02hi".to_vec());
        assert!(layout.parse_bytes(b"XX\x00").is_err());

        let ctx = Context::from_container(Container::from([("len", 2)]));
        assert_eq!(layout.sizeof(&ctx).unwrap(), 5);

        let unknown = FocusedSeq::new("nope").field("a", u8());
        assert_eq!(
            unknown.parse_bytes(&[1]).unwrap_err(),
            Error::Field(FieldError::Missing("nope".into()))
        );
    }

    #[test]
    fn test_sequence_stops() {
        let seq = Sequence::new()
            .then(u8())
            .then(StopIf::new(this("_.short")))
            .then(u16be());

        let mut ctx = Context::from_container(Container::from([("short", true)]));
        let mut stream = MemoryStream::from_bytes(vec![1, 0, 2]);
        let value = seq.parse(&mut stream, &mut ctx).unwrap();
        assert_eq!(value, Value::List(vec![Value::Int(1)]));
        assert_eq!(stream.tell().unwrap(), 1);

        let mut out = MemoryStream::new();
        seq.build(&value, &mut out, &mut ctx).unwrap();
        assert_eq!(out.into_inner(), vec![1]);

        let mut ctx = Context::from_container(Container::from([("short", false)]));
        let value = seq
            .parse(&mut MemoryStream::from_bytes(vec![1, 0, 2]), &mut ctx)
            .unwrap();
        assert_eq!(value, Value::List(vec![Value::Int(1), Value::None, Value::Int(2)]));
    }
}
