//! Repeaters: fixed count, greedy, predicate-terminated and length-prefixed.

use tracing::debug;

use crate::{
    construct::{Construct, ConstructRef, IntoConstruct, size_overflow},
    context::Context,
    errors::{Error, FieldError, Result},
    expr::Expr,
    stream::{Stream, Whence},
    value::Value,
};

/// Parses `count` elements, exposing each element's position as the
/// repeater index.
fn parse_elements(
    inner: &dyn Construct,
    count: usize,
    stream: &mut dyn Stream,
    ctx: &mut Context<'_>,
) -> Result<Vec<Value>> {
    let saved = ctx.set_index(None);
    let result = (0..count)
        .map(|i| {
            ctx.set_index(Some(i));
            inner.parse(stream, ctx)
        })
        .collect();
    ctx.set_index(saved);
    result
}

fn build_elements(
    inner: &dyn Construct,
    values: &[Value],
    stream: &mut dyn Stream,
    ctx: &mut Context<'_>,
) -> Result<Vec<Value>> {
    let saved = ctx.set_index(None);
    let result = values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            ctx.set_index(Some(i));
            inner.build(value, stream, ctx)
        })
        .collect();
    ctx.set_index(saved);
    result
}

/// Exactly `count` elements; the count is evaluated once per call.
#[derive(Debug, Clone)]
pub struct Array {
    count: Expr,
    inner: ConstructRef,
}

impl Array {
    pub fn new(count: impl Into<Expr>, inner: impl IntoConstruct) -> Self {
        Self {
            count: count.into(),
            inner: inner.into_construct(),
        }
    }
}

impl Construct for Array {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let count = self.count.eval(ctx)?.as_usize()?;
        parse_elements(self.inner.as_ref(), count, stream, ctx).map(Value::List)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let values = value.as_list()?;
        let count = self.count.eval(ctx)?.as_usize()?;
        if values.len() != count {
            return Err(FieldError::WrongLength {
                expected: count,
                actual: values.len(),
            }
            .into());
        }
        build_elements(self.inner.as_ref(), values, stream, ctx).map(Value::List)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        let count = self.count.eval_sized(ctx)?.as_usize()?;
        count
            .checked_mul(self.inner.sizeof_bits(ctx)?)
            .ok_or_else(size_overflow)
    }
}

/// As many elements as the stream holds.
///
/// Stops cleanly when the stream is exhausted or when an element would run
/// past its end; the partial element is not consumed. An element that
/// consumes nothing also ends the repetition, as does an element whose
/// [Construct::stops] holds for the next index. Any other failure propagates.
#[derive(Debug, Clone)]
pub struct GreedyRange {
    inner: ConstructRef,
}

impl GreedyRange {
    pub fn new(inner: impl IntoConstruct) -> Self {
        Self {
            inner: inner.into_construct(),
        }
    }

    fn collect(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Vec<Value>> {
        let mut values = Vec::new();

        while !stream.at_end()? {
            let start = stream.tell()?;
            ctx.set_index(Some(values.len()));
            if self.inner.stops(ctx)? {
                debug!(elements = values.len(), "greedy range stopped by condition");
                break;
            }

            match self.inner.parse(stream, ctx) {
                Ok(value) => {
                    if stream.tell()? == start {
                        debug!(elements = values.len(), "greedy range stopped on empty element");
                        break;
                    }
                    values.push(value);
                }
                Err(err) if err.is_end_of_stream() => {
                    stream.seek(start as i64, Whence::Start)?;
                    debug!(elements = values.len(), %err, "greedy range stopped at end of stream");
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(values)
    }
}

impl Construct for GreedyRange {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let saved = ctx.set_index(None);
        let result = self.collect(stream, ctx);
        ctx.set_index(saved);
        result.map(Value::List)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        build_elements(self.inner.as_ref(), value.as_list()?, stream, ctx).map(Value::List)
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Err(Error::Sizeof("greedy range depends on the stream length".into()))
    }
}

/// Whether a predicate repeater keeps the element that satisfied it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Terminator {
    /// The terminating element is consumed and included.
    #[default]
    Inclusive,
    /// The stream is rewound to before the terminating element, which is left
    /// for the next field.
    Exclusive,
}

/// Elements until `predicate` holds for the latest one.
///
/// The predicate sees the latest element as [crate::expr::item] and every
/// element so far, the latest included, as [crate::expr::items]. Running out
/// of data before the predicate holds is an error.
#[derive(Debug, Clone)]
pub struct RepeatUntil {
    predicate: Expr,
    inner: ConstructRef,
    terminator: Terminator,
}

impl RepeatUntil {
    pub fn new(predicate: impl Into<Expr>, inner: impl IntoConstruct) -> Self {
        Self {
            predicate: predicate.into(),
            inner: inner.into_construct(),
            terminator: Terminator::default(),
        }
    }

    pub fn terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    fn satisfied(&self, values: &[Value], ctx: &Context<'_>) -> Result<bool> {
        let Some(last) = values.last() else {
            return Ok(false);
        };
        let scope = Context::with_item(ctx, last, values);
        Ok(self.predicate.eval(&scope)?.truthy())
    }

    fn collect(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Vec<Value>> {
        let mut values = Vec::new();

        loop {
            let start = stream.tell()?;
            ctx.set_index(Some(values.len()));
            values.push(self.inner.parse(stream, ctx)?);

            if self.satisfied(&values, ctx)? {
                if self.terminator == Terminator::Exclusive {
                    values.pop();
                    stream.seek(start as i64, Whence::Start)?;
                }
                debug!(elements = values.len(), terminator = ?self.terminator, "repeat until satisfied");
                return Ok(values);
            }
        }
    }

    fn emit(&self, values: &[Value], stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Vec<Value>> {
        let mut written = Vec::with_capacity(values.len());

        for (i, value) in values.iter().enumerate() {
            ctx.set_index(Some(i));
            written.push(self.inner.build(value, stream, ctx)?);

            let last = i + 1 == values.len();
            let satisfied = self.satisfied(&written, ctx)?;
            match self.terminator {
                Terminator::Inclusive if satisfied && !last => {
                    return Err(Error::Validation(format!(
                        "element {i} ends the repetition before the end of the list"
                    )));
                }
                Terminator::Inclusive if !satisfied && last => {
                    return Err(Error::Validation(
                        "no element satisfies the repeat predicate".into(),
                    ));
                }
                Terminator::Exclusive if satisfied => {
                    return Err(Error::Validation(format!(
                        "element {i} satisfies the repeat predicate"
                    )));
                }
                _ => {}
            }
        }

        if values.is_empty() && self.terminator == Terminator::Inclusive {
            return Err(Error::Validation("no element satisfies the repeat predicate".into()));
        }

        Ok(written)
    }
}

impl Construct for RepeatUntil {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let saved = ctx.set_index(None);
        let result = self.collect(stream, ctx);
        ctx.set_index(saved);
        result.map(Value::List)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let values = value.as_list()?;
        let saved = ctx.set_index(None);
        let result = self.emit(values, stream, ctx);
        ctx.set_index(saved);
        result.map(Value::List)
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Err(Error::Sizeof("repeat until depends on the parsed data".into()))
    }
}

/// Element count encoded by `count`, followed by the elements.
#[derive(Debug, Clone)]
pub struct PrefixedArray {
    count: ConstructRef,
    inner: ConstructRef,
}

impl PrefixedArray {
    pub fn new(count: impl IntoConstruct, inner: impl IntoConstruct) -> Self {
        Self {
            count: count.into_construct(),
            inner: inner.into_construct(),
        }
    }
}

impl Construct for PrefixedArray {
    fn parse(&self, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let count = self.count.parse(stream, ctx)?.as_usize()?;
        parse_elements(self.inner.as_ref(), count, stream, ctx).map(Value::List)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &mut Context<'_>) -> Result<Value> {
        let values = value.as_list()?;
        self.count.build(&Value::from(values.len()), stream, ctx)?;
        build_elements(self.inner.as_ref(), values, stream, ctx).map(Value::List)
    }

    fn sizeof_bits(&self, _: &Context<'_>) -> Result<usize> {
        Err(Error::Sizeof("prefixed array depends on its element count".into()))
    }
}

/// Marker that ends the enclosing [Struct](crate::aggregate::Struct),
/// [Sequence](crate::aggregate::Sequence) or [GreedyRange] once `condition`
/// holds. Members after it are skipped in both directions.
///
/// The marker itself occupies nothing and yields no value.
#[derive(Debug, Clone)]
pub struct StopIf {
    condition: Expr,
}

impl StopIf {
    pub fn new(condition: impl Into<Expr>) -> Self {
        Self {
            condition: condition.into(),
        }
    }
}

impl Construct for StopIf {
    fn parse(&self, _: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        Ok(Value::None)
    }

    fn build(&self, _: &Value, _: &mut dyn Stream, _: &mut Context<'_>) -> Result<Value> {
        Ok(Value::None)
    }

    fn sizeof_bits(&self, ctx: &Context<'_>) -> Result<usize> {
        if self.condition.eval_sized(ctx)?.truthy() {
            return Err(Error::Sizeof("stop condition holds".into()));
        }
        Ok(0)
    }

    fn stops(&self, ctx: &Context<'_>) -> Result<bool> {
        Ok(self.condition.eval(ctx)?.truthy())
    }

    fn is_implicit(&self) -> bool {
        true
    }
}
