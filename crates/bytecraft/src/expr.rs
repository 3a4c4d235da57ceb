//! Deferred, context-dependent values.
//!
//! An [Expr] is an inert tree built once alongside the layout and evaluated
//! every time a construct needs the value it describes. Evaluation reads the
//! [Context] and never mutates it.
//!
//! ```
//! use bytecraft::expr::{Expr, this};
//!
//! // length of a payload that follows a header: total minus header size
//! let len: Expr = this("total") - 4;
//! ```

use std::{
    cmp::Ordering,
    fmt,
    ops::{Add, BitAnd, BitOr, BitXor, Div, Mul, Neg, Not, Rem, Shl, Shr, Sub},
    sync::Arc,
};

use crate::{
    context::Context,
    errors::{Error, ExpressionError, Result},
    value::Value,
};

/// Host function usable as an expression node.
#[derive(Clone)]
pub struct ExprFn(Arc<dyn Fn(&Context<'_>) -> Result<Value> + Send + Sync>);

impl fmt::Debug for ExprFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExprFn(..)")
    }
}

/// Dotted field path, optionally anchored at an ancestor scope.
///
/// Relative paths (`"a.b"`) resolve their first segment in the current scope
/// and then in each enclosing scope. Anchored paths start with one `_` per
/// level to climb (`"_.tag"`) and only look in the scope they land on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    up: usize,
    segments: Vec<String>,
}

impl Path {
    pub fn parse(path: &str) -> Self {
        let mut up = 0;
        let mut segments = Vec::new();
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            if segment == "_" && segments.is_empty() {
                up += 1;
            } else {
                segments.push(segment.to_string());
            }
        }
        Self { up, segments }
    }

    pub fn is_anchored(&self) -> bool {
        self.up > 0
    }

    fn missing(&self) -> Error {
        ExpressionError::MissingKey(self.to_string()).into()
    }

    fn resolve(&self, ctx: &Context<'_>) -> Result<Value> {
        let mut scope = ctx;
        for _ in 0..self.up {
            scope = scope.parent().ok_or_else(|| self.missing())?;
        }

        let Some((first, rest)) = self.segments.split_first() else {
            return Ok(Value::Container(scope.fields().clone()));
        };

        let mut value = if self.is_anchored() {
            scope.get_local(first).ok_or_else(|| self.missing())?
        } else {
            scope.get(first).map_err(|_| self.missing())?
        };

        for segment in rest {
            value = match value {
                Value::Container(fields) => fields.get(segment),
                Value::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(|| self.missing())?;
        }

        Ok(value.clone())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = std::iter::repeat_n("_", self.up)
            .chain(self.segments.iter().map(String::as_str))
            .collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Operator of an [Expr::Unary] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical not on booleans, bitwise not on integers.
    Not,
    /// Length of bytes, a string, a list or a container.
    Len,
    /// Absolute value.
    Abs,
    /// Sum of a list of numbers.
    Sum,
}

/// Operator of an [Expr::Binary] node.
///
/// Arithmetic on two integers stays integral and fails on overflow; mixing
/// in a float yields a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BinaryOp {
    /// Addition; also concatenates bytes, strings and lists.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division, truncating for integers. Fails on a zero divisor.
    Div,
    /// Remainder. Fails on a zero divisor.
    Mod,
    /// Bitwise and on integers.
    BitAnd,
    /// Bitwise or on integers.
    BitOr,
    /// Bitwise exclusive or on integers.
    BitXor,
    /// Left shift.
    Shl,
    /// Arithmetic right shift.
    Shr,
    /// Equality of any two values.
    Eq,
    /// Inequality of any two values.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Both operands truthy.
    And,
    /// Either operand truthy.
    Or,
    /// Smaller operand.
    Min,
    /// Larger operand.
    Max,
}

impl BinaryOp {
    /// Operator as written in [Expr]'s display form.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
        }
    }
}

impl UnaryOp {
    /// Operator as written in [Expr]'s display form.
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::Len => "len",
            UnaryOp::Abs => "abs",
            UnaryOp::Sum => "sum",
        }
    }
}

/// Expression tree evaluated against a [Context].
#[derive(Debug, Clone)]
pub enum Expr {
    /// Literal value.
    Const(Value),
    /// Field lookup; see [this].
    Path(Path),
    /// Index of the innermost repeater element.
    Index,
    /// Element under test in a repeater predicate.
    Item,
    /// Elements collected so far in a repeater predicate, as a list.
    Items,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Host closure; see [Expr::func].
    Func(ExprFn),
}

/// Reference to a field of the current or an enclosing scope.
pub fn this(path: &str) -> Expr {
    Expr::Path(Path::parse(path))
}

/// Index of the element a repeater is processing.
pub fn index() -> Expr {
    Expr::Index
}

/// Latest element, inside a [RepeatUntil](crate::repeat::RepeatUntil)
/// predicate.
pub fn item() -> Expr {
    Expr::Item
}

/// Every element so far, inside a
/// [RepeatUntil](crate::repeat::RepeatUntil) predicate.
pub fn items() -> Expr {
    Expr::Items
}

/// Length of a bytes, string, list or container value.
pub fn len_of(expr: impl Into<Expr>) -> Expr {
    Expr::Unary(UnaryOp::Len, Box::new(expr.into()))
}

impl Expr {
    /// Wraps a host closure.
    pub fn func(f: impl Fn(&Context<'_>) -> Result<Value> + Send + Sync + 'static) -> Self {
        Expr::Func(ExprFn(Arc::new(f)))
    }

    /// The literal, if this is a constant.
    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Expr::Const(v) => Some(v),
            _ => None,
        }
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<Expr>) -> Self {
        Expr::Binary(op, Box::new(self), Box::new(rhs.into()))
    }

    /// `self == rhs`
    pub fn equal(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    /// `self != rhs`
    pub fn not_equal(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    /// `self < rhs`
    pub fn less(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    /// `self <= rhs`
    pub fn less_eq(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    /// `self > rhs`
    pub fn greater(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    /// `self >= rhs`
    pub fn greater_eq(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    /// True when both sides are truthy.
    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    /// True when either side is truthy.
    pub fn or(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    /// Smaller of the two sides.
    pub fn min(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Min, rhs)
    }

    /// Larger of the two sides.
    pub fn max(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Max, rhs)
    }

    /// Absolute value.
    pub fn abs(self) -> Self {
        Expr::Unary(UnaryOp::Abs, Box::new(self))
    }

    /// Sum of a list.
    pub fn sum(self) -> Self {
        Expr::Unary(UnaryOp::Sum, Box::new(self))
    }

    /// Evaluates the tree bottom-up. Both operands of every node are always
    /// evaluated.
    pub fn eval(&self, ctx: &Context<'_>) -> Result<Value> {
        match self {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Path(path) => path.resolve(ctx),
            Expr::Index => ctx
                .index()
                .map(Value::from)
                .ok_or_else(|| ExpressionError::Unavailable("repeater index").into()),
            Expr::Item => ctx
                .item()
                .cloned()
                .ok_or_else(|| ExpressionError::Unavailable("predicate item").into()),
            Expr::Items => ctx
                .items()
                .map(|items| Value::List(items.to_vec()))
                .ok_or_else(|| ExpressionError::Unavailable("predicate list").into()),
            Expr::Unary(op, operand) => unary(*op, operand.eval(ctx)?),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = lhs.eval(ctx)?;
                let rhs = rhs.eval(ctx)?;
                binary(*op, lhs, rhs)
            }
            Expr::Func(ExprFn(f)) => f(ctx),
        }
    }

    /// Like [Expr::eval], but reports references to data that is not known
    /// yet as an indeterminate size.
    pub fn eval_sized(&self, ctx: &Context<'_>) -> Result<Value> {
        self.eval(ctx).map_err(Error::indeterminate)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Path(path) => write!(f, "this.{path}"),
            Expr::Index => write!(f, "index"),
            Expr::Item => write!(f, "item"),
            Expr::Items => write!(f, "items"),
            Expr::Unary(op @ (UnaryOp::Neg | UnaryOp::Not), operand) => {
                write!(f, "{}{operand}", op.symbol())
            }
            Expr::Unary(op, operand) => write!(f, "{}({operand})", op.symbol()),
            Expr::Binary(op @ (BinaryOp::Min | BinaryOp::Max), lhs, rhs) => {
                write!(f, "{}({lhs}, {rhs})", op.symbol())
            }
            Expr::Binary(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Expr::Func(_) => write!(f, "<fn>"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i128),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(Num::Int(*v)),
            Value::Bool(b) => Some(Num::Int(*b as i128)),
            Value::Float(v) => Some(Num::Float(*v)),
            _ => None,
        }
    }

    fn float(self) -> f64 {
        match self {
            Num::Int(v) => v as f64,
            Num::Float(v) => v,
        }
    }
}

fn unary_mismatch(op: UnaryOp, value: &Value) -> Error {
    ExpressionError::TypeMismatch {
        op: op.symbol(),
        lhs: value.type_name(),
        rhs: "none",
    }
    .into()
}

fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    match (op, &value) {
        (UnaryOp::Neg, Value::Int(v)) => v
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| ExpressionError::Overflow.into()),
        (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Not, Value::Int(v)) => Ok(Value::Int(!v)),
        (UnaryOp::Abs, Value::Int(v)) => v
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| ExpressionError::Overflow.into()),
        (UnaryOp::Abs, Value::Float(v)) => Ok(Value::Float(v.abs())),
        (UnaryOp::Len, Value::Bytes(b)) => Ok(Value::from(b.len())),
        (UnaryOp::Len, Value::String(s)) => Ok(Value::from(s.len())),
        (UnaryOp::Len, Value::List(items)) => Ok(Value::from(items.len())),
        (UnaryOp::Len, Value::Container(c)) => Ok(Value::from(c.len())),
        (UnaryOp::Sum, Value::List(items)) => items
            .iter()
            .try_fold(Value::Int(0), |acc, item| binary(BinaryOp::Add, acc, item.clone())),
        _ => Err(unary_mismatch(op, &value)),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    let mismatch = |lhs: &Value, rhs: &Value| -> Error {
        ExpressionError::TypeMismatch {
            op: op.symbol(),
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        }
        .into()
    };

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            match (op, lhs, rhs) {
                (BinaryOp::Add, Value::Bytes(mut a), Value::Bytes(b)) => {
                    a.extend_from_slice(&b);
                    Ok(Value::Bytes(a))
                }
                (BinaryOp::Add, Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                (BinaryOp::Add, Value::List(mut a), Value::List(b)) => {
                    a.extend(b);
                    Ok(Value::List(a))
                }
                (_, lhs, rhs) => match (Num::of(&lhs), Num::of(&rhs)) {
                    (Some(Num::Int(a)), Some(Num::Int(b))) => int_arith(op, a, b),
                    (Some(a), Some(b)) => float_arith(op, a.float(), b.float()),
                    _ => Err(mismatch(&lhs, &rhs)),
                },
            }
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => match (&lhs, &rhs) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(match op {
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                _ => a ^ b,
            })),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(match op {
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                _ => a ^ b,
            })),
            _ => Err(mismatch(&lhs, &rhs)),
        },
        BinaryOp::Shl | BinaryOp::Shr => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => shift(op, *a, *b),
            _ => Err(mismatch(&lhs, &rhs)),
        },
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&lhs, &rhs).ok_or_else(|| mismatch(&lhs, &rhs))?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::And => Ok(Value::Bool(lhs.truthy() && rhs.truthy())),
        BinaryOp::Or => Ok(Value::Bool(lhs.truthy() || rhs.truthy())),
        BinaryOp::Min | BinaryOp::Max => {
            let ordering = compare(&lhs, &rhs).ok_or_else(|| mismatch(&lhs, &rhs))?;
            let take_lhs = match op {
                BinaryOp::Min => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(if take_lhs { lhs } else { rhs })
        }
    }
}

fn int_arith(op: BinaryOp, a: i128, b: i128) -> Result<Value> {
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0 {
        return Err(ExpressionError::DivisionByZero.into());
    }

    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => a.checked_div_euclid(b),
        _ => a.checked_rem_euclid(b),
    };
    result
        .map(Value::Int)
        .ok_or_else(|| ExpressionError::Overflow.into())
}

fn float_arith(op: BinaryOp, a: f64, b: f64) -> Result<Value> {
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0.0 {
        return Err(ExpressionError::DivisionByZero.into());
    }

    Ok(Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => a.rem_euclid(b),
    }))
}

fn shift(op: BinaryOp, value: i128, amount: i128) -> Result<Value> {
    let amount = u32::try_from(amount)
        .ok()
        .filter(|n| *n < i128::BITS)
        .ok_or(ExpressionError::Overflow)?;

    match op {
        BinaryOp::Shl => {
            let shifted = value << amount;
            if shifted >> amount != value {
                return Err(ExpressionError::Overflow.into());
            }
            Ok(Value::Int(shifted))
        }
        _ => Ok(Value::Int(value >> amount)),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (Num::of(lhs), Num::of(rhs)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
        (Some(a), Some(b)) => a.float() == b.float(),
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (Num::of(lhs)?, Num::of(rhs)?) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.float().partial_cmp(&b.float()),
        },
    }
}

macro_rules! expr_from {
    ( $( $ty:ty ),+ $(,)? ) => {
        $( impl From<$ty> for Expr {
            fn from(v: $ty) -> Self {
                Expr::Const(Value::from(v))
            }
        }
        )+
    };
}

expr_from![i8, i16, i32, i64, i128, u8, u16, u32, u64, usize, bool, f64];

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Const(v)
    }
}

macro_rules! expr_binary_ops {
    ( $( $trait:ident :: $method:ident => $op:ident ),+ $(,)? ) => {
        $( impl<R: Into<Expr>> $trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                self.binary(BinaryOp::$op, rhs)
            }
        }
        )+
    };
}

expr_binary_ops![
    Add::add => Add,
    Sub::sub => Sub,
    Mul::mul => Mul,
    Div::div => Div,
    Rem::rem => Mod,
    BitAnd::bitand => BitAnd,
    BitOr::bitor => BitOr,
    BitXor::bitxor => BitXor,
    Shl::shl => Shl,
    Shr::shr => Shr,
];

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Unary(UnaryOp::Neg, Box::new(self))
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Unary(UnaryOp::Not, Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Container;

    fn ctx_with(fields: &[(&str, Value)]) -> Context<'static> {
        Context::from_container(fields.iter().cloned().collect::<Container>())
    }

    #[test]
    fn test_arithmetic() {
        let ctx = ctx_with(&[("a", Value::Int(7)), ("b", Value::Int(2))]);
        assert_eq!((this("a") + this("b")).eval(&ctx).unwrap(), Value::Int(9));
        assert_eq!((this("a") * 3 - 1).eval(&ctx).unwrap(), Value::Int(20));
        assert_eq!((this("a") / this("b")).eval(&ctx).unwrap(), Value::Int(3));
        assert_eq!((this("a") % this("b")).eval(&ctx).unwrap(), Value::Int(1));
        assert_eq!((-this("a") / 2).eval(&ctx).unwrap(), Value::Int(-4));
        assert_eq!((this("a") << 2).eval(&ctx).unwrap(), Value::Int(28));
        assert_eq!((this("a") & 3).eval(&ctx).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_division_by_zero() {
        let ctx = ctx_with(&[("n", Value::Int(0))]);
        let err = (Expr::from(4) / this("n")).eval(&ctx).unwrap_err();
        assert_eq!(err, Error::Expression(ExpressionError::DivisionByZero));
        assert!((Expr::from(4.0) % this("n")).eval(&ctx).is_err());
    }

    #[test]
    fn test_overflow_is_an_error() {
        let ctx = Context::new();
        let err = (Expr::from(i128::MAX) + 1).eval(&ctx).unwrap_err();
        assert_eq!(err, Error::Expression(ExpressionError::Overflow));
        assert!((Expr::from(1) << 200).eval(&ctx).is_err());
    }

    #[test]
    fn test_comparisons_and_logic() {
        let ctx = ctx_with(&[("tag", Value::Int(2)), ("ok", Value::Bool(true))]);
        assert_eq!(this("tag").equal(2).eval(&ctx).unwrap(), Value::Bool(true));
        assert_eq!(this("tag").less(2.5).eval(&ctx).unwrap(), Value::Bool(true));
        assert_eq!(
            this("ok").and(this("tag").greater_eq(3)).eval(&ctx).unwrap(),
            Value::Bool(false)
        );
        assert_eq!((!this("ok")).eval(&ctx).unwrap(), Value::Bool(false));
        assert_eq!(this("tag").max(5).eval(&ctx).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_missing_key() {
        let ctx = Context::new();
        let err = (this("count") + 1).eval(&ctx).unwrap_err();
        assert_eq!(err, Error::Expression(ExpressionError::MissingKey("count".into())));
        assert!(matches!(this("count").eval_sized(&ctx), Err(Error::Sizeof(_))));
    }

    #[test]
    fn test_strict_evaluation() {
        let ctx = Context::new();
        // the right operand still fails even though the left decides the result
        let expr = Expr::from(false).and(this("missing"));
        assert!(expr.eval(&ctx).is_err());
    }

    #[test]
    fn test_paths() {
        let header = Container::from([("len", 4)]);
        let mut root = Context::new();
        root.insert("header", Value::Container(header));
        root.insert("tag", Value::Int(1));

        let mut child = Context::with_parent(&root);
        child.insert("tag", Value::Int(9));

        assert_eq!(this("header.len").eval(&child).unwrap(), Value::Int(4));
        assert_eq!(this("tag").eval(&child).unwrap(), Value::Int(9));
        assert_eq!(this("_.tag").eval(&child).unwrap(), Value::Int(1));
        assert!(this("_.missing").eval(&child).is_err());
        assert!(this("_._.tag").eval(&child).is_err());
        assert_eq!(Path::parse("_.a.b").to_string(), "_.a.b");
    }

    #[test]
    fn test_anchored_path_does_not_walk() {
        let mut root = Context::new();
        root.insert("outer", Value::Int(1));
        let middle = Context::with_parent(&root);
        let inner = Context::with_parent(&middle);
        assert!(this("_.outer").eval(&inner).is_err());
        assert_eq!(this("outer").eval(&inner).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_list_index_in_path() {
        let ctx = ctx_with(&[("items", Value::List(vec![Value::Int(3), Value::Int(4)]))]);
        assert_eq!(this("items.1").eval(&ctx).unwrap(), Value::Int(4));
        assert_eq!(len_of(this("items")).eval(&ctx).unwrap(), Value::Int(2));
        assert_eq!(this("items").sum().eval(&ctx).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_index_and_item() {
        let mut root = Context::new();
        assert!(index().eval(&root).is_err());
        root.set_index(Some(2));
        assert_eq!(index().eval(&root).unwrap(), Value::Int(2));

        let current = Value::Int(0);
        let all = vec![Value::Int(5), Value::Int(0)];
        let scope = Context::with_item(&root, &current, &all);
        assert_eq!(item().equal(0).eval(&scope).unwrap(), Value::Bool(true));
        assert_eq!(len_of(items()).eval(&scope).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_func() {
        let ctx = ctx_with(&[("a", Value::Int(3))]);
        let expr = Expr::func(|ctx| Ok(Value::Int(ctx.get("a")?.as_int()? * 10)));
        assert_eq!(expr.eval(&ctx).unwrap(), Value::Int(30));
    }

    #[test]
    fn test_concat_and_type_mismatch() {
        let ctx = ctx_with(&[("s", Value::from("ab"))]);
        assert_eq!(
            (this("s") + Value::from("c")).eval(&ctx).unwrap(),
            Value::from("abc")
        );
        assert!(matches!(
            (this("s") - 1).eval(&ctx),
            Err(Error::Expression(ExpressionError::TypeMismatch { op: "-", .. }))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!((this("a") + 1).to_string(), "(this.a + 1)");
        assert_eq!(len_of(this("data")).to_string(), "len(this.data)");
    }
}
