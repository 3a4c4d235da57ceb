//! Error types for parsing, building and sizing layouts.

use thiserror::Error;

/// Result alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by [crate::construct::Construct] operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The stream could not satisfy a read, write or seek.
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// A value was absent or had the wrong shape for its construct.
    #[error(transparent)]
    Field(#[from] FieldError),
    /// A numeric value does not fit the declared width and signedness.
    #[error("value {value} does not fit in {bits} bits (signed: {signed})")]
    Range { value: i128, bits: usize, signed: bool },
    /// The encoded size depends on data that is not available.
    #[error("size cannot be determined: {0}")]
    Sizeof(String),
    /// A switch key matched no case and no default was declared.
    #[error("no case matches key {key}")]
    NoMatchingCase { key: String },
    /// Every alternative of a select failed.
    #[error("none of {tried} alternatives matched")]
    NoMatchingAlternative { tried: usize },
    /// An expression could not be evaluated against its context.
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    /// Padding, constant or check mismatch.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A transform could not map a value in one direction.
    #[error("adaptation failed: {0}")]
    Adaptation(String),
}

impl Error {
    /// True when the stream ran out of data. Greedy repeaters stop on this.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::Stream(StreamError::EndOfStream { .. }))
    }

    /// Turns "a field referenced by an expression is not known yet" into
    /// [Error::Sizeof]; every other error passes through unchanged.
    pub fn indeterminate(self) -> Self {
        match self {
            Error::Expression(ExpressionError::MissingKey(key)) => {
                Error::Sizeof(format!("depends on `{key}`"))
            }
            Error::Expression(ExpressionError::Unavailable(what)) => {
                Error::Sizeof(format!("depends on the {what}"))
            }
            other => other,
        }
    }
}

/// Errors produced by [crate::stream::Stream] implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Fewer units remain than were requested. Units are bytes, or bits inside a bit scope.
    #[error("end of stream: requested {requested}, {available} available")]
    EndOfStream { requested: usize, available: usize },
    /// Seek target lies before the start or past the end of the stream.
    #[error("invalid seek target {target}")]
    InvalidSeek { target: i128 },
    /// Bit-granular access attempted on a byte stream.
    #[error("{bits}-bit access requires a bit scope")]
    NotBitScoped { bits: usize },
    /// More than 64 bits requested in a single access.
    #[error("cannot access {0} bits at once (limit is 64)")]
    TooManyBits(usize),
    /// A bit scope was opened inside another bit scope.
    #[error("bit scope is already open")]
    NestedBitScope,
    /// Failure reported by an underlying I/O handle.
    #[error("i/o error: {0}")]
    Io(String),
}

/// Errors about the shape of values handed to or produced by constructs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// A required field is absent from the build input.
    #[error("missing field `{0}`")]
    Missing(String),
    /// The value has a different type than the construct handles.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// The value length disagrees with the declared length.
    #[error("expected length {expected}, found {actual}")]
    WrongLength { expected: usize, actual: usize },
    /// A primitive was declared with an unsupported width.
    #[error("unsupported width of {0} bits")]
    InvalidWidth(usize),
}

/// Errors produced while evaluating an [crate::expr::Expr].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    /// The referenced path does not resolve in the context chain.
    #[error("missing key `{0}`")]
    MissingKey(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    /// The operator cannot be applied to the operand types.
    #[error("cannot apply `{op}` to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    /// Index, item or list referenced outside of a repeater.
    #[error("{0} is not available here")]
    Unavailable(&'static str),
}

/// Errors produced when compiling a JSON layout definition.
#[cfg(feature = "serde")]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Field name is empty or duplicated within one aggregate.
    #[error("invalid field name `{0}`")]
    InvalidFieldName(String),
    /// A path expression could not be understood.
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
    /// A numeric parameter is out of its allowed range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The JSON text did not match the definition shape.
    #[error("invalid layout json: {0}")]
    Json(String),
}
