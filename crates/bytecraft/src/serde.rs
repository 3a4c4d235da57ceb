//! JSON-deserializable layout description.
//!
//! These types describe the *shape* of a binary format. They are intended to
//! be read from JSON (for example a format file shipped with your
//! application) and then compiled into a construct tree with
//! [LayoutDef::compile] or [compile_json].
//!
//! Every layout object carries a `"type"` tag naming the construct:
//!
//! ```
//! use bytecraft::{serde::compile_json, value::Value};
//!
//! let layout = compile_json(r#"{
//!     "type": "Struct",
//!     "fields": [
//!         { "name": "len", "type": "Int", "bytes": 1 },
//!         { "name": "data", "type": "Bytes", "length": "len" }
//!     ]
//! }"#).unwrap();
//!
//! let value = layout.parse_bytes(&[2, 0xab, 0xcd]).unwrap();
//! assert_eq!(
//!     value.as_container().unwrap().get("data"),
//!     Some(&Value::Bytes(vec![0xab, 0xcd]))
//! );
//! ```
//!
//! Parsed [Value]s serialize back to JSON with `serde_json`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    aggregate::{FocusedSeq, Sequence, Struct},
    bits::BitOrder,
    bitwise::Bitwise,
    codec::Endian,
    conditional::{IfThenElse, Optional, Select, Switch},
    construct::ConstructRef,
    errors::CompileError,
    expr::{BinaryOp, Expr, UnaryOp, index, item, items, this},
    framing::{BitsSwapped, ByteSwapped, NullTerminated, Prefixed},
    padding::{Aligned, PadUnit, Padded, Padding},
    position::{Peek, Pointer, Seek, Tell},
    primitives::{
        BitsInt, Bytes, Check, Computed, Const, Defaulted, Flag, Float, GreedyBytes, Int, Pass,
        Rebuild, Terminated,
    },
    repeat::{Array, GreedyRange, PrefixedArray, RepeatUntil, StopIf, Terminator},
    stream::Whence,
    transform::{
        Adapted, Encoding, EnumMap, FlagsEnum, Linear, Text, c_string, padded_string, pascal_string,
    },
    value::{Container, Value},
};

fn one() -> f64 {
    1.0
}

/// Expression written in JSON.
///
/// Numbers and booleans are constants. Strings are field paths such as
/// `"len"`, `"header.size"` or `"_.tag"`; an optional `this.` prefix is
/// accepted. `"@index"`, `"@item"` and `"@items"` refer to the repeater
/// state. Objects apply an operator: `{"op": "Len", "arg": "data"}` or
/// `{"op": "Sub", "lhs": "total", "rhs": 4}`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ExprDef {
    Int(i64),
    Float(f64),
    Bool(bool),
    Path(String),
    Unary {
        op: UnaryOp,
        arg: Box<ExprDef>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<ExprDef>,
        rhs: Box<ExprDef>,
    },
}

impl ExprDef {
    pub fn compile(&self) -> Result<Expr, CompileError> {
        Ok(match self {
            ExprDef::Int(v) => Expr::from(*v),
            ExprDef::Float(v) => Expr::from(*v),
            ExprDef::Bool(v) => Expr::from(*v),
            ExprDef::Path(path) => compile_path(path)?,
            ExprDef::Unary { op, arg } => Expr::Unary(*op, Box::new(arg.compile()?)),
            ExprDef::Binary { op, lhs, rhs } => {
                Expr::Binary(*op, Box::new(lhs.compile()?), Box::new(rhs.compile()?))
            }
        })
    }
}

fn compile_path(path: &str) -> Result<Expr, CompileError> {
    match path {
        "@index" => return Ok(index()),
        "@item" => return Ok(item()),
        "@items" => return Ok(items()),
        "this" => return Ok(this("")),
        _ => {}
    }

    let stripped = path.strip_prefix("this.").unwrap_or(path);
    if stripped.is_empty() || stripped.starts_with('@') || stripped.split('.').any(str::is_empty) {
        return Err(CompileError::InvalidExpression(path.to_string()));
    }
    Ok(this(stripped))
}

/// Converts a JSON literal into a [Value]. Integers stay integers.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(|v| Value::Int(v.into()))
            .or_else(|| n.as_u64().map(|v| Value::Int(v.into())))
            .unwrap_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN))),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(fields) => Value::Container(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect::<Container>(),
        ),
    }
}

/// Named member of a `Struct`; a missing name makes the member anonymous.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FieldDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub layout: LayoutDef,
}

/// One arm of a `Switch`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaseDef {
    /// Value the switch key must equal. Named `when` so that a `Switch`
    /// arm can itself be a `Switch` with its own `key`.
    pub when: serde_json::Value,
    #[serde(flatten)]
    pub layout: LayoutDef,
}

/// Value mapping attached to an `Adapted` layout.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
pub enum TransformDef {
    /// `raw * scale + offset`.
    Linear {
        #[serde(default = "one")]
        scale: f64,
        #[serde(default)]
        offset: f64,
        #[serde(default)]
        keep_float: bool,
    },
    /// Integer codes to labels. Codes are written as JSON object keys, so
    /// they arrive as strings and are parsed when compiling.
    Enum { labels: HashMap<String, String> },
    /// Named bit masks, in the order decoded containers list them.
    Flags { flags: IndexMap<String, i64> },
    /// Bytes to string.
    Text {
        #[serde(default)]
        encoding: Encoding,
        #[serde(default)]
        zero_terminated: bool,
        #[serde(default)]
        trim: bool,
        #[serde(default)]
        width: Option<usize>,
    },
}

/// Description of one construct.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
pub enum LayoutDef {
    /// Byte-aligned integer of 1 to 16 bytes.
    Int {
        bytes: usize,
        #[serde(default)]
        signed: bool,
        #[serde(default)]
        endian: Endian,
    },
    /// Bit field of 1 to 64 bits; only valid inside `Bitwise`.
    Bits {
        bits: usize,
        #[serde(default)]
        signed: bool,
    },
    /// 32 or 64 bit float.
    Float {
        bits: usize,
        #[serde(default)]
        endian: Endian,
    },
    /// Boolean stored in one bit, or in a whole byte when `byte` is set.
    Flag {
        #[serde(default)]
        byte: bool,
    },
    Bytes {
        length: ExprDef,
    },
    GreedyBytes,
    /// Inner layout that must hold a fixed value.
    Const {
        inner: Box<LayoutDef>,
        value: serde_json::Value,
    },
    /// Fixed byte signature.
    Signature {
        bytes: Vec<u8>,
    },
    Computed {
        expr: ExprDef,
    },
    Rebuild {
        inner: Box<LayoutDef>,
        expr: ExprDef,
    },
    Check {
        expr: ExprDef,
    },
    /// Inner layout built from `value` when the input leaves it out.
    Defaulted {
        inner: Box<LayoutDef>,
        value: ExprDef,
    },
    Pass,
    Terminated,
    Tell,
    Struct {
        fields: Vec<FieldDef>,
    },
    Sequence {
        items: Vec<LayoutDef>,
    },
    /// Struct whose value is the single field named by `focus`.
    FocusedSeq {
        focus: String,
        fields: Vec<FieldDef>,
    },
    StopIf {
        condition: ExprDef,
    },
    Array {
        count: ExprDef,
        element: Box<LayoutDef>,
    },
    GreedyRange {
        element: Box<LayoutDef>,
    },
    RepeatUntil {
        until: ExprDef,
        element: Box<LayoutDef>,
        #[serde(default)]
        terminator: Terminator,
    },
    PrefixedArray {
        count: Box<LayoutDef>,
        element: Box<LayoutDef>,
    },
    Switch {
        key: ExprDef,
        cases: Vec<CaseDef>,
        #[serde(default)]
        default: Option<Box<LayoutDef>>,
    },
    IfThenElse {
        condition: ExprDef,
        then: Box<LayoutDef>,
        #[serde(default)]
        otherwise: Option<Box<LayoutDef>>,
    },
    Optional {
        inner: Box<LayoutDef>,
    },
    /// First alternative that parses or builds.
    Select {
        alternatives: Vec<LayoutDef>,
    },
    Pointer {
        offset: ExprDef,
        #[serde(default)]
        relative: bool,
        inner: Box<LayoutDef>,
    },
    Seek {
        offset: ExprDef,
        #[serde(default)]
        whence: Whence,
    },
    Peek {
        inner: Box<LayoutDef>,
    },
    Bitwise {
        inner: Box<LayoutDef>,
        #[serde(default)]
        bit_order: BitOrder,
    },
    Padding {
        length: ExprDef,
        #[serde(default)]
        unit: PadUnit,
        #[serde(default)]
        pattern: u8,
        #[serde(default)]
        strict: bool,
    },
    Aligned {
        modulus: usize,
        inner: Box<LayoutDef>,
        #[serde(default)]
        pattern: u8,
    },
    Padded {
        length: ExprDef,
        inner: Box<LayoutDef>,
        #[serde(default)]
        pattern: u8,
    },
    Prefixed {
        length: Box<LayoutDef>,
        inner: Box<LayoutDef>,
    },
    NullTerminated {
        inner: Box<LayoutDef>,
        #[serde(default)]
        terminator: u8,
    },
    ByteSwapped {
        inner: Box<LayoutDef>,
    },
    BitsSwapped {
        inner: Box<LayoutDef>,
    },
    Adapted {
        inner: Box<LayoutDef>,
        transform: TransformDef,
    },
    /// Zero-terminated string.
    CString {
        #[serde(default)]
        encoding: Encoding,
    },
    /// String in a fixed number of zero-filled bytes.
    PaddedString {
        width: usize,
        #[serde(default)]
        encoding: Encoding,
    },
    /// String preceded by its byte length.
    PascalString {
        length: Box<LayoutDef>,
        #[serde(default)]
        encoding: Encoding,
    },
}

fn arc<C: crate::construct::Construct + 'static>(construct: C) -> ConstructRef {
    Arc::new(construct)
}

fn invalid(msg: String) -> CompileError {
    CompileError::InvalidParameter(msg)
}

fn compile_struct(fields: &[FieldDef]) -> Result<Struct, CompileError> {
    let mut seen = HashSet::new();
    let mut compiled = Struct::new();

    for field in fields {
        let construct = field.layout.compile()?;
        compiled = match &field.name {
            Some(name) => {
                if name.is_empty() || !seen.insert(name.as_str()) {
                    return Err(CompileError::InvalidFieldName(name.clone()));
                }
                compiled.field(name.as_str(), construct)
            }
            None => compiled.anon(construct),
        };
    }

    Ok(compiled)
}

fn compile_transform(inner: ConstructRef, def: &TransformDef) -> Result<ConstructRef, CompileError> {
    Ok(match def {
        TransformDef::Linear {
            scale,
            offset,
            keep_float,
        } => {
            let mut linear = Linear::new(*scale, *offset).map_err(|err| invalid(err.to_string()))?;
            if *keep_float {
                linear = linear.keep_float();
            }
            arc(Adapted::new(inner, linear))
        }
        TransformDef::Enum { labels } => {
            let mut map = EnumMap::new();
            for (raw, label) in labels {
                let raw: i128 = raw
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("enum code `{raw}` is not an integer")))?;
                map = map.label(raw, label.as_str());
            }
            arc(Adapted::new(inner, map))
        }
        TransformDef::Flags { flags } => {
            let set = flags
                .iter()
                .fold(FlagsEnum::new(), |set, (name, bits)| set.flag(name.as_str(), (*bits).into()));
            arc(Adapted::new(inner, set))
        }
        TransformDef::Text {
            encoding,
            zero_terminated,
            trim,
            width,
        } => {
            let mut text = Text::new(*encoding);
            if *zero_terminated {
                text = text.zero_terminated();
            }
            if *trim {
                text = text.trim();
            }
            if let Some(width) = width {
                text = text.width(*width);
            }
            arc(Adapted::new(inner, text))
        }
    })
}

impl LayoutDef {
    /// Builds the construct tree this definition describes.
    ///
    /// Fails on empty or duplicate field names, unreadable paths and
    /// out-of-range widths.
    pub fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(match self {
            LayoutDef::Int {
                bytes,
                signed,
                endian,
            } => {
                if !(1..=16).contains(bytes) {
                    return Err(invalid(format!("integer width of {bytes} bytes")));
                }
                arc(Int::new(*bytes, *signed, *endian))
            }
            LayoutDef::Bits { bits, signed } => {
                if !(1..=64).contains(bits) {
                    return Err(invalid(format!("bit field width of {bits} bits")));
                }
                arc(BitsInt::new(*bits, *signed))
            }
            LayoutDef::Float { bits, endian } => {
                if *bits != 32 && *bits != 64 {
                    return Err(invalid(format!("float width of {bits} bits")));
                }
                arc(Float::new(*bits, *endian))
            }
            LayoutDef::Flag { byte } => arc(if *byte { Flag::byte() } else { Flag::bit() }),
            LayoutDef::Bytes { length } => arc(Bytes::new(length.compile()?)),
            LayoutDef::GreedyBytes => arc(GreedyBytes),
            LayoutDef::Const { inner, value } => arc(Const::new(inner.compile()?, json_to_value(value))),
            LayoutDef::Signature { bytes } => arc(Const::bytes(bytes)),
            LayoutDef::Computed { expr } => arc(Computed::new(expr.compile()?)),
            LayoutDef::Rebuild { inner, expr } => arc(Rebuild::new(inner.compile()?, expr.compile()?)),
            LayoutDef::Check { expr } => arc(Check::new(expr.compile()?)),
            LayoutDef::Defaulted { inner, value } => arc(Defaulted::new(inner.compile()?, value.compile()?)),
            LayoutDef::Pass => arc(Pass),
            LayoutDef::Terminated => arc(Terminated),
            LayoutDef::Tell => arc(Tell),
            LayoutDef::Struct { fields } => arc(compile_struct(fields)?),
            LayoutDef::Sequence { items } => arc(
                items
                    .iter()
                    .try_fold(Sequence::new(), |seq, item| Ok::<_, CompileError>(seq.then(item.compile()?)))?,
            ),
            LayoutDef::FocusedSeq { focus, fields } => {
                if !fields.iter().any(|f| f.name.as_deref() == Some(focus.as_str())) {
                    return Err(CompileError::InvalidFieldName(focus.clone()));
                }
                arc(FocusedSeq::from_struct(focus.as_str(), compile_struct(fields)?))
            }
            LayoutDef::StopIf { condition } => arc(StopIf::new(condition.compile()?)),
            LayoutDef::Array { count, element } => arc(Array::new(count.compile()?, element.compile()?)),
            LayoutDef::GreedyRange { element } => arc(GreedyRange::new(element.compile()?)),
            LayoutDef::RepeatUntil {
                until,
                element,
                terminator,
            } => arc(RepeatUntil::new(until.compile()?, element.compile()?).terminator(*terminator)),
            LayoutDef::PrefixedArray { count, element } => {
                arc(PrefixedArray::new(count.compile()?, element.compile()?))
            }
            LayoutDef::Switch { key, cases, default } => {
                let mut switch = Switch::new(key.compile()?);
                for case in cases {
                    switch = switch.case(json_to_value(&case.when), case.layout.compile()?);
                }
                if let Some(default) = default {
                    switch = switch.default(default.compile()?);
                }
                arc(switch)
            }
            LayoutDef::IfThenElse {
                condition,
                then,
                otherwise,
            } => {
                let otherwise = match otherwise {
                    Some(layout) => layout.compile()?,
                    None => arc(Pass),
                };
                arc(IfThenElse::new(condition.compile()?, then.compile()?, otherwise))
            }
            LayoutDef::Optional { inner } => arc(Optional::new(inner.compile()?)),
            LayoutDef::Select { alternatives } => arc(
                alternatives
                    .iter()
                    .try_fold(Select::new(), |select, alt| Ok::<_, CompileError>(select.or(alt.compile()?)))?,
            ),
            LayoutDef::Pointer {
                offset,
                relative,
                inner,
            } => {
                if *relative {
                    arc(Pointer::relative(offset.compile()?, inner.compile()?))
                } else {
                    arc(Pointer::absolute(offset.compile()?, inner.compile()?))
                }
            }
            LayoutDef::Seek { offset, whence } => arc(Seek::new(offset.compile()?, *whence)),
            LayoutDef::Peek { inner } => arc(Peek::new(inner.compile()?)),
            LayoutDef::Bitwise { inner, bit_order } => arc(Bitwise::with_order(inner.compile()?, *bit_order)),
            LayoutDef::Padding {
                length,
                unit,
                pattern,
                strict,
            } => {
                let length = length.compile()?;
                let mut padding = match unit {
                    PadUnit::Bytes => Padding::bytes(length),
                    PadUnit::Bits => Padding::bits(length),
                }
                .pattern(*pattern);
                if *strict {
                    padding = padding.strict();
                }
                arc(padding)
            }
            LayoutDef::Aligned {
                modulus,
                inner,
                pattern,
            } => {
                if *modulus == 0 {
                    return Err(invalid("alignment modulus of 0".into()));
                }
                arc(Aligned::new(*modulus, inner.compile()?).pattern(*pattern))
            }
            LayoutDef::Padded {
                length,
                inner,
                pattern,
            } => arc(Padded::new(length.compile()?, inner.compile()?).pattern(*pattern)),
            LayoutDef::Prefixed { length, inner } => arc(Prefixed::new(length.compile()?, inner.compile()?)),
            LayoutDef::NullTerminated { inner, terminator } => {
                arc(NullTerminated::new(inner.compile()?).terminator(*terminator))
            }
            LayoutDef::ByteSwapped { inner } => arc(ByteSwapped::new(inner.compile()?)),
            LayoutDef::BitsSwapped { inner } => arc(BitsSwapped::new(inner.compile()?)),
            LayoutDef::Adapted { inner, transform } => compile_transform(inner.compile()?, transform)?,
            LayoutDef::CString { encoding } => arc(c_string(*encoding)),
            LayoutDef::PaddedString { width, encoding } => arc(padded_string(*width, *encoding)),
            LayoutDef::PascalString { length, encoding } => arc(pascal_string(length.compile()?, *encoding)),
        })
    }
}

/// Reads a [LayoutDef] from JSON text and compiles it.
pub fn compile_json(json: &str) -> Result<ConstructRef, CompileError> {
    let def: LayoutDef = serde_json::from_str(json).map_err(|err| CompileError::Json(err.to_string()))?;
    def.compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::Construct;

    #[test]
    fn test_compile_struct_with_switch() {
        let layout = compile_json(
            r#"{
                "type": "Struct",
                "fields": [
                    { "name": "tag", "type": "Int", "bytes": 1 },
                    { "name": "body", "type": "Switch", "key": "tag", "cases": [
                        { "when": 1, "type": "Int", "bytes": 1 },
                        { "when": 2, "type": "Int", "bytes": 2, "endian": "Big" }
                    ] }
                ]
            }"#,
        )
        .unwrap();

        let value = layout.parse_bytes(&[2, 0, 1]).unwrap();
        assert_eq!(value.as_container().unwrap().get("body"), Some(&Value::Int(1)));
        assert_eq!(layout.build_bytes(&value).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn test_switch_as_case_arm() {
        let layout = compile_json(
            r#"{
                "type": "Struct",
                "fields": [
                    { "name": "tag", "type": "Int", "bytes": 1 },
                    { "name": "sub", "type": "Int", "bytes": 1 },
                    { "name": "body", "type": "Switch", "key": "tag", "cases": [
                        { "when": 1, "type": "Switch", "key": "sub",
                          "cases": [ { "when": 0, "type": "Int", "bytes": 1 } ],
                          "default": { "type": "Int", "bytes": 2, "endian": "Big" } }
                    ], "default": { "type": "Pass" } }
                ]
            }"#,
        )
        .unwrap();

        let value = layout.parse_bytes(&[1, 0, 7]).unwrap();
        assert_eq!(value.as_container().unwrap().get("body"), Some(&Value::Int(7)));
        let value = layout.parse_bytes(&[1, 5, 0, 9]).unwrap();
        assert_eq!(value.as_container().unwrap().get("body"), Some(&Value::Int(9)));
        assert_eq!(layout.build_bytes(&value).unwrap(), vec![1, 5, 0, 9]);
    }

    #[test]
    fn test_compile_supplementary_constructs() {
        let layout = compile_json(
            r#"{
                "type": "Struct",
                "fields": [
                    { "name": "mode", "type": "Adapted", "inner": { "type": "Int", "bytes": 1 },
                      "transform": { "type": "Flags", "flags": { "on": 1, "fast": 2 } } },
                    { "name": "ver", "type": "Defaulted", "inner": { "type": "Int", "bytes": 1 }, "value": 3 },
                    { "type": "StopIf", "condition": { "op": "Eq", "lhs": "ver", "rhs": 0 } },
                    { "name": "id", "type": "ByteSwapped",
                      "inner": { "type": "Int", "bytes": 2, "endian": "Big" } },
                    { "name": "body", "type": "Select", "alternatives": [
                        { "type": "FocusedSeq", "focus": "v", "fields": [
                            { "type": "Signature", "bytes": [255] },
                            { "name": "v", "type": "Int", "bytes": 1 } ] },
                        { "type": "Int", "bytes": 1 } ] }
                ]
            }"#,
        )
        .unwrap();

        let value = layout.parse_bytes(&[3, 1, 0x34, 0x12, 0xff, 7]).unwrap();
        let fields = value.as_container().unwrap();
        assert_eq!(
            fields.get("mode"),
            Some(&Value::Container(Container::from([("on", true), ("fast", true)])))
        );
        assert_eq!(fields.get("id"), Some(&Value::Int(0x1234)));
        assert_eq!(fields.get("body"), Some(&Value::Int(7)));

        let stopped = layout.parse_bytes(&[0, 0]).unwrap();
        assert_eq!(stopped.as_container().unwrap().len(), 2);

        let input = Value::Container(Container::from([
            ("mode", Value::from("on")),
            ("id", Value::Int(0x0102)),
            ("body", Value::Int(9)),
        ]));
        assert_eq!(layout.build_bytes(&input).unwrap(), vec![1, 3, 2, 1, 0xff, 9]);

        let bad_focus = r#"{ "type": "FocusedSeq", "focus": "x", "fields": [] }"#;
        assert!(matches!(compile_json(bad_focus), Err(CompileError::InvalidFieldName(_))));
    }

    #[test]
    fn test_compile_expressions() {
        let layout = compile_json(
            r#"{
                "type": "Struct",
                "fields": [
                    { "name": "total", "type": "Int", "bytes": 1 },
                    { "name": "body", "type": "Bytes",
                      "length": { "op": "Sub", "lhs": "this.total", "rhs": 1 } },
                    { "name": "n", "type": "Computed", "expr": { "op": "Len", "arg": "body" } }
                ]
            }"#,
        )
        .unwrap();

        let value = layout.parse_bytes(&[3, 7, 8]).unwrap();
        let fields = value.as_container().unwrap();
        assert_eq!(fields.get("body"), Some(&Value::Bytes(vec![7, 8])));
        assert_eq!(fields.get("n"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_compile_bitwise_and_transform() {
        let layout = compile_json(
            r#"{
                "type": "Bitwise",
                "inner": { "type": "Struct", "fields": [
                    { "name": "flag", "type": "Flag" },
                    { "type": "Padding", "length": 3, "unit": "Bits" },
                    { "name": "level", "type": "Adapted",
                      "inner": { "type": "Bits", "bits": 4 },
                      "transform": { "type": "Enum", "labels": { "5": "high" } } }
                ] }
            }"#,
        )
        .unwrap();

        let value = layout.parse_bytes(&[0b1000_0101]).unwrap();
        let fields = value.as_container().unwrap();
        assert_eq!(fields.get("flag"), Some(&Value::Bool(true)));
        assert_eq!(fields.get("level"), Some(&Value::String("high".into())));
        assert_eq!(layout.size().unwrap(), 1);
    }

    #[test]
    fn test_repeat_until_from_json() {
        let layout = compile_json(
            r#"{ "type": "RepeatUntil", "until": { "op": "Eq", "lhs": "@item", "rhs": 0 },
                 "element": { "type": "Int", "bytes": 1 } }"#,
        )
        .unwrap();
        assert_eq!(
            layout.parse_bytes(&[4, 0, 9]).unwrap(),
            Value::List(vec![Value::Int(4), Value::Int(0)])
        );
    }

    #[test]
    fn test_invalid_definitions() {
        let duplicate = r#"{ "type": "Struct", "fields": [
            { "name": "a", "type": "Int", "bytes": 1 },
            { "name": "a", "type": "Int", "bytes": 1 } ] }"#;
        assert_eq!(
            compile_json(duplicate).unwrap_err(),
            CompileError::InvalidFieldName("a".into())
        );

        let empty = r#"{ "type": "Struct", "fields": [ { "name": "", "type": "Pass" } ] }"#;
        assert!(matches!(compile_json(empty), Err(CompileError::InvalidFieldName(_))));

        let width = r#"{ "type": "Int", "bytes": 0 }"#;
        assert!(matches!(compile_json(width), Err(CompileError::InvalidParameter(_))));

        let path = r#"{ "type": "Bytes", "length": "a..b" }"#;
        assert!(matches!(compile_json(path), Err(CompileError::InvalidExpression(_))));

        let scale = r#"{ "type": "Adapted", "inner": { "type": "Int", "bytes": 1 },
                         "transform": { "type": "Linear", "scale": 0.0 } }"#;
        assert!(matches!(compile_json(scale), Err(CompileError::InvalidParameter(_))));

        assert!(matches!(compile_json(r#"{ "type": "Nope" }"#), Err(CompileError::Json(_))));
    }

    #[test]
    fn test_value_to_json() {
        let layout = compile_json(
            r#"{ "type": "Struct", "fields": [
                { "name": "id", "type": "Int", "bytes": 2, "endian": "Little" },
                { "name": "name", "type": "CString" } ] }"#,
        )
        .unwrap();
        let value = layout.parse_bytes(b"\x01\x00hi\x00").unwrap();
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"id":1,"name":"hi"}"#
        );
    }

    #[test]
    fn test_json_literals() {
        let json: serde_json::Value = serde_json::from_str(r#"[1, -2, 1.5, "x", null, {"k": true}]"#).unwrap();
        let value = json_to_value(&json);
        let items = value.as_list().unwrap();
        assert_eq!(items[0], Value::Int(1));
        assert_eq!(items[1], Value::Int(-2));
        assert_eq!(items[2], Value::Float(1.5));
        assert_eq!(items[4], Value::None);
        assert_eq!(
            items[5].as_container().unwrap().get("k"),
            Some(&Value::Bool(true))
        );
    }
}
