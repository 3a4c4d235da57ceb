//! Glob-importable set of the types and shortcuts most layouts need.
//!
//! ```
//! use bytecraft::prelude::*;
//!
//! let header = Struct::new()
//!     .field("kind", u8())
//!     .field("body", Switch::new(this("kind")).case(1, u16be()).default(Pass));
//! assert_eq!(header.parse_bytes(&[1, 0, 9]).unwrap().as_container().unwrap().get("body"), Some(&Value::Int(9)));
//! ```

pub use crate::{
    aggregate::{FocusedSeq, Sequence, Struct},
    bits::BitOrder,
    bitwise::{Bitwise, bit_struct},
    codec::Endian,
    conditional::{IfThenElse, Optional, Select, Switch, if_then},
    construct::{Construct, ConstructRef, IntoConstruct},
    context::Context,
    errors::{Error, Result},
    expr::{Expr, index, item, items, len_of, this},
    framing::{BitsSwapped, ByteSwapped, NullTerminated, Prefixed},
    padding::{Aligned, PadUnit, Padded, Padding},
    position::{Peek, Pointer, Seek, Tell},
    primitives::*,
    repeat::{Array, GreedyRange, PrefixedArray, RepeatUntil, StopIf, Terminator},
    stream::{IoStream, MemoryStream, Stream, Whence},
    transform::{
        Adapted, Encoding, EnumMap, FlagsEnum, FnTransform, Linear, Text, Transform, c_string,
        padded_string, pascal_string,
    },
    value::{Container, Value},
};
