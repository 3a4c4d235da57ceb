//! # bytecraft
//!
//! A library for describing binary formats declaratively and then parsing,
//! building and sizing data with the same description.
//!
//! A layout is a tree of constructs: integers and floats of any width and
//! byte order, bit fields inside bit-scoped regions, structs whose fields may
//! depend on earlier fields through expressions, repeaters, conditionals,
//! pointers, padding and value adapters. Parsing yields a dynamic [Value]
//! tree; building takes one back and produces bytes.
//!
//! ## Example
//!
//! ```
//! use bytecraft::aggregate::Struct;
//! use bytecraft::construct::Construct;
//! use bytecraft::expr::this;
//! use bytecraft::primitives::{u8, u16be, Bytes};
//! use bytecraft::value::Value;
//!
//! let packet = Struct::new()
//!     .field("id", u16be())
//!     .field("len", u8())
//!     .field("payload", Bytes::new(this("len")));
//!
//! let parsed = packet.parse_bytes(&[0x00, 0x2a, 0x02, 0xca, 0xfe]).unwrap();
//! let fields = parsed.as_container().unwrap();
//! assert_eq!(fields.get("id"), Some(&Value::Int(42)));
//! assert_eq!(fields.get("payload"), Some(&Value::Bytes(vec![0xca, 0xfe])));
//!
//! assert_eq!(packet.build_bytes(&parsed).unwrap(), vec![0x00, 0x2a, 0x02, 0xca, 0xfe]);
//! ```
//!
//! [Value]: value::Value

pub mod aggregate;
pub mod bits;
pub mod bitstream;
pub mod bitwise;
pub mod codec;
pub mod conditional;
pub mod construct;
pub mod context;
pub mod errors;
pub mod expr;
pub mod framing;
pub mod padding;
pub mod position;
pub mod prelude;
pub mod primitives;
pub mod repeat;
#[cfg(feature = "serde")]
pub mod serde;
pub mod stream;
pub mod transform;
pub mod value;
