//! Core data types for the configuration builder
//!
//! This module contains the primitive type system shared by the hierarchical store,
//! the type registry and the builder stages.
//!
//! # Main Types
//!
//! - [`TypeDescriptor`] - A primitive element type (`uint8`, `int3`, `float32`, ...)
//! - [`Scalar`] / [`Value`] - A leaf value: scalar, vector or matrix
//! - [`ParsedScalar`] - A value element parsed against a resolved type
//!
//! # Bit fields
//!
//! Integer types may have any width from 1 to 64 bits (`uint3`, `int12`). Each element
//! still occupies whole bytes: [`TypeDescriptor::byte_size`] rounds the bit width up.
//!
//! # Defaults
//!
//! [`parse_default`] turns a stored default (typed values or brace-list text such as
//! `"{1 2 3}"`) into a canonical list of elements so that defaults coming from different
//! references can be compared after the signal type is known.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Family of a primitive type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    /// Unsigned integer of any width up to 64 bits
    Unsigned,
    /// Two's complement signed integer of any width up to 64 bits
    Signed,
    /// IEEE-754 floating point (32 or 64 bits)
    Float,
    /// 8-bit character
    Char,
    /// Boolean stored in one byte
    Bool,
}

/// A primitive element type with its bit width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub bits: u16,
}

impl TypeDescriptor {
    pub const UINT8: TypeDescriptor = TypeDescriptor::new(TypeKind::Unsigned, 8);
    pub const UINT16: TypeDescriptor = TypeDescriptor::new(TypeKind::Unsigned, 16);
    pub const UINT32: TypeDescriptor = TypeDescriptor::new(TypeKind::Unsigned, 32);
    pub const UINT64: TypeDescriptor = TypeDescriptor::new(TypeKind::Unsigned, 64);
    pub const INT8: TypeDescriptor = TypeDescriptor::new(TypeKind::Signed, 8);
    pub const INT16: TypeDescriptor = TypeDescriptor::new(TypeKind::Signed, 16);
    pub const INT32: TypeDescriptor = TypeDescriptor::new(TypeKind::Signed, 32);
    pub const INT64: TypeDescriptor = TypeDescriptor::new(TypeKind::Signed, 64);
    pub const FLOAT32: TypeDescriptor = TypeDescriptor::new(TypeKind::Float, 32);
    pub const FLOAT64: TypeDescriptor = TypeDescriptor::new(TypeKind::Float, 64);
    pub const CHAR8: TypeDescriptor = TypeDescriptor::new(TypeKind::Char, 8);
    pub const BOOL: TypeDescriptor = TypeDescriptor::new(TypeKind::Bool, 8);

    pub const fn new(kind: TypeKind, bits: u16) -> Self {
        Self { kind, bits }
    }

    /// Parse a primitive type name. Returns `None` for anything that is not primitive
    /// (structured type names are resolved by the type registry).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "float32" => return Some(Self::FLOAT32),
            "float64" => return Some(Self::FLOAT64),
            "char8" => return Some(Self::CHAR8),
            "bool" => return Some(Self::BOOL),
            _ => {}
        }

        let (kind, digits) = if let Some(digits) = name.strip_prefix("uint") {
            (TypeKind::Unsigned, digits)
        } else if let Some(digits) = name.strip_prefix("int") {
            (TypeKind::Signed, digits)
        } else {
            return None;
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let bits: u16 = digits.parse().ok()?;
        if (1..=64).contains(&bits) {
            Some(Self::new(kind, bits))
        } else {
            None
        }
    }

    /// Canonical type name (`uint32`, `int3`, `float64`, ...)
    pub fn name(&self) -> String {
        match self.kind {
            TypeKind::Unsigned => format!("uint{}", self.bits),
            TypeKind::Signed => format!("int{}", self.bits),
            TypeKind::Float => format!("float{}", self.bits),
            TypeKind::Char => format!("char{}", self.bits),
            TypeKind::Bool => "bool".to_string(),
        }
    }

    /// Size of one element in bytes, rounding bit fields up to whole bytes
    pub fn byte_size(&self) -> u32 {
        u32::from(self.bits).div_ceil(8)
    }

    /// True for integer types whose width is not a whole number of bytes
    pub fn is_bit_field(&self) -> bool {
        self.bits % 8 != 0
    }

    fn integer_bounds(&self) -> (i128, i128) {
        let bits = u32::from(self.bits);
        match self.kind {
            TypeKind::Signed => (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1),
            TypeKind::Bool => (0, 1),
            _ => (0, (1i128 << bits) - 1),
        }
    }

    /// Parse a single scalar against this type. Returns `None` when the scalar cannot
    /// represent a value of this type (wrong family, out of range, bad text).
    pub fn parse_scalar(&self, scalar: &Scalar) -> Option<ParsedScalar> {
        match self.kind {
            TypeKind::Float => {
                let value = match scalar {
                    Scalar::Int(i) => *i as f64,
                    Scalar::UInt(u) => *u as f64,
                    Scalar::Float(f) => *f,
                    Scalar::Text(text) => text.trim().parse::<f64>().ok()?,
                    Scalar::Bool(_) => return None,
                };
                if self.bits == 32 {
                    Some(ParsedScalar::Float(f64::from(value as f32)))
                } else {
                    Some(ParsedScalar::Float(value))
                }
            }
            TypeKind::Char => match scalar {
                Scalar::Text(text) => {
                    let mut chars = text.chars();
                    let first = chars.next()?;
                    if chars.next().is_some() || !first.is_ascii() {
                        return None;
                    }
                    Some(ParsedScalar::Char(first as u8))
                }
                Scalar::Int(i) => u8::try_from(*i).ok().map(ParsedScalar::Char),
                Scalar::UInt(u) => u8::try_from(*u).ok().map(ParsedScalar::Char),
                _ => None,
            },
            TypeKind::Unsigned | TypeKind::Signed | TypeKind::Bool => {
                let value: i128 = match scalar {
                    Scalar::Int(i) => i128::from(*i),
                    Scalar::UInt(u) => i128::from(*u),
                    Scalar::Bool(b) => i128::from(*b),
                    Scalar::Float(f) => {
                        if f.fract() != 0.0 || !f.is_finite() {
                            return None;
                        }
                        *f as i128
                    }
                    Scalar::Text(text) => parse_integer_text(text.trim())?,
                };
                let (min, max) = self.integer_bounds();
                if value < min || value > max {
                    return None;
                }
                Some(ParsedScalar::Int(value))
            }
        }
    }
}

fn parse_integer_text(text: &str) -> Option<i128> {
    match text {
        "true" => return Some(1),
        "false" => return Some(0),
        _ => {}
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i128::from_str_radix(hex, 16).ok();
    }
    text.parse::<i128>().ok()
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A single leaf element as stored in the hierarchical store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Interpret as an unsigned 32-bit integer (numbers or numeric text)
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Scalar::Int(i) => u32::try_from(*i).ok(),
            Scalar::UInt(u) => u32::try_from(*u).ok(),
            Scalar::Float(f) if f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u32::MAX) => {
                Some(*f as u32)
            }
            Scalar::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret as a 64-bit integer (numbers or numeric text)
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Scalar::Int(i) => u64::try_from(*i).ok(),
            Scalar::UInt(u) => Some(*u),
            Scalar::Text(text) => {
                let text = text.trim();
                match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    Some(hex) => u64::from_str_radix(hex, 16).ok(),
                    None => text.parse().ok(),
                }
            }
            _ => None,
        }
    }

    /// Interpret as a float (numbers or numeric text)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::UInt(u) => Some(*u as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Text(text) => text.trim().parse().ok(),
            Scalar::Bool(_) => None,
        }
    }

    /// Interpret as a boolean (`true`/`false`, `1`/`0`)
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Int(0) | Scalar::UInt(0) => Some(false),
            Scalar::Int(1) | Scalar::UInt(1) => Some(true),
            Scalar::Text(text) => match text.trim() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::UInt(u) => write!(f, "{}", u),
            Scalar::Float(v) => write!(f, "{:?}", v),
            Scalar::Text(text) => write!(f, "\"{}\"", text),
        }
    }
}

/// A typed leaf value: scalar, vector or matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(Scalar),
    Vector(Vec<Scalar>),
    Matrix(Vec<Vec<Scalar>>),
}

impl Value {
    /// 0 for scalars, 1 for vectors, 2 for matrices
    pub fn number_of_dimensions(&self) -> u8 {
        match self {
            Value::Scalar(_) => 0,
            Value::Vector(_) => 1,
            Value::Matrix(_) => 2,
        }
    }

    /// Total number of elements
    pub fn number_of_elements(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Vector(items) => items.len(),
            Value::Matrix(rows) => rows.iter().map(Vec::len).sum(),
        }
    }

    /// All elements in row-major order
    pub fn elements(&self) -> Vec<&Scalar> {
        match self {
            Value::Scalar(s) => vec![s],
            Value::Vector(items) => items.iter().collect(),
            Value::Matrix(rows) => rows.iter().flatten().collect(),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::Vector(items) if items.len() == 1 => items.first(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_text)
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_scalar().and_then(Scalar::as_u32)
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_scalar().and_then(Scalar::as_u64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().and_then(Scalar::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_scalar().and_then(Scalar::as_bool)
    }

    /// A list of names: either a vector of text or a single text scalar
    pub fn as_text_list(&self) -> Option<Vec<&str>> {
        match self {
            Value::Scalar(Scalar::Text(text)) => Some(vec![text.as_str()]),
            Value::Vector(items) => items.iter().map(Scalar::as_text).collect(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Vector(items) => {
                f.write_str("{")?;
                for item in items {
                    write!(f, " {}", item)?;
                }
                f.write_str(" }")
            }
            Value::Matrix(rows) => {
                f.write_str("{")?;
                for row in rows {
                    f.write_str(" {")?;
                    for item in row {
                        write!(f, " {}", item)?;
                    }
                    f.write_str(" }")?;
                }
                f.write_str(" }")
            }
        }
    }
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        Value::Scalar(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Scalar(Scalar::Text(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Scalar(Scalar::Text(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Scalar(Scalar::Int(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Scalar(Scalar::UInt(u64::from(value)))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Scalar(Scalar::UInt(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Scalar(Scalar::Float(value))
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::Vector(value.into_iter().map(Scalar::Text).collect())
    }
}

impl From<Vec<&str>> for Value {
    fn from(value: Vec<&str>) -> Self {
        Value::Vector(
            value
                .into_iter()
                .map(|s| Scalar::Text(s.to_string()))
                .collect(),
        )
    }
}

/// One element of a default value after parsing against the resolved type
///
/// Floats compare by bit pattern with every NaN treated as the same value, so
/// a default always equals itself.
#[derive(Debug, Clone, Copy)]
pub enum ParsedScalar {
    Int(i128),
    Float(f64),
    Char(u8),
}

impl PartialEq for ParsedScalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParsedScalar::Int(a), ParsedScalar::Int(b)) => a == b,
            (ParsedScalar::Float(a), ParsedScalar::Float(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (ParsedScalar::Char(a), ParsedScalar::Char(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ParsedScalar {}

impl fmt::Display for ParsedScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedScalar::Int(i) => write!(f, "{}", i),
            ParsedScalar::Float(v) => write!(f, "{:?}", v),
            ParsedScalar::Char(c) => write!(f, "'{}'", char::from(*c)),
        }
    }
}

/// Split brace-list text (`"{1 2 3}"`, `"{{1, 2} {3, 4}}"`) into element tokens
fn brace_tokens(text: &str) -> Vec<Scalar> {
    text.split(|c: char| c == '{' || c == '}' || c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| Scalar::Text(token.trim_matches('"').to_string()))
        .collect()
}

/// Parse a default value into the resolved type and shape of a signal.
///
/// The number of parsed elements must equal `elements`, except for `char8` signals
/// whose default may be a string no longer than the signal (padded with zeros).
pub fn parse_default(
    value: &Value,
    ty: TypeDescriptor,
    dimensions: u8,
    elements: u32,
) -> std::result::Result<Vec<ParsedScalar>, String> {
    if let Value::Matrix(rows) = value {
        if dimensions < 2 {
            return Err(format!(
                "matrix default given for a signal with {} dimension(s)",
                dimensions
            ));
        }
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|row| row.len() != width) {
            return Err("matrix default rows have different lengths".to_string());
        }
    }

    if ty.kind == TypeKind::Char {
        if let Some(text) = value.as_text() {
            if !text.trim_start().starts_with('{') {
                if text.len() > elements as usize {
                    return Err(format!(
                        "string default of {} characters does not fit {} elements",
                        text.len(),
                        elements
                    ));
                }
                if !text.is_ascii() {
                    return Err("string default is not ASCII".to_string());
                }
                let mut parsed: Vec<ParsedScalar> =
                    text.bytes().map(ParsedScalar::Char).collect();
                parsed.resize(elements as usize, ParsedScalar::Char(0));
                return Ok(parsed);
            }
        }
    }

    let raw: Vec<Scalar> = match value {
        Value::Scalar(Scalar::Text(text)) if text.trim_start().starts_with('{') => {
            brace_tokens(text)
        }
        other => other.elements().into_iter().cloned().collect(),
    };

    if raw.len() != elements as usize {
        return Err(format!(
            "default has {} element(s), signal has {}",
            raw.len(),
            elements
        ));
    }

    raw.iter()
        .map(|scalar| {
            ty.parse_scalar(scalar)
                .ok_or_else(|| format!("{} is not a valid {}", scalar, ty))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_from_name() {
        assert_eq!(TypeDescriptor::from_name("uint32"), Some(TypeDescriptor::UINT32));
        assert_eq!(TypeDescriptor::from_name("float64"), Some(TypeDescriptor::FLOAT64));
        assert_eq!(
            TypeDescriptor::from_name("uint3"),
            Some(TypeDescriptor::new(TypeKind::Unsigned, 3))
        );
        assert_eq!(TypeDescriptor::from_name("uint65"), None);
        assert_eq!(TypeDescriptor::from_name("uint"), None);
        assert_eq!(TypeDescriptor::from_name("MyStruct"), None);
        assert_eq!(TypeDescriptor::from_name("int+8"), None);
    }

    #[test]
    fn test_byte_size() {
        assert_eq!(TypeDescriptor::UINT8.byte_size(), 1);
        assert_eq!(TypeDescriptor::INT32.byte_size(), 4);
        assert_eq!(TypeDescriptor::FLOAT64.byte_size(), 8);
        let bits = TypeDescriptor::from_name("uint12").unwrap();
        assert_eq!(bits.byte_size(), 2);
        assert!(bits.is_bit_field());
        assert!(!TypeDescriptor::UINT16.is_bit_field());
    }

    #[test]
    fn test_type_name_round_trip() {
        for name in ["uint8", "int64", "float32", "char8", "bool", "int3"] {
            let ty = TypeDescriptor::from_name(name).unwrap();
            assert_eq!(ty.name(), name);
        }
    }

    #[test]
    fn test_parse_scalar_bounds() {
        let ty = TypeDescriptor::UINT8;
        assert_eq!(ty.parse_scalar(&Scalar::Int(255)), Some(ParsedScalar::Int(255)));
        assert_eq!(ty.parse_scalar(&Scalar::Int(256)), None);
        assert_eq!(ty.parse_scalar(&Scalar::Int(-1)), None);
        let ty = TypeDescriptor::INT8;
        assert_eq!(ty.parse_scalar(&Scalar::Text("-128".into())), Some(ParsedScalar::Int(-128)));
        assert_eq!(ty.parse_scalar(&Scalar::Text("0x10".into())), Some(ParsedScalar::Int(16)));
        let ty = TypeDescriptor::from_name("uint3").unwrap();
        assert_eq!(ty.parse_scalar(&Scalar::Int(7)), Some(ParsedScalar::Int(7)));
        assert_eq!(ty.parse_scalar(&Scalar::Int(8)), None);
    }

    #[test]
    fn test_parse_float32_normalises() {
        let ty = TypeDescriptor::FLOAT32;
        let a = ty.parse_scalar(&Scalar::Text("0.1".into())).unwrap();
        let b = ty.parse_scalar(&Scalar::Float(0.1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_finite_defaults_equal_themselves() {
        for text in ["nan", "NaN", "inf", "-inf"] {
            let value = Value::from(text);
            for ty in [TypeDescriptor::FLOAT32, TypeDescriptor::FLOAT64] {
                let a = parse_default(&value, ty, 0, 1).unwrap();
                let b = parse_default(&value, ty, 0, 1).unwrap();
                assert_eq!(a, b, "{} as {}", text, ty);
            }
        }
        let inf = TypeDescriptor::FLOAT64.parse_scalar(&Scalar::Text("inf".into()));
        let neg = TypeDescriptor::FLOAT64.parse_scalar(&Scalar::Text("-inf".into()));
        assert_ne!(inf, neg);
        assert_ne!(Some(ParsedScalar::Float(1.0)), Some(ParsedScalar::Int(1)));
    }

    #[test]
    fn test_parse_default_vector_text() {
        let value = Value::from("{1 2 3}");
        let parsed = parse_default(&value, TypeDescriptor::UINT32, 1, 3).unwrap();
        assert_eq!(
            parsed,
            vec![ParsedScalar::Int(1), ParsedScalar::Int(2), ParsedScalar::Int(3)]
        );

        let typed = Value::Vector(vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)]);
        assert_eq!(parse_default(&typed, TypeDescriptor::UINT32, 1, 3).unwrap(), parsed);
    }

    #[test]
    fn test_parse_default_wrong_count() {
        let value = Value::from("{1 2}");
        let err = parse_default(&value, TypeDescriptor::UINT32, 1, 3).unwrap_err();
        assert!(err.contains("2 element"));
    }

    #[test]
    fn test_parse_default_matrix() {
        let value = Value::Matrix(vec![
            vec![Scalar::Int(1), Scalar::Int(2)],
            vec![Scalar::Int(3), Scalar::Int(4)],
        ]);
        assert_eq!(parse_default(&value, TypeDescriptor::INT16, 2, 4).unwrap().len(), 4);
        assert!(parse_default(&value, TypeDescriptor::INT16, 1, 4).is_err());
    }

    #[test]
    fn test_parse_default_string() {
        let value = Value::from("abc");
        let parsed = parse_default(&value, TypeDescriptor::CHAR8, 1, 5).unwrap();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[0], ParsedScalar::Char(b'a'));
        assert_eq!(parsed[4], ParsedScalar::Char(0));
        assert!(parse_default(&value, TypeDescriptor::CHAR8, 1, 2).is_err());
    }

    #[test]
    fn test_value_shape() {
        let value = Value::Matrix(vec![vec![Scalar::Int(0), Scalar::Int(1)]; 3]);
        assert_eq!(value.number_of_dimensions(), 2);
        assert_eq!(value.number_of_elements(), 6);
        assert_eq!(Value::from(3u32).number_of_dimensions(), 0);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::from(3u32).to_string(), "3");
        assert_eq!(Value::from("x").to_string(), "\"x\"");
        assert_eq!(Value::from(vec!["A", "B"]).to_string(), "{ \"A\" \"B\" }");
    }
}
