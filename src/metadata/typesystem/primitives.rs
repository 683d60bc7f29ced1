use std::fmt;

use crate::{
    file::io::read_le,
    metadata::typesystem::{CilFlavor, ELEMENT_TYPE},
    Error::{self, OutOfBounds},
    Result,
};

/// A primitive constant value, as stored in parameter defaults and attribute arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum CilPrimitiveData {
    /// Boolean value
    Boolean(bool),
    /// UTF-16 code unit
    Char(u16),
    /// 8-bit signed integer
    I1(i8),
    /// 8-bit unsigned integer
    U1(u8),
    /// 16-bit signed integer
    I2(i16),
    /// 16-bit unsigned integer
    U2(u16),
    /// 32-bit signed integer
    I4(i32),
    /// 32-bit unsigned integer
    U4(u32),
    /// 64-bit signed integer
    I8(i64),
    /// 64-bit unsigned integer
    U8(u64),
    /// 32-bit floating point
    R4(f32),
    /// 64-bit floating point
    R8(f64),
    /// String value
    String(String),
}

impl CilPrimitiveData {
    /// Flavor of the value
    #[must_use]
    pub fn flavor(&self) -> CilFlavor {
        match self {
            CilPrimitiveData::Boolean(_) => CilFlavor::Boolean,
            CilPrimitiveData::Char(_) => CilFlavor::Char,
            CilPrimitiveData::I1(_) => CilFlavor::I1,
            CilPrimitiveData::U1(_) => CilFlavor::U1,
            CilPrimitiveData::I2(_) => CilFlavor::I2,
            CilPrimitiveData::U2(_) => CilFlavor::U2,
            CilPrimitiveData::I4(_) => CilFlavor::I4,
            CilPrimitiveData::U4(_) => CilFlavor::U4,
            CilPrimitiveData::I8(_) => CilFlavor::I8,
            CilPrimitiveData::U8(_) => CilFlavor::U8,
            CilPrimitiveData::R4(_) => CilFlavor::R4,
            CilPrimitiveData::R8(_) => CilFlavor::R8,
            CilPrimitiveData::String(_) => CilFlavor::String,
        }
    }

    /// Element type byte of the value
    #[must_use]
    pub fn element_type(&self) -> u8 {
        match self {
            CilPrimitiveData::Boolean(_) => ELEMENT_TYPE::BOOLEAN,
            CilPrimitiveData::Char(_) => ELEMENT_TYPE::CHAR,
            CilPrimitiveData::I1(_) => ELEMENT_TYPE::I1,
            CilPrimitiveData::U1(_) => ELEMENT_TYPE::U1,
            CilPrimitiveData::I2(_) => ELEMENT_TYPE::I2,
            CilPrimitiveData::U2(_) => ELEMENT_TYPE::U2,
            CilPrimitiveData::I4(_) => ELEMENT_TYPE::I4,
            CilPrimitiveData::U4(_) => ELEMENT_TYPE::U4,
            CilPrimitiveData::I8(_) => ELEMENT_TYPE::I8,
            CilPrimitiveData::U8(_) => ELEMENT_TYPE::U8,
            CilPrimitiveData::R4(_) => ELEMENT_TYPE::R4,
            CilPrimitiveData::R8(_) => ELEMENT_TYPE::R8,
            CilPrimitiveData::String(_) => ELEMENT_TYPE::STRING,
        }
    }

    /// Integral value widened to i128, if the value is integral or boolean or char
    #[must_use]
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            CilPrimitiveData::Boolean(v) => Some(i128::from(*v)),
            CilPrimitiveData::Char(v) => Some(i128::from(*v)),
            CilPrimitiveData::I1(v) => Some(i128::from(*v)),
            CilPrimitiveData::U1(v) => Some(i128::from(*v)),
            CilPrimitiveData::I2(v) => Some(i128::from(*v)),
            CilPrimitiveData::U2(v) => Some(i128::from(*v)),
            CilPrimitiveData::I4(v) => Some(i128::from(*v)),
            CilPrimitiveData::U4(v) => Some(i128::from(*v)),
            CilPrimitiveData::I8(v) => Some(i128::from(*v)),
            CilPrimitiveData::U8(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    /// Numeric value as f64, if the value is numeric
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CilPrimitiveData::R4(v) => Some(f64::from(*v)),
            CilPrimitiveData::R8(v) => Some(*v),
            CilPrimitiveData::Boolean(_) | CilPrimitiveData::String(_) => None,
            #[allow(clippy::cast_precision_loss)]
            other => other.as_integer().map(|v| v as f64),
        }
    }

    /// Decode a constant blob of the given element type.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is too short, or
    /// [`crate::Error::Malformed`] for unsupported element types and invalid UTF-16.
    pub fn from_bytes(element_type: u8, data: &[u8]) -> Result<Self> {
        match element_type {
            ELEMENT_TYPE::BOOLEAN => match data.first() {
                Some(byte) => Ok(CilPrimitiveData::Boolean(*byte != 0)),
                None => Err(OutOfBounds),
            },
            ELEMENT_TYPE::CHAR => Ok(CilPrimitiveData::Char(read_le::<u16>(data)?)),
            ELEMENT_TYPE::I1 => Ok(CilPrimitiveData::I1(read_le::<i8>(data)?)),
            ELEMENT_TYPE::U1 => Ok(CilPrimitiveData::U1(read_le::<u8>(data)?)),
            ELEMENT_TYPE::I2 => Ok(CilPrimitiveData::I2(read_le::<i16>(data)?)),
            ELEMENT_TYPE::U2 => Ok(CilPrimitiveData::U2(read_le::<u16>(data)?)),
            ELEMENT_TYPE::I4 => Ok(CilPrimitiveData::I4(read_le::<i32>(data)?)),
            ELEMENT_TYPE::U4 => Ok(CilPrimitiveData::U4(read_le::<u32>(data)?)),
            ELEMENT_TYPE::I8 => Ok(CilPrimitiveData::I8(read_le::<i64>(data)?)),
            ELEMENT_TYPE::U8 => Ok(CilPrimitiveData::U8(read_le::<u64>(data)?)),
            ELEMENT_TYPE::R4 => Ok(CilPrimitiveData::R4(read_le::<f32>(data)?)),
            ELEMENT_TYPE::R8 => Ok(CilPrimitiveData::R8(read_le::<f64>(data)?)),
            ELEMENT_TYPE::STRING => {
                if data.len() % 2 != 0 {
                    return Err(malformed_error!(
                        "Invalid UTF-16 string length: {} (must be even)",
                        data.len()
                    ));
                }

                let units: Vec<u16> = data
                    .chunks_exact(2)
                    .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
                    .collect();

                String::from_utf16(&units)
                    .map(CilPrimitiveData::String)
                    .map_err(|_| malformed_error!("Invalid UTF-16 sequence in constant string"))
            }
            _ => Err(malformed_error!(
                "Unsupported constant element type 0x{:02x}",
                element_type
            )),
        }
    }

    /// Encode the value as a constant blob
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            CilPrimitiveData::Boolean(v) => vec![u8::from(*v)],
            CilPrimitiveData::Char(v) | CilPrimitiveData::U2(v) => v.to_le_bytes().to_vec(),
            CilPrimitiveData::I1(v) => v.to_le_bytes().to_vec(),
            CilPrimitiveData::U1(v) => vec![*v],
            CilPrimitiveData::I2(v) => v.to_le_bytes().to_vec(),
            CilPrimitiveData::I4(v) => v.to_le_bytes().to_vec(),
            CilPrimitiveData::U4(v) => v.to_le_bytes().to_vec(),
            CilPrimitiveData::I8(v) => v.to_le_bytes().to_vec(),
            CilPrimitiveData::U8(v) => v.to_le_bytes().to_vec(),
            CilPrimitiveData::R4(v) => v.to_le_bytes().to_vec(),
            CilPrimitiveData::R8(v) => v.to_le_bytes().to_vec(),
            CilPrimitiveData::String(v) => v.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        }
    }

    /// Convert the value to another primitive flavor, culture-invariantly.
    ///
    /// Integral conversions are range checked. Strings parse with Rust's locale-free
    /// parsers and numbers format with `Display`, which never uses grouping or a
    /// locale-specific decimal separator. Floating point to integral truncates only
    /// when the value is integral.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeConversionInvalid`] if the value cannot be represented.
    pub fn convert_to(&self, target: &CilFlavor) -> Result<CilPrimitiveData> {
        if &self.flavor() == target {
            return Ok(self.clone());
        }

        let fail = || Error::TypeConversionInvalid {
            value: self.to_string(),
            target: format!("{target:?}"),
        };

        if let CilPrimitiveData::String(text) = self {
            let text = text.trim();
            let parsed = match target {
                CilFlavor::Boolean => match text.to_ascii_lowercase().as_str() {
                    "true" => Some(CilPrimitiveData::Boolean(true)),
                    "false" => Some(CilPrimitiveData::Boolean(false)),
                    _ => None,
                },
                CilFlavor::Char => {
                    let mut units = text.encode_utf16();
                    match (units.next(), units.next()) {
                        (Some(unit), None) => Some(CilPrimitiveData::Char(unit)),
                        _ => None,
                    }
                }
                CilFlavor::R4 => text.parse::<f32>().ok().map(CilPrimitiveData::R4),
                CilFlavor::R8 => text.parse::<f64>().ok().map(CilPrimitiveData::R8),
                _ => text
                    .parse::<i128>()
                    .ok()
                    .and_then(|v| Self::from_integer(v, target)),
            };
            return parsed.ok_or_else(fail);
        }

        match target {
            CilFlavor::String => Ok(CilPrimitiveData::String(self.to_string())),
            CilFlavor::Boolean => match (self.as_integer(), self.as_f64()) {
                (Some(v), _) => Ok(CilPrimitiveData::Boolean(v != 0)),
                (None, Some(v)) => Ok(CilPrimitiveData::Boolean(v != 0.0)),
                _ => Err(fail()),
            },
            #[allow(clippy::cast_possible_truncation)]
            CilFlavor::R4 => self
                .numeric_f64()
                .map(|v| CilPrimitiveData::R4(v as f32))
                .ok_or_else(fail),
            CilFlavor::R8 => self.numeric_f64().map(CilPrimitiveData::R8).ok_or_else(fail),
            _ => {
                let integral = match self {
                    // booleans widen to 0 or 1, but never to a character
                    CilPrimitiveData::Boolean(_) if *target == CilFlavor::Char => None,
                    CilPrimitiveData::R4(_) | CilPrimitiveData::R8(_) => {
                        let value = self.as_f64().ok_or_else(fail)?;
                        #[allow(clippy::cast_possible_truncation)]
                        let truncated = value as i128;
                        (value.fract() == 0.0 && value.is_finite()).then_some(truncated)
                    }
                    _ => self.as_integer(),
                };

                integral
                    .and_then(|v| Self::from_integer(v, target))
                    .ok_or_else(fail)
            }
        }
    }

    fn numeric_f64(&self) -> Option<f64> {
        match self {
            CilPrimitiveData::Boolean(v) => Some(f64::from(u8::from(*v))),
            _ => self.as_f64(),
        }
    }

    fn from_integer(value: i128, target: &CilFlavor) -> Option<CilPrimitiveData> {
        match target {
            CilFlavor::Char => u16::try_from(value).ok().map(CilPrimitiveData::Char),
            CilFlavor::I1 => i8::try_from(value).ok().map(CilPrimitiveData::I1),
            CilFlavor::U1 => u8::try_from(value).ok().map(CilPrimitiveData::U1),
            CilFlavor::I2 => i16::try_from(value).ok().map(CilPrimitiveData::I2),
            CilFlavor::U2 => u16::try_from(value).ok().map(CilPrimitiveData::U2),
            CilFlavor::I4 => i32::try_from(value).ok().map(CilPrimitiveData::I4),
            CilFlavor::U4 => u32::try_from(value).ok().map(CilPrimitiveData::U4),
            CilFlavor::I8 => i64::try_from(value).ok().map(CilPrimitiveData::I8),
            CilFlavor::U8 => u64::try_from(value).ok().map(CilPrimitiveData::U8),
            #[allow(clippy::cast_precision_loss)]
            CilFlavor::R4 => Some(CilPrimitiveData::R4(value as f32)),
            #[allow(clippy::cast_precision_loss)]
            CilFlavor::R8 => Some(CilPrimitiveData::R8(value as f64)),
            _ => None,
        }
    }
}

impl fmt::Display for CilPrimitiveData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CilPrimitiveData::Boolean(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            CilPrimitiveData::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) => write!(f, "{c}"),
                None => write!(f, "\\u{v:04x}"),
            },
            CilPrimitiveData::I1(v) => write!(f, "{v}"),
            CilPrimitiveData::U1(v) => write!(f, "{v}"),
            CilPrimitiveData::I2(v) => write!(f, "{v}"),
            CilPrimitiveData::U2(v) => write!(f, "{v}"),
            CilPrimitiveData::I4(v) => write!(f, "{v}"),
            CilPrimitiveData::U4(v) => write!(f, "{v}"),
            CilPrimitiveData::I8(v) => write!(f, "{v}"),
            CilPrimitiveData::U8(v) => write!(f, "{v}"),
            CilPrimitiveData::R4(v) => write!(f, "{v}"),
            CilPrimitiveData::R8(v) => write!(f, "{v}"),
            CilPrimitiveData::String(v) => write!(f, "{v}"),
        }
    }
}
