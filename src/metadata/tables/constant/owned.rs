use crate::{
    metadata::typesystem::{CilFlavor, CilPrimitiveData, CilTypeRc, ELEMENT_TYPE},
    Error, Result,
};

/// The raw default value of a parameter, field or property.
///
/// `c_type` is the element type of the stored value (§II.23.1.16). The null reference
/// is encoded as `ELEMENT_TYPE_CLASS` with a 4-byte zero value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    /// Element type of the stored value
    pub c_type: u8,
    /// Encoded value blob
    pub value: Vec<u8>,
}

/// A decoded default value.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// No value was supplied. Distinct from [`DefaultValue::Null`], which is an explicit null default.
    Missing,
    /// The null reference
    Null,
    /// A primitive value
    Value(CilPrimitiveData),
}

impl DefaultValue {
    /// True for [`DefaultValue::Null`]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, DefaultValue::Null)
    }
}

impl std::fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefaultValue::Missing => write!(f, "<missing>"),
            DefaultValue::Null => write!(f, "null"),
            DefaultValue::Value(value) => write!(f, "{value}"),
        }
    }
}

impl Constant {
    /// The encoded null reference
    #[must_use]
    pub fn null() -> Self {
        Constant {
            c_type: ELEMENT_TYPE::CLASS,
            value: vec![0; 4],
        }
    }

    /// Encode a primitive value
    #[must_use]
    pub fn from_value(value: &CilPrimitiveData) -> Self {
        Constant {
            c_type: value.element_type(),
            value: value.to_bytes(),
        }
    }

    /// Encode a decoded default. [`DefaultValue::Missing`] has no encoding.
    #[must_use]
    pub fn from_default(value: &DefaultValue) -> Option<Self> {
        match value {
            DefaultValue::Missing => None,
            DefaultValue::Null => Some(Constant::null()),
            DefaultValue::Value(value) => Some(Constant::from_value(value)),
        }
    }

    /// Decode the constant as a default of a location typed `ty`.
    ///
    /// Enum-typed locations (directly or through `Nullable<T>`) require the stored
    /// element type to be the enum's underlying type. Non-primitive value types such as
    /// `System.DateTime` have no constant encoding at all.
    ///
    /// # Errors
    /// Returns [`Error::ConstantFormat`] if the constant cannot be read as `ty`, or a
    /// decoding error for truncated blobs.
    pub fn read_as(&self, ty: &CilTypeRc) -> Result<DefaultValue> {
        if self.c_type == ELEMENT_TYPE::CLASS {
            return Ok(DefaultValue::Null);
        }

        let format_error = || Error::ConstantFormat {
            element_type: self.c_type,
            target: ty.fullname(),
        };

        let target = ty.nullable_underlying().unwrap_or_else(|| ty.clone());
        if target.is_enum() {
            let underlying = target.enum_underlying().ok_or_else(format_error)?;
            if underlying.flavor.element_type() != Some(self.c_type) {
                return Err(format_error());
            }
        } else if target.flavor == CilFlavor::ValueType {
            return Err(format_error());
        }

        CilPrimitiveData::from_bytes(self.c_type, &self.value).map(DefaultValue::Value)
    }
}

/// True if a location typed `ty` can hold the default `value`.
///
/// - `null` is accepted by reference types only, `Nullable<T>` included as a rejection
/// - `Nullable<T>` accepts values of `T`'s flavor, except for enum `T`
/// - Enums accept values of their underlying flavor
/// - `System.Object` accepts any primitive
/// - Everything else requires the exact flavor
#[must_use]
pub fn accepts_constant(ty: &CilTypeRc, value: &DefaultValue) -> bool {
    match value {
        DefaultValue::Missing => true,
        DefaultValue::Null => !ty.is_value_type() && !ty.is_generic_parameter(),
        DefaultValue::Value(value) => {
            if let Some(underlying) = ty.nullable_underlying() {
                return !underlying.is_enum() && underlying.flavor == value.flavor();
            }

            if ty.is_enum() {
                return ty
                    .enum_underlying()
                    .is_some_and(|underlying| underlying.flavor == value.flavor());
            }

            ty.flavor == CilFlavor::Object || ty.flavor == value.flavor()
        }
    }
}
