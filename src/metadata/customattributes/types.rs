//! Custom attribute values and their arguments, §II.23.3.

use std::sync::Arc;

use crate::metadata::{method::MethodRc, typesystem::CilTypeRc};

/// A reference-counted pointer to a `CustomAttributeValue`
pub type CustomAttributeValueRc = Arc<CustomAttributeValue>;
/// A vector that holds a list of `CustomAttributeValue` instances for storage on parent objects
pub type CustomAttributeValueList = Arc<boxcar::Vec<CustomAttributeValueRc>>;

/// An applied custom attribute: the attribute constructor with its arguments
#[derive(Debug, Clone)]
pub struct CustomAttributeValue {
    /// The attribute constructor that is invoked
    pub constructor: MethodRc,
    /// Fixed arguments from the constructor signature
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Named arguments (fields and properties)
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

impl CustomAttributeValue {
    /// Create an attribute application without arguments
    #[must_use]
    pub fn new(constructor: MethodRc) -> Self {
        CustomAttributeValue {
            constructor,
            fixed_args: Vec::new(),
            named_args: Vec::new(),
        }
    }

    /// Append a constructor argument
    #[must_use]
    pub fn with_arg(mut self, arg: CustomAttributeArgument) -> Self {
        self.fixed_args.push(arg);
        self
    }

    /// Append a named property argument
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: CustomAttributeArgument) -> Self {
        self.named_args.push(CustomAttributeNamedArgument {
            is_field: false,
            name: name.into(),
            arg_type: value.type_name(),
            value,
        });
        self
    }

    /// Append a named field argument
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: CustomAttributeArgument) -> Self {
        self.named_args.push(CustomAttributeNamedArgument {
            is_field: true,
            name: name.into(),
            arg_type: value.type_name(),
            value,
        });
        self
    }

    /// The attribute type, the declaring type of the constructor
    #[must_use]
    pub fn attribute_type(&self) -> Option<CilTypeRc> {
        self.constructor.declaring_type()
    }

    /// True if the attribute type has the given full name
    #[must_use]
    pub fn is(&self, fullname: &str) -> bool {
        self.attribute_type()
            .is_some_and(|ty| ty.fullname() == fullname)
    }
}

/// Represents a single custom attribute argument value
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeArgument {
    /// Boolean value
    Bool(bool),
    /// Character value (16-bit Unicode)
    Char(char),
    /// Signed 8-bit integer
    I1(i8),
    /// Unsigned 8-bit integer
    U1(u8),
    /// Signed 16-bit integer
    I2(i16),
    /// Unsigned 16-bit integer
    U2(u16),
    /// Signed 32-bit integer
    I4(i32),
    /// Unsigned 32-bit integer
    U4(u32),
    /// Signed 64-bit integer
    I8(i64),
    /// Unsigned 64-bit integer
    U8(u64),
    /// 32-bit floating point
    R4(f32),
    /// 64-bit floating point
    R8(f64),
    /// UTF-8 string, `None` for the null string
    String(Option<String>),
    /// Type reference (as full name)
    Type(String),
    /// Array of arguments with the element type name
    Array(String, Vec<CustomAttributeArgument>),
    /// Enum value (enum type name + underlying value)
    Enum(String, Box<CustomAttributeArgument>),
}

impl CustomAttributeArgument {
    /// Full name of the argument's type
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            CustomAttributeArgument::Bool(_) => "System.Boolean".to_string(),
            CustomAttributeArgument::Char(_) => "System.Char".to_string(),
            CustomAttributeArgument::I1(_) => "System.SByte".to_string(),
            CustomAttributeArgument::U1(_) => "System.Byte".to_string(),
            CustomAttributeArgument::I2(_) => "System.Int16".to_string(),
            CustomAttributeArgument::U2(_) => "System.UInt16".to_string(),
            CustomAttributeArgument::I4(_) => "System.Int32".to_string(),
            CustomAttributeArgument::U4(_) => "System.UInt32".to_string(),
            CustomAttributeArgument::I8(_) => "System.Int64".to_string(),
            CustomAttributeArgument::U8(_) => "System.UInt64".to_string(),
            CustomAttributeArgument::R4(_) => "System.Single".to_string(),
            CustomAttributeArgument::R8(_) => "System.Double".to_string(),
            CustomAttributeArgument::String(_) => "System.String".to_string(),
            CustomAttributeArgument::Type(_) => "System.Type".to_string(),
            CustomAttributeArgument::Array(element, _) => format!("{element}[]"),
            CustomAttributeArgument::Enum(name, _) => name.clone(),
        }
    }
}

/// Represents a named argument (field or property) in a custom attribute
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeNamedArgument {
    /// Whether this is a field (true) or property (false)
    pub is_field: bool,
    /// Name of the field or property
    pub name: String,
    /// Type of the argument
    pub arg_type: String,
    /// Value of the argument
    pub value: CustomAttributeArgument,
}
