use std::sync::{Arc, Weak};

use bitflags::bitflags;

use crate::{
    metadata::{token::Token, typesystem::CilType},
    Error, Result,
};

/// A reference counted type handle
pub type CilTypeRc = Arc<CilType>;
/// An append-only list of strong type handles
pub type CilTypeList = Arc<boxcar::Vec<CilTypeRc>>;
/// An append-only list of weak type references
pub type CilTypeRefList = Arc<boxcar::Vec<CilTypeRef>>;

/// Element type bytes, as used by constants and signatures (ECMA-335 II.23.1.16)
#[allow(non_snake_case)]
pub mod ELEMENT_TYPE {
    /// Marks end of a list
    pub const END: u8 = 0x00;
    /// void
    pub const VOID: u8 = 0x01;
    /// bool
    pub const BOOLEAN: u8 = 0x02;
    /// char (UTF-16 code unit)
    pub const CHAR: u8 = 0x03;
    /// int8
    pub const I1: u8 = 0x04;
    /// uint8
    pub const U1: u8 = 0x05;
    /// int16
    pub const I2: u8 = 0x06;
    /// uint16
    pub const U2: u8 = 0x07;
    /// int32
    pub const I4: u8 = 0x08;
    /// uint32
    pub const U4: u8 = 0x09;
    /// int64
    pub const I8: u8 = 0x0a;
    /// uint64
    pub const U8: u8 = 0x0b;
    /// float32
    pub const R4: u8 = 0x0c;
    /// float64
    pub const R8: u8 = 0x0d;
    /// System.String
    pub const STRING: u8 = 0x0e;
    /// Any class; used for the null constant
    pub const CLASS: u8 = 0x12;
    /// native int
    pub const I: u8 = 0x18;
    /// native unsigned int
    pub const U: u8 = 0x19;
    /// System.Object
    pub const OBJECT: u8 = 0x1c;
    /// Single-dimension, zero lower bound array
    pub const SZARRAY: u8 = 0x1d;
}

/// A weak reference to a type, used for every back- and cross-reference so that
/// type graphs with cycles (a type whose method returns the type itself) do not leak.
/// The [`crate::metadata::typesystem::TypeRegistry`] owns the strong handles.
#[derive(Clone, Debug)]
pub struct CilTypeRef {
    weak_ref: Weak<CilType>,
}

impl CilTypeRef {
    /// Create a weak reference from a strong handle
    #[must_use]
    pub fn new(strong_ref: &CilTypeRc) -> Self {
        Self {
            weak_ref: Arc::downgrade(strong_ref),
        }
    }

    /// Upgrade to a strong handle, if the type is still alive
    #[must_use]
    pub fn upgrade(&self) -> Option<CilTypeRc> {
        self.weak_ref.upgrade()
    }

    /// Upgrade to a strong handle or fail with a type error.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeError`] if the referenced type has been dropped.
    pub fn resolve(&self) -> Result<CilTypeRc> {
        self.upgrade()
            .ok_or_else(|| Error::TypeError("Type reference has been dropped".to_string()))
    }

    /// Token of the referenced type
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.upgrade().map(|t| t.token)
    }

    /// Full name of the referenced type
    #[must_use]
    pub fn fullname(&self) -> Option<String> {
        self.upgrade().map(|t| t.fullname())
    }

    /// True if both references point at the same live type
    #[must_use]
    pub fn is(&self, other: &CilTypeRc) -> bool {
        self.token() == Some(other.token)
    }
}

impl From<CilTypeRc> for CilTypeRef {
    fn from(strong_ref: CilTypeRc) -> Self {
        Self::new(&strong_ref)
    }
}

/// Classification of a type.
///
/// Primitive flavors are fixed for the built-in `System` types. Everything declared
/// through the builders is a `Class`, `ValueType` or `Interface`. Constructed types
/// created by the registry are `Array`, `GenericInstance` or `GenericParameter`.
#[derive(Debug, Clone, PartialEq)]
pub enum CilFlavor {
    // Base primitive types
    /// System.Void
    Void,
    /// System.Boolean
    Boolean,
    /// System.Char
    Char,
    /// System.SByte
    I1,
    /// System.Byte
    U1,
    /// System.Int16
    I2,
    /// System.UInt16
    U2,
    /// System.Int32
    I4,
    /// System.UInt32
    U4,
    /// System.Int64
    I8,
    /// System.UInt64
    U8,
    /// System.Single
    R4,
    /// System.Double
    R8,
    /// System.IntPtr
    I,
    /// System.UIntPtr
    U,
    /// System.Object
    Object,
    /// System.String
    String,

    // Constructed types
    /// Array of an element type
    Array {
        /// Number of dimensions, 1 for vectors
        rank: u32,
    },
    /// A generic type closed (or partially closed) over arguments
    GenericInstance,
    /// A positional generic parameter placeholder (`!n` or `!!n`)
    GenericParameter {
        /// Position in the owner's generic parameter list
        index: u32,
        /// True for method-level parameters
        method: bool,
    },

    // Type categories
    /// Reference type
    Class,
    /// User value type, including enums
    ValueType,
    /// Interface
    Interface,
}

impl CilFlavor {
    /// True for the built-in primitive flavors
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            CilFlavor::Void
                | CilFlavor::Boolean
                | CilFlavor::Char
                | CilFlavor::I1
                | CilFlavor::U1
                | CilFlavor::I2
                | CilFlavor::U2
                | CilFlavor::I4
                | CilFlavor::U4
                | CilFlavor::I8
                | CilFlavor::U8
                | CilFlavor::R4
                | CilFlavor::R8
                | CilFlavor::I
                | CilFlavor::U
                | CilFlavor::Object
                | CilFlavor::String
        )
    }

    /// True for flavors that are value types on their own
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            CilFlavor::Boolean
                | CilFlavor::Char
                | CilFlavor::I1
                | CilFlavor::U1
                | CilFlavor::I2
                | CilFlavor::U2
                | CilFlavor::I4
                | CilFlavor::U4
                | CilFlavor::I8
                | CilFlavor::U8
                | CilFlavor::R4
                | CilFlavor::R8
                | CilFlavor::I
                | CilFlavor::U
                | CilFlavor::ValueType
        )
    }

    /// True for flavors that are reference types on their own
    #[must_use]
    pub fn is_reference_type(&self) -> bool {
        matches!(
            self,
            CilFlavor::Object
                | CilFlavor::String
                | CilFlavor::Class
                | CilFlavor::Interface
                | CilFlavor::Array { .. }
        )
    }

    /// Element type byte used when encoding a constant of this flavor
    #[must_use]
    pub fn element_type(&self) -> Option<u8> {
        match self {
            CilFlavor::Void => Some(ELEMENT_TYPE::VOID),
            CilFlavor::Boolean => Some(ELEMENT_TYPE::BOOLEAN),
            CilFlavor::Char => Some(ELEMENT_TYPE::CHAR),
            CilFlavor::I1 => Some(ELEMENT_TYPE::I1),
            CilFlavor::U1 => Some(ELEMENT_TYPE::U1),
            CilFlavor::I2 => Some(ELEMENT_TYPE::I2),
            CilFlavor::U2 => Some(ELEMENT_TYPE::U2),
            CilFlavor::I4 => Some(ELEMENT_TYPE::I4),
            CilFlavor::U4 => Some(ELEMENT_TYPE::U4),
            CilFlavor::I8 => Some(ELEMENT_TYPE::I8),
            CilFlavor::U8 => Some(ELEMENT_TYPE::U8),
            CilFlavor::R4 => Some(ELEMENT_TYPE::R4),
            CilFlavor::R8 => Some(ELEMENT_TYPE::R8),
            CilFlavor::I => Some(ELEMENT_TYPE::I),
            CilFlavor::U => Some(ELEMENT_TYPE::U),
            CilFlavor::String => Some(ELEMENT_TYPE::STRING),
            CilFlavor::Object => Some(ELEMENT_TYPE::OBJECT),
            _ => None,
        }
    }

    /// Flavor for an element type byte
    #[must_use]
    pub fn from_element_type(element_type: u8) -> Option<CilFlavor> {
        match element_type {
            ELEMENT_TYPE::BOOLEAN => Some(CilFlavor::Boolean),
            ELEMENT_TYPE::CHAR => Some(CilFlavor::Char),
            ELEMENT_TYPE::I1 => Some(CilFlavor::I1),
            ELEMENT_TYPE::U1 => Some(CilFlavor::U1),
            ELEMENT_TYPE::I2 => Some(CilFlavor::I2),
            ELEMENT_TYPE::U2 => Some(CilFlavor::U2),
            ELEMENT_TYPE::I4 => Some(CilFlavor::I4),
            ELEMENT_TYPE::U4 => Some(CilFlavor::U4),
            ELEMENT_TYPE::I8 => Some(CilFlavor::I8),
            ELEMENT_TYPE::U8 => Some(CilFlavor::U8),
            ELEMENT_TYPE::R4 => Some(CilFlavor::R4),
            ELEMENT_TYPE::R8 => Some(CilFlavor::R8),
            ELEMENT_TYPE::I => Some(CilFlavor::I),
            ELEMENT_TYPE::U => Some(CilFlavor::U),
            ELEMENT_TYPE::STRING => Some(CilFlavor::String),
            ELEMENT_TYPE::OBJECT => Some(CilFlavor::Object),
            _ => None,
        }
    }
}

/// Visibility encoded in the low three bits of [`TypeAttributes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeVisibility {
    /// Top-level, assembly only
    NotPublic,
    /// Top-level, public
    Public,
    /// Nested, public
    NestedPublic,
    /// Nested, private
    NestedPrivate,
    /// Nested, family
    NestedFamily,
    /// Nested, assembly
    NestedAssembly,
    /// Nested, family and assembly
    NestedFamAndAssem,
    /// Nested, family or assembly
    NestedFamOrAssem,
}

bitflags! {
    /// Type definition flags (ECMA-335 II.23.1.15)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeAttributes: u32 {
        /// Top-level, assembly only
        const NOT_PUBLIC = 0x0000_0000;
        /// Top-level, public
        const PUBLIC = 0x0000_0001;
        /// Nested, public
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested, private
        const NESTED_PRIVATE = 0x0000_0003;
        /// Nested, family
        const NESTED_FAMILY = 0x0000_0004;
        /// Nested, assembly
        const NESTED_ASSEMBLY = 0x0000_0005;
        /// Nested, family and assembly
        const NESTED_FAM_AND_ASSEM = 0x0000_0006;
        /// Nested, family or assembly
        const NESTED_FAM_OR_ASSEM = 0x0000_0007;
        /// Type is a class
        const CLASS = 0x0000_0000;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type cannot be instantiated
        const ABSTRACT = 0x0000_0080;
        /// Type cannot be derived from
        const SEALED = 0x0000_0100;
        /// Name is special
        const SPECIAL_NAME = 0x0000_0400;
        /// Static initialization may run lazily
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

impl TypeAttributes {
    /// Mask for the visibility bits
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;

    /// Decode the visibility bits
    #[must_use]
    pub fn visibility(self) -> TypeVisibility {
        match self.bits() & Self::VISIBILITY_MASK {
            0 => TypeVisibility::NotPublic,
            1 => TypeVisibility::Public,
            2 => TypeVisibility::NestedPublic,
            3 => TypeVisibility::NestedPrivate,
            4 => TypeVisibility::NestedFamily,
            5 => TypeVisibility::NestedAssembly,
            6 => TypeVisibility::NestedFamAndAssem,
            _ => TypeVisibility::NestedFamOrAssem,
        }
    }

    /// Replace the visibility bits
    #[must_use]
    pub fn with_visibility(self, visibility: TypeAttributes) -> Self {
        let bits = (self.bits() & !Self::VISIBILITY_MASK)
            | (visibility.bits() & Self::VISIBILITY_MASK);
        Self::from_bits_retain(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_classification() {
        assert!(CilFlavor::I4.is_primitive());
        assert!(CilFlavor::I4.is_value_type());
        assert!(!CilFlavor::I4.is_reference_type());

        assert!(CilFlavor::String.is_primitive());
        assert!(CilFlavor::String.is_reference_type());
        assert!(!CilFlavor::String.is_value_type());

        assert!(CilFlavor::ValueType.is_value_type());
        assert!(CilFlavor::Array { rank: 1 }.is_reference_type());
        assert!(CilFlavor::Interface.is_reference_type());

        let param = CilFlavor::GenericParameter {
            index: 0,
            method: true,
        };
        assert!(!param.is_value_type());
        assert!(!param.is_reference_type());
        assert!(!CilFlavor::GenericInstance.is_primitive());
    }

    #[test]
    fn test_element_types() {
        assert_eq!(CilFlavor::I8.element_type(), Some(ELEMENT_TYPE::I8));
        assert_eq!(CilFlavor::Class.element_type(), None);
        assert_eq!(
            CilFlavor::from_element_type(ELEMENT_TYPE::R4),
            Some(CilFlavor::R4)
        );
        assert_eq!(CilFlavor::from_element_type(ELEMENT_TYPE::CLASS), None);
    }

    #[test]
    fn test_visibility() {
        let flags = TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT;
        assert_eq!(flags.visibility(), TypeVisibility::Public);

        let nested = flags.with_visibility(TypeAttributes::NESTED_PRIVATE);
        assert_eq!(nested.visibility(), TypeVisibility::NestedPrivate);
        assert!(nested.contains(TypeAttributes::INTERFACE));

        assert_eq!(
            TypeAttributes::NESTED_FAM_OR_ASSEM.visibility(),
            TypeVisibility::NestedFamOrAssem
        );
    }
}
