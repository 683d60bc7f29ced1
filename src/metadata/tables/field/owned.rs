use std::sync::{Arc, OnceLock};

use crate::{
    metadata::{
        customattributes::CustomAttributeValueList,
        tables::{Constant, FieldAttributes},
        token::Token,
        typesystem::{CilTypeRc, CilTypeRef},
    },
    Result,
};

/// A field definition.
pub struct Field {
    /// Token
    pub token: Token,
    /// bitmask of `FieldAttributes`, §II.23.1.5
    pub flags: u32,
    /// Name of the field
    pub name: String,
    /// Literal value, for `LITERAL` fields such as enum members
    pub default: OnceLock<Constant>,
    /// Custom attributes applied to this field
    pub custom_attributes: CustomAttributeValueList,
    base: CilTypeRef,
    declaring_type: OnceLock<CilTypeRef>,
}

impl Field {
    /// Create a field of type `ty`
    #[must_use]
    pub fn new(token: Token, name: impl Into<String>, flags: u32, ty: &CilTypeRc) -> Self {
        Field {
            token,
            flags,
            name: name.into(),
            default: OnceLock::new(),
            custom_attributes: Arc::new(boxcar::Vec::new()),
            base: CilTypeRef::new(ty),
            declaring_type: OnceLock::new(),
        }
    }

    /// The field type
    #[must_use]
    pub fn ty(&self) -> Option<CilTypeRc> {
        self.base.upgrade()
    }

    /// Set the declaring type. Can only be set once.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the declaring type was already set.
    pub fn set_declaring_type(&self, declaring: &CilTypeRc) -> Result<()> {
        self.declaring_type
            .set(CilTypeRef::new(declaring))
            .map_err(|_| malformed_error!("Declaring type of field '{}' is already set", self.name))
    }

    /// The type that declares this field
    #[must_use]
    pub fn declaring_type(&self) -> Option<CilTypeRc> {
        self.declaring_type.get().and_then(CilTypeRef::upgrade)
    }

    /// True for static fields
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & FieldAttributes::STATIC != 0
    }

    /// True for fields that may only be written by a constructor
    #[must_use]
    pub fn is_init_only(&self) -> bool {
        self.flags & FieldAttributes::INIT_ONLY != 0
    }

    /// True for private fields
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.flags & FieldAttributes::FIELD_ACCESS_MASK == FieldAttributes::PRIVATE
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("flags", &format_args!("0x{:04x}", self.flags))
            .field("type", &self.ty().map(|ty| ty.fullname()))
            .finish()
    }
}
