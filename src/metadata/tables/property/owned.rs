use std::sync::{Arc, OnceLock};

use crate::{
    metadata::{
        customattributes::CustomAttributeValueList,
        method::MethodRc,
        token::Token,
        typesystem::{CilTypeRc, CilTypeRef},
    },
    Result,
};

/// A property with its accessors.
pub struct Property {
    /// Token
    pub token: Token,
    /// bitmask of `PropertyAttributes`, §II.23.1.14
    pub flags: u32,
    /// Name of the property
    pub name: String,
    /// Custom attributes applied to this property
    pub custom_attributes: CustomAttributeValueList,
    base: CilTypeRef,
    getter: OnceLock<MethodRc>,
    setter: OnceLock<MethodRc>,
}

impl Property {
    /// Create a property of type `ty` without accessors
    #[must_use]
    pub fn new(token: Token, name: impl Into<String>, flags: u32, ty: &CilTypeRc) -> Self {
        Property {
            token,
            flags,
            name: name.into(),
            custom_attributes: Arc::new(boxcar::Vec::new()),
            base: CilTypeRef::new(ty),
            getter: OnceLock::new(),
            setter: OnceLock::new(),
        }
    }

    /// The property type
    #[must_use]
    pub fn ty(&self) -> Option<CilTypeRc> {
        self.base.upgrade()
    }

    /// Attach the getter. Can only be set once.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a getter is already attached.
    pub fn set_getter(&self, getter: MethodRc) -> Result<()> {
        self.getter
            .set(getter)
            .map_err(|_| malformed_error!("Getter of '{}' is already set", self.name))
    }

    /// Attach the setter. Can only be set once.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a setter is already attached.
    pub fn set_setter(&self, setter: MethodRc) -> Result<()> {
        self.setter
            .set(setter)
            .map_err(|_| malformed_error!("Setter of '{}' is already set", self.name))
    }

    /// The getter, if any
    #[must_use]
    pub fn getter(&self) -> Option<MethodRc> {
        self.getter.get().cloned()
    }

    /// The setter, if any
    #[must_use]
    pub fn setter(&self) -> Option<MethodRc> {
        self.setter.get().cloned()
    }

    /// True if at least one accessor exists
    #[must_use]
    pub fn is_fully_defined(&self) -> bool {
        self.getter.get().is_some() || self.setter.get().is_some()
    }
}

impl std::fmt::Debug for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("type", &self.ty().map(|ty| ty.fullname()))
            .field("getter", &self.getter().map(|m| m.token))
            .field("setter", &self.setter().map(|m| m.token))
            .finish()
    }
}
