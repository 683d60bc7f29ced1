use std::sync::{Arc, OnceLock};

use crate::{
    metadata::{
        customattributes::CustomAttributeValueList,
        tables::{accepts_constant, Constant, DefaultValue, ParamAttributes},
        token::Token,
        typesystem::{CilTypeRc, CilTypeRef},
    },
    Error, Result,
};

/// A method parameter, or the return parameter when `sequence` is 0.
pub struct Param {
    /// Token
    pub token: Token,
    /// bitmask of `ParamAttributes`, §II.23.1.13, as declared
    pub flags: u32,
    /// The sequence number (0 for return value)
    pub sequence: u32,
    /// The parameter name
    pub name: Option<String>,
    /// `flags.HAS_DEFAULT` -> The raw default value of this parameter
    pub default: OnceLock<Constant>,
    /// The underlaying type of this `Param`
    pub base: OnceLock<CilTypeRef>,
    /// Custom attributes applied to this parameter
    pub custom_attributes: CustomAttributeValueList,
}

impl Param {
    /// Create a parameter without type or default
    #[must_use]
    pub fn new(token: Token, sequence: u32, name: Option<String>, flags: u32) -> Self {
        Param {
            token,
            flags,
            sequence,
            name,
            default: OnceLock::new(),
            base: OnceLock::new(),
            custom_attributes: Arc::new(boxcar::Vec::new()),
        }
    }

    /// Set the parameter type. Can only be set once.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the type was already set.
    pub fn set_type(&self, ty: &CilTypeRc) -> Result<()> {
        self.base
            .set(CilTypeRef::new(ty))
            .map_err(|_| malformed_error!("Type of parameter {} is already set", self.token))
    }

    /// The parameter type
    #[must_use]
    pub fn ty(&self) -> Option<CilTypeRc> {
        self.base.get().and_then(CilTypeRef::upgrade)
    }

    /// Effective attributes: the declared flags, with `HAS_DEFAULT` reflecting whether a
    /// default is actually stored
    #[must_use]
    pub fn attributes(&self) -> u32 {
        if self.default.get().is_some() {
            self.flags | ParamAttributes::HAS_DEFAULT
        } else {
            self.flags & !ParamAttributes::HAS_DEFAULT
        }
    }

    /// True if the parameter was declared with `HAS_DEFAULT`
    #[must_use]
    pub fn declares_default(&self) -> bool {
        self.flags & ParamAttributes::HAS_DEFAULT != 0
    }

    /// True if the parameter is optional
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.flags & ParamAttributes::OPTIONAL != 0
    }

    /// Read the declared default value.
    ///
    /// Parameters without `HAS_DEFAULT`, or with `HAS_DEFAULT` but no stored constant,
    /// read as [`DefaultValue::Missing`].
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantFormat`] if the stored constant cannot be
    /// decoded for the parameter type, see [`Constant::read_as`].
    pub fn read_default(&self) -> Result<DefaultValue> {
        if !self.declares_default() {
            return Ok(DefaultValue::Missing);
        }

        let Some(constant) = self.default.get() else {
            return Ok(DefaultValue::Missing);
        };

        let ty = self
            .ty()
            .ok_or_else(|| malformed_error!("Parameter {} has no type", self.token))?;
        constant.read_as(&ty)
    }

    /// Store a default value, checking it against the parameter type.
    ///
    /// Setting [`DefaultValue::Missing`] is a no-op.
    ///
    /// # Errors
    /// - [`crate::Error::ConstantMismatch`] if the type does not accept the value
    /// - [`crate::Error::Malformed`] if a default is already stored
    pub fn apply_default(&self, value: &DefaultValue) -> Result<()> {
        let Some(constant) = Constant::from_default(value) else {
            return Ok(());
        };

        let ty = self
            .ty()
            .ok_or_else(|| malformed_error!("Parameter {} has no type", self.token))?;
        if !accepts_constant(&ty, value) {
            return Err(Error::ConstantMismatch {
                value: value.to_string(),
                target: ty.fullname(),
            });
        }

        self.default
            .set(constant)
            .map_err(|_| malformed_error!("Default value already set for param"))
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Param")
            .field("token", &self.token)
            .field("sequence", &self.sequence)
            .field("name", &self.name)
            .field("flags", &format_args!("0x{:04x}", self.attributes()))
            .field("type", &self.ty().map(|ty| ty.fullname()))
            .finish()
    }
}
