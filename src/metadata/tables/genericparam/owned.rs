use std::sync::Arc;

use crate::{
    metadata::{
        customattributes::CustomAttributeValueList,
        tables::GenericParamAttributes,
        token::Token,
        typesystem::{CilTypeRc, CilTypeRef, CilTypeRefList},
    },
    Error, Result,
};

/// A generic parameter of a type or method, §II.22.20.
pub struct GenericParam {
    /// Token
    pub token: Token,
    /// a 2-byte index of the generic parameter, numbered left-to-right, from zero
    pub number: u32,
    /// a 2-byte bitmask of type `GenericParamAttributes`, §II.23.1.7
    pub flags: u32,
    /// Name of the generic parameter
    pub name: String,
    /// True if owned by a method, false if owned by a type
    pub owner_is_method: bool,
    /// Base type and interface constraints
    pub constraints: CilTypeRefList,
    /// Custom attributes applied to this `GenericParam`
    pub custom_attributes: CustomAttributeValueList,
}

impl GenericParam {
    /// Create a generic parameter without constraint types
    #[must_use]
    pub fn new(
        token: Token,
        number: u32,
        name: impl Into<String>,
        flags: u32,
        owner_is_method: bool,
    ) -> Self {
        GenericParam {
            token,
            number,
            flags,
            name: name.into(),
            owner_is_method,
            constraints: Arc::new(boxcar::Vec::new()),
            custom_attributes: Arc::new(boxcar::Vec::new()),
        }
    }

    /// Add a constraint type
    pub fn add_constraint(&self, constraint: &CilTypeRc) {
        self.constraints.push(CilTypeRef::new(constraint));
    }

    /// Constraint types as strong handles
    #[must_use]
    pub fn constraint_types(&self) -> Vec<CilTypeRc> {
        self.constraints
            .iter()
            .filter_map(|(_, constraint)| constraint.upgrade())
            .collect()
    }

    /// Special constraint bits (`class`, `struct`, `new()`)
    #[must_use]
    pub fn special_constraints(&self) -> u32 {
        self.flags & GenericParamAttributes::SPECIAL_CONSTRAINT_MASK
    }

    /// Check a concrete argument against every constraint.
    ///
    /// Constraint types may mention generic parameters of the owner, so each is passed
    /// through `substitute` before the assignability check.
    ///
    /// # Errors
    /// Returns [`Error::ConstraintViolation`] naming the first violated constraint.
    pub fn check<F>(&self, arg: &CilTypeRc, substitute: F) -> Result<()>
    where
        F: Fn(&CilTypeRc) -> Result<CilTypeRc>,
    {
        let violation = |reason: &str| Error::ConstraintViolation {
            parameter: self.name.clone(),
            argument: arg.fullname(),
            reason: reason.to_string(),
        };

        let special = self.special_constraints();
        if special & GenericParamAttributes::REFERENCE_TYPE_CONSTRAINT != 0 && arg.is_value_type() {
            return Err(violation("must be a reference type"));
        }

        if special & GenericParamAttributes::NOT_NULLABLE_VALUE_TYPE_CONSTRAINT != 0
            && (!arg.is_value_type() || arg.is_nullable())
        {
            return Err(violation("must be a non-nullable value type"));
        }

        if special & GenericParamAttributes::DEFAULT_CONSTRUCTOR_CONSTRAINT != 0
            && !arg.is_value_type()
        {
            let constructible = !arg.is_abstract()
                && !arg.is_interface()
                && arg
                    .member_owner()
                    .constructors()
                    .iter()
                    .any(|ctor| ctor.is_public() && ctor.param_count() == 0);
            if !constructible {
                return Err(violation("must have a public parameterless constructor"));
            }
        }

        for constraint in self.constraint_types() {
            let constraint = substitute(&constraint)?;
            if !arg.is_assignable_to(&constraint) {
                return Err(violation(&format!(
                    "must derive from or implement '{}'",
                    constraint.fullname()
                )));
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for GenericParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericParam")
            .field("number", &self.number)
            .field("name", &self.name)
            .field("flags", &format_args!("0x{:04x}", self.flags))
            .field("owner_is_method", &self.owner_is_method)
            .field("constraints", &self.constraints.count())
            .finish()
    }
}
