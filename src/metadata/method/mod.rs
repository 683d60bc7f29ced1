//! Methods: signatures, flags, parameters and implementations.
//!
//! A [`Method`] is either implemented by a CIL [`MethodBody`] (everything the proxy
//! synthesizer emits) or by a [`HostMethod`] closure (core library members and the
//! host-side implementations and interception handlers that proxies delegate to).
//! Abstract methods have no implementation.
//!
//! # Key Types
//! - [`Method`] - Method definition with its parameters and generic parameters
//! - [`MethodImplementation`] - CIL body or host closure
//! - [`MethodImpl`] - Explicit override of an interface or base method
//! - [`MethodBody`] - Body header and code

mod body;
mod types;

pub use body::MethodBody;
pub use types::*;

use std::sync::{Arc, OnceLock};

use crate::{
    emulation::{EmValue, Invocation, Runtime},
    metadata::{
        customattributes::CustomAttributeValueList,
        tables::{GenericParamList, ParamList, ParamRc},
        token::Token,
        typesystem::{CilTypeRc, CilTypeRef},
    },
    Result,
};

/// A reference to a `Method`
pub type MethodRc = Arc<Method>;
/// A vector that holds a list of `Method`
pub type MethodList = Arc<boxcar::Vec<MethodRc>>;
/// A vector that holds explicit overrides
pub type MethodImplList = Arc<boxcar::Vec<MethodImpl>>;

/// A method implemented by host code.
///
/// Receives the executing [`Runtime`] and the [`Invocation`] (receiver, arguments and
/// generic context) and returns the result, [`EmValue::Void`] for void methods.
pub type HostMethod = Arc<dyn Fn(&Runtime, &Invocation) -> Result<EmValue> + Send + Sync>;

/// How a method is executed
#[derive(Clone)]
pub enum MethodImplementation {
    /// Emitted CIL
    Il(Arc<MethodBody>),
    /// Host closure
    Host(HostMethod),
}

/// An explicit override: `body` implements `declaration`
#[derive(Clone)]
pub struct MethodImpl {
    /// The implementing method, declared on the overriding type
    pub body: MethodRc,
    /// The interface or base method that is overridden
    pub declaration: MethodRc,
}

/// A method definition.
pub struct Method {
    /// Token
    pub token: Token,
    /// Name, `.ctor` for constructors
    pub name: String,
    /// Access flags
    pub flags_access: MethodAccessFlags,
    /// Vtable layout flags
    pub flags_vtable: MethodVtableFlags,
    /// Modifier flags
    pub flags_modifiers: MethodModifiers,
    /// Parameters in sequence order, including the return parameter (sequence 0) if declared
    pub params: ParamList,
    /// Generic parameters of generic methods
    pub generic_params: GenericParamList,
    /// Custom attributes applied to the method
    pub custom_attributes: CustomAttributeValueList,
    return_type: CilTypeRef,
    declaring_type: OnceLock<CilTypeRef>,
    implementation: OnceLock<MethodImplementation>,
}

impl Method {
    /// Create a method from raw `MethodAttributes` flags
    #[must_use]
    pub fn new(token: Token, name: impl Into<String>, flags: u32, return_type: &CilTypeRc) -> Self {
        Method {
            token,
            name: name.into(),
            flags_access: MethodAccessFlags::from_method_flags(flags),
            flags_vtable: MethodVtableFlags::from_method_flags(flags),
            flags_modifiers: MethodModifiers::from_method_flags(flags),
            params: Arc::new(boxcar::Vec::new()),
            generic_params: Arc::new(boxcar::Vec::new()),
            custom_attributes: Arc::new(boxcar::Vec::new()),
            return_type: CilTypeRef::new(return_type),
            declaring_type: OnceLock::new(),
            implementation: OnceLock::new(),
        }
    }

    /// Raw `MethodAttributes` flags
    #[must_use]
    pub fn attributes(&self) -> u32 {
        self.flags_access.bits() | self.flags_vtable.bits() | self.flags_modifiers.bits()
    }

    /// Calling convention derived from the flags and the generic parameter list
    #[must_use]
    pub fn calling_convention(&self) -> CallingConvention {
        let mut convention = if self.is_static() {
            CallingConvention::DEFAULT
        } else {
            CallingConvention::HAS_THIS
        };
        if self.is_generic() {
            convention |= CallingConvention::GENERIC;
        }

        convention
    }

    /// Set the declaring type. Can only be set once.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the declaring type was already set.
    pub fn set_declaring_type(&self, declaring: &CilTypeRc) -> Result<()> {
        self.declaring_type
            .set(CilTypeRef::new(declaring))
            .map_err(|_| malformed_error!("Declaring type of '{}' is already set", self.name))
    }

    /// The type that declares this method
    #[must_use]
    pub fn declaring_type(&self) -> Option<CilTypeRc> {
        self.declaring_type.get().and_then(CilTypeRef::upgrade)
    }

    /// `Declaring.Type::Name`
    #[must_use]
    pub fn fullname(&self) -> String {
        match self.declaring_type() {
            Some(declaring) => format!("{}::{}", declaring.fullname(), self.name),
            None => self.name.clone(),
        }
    }

    /// Return type, `System.Void` for void methods
    #[must_use]
    pub fn return_type(&self) -> Option<CilTypeRc> {
        self.return_type.upgrade()
    }

    /// True if the return type is `System.Void`
    #[must_use]
    pub fn returns_void(&self) -> bool {
        self.return_type()
            .is_none_or(|ty| ty.flavor == crate::metadata::typesystem::CilFlavor::Void)
    }

    /// Declared parameters (sequence 1 and up), ordered by sequence
    #[must_use]
    pub fn parameters(&self) -> Vec<ParamRc> {
        let mut params: Vec<ParamRc> = self
            .params
            .iter()
            .map(|(_, param)| param.clone())
            .filter(|param| param.sequence > 0)
            .collect();
        params.sort_by_key(|param| param.sequence);
        params
    }

    /// Number of declared parameters, not counting the return parameter
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params
            .iter()
            .filter(|(_, param)| param.sequence > 0)
            .count()
    }

    /// Types of the declared parameters, in order
    #[must_use]
    pub fn param_types(&self) -> Vec<Option<CilTypeRc>> {
        self.parameters().iter().map(|param| param.ty()).collect()
    }

    /// The return parameter row (sequence 0), if one was declared
    #[must_use]
    pub fn return_parameter(&self) -> Option<ParamRc> {
        self.params
            .iter()
            .map(|(_, param)| param)
            .find(|param| param.sequence == 0)
            .cloned()
    }

    /// True for public methods
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.flags_access == MethodAccessFlags::PUBLIC
    }

    /// True for private methods
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.flags_access == MethodAccessFlags::PRIVATE
    }

    /// True for static methods
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags_modifiers.contains(MethodModifiers::STATIC)
    }

    /// True for virtual methods
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.flags_modifiers.contains(MethodModifiers::VIRTUAL)
    }

    /// True for abstract methods
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags_modifiers.contains(MethodModifiers::ABSTRACT)
    }

    /// True for methods that cannot be overridden
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.flags_modifiers.contains(MethodModifiers::FINAL)
    }

    /// True for instance constructors
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor"
    }

    /// True for methods declaring generic parameters
    #[must_use]
    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    /// Attach the implementation. Can only be set once.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the method is abstract or already implemented.
    pub fn set_implementation(&self, implementation: MethodImplementation) -> Result<()> {
        if self.is_abstract() {
            return Err(malformed_error!(
                "Abstract method '{}' cannot have an implementation",
                self.name
            ));
        }

        self.implementation
            .set(implementation)
            .map_err(|_| malformed_error!("Method '{}' is already implemented", self.name))
    }

    /// The implementation, if any
    #[must_use]
    pub fn implementation(&self) -> Option<&MethodImplementation> {
        self.implementation.get()
    }

    /// The CIL body, for methods implemented in CIL
    #[must_use]
    pub fn body(&self) -> Option<Arc<MethodBody>> {
        match self.implementation.get() {
            Some(MethodImplementation::Il(body)) => Some(body.clone()),
            _ => None,
        }
    }

    /// True if `self` can implement `declaration`: same name-independent shape.
    ///
    /// Parameter counts and generic arities must agree. Parameter and return types
    /// must be the same type, except where the declaration side uses a generic
    /// parameter placeholder, which is matched against any type.
    #[must_use]
    pub fn signature_matches(&self, declaration: &Method) -> bool {
        fn same(candidate: Option<CilTypeRc>, declared: Option<CilTypeRc>) -> bool {
            match (candidate, declared) {
                (Some(candidate), Some(declared)) => {
                    candidate.token == declared.token || declared.contains_generic_parameters()
                }
                _ => false,
            }
        }

        if self.param_count() != declaration.param_count()
            || self.generic_params.count() != declaration.generic_params.count()
            || self.is_static() != declaration.is_static()
        {
            return false;
        }

        same(self.return_type(), declaration.return_type())
            && self
                .param_types()
                .into_iter()
                .zip(declaration.param_types())
                .all(|(candidate, declared)| same(candidate, declared))
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("token", &self.token)
            .field("name", &self.fullname())
            .field("flags", &format_args!("0x{:04x}", self.attributes()))
            .field("params", &self.param_count())
            .field("generic_params", &self.generic_params.count())
            .finish()
    }
}
