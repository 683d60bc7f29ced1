//! Fluent builders for methods, parameters and generic parameters.

use std::sync::Arc;

use crate::{
    emulation::{EmValue, Invocation, Runtime},
    metadata::{
        customattributes::CustomAttributeValue,
        method::{
            Method, MethodAccessFlags, MethodBody, MethodImplementation, MethodModifiers, MethodRc,
            MethodVtableFlags,
        },
        tables::{
            Constant, DefaultValue, GenericParam, GenericParamList, Param, ParamAttributes,
        },
        token::TableId,
        typesystem::{CilTypeRc, TypeRegistry},
    },
    Result,
};

/// Describes one parameter of a method under construction.
#[derive(Clone)]
pub struct ParamSpec {
    pub(crate) name: String,
    pub(crate) ty: CilTypeRc,
    pub(crate) flags: u32,
    pub(crate) default: Option<Constant>,
    pub(crate) custom_attributes: Vec<CustomAttributeValue>,
}

impl ParamSpec {
    /// A required parameter
    #[must_use]
    pub fn new(name: impl Into<String>, ty: &CilTypeRc) -> Self {
        ParamSpec {
            name: name.into(),
            ty: ty.clone(),
            flags: 0,
            default: None,
            custom_attributes: Vec::new(),
        }
    }

    /// Make the parameter optional with a default value
    #[must_use]
    pub fn optional(mut self, value: &DefaultValue) -> Self {
        self.flags |= ParamAttributes::OPTIONAL | ParamAttributes::HAS_DEFAULT;
        self.default = Constant::from_default(value);
        self
    }

    /// Make the parameter optional with a raw stored constant, which is not checked
    /// against the parameter type
    #[must_use]
    pub fn optional_constant(mut self, constant: Constant) -> Self {
        self.flags |= ParamAttributes::OPTIONAL | ParamAttributes::HAS_DEFAULT;
        self.default = Some(constant);
        self
    }

    /// Add `ParamAttributes` flags
    #[must_use]
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    /// Apply a custom attribute
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttributeValue) -> Self {
        self.custom_attributes.push(attribute);
        self
    }
}

/// Describes one generic parameter of a type or method under construction.
#[derive(Clone)]
pub struct GenericParamSpec {
    pub(crate) name: String,
    pub(crate) flags: u32,
    pub(crate) constraints: Vec<CilTypeRc>,
    pub(crate) custom_attributes: Vec<CustomAttributeValue>,
}

impl GenericParamSpec {
    /// An unconstrained, invariant generic parameter
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        GenericParamSpec {
            name: name.into(),
            flags: 0,
            constraints: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }

    /// Add `GenericParamAttributes` flags (variance and special constraints)
    #[must_use]
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    /// Add a base type or interface constraint
    #[must_use]
    pub fn constraint(mut self, constraint: &CilTypeRc) -> Self {
        self.constraints.push(constraint.clone());
        self
    }

    /// Apply a custom attribute
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttributeValue) -> Self {
        self.custom_attributes.push(attribute);
        self
    }
}

/// Declare `specs` as the generic parameter list of an owner
pub(crate) fn declare_generic_params(
    registry: &TypeRegistry,
    list: &GenericParamList,
    specs: &[GenericParamSpec],
    owner_is_method: bool,
) {
    for (number, spec) in specs.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let param = GenericParam::new(
            registry.alloc_token(TableId::GenericParam),
            number as u32,
            spec.name.clone(),
            spec.flags,
            owner_is_method,
        );
        for constraint in &spec.constraints {
            param.add_constraint(constraint);
        }
        for attribute in &spec.custom_attributes {
            param.custom_attributes.push(Arc::new(attribute.clone()));
        }

        list.push(Arc::new(param));
    }
}

/// Builder for a method declared on a type under construction.
///
/// # Examples
///
/// ```rust
/// use cilproxy::metadata::{builders::{InterfaceBuilder, MethodBuilder}, typesystem::TypeRegistry};
///
/// let registry = TypeRegistry::new()?;
/// let int32 = registry.wellknown("System.Int32")?;
/// let string = registry.wellknown("System.String")?;
///
/// let flyer = InterfaceBuilder::new("Demo", "IFlyer")
///     .method(MethodBuilder::new("Fly").param("message", &string).returns(&int32))
///     .build(&registry)?;
/// assert_eq!(flyer.method_by_name("Fly").unwrap().param_count(), 1);
/// # Ok::<(), cilproxy::Error>(())
/// ```
#[derive(Clone)]
pub struct MethodBuilder {
    pub(crate) name: String,
    flags: u32,
    return_type: Option<CilTypeRc>,
    params: Vec<ParamSpec>,
    generic_params: Vec<GenericParamSpec>,
    custom_attributes: Vec<CustomAttributeValue>,
    return_attributes: Vec<CustomAttributeValue>,
    implementation: Option<MethodImplementation>,
}

impl MethodBuilder {
    /// A public instance method returning `void`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        MethodBuilder {
            name: name.into(),
            flags: MethodAccessFlags::PUBLIC.bits() | MethodModifiers::HIDE_BY_SIG.bits(),
            return_type: None,
            params: Vec::new(),
            generic_params: Vec::new(),
            custom_attributes: Vec::new(),
            return_attributes: Vec::new(),
            implementation: None,
        }
    }

    /// A public instance constructor
    #[must_use]
    pub fn constructor() -> Self {
        let mut builder = MethodBuilder::new(".ctor");
        builder.flags |=
            MethodModifiers::SPECIAL_NAME.bits() | MethodModifiers::RTSPECIAL_NAME.bits();
        builder
    }

    /// Set the return type
    #[must_use]
    pub fn returns(mut self, ty: &CilTypeRc) -> Self {
        self.return_type = Some(ty.clone());
        self
    }

    /// Append a required parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: &CilTypeRc) -> Self {
        self.params.push(ParamSpec::new(name, ty));
        self
    }

    /// Append a fully described parameter
    #[must_use]
    pub fn param_spec(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Append a generic parameter
    #[must_use]
    pub fn generic_param(mut self, spec: GenericParamSpec) -> Self {
        self.generic_params.push(spec);
        self
    }

    /// Replace the raw `MethodAttributes` flags
    #[must_use]
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Add raw `MethodAttributes` flags
    #[must_use]
    pub fn add_flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    /// Make the method static
    #[must_use]
    pub fn make_static(self) -> Self {
        self.add_flags(MethodModifiers::STATIC.bits())
    }

    /// Make the method virtual in a new slot
    #[must_use]
    pub fn make_virtual(self) -> Self {
        self.add_flags(MethodModifiers::VIRTUAL.bits() | MethodVtableFlags::NEW_SLOT.bits())
    }

    /// Make the method abstract, which implies virtual
    #[must_use]
    pub fn make_abstract(self) -> Self {
        self.make_virtual().add_flags(MethodModifiers::ABSTRACT.bits())
    }

    /// Apply a custom attribute to the method
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttributeValue) -> Self {
        self.custom_attributes.push(attribute);
        self
    }

    /// Apply a custom attribute to the return parameter
    #[must_use]
    pub fn return_attribute(mut self, attribute: CustomAttributeValue) -> Self {
        self.return_attributes.push(attribute);
        self
    }

    /// Implement the method with a host closure
    #[must_use]
    pub fn host<F>(mut self, implementation: F) -> Self
    where
        F: Fn(&Runtime, &Invocation) -> Result<EmValue> + Send + Sync + 'static,
    {
        self.implementation = Some(MethodImplementation::Host(Arc::new(implementation)));
        self
    }

    /// Implement the method with a CIL body
    #[must_use]
    pub fn body(mut self, body: MethodBody) -> Self {
        self.implementation = Some(MethodImplementation::Il(Arc::new(body)));
        self
    }

    pub(crate) fn has_implementation(&self) -> bool {
        self.implementation.is_some()
    }

    /// True if the flags describe a public, non-static, non-virtual method
    pub(crate) fn is_public_instance(&self) -> bool {
        let access = MethodAccessFlags::from_method_flags(self.flags);
        let modifiers = MethodModifiers::from_method_flags(self.flags);
        access == MethodAccessFlags::PUBLIC
            && !modifiers.intersects(MethodModifiers::STATIC | MethodModifiers::VIRTUAL)
    }

    /// Declare the method on `declaring` and register it.
    ///
    /// # Errors
    /// Returns an error if a parameter type or default cannot be attached, or if an
    /// abstract method is given an implementation.
    pub fn build(self, registry: &TypeRegistry, declaring: &CilTypeRc) -> Result<MethodRc> {
        let return_type = match &self.return_type {
            Some(ty) => ty.clone(),
            None => registry.wellknown("System.Void")?,
        };

        let method = Arc::new(Method::new(
            registry.alloc_token(TableId::MethodDef),
            self.name,
            self.flags,
            &return_type,
        ));
        method.set_declaring_type(declaring)?;

        declare_generic_params(registry, &method.generic_params, &self.generic_params, true);

        if !self.return_attributes.is_empty() {
            let param = Param::new(registry.alloc_token(TableId::Param), 0, None, 0);
            param.set_type(&return_type)?;
            for attribute in self.return_attributes {
                param.custom_attributes.push(Arc::new(attribute));
            }
            method.params.push(Arc::new(param));
        }

        for (index, spec) in self.params.into_iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let param = Param::new(
                registry.alloc_token(TableId::Param),
                index as u32 + 1,
                Some(spec.name),
                spec.flags,
            );
            param.set_type(&spec.ty)?;
            if let Some(constant) = spec.default {
                param
                    .default
                    .set(constant)
                    .map_err(|_| malformed_error!("Default value already set for param"))?;
            }
            for attribute in spec.custom_attributes {
                param.custom_attributes.push(Arc::new(attribute));
            }
            method.params.push(Arc::new(param));
        }

        for attribute in self.custom_attributes {
            method.custom_attributes.push(Arc::new(attribute));
        }

        if let Some(implementation) = self.implementation {
            method.set_implementation(implementation)?;
        }

        declaring.methods.push(method.clone());
        registry.register_method(&method);
        Ok(method)
    }
}
