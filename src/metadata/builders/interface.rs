use crate::{
    metadata::{
        builders::{GenericParamSpec, MethodBuilder, PropertySpec, TypeSpecification},
        customattributes::CustomAttributeValue,
        typesystem::{CilFlavor, CilTypeRc, TypeAttributes, TypeRegistry},
    },
    Result,
};

/// Builder for interface descriptions.
///
/// Every method added is declared `abstract virtual newslot`, property accessors
/// additionally `specialname`.
///
/// # Examples
///
/// ```rust
/// use cilproxy::metadata::{builders::{InterfaceBuilder, MethodBuilder}, typesystem::TypeRegistry};
///
/// let registry = TypeRegistry::new()?;
/// let int32 = registry.wellknown("System.Int32")?;
///
/// let a = InterfaceBuilder::new("Demo", "IA")
///     .method(MethodBuilder::new("Run").returns(&int32))
///     .build(&registry)?;
/// let b = InterfaceBuilder::new("Demo", "IB").extends(&a).build(&registry)?;
///
/// assert_eq!(b.all_interfaces().len(), 1);
/// # Ok::<(), cilproxy::Error>(())
/// ```
pub struct InterfaceBuilder {
    spec: TypeSpecification,
    methods: Vec<MethodBuilder>,
    properties: Vec<PropertySpec>,
}

impl InterfaceBuilder {
    /// A public top-level interface
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        InterfaceBuilder {
            spec: TypeSpecification::new(
                namespace,
                name,
                TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
            ),
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Replace the visibility bits
    #[must_use]
    pub fn visibility(mut self, visibility: TypeAttributes) -> Self {
        self.spec.flags = self.spec.flags.with_visibility(visibility);
        self
    }

    /// Nest the interface in `declaring`, nested-public unless changed afterwards
    #[must_use]
    pub fn nested_in(mut self, declaring: &CilTypeRc) -> Self {
        self.spec.declaring = Some(declaring.clone());
        self.visibility(TypeAttributes::NESTED_PUBLIC)
    }

    /// Append a generic parameter
    #[must_use]
    pub fn generic_param(mut self, spec: GenericParamSpec) -> Self {
        self.spec.generic_params.push(spec);
        self
    }

    /// Inherit another interface
    #[must_use]
    pub fn extends(mut self, iface: &CilTypeRc) -> Self {
        self.spec.interfaces.push(iface.clone());
        self
    }

    /// Declare a method
    #[must_use]
    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    /// Declare a property with an optional getter `get_{name}` and setter `set_{name}`
    #[must_use]
    pub fn property(mut self, name: &str, ty: &CilTypeRc, getter: bool, setter: bool) -> Self {
        let get = getter.then(|| MethodBuilder::new(format!("get_{name}")).returns(ty));
        let set = setter.then(|| MethodBuilder::new(format!("set_{name}")).param("value", ty));
        self.properties.push(PropertySpec::new(name, ty, get, set));
        self
    }

    /// Apply a custom attribute
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttributeValue) -> Self {
        self.spec.custom_attributes.push(attribute);
        self
    }

    /// Declare and register the interface.
    ///
    /// # Errors
    /// Returns an error if a member cannot be declared or the name is taken.
    pub fn build(self, registry: &TypeRegistry) -> Result<CilTypeRc> {
        let iface = self.spec.declare(registry, CilFlavor::Interface, None)?;

        for property in self.properties {
            property
                .map_accessors(MethodBuilder::make_abstract)
                .build(registry, &iface)?;
        }
        for method in self.methods {
            method.make_abstract().build(registry, &iface)?;
        }

        registry.insert(&iface)?;
        Ok(iface)
    }
}
