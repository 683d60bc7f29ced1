use std::{collections::HashSet, sync::Arc};

use crate::{
    emulation::EmValue,
    metadata::{
        builders::{GenericParamSpec, MethodBuilder, PropertySpec, TypeSpecification},
        customattributes::CustomAttributeValue,
        method::{MethodModifiers, MethodVtableFlags},
        tables::{Field, FieldAttributes},
        token::TableId,
        typesystem::{CilFlavor, CilTypeRc, TypeAttributes, TypeRegistry},
    },
    Result,
};

struct FieldSpec {
    name: String,
    ty: CilTypeRc,
    flags: u32,
}

/// Builder for classes and value types.
///
/// Classes derive from `System.Object` unless told otherwise and receive a public
/// parameterless constructor if none is declared. Constructors without an
/// implementation are given an empty one. Public instance methods whose name matches
/// a method of an implemented interface are made `virtual final`, the shape an
/// implicit interface implementation has.
///
/// # Examples
///
/// ```rust
/// use cilproxy::{
///     emulation::EmValue,
///     metadata::{builders::{ClassBuilder, InterfaceBuilder, MethodBuilder}, typesystem::TypeRegistry},
/// };
///
/// let registry = TypeRegistry::new()?;
/// let int32 = registry.wellknown("System.Int32")?;
/// let counter = InterfaceBuilder::new("Demo", "ICounter")
///     .method(MethodBuilder::new("Next").returns(&int32))
///     .build(&registry)?;
///
/// let host = ClassBuilder::new("Demo", "Counter")
///     .implements(&counter)
///     .method(MethodBuilder::new("Next").returns(&int32).host(|_, _| Ok(EmValue::I32(1))))
///     .build(&registry)?;
///
/// let next = counter.method_by_name("Next").unwrap();
/// assert!(host.resolve_method(&next).is_some());
/// # Ok::<(), cilproxy::Error>(())
/// ```
pub struct ClassBuilder {
    spec: TypeSpecification,
    flavor: CilFlavor,
    base: Option<CilTypeRc>,
    root: bool,
    fields: Vec<FieldSpec>,
    constructors: Vec<MethodBuilder>,
    methods: Vec<MethodBuilder>,
    properties: Vec<PropertySpec>,
}

impl ClassBuilder {
    /// A public class deriving from `System.Object`
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        ClassBuilder {
            spec: TypeSpecification::new(namespace, name, TypeAttributes::PUBLIC),
            flavor: CilFlavor::Class,
            base: None,
            root: false,
            fields: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Override the flavor, used for core types such as `System.String`
    #[must_use]
    pub fn flavor(mut self, flavor: CilFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Declare a type without base type (`System.Object` itself)
    #[must_use]
    pub fn root(mut self) -> Self {
        self.root = true;
        self
    }

    /// Set the base type
    #[must_use]
    pub fn extends(mut self, base: &CilTypeRc) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Implement an interface
    #[must_use]
    pub fn implements(mut self, iface: &CilTypeRc) -> Self {
        self.spec.interfaces.push(iface.clone());
        self
    }

    /// Mark the type sealed
    #[must_use]
    pub fn sealed(mut self) -> Self {
        self.spec.flags |= TypeAttributes::SEALED;
        self
    }

    /// Mark the type abstract
    #[must_use]
    pub fn abstract_type(mut self) -> Self {
        self.spec.flags |= TypeAttributes::ABSTRACT;
        self
    }

    /// Make this a sealed value type deriving from `System.ValueType`
    #[must_use]
    pub fn value_type(mut self) -> Self {
        if !self.flavor.is_value_type() {
            self.flavor = CilFlavor::ValueType;
        }
        self.spec.flags |= TypeAttributes::SEALED;
        self
    }

    /// Declare a private instance field
    #[must_use]
    pub fn field(self, name: &str, ty: &CilTypeRc) -> Self {
        self.field_with_flags(name, ty, FieldAttributes::PRIVATE)
    }

    /// Declare a field with explicit `FieldAttributes`
    #[must_use]
    pub fn field_with_flags(mut self, name: &str, ty: &CilTypeRc, flags: u32) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            ty: ty.clone(),
            flags,
        });
        self
    }

    /// Declare a method
    #[must_use]
    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    /// Declare an instance constructor, see [`MethodBuilder::constructor`]
    #[must_use]
    pub fn constructor(mut self, constructor: MethodBuilder) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Declare a property with optional accessors, named `get_{name}`/`set_{name}` by convention
    #[must_use]
    pub fn property(
        mut self,
        name: &str,
        ty: &CilTypeRc,
        getter: Option<MethodBuilder>,
        setter: Option<MethodBuilder>,
    ) -> Self {
        self.properties.push(PropertySpec::new(name, ty, getter, setter));
        self
    }

    /// Append a generic parameter
    #[must_use]
    pub fn generic_param(mut self, spec: GenericParamSpec) -> Self {
        self.spec.generic_params.push(spec);
        self
    }

    /// Nest the type in `declaring`, nested-public unless changed afterwards
    #[must_use]
    pub fn nested_in(mut self, declaring: &CilTypeRc) -> Self {
        self.spec.declaring = Some(declaring.clone());
        self.visibility(TypeAttributes::NESTED_PUBLIC)
    }

    /// Replace the visibility bits
    #[must_use]
    pub fn visibility(mut self, visibility: TypeAttributes) -> Self {
        self.spec.flags = self.spec.flags.with_visibility(visibility);
        self
    }

    /// Apply a custom attribute
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttributeValue) -> Self {
        self.spec.custom_attributes.push(attribute);
        self
    }

    /// Declare and register the type.
    ///
    /// # Errors
    /// Returns an error if the base type is missing from the registry, a member cannot
    /// be declared, or the name is taken.
    pub fn build(self, registry: &TypeRegistry) -> Result<CilTypeRc> {
        let base = match (self.root, self.base) {
            (true, _) => None,
            (false, Some(base)) => Some(base),
            (false, None) if self.flavor.is_value_type() => {
                Some(registry.wellknown("System.ValueType")?)
            }
            (false, None) => Some(registry.wellknown("System.Object")?),
        };
        let class = self.spec.declare(registry, self.flavor, base.as_ref())?;

        for spec in self.fields {
            let field = Arc::new(Field::new(
                registry.alloc_token(TableId::Field),
                spec.name,
                spec.flags,
                &spec.ty,
            ));
            field.set_declaring_type(&class)?;
            class.fields.push(field);
        }

        let mut constructors = self.constructors;
        if constructors.is_empty() && !class.is_value_type() && !class.is_abstract() {
            constructors.push(MethodBuilder::constructor());
        }
        for constructor in constructors {
            let constructor = if constructor.has_implementation() {
                constructor
            } else {
                constructor.host(|_, _| Ok(EmValue::Void))
            };
            constructor.build(registry, &class)?;
        }

        let slots: HashSet<String> = class
            .all_interfaces()
            .iter()
            .flat_map(|iface| {
                iface
                    .member_owner()
                    .methods
                    .iter()
                    .map(|(_, method)| method.name.clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        let implicit = |method: MethodBuilder| {
            if slots.contains(&method.name) && method.is_public_instance() {
                method.add_flags(
                    MethodModifiers::VIRTUAL.bits()
                        | MethodModifiers::FINAL.bits()
                        | MethodVtableFlags::NEW_SLOT.bits(),
                )
            } else {
                method
            }
        };

        for property in self.properties {
            property.map_accessors(implicit).build(registry, &class)?;
        }
        for method in self.methods {
            implicit(method).build(registry, &class)?;
        }

        registry.insert(&class)?;
        Ok(class)
    }
}
