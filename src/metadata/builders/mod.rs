//! Reflection-style builders for describing types.
//!
//! Source contracts (interfaces), host implementations (classes whose methods are Rust
//! closures), enums and the core library are all declared through these builders.
//! Each builder collects its description fluently and declares the type into a
//! [`TypeRegistry`] in one `build` call, which either registers a complete type or
//! fails without registering anything under the type's name.
//!
//! # Key Types
//! - [`InterfaceBuilder`] - Interfaces with methods, properties and generic parameters
//! - [`ClassBuilder`] - Classes and value types with fields, constructors and host methods
//! - [`EnumBuilder`] - Enums with an underlying primitive type
//! - [`MethodBuilder`], [`ParamSpec`], [`GenericParamSpec`] - Member descriptions

mod class;
mod enums;
mod interface;
mod method;

pub use class::ClassBuilder;
pub use enums::EnumBuilder;
pub use interface::InterfaceBuilder;
pub use method::{GenericParamSpec, MethodBuilder, ParamSpec};

pub(crate) use method::declare_generic_params;

use std::sync::Arc;

use crate::{
    metadata::{
        customattributes::CustomAttributeValue,
        method::MethodModifiers,
        tables::Property,
        token::TableId,
        typesystem::{CilFlavor, CilType, CilTypeRc, CilTypeRef, TypeAttributes, TypeRegistry},
    },
    Result,
};

/// A property with optional accessor builders
#[derive(Clone)]
pub(crate) struct PropertySpec {
    name: String,
    ty: CilTypeRc,
    getter: Option<MethodBuilder>,
    setter: Option<MethodBuilder>,
}

impl PropertySpec {
    pub(crate) fn new(
        name: impl Into<String>,
        ty: &CilTypeRc,
        getter: Option<MethodBuilder>,
        setter: Option<MethodBuilder>,
    ) -> Self {
        PropertySpec {
            name: name.into(),
            ty: ty.clone(),
            getter,
            setter,
        }
    }

    /// Transform both accessor builders
    pub(crate) fn map_accessors(mut self, f: impl Fn(MethodBuilder) -> MethodBuilder) -> Self {
        self.getter = self.getter.map(&f);
        self.setter = self.setter.map(&f);
        self
    }

    /// Declare the accessors and the property on `declaring`
    pub(crate) fn build(self, registry: &TypeRegistry, declaring: &CilTypeRc) -> Result<()> {
        let property = Arc::new(Property::new(
            registry.alloc_token(TableId::Property),
            self.name,
            0,
            &self.ty,
        ));

        if let Some(getter) = self.getter {
            let getter = getter
                .add_flags(MethodModifiers::SPECIAL_NAME.bits())
                .build(registry, declaring)?;
            property.set_getter(getter)?;
        }
        if let Some(setter) = self.setter {
            let setter = setter
                .add_flags(MethodModifiers::SPECIAL_NAME.bits())
                .build(registry, declaring)?;
            property.set_setter(setter)?;
        }

        declaring.properties.push(property);
        Ok(())
    }
}

/// Shared type skeleton of all builders
#[derive(Clone)]
pub(crate) struct TypeSpecification {
    namespace: String,
    name: String,
    flags: TypeAttributes,
    declaring: Option<CilTypeRc>,
    generic_params: Vec<GenericParamSpec>,
    interfaces: Vec<CilTypeRc>,
    custom_attributes: Vec<CustomAttributeValue>,
}

impl TypeSpecification {
    pub(crate) fn new(namespace: &str, name: &str, flags: TypeAttributes) -> Self {
        TypeSpecification {
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags,
            declaring: None,
            generic_params: Vec::new(),
            interfaces: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }

    /// Create the type with its generic parameters, interfaces and attributes, not yet registered
    pub(crate) fn declare(
        &self,
        registry: &TypeRegistry,
        flavor: CilFlavor,
        base: Option<&CilTypeRc>,
    ) -> Result<CilTypeRc> {
        let namespace = if self.declaring.is_some() {
            String::new()
        } else {
            self.namespace.clone()
        };

        let declared = Arc::new(CilType::new(
            registry.alloc_token(TableId::TypeDef),
            flavor,
            namespace,
            self.name.clone(),
            self.flags,
        ));

        if let Some(declaring) = &self.declaring {
            declared.set_declaring_type(declaring)?;
        }
        if let Some(base) = base {
            declared.set_base(base)?;
        }
        declare_generic_params(registry, &declared.generic_params, &self.generic_params, false);
        for iface in &self.interfaces {
            declared.interfaces.push(CilTypeRef::new(iface));
        }
        for attribute in &self.custom_attributes {
            declared.custom_attributes.push(Arc::new(attribute.clone()));
        }

        Ok(declared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::tables::{DefaultValue, ParamAttributes},
        metadata::typesystem::CilPrimitiveData,
        Error,
    };

    #[test]
    fn test_interface_property_accessors() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let string = registry.wellknown("System.String")?;
        let named = InterfaceBuilder::new("Demo", "INamed")
            .property("Name", &string, true, true)
            .property("Id", &string, true, false)
            .build(&registry)?;

        assert!(named.is_interface());
        assert!(named.is_abstract());
        assert_eq!(named.properties.count(), 2);
        assert_eq!(named.methods.count(), 3);

        let name = named.properties.get(0).unwrap();
        assert!(name.is_fully_defined());
        let getter = name.getter().unwrap();
        assert_eq!(getter.name, "get_Name");
        assert!(getter.is_abstract());
        assert_eq!(name.setter().unwrap().param_count(), 1);
        Ok(())
    }

    #[test]
    fn test_nested_visibility() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let outer = ClassBuilder::new("Demo", "Outer").build(&registry)?;
        let inner = InterfaceBuilder::new("Demo", "IInner")
            .nested_in(&outer)
            .build(&registry)?;
        let hidden = InterfaceBuilder::new("Demo", "IHidden")
            .nested_in(&outer)
            .visibility(TypeAttributes::NESTED_PRIVATE)
            .build(&registry)?;

        assert_eq!(inner.fullname(), "Demo.Outer+IInner");
        assert!(inner.is_visible());
        assert!(!hidden.is_visible());
        Ok(())
    }

    #[test]
    fn test_class_defaults() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let int32 = registry.wellknown("System.Int32")?;
        let counter = ClassBuilder::new("Demo", "Counter")
            .field("count", &int32)
            .build(&registry)?;

        assert_eq!(counter.base().unwrap().fullname(), "System.Object");
        assert_eq!(counter.constructors().len(), 1);
        assert!(counter.field_by_name("count").is_some());
        assert!(!counter.is_value_type());
        Ok(())
    }

    #[test]
    fn test_optional_parameter() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let int32 = registry.wellknown("System.Int32")?;
        let paged = InterfaceBuilder::new("Demo", "IPaged")
            .method(
                MethodBuilder::new("Page").param_spec(
                    ParamSpec::new("size", &int32)
                        .optional(&DefaultValue::Value(CilPrimitiveData::I4(20))),
                ),
            )
            .build(&registry)?;

        let param = paged.method_by_name("Page").unwrap().parameters()[0].clone();
        assert!(param.is_optional());
        assert_ne!(param.attributes() & ParamAttributes::HAS_DEFAULT, 0);
        assert_eq!(
            param.read_default()?,
            DefaultValue::Value(CilPrimitiveData::I4(20))
        );
        Ok(())
    }

    #[test]
    fn test_enum_underlying() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let level = EnumBuilder::new("Demo", "Level")
            .underlying(CilFlavor::U1)
            .variant("Low", 0)
            .variant("High", 200)
            .build(&registry)?;

        assert!(level.is_enum());
        assert!(level.is_value_type());
        assert_eq!(level.enum_underlying().unwrap().fullname(), "System.Byte");

        let overflow = EnumBuilder::new("Demo", "Broken")
            .underlying(CilFlavor::U1)
            .variant("Big", 300)
            .build(&registry);
        assert!(matches!(overflow, Err(Error::TypeConversionInvalid { .. })));
        Ok(())
    }
}
