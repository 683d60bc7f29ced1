//! Core library types every registry starts with.
//!
//! Declares the `System` types that signatures, constants and emitted bodies refer to,
//! the reflection entry points used by interception bodies, and the three support
//! types of synthesized proxies: the [`DYNAMIC_PROXY_FULLNAME`] handler base class, the
//! [`IPROXY_INSTANCE_FULLNAME`] marker and the [`DYNAMICALLY_ATTRIBUTE_FULLNAME`]
//! parameter attribute.
//!
//! `System.Object` and `System.Void` are bootstrapped by hand, since every builder
//! needs them. Everything else is declared through the regular builders.

use std::sync::Arc;

use crate::{
    emulation::EmValue,
    metadata::{
        builders::{ClassBuilder, GenericParamSpec, InterfaceBuilder, MethodBuilder},
        tables::GenericParamAttributes,
        token::TableId,
        typesystem::{CilFlavor, CilType, TypeAttributes, TypeRegistry, NULLABLE_FULLNAME},
    },
    Error, Result,
};

/// `System.Reflection.MethodBase`
pub const METHOD_BASE_FULLNAME: &str = "System.Reflection.MethodBase";
/// `System.Reflection.MethodInfo`
pub const METHOD_INFO_FULLNAME: &str = "System.Reflection.MethodInfo";
/// Base class of interception handlers
pub const DYNAMIC_PROXY_FULLNAME: &str = "CilProxy.DynamicProxy";
/// Marker interface of forwarding proxies
pub const IPROXY_INSTANCE_FULLNAME: &str = "CilProxy.IProxyInstance";
/// Marks constructor parameters added by synthesis
pub const DYNAMICALLY_ATTRIBUTE_FULLNAME: &str = "CilProxy.DynamicallyAttribute";

/// Primitive value types, `(name, flavor)`
const PRIMITIVES: &[(&str, CilFlavor)] = &[
    ("Boolean", CilFlavor::Boolean),
    ("Char", CilFlavor::Char),
    ("SByte", CilFlavor::I1),
    ("Byte", CilFlavor::U1),
    ("Int16", CilFlavor::I2),
    ("UInt16", CilFlavor::U2),
    ("Int32", CilFlavor::I4),
    ("UInt32", CilFlavor::U4),
    ("Int64", CilFlavor::I8),
    ("UInt64", CilFlavor::U8),
    ("Single", CilFlavor::R4),
    ("Double", CilFlavor::R8),
    ("IntPtr", CilFlavor::I),
    ("UIntPtr", CilFlavor::U),
];

/// Declare the core library into `registry`
pub(crate) fn install(registry: &TypeRegistry) -> Result<()> {
    let object = Arc::new(CilType::new(
        registry.alloc_token(TableId::TypeDef),
        CilFlavor::Object,
        "System".to_string(),
        "Object".to_string(),
        TypeAttributes::PUBLIC,
    ));
    registry.insert(&object)?;

    let void = Arc::new(CilType::new(
        registry.alloc_token(TableId::TypeDef),
        CilFlavor::Void,
        "System".to_string(),
        "Void".to_string(),
        TypeAttributes::PUBLIC | TypeAttributes::SEALED,
    ));
    registry.insert(&void)?;

    MethodBuilder::constructor()
        .host(|_, _| Ok(EmValue::Void))
        .build(registry, &object)?;

    let value_type = ClassBuilder::new("System", "ValueType")
        .abstract_type()
        .build(registry)?;
    void.set_base(&value_type)?;

    ClassBuilder::new("System", "Enum")
        .extends(&value_type)
        .abstract_type()
        .build(registry)?;

    for (name, flavor) in PRIMITIVES {
        ClassBuilder::new("System", name)
            .flavor(flavor.clone())
            .value_type()
            .build(registry)?;
    }

    ClassBuilder::new("System", "String")
        .flavor(CilFlavor::String)
        .sealed()
        .build(registry)?;

    for name in ["DateTime", "Decimal", "Guid", "RuntimeTypeHandle", "RuntimeMethodHandle"] {
        ClassBuilder::new("System", name).value_type().build(registry)?;
    }

    let nullable_name = NULLABLE_FULLNAME
        .strip_prefix("System.")
        .ok_or_else(|| malformed_error!("Unexpected name of Nullable"))?;
    ClassBuilder::new("System", nullable_name)
        .value_type()
        .generic_param(
            GenericParamSpec::new("T")
                .flags(GenericParamAttributes::NOT_NULLABLE_VALUE_TYPE_CONSTRAINT),
        )
        .build(registry)?;

    ClassBuilder::new("System", "Attribute")
        .abstract_type()
        .constructor(MethodBuilder::constructor())
        .build(registry)?;

    install_reflection(registry)?;
    install_proxy_support(registry)
}

/// `System.Type`, `MethodBase` and `MethodInfo` with their handle entry points
fn install_reflection(registry: &TypeRegistry) -> Result<()> {
    let object = registry.wellknown("System.Object")?;
    let string = registry.wellknown("System.String")?;
    let object_array = registry.make_array(&object)?;

    let type_handle = registry.wellknown("System.RuntimeTypeHandle")?;
    let system_type = ClassBuilder::new("System", "Type")
        .abstract_type()
        .build(registry)?;
    MethodBuilder::new("GetTypeFromHandle")
        .make_static()
        .param("handle", &type_handle)
        .returns(&system_type)
        .host(|runtime, call| runtime.type_from_handle(call.arg(0)?))
        .build(registry, &system_type)?;

    let method_handle = registry.wellknown("System.RuntimeMethodHandle")?;
    let method_base = ClassBuilder::new("System.Reflection", "MethodBase")
        .abstract_type()
        .constructor(MethodBuilder::constructor())
        .method(
            MethodBuilder::new("Invoke")
                .param("obj", &object)
                .param("parameters", &object_array)
                .returns(&object)
                .host(|runtime, call| runtime.invoke(call.this()?, call.arg(0)?, call.arg(1)?)),
        )
        .property(
            "Name",
            &string,
            Some(
                MethodBuilder::new("get_Name")
                    .returns(&string)
                    .host(|runtime, call| {
                        let info = call.this()?.object()?;
                        let method = info.method_info().ok_or_else(|| Error::InvalidCast {
                            from: info.ty.fullname(),
                            to: METHOD_INFO_FULLNAME.to_string(),
                        })?;
                        runtime.new_string(method.name())
                    }),
            ),
            None,
        )
        .build(registry)?;
    MethodBuilder::new("GetMethodFromHandle")
        .make_static()
        .param("handle", &method_handle)
        .returns(&method_base)
        .host(|runtime, call| runtime.method_info_from_handle(call.arg(0)?))
        .build(registry, &method_base)?;

    ClassBuilder::new("System.Reflection", "MethodInfo")
        .extends(&method_base)
        .abstract_type()
        .constructor(MethodBuilder::constructor())
        .build(registry)?;

    Ok(())
}

/// The interception handler base, the forwarding marker and the parameter attribute
fn install_proxy_support(registry: &TypeRegistry) -> Result<()> {
    let object = registry.wellknown("System.Object")?;
    let object_array = registry.make_array(&object)?;
    let method_info = registry.wellknown(METHOD_INFO_FULLNAME)?;

    ClassBuilder::new("CilProxy", "DynamicProxy")
        .abstract_type()
        .constructor(MethodBuilder::constructor())
        .method(
            MethodBuilder::new("Invoke")
                .param("instance", &object)
                .param("targetMethod", &method_info)
                .param("args", &object_array)
                .returns(&object)
                .make_abstract(),
        )
        .build(registry)?;

    InterfaceBuilder::new("CilProxy", "IProxyInstance")
        .method(MethodBuilder::new("GetOriginalInstance").returns(&object))
        .build(registry)?;

    ClassBuilder::new("CilProxy", "DynamicallyAttribute")
        .extends(&registry.wellknown("System.Attribute")?)
        .sealed()
        .build(registry)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_hierarchy() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let object = registry.wellknown("System.Object")?;
        let int32 = registry.wellknown("System.Int32")?;
        let value_type = registry.wellknown("System.ValueType")?;

        assert!(object.base().is_none());
        assert_eq!(int32.base().unwrap().token, value_type.token);
        assert!(int32.is_value_type());
        assert!(int32.is_assignable_to(&object));
        assert!(!registry.wellknown("System.String")?.is_value_type());
        assert_eq!(object.constructors().len(), 1);
        Ok(())
    }

    #[test]
    fn test_primitive_lookup() -> Result<()> {
        let registry = TypeRegistry::new()?;
        for (name, flavor) in PRIMITIVES {
            let ty = registry.primitive(flavor)?;
            assert_eq!(ty.fullname(), format!("System.{name}"));
            assert_eq!(&ty.flavor, flavor);
        }
        Ok(())
    }

    #[test]
    fn test_proxy_support_types() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let handler = registry.wellknown(DYNAMIC_PROXY_FULLNAME)?;
        let invoke = handler.method_by_name("Invoke").unwrap();
        assert!(handler.is_abstract());
        assert!(invoke.is_abstract());
        assert_eq!(invoke.param_count(), 3);

        let marker = registry.wellknown(IPROXY_INSTANCE_FULLNAME)?;
        assert!(marker.is_interface());

        let attribute = registry.wellknown(DYNAMICALLY_ATTRIBUTE_FULLNAME)?;
        assert_eq!(attribute.constructors().len(), 1);
        let attribute_base = registry.wellknown("System.Attribute")?;
        assert!(attribute.is_assignable_to(&attribute_base));

        let method_info = registry.wellknown(METHOD_INFO_FULLNAME)?;
        let method_base = registry.wellknown(METHOD_BASE_FULLNAME)?;
        assert!(method_info.is_assignable_to(&method_base));
        Ok(())
    }
}
