//! Integration tests for forwarding proxies.
//!
//! Every test describes a contract and a host implementation through the builders,
//! synthesizes the forwarding proxy and executes it with the embedded runtime.

use std::sync::{Arc, Mutex};

use cilproxy::prelude::*;

fn flyer(registry: &TypeRegistry) -> Result<(CilTypeRc, CilTypeRc)> {
    let string = registry.wellknown("System.String")?;
    let int32 = registry.wellknown("System.Int32")?;

    let flyer = InterfaceBuilder::new("Zoo", "IFlyer")
        .method(
            MethodBuilder::new("Fly")
                .param("message", &string)
                .returns(&int32),
        )
        .build(registry)?;
    let bird = ClassBuilder::new("Zoo", "Bird")
        .implements(&flyer)
        .method(
            MethodBuilder::new("Fly")
                .param("message", &string)
                .returns(&int32)
                .host(|_, _| Ok(EmValue::I32(5))),
        )
        .build(registry)?;

    Ok((flyer, bird))
}

/// A forwarding proxy around a `Bird` returns what the bird returns.
#[test]
fn test_flyer_forwarding_returns_five() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let (flyer, bird) = flyer(&registry)?;
    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());

    let proxy_type = generator.create_forwarding_proxy_type(&flyer, &bird)?;
    assert_eq!(proxy_type.fullname(), "DynamicProxy.Types.IFlyerProxy");
    assert!(proxy_type.is_assignable_to(&flyer));

    let runtime = generator.runtime();
    let backing = runtime.new_object(&bird, vec![])?;
    let proxy = runtime.new_object(&proxy_type, vec![backing])?;
    let fly = flyer.method_by_name("Fly").unwrap();

    let result = runtime.invoke_virtual(&proxy, &fly, vec![runtime.new_string("hello")?])?;
    assert_eq!(result.as_i32(), Some(5));
    Ok(())
}

/// Arguments reach the backing instance unchanged and in order.
#[test]
fn test_arguments_are_forwarded_unchanged() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let int32 = registry.wellknown("System.Int32")?;
    let int64 = registry.wellknown("System.Int64")?;

    let math = InterfaceBuilder::new("Calc", "IMath")
        .method(
            MethodBuilder::new("Sub")
                .param("a", &int32)
                .param("b", &int64)
                .returns(&int64),
        )
        .build(&registry)?;
    let calculator = ClassBuilder::new("Calc", "Calculator")
        .implements(&math)
        .method(
            MethodBuilder::new("Sub")
                .param("a", &int32)
                .param("b", &int64)
                .returns(&int64)
                .host(|_, call| {
                    let a = call.arg(0)?.as_i32().unwrap_or_default();
                    let b = call.arg(1)?.as_i64().unwrap_or_default();
                    Ok(EmValue::I64(i64::from(a) - b))
                }),
        )
        .build(&registry)?;

    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_forwarding_proxy_type(&math, &calculator)?;
    let runtime = generator.runtime();
    let proxy = runtime.new_object(&proxy_type, vec![runtime.new_object(&calculator, vec![])?])?;

    let sub = math.method_by_name("Sub").unwrap();
    let result = runtime.invoke_virtual(&proxy, &sub, vec![EmValue::I32(10), EmValue::I64(3)])?;
    assert_eq!(result.as_i64(), Some(7));
    Ok(())
}

/// A read/write property gets one getter and one setter, and round-trips a value.
#[test]
fn test_property_round_trip() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let string = registry.wellknown("System.String")?;
    let named = InterfaceBuilder::new("People", "INamed")
        .property("Name", &string, true, true)
        .build(&registry)?;

    let stored = Arc::new(Mutex::new(String::new()));
    let (read, write) = (stored.clone(), stored.clone());
    let person = ClassBuilder::new("People", "Person")
        .implements(&named)
        .property(
            "Name",
            &string,
            Some(
                MethodBuilder::new("get_Name")
                    .returns(&string)
                    .host(move |runtime, _| {
                        let value = read.lock().map_err(|_| Error::LockError)?.clone();
                        runtime.new_string(&value)
                    }),
            ),
            Some(
                MethodBuilder::new("set_Name")
                    .param("value", &string)
                    .host(move |runtime, call| {
                        let value = runtime.string_value(call.arg(0)?)?.unwrap_or_default();
                        *write.lock().map_err(|_| Error::LockError)? = value.to_string();
                        Ok(EmValue::Void)
                    }),
            ),
        )
        .build(&registry)?;

    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_forwarding_proxy_type(&named, &person)?;
    assert_eq!(proxy_type.properties.count(), 1);
    assert_eq!(proxy_type.methods_by_name("get_Name").len(), 1);
    assert_eq!(proxy_type.methods_by_name("set_Name").len(), 1);
    let property = proxy_type.properties.get(0).unwrap();
    assert!(property.getter().is_some() && property.setter().is_some());

    let runtime = generator.runtime();
    let proxy = runtime.new_object(&proxy_type, vec![runtime.new_object(&person, vec![])?])?;
    let interface_property = named.properties.get(0).unwrap();
    let setter = interface_property.setter().unwrap();
    let getter = interface_property.getter().unwrap();

    runtime.invoke_virtual(&proxy, &setter, vec![runtime.new_string("Ada")?])?;
    assert_eq!(*stored.lock().unwrap(), "Ada");
    let value = runtime.invoke_virtual(&proxy, &getter, vec![])?;
    assert_eq!(runtime.string_value(&value)?, Some("Ada"));
    Ok(())
}

/// A generic interface definition yields a generic proxy that works once instantiated.
#[test]
fn test_generic_interface_forwarding() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let int32 = registry.wellknown("System.Int32")?;
    let t = registry.generic_parameter(0, false)?;

    let repo = InterfaceBuilder::new("Data", "IRepo`1")
        .generic_param(GenericParamSpec::new("T"))
        .method(MethodBuilder::new("Get").returns(&t))
        .build(&registry)?;
    let open_repo = registry.make_generic_instance(&repo, &[t.clone()])?;
    let store = ClassBuilder::new("Data", "Store`1")
        .generic_param(GenericParamSpec::new("T"))
        .implements(&open_repo)
        .method(
            MethodBuilder::new("Get")
                .returns(&t)
                .host(|_, _| Ok(EmValue::I32(9))),
        )
        .build(&registry)?;

    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    let proxy_definition = generator.create_forwarding_proxy_type(&repo, &store)?;
    assert_eq!(proxy_definition.fullname(), "DynamicProxy.Types.IRepoProxy`1");
    assert!(proxy_definition.is_generic_definition());

    let runtime = generator.runtime();
    let proxy_type = registry.make_generic_instance(&proxy_definition, &[int32.clone()])?;
    let store_of_int = registry.make_generic_instance(&store, &[int32])?;
    let proxy = runtime.new_object(&proxy_type, vec![runtime.new_object(&store_of_int, vec![])?])?;

    let get = repo.method_by_name("Get").unwrap();
    assert_eq!(runtime.invoke_virtual(&proxy, &get, vec![])?.as_i32(), Some(9));

    // the open definition itself cannot be instantiated
    assert!(runtime.new_object(&proxy_definition, vec![EmValue::Null]).is_err());
    Ok(())
}

/// Forwarding proxies expose the instance they wrap; other objects do not.
#[test]
fn test_original_instance() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let (flyer, bird) = flyer(&registry)?;
    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_forwarding_proxy_type(&flyer, &bird)?;

    let runtime = generator.runtime();
    let backing = runtime.new_object(&bird, vec![])?;
    let proxy = runtime.new_object(&proxy_type, vec![backing.clone()])?;

    let original = runtime.original_instance(&proxy)?.unwrap();
    assert!(Arc::ptr_eq(original.object()?, backing.object()?));
    assert!(runtime.original_instance(&backing)?.is_none());
    Ok(())
}

/// A backing value that does not satisfy the interface is rejected at construction.
#[test]
fn test_argument_mismatch_at_instantiation() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let (flyer, bird) = flyer(&registry)?;
    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_forwarding_proxy_type(&flyer, &bird)?;
    let runtime = generator.runtime();

    let not_a_flyer = runtime.new_string("pebble")?;
    assert!(matches!(
        runtime.new_object(&proxy_type, vec![not_a_flyer]),
        Err(Error::ArgumentMismatch(_))
    ));
    assert!(matches!(
        runtime.new_object(&proxy_type, vec![EmValue::I32(1)]),
        Err(Error::ArgumentMismatch(_))
    ));
    assert!(matches!(
        runtime.new_object(&proxy_type, vec![]),
        Err(Error::ArgumentMismatch(_))
    ));
    Ok(())
}

/// Default values are copied, and defects are recovered with a diagnostic.
#[test]
fn test_default_values_follow_policy() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let int32 = registry.wellknown("System.Int32")?;
    let date = registry.wellknown("System.DateTime")?;

    let paged = InterfaceBuilder::new("Data", "IPaged")
        .method(
            MethodBuilder::new("Page")
                .param_spec(
                    ParamSpec::new("size", &int32)
                        .optional(&DefaultValue::Value(CilPrimitiveData::I4(20))),
                )
                .param_spec(
                    ParamSpec::new("since", &date)
                        .optional_constant(Constant::from_value(&CilPrimitiveData::I8(0))),
                ),
        )
        .build(&registry)?;
    let pager = ClassBuilder::new("Data", "Pager")
        .implements(&paged)
        .method(
            MethodBuilder::new("Page")
                .param("size", &int32)
                .param("since", &date)
                .host(|_, _| Ok(EmValue::Void)),
        )
        .build(&registry)?;

    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_forwarding_proxy_type(&paged, &pager)?;
    let params = proxy_type.method_by_name("Page").unwrap().parameters();

    assert_eq!(params[0].name.as_deref(), Some("size"));
    assert_eq!(
        params[0].read_default()?,
        DefaultValue::Value(CilPrimitiveData::I4(20))
    );
    // the DateTime constant reads as null, which a value type cannot store
    assert!(params[1].is_optional());
    assert_eq!(params[1].read_default()?, DefaultValue::Missing);
    assert!(!generator
        .diagnostics()
        .by_category(DiagnosticCategory::DefaultValue)
        .is_empty());

    // with replication disabled, nothing but the parameter shape is copied
    let minimal = ProxyGenerator::new(registry.clone(), SynthesisConfig::minimal());
    let proxy_type = minimal.create_forwarding_proxy_type(&paged, &pager)?;
    let params = proxy_type.method_by_name("Page").unwrap().parameters();
    assert_eq!(params.len(), 2);
    assert_eq!(params[0].read_default()?, DefaultValue::Missing);
    Ok(())
}
