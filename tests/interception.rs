//! Integration tests for interception proxies.

use std::sync::{Arc, Mutex};

use cilproxy::{
    metadata::typesystem::{DYNAMIC_PROXY_FULLNAME, METHOD_INFO_FULLNAME},
    prelude::*,
};

/// What the recording handler observed, one entry per call
#[derive(Debug, Default)]
struct Recorded {
    methods: Vec<String>,
    args: Vec<Vec<String>>,
    instances: Vec<String>,
}

/// A `DynamicProxy` subclass whose `Invoke` records the call and answers `result`
fn recording_handler(
    registry: &TypeRegistry,
    name: &str,
    recorded: Arc<Mutex<Recorded>>,
    result: Option<i32>,
) -> Result<CilTypeRc> {
    let object = registry.wellknown("System.Object")?;
    let int32 = registry.wellknown("System.Int32")?;
    let method_info = registry.wellknown(METHOD_INFO_FULLNAME)?;
    let object_array = registry.make_array(&object)?;

    ClassBuilder::new("Handlers", name)
        .extends(&registry.wellknown(DYNAMIC_PROXY_FULLNAME)?)
        .method(
            MethodBuilder::new("Invoke")
                .param("instance", &object)
                .param("targetMethod", &method_info)
                .param("args", &object_array)
                .returns(&object)
                .make_virtual()
                .host(move |runtime, call| {
                    let method = call
                        .arg(1)?
                        .object()?
                        .method_info()
                        .map(|method| method.name().to_string())
                        .unwrap_or_default();
                    let args = runtime
                        .array_items(call.arg(2)?)?
                        .iter()
                        .map(|item| {
                            Ok(runtime.string_value(item)?.unwrap_or_default().to_string())
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let instance = runtime
                        .string_value(call.arg(0)?)?
                        .unwrap_or_default()
                        .to_string();

                    let mut recorded = recorded.lock().map_err(|_| Error::LockError)?;
                    recorded.methods.push(method);
                    recorded.args.push(args);
                    recorded.instances.push(instance);

                    match result {
                        Some(value) => runtime.box_value(EmValue::I32(value), &int32),
                        None => Ok(EmValue::Null),
                    }
                }),
        )
        .build(registry)
}

/// `int Fly(string message)` and `void Land(string where)`
fn flyer(registry: &TypeRegistry) -> Result<CilTypeRc> {
    let string = registry.wellknown("System.String")?;
    let int32 = registry.wellknown("System.Int32")?;

    InterfaceBuilder::new("Zoo", "IFlyer")
        .method(
            MethodBuilder::new("Fly")
                .param("message", &string)
                .returns(&int32),
        )
        .method(MethodBuilder::new("Land").param("where", &string))
        .build(registry)
}

/// The handler sees the called method, the arguments and the instance; its result is
/// unboxed to the declared return type.
#[test]
fn test_handler_receives_call() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let flyer = flyer(&registry)?;
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let handler = recording_handler(&registry, "Recorder", recorded.clone(), Some(6))?;

    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_interception_proxy_type(&flyer, &handler)?;
    assert!(proxy_type.is_assignable_to(&flyer));
    assert!(proxy_type.is_assignable_to(&handler));
    assert!(proxy_type.is_sealed());

    let runtime = generator.runtime();
    let proxy = runtime.new_object(&proxy_type, vec![runtime.new_string("target")?])?;
    let fly = flyer.method_by_name("Fly").unwrap();
    let result = runtime.invoke_virtual(&proxy, &fly, vec![runtime.new_string("hello")?])?;
    assert_eq!(result.as_i32(), Some(6));

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.methods, vec!["Fly".to_string()]);
    assert_eq!(recorded.args, vec![vec!["hello".to_string()]]);
    assert_eq!(recorded.instances, vec!["target".to_string()]);
    Ok(())
}

/// Value type arguments arrive boxed.
#[test]
fn test_value_arguments_are_boxed() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let int32 = registry.wellknown("System.Int32")?;
    let math = InterfaceBuilder::new("Calc", "IMath")
        .method(
            MethodBuilder::new("Add")
                .param("a", &int32)
                .param("b", &int32)
                .returns(&int32),
        )
        .build(&registry)?;

    let object = registry.wellknown("System.Object")?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    let handler = ClassBuilder::new("Handlers", "Adder")
        .extends(&registry.wellknown(DYNAMIC_PROXY_FULLNAME)?)
        .method(
            MethodBuilder::new("Invoke")
                .param("instance", &object)
                .param("targetMethod", &registry.wellknown(METHOD_INFO_FULLNAME)?)
                .param("args", &registry.make_array(&object)?)
                .returns(&object)
                .make_virtual()
                .host(move |runtime, call| {
                    let int32 = runtime.registry().wellknown("System.Int32")?;
                    let mut sum = 0;
                    for item in runtime.array_items(call.arg(2)?)? {
                        record
                            .lock()
                            .map_err(|_| Error::LockError)?
                            .push(item.type_name());
                        sum += runtime.unbox(&item, &int32)?.as_i32().unwrap_or_default();
                    }
                    runtime.box_value(EmValue::I32(sum), &int32)
                }),
        )
        .build(&registry)?;

    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_interception_proxy_type(&math, &handler)?;
    let runtime = generator.runtime();
    let proxy = runtime.new_object(&proxy_type, vec![EmValue::Null])?;

    let add = math.method_by_name("Add").unwrap();
    let result = runtime.invoke_virtual(&proxy, &add, vec![EmValue::I32(2), EmValue::I32(3)])?;
    assert_eq!(result.as_i32(), Some(5));
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["System.Int32".to_string(), "System.Int32".to_string()]
    );
    Ok(())
}

/// For void members the handler's result is discarded.
#[test]
fn test_void_member_discards_result() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let flyer = flyer(&registry)?;
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let handler = recording_handler(&registry, "Silent", recorded.clone(), None)?;

    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_interception_proxy_type(&flyer, &handler)?;
    let runtime = generator.runtime();
    let proxy = runtime.new_object(&proxy_type, vec![runtime.new_string("target")?])?;

    let land = flyer.method_by_name("Land").unwrap();
    let result = runtime.invoke_virtual(&proxy, &land, vec![runtime.new_string("field")?])?;
    assert!(matches!(result, EmValue::Void));
    assert_eq!(recorded.lock().unwrap().methods, vec!["Land".to_string()]);
    Ok(())
}

/// Generic methods pass the closed instantiation to the handler, and the result is
/// unboxed to the method's type argument.
#[test]
fn test_generic_method_sees_closed_instantiation() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let t = registry.generic_parameter(0, true)?;
    let echo = InterfaceBuilder::new("Demo", "IEcho")
        .method(
            MethodBuilder::new("Echo")
                .generic_param(GenericParamSpec::new("T"))
                .param("value", &t)
                .returns(&t),
        )
        .build(&registry)?;

    let object = registry.wellknown("System.Object")?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    let handler = ClassBuilder::new("Handlers", "Mirror")
        .extends(&registry.wellknown(DYNAMIC_PROXY_FULLNAME)?)
        .method(
            MethodBuilder::new("Invoke")
                .param("instance", &object)
                .param("targetMethod", &registry.wellknown(METHOD_INFO_FULLNAME)?)
                .param("args", &registry.make_array(&object)?)
                .returns(&object)
                .make_virtual()
                .host(move |runtime, call| {
                    let method = call
                        .arg(1)?
                        .object()?
                        .method_info()
                        .map(|method| format!("{method:?}"))
                        .unwrap_or_default();
                    record.lock().map_err(|_| Error::LockError)?.push(method);
                    let items = runtime.array_items(call.arg(2)?)?;
                    Ok(items.into_iter().next().unwrap_or(EmValue::Null))
                }),
        )
        .build(&registry)?;

    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_interception_proxy_type(&echo, &handler)?;
    assert!(proxy_type.method_by_name("Echo").unwrap().is_generic());

    let runtime = generator.runtime();
    let proxy = runtime.new_object(&proxy_type, vec![EmValue::Null])?;
    let declared = echo.method_by_name("Echo").unwrap();
    let int32 = registry.wellknown("System.Int32")?;
    let result =
        runtime.invoke_generic_virtual(&proxy, &declared, &[int32], vec![EmValue::I32(41)])?;

    assert_eq!(result.as_i32(), Some(41));
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["Demo.IEcho::Echo<System.Int32>".to_string()]
    );
    Ok(())
}

/// Property accessors and members of inherited interfaces reach the handler too.
#[test]
fn test_accessors_and_inherited_members_are_intercepted() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let string = registry.wellknown("System.String")?;
    let base = InterfaceBuilder::new("Demo", "IBase")
        .method(MethodBuilder::new("Hello").returns(&string))
        .build(&registry)?;
    let named = InterfaceBuilder::new("Demo", "INamed")
        .extends(&base)
        .property("Name", &string, true, true)
        .build(&registry)?;

    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let handler = recording_handler(&registry, "Recorder", recorded.clone(), None)?;
    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_interception_proxy_type(&named, &handler)?;
    assert!(proxy_type.is_assignable_to(&named));
    assert!(proxy_type.is_assignable_to(&base));
    assert_eq!(proxy_type.properties.count(), 1);

    let runtime = generator.runtime();
    let proxy = runtime.new_object(&proxy_type, vec![runtime.new_string("target")?])?;
    let property = named.properties.get(0).unwrap();
    let setter = property.setter().unwrap();
    let getter = property.getter().unwrap();
    let hello = base.method_by_name("Hello").unwrap();

    runtime.invoke_virtual(&proxy, &hello, vec![])?;
    runtime.invoke_virtual(&proxy, &setter, vec![runtime.new_string("Ada")?])?;
    let name = runtime.invoke_virtual(&proxy, &getter, vec![])?;
    assert!(name.is_null());

    let recorded = recorded.lock().unwrap();
    assert_eq!(
        recorded.methods,
        vec![
            "Hello".to_string(),
            "set_Name".to_string(),
            "get_Name".to_string()
        ]
    );
    assert_eq!(
        recorded.args,
        vec![vec![], vec!["Ada".to_string()], vec![]]
    );
    Ok(())
}

/// A handler that leaves `Invoke` abstract cannot back a sealed proxy.
#[test]
fn test_handler_without_invoke_fails_finalization() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let flyer = flyer(&registry)?;
    let handler = ClassBuilder::new("Handlers", "Lazy")
        .extends(&registry.wellknown(DYNAMIC_PROXY_FULLNAME)?)
        .build(&registry)?;

    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    let result = generator.create_interception_proxy_type(&flyer, &handler);
    assert!(matches!(result, Err(Error::Finalization { .. })));
    assert!(generator.cache().is_empty());
    assert!(generator.module().is_empty());
    assert!(generator.diagnostics().has_errors());
    Ok(())
}

/// Types that cannot act as handlers are rejected before anything is declared.
#[test]
fn test_rejected_handlers() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let flyer = flyer(&registry)?;
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let handler = recording_handler(&registry, "Recorder", recorded, Some(0))?;
    let sealed = ClassBuilder::new("Handlers", "Final")
        .extends(&handler)
        .sealed()
        .build(&registry)?;
    let plain = ClassBuilder::new("Handlers", "Plain").build(&registry)?;

    let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
    for candidate in [&sealed, &plain, &flyer] {
        assert!(matches!(
            generator.create_interception_proxy_type(&flyer, candidate),
            Err(Error::InvalidHandler(_))
        ));
    }
    assert!(generator.module().is_empty());
    Ok(())
}
