//! Interface closure, diamond naming and generic constraints of forwarding proxies.

use std::sync::Arc;

use cilproxy::{metadata::typesystem::IPROXY_INSTANCE_FULLNAME, prelude::*};

struct Diamond {
    registry: Arc<TypeRegistry>,
    ia: CilTypeRc,
    ib: CilTypeRc,
    ic: CilTypeRc,
    host: CilTypeRc,
}

/// `IA : IB`, `IB { int Ping() }`, `IC { int Ping(); int Pong(); T Parse<T>(string) where T : struct }`
/// and a host implementing `IA` and `IC`
fn diamond() -> Result<Diamond> {
    let registry = Arc::new(TypeRegistry::new()?);
    let int32 = registry.wellknown("System.Int32")?;
    let string = registry.wellknown("System.String")?;
    let t = registry.generic_parameter(0, true)?;
    let value_type = GenericParamSpec::new("T")
        .flags(GenericParamAttributes::NOT_NULLABLE_VALUE_TYPE_CONSTRAINT);

    let ib = InterfaceBuilder::new("Demo", "IB")
        .method(MethodBuilder::new("Ping").returns(&int32))
        .build(&registry)?;
    let ia = InterfaceBuilder::new("Demo", "IA").extends(&ib).build(&registry)?;
    let ic = InterfaceBuilder::new("Demo", "IC")
        .method(MethodBuilder::new("Ping").returns(&int32))
        .method(MethodBuilder::new("Pong").returns(&int32))
        .method(
            MethodBuilder::new("Parse")
                .generic_param(value_type.clone())
                .param("text", &string)
                .returns(&t),
        )
        .build(&registry)?;

    let host = ClassBuilder::new("Demo", "Host")
        .implements(&ia)
        .implements(&ic)
        .method(
            MethodBuilder::new("Ping")
                .returns(&int32)
                .host(|_, _| Ok(EmValue::I32(1))),
        )
        .method(
            MethodBuilder::new("Pong")
                .returns(&int32)
                .host(|_, _| Ok(EmValue::I32(2))),
        )
        .method(
            MethodBuilder::new("Parse")
                .generic_param(value_type)
                .param("text", &string)
                .returns(&t)
                .host(|runtime, call| {
                    let text = runtime.string_value(call.arg(0)?)?.unwrap_or_default();
                    let parsed = text
                        .parse::<i32>()
                        .map_err(|e| Error::ArgumentMismatch(e.to_string()))?;
                    Ok(EmValue::I32(parsed))
                }),
        )
        .build(&registry)?;

    Ok(Diamond {
        registry,
        ia,
        ib,
        ic,
        host,
    })
}

#[test]
fn test_interface_set_is_the_closure() -> Result<()> {
    let fx = diamond()?;
    let generator = ProxyGenerator::new(fx.registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_forwarding_proxy_type(&fx.ia, &fx.host)?;

    let names: Vec<String> = proxy_type
        .declared_interfaces()
        .iter()
        .map(|iface| iface.fullname())
        .collect();
    assert_eq!(
        names,
        vec![
            "Demo.IA".to_string(),
            "Demo.IB".to_string(),
            "Demo.IC".to_string(),
            IPROXY_INSTANCE_FULLNAME.to_string(),
        ]
    );
    for iface in [&fx.ia, &fx.ib, &fx.ic] {
        assert!(proxy_type.is_assignable_to(iface));
    }
    Ok(())
}

#[test]
fn test_colliding_member_becomes_explicit() -> Result<()> {
    let fx = diamond()?;
    let generator = ProxyGenerator::new(fx.registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_forwarding_proxy_type(&fx.ia, &fx.host)?;

    let ping = proxy_type.methods_by_name("Ping");
    assert_eq!(ping.len(), 1);
    assert!(ping[0].is_public());

    let explicit = proxy_type.method_by_name("Demo.IC.Ping").unwrap();
    assert!(explicit.is_private());
    assert!(explicit.is_virtual() && explicit.is_final());

    let pong = proxy_type.method_by_name("Pong").unwrap();
    assert!(pong.is_public());

    let runtime = generator.runtime();
    let proxy = runtime.new_object(&proxy_type, vec![runtime.new_object(&fx.host, vec![])?])?;
    let ib_ping = fx.ib.method_by_name("Ping").unwrap();
    let ic_ping = fx.ic.method_by_name("Ping").unwrap();
    let ic_pong = fx.ic.method_by_name("Pong").unwrap();
    assert_eq!(runtime.invoke_virtual(&proxy, &ib_ping, vec![])?.as_i32(), Some(1));
    assert_eq!(runtime.invoke_virtual(&proxy, &ic_ping, vec![])?.as_i32(), Some(1));
    assert_eq!(runtime.invoke_virtual(&proxy, &ic_pong, vec![])?.as_i32(), Some(2));
    Ok(())
}

#[test]
fn test_value_type_constraint_is_replicated() -> Result<()> {
    let fx = diamond()?;
    let generator = ProxyGenerator::new(fx.registry.clone(), SynthesisConfig::default());
    let proxy_type = generator.create_forwarding_proxy_type(&fx.ia, &fx.host)?;
    let parse = proxy_type.method_by_name("Parse").unwrap();
    assert!(parse.is_generic());

    let string = fx.registry.wellknown("System.String")?;
    let int32 = fx.registry.wellknown("System.Int32")?;
    assert!(matches!(
        fx.registry.make_method_spec(&parse, &[string]),
        Err(Error::ConstraintViolation { .. })
    ));
    let spec = fx.registry.make_method_spec(&parse, &[int32.clone()])?;
    assert_eq!(spec.arguments()[0].token, int32.token);
    assert!(!spec.is_open());

    // the instantiation reaches the host with the same argument
    let runtime = generator.runtime();
    let proxy = runtime.new_object(&proxy_type, vec![runtime.new_object(&fx.host, vec![])?])?;
    let declared = fx.ic.method_by_name("Parse").unwrap();
    let result = runtime.invoke_generic_virtual(
        &proxy,
        &declared,
        &[int32],
        vec![runtime.new_string("42")?],
    )?;
    assert_eq!(result.as_i32(), Some(42));
    Ok(())
}

#[test]
fn test_constraints_dropped_when_disabled() -> Result<()> {
    let fx = diamond()?;
    let config = SynthesisConfig {
        replicate_generic_constraints: false,
        ..SynthesisConfig::default()
    };
    let generator = ProxyGenerator::new(fx.registry.clone(), config);
    let proxy_type = generator.create_forwarding_proxy_type(&fx.ia, &fx.host)?;
    let parse = proxy_type.method_by_name("Parse").unwrap();

    let string = fx.registry.wellknown("System.String")?;
    assert!(fx.registry.make_method_spec(&parse, &[string]).is_ok());
    Ok(())
}
