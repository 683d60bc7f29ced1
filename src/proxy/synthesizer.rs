//! Proxy type synthesis.
//!
//! [`ProxyGenerator`] is the entry point. It declares proxy types into its
//! [`ProxyModule`] and memoizes them in its [`ProxyCache`], so every `(strategy,
//! interface, implementation)` combination is synthesized once and the same type is
//! returned afterwards.
//!
//! Two strategies exist:
//!
//! - **Forwarding** proxies wrap an instance of the implementation and delegate every
//!   interface member to it through a private `_instance` field.
//! - **Interception** proxies derive from a `DynamicProxy` handler and route every
//!   interface member to its `Invoke` override, passing the method descriptor and the
//!   boxed arguments.
//!
//! Both strategies share the member layout: one sealed class, one field, one
//! constructor, one body per interface method and property accessor, and one
//! `MethodImpl` per body recording the interface method it implements.

use std::sync::Arc;

use rayon::prelude::*;

use crate::{
    assembly::ILEmitter,
    config::SynthesisConfig,
    emulation::Runtime,
    metadata::{
        diagnostics::{DiagnosticCategory, Diagnostics},
        method::{
            MethodAccessFlags, MethodBody, MethodModifiers, MethodRc, MethodVtableFlags,
        },
        tables::{FieldAttributes, FieldRc},
        typesystem::{
            CilTypeRc, TypeAttributes, TypeRegistry, DYNAMIC_PROXY_FULLNAME,
            IPROXY_INSTANCE_FULLNAME, METHOD_BASE_FULLNAME, METHOD_INFO_FULLNAME,
        },
    },
    proxy::{
        attributes::{replicate_attributes, replicate_constructor_parameters, replicate_parameters},
        cache::{CacheKey, ProxyCache, ProxyKind},
        collector::{ProxyModule, TypeBuilder},
        generics::{replicate_method_generics, replicate_type_generics},
        interfaces::proxy_interface_set,
        members::{extract, find_constructor, EmissionName, InterfaceMembers},
        ReplicationContext,
    },
    Error, Result,
};

const MEMBER_FLAGS: u32 = MethodModifiers::FINAL.bits()
    | MethodModifiers::HIDE_BY_SIG.bits()
    | MethodModifiers::VIRTUAL.bits()
    | MethodVtableFlags::NEW_SLOT.bits();

const CONSTRUCTOR_FLAGS: u32 = MethodAccessFlags::PUBLIC.bits()
    | MethodModifiers::HIDE_BY_SIG.bits()
    | MethodModifiers::SPECIAL_NAME.bits()
    | MethodModifiers::RTSPECIAL_NAME.bits();

/// One synthesis request of a batch, see [`ProxyGenerator::create_many`]
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Strategy
    pub kind: ProxyKind,
    /// The interface to implement
    pub interface: CilTypeRc,
    /// The implementation for [`ProxyKind::Forwarding`], the handler for
    /// [`ProxyKind::Interception`]
    pub target: CilTypeRc,
}

impl ProxyRequest {
    /// A forwarding request
    #[must_use]
    pub fn forwarding(interface: &CilTypeRc, implementation: &CilTypeRc) -> Self {
        ProxyRequest {
            kind: ProxyKind::Forwarding,
            interface: interface.clone(),
            target: implementation.clone(),
        }
    }

    /// An interception request
    #[must_use]
    pub fn interception(interface: &CilTypeRc, handler: &CilTypeRc) -> Self {
        ProxyRequest {
            kind: ProxyKind::Interception,
            interface: interface.clone(),
            target: handler.clone(),
        }
    }

    fn key(&self) -> CacheKey {
        (self.kind, self.interface.token, self.target.token)
    }
}

/// Synthesizes, finalizes and caches proxy types.
///
/// `ProxyGenerator` is `Send + Sync`; share it behind an `Arc` or a reference to
/// synthesize from several threads.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use cilproxy::prelude::*;
///
/// let registry = Arc::new(TypeRegistry::new()?);
/// let greeter = InterfaceBuilder::new("Demo", "IGreeter").build(&registry)?;
/// let generator = ProxyGenerator::new(registry, SynthesisConfig::default());
///
/// let handler = generator.registry().wellknown("System.Object")?;
/// assert!(generator.create_interception_proxy_type(&greeter, &handler).is_err());
/// # Ok::<(), cilproxy::Error>(())
/// ```
#[derive(Debug)]
pub struct ProxyGenerator {
    module: ProxyModule,
    cache: ProxyCache,
}

impl ProxyGenerator {
    /// A generator declaring into a fresh module over `registry`
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>, config: SynthesisConfig) -> Self {
        ProxyGenerator {
            module: ProxyModule::new(registry, config),
            cache: ProxyCache::new(),
        }
    }

    /// The collector module
    #[must_use]
    pub fn module(&self) -> &ProxyModule {
        &self.module
    }

    /// The synthesized type cache
    #[must_use]
    pub fn cache(&self) -> &ProxyCache {
        &self.cache
    }

    /// The shared registry
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.module.registry()
    }

    /// Diagnostics recorded by synthesis
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        self.module.diagnostics()
    }

    /// A runtime over the shared registry, limited to the configured call depth
    #[must_use]
    pub fn runtime(&self) -> Runtime {
        Runtime::new(self.registry().clone()).with_max_depth(self.module.config().max_call_depth)
    }

    /// The forwarding proxy type of `interface` over `implementation`.
    ///
    /// The proxy implements `interface` and every other visible interface of
    /// `implementation`, and is constructed from an instance of `implementation`.
    ///
    /// # Errors
    /// - [`Error::NotAnInterface`] if `interface` is not an interface
    /// - [`Error::Finalization`] if the synthesized type is not loadable
    pub fn create_forwarding_proxy_type(
        &self,
        interface: &CilTypeRc,
        implementation: &CilTypeRc,
    ) -> Result<CilTypeRc> {
        self.create(&ProxyRequest::forwarding(interface, implementation))
    }

    /// The interception proxy type of `interface` routing through `handler`.
    ///
    /// The proxy derives from `handler` and is constructed from the object handed to
    /// `Invoke` as its `instance` argument.
    ///
    /// # Errors
    /// - [`Error::NotAnInterface`] if `interface` is not an interface
    /// - [`Error::InvalidHandler`] if `handler` is not an instantiable, non-sealed class
    ///   deriving from `DynamicProxy`
    /// - [`Error::Finalization`] if the synthesized type is not loadable
    pub fn create_interception_proxy_type(
        &self,
        interface: &CilTypeRc,
        handler: &CilTypeRc,
    ) -> Result<CilTypeRc> {
        self.create(&ProxyRequest::interception(interface, handler))
    }

    /// Synthesize a batch in parallel. Results are in request order.
    #[must_use]
    pub fn create_many(&self, requests: &[ProxyRequest]) -> Vec<Result<CilTypeRc>> {
        requests.par_iter().map(|request| self.create(request)).collect()
    }

    fn create(&self, request: &ProxyRequest) -> Result<CilTypeRc> {
        self.cache
            .get_or_create(request.key(), self.diagnostics(), || match request.kind {
                ProxyKind::Forwarding => self.synthesize_forwarding(&request.interface, &request.target),
                ProxyKind::Interception => {
                    self.synthesize_interception(&request.interface, &request.target)
                }
            })
    }

    fn synthesize_forwarding(&self, interface: &CilTypeRc, implementation: &CilTypeRc) -> Result<CilTypeRc> {
        check_interface(interface)?;
        let registry = self.registry();
        let object = registry.wellknown("System.Object")?;

        let mut builder = self.define_proxy(interface, &object)?;
        let name = builder.name();
        let ctx = self.context(&name);
        replicate_type_generics(&ctx, interface, &builder)?;
        let primary = self.primary(interface)?;

        let field = builder.define_backing_field("_instance", &primary, FieldAttributes::PRIVATE)?;

        let object_ctor = object
            .constructors()
            .into_iter()
            .next()
            .ok_or_else(|| malformed_error!("System.Object has no constructor"))?;
        let ctor = builder.define_constructor(CONSTRUCTOR_FLAGS)?;
        replicate_constructor_parameters(&ctx, None, &ctor, &[("instance", primary.clone())])?;
        let mut il = ILEmitter::new();
        il.push_this()?;
        il.call(&object_ctor)?;
        il.push_this()?;
        il.push_arg(1)?;
        il.store_field(&field)?;
        il.ret()?;
        builder.set_body(&ctor, il.finish()?)?;

        let additional: Vec<_> = proxy_interface_set(&primary, implementation)
            .into_iter()
            .skip(1)
            .collect();
        let strategy = Strategy::Forwarding { field: field.clone() };
        self.implement_interfaces(&ctx, &builder, &strategy, &primary, &additional)?;

        // marker giving access to the backing instance
        let marker = registry.wellknown(IPROXY_INSTANCE_FULLNAME)?;
        builder.add_interface(&marker);
        for (_, declaration) in marker.methods.iter() {
            let method = self.declare_member(
                &ctx,
                &builder,
                declaration,
                &EmissionName {
                    name: format!("{}.{}", IPROXY_INSTANCE_FULLNAME, declaration.name),
                    explicit: true,
                },
                false,
            )?;
            let mut il = ILEmitter::new();
            il.push_field(&field)?;
            il.ret()?;
            builder.set_body(&method, il.finish()?)?;
        }

        self.module.finalize(builder)
    }

    fn synthesize_interception(&self, interface: &CilTypeRc, handler: &CilTypeRc) -> Result<CilTypeRc> {
        check_interface(interface)?;
        let handler_ctor = check_handler(self.registry(), handler)?;
        let registry = self.registry();
        let object = registry.wellknown("System.Object")?;

        let mut builder = self.define_proxy(interface, handler)?;
        let name = builder.name();
        let ctx = self.context(&name);
        replicate_type_generics(&ctx, interface, &builder)?;
        let primary = self.primary(interface)?;

        let field = builder.define_backing_field(
            "_proxyObj",
            &object,
            FieldAttributes::PRIVATE | FieldAttributes::INIT_ONLY,
        )?;

        let ctor = builder.define_constructor(CONSTRUCTOR_FLAGS)?;
        replicate_constructor_parameters(&ctx, None, &ctor, &[("instance", object.clone())])?;
        let mut il = ILEmitter::new();
        il.push_this()?;
        il.call(&handler_ctor)?;
        il.push_this()?;
        il.push_arg(1)?;
        il.store_field(&field)?;
        il.ret()?;
        builder.set_body(&ctor, il.finish()?)?;

        let dynamic_proxy = registry.wellknown(DYNAMIC_PROXY_FULLNAME)?;
        let method_base = registry.wellknown(METHOD_BASE_FULLNAME)?;
        let strategy = Strategy::Interception {
            field,
            invoke: required_method(&dynamic_proxy, "Invoke")?,
            get_method_from_handle: required_method(&method_base, "GetMethodFromHandle")?,
            method_info: registry.wellknown(METHOD_INFO_FULLNAME)?,
            object_array: registry.make_array(&object)?,
            object,
        };

        let additional: Vec<_> = proxy_interface_set(&primary, &primary)
            .into_iter()
            .skip(1)
            .collect();
        self.implement_interfaces(&ctx, &builder, &strategy, &primary, &additional)?;

        self.module.finalize(builder)
    }

    /// Start the proxy class, named after the interface and generic over the same arity
    fn define_proxy(&self, interface: &CilTypeRc, base: &CilTypeRc) -> Result<TypeBuilder> {
        let stem = interface
            .name
            .split_once('`')
            .map_or(interface.name.as_str(), |(stem, _)| stem);
        let name = if interface.is_generic_definition() {
            format!("{stem}Proxy`{}", interface.generic_params.count())
        } else {
            format!("{stem}Proxy")
        };

        self.module.define_type(
            &name,
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
            base,
        )
    }

    fn context<'a>(&'a self, type_name: &'a str) -> ReplicationContext<'a> {
        ReplicationContext::new(
            self.registry(),
            self.diagnostics(),
            self.module.config(),
            type_name,
        )
    }

    /// The interface as the proxy implements it: a generic definition is
    /// instantiated over the proxy's own generic parameters
    fn primary(&self, interface: &CilTypeRc) -> Result<CilTypeRc> {
        if !interface.is_generic_definition() {
            return Ok(interface.clone());
        }

        let registry = self.registry();
        let mut placeholders = Vec::new();
        for index in 0..interface.generic_params.count() {
            placeholders.push(registry.generic_parameter(placeholder_index(index)?, false)?);
        }
        registry.make_generic_instance(interface, &placeholders)
    }

    fn implement_interfaces(
        &self,
        ctx: &ReplicationContext<'_>,
        builder: &TypeBuilder,
        strategy: &Strategy,
        primary: &CilTypeRc,
        additional: &[CilTypeRc],
    ) -> Result<()> {
        builder.add_interface(primary);
        for iface in additional {
            builder.add_interface(iface);
        }

        let extracted = extract(primary, additional);
        let mut bodies = 0;
        for members in &extracted {
            bodies += members.body_count();
            self.implement_members(ctx, builder, strategy, members)?;
        }

        ctx.diagnostics.info(
            DiagnosticCategory::Member,
            format!(
                "{}: {} interface(s), {} bod(ies) emitted",
                ctx.type_name,
                extracted.len(),
                bodies
            ),
        );
        Ok(())
    }

    fn implement_members(
        &self,
        ctx: &ReplicationContext<'_>,
        builder: &TypeBuilder,
        strategy: &Strategy,
        members: &InterfaceMembers,
    ) -> Result<()> {
        let type_args = members.interface.generic_arguments();
        let ctx = ctx.with_type_args(&type_args);

        for property in &members.properties {
            let mut accessors = [None, None];
            for (slot, accessor) in [&property.getter, &property.setter].into_iter().enumerate() {
                let Some(accessor) = accessor else {
                    continue;
                };
                let name = property.accessor_name(&members.interface, accessor);
                let method = self.declare_member(&ctx, builder, accessor, &name, true)?;
                builder.set_body(&method, strategy.emit(&ctx, accessor, &method)?)?;
                accessors[slot] = Some(method);
            }

            let ty = match property.property.ty() {
                Some(ty) => ctx.resolve(&ty)?,
                None => ctx.registry.wellknown("System.Object")?,
            };
            let [getter, setter] = accessors;
            let replica =
                builder.define_property(&property.name.name, &ty, getter.as_ref(), setter.as_ref())?;
            replicate_attributes(
                &ctx,
                &property.property.custom_attributes,
                &replica.custom_attributes,
            );
        }

        for descriptor in &members.methods {
            let method = self.declare_member(&ctx, builder, &descriptor.method, &descriptor.name, false)?;
            builder.set_body(&method, strategy.emit(&ctx, &descriptor.method, &method)?)?;
        }

        Ok(())
    }

    /// Declare the method implementing `declaration`, with its generics, parameters
    /// and attributes, and record the override. The body is left to the caller.
    fn declare_member(
        &self,
        ctx: &ReplicationContext<'_>,
        builder: &TypeBuilder,
        declaration: &MethodRc,
        name: &EmissionName,
        accessor: bool,
    ) -> Result<MethodRc> {
        let mut flags = MEMBER_FLAGS;
        flags |= if name.explicit {
            MethodAccessFlags::PRIVATE.bits()
        } else {
            MethodAccessFlags::PUBLIC.bits()
        };
        if accessor {
            flags |= MethodModifiers::SPECIAL_NAME.bits();
        }

        let return_type = match declaration.return_type() {
            Some(ty) => ctx.resolve(&ty)?,
            None => ctx.registry.wellknown("System.Void")?,
        };

        let method = builder.define_method(&name.name, flags, &return_type)?;
        replicate_method_generics(ctx, declaration, &method)?;
        replicate_parameters(ctx, declaration, &method, 0)?;
        replicate_attributes(ctx, &declaration.custom_attributes, &method.custom_attributes);
        builder.define_override(&method, declaration);
        Ok(method)
    }
}

/// How member bodies reach the implementation
enum Strategy {
    Forwarding {
        field: FieldRc,
    },
    Interception {
        field: FieldRc,
        invoke: MethodRc,
        get_method_from_handle: MethodRc,
        method_info: CilTypeRc,
        object: CilTypeRc,
        object_array: CilTypeRc,
    },
}

impl Strategy {
    /// Body of `method`, which implements `declaration`
    fn emit(&self, ctx: &ReplicationContext<'_>, declaration: &MethodRc, method: &MethodRc) -> Result<MethodBody> {
        let mut il = ILEmitter::new();
        let params = method.parameters();

        match self {
            Strategy::Forwarding { field } => {
                il.push_field(field)?;
                for index in 1..=params.len() {
                    il.push_arg(argument_index(index)?)?;
                }

                if declaration.is_generic() {
                    let spec = ctx
                        .registry
                        .make_method_spec(declaration, &method_placeholders(ctx, declaration)?)?;
                    il.callvirt_spec(&spec)?;
                } else {
                    il.callvirt(declaration)?;
                }
            }
            Strategy::Interception {
                field,
                invoke,
                get_method_from_handle,
                method_info,
                object,
                object_array,
            } => {
                il.new_array(object, argument_index(params.len())?)?;
                for (position, param) in params.iter().enumerate() {
                    il.dup()?;
                    il.push_int(argument_index(position)?)?;
                    il.push_arg(argument_index(position + 1)?)?;
                    if let Some(ty) = param.ty() {
                        il.box_if_needed(&ty)?;
                    }
                    il.stelem_ref()?;
                }
                let args = il.declare_local(object_array)?;
                il.store_local(args)?;

                il.push_this()?;
                il.push_field(field)?;
                if declaration.is_generic() {
                    let spec = ctx
                        .registry
                        .make_method_spec(declaration, &method_placeholders(ctx, declaration)?)?;
                    il.ldtoken_spec(&spec)?;
                } else {
                    il.ldtoken(declaration)?;
                }
                il.call(get_method_from_handle)?;
                il.castclass(method_info)?;
                il.push_local(args)?;
                il.callvirt(invoke)?;

                match method.return_type() {
                    Some(ty) if !method.returns_void() => il.unbox_any(&ty)?,
                    _ => il.pop()?,
                }
            }
        }

        il.ret()?;
        il.finish()
    }
}

/// `!!0..!!n` for the generic parameters of `method`
fn method_placeholders(ctx: &ReplicationContext<'_>, method: &MethodRc) -> Result<Vec<CilTypeRc>> {
    let mut placeholders = Vec::new();
    for index in 0..method.generic_params.count() {
        placeholders.push(ctx.registry.generic_parameter(placeholder_index(index)?, true)?);
    }
    Ok(placeholders)
}

fn placeholder_index(index: usize) -> Result<u32> {
    u32::try_from(index).map_err(|_| malformed_error!("Generic parameter {} is out of range", index))
}

fn argument_index(index: usize) -> Result<i32> {
    i32::try_from(index).map_err(|_| malformed_error!("Argument {} is out of range", index))
}

fn required_method(ty: &CilTypeRc, name: &str) -> Result<MethodRc> {
    ty.method_by_name(name)
        .ok_or_else(|| malformed_error!("{} has no method '{}'", ty.fullname(), name))
}

fn check_interface(interface: &CilTypeRc) -> Result<()> {
    if interface.is_interface() {
        Ok(())
    } else {
        Err(Error::NotAnInterface(interface.fullname()))
    }
}

/// The parameterless constructor of a valid interception handler
fn check_handler(registry: &TypeRegistry, handler: &CilTypeRc) -> Result<MethodRc> {
    let dynamic_proxy = registry.wellknown(DYNAMIC_PROXY_FULLNAME)?;
    let name = handler.fullname();

    if handler.is_interface() {
        return Err(Error::InvalidHandler(format!("{name} is an interface")));
    }
    if handler.is_sealed() {
        return Err(Error::InvalidHandler(format!("{name} is sealed")));
    }
    if handler.is_generic_definition() {
        return Err(Error::InvalidHandler(format!(
            "{name} is an open generic definition"
        )));
    }
    if !handler.is_assignable_to(&dynamic_proxy) {
        return Err(Error::InvalidHandler(format!(
            "{name} does not derive from {DYNAMIC_PROXY_FULLNAME}"
        )));
    }

    find_constructor(handler, &[]).ok_or_else(|| {
        Error::InvalidHandler(format!("{name} has no parameterless constructor"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::EmValue,
        metadata::{
            builders::{ClassBuilder, GenericParamSpec, InterfaceBuilder, MethodBuilder},
            customattributes::CustomAttributeValue,
        },
    };

    fn generator() -> Result<ProxyGenerator> {
        Ok(ProxyGenerator::new(
            Arc::new(TypeRegistry::new()?),
            SynthesisConfig::default(),
        ))
    }

    #[test]
    fn test_forwarding_layout() -> Result<()> {
        let generator = generator()?;
        let registry = generator.registry();
        let int32 = registry.wellknown("System.Int32")?;
        let sized = InterfaceBuilder::new("Demo", "ISized")
            .property("Size", &int32, true, false)
            .method(MethodBuilder::new("Grow").param("by", &int32))
            .build(registry)?;
        let list = ClassBuilder::new("Demo", "List")
            .implements(&sized)
            .method(MethodBuilder::new("get_Size").returns(&int32).host(|_, _| Ok(EmValue::I32(3))))
            .method(MethodBuilder::new("Grow").param("by", &int32).host(|_, _| Ok(EmValue::Void)))
            .build(registry)?;

        let proxy = generator.create_forwarding_proxy_type(&sized, &list)?;
        assert!(proxy.is_sealed());
        assert_eq!(proxy.name, "ISizedProxy");

        let field = proxy.field_by_name("_instance").unwrap();
        assert!(field.is_private());
        assert!(!field.is_init_only());

        let ctor = &proxy.constructors()[0];
        assert_eq!(ctor.param_count(), 1);
        assert_eq!(ctor.parameters()[0].name.as_deref(), Some("instance"));

        let getter = proxy.method_by_name("get_Size").unwrap();
        assert!(getter.is_public() && getter.is_final() && getter.is_virtual());
        assert_eq!(proxy.properties.count(), 1);
        assert!(proxy.method_by_name("Grow").is_some());

        let marker = registry.wellknown(IPROXY_INSTANCE_FULLNAME)?;
        assert!(proxy.is_assignable_to(&marker));
        // get_Size, Grow and the marker accessor
        assert_eq!(proxy.method_impls.count(), 3);
        Ok(())
    }

    #[test]
    fn test_generic_interface_gives_generic_proxy() -> Result<()> {
        let generator = generator()?;
        let registry = generator.registry();
        let t = registry.generic_parameter(0, false)?;
        let repo = InterfaceBuilder::new("Demo", "IRepo`1")
            .generic_param(GenericParamSpec::new("T"))
            .method(MethodBuilder::new("Get").returns(&t))
            .build(registry)?;
        let store = ClassBuilder::new("Demo", "Store`1")
            .generic_param(GenericParamSpec::new("T"))
            .build(registry)?;

        let proxy = generator.create_forwarding_proxy_type(&repo, &store)?;
        assert_eq!(proxy.name, "IRepoProxy`1");
        assert!(proxy.is_generic_definition());
        let field_ty = proxy.field_by_name("_instance").unwrap().ty().unwrap();
        assert_eq!(field_ty.generic_definition().unwrap().token, repo.token);
        Ok(())
    }

    #[test]
    fn test_generic_method_forwarding() -> Result<()> {
        let generator = generator()?;
        let registry = generator.registry();
        let t = registry.generic_parameter(0, true)?;
        let echo = InterfaceBuilder::new("Demo", "IEcho")
            .method(
                MethodBuilder::new("Echo")
                    .generic_param(GenericParamSpec::new("T"))
                    .param("value", &t)
                    .returns(&t),
            )
            .build(registry)?;
        let host = ClassBuilder::new("Demo", "Echoer")
            .implements(&echo)
            .method(
                MethodBuilder::new("Echo")
                    .generic_param(GenericParamSpec::new("T"))
                    .param("value", &t)
                    .returns(&t)
                    .host(|_, call| Ok(call.arg(0)?.clone())),
            )
            .build(registry)?;

        let proxy_type = generator.create_forwarding_proxy_type(&echo, &host)?;
        let echo_impl = proxy_type.method_by_name("Echo").unwrap();
        assert_eq!(echo_impl.generic_params.count(), 1);

        let runtime = generator.runtime();
        let backing = runtime.new_object(&host, vec![])?;
        let proxy = runtime.new_object(&proxy_type, vec![backing])?;
        let declaration = echo.method_by_name("Echo").unwrap();
        let int32 = registry.wellknown("System.Int32")?;
        let result = runtime.invoke_generic_virtual(&proxy, &declaration, &[int32], vec![EmValue::I32(7)])?;
        assert_eq!(result.as_i32(), Some(7));
        Ok(())
    }

    #[test]
    fn test_attributes_are_replicated() -> Result<()> {
        let generator = generator()?;
        let registry = generator.registry();
        let marker = ClassBuilder::new("Demo", "AuditedAttribute")
            .extends(&registry.wellknown("System.Attribute")?)
            .build(registry)?;
        let marker_ctor = marker.constructors()[0].clone();
        let audited = InterfaceBuilder::new("Demo", "IAudited")
            .method(MethodBuilder::new("Save").attribute(CustomAttributeValue::new(marker_ctor.clone())))
            .build(registry)?;
        let store = ClassBuilder::new("Demo", "AuditedStore")
            .implements(&audited)
            .method(MethodBuilder::new("Save").host(|_, _| Ok(EmValue::Void)))
            .build(registry)?;

        let proxy = generator.create_forwarding_proxy_type(&audited, &store)?;
        let save = proxy.method_by_name("Save").unwrap();
        assert_eq!(save.custom_attributes.count(), 1);
        assert!(save
            .custom_attributes
            .iter()
            .all(|(_, attribute)| attribute.constructor.token == marker_ctor.token));
        Ok(())
    }

    #[test]
    fn test_invalid_handlers() -> Result<()> {
        let generator = generator()?;
        let registry = generator.registry();
        let contract = InterfaceBuilder::new("Demo", "IContract").build(registry)?;
        let dynamic_proxy = registry.wellknown(DYNAMIC_PROXY_FULLNAME)?;

        let plain = ClassBuilder::new("Demo", "Plain").build(registry)?;
        let sealed = ClassBuilder::new("Demo", "SealedHandler")
            .extends(&dynamic_proxy)
            .sealed()
            .build(registry)?;

        for handler in [&plain, &sealed, &contract] {
            assert!(matches!(
                generator.create_interception_proxy_type(&contract, handler),
                Err(Error::InvalidHandler(_))
            ));
        }
        assert!(generator.cache().is_empty());
        assert!(generator.module().is_empty());
        Ok(())
    }

    #[test]
    fn test_not_an_interface() -> Result<()> {
        let generator = generator()?;
        let object = generator.registry().wellknown("System.Object")?;
        assert!(matches!(
            generator.create_forwarding_proxy_type(&object, &object),
            Err(Error::NotAnInterface(_))
        ));
        Ok(())
    }

    #[test]
    fn test_create_many() -> Result<()> {
        let generator = generator()?;
        let registry = generator.registry();
        let first = InterfaceBuilder::new("Demo", "IFirst").build(registry)?;
        let second = InterfaceBuilder::new("Demo", "ISecond").build(registry)?;
        let host = ClassBuilder::new("Demo", "Both")
            .implements(&first)
            .implements(&second)
            .build(registry)?;

        let requests = vec![
            ProxyRequest::forwarding(&first, &host),
            ProxyRequest::forwarding(&second, &host),
            ProxyRequest::forwarding(&first, &host),
        ];
        let results = generator.create_many(&requests);
        let types: Vec<CilTypeRc> = results.into_iter().collect::<Result<_>>()?;
        assert!(Arc::ptr_eq(&types[0], &types[2]));
        assert!(!Arc::ptr_eq(&types[0], &types[1]));
        assert_eq!(generator.module().len(), 2);
        Ok(())
    }
}
