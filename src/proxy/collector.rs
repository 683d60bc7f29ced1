//! The collector module synthesized proxy types are declared into.
//!
//! A [`TypeBuilder`] holds a type under construction. Nothing it declares is visible
//! through the shared [`TypeRegistry`] until [`ProxyModule::finalize`] has verified
//! the complete type; a failed finalization leaves neither the type nor any of its
//! members behind. Finalized types are appended to the module and never removed.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    config::SynthesisConfig,
    metadata::{
        diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics},
        method::{Method, MethodBody, MethodImpl, MethodImplementation, MethodRc},
        tables::{Field, FieldRc, Property, PropertyRc},
        token::{TableId, Token},
        typesystem::{CilFlavor, CilType, CilTypeRc, CilTypeRef, TypeAttributes, TypeRegistry},
    },
    proxy::verify,
    Result,
};

/// A type under construction.
///
/// Created by [`ProxyModule::define_type`] and consumed by [`ProxyModule::finalize`].
/// Dropping a builder that was never finalized releases its reserved name.
pub struct TypeBuilder {
    ty: CilTypeRc,
    registry: Arc<TypeRegistry>,
    backing_field: Option<FieldRc>,
    reserved: Arc<DashMap<String, Token>>,
    reserved_name: String,
    finalized: bool,
}

impl TypeBuilder {
    /// The type being built
    #[must_use]
    pub fn ty(&self) -> &CilTypeRc {
        &self.ty
    }

    /// Full name of the type being built
    #[must_use]
    pub fn name(&self) -> String {
        self.ty.fullname()
    }

    /// The field holding the backing value, once defined
    #[must_use]
    pub fn backing_field(&self) -> Option<&FieldRc> {
        self.backing_field.as_ref()
    }

    /// Declare an implemented interface
    pub fn add_interface(&self, interface: &CilTypeRc) {
        if !self.ty.interfaces.iter().any(|(_, i)| i.is(interface)) {
            self.ty.interfaces.push(CilTypeRef::new(interface));
        }
    }

    /// Declare an instance or static field
    ///
    /// # Errors
    /// Returns an error if the declaring type cannot be attached.
    pub fn define_field(&self, name: &str, ty: &CilTypeRc, flags: u32) -> Result<FieldRc> {
        let field = Arc::new(Field::new(
            self.registry.alloc_token(TableId::Field),
            name,
            flags,
            ty,
        ));
        field.set_declaring_type(&self.ty)?;
        self.ty.fields.push(field.clone());
        Ok(field)
    }

    /// Declare the field holding the backing value. Only constructors may write it.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`](crate::Error::Malformed) if a backing field was already declared.
    pub fn define_backing_field(&mut self, name: &str, ty: &CilTypeRc, flags: u32) -> Result<FieldRc> {
        if self.backing_field.is_some() {
            return Err(malformed_error!(
                "Backing field of '{}' is already defined",
                self.ty.name
            ));
        }

        let field = self.define_field(name, ty, flags)?;
        self.backing_field = Some(field.clone());
        Ok(field)
    }

    /// Declare a method from raw `MethodAttributes` flags, without body
    ///
    /// # Errors
    /// Returns an error if the declaring type cannot be attached.
    pub fn define_method(&self, name: &str, flags: u32, return_type: &CilTypeRc) -> Result<MethodRc> {
        let method = Arc::new(Method::new(
            self.registry.alloc_token(TableId::MethodDef),
            name,
            flags,
            return_type,
        ));
        method.set_declaring_type(&self.ty)?;
        self.ty.methods.push(method.clone());
        Ok(method)
    }

    /// Declare an instance constructor
    ///
    /// # Errors
    /// Returns an error if `System.Void` is missing.
    pub fn define_constructor(&self, flags: u32) -> Result<MethodRc> {
        let void = self.registry.wellknown("System.Void")?;
        self.define_method(".ctor", flags, &void)
    }

    /// Attach a CIL body to a method of this type
    ///
    /// # Errors
    /// Returns [`Error::Malformed`](crate::Error::Malformed) if the method is abstract or already has a body.
    pub fn set_body(&self, method: &MethodRc, body: MethodBody) -> Result<()> {
        method.set_implementation(MethodImplementation::Il(Arc::new(body)))
    }

    /// Declare a property over already defined accessors
    ///
    /// # Errors
    /// Returns an error if an accessor cannot be attached.
    pub fn define_property(
        &self,
        name: &str,
        ty: &CilTypeRc,
        getter: Option<&MethodRc>,
        setter: Option<&MethodRc>,
    ) -> Result<PropertyRc> {
        let property = Arc::new(Property::new(
            self.registry.alloc_token(TableId::Property),
            name,
            0,
            ty,
        ));
        if let Some(getter) = getter {
            property.set_getter(getter.clone())?;
        }
        if let Some(setter) = setter {
            property.set_setter(setter.clone())?;
        }

        self.ty.properties.push(property.clone());
        Ok(property)
    }

    /// Record that `body`, declared on this type, implements `declaration`
    pub fn define_override(&self, body: &MethodRc, declaration: &MethodRc) {
        self.ty.method_impls.push(MethodImpl {
            body: body.clone(),
            declaration: declaration.clone(),
        });
    }
}

impl Drop for TypeBuilder {
    fn drop(&mut self) {
        if !self.finalized {
            self.reserved.remove(&self.reserved_name);
        }
    }
}

/// Append-only module holding every synthesized type.
///
/// Type names are reserved when a type is defined, so concurrent synthesis calls never
/// produce two types with the same full name. Also owns the [`Diagnostics`] synthesis
/// reports into.
pub struct ProxyModule {
    registry: Arc<TypeRegistry>,
    config: SynthesisConfig,
    diagnostics: Diagnostics,
    types: boxcar::Vec<CilTypeRc>,
    reserved: Arc<DashMap<String, Token>>,
}

impl ProxyModule {
    /// An empty module declaring into `registry`
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>, config: SynthesisConfig) -> Self {
        ProxyModule {
            registry,
            config,
            diagnostics: Diagnostics::new(),
            types: boxcar::Vec::new(),
            reserved: Arc::new(DashMap::new()),
        }
    }

    /// The shared registry
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The synthesis configuration
    #[must_use]
    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Diagnostics recorded so far
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Finalized types, in finalization order
    #[must_use]
    pub fn types(&self) -> Vec<CilTypeRc> {
        self.types.iter().map(|(_, ty)| ty.clone()).collect()
    }

    /// Number of finalized types
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.count()
    }

    /// True if no type was finalized yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.count() == 0
    }

    /// Start a class in the configured namespace.
    ///
    /// `name` may carry a generic arity suffix. If the full name is taken, a numeric
    /// suffix `_n` is inserted before the arity.
    ///
    /// # Errors
    /// Returns an error if the base type cannot be attached.
    pub fn define_type(&self, name: &str, flags: TypeAttributes, base: &CilTypeRc) -> Result<TypeBuilder> {
        let token = self.registry.alloc_token(TableId::TypeDef);
        let name = self.reserve_name(name, token);
        let reserved_name = format!("{}.{}", self.config.namespace, name);

        let ty = Arc::new(CilType::new(
            token,
            CilFlavor::Class,
            self.config.namespace.to_string(),
            name,
            flags,
        ));
        let builder = TypeBuilder {
            ty,
            registry: self.registry.clone(),
            backing_field: None,
            reserved: self.reserved.clone(),
            reserved_name,
            finalized: false,
        };
        builder.ty.set_base(base)?;
        Ok(builder)
    }

    /// Verify the type and register it with all its members.
    ///
    /// # Errors
    /// Returns [`Error::Finalization`](crate::Error::Finalization) if the type is not
    /// loadable: an interface member is not implemented, a generic arity does not
    /// match, a body is invalid, a sealed type is left with abstract methods, or a
    /// non-constructor writes the backing field. Nothing is registered in that case.
    pub fn finalize(&self, mut builder: TypeBuilder) -> Result<CilTypeRc> {
        let ty = builder.ty.clone();
        let name = ty.fullname();

        let result = verify::verify_type(
            &self.registry,
            &ty,
            builder.backing_field.as_ref(),
            self.config.verify_bodies,
        )
        .and_then(|()| {
            self.registry
                .insert(&ty)
                .map_err(|error| finalization_error!(name, "{}", error))
        });

        // the builder releases its name when dropped on the error path
        if let Err(error) = result {
            self.diagnostics.push(
                Diagnostic::new(
                    DiagnosticSeverity::Error,
                    DiagnosticCategory::Finalization,
                    error.to_string(),
                )
                .with_token(ty.token)
                .with_type(name),
            );
            return Err(error);
        }

        builder.finalized = true;
        self.types.push(ty.clone());
        self.diagnostics.push(
            Diagnostic::new(
                DiagnosticSeverity::Info,
                DiagnosticCategory::Finalization,
                format!(
                    "finalized with {} method(s), {} field(s), {} interface(s)",
                    ty.methods.count(),
                    ty.fields.count(),
                    ty.interfaces.count()
                ),
            )
            .with_token(ty.token)
            .with_type(name),
        );
        Ok(ty)
    }

    fn reserve_name(&self, name: &str, token: Token) -> String {
        let (stem, arity) = match name.find('`') {
            Some(position) => name.split_at(position),
            None => (name, ""),
        };

        let mut candidate = name.to_string();
        let mut suffix = 0usize;
        loop {
            let fullname = format!("{}.{}", self.config.namespace, candidate);
            if self.registry.get_by_fullname(&fullname).is_none() {
                if let dashmap::mapref::entry::Entry::Vacant(entry) = self.reserved.entry(fullname) {
                    entry.insert(token);
                    return candidate;
                }
            }

            suffix += 1;
            candidate = format!("{stem}_{suffix}{arity}");
        }
    }
}

impl std::fmt::Debug for ProxyModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyModule")
            .field("namespace", &self.config.namespace)
            .field("types", &self.types.count())
            .field("diagnostics", &self.diagnostics.count())
            .finish()
    }
}

impl From<&ProxyModule> for SynthesisConfig {
    fn from(module: &ProxyModule) -> Self {
        module.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::ILEmitter,
        Error,
        metadata::{
            builders::{InterfaceBuilder, MethodBuilder},
            method::{MethodAccessFlags, MethodModifiers, MethodVtableFlags},
            tables::FieldAttributes,
        },
    };

    const PUBLIC_OVERRIDE: u32 = MethodAccessFlags::PUBLIC.bits()
        | MethodModifiers::FINAL.bits()
        | MethodModifiers::VIRTUAL.bits()
        | MethodModifiers::HIDE_BY_SIG.bits()
        | MethodVtableFlags::NEW_SLOT.bits();

    fn module() -> Result<ProxyModule> {
        Ok(ProxyModule::new(
            Arc::new(TypeRegistry::new()?),
            SynthesisConfig::default(),
        ))
    }

    fn sealed(module: &ProxyModule, name: &str) -> Result<TypeBuilder> {
        let object = module.registry().wellknown("System.Object")?;
        module.define_type(name, TypeAttributes::PUBLIC | TypeAttributes::SEALED, &object)
    }

    fn empty_constructor(module: &ProxyModule, builder: &TypeBuilder) -> Result<()> {
        let object_ctor = module.registry().wellknown("System.Object")?.constructors()[0].clone();
        let ctor = builder.define_constructor(MethodAccessFlags::PUBLIC.bits())?;
        let mut il = ILEmitter::new();
        il.push_this()?;
        il.call(&object_ctor)?;
        il.ret()?;
        builder.set_body(&ctor, il.finish()?)
    }

    #[test]
    fn test_finalize_registers_type() -> Result<()> {
        let module = module()?;
        let builder = sealed(&module, "EmptyProxy")?;
        empty_constructor(&module, &builder)?;
        let ctor_token = builder.ty().constructors()[0].token;

        let ty = module.finalize(builder)?;
        assert_eq!(ty.fullname(), "DynamicProxy.Types.EmptyProxy");
        assert_eq!(module.len(), 1);
        assert!(module.registry().get(&ty.token).is_some());
        assert!(module.registry().get_method(&ctor_token).is_ok());
        assert_eq!(
            module
                .diagnostics()
                .by_category(DiagnosticCategory::Finalization)
                .len(),
            1
        );
        Ok(())
    }

    #[test]
    fn test_name_collisions_get_a_suffix() -> Result<()> {
        let module = module()?;
        let first = sealed(&module, "IRepoProxy`1")?;
        let second = sealed(&module, "IRepoProxy`1")?;
        let third = sealed(&module, "IRepoProxy`1")?;
        assert_eq!(first.ty().name, "IRepoProxy`1");
        assert_eq!(second.ty().name, "IRepoProxy_1`1");
        assert_eq!(third.ty().name, "IRepoProxy_2`1");
        Ok(())
    }

    #[test]
    fn test_abandoned_builder_releases_name() -> Result<()> {
        let module = module()?;
        let abandoned = sealed(&module, "IStoreProxy`1")?;
        assert_eq!(abandoned.ty().name, "IStoreProxy`1");
        drop(abandoned);

        let kept = sealed(&module, "IStoreProxy`1")?;
        assert_eq!(kept.ty().name, "IStoreProxy`1");
        empty_constructor(&module, &kept)?;
        module.finalize(kept)?;

        // a finalized type keeps its name
        let next = sealed(&module, "IStoreProxy`1")?;
        assert_eq!(next.ty().name, "IStoreProxy_1`1");
        Ok(())
    }

    #[test]
    fn test_missing_interface_member_fails() -> Result<()> {
        let module = module()?;
        let int32 = module.registry().wellknown("System.Int32")?;
        let iface = InterfaceBuilder::new("Demo", "ISized")
            .method(MethodBuilder::new("Size").returns(&int32))
            .build(module.registry())?;

        let builder = sealed(&module, "ISizedProxy")?;
        builder.add_interface(&iface);
        empty_constructor(&module, &builder)?;
        let token = builder.ty().token;

        let error = module.finalize(builder).unwrap_err();
        assert!(matches!(error, Error::Finalization { .. }));
        assert!(error.to_string().contains("Size"));
        assert!(module.is_empty());
        assert!(module.registry().get(&token).is_none());
        assert!(module.diagnostics().has_errors());

        // the released name can be used again
        let retry = sealed(&module, "ISizedProxy")?;
        assert_eq!(retry.ty().name, "ISizedProxy");
        Ok(())
    }

    #[test]
    fn test_backing_field_written_outside_constructor_fails() -> Result<()> {
        let module = module()?;
        let object = module.registry().wellknown("System.Object")?;
        let void = module.registry().wellknown("System.Void")?;

        let mut builder = sealed(&module, "LeakyProxy")?;
        let field = builder.define_backing_field("_instance", &object, FieldAttributes::PRIVATE)?;
        assert!(builder
            .define_backing_field("_other", &object, FieldAttributes::PRIVATE)
            .is_err());
        empty_constructor(&module, &builder)?;

        let reset = builder.define_method("Reset", PUBLIC_OVERRIDE, &void)?;
        let mut il = ILEmitter::new();
        il.push_this()?;
        il.push_arg(0)?;
        il.store_field(&field)?;
        il.ret()?;
        builder.set_body(&reset, il.finish()?)?;

        let error = module.finalize(builder).unwrap_err();
        assert!(error.to_string().contains("_instance"));
        Ok(())
    }

    #[test]
    fn test_method_without_body_fails() -> Result<()> {
        let module = module()?;
        let void = module.registry().wellknown("System.Void")?;
        let builder = sealed(&module, "HollowProxy")?;
        empty_constructor(&module, &builder)?;
        builder.define_method("Run", PUBLIC_OVERRIDE, &void)?;

        assert!(matches!(
            module.finalize(builder),
            Err(Error::Finalization { .. })
        ));
        Ok(())
    }
}
