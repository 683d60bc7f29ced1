//! Method dispatch and the object operations shared by host code and the interpreter.
//!
//! A [`Runtime`] executes methods against one [`TypeRegistry`]. Host closures receive
//! the runtime as their first argument, so they can allocate objects, box values and
//! call back into emitted code. Nested invocations are counted and bounded by the
//! configured call depth.
//!
//! The depth counter is per runtime, so a runtime is used from one thread at a time.
//! Runtimes are cheap to create; share the registry and create one runtime per thread.

use std::{cell::Cell, collections::HashMap, sync::Arc, sync::RwLock};

use crate::{
    emulation::{EmValue, HeapObject, HeapObjectKind, Interpreter, ObjectRef, RuntimeMethod},
    metadata::{
        method::{MethodImplementation, MethodRc},
        token::{TableId, Token},
        typesystem::{
            CilType, CilTypeRc, TypeRegistry, IPROXY_INSTANCE_FULLNAME, METHOD_INFO_FULLNAME,
        },
    },
    Error, Result,
};

/// Default bound on nested invocations
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// One method invocation as seen by the callee.
#[derive(Clone, Debug)]
pub struct Invocation {
    /// The invoked method with its generic context
    pub method: RuntimeMethod,
    /// The receiver, `None` for static methods
    pub this: Option<EmValue>,
    /// Arguments in declaration order
    pub args: Vec<EmValue>,
}

impl Invocation {
    /// Argument at `index` (0 is the first declared parameter)
    ///
    /// # Errors
    /// Returns [`Error::ArgumentMismatch`] if there is no such argument.
    pub fn arg(&self, index: usize) -> Result<&EmValue> {
        self.args.get(index).ok_or_else(|| {
            Error::ArgumentMismatch(format!(
                "'{}' has no argument {}",
                self.method.method.fullname(),
                index
            ))
        })
    }

    /// The receiver
    ///
    /// # Errors
    /// Returns [`Error::NullReference`] for static invocations.
    pub fn this(&self) -> Result<&EmValue> {
        self.this.as_ref().ok_or_else(|| {
            Error::NullReference(format!(
                "'{}' was invoked without receiver",
                self.method.method.fullname()
            ))
        })
    }
}

/// Decrements the call depth when an invocation ends
struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Executes methods of a [`TypeRegistry`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use cilproxy::{emulation::{EmValue, Runtime}, metadata::typesystem::TypeRegistry};
///
/// let registry = Arc::new(TypeRegistry::new()?);
/// let runtime = Runtime::new(registry);
///
/// let text = runtime.new_string("hello")?;
/// assert_eq!(runtime.string_value(&text)?, Some("hello"));
///
/// let boxed = runtime.box_value(EmValue::I32(7), &runtime.registry().wellknown("System.Int32")?)?;
/// assert!(boxed.as_object().is_some());
/// # Ok::<(), cilproxy::Error>(())
/// ```
pub struct Runtime {
    registry: Arc<TypeRegistry>,
    max_depth: usize,
    depth: Cell<usize>,
}

impl Runtime {
    /// A runtime over `registry` with the default call depth
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Runtime {
            registry,
            max_depth: DEFAULT_MAX_CALL_DEPTH,
            depth: Cell::new(0),
        }
    }

    /// Override the maximum call depth
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The registry methods and types are resolved against
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Current nesting of invocations
    #[must_use]
    pub fn call_depth(&self) -> usize {
        self.depth.get()
    }

    fn enter(&self) -> Result<DepthGuard<'_>> {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(Error::RecursionLimit(self.max_depth));
        }

        self.depth.set(depth + 1);
        Ok(DepthGuard(&self.depth))
    }

    /// Allocate an instance of `ty` and run the constructor matching `args`.
    ///
    /// The constructor is chosen by argument count and by the argument values fitting
    /// the parameter types.
    ///
    /// # Errors
    /// - [`Error::TypeError`] for generic definitions, abstract types and interfaces
    /// - [`Error::ArgumentMismatch`] if no constructor accepts the arguments
    pub fn new_object(&self, ty: &CilTypeRc, args: Vec<EmValue>) -> Result<EmValue> {
        check_instantiable(ty)?;

        let type_args = ty.generic_arguments();
        let mut candidates = Vec::new();
        for ctor in ty.member_owner().constructors() {
            if self.accepts(&ctor, &type_args, &args)? {
                candidates.push(ctor);
            }
        }

        let Some(ctor) = candidates.into_iter().next() else {
            let given: Vec<String> = args.iter().map(EmValue::type_name).collect();
            return Err(Error::ArgumentMismatch(format!(
                "No constructor of '{}' accepts ({})",
                ty.fullname(),
                given.join(", ")
            )));
        };

        self.new_object_with(ty, &RuntimeMethod::new(ctor).with_type_args(type_args), args)
    }

    /// Allocate an instance of `ty` and run the given constructor
    ///
    /// # Errors
    /// Returns [`Error::TypeError`] for types that cannot be instantiated, or any error
    /// raised by the constructor.
    pub fn new_object_with(
        &self,
        ty: &CilTypeRc,
        ctor: &RuntimeMethod,
        args: Vec<EmValue>,
    ) -> Result<EmValue> {
        let object = EmValue::ObjectRef(self.allocate(ty)?);
        self.invoke_method(ctor, Some(object.clone()), args)?;
        Ok(object)
    }

    fn accepts(&self, method: &MethodRc, type_args: &[CilTypeRc], args: &[EmValue]) -> Result<bool> {
        if method.param_count() != args.len() {
            return Ok(false);
        }

        for (arg, ty) in args.iter().zip(method.param_types()) {
            let Some(ty) = ty else {
                return Ok(false);
            };
            let ty = self.registry.substitute(&ty, type_args, &[])?;
            if !arg.is_instance_of(&ty) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Create an instance with every instance field over the base chain at its default
    fn allocate(&self, ty: &CilTypeRc) -> Result<ObjectRef> {
        check_instantiable(ty)?;

        let mut fields = HashMap::new();
        let mut current = Some(ty.clone());
        while let Some(level) = current {
            let type_args = level.generic_arguments();
            for (_, field) in level.member_owner().fields.iter() {
                if field.is_static() {
                    continue;
                }

                let value = match field.ty() {
                    Some(field_ty) => {
                        let concrete = self.registry.substitute(&field_ty, &type_args, &[])?;
                        EmValue::default_for(&concrete)
                    }
                    None => EmValue::Null,
                };
                fields.insert(field.token, value);
            }
            current = level.base();
        }

        Ok(HeapObject::new(
            ty.clone(),
            HeapObjectKind::Instance(RwLock::new(fields)),
        ))
    }

    /// Invoke `method` with virtual and interface dispatch on the receiver's runtime type
    ///
    /// # Errors
    /// - [`Error::NullReference`] for a null receiver
    /// - [`Error::NotImplemented`] if the receiver type has no implementation
    pub fn invoke_virtual(&self, this: &EmValue, method: &MethodRc, args: Vec<EmValue>) -> Result<EmValue> {
        self.invoke_generic_virtual(this, method, &[], args)
    }

    /// Invoke a generic `method` closed over `method_args`, with virtual dispatch.
    ///
    /// The implementation receives the same method arguments; generic parameter lists
    /// of overrides are positional.
    ///
    /// # Errors
    /// See [`Runtime::invoke_virtual`].
    pub fn invoke_generic_virtual(
        &self,
        this: &EmValue,
        method: &MethodRc,
        method_args: &[CilTypeRc],
        args: Vec<EmValue>,
    ) -> Result<EmValue> {
        let target = self.resolve_virtual(this, method)?;
        self.invoke_method(
            &target.with_method_args(method_args.to_vec()),
            Some(this.clone()),
            args,
        )
    }

    fn resolve_virtual(&self, this: &EmValue, method: &MethodRc) -> Result<RuntimeMethod> {
        let receiver = match this {
            EmValue::Null => {
                return Err(Error::NullReference(format!(
                    "Cannot call '{}' on null",
                    method.fullname()
                )))
            }
            other => other.object()?,
        };

        let target = receiver.ty.resolve_method(method).ok_or_else(|| {
            Error::NotImplemented(format!(
                "'{}' does not implement '{}'",
                receiver.ty.fullname(),
                method.fullname()
            ))
        })?;
        let type_args = target
            .declaring_type()
            .map(|declaring| type_args_for(&receiver.ty, &declaring))
            .unwrap_or_default();

        Ok(RuntimeMethod::new(target).with_type_args(type_args))
    }

    /// Invoke `method` without dispatch.
    ///
    /// # Errors
    /// - [`Error::ArgumentMismatch`] if the argument count differs from the parameter count
    /// - [`Error::NullReference`] for instance methods without receiver
    /// - [`Error::NotImplemented`] for methods without implementation
    /// - [`Error::RecursionLimit`] if the call depth is exhausted
    pub fn invoke_method(
        &self,
        method: &RuntimeMethod,
        this: Option<EmValue>,
        args: Vec<EmValue>,
    ) -> Result<EmValue> {
        let definition = &method.method;
        if args.len() != definition.param_count() {
            return Err(Error::ArgumentMismatch(format!(
                "'{}' expects {} argument(s), got {}",
                definition.fullname(),
                definition.param_count(),
                args.len()
            )));
        }
        if !definition.is_static() && this.as_ref().is_none_or(EmValue::is_null) {
            return Err(Error::NullReference(format!(
                "Instance method '{}' invoked without receiver",
                definition.fullname()
            )));
        }

        let _guard = self.enter()?;
        let invocation = Invocation {
            method: method.clone(),
            this: if definition.is_static() { None } else { this },
            args,
        };

        match definition.implementation() {
            Some(MethodImplementation::Host(host)) => (**host)(self, &invocation),
            Some(MethodImplementation::Il(body)) => {
                Interpreter::new(self).execute(&invocation, body)
            }
            None => Err(Error::NotImplemented(format!(
                "'{}' has no implementation",
                definition.fullname()
            ))),
        }
    }

    /// Reflective invocation through a `MethodInfo` object, `MethodBase.Invoke` style.
    ///
    /// Arguments come as an `object[]` (or null for no arguments) and are unboxed for
    /// value-typed parameters. Virtual methods dispatch on `this`. The result is boxed
    /// for value-typed returns and null for `void`.
    ///
    /// # Errors
    /// - [`Error::InvalidCast`] if `method_info` is not a `MethodInfo`
    /// - [`Error::ArgumentMismatch`] if the argument count is wrong
    /// - anything the invoked method raises
    pub fn invoke(&self, method_info: &EmValue, this: &EmValue, args: &EmValue) -> Result<EmValue> {
        let info = method_info.object()?;
        let target = info
            .method_info()
            .ok_or_else(|| Error::InvalidCast {
                from: info.ty.fullname(),
                to: METHOD_INFO_FULLNAME.to_string(),
            })?
            .clone();

        let items = if args.is_null() {
            Vec::new()
        } else {
            args.object()?.array_items()?
        };
        let param_types = target.method.param_types();
        if items.len() != param_types.len() {
            return Err(Error::ArgumentMismatch(format!(
                "'{}' expects {} argument(s), got {}",
                target.method.fullname(),
                param_types.len(),
                items.len()
            )));
        }

        let mut unboxed = Vec::with_capacity(items.len());
        for (item, ty) in items.into_iter().zip(param_types) {
            let ty = ty.ok_or_else(|| {
                malformed_error!("Parameter of '{}' has no type", target.method.fullname())
            })?;
            let ty = self
                .registry
                .substitute(&ty, &target.type_args, &target.method_args)?;
            unboxed.push(if ty.is_value_type() {
                self.unbox(&item, &ty)?
            } else {
                item
            });
        }

        let result = if target.method.is_static() {
            self.invoke_method(&target, None, unboxed)?
        } else if target.method.is_virtual() {
            self.invoke_generic_virtual(this, &target.method, &target.method_args, unboxed)?
        } else {
            self.invoke_method(&target, Some(this.clone()), unboxed)?
        };

        if target.method.returns_void() {
            return Ok(EmValue::Null);
        }
        match target.method.return_type() {
            Some(ret) => {
                let ret = self
                    .registry
                    .substitute(&ret, &target.type_args, &target.method_args)?;
                self.box_value(result, &ret)
            }
            None => Ok(result),
        }
    }

    /// The backing instance of a forwarding proxy, `None` for any other object.
    ///
    /// # Errors
    /// Returns [`Error::NullReference`] for null, or any error raised while reading the
    /// backing instance.
    pub fn original_instance(&self, proxy: &EmValue) -> Result<Option<EmValue>> {
        let object = proxy.object()?;
        let marker = self.registry.wellknown(IPROXY_INSTANCE_FULLNAME)?;
        if !object.ty.is_assignable_to(&marker) {
            return Ok(None);
        }

        let Some(accessor) = marker.method_by_name("GetOriginalInstance") else {
            return Ok(None);
        };
        self.invoke_virtual(proxy, &accessor, Vec::new()).map(Some)
    }

    /// Box `value` as `ty`.
    ///
    /// Reference types pass through, `Nullable<T>` boxes to null or to a boxed `T`.
    /// Unresolved generic parameters box primitives by their stack type.
    ///
    /// # Errors
    /// Returns an error if a core type is missing.
    pub fn box_value(&self, value: EmValue, ty: &CilTypeRc) -> Result<EmValue> {
        if ty.is_generic_parameter() {
            let primitive = match &value {
                EmValue::I32(_) => "System.Int32",
                EmValue::I64(_) => "System.Int64",
                EmValue::F64(_) => "System.Double",
                _ => return Ok(value),
            };
            return self.box_value(value, &self.registry.wellknown(primitive)?);
        }
        if !ty.is_value_type() {
            return Ok(value);
        }
        if let Some(underlying) = ty.nullable_underlying() {
            if value.is_null() {
                return Ok(EmValue::Null);
            }
            return self.box_value(value, &underlying);
        }

        match value {
            EmValue::ObjectRef(_) | EmValue::Null => Ok(value),
            other => Ok(EmValue::ObjectRef(HeapObject::new(
                ty.clone(),
                HeapObjectKind::Boxed(other),
            ))),
        }
    }

    /// Unbox `value` to `ty`, `unbox.any` style: reference types are cast instead.
    ///
    /// # Errors
    /// - [`Error::NullReference`] when unboxing null to a non-nullable value type
    /// - [`Error::InvalidCast`] if the boxed value is not a `ty`
    pub fn unbox(&self, value: &EmValue, ty: &CilTypeRc) -> Result<EmValue> {
        if !ty.is_value_type() {
            return self.cast(value, ty);
        }
        if let Some(underlying) = ty.nullable_underlying() {
            if value.is_null() {
                return Ok(EmValue::Null);
            }
            return self.unbox(value, &underlying);
        }

        match value {
            EmValue::Null => Err(Error::NullReference(format!(
                "Cannot unbox null to '{}'",
                ty.fullname()
            ))),
            EmValue::ObjectRef(object) => match &object.kind {
                HeapObjectKind::Boxed(inner) if inner.is_instance_of(ty) => Ok(inner.clone()),
                _ => Err(Error::InvalidCast {
                    from: object.ty.fullname(),
                    to: ty.fullname(),
                }),
            },
            other if other.is_instance_of(ty) => Ok(other.clone()),
            other => Err(Error::InvalidCast {
                from: other.type_name(),
                to: ty.fullname(),
            }),
        }
    }

    /// `castclass`: null passes, incompatible values fail
    ///
    /// # Errors
    /// Returns [`Error::InvalidCast`] if `value` is not a `ty`.
    pub fn cast(&self, value: &EmValue, ty: &CilType) -> Result<EmValue> {
        if value.is_null() || value.is_instance_of(ty) {
            return Ok(value.clone());
        }

        Err(Error::InvalidCast {
            from: value.type_name(),
            to: ty.fullname(),
        })
    }

    /// Allocate a `System.String`
    ///
    /// # Errors
    /// Returns an error if `System.String` is missing from the registry.
    pub fn new_string(&self, text: &str) -> Result<EmValue> {
        Ok(EmValue::ObjectRef(HeapObject::new(
            self.registry.wellknown("System.String")?,
            HeapObjectKind::String(text.to_string()),
        )))
    }

    /// The contents of a string value, `None` for null
    ///
    /// # Errors
    /// Returns [`Error::InvalidCast`] for values that are not strings.
    pub fn string_value<'v>(&self, value: &'v EmValue) -> Result<Option<&'v str>> {
        if value.is_null() {
            return Ok(None);
        }

        value.as_str().map(Some).ok_or_else(|| Error::InvalidCast {
            from: value.type_name(),
            to: "System.String".to_string(),
        })
    }

    /// Allocate a single-dimension array of `element` holding `items`
    ///
    /// # Errors
    /// Returns [`Error::InvalidCast`] if an item does not fit the element type.
    pub fn new_array(&self, element: &CilTypeRc, items: Vec<EmValue>) -> Result<EmValue> {
        if let Some(bad) = items.iter().find(|item| !item.is_instance_of(element)) {
            return Err(Error::InvalidCast {
                from: bad.type_name(),
                to: element.fullname(),
            });
        }

        Ok(EmValue::ObjectRef(HeapObject::new(
            self.registry.make_array(element)?,
            HeapObjectKind::Array {
                element: element.clone(),
                items: RwLock::new(items),
            },
        )))
    }

    /// Elements of an array value
    ///
    /// # Errors
    /// Returns [`Error::NullReference`] for null, [`Error::InvalidCast`] for non-arrays.
    pub fn array_items(&self, value: &EmValue) -> Result<Vec<EmValue>> {
        value.object()?.array_items()
    }

    /// A `System.Reflection.MethodInfo` object describing `method`
    ///
    /// # Errors
    /// Returns an error if the reflection types are missing from the registry.
    pub fn method_info(&self, method: RuntimeMethod) -> Result<EmValue> {
        Ok(EmValue::ObjectRef(HeapObject::new(
            self.registry.wellknown(METHOD_INFO_FULLNAME)?,
            HeapObjectKind::MethodInfo(method),
        )))
    }

    /// `MethodBase.GetMethodFromHandle`
    ///
    /// # Errors
    /// Returns [`Error::InvalidCast`] if `handle` is not a method handle.
    pub fn method_info_from_handle(&self, handle: &EmValue) -> Result<EmValue> {
        match handle {
            EmValue::MethodHandle(method) => self.method_info(method.clone()),
            other => Err(Error::InvalidCast {
                from: other.type_name(),
                to: "System.RuntimeMethodHandle".to_string(),
            }),
        }
    }

    /// `Type.GetTypeFromHandle`
    ///
    /// # Errors
    /// Returns [`Error::InvalidCast`] if `handle` is not a type handle.
    pub fn type_from_handle(&self, handle: &EmValue) -> Result<EmValue> {
        match handle {
            EmValue::TypeHandle(ty) => Ok(EmValue::ObjectRef(HeapObject::new(
                self.registry.wellknown("System.Type")?,
                HeapObjectKind::TypeInfo(ty.clone()),
            ))),
            other => Err(Error::InvalidCast {
                from: other.type_name(),
                to: "System.RuntimeTypeHandle".to_string(),
            }),
        }
    }

    /// Resolve a method token, as named by `ldtoken`, to a method with generic context.
    ///
    /// The type-level context is taken from `receiver` (the runtime type of the executing
    /// instance) when it derives from or implements the method's declaring type. For
    /// `MethodSpec` tokens the instantiation is substituted with the given frame context.
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] for unknown tokens and tokens of other tables.
    pub fn resolve_method_handle(
        &self,
        token: Token,
        receiver: Option<&CilTypeRc>,
        type_args: &[CilTypeRc],
        method_args: &[CilTypeRc],
    ) -> Result<RuntimeMethod> {
        let (method, instantiation) = if token.is_table(TableId::MethodSpec) {
            let spec = self.registry.get_method_spec(&token)?;
            let mut closed = Vec::new();
            for arg in spec.arguments() {
                closed.push(self.registry.substitute(&arg, type_args, method_args)?);
            }
            (spec.method.clone(), closed)
        } else if token.is_table(TableId::MethodDef) {
            (self.registry.get_method(&token)?, Vec::new())
        } else {
            return Err(Error::MethodNotFound(token));
        };

        let context = match (receiver, method.declaring_type()) {
            (Some(receiver), Some(declaring)) => type_args_for(receiver, &declaring),
            _ => Vec::new(),
        };

        Ok(RuntimeMethod::new(method)
            .with_type_args(context)
            .with_method_args(instantiation))
    }
}

fn check_instantiable(ty: &CilType) -> Result<()> {
    if ty.is_generic_definition() {
        return Err(Error::TypeError(format!(
            "'{}' is a generic definition and must be instantiated first",
            ty.fullname()
        )));
    }
    if ty.is_interface() || ty.is_abstract() || ty.is_value_type() {
        return Err(Error::TypeError(format!(
            "'{}' cannot be instantiated",
            ty.fullname()
        )));
    }

    Ok(())
}

/// Generic arguments `ty` supplies to `declaring`, searching the base chain and then
/// the implemented interfaces
pub(crate) fn type_args_for(ty: &CilTypeRc, declaring: &CilTypeRc) -> Vec<CilTypeRc> {
    let mut current = Some(ty.clone());
    while let Some(level) = current {
        if level.member_owner().token == declaring.token {
            return level.generic_arguments();
        }
        current = level.base();
    }

    ty.all_interfaces()
        .into_iter()
        .find(|iface| iface.member_owner().token == declaring.token)
        .map(|iface| iface.generic_arguments())
        .unwrap_or_default()
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("max_depth", &self.max_depth)
            .field("depth", &self.depth.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::builders::{ClassBuilder, InterfaceBuilder, MethodBuilder};

    fn runtime() -> Result<Runtime> {
        Ok(Runtime::new(Arc::new(TypeRegistry::new()?)))
    }

    #[test]
    fn test_new_object_picks_constructor() -> Result<()> {
        let runtime = runtime()?;
        let registry = runtime.registry().clone();
        let int32 = registry.wellknown("System.Int32")?;
        let counter = ClassBuilder::new("Demo", "Counter")
            .field("count", &int32)
            .constructor(MethodBuilder::constructor().param("start", &int32).host(
                |_, call| {
                    let this = call.this()?.object()?;
                    let field = this
                        .ty
                        .field_by_name("count")
                        .ok_or_else(|| malformed_error!("count"))?;
                    this.set_field(field.token, call.arg(0)?.clone())?;
                    Ok(EmValue::Void)
                },
            ))
            .build(&registry)?;

        let instance = runtime.new_object(&counter, vec![EmValue::I32(4)])?;
        let field = counter.field_by_name("count").unwrap();
        assert_eq!(instance.object()?.get_field(field.token)?, EmValue::I32(4));

        let wrong = runtime.new_object(&counter, vec![EmValue::Null]);
        assert!(matches!(wrong, Err(Error::ArgumentMismatch(_))));
        Ok(())
    }

    #[test]
    fn test_virtual_dispatch() -> Result<()> {
        let runtime = runtime()?;
        let registry = runtime.registry().clone();
        let int32 = registry.wellknown("System.Int32")?;
        let source = InterfaceBuilder::new("Demo", "ISource")
            .method(MethodBuilder::new("Next").returns(&int32))
            .build(&registry)?;
        let host = ClassBuilder::new("Demo", "Source")
            .implements(&source)
            .method(
                MethodBuilder::new("Next")
                    .returns(&int32)
                    .host(|_, _| Ok(EmValue::I32(11))),
            )
            .build(&registry)?;

        let instance = runtime.new_object(&host, Vec::new())?;
        let next = source.method_by_name("Next").unwrap();
        assert_eq!(runtime.invoke_virtual(&instance, &next, Vec::new())?, EmValue::I32(11));
        assert!(matches!(
            runtime.invoke_virtual(&EmValue::Null, &next, Vec::new()),
            Err(Error::NullReference(_))
        ));
        Ok(())
    }

    #[test]
    fn test_recursion_limit() -> Result<()> {
        let runtime = runtime()?.with_max_depth(8);
        let registry = runtime.registry().clone();
        let looping = ClassBuilder::new("Demo", "Looping")
            .method(MethodBuilder::new("Again").make_static().host(|runtime, call| {
                runtime.invoke_method(&call.method, None, Vec::new())
            }))
            .build(&registry)?;

        let again = RuntimeMethod::new(looping.method_by_name("Again").unwrap());
        assert!(matches!(
            runtime.invoke_method(&again, None, Vec::new()),
            Err(Error::RecursionLimit(8))
        ));
        assert_eq!(runtime.call_depth(), 0);
        Ok(())
    }

    #[test]
    fn test_box_and_unbox() -> Result<()> {
        let runtime = runtime()?;
        let registry = runtime.registry().clone();
        let int32 = registry.wellknown("System.Int32")?;
        let int64 = registry.wellknown("System.Int64")?;
        let nullable = registry.make_generic_instance(
            &registry.wellknown("System.Nullable`1")?,
            &[int32.clone()],
        )?;

        let boxed = runtime.box_value(EmValue::I32(5), &int32)?;
        assert_eq!(runtime.unbox(&boxed, &int32)?, EmValue::I32(5));
        assert!(matches!(
            runtime.unbox(&boxed, &int64),
            Err(Error::InvalidCast { .. })
        ));
        assert!(matches!(
            runtime.unbox(&EmValue::Null, &int32),
            Err(Error::NullReference(_))
        ));
        assert!(runtime.box_value(EmValue::Null, &nullable)?.is_null());
        assert_eq!(runtime.unbox(&boxed, &nullable)?, EmValue::I32(5));
        Ok(())
    }

    #[test]
    fn test_abstract_types_cannot_be_allocated() -> Result<()> {
        let runtime = runtime()?;
        let registry = runtime.registry().clone();
        let nullable = registry.wellknown("System.Nullable`1")?;
        let attribute = registry.wellknown("System.Attribute")?;

        assert!(matches!(
            runtime.new_object(&attribute, Vec::new()),
            Err(Error::TypeError(_))
        ));
        assert!(matches!(
            runtime.new_object_with(
                &nullable,
                &RuntimeMethod::new(registry.wellknown("System.Object")?.constructors()[0].clone()),
                Vec::new()
            ),
            Err(Error::TypeError(_))
        ));
        Ok(())
    }

    #[test]
    fn test_method_handles() -> Result<()> {
        let runtime = runtime()?;
        let object = runtime.registry().wellknown("System.Object")?;
        let ctor = object.constructors()[0].clone();

        let resolved = runtime.resolve_method_handle(ctor.token, None, &[], &[])?;
        let info = runtime.method_info_from_handle(&EmValue::MethodHandle(resolved))?;
        assert_eq!(info.object()?.method_info().unwrap().name(), ".ctor");

        assert!(matches!(
            runtime.resolve_method_handle(object.token, None, &[], &[]),
            Err(Error::MethodNotFound(_))
        ));
        Ok(())
    }
}
