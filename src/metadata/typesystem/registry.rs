//! Token-indexed registry of every type and member known to a proxy module.
//!
//! The registry is the single owner of strong type handles. All other structures hold
//! [`CilTypeRef`] weak handles into it, so a type stays alive exactly as long as the
//! registry that created it.
//!
//! # Storage
//!
//! - Lock-free primary storage keyed by token (`SkipMap`)
//! - Concurrent secondary indices (`DashMap`) for lookups by full name and for the
//!   deduplication of constructed types
//! - One atomic row counter per metadata table, so tokens are unique and monotonic
//!
//! Constructed types (generic instances, arrays and generic parameter placeholders)
//! are interned: requesting the same construction twice returns the same `Arc`.
//!
//! # Examples
//!
//! ```rust
//! use cilproxy::metadata::typesystem::TypeRegistry;
//!
//! let registry = TypeRegistry::new()?;
//! let nullable = registry.get_by_fullname("System.Nullable`1").unwrap();
//! let int32 = registry.get_by_fullname("System.Int32").unwrap();
//!
//! let first = registry.make_generic_instance(&nullable, &[int32.clone()])?;
//! let second = registry.make_generic_instance(&nullable, &[int32])?;
//! assert!(std::sync::Arc::ptr_eq(&first, &second));
//! assert_eq!(first.fullname(), "System.Nullable`1<System.Int32>");
//! # Ok::<(), cilproxy::Error>(())
//! ```

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;

use crate::{
    metadata::{
        method::MethodRc,
        tables::{FieldRc, MethodSpec, MethodSpecRc},
        token::{TableId, Token},
        typesystem::{corlib, CilFlavor, CilType, CilTypeRc, CilTypeRef, TypeAttributes},
    },
    Error, Result,
};

/// Key of an interned generic instantiation: definition plus argument tokens
type InstanceKey = (Token, Vec<Token>);

/// Central registry of types, methods, fields and method instantiations.
pub struct TypeRegistry {
    /// Primary type storage
    types: SkipMap<Token, CilTypeRc>,
    /// Every method declared on a registered type
    methods: SkipMap<Token, MethodRc>,
    /// Every field declared on a registered type
    fields: SkipMap<Token, FieldRc>,
    /// Interned generic method instantiations
    method_specs: SkipMap<Token, MethodSpecRc>,
    /// Next free row, per table
    next_row: [AtomicU32; TableId::COUNT],
    /// Full name index of definitions
    types_by_fullname: DashMap<String, Token>,
    /// Interned generic type instantiations
    generic_instances: DashMap<InstanceKey, Token>,
    /// Interned single-dimension arrays, keyed by element type
    arrays: DashMap<Token, Token>,
    /// Interned positional generic parameter placeholders
    generic_parameters: DashMap<(u32, bool), Token>,
    /// Interned method instantiations
    method_spec_index: DashMap<InstanceKey, Token>,
}

impl TypeRegistry {
    /// Create a registry pre-populated with the core `System` types that proxies and
    /// their bodies reference.
    ///
    /// # Errors
    /// Returns an error if the core types cannot be declared.
    pub fn new() -> Result<Self> {
        let registry = TypeRegistry {
            types: SkipMap::new(),
            methods: SkipMap::new(),
            fields: SkipMap::new(),
            method_specs: SkipMap::new(),
            next_row: std::array::from_fn(|_| AtomicU32::new(1)),
            types_by_fullname: DashMap::new(),
            generic_instances: DashMap::new(),
            arrays: DashMap::new(),
            generic_parameters: DashMap::new(),
            method_spec_index: DashMap::new(),
        };

        corlib::install(&registry)?;
        Ok(registry)
    }

    /// Allocate the next token of `table`
    pub fn alloc_token(&self, table: TableId) -> Token {
        let row = self.next_row[table.slot()].fetch_add(1, Ordering::Relaxed);
        Token::from_parts(table, row)
    }

    /// Register a type together with its declared methods and fields.
    ///
    /// # Errors
    /// Returns [`Error::TypeInsert`] if the token is already taken, or if a definition
    /// with the same full name exists.
    pub fn insert(&self, new_type: &CilTypeRc) -> Result<()> {
        if self.types.contains_key(&new_type.token) {
            return Err(Error::TypeInsert(new_type.token));
        }

        if new_type.token.is_table(TableId::TypeDef) {
            match self.types_by_fullname.entry(new_type.fullname()) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    return Err(Error::TypeInsert(new_type.token));
                }
                dashmap::mapref::entry::Entry::Vacant(entry) => {
                    entry.insert(new_type.token);
                }
            }
        }

        for (_, method) in new_type.methods.iter() {
            self.register_method(method);
        }
        for (_, field) in new_type.fields.iter() {
            self.register_field(field);
        }

        self.types.insert(new_type.token, new_type.clone());
        Ok(())
    }

    /// Make a method resolvable by token
    pub fn register_method(&self, method: &MethodRc) {
        self.methods.insert(method.token, method.clone());
    }

    /// Make a field resolvable by token
    pub fn register_field(&self, field: &FieldRc) {
        self.fields.insert(field.token, field.clone());
    }

    /// Look up a type by token
    #[must_use]
    pub fn get(&self, token: &Token) -> Option<CilTypeRc> {
        self.types.get(token).map(|entry| entry.value().clone())
    }

    /// Look up a type by token, failing with [`Error::TypeNotFound`]
    ///
    /// # Errors
    /// Returns [`Error::TypeNotFound`] if the token is unknown.
    pub fn resolve_type(&self, token: &Token) -> Result<CilTypeRc> {
        self.get(token).ok_or(Error::TypeNotFound(*token))
    }

    /// Look up a method by token
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] if the token is unknown.
    pub fn get_method(&self, token: &Token) -> Result<MethodRc> {
        self.methods
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(Error::MethodNotFound(*token))
    }

    /// Look up a field by token
    ///
    /// # Errors
    /// Returns [`Error::FieldNotFound`] if the token is unknown.
    pub fn get_field(&self, token: &Token) -> Result<FieldRc> {
        self.fields
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(Error::FieldNotFound(*token))
    }

    /// Look up a method instantiation by token
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] if the token is unknown.
    pub fn get_method_spec(&self, token: &Token) -> Result<MethodSpecRc> {
        self.method_specs
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(Error::MethodNotFound(*token))
    }

    /// Look up a type definition by its full name (`Namespace.Name`, `Outer+Inner`)
    #[must_use]
    pub fn get_by_fullname(&self, fullname: &str) -> Option<CilTypeRc> {
        let token = *self.types_by_fullname.get(fullname)?;
        self.get(&token)
    }

    /// Look up a type that must exist, such as a core `System` type
    ///
    /// # Errors
    /// Returns [`Error::TypeError`] if no definition with that name is registered.
    pub fn wellknown(&self, fullname: &str) -> Result<CilTypeRc> {
        self.get_by_fullname(fullname)
            .ok_or_else(|| Error::TypeError(format!("Core type '{fullname}' is not registered")))
    }

    /// The core type backing a primitive flavor
    ///
    /// # Errors
    /// Returns [`Error::TypeError`] if the flavor has no core type.
    pub fn primitive(&self, flavor: &CilFlavor) -> Result<CilTypeRc> {
        let name = match flavor {
            CilFlavor::Void => "System.Void",
            CilFlavor::Boolean => "System.Boolean",
            CilFlavor::Char => "System.Char",
            CilFlavor::I1 => "System.SByte",
            CilFlavor::U1 => "System.Byte",
            CilFlavor::I2 => "System.Int16",
            CilFlavor::U2 => "System.UInt16",
            CilFlavor::I4 => "System.Int32",
            CilFlavor::U4 => "System.UInt32",
            CilFlavor::I8 => "System.Int64",
            CilFlavor::U8 => "System.UInt64",
            CilFlavor::R4 => "System.Single",
            CilFlavor::R8 => "System.Double",
            CilFlavor::I => "System.IntPtr",
            CilFlavor::U => "System.UIntPtr",
            CilFlavor::Object => "System.Object",
            CilFlavor::String => "System.String",
            other => {
                return Err(Error::TypeError(format!(
                    "Flavor {other:?} has no primitive type"
                )))
            }
        };

        self.wellknown(name)
    }

    /// Number of registered types, constructed types included
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate all registered types in token order
    pub fn iter(&self) -> impl Iterator<Item = CilTypeRc> + '_ {
        self.types.iter().map(|entry| entry.value().clone())
    }

    /// The canonical placeholder for the generic parameter at `index`.
    ///
    /// Type-level placeholders render as `!n`, method-level as `!!n`. Signatures stay
    /// positional, so a signature copied from one owner to another remains valid as
    /// long as the generic parameter lists line up.
    ///
    /// # Errors
    /// Returns an error if the placeholder cannot be registered.
    pub fn generic_parameter(&self, index: u32, method: bool) -> Result<CilTypeRc> {
        if let Some(token) = self.generic_parameters.get(&(index, method)).map(|t| *t) {
            return self.resolve_type(&token);
        }

        let name = if method {
            format!("!!{index}")
        } else {
            format!("!{index}")
        };
        let placeholder = Arc::new(CilType::new(
            self.alloc_token(TableId::TypeSpec),
            CilFlavor::GenericParameter { index, method },
            String::new(),
            name,
            TypeAttributes::PUBLIC,
        ));

        self.intern(&self.generic_parameters, (index, method), placeholder)
    }

    /// The single-dimension array of `element`
    ///
    /// # Errors
    /// Returns an error if the array type cannot be registered.
    pub fn make_array(&self, element: &CilTypeRc) -> Result<CilTypeRc> {
        if let Some(token) = self.arrays.get(&element.token).map(|t| *t) {
            return self.resolve_type(&token);
        }

        let array = Arc::new(CilType::new(
            self.alloc_token(TableId::TypeSpec),
            CilFlavor::Array { rank: 1 },
            String::new(),
            format!("{}[]", element.name),
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
        ));
        array.set_element(element)?;
        array.set_base(&self.wellknown("System.Object")?)?;

        self.intern(&self.arrays, element.token, array)
    }

    /// Close a generic definition over `args`.
    ///
    /// Concrete arguments are checked against the constraints of their parameter, so
    /// this is where replicated constraints are enforced. Arguments that still contain
    /// generic parameters are accepted unchecked. Base type and interfaces of the
    /// definition are substituted.
    ///
    /// # Errors
    /// - [`Error::TypeError`] if `definition` is not generic or the arity differs
    /// - [`Error::ConstraintViolation`] if an argument violates a constraint
    pub fn make_generic_instance(
        &self,
        definition: &CilTypeRc,
        args: &[CilTypeRc],
    ) -> Result<CilTypeRc> {
        if !definition.is_generic_definition() {
            return Err(Error::TypeError(format!(
                "'{}' is not a generic type definition",
                definition.fullname()
            )));
        }

        let arity = definition.generic_params.count();
        if arity != args.len() {
            return Err(Error::TypeError(format!(
                "'{}' expects {} generic argument(s), got {}",
                definition.fullname(),
                arity,
                args.len()
            )));
        }

        let key = (definition.token, args.iter().map(|arg| arg.token).collect());
        if let Some(token) = self.generic_instances.get(&key).map(|t| *t) {
            return self.resolve_type(&token);
        }

        for (_, param) in definition.generic_params.iter() {
            let Some(arg) = args.get(param.number as usize) else {
                continue;
            };
            if arg.contains_generic_parameters() {
                continue;
            }

            param.check(arg, |constraint| self.substitute(constraint, args, &[]))?;
        }

        let instance = Arc::new(CilType::new(
            self.alloc_token(TableId::TypeSpec),
            CilFlavor::GenericInstance,
            definition.namespace.clone(),
            definition.name.clone(),
            definition.flags,
        ));
        instance.set_generic_definition(definition)?;
        for arg in args {
            instance.generic_args.push(CilTypeRef::new(arg));
        }
        if let Some(base) = definition.base() {
            instance.set_base(&self.substitute(&base, args, &[])?)?;
        }
        for iface in definition.declared_interfaces() {
            let closed = self.substitute(&iface, args, &[])?;
            instance.interfaces.push(CilTypeRef::new(&closed));
        }
        if let Some(declaring) = definition.declaring_type() {
            instance.set_declaring_type(&declaring)?;
        }

        self.intern(&self.generic_instances, key, instance)
    }

    /// Replace generic parameter placeholders in `ty` with the given arguments.
    ///
    /// Placeholders without a matching argument are kept, which leaves the result open.
    ///
    /// # Errors
    /// Returns an error if a constructed type cannot be created.
    pub fn substitute(
        &self,
        ty: &CilTypeRc,
        type_args: &[CilTypeRc],
        method_args: &[CilTypeRc],
    ) -> Result<CilTypeRc> {
        match &ty.flavor {
            CilFlavor::GenericParameter { index, method } => {
                let args = if *method { method_args } else { type_args };
                Ok(args
                    .get(*index as usize)
                    .cloned()
                    .unwrap_or_else(|| ty.clone()))
            }
            CilFlavor::GenericInstance => {
                let Some(definition) = ty.generic_definition() else {
                    return Ok(ty.clone());
                };

                let current = ty.generic_arguments();
                let mut substituted = Vec::with_capacity(current.len());
                for arg in &current {
                    substituted.push(self.substitute(arg, type_args, method_args)?);
                }

                if substituted
                    .iter()
                    .zip(&current)
                    .all(|(new, old)| new.token == old.token)
                {
                    return Ok(ty.clone());
                }

                self.make_generic_instance(&definition, &substituted)
            }
            CilFlavor::Array { .. } => match ty.element_type() {
                Some(element) => {
                    let substituted = self.substitute(&element, type_args, method_args)?;
                    if substituted.token == element.token {
                        Ok(ty.clone())
                    } else {
                        self.make_array(&substituted)
                    }
                }
                None => Ok(ty.clone()),
            },
            _ => Ok(ty.clone()),
        }
    }

    /// Instantiate a generic method over `args`.
    ///
    /// # Errors
    /// - [`Error::TypeError`] if the method is not generic or the arity differs
    /// - [`Error::ConstraintViolation`] if a concrete argument violates a constraint
    pub fn make_method_spec(&self, method: &MethodRc, args: &[CilTypeRc]) -> Result<MethodSpecRc> {
        let arity = method.generic_params.count();
        if arity == 0 || arity != args.len() {
            return Err(Error::TypeError(format!(
                "Method '{}' expects {} generic argument(s), got {}",
                method.name,
                arity,
                args.len()
            )));
        }

        let key = (method.token, args.iter().map(|arg| arg.token).collect());
        if let Some(token) = self.method_spec_index.get(&key).map(|t| *t) {
            return self.get_method_spec(&token);
        }

        for (_, param) in method.generic_params.iter() {
            let Some(arg) = args.get(param.number as usize) else {
                continue;
            };
            if arg.contains_generic_parameters() {
                continue;
            }

            param.check(arg, |constraint| self.substitute(constraint, &[], args))?;
        }

        let spec = Arc::new(MethodSpec::new(
            self.alloc_token(TableId::MethodSpec),
            method.clone(),
            args,
        ));

        let token = *self.method_spec_index.entry(key).or_insert(spec.token);
        if token == spec.token {
            self.method_specs.insert(spec.token, spec.clone());
            return Ok(spec);
        }

        self.get_method_spec(&token)
    }

    /// Insert a constructed type unless another thread interned an equal one first
    fn intern<K>(&self, index: &DashMap<K, Token>, key: K, candidate: CilTypeRc) -> Result<CilTypeRc>
    where
        K: std::hash::Hash + Eq,
    {
        let token = *index.entry(key).or_insert(candidate.token);
        if token == candidate.token {
            self.types.insert(candidate.token, candidate.clone());
            return Ok(candidate);
        }

        self.resolve_type(&token)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.len())
            .field("methods", &self.methods.len())
            .field("fields", &self.fields.len())
            .field("method_specs", &self.method_specs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        builders::{ClassBuilder, GenericParamSpec, InterfaceBuilder},
        tables::GenericParamAttributes,
    };

    #[test]
    fn test_core_types_present() -> Result<()> {
        let registry = TypeRegistry::new()?;

        for name in [
            "System.Object",
            "System.ValueType",
            "System.String",
            "System.Int32",
            "System.DateTime",
            "System.Nullable`1",
            "System.Reflection.MethodInfo",
        ] {
            assert!(registry.get_by_fullname(name).is_some(), "{name} missing");
        }

        let int32 = registry.primitive(&CilFlavor::I4)?;
        assert_eq!(int32.fullname(), "System.Int32");
        assert!(registry.get_by_fullname("System.Missing").is_none());
        Ok(())
    }

    #[test]
    fn test_tokens_are_unique() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let first = registry.alloc_token(TableId::TypeDef);
        let second = registry.alloc_token(TableId::TypeDef);

        assert_ne!(first, second);
        assert!(second.row() > first.row());
        assert!(registry.get(&first).is_none());
        Ok(())
    }

    #[test]
    fn test_duplicate_fullname_rejected() -> Result<()> {
        let registry = TypeRegistry::new()?;
        InterfaceBuilder::new("Demo", "IShape").build(&registry)?;

        let result = InterfaceBuilder::new("Demo", "IShape").build(&registry);
        assert!(matches!(result, Err(Error::TypeInsert(_))));
        Ok(())
    }

    #[test]
    fn test_generic_parameters_are_interned() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let t0 = registry.generic_parameter(0, false)?;
        let m0 = registry.generic_parameter(0, true)?;

        assert!(Arc::ptr_eq(&t0, &registry.generic_parameter(0, false)?));
        assert!(!Arc::ptr_eq(&t0, &m0));
        assert_eq!(t0.fullname(), "!0");
        assert_eq!(m0.fullname(), "!!0");
        assert!(t0.is_visible());
        Ok(())
    }

    #[test]
    fn test_generic_instance_substitutes_interfaces() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let t0 = registry.generic_parameter(0, false)?;
        let source = InterfaceBuilder::new("Demo", "ISource`1")
            .generic_param(GenericParamSpec::new("T"))
            .build(&registry)?;
        let open_source = registry.make_generic_instance(&source, &[t0])?;
        let repo = InterfaceBuilder::new("Demo", "IRepo`1")
            .generic_param(GenericParamSpec::new("T"))
            .extends(&open_source)
            .build(&registry)?;

        let string = registry.wellknown("System.String")?;
        let closed = registry.make_generic_instance(&repo, &[string])?;

        assert!(!closed.contains_generic_parameters());
        let inherited = closed.declared_interfaces();
        assert_eq!(inherited.len(), 1);
        assert_eq!(inherited[0].fullname(), "Demo.ISource`1<System.String>");
        assert!(open_source.contains_generic_parameters());
        Ok(())
    }

    #[test]
    fn test_value_type_constraint_rejects_string() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let boxer = ClassBuilder::new("Demo", "Boxer`1")
            .generic_param(
                GenericParamSpec::new("T")
                    .flags(GenericParamAttributes::NOT_NULLABLE_VALUE_TYPE_CONSTRAINT),
            )
            .build(&registry)?;

        let int32 = registry.wellknown("System.Int32")?;
        assert!(registry.make_generic_instance(&boxer, &[int32]).is_ok());

        let string = registry.wellknown("System.String")?;
        let result = registry.make_generic_instance(&boxer, &[string]);
        assert!(matches!(result, Err(Error::ConstraintViolation { .. })));
        Ok(())
    }

    #[test]
    fn test_arity_mismatch() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let nullable = registry.wellknown("System.Nullable`1")?;
        let int32 = registry.wellknown("System.Int32")?;

        let result = registry.make_generic_instance(&nullable, &[int32.clone(), int32]);
        assert!(matches!(result, Err(Error::TypeError(_))));
        Ok(())
    }

    #[test]
    fn test_arrays_are_interned() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let object = registry.wellknown("System.Object")?;
        let string = registry.wellknown("System.String")?;

        let objects = registry.make_array(&object)?;
        assert!(Arc::ptr_eq(&objects, &registry.make_array(&object)?));
        assert_eq!(objects.fullname(), "System.Object[]");

        let strings = registry.make_array(&string)?;
        assert!(strings.is_assignable_to(&objects));
        Ok(())
    }
}
