//! Type system: the reflection-like object model that proxies are synthesized against.
//!
//! # Architecture
//!
//! - [`CilType`] - A type with its members and relationships
//! - [`CilFlavor`] - Primitive, category or constructed classification
//! - [`TypeRegistry`] - Token-indexed, thread-safe owner of every type and member
//! - [`CilPrimitiveData`] - Constant values with culture-invariant conversion
//!
//! Types are shared as [`CilTypeRc`] (`Arc<CilType>`) and reference each other through
//! [`CilTypeRef`] weak handles. Member lists are append-only [`boxcar::Vec`]s and
//! singular relationships are [`std::sync::OnceLock`]s, so a type can be populated
//! incrementally by a builder and then shared without further synchronization.
//!
//! # Examples
//!
//! ```rust
//! use cilproxy::metadata::typesystem::TypeRegistry;
//!
//! let registry = TypeRegistry::new()?;
//! let int32 = registry.get_by_fullname("System.Int32").unwrap();
//! assert!(int32.is_value_type());
//! assert!(int32.is_visible());
//! # Ok::<(), cilproxy::Error>(())
//! ```

mod base;
mod corlib;
mod primitives;
mod registry;

pub use base::{
    CilFlavor, CilTypeList, CilTypeRc, CilTypeRef, CilTypeRefList, TypeAttributes,
    TypeVisibility, ELEMENT_TYPE,
};
pub use corlib::{
    DYNAMICALLY_ATTRIBUTE_FULLNAME, DYNAMIC_PROXY_FULLNAME, IPROXY_INSTANCE_FULLNAME,
    METHOD_BASE_FULLNAME, METHOD_INFO_FULLNAME,
};
pub use primitives::CilPrimitiveData;
pub use registry::TypeRegistry;

use std::sync::{Arc, OnceLock};

use crate::{
    metadata::{
        customattributes::CustomAttributeValueList,
        method::{MethodImpl, MethodImplList, MethodList, MethodRc},
        tables::{FieldList, FieldRc, GenericParamList, PropertyList},
        token::Token,
    },
    Result,
};

/// Marker generic arguments of System.Nullable`1 are recognized by this name
pub const NULLABLE_FULLNAME: &str = "System.Nullable`1";

/// A type: definition, constructed instance, array or generic parameter placeholder.
pub struct CilType {
    /// Token of this type (`TypeDef` for definitions, `TypeSpec` for constructed types)
    pub token: Token,
    /// Classification
    pub flavor: CilFlavor,
    /// Namespace, empty for nested and constructed types
    pub namespace: String,
    /// Simple name (with arity suffix for generic definitions)
    pub name: String,
    /// Type attributes
    pub flags: TypeAttributes,
    base: OnceLock<CilTypeRef>,
    declaring_type: OnceLock<CilTypeRef>,
    element: OnceLock<CilTypeRef>,
    generic_definition: OnceLock<CilTypeRef>,
    /// Directly declared interfaces
    pub interfaces: CilTypeRefList,
    /// Declared methods, including constructors and property accessors
    pub methods: MethodList,
    /// Declared fields
    pub fields: FieldList,
    /// Declared properties
    pub properties: PropertyList,
    /// Generic parameter definitions (for generic definitions)
    pub generic_params: GenericParamList,
    /// Generic arguments (for generic instances)
    pub generic_args: CilTypeRefList,
    /// Explicit overrides (`MethodImpl` rows)
    pub method_impls: MethodImplList,
    /// Custom attributes applied to the type
    pub custom_attributes: CustomAttributeValueList,
}

impl CilType {
    /// Create a new, empty type
    #[must_use]
    pub fn new(
        token: Token,
        flavor: CilFlavor,
        namespace: String,
        name: String,
        flags: TypeAttributes,
    ) -> Self {
        CilType {
            token,
            flavor,
            namespace,
            name,
            flags,
            base: OnceLock::new(),
            declaring_type: OnceLock::new(),
            element: OnceLock::new(),
            generic_definition: OnceLock::new(),
            interfaces: Arc::new(boxcar::Vec::new()),
            methods: Arc::new(boxcar::Vec::new()),
            fields: Arc::new(boxcar::Vec::new()),
            properties: Arc::new(boxcar::Vec::new()),
            generic_params: Arc::new(boxcar::Vec::new()),
            generic_args: Arc::new(boxcar::Vec::new()),
            method_impls: Arc::new(boxcar::Vec::new()),
            custom_attributes: Arc::new(boxcar::Vec::new()),
        }
    }

    /// Set the base type. Can only be set once.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a base type was already set.
    pub fn set_base(&self, base: &CilTypeRc) -> Result<()> {
        self.base
            .set(CilTypeRef::new(base))
            .map_err(|_| malformed_error!("Base type of '{}' is already set", self.name))
    }

    /// Base type, if any
    #[must_use]
    pub fn base(&self) -> Option<CilTypeRc> {
        self.base.get().and_then(CilTypeRef::upgrade)
    }

    /// Set the enclosing type of a nested type. Can only be set once.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the declaring type was already set.
    pub fn set_declaring_type(&self, declaring: &CilTypeRc) -> Result<()> {
        self.declaring_type
            .set(CilTypeRef::new(declaring))
            .map_err(|_| malformed_error!("Declaring type of '{}' is already set", self.name))
    }

    /// Enclosing type, for nested types
    #[must_use]
    pub fn declaring_type(&self) -> Option<CilTypeRc> {
        self.declaring_type.get().and_then(CilTypeRef::upgrade)
    }

    pub(crate) fn set_element(&self, element: &CilTypeRc) -> Result<()> {
        self.element
            .set(CilTypeRef::new(element))
            .map_err(|_| malformed_error!("Element type of '{}' is already set", self.name))
    }

    /// Element type, for arrays
    #[must_use]
    pub fn element_type(&self) -> Option<CilTypeRc> {
        self.element.get().and_then(CilTypeRef::upgrade)
    }

    pub(crate) fn set_generic_definition(&self, definition: &CilTypeRc) -> Result<()> {
        self.generic_definition
            .set(CilTypeRef::new(definition))
            .map_err(|_| malformed_error!("Generic definition of '{}' is already set", self.name))
    }

    /// Generic definition, for generic instances
    #[must_use]
    pub fn generic_definition(&self) -> Option<CilTypeRc> {
        self.generic_definition.get().and_then(CilTypeRef::upgrade)
    }

    /// Generic arguments as strong handles
    #[must_use]
    pub fn generic_arguments(&self) -> Vec<CilTypeRc> {
        self.generic_args
            .iter()
            .filter_map(|(_, arg)| arg.upgrade())
            .collect()
    }

    /// Fully qualified name.
    ///
    /// Nested types use `Outer+Inner`, generic instances list their arguments
    /// (`NS.IRepo`1<System.Int32>`) and arrays append `[]`.
    #[must_use]
    pub fn fullname(&self) -> String {
        match &self.flavor {
            CilFlavor::GenericInstance => {
                let definition = self
                    .generic_definition()
                    .map_or_else(|| self.name.clone(), |d| d.fullname());
                let args: Vec<String> = self
                    .generic_args
                    .iter()
                    .map(|(_, arg)| arg.fullname().unwrap_or_else(|| "?".to_string()))
                    .collect();
                format!("{definition}<{}>", args.join(","))
            }
            CilFlavor::Array { .. } => match self.element_type() {
                Some(element) => format!("{}[]", element.fullname()),
                None => format!("{}[]", self.name),
            },
            CilFlavor::GenericParameter { .. } => self.name.clone(),
            _ => match self.declaring_type() {
                Some(declaring) => format!("{}+{}", declaring.fullname(), self.name),
                None if self.namespace.is_empty() => self.name.clone(),
                None => format!("{}.{}", self.namespace, self.name),
            },
        }
    }

    /// True for interfaces, including instances of generic interfaces
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(TypeAttributes::INTERFACE)
    }

    /// True if the type cannot be derived from
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.flags.contains(TypeAttributes::SEALED)
    }

    /// True if the type cannot be instantiated directly
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(TypeAttributes::ABSTRACT)
    }

    /// True for `System.Enum` derived types
    #[must_use]
    pub fn is_enum(&self) -> bool {
        self.base()
            .is_some_and(|base| base.fullname() == "System.Enum")
    }

    /// True for value types: primitives, user structs, enums and `Nullable<T>`
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match &self.flavor {
            CilFlavor::GenericInstance => self
                .generic_definition()
                .is_some_and(|definition| definition.is_value_type()),
            flavor => flavor.is_value_type(),
        }
    }

    /// True for `System.Nullable<T>` instances
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.flavor == CilFlavor::GenericInstance
            && self
                .generic_definition()
                .is_some_and(|definition| definition.fullname() == NULLABLE_FULLNAME)
    }

    /// `T` of a `Nullable<T>`
    #[must_use]
    pub fn nullable_underlying(&self) -> Option<CilTypeRc> {
        if !self.is_nullable() {
            return None;
        }

        self.generic_arguments().into_iter().next()
    }

    /// Underlying primitive type of an enum, from its `value__` field
    #[must_use]
    pub fn enum_underlying(&self) -> Option<CilTypeRc> {
        if !self.is_enum() {
            return None;
        }

        self.field_by_name("value__").and_then(|field| field.ty())
    }

    /// True for generic parameter placeholders
    #[must_use]
    pub fn is_generic_parameter(&self) -> bool {
        matches!(self.flavor, CilFlavor::GenericParameter { .. })
    }

    /// True for generic type definitions (declares parameters, no arguments)
    #[must_use]
    pub fn is_generic_definition(&self) -> bool {
        self.flavor != CilFlavor::GenericInstance && !self.generic_params.is_empty()
    }

    /// True if this type, or any type it is constructed from, is an unbound
    /// generic parameter. Generic definitions count as open.
    #[must_use]
    pub fn contains_generic_parameters(&self) -> bool {
        match &self.flavor {
            CilFlavor::GenericParameter { .. } => true,
            CilFlavor::GenericInstance => self
                .generic_arguments()
                .iter()
                .any(|arg| arg.contains_generic_parameters()),
            CilFlavor::Array { .. } => self
                .element_type()
                .is_some_and(|element| element.contains_generic_parameters()),
            _ => self.is_generic_definition(),
        }
    }

    /// True if the type is reachable from outside its defining module.
    ///
    /// Top-level types must be public. Nested types must be nested-public with a
    /// visible enclosing type. Generic instances additionally require every generic
    /// argument to be visible, and arrays follow their element type. Generic
    /// parameter placeholders are always visible.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        match &self.flavor {
            CilFlavor::GenericParameter { .. } => true,
            CilFlavor::Array { .. } => self
                .element_type()
                .is_some_and(|element| element.is_visible()),
            CilFlavor::GenericInstance => {
                self.generic_definition()
                    .is_some_and(|definition| definition.is_visible())
                    && self.generic_arguments().iter().all(|arg| arg.is_visible())
            }
            _ => match self.declaring_type() {
                Some(declaring) => {
                    declaring.is_visible()
                        && self.flags.visibility() == TypeVisibility::NestedPublic
                }
                None => self.flags.visibility() == TypeVisibility::Public,
            },
        }
    }

    /// The type whose member lists hold this type's members.
    ///
    /// Generic instances share the members of their definition, everything else
    /// owns its members.
    #[must_use]
    pub fn member_owner(self: &Arc<Self>) -> CilTypeRc {
        if self.flavor == CilFlavor::GenericInstance {
            if let Some(definition) = self.generic_definition() {
                return definition;
            }
        }

        self.clone()
    }

    /// Directly declared interfaces as strong handles
    #[must_use]
    pub fn declared_interfaces(&self) -> Vec<CilTypeRc> {
        self.interfaces
            .iter()
            .filter_map(|(_, iface)| iface.upgrade())
            .collect()
    }

    /// Every interface this type implements, in declaration order, depth-first,
    /// walking the base chain. May contain duplicates.
    #[must_use]
    pub fn all_interfaces(&self) -> Vec<CilTypeRc> {
        fn walk(iface: &CilTypeRc, out: &mut Vec<CilTypeRc>) {
            out.push(iface.clone());
            for inherited in iface.declared_interfaces() {
                walk(&inherited, out);
            }
        }

        let mut out = Vec::new();
        let mut current = Some(self.declared_interfaces());
        let mut base = self.base();
        while let Some(interfaces) = current {
            for iface in &interfaces {
                walk(iface, &mut out);
            }

            current = base.as_ref().map(|b| b.declared_interfaces());
            base = base.and_then(|b| b.base());
        }

        out
    }

    /// True if a value of this type can be stored in a location of `target`
    #[must_use]
    pub fn is_assignable_to(&self, target: &CilType) -> bool {
        if self.token == target.token || target.flavor == CilFlavor::Object {
            return true;
        }

        if target.is_interface()
            && self
                .all_interfaces()
                .iter()
                .any(|iface| iface.token == target.token)
        {
            return true;
        }

        if let (CilFlavor::Array { .. }, CilFlavor::Array { .. }) = (&self.flavor, &target.flavor)
        {
            if let (Some(source), Some(dest)) = (self.element_type(), target.element_type()) {
                return !source.is_value_type() && source.is_assignable_to(&dest);
            }
        }

        let mut current = self.base();
        while let Some(base) = current {
            if base.token == target.token {
                return true;
            }
            current = base.base();
        }

        false
    }

    /// First declared method with the given name
    #[must_use]
    pub fn method_by_name(&self, name: &str) -> Option<MethodRc> {
        self.methods
            .iter()
            .map(|(_, method)| method)
            .find(|method| method.name == name)
            .cloned()
    }

    /// All declared methods with the given name
    #[must_use]
    pub fn methods_by_name(&self, name: &str) -> Vec<MethodRc> {
        self.methods
            .iter()
            .map(|(_, method)| method)
            .filter(|method| method.name == name)
            .cloned()
            .collect()
    }

    /// Declared instance constructors
    #[must_use]
    pub fn constructors(&self) -> Vec<MethodRc> {
        self.methods_by_name(".ctor")
    }

    /// Declared field with the given name
    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<FieldRc> {
        self.fields
            .iter()
            .map(|(_, field)| field)
            .find(|field| field.name == name)
            .cloned()
    }

    /// Resolve the method that executes when `declaration` is invoked on an
    /// instance of this type.
    ///
    /// Walks from this type to its bases. At each level an explicit override
    /// (`MethodImpl`) wins, then a virtual method with the same name and signature
    /// (public, for interface declarations). Reaching the declaring type itself
    /// resolves to the declaration when it is not abstract.
    #[must_use]
    pub fn resolve_method(self: &Arc<Self>, declaration: &MethodRc) -> Option<MethodRc> {
        let declaring_is_interface = declaration
            .declaring_type()
            .is_some_and(|t| t.is_interface());

        let mut current = Some(self.member_owner());
        while let Some(level) = current {
            if let Some(MethodImpl { body, .. }) = level
                .method_impls
                .iter()
                .map(|(_, entry)| entry)
                .find(|entry| entry.declaration.token == declaration.token)
            {
                return Some(body.clone());
            }

            if let Some(candidate) = level.methods.iter().map(|(_, m)| m).find(|m| {
                m.name == declaration.name
                    && m.is_virtual()
                    && (!declaring_is_interface || m.is_public())
                    && m.signature_matches(declaration)
            }) {
                if !candidate.is_abstract() {
                    return Some(candidate.clone());
                }
            }

            if declaration
                .declaring_type()
                .is_some_and(|t| t.token == level.token)
                && !declaration.is_abstract()
            {
                return Some(declaration.clone());
            }

            current = level.base().map(|base| base.member_owner());
        }

        None
    }
}

impl std::fmt::Debug for CilType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CilType")
            .field("token", &self.token)
            .field("flavor", &self.flavor)
            .field("fullname", &self.fullname())
            .field("flags", &self.flags)
            .field("methods", &self.methods.count())
            .field("fields", &self.fields.count())
            .finish()
    }
}
