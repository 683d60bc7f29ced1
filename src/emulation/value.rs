//! Runtime values and heap objects.
//!
//! [`EmValue`] is the unit of the evaluation stack, of arguments and locals and of
//! everything host methods exchange with emitted code. Small integers, booleans and
//! chars are widened to [`EmValue::I32`] as on the CIL stack, `long` and native
//! integers use [`EmValue::I64`], floating point uses [`EmValue::F64`].
//!
//! Objects live on the heap as [`HeapObject`]s shared through [`ObjectRef`]. Instance
//! fields are guarded by a `RwLock`, so an object can be shared between threads.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

use crate::{
    metadata::{
        method::MethodRc,
        token::Token,
        typesystem::{CilFlavor, CilType, CilTypeRc},
    },
    Error, Result,
};

/// A shared heap object
pub type ObjectRef = Arc<HeapObject>;

/// A method together with its generic context
#[derive(Clone)]
pub struct RuntimeMethod {
    /// The method definition
    pub method: MethodRc,
    /// Arguments of the declaring type's generic parameters
    pub type_args: Vec<CilTypeRc>,
    /// Arguments of the method's own generic parameters
    pub method_args: Vec<CilTypeRc>,
}

impl RuntimeMethod {
    /// A method without generic context
    #[must_use]
    pub fn new(method: MethodRc) -> Self {
        RuntimeMethod {
            method,
            type_args: Vec::new(),
            method_args: Vec::new(),
        }
    }

    /// Set the method-level generic arguments
    #[must_use]
    pub fn with_method_args(mut self, method_args: Vec<CilTypeRc>) -> Self {
        self.method_args = method_args;
        self
    }

    /// Set the type-level generic arguments
    #[must_use]
    pub fn with_type_args(mut self, type_args: Vec<CilTypeRc>) -> Self {
        self.type_args = type_args;
        self
    }

    /// Simple name of the method
    #[must_use]
    pub fn name(&self) -> &str {
        &self.method.name
    }

    /// True if both refer to the same definition with the same instantiation
    #[must_use]
    pub fn same_as(&self, other: &RuntimeMethod) -> bool {
        fn tokens(types: &[CilTypeRc]) -> Vec<Token> {
            types.iter().map(|ty| ty.token).collect()
        }

        self.method.token == other.method.token
            && tokens(&self.type_args) == tokens(&other.type_args)
            && tokens(&self.method_args) == tokens(&other.method_args)
    }
}

impl fmt::Debug for RuntimeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method.fullname())?;
        if !self.method_args.is_empty() {
            let args: Vec<String> = self.method_args.iter().map(|arg| arg.fullname()).collect();
            write!(f, "<{}>", args.join(","))?;
        }
        Ok(())
    }
}

/// Payload of a heap object
pub enum HeapObjectKind {
    /// A class instance with its instance fields, keyed by field token
    Instance(RwLock<HashMap<Token, EmValue>>),
    /// A boxed value type
    Boxed(EmValue),
    /// A string
    String(String),
    /// A single-dimension array
    Array {
        /// Element type
        element: CilTypeRc,
        /// Elements
        items: RwLock<Vec<EmValue>>,
    },
    /// A `System.Reflection.MethodInfo`
    MethodInfo(RuntimeMethod),
    /// A `System.Type`
    TypeInfo(CilTypeRc),
}

/// An object on the runtime heap
pub struct HeapObject {
    /// Exact runtime type
    pub ty: CilTypeRc,
    /// Payload
    pub kind: HeapObjectKind,
}

impl HeapObject {
    /// Create a heap object
    #[must_use]
    pub fn new(ty: CilTypeRc, kind: HeapObjectKind) -> ObjectRef {
        Arc::new(HeapObject { ty, kind })
    }

    /// Read an instance field
    ///
    /// # Errors
    /// Returns [`Error::FieldNotFound`] if the object has no such field.
    pub fn get_field(&self, field: Token) -> Result<EmValue> {
        match &self.kind {
            HeapObjectKind::Instance(fields) => {
                let fields = read_lock!(fields);
                fields.get(&field).cloned().ok_or(Error::FieldNotFound(field))
            }
            _ => Err(Error::FieldNotFound(field)),
        }
    }

    /// Write an instance field
    ///
    /// # Errors
    /// Returns [`Error::FieldNotFound`] if the object has no such field.
    pub fn set_field(&self, field: Token, value: EmValue) -> Result<()> {
        match &self.kind {
            HeapObjectKind::Instance(fields) => {
                let mut fields = write_lock!(fields);
                match fields.get_mut(&field) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(Error::FieldNotFound(field)),
                }
            }
            _ => Err(Error::FieldNotFound(field)),
        }
    }

    /// Number of array elements
    ///
    /// # Errors
    /// Returns [`Error::InvalidCast`] if the object is not an array.
    pub fn array_len(&self) -> Result<usize> {
        match &self.kind {
            HeapObjectKind::Array { items, .. } => Ok(read_lock!(items).len()),
            _ => Err(self.not_an_array()),
        }
    }

    /// Read an array element
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] for a bad index, [`Error::InvalidCast`] for non-arrays.
    pub fn array_get(&self, index: usize) -> Result<EmValue> {
        match &self.kind {
            HeapObjectKind::Array { items, .. } => {
                read_lock!(items).get(index).cloned().ok_or(Error::OutOfBounds)
            }
            _ => Err(self.not_an_array()),
        }
    }

    /// Write an array element, checking reference element types
    ///
    /// # Errors
    /// - [`Error::OutOfBounds`] for a bad index
    /// - [`Error::InvalidCast`] if the value does not fit the element type
    pub fn array_set(&self, index: usize, value: EmValue) -> Result<()> {
        match &self.kind {
            HeapObjectKind::Array { element, items } => {
                if !value.is_instance_of(element) {
                    return Err(Error::InvalidCast {
                        from: value.type_name(),
                        to: element.fullname(),
                    });
                }

                let mut items = write_lock!(items);
                let slot = items.get_mut(index).ok_or(Error::OutOfBounds)?;
                *slot = value;
                Ok(())
            }
            _ => Err(self.not_an_array()),
        }
    }

    /// Snapshot of all array elements
    ///
    /// # Errors
    /// Returns [`Error::InvalidCast`] if the object is not an array.
    pub fn array_items(&self) -> Result<Vec<EmValue>> {
        match &self.kind {
            HeapObjectKind::Array { items, .. } => Ok(read_lock!(items).clone()),
            _ => Err(self.not_an_array()),
        }
    }

    /// The string contents, for strings
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            HeapObjectKind::String(value) => Some(value),
            _ => None,
        }
    }

    /// The reflected method, for `MethodInfo` objects
    #[must_use]
    pub fn method_info(&self) -> Option<&RuntimeMethod> {
        match &self.kind {
            HeapObjectKind::MethodInfo(method) => Some(method),
            _ => None,
        }
    }

    fn not_an_array(&self) -> Error {
        Error::InvalidCast {
            from: self.ty.fullname(),
            to: "System.Array".to_string(),
        }
    }
}

impl fmt::Debug for HeapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            HeapObjectKind::String(value) => write!(f, "{value:?}"),
            HeapObjectKind::Boxed(value) => write!(f, "box({value:?})"),
            HeapObjectKind::MethodInfo(method) => write!(f, "MethodInfo({method:?})"),
            HeapObjectKind::TypeInfo(ty) => write!(f, "Type({})", ty.fullname()),
            HeapObjectKind::Array { element, .. } => write!(f, "{}[]", element.fullname()),
            HeapObjectKind::Instance(_) => write!(f, "{}", self.ty.fullname()),
        }
    }
}

/// A value on the evaluation stack.
#[derive(Clone)]
pub enum EmValue {
    /// No value, the result of void methods
    Void,
    /// The null reference
    Null,
    /// 32-bit integer, also `bool`, `char` and the small integer types
    I32(i32),
    /// 64-bit integer, also native integers
    I64(i64),
    /// Floating point, `float` and `double`
    F64(f64),
    /// Reference to a heap object
    ObjectRef(ObjectRef),
    /// A `RuntimeMethodHandle` as produced by `ldtoken`
    MethodHandle(RuntimeMethod),
    /// A `RuntimeTypeHandle` as produced by `ldtoken`
    TypeHandle(CilTypeRc),
}

/// The flavor a value of `ty` has on the stack: enums and `Nullable<T>` are seen
/// through to their underlying type
fn stack_flavor(ty: &CilType) -> CilFlavor {
    if let Some(underlying) = ty.nullable_underlying() {
        return stack_flavor(&underlying);
    }
    if let Some(underlying) = ty.enum_underlying() {
        return underlying.flavor.clone();
    }

    ty.flavor.clone()
}

impl EmValue {
    /// The zero value of a location typed `ty`
    #[must_use]
    pub fn default_for(ty: &CilType) -> EmValue {
        match stack_flavor(ty) {
            CilFlavor::Boolean
            | CilFlavor::Char
            | CilFlavor::I1
            | CilFlavor::U1
            | CilFlavor::I2
            | CilFlavor::U2
            | CilFlavor::I4
            | CilFlavor::U4 => EmValue::I32(0),
            CilFlavor::I8 | CilFlavor::U8 | CilFlavor::I | CilFlavor::U => EmValue::I64(0),
            CilFlavor::R4 | CilFlavor::R8 => EmValue::F64(0.0),
            _ => EmValue::Null,
        }
    }

    /// True for [`EmValue::Null`]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, EmValue::Null)
    }

    /// True for [`EmValue::Void`]
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, EmValue::Void)
    }

    /// The integer, for `I32`
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            EmValue::I32(value) => Some(*value),
            _ => None,
        }
    }

    /// The integer, for `I32` and `I64`
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            EmValue::I32(value) => Some(i64::from(*value)),
            EmValue::I64(value) => Some(*value),
            _ => None,
        }
    }

    /// The float, for `F64`
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EmValue::F64(value) => Some(*value),
            _ => None,
        }
    }

    /// The object, for `ObjectRef`
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            EmValue::ObjectRef(object) => Some(object),
            _ => None,
        }
    }

    /// The object, failing for null and non-references
    ///
    /// # Errors
    /// - [`Error::NullReference`] for null
    /// - [`Error::InvalidCast`] for values that are not references
    pub fn object(&self) -> Result<&ObjectRef> {
        match self {
            EmValue::ObjectRef(object) => Ok(object),
            EmValue::Null => Err(Error::NullReference("object expected".to_string())),
            other => Err(Error::InvalidCast {
                from: other.type_name(),
                to: "System.Object".to_string(),
            }),
        }
    }

    /// The string contents, for string objects
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_object().and_then(|object| object.as_str())
    }

    /// CIL truthiness: non-zero numbers and non-null references
    #[must_use]
    pub fn is_true(&self) -> bool {
        match self {
            EmValue::Void | EmValue::Null => false,
            EmValue::I32(value) => *value != 0,
            EmValue::I64(value) => *value != 0,
            EmValue::F64(value) => *value != 0.0,
            EmValue::ObjectRef(_) | EmValue::MethodHandle(_) | EmValue::TypeHandle(_) => true,
        }
    }

    /// True if this value can be stored in a location typed `ty`.
    ///
    /// Generic parameter placeholders accept anything but `Void`.
    #[must_use]
    pub fn is_instance_of(&self, ty: &CilType) -> bool {
        if ty.is_generic_parameter() {
            return !self.is_void();
        }

        match self {
            EmValue::Void => false,
            EmValue::Null => !ty.is_value_type() || ty.is_nullable(),
            EmValue::I32(_) => matches!(
                stack_flavor(ty),
                CilFlavor::Boolean
                    | CilFlavor::Char
                    | CilFlavor::I1
                    | CilFlavor::U1
                    | CilFlavor::I2
                    | CilFlavor::U2
                    | CilFlavor::I4
                    | CilFlavor::U4
            ),
            EmValue::I64(_) => matches!(
                stack_flavor(ty),
                CilFlavor::I8 | CilFlavor::U8 | CilFlavor::I | CilFlavor::U
            ),
            EmValue::F64(_) => matches!(stack_flavor(ty), CilFlavor::R4 | CilFlavor::R8),
            EmValue::ObjectRef(object) => object.ty.is_assignable_to(ty),
            EmValue::MethodHandle(_) => ty.fullname() == "System.RuntimeMethodHandle",
            EmValue::TypeHandle(_) => ty.fullname() == "System.RuntimeTypeHandle",
        }
    }

    /// A short description of the value's type
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            EmValue::Void => "void".to_string(),
            EmValue::Null => "null".to_string(),
            EmValue::I32(_) => "int32".to_string(),
            EmValue::I64(_) => "int64".to_string(),
            EmValue::F64(_) => "float64".to_string(),
            EmValue::ObjectRef(object) => object.ty.fullname(),
            EmValue::MethodHandle(_) => "System.RuntimeMethodHandle".to_string(),
            EmValue::TypeHandle(_) => "System.RuntimeTypeHandle".to_string(),
        }
    }
}

impl From<i32> for EmValue {
    fn from(value: i32) -> Self {
        EmValue::I32(value)
    }
}

impl From<bool> for EmValue {
    fn from(value: bool) -> Self {
        EmValue::I32(i32::from(value))
    }
}

impl From<i64> for EmValue {
    fn from(value: i64) -> Self {
        EmValue::I64(value)
    }
}

impl From<f64> for EmValue {
    fn from(value: f64) -> Self {
        EmValue::F64(value)
    }
}

impl PartialEq for EmValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EmValue::Void, EmValue::Void) | (EmValue::Null, EmValue::Null) => true,
            (EmValue::I32(a), EmValue::I32(b)) => a == b,
            (EmValue::I64(a), EmValue::I64(b)) => a == b,
            (EmValue::F64(a), EmValue::F64(b)) => a == b,
            (EmValue::ObjectRef(a), EmValue::ObjectRef(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }

                match (&a.kind, &b.kind) {
                    (HeapObjectKind::String(x), HeapObjectKind::String(y)) => x == y,
                    (HeapObjectKind::Boxed(x), HeapObjectKind::Boxed(y)) => {
                        a.ty.token == b.ty.token && x == y
                    }
                    _ => false,
                }
            }
            (EmValue::MethodHandle(a), EmValue::MethodHandle(b)) => a.same_as(b),
            (EmValue::TypeHandle(a), EmValue::TypeHandle(b)) => a.token == b.token,
            _ => false,
        }
    }
}

impl fmt::Debug for EmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmValue::Void => write!(f, "void"),
            EmValue::Null => write!(f, "null"),
            EmValue::I32(value) => write!(f, "{value}"),
            EmValue::I64(value) => write!(f, "{value}L"),
            EmValue::F64(value) => write!(f, "{value}"),
            EmValue::ObjectRef(object) => write!(f, "{object:?}"),
            EmValue::MethodHandle(method) => write!(f, "handle({method:?})"),
            EmValue::TypeHandle(ty) => write!(f, "handle({})", ty.fullname()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{builders::EnumBuilder, typesystem::TypeRegistry};

    #[test]
    fn test_default_for() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let shade = EnumBuilder::new("Demo", "Shade")
            .underlying(CilFlavor::I8)
            .variant("Dark", 1)
            .build(&registry)?;

        let boolean = registry.wellknown("System.Boolean")?;
        let double = registry.wellknown("System.Double")?;
        let string = registry.wellknown("System.String")?;

        assert_eq!(EmValue::default_for(&boolean), EmValue::I32(0));
        assert_eq!(EmValue::default_for(&shade), EmValue::I64(0));
        assert_eq!(EmValue::default_for(&double), EmValue::F64(0.0));
        assert!(EmValue::default_for(&string).is_null());
        Ok(())
    }

    #[test]
    fn test_is_instance_of() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let int32 = registry.wellknown("System.Int32")?;
        let string = registry.wellknown("System.String")?;
        let object = registry.wellknown("System.Object")?;
        let nullable = registry.make_generic_instance(
            &registry.wellknown("System.Nullable`1")?,
            &[int32.clone()],
        )?;

        let text = EmValue::ObjectRef(HeapObject::new(
            string.clone(),
            HeapObjectKind::String("hi".to_string()),
        ));
        assert!(text.is_instance_of(&string));
        assert!(text.is_instance_of(&object));
        assert!(!text.is_instance_of(&int32));

        assert!(EmValue::I32(3).is_instance_of(&int32));
        assert!(EmValue::I32(3).is_instance_of(&nullable));
        assert!(!EmValue::I32(3).is_instance_of(&object));
        assert!(EmValue::Null.is_instance_of(&nullable));
        assert!(!EmValue::Null.is_instance_of(&int32));
        Ok(())
    }

    #[test]
    fn test_equality() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let string = registry.wellknown("System.String")?;
        let make = |text: &str| {
            EmValue::ObjectRef(HeapObject::new(
                string.clone(),
                HeapObjectKind::String(text.to_string()),
            ))
        };

        assert_eq!(make("a"), make("a"));
        assert_ne!(make("a"), make("b"));
        assert_ne!(EmValue::I32(1), EmValue::I64(1));
        assert!(EmValue::from(true).is_true());
        assert!(!EmValue::Null.is_true());
        Ok(())
    }

    #[test]
    fn test_array_set_checks_element_type() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let string = registry.wellknown("System.String")?;
        let array = HeapObject::new(
            registry.make_array(&string)?,
            HeapObjectKind::Array {
                element: string.clone(),
                items: RwLock::new(vec![EmValue::Null; 2]),
            },
        );

        assert!(matches!(
            array.array_set(0, EmValue::I32(1)),
            Err(Error::InvalidCast { .. })
        ));
        assert!(matches!(
            array.array_set(5, EmValue::Null),
            Err(Error::OutOfBounds)
        ));
        assert_eq!(array.array_len()?, 2);
        Ok(())
    }
}
