//! Reflection view of applied custom attributes.
//!
//! Reflection hands out attribute instances as a constructor plus *typed* arguments.
//! Scalars are typed values, while arrays arrive as a read-only collection of typed
//! sub-arguments that must be unpacked element by element to rebuild the attribute.

use crate::metadata::{
    customattributes::{CustomAttributeArgument, CustomAttributeValue},
    method::MethodRc,
};

/// An applied attribute as seen through reflection
#[derive(Debug, Clone)]
pub struct CustomAttributeData {
    /// The attribute constructor
    pub constructor: MethodRc,
    /// Constructor arguments
    pub constructor_arguments: Vec<TypedArgument>,
    /// Named field and property arguments
    pub named_arguments: Vec<NamedArgument>,
}

/// A typed argument value
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArgument {
    /// Full name of the argument type
    pub arg_type: String,
    /// The value
    pub value: TypedArgumentValue,
}

/// Payload of a [`TypedArgument`]
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArgumentValue {
    /// A single value
    Scalar(CustomAttributeArgument),
    /// An array, as a collection of typed elements
    Collection(Vec<TypedArgument>),
}

/// A typed named argument
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArgument {
    /// True for fields, false for properties
    pub is_field: bool,
    /// Member name
    pub member_name: String,
    /// The typed value
    pub typed_value: TypedArgument,
}

impl TypedArgument {
    fn from_argument(arg: &CustomAttributeArgument) -> Self {
        let value = match arg {
            CustomAttributeArgument::Array(_, items) => TypedArgumentValue::Collection(
                items.iter().map(TypedArgument::from_argument).collect(),
            ),
            scalar => TypedArgumentValue::Scalar(scalar.clone()),
        };

        TypedArgument {
            arg_type: arg.type_name(),
            value,
        }
    }
}

impl CustomAttributeData {
    /// The reflection view of a stored attribute value
    #[must_use]
    pub fn from_value(value: &CustomAttributeValue) -> Self {
        CustomAttributeData {
            constructor: value.constructor.clone(),
            constructor_arguments: value
                .fixed_args
                .iter()
                .map(TypedArgument::from_argument)
                .collect(),
            named_arguments: value
                .named_args
                .iter()
                .map(|named| NamedArgument {
                    is_field: named.is_field,
                    member_name: named.name.clone(),
                    typed_value: TypedArgument::from_argument(&named.value),
                })
                .collect(),
        }
    }
}
