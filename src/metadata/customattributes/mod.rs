//! Custom attributes applied to types, members, parameters and generic parameters.
//!
//! Attributes are stored as [`CustomAttributeValue`]s: the attribute constructor, the
//! fixed constructor arguments and the named field/property arguments, following
//! ECMA-335 II.23.3. [`CustomAttributeData`] is the reflection-style view of the same
//! data, with typed arguments and array arguments as nested collections.
//!
//! # Examples
//!
//! ```rust
//! use cilproxy::metadata::{
//!     builders::{ClassBuilder, MethodBuilder},
//!     customattributes::{CustomAttributeArgument, CustomAttributeData, CustomAttributeValue},
//!     typesystem::TypeRegistry,
//! };
//!
//! let registry = TypeRegistry::new()?;
//! let string = registry.wellknown("System.String")?;
//! let attribute = ClassBuilder::new("Demo", "TagAttribute")
//!     .extends(&registry.wellknown("System.Attribute")?)
//!     .constructor(MethodBuilder::constructor().param("tag", &string))
//!     .build(&registry)?;
//!
//! let value = CustomAttributeValue::new(attribute.constructors()[0].clone())
//!     .with_arg(CustomAttributeArgument::String(Some("fast".to_string())));
//! let data = CustomAttributeData::from_value(&value);
//! assert_eq!(data.constructor_arguments[0].arg_type, "System.String");
//! # Ok::<(), cilproxy::Error>(())
//! ```

mod data;
mod types;

pub use data::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            builders::{ClassBuilder, MethodBuilder},
            typesystem::TypeRegistry,
        },
        Result,
    };

    fn attribute_ctor(registry: &TypeRegistry) -> Result<crate::metadata::method::MethodRc> {
        let ints = registry.make_array(&registry.wellknown("System.Int32")?)?;
        let attribute = ClassBuilder::new("Demo", "RangeAttribute")
            .extends(&registry.wellknown("System.Attribute")?)
            .constructor(MethodBuilder::constructor().param("values", &ints))
            .build(registry)?;

        Ok(attribute.constructors()[0].clone())
    }

    #[test]
    fn test_array_arguments_become_collections() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let value = CustomAttributeValue::new(attribute_ctor(&registry)?).with_arg(
            CustomAttributeArgument::Array(
                "System.Int32".to_string(),
                vec![CustomAttributeArgument::I4(1), CustomAttributeArgument::I4(2)],
            ),
        );

        let data = CustomAttributeData::from_value(&value);
        let argument = &data.constructor_arguments[0];
        assert_eq!(argument.arg_type, "System.Int32[]");

        match &argument.value {
            TypedArgumentValue::Collection(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(
                    items[1].value,
                    TypedArgumentValue::Scalar(CustomAttributeArgument::I4(2))
                );
            }
            other => panic!("expected collection, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_named_arguments() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let value = CustomAttributeValue::new(attribute_ctor(&registry)?)
            .with_property("Name", CustomAttributeArgument::String(None))
            .with_field("Weight", CustomAttributeArgument::R8(0.5));

        assert!(value.is("Demo.RangeAttribute"));
        let data = CustomAttributeData::from_value(&value);
        assert_eq!(data.named_arguments.len(), 2);
        assert!(!data.named_arguments[0].is_field);
        assert_eq!(data.named_arguments[1].member_name, "Weight");
        assert_eq!(data.named_arguments[1].typed_value.arg_type, "System.Double");
        Ok(())
    }
}
