//! Constants: default values of parameters and literal fields, §II.22.9.
//!
//! # Key Types
//! - [`Constant`] - The raw element type and value blob
//! - [`DefaultValue`] - A decoded default, with a sentinel for "no value supplied"
//! - [`accepts_constant`] - Whether a location type can hold a default

mod owned;

pub use owned::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            builders::EnumBuilder,
            typesystem::{CilPrimitiveData, TypeRegistry, ELEMENT_TYPE},
        },
        Error, Result,
    };

    #[test]
    fn test_null_constant_reads_as_null() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let string = registry.wellknown("System.String")?;

        assert_eq!(Constant::null().read_as(&string)?, DefaultValue::Null);
        assert_eq!(Constant::null().value, vec![0, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_primitive_round_trip() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let int32 = registry.wellknown("System.Int32")?;
        let constant = Constant::from_value(&CilPrimitiveData::I4(42));

        assert_eq!(constant.c_type, ELEMENT_TYPE::I4);
        assert_eq!(
            constant.read_as(&int32)?,
            DefaultValue::Value(CilPrimitiveData::I4(42))
        );
        assert!(Constant::from_default(&DefaultValue::Missing).is_none());
        Ok(())
    }

    #[test]
    fn test_datetime_constant_is_unreadable() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let date = registry.wellknown("System.DateTime")?;
        let constant = Constant::from_value(&CilPrimitiveData::I8(0));

        assert!(matches!(
            constant.read_as(&date),
            Err(Error::ConstantFormat { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_enum_constant_must_match_underlying() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let color = EnumBuilder::new("Demo", "Color")
            .variant("Red", 0)
            .variant("Green", 1)
            .build(&registry)?;

        let good = Constant::from_value(&CilPrimitiveData::I4(1));
        assert_eq!(
            good.read_as(&color)?,
            DefaultValue::Value(CilPrimitiveData::I4(1))
        );

        let bad = Constant::from_value(&CilPrimitiveData::I8(1));
        assert!(matches!(bad.read_as(&color), Err(Error::ConstantFormat { .. })));
        Ok(())
    }

    #[test]
    fn test_accepts_constant() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let int32 = registry.wellknown("System.Int32")?;
        let int64 = registry.wellknown("System.Int64")?;
        let string = registry.wellknown("System.String")?;
        let object = registry.wellknown("System.Object")?;
        let nullable = registry.wellknown("System.Nullable`1")?;
        let nullable_int = registry.make_generic_instance(&nullable, &[int32.clone()])?;

        let five = DefaultValue::Value(CilPrimitiveData::I4(5));
        assert!(accepts_constant(&int32, &five));
        assert!(!accepts_constant(&int64, &five));
        assert!(accepts_constant(&object, &five));
        assert!(accepts_constant(&nullable_int, &five));

        assert!(accepts_constant(&string, &DefaultValue::Null));
        assert!(!accepts_constant(&int32, &DefaultValue::Null));
        assert!(!accepts_constant(&nullable_int, &DefaultValue::Null));
        Ok(())
    }

    #[test]
    fn test_nullable_enum_never_accepts() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let color = EnumBuilder::new("Demo", "Shade").variant("Dark", 0).build(&registry)?;
        let nullable = registry.wellknown("System.Nullable`1")?;
        let nullable_color = registry.make_generic_instance(&nullable, &[color.clone()])?;

        let zero = DefaultValue::Value(CilPrimitiveData::I4(0));
        assert!(accepts_constant(&color, &zero));
        assert!(!accepts_constant(&nullable_color, &zero));
        Ok(())
    }
}
