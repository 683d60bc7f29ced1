//! Parameters, §II.22.33.

use std::sync::Arc;

mod owned;

pub use owned::*;

/// A vector that holds a list of `Param`
pub type ParamList = Arc<boxcar::Vec<ParamRc>>;
/// A reference to a `Param`
pub type ParamRc = Arc<Param>;

#[allow(non_snake_case)]
/// All possible flags for `ParamAttributes`
pub mod ParamAttributes {
    /// Param is `In`
    pub const IN: u32 = 0x0001;
    /// Param is `out`
    pub const OUT: u32 = 0x0002;
    /// Param is optional
    pub const OPTIONAL: u32 = 0x0010;
    /// Param has default value
    pub const HAS_DEFAULT: u32 = 0x1000;
    /// Param has `FieldMarshal`
    pub const HAS_FIELD_MARSHAL: u32 = 0x2000;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            tables::{Constant, DefaultValue},
            token::{TableId, Token},
            typesystem::{CilPrimitiveData, TypeRegistry},
        },
        Error, Result,
    };

    fn param(registry: &TypeRegistry, flags: u32, ty: &str) -> Result<Param> {
        let param = Param::new(
            Token::from_parts(TableId::Param, 1),
            1,
            Some("value".to_string()),
            flags,
        );
        param.set_type(&registry.wellknown(ty)?)?;
        Ok(param)
    }

    #[test]
    fn test_missing_without_flag() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let param = param(&registry, 0, "System.Int32")?;
        param.default.set(Constant::from_value(&CilPrimitiveData::I4(1))).ok();

        assert_eq!(param.read_default()?, DefaultValue::Missing);
        Ok(())
    }

    #[test]
    fn test_missing_sentinel_with_flag() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let param = param(
            &registry,
            ParamAttributes::OPTIONAL | ParamAttributes::HAS_DEFAULT,
            "System.Int32",
        )?;

        assert_eq!(param.read_default()?, DefaultValue::Missing);
        assert!(param.is_optional());
        assert_eq!(param.attributes() & ParamAttributes::HAS_DEFAULT, 0);
        Ok(())
    }

    #[test]
    fn test_apply_default() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let param = param(&registry, ParamAttributes::OPTIONAL, "System.String")?;

        param.apply_default(&DefaultValue::Value(CilPrimitiveData::String(
            "none".to_string(),
        )))?;
        assert_ne!(param.attributes() & ParamAttributes::HAS_DEFAULT, 0);
        assert!(param.apply_default(&DefaultValue::Null).is_err());
        Ok(())
    }

    #[test]
    fn test_apply_default_mismatch() -> Result<()> {
        let registry = TypeRegistry::new()?;
        let param = param(&registry, 0, "System.Int64")?;

        let result = param.apply_default(&DefaultValue::Value(CilPrimitiveData::I4(3)));
        assert!(matches!(result, Err(Error::ConstantMismatch { .. })));
        assert!(param.default.get().is_none());

        param.apply_default(&DefaultValue::Missing)?;
        assert!(param.default.get().is_none());
        Ok(())
    }
}
