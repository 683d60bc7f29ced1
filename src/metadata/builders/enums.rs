use std::sync::Arc;

use crate::{
    metadata::{
        builders::TypeSpecification,
        customattributes::CustomAttributeValue,
        tables::{Constant, Field, FieldAttributes},
        token::TableId,
        typesystem::{CilFlavor, CilPrimitiveData, CilTypeRc, TypeAttributes, TypeRegistry},
    },
    Result,
};

/// Builder for enums.
///
/// The enum stores its value in the special `value__` instance field, whose type is the
/// underlying primitive (`System.Int32` unless changed). Each variant is a literal static
/// field holding a constant of the underlying type.
pub struct EnumBuilder {
    spec: TypeSpecification,
    underlying: CilFlavor,
    variants: Vec<(String, i64)>,
}

impl EnumBuilder {
    /// A public enum backed by `System.Int32`
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        EnumBuilder {
            spec: TypeSpecification::new(
                namespace,
                name,
                TypeAttributes::PUBLIC | TypeAttributes::SEALED,
            ),
            underlying: CilFlavor::I4,
            variants: Vec::new(),
        }
    }

    /// Change the underlying integral type
    #[must_use]
    pub fn underlying(mut self, flavor: CilFlavor) -> Self {
        self.underlying = flavor;
        self
    }

    /// Add a named value
    #[must_use]
    pub fn variant(mut self, name: &str, value: i64) -> Self {
        self.variants.push((name.to_string(), value));
        self
    }

    /// Nest the enum in `declaring`
    #[must_use]
    pub fn nested_in(mut self, declaring: &CilTypeRc) -> Self {
        self.spec.declaring = Some(declaring.clone());
        self.spec.flags = self.spec.flags.with_visibility(TypeAttributes::NESTED_PUBLIC);
        self
    }

    /// Apply a custom attribute
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttributeValue) -> Self {
        self.spec.custom_attributes.push(attribute);
        self
    }

    /// Declare and register the enum.
    ///
    /// # Errors
    /// - [`crate::Error::TypeError`] if the underlying flavor is not a primitive
    /// - [`crate::Error::TypeConversionInvalid`] if a variant does not fit the underlying type
    pub fn build(self, registry: &TypeRegistry) -> Result<CilTypeRc> {
        let underlying = registry.primitive(&self.underlying)?;
        let base = registry.wellknown("System.Enum")?;
        let declared = self.spec.declare(registry, CilFlavor::ValueType, Some(&base))?;

        let value = Arc::new(Field::new(
            registry.alloc_token(TableId::Field),
            "value__",
            FieldAttributes::PUBLIC | FieldAttributes::SPECIAL_NAME | FieldAttributes::RTSPECIAL_NAME,
            &underlying,
        ));
        value.set_declaring_type(&declared)?;
        declared.fields.push(value);

        for (name, raw) in self.variants {
            let converted = CilPrimitiveData::I8(raw).convert_to(&self.underlying)?;
            let variant = Arc::new(Field::new(
                registry.alloc_token(TableId::Field),
                name,
                FieldAttributes::PUBLIC
                    | FieldAttributes::STATIC
                    | FieldAttributes::LITERAL
                    | FieldAttributes::HAS_DEFAULT,
                &declared,
            ));
            variant
                .default
                .set(Constant::from_value(&converted))
                .map_err(|_| malformed_error!("Default value already set for field"))?;
            variant.set_declaring_type(&declared)?;
            declared.fields.push(variant);
        }

        registry.insert(&declared)?;
        Ok(declared)
    }
}
