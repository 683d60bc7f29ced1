//! Generic parameter replication.
//!
//! Proxies redeclare the generic parameters of the members they implement: a proxy of
//! a generic interface definition is itself a generic definition of the same arity,
//! and every generic interface method is implemented by a generic method. Signatures
//! refer to generic parameters by position (`!n`, `!!n`), so copied signatures stay
//! valid as long as the replicated lists line up with their sources.
//!
//! Classes cannot be variant, so type-level attributes go through
//! [`to_class_generic_attributes`], while method-level attributes are copied verbatim.

use std::sync::Arc;

use strum::Display;

use crate::{
    metadata::{
        diagnostics::DiagnosticCategory,
        method::Method,
        tables::{GenericParam, GenericParamAttributes, GenericParamList},
        token::TableId,
        typesystem::CilTypeRc,
    },
    proxy::{collector::TypeBuilder, ReplicationContext},
    Result,
};

/// Classification of a generic parameter's special constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConstraintKind {
    /// No special constraint
    None,
    /// `class`
    ReferenceType,
    /// `class, new()`
    ReferenceTypeWithDefaultConstructor,
    /// `struct`, which implies `new()`
    ValueType,
    /// `new()` alone, or the full mask
    Special,
}

impl ConstraintKind {
    /// Classify `GenericParamAttributes` flags. The value type flag wins over `new()`,
    /// matching [`to_class_generic_attributes`].
    #[must_use]
    pub fn classify(flags: u32) -> Self {
        let special = flags & GenericParamAttributes::SPECIAL_CONSTRAINT_MASK;
        let has = |bits: u32| special & bits == bits;
        let reference = GenericParamAttributes::REFERENCE_TYPE_CONSTRAINT;
        let value = GenericParamAttributes::NOT_NULLABLE_VALUE_TYPE_CONSTRAINT;
        let ctor = GenericParamAttributes::DEFAULT_CONSTRUCTOR_CONSTRAINT;

        if special == 0 {
            ConstraintKind::None
        } else if has(reference | value) {
            ConstraintKind::Special
        } else if has(value) {
            ConstraintKind::ValueType
        } else if has(reference | ctor) {
            ConstraintKind::ReferenceTypeWithDefaultConstructor
        } else if has(reference) {
            ConstraintKind::ReferenceType
        } else {
            ConstraintKind::Special
        }
    }
}

/// Map the attributes of an interface's generic parameter to those of the
/// corresponding class generic parameter.
///
/// Variance is dropped. Of the special constraints, the full mask, `struct`,
/// `class, new()`, `class` and `new()` survive, checked in that order.
#[must_use]
pub fn to_class_generic_attributes(flags: u32) -> u32 {
    let has = |bits: u32| flags & bits == bits;
    let mask = GenericParamAttributes::SPECIAL_CONSTRAINT_MASK;
    let reference = GenericParamAttributes::REFERENCE_TYPE_CONSTRAINT;
    let value = GenericParamAttributes::NOT_NULLABLE_VALUE_TYPE_CONSTRAINT;
    let ctor = GenericParamAttributes::DEFAULT_CONSTRUCTOR_CONSTRAINT;

    if flags == GenericParamAttributes::NONE {
        GenericParamAttributes::NONE
    } else if has(mask) {
        mask
    } else if has(value) {
        value
    } else if has(reference | ctor) {
        reference | ctor
    } else if has(reference) {
        reference
    } else if has(ctor) {
        ctor
    } else {
        GenericParamAttributes::NONE
    }
}

/// Declare the generic parameters of the generic definition `source` on the type
/// under construction. A no-op unless `source` is a generic definition.
///
/// # Errors
/// Returns an error if a constraint type cannot be constructed.
pub fn replicate_type_generics(
    ctx: &ReplicationContext<'_>,
    source: &CilTypeRc,
    builder: &TypeBuilder,
) -> Result<()> {
    if !source.is_generic_definition() {
        return Ok(());
    }

    replicate(
        ctx,
        &source.generic_params,
        &builder.ty().generic_params,
        false,
        to_class_generic_attributes,
    )?;
    ctx.diagnostics.info(
        DiagnosticCategory::Generic,
        format!(
            "{}: replicated {} type generic parameter(s) of '{}'",
            ctx.type_name,
            source.generic_params.count(),
            source.fullname()
        ),
    );
    Ok(())
}

/// Declare the generic parameters of the generic method `source` on `target`.
/// A no-op for non-generic methods.
///
/// # Errors
/// Returns an error if a constraint type cannot be constructed.
pub fn replicate_method_generics(
    ctx: &ReplicationContext<'_>,
    source: &Method,
    target: &Method,
) -> Result<()> {
    if !source.is_generic() {
        return Ok(());
    }

    replicate(ctx, &source.generic_params, &target.generic_params, true, |flags| flags)
}

fn replicate(
    ctx: &ReplicationContext<'_>,
    source: &GenericParamList,
    target: &GenericParamList,
    owner_is_method: bool,
    map_flags: impl Fn(u32) -> u32,
) -> Result<()> {
    let mut params: Vec<_> = source.iter().map(|(_, param)| param.clone()).collect();
    params.sort_by_key(|param| param.number);

    for param in params {
        let flags = if ctx.config.replicate_generic_constraints {
            map_flags(param.flags)
        } else {
            map_flags(param.flags) & !GenericParamAttributes::SPECIAL_CONSTRAINT_MASK
        };

        let kind = ConstraintKind::classify(flags);
        if kind != ConstraintKind::None {
            ctx.diagnostics.info(
                DiagnosticCategory::Generic,
                format!(
                    "{}: generic parameter '{}' keeps its {} constraint",
                    ctx.type_name, param.name, kind
                ),
            );
        }

        let replica = GenericParam::new(
            ctx.registry.alloc_token(TableId::GenericParam),
            param.number,
            param.name.clone(),
            flags,
            owner_is_method,
        );

        if ctx.config.replicate_generic_constraints {
            let (interfaces, classes): (Vec<_>, Vec<_>) = param
                .constraint_types()
                .into_iter()
                .partition(|constraint| constraint.is_interface());

            // base type constraint first, then interface constraints
            for constraint in classes.iter().chain(&interfaces) {
                replica.add_constraint(&ctx.resolve(constraint)?);
            }
        }

        target.push(Arc::new(replica));
    }

    Ok(())
}
