//! Custom attribute and parameter replication.
//!
//! Attributes are read through their reflection view ([`CustomAttributeData`]) and
//! rebuilt as [`CustomAttributeValue`]s. Array arguments come out of that view as
//! collections of typed elements and are unpacked into flat
//! [`CustomAttributeArgument::Array`]s.

use std::sync::Arc;

use crate::{
    metadata::{
        customattributes::{
            CustomAttributeArgument, CustomAttributeData, CustomAttributeValue,
            CustomAttributeValueList, TypedArgument, TypedArgumentValue,
        },
        diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity},
        method::Method,
        tables::{Param, ParamRc},
        token::TableId,
        typesystem::{CilTypeRc, DYNAMICALLY_ATTRIBUTE_FULLNAME},
    },
    proxy::{
        defaults::{replicate_default, DefaultValueOutcome},
        ReplicationContext,
    },
    Result,
};

/// Unpack a typed argument, turning collections into flat arrays
#[must_use]
pub fn flatten_argument(argument: &TypedArgument) -> CustomAttributeArgument {
    match &argument.value {
        TypedArgumentValue::Scalar(value) => value.clone(),
        TypedArgumentValue::Collection(items) => {
            let element = argument
                .arg_type
                .strip_suffix("[]")
                .unwrap_or(&argument.arg_type);
            CustomAttributeArgument::Array(
                element.to_string(),
                items.iter().map(flatten_argument).collect(),
            )
        }
    }
}

/// Rebuild an attribute application from its reflection view
#[must_use]
pub fn replicate_attribute(data: &CustomAttributeData) -> CustomAttributeValue {
    let mut value = CustomAttributeValue::new(data.constructor.clone());
    for argument in &data.constructor_arguments {
        value = value.with_arg(flatten_argument(argument));
    }

    for named in &data.named_arguments {
        let argument = flatten_argument(&named.typed_value);
        value = if named.is_field {
            value.with_field(named.member_name.clone(), argument)
        } else {
            value.with_property(named.member_name.clone(), argument)
        };
    }

    value
}

/// Copy every attribute of `source` to `target`, unless attribute replication is
/// turned off
pub fn replicate_attributes(
    ctx: &ReplicationContext<'_>,
    source: &CustomAttributeValueList,
    target: &CustomAttributeValueList,
) {
    if !ctx.config.replicate_custom_attributes {
        return;
    }

    for (_, attribute) in source.iter() {
        let data = CustomAttributeData::from_value(attribute);
        target.push(Arc::new(replicate_attribute(&data)));
    }
}

/// Declare the parameters of `source` on `target`, shifted by `offset`.
///
/// Each parameter keeps its name, attributes, custom attributes and, following the
/// default value policy, its default. The return parameter is copied as well. Types
/// are taken in the proxy's context. A default that cannot be stored is dropped with
/// a warning and reported as [`DefaultValueOutcome::Failed`].
///
/// # Errors
/// Returns an error if a parameter type cannot be constructed.
pub fn replicate_parameters(
    ctx: &ReplicationContext<'_>,
    source: &Method,
    target: &Method,
    offset: u32,
) -> Result<Vec<DefaultValueOutcome>> {
    let mut outcomes = Vec::new();

    for param in source.parameters() {
        let replica = replicate_param(ctx, &param, param.sequence + offset)?;
        let outcome = if ctx.config.replicate_default_values {
            match replicate_default(ctx, &param, &replica) {
                Ok(outcome) => outcome,
                Err(error) => {
                    ctx.diagnostics.push(
                        Diagnostic::new(
                            DiagnosticSeverity::Warning,
                            DiagnosticCategory::DefaultValue,
                            format!(
                                "dropped default of parameter '{}' of '{}': {error}",
                                param.name.as_deref().unwrap_or("<unnamed>"),
                                source.name
                            ),
                        )
                        .with_token(replica.token)
                        .with_type(ctx.type_name),
                    );
                    DefaultValueOutcome::Failed(error.to_string())
                }
            }
        } else {
            DefaultValueOutcome::Skipped("default value replication is disabled".to_string())
        };

        outcomes.push(outcome);
        target.params.push(Arc::new(replica));
    }

    if let Some(ret) = source.return_parameter() {
        let replica = replicate_param(ctx, &ret, 0)?;
        target.params.push(Arc::new(replica));
    }

    Ok(outcomes)
}

/// Declare constructor parameters: the `leading` parameters first, marked as added
/// by synthesis, then the parameters of `source` shifted behind them.
///
/// # Errors
/// Returns an error if the marker attribute is missing from the registry or a type
/// cannot be constructed.
pub fn replicate_constructor_parameters(
    ctx: &ReplicationContext<'_>,
    source: Option<&Method>,
    target: &Method,
    leading: &[(&str, CilTypeRc)],
) -> Result<Vec<DefaultValueOutcome>> {
    let marker = ctx
        .registry
        .wellknown(DYNAMICALLY_ATTRIBUTE_FULLNAME)?
        .constructors()
        .into_iter()
        .next()
        .ok_or_else(|| malformed_error!("{} has no constructor", DYNAMICALLY_ATTRIBUTE_FULLNAME))?;

    let mut sequence = 0u32;
    for (name, ty) in leading {
        sequence += 1;
        let param = Param::new(
            ctx.registry.alloc_token(TableId::Param),
            sequence,
            Some((*name).to_string()),
            0,
        );
        param.set_type(ty)?;
        param
            .custom_attributes
            .push(Arc::new(CustomAttributeValue::new(marker.clone())));
        target.params.push(Arc::new(param));
    }

    match source {
        Some(source) => replicate_parameters(ctx, source, target, sequence),
        None => Ok(Vec::new()),
    }
}

fn replicate_param(ctx: &ReplicationContext<'_>, source: &ParamRc, sequence: u32) -> Result<Param> {
    let replica = Param::new(
        ctx.registry.alloc_token(TableId::Param),
        sequence,
        source.name.clone(),
        source.flags,
    );

    if let Some(ty) = source.ty() {
        replica.set_type(&ctx.resolve(&ty)?)?;
    }
    replicate_attributes(ctx, &source.custom_attributes, &replica.custom_attributes);
    Ok(replica)
}
