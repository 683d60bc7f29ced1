//! Default value replication.
//!
//! Copying a parameter's default constant onto a synthesized parameter runs into a
//! handful of known defects of the constant encoding: `System.DateTime` has no
//! constant form, enum constants may be stored with a different element type, null
//! is not a valid constant for `Nullable<T>` or value types, and `Nullable<enum>`
//! cannot carry a constant at all. These are recovered here, everything else is
//! coerced to the parameter's underlying type or reported to the caller.

use crate::{
    metadata::{
        diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity},
        tables::{DefaultValue, Param},
        typesystem::CilTypeRc,
    },
    proxy::ReplicationContext,
    Error, Result,
};

/// Full name of the one non-primitive value type that optional parameters commonly use
const DATE_TIME_FULLNAME: &str = "System.DateTime";

/// What happened to one parameter's default value
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValueOutcome {
    /// The value was stored as read
    Set(DefaultValue),
    /// Nothing was stored
    Skipped(String),
    /// The value was converted to the parameter's underlying type and stored
    Coerced {
        /// Value as read from the source
        from: DefaultValue,
        /// Value as stored on the target
        to: DefaultValue,
    },
    /// Storing failed and the default was dropped
    Failed(String),
}

impl DefaultValueOutcome {
    /// True if the target ended up with a stored default
    #[must_use]
    pub fn is_stored(&self) -> bool {
        matches!(
            self,
            DefaultValueOutcome::Set(_) | DefaultValueOutcome::Coerced { .. }
        )
    }
}

/// Read the default of `source`, recovering the constant defects of date/time and
/// enum typed parameters as `null`.
///
/// # Errors
/// Propagates any other read failure.
pub fn read_default(ctx: &ReplicationContext<'_>, source: &Param) -> Result<DefaultValue> {
    match source.read_default() {
        Ok(value) => Ok(value),
        Err(error) if is_read_defect(source) => {
            ctx.report(
                DiagnosticSeverity::Info,
                source,
                format!(
                    "default of parameter '{}' cannot be decoded ({error}), using null",
                    param_name(source)
                ),
            );
            Ok(DefaultValue::Null)
        }
        Err(error) => Err(error),
    }
}

/// Copy the default value of `source` to `target`.
///
/// `target` must already carry its type. Parameters without a declared default are
/// skipped.
///
/// # Errors
/// Returns the original [`Error::ConstantMismatch`] if the value is not accepted and
/// cannot be coerced, or any read failure that is not a known defect.
pub fn replicate_default(
    ctx: &ReplicationContext<'_>,
    source: &Param,
    target: &Param,
) -> Result<DefaultValueOutcome> {
    if !source.declares_default() {
        return Ok(DefaultValueOutcome::Skipped("no default declared".to_string()));
    }

    let value = read_default(ctx, source)?;
    if value == DefaultValue::Missing {
        return Ok(DefaultValueOutcome::Skipped("no value supplied".to_string()));
    }

    let error = match target.apply_default(&value) {
        Ok(()) => return Ok(DefaultValueOutcome::Set(value)),
        Err(error @ Error::ConstantMismatch { .. }) => error,
        Err(error) => return Err(error),
    };

    let ty = target
        .ty()
        .ok_or_else(|| malformed_error!("Parameter {} has no type", target.token))?;

    if let Some(reason) = set_defect(&ty, &value) {
        ctx.report(
            DiagnosticSeverity::Info,
            target,
            format!("default of parameter '{}' left unset: {reason}", param_name(target)),
        );
        return Ok(DefaultValueOutcome::Skipped(reason.to_string()));
    }

    let Some(coerced) = coerce(&ty, &value) else {
        return Err(error);
    };
    if target.apply_default(&coerced).is_err() {
        return Err(error);
    }

    ctx.report(
        DiagnosticSeverity::Info,
        target,
        format!(
            "default of parameter '{}' coerced from {value} to {coerced}",
            param_name(target)
        ),
    );
    Ok(DefaultValueOutcome::Coerced {
        from: value,
        to: coerced,
    })
}

/// True for the parameters whose constants are known to fail decoding. Only
/// parameters declaring a default get here, `OPTIONAL` is not required.
fn is_read_defect(source: &Param) -> bool {
    let Some(ty) = source.ty() else {
        return false;
    };
    let ty = ty.nullable_underlying().unwrap_or(ty);
    ty.fullname() == DATE_TIME_FULLNAME || ty.is_enum()
}

/// The defect that explains why `value` cannot be stored on a location typed `ty`
fn set_defect(ty: &CilTypeRc, value: &DefaultValue) -> Option<&'static str> {
    match (ty.nullable_underlying(), value) {
        (Some(_), DefaultValue::Null) => Some("null cannot be stored for Nullable<T>"),
        (None, DefaultValue::Null) if ty.is_value_type() => {
            Some("null cannot be stored for a value type")
        }
        (Some(underlying), DefaultValue::Value(value))
            if underlying.is_enum() || underlying.flavor == value.flavor() =>
        {
            Some("constants of Nullable<T> cannot be encoded")
        }
        _ => None,
    }
}

/// Convert `value` to the primitive underlying `ty`, through `Nullable<T>` and enums
fn coerce(ty: &CilTypeRc, value: &DefaultValue) -> Option<DefaultValue> {
    let DefaultValue::Value(primitive) = value else {
        return None;
    };

    let mut underlying = ty.nullable_underlying().unwrap_or_else(|| ty.clone());
    if underlying.is_enum() {
        underlying = underlying.enum_underlying()?;
    }

    primitive
        .convert_to(&underlying.flavor)
        .ok()
        .map(DefaultValue::Value)
}

fn param_name(param: &Param) -> &str {
    param.name.as_deref().unwrap_or("<unnamed>")
}

impl ReplicationContext<'_> {
    fn report(&self, severity: DiagnosticSeverity, param: &Param, message: String) {
        self.diagnostics.push(
            Diagnostic::new(severity, DiagnosticCategory::DefaultValue, message)
                .with_token(param.token)
                .with_type(self.type_name),
        );
    }
}
