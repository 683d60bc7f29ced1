//! # cilproxy Prelude
//!
//! Convenient re-exports of the types needed to describe contracts, synthesize proxies
//! and execute them. Import this module to get quick access to all of them.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilproxy operations
pub use crate::Error;

/// The result type used throughout cilproxy
pub use crate::Result;

/// Configuration for proxy synthesis
pub use crate::SynthesisConfig;

// ================================================================================================
// Synthesis
// ================================================================================================

/// Main entry point for proxy synthesis
pub use crate::proxy::{ProxyGenerator, ProxyKind, ProxyModule, TypeBuilder};

/// Batch synthesis requests
pub use crate::proxy::synthesizer::ProxyRequest;

/// Default value replication outcomes
pub use crate::proxy::DefaultValueOutcome;

// ================================================================================================
// Object Model
// ================================================================================================

/// Type system components
pub use crate::metadata::typesystem::{
    CilFlavor, CilPrimitiveData, CilType, CilTypeRc, CilTypeRef, TypeAttributes, TypeRegistry,
};

/// Methods and their flags
pub use crate::metadata::method::{
    Method, MethodAccessFlags, MethodModifiers, MethodRc, MethodVtableFlags,
};

/// Fields, parameters, properties, constants and generic parameters
pub use crate::metadata::tables::{
    Constant, DefaultValue, Field, FieldAttributes, FieldRc, GenericParamAttributes, Param,
    ParamAttributes, ParamRc, Property, PropertyRc,
};

/// Custom attributes
pub use crate::metadata::customattributes::{
    CustomAttributeArgument, CustomAttributeData, CustomAttributeValue,
};

/// Builders describing contracts and host implementations
pub use crate::metadata::builders::{
    ClassBuilder, EnumBuilder, GenericParamSpec, InterfaceBuilder, MethodBuilder, ParamSpec,
};

/// Diagnostics recorded during synthesis
pub use crate::metadata::diagnostics::{
    Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics,
};

/// Metadata tokens
pub use crate::metadata::token::{TableId, Token};

// ================================================================================================
// Emission and Execution
// ================================================================================================

/// Body emission
pub use crate::assembly::{ILEmitter, Instruction};

/// Runtime, values and host invocations
pub use crate::emulation::{EmValue, Invocation, Runtime};
