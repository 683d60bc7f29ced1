//! Synthesis configuration
//!
//! Controls what the proxy synthesizer replicates from the source contracts, whether
//! emitted bodies are verified before a type is registered, and the call depth budget
//! of the runtime executing them.

use crate::emulation::DEFAULT_MAX_CALL_DEPTH;

/// Namespace synthesized proxy types are declared in
pub const DEFAULT_PROXY_NAMESPACE: &str = "DynamicProxy.Types";

/// Configuration for proxy type synthesis
///
/// Replication of custom attributes, default values and generic constraints is a
/// fidelity feature: turning it off never changes how a proxy dispatches, only how
/// closely its metadata mirrors the source contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct SynthesisConfig {
    /// Namespace of synthesized types
    pub namespace: &'static str,

    /// Copy custom attributes of methods, parameters and return parameters
    pub replicate_custom_attributes: bool,

    /// Copy parameter default values, following the default value policy
    pub replicate_default_values: bool,

    /// Copy special constraints and constraint types of generic parameters
    /// (names and arity are always copied)
    pub replicate_generic_constraints: bool,

    /// Decode and stack-check every emitted body at finalization
    pub verify_bodies: bool,

    /// Maximum nesting of calls in a [`crate::emulation::Runtime`] built for the generator
    pub max_call_depth: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_PROXY_NAMESPACE,
            replicate_custom_attributes: true,
            replicate_default_values: true,
            replicate_generic_constraints: true,
            verify_bodies: true,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl SynthesisConfig {
    /// Creates a minimal configuration for maximum throughput
    ///
    /// Proxies dispatch exactly as with the default configuration, but carry no
    /// replicated attributes, defaults or constraints, and bodies are not verified.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            namespace: DEFAULT_PROXY_NAMESPACE,
            replicate_custom_attributes: false,
            replicate_default_values: false,
            replicate_generic_constraints: false,
            verify_bodies: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    /// Creates a configuration with every replication and check enabled, and a tight
    /// call depth budget for handlers that are not trusted to terminate
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_call_depth: 64,
            ..Self::default()
        }
    }

    /// Same configuration, declaring types in `namespace`
    #[must_use]
    pub fn with_namespace(mut self, namespace: &'static str) -> Self {
        self.namespace = namespace;
        self
    }
}
