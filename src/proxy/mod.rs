//! Runtime proxy type synthesis.
//!
//! Given an interface and either a concrete implementation or an interception handler,
//! this module declares a new sealed class implementing the interface, together with
//! every other interface the backing type exposes, and emits a CIL body for each of
//! its members.
//!
//! # Architecture
//!
//! Synthesis runs as a pipeline over the object model in [`crate::metadata`]:
//!
//! 1. [`interfaces`] resolves the interface set of the proxy
//! 2. [`members`] extracts the properties and methods to implement and names them
//! 3. [`generics`], [`attributes`] and [`defaults`] copy generic parameters, custom
//!    attributes, parameters and default values onto the new members
//! 4. [`synthesizer`] lays out the backing field and constructor and emits the member
//!    bodies through [`crate::assembly::ILEmitter`]
//! 5. [`collector`] verifies the finished type and registers it
//! 6. [`cache`] makes the whole pipeline run once per key
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use cilproxy::prelude::*;
//!
//! let registry = Arc::new(TypeRegistry::new()?);
//! let int32 = registry.wellknown("System.Int32")?;
//!
//! let counter = InterfaceBuilder::new("Demo", "ICounter")
//!     .method(MethodBuilder::new("Next").returns(&int32))
//!     .build(&registry)?;
//! let fixed = ClassBuilder::new("Demo", "FixedCounter")
//!     .implements(&counter)
//!     .method(MethodBuilder::new("Next").returns(&int32).host(|_, _| Ok(EmValue::I32(5))))
//!     .build(&registry)?;
//!
//! let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
//! let proxy_type = generator.create_forwarding_proxy_type(&counter, &fixed)?;
//! assert_eq!(proxy_type.fullname(), "DynamicProxy.Types.ICounterProxy");
//!
//! let runtime = generator.runtime();
//! let backing = runtime.new_object(&fixed, vec![])?;
//! let proxy = runtime.new_object(&proxy_type, vec![backing])?;
//! let next = counter.method_by_name("Next").unwrap();
//! assert_eq!(runtime.invoke_virtual(&proxy, &next, vec![])?.as_i32(), Some(5));
//! # Ok::<(), cilproxy::Error>(())
//! ```

pub mod attributes;
pub mod cache;
pub mod collector;
pub mod defaults;
pub mod generics;
pub mod interfaces;
pub mod members;
pub mod synthesizer;
mod verify;

pub use cache::{ProxyCache, ProxyKind};
pub use collector::{ProxyModule, TypeBuilder};
pub use defaults::DefaultValueOutcome;
pub use synthesizer::ProxyGenerator;

use crate::{
    config::SynthesisConfig,
    metadata::{
        diagnostics::Diagnostics,
        typesystem::{CilTypeRc, TypeRegistry},
    },
    Result,
};

/// Everything replication of one member needs: where to allocate tokens and
/// construct types, where to report, what to copy, and the generic context the
/// copied signatures are read in.
#[derive(Clone, Copy)]
pub struct ReplicationContext<'a> {
    /// Registry tokens and constructed types come from
    pub registry: &'a TypeRegistry,
    /// Collector for recovered and tolerated problems
    pub diagnostics: &'a Diagnostics,
    /// What to replicate
    pub config: &'a SynthesisConfig,
    /// Full name of the type being synthesized
    pub type_name: &'a str,
    /// Generic arguments of the interface whose members are copied, as seen from the proxy
    pub type_args: &'a [CilTypeRc],
}

impl<'a> ReplicationContext<'a> {
    /// Context without interface generic arguments
    #[must_use]
    pub fn new(
        registry: &'a TypeRegistry,
        diagnostics: &'a Diagnostics,
        config: &'a SynthesisConfig,
        type_name: &'a str,
    ) -> Self {
        ReplicationContext {
            registry,
            diagnostics,
            config,
            type_name,
            type_args: &[],
        }
    }

    /// Same context, reading signatures through the generic arguments `type_args`
    #[must_use]
    pub fn with_type_args(self, type_args: &'a [CilTypeRc]) -> Self {
        ReplicationContext { type_args, ..self }
    }

    /// `ty` as seen from the proxy: type-level placeholders are replaced by the
    /// interface's generic arguments, method-level placeholders stay positional.
    ///
    /// # Errors
    /// Returns an error if a constructed type cannot be created.
    pub fn resolve(&self, ty: &CilTypeRc) -> Result<CilTypeRc> {
        if self.type_args.is_empty() {
            return Ok(ty.clone());
        }
        self.registry.substitute(ty, self.type_args, &[])
    }
}
