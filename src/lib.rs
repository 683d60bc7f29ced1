// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # cilproxy
//!
//! Runtime synthesis of CIL proxy types.
//!
//! Given an interface described in an ECMA-335 object model, `cilproxy` declares a new
//! sealed class that implements it, emits a CIL body for every member and verifies
//! the result before registering it. Two strategies are available:
//!
//! - **Forwarding**: the proxy wraps an instance of a concrete implementation and
//!   delegates every interface member to it. It also implements every other visible
//!   interface of the implementation.
//! - **Interception**: the proxy derives from a `DynamicProxy` handler and routes every
//!   interface member to the handler's `Invoke`, passing the called method and the
//!   boxed arguments.
//!
//! Synthesized types carry the generic parameters, custom attributes, parameter
//! metadata and default values of the members they implement, and are memoized per
//! `(strategy, interface, implementation)`.
//!
//! ## Features
//!
//! - **Interface closure** - order-preserving, deduplicated, visibility-aware
//! - **Diamond-aware member naming** - colliding members become explicit implementations
//! - **Real CIL** - bodies are encoded to bytes, decoded back and stack-verified
//! - **Execution** - an embedded interpreter runs synthesized bodies against
//!   implementations written as Rust closures
//! - **Concurrency** - the generator is `Send + Sync` and synthesizes each key once
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use cilproxy::prelude::*;
//!
//! let registry = Arc::new(TypeRegistry::new()?);
//! let string = registry.wellknown("System.String")?;
//! let int32 = registry.wellknown("System.Int32")?;
//!
//! let flyer = InterfaceBuilder::new("Demo", "IFlyer")
//!     .method(MethodBuilder::new("Fly").param("message", &string).returns(&int32))
//!     .build(&registry)?;
//! let bird = ClassBuilder::new("Demo", "Bird")
//!     .implements(&flyer)
//!     .method(
//!         MethodBuilder::new("Fly")
//!             .param("message", &string)
//!             .returns(&int32)
//!             .host(|_, _| Ok(EmValue::I32(5))),
//!     )
//!     .build(&registry)?;
//!
//! let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
//! let proxy_type = generator.create_forwarding_proxy_type(&flyer, &bird)?;
//!
//! let runtime = generator.runtime();
//! let proxy = runtime.new_object(&proxy_type, vec![runtime.new_object(&bird, vec![])?])?;
//! let fly = flyer.method_by_name("Fly").unwrap();
//! let result = runtime.invoke_virtual(&proxy, &fly, vec![runtime.new_string("hello")?])?;
//! assert_eq!(result.as_i32(), Some(5));
//! # Ok::<(), cilproxy::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`metadata`] - the object model: types, methods, parameters, constants,
//!   attributes, builders, the registry and diagnostics
//! - [`assembly`] - CIL instruction encoding, decoding and the body emitter
//! - [`proxy`] - interface closure, member extraction, replication, synthesis,
//!   finalization and caching
//! - [`emulation`] - the runtime and interpreter that execute synthesized types
//! - [`config`] - synthesis configuration
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. Synthesis is all-or-nothing: an error
//! means no type was produced. Problems synthesis recovers from are recorded in the
//! generator's [`metadata::diagnostics::Diagnostics`] instead.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use cilproxy::prelude::*;
///
/// let registry = Arc::new(TypeRegistry::new()?);
/// let generator = ProxyGenerator::new(registry, SynthesisConfig::default());
/// assert!(generator.module().is_empty());
/// # Ok::<(), cilproxy::Error>(())
/// ```
pub mod prelude;

/// CIL instruction encoding, decoding and emission based on ECMA-335 Partition III
///
/// - [`assembly::InstructionEncoder`] - mnemonic-level encoder with stack tracking
///   and labels
/// - [`assembly::ILEmitter`] - object-model-level emission primitives
/// - [`assembly::decode_stream`] - decoder used to verify and execute bodies
pub mod assembly;

/// Synthesis configuration
pub mod config;

/// Runtime and interpreter executing synthesized types
///
/// Host implementations are Rust closures attached to methods through
/// [`metadata::builders::MethodBuilder::host`]; synthesized methods carry CIL bodies
/// and are interpreted.
pub mod emulation;

/// The ECMA-335 object model proxies are synthesized against
pub mod metadata;

/// Proxy type synthesis
pub mod proxy;

pub use config::SynthesisConfig;
pub use error::Error;
pub use file::{io::CilIO, Parser};
pub use metadata::typesystem::TypeRegistry;
pub use proxy::{ProxyGenerator, ProxyModule};

/// `cilproxy` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
