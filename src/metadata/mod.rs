//! Object model that proxy types are described in and synthesized into.
//!
//! This module mirrors the ECMA-335 metadata model closely enough that synthesized
//! types carry real tokens, flag words, constants and CIL bodies, while staying an
//! in-memory, append-only structure rather than a file format.
//!
//! # Key Components
//!
//! - [`typesystem`] - Types, the concurrent [`typesystem::TypeRegistry`] and the core library
//! - [`method`] - Methods, flags, implementations and body headers
//! - [`tables`] - Parameters, fields, properties, generic parameters, constants and method specs
//! - [`customattributes`] - Custom attribute instances and their reflection-style data view
//! - [`builders`] - Fluent builders for interfaces, classes and enums
//! - [`diagnostics`] - Append-only diagnostics collected during synthesis
//! - [`token`] - Metadata table row references used throughout
//!
//! # Examples
//!
//! ```rust
//! use cilproxy::metadata::{
//!     builders::{InterfaceBuilder, MethodBuilder},
//!     typesystem::TypeRegistry,
//! };
//!
//! let registry = TypeRegistry::new()?;
//! let string = registry.wellknown("System.String")?;
//!
//! let greeter = InterfaceBuilder::new("Demo", "IGreeter")
//!     .method(MethodBuilder::new("Greet").param("name", &string).returns(&string))
//!     .build(&registry)?;
//!
//! assert!(greeter.is_interface());
//! assert_eq!(greeter.fullname(), "Demo.IGreeter");
//! # Ok::<(), cilproxy::Error>(())
//! ```

/// Reflection-style builders for interfaces, classes and enums
pub mod builders;
/// Implementation of custom attribute representation
pub mod customattributes;
/// Diagnostics collected while synthesizing
pub mod diagnostics;
/// Methods, their flags and bodies
pub mod method;
/// Owned member rows: params, fields, properties, generic params, constants, method specs
pub mod tables;
/// Commonly used metadata token type
pub mod token;
/// Implementation of the type system
pub mod typesystem;
