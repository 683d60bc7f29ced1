//! Execution of synthesized types.
//!
//! Synthesized proxy types carry real CIL bodies. This module runs them: an
//! interpreter decodes the emitted bytes and executes them against host-implemented
//! types, whose methods are Rust closures.
//!
//! # Key Components
//!
//! ## Value System
//! - [`EmValue`] - Runtime value representation, widened the way the CIL stack widens
//! - [`HeapObject`] / [`ObjectRef`] - Shared heap objects with lock-guarded fields
//! - [`RuntimeMethod`] - A method together with its generic instantiation
//!
//! ## Execution Engine
//! - [`Runtime`] - Dispatch (static, virtual, interface, reflective) and object operations
//! - [`Interpreter`] - Instruction interpreter for emitted bodies
//! - [`EvaluationStack`] - Bounded evaluation stack
//! - [`StepResult`] - Result of executing a single instruction
//!
//! # Usage Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use cilproxy::{
//!     emulation::{EmValue, Runtime},
//!     metadata::{builders::{ClassBuilder, MethodBuilder}, typesystem::TypeRegistry},
//! };
//!
//! let registry = Arc::new(TypeRegistry::new()?);
//! let int32 = registry.wellknown("System.Int32")?;
//! let dice = ClassBuilder::new("Demo", "Dice")
//!     .method(MethodBuilder::new("Roll").returns(&int32).host(|_, _| Ok(EmValue::I32(4))))
//!     .build(&registry)?;
//!
//! let runtime = Runtime::new(registry);
//! let instance = runtime.new_object(&dice, Vec::new())?;
//! let roll = dice.method_by_name("Roll").unwrap();
//! assert_eq!(runtime.invoke_virtual(&instance, &roll, Vec::new())?, EmValue::I32(4));
//! # Ok::<(), cilproxy::Error>(())
//! ```

mod interpreter;
mod runtime;
mod stack;
mod value;

pub use interpreter::{Interpreter, StepResult};
pub use runtime::{Invocation, Runtime, DEFAULT_MAX_CALL_DEPTH};
pub use stack::EvaluationStack;
pub use value::{EmValue, HeapObject, HeapObjectKind, ObjectRef, RuntimeMethod};
