//! CIL instruction layer: opcode table, decoder, encoder and the emission primitives
//! used by the proxy synthesizer.
//!
//! # Architecture
//!
//! - [`opcodes`] - Raw opcode byte values
//! - [`INSTRUCTIONS`] - The instruction table shared by decoder and encoder, with
//!   operand kinds, fixed stack effects and flow types
//! - [`decode_stream`] / [`decode_instruction`] - Bytes to [`Instruction`]s
//! - [`InstructionEncoder`] - Mnemonics to bytes, with stack tracking and labels
//! - [`ILEmitter`] - Object-model level primitives on top of the encoder
//!
//! The table covers the instruction subset that synthesized bodies use plus the
//! branches, constants and local forms needed to round-trip them. Bodies themselves
//! are wrapped in [`crate::metadata::method::MethodBody`] headers.
//!
//! # Examples
//!
//! ```rust
//! use cilproxy::{assembly::{decode_stream, InstructionEncoder}, Parser};
//!
//! let mut encoder = InstructionEncoder::new();
//! encoder.emit_ldarg(1)?;
//! encoder.emit_ret(true)?;
//! let (code, _) = encoder.finalize()?;
//!
//! let mut parser = Parser::new(&code);
//! let decoded = decode_stream(&mut parser, 0)?;
//! assert_eq!(decoded[0].mnemonic, "ldarg.1");
//! assert!(decoded[1].is_terminal());
//! # Ok::<(), cilproxy::Error>(())
//! ```

mod decoder;
mod emitter;
mod encoder;
mod instruction;
pub mod opcodes;

pub use decoder::{decode_instruction, decode_stream};
pub use emitter::{ILEmitter, Local};
pub use encoder::InstructionEncoder;
pub use instruction::{
    lookup_mnemonic, lookup_opcode, CilInstruction, FlowType, Immediate, Instruction,
    InstructionCategory, Operand, OperandType, StackBehavior, INSTRUCTIONS,
};
