//! CIL instruction representation, operand types and the static opcode table.
//!
//! # Key Components
//!
//! - [`Instruction`] - A decoded instruction with location, operand and stack metadata
//! - [`Operand`], [`Immediate`], [`OperandType`] - Typed operands
//! - [`FlowType`], [`InstructionCategory`], [`StackBehavior`] - Analysis metadata
//! - [`CilInstruction`] - Static description of one opcode, shared by encoder and decoder

use std::{collections::HashMap, fmt, sync::OnceLock};

use crate::{assembly::opcodes, metadata::token::Token};

/// Types of operands for CIL instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 64-bit floating point
    Float64,
    /// Metadata token reference
    Token,
}

impl OperandType {
    /// Size of the encoded operand in bytes
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            OperandType::None => 0,
            OperandType::Int8 | OperandType::UInt8 => 1,
            OperandType::UInt16 => 2,
            OperandType::Int32 | OperandType::Token => 4,
            OperandType::Int64 | OperandType::Float64 => 8,
        }
    }
}

/// An immediate value encoded in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Unsigned 8-bit immediate value
    UInt8(u8),
    /// Unsigned 16-bit immediate value
    UInt16(u16),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl From<Immediate> for i64 {
    fn from(value: Immediate) -> Self {
        match value {
            Immediate::Int8(value) => i64::from(value),
            Immediate::UInt8(value) => i64::from(value),
            Immediate::UInt16(value) => i64::from(value),
            Immediate::Int32(value) => i64::from(value),
            Immediate::Int64(value) => value,
            #[allow(clippy::cast_possible_truncation)]
            Immediate::Float64(value) => value as i64,
        }
    }
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value, also used for branch offsets and argument/local indices
    Immediate(Immediate),
    /// Metadata token reference
    Token(Token),
}

impl Operand {
    /// The token, for token operands
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self {
            Operand::Token(token) => Some(*token),
            _ => None,
        }
    }

    /// The immediate widened to `i64`, for immediate operands
    #[must_use]
    pub fn immediate(&self) -> Option<i64> {
        match self {
            Operand::Immediate(value) => Some(i64::from(*value)),
            _ => None,
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
}

/// Stack effect of an instruction.
///
/// Calls, `newobj` and `ret` have signature dependent effects, the table records the
/// fixed part only (zero for calls).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u8,
    /// Number of items pushed to stack
    pub pushes: u8,
    /// Net effect on stack depth (pushes - pops)
    pub net_effect: i8,
}

/// Categorization of instructions by their primary function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionCategory {
    /// Control flow operations (br, ret, call)
    ControlFlow,
    /// Type conversion operations (box, unbox.any, castclass)
    Conversion,
    /// Load and store operations (ldloc, ldarg, ldc)
    LoadStore,
    /// Object model operations (newobj, ldfld, newarr)
    ObjectModel,
    /// Miscellaneous operations (nop, dup, pop)
    Misc,
}

/// Static description of one opcode.
#[derive(Debug)]
pub struct CilInstruction {
    /// Prefix byte, `0xFE` for two-byte opcodes and 0 otherwise
    pub prefix: u8,
    /// Opcode byte
    pub opcode: u8,
    /// Mnemonic
    pub instr: &'static str,
    /// Operand encoding
    pub op_type: OperandType,
    /// Fixed number of popped entries
    pub stack_pops: u8,
    /// Fixed number of pushed entries
    pub stack_pushes: u8,
    /// Control flow effect
    pub flow: FlowType,
    /// Category
    pub category: InstructionCategory,
}

macro_rules! cil {
    ($prefix:expr, $opcode:expr, $name:literal, $op:ident, $pops:literal, $pushes:literal, $flow:ident, $cat:ident) => {
        CilInstruction {
            prefix: $prefix,
            opcode: $opcode,
            instr: $name,
            op_type: OperandType::$op,
            stack_pops: $pops,
            stack_pushes: $pushes,
            flow: FlowType::$flow,
            category: InstructionCategory::$cat,
        }
    };
}

/// Every supported instruction
pub static INSTRUCTIONS: &[CilInstruction] = &[
    cil!(0, opcodes::NOP, "nop", None, 0, 0, Sequential, Misc),
    cil!(0, opcodes::LDARG_0, "ldarg.0", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDARG_1, "ldarg.1", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDARG_2, "ldarg.2", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDARG_3, "ldarg.3", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDLOC_0, "ldloc.0", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDLOC_1, "ldloc.1", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDLOC_2, "ldloc.2", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDLOC_3, "ldloc.3", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::STLOC_0, "stloc.0", None, 1, 0, Sequential, LoadStore),
    cil!(0, opcodes::STLOC_1, "stloc.1", None, 1, 0, Sequential, LoadStore),
    cil!(0, opcodes::STLOC_2, "stloc.2", None, 1, 0, Sequential, LoadStore),
    cil!(0, opcodes::STLOC_3, "stloc.3", None, 1, 0, Sequential, LoadStore),
    cil!(0, opcodes::LDARG_S, "ldarg.s", UInt8, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::STARG_S, "starg.s", UInt8, 1, 0, Sequential, LoadStore),
    cil!(0, opcodes::LDLOC_S, "ldloc.s", UInt8, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::STLOC_S, "stloc.s", UInt8, 1, 0, Sequential, LoadStore),
    cil!(0, opcodes::LDNULL, "ldnull", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I4_M1, "ldc.i4.m1", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I4_0, "ldc.i4.0", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I4_1, "ldc.i4.1", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I4_2, "ldc.i4.2", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I4_3, "ldc.i4.3", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I4_4, "ldc.i4.4", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I4_5, "ldc.i4.5", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I4_6, "ldc.i4.6", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I4_7, "ldc.i4.7", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I4_8, "ldc.i4.8", None, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I4_S, "ldc.i4.s", Int8, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I4, "ldc.i4", Int32, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_I8, "ldc.i8", Int64, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::LDC_R8, "ldc.r8", Float64, 0, 1, Sequential, LoadStore),
    cil!(0, opcodes::DUP, "dup", None, 1, 2, Sequential, Misc),
    cil!(0, opcodes::POP, "pop", None, 1, 0, Sequential, Misc),
    cil!(0, opcodes::CALL, "call", Token, 0, 0, Call, ControlFlow),
    cil!(0, opcodes::RET, "ret", None, 0, 0, Return, ControlFlow),
    cil!(0, opcodes::BR_S, "br.s", Int8, 0, 0, UnconditionalBranch, ControlFlow),
    cil!(0, opcodes::BRFALSE_S, "brfalse.s", Int8, 1, 0, ConditionalBranch, ControlFlow),
    cil!(0, opcodes::BRTRUE_S, "brtrue.s", Int8, 1, 0, ConditionalBranch, ControlFlow),
    cil!(0, opcodes::BR, "br", Int32, 0, 0, UnconditionalBranch, ControlFlow),
    cil!(0, opcodes::BRFALSE, "brfalse", Int32, 1, 0, ConditionalBranch, ControlFlow),
    cil!(0, opcodes::BRTRUE, "brtrue", Int32, 1, 0, ConditionalBranch, ControlFlow),
    cil!(0, opcodes::CALLVIRT, "callvirt", Token, 0, 0, Call, ObjectModel),
    cil!(0, opcodes::NEWOBJ, "newobj", Token, 0, 1, Call, ObjectModel),
    cil!(0, opcodes::CASTCLASS, "castclass", Token, 1, 1, Sequential, Conversion),
    cil!(0, opcodes::ISINST, "isinst", Token, 1, 1, Sequential, Conversion),
    cil!(0, opcodes::LDFLD, "ldfld", Token, 1, 1, Sequential, ObjectModel),
    cil!(0, opcodes::STFLD, "stfld", Token, 2, 0, Sequential, ObjectModel),
    cil!(0, opcodes::BOX, "box", Token, 1, 1, Sequential, Conversion),
    cil!(0, opcodes::NEWARR, "newarr", Token, 1, 1, Sequential, ObjectModel),
    cil!(0, opcodes::LDLEN, "ldlen", None, 1, 1, Sequential, ObjectModel),
    cil!(0, opcodes::LDELEM_REF, "ldelem.ref", None, 2, 1, Sequential, ObjectModel),
    cil!(0, opcodes::STELEM_REF, "stelem.ref", None, 3, 0, Sequential, ObjectModel),
    cil!(0, opcodes::UNBOX_ANY, "unbox.any", Token, 1, 1, Sequential, Conversion),
    cil!(0, opcodes::LDTOKEN, "ldtoken", Token, 0, 1, Sequential, ObjectModel),
    cil!(opcodes::FE_PREFIX, opcodes::FE_LDARG, "ldarg", UInt16, 0, 1, Sequential, LoadStore),
    cil!(opcodes::FE_PREFIX, opcodes::FE_STARG, "starg", UInt16, 1, 0, Sequential, LoadStore),
    cil!(opcodes::FE_PREFIX, opcodes::FE_LDLOC, "ldloc", UInt16, 0, 1, Sequential, LoadStore),
    cil!(opcodes::FE_PREFIX, opcodes::FE_STLOC, "stloc", UInt16, 1, 0, Sequential, LoadStore),
];

static BY_OPCODE: OnceLock<HashMap<(u8, u8), &'static CilInstruction>> = OnceLock::new();
static BY_MNEMONIC: OnceLock<HashMap<&'static str, &'static CilInstruction>> = OnceLock::new();

/// Look up an opcode by prefix (0 or `0xFE`) and opcode byte
#[must_use]
pub fn lookup_opcode(prefix: u8, opcode: u8) -> Option<&'static CilInstruction> {
    BY_OPCODE
        .get_or_init(|| {
            INSTRUCTIONS
                .iter()
                .map(|instr| ((instr.prefix, instr.opcode), instr))
                .collect()
        })
        .get(&(prefix, opcode))
        .copied()
}

/// Look up an opcode by mnemonic
#[must_use]
pub fn lookup_mnemonic(mnemonic: &str) -> Option<&'static CilInstruction> {
    BY_MNEMONIC
        .get_or_init(|| INSTRUCTIONS.iter().map(|instr| (instr.instr, instr)).collect())
        .get(mnemonic)
        .copied()
}

/// A decoded CIL instruction.
#[derive(Clone)]
pub struct Instruction {
    /// Relative virtual address where this instruction is located
    pub rva: u64,
    /// Offset of the instruction within the code
    pub offset: u64,
    /// Size of this instruction in bytes
    pub size: u64,
    /// Primary opcode byte
    pub opcode: u8,
    /// Prefix byte (0 if no prefix)
    pub prefix: u8,
    /// Mnemonic (e.g., "callvirt", "ldarg.s", "ret")
    pub mnemonic: &'static str,
    /// Functional categorization of this instruction
    pub category: InstructionCategory,
    /// How this instruction affects control flow
    pub flow_type: FlowType,
    /// The operand data for this instruction
    pub operand: Operand,
    /// Fixed stack effect
    pub stack_behavior: StackBehavior,
    /// Absolute branch target, for branches
    pub branch_targets: Vec<u64>,
}

impl Instruction {
    /// True for conditional and unconditional branches
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch
        )
    }

    /// True if execution cannot fall through to the next instruction
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::Return | FlowType::UnconditionalBranch
        )
    }

    /// The token operand, if any
    #[must_use]
    pub fn get_token_operand(&self) -> Option<Token> {
        self.operand.token()
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.mnemonic)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Immediate(value) => write!(f, " {}", i64::from(*value)),
            Operand::Token(token) => write!(f, " 0x{:08x}", token.value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_consistent() {
        for instr in INSTRUCTIONS {
            let by_opcode = lookup_opcode(instr.prefix, instr.opcode).unwrap();
            assert_eq!(by_opcode.instr, instr.instr);

            let by_mnemonic = lookup_mnemonic(instr.instr).unwrap();
            assert_eq!(by_mnemonic.opcode, instr.opcode);
            assert_eq!(by_mnemonic.prefix, instr.prefix);
        }
    }

    #[test]
    fn test_lookup_misses() {
        assert!(lookup_mnemonic("calli").is_none());
        assert!(lookup_opcode(0, 0xFF).is_none());
        assert!(lookup_opcode(opcodes::FE_PREFIX, opcodes::LDARG_0).is_none());
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(lookup_mnemonic("ldc.i4.s").unwrap().op_type.size(), 1);
        assert_eq!(lookup_mnemonic("ldarg").unwrap().op_type.size(), 2);
        assert_eq!(lookup_mnemonic("ldtoken").unwrap().op_type.size(), 4);
        assert_eq!(lookup_mnemonic("ldc.r8").unwrap().op_type.size(), 8);
    }
}
