//! CIL instruction decoding.
//!
//! - [`decode_instruction`] - Decode the instruction at the parser position
//! - [`decode_stream`] - Decode a linear instruction sequence until the data ends
//!
//! Emitted bodies are decoded by [`crate::metadata::method::MethodBody::instructions`]
//! for verification at finalization and for execution by the interpreter.
//!
//! # Examples
//!
//! ```rust
//! use cilproxy::{Parser, assembly::{decode_instruction, decode_stream}};
//!
//! let mut parser = Parser::new(&[0x2A]);
//! let instr = decode_instruction(&mut parser, 0x1000)?;
//! assert_eq!(instr.mnemonic, "ret");
//!
//! let mut parser = Parser::new(&[0x00, 0x2A]);
//! assert_eq!(decode_stream(&mut parser, 0x1000)?.len(), 2);
//! # Ok::<(), cilproxy::Error>(())
//! ```

use crate::{
    assembly::{
        instruction::lookup_opcode, opcodes, FlowType, Immediate, Instruction, Operand,
        OperandType, StackBehavior,
    },
    file::parser::Parser,
    metadata::token::Token,
    Error, Result,
};

/// Decode instructions from the parser position until the data is exhausted.
///
/// # Errors
/// Returns an error for unknown opcodes or truncated operands.
pub fn decode_stream(parser: &mut Parser, rva: u64) -> Result<Vec<Instruction>> {
    let mut current_rva = rva;
    let mut instructions = Vec::new();

    while parser.has_more_data() {
        let current_offset = parser.pos();
        let instruction = decode_instruction(parser, current_rva)?;

        instructions.push(instruction);

        current_rva += (parser.pos() - current_offset) as u64;
    }

    Ok(instructions)
}

/// Decode a single instruction at the current parser position.
///
/// Branch instructions get their absolute target in `branch_targets`, computed from
/// the offset relative to the end of the instruction.
///
/// # Errors
/// - [`Error::InvalidOpcode`] for opcodes outside the supported set
/// - [`Error::OutOfBounds`] for truncated operands
pub fn decode_instruction(parser: &mut Parser, rva: u64) -> Result<Instruction> {
    let offset = parser.pos() as u64;
    let first_byte = parser.read_le::<u8>()?;

    let (cil_instruction, prefix, opcode) = if first_byte == opcodes::FE_PREFIX {
        let second_byte = parser.read_le::<u8>()?;
        match lookup_opcode(opcodes::FE_PREFIX, second_byte) {
            Some(instr) => (instr, opcodes::FE_PREFIX, second_byte),
            None => {
                return Err(Error::InvalidOpcode(
                    (u16::from(opcodes::FE_PREFIX) << 8) | u16::from(second_byte),
                ))
            }
        }
    } else {
        match lookup_opcode(0, first_byte) {
            Some(instr) => (instr, 0, first_byte),
            None => return Err(Error::InvalidOpcode(u16::from(first_byte))),
        }
    };

    let operand = match cil_instruction.op_type {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)),
        OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)),
        OperandType::UInt16 => Operand::Immediate(Immediate::UInt16(parser.read_le::<u16>()?)),
        OperandType::Int32 => Operand::Immediate(Immediate::Int32(parser.read_le::<i32>()?)),
        OperandType::Int64 => Operand::Immediate(Immediate::Int64(parser.read_le::<i64>()?)),
        OperandType::Float64 => Operand::Immediate(Immediate::Float64(parser.read_le::<f64>()?)),
        OperandType::Token => Operand::Token(Token::new(parser.read_le::<u32>()?)),
    };
    let size = parser.pos() as u64 - offset;

    let mut instruction = Instruction {
        rva,
        offset,
        size,
        opcode,
        prefix,
        mnemonic: cil_instruction.instr,
        category: cil_instruction.category,
        flow_type: cil_instruction.flow,
        stack_behavior: StackBehavior {
            pops: cil_instruction.stack_pops,
            pushes: cil_instruction.stack_pushes,
            #[allow(clippy::cast_possible_wrap)]
            net_effect: cil_instruction.stack_pushes as i8 - cil_instruction.stack_pops as i8,
        },
        branch_targets: Vec::new(),
        operand,
    };

    if matches!(
        instruction.flow_type,
        FlowType::ConditionalBranch | FlowType::UnconditionalBranch
    ) {
        if let Some(relative) = instruction.operand.immediate() {
            #[allow(clippy::cast_sign_loss)]
            let target = (rva + instruction.size).wrapping_add(relative as u64);
            instruction.branch_targets.push(target);
        }
    }

    Ok(instruction)
}

#[cfg(test)]
mod tests {
    use crate::{
        assembly::{decode_instruction, decode_stream, FlowType, Immediate, InstructionCategory, Operand},
        metadata::token::Token,
        Error, Parser,
    };

    #[test]
    fn decode_instruction_basic() {
        let mut parser = Parser::new(&[0x11, 0x10]);
        let result = decode_instruction(&mut parser, 0x1000).unwrap();

        assert_eq!(result.rva, 0x1000);
        assert_eq!(result.offset, 0);
        assert_eq!(result.size, 2);
        assert_eq!(result.opcode, 0x11);
        assert_eq!(result.prefix, 0);
        assert_eq!(result.mnemonic, "ldloc.s");
        assert_eq!(result.category, InstructionCategory::LoadStore);
        assert_eq!(result.flow_type, FlowType::Sequential);
        assert_eq!(result.operand, Operand::Immediate(Immediate::UInt8(0x10)));
    }

    #[test]
    fn decode_instruction_two_byte() {
        let mut parser = Parser::new(&[0xFE, 0x09, 0x00, 0x01]);
        let result = decode_instruction(&mut parser, 0).unwrap();

        assert_eq!(result.prefix, 0xFE);
        assert_eq!(result.opcode, 0x09);
        assert_eq!(result.mnemonic, "ldarg");
        assert_eq!(result.operand, Operand::Immediate(Immediate::UInt16(256)));
        assert_eq!(result.size, 4);
    }

    #[test]
    fn decode_token_operand() {
        let mut parser = Parser::new(&[0x6F, 0x01, 0x00, 0x00, 0x06]);
        let result = decode_instruction(&mut parser, 0).unwrap();

        assert_eq!(result.mnemonic, "callvirt");
        assert_eq!(result.get_token_operand(), Some(Token::new(0x0600_0001)));
        assert_eq!(result.flow_type, FlowType::Call);
    }

    #[test]
    fn decode_branch_target() {
        let mut parser = Parser::new(&[0x2B, 0x02, 0x00, 0x00, 0x2A]);
        let stream = decode_stream(&mut parser, 0x100).unwrap();

        assert_eq!(stream.len(), 4);
        assert!(stream[0].is_branch());
        assert_eq!(stream[0].branch_targets, vec![0x104]);
        assert!(stream[3].is_terminal());
    }

    #[test]
    fn decode_errors() {
        let mut parser = Parser::new(&[0xC3]);
        assert!(matches!(
            decode_instruction(&mut parser, 0),
            Err(Error::InvalidOpcode(0xC3))
        ));

        let mut parser = Parser::new(&[0xFE, 0x70]);
        assert!(matches!(
            decode_instruction(&mut parser, 0),
            Err(Error::InvalidOpcode(0xFE70))
        ));

        let mut parser = Parser::new(&[0x20, 0x01]);
        assert!(matches!(
            decode_instruction(&mut parser, 0),
            Err(Error::OutOfBounds)
        ));
    }
}
