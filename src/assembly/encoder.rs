//! CIL instruction encoding.
//!
//! [`InstructionEncoder`] is the reverse counterpart of the decoder and shares its
//! opcode table. It writes instructions by mnemonic with typed operands, tracks the
//! evaluation stack depth as it goes, and resolves labels for branches at
//! [`InstructionEncoder::finalize`].
//!
//! # Examples
//!
//! ```rust
//! use cilproxy::assembly::InstructionEncoder;
//!
//! let mut encoder = InstructionEncoder::new();
//! encoder.emit_instruction("ldarg.0", None)?;
//! encoder.emit_branch("brtrue.s", "end")?;
//! encoder.emit_instruction("nop", None)?;
//! encoder.define_label("end")?;
//! encoder.emit_instruction("ret", None)?;
//!
//! let (bytecode, max_stack) = encoder.finalize()?;
//! assert_eq!(bytecode, vec![0x02, 0x2D, 0x01, 0x00, 0x2A]);
//! assert_eq!(max_stack, 1);
//! # Ok::<(), cilproxy::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        instruction::{lookup_mnemonic, CilInstruction},
        FlowType, Immediate, Operand, OperandType,
    },
    Error, Result,
};

/// Pending branch offset, written once the label position is known
#[derive(Debug, Clone)]
struct LabelFixup {
    /// The target label name to resolve
    label: String,
    /// Position in bytecode where the branch offset is written
    fixup_position: usize,
    /// Size of the branch offset field (1 or 4 bytes)
    offset_size: u8,
}

/// Core CIL instruction encoder.
///
/// Not [`Sync`], create one encoder per body.
pub struct InstructionEncoder {
    /// Generated bytecode buffer
    bytecode: Vec<u8>,
    /// Defined label positions
    labels: HashMap<String, u32>,
    /// Pending branch fixups awaiting label resolution
    fixups: Vec<LabelFixup>,
    /// Current stack depth
    current_stack_depth: usize,
    /// Maximum stack depth reached during encoding
    max_stack_depth: usize,
    /// Expected stack depth at branch targets
    label_stack_depths: HashMap<String, usize>,
    /// After `ret` or an unconditional branch, until the next label
    unreachable: bool,
}

impl Default for InstructionEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionEncoder {
    /// Create an empty encoder
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytecode: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            current_stack_depth: 0,
            max_stack_depth: 0,
            label_stack_depths: HashMap::new(),
            unreachable: false,
        }
    }

    /// Emit an instruction with its operand, applying the table's fixed stack effect.
    ///
    /// # Errors
    /// - [`Error::InvalidMnemonic`] if the mnemonic is unknown
    /// - [`Error::UnexpectedOperand`] or [`Error::WrongOperandType`] if the operand does not fit
    /// - [`Error::StackUnderflow`] if the instruction pops more than is available
    pub fn emit_instruction(&mut self, mnemonic: &str, operand: Option<Operand>) -> Result<()> {
        let metadata = Self::lookup(mnemonic)?;
        self.emit_with_effect(metadata, operand, metadata.stack_pops, metadata.stack_pushes)
    }

    /// Emit a call-like instruction (`call`, `callvirt`, `newobj`) whose stack effect
    /// depends on the callee signature.
    ///
    /// `num_args` counts every popped entry, the receiver included.
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_call(
        &mut self,
        mnemonic: &str,
        operand: Option<Operand>,
        num_args: u8,
        has_result: bool,
    ) -> Result<()> {
        let metadata = Self::lookup(mnemonic)?;
        if metadata.flow != FlowType::Call {
            return Err(Error::InvalidMnemonic(format!("{mnemonic} is not a call")));
        }

        self.emit_with_effect(metadata, operand, num_args, u8::from(has_result))
    }

    /// Emit `ret`. A non-void method returns with exactly one entry on the stack.
    ///
    /// # Errors
    /// Returns [`Error::StackUnderflow`] if the stack does not hold the return value.
    pub fn emit_ret(&mut self, has_result: bool) -> Result<()> {
        let metadata = Self::lookup("ret")?;
        self.emit_with_effect(metadata, None, u8::from(has_result), 0)
    }

    /// Emit a branch to `label`, which may be defined before or after.
    ///
    /// # Errors
    /// - [`Error::InvalidMnemonic`] if the mnemonic is unknown
    /// - [`Error::InvalidBranch`] if the mnemonic is not a branch, or the stack depth
    ///   disagrees with another branch to the same label
    pub fn emit_branch(&mut self, mnemonic: &str, label: &str) -> Result<()> {
        let metadata = Self::lookup(mnemonic)?;
        if !matches!(
            metadata.flow,
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch
        ) {
            return Err(Error::InvalidBranch(format!(
                "instruction '{mnemonic}' is not a branch instruction"
            )));
        }

        let offset_size = match metadata.op_type {
            OperandType::Int8 => 1,
            OperandType::Int32 => 4,
            _ => {
                return Err(Error::InvalidBranch(
                    "operand type must be Int8 or Int32".to_string(),
                ))
            }
        };

        let start = self.bytecode.len();
        self.push_opcode(metadata);
        self.fixups.push(LabelFixup {
            label: label.to_string(),
            fixup_position: self.bytecode.len(),
            offset_size,
        });
        self.bytecode.extend(std::iter::repeat_n(0, offset_size as usize));

        self.update_stack_depth(start, metadata.stack_pops, metadata.stack_pushes)?;
        self.record_label_stack_depth(label)?;

        if metadata.flow == FlowType::UnconditionalBranch {
            self.unreachable = true;
        }
        Ok(())
    }

    /// Emit `ldarg` in its shortest form
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_ldarg(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit_instruction("ldarg.0", None),
            1 => self.emit_instruction("ldarg.1", None),
            2 => self.emit_instruction("ldarg.2", None),
            3 => self.emit_instruction("ldarg.3", None),
            x if x <= 255 =>
            {
                #[allow(clippy::cast_possible_truncation)]
                self.emit_instruction(
                    "ldarg.s",
                    Some(Operand::Immediate(Immediate::UInt8(x as u8))),
                )
            }
            x => self.emit_instruction("ldarg", Some(Operand::Immediate(Immediate::UInt16(x)))),
        }
    }

    /// Emit `ldloc` in its shortest form
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_ldloc(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit_instruction("ldloc.0", None),
            1 => self.emit_instruction("ldloc.1", None),
            2 => self.emit_instruction("ldloc.2", None),
            3 => self.emit_instruction("ldloc.3", None),
            x if x <= 255 =>
            {
                #[allow(clippy::cast_possible_truncation)]
                self.emit_instruction(
                    "ldloc.s",
                    Some(Operand::Immediate(Immediate::UInt8(x as u8))),
                )
            }
            x => self.emit_instruction("ldloc", Some(Operand::Immediate(Immediate::UInt16(x)))),
        }
    }

    /// Emit `stloc` in its shortest form
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_stloc(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit_instruction("stloc.0", None),
            1 => self.emit_instruction("stloc.1", None),
            2 => self.emit_instruction("stloc.2", None),
            3 => self.emit_instruction("stloc.3", None),
            x if x <= 255 =>
            {
                #[allow(clippy::cast_possible_truncation)]
                self.emit_instruction(
                    "stloc.s",
                    Some(Operand::Immediate(Immediate::UInt8(x as u8))),
                )
            }
            x => self.emit_instruction("stloc", Some(Operand::Immediate(Immediate::UInt16(x)))),
        }
    }

    /// Emit `ldc.i4` in its shortest form
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_ldc_i4(&mut self, value: i32) -> Result<()> {
        match value {
            -1 => self.emit_instruction("ldc.i4.m1", None),
            0 => self.emit_instruction("ldc.i4.0", None),
            1 => self.emit_instruction("ldc.i4.1", None),
            2 => self.emit_instruction("ldc.i4.2", None),
            3 => self.emit_instruction("ldc.i4.3", None),
            4 => self.emit_instruction("ldc.i4.4", None),
            5 => self.emit_instruction("ldc.i4.5", None),
            6 => self.emit_instruction("ldc.i4.6", None),
            7 => self.emit_instruction("ldc.i4.7", None),
            8 => self.emit_instruction("ldc.i4.8", None),
            x if (-128..=127).contains(&x) =>
            {
                #[allow(clippy::cast_possible_truncation)]
                self.emit_instruction(
                    "ldc.i4.s",
                    Some(Operand::Immediate(Immediate::Int8(x as i8))),
                )
            }
            x => self.emit_instruction("ldc.i4", Some(Operand::Immediate(Immediate::Int32(x)))),
        }
    }

    /// Define a label at the current position.
    ///
    /// # Errors
    /// - [`Error::DuplicateLabel`] if the label already exists
    /// - [`Error::InvalidBranch`] if fall-through and branches reach it with different depths
    pub fn define_label(&mut self, name: &str) -> Result<()> {
        if self.labels.contains_key(name) {
            return Err(Error::DuplicateLabel(name.to_string()));
        }

        if let Some(&expected) = self.label_stack_depths.get(name) {
            if self.unreachable {
                self.current_stack_depth = expected;
            } else if self.current_stack_depth != expected {
                return Err(Error::InvalidBranch(format!(
                    "stack depth mismatch at label '{name}': expected {expected}, got {}",
                    self.current_stack_depth
                )));
            }
        } else if self.unreachable {
            self.current_stack_depth = 0;
        } else {
            self.label_stack_depths
                .insert(name.to_string(), self.current_stack_depth);
        }
        self.unreachable = false;

        let position = u32::try_from(self.bytecode.len())
            .map_err(|_| malformed_error!("Bytecode length exceeds u32 range"))?;
        self.labels.insert(name.to_string(), position);
        Ok(())
    }

    /// Current stack depth
    #[must_use]
    pub fn current_stack_depth(&self) -> usize {
        self.current_stack_depth
    }

    /// Maximum stack depth reached so far
    #[must_use]
    pub fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }

    /// Current bytecode length
    #[must_use]
    pub fn position(&self) -> usize {
        self.bytecode.len()
    }

    /// Resolve all labels and return the code and its maximum stack depth.
    ///
    /// # Errors
    /// - [`Error::UndefinedLabel`] if a branch target was never defined
    /// - [`Error::InvalidBranch`] if an offset does not fit a short branch
    pub fn finalize(mut self) -> Result<(Vec<u8>, usize)> {
        let fixups = std::mem::take(&mut self.fixups);
        for fixup in &fixups {
            let label_position = self
                .labels
                .get(&fixup.label)
                .ok_or_else(|| Error::UndefinedLabel(fixup.label.clone()))?;

            let next_instruction = fixup.fixup_position + fixup.offset_size as usize;
            let label_pos = i64::from(*label_position);
            let next_pos = i64::try_from(next_instruction)
                .map_err(|_| malformed_error!("Instruction position exceeds i64 range"))?;

            self.write_branch_offset(label_pos - next_pos, fixup)?;
        }

        Ok((self.bytecode, self.max_stack_depth))
    }

    fn lookup(mnemonic: &str) -> Result<&'static CilInstruction> {
        lookup_mnemonic(mnemonic).ok_or_else(|| Error::InvalidMnemonic(mnemonic.to_string()))
    }

    fn push_opcode(&mut self, metadata: &CilInstruction) {
        if metadata.prefix != 0 {
            self.bytecode.push(metadata.prefix);
        }
        self.bytecode.push(metadata.opcode);
    }

    fn emit_with_effect(
        &mut self,
        metadata: &CilInstruction,
        operand: Option<Operand>,
        pops: u8,
        pushes: u8,
    ) -> Result<()> {
        let start = self.bytecode.len();
        self.push_opcode(metadata);
        self.emit_operand(operand, metadata.op_type)?;
        self.update_stack_depth(start, pops, pushes)?;

        if metadata.flow == FlowType::Return {
            self.unreachable = true;
        }
        Ok(())
    }

    fn emit_operand(&mut self, operand: Option<Operand>, expected: OperandType) -> Result<()> {
        let wrong = || Error::WrongOperandType {
            expected: format!("{expected:?}"),
        };

        match (expected, operand) {
            (OperandType::None, None) => {}
            (OperandType::None, Some(_)) => return Err(Error::UnexpectedOperand),
            (OperandType::Int8, Some(Operand::Immediate(Immediate::Int8(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::UInt8, Some(Operand::Immediate(Immediate::UInt8(val)))) => {
                self.bytecode.push(val);
            }
            (OperandType::UInt16, Some(Operand::Immediate(Immediate::UInt16(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Int32, Some(Operand::Immediate(Immediate::Int32(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Int64, Some(Operand::Immediate(Immediate::Int64(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Float64, Some(Operand::Immediate(Immediate::Float64(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Token, Some(Operand::Token(token))) => {
                self.bytecode.extend_from_slice(&token.value().to_le_bytes());
            }
            _ => return Err(wrong()),
        }

        Ok(())
    }

    fn write_branch_offset(&mut self, offset: i64, fixup: &LabelFixup) -> Result<()> {
        match fixup.offset_size {
            1 => {
                let offset_i8 = i8::try_from(offset).map_err(|_| {
                    Error::InvalidBranch(format!(
                        "offset {offset} out of range for 1-byte instruction"
                    ))
                })?;
                self.bytecode[fixup.fixup_position] = offset_i8.to_le_bytes()[0];
            }
            4 => {
                let offset_i32 = i32::try_from(offset).map_err(|_| {
                    Error::InvalidBranch(format!(
                        "offset {offset} out of range for 4-byte instruction"
                    ))
                })?;
                self.bytecode[fixup.fixup_position..fixup.fixup_position + 4]
                    .copy_from_slice(&offset_i32.to_le_bytes());
            }
            size => {
                return Err(Error::InvalidBranch(format!(
                    "invalid offset size: {size} bytes"
                )))
            }
        }
        Ok(())
    }

    fn update_stack_depth(&mut self, offset: usize, pops: u8, pushes: u8) -> Result<()> {
        let pops = usize::from(pops);
        if self.current_stack_depth < pops {
            if !self.unreachable {
                return Err(Error::StackUnderflow {
                    offset,
                    needed: pops,
                    available: self.current_stack_depth,
                });
            }
            self.current_stack_depth = 0;
        } else {
            self.current_stack_depth -= pops;
        }

        self.current_stack_depth += usize::from(pushes);
        self.max_stack_depth = self.max_stack_depth.max(self.current_stack_depth);
        Ok(())
    }

    fn record_label_stack_depth(&mut self, label: &str) -> Result<()> {
        if self.unreachable {
            return Ok(());
        }

        match self.label_stack_depths.get(label) {
            Some(&expected) if expected != self.current_stack_depth => {
                Err(Error::InvalidBranch(format!(
                    "stack depth mismatch for branch to '{label}': expected {expected}, got {}",
                    self.current_stack_depth
                )))
            }
            Some(_) => Ok(()),
            None => {
                self.label_stack_depths
                    .insert(label.to_string(), self.current_stack_depth);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::Token;

    #[test]
    fn test_encoder_creation() {
        let encoder = InstructionEncoder::new();
        assert!(encoder.bytecode.is_empty());
        assert!(encoder.labels.is_empty());
        assert!(encoder.fixups.is_empty());
    }

    #[test]
    fn test_simple_instruction_encoding() -> Result<()> {
        let mut encoder = InstructionEncoder::new();
        encoder.emit_instruction("nop", None)?;
        encoder.emit_instruction("ret", None)?;

        let (bytecode, max_stack) = encoder.finalize()?;
        assert_eq!(bytecode, vec![0x00, 0x2A]);
        assert_eq!(max_stack, 0);
        Ok(())
    }

    #[test]
    fn test_instruction_with_operands() -> Result<()> {
        let mut encoder = InstructionEncoder::new();
        encoder.emit_instruction("ldarg.s", Some(Operand::Immediate(Immediate::UInt8(1))))?;
        encoder.emit_instruction("ldc.i4.s", Some(Operand::Immediate(Immediate::Int8(42))))?;

        let (bytecode, max_stack) = encoder.finalize()?;
        assert_eq!(bytecode, vec![0x0E, 0x01, 0x1F, 42]);
        assert_eq!(max_stack, 2);
        Ok(())
    }

    #[test]
    fn test_token_operand() -> Result<()> {
        let mut encoder = InstructionEncoder::new();
        encoder.emit_instruction("ldtoken", Some(Operand::Token(Token::new(0x0600_0003))))?;

        let (bytecode, _) = encoder.finalize()?;
        assert_eq!(bytecode, vec![0xD0, 0x03, 0x00, 0x00, 0x06]);
        Ok(())
    }

    #[test]
    fn test_label_resolution() -> Result<()> {
        let mut encoder = InstructionEncoder::new();
        encoder.emit_instruction("nop", None)?;
        encoder.emit_branch("br.s", "target")?;
        encoder.emit_instruction("nop", None)?;
        encoder.define_label("target")?;
        encoder.emit_instruction("ret", None)?;

        let (bytecode, _) = encoder.finalize()?;
        assert_eq!(bytecode, vec![0x00, 0x2B, 0x01, 0x00, 0x2A]);
        Ok(())
    }

    #[test]
    fn test_backward_long_branch() -> Result<()> {
        let mut encoder = InstructionEncoder::new();
        encoder.define_label("top")?;
        encoder.emit_instruction("nop", None)?;
        encoder.emit_branch("br", "top")?;

        let (bytecode, _) = encoder.finalize()?;
        assert_eq!(bytecode, vec![0x00, 0x38, 0xFA, 0xFF, 0xFF, 0xFF]);
        Ok(())
    }

    #[test]
    fn test_call_stack_effect() -> Result<()> {
        let mut encoder = InstructionEncoder::new();
        encoder.emit_ldarg(0)?;
        encoder.emit_ldarg(1)?;
        encoder.emit_call("callvirt", Some(Operand::Token(Token::new(0x0600_0001))), 2, true)?;
        encoder.emit_ret(true)?;

        let (_, max_stack) = encoder.finalize()?;
        assert_eq!(max_stack, 2);
        Ok(())
    }

    #[test]
    fn test_short_forms() -> Result<()> {
        let mut encoder = InstructionEncoder::new();
        encoder.emit_ldc_i4(-1)?;
        encoder.emit_ldc_i4(8)?;
        encoder.emit_ldc_i4(-128)?;
        encoder.emit_ldc_i4(128)?;
        encoder.emit_ldarg(4)?;
        encoder.emit_ldarg(256)?;
        encoder.emit_stloc(5)?;
        encoder.emit_ldloc(300)?;

        let (bytecode, _) = encoder.finalize()?;
        assert_eq!(
            bytecode,
            vec![
                0x15, 0x1E, 0x1F, 0x80, 0x20, 0x80, 0x00, 0x00, 0x00, 0x0E, 0x04, 0xFE, 0x09,
                0x00, 0x01, 0x13, 0x05, 0xFE, 0x0C, 0x2C, 0x01,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_stack_underflow() {
        let mut encoder = InstructionEncoder::new();
        assert!(matches!(
            encoder.emit_instruction("pop", None),
            Err(Error::StackUnderflow {
                needed: 1,
                available: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_operand_errors() {
        let mut encoder = InstructionEncoder::new();
        assert!(matches!(
            encoder.emit_instruction("nop", Some(Operand::Token(Token::new(1)))),
            Err(Error::UnexpectedOperand)
        ));
        assert!(matches!(
            encoder.emit_instruction("ldc.i4.s", Some(Operand::Immediate(Immediate::Int32(1)))),
            Err(Error::WrongOperandType { .. })
        ));
        assert!(matches!(
            encoder.emit_instruction("bogus", None),
            Err(Error::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_label_errors() -> Result<()> {
        let mut encoder = InstructionEncoder::new();
        encoder.define_label("a")?;
        assert!(matches!(
            encoder.define_label("a"),
            Err(Error::DuplicateLabel(_))
        ));

        let mut encoder = InstructionEncoder::new();
        encoder.emit_branch("br.s", "missing")?;
        assert!(matches!(encoder.finalize(), Err(Error::UndefinedLabel(_))));
        Ok(())
    }
}
