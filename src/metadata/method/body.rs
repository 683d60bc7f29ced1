//! Method body headers and code, §II.25.4.
//!
//! A body is stored as a header followed by the CIL code. Small bodies without locals
//! use the one byte tiny header, everything else the 12 byte fat header. Bodies of
//! synthesized methods never carry exception sections.

use std::sync::OnceLock;

use crate::{
    assembly::{decode_stream, Instruction},
    file::{
        io::{read_le, write_le},
        parser::Parser,
    },
    metadata::{method::MethodBodyFlags, typesystem::CilTypeRef},
    Error::OutOfBounds,
    Result,
};

/// Largest code size that fits a tiny header
const TINY_MAX_CODE: usize = 64;
/// Largest stack depth a tiny header implies
const TINY_MAX_STACK: usize = 8;

/// Describes one method body: header information and the raw CIL code.
pub struct MethodBody {
    /// The CIL code, without header
    pub code: Vec<u8>,
    /// Maximum number of items on the operand stack
    pub max_stack: usize,
    /// Types of the declared locals, in slot order
    pub locals: Vec<CilTypeRef>,
    /// Flag, indicating to call default constructor on all local variables
    pub is_init_local: bool,
    /// `MetaData` token for a signature describing the layout of the local variables. 0 == none
    pub local_var_sig_token: u32,
    /// Decoded instructions, on first use
    instructions: OnceLock<Vec<Instruction>>,
}

impl MethodBody {
    /// Create a body from emitted code
    #[must_use]
    pub fn new(code: Vec<u8>, max_stack: usize, locals: Vec<CilTypeRef>) -> Self {
        let is_init_local = !locals.is_empty();
        MethodBody {
            code,
            max_stack,
            locals,
            is_init_local,
            local_var_sig_token: 0,
            instructions: OnceLock::new(),
        }
    }

    /// True if this body is serialized with a tiny header
    #[must_use]
    pub fn is_tiny(&self) -> bool {
        self.code.len() < TINY_MAX_CODE && self.max_stack <= TINY_MAX_STACK && self.locals.is_empty()
    }

    /// Size of the serialized header in bytes
    #[must_use]
    pub fn size_header(&self) -> usize {
        if self.is_tiny() {
            1
        } else {
            12
        }
    }

    /// Get the full size of this method
    #[must_use]
    pub fn size(&self) -> usize {
        self.size_header() + self.code.len()
    }

    /// Serialize header and code.
    ///
    /// The tiny header is `(code_size << 2) | 0x02`. The fat header stores flags and
    /// header size (3 dwords), max stack, code size and the local signature token.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());

        if self.is_tiny() {
            // Fits: code size is below 64
            #[allow(clippy::cast_possible_truncation)]
            out.push(((self.code.len() as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8);
        } else {
            let mut flags = MethodBodyFlags::FAT_FORMAT;
            if self.is_init_local {
                flags |= MethodBodyFlags::INIT_LOCALS;
            }

            write_le(&mut out, (3_u16 << 12) | flags.bits());
            #[allow(clippy::cast_possible_truncation)]
            write_le(&mut out, self.max_stack.min(usize::from(u16::MAX)) as u16);
            #[allow(clippy::cast_possible_truncation)]
            write_le(&mut out, self.code.len() as u32);
            write_le(&mut out, self.local_var_sig_token);
        }

        out.extend_from_slice(&self.code);
        out
    }

    /// Parse a serialized body. Local types are not recoverable from the header and
    /// are left empty.
    ///
    /// # Errors
    /// Returns an error if the data is empty, out of bounds, or malformed.
    pub fn from_bytes(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_00000011_u8)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(OutOfBounds);
                }

                Ok(MethodBody {
                    code: data[1..=size_code].to_vec(),
                    max_stack: TINY_MAX_STACK,
                    locals: Vec::new(),
                    is_init_local: false,
                    local_var_sig_token: 0,
                    instructions: OnceLock::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < 12 {
                    return Err(OutOfBounds);
                }

                let first_duo = read_le::<u16>(data)?;
                let size_header = ((first_duo >> 12) * 4) as usize;
                let size_code = read_le::<u32>(&data[4..])? as usize;
                if size_header < 12 || data.len() < size_code + size_header {
                    return Err(OutOfBounds);
                }

                let flags_header =
                    MethodBodyFlags::from_bits_truncate(first_duo & 0b_0000111111111111_u16);

                Ok(MethodBody {
                    code: data[size_header..size_header + size_code].to_vec(),
                    max_stack: read_le::<u16>(&data[2..])? as usize,
                    locals: Vec::new(),
                    is_init_local: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
                    local_var_sig_token: read_le::<u32>(&data[8..])?,
                    instructions: OnceLock::new(),
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    /// Decoded instructions of this body, decoded once and cached.
    ///
    /// # Errors
    /// Returns an error if the code contains an invalid or truncated instruction.
    pub fn instructions(&self) -> Result<&[Instruction]> {
        if let Some(decoded) = self.instructions.get() {
            return Ok(decoded);
        }

        let mut parser = Parser::new(&self.code);
        let decoded = decode_stream(&mut parser, 0)?;
        Ok(self.instructions.get_or_init(|| decoded))
    }
}

impl std::fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodBody")
            .field("code_size", &self.code.len())
            .field("max_stack", &self.max_stack)
            .field("locals", &self.locals.len())
            .field("is_init_local", &self.is_init_local)
            .finish()
    }
}
