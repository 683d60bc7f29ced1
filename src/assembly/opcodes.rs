//! CIL opcode byte constants (ECMA-335, §III).
//!
//! Single-byte opcodes are named after their mnemonic (e.g. [`CALL`] = `0x28`).
//! Two-byte opcodes share the [`FE_PREFIX`] first byte and store their second byte
//! with an `FE_` prefix (e.g. [`FE_LDARG`] = `0x09` for `ldarg`, `0xFE 0x09`).
//!
//! Only the instructions the encoder, decoder and interpreter understand are listed.
#![allow(missing_docs)]

// Misc
pub const NOP: u8 = 0x00;

// Argument and local shorthand
pub const LDARG_0: u8 = 0x02;
pub const LDARG_1: u8 = 0x03;
pub const LDARG_2: u8 = 0x04;
pub const LDARG_3: u8 = 0x05;
pub const LDLOC_0: u8 = 0x06;
pub const LDLOC_1: u8 = 0x07;
pub const LDLOC_2: u8 = 0x08;
pub const LDLOC_3: u8 = 0x09;
pub const STLOC_0: u8 = 0x0A;
pub const STLOC_1: u8 = 0x0B;
pub const STLOC_2: u8 = 0x0C;
pub const STLOC_3: u8 = 0x0D;

// Argument and local (short form)
pub const LDARG_S: u8 = 0x0E;
pub const STARG_S: u8 = 0x10;
pub const LDLOC_S: u8 = 0x11;
pub const STLOC_S: u8 = 0x13;

// Null and constant loaders
pub const LDNULL: u8 = 0x14;
pub const LDC_I4_M1: u8 = 0x15;
pub const LDC_I4_0: u8 = 0x16;
pub const LDC_I4_1: u8 = 0x17;
pub const LDC_I4_2: u8 = 0x18;
pub const LDC_I4_3: u8 = 0x19;
pub const LDC_I4_4: u8 = 0x1A;
pub const LDC_I4_5: u8 = 0x1B;
pub const LDC_I4_6: u8 = 0x1C;
pub const LDC_I4_7: u8 = 0x1D;
pub const LDC_I4_8: u8 = 0x1E;
pub const LDC_I4_S: u8 = 0x1F;
pub const LDC_I4: u8 = 0x20;
pub const LDC_I8: u8 = 0x21;
pub const LDC_R8: u8 = 0x23;

// Stack manipulation
pub const DUP: u8 = 0x25;
pub const POP: u8 = 0x26;

// Call and return
pub const CALL: u8 = 0x28;
pub const RET: u8 = 0x2A;

// Branches
pub const BR_S: u8 = 0x2B;
pub const BRFALSE_S: u8 = 0x2C;
pub const BRTRUE_S: u8 = 0x2D;
pub const BR: u8 = 0x38;
pub const BRFALSE: u8 = 0x39;
pub const BRTRUE: u8 = 0x3A;

// Object model
pub const CALLVIRT: u8 = 0x6F;
pub const NEWOBJ: u8 = 0x73;
pub const CASTCLASS: u8 = 0x74;
pub const ISINST: u8 = 0x75;
pub const LDFLD: u8 = 0x7B;
pub const STFLD: u8 = 0x7D;
pub const BOX: u8 = 0x8C;
pub const NEWARR: u8 = 0x8D;
pub const LDLEN: u8 = 0x8E;
pub const LDELEM_REF: u8 = 0x9A;
pub const STELEM_REF: u8 = 0xA2;
pub const UNBOX_ANY: u8 = 0xA5;
pub const LDTOKEN: u8 = 0xD0;

// Two-byte opcodes
pub const FE_PREFIX: u8 = 0xFE;
pub const FE_LDARG: u8 = 0x09;
pub const FE_STARG: u8 = 0x0B;
pub const FE_LDLOC: u8 = 0x0C;
pub const FE_STLOC: u8 = 0x0E;
