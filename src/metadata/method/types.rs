//! Method flags and calling conventions.
//!
//! # Key Types
//! - [`MethodAccessFlags`], [`MethodVtableFlags`], [`MethodModifiers`]: Attribute flags, split
//!   into the three groups of the `MethodAttributes` word
//! - [`CallingConvention`]: Signature calling convention bits
//! - [`MethodBodyFlags`]: Method body header flags

use bitflags::bitflags;

/// Bitmask for `ACCESS` state extraction
pub const METHOD_ACCESS_MASK: u32 = 0x0007;
/// Bitmask for `VTABLE_LAYOUT` information extraction
pub const METHOD_VTABLE_LAYOUT_MASK: u32 = 0x0100;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method access flags
    pub struct MethodAccessFlags: u32 {
        /// Member not referenceable
        const COMPILER_CONTROLLED = 0x0000;
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this Assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessibly by anyone in the Assembly
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessibly by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessibly by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
    }
}

impl MethodAccessFlags {
    /// Extract access flags from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        Self::from_bits_truncate(flags & METHOD_ACCESS_MASK)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method vtable layout flags
    pub struct MethodVtableFlags: u32 {
        /// Method reuses existing slot in vtable
        const REUSE_SLOT = 0x0000;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
    }
}

impl MethodVtableFlags {
    /// Extract vtable layout from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        Self::from_bits_truncate(flags & METHOD_VTABLE_LAYOUT_MASK)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method modifiers and properties
    pub struct MethodModifiers: u32 {
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method can only be overriden if also accessible
        const STRICT = 0x0200;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, depending upon the name of the method
        const RTSPECIAL_NAME = 0x1000;
    }
}

impl MethodModifiers {
    /// Extract modifiers from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        Self::from_bits_truncate(flags & !METHOD_ACCESS_MASK & !METHOD_VTABLE_LAYOUT_MASK)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Calling convention bits of a method signature, §II.23.2.1
    pub struct CallingConvention: u8 {
        /// Static method, no receiver
        const DEFAULT = 0x00;
        /// Variable argument list
        const VARARG = 0x05;
        /// Method declares generic parameters
        const GENERIC = 0x10;
        /// Instance method, receives `this`
        const HAS_THIS = 0x20;
        /// `this` is passed explicitly as the first parameter
        const EXPLICIT_THIS = 0x40;
    }
}

bitflags! {
    #[derive(PartialEq)]
    /// Method body header flags
    pub struct MethodBodyFlags: u16 {
        /// Tiny method header (1 byte)
        const TINY_FORMAT = 0x2;
        /// Fat method header (12 bytes)
        const FAT_FORMAT = 0x3;
        /// More sections follow the code
        const MORE_SECTS = 0x8;
        /// Zero-initialize all locals
        const INIT_LOCALS = 0x10;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_groups_split() {
        // PUBLIC | FINAL | VIRTUAL | HIDE_BY_SIG | NEW_SLOT
        let raw = 0x0006 | 0x0020 | 0x0040 | 0x0080 | 0x0100;

        assert_eq!(
            MethodAccessFlags::from_method_flags(raw),
            MethodAccessFlags::PUBLIC
        );
        assert_eq!(
            MethodVtableFlags::from_method_flags(raw),
            MethodVtableFlags::NEW_SLOT
        );
        assert_eq!(
            MethodModifiers::from_method_flags(raw),
            MethodModifiers::FINAL | MethodModifiers::VIRTUAL | MethodModifiers::HIDE_BY_SIG
        );
    }
}
