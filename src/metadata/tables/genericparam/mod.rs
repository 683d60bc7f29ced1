//! Generic parameters and their constraints, §II.22.20 and §II.22.21.

use std::sync::Arc;

mod owned;

pub use owned::*;

/// A vector that holds a list of `GenericParam`
pub type GenericParamList = Arc<boxcar::Vec<GenericParamRc>>;
/// A reference to a `GenericParam`
pub type GenericParamRc = Arc<GenericParam>;

#[allow(non_snake_case)]
/// All possible flags for `GenericParamAttributes`
pub mod GenericParamAttributes {
    /// Mask for the variance bits
    pub const VARIANCE_MASK: u32 = 0x0003;
    /// The generic parameter is non-variant and has no special constraints
    pub const NONE: u32 = 0x0000;
    /// The generic parameter is covariant
    pub const COVARIANT: u32 = 0x0001;
    /// The generic parameter is contravariant
    pub const CONTRAVARIANT: u32 = 0x0002;
    /// Mask for the special constraint bits
    pub const SPECIAL_CONSTRAINT_MASK: u32 = 0x001C;
    /// The generic parameter has the `class` special constraint
    pub const REFERENCE_TYPE_CONSTRAINT: u32 = 0x0004;
    /// The generic parameter has the `valuetype` special constraint
    pub const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT: u32 = 0x0008;
    /// The generic parameter has the `.ctor` special constraint
    pub const DEFAULT_CONSTRUCTOR_CONSTRAINT: u32 = 0x0010;
}
