//! Owned metadata rows for the members of a type.
//!
//! Each row kind lives in its own submodule with its flag constants and list aliases.
//! Rows are created by the builders in [`crate::metadata::builders`] and by the proxy
//! synthesizer, and are owned by the type that declares them.

mod constant;
mod field;
mod genericparam;
mod methodspec;
mod param;
mod property;

pub use constant::*;
pub use field::*;
pub use genericparam::*;
pub use methodspec::*;
pub use param::*;
pub use property::*;
