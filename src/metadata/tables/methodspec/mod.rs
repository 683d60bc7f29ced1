//! Generic method instantiations, §II.22.29.

use std::sync::Arc;

mod owned;

pub use owned::*;

/// A reference to a `MethodSpec`
pub type MethodSpecRc = Arc<MethodSpec>;
