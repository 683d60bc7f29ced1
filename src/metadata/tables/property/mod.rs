//! Properties, §II.22.34.

use std::sync::Arc;

mod owned;

pub use owned::*;

/// A vector that holds a list of `Property`
pub type PropertyList = Arc<boxcar::Vec<PropertyRc>>;
/// A reference to a `Property`
pub type PropertyRc = Arc<Property>;
