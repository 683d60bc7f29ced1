//! Low-level byte access shared by the instruction decoder and method body headers.

pub mod io;
pub mod parser;

pub use parser::Parser;
