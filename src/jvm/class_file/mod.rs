//! Binary encoding of stack-form classes
//!
//! This is a thin layer over the [class file format][0]: everything here already refers to the
//! constant pool by index, so the only real work left is serializing bytes. See
//! [`crate::output::ClassWriter`] for turning the application model into these structures.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html

mod attribute;
mod class;
mod constants;
mod serialize;
mod version;

pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use serialize::*;
pub use version::*;
