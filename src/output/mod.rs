//! Writing out converted applications
//!
//! Stack-form output is one class file per class ([`ClassWriter`]). Register-form output is a
//! single container holding every class ([`MethodTableWriter`], read back by
//! [`MethodTableReader`]). Either way, the bytes end up in an [`OutputSink`].

mod class_writer;
mod method_table;
mod sink;

pub use class_writer::*;
pub use method_table::*;
pub use sink::*;
