//! Bytecode representation and generation
//!
//! ### Structure
//!
//! Method bodies are a flat sequence of [`CodeItem`]s: labels interleaved with instructions. We
//! split up the [list of bytecode instructions][0] into two groups:
//!
//!   - [`Instruction`] for straight-line instructions
//!   - [`BranchInstruction`] for instructions that may branch
//!
//! Exception ranges ([`TryCatch`]) refer to labels, so passes that rearrange code (or merge
//! ranges) never need to know about bytecode offsets. Offsets only get computed when the code is
//! serialized.
//!
//! ### Code generation
//!
//! It can get quite tedious and error prone to generate valid bytecode. In order to aid in this
//! process, [`CodeBuilder`] provides an interface for generating method code one basic block at a
//! time while doing the verification incrementally.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod code;
mod code_builder;
mod code_builder_exts;
mod instructions;
mod label;
mod try_catch;

pub use code::*;
pub use code_builder::*;
pub use code_builder_exts::*;
pub use instructions::*;
pub use label::*;
pub use try_catch::*;
