//! Lowering of register code into stack code
//!
//! [`lower_method`] walks a [`crate::dex::DexCode`] one basic block at a time, feeding a
//! [`crate::jvm::code::CodeBuilder`]. Most instructions are handed to an
//! [`InstructionTranslator`], but the bulk array initialization instructions have no direct
//! counterpart on the JVM and are expanded by [`array_fill`] through the narrow [`LoweringSink`]
//! interface.

pub mod array_fill;
mod errors;
mod method;
mod sink;
mod stack_shuffle;
mod translator;

pub use errors::*;
pub use method::*;
pub(crate) use method::{validate_branch_targets, validate_registers, validate_tries};
pub use sink::*;
pub use stack_shuffle::*;
pub use translator::*;
