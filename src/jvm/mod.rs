//! Stack-based bytecode (the JVM dialect)
//!
//! Everything needed to represent, check, and encode stack-form method bodies:
//!
//!   - names, descriptors, and access flags shared by both dialects
//!   - [`code`] for instructions, labels, exception ranges, and the incremental [`CodeBuilder`]
//!   - [`verifier`] for tracking the types on the operand stack and in locals
//!   - [`class_file`] for the binary class file encoding
//!
//! ### Example
//!
//! Building a method body that returns the sum of its two `int` arguments:
//!
//! ```
//! use dex_translator::jvm::code::{BranchInstruction, CodeBuilder, Instruction, SynLabel};
//! use dex_translator::jvm::*;
//!
//! # fn build() -> Result<(), Error> {
//! let descriptor = MethodDescriptor::parse("(II)I").unwrap();
//! let owner = BinaryName::from_str("me/example/Adder").unwrap();
//! let name = UnqualifiedName::from_str("add").unwrap();
//! let entry = SynLabel::START;
//! let mut code = CodeBuilder::new(owner, &name, &descriptor, true, entry);
//! code.start_block(entry)?;
//! code.push_instruction(Instruction::ILoad(0))?;
//! code.push_instruction(Instruction::ILoad(1))?;
//! code.push_instruction(Instruction::IAdd)?;
//! code.push_branch_instruction(BranchInstruction::IReturn)?;
//! let code = code.result(&[entry])?;
//! assert_eq!(code.max_stack.0, 2);
//! # Ok(())
//! # }
//! # build().unwrap();
//! ```

mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
mod members;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use members::*;
pub use names::*;
