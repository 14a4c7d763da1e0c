//! Type tracking for stack-form code
//!
//! Frames are what the `StackMapTable` would be built from, but here they are only used to check
//! the generated code and to pick instructions (eg. which array store to use).

mod frame;
mod types;

pub use frame::*;
pub use types::*;
