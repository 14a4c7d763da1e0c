//! Register-based bytecode (the dex dialect)
//!
//! Instructions are kept in a typed form: the input loader has already resolved which category
//! of value every register operand holds (eg. `move-wide` vs. `move-object`), and references to
//! classes, fields, and methods are symbolic. Branch targets and try ranges are expressed as
//! [`Address`]es, which are indices into the method's instruction list.

mod code;
mod errors;
mod instructions;
mod payload;

pub use code::*;
pub use errors::*;
pub use instructions::*;
pub use payload::*;
