//! Semantic representation of the application being converted
//!
//!   - __Application__ is represented using [`Application`] (an ordered set of classes)
//!   - __Class__ is represented using [`ProgramClass`]
//!   - __Method__ is represented using [`ProgramMethod`], whose body is a [`MethodCode`] in
//!     either dialect
//!   - __Field__ is represented using [`ProgramField`]

mod application;
mod class;
mod field;
mod method;

pub use application::*;
pub use class::*;
pub use field::*;
pub use method::*;
