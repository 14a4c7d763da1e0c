//! Clean-up passes over finished stack code
//!
//! Lowering is one instruction at a time, so it leaves behind structure that a compiler would
//! never have produced. These passes tidy that up before the code gets serialized.

mod try_catch;

pub use try_catch::*;
