//! Translate compiled classes between register-based (dex) and stack-based (JVM) bytecode
//!
//! The crate is organised leaf to root:
//!
//!   - [`jvm`] and [`dex`] model the two instruction sets
//!   - [`model`] is the application being converted (classes, fields, methods, code)
//!   - [`lower`] turns register code into stack code, including the bulk array initialization
//!     instructions that have no direct stack equivalent
//!   - [`resugar`] tidies up exception tables after lowering
//!   - [`convert`] drives whole applications through the pipeline, isolating per-method failures
//!   - [`output`] serializes the result

pub mod convert;
pub mod dex;
pub mod jvm;
pub mod lower;
pub mod model;
pub mod output;
pub mod resugar;
pub mod util;
