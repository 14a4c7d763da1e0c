//! Batch conversion of whole applications
//!
//! [`Converter`] sequences a run: backend normalization, the per-method
//! [`MethodConversionLoop`], backend finalization, exception range merging and serialization.
//! Failures of single methods are isolated by the loop according to [`Options`]; backend and
//! export failures always end the run (see [`ConversionError`]).

mod backend;
mod errors;
mod filter;
mod method_loop;
mod options;
mod orchestrator;
mod pool;
mod register_builder;
mod report;

pub use backend::*;
pub use errors::*;
pub use filter::*;
pub use method_loop::*;
pub use options::*;
pub use orchestrator::*;
pub use pool::*;
pub use register_builder::build_register_code;
pub use report::*;
