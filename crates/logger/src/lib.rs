//! Process-wide tracing setup shared by the workspace binaries.

mod tracing;

pub use crate::tracing::{init_tracing, init_tracing_with_level};
