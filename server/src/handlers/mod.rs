//! Request handlers for local mutations.

mod clean;
mod tracking;

pub use clean::*;
pub use tracking::*;
