//! Database module for the local SQLite store.

pub mod meta;
mod lookup;
mod merge;
mod pool;
mod records;
mod repair;
mod seed;
mod snapshot;

pub use lookup::*;
pub use merge::*;
pub use pool::*;
pub use records::*;
pub use repair::*;
pub use seed::*;
pub use snapshot::*;
