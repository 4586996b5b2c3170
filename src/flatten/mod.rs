//! JSON flattening - unwind nested JSON into flat, tabular records
//!
//! This module turns nested documents into rows of `path -> scalar`
//! records. Arrays are unwound into sibling rows (duplicating the fields
//! around them) before the remaining structure is flattened into
//! dot-notation keys.

pub mod columns;
pub mod path;
pub mod types;
pub mod unwind;

pub use columns::ColumnSet;
pub use path::{PathKey, Segment};
pub use types::{FlatRecord, FlattenConfig};
pub use unwind::{flatten, unwind};
