//! Length-prefixed vector batches with saturating sums.
//!
//! ## Protocol Format
//!
//! All integers are little-endian.
//!
//! ```text
//! Client:  <count: u32>
//!          repeated count times:
//!            <len: u32> <len elements>      (8 bytes each for int64)
//!            Server: <sum: element>          (before the next len is read)
//! ```
//!
//! A sum that would overflow is clamped to the element type's bound.

pub mod handler;
pub mod parser;

pub use handler::{process, BatchSummary};
pub use parser::{Element, ElementType};
