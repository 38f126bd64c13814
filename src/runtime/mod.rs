//! Blocking socket plumbing shared by the protocol handlers.
//!
//! - `Channel`: a connected stream with peek and pending-byte queries
//! - `FrameReader`: strategies for reading one undelimited text message

mod connection;
mod framing;

pub use connection::{recv_exact, recv_full, Channel};
pub use framing::{FrameReader, ReadStrategy};

#[cfg(test)]
pub(crate) use connection::WriteLimited;
