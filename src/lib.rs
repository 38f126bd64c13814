//! saltsum: an authenticated vector-sum worker
//!
//! Each connection gets its own worker, which:
//! - authenticates the peer with a salted challenge-response handshake
//!   (server side only)
//! - reads one batch of length-prefixed `int64` vectors
//! - answers each vector with its saturating sum
//!
//! The handshake's text messages can be framed with any of three
//! strategies, selected at runtime.

pub mod client;
pub mod config;
pub mod error;
pub mod protocols;
pub mod runtime;
pub mod server;
pub mod worker;

pub use error::{AuthFailure, WorkerError, WorkerResult};
pub use worker::{Side, Worker, WorkerSettings};
