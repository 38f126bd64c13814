//! Protocol implementations.
//!
//! A session runs these in order over one connection:
//! - `auth`: salted challenge-response handshake (server side only)
//! - `vector`: one batch of length-prefixed vectors answered with sums

pub mod auth;
pub mod vector;
