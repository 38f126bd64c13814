//! Salted challenge-response authentication.
//!
//! ## Protocol Format
//!
//! ```text
//! Client:  user\n                     (username, one write)
//! Server:  3F2A9C0B11D4E7A8           (16 hex chars, no delimiter)
//! Client:  <HEX(H(salt || password))>\n
//! Server:  OK
//! ```
//!
//! Hex is uppercase in both directions. The server closes the connection
//! instead of answering when either check fails.

pub mod challenge;
pub mod handler;

pub use challenge::{Credential, HashAlgorithm};
pub use handler::{AuthState, Authenticator};
