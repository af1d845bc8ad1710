//! Secret handling utilities.
//!
//! Re-exports the secrecy types used for store URLs.

pub use secrecy::{ExposeSecret, SecretString};
