//! prepo_hash: canonical digests over IR globals.
//!
//! Reduces each function, global variable, and alias of a module to a
//! fixed-width fingerprint that is identical across compilations whenever the
//! generated machine code would be identical, and different otherwise.

pub mod digest;
pub mod hasher;
pub mod sink;

pub use digest::Digest;
pub use hasher::{hash_alias, hash_function, hash_variable};

#[cfg(test)]
mod tests;
