//! figurine-common/src/lib.rs
//!
//! Shared data types for the figurine controller: poses, events, joint and
//! behaviour configuration, and the joint driver contract.

pub mod error;
pub mod models;
pub mod traits;

pub use error::Error;
