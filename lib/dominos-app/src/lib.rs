//! High-level application primitives.
//!
//! This crate provides the primitives necessary for bootstrapping a simulator process prior to running, such as
//! initializing logging.
#![deny(missing_docs)]

pub mod logging;

/// Common imports.
pub mod prelude {
    pub use super::logging::{fatal_and_exit, initialize_logging};
}
