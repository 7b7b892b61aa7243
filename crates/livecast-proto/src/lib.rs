//! Shared types for the livecast reconciler: the wire model, the error
//! taxonomy, the status normalizer and configuration.

pub mod config;
pub mod display;
pub mod error;
pub mod model;
pub mod normalize;
pub mod platform;

pub use error::{Error, Result, Validation};
