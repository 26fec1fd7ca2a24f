//! Request handlers.

pub mod health;
pub mod tracking;

pub use health::*;
pub use tracking::*;
