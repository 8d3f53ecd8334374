//! Request handlers.

pub mod health;
pub mod recolor;

pub use health::*;
pub use recolor::*;
