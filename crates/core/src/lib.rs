#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod time;

pub use error::SchemaViolation;
pub use time::Clock;
