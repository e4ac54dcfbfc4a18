//! Contract bindings for the Will agreement

pub mod will;

pub use will::*;
