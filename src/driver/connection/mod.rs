//! Errors raised while establishing and using a voice connection.

pub mod error;
