#![allow(missing_docs)]

mod core;
mod ws;

pub use self::{core::*, ws::*};
