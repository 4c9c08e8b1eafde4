#[macro_use]
extern crate lazy_static;

pub mod backend;
pub mod chain;
pub mod commands;
pub mod constants;
pub mod deploy;
pub mod env;
pub mod error;
pub mod logging;
pub mod output;
pub mod relayer;

pub use error::{Error, Result};
