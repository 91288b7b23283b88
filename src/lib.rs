#![allow(clippy::too_many_arguments)]

pub mod analytics;
pub mod boundary;
pub mod bus;
pub mod config;
pub mod errors;
pub mod message;
pub mod metadata;
pub mod store;
pub mod upstream;

pub use errors::{Error, Result};
