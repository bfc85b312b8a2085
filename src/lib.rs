pub mod types;
pub mod error;
pub mod config;
pub mod storage;
pub mod provider;
pub mod sync;
pub mod query;
pub mod cache;
pub mod logging;
pub mod utils;

#[cfg(test)]
mod testkit;

pub use types::*;
pub use error::{Result, RatesError};
