pub mod buffer;
pub mod common;
pub mod concurrency;
pub mod config;
pub mod database;
pub mod error;
pub mod execution;
pub mod storage;

pub use buffer::BufferPool;
pub use crate::config::Config;
pub use database::Database;
pub use error::{Error, Result};
