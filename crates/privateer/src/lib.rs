pub mod backup;
pub mod check;
pub mod config;
pub mod configure;
pub mod error;
pub mod executor;
pub mod identity;
pub mod keys;
pub mod logging;
pub mod plan;
pub mod restore;
pub mod runtime;
pub mod service;
pub mod source;
pub mod tar;
pub mod vault;

pub use error::{Error, Result};
